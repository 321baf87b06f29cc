//! Antenna layout generators (ENU metres).

use crate::types::AntNum;
use std::collections::BTreeMap;

/// `n` antennas along the east axis, `sep` metres apart.
pub fn linear_array(n: usize, sep: f64) -> BTreeMap<AntNum, [f64; 3]> {
    (0..n)
        .map(|i| (i as AntNum, [i as f64 * sep, 0.0, 0.0]))
        .collect()
}

/// Hexagonal close-packed array with `hex_num` antennas per side.
///
/// Rows run south to north; each row is centred on the north axis.
pub fn hex_array(hex_num: usize, sep: f64) -> BTreeMap<AntNum, [f64; 3]> {
    let mut antennas = BTreeMap::new();
    if hex_num == 0 {
        return antennas;
    }

    let side = hex_num as i64 - 1;
    let row_step = sep * 3f64.sqrt() / 2.0;
    let mut ant: AntNum = 0;
    for row in -side..=side {
        let n_in_row = 2 * hex_num - 1 - row.unsigned_abs() as usize;
        let x0 = -(n_in_row as f64 - 1.0) / 2.0 * sep;
        for i in 0..n_in_row {
            antennas.insert(ant, [x0 + i as f64 * sep, row as f64 * row_step, 0.0]);
            ant += 1;
        }
    }
    antennas
}
