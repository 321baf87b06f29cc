//! vissim CLI
//!
//! Simulate visibilities for a generated array and print a run report.

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;
use vissim_sim::{default_plan, load_plan, run, Layout, RunError, RunReport, RunSettings};

/// Composable radio-interferometer visibility simulator
#[derive(Parser, Debug)]
#[command(name = "vissim")]
#[command(about = "Simulate interferometric visibilities from a plan of effects", long_about = None)]
struct Args {
    /// Master seed for reproducibility (0 = random from time)
    #[arg(short, long, default_value = "42")]
    seed: u64,

    /// Antenna layout
    #[arg(short, long, value_enum, default_value = "linear")]
    layout: Layout,

    /// Number of antennas (linear) or antennas per side (hex)
    #[arg(short, long, default_value = "4")]
    ants: usize,

    /// Antenna separation in metres
    #[arg(long, default_value = "14.6")]
    sep: f64,

    /// Number of frequency channels
    #[arg(long, default_value = "64")]
    n_freq: usize,

    /// Number of integrations
    #[arg(long, default_value = "30")]
    n_times: usize,

    /// Polarizations, comma separated
    #[arg(long, value_delimiter = ',', default_value = "xx")]
    pols: Vec<String>,

    /// Include autocorrelations
    #[arg(long)]
    autos: bool,

    /// JSON plan file (list of {component, params, seed, filter, add, ret})
    #[arg(short, long)]
    plan: Option<String>,

    /// Precompute delay and fringe filters per redundant group
    #[arg(long)]
    filters: bool,

    /// Print the report as JSON
    #[arg(long)]
    json: bool,

    /// Write the report to a JSON file
    #[arg(short, long)]
    output: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn settings(&self) -> RunSettings {
        RunSettings {
            seed: self.seed,
            layout: self.layout,
            ants: self.ants,
            sep: self.sep,
            n_freq: self.n_freq,
            n_times: self.n_times,
            pols: self.pols.clone(),
            autos: self.autos,
            filters: self.filters,
        }
    }
}

fn execute(args: &Args) -> Result<RunReport, RunError> {
    let plan = match &args.plan {
        Some(path) => load_plan(path)?,
        None => default_plan(),
    };
    info!("Running {} plan entries", plan.len());

    let (_, report) = run(&args.settings(), &plan)?;
    if let Some(path) = &args.output {
        report.write_to_file(path)?;
        info!("Wrote report to {}", path);
    }
    Ok(report)
}

fn main() {
    let args = Args::parse();

    // Initialize logging
    let level = if args.verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");

    if !args.json {
        info!("vissim v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    }

    let report = match execute(&args) {
        Ok(report) => report,
        Err(e) => {
            error!("✗ Run failed: {}", e);
            std::process::exit(1);
        }
    };

    if args.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                error!("Failed to serialize report: {}", e);
                std::process::exit(1);
            }
        }
        return;
    }

    info!(
        "Array: {} antennas, {} baselines, {} redundant groups, {} times x {} freqs x {:?}",
        report.array.n_ants,
        report.array.n_bls,
        report.array.redundant_groups,
        report.array.n_times,
        report.array.n_freqs,
        report.array.pols
    );
    for record in &report.components {
        info!(
            "  ✓ {} (seed={}, {})",
            record.name,
            record.seed,
            if record.is_multiplicative { "multiplicative" } else { "additive" }
        );
    }
    for returned in &report.returned {
        info!(
            "  ↳ returned {} {} ({} samples, rms {:.3e})",
            returned.component, returned.kind, returned.samples, returned.rms
        );
    }
    for warning in &report.warnings {
        info!("  ! {}", warning);
    }
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    info!("Final data rms: {:.3e}", report.data_rms);
    if let Some(seed) = report.seed {
        info!("Reproduce with --seed {}", seed);
    }
}
