//! Name-to-constructor table for effect models.

use crate::error::SimError;
use crate::model::{EffectModel, Params};

/// Builds a model from user parameters.
pub type ModelCtor = fn(&Params) -> Result<Box<dyn EffectModel>, SimError>;

/// A registered model.
#[derive(Clone)]
pub struct RegistryEntry {
    /// Canonical name, used in history and seed keywords
    pub name: &'static str,

    /// Alternative names, matched case-insensitively like the canonical one
    pub aliases: Vec<&'static str>,

    ctor: ModelCtor,
}

impl RegistryEntry {
    fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    pub fn build(&self, params: &Params) -> Result<Box<dyn EffectModel>, SimError> {
        (self.ctor)(params)
    }
}

impl std::fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("name", &self.name)
            .field("aliases", &self.aliases)
            .finish()
    }
}

/// Explicit registration table; nothing is discovered at runtime.
#[derive(Debug, Clone, Default)]
pub struct ModelRegistry {
    entries: Vec<RegistryEntry>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding every built-in model.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        crate::models::register_builtins(&mut registry);
        registry
    }

    /// Adds a model. A later registration under the same canonical name
    /// replaces the earlier one.
    pub fn register(&mut self, name: &'static str, aliases: &[&'static str], ctor: ModelCtor) {
        self.entries.retain(|e| e.name != name);
        self.entries.push(RegistryEntry {
            name,
            aliases: aliases.to_vec(),
            ctor,
        });
    }

    /// Finds the entry for a canonical name or alias.
    pub fn resolve(&self, name: &str) -> Result<&RegistryEntry, SimError> {
        self.entries
            .iter()
            .find(|e| e.matches(name))
            .ok_or_else(|| SimError::UnknownComponent {
                name: name.to_string(),
                known: self.known_names(),
            })
    }

    pub fn build(&self, name: &str, params: &Params) -> Result<Box<dyn EffectModel>, SimError> {
        self.resolve(name)?.build(params)
    }

    /// Every canonical name and alias, sorted.
    pub fn known_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .iter()
            .flat_map(|e| std::iter::once(e.name).chain(e.aliases.iter().copied()))
            .map(str::to_string)
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
