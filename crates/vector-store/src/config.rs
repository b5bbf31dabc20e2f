use crate::error::{Result, VectorStoreError};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_DIMENSION: usize = 384;
pub const DEFAULT_MAX_LEAF_SIZE: usize = 10;

pub const ENV_DIMENSION: &str = "HYPERBALL_DIMENSION";
pub const ENV_MAX_LEAF_SIZE: &str = "HYPERBALL_MAX_LEAF_SIZE";
pub const ENV_SEARCH_MODE: &str = "HYPERBALL_SEARCH_MODE";

/// Configuration for a [`BallTreeIndex`](crate::BallTreeIndex).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Number of components every stored vector must have
    pub dimension: usize,

    /// Leaf capacity; a leaf holding more vectors than this is split
    pub max_leaf_size: usize,

    /// How `search` finds candidates
    pub search_mode: SearchMode,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            max_leaf_size: DEFAULT_MAX_LEAF_SIZE,
            search_mode: SearchMode::BruteForce,
        }
    }
}

impl IndexConfig {
    #[must_use]
    pub fn with_dimension(dimension: usize) -> Self {
        Self {
            dimension,
            ..Default::default()
        }
    }

    #[must_use]
    pub const fn max_leaf_size(mut self, max_leaf_size: usize) -> Self {
        self.max_leaf_size = max_leaf_size;
        self
    }

    #[must_use]
    pub const fn search_mode(mut self, search_mode: SearchMode) -> Self {
        self.search_mode = search_mode;
        self
    }

    /// Parse a TOML document; missing keys keep their defaults.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)?;
        log::debug!("Loaded index config from {}", path.display());
        Self::from_toml_str(&raw)
    }

    /// Apply `HYPERBALL_*` environment overrides.
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from an arbitrary key lookup. Unparseable values are logged and
    /// ignored.
    #[must_use]
    pub fn with_overrides_from(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(raw) = lookup(ENV_DIMENSION) {
            match raw.trim().parse::<usize>() {
                Ok(value) => self.dimension = value,
                Err(_) => log::warn!("Ignoring {ENV_DIMENSION}={raw:?}: not an integer"),
            }
        }
        if let Some(raw) = lookup(ENV_MAX_LEAF_SIZE) {
            match raw.trim().parse::<usize>() {
                Ok(value) => self.max_leaf_size = value,
                Err(_) => log::warn!("Ignoring {ENV_MAX_LEAF_SIZE}={raw:?}: not an integer"),
            }
        }
        if let Some(raw) = lookup(ENV_SEARCH_MODE) {
            match raw.parse::<SearchMode>() {
                Ok(mode) => self.search_mode = mode,
                Err(err) => log::warn!("Ignoring {ENV_SEARCH_MODE}: {err}"),
            }
        }
        self
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(VectorStoreError::invalid_config("dimension must be > 0"));
        }
        // A split needs at least two vectors to seed two clusters.
        if self.max_leaf_size < 2 {
            return Err(VectorStoreError::invalid_config(format!(
                "max_leaf_size ({}) must be >= 2",
                self.max_leaf_size
            )));
        }
        Ok(())
    }
}

/// Candidate generation strategy for search
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchMode {
    /// Score every stored vector. Ground truth for ranking.
    #[default]
    BruteForce,

    /// Branch-and-bound over the ball tree (Euclidean only; other metrics fall back
    /// to brute force). Returns exactly the brute-force result list.
    Pruned,
}

impl SearchMode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::BruteForce => "brute_force",
            Self::Pruned => "pruned",
        }
    }
}

impl std::str::FromStr for SearchMode {
    type Err = String;

    fn from_str(raw: &str) -> std::result::Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "brute_force" | "brute" | "linear" => Ok(Self::BruteForce),
            "pruned" | "tree" => Ok(Self::Pruned),
            other => Err(format!("unknown search mode '{other}'")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_default_config_valid() {
        let config = IndexConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.dimension, 384);
        assert_eq!(config.search_mode, SearchMode::BruteForce);
    }

    #[test]
    fn test_config_validation() {
        let mut config = IndexConfig::default();

        config.dimension = 0;
        assert!(config.validate().is_err());

        config.dimension = 8;
        config.max_leaf_size = 1;
        assert!(config.validate().is_err());

        config.max_leaf_size = 2;
        assert!(config.validate().is_ok());
    }

    #[test]
    fn toml_keeps_defaults_for_missing_keys() {
        let config = IndexConfig::from_toml_str("max_leaf_size = 16\nsearch_mode = \"pruned\"\n")
            .unwrap();
        assert_eq!(config.dimension, DEFAULT_DIMENSION);
        assert_eq!(config.max_leaf_size, 16);
        assert_eq!(config.search_mode, SearchMode::Pruned);
    }

    #[test]
    fn toml_rejects_invalid_values() {
        assert!(IndexConfig::from_toml_str("dimension = 0").is_err());
        assert!(IndexConfig::from_toml_str("dimension = \"wide\"").is_err());
    }

    #[test]
    fn overrides_apply_and_ignore_garbage() {
        let vars: HashMap<&str, &str> = HashMap::from([
            (ENV_DIMENSION, "64"),
            (ENV_MAX_LEAF_SIZE, "lots"),
            (ENV_SEARCH_MODE, "Brute-Force"),
        ]);
        let config = IndexConfig::default()
            .search_mode(SearchMode::Pruned)
            .with_overrides_from(|key| vars.get(key).map(|v| (*v).to_string()));
        assert_eq!(config.dimension, 64);
        assert_eq!(config.max_leaf_size, DEFAULT_MAX_LEAF_SIZE);
        assert_eq!(config.search_mode, SearchMode::BruteForce);
    }
}
