use thiserror::Error;

pub type Result<T> = std::result::Result<T, VectorStoreError>;

#[derive(Error, Debug)]
pub enum VectorStoreError {
    #[error("Invalid vector dimension: expected {expected}, got {actual}")]
    InvalidDimension { expected: usize, actual: usize },

    #[error("Vector component {index} is not finite")]
    NonFiniteComponent { index: usize },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsupported snapshot schema_version {found} (expected {expected})")]
    UnsupportedSchema { found: u32, expected: u32 },

    #[error("Corrupt snapshot: {0}")]
    CorruptSnapshot(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}

impl VectorStoreError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// True for errors caused by a vector of the wrong length.
    #[must_use]
    pub const fn is_dimension_mismatch(&self) -> bool {
        matches!(self, Self::InvalidDimension { .. })
    }
}

/// Checks length and finiteness of a caller-supplied vector.
pub(crate) fn check_vector(vector: &[f32], dimension: usize) -> Result<()> {
    if vector.len() != dimension {
        return Err(VectorStoreError::InvalidDimension {
            expected: dimension,
            actual: vector.len(),
        });
    }
    if let Some(index) = vector.iter().position(|v| !v.is_finite()) {
        return Err(VectorStoreError::NonFiniteComponent { index });
    }
    Ok(())
}
