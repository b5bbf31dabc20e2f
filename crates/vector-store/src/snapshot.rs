use crate::config::IndexConfig;
use crate::error::{Result, VectorStoreError};
use crate::index::BallTreeIndex;
use crate::quantize::QuantizedVector;
use crate::types::{Entry, Metadata};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const SNAPSHOT_SCHEMA_VERSION: u32 = 1;

/// How vectors are written to a snapshot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VectorEncoding {
    #[default]
    F32,
    /// One signed byte per component; lossy, see [`crate::quantize`].
    QuantizedI8,
}

impl VectorEncoding {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::F32 => "f32",
            Self::QuantizedI8 => "quantized_i8",
        }
    }
}

/// Ordered export of an index plus the configuration needed to rebuild it.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSnapshot {
    pub config: IndexConfig,
    pub encoding: VectorEncoding,
    pub entries: Vec<Entry>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedSnapshot {
    schema_version: u32,
    config: IndexConfig,
    encoding: VectorEncoding,
    records: Vec<PersistedRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
struct PersistedRecord {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    codes: Option<QuantizedVector>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    metadata: Option<Metadata>,
}

impl IndexSnapshot {
    #[must_use]
    pub fn capture(index: &BallTreeIndex, encoding: VectorEncoding) -> Self {
        Self {
            config: index.config().clone(),
            encoding,
            entries: index.export(),
        }
    }

    /// Rebuild the index by replaying every entry.
    pub fn into_index(self) -> Result<BallTreeIndex> {
        BallTreeIndex::from_entries(self.config, self.entries)
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>> {
        let records = self
            .entries
            .iter()
            .map(|entry| {
                let (vector, codes) = match self.encoding {
                    VectorEncoding::F32 => (Some(entry.vector.clone()), None),
                    VectorEncoding::QuantizedI8 => {
                        (None, Some(QuantizedVector::encode(&entry.vector)))
                    }
                };
                PersistedRecord {
                    id: entry.id.clone(),
                    vector,
                    codes,
                    metadata: entry.metadata.clone(),
                }
            })
            .collect();
        let persisted = PersistedSnapshot {
            schema_version: SNAPSHOT_SCHEMA_VERSION,
            config: self.config.clone(),
            encoding: self.encoding,
            records,
        };
        Ok(serde_json::to_vec_pretty(&persisted)?)
    }

    pub fn from_json_slice(bytes: &[u8]) -> Result<Self> {
        let persisted: PersistedSnapshot = serde_json::from_slice(bytes)?;
        if persisted.schema_version != SNAPSHOT_SCHEMA_VERSION {
            return Err(VectorStoreError::UnsupportedSchema {
                found: persisted.schema_version,
                expected: SNAPSHOT_SCHEMA_VERSION,
            });
        }
        persisted.config.validate()?;

        let encoding = persisted.encoding;
        let entries = persisted
            .records
            .into_iter()
            .map(|record| {
                let vector = match (encoding, record.vector, record.codes) {
                    (VectorEncoding::F32, Some(vector), _) => vector,
                    (VectorEncoding::QuantizedI8, _, Some(codes)) => codes.dequantize(),
                    _ => {
                        return Err(VectorStoreError::CorruptSnapshot(format!(
                            "record '{}' has no {encoding:?} vector",
                            record.id
                        )))
                    }
                };
                Ok(Entry {
                    id: record.id,
                    vector,
                    metadata: record.metadata,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            config: persisted.config,
            encoding,
            entries,
        })
    }

    /// Write atomically: serialize to a sibling temp file, then rename over `path`.
    pub async fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        log::info!(
            "Saving snapshot ({} entries, {:?}) to {:?}",
            self.entries.len(),
            self.encoding,
            path
        );
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        let bytes = self.to_json_bytes()?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        let snapshot = Self::from_json_slice(&bytes)?;
        log::info!(
            "Loaded snapshot with {} entries from {:?}",
            snapshot.entries.len(),
            path
        );
        Ok(snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::Metric;
    use crate::quantize::MAX_COMPONENT_ERROR;
    use tempfile::TempDir;

    fn sample_index() -> BallTreeIndex {
        let mut index =
            BallTreeIndex::new(IndexConfig::with_dimension(3).max_leaf_size(2)).unwrap();
        let mut meta = Metadata::new();
        meta.insert("lang".to_string(), serde_json::json!("en"));
        index
            .insert("a", vec![0.1, 0.2, 0.3], Some(meta))
            .unwrap();
        index.insert("b", vec![-0.5, 0.25, 0.9], None).unwrap();
        index.insert("c", vec![0.7, -0.7, 0.0], None).unwrap();
        index
    }

    #[tokio::test]
    async fn snapshot_roundtrip_rebuilds_equivalent_index() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("nested").join("index.json");

        let index = sample_index();
        IndexSnapshot::capture(&index, VectorEncoding::F32)
            .save(&path)
            .await
            .unwrap();

        let loaded = IndexSnapshot::load(&path).await.unwrap();
        assert_eq!(loaded.entries, index.export());
        let rebuilt = loaded.into_index().unwrap();
        assert_eq!(rebuilt.stats(), index.stats());
        assert_eq!(
            rebuilt.get("a").and_then(|e| e.metadata.as_ref()).map(|m| m["lang"].clone()),
            Some(serde_json::json!("en"))
        );
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn quantized_snapshot_stays_within_error_bound() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("index.json");

        let index = sample_index();
        IndexSnapshot::capture(&index, VectorEncoding::QuantizedI8)
            .save(&path)
            .await
            .unwrap();

        let loaded = IndexSnapshot::load(&path).await.unwrap();
        assert_eq!(loaded.encoding, VectorEncoding::QuantizedI8);
        for (restored, original) in loaded.entries.iter().zip(index.entries()) {
            assert_eq!(restored.id, original.id);
            for (r, o) in restored.vector.iter().zip(&original.vector) {
                assert!((r - o).abs() <= MAX_COMPONENT_ERROR + 1e-6);
            }
        }

        let rebuilt = loaded.into_index().unwrap();
        let hits = rebuilt.search(&[0.1, 0.2, 0.3], 1, Metric::Euclidean).unwrap();
        assert_eq!(hits[0].entry.id, "a");
    }

    #[test]
    fn rejects_unknown_schema_version() {
        let raw = br#"{"schema_version":99,"config":{},"encoding":"f32","records":[]}"#;
        let err = IndexSnapshot::from_json_slice(raw).unwrap_err();
        assert!(matches!(
            err,
            VectorStoreError::UnsupportedSchema { found: 99, .. }
        ));
    }

    #[test]
    fn rejects_record_without_vector() {
        let raw = br#"{"schema_version":1,"config":{"dimension":2},"encoding":"quantized_i8","records":[{"id":"x","vector":[0.1,0.2]}]}"#;
        let err = IndexSnapshot::from_json_slice(raw).unwrap_err();
        assert!(matches!(err, VectorStoreError::CorruptSnapshot(_)));
    }
}
