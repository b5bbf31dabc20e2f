use crate::error::{check_vector, Result};
use crate::types::{Entry, Metadata};

/// Authoritative, insertion-ordered list of entries.
///
/// Ids are not deduplicated: inserting an existing id appends a second entry that
/// carries the same id. [`VectorStore::get`] returns the earliest one.
#[derive(Debug, Clone)]
pub struct VectorStore {
    dimension: usize,
    entries: Vec<Entry>,
}

impl VectorStore {
    #[must_use]
    pub const fn new(dimension: usize) -> Self {
        Self {
            dimension,
            entries: Vec::new(),
        }
    }

    /// Append an entry and return its ordinal (position in insertion order).
    pub fn insert(
        &mut self,
        id: impl Into<String>,
        vector: Vec<f32>,
        metadata: Option<Metadata>,
    ) -> Result<usize> {
        check_vector(&vector, self.dimension)?;
        let ordinal = self.entries.len();
        self.entries.push(Entry {
            id: id.into(),
            vector,
            metadata,
        });
        Ok(ordinal)
    }

    /// First entry with `id`, in insertion order.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    /// Every entry tagged with `id`, in insertion order.
    pub fn get_all<'a>(&'a self, id: &'a str) -> impl Iterator<Item = &'a Entry> + 'a {
        self.entries.iter().filter(move |entry| entry.id == id)
    }

    pub fn all(&self) -> std::slice::Iter<'_, Entry> {
        self.entries.iter()
    }

    pub(crate) fn entry_at(&self, ordinal: usize) -> &Entry {
        &self.entries[ordinal]
    }

    pub(crate) fn vector_at(&self, ordinal: usize) -> &[f32] {
        &self.entries[ordinal].vector
    }

    #[must_use]
    pub const fn dimension(&self) -> usize {
        self.dimension
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut store = VectorStore::new(2);
        assert_eq!(store.insert("a", vec![1.0, 0.0], None).unwrap(), 0);
        assert_eq!(store.insert("b", vec![0.0, 1.0], None).unwrap(), 1);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("b").unwrap().vector, vec![0.0, 1.0]);
        assert!(store.get("missing").is_none());

        let ids: Vec<&str> = store.all().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let mut store = VectorStore::new(3);
        let err = store.insert("a", vec![1.0, 0.0], None).unwrap_err();
        assert!(err.is_dimension_mismatch());
        assert!(store.is_empty());
    }

    #[test]
    fn rejects_non_finite_components() {
        let mut store = VectorStore::new(2);
        assert!(store.insert("nan", vec![f32::NAN, 0.0], None).is_err());
        assert!(store.insert("inf", vec![0.0, f32::INFINITY], None).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn duplicate_ids_are_kept_as_separate_entries() {
        let mut store = VectorStore::new(1);
        store.insert("dup", vec![1.0], None).unwrap();
        store.insert("dup", vec![2.0], None).unwrap();

        assert_eq!(store.len(), 2);
        assert_eq!(store.get("dup").unwrap().vector, vec![1.0]);
        let all: Vec<f32> = store.get_all("dup").map(|e| e.vector[0]).collect();
        assert_eq!(all, vec![1.0, 2.0]);
    }

    #[test]
    fn clear_drops_everything() {
        let mut store = VectorStore::new(1);
        store.insert("a", vec![1.0], None).unwrap();
        store.clear();
        assert!(store.is_empty());
        assert!(store.get("a").is_none());
        assert_eq!(store.all().count(), 0);
    }
}
