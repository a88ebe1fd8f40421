use crate::error::IndexError;
use crate::store::{FlatIndex, IndexedChunk};

/// Owns the index exclusively while ingestion runs.
///
/// The first non-empty batch creates the index and fixes its dimension; every
/// later batch extends it. Nothing else can observe the index until
/// [`IndexBuilder::finish`] hands it over.
#[derive(Debug)]
pub struct IndexBuilder {
    embedding_model: String,
    index: Option<FlatIndex>,
}

impl IndexBuilder {
    #[must_use]
    pub fn new(embedding_model: impl Into<String>) -> Self {
        Self {
            embedding_model: embedding_model.into(),
            index: None,
        }
    }

    #[must_use]
    pub fn is_created(&self) -> bool {
        self.index.is_some()
    }

    /// Create the index from its first batch.
    ///
    /// # Errors
    ///
    /// Returns an error if the index already exists, the batch is empty, or the
    /// batch vectors disagree on dimension.
    pub fn create(&mut self, batch: Vec<(Vec<f32>, IndexedChunk)>) -> Result<(), IndexError> {
        if self.index.is_some() {
            return Err(IndexError::AlreadyCreated);
        }
        let dimension = batch
            .first()
            .map(|(v, _)| v.len())
            .ok_or(IndexError::EmptyBatch)?;
        let mut index = FlatIndex::new(self.embedding_model.clone(), dimension);
        index.add(batch)?;
        self.index = Some(index);
        Ok(())
    }

    /// Append a batch to an existing index.
    ///
    /// # Errors
    ///
    /// Returns an error if no index exists yet or a vector has the wrong dimension.
    pub fn extend(&mut self, batch: Vec<(Vec<f32>, IndexedChunk)>) -> Result<(), IndexError> {
        let index = self.index.as_mut().ok_or(IndexError::NotCreated)?;
        index.add(batch)
    }

    /// Create on the first call, extend afterwards.
    ///
    /// # Errors
    ///
    /// Propagates errors from [`IndexBuilder::create`] and [`IndexBuilder::extend`].
    pub fn add_group(&mut self, batch: Vec<(Vec<f32>, IndexedChunk)>) -> Result<(), IndexError> {
        if self.is_created() {
            self.extend(batch)
        } else {
            self.create(batch)
        }
    }

    #[must_use]
    pub fn finish(self) -> Option<FlatIndex> {
        self.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(v: Vec<f32>, text: &str) -> (Vec<f32>, IndexedChunk) {
        (
            v,
            IndexedChunk {
                text: text.into(),
                source: "S".into(),
                start_offset: 0,
            },
        )
    }

    #[test]
    fn create_then_extend() {
        let mut builder = IndexBuilder::new("m");
        assert!(!builder.is_created());
        builder.create(vec![entry(vec![1.0, 0.0], "a")]).unwrap();
        builder.extend(vec![entry(vec![0.0, 1.0], "b")]).unwrap();
        let index = builder.finish().unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index.dimension(), 2);
        assert_eq!(index.embedding_model(), "m");
    }

    #[test]
    fn extend_before_create_fails() {
        let mut builder = IndexBuilder::new("m");
        assert!(matches!(
            builder.extend(vec![entry(vec![1.0], "a")]),
            Err(IndexError::NotCreated)
        ));
    }

    #[test]
    fn create_twice_fails() {
        let mut builder = IndexBuilder::new("m");
        builder.create(vec![entry(vec![1.0], "a")]).unwrap();
        assert!(matches!(
            builder.create(vec![entry(vec![1.0], "b")]),
            Err(IndexError::AlreadyCreated)
        ));
    }

    #[test]
    fn empty_first_batch_fails() {
        let mut builder = IndexBuilder::new("m");
        assert!(matches!(builder.create(Vec::new()), Err(IndexError::EmptyBatch)));
        assert!(builder.finish().is_none());
    }

    #[test]
    fn add_group_dispatches() {
        let mut builder = IndexBuilder::new("m");
        builder.add_group(vec![entry(vec![1.0, 0.0], "a")]).unwrap();
        builder.add_group(vec![entry(vec![0.0, 1.0], "b")]).unwrap();
        assert!(builder.add_group(vec![entry(vec![1.0], "c")]).is_err());
        assert_eq!(builder.finish().unwrap().len(), 2);
    }
}
