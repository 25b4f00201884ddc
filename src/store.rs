//! The class store module
//! Owns the per-slot embedding matrices

use crate::error::{ClassifierError, Result};
use crate::vector::{normalize, validate_embedding, EmbeddingMatrix};

/// Fixed-size array of class slots, each holding the normalized embeddings
/// taught for that class.
///
/// A slot's example count is the row count of its matrix, so the two can
/// never disagree. Embeddings are normalized on insertion; matrices loaded
/// through [`replace`](ClassStore::replace) are stored as given.
#[derive(Debug, Clone)]
pub struct ClassStore {
    slots: Vec<Option<EmbeddingMatrix>>,
    scale_denominator: f32,
}

impl ClassStore {
    /// Creates a store with `num_classes` empty slots.
    ///
    /// # Examples
    ///
    /// ```
    /// use knnclass::ClassStore;
    ///
    /// let store = ClassStore::new(3, 300.0);
    /// assert_eq!(store.example_counts(), vec![0, 0, 0]);
    /// ```
    pub fn new(num_classes: usize, scale_denominator: f32) -> ClassStore {
        ClassStore { slots: vec![None; num_classes], scale_denominator }
    }

    pub fn num_classes(&self) -> usize {
        self.slots.len()
    }

    /// Normalizes `embedding` and appends it as a new row of `slot`.
    ///
    /// The first row creates a 1×D matrix; later rows must have the same
    /// dimension.
    ///
    /// # Examples
    ///
    /// ```
    /// use knnclass::ClassStore;
    ///
    /// let mut store = ClassStore::new(2, 300.0);
    /// store.add(1, &[3.0, 4.0]).unwrap();
    /// store.add(1, &[1.0, 0.0]).unwrap();
    /// assert_eq!(store.example_counts(), vec![0, 2]);
    ///
    /// // Out-of-range slot
    /// assert!(store.add(5, &[1.0, 0.0]).is_err());
    /// ```
    pub fn add(&mut self, slot: usize, embedding: &[f32]) -> Result<()> {
        self.check_slot(slot)?;
        validate_embedding(embedding)?;

        let normed = normalize(embedding, self.scale_denominator);
        match &mut self.slots[slot] {
            Some(matrix) => matrix.push_row(&normed)?,
            empty => *empty = Some(EmbeddingMatrix::from_row(normed)?),
        }
        Ok(())
    }

    /// Drops every example stored in `slot`.
    pub fn clear(&mut self, slot: usize) -> Result<()> {
        self.check_slot(slot)?;
        self.slots[slot] = None;
        Ok(())
    }

    /// Replaces the whole contents of `slot`. `None` empties it.
    pub fn replace(&mut self, slot: usize, matrix: Option<EmbeddingMatrix>) -> Result<()> {
        self.check_slot(slot)?;
        self.slots[slot] = matrix;
        Ok(())
    }

    /// Example count per slot, in slot order.
    pub fn example_counts(&self) -> Vec<usize> {
        self.slots.iter()
            .map(|s| s.as_ref().map_or(0, EmbeddingMatrix::rows))
            .collect()
    }

    /// Example count of one slot; 0 for an out-of-range slot.
    pub fn example_count(&self, slot: usize) -> usize {
        self.slots.get(slot)
            .and_then(Option::as_ref)
            .map_or(0, EmbeddingMatrix::rows)
    }

    pub fn total_examples(&self) -> usize {
        self.example_counts().iter().sum()
    }

    /// True when no slot holds any example.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    pub fn matrix(&self, slot: usize) -> Option<&EmbeddingMatrix> {
        self.slots.get(slot).and_then(Option::as_ref)
    }

    /// Non-empty slot matrices in ascending slot order.
    pub fn matrices(&self) -> impl Iterator<Item = &EmbeddingMatrix> {
        self.slots.iter().flatten()
    }

    /// Flat row-major contents of `slot`, empty for an empty slot.
    pub fn serialize_slot(&self, slot: usize) -> Result<Vec<f32>> {
        self.check_slot(slot)?;
        Ok(self.slots[slot]
            .as_ref()
            .map(|m| m.as_slice().to_vec())
            .unwrap_or_default())
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.slots.len() {
            return Err(ClassifierError::InvalidSlot { slot, num_classes: self.slots.len() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod store_test {
    use super::*;

    #[test]
    fn test_add_normalizes_rows() {
        let mut store = ClassStore::new(3, 300.0);
        store.add(0, &[3.0, 4.0]).unwrap();

        let row = store.matrix(0).unwrap().row(0);
        assert!((row[0] - 0.6).abs() < 1e-5);
        assert!((row[1] - 0.8).abs() < 1e-5);
    }

    #[test]
    fn test_counts_after_adds() {
        let mut store = ClassStore::new(4, 300.0);
        for _ in 0..7 {
            store.add(2, &[1.0, 2.0, 3.0]).unwrap();
        }

        assert_eq!(store.example_counts(), vec![0, 0, 7, 0]);
        assert_eq!(store.total_examples(), 7);
        assert!(!store.is_empty());
    }

    #[test]
    fn test_add_invalid_slot() {
        let mut store = ClassStore::new(2, 300.0);
        let result = store.add(2, &[1.0, 0.0]);

        assert_eq!(result.unwrap_err(), ClassifierError::InvalidSlot { slot: 2, num_classes: 2 });
        assert!(store.is_empty());
    }

    #[test]
    fn test_add_dimension_mismatch_keeps_slot() {
        let mut store = ClassStore::new(2, 300.0);
        store.add(0, &[1.0, 0.0]).unwrap();

        assert!(store.add(0, &[1.0, 0.0, 0.0]).is_err());
        assert_eq!(store.example_count(0), 1);
    }

    #[test]
    fn test_clear_slot() {
        let mut store = ClassStore::new(2, 300.0);
        store.add(0, &[1.0, 0.0]).unwrap();
        store.add(1, &[0.0, 1.0]).unwrap();

        store.clear(0).unwrap();
        assert_eq!(store.example_counts(), vec![0, 1]);
        assert!(store.matrix(0).is_none());
        assert!(store.clear(9).is_err());
    }

    #[test]
    fn test_replace_sets_count_from_rows() {
        let mut store = ClassStore::new(2, 300.0);
        store.add(1, &[1.0, 0.0]).unwrap();

        let m = EmbeddingMatrix::from_flat(vec![0.6, 0.8, 1.0, 0.0, 0.0, 1.0], 2).unwrap();
        store.replace(1, Some(m)).unwrap();
        assert_eq!(store.example_count(1), 3);

        store.replace(1, None).unwrap();
        assert_eq!(store.example_count(1), 0);
    }

    #[test]
    fn test_serialize_slot() {
        let mut store = ClassStore::new(2, 300.0);
        store.add(0, &[3.0, 4.0]).unwrap();
        store.add(0, &[0.0, 2.0]).unwrap();

        let flat = store.serialize_slot(0).unwrap();
        assert_eq!(flat.len(), 4);
        assert!((flat[2] - 0.0).abs() < 1e-6);
        assert!((flat[3] - 1.0).abs() < 1e-6);

        assert!(store.serialize_slot(1).unwrap().is_empty());
        assert!(store.serialize_slot(2).is_err());
    }

    #[test]
    fn test_matrices_in_slot_order() {
        let mut store = ClassStore::new(3, 1.0);
        store.add(2, &[0.0, 1.0]).unwrap();
        store.add(0, &[1.0, 0.0]).unwrap();

        let firsts: Vec<f32> = store.matrices().map(|m| m.row(0)[0]).collect();
        assert_eq!(firsts, vec![1.0, 0.0]);
    }
}
