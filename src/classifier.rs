//! The classifier module
//! K-nearest-neighbour voting over the examples held by a [`ClassStore`]

use crate::error::{ClassifierError, Result};
use crate::store::ClassStore;
use crate::vector::{concat_rows, dot_product, normalize, validate_embedding, EmbeddingMatrix};
use serde::Serialize;
use std::cmp::Ordering;
use tracing::{debug, info, warn};

/// Default number of neighbours consulted per prediction.
pub const DEFAULT_TOP_K: usize = 10;

/// Outcome of classifying one embedding.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Prediction {
    /// Winning slot, `None` when no class holds any example.
    pub class_index: Option<usize>,
    /// Fraction of the K neighbours per slot; `None` for slots without examples.
    pub confidences: Vec<Option<f32>>,
}

impl Prediction {
    /// The "no prediction" result: no class, no confidences.
    pub fn empty(num_classes: usize) -> Prediction {
        Prediction { class_index: None, confidences: vec![None; num_classes] }
    }
}

/// The K best entries of a similarity vector, best first.
#[derive(Debug, Clone, PartialEq)]
pub struct TopK {
    pub indices: Vec<usize>,
    pub values: Vec<f32>,
}

/// Training matrix cache. `dirty` is raised by every store mutation and the
/// matrix is rebuilt on the next read.
#[derive(Debug)]
struct TrainingCache {
    matrix: Option<EmbeddingMatrix>,
    dirty: bool,
}

/// Online KNN classifier over a fixed number of class slots.
///
/// Nothing is accepted until [`load`](KnnClassifier::load) reports that the
/// embedding extractor is ready and what dimension it produces.
///
/// # Examples
///
/// ```
/// use knnclass::KnnClassifier;
///
/// let mut knn = KnnClassifier::new(2, 1, 300.0);
/// knn.load(3);
///
/// knn.add_example(0, &[1.0, 0.0, 0.0]).unwrap();
/// knn.add_example(1, &[0.0, 1.0, 0.0]).unwrap();
///
/// let prediction = knn.predict(&[0.9, 0.1, 0.0]).unwrap();
/// assert_eq!(prediction.class_index, Some(0));
/// ```
#[derive(Debug)]
pub struct KnnClassifier {
    store: ClassStore,
    k: usize,
    scale_denominator: f32,
    dimension: Option<usize>,
    cache: TrainingCache,
}

impl KnnClassifier {
    pub fn new(num_classes: usize, k: usize, scale_denominator: f32) -> KnnClassifier {
        KnnClassifier {
            store: ClassStore::new(num_classes, scale_denominator),
            k,
            scale_denominator,
            dimension: None,
            cache: TrainingCache { matrix: None, dirty: true },
        }
    }

    /// Marks the embedding extractor as loaded. Every embedding accepted from
    /// now on must have `dimension` values.
    pub fn load(&mut self, dimension: usize) {
        self.dimension = Some(dimension);
        info!(dimension, num_classes = self.num_classes(), k = self.k, "classifier ready");
    }

    pub fn is_ready(&self) -> bool {
        self.dimension.is_some()
    }

    /// Extractor output dimension, once loaded.
    pub fn dimension(&self) -> Option<usize> {
        self.dimension
    }

    pub fn num_classes(&self) -> usize {
        self.store.num_classes()
    }

    pub fn store(&self) -> &ClassStore {
        &self.store
    }

    /// Adds one training example to `slot`.
    ///
    /// Rejections (not ready, bad slot, bad embedding) are logged as warnings
    /// and leave the store untouched.
    pub fn add_example(&mut self, slot: usize, embedding: &[f32]) -> Result<()> {
        let result = self.check_embedding(embedding)
            .and_then(|_| self.store.add(slot, embedding));

        match result {
            Ok(()) => {
                self.invalidate();
                Ok(())
            }
            Err(e) => {
                warn!(slot, error = %e, "cannot add example");
                Err(e)
            }
        }
    }

    /// Empties `slot`.
    pub fn clear_class(&mut self, slot: usize) -> Result<()> {
        if let Err(e) = self.store.clear(slot) {
            warn!(slot, error = %e, "cannot clear class");
            return Err(e);
        }
        self.invalidate();
        Ok(())
    }

    /// Bulk-loads already-normalized embeddings into `slot`.
    pub fn replace_class(&mut self, slot: usize, matrix: Option<EmbeddingMatrix>) -> Result<()> {
        if !self.is_ready() {
            warn!(slot, "cannot load embeddings until the extractor is ready");
            return Err(ClassifierError::NotReady);
        }
        if let (Some(expected), Some(m)) = (self.dimension, matrix.as_ref()) {
            if m.dimension() != expected {
                return Err(ClassifierError::DimensionMismatch { expected, actual: m.dimension() });
            }
        }
        self.store.replace(slot, matrix)?;
        self.invalidate();
        Ok(())
    }

    /// Classifies `query` by voting among its K nearest stored examples.
    pub fn predict(&mut self, query: &[f32]) -> Result<Prediction> {
        self.check_embedding(query)?;
        validate_embedding(query)?;

        let counts = self.store.example_counts();
        let total: usize = counts.iter().sum();
        if total == 0 {
            warn!("cannot predict, no training examples");
            return Ok(Prediction::empty(counts.len()));
        }

        let normed = normalize(query, self.scale_denominator);
        let similarities = match self.training_matrix()? {
            Some(matrix) => similarity(&normed, matrix)?,
            None => return Ok(Prediction::empty(counts.len())),
        };

        let k = self.k.min(total);
        let top = top_k(&similarities, k);
        let prediction = class_by_vote(&top.indices, &counts, k);
        debug!(class_index = ?prediction.class_index, k, total, "prediction");
        Ok(prediction)
    }

    /// The concatenation of all non-empty slots in slot order, rebuilt only
    /// after a mutation.
    pub fn training_matrix(&mut self) -> Result<Option<&EmbeddingMatrix>> {
        if self.cache.dirty {
            self.cache.matrix = build_training_matrix(&self.store)?;
            self.cache.dirty = false;
            debug!(rows = self.cache.matrix.as_ref().map_or(0, EmbeddingMatrix::rows), "rebuilt training matrix");
        }
        Ok(self.cache.matrix.as_ref())
    }

    fn invalidate(&mut self) {
        self.cache.matrix = None;
        self.cache.dirty = true;
    }

    fn check_embedding(&self, embedding: &[f32]) -> Result<()> {
        match self.dimension {
            None => Err(ClassifierError::NotReady),
            Some(expected) if embedding.len() != expected => {
                Err(ClassifierError::DimensionMismatch { expected, actual: embedding.len() })
            }
            Some(_) => Ok(()),
        }
    }
}

/// Concatenates every non-empty slot matrix in ascending slot order.
pub fn build_training_matrix(store: &ClassStore) -> Result<Option<EmbeddingMatrix>> {
    let mut acc: Option<EmbeddingMatrix> = None;
    for matrix in store.matrices() {
        acc = concat_rows(acc.as_ref(), Some(matrix))?;
    }
    Ok(acc)
}

/// Dot product of a normalized query with every row of `matrix`, in row
/// order. Equals cosine similarity because all rows are unit length.
pub fn similarity(query: &[f32], matrix: &EmbeddingMatrix) -> Result<Vec<f32>> {
    matrix.iter_rows()
        .map(|row| dot_product(row, query))
        .collect()
}

/// Indices and values of the `k` largest entries, largest first.
///
/// Equal values keep their original relative order; `-0.0` and `0.0` are
/// equal.
pub fn top_k(values: &[f32], k: usize) -> TopK {
    let mut ranked: Vec<(usize, f32)> = values.iter().copied().enumerate().collect();
    // sort_by is stable
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
    ranked.truncate(k);

    TopK {
        indices: ranked.iter().map(|(i, _)| *i).collect(),
        values: ranked.iter().map(|(_, v)| *v).collect(),
    }
}

/// Tallies the owning slot of every neighbour and turns the tallies into
/// per-slot confidences.
///
/// Slot `c` owns global rows `[sum(counts[..c]), sum(counts[..=c]))`. Slots
/// without examples get no confidence and never win. The winner is the first
/// slot whose confidence is strictly greater than every earlier one.
pub fn class_by_vote(top_indices: &[usize], counts: &[usize], k: usize) -> Prediction {
    let boundaries: Vec<usize> = counts.iter()
        .scan(0, |acc, c| {
            *acc += c;
            Some(*acc)
        })
        .collect();

    let mut tally = vec![0usize; counts.len()];
    for &index in top_indices {
        if let Some(slot) = boundaries.iter().position(|&b| index < b) {
            tally[slot] += 1;
        }
    }

    let mut prediction = Prediction::empty(counts.len());
    if k == 0 {
        return prediction;
    }

    let mut top_confidence = 0.0;
    for (slot, &count) in counts.iter().enumerate() {
        if count == 0 {
            continue;
        }
        let confidence = tally[slot] as f32 / k as f32;
        if confidence > top_confidence {
            top_confidence = confidence;
            prediction.class_index = Some(slot);
        }
        prediction.confidences[slot] = Some(confidence);
    }
    prediction
}

#[cfg(test)]
mod classifier_test {
    use super::*;

    fn ready(num_classes: usize, k: usize, dim: usize) -> KnnClassifier {
        let mut knn = KnnClassifier::new(num_classes, k, 300.0);
        knn.load(dim);
        knn
    }

    // ========== Load Gate Tests ==========

    #[test]
    fn test_add_before_load_is_rejected() {
        let mut knn = KnnClassifier::new(3, 10, 300.0);

        assert_eq!(knn.add_example(0, &[1.0, 0.0]), Err(ClassifierError::NotReady));
        assert_eq!(knn.store().total_examples(), 0);
    }

    #[test]
    fn test_predict_before_load_fails() {
        let mut knn = KnnClassifier::new(3, 10, 300.0);

        assert_eq!(knn.predict(&[1.0, 0.0]), Err(ClassifierError::NotReady));
    }

    #[test]
    fn test_replace_before_load_fails() {
        let mut knn = KnnClassifier::new(3, 10, 300.0);
        let m = EmbeddingMatrix::from_row(vec![1.0, 0.0]).unwrap();

        assert_eq!(knn.replace_class(0, Some(m)), Err(ClassifierError::NotReady));
    }

    #[test]
    fn test_add_wrong_dimension_is_rejected() {
        let mut knn = ready(2, 10, 3);

        assert!(knn.add_example(0, &[1.0, 0.0]).is_err());
        assert!(knn.add_example(7, &[1.0, 0.0, 0.0]).is_err());
        assert_eq!(knn.store().total_examples(), 0);
    }

    // ========== Prediction Tests ==========

    #[test]
    fn test_predict_without_examples() {
        let mut knn = ready(3, 10, 2);
        let prediction = knn.predict(&[0.3, 0.1]).unwrap();

        assert_eq!(prediction.class_index, None);
        assert_eq!(prediction.confidences, vec![None, None, None]);
    }

    #[test]
    fn test_single_class_is_unanimous() {
        let mut knn = ready(3, 10, 3);
        knn.add_example(1, &[1.0, 0.0, 0.0]).unwrap();
        knn.add_example(1, &[0.9, 0.1, 0.0]).unwrap();

        for query in [[0.0, 0.0, 1.0], [-1.0, 5.0, 2.0], [0.0, 0.0, 0.0]] {
            let prediction = knn.predict(&query).unwrap();
            assert_eq!(prediction.class_index, Some(1));
            assert_eq!(prediction.confidences, vec![None, Some(1.0), None]);
        }
    }

    #[test]
    fn test_predict_nearest_class() {
        let mut knn = ready(3, 5, 3);
        for _ in 0..5 {
            knn.add_example(0, &[1.0, 0.0, 0.0]).unwrap();
            knn.add_example(2, &[0.0, 1.0, 0.0]).unwrap();
        }

        let prediction = knn.predict(&[0.0, 1.0, 0.1]).unwrap();
        assert_eq!(prediction.class_index, Some(2));
        assert_eq!(prediction.confidences, vec![Some(0.0), None, Some(1.0)]);
    }

    #[test]
    fn test_all_examples_voting_ties_to_lowest_slot() {
        let mut knn = ready(3, 10, 3);
        for _ in 0..5 {
            knn.add_example(0, &[1.0, 0.0, 0.0]).unwrap();
            knn.add_example(2, &[0.0, 1.0, 0.0]).unwrap();
        }

        let prediction = knn.predict(&[0.0, 1.0, 0.1]).unwrap();
        assert_eq!(prediction.class_index, Some(0));
        assert_eq!(prediction.confidences, vec![Some(0.5), None, Some(0.5)]);
    }

    #[test]
    fn test_k_limits_votes() {
        let mut knn = ready(2, 3, 2);
        for _ in 0..5 {
            knn.add_example(0, &[1.0, 0.0]).unwrap();
            knn.add_example(1, &[0.0, 1.0]).unwrap();
        }

        let prediction = knn.predict(&[1.0, 0.05]).unwrap();
        assert_eq!(prediction.class_index, Some(0));
        assert_eq!(prediction.confidences, vec![Some(1.0), Some(0.0)]);
    }

    #[test]
    fn test_cache_rebuilds_after_mutation() {
        let mut knn = ready(2, 10, 2);
        knn.add_example(0, &[1.0, 0.0]).unwrap();
        assert_eq!(knn.training_matrix().unwrap().unwrap().rows(), 1);

        knn.add_example(1, &[0.0, 1.0]).unwrap();
        assert_eq!(knn.training_matrix().unwrap().unwrap().rows(), 2);

        knn.clear_class(0).unwrap();
        let matrix = knn.training_matrix().unwrap().unwrap();
        assert_eq!(matrix.rows(), 1);
        assert!((matrix.row(0)[1] - 1.0).abs() < 1e-6);

        knn.clear_class(1).unwrap();
        assert!(knn.training_matrix().unwrap().is_none());
    }

    #[test]
    fn test_replace_class_feeds_prediction() {
        let mut knn = ready(2, 10, 2);
        let m = EmbeddingMatrix::from_flat(vec![0.0, 1.0, 0.0, 1.0], 2).unwrap();
        knn.replace_class(1, Some(m)).unwrap();

        assert_eq!(knn.store().example_counts(), vec![0, 2]);
        assert_eq!(knn.predict(&[0.0, 3.0]).unwrap().class_index, Some(1));

        let wrong = EmbeddingMatrix::from_row(vec![1.0, 0.0, 0.0]).unwrap();
        assert!(knn.replace_class(0, Some(wrong)).is_err());
    }

    // ========== Top-K Tests ==========

    #[test]
    fn test_top_k_descending() {
        let top = top_k(&[0.1, 0.9, 0.5, 0.7], 3);

        assert_eq!(top.indices, vec![1, 3, 2]);
        assert_eq!(top.values, vec![0.9, 0.7, 0.5]);
    }

    #[test]
    fn test_top_k_ties_keep_order() {
        let top = top_k(&[0.5, 0.8, 0.5, 0.8, 0.5], 4);

        assert_eq!(top.indices, vec![1, 3, 0, 2]);
    }

    #[test]
    fn test_top_k_signed_zeros_tie() {
        let top = top_k(&[-0.0, 0.0], 1);
        assert_eq!(top.indices, vec![0]);
    }

    #[test]
    fn test_zero_query_ties_to_lowest_slot() {
        let mut knn = ready(2, 1, 2);
        knn.add_example(0, &[-1.0, -1.0]).unwrap();
        knn.add_example(1, &[1.0, 1.0]).unwrap();

        let prediction = knn.predict(&[0.0, 0.0]).unwrap();
        assert_eq!(prediction.class_index, Some(0));
        assert_eq!(prediction.confidences, vec![Some(1.0), Some(0.0)]);
    }

    #[test]
    fn test_predict_rejects_non_finite_query() {
        let mut knn = ready(2, 1, 2);
        knn.add_example(0, &[1.0, 0.0]).unwrap();
        knn.add_example(1, &[0.0, 1.0]).unwrap();

        assert!(matches!(knn.predict(&[f32::NAN, 1.0]), Err(ClassifierError::InvalidEmbedding(_))));
        assert!(matches!(knn.predict(&[f32::INFINITY, 0.0]), Err(ClassifierError::InvalidEmbedding(_))));
    }

    #[test]
    fn test_top_k_larger_than_input() {
        let top = top_k(&[0.2, 0.1], 5);
        assert_eq!(top.indices, vec![0, 1]);
    }

    // ========== Vote Tests ==========

    #[test]
    fn test_vote_maps_boundaries() {
        // slot 0 owns rows 0..2, slot 1 none, slot 2 owns rows 2..5
        let prediction = class_by_vote(&[4, 0, 3, 2], &[2, 0, 3], 4);

        assert_eq!(prediction.class_index, Some(2));
        assert_eq!(prediction.confidences, vec![Some(0.25), None, Some(0.75)]);
    }

    #[test]
    fn test_vote_tie_keeps_lowest_slot() {
        let prediction = class_by_vote(&[3, 0, 2, 1], &[2, 2], 4);

        assert_eq!(prediction.class_index, Some(0));
        assert_eq!(prediction.confidences, vec![Some(0.5), Some(0.5)]);
    }

    #[test]
    fn test_vote_empty() {
        let prediction = class_by_vote(&[], &[0, 0], 0);
        assert_eq!(prediction, Prediction::empty(2));
    }

    #[test]
    fn test_similarity_row_order() {
        let m = EmbeddingMatrix::from_flat(vec![1.0, 0.0, 0.0, 1.0], 2).unwrap();
        let sims = similarity(&[0.6, 0.8], &m).unwrap();

        assert_eq!(sims.len(), 2);
        assert!((sims[0] - 0.6).abs() < 1e-6);
        assert!((sims[1] - 0.8).abs() < 1e-6);
    }
}
