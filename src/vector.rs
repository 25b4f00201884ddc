//! This is the vector math module
//! Provide normalization, dot product and the row-major embedding matrix

use crate::error::{ClassifierError, Result};
use serde::{Deserialize, Serialize};

/// Default squash constant applied before L2 normalization.
pub const DEFAULT_SCALE_DENOMINATOR: f32 = 300.0;

/// Scaled L2 Normalization
/// scaled = vec / scale_denominator
/// norm_vec = scaled / ||scaled||
///
/// Zero-norm policy: when `||scaled|| == 0` the vector is divided by 1
/// instead, so an all-zero embedding stays all-zero and never produces NaN.
/// Such a vector has similarity 0 with every stored example.
pub fn normalize(vector: &[f32], scale_denominator: f32) -> Vec<f32> {
    let scaled: Vec<f32> = vector.iter()
        .map(|x| x / scale_denominator)
        .collect();

    let norm = scaled.iter()
        .map(|x| x * x)
        .sum::<f32>()
        .sqrt();

    let norm = if norm == 0.0 { 1.0 } else { norm };

    scaled.iter()
        .map(|x| x / norm)
        .collect()
}

/// Dot Product
/// dot_prod = sum(a[i] * b[i]) for i = 0..a.len()
/// Can only process vectors with same dimensions
pub fn dot_product(left: &[f32], right: &[f32]) -> Result<f32> {
    if left.len() != right.len() {
        return Err(ClassifierError::DimensionMismatch {
            expected: left.len(),
            actual: right.len(),
        });
    }

    let dot_prod = left.iter()
        .zip(right.iter())
        .map(|(x, y)| x * y)
        .sum();

    Ok(dot_prod)
}

/// Rejects empty embeddings and embeddings carrying NaN or infinity.
pub fn validate_embedding(vector: &[f32]) -> Result<()> {
    if vector.is_empty() {
        return Err(ClassifierError::InvalidEmbedding("embedding is empty".to_string()));
    }
    if let Some(pos) = vector.iter().position(|x| !x.is_finite()) {
        return Err(ClassifierError::InvalidEmbedding(
            format!("non-finite value at position {}", pos),
        ));
    }
    Ok(())
}

/// Row-major matrix of embeddings, one example per row.
///
/// Rows are stored contiguously as `[r0_d0, r0_d1, ..., r1_d0, r1_d1, ...]`.
/// A matrix always has at least one row and a non-zero dimension.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingMatrix {
    data: Vec<f32>,
    dimension: usize,
}

impl EmbeddingMatrix {
    /// Creates a 1×D matrix from a single row.
    pub fn from_row(row: Vec<f32>) -> Result<Self> {
        validate_embedding(&row)?;
        let dimension = row.len();
        Ok(EmbeddingMatrix { data: row, dimension })
    }

    /// Wraps flat row-major data. Fails if `data` is empty, `dimension` is
    /// zero, or the length is not a whole number of rows.
    pub fn from_flat(data: Vec<f32>, dimension: usize) -> Result<Self> {
        if dimension == 0 {
            return Err(ClassifierError::MalformedPayload("dimension must be positive".to_string()));
        }
        if data.is_empty() || data.len() % dimension != 0 {
            return Err(ClassifierError::MalformedPayload(format!(
                "{} values do not form rows of dimension {}",
                data.len(),
                dimension
            )));
        }
        if data.iter().any(|x| !x.is_finite()) {
            return Err(ClassifierError::MalformedPayload("non-finite value in matrix".to_string()));
        }
        Ok(EmbeddingMatrix { data, dimension })
    }

    pub fn rows(&self) -> usize {
        self.data.len() / self.dimension
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// Slices row `index` out of the flat storage.
    ///
    /// # Panics
    ///
    /// Panics if `index >= self.rows()`.
    pub fn row(&self, index: usize) -> &[f32] {
        let start = index * self.dimension;
        &self.data[start..start + self.dimension]
    }

    pub fn iter_rows(&self) -> impl Iterator<Item = &[f32]> {
        self.data.chunks_exact(self.dimension)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn into_flat(self) -> Vec<f32> {
        self.data
    }

    /// Appends one row.
    pub fn push_row(&mut self, row: &[f32]) -> Result<()> {
        if row.len() != self.dimension {
            return Err(ClassifierError::DimensionMismatch {
                expected: self.dimension,
                actual: row.len(),
            });
        }
        self.data.extend_from_slice(row);
        Ok(())
    }
}

/// Appends the rows of `b` after the rows of `a`.
///
/// If one side is absent the other is returned as a copy; if both are absent
/// the result is `None`. Column counts must match.
pub fn concat_rows(
    a: Option<&EmbeddingMatrix>,
    b: Option<&EmbeddingMatrix>,
) -> Result<Option<EmbeddingMatrix>> {
    match (a, b) {
        (None, None) => Ok(None),
        (Some(a), None) => Ok(Some(a.clone())),
        (None, Some(b)) => Ok(Some(b.clone())),
        (Some(a), Some(b)) => {
            if a.dimension != b.dimension {
                return Err(ClassifierError::DimensionMismatch {
                    expected: a.dimension,
                    actual: b.dimension,
                });
            }
            let mut data = Vec::with_capacity(a.data.len() + b.data.len());
            data.extend_from_slice(&a.data);
            data.extend_from_slice(&b.data);
            Ok(Some(EmbeddingMatrix { data, dimension: a.dimension }))
        }
    }
}
