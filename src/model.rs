//! Saved model payloads.
//!
//! A model is the raw embedding matrix of every bound label, nothing more.
//! Payloads travel as JSON between a host and the session, and are written to
//! disk with bincode.

use crate::error::{ClassifierError, Result};
use crate::vector::EmbeddingMatrix;
use serde::{Deserialize, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    path::Path,
};

/// One label and its flat row-major embeddings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedClass {
    pub label: String,
    pub embeddings: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelPayload {
    /// Columns per embedding row
    pub dimension: usize,
    /// Classes in ascending slot order at save time
    pub classes: Vec<SavedClass>,
}

impl ModelPayload {
    /// Checks every class and turns its data into a matrix.
    ///
    /// Nothing is returned unless the whole payload is well formed: labels
    /// must be non-empty and distinct, and every class must hold whole rows
    /// of `dimension` values. A class with no values yields `None`.
    pub fn decode(&self) -> Result<Vec<(String, Option<EmbeddingMatrix>)>> {
        if self.dimension == 0 {
            return Err(ClassifierError::MalformedPayload("dimension must be positive".to_string()));
        }

        let mut decoded: Vec<(String, Option<EmbeddingMatrix>)> = Vec::with_capacity(self.classes.len());
        for class in &self.classes {
            if class.label.is_empty() {
                return Err(ClassifierError::MalformedPayload("empty label".to_string()));
            }
            if decoded.iter().any(|(label, _)| label == &class.label) {
                return Err(ClassifierError::MalformedPayload(format!("duplicate label '{}'", class.label)));
            }

            let matrix = if class.embeddings.is_empty() {
                None
            } else {
                let m = EmbeddingMatrix::from_flat(class.embeddings.clone(), self.dimension)
                    .map_err(|e| ClassifierError::MalformedPayload(format!("label '{}': {}", class.label, e)))?;
                Some(m)
            };
            decoded.push((class.label.clone(), matrix));
        }
        Ok(decoded)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| ClassifierError::MalformedPayload(e.to_string()))
    }

    /// Writes the payload to `path` with bincode.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use knnclass::{ModelPayload, SavedClass};
    ///
    /// let payload = ModelPayload {
    ///     dimension: 2,
    ///     classes: vec![SavedClass { label: "cat".to_string(), embeddings: vec![0.6, 0.8] }],
    /// };
    /// payload.save("cat.model").unwrap();
    /// ```
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path)
            .map_err(|e| ClassifierError::Io(format!("fail to create '{}': {}", path.display(), e)))?;

        let writer = BufWriter::new(file);
        bincode::serialize_into(writer, self)?;
        Ok(())
    }

    /// Reads a payload previously written by [`save`](ModelPayload::save).
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ClassifierError::Io(format!("model file '{}' not found", path.display())));
        }

        let file = File::open(path)
            .map_err(|e| ClassifierError::Io(format!("fail to open '{}': {}", path.display(), e)))?;

        let reader = BufReader::new(file);
        bincode::deserialize_from(reader)
            .map_err(|e| ClassifierError::MalformedPayload(e.to_string()))
    }
}
