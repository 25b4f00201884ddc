//! Error types for the classifier.
//!
//! Every failure the classifier, the label registry or the session can hit is
//! one [`ClassifierError`] variant. Errors are cloneable and comparable so
//! tests can match on them and the session can forward them to a result sink
//! as [`SessionEvent::Error`](crate::SessionEvent::Error).
//!
//! | Error | Raised by | Surfaced as |
//! |-------|-----------|-------------|
//! | [`NotReady`](ClassifierError::NotReady) | add/predict before `load` | warned no-op (add), error (predict) |
//! | [`InvalidSlot`](ClassifierError::InvalidSlot) | out-of-range slot index | warned no-op |
//! | [`UnknownLabel`](ClassifierError::UnknownLabel) | clear of an unbound label | error event |
//! | [`CapacityExceeded`](ClassifierError::CapacityExceeded) | training with no free slot | error event |
//! | [`ModelTooLarge`](ClassifierError::ModelTooLarge) / [`MalformedPayload`](ClassifierError::MalformedPayload) | `load_model` | error event, no mutation |

use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum ClassifierError {
    /// The embedding extractor has not finished loading.
    #[error("classifier is not ready: embedding extractor has not finished loading")]
    NotReady,

    #[error("invalid class slot {slot} (classifier has {num_classes} slots)")]
    InvalidSlot { slot: usize, num_classes: usize },

    #[error("label '{0}' does not exist")]
    UnknownLabel(String),

    /// The free-slot pool is empty; carries the rejected label.
    #[error("no more classes available to train label '{0}'")]
    CapacityExceeded(String),

    #[error("expected embedding of dimension {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// Empty or non-finite embedding.
    #[error("invalid embedding: {0}")]
    InvalidEmbedding(String),

    #[error("model declares {declared} classes but only {available} slots are available")]
    ModelTooLarge { declared: usize, available: usize },

    #[error("malformed model payload: {0}")]
    MalformedPayload(String),

    #[error("io error: {0}")]
    Io(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl ClassifierError {
    /// Stable machine-readable code used in error events and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            ClassifierError::NotReady => "not_ready",
            ClassifierError::InvalidSlot { .. } => "invalid_slot",
            ClassifierError::UnknownLabel(_) => "unknown_label",
            ClassifierError::CapacityExceeded(_) => "capacity_exceeded",
            ClassifierError::DimensionMismatch { .. } => "dimension_mismatch",
            ClassifierError::InvalidEmbedding(_) => "invalid_embedding",
            ClassifierError::ModelTooLarge { .. } => "model_too_large",
            ClassifierError::MalformedPayload(_) => "malformed_payload",
            ClassifierError::Io(_) => "io",
            ClassifierError::Serialization(_) => "serialization",
            ClassifierError::Config(_) => "config",
        }
    }
}

impl From<std::io::Error> for ClassifierError {
    fn from(err: std::io::Error) -> Self {
        ClassifierError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for ClassifierError {
    fn from(err: serde_json::Error) -> Self {
        ClassifierError::Serialization(err.to_string())
    }
}

impl From<bincode::Error> for ClassifierError {
    fn from(err: bincode::Error) -> Self {
        ClassifierError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for ClassifierError {
    fn from(err: config::ConfigError) -> Self {
        ClassifierError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ClassifierError>;
