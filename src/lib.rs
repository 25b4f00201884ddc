//! # KNNCLASS - An Online Nearest-Neighbour Classifier
//!
//! KNNCLASS turns a stream of image embeddings into a live class prediction
//! without retraining a model. Labels are taught by example: while a label is
//! being trained every incoming embedding is stored in that label's class
//! slot, and every frame is classified by letting its K most similar stored
//! examples vote. Embeddings are scaled and L2-normalized on insertion and
//! compared with dot product similarity (cosine similarity for unit vectors).
//!
//! ## Example
//!
//! ```
//! use knnclass::{ClassifierConfig, SessionController, SessionEvent};
//!
//! let config = ClassifierConfig { num_classes: 3, dimension: 3, top_k: 1, ..ClassifierConfig::default() };
//! let mut session = SessionController::new(&config);
//! let mut events: Vec<SessionEvent> = Vec::new();
//! session.mark_ready(config.dimension, &mut events);
//!
//! // Teach two labels
//! session.train("cat", &mut events).unwrap();
//! session.on_frame(&[1.0, 0.0, 0.0], &mut events);
//! session.train("dog", &mut events).unwrap();
//! session.on_frame(&[0.0, 1.0, 0.0], &mut events);
//! session.stop_training();
//!
//! // Classify
//! session.on_frame(&[0.1, 0.9, 0.0], &mut events);
//! assert_eq!(
//!     events.last(),
//!     Some(&SessionEvent::Classification { label: "dog".to_string() })
//! );
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod model;
pub mod registry;
pub mod server;
pub mod session;
pub mod store;
pub mod vector;

pub use classifier::{KnnClassifier, Prediction};
pub use config::ClassifierConfig;
pub use error::{ClassifierError, Result};
pub use model::{ModelPayload, SavedClass};
pub use registry::LabelRegistry;
pub use session::{ResultSink, SessionController, SessionEvent, SessionStatus};
pub use store::ClassStore;
pub use vector::EmbeddingMatrix;
