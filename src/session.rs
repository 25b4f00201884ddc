//! The session module
//! Drives the per-frame train/classify loop and reports results as events

use crate::classifier::{KnnClassifier, Prediction};
use crate::config::ClassifierConfig;
use crate::error::{ClassifierError, Result};
use crate::model::{ModelPayload, SavedClass};
use crate::registry::LabelRegistry;
use crate::vector::EmbeddingMatrix;
use serde::{Serialize, Serializer};
use tracing::{info, warn};

/// Something the session reports to its host.
///
/// Label/value lists are parallel sequences ordered by ascending slot and
/// restricted to bound labels.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The embedding extractor finished loading.
    Ready,
    SampleCounts {
        labels: Vec<String>,
        counts: Vec<usize>,
    },
    Confidences {
        labels: Vec<String>,
        #[serde(serialize_with = "serialize_confidences")]
        confidences: Vec<Option<f32>>,
    },
    /// Current top choice, `""` when there is none.
    Classification {
        label: String,
    },
    ModelSaved {
        name: String,
    },
    ModelLoaded {
        name: String,
    },
    Error {
        code: String,
        message: String,
    },
}

impl SessionEvent {
    fn error(err: &ClassifierError) -> SessionEvent {
        SessionEvent::Error { code: err.code().to_string(), message: err.to_string() }
    }
}

/// Receiver of session events.
pub trait ResultSink {
    fn emit(&mut self, event: SessionEvent);
}

impl ResultSink for Vec<SessionEvent> {
    fn emit(&mut self, event: SessionEvent) {
        self.push(event);
    }
}

/// Rounds a confidence to the 5 decimal places used on the wire.
pub fn round_confidence(confidence: f32) -> f64 {
    (confidence as f64 * 100_000.0).round() / 100_000.0
}

/// Fixed 5-decimal text form of a confidence.
pub fn format_confidence(confidence: f32) -> String {
    format!("{:.5}", confidence)
}

fn serialize_confidences<S: Serializer>(values: &[Option<f32>], serializer: S) -> std::result::Result<S::Ok, S::Error> {
    serializer.collect_seq(values.iter().map(|c| c.map(round_confidence)))
}

/// Snapshot of the session for status queries.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionStatus {
    pub ready: bool,
    pub training: Option<String>,
    pub classification: String,
    pub labels: Vec<String>,
    pub counts: Vec<usize>,
    #[serde(serialize_with = "serialize_confidences")]
    pub confidences: Vec<Option<f32>>,
    pub free_slots: usize,
}

/// One teaching/classification session.
///
/// Every method takes `&mut self`, so commands are always applied between
/// frames and never in the middle of one. Drivers that share a session across
/// threads put the whole controller behind one lock.
///
/// # Examples
///
/// ```
/// use knnclass::{ClassifierConfig, SessionController, SessionEvent};
///
/// let config = ClassifierConfig { dimension: 2, ..ClassifierConfig::default() };
/// let mut session = SessionController::new(&config);
/// let mut events: Vec<SessionEvent> = Vec::new();
///
/// session.mark_ready(config.dimension, &mut events);
/// session.train("cat", &mut events).unwrap();
/// session.on_frame(&[1.0, 0.0], &mut events);
/// session.stop_training();
///
/// assert_eq!(session.classification(), Some("cat"));
/// assert_eq!(session.sample_count("cat"), Some(1));
/// ```
#[derive(Debug)]
pub struct SessionController {
    classifier: KnnClassifier,
    labels: LabelRegistry,
    training: Option<usize>,
    confidences: Vec<Option<f32>>,
    top_choice: Option<usize>,
    max_examples: usize,
}

impl SessionController {
    pub fn new(config: &ClassifierConfig) -> SessionController {
        SessionController {
            classifier: KnnClassifier::new(config.num_classes, config.top_k, config.scale_denominator),
            labels: LabelRegistry::new(config.num_classes),
            training: None,
            confidences: vec![None; config.num_classes],
            top_choice: None,
            max_examples: config.max_examples,
        }
    }

    /// Reports that the embedding extractor is loaded and produces
    /// `dimension`-long embeddings.
    pub fn mark_ready(&mut self, dimension: usize, sink: &mut impl ResultSink) {
        self.classifier.load(dimension);
        sink.emit(SessionEvent::Ready);
    }

    pub fn is_ready(&self) -> bool {
        self.classifier.is_ready()
    }

    /// Starts adding frames to `label`, binding it to a slot if it is new.
    pub fn train(&mut self, label: &str, sink: &mut impl ResultSink) -> Result<usize> {
        let slot = report(self.labels.bind(label), sink)?;
        self.training = Some(slot);
        info!(label, slot, "training");
        Ok(slot)
    }

    pub fn stop_training(&mut self) {
        self.training = None;
    }

    /// Processes one frame embedding.
    ///
    /// Adds it to the class being trained (up to the per-class cap), then
    /// reclassifies it and emits counts, confidences and the top choice.
    /// Nothing is emitted while every class is empty. A failed prediction
    /// only skips this frame.
    pub fn on_frame(&mut self, embedding: &[f32], sink: &mut impl ResultSink) -> Option<Prediction> {
        if let Some(slot) = self.training {
            if self.classifier.store().example_count(slot) < self.max_examples {
                // rejections are logged by the classifier
                let _ = self.classifier.add_example(slot, embedding);
            }
        }

        if self.classifier.store().is_empty() {
            return None;
        }

        let prediction = match self.classifier.predict(embedding) {
            Ok(p) => p,
            Err(e) => {
                warn!(error = %e, "skipping frame");
                return None;
            }
        };

        let counts = self.classifier.store().example_counts();
        for (slot, &count) in counts.iter().enumerate() {
            if count > 0 {
                self.confidences[slot] = prediction.confidences[slot];
            }
        }
        if let Some(class_index) = prediction.class_index {
            self.top_choice = Some(class_index);
        }

        self.emit_sample_counts(sink);
        self.emit_confidences(sink);
        self.emit_classification(sink);
        Some(prediction)
    }

    /// Forgets every example of `label` and frees its slot.
    pub fn clear(&mut self, label: &str, sink: &mut impl ResultSink) -> Result<()> {
        let slot = report(
            self.labels.slot_for(label).ok_or_else(|| ClassifierError::UnknownLabel(label.to_string())),
            sink,
        )?;

        self.clear_slot(label, slot)?;
        info!(label, slot, "cleared class");

        self.emit_sample_counts(sink);
        self.emit_confidences(sink);
        self.emit_classification(sink);
        Ok(())
    }

    /// Collects the embeddings of every bound label, in slot order.
    pub fn save_model(&self, name: &str, sink: &mut impl ResultSink) -> Result<ModelPayload> {
        let payload = report(self.snapshot(), sink)?;
        info!(name, classes = payload.classes.len(), "saved model");
        sink.emit(SessionEvent::ModelSaved { name: name.to_string() });
        Ok(payload)
    }

    /// Replaces every binding with the classes of `payload`.
    ///
    /// The payload is fully validated first; a rejected load leaves the
    /// session untouched.
    pub fn load_model(&mut self, name: &str, payload: &ModelPayload, sink: &mut impl ResultSink) -> Result<()> {
        let classes = report(self.validate_payload(payload), sink)?;

        let bound: Vec<usize> = self.labels.bound().map(|(slot, _)| slot).collect();
        for slot in bound {
            self.classifier.clear_class(slot)?;
        }
        self.labels.clear_all();
        self.training = None;
        self.confidences.iter_mut().for_each(|c| *c = None);
        self.top_choice = None;

        for (label, matrix) in classes {
            let slot = self.labels.bind(&label)?;
            self.classifier.replace_class(slot, matrix)?;
        }
        info!(name, classes = payload.classes.len(), "loaded model");

        self.emit_sample_counts(sink);
        self.emit_confidences(sink);
        sink.emit(SessionEvent::ModelLoaded { name: name.to_string() });
        Ok(())
    }

    // ========== Queries ==========

    /// Examples stored for `label`, `None` if it is not bound.
    pub fn sample_count(&self, label: &str) -> Option<usize> {
        self.labels.slot_for(label)
            .map(|slot| self.classifier.store().example_count(slot))
    }

    /// Last known confidence of `label`.
    pub fn confidence(&self, label: &str) -> Option<f32> {
        self.labels.slot_for(label).and_then(|slot| self.confidences[slot])
    }

    /// Label of the last top choice.
    pub fn classification(&self) -> Option<&str> {
        self.top_choice.and_then(|slot| self.labels.label_for(slot))
    }

    pub fn training_label(&self) -> Option<&str> {
        self.training.and_then(|slot| self.labels.label_for(slot))
    }

    pub fn sample_counts(&self) -> Vec<(String, usize)> {
        let counts = self.classifier.store().example_counts();
        self.labels.bound()
            .map(|(slot, label)| (label.to_string(), counts[slot]))
            .collect()
    }

    pub fn confidences(&self) -> Vec<(String, Option<f32>)> {
        self.labels.bound()
            .map(|(slot, label)| (label.to_string(), self.confidences[slot]))
            .collect()
    }

    pub fn status(&self) -> SessionStatus {
        let (labels, counts) = self.sample_counts().into_iter().unzip();
        SessionStatus {
            ready: self.is_ready(),
            training: self.training_label().map(str::to_string),
            classification: self.classification().unwrap_or_default().to_string(),
            labels,
            counts,
            confidences: self.confidences().into_iter().map(|(_, c)| c).collect(),
            free_slots: self.labels.free_slots(),
        }
    }

    pub fn labels(&self) -> &LabelRegistry {
        &self.labels
    }

    pub fn classifier(&self) -> &KnnClassifier {
        &self.classifier
    }

    // ========== Internals ==========

    fn clear_slot(&mut self, label: &str, slot: usize) -> Result<()> {
        if self.training == Some(slot) {
            self.stop_training();
        }
        self.classifier.clear_class(slot)?;
        self.labels.unbind(label)?;
        self.confidences[slot] = None;
        if self.top_choice == Some(slot) {
            self.top_choice = None;
        }
        Ok(())
    }

    fn snapshot(&self) -> Result<ModelPayload> {
        let dimension = self.classifier.dimension().ok_or(ClassifierError::NotReady)?;
        let classes = self.labels.bound()
            .map(|(slot, label)| {
                Ok(SavedClass {
                    label: label.to_string(),
                    embeddings: self.classifier.store().serialize_slot(slot)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(ModelPayload { dimension, classes })
    }

    fn validate_payload(&self, payload: &ModelPayload) -> Result<Vec<(String, Option<EmbeddingMatrix>)>> {
        let dimension = self.classifier.dimension().ok_or(ClassifierError::NotReady)?;
        let available = self.labels.capacity();
        if payload.classes.len() > available {
            return Err(ClassifierError::ModelTooLarge { declared: payload.classes.len(), available });
        }
        if payload.dimension != dimension {
            return Err(ClassifierError::MalformedPayload(format!(
                "model dimension {} does not match extractor dimension {}",
                payload.dimension, dimension
            )));
        }
        payload.decode()
    }

    fn emit_sample_counts(&self, sink: &mut impl ResultSink) {
        let (labels, counts) = self.sample_counts().into_iter().unzip();
        sink.emit(SessionEvent::SampleCounts { labels, counts });
    }

    fn emit_confidences(&self, sink: &mut impl ResultSink) {
        let (labels, confidences) = self.confidences().into_iter().unzip();
        sink.emit(SessionEvent::Confidences { labels, confidences });
    }

    fn emit_classification(&self, sink: &mut impl ResultSink) {
        let label = self.classification().unwrap_or_default().to_string();
        sink.emit(SessionEvent::Classification { label });
    }
}

/// Forwards a failed command to the sink as an error event.
fn report<T>(result: Result<T>, sink: &mut impl ResultSink) -> Result<T> {
    if let Err(e) = &result {
        warn!(error = %e, "command rejected");
        sink.emit(SessionEvent::error(e));
    }
    result
}
