//! Classifier and driver configuration.
//!
//! Values come from an optional config file (any format the `config` crate
//! understands, e.g. `knnclass.json` or `knnclass.toml`) and are overridden
//! by `KNNCLASS_*` environment variables such as `KNNCLASS_NUM_CLASSES=5`.

use crate::classifier::DEFAULT_TOP_K;
use crate::error::{ClassifierError, Result};
use crate::vector::DEFAULT_SCALE_DENOMINATOR;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ClassifierConfig {
    /// Number of class slots, fixed for the whole session
    #[serde(default = "default_num_classes")]
    pub num_classes: usize,

    /// Neighbours consulted per prediction
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Per-class cap on examples added from frames while training
    #[serde(default = "default_max_examples")]
    pub max_examples: usize,

    /// Squash constant applied before L2 normalization
    #[serde(default = "default_scale_denominator")]
    pub scale_denominator: f32,

    /// Output dimension of the embedding extractor
    #[serde(default = "default_dimension")]
    pub dimension: usize,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory where the HTTP driver reads and writes saved models
    #[serde(default = "default_models_dir")]
    pub models_dir: PathBuf,

    /// `tracing-subscriber` filter directive
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            num_classes: default_num_classes(),
            top_k: default_top_k(),
            max_examples: default_max_examples(),
            scale_denominator: default_scale_denominator(),
            dimension: default_dimension(),
            bind_addr: default_bind_addr(),
            port: default_port(),
            models_dir: default_models_dir(),
            log_level: default_log_level(),
        }
    }
}

impl ClassifierConfig {
    /// Loads configuration from an optional file plus `KNNCLASS_*`
    /// environment variables, then validates it.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(true));
        }
        builder = builder.add_source(config::Environment::with_prefix("KNNCLASS").try_parsing(true));

        let config: ClassifierConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.num_classes == 0 {
            return Err(ClassifierError::Config("num_classes must be at least 1".to_string()));
        }
        if self.top_k == 0 {
            return Err(ClassifierError::Config("top_k must be at least 1".to_string()));
        }
        if self.dimension == 0 {
            return Err(ClassifierError::Config("dimension must be at least 1".to_string()));
        }
        if !self.scale_denominator.is_finite() || self.scale_denominator <= 0.0 {
            return Err(ClassifierError::Config(format!(
                "scale_denominator must be a positive number, got {}",
                self.scale_denominator
            )));
        }
        Ok(())
    }

    /// `bind_addr:port`
    pub fn listen_addr(&self) -> String {
        format!("{}:{}", self.bind_addr, self.port)
    }
}

fn default_num_classes() -> usize {
    3
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_max_examples() -> usize {
    50
}

fn default_scale_denominator() -> f32 {
    DEFAULT_SCALE_DENOMINATOR
}

fn default_dimension() -> usize {
    1000
}

fn default_bind_addr() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7878
}

fn default_models_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_log_level() -> String {
    "info".to_string()
}
