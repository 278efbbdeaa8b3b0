//! Agri Payout - payout prediction with an online-learning model lifecycle
//!
//! - Durable CSV training buffer with all-or-nothing appends
//! - Incremental trainer that fits a copy of the committed model
//! - Model registry with atomic publish and lazy load
//! - Prediction engine clamping every payout to a configured ceiling
//! - Axum HTTP service and clap CLI on top
//!
//! # Example
//!
//! ```ignore
//! use agri_payout::{Config, ModelLifecycle};
//!
//! let lifecycle = ModelLifecycle::from_config(&Config::load()?);
//! let outcome = lifecycle.trainer.train(records)?;
//! let result = lifecycle.engine.predict(&input)?;
//! ```

pub mod types;
pub mod error;
pub mod config;
pub mod hooks;
pub mod learning;
pub mod prediction;
pub mod server;
pub mod cli;

pub use config::Config;

pub use error::{FieldProblem, LifecycleError, LifecycleResult, ValidationError};

pub use types::{FeatureInput, TrainingRecord, FEATURE_NAMES};

pub use learning::{
    IncrementalTrainer,
    ModelArtifact,
    ModelLifecycle,
    ModelRegistry,
    TrainOutcome,
    TrainingBufferStore,
};

pub use prediction::{clamp_payout, PredictionEngine, PredictionResult};

pub use server::{
    ServerState,
    start as start_server,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Agricultural payout predictor", NAME, VERSION)
}

/// Log filter from `RUST_LOG`-style directives, WARN when unset or unparsable
pub fn log_filter(directives: Option<&str>) -> tracing_subscriber::EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| tracing_subscriber::EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| tracing_subscriber::EnvFilter::new("warn"))
}
