//! Model lifecycle: durable training buffer, online trainer and model registry
//!
//! Labeled records flow into the buffer, the trainer fits a copy of the
//! current artifact and the registry swaps it in. `ModelLifecycle` wires one
//! shared set of these components from a `Config`.

pub mod buffer;
pub mod model;
pub mod persist;
pub mod registry;
pub mod trainer;

pub use buffer::TrainingBufferStore;
pub use model::{ModelArtifact, ModelSummary, SgdRegressor};
pub use registry::ModelRegistry;
pub use trainer::{IncrementalTrainer, SkipReason, TrainOutcome};

use std::sync::Arc;

use crate::config::Config;
use crate::error::LifecycleResult;
use crate::hooks::EventRegistry;
use crate::prediction::PredictionEngine;

/// Everything one process needs to train and predict, shared by `Arc`
#[derive(Clone)]
pub struct ModelLifecycle {
    pub buffer: Arc<TrainingBufferStore>,
    pub registry: Arc<ModelRegistry>,
    pub trainer: Arc<IncrementalTrainer>,
    pub engine: Arc<PredictionEngine>,
    pub events: Arc<EventRegistry>,
}

/// Point-in-time view for status reporting
#[derive(Debug, Clone, serde::Serialize)]
pub struct LifecycleStatus {
    pub buffer_records: usize,
    pub model: Option<ModelSummary>,
}

impl ModelLifecycle {
    /// Wire components with the tracing event handler attached
    pub fn from_config(config: &Config) -> Self {
        Self::with_events(config, Arc::new(EventRegistry::with_tracing()))
    }

    pub fn with_events(config: &Config, events: Arc<EventRegistry>) -> Self {
        let buffer = Arc::new(TrainingBufferStore::new(config.storage.buffer_path()));
        let registry = Arc::new(ModelRegistry::new(config.storage.model_path(), events.clone()));
        let trainer = Arc::new(IncrementalTrainer::new(
            buffer.clone(),
            registry.clone(),
            events.clone(),
            config.training.clone(),
        ));
        let engine = Arc::new(PredictionEngine::new(
            registry.clone(),
            events.clone(),
            config.prediction.max_payout,
        ));

        Self {
            buffer,
            registry,
            trainer,
            engine,
            events,
        }
    }

    pub fn status(&self) -> LifecycleResult<LifecycleStatus> {
        Ok(LifecycleStatus {
            buffer_records: self.buffer.len()?,
            model: self.registry.current()?.map(|m| m.summary()),
        })
    }
}
