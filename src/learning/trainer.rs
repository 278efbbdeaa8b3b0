//! Incremental Model Trainer
//!
//! One training cycle: threshold check, durable append, full-buffer reload,
//! one `partial_fit` on a copy of the current artifact, then publish. Cycles
//! never overlap.

use serde::Serialize;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{FitScope, TrainingConfig};
use crate::error::LifecycleResult;
use crate::hooks::{EventContext, EventPoint, EventRegistry};
use crate::types::{FeatureVector, TrainingRecord};

use super::buffer::TrainingBufferStore;
use super::model::{ModelArtifact, Normalizer, SgdParams};
use super::registry::ModelRegistry;

/// Why a cycle did nothing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SkipReason {
    #[serde(rename = "no data")]
    NoData,
    #[serde(rename = "insufficient data")]
    InsufficientData,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoData => write!(f, "no data"),
            SkipReason::InsufficientData => write!(f, "insufficient data"),
        }
    }
}

/// Result of one `train` call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TrainOutcome {
    /// `records` is the buffer size after the append
    Trained { records: usize },
    /// `records` is how many were submitted
    Skipped { reason: SkipReason, records: usize },
}

pub struct IncrementalTrainer {
    buffer: Arc<TrainingBufferStore>,
    registry: Arc<ModelRegistry>,
    events: Arc<EventRegistry>,
    config: TrainingConfig,
    cycle: Mutex<()>,
}

impl IncrementalTrainer {
    pub fn new(
        buffer: Arc<TrainingBufferStore>,
        registry: Arc<ModelRegistry>,
        events: Arc<EventRegistry>,
        config: TrainingConfig,
    ) -> Self {
        Self {
            buffer,
            registry,
            events,
            config,
            cycle: Mutex::new(()),
        }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Run one training cycle over `new_records`
    pub fn train(&self, new_records: Vec<TrainingRecord>) -> LifecycleResult<TrainOutcome> {
        let submitted = new_records.len();
        if submitted == 0 {
            return Ok(self.skip(SkipReason::NoData, 0));
        }
        if submitted < self.config.min_records {
            return Ok(self.skip(SkipReason::InsufficientData, submitted));
        }

        for (idx, record) in new_records.iter().enumerate() {
            record.validate().map_err(|e| e.at_record(idx))?;
        }

        let _cycle = self.cycle.lock().unwrap_or_else(|e| e.into_inner());
        let cycle_id = Uuid::new_v4();
        self.events.emit(
            &EventContext::new(EventPoint::TrainingStarted)
                .for_cycle(cycle_id)
                .with_data("submitted", submitted as u64),
        );

        match self.run_cycle(&new_records) {
            Ok((total, version)) => {
                info!("Training cycle {} produced model v{} over {} records", cycle_id, version, total);
                self.events.emit(
                    &EventContext::new(EventPoint::TrainingCompleted)
                        .for_cycle(cycle_id)
                        .with_data("records", total as u64)
                        .with_data("version", version),
                );
                Ok(TrainOutcome::Trained { records: total })
            }
            Err(e) => {
                warn!("Training cycle {} failed: {}", cycle_id, e);
                self.events.emit(
                    &EventContext::new(EventPoint::TrainingFailed)
                        .for_cycle(cycle_id)
                        .with_data("error", e.to_string()),
                );
                Err(e)
            }
        }
    }

    fn skip(&self, reason: SkipReason, records: usize) -> TrainOutcome {
        debug!("Skipping training cycle: {} ({} records)", reason, records);
        self.events.emit(
            &EventContext::new(EventPoint::TrainingSkipped)
                .with_data("reason", reason.to_string())
                .with_data("records", records as u64),
        );
        TrainOutcome::Skipped { reason, records }
    }

    /// Append, reload, fit and publish. Returns buffer size and new version.
    fn run_cycle(&self, new_records: &[TrainingRecord]) -> LifecycleResult<(usize, u64)> {
        self.buffer.append(new_records)?;

        let all = self.buffer.load_all()?;
        let (x_all, y_all) = split_columns(&all);
        let normalizer = Normalizer::fit(&x_all, &y_all);

        let mut next = match self.registry.current()? {
            Some(current) => current.next_generation(),
            None => ModelArtifact::new(SgdParams::from(&self.config)).next_generation(),
        };

        let loss = match self.config.fit_scope {
            FitScope::Full => next.partial_fit(normalizer, &x_all, &y_all)?,
            FitScope::Increment => {
                // Rows appended by earlier failed cycles are still unconsumed
                let start = usize::try_from(next.rows_consumed)
                    .unwrap_or(usize::MAX)
                    .min(all.len());
                next.partial_fit(normalizer, &x_all[start..], &y_all[start..])?
            }
        };
        next.rows_consumed = all.len() as u64;
        debug!("partial_fit loss {:.6} (eta {})", loss, next.regressor.eta);

        let published = self.registry.publish(next)?;
        Ok((all.len(), published.version))
    }
}

fn split_columns(records: &[TrainingRecord]) -> (Vec<FeatureVector>, Vec<f64>) {
    records
        .iter()
        .map(|r| (r.features.to_vector(), r.approved_amount))
        .unzip()
}
