//! Prediction Engine
//!
//! Validates an input, reads the committed artifact from the registry and
//! returns a payout clamped to `[0, max_payout]`.

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;

use crate::error::LifecycleResult;
use crate::hooks::{EventContext, EventPoint, EventRegistry};
use crate::learning::registry::ModelRegistry;
use crate::types::FeatureInput;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum PredictionResult {
    Available { amount: u64, model_version: u64 },
    /// No model has been trained yet
    Unavailable,
}

impl PredictionResult {
    pub fn amount(&self) -> Option<u64> {
        match self {
            PredictionResult::Available { amount, .. } => Some(*amount),
            PredictionResult::Unavailable => None,
        }
    }

    pub fn model_version(&self) -> Option<u64> {
        match self {
            PredictionResult::Available { model_version, .. } => Some(*model_version),
            PredictionResult::Unavailable => None,
        }
    }
}

/// Bound a raw model output to `[0, max]`, rounding half away from zero.
/// NaN maps to 0.
pub fn clamp_payout(raw: f64, max: u64) -> u64 {
    if raw.is_nan() {
        return 0;
    }
    let bounded = raw.min(max as f64).max(0.0).round();
    // `bounded` is finite and within [0, max] here
    (bounded as u64).min(max)
}

pub struct PredictionEngine {
    registry: Arc<ModelRegistry>,
    events: Arc<EventRegistry>,
    max_payout: u64,
}

impl PredictionEngine {
    pub fn new(registry: Arc<ModelRegistry>, events: Arc<EventRegistry>, max_payout: u64) -> Self {
        Self {
            registry,
            events,
            max_payout,
        }
    }

    pub fn max_payout(&self) -> u64 {
        self.max_payout
    }

    pub fn predict(&self, input: &FeatureInput) -> LifecycleResult<PredictionResult> {
        input.validate()?;

        let Some(model) = self.registry.current()? else {
            return Ok(PredictionResult::Unavailable);
        };

        let raw = model.predict_raw(&input.to_vector());
        let amount = clamp_payout(raw, self.max_payout);

        if self.events.has_handlers(EventPoint::PredictionServed) {
            self.events.emit(
                &EventContext::new(EventPoint::PredictionServed)
                    .with_data("version", model.version)
                    .with_data("raw", if raw.is_finite() { Value::from(raw) } else { Value::Null })
                    .with_data("amount", amount),
            );
        }

        Ok(PredictionResult::Available {
            amount,
            model_version: model.version,
        })
    }

    /// Predict straight from a JSON object; extra keys such as `cropType` are ignored
    pub fn predict_json(&self, body: &Value) -> LifecycleResult<PredictionResult> {
        let input = FeatureInput::from_json(body)?;
        self.predict(&input)
    }
}
