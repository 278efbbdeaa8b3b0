//! Model artifact and the online regressor inside it
//!
//! `ModelArtifact` is what the registry stores and publishes: version,
//! training timestamp, feature layout and an `SgdRegressor`. The regressor is
//! a linear model fit by stochastic gradient descent on squared loss with an
//! L2 penalty, working on standardized features and a standardized target.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::TrainingConfig;
use crate::error::{LifecycleError, LifecycleResult};
use crate::types::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

/// Bumped when the artifact layout changes incompatibly
pub const ARTIFACT_FORMAT: u32 = 1;

const MIN_ETA: f64 = 1e-6;
const ETA_DECAY: f64 = 5.0;

/// Running mean/std used to standardize one column
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub mean: f64,
    pub std: f64,
}

impl ColumnStats {
    pub const IDENTITY: ColumnStats = ColumnStats { mean: 0.0, std: 1.0 };

    /// Population mean/std of `values`; zero spread maps to std 1
    pub fn from_values(values: impl Iterator<Item = f64> + Clone) -> Self {
        let n = values.clone().count();
        if n == 0 {
            return Self::IDENTITY;
        }
        let mean = values.clone().sum::<f64>() / n as f64;
        let var = values.map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
        let std = var.sqrt();
        Self {
            mean,
            std: if std > f64::EPSILON { std } else { 1.0 },
        }
    }

    pub fn scale(&self, v: f64) -> f64 {
        (v - self.mean) / self.std
    }

    pub fn unscale(&self, v: f64) -> f64 {
        v * self.std + self.mean
    }
}

/// Per-column normalization for features and target
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Normalizer {
    pub features: [ColumnStats; FEATURE_COUNT],
    pub target: ColumnStats,
}

impl Normalizer {
    pub fn identity() -> Self {
        Self {
            features: [ColumnStats::IDENTITY; FEATURE_COUNT],
            target: ColumnStats::IDENTITY,
        }
    }

    pub fn fit(x: &[FeatureVector], y: &[f64]) -> Self {
        let mut features = [ColumnStats::IDENTITY; FEATURE_COUNT];
        for (col, stats) in features.iter_mut().enumerate() {
            *stats = ColumnStats::from_values(x.iter().map(move |row| row[col]));
        }
        Self {
            features,
            target: ColumnStats::from_values(y.iter().copied()),
        }
    }

    fn scale_row(&self, row: &FeatureVector) -> FeatureVector {
        let mut out = [0.0; FEATURE_COUNT];
        for (i, v) in out.iter_mut().enumerate() {
            *v = self.features[i].scale(row[i]);
        }
        out
    }
}

/// Regressor hyperparameters, copied from config at creation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdParams {
    pub eta0: f64,
    pub alpha: f64,
    pub tol: f64,
    pub n_iter_no_change: u32,
    pub epochs_per_cycle: u32,
}

impl From<&TrainingConfig> for SgdParams {
    fn from(cfg: &TrainingConfig) -> Self {
        Self {
            eta0: cfg.eta0,
            alpha: cfg.alpha,
            tol: cfg.tol,
            n_iter_no_change: cfg.n_iter_no_change,
            epochs_per_cycle: cfg.epochs_per_cycle,
        }
    }
}

impl Default for SgdParams {
    fn default() -> Self {
        Self::from(&TrainingConfig::default())
    }
}

/// Linear regressor trained online with an adaptive learning rate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SgdRegressor {
    pub params: SgdParams,
    pub weights: [f64; FEATURE_COUNT],
    pub intercept: f64,
    pub normalizer: Normalizer,
    /// Current learning rate
    pub eta: f64,
    pub best_loss: Option<f64>,
    pub epochs_without_improvement: u32,
}

impl SgdRegressor {
    pub fn new(params: SgdParams) -> Self {
        Self {
            eta: params.eta0,
            params,
            weights: [0.0; FEATURE_COUNT],
            intercept: 0.0,
            normalizer: Normalizer::identity(),
            best_loss: None,
            epochs_without_improvement: 0,
        }
    }

    /// Replace normalization statistics
    pub fn set_normalizer(&mut self, normalizer: Normalizer) {
        self.normalizer = normalizer;
    }

    /// Run `epochs_per_cycle` passes over the batch in order.
    /// Returns the mean squared loss (standardized units) of the last pass.
    pub fn partial_fit(&mut self, x: &[FeatureVector], y: &[f64]) -> f64 {
        debug_assert_eq!(x.len(), y.len());
        if x.is_empty() {
            return 0.0;
        }

        let mut last_loss = 0.0;
        for _ in 0..self.params.epochs_per_cycle.max(1) {
            let mut loss_sum = 0.0;
            for (row, target) in x.iter().zip(y) {
                let z = self.normalizer.scale_row(row);
                let t = self.normalizer.target.scale(*target);
                let err = self.decision(&z) - t;
                loss_sum += 0.5 * err * err;

                for (w, xi) in self.weights.iter_mut().zip(z) {
                    *w -= self.eta * (err * xi + self.params.alpha * *w);
                }
                self.intercept -= self.eta * err;
            }
            last_loss = loss_sum / x.len() as f64;
            self.adapt_learning_rate(last_loss);
        }
        last_loss
    }

    /// Prediction in payout units, unbounded
    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let z = self.normalizer.scale_row(features);
        self.normalizer.target.unscale(self.decision(&z))
    }

    fn decision(&self, z: &FeatureVector) -> f64 {
        self.weights.iter().zip(z).map(|(w, x)| w * x).sum::<f64>() + self.intercept
    }

    fn adapt_learning_rate(&mut self, loss: f64) {
        match self.best_loss {
            Some(best) if loss > best - self.params.tol => {
                self.epochs_without_improvement += 1;
                if self.epochs_without_improvement >= self.params.n_iter_no_change {
                    self.eta = (self.eta / ETA_DECAY).max(MIN_ETA);
                    self.epochs_without_improvement = 0;
                }
            }
            _ => {
                self.epochs_without_improvement = 0;
            }
        }
        if self.best_loss.map_or(true, |best| loss < best) {
            self.best_loss = Some(loss);
        }
    }

    fn is_finite(&self) -> bool {
        self.weights.iter().all(|w| w.is_finite()) && self.intercept.is_finite() && self.eta.is_finite()
    }
}

/// Versioned, serializable predictor published by the registry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub format: u32,
    /// 1 for the first published model, +1 on every publish after
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    /// Records consumed by all `partial_fit` calls so far
    pub samples_seen: u64,
    /// Leading buffer rows this artifact has already been fit on
    #[serde(default)]
    pub rows_consumed: u64,
    pub feature_names: Vec<String>,
    pub regressor: SgdRegressor,
}

/// Compact description for status reporting
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelSummary {
    pub version: u64,
    pub trained_at: DateTime<Utc>,
    pub samples_seen: u64,
}

impl ModelArtifact {
    /// Fresh, untrained artifact. Version 0 until first published.
    pub fn new(params: SgdParams) -> Self {
        Self {
            format: ARTIFACT_FORMAT,
            version: 0,
            trained_at: Utc::now(),
            samples_seen: 0,
            rows_consumed: 0,
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            regressor: SgdRegressor::new(params),
        }
    }

    /// Copy for the next cycle; the published original is never mutated
    pub fn next_generation(&self) -> Self {
        let mut next = self.clone();
        next.version = self.version + 1;
        next
    }

    /// One incremental fit step. Normalization comes from the full buffer,
    /// the gradient pass runs over `fit_x`/`fit_y`.
    pub fn partial_fit(
        &mut self,
        normalizer: Normalizer,
        fit_x: &[FeatureVector],
        fit_y: &[f64],
    ) -> LifecycleResult<f64> {
        self.regressor.set_normalizer(normalizer);
        let loss = self.regressor.partial_fit(fit_x, fit_y);
        if !self.regressor.is_finite() {
            return Err(LifecycleError::CorruptArtifact(
                "regressor diverged to non-finite weights".to_string(),
            ));
        }
        self.samples_seen += fit_x.len() as u64;
        self.trained_at = Utc::now();
        Ok(loss)
    }

    /// Raw scalar prediction, no bounds applied
    pub fn predict_raw(&self, features: &FeatureVector) -> f64 {
        self.regressor.predict(features)
    }

    pub fn summary(&self) -> ModelSummary {
        ModelSummary {
            version: self.version,
            trained_at: self.trained_at,
            samples_seen: self.samples_seen,
        }
    }

    pub fn to_json(&self) -> LifecycleResult<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Parse and sanity-check a stored artifact
    pub fn from_json(bytes: &[u8]) -> LifecycleResult<Self> {
        let artifact: ModelArtifact = serde_json::from_slice(bytes)
            .map_err(|e| LifecycleError::CorruptArtifact(e.to_string()))?;

        if artifact.format != ARTIFACT_FORMAT {
            return Err(LifecycleError::CorruptArtifact(format!(
                "unsupported artifact format {}",
                artifact.format
            )));
        }
        if artifact.feature_names.iter().map(String::as_str).ne(FEATURE_NAMES.iter().copied()) {
            return Err(LifecycleError::CorruptArtifact(format!(
                "feature layout {:?} does not match {:?}",
                artifact.feature_names, FEATURE_NAMES
            )));
        }
        if !artifact.regressor.is_finite() {
            return Err(LifecycleError::CorruptArtifact(
                "artifact holds non-finite weights".to_string(),
            ));
        }
        Ok(artifact)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset() -> (Vec<FeatureVector>, Vec<f64>) {
        let x = vec![
            [25.0, 41.0, 22.0, 36.0, 1200.0],
            [30.0, 39.0, 26.0, 34.0, 2200.0],
            [28.0, 40.0, 24.0, 35.0, 1700.0],
        ];
        let y = vec![1000.0, 2000.0, 1500.0];
        (x, y)
    }

    #[test]
    fn test_column_stats_zero_spread() {
        let stats = ColumnStats::from_values([4.0, 4.0, 4.0].into_iter());
        assert_eq!(stats.mean, 4.0);
        assert_eq!(stats.std, 1.0);
        assert_eq!(stats.scale(5.0), 1.0);
    }

    #[test]
    fn test_untrained_regressor_predicts_target_mean() {
        let (x, y) = dataset();
        let mut reg = SgdRegressor::new(SgdParams::default());
        reg.set_normalizer(Normalizer::fit(&x, &y));
        let p = reg.predict(&x[0]);
        assert!((p - 1500.0).abs() < 1e-9);
    }

    #[test]
    fn test_training_reduces_loss() {
        let (x, y) = dataset();
        let mut params = SgdParams::default();
        params.eta0 = 0.05;
        let mut reg = SgdRegressor::new(params);
        reg.set_normalizer(Normalizer::fit(&x, &y));

        let first = reg.partial_fit(&x, &y);
        let mut last = first;
        for _ in 0..30 {
            last = reg.partial_fit(&x, &y);
        }
        assert!(last < first, "loss did not improve: {} -> {}", first, last);

        // Higher expected amount in the data goes with higher approved amount
        assert!(reg.predict(&x[1]) > reg.predict(&x[0]));
    }

    #[test]
    fn test_learning_rate_decays_on_plateau() {
        let mut params = SgdParams::default();
        params.n_iter_no_change = 2;
        let mut reg = SgdRegressor::new(params);
        reg.adapt_learning_rate(1.0);
        reg.adapt_learning_rate(1.0);
        assert_eq!(reg.eta, 0.01);
        reg.adapt_learning_rate(1.0);
        assert!((reg.eta - 0.002).abs() < 1e-12);
    }

    #[test]
    fn test_next_generation_leaves_original_untouched() {
        let (x, y) = dataset();
        let mut first = ModelArtifact::new(SgdParams::default()).next_generation();
        first.partial_fit(Normalizer::fit(&x, &y), &x, &y).unwrap();
        let snapshot = first.clone();

        let mut second = first.next_generation();
        second.partial_fit(Normalizer::fit(&x, &y), &x, &y).unwrap();

        assert_eq!(first, snapshot);
        assert_eq!(first.version, 1);
        assert_eq!(second.version, 2);
        assert_eq!(second.samples_seen, 6);
    }

    #[test]
    fn test_json_round_trip_and_layout_check() {
        let (x, y) = dataset();
        let mut artifact = ModelArtifact::new(SgdParams::default()).next_generation();
        artifact.partial_fit(Normalizer::fit(&x, &y), &x, &y).unwrap();

        let bytes = artifact.to_json().unwrap();
        let loaded = ModelArtifact::from_json(&bytes).unwrap();
        assert!((loaded.predict_raw(&x[2]) - artifact.predict_raw(&x[2])).abs() < 1e-6);
        assert_eq!(loaded.version, 1);

        let mut tampered: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        tampered["feature_names"][0] = serde_json::json!("rainfall");
        let err = ModelArtifact::from_json(&serde_json::to_vec(&tampered).unwrap()).unwrap_err();
        assert!(matches!(err, LifecycleError::CorruptArtifact(_)));

        assert!(ModelArtifact::from_json(b"{ not json").is_err());
    }
}
