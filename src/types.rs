//! Shared types used across modules
//!
//! Training records and prediction inputs, plus the validation that turns
//! loosely-shaped JSON into them. Feature order is fixed by `FEATURE_NAMES`
//! and every consumer (buffer file, regressor, prediction) goes through
//! `to_vector()` so training and inference never disagree.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{FieldProblem, ValidationError};

/// Number of model features
pub const FEATURE_COUNT: usize = 5;

/// Model feature names, in vector order
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "soilMoisture",
    "airTemp",
    "humidity",
    "soilTemp",
    "expectedAmount",
];

/// Name of the label column
pub const LABEL_NAME: &str = "approvedAmount";

/// Fixed-order feature vector
pub type FeatureVector = [f64; FEATURE_COUNT];

/// Sensor readings and the claimed amount for one prediction
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureInput {
    pub soil_moisture: f64,
    pub air_temp: f64,
    pub humidity: f64,
    pub soil_temp: f64,
    pub expected_amount: f64,
}

impl FeatureInput {
    pub fn to_vector(&self) -> FeatureVector {
        [
            self.soil_moisture,
            self.air_temp,
            self.humidity,
            self.soil_temp,
            self.expected_amount,
        ]
    }

    pub fn from_vector(v: FeatureVector) -> Self {
        Self {
            soil_moisture: v[0],
            air_temp: v[1],
            humidity: v[2],
            soil_temp: v[3],
            expected_amount: v[4],
        }
    }

    /// Reject non-finite values (typed inputs can still carry NaN)
    pub fn validate(&self) -> Result<(), ValidationError> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.to_vector()) {
            if !value.is_finite() {
                return Err(ValidationError::field(None, name, FieldProblem::NotFinite));
            }
        }
        Ok(())
    }

    /// Parse from a JSON object. Extra keys such as `cropType` are ignored.
    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let obj = value
            .as_object()
            .ok_or(ValidationError::NotAnObject { record: None })?;
        let mut v = [0.0; FEATURE_COUNT];
        for (slot, name) in v.iter_mut().zip(FEATURE_NAMES) {
            *slot = numeric_field(obj, name)?;
        }
        Ok(Self::from_vector(v))
    }
}

/// A labeled outcome: features plus the payout that was actually approved
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrainingRecord {
    #[serde(flatten)]
    pub features: FeatureInput,
    pub approved_amount: f64,
}

impl TrainingRecord {
    pub fn new(features: FeatureInput, approved_amount: f64) -> Self {
        Self {
            features,
            approved_amount,
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        self.features.validate()?;
        if !self.approved_amount.is_finite() {
            return Err(ValidationError::field(None, LABEL_NAME, FieldProblem::NotFinite));
        }
        Ok(())
    }

    pub fn from_json(value: &Value) -> Result<Self, ValidationError> {
        let features = FeatureInput::from_json(value)?;
        // from_json on the features already proved this is an object
        let obj = value
            .as_object()
            .ok_or(ValidationError::NotAnObject { record: None })?;
        let approved_amount = numeric_field(obj, LABEL_NAME)?;
        Ok(Self::new(features, approved_amount))
    }

    /// Build one buffer row: the five features followed by the label
    pub fn to_row(&self) -> [f64; FEATURE_COUNT + 1] {
        let f = self.features.to_vector();
        [f[0], f[1], f[2], f[3], f[4], self.approved_amount]
    }
}

/// Parse a batch of claims. One bad record rejects the whole batch; the
/// error carries the index of the first offender.
pub fn parse_claims(claims: &[Value]) -> Result<Vec<TrainingRecord>, ValidationError> {
    claims
        .iter()
        .enumerate()
        .map(|(idx, claim)| TrainingRecord::from_json(claim).map_err(|e| e.at_record(idx)))
        .collect()
}

/// Accept either a bare JSON array of records or `{"claims": [...]}`
pub fn parse_claims_document(doc: &Value) -> Result<Vec<TrainingRecord>, ValidationError> {
    match doc {
        Value::Array(items) => parse_claims(items),
        Value::Object(obj) => match obj.get("claims") {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(items)) => parse_claims(items),
            Some(_) => Err(ValidationError::NotAnArray),
        },
        _ => Err(ValidationError::NotAnArray),
    }
}

fn numeric_field(obj: &Map<String, Value>, name: &str) -> Result<f64, ValidationError> {
    match obj.get(name) {
        None | Some(Value::Null) => Err(ValidationError::field(None, name, FieldProblem::Missing)),
        Some(Value::Number(n)) => n
            .as_f64()
            .filter(|v| v.is_finite())
            .ok_or_else(|| ValidationError::field(None, name, FieldProblem::NotFinite)),
        Some(_) => Err(ValidationError::field(None, name, FieldProblem::NotNumeric)),
    }
}
