//! Training Buffer Store - durable, append-only log of labeled records
//!
//! Stored as a CSV file with a fixed header (five features, then the label).
//! Every append rewrites the whole file through `persist::atomic_write`, so a
//! failed append leaves the previous contents in place.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

use crate::error::{LifecycleError, LifecycleResult};
use crate::types::{FeatureInput, TrainingRecord, FEATURE_COUNT, FEATURE_NAMES, LABEL_NAME};

use super::persist::atomic_write;

/// Persistent training buffer backed by a CSV file
pub struct TrainingBufferStore {
    path: PathBuf,
    /// Serializes read-modify-write appends against reads
    lock: Mutex<()>,
}

impl TrainingBufferStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append a batch, all or nothing. Returns the record count afterwards.
    ///
    /// Every record is validated before any I/O; one invalid record rejects
    /// the batch.
    pub fn append(&self, records: &[TrainingRecord]) -> LifecycleResult<usize> {
        for (idx, record) in records.iter().enumerate() {
            record.validate().map_err(|e| e.at_record(idx))?;
        }

        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        let existing = self.read_unlocked()?;
        if records.is_empty() {
            return Ok(existing.len());
        }

        let mut content = String::with_capacity((existing.len() + records.len() + 1) * 64);
        content.push_str(&header_line());
        for record in existing.iter().chain(records) {
            push_row(&mut content, record);
        }

        atomic_write(&self.path, content.as_bytes())?;

        let total = existing.len() + records.len();
        debug!("Appended {} records to {}, total {}", records.len(), self.path.display(), total);
        Ok(total)
    }

    /// Every stored record, in insertion order
    pub fn load_all(&self) -> LifecycleResult<Vec<TrainingRecord>> {
        let _guard = self.lock.lock().unwrap_or_else(|e| e.into_inner());
        self.read_unlocked()
    }

    /// Number of stored records
    pub fn len(&self) -> LifecycleResult<usize> {
        Ok(self.load_all()?.len())
    }

    pub fn is_empty(&self) -> LifecycleResult<bool> {
        Ok(self.len()? == 0)
    }

    fn read_unlocked(&self) -> LifecycleResult<Vec<TrainingRecord>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&self.path)
            .map_err(|e| LifecycleError::io("reading", &self.path, e))?;
        parse_buffer(&content)
    }
}

fn header_line() -> String {
    let mut line = FEATURE_NAMES.join(",");
    line.push(',');
    line.push_str(LABEL_NAME);
    line.push('\n');
    line
}

fn push_row(out: &mut String, record: &TrainingRecord) {
    let row = record.to_row();
    for (i, value) in row.iter().enumerate() {
        if i > 0 {
            out.push(',');
        }
        // `{}` on f64 prints the shortest string that parses back exactly
        let _ = write!(out, "{}", value);
    }
    out.push('\n');
}

fn parse_buffer(content: &str) -> LifecycleResult<Vec<TrainingRecord>> {
    let mut lines = content.lines().enumerate();

    match lines.next() {
        None => return Ok(Vec::new()),
        Some((_, header)) => {
            if header.trim() != header_line().trim_end() {
                return Err(LifecycleError::CorruptBuffer {
                    line: 1,
                    reason: format!("unexpected header '{}'", header.trim()),
                });
            }
        }
    }

    let mut records = Vec::new();
    for (idx, line) in lines {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }
        records.push(parse_row(line, line_no)?);
    }
    Ok(records)
}

fn parse_row(line: &str, line_no: usize) -> LifecycleResult<TrainingRecord> {
    let cells: Vec<&str> = line.split(',').map(str::trim).collect();
    if cells.len() != FEATURE_COUNT + 1 {
        return Err(LifecycleError::CorruptBuffer {
            line: line_no,
            reason: format!("expected {} columns, found {}", FEATURE_COUNT + 1, cells.len()),
        });
    }

    let mut values = [0.0f64; FEATURE_COUNT + 1];
    for (slot, cell) in values.iter_mut().zip(&cells) {
        *slot = cell
            .parse::<f64>()
            .ok()
            .filter(|v| v.is_finite())
            .ok_or_else(|| LifecycleError::CorruptBuffer {
                line: line_no,
                reason: format!("'{}' is not a finite number", cell),
            })?;
    }

    let features = FeatureInput::from_vector([values[0], values[1], values[2], values[3], values[4]]);
    Ok(TrainingRecord::new(features, values[FEATURE_COUNT]))
}
