//! Lifecycle event hooks
//!
//! The trainer, registry and prediction engine announce what they did through
//! an `EventRegistry` instead of printing. Handlers are registered with a
//! priority and fire in order; a failing handler is logged and skipped, it can
//! never change the outcome of the operation that fired it.

use anyhow::Result;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Points in the model lifecycle where events fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventPoint {
    TrainingStarted,
    TrainingSkipped,
    TrainingCompleted,
    TrainingFailed,
    ModelPublished,
    ModelLoaded,
    PredictionServed,
}

impl EventPoint {
    pub fn all() -> &'static [EventPoint] {
        &[
            EventPoint::TrainingStarted,
            EventPoint::TrainingSkipped,
            EventPoint::TrainingCompleted,
            EventPoint::TrainingFailed,
            EventPoint::ModelPublished,
            EventPoint::ModelLoaded,
            EventPoint::PredictionServed,
        ]
    }
}

impl std::fmt::Display for EventPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventPoint::TrainingStarted => write!(f, "training_started"),
            EventPoint::TrainingSkipped => write!(f, "training_skipped"),
            EventPoint::TrainingCompleted => write!(f, "training_completed"),
            EventPoint::TrainingFailed => write!(f, "training_failed"),
            EventPoint::ModelPublished => write!(f, "model_published"),
            EventPoint::ModelLoaded => write!(f, "model_loaded"),
            EventPoint::PredictionServed => write!(f, "prediction_served"),
        }
    }
}

/// Context passed to event handlers
#[derive(Debug, Clone)]
pub struct EventContext {
    pub point: EventPoint,
    /// Correlates all events of one training cycle
    pub cycle_id: Option<Uuid>,
    pub data: HashMap<String, serde_json::Value>,
    pub timestamp: DateTime<Utc>,
}

impl EventContext {
    pub fn new(point: EventPoint) -> Self {
        Self {
            point,
            cycle_id: None,
            data: HashMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn for_cycle(mut self, cycle_id: Uuid) -> Self {
        self.cycle_id = Some(cycle_id);
        self
    }

    pub fn with_data(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.to_string(), value.into());
        self
    }

    pub fn get_u64(&self, key: &str) -> Option<u64> {
        self.data.get(key).and_then(|v| v.as_u64())
    }
}

/// Type alias for event handler functions
pub type EventFn = Arc<dyn Fn(&EventContext) -> Result<()> + Send + Sync>;

struct RegisteredHandler {
    name: String,
    priority: i32,
    handler: EventFn,
}

/// Central event registry, shared by every lifecycle component
pub struct EventRegistry {
    handlers: RwLock<HashMap<EventPoint, Vec<RegisteredHandler>>>,
}

impl EventRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the tracing handler attached to every point
    pub fn with_tracing() -> Self {
        let registry = Self::new();
        let handler: EventFn = Arc::new(log_event);
        for point in EventPoint::all() {
            registry.register(*point, "tracing", 100, handler.clone());
        }
        registry
    }

    /// Register a handler at a specific point
    pub fn register(&self, point: EventPoint, name: &str, priority: i32, handler: EventFn) {
        let entry = RegisteredHandler {
            name: name.to_string(),
            priority,
            handler,
        };

        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let list = handlers.entry(point).or_default();
        list.push(entry);
        // Lower priority fires earlier
        list.sort_by_key(|h| h.priority);

        debug!("Registered event handler '{}' at {} with priority {}", name, point, priority);
    }

    /// Unregister a handler by name
    pub fn unregister(&self, point: EventPoint, name: &str) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = handlers.get_mut(&point) {
            let before = list.len();
            list.retain(|h| h.name != name);
            let removed = list.len() < before;
            if removed {
                debug!("Unregistered event handler '{}' from {}", name, point);
            }
            removed
        } else {
            false
        }
    }

    /// Fire all handlers for the context's point
    pub fn emit(&self, context: &EventContext) {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        if let Some(list) = handlers.get(&context.point) {
            for entry in list {
                if let Err(e) = (entry.handler)(context) {
                    warn!("Event handler '{}' at {} failed: {}", entry.name, context.point, e);
                }
            }
        }
    }

    /// Check if any handlers are registered for a point
    pub fn has_handlers(&self, point: EventPoint) -> bool {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.get(&point).map(|h| !h.is_empty()).unwrap_or(false)
    }

    /// Get count of registered handlers
    pub fn handler_count(&self) -> usize {
        let handlers = self.handlers.read().unwrap_or_else(|e| e.into_inner());
        handlers.values().map(|v| v.len()).sum()
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn log_event(ctx: &EventContext) -> Result<()> {
    let data = serde_json::to_string(&ctx.data)?;
    match ctx.point {
        EventPoint::TrainingFailed => {
            warn!(event = %ctx.point, cycle = ?ctx.cycle_id, %data, "training cycle failed")
        }
        EventPoint::TrainingCompleted => {
            info!(
                event = %ctx.point,
                cycle = ?ctx.cycle_id,
                records = ?ctx.get_u64("records"),
                "training cycle completed"
            )
        }
        EventPoint::PredictionServed => debug!(event = %ctx.point, %data, "prediction served"),
        _ => info!(event = %ctx.point, cycle = ?ctx.cycle_id, %data, "lifecycle event"),
    }
    Ok(())
}
