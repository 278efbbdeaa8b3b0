//! Model Registry - owner of the single committed model artifact
//!
//! Holds the current artifact behind a `RwLock` as an `Arc`. Readers clone the
//! `Arc` and drop the lock at once; publishing persists first and then swaps
//! the pointer, so readers only ever see a complete artifact.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};

use crate::error::{LifecycleError, LifecycleResult};
use crate::hooks::{EventContext, EventPoint, EventRegistry};

use super::model::ModelArtifact;
use super::persist::atomic_write;

/// Cache state of the committed artifact
enum Slot {
    /// Disk not consulted yet
    Unloaded,
    /// Disk consulted; `None` means no artifact exists
    Loaded(Option<Arc<ModelArtifact>>),
}

pub struct ModelRegistry {
    path: PathBuf,
    slot: RwLock<Slot>,
    /// Serializes publishers; readers never take it
    publish_lock: Mutex<()>,
    events: Arc<EventRegistry>,
}

impl ModelRegistry {
    pub fn new(path: impl Into<PathBuf>, events: Arc<EventRegistry>) -> Self {
        Self {
            path: path.into(),
            slot: RwLock::new(Slot::Unloaded),
            publish_lock: Mutex::new(()),
            events,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The committed artifact, loading it from disk on first use
    pub fn current(&self) -> LifecycleResult<Option<Arc<ModelArtifact>>> {
        {
            let slot = self.slot.read().unwrap_or_else(|e| e.into_inner());
            if let Slot::Loaded(current) = &*slot {
                return Ok(current.clone());
            }
        }

        // Read and parse outside the lock so readers never wait on disk
        let loaded = self.load_from_disk()?.map(Arc::new);

        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        // A concurrent load or publish won; theirs is at least as new as ours
        if let Slot::Loaded(current) = &*slot {
            return Ok(current.clone());
        }

        if let Some(artifact) = &loaded {
            info!("Loaded model v{} from {}", artifact.version, self.path.display());
            self.events.emit(
                &EventContext::new(EventPoint::ModelLoaded)
                    .with_data("version", artifact.version)
                    .with_data("samples_seen", artifact.samples_seen),
            );
        } else {
            debug!("No model artifact at {}", self.path.display());
        }
        *slot = Slot::Loaded(loaded.clone());
        Ok(loaded)
    }

    /// Persist `artifact`, then make it current. On error nothing changes.
    pub fn publish(&self, artifact: ModelArtifact) -> LifecycleResult<Arc<ModelArtifact>> {
        let _publishing = self.publish_lock.lock().unwrap_or_else(|e| e.into_inner());

        let bytes = artifact.to_json()?;
        atomic_write(&self.path, &bytes)?;

        let artifact = Arc::new(artifact);
        {
            let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
            *slot = Slot::Loaded(Some(artifact.clone()));
        }

        info!("Published model v{} to {}", artifact.version, self.path.display());
        self.events.emit(
            &EventContext::new(EventPoint::ModelPublished)
                .with_data("version", artifact.version)
                .with_data("samples_seen", artifact.samples_seen),
        );
        Ok(artifact)
    }

    /// Drop the cached artifact; the next `current()` reads disk again
    pub fn invalidate(&self) {
        let mut slot = self.slot.write().unwrap_or_else(|e| e.into_inner());
        *slot = Slot::Unloaded;
        debug!("Model cache invalidated");
    }

    pub fn reload(&self) -> LifecycleResult<Option<Arc<ModelArtifact>>> {
        self.invalidate();
        self.current()
    }

    fn load_from_disk(&self) -> LifecycleResult<Option<ModelArtifact>> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LifecycleError::io("reading", &self.path, e)),
        };
        ModelArtifact::from_json(&bytes).map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::learning::model::SgdParams;

    fn registry(dir: &Path) -> ModelRegistry {
        ModelRegistry::new(dir.join("amount_model.json"), Arc::new(EventRegistry::new()))
    }

    fn artifact(version: u64) -> ModelArtifact {
        let mut a = ModelArtifact::new(SgdParams::default());
        a.version = version;
        a
    }

    #[test]
    fn test_empty_registry_has_no_model() {
        let dir = tempfile::tempdir().unwrap();
        assert!(registry(dir.path()).current().unwrap().is_none());
    }

    #[test]
    fn test_publish_then_restart_sees_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let first = registry(dir.path());
        first.publish(artifact(1)).unwrap();
        assert_eq!(first.current().unwrap().unwrap().version, 1);

        let restarted = registry(dir.path());
        assert_eq!(restarted.current().unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_current_is_cached_until_reload() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.publish(artifact(1)).unwrap();

        // Another process replaces the file on disk
        let other = registry(dir.path());
        other.publish(artifact(7)).unwrap();

        assert_eq!(reg.current().unwrap().unwrap().version, 1);
        assert_eq!(reg.reload().unwrap().unwrap().version, 7);
    }

    #[test]
    fn test_failed_publish_keeps_previous_artifact() {
        let dir = tempfile::tempdir().unwrap();
        let reg = registry(dir.path());
        reg.publish(artifact(1)).unwrap();

        // Replace the artifact path with a non-empty directory so the rename fails
        let path = reg.path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        assert!(reg.publish(artifact(2)).is_err());
        assert_eq!(reg.current().unwrap().unwrap().version, 1);
    }

    #[test]
    fn test_corrupt_artifact_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("amount_model.json"), b"garbage").unwrap();
        let err = registry(dir.path()).current().unwrap_err();
        assert!(matches!(err, LifecycleError::CorruptArtifact(_)));
        assert!(!err.is_caller_error());
    }

    #[test]
    fn test_publish_emits_event() {
        let dir = tempfile::tempdir().unwrap();
        let events = Arc::new(EventRegistry::new());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        events.register(
            EventPoint::ModelPublished,
            "capture",
            0,
            Arc::new(move |ctx| {
                sink.lock().unwrap().push(ctx.get_u64("version"));
                Ok(())
            }),
        );

        let reg = ModelRegistry::new(dir.path().join("m.json"), events);
        reg.publish(artifact(3)).unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![Some(3)]);
    }

    #[test]
    fn test_concurrent_cold_loads_install_one_artifact() {
        let dir = tempfile::tempdir().unwrap();
        registry(dir.path()).publish(artifact(4)).unwrap();

        let events = Arc::new(EventRegistry::new());
        let loads = Arc::new(Mutex::new(0u32));
        let counter = loads.clone();
        events.register(
            EventPoint::ModelLoaded,
            "count",
            0,
            Arc::new(move |_| {
                *counter.lock().unwrap() += 1;
                Ok(())
            }),
        );
        let reg = Arc::new(ModelRegistry::new(dir.path().join("amount_model.json"), events));
        let barrier = Arc::new(std::sync::Barrier::new(8));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let reg = reg.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    barrier.wait();
                    reg.current().unwrap().unwrap()
                })
            })
            .collect();
        let seen: Vec<Arc<ModelArtifact>> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        // Every caller got the single cached instance
        let cached = reg.current().unwrap().unwrap();
        assert!(seen.iter().all(|a| Arc::ptr_eq(a, &cached)));
        assert_eq!(cached.version, 4);
        assert_eq!(*loads.lock().unwrap(), 1);
    }
}
