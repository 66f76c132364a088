//! Process-wide registry owning every camera pipeline.
//!
//! The registry is the only component that creates or forgets workers. Its
//! map is the source of truth for id ownership: an id becomes reusable the
//! instant its entry is removed, even if the worker is still winding down.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};

use crate::callbacks::{FrameCallback, StatusCallback};
use crate::config::{self, PacingThresholds};
use crate::error::ApiError;
use crate::interrupt::InterruptChannel;
use crate::pipeline::{self, PipelineShared, WorkerConfig};
use crate::pool::{FrameHandle, FramePool};
use crate::state::CameraId;

struct CameraHandle {
    shared: Arc<PipelineShared>,
    worker: thread::JoinHandle<()>,
}

struct RegistryState {
    initialized: bool,
    cameras: HashMap<CameraId, CameraHandle>,
}

/// Registry of running camera pipelines plus the resources they share: the
/// frame delivery pool and the interruption channel.
pub struct Registry {
    state: Mutex<RegistryState>,
    pool: Arc<FramePool>,
    interrupts: InterruptChannel,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(RegistryState {
                initialized: false,
                cameras: HashMap::new(),
            }),
            pool: Arc::new(FramePool::new()),
            interrupts: InterruptChannel::new(),
        }
    }

    /// Bring the system up: media library, delivery pool, interruption
    /// channel. Safe to call repeatedly.
    pub fn initialize(&self) -> Result<(), ApiError> {
        let mut state = self.lock();
        if state.initialized {
            debug!("registry already initialized");
            return Ok(());
        }
        if let Err(err) = media_io::ensure_init() {
            // Network init failures degrade file/HTTP inputs but are not
            // fatal for the registry itself.
            warn!(%err, "media library initialization reported an error");
        }
        self.pool.initialize(config::FRAME_POOL_SIZE);
        self.interrupts.drain();
        state.initialized = true;
        info!(
            max_cameras = config::MAX_CAMERAS,
            pool_size = config::FRAME_POOL_SIZE,
            "camera registry initialized"
        );
        Ok(())
    }

    /// Register a camera under `id` and start its worker.
    pub fn add_camera(
        &self,
        id: CameraId,
        url: &str,
        status_cb: StatusCallback,
        frame_cb: FrameCallback,
        target_fps: i32,
    ) -> Result<(), ApiError> {
        let mut state = self.lock();
        if !state.initialized {
            return Err(ApiError::NotInitialized);
        }
        if url.trim().is_empty() {
            return Err(ApiError::InvalidUrl);
        }
        if !id.is_valid() || state.cameras.contains_key(&id) {
            return Err(ApiError::CameraIdUnavailable(id));
        }

        // A wakeup left over from a previous stop must not abort this
        // pipeline's first blocking call.
        self.interrupts.drain();

        let shared = Arc::new(PipelineShared::new(
            id,
            url.to_string(),
            status_cb,
            frame_cb,
        ));
        let worker_shared = shared.clone();
        let worker_pool = self.pool.clone();
        let worker_interrupts = self.interrupts.clone();
        let worker_config = WorkerConfig {
            target_fps: config::effective_target_fps(target_fps),
            thresholds: PacingThresholds::default(),
            open_options: media_io::OpenOptions::default(),
        };

        let spawned = thread::Builder::new()
            .name(format!("camera-{id}"))
            .spawn(move || {
                pipeline::run(worker_shared, worker_pool, worker_interrupts, worker_config)
            });

        match spawned {
            Ok(worker) => {
                state.cameras.insert(id, CameraHandle { shared, worker });
                info!(camera = %id, url, target_fps, "camera registered");
                Ok(())
            }
            Err(err) => {
                warn!(camera = %id, %err, "worker thread creation failed");
                Err(ApiError::WorkerSpawn(id))
            }
        }
    }

    /// Stop one camera. The id is released immediately; the worker gets a
    /// bounded grace period and is detached if it overruns.
    pub fn stop_camera(&self, id: CameraId) -> Result<(), ApiError> {
        let handle = {
            let mut state = self.lock();
            if !state.initialized {
                return Err(ApiError::NotInitialized);
            }
            let Some(handle) = state.cameras.remove(&id) else {
                return Err(ApiError::CameraNotFound(id));
            };
            handle.shared.request_stop();
            handle
        };
        self.interrupts.notify();
        info!(
            camera = %id,
            initializing = handle.shared.is_initializing(),
            "stop requested, id released"
        );

        if !join_with_timeout(handle.worker, config::STOP_JOIN_TIMEOUT) {
            warn!(camera = %id, "worker did not exit within budget, detaching");
        }
        crate::logger::logger().forget(id);
        Ok(())
    }

    /// Stop everything and release the shared resources. Always succeeds;
    /// calling it on an uninitialized registry is a no-op.
    pub fn shutdown(&self) {
        let cameras = {
            let mut state = self.lock();
            if !state.initialized {
                debug!("shutdown on an uninitialized registry");
                return;
            }
            state.initialized = false;
            std::mem::take(&mut state.cameras)
        };

        info!(count = cameras.len(), "shutting down camera registry");
        for handle in cameras.values() {
            handle.shared.request_stop();
            self.interrupts.notify();
        }
        for (id, handle) in cameras {
            if !join_with_timeout(handle.worker, config::STOP_JOIN_TIMEOUT) {
                warn!(camera = %id, "worker exceeded shutdown budget, detaching");
            }
            crate::logger::logger().forget(id);
        }

        self.interrupts.drain();
        self.pool.destroy();
        info!("camera registry shut down");
    }

    /// Return a delivered frame slot to the pool.
    pub fn release(&self, handle: FrameHandle) {
        self.pool.release(handle);
    }

    /// Number of currently registered cameras.
    pub fn camera_count(&self) -> usize {
        self.lock().cameras.len()
    }

    /// The delivery pool backing this registry.
    pub fn pool(&self) -> &FramePool {
        &self.pool
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

/// Poll a worker for up to `budget`, joining it when it finishes in time.
/// Returns false when the worker had to be detached.
fn join_with_timeout(worker: thread::JoinHandle<()>, budget: Duration) -> bool {
    let deadline = Instant::now() + budget;
    loop {
        if worker.is_finished() {
            let _ = worker.join();
            return true;
        }
        if Instant::now() >= deadline {
            drop(worker);
            return false;
        }
        thread::sleep(config::STOP_POLL_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    fn noop_callbacks() -> (StatusCallback, FrameCallback) {
        (Arc::new(|_, _, _| {}), Arc::new(|_| {}))
    }

    #[test]
    fn operations_require_initialization() {
        let registry = Registry::new();
        let (status_cb, frame_cb) = noop_callbacks();

        let err = registry
            .add_camera(CameraId::new(0), "rtsp://x", status_cb, frame_cb, 10)
            .unwrap_err();
        assert_eq!(err.code(), -1);
        assert_eq!(registry.stop_camera(CameraId::new(0)).unwrap_err().code(), -1);
    }

    #[test]
    fn add_camera_validates_inputs() {
        let registry = Registry::new();
        registry.initialize().unwrap();

        let (status_cb, frame_cb) = noop_callbacks();
        let err = registry
            .add_camera(CameraId::new(0), "  ", status_cb.clone(), frame_cb.clone(), 10)
            .unwrap_err();
        assert_eq!(err.code(), -3);

        let err = registry
            .add_camera(CameraId::new(-4), "rtsp://x", status_cb.clone(), frame_cb.clone(), 10)
            .unwrap_err();
        assert_eq!(err.code(), -4);

        let err = registry
            .add_camera(
                CameraId::new(config::MAX_CAMERAS as i32),
                "rtsp://x",
                status_cb,
                frame_cb,
                10,
            )
            .unwrap_err();
        assert_eq!(err.code(), -4);

        registry.shutdown();
    }

    #[test]
    fn initialize_is_idempotent() {
        let registry = Registry::new();
        registry.initialize().unwrap();
        registry.initialize().unwrap();
        assert_eq!(registry.pool().capacity(), config::FRAME_POOL_SIZE);
        registry.shutdown();
    }

    #[test]
    fn shutdown_without_initialize_is_a_noop() {
        let registry = Registry::new();
        registry.shutdown();
        assert_eq!(registry.camera_count(), 0);
    }

    #[test]
    fn stop_of_unknown_camera_reports_not_found() {
        let registry = Registry::new();
        registry.initialize().unwrap();
        assert_eq!(
            registry.stop_camera(CameraId::new(42)).unwrap_err().code(),
            -2
        );
        registry.shutdown();
    }
}
