//! Concurrent multi-camera ingestion with paced BGR24 frame delivery.
//!
//! Each registered camera runs an independent worker thread that connects to
//! its stream (RTSP, HLS, RTMP, HTTP-MJPEG), decodes video, skips and paces
//! frames to the requested rate, and hands pixel buffers to the host through
//! callbacks. Dead or stalled streams reconnect on their own with bounded
//! back-off; only an explicit stop ends a pipeline.
//!
//! The crate is organised around four pieces:
//! - [`Registry`]: owns the pipelines, the delivery pool, and the shared
//!   interruption channel; exposed both as instances and as the process-wide
//!   top-level functions below.
//! - `pipeline`: the per-camera worker with its connection state machine.
//! - [`FramePool`]: bounded pool transferring decoded frames to the host;
//!   every delivered [`FrameDescriptor`] must be released exactly once.
//! - [`logger`]: per-camera file logs with rotation plus liveness counters,
//!   echoing through `tracing`.
//!
//! Console output goes through `tracing`; install a `tracing-subscriber` in
//! the host to see it.

use std::sync::LazyLock;

pub use callbacks::{FrameCallback, StatusCallback};
pub use error::ApiError;
pub use pool::{FrameDescriptor, FrameHandle, FramePool, PixelFormat, SourceImage};
pub use registry::Registry;
pub use state::{CameraId, CameraState};

pub mod config;
pub mod logger;

mod callbacks;
mod error;
mod flow;
mod interrupt;
mod pacing;
mod pipeline;
mod pool;
mod registry;
mod state;

static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

/// The process-wide registry behind the top-level functions.
pub fn registry() -> &'static Registry {
    &REGISTRY
}

/// Initialize the process-wide pipeline system. Idempotent.
pub fn initialize() -> Result<(), ApiError> {
    registry().initialize()
}

/// Register camera `id` and start ingesting `url`, delivering roughly
/// `target_fps` frames per second (values at or below zero mean 1).
pub fn add_camera(
    id: i32,
    url: &str,
    status_cb: StatusCallback,
    frame_cb: FrameCallback,
    target_fps: i32,
) -> Result<(), ApiError> {
    registry().add_camera(CameraId::new(id), url, status_cb, frame_cb, target_fps)
}

/// Stop camera `id`. Returns once the worker exited or its 3 s grace period
/// ran out; either way the id is free for reuse immediately.
pub fn stop_camera(id: i32) -> Result<(), ApiError> {
    registry().stop_camera(CameraId::new(id))
}

/// Stop all cameras and tear the system down.
pub fn shutdown() {
    registry().shutdown()
}

/// Return a delivered frame to the pool. Handles that are stale or foreign
/// are ignored with a warning.
pub fn release(handle: FrameHandle) {
    registry().release(handle)
}
