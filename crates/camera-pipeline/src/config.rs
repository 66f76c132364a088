//! Compile-time tunables shared by every stage of the pipeline.

use std::time::Duration;

/// Upper bound on concurrently registered cameras.
pub const MAX_CAMERAS: usize = 128;

/// Delivery pool capacity; a few descriptors per camera absorbs hosts that
/// release a beat late without letting one camera starve the rest.
pub const FRAME_POOL_SIZE: usize = MAX_CAMERAS * 4;

/// Reconnect back-off: `clamp(base * attempts, min, max)` seconds.
pub const RECONNECT_DELAY_BASE_SECS: u64 = 2;
pub const RECONNECT_DELAY_MIN_SECS: u64 = 1;
pub const RECONNECT_DELAY_MAX_SECS: u64 = 30;

/// Longest single wait between open-input retries while connecting.
pub const OPEN_RETRY_DELAY_CAP: Duration = Duration::from_secs(5);

/// No decoded-frame activity for this long forces a reconnect.
pub const STALL_TIMEOUT: Duration = Duration::from_secs(30);

/// Width of the input and output FPS measurement windows.
pub const FPS_WINDOW: Duration = Duration::from_secs(5);

/// Source FPS assumed until the container guess or a live measurement
/// replaces it.
pub const DEFAULT_SOURCE_FPS: f64 = 30.0;

/// Container frame-rate guesses outside this band are ignored in favour of
/// [`DEFAULT_SOURCE_FPS`].
pub const GUESSED_FPS_MIN: f64 = 5.0;
pub const GUESSED_FPS_MAX: f64 = 65.0;

/// A fresh input-FPS measurement must differ from the current estimate by
/// more than this to be adopted.
pub const SOURCE_FPS_ADOPT_DELTA: f64 = 1.0;

/// Budget for a worker to exit after a stop request, and the poll interval
/// used while waiting it out.
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(3);
pub const STOP_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Granularity of interruptible pacing sleeps.
pub const PACING_SLEEP_SLICE: Duration = Duration::from_millis(10);

/// Thresholds steering the PTS-anchored presentation clock, in seconds.
#[derive(Clone, Copy, Debug)]
pub struct PacingThresholds {
    /// A frame must be at least this early for the pacer to sleep; anything
    /// closer is sent immediately.
    pub early_sleep_sec: f64,
    /// Lateness beyond this is reported as the pipeline running behind.
    pub lateness_catchup_sec: f64,
    /// A PTS discontinuity larger than this re-anchors the playback clock
    /// instead of stalling or bursting.
    pub pts_jump_reset_sec: f64,
}

impl Default for PacingThresholds {
    fn default() -> Self {
        Self {
            early_sleep_sec: 0.050,
            lateness_catchup_sec: 0.200,
            pts_jump_reset_sec: 1.0,
        }
    }
}

/// Clamp the host-requested rate: zero and negative values mean 1 FPS.
pub fn effective_target_fps(requested: i32) -> f64 {
    if requested <= 0 {
        1.0
    } else {
        f64::from(requested)
    }
}
