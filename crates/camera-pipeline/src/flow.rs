//! Flow control: measured frame rates and the frame-skip decision.
//!
//! Two independent windows are kept per camera. The input window measures
//! what the decoder actually produces and drives skip-ratio adaptation; the
//! output window measures what reaches the host and exists only for
//! observability. They must never be conflated.

use std::time::{Duration, Instant};

use crate::config;

/// Windowed rate counter.
pub(crate) struct FpsWindow {
    window: Duration,
    started: Instant,
    frames: u64,
    last: Option<f64>,
}

impl FpsWindow {
    pub(crate) fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            started: now,
            frames: 0,
            last: None,
        }
    }

    /// Count one frame; returns the measured rate each time a full window
    /// closes, resetting for the next one.
    pub(crate) fn record(&mut self, now: Instant) -> Option<f64> {
        self.frames += 1;
        let elapsed = now.duration_since(self.started);
        if elapsed < self.window {
            return None;
        }
        let secs = elapsed.as_secs_f64();
        if secs <= 0.0 {
            return None;
        }
        let fps = self.frames as f64 / secs;
        self.last = Some(fps);
        self.frames = 0;
        self.started = now;
        Some(fps)
    }

    pub(crate) fn last(&self) -> Option<f64> {
        self.last
    }

    pub(crate) fn reset(&mut self, now: Instant) {
        self.started = now;
        self.frames = 0;
    }
}

/// Current source frame-rate estimate, seeded from the container and
/// replaced by live measurements.
pub(crate) struct SourceRate {
    fps: f64,
    measured: bool,
}

impl SourceRate {
    /// Seed from the container's guess; implausible values fall back to the
    /// default until measurement catches up.
    pub(crate) fn from_guess(guess: Option<f64>) -> Self {
        let fps = match guess {
            Some(rate)
                if (config::GUESSED_FPS_MIN..=config::GUESSED_FPS_MAX).contains(&rate) =>
            {
                rate
            }
            _ => config::DEFAULT_SOURCE_FPS,
        };
        Self {
            fps,
            measured: false,
        }
    }

    pub(crate) fn fps(&self) -> f64 {
        self.fps
    }

    /// Offer a windowed measurement. The first real measurement always wins;
    /// afterwards only meaningful shifts replace the estimate. Returns true
    /// when the estimate changed.
    pub(crate) fn adopt(&mut self, measured: f64) -> bool {
        if measured <= 0.0 {
            return false;
        }
        if self.measured && (measured - self.fps).abs() <= config::SOURCE_FPS_ADOPT_DELTA {
            return false;
        }
        self.fps = measured;
        self.measured = true;
        true
    }
}

/// Fractional-accumulator frame skipping for frames without timestamps.
///
/// With a ratio of N, one frame in N is sent and the fractional remainder
/// carries over, so a 25 → 10 FPS reduction really lands on 10 and not on a
/// truncated 12.5.
pub(crate) struct SkipPolicy {
    ratio: f64,
    count: u32,
    accumulator: f64,
}

impl SkipPolicy {
    pub(crate) fn send_all() -> Self {
        Self {
            ratio: 1.0,
            count: 1,
            accumulator: 0.0,
        }
    }

    pub(crate) fn for_rates(source_fps: f64, target_fps: f64) -> Self {
        let mut policy = Self::send_all();
        policy.configure(source_fps, target_fps);
        policy
    }

    /// Recompute the ratio from the current rates, keeping the accumulated
    /// fraction so a mid-stream adjustment does not hiccup the cadence.
    pub(crate) fn configure(&mut self, source_fps: f64, target_fps: f64) {
        self.ratio = if target_fps > 0.0 && source_fps > target_fps {
            source_fps / target_fps.max(f64::EPSILON)
        } else {
            1.0
        };
        self.count = (self.ratio.floor() as u32).max(1);
    }

    pub(crate) fn ratio(&self) -> f64 {
        self.ratio
    }

    pub(crate) fn count(&self) -> u32 {
        self.count
    }

    /// Counter-mode decision for a frame that carries no PTS.
    pub(crate) fn should_send_unpaced(&mut self) -> bool {
        if self.ratio <= 1.0 {
            return true;
        }
        self.accumulator += 1.0;
        if self.accumulator >= self.ratio {
            self.accumulator -= self.ratio;
            true
        } else {
            false
        }
    }
}

/// Timestamp-mode decimator: deliveries are scheduled one target interval
/// apart in stream time, and the schedule advances by exactly one interval
/// per send. The fractional debt this carries is what lands a 25 fps source
/// on a requested 10 fps instead of the 8.3 that a naive
/// frame-to-frame-delta rule produces.
///
/// A discontinuity in either direction far beyond the schedule is sent and
/// resynchronised, so the pacer can re-anchor instead of the stream
/// freezing or bursting after a PTS jump.
pub(crate) struct PtsGate {
    next_due: Option<f64>,
}

impl PtsGate {
    pub(crate) fn new() -> Self {
        Self { next_due: None }
    }

    pub(crate) fn reset(&mut self) {
        self.next_due = None;
    }

    /// Decide on a frame at `pts`, with the interval and jump threshold
    /// expressed in stream ticks.
    pub(crate) fn should_send(&mut self, pts: i64, interval_ticks: f64, jump_ticks: f64) -> bool {
        let pts = pts as f64;
        let Some(due) = self.next_due else {
            self.next_due = Some(pts + interval_ticks);
            return true;
        };
        if (pts - due).abs() > jump_ticks + interval_ticks {
            self.next_due = Some(pts + interval_ticks);
            return true;
        }
        if pts >= due {
            // Advance by one interval, but never fall a full interval
            // behind the stream: sources slower than the target get every
            // frame without accumulating phantom debt.
            self.next_due = Some((due + interval_ticks).max(pts));
            return true;
        }
        false
    }
}
