//! PTS-anchored presentation pacing.
//!
//! The first delivered frame pairs its PTS with a monotonic instant (the
//! anchor); every later frame is due at `anchor + (pts - first_pts) *
//! time_base`. Frames arriving early sleep until their due time, late frames
//! go out immediately, and a discontinuity beyond the jump threshold drops
//! the anchor and starts over, so wall-clock gaps in the source never turn
//! into frozen output or a delivery burst.

use std::time::{Duration, Instant};

use crate::config::PacingThresholds;

/// What to do with the frame that is about to be delivered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum PaceDecision {
    /// Deliver immediately; `late` carries the overdue amount when it
    /// crossed the catch-up threshold.
    SendNow { late: Option<Duration> },
    /// Deliver after sleeping until the target instant.
    SleepUntil(Instant),
}

pub(crate) struct PtsPacer {
    time_base: f64,
    thresholds: PacingThresholds,
    first_pts: Option<i64>,
    anchor: Option<Instant>,
    last_sent_pts_sec: f64,
}

impl PtsPacer {
    pub(crate) fn new(thresholds: PacingThresholds) -> Self {
        Self {
            time_base: 0.0,
            thresholds,
            first_pts: None,
            anchor: None,
            last_sent_pts_sec: 0.0,
        }
    }

    /// Drop any anchor and adopt the stream's time base; called on every
    /// (re)connection.
    pub(crate) fn reset(&mut self, time_base: f64) {
        self.time_base = time_base;
        self.first_pts = None;
        self.anchor = None;
        self.last_sent_pts_sec = 0.0;
    }

    pub(crate) fn time_base(&self) -> f64 {
        self.time_base
    }

    /// Decide when the frame carrying `pts` should go out.
    pub(crate) fn plan(&mut self, pts: i64, now: Instant) -> PaceDecision {
        let (Some(first), Some(mut anchor)) = (self.first_pts, self.anchor) else {
            self.first_pts = Some(pts);
            self.anchor = Some(now);
            self.last_sent_pts_sec = 0.0;
            return PaceDecision::SendNow { late: None };
        };

        let mut pts_sec = (pts - first) as f64 * self.time_base;
        if (pts_sec - self.last_sent_pts_sec).abs() > self.thresholds.pts_jump_reset_sec {
            self.first_pts = Some(pts);
            self.anchor = Some(now);
            self.last_sent_pts_sec = 0.0;
            anchor = now;
            pts_sec = 0.0;
        }

        let target = if pts_sec >= 0.0 {
            anchor + Duration::from_secs_f64(pts_sec)
        } else {
            anchor
                .checked_sub(Duration::from_secs_f64(-pts_sec))
                .unwrap_or(now)
        };

        if now < target {
            let early = target.duration_since(now).as_secs_f64();
            if early > self.thresholds.early_sleep_sec {
                return PaceDecision::SleepUntil(target);
            }
            return PaceDecision::SendNow { late: None };
        }

        let lateness = now.duration_since(target);
        let late = (lateness.as_secs_f64() > self.thresholds.lateness_catchup_sec)
            .then_some(lateness);
        PaceDecision::SendNow { late }
    }

    /// Record that the frame carrying `pts` was actually delivered.
    pub(crate) fn committed(&mut self, pts: i64) {
        if let Some(first) = self.first_pts {
            self.last_sent_pts_sec = (pts - first) as f64 * self.time_base;
        }
    }

    #[cfg(test)]
    pub(crate) fn last_sent_pts_sec(&self) -> f64 {
        self.last_sent_pts_sec
    }
}

/// Fallback pacing for frames without timestamps: time the delivery off the
/// previous send. Returns how long to wait, or `None` when already due.
pub(crate) fn interval_delay(
    last_sent: Option<Instant>,
    now: Instant,
    interval: Duration,
) -> Option<Duration> {
    let due = last_sent? + interval;
    (due > now).then(|| due - now)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pacer(time_base: f64) -> PtsPacer {
        let mut pacer = PtsPacer::new(PacingThresholds::default());
        pacer.reset(time_base);
        pacer
    }

    #[test]
    fn first_frame_sends_and_anchors() {
        let mut pacer = pacer(1.0 / 90_000.0);
        let t0 = Instant::now();
        assert_eq!(pacer.plan(1_000, t0), PaceDecision::SendNow { late: None });
        pacer.committed(1_000);
        assert_eq!(pacer.last_sent_pts_sec(), 0.0);
    }

    #[test]
    fn early_frame_sleeps_until_its_target() {
        let tb = 1.0 / 90_000.0;
        let mut pacer = pacer(tb);
        let t0 = Instant::now();
        pacer.plan(0, t0);
        pacer.committed(0);

        // Next frame is due 500 ms after the anchor but shows up right away.
        match pacer.plan(45_000, t0) {
            PaceDecision::SleepUntil(target) => {
                let wait = target.duration_since(t0);
                assert!((wait.as_secs_f64() - 0.5).abs() < 1e-6, "wait {wait:?}");
            }
            other => panic!("expected sleep, got {other:?}"),
        }
    }

    #[test]
    fn slightly_early_frame_is_sent_without_sleeping() {
        let tb = 1.0 / 1_000.0;
        let mut pacer = pacer(tb);
        let t0 = Instant::now();
        pacer.plan(0, t0);
        pacer.committed(0);

        // Due in 30 ms, below the 50 ms early-sleep threshold.
        assert_eq!(
            pacer.plan(30, t0),
            PaceDecision::SendNow { late: None }
        );
    }

    #[test]
    fn late_frame_catches_up_immediately() {
        let tb = 1.0 / 1_000.0;
        let mut pacer = pacer(tb);
        let t0 = Instant::now();
        pacer.plan(0, t0);
        pacer.committed(0);

        // Frame due 100 ms after anchor arrives 400 ms late.
        match pacer.plan(100, t0 + Duration::from_millis(500)) {
            PaceDecision::SendNow { late: Some(late) } => {
                assert!((late.as_secs_f64() - 0.4).abs() < 1e-6, "late {late:?}");
            }
            other => panic!("expected late send, got {other:?}"),
        }
    }

    #[test]
    fn forward_jump_re_anchors() {
        let tb = 1.0 / 1_000.0;
        let mut pacer = pacer(tb);
        let t0 = Instant::now();
        pacer.plan(0, t0);
        pacer.committed(0);

        // A 10 s PTS leap would otherwise schedule far into the future.
        let now = t0 + Duration::from_millis(40);
        assert_eq!(pacer.plan(10_000, now), PaceDecision::SendNow { late: None });
        pacer.committed(10_000);
        assert_eq!(pacer.last_sent_pts_sec(), 0.0);

        // Cadence continues from the new anchor.
        match pacer.plan(10_100, now) {
            PaceDecision::SleepUntil(target) => {
                assert!((target.duration_since(now).as_secs_f64() - 0.1).abs() < 1e-6);
            }
            other => panic!("expected sleep after re-anchor, got {other:?}"),
        }
    }

    #[test]
    fn backward_jump_re_anchors() {
        let tb = 1.0 / 1_000.0;
        let mut pacer = pacer(tb);
        let t0 = Instant::now();
        pacer.plan(5_000, t0);
        pacer.committed(5_000);

        let now = t0 + Duration::from_millis(10);
        assert_eq!(pacer.plan(1_000, now), PaceDecision::SendNow { late: None });
        pacer.committed(1_000);
        assert_eq!(pacer.last_sent_pts_sec(), 0.0);
    }

    #[test]
    fn small_backward_jitter_does_not_reset() {
        let tb = 1.0 / 1_000.0;
        let mut pacer = pacer(tb);
        let t0 = Instant::now();
        pacer.plan(1_000, t0);
        pacer.committed(1_000);

        // 200 ms backwards, inside the 1 s jump threshold: target lies in
        // the past, so it sends without re-anchoring.
        let now = t0 + Duration::from_millis(5);
        assert_eq!(
            pacer.plan(800, now),
            PaceDecision::SendNow { late: None }
        );
        pacer.committed(800);
        assert!((pacer.last_sent_pts_sec() - (-0.2)).abs() < 1e-9);
    }

    #[test]
    fn sent_pts_seconds_increase_strictly_between_anchors() {
        let tb = 1.0 / 90_000.0;
        let mut pacer = pacer(tb);
        let mut now = Instant::now();

        // A steady 25 fps stream delivered on schedule: each committed
        // position must advance.
        let mut previous = f64::MIN;
        for frame in 0..50i64 {
            let pts = frame * 3_600;
            match pacer.plan(pts, now) {
                PaceDecision::SendNow { .. } => {}
                PaceDecision::SleepUntil(target) => now = target,
            }
            pacer.committed(pts);
            let sent = pacer.last_sent_pts_sec();
            assert!(
                sent > previous || (frame == 0 && sent == 0.0),
                "frame {frame}: {sent} did not advance past {previous}"
            );
            previous = sent;
        }
    }

    #[test]
    fn interval_delay_only_waits_when_ahead() {
        let t0 = Instant::now();
        let interval = Duration::from_millis(100);
        assert_eq!(interval_delay(None, t0, interval), None);

        let wait = interval_delay(Some(t0), t0 + Duration::from_millis(40), interval)
            .expect("should wait");
        assert_eq!(wait, Duration::from_millis(60));

        assert_eq!(
            interval_delay(Some(t0), t0 + Duration::from_millis(150), interval),
            None
        );
    }
}
