//! Per-camera worker: connection lifecycle, decode pump, frame skipping,
//! presentation pacing, stall detection, and reconnection.
//!
//! Each camera runs this loop on its own thread. The worker owns every media
//! resource it touches; the registry and the interrupt hook only see the
//! shared control block with its atomic stop flag.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use media_io::{
    ffmpeg, BgrScaler, Input, InterruptHook, IoStatus, OpenOptions, VideoDecoder, VideoStreamInfo,
};

use crate::callbacks::{FrameCallback, StatusCallback};
use crate::config::{self, PacingThresholds};
use crate::flow::{FpsWindow, PtsGate, SkipPolicy, SourceRate};
use crate::interrupt::InterruptChannel;
use crate::logger::{camera_log, logger, ActivityKind, LogLevel};
use crate::pacing::{interval_delay, PaceDecision, PtsPacer};
use crate::pool::{FramePool, SourceImage};
use crate::state::{CameraId, CameraState};

/// Control block shared between a worker, the registry, and the interrupt
/// hook. The worker is the only writer of the state field; `stop_requested`
/// may be set from any thread.
pub(crate) struct PipelineShared {
    pub(crate) camera_id: CameraId,
    pub(crate) url: String,
    pub(crate) stop_requested: AtomicBool,
    /// Set while the worker is between entering `Connecting` and having a
    /// working decoder.
    pub(crate) initializing: AtomicBool,
    state: Mutex<Option<CameraState>>,
    status_cb: StatusCallback,
    frame_cb: FrameCallback,
}

impl PipelineShared {
    pub(crate) fn new(
        camera_id: CameraId,
        url: String,
        status_cb: StatusCallback,
        frame_cb: FrameCallback,
    ) -> Self {
        Self {
            camera_id,
            url,
            stop_requested: AtomicBool::new(false),
            initializing: AtomicBool::new(false),
            state: Mutex::new(None),
            status_cb,
            frame_cb,
        }
    }

    pub(crate) fn request_stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    /// Whether the worker is currently inside its connect/decoder-setup
    /// window.
    pub(crate) fn is_initializing(&self) -> bool {
        self.initializing.load(Ordering::SeqCst)
    }

    fn stopping(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Publish a state change. Repeats of the current state are suppressed,
    /// so observers see a duplicate-free, ordered stream.
    fn post_state(&self, state: CameraState, message: &str) {
        {
            let mut current = match self.state.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            if *current == Some(state) {
                return;
            }
            *current = Some(state);
        }
        camera_log!(
            logger(),
            self.camera_id,
            LogLevel::Info,
            "state changed to {state}: {message}"
        );
        (self.status_cb)(self.camera_id, state, message);
    }
}

/// Per-worker settings fixed at registration time.
pub(crate) struct WorkerConfig {
    pub(crate) target_fps: f64,
    pub(crate) thresholds: PacingThresholds,
    pub(crate) open_options: OpenOptions,
}

/// Thread entry point; never panics back into the registry.
pub(crate) fn run(
    shared: Arc<PipelineShared>,
    pool: Arc<FramePool>,
    interrupts: InterruptChannel,
    worker_config: WorkerConfig,
) {
    Worker::new(shared, pool, interrupts, worker_config).run();
}

/// One connected input with its decoder and cached stream metadata.
struct Connection {
    input: Input,
    stream: VideoStreamInfo,
    decoder: VideoDecoder,
}

enum ConnectOutcome {
    Ready(Box<Connection>),
    Stopped,
    Failed(String),
}

enum PumpExit {
    Stop,
    Reconnect(String),
}

enum DeliverOutcome {
    Sent,
    Skipped,
    Dropped,
    Stop,
    Failed(String),
}

struct Worker {
    shared: Arc<PipelineShared>,
    pool: Arc<FramePool>,
    interrupts: InterruptChannel,
    target_fps: f64,
    thresholds: PacingThresholds,
    open_options: OpenOptions,

    // Media scratch state, reused across reconnections.
    packet: ffmpeg::Packet,
    decoded: ffmpeg::frame::Video,
    bgr: ffmpeg::frame::Video,
    scaler: BgrScaler,

    // Flow control, reset on every (re)connection.
    pacer: PtsPacer,
    gate: PtsGate,
    skip: SkipPolicy,
    source_rate: SourceRate,
    input_window: FpsWindow,
    output_window: FpsWindow,
    last_sent_pts: Option<i64>,
    last_frame_sent: Option<Instant>,
    last_activity: Instant,
    reconnect_attempts: u32,
}

impl Worker {
    fn new(
        shared: Arc<PipelineShared>,
        pool: Arc<FramePool>,
        interrupts: InterruptChannel,
        worker_config: WorkerConfig,
    ) -> Self {
        let now = Instant::now();
        Self {
            shared,
            pool,
            interrupts,
            target_fps: worker_config.target_fps,
            thresholds: worker_config.thresholds,
            open_options: worker_config.open_options,
            packet: ffmpeg::Packet::empty(),
            decoded: ffmpeg::frame::Video::empty(),
            bgr: ffmpeg::frame::Video::empty(),
            scaler: BgrScaler::new(),
            pacer: PtsPacer::new(worker_config.thresholds),
            gate: PtsGate::new(),
            skip: SkipPolicy::send_all(),
            source_rate: SourceRate::from_guess(None),
            input_window: FpsWindow::new(config::FPS_WINDOW, now),
            output_window: FpsWindow::new(config::FPS_WINDOW, now),
            last_sent_pts: None,
            last_frame_sent: None,
            last_activity: now,
            reconnect_attempts: 0,
        }
    }

    fn run(&mut self) {
        let id = self.shared.camera_id;
        camera_log!(
            logger(),
            id,
            LogLevel::Info,
            "worker started for {}",
            self.shared.url
        );

        loop {
            if self.stopping() {
                break;
            }

            self.shared.initializing.store(true, Ordering::SeqCst);
            self.shared.post_state(CameraState::Connecting, "connecting");
            if self.stopping() {
                break;
            }

            let connection = match self.connect() {
                ConnectOutcome::Ready(connection) => connection,
                ConnectOutcome::Stopped => break,
                ConnectOutcome::Failed(reason) => {
                    self.shared.initializing.store(false, Ordering::SeqCst);
                    if self.reconnect_pause(&reason) {
                        break;
                    }
                    continue;
                }
            };
            self.shared.initializing.store(false, Ordering::SeqCst);

            self.reset_flow(&connection);
            self.reconnect_attempts = 0;
            self.shared.post_state(CameraState::Connected, "connected");
            if self.stopping() {
                break;
            }

            match self.pump(*connection) {
                PumpExit::Stop => break,
                PumpExit::Reconnect(reason) => {
                    if self.reconnect_pause(&reason) {
                        break;
                    }
                }
            }
        }

        self.shared
            .post_state(CameraState::Stopped, "worker stopped");
        camera_log!(logger(), id, LogLevel::Info, "worker exited");
    }

    /// Open the input and bring up a decoder for its best video stream.
    ///
    /// Open failures that look like plain I/O trouble are retried here
    /// forever with a linearly growing, stop-aware back-off; the pipeline
    /// never gives up on its own, only a stop request ends the attempts.
    /// Anything else falls through to the caller's reconnect path.
    fn connect(&mut self) -> ConnectOutcome {
        let id = self.shared.camera_id;
        let mut attempt: u32 = 0;

        let input = loop {
            if self.stopping() {
                return ConnectOutcome::Stopped;
            }
            match Input::open(&self.shared.url, &self.open_options, self.interrupt_hook()) {
                Ok(input) => break input,
                Err(err) if err.is_retryable_open() => {
                    attempt = attempt.saturating_add(1);
                    let delay =
                        Duration::from_secs(u64::from(attempt)).min(config::OPEN_RETRY_DELAY_CAP);
                    camera_log!(
                        logger(),
                        id,
                        LogLevel::Warning,
                        "open failed ({err}), retrying in {}s",
                        delay.as_secs()
                    );
                    if self.sleep_checking_stop(delay, config::STOP_POLL_INTERVAL) {
                        return ConnectOutcome::Stopped;
                    }
                }
                Err(err) => {
                    camera_log!(
                        logger(),
                        id,
                        LogLevel::Warning,
                        "failed to open {}: {err}",
                        self.shared.url
                    );
                    return ConnectOutcome::Failed(format!("connection failed: {err}"));
                }
            }
        };

        let stream = match input.best_video_stream() {
            Ok(stream) => stream,
            Err(err) => {
                camera_log!(logger(), id, LogLevel::Warning, "stream discovery failed: {err}");
                return ConnectOutcome::Failed(format!("no usable video stream: {err}"));
            }
        };
        let decoder = match VideoDecoder::open(&stream) {
            Ok(decoder) => decoder,
            Err(err) => {
                camera_log!(logger(), id, LogLevel::Warning, "decoder setup failed: {err}");
                return ConnectOutcome::Failed(format!("decoder setup failed: {err}"));
            }
        };

        camera_log!(
            logger(),
            id,
            LogLevel::Info,
            "opened stream {} ({:?}), time base {:.9}, container rate {:?}",
            stream.index,
            stream.codec_id,
            stream.time_base,
            stream.guessed_fps
        );
        ConnectOutcome::Ready(Box::new(Connection {
            input,
            stream,
            decoder,
        }))
    }

    /// Reset all flow-control state for a fresh connection.
    fn reset_flow(&mut self, connection: &Connection) {
        let now = Instant::now();
        self.pacer.reset(connection.stream.time_base);
        self.gate.reset();
        self.source_rate = SourceRate::from_guess(connection.stream.guessed_fps);
        self.skip = SkipPolicy::for_rates(self.source_rate.fps(), self.target_fps);
        self.input_window.reset(now);
        self.output_window.reset(now);
        self.last_sent_pts = None;
        self.last_frame_sent = None;
        self.last_activity = now;

        camera_log!(
            logger(),
            self.shared.camera_id,
            LogLevel::Info,
            "flow configured: source {:.2} fps, target {:.2} fps, skip ratio {:.2} (1 in {})",
            self.source_rate.fps(),
            self.target_fps,
            self.skip.ratio(),
            self.skip.count()
        );
    }

    /// Read, decode, skip, pace, and dispatch until something forces a stop
    /// or a reconnect.
    fn pump(&mut self, mut connection: Connection) -> PumpExit {
        let id = self.shared.camera_id;

        loop {
            if self.stopping() {
                return PumpExit::Stop;
            }
            if self.last_activity.elapsed() > config::STALL_TIMEOUT {
                camera_log!(
                    logger(),
                    id,
                    LogLevel::Warning,
                    "stall detected: no decoder activity for {}s (last measured input rate {:?})",
                    config::STALL_TIMEOUT.as_secs(),
                    self.input_window.last()
                );
                return PumpExit::Reconnect("stall detected".into());
            }

            match connection.input.read_into(&mut self.packet) {
                Ok(IoStatus::Ok) => {}
                Ok(IoStatus::Again) => continue,
                Ok(IoStatus::Eof) => {
                    camera_log!(logger(), id, LogLevel::Info, "end of stream");
                    return PumpExit::Reconnect("end of stream".into());
                }
                Err(err) => {
                    // Interrupted reads land here; map them back onto the
                    // stop flag before treating this as a stream failure.
                    if self.stopping() {
                        return PumpExit::Stop;
                    }
                    camera_log!(logger(), id, LogLevel::Warning, "read failed: {err}");
                    return PumpExit::Reconnect(format!("read error: {err}"));
                }
            }

            if self.packet.stream() != connection.stream.index {
                continue;
            }
            logger().log_activity(id, ActivityKind::PacketRead, 0.0);

            if let Err(err) = connection.decoder.send(&self.packet) {
                // Keep draining: frames may still be buffered inside the
                // decoder even when it rejects this packet.
                camera_log!(
                    logger(),
                    id,
                    LogLevel::Warning,
                    "decoder rejected packet: {err}"
                );
            }

            loop {
                match connection.decoder.receive(&mut self.decoded) {
                    Ok(IoStatus::Ok) => {}
                    Ok(IoStatus::Again) | Ok(IoStatus::Eof) => break,
                    Err(err) => {
                        camera_log!(logger(), id, LogLevel::Warning, "decode failed: {err}");
                        return PumpExit::Reconnect(format!("decode error: {err}"));
                    }
                }

                let now = Instant::now();
                self.last_activity = now;
                logger().log_activity(id, ActivityKind::FrameDecoded, 0.0);
                self.measure_input(now);

                match self.deliver_decoded(now) {
                    DeliverOutcome::Sent | DeliverOutcome::Skipped | DeliverOutcome::Dropped => {}
                    DeliverOutcome::Stop => return PumpExit::Stop,
                    DeliverOutcome::Failed(reason) => return PumpExit::Reconnect(reason),
                }
            }

            if self.stopping() {
                return PumpExit::Stop;
            }
        }
    }

    /// Close the input-rate window and fold fresh measurements into the
    /// skip configuration.
    fn measure_input(&mut self, now: Instant) {
        let Some(measured) = self.input_window.record(now) else {
            return;
        };
        let id = self.shared.camera_id;
        metrics::gauge!("camera_input_fps", "camera" => id.to_string()).set(measured);
        logger().log_heartbeat(id, "pipeline");

        if self.source_rate.adopt(measured) {
            self.skip.configure(self.source_rate.fps(), self.target_fps);
            camera_log!(
                logger(),
                id,
                LogLevel::Debug,
                "measured source rate {:.2} fps adopted, skip ratio {:.2} (1 in {})",
                measured,
                self.skip.ratio(),
                self.skip.count()
            );
        }
    }

    /// Skip/pace/convert/dispatch for the frame sitting in `self.decoded`.
    fn deliver_decoded(&mut self, decoded_at: Instant) -> DeliverOutcome {
        let id = self.shared.camera_id;
        let pts = self.decoded.pts();

        let send = match pts {
            Some(pts) => {
                let time_base = self.pacer.time_base();
                if time_base > 0.0 {
                    let interval_ticks = self.target_interval_sec() / time_base;
                    let jump_ticks = self.thresholds.pts_jump_reset_sec / time_base;
                    self.gate.should_send(pts, interval_ticks, jump_ticks)
                } else {
                    self.skip.should_send_unpaced()
                }
            }
            None => self.skip.should_send_unpaced(),
        };
        if !send {
            return DeliverOutcome::Skipped;
        }

        match pts {
            Some(pts) => match self.pacer.plan(pts, Instant::now()) {
                PaceDecision::SleepUntil(target) => {
                    if self.sleep_until_checking_stop(target) {
                        return DeliverOutcome::Stop;
                    }
                }
                PaceDecision::SendNow { late: Some(late) } => {
                    camera_log!(
                        logger(),
                        id,
                        LogLevel::Debug,
                        "running {:.3}s behind target, catching up",
                        late.as_secs_f64()
                    );
                }
                PaceDecision::SendNow { late: None } => {}
            },
            None => {
                let interval = Duration::from_secs_f64(self.target_interval_sec());
                if let Some(delay) = interval_delay(self.last_frame_sent, Instant::now(), interval)
                {
                    if self.sleep_checking_stop(delay, config::PACING_SLEEP_SLICE) {
                        return DeliverOutcome::Stop;
                    }
                }
            }
        }
        if self.stopping() {
            return DeliverOutcome::Stop;
        }

        if let Err(err) = self.scaler.run(&self.decoded, &mut self.bgr) {
            camera_log!(logger(), id, LogLevel::Error, "scaling failed: {err}");
            return DeliverOutcome::Failed(format!("scaling failed: {err}"));
        }

        let source = SourceImage {
            width: self.bgr.width(),
            height: self.bgr.height(),
            stride: self.bgr.stride(0),
            pts,
            data: self.bgr.data(0),
        };
        let Some(frame) = self.pool.acquire(id, &source) else {
            metrics::counter!("camera_frames_dropped_total", "camera" => id.to_string())
                .increment(1);
            return DeliverOutcome::Dropped;
        };
        (self.shared.frame_cb)(frame);

        let sent_at = Instant::now();
        logger().log_activity(
            id,
            ActivityKind::FrameDelivered,
            sent_at.duration_since(decoded_at).as_secs_f64() * 1_000.0,
        );

        if let Some(pts) = pts {
            self.pacer.committed(pts);
            self.last_sent_pts = Some(pts);
        }
        self.last_frame_sent = Some(sent_at);
        if let Some(fps) = self.output_window.record(sent_at) {
            metrics::gauge!("camera_output_fps", "camera" => id.to_string()).set(fps);
            camera_log!(
                logger(),
                id,
                LogLevel::Debug,
                "delivered {fps:.2} fps over the last window (last sent pts {:?})",
                self.last_sent_pts
            );
        }
        DeliverOutcome::Sent
    }

    /// Run the disconnect/back-off/reconnect sequence. Returns true when a
    /// stop arrived anywhere inside it.
    fn reconnect_pause(&mut self, reason: &str) -> bool {
        let id = self.shared.camera_id;
        self.shared.post_state(CameraState::Disconnected, reason);
        if self.stopping() {
            return true;
        }

        self.reconnect_attempts = self.reconnect_attempts.saturating_add(1);
        metrics::counter!("camera_reconnects_total", "camera" => id.to_string()).increment(1);
        let delay = reconnect_delay(self.reconnect_attempts);
        let message = format!(
            "waiting {}s before reconnect (attempt {})",
            delay.as_secs(),
            self.reconnect_attempts
        );
        self.shared
            .post_state(CameraState::WaitingReconnect, &message);
        camera_log!(logger(), id, LogLevel::Info, "{message}");

        if self.sleep_checking_stop(delay, config::STOP_POLL_INTERVAL) {
            return true;
        }
        self.shared
            .post_state(CameraState::Reconnecting, "reconnecting");
        self.stopping()
    }

    fn interrupt_hook(&self) -> InterruptHook {
        let shared = Arc::clone(&self.shared);
        let interrupts = self.interrupts.clone();
        Box::new(move || {
            shared.stop_requested.load(Ordering::SeqCst) || interrupts.consume_pending()
        })
    }

    /// Seconds between deliveries: the requested rate when set, otherwise
    /// the measured source rate.
    fn target_interval_sec(&self) -> f64 {
        if self.target_fps > 0.0 {
            1.0 / self.target_fps
        } else if self.source_rate.fps() > 0.0 {
            1.0 / self.source_rate.fps()
        } else {
            0.033
        }
    }

    fn stopping(&self) -> bool {
        self.shared.stopping()
    }

    /// Sleep in slices, bailing out as soon as a stop is requested.
    /// Returns true when interrupted by a stop.
    fn sleep_checking_stop(&self, total: Duration, slice: Duration) -> bool {
        self.sleep_until(Instant::now() + total, slice)
    }

    fn sleep_until_checking_stop(&self, deadline: Instant) -> bool {
        self.sleep_until(deadline, config::PACING_SLEEP_SLICE)
    }

    fn sleep_until(&self, deadline: Instant, slice: Duration) -> bool {
        loop {
            if self.stopping() {
                return true;
            }
            let now = Instant::now();
            if now >= deadline {
                return false;
            }
            thread::sleep(slice.min(deadline - now));
        }
    }
}

/// Back-off before reconnect attempt `attempts` (1-based).
fn reconnect_delay(attempts: u32) -> Duration {
    let seconds = (config::RECONNECT_DELAY_BASE_SECS * u64::from(attempts))
        .clamp(config::RECONNECT_DELAY_MIN_SECS, config::RECONNECT_DELAY_MAX_SECS);
    Duration::from_secs(seconds)
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn reconnect_delay_is_linear_and_clamped() {
        assert_eq!(reconnect_delay(1), Duration::from_secs(2));
        assert_eq!(reconnect_delay(3), Duration::from_secs(6));
        assert_eq!(reconnect_delay(15), Duration::from_secs(30));
        assert_eq!(reconnect_delay(100), Duration::from_secs(30));
    }

    #[test]
    fn post_state_suppresses_duplicates() {
        let events: Arc<Mutex<Vec<(CameraState, String)>>> = Arc::new(Mutex::new(Vec::new()));
        let sink = events.clone();
        let shared = PipelineShared::new(
            CameraId::new(0),
            "rtsp://example/stream".into(),
            Arc::new(move |_, state, message| {
                sink.lock().unwrap().push((state, message.to_string()));
            }),
            Arc::new(|_| {}),
        );

        shared.post_state(CameraState::Connecting, "connecting");
        shared.post_state(CameraState::Connecting, "connecting");
        shared.post_state(CameraState::Connected, "connected");
        shared.post_state(CameraState::Disconnected, "gone");
        shared.post_state(CameraState::Connecting, "connecting");

        let seen: Vec<CameraState> = events.lock().unwrap().iter().map(|(s, _)| *s).collect();
        assert_eq!(
            seen,
            vec![
                CameraState::Connecting,
                CameraState::Connected,
                CameraState::Disconnected,
                CameraState::Connecting,
            ]
        );
    }

    #[test]
    fn stop_flag_flips_once() {
        let shared = PipelineShared::new(
            CameraId::new(1),
            "rtsp://example/stream".into(),
            Arc::new(|_, _, _| {}),
            Arc::new(|_| {}),
        );
        assert!(!shared.stopping());
        shared.request_stop();
        assert!(shared.stopping());
    }
}
