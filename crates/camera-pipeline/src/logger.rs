//! Per-camera logging with rotation, plus liveness and timing counters.
//!
//! Each camera gets its own lazily-created log file; every line also echoes
//! through the process-wide `tracing` dispatcher so nothing disappears when
//! file I/O misbehaves. File logging is off until [`CameraLogger::configure_files`]
//! supplies a directory. All of it is best effort: a logging failure must
//! never take a pipeline down.

use std::collections::HashMap;
use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::time::{Duration, Instant};

use chrono::Local;

use crate::state::CameraId;

/// Severity ordering matches the numeric filter: a level is emitted when its
/// value is at or below the configured one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Error = 0,
    Warning = 1,
    Info = 2,
    Debug = 3,
    Trace = 4,
}

impl LogLevel {
    fn tag(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Warning => "WARN ",
            LogLevel::Info => "INFO ",
            LogLevel::Debug => "DEBUG",
            LogLevel::Trace => "TRACE",
        }
    }

    fn from_u8(value: u8) -> Self {
        match value {
            0 => LogLevel::Error,
            1 => LogLevel::Warning,
            2 => LogLevel::Info,
            3 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }
}

/// File sink configuration.
#[derive(Clone, Debug)]
pub struct LogConfig {
    /// Directory receiving one `camera_<id>.log` per camera.
    pub directory: PathBuf,
    /// Size threshold after which a file is rotated away, in megabytes.
    pub max_file_size_mb: u64,
    /// Active severity filter.
    pub level: LogLevel,
}

/// Activities the pipeline reports into the performance tracker.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ActivityKind {
    PacketRead,
    FrameDecoded,
    FrameDelivered,
}

impl ActivityKind {
    fn label(self) -> &'static str {
        match self {
            ActivityKind::PacketRead => "packet_read",
            ActivityKind::FrameDecoded => "frame_decoded",
            ActivityKind::FrameDelivered => "frame_delivered",
        }
    }
}

/// Snapshot of one camera's performance counters.
#[derive(Clone, Debug)]
pub struct PerformanceStats {
    pub activities: u64,
    pub mean_processing_ms: f64,
    pub last_activity_age: Duration,
    pub last_frame_age: Option<Duration>,
}

struct Sink {
    file: File,
    path: PathBuf,
    written: u64,
}

struct FileState {
    directory: Option<PathBuf>,
    max_bytes: u64,
    sinks: HashMap<CameraId, Arc<Mutex<Sink>>>,
}

struct Performance {
    last_activity: Instant,
    last_frame: Option<Instant>,
    activities: u64,
    total_processing_ms: f64,
    heartbeats: HashMap<&'static str, Instant>,
}

/// Thread-safe per-camera log and counter hub.
pub struct CameraLogger {
    level: AtomicU8,
    files: Mutex<FileState>,
    perf: Mutex<HashMap<CameraId, Performance>>,
}

impl CameraLogger {
    pub fn new() -> Self {
        Self {
            level: AtomicU8::new(LogLevel::Info as u8),
            files: Mutex::new(FileState {
                directory: None,
                max_bytes: 0,
                sinks: HashMap::new(),
            }),
            perf: Mutex::new(HashMap::new()),
        }
    }

    /// Enable file sinks under `config.directory`. Existing sinks are
    /// dropped so the next write reopens under the new settings.
    pub fn configure_files(&self, config: LogConfig) -> io::Result<()> {
        fs::create_dir_all(&config.directory)?;
        self.set_level(config.level);
        let mut files = lock_unpoisoned(&self.files);
        files.directory = Some(config.directory);
        files.max_bytes = config.max_file_size_mb.saturating_mul(1024 * 1024);
        files.sinks.clear();
        Ok(())
    }

    pub fn set_level(&self, level: LogLevel) {
        self.level.store(level as u8, Ordering::Relaxed);
    }

    pub fn level(&self) -> LogLevel {
        LogLevel::from_u8(self.level.load(Ordering::Relaxed))
    }

    /// Cheap filter check, meant to run before any message formatting.
    pub fn enabled(&self, level: LogLevel) -> bool {
        level <= self.level()
    }

    /// Emit one line for `camera_id`: console echo first, then the file
    /// sink when configured.
    pub fn write(&self, camera_id: CameraId, level: LogLevel, args: fmt::Arguments<'_>) {
        let message = args.to_string();

        match level {
            LogLevel::Error => tracing::error!(camera = camera_id.get(), "{message}"),
            LogLevel::Warning => tracing::warn!(camera = camera_id.get(), "{message}"),
            LogLevel::Info => tracing::info!(camera = camera_id.get(), "{message}"),
            LogLevel::Debug => tracing::debug!(camera = camera_id.get(), "{message}"),
            LogLevel::Trace => tracing::trace!(camera = camera_id.get(), "{message}"),
        }

        let Some(sink) = self.sink_for(camera_id) else {
            return;
        };
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S%.6f");
        let line = format!("{timestamp} [{}] {message}\n", level.tag());

        let max_bytes = lock_unpoisoned(&self.files).max_bytes;
        let mut sink = lock_unpoisoned(&sink);
        if max_bytes > 0 && sink.written.saturating_add(line.len() as u64) > max_bytes {
            rotate(&mut sink);
        }
        if sink.file.write_all(line.as_bytes()).is_ok() {
            sink.written = sink.written.saturating_add(line.len() as u64);
        }
    }

    /// Record one unit of pipeline work for the stall and timing counters.
    pub fn log_activity(&self, camera_id: CameraId, kind: ActivityKind, processing_ms: f64) {
        let now = Instant::now();
        let mut perf = lock_unpoisoned(&self.perf);
        let entry = perf.entry(camera_id).or_insert_with(|| Performance {
            last_activity: now,
            last_frame: None,
            activities: 0,
            total_processing_ms: 0.0,
            heartbeats: HashMap::new(),
        });
        entry.last_activity = now;
        entry.activities = entry.activities.saturating_add(1);
        entry.total_processing_ms += processing_ms.max(0.0);
        if kind == ActivityKind::FrameDelivered {
            entry.last_frame = Some(now);
        }
        tracing::trace!(
            camera = camera_id.get(),
            kind = kind.label(),
            processing_ms,
            "activity"
        );
    }

    /// Record that `component` of a camera's worker is alive.
    pub fn log_heartbeat(&self, camera_id: CameraId, component: &'static str) {
        let now = Instant::now();
        let mut perf = lock_unpoisoned(&self.perf);
        let entry = perf.entry(camera_id).or_insert_with(|| Performance {
            last_activity: now,
            last_frame: None,
            activities: 0,
            total_processing_ms: 0.0,
            heartbeats: HashMap::new(),
        });
        entry.heartbeats.insert(component, now);
    }

    /// True when a tracked camera has gone quiet: no activity, or no
    /// delivered frame, within `timeout`. Untracked cameras report false.
    pub fn check_processing_stall(&self, camera_id: CameraId, timeout: Duration) -> bool {
        let perf = lock_unpoisoned(&self.perf);
        let Some(entry) = perf.get(&camera_id) else {
            return false;
        };
        if entry.last_activity.elapsed() > timeout {
            return true;
        }
        matches!(entry.last_frame, Some(last) if last.elapsed() > timeout)
    }

    pub fn performance_stats(&self, camera_id: CameraId) -> Option<PerformanceStats> {
        let perf = lock_unpoisoned(&self.perf);
        let entry = perf.get(&camera_id)?;
        let mean = if entry.activities > 0 {
            entry.total_processing_ms / entry.activities as f64
        } else {
            0.0
        };
        Some(PerformanceStats {
            activities: entry.activities,
            mean_processing_ms: mean,
            last_activity_age: entry.last_activity.elapsed(),
            last_frame_age: entry.last_frame.map(|at| at.elapsed()),
        })
    }

    /// Age of the most recent heartbeat for one worker component.
    pub fn heartbeat_age(&self, camera_id: CameraId, component: &str) -> Option<Duration> {
        let perf = lock_unpoisoned(&self.perf);
        perf.get(&camera_id)?
            .heartbeats
            .get(component)
            .map(|at| at.elapsed())
    }

    /// Forget a camera's counters once its pipeline is gone.
    pub fn forget(&self, camera_id: CameraId) {
        lock_unpoisoned(&self.perf).remove(&camera_id);
        lock_unpoisoned(&self.files).sinks.remove(&camera_id);
    }

    fn sink_for(&self, camera_id: CameraId) -> Option<Arc<Mutex<Sink>>> {
        let mut files = lock_unpoisoned(&self.files);
        let directory = files.directory.clone()?;
        if let Some(sink) = files.sinks.get(&camera_id) {
            return Some(sink.clone());
        }
        let path = directory.join(format!("camera_{camera_id}.log"));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .ok()?;
        let written = file.metadata().map(|meta| meta.len()).unwrap_or(0);
        let sink = Arc::new(Mutex::new(Sink {
            file,
            path,
            written,
        }));
        files.sinks.insert(camera_id, sink.clone());
        Some(sink)
    }
}

impl Default for CameraLogger {
    fn default() -> Self {
        Self::new()
    }
}

/// Rename the full file with a timestamp suffix and start a fresh one.
fn rotate(sink: &mut Sink) {
    let stamp = Local::now().format("%Y%m%d_%H%M%S%.3f");
    let rotated = sink.path.with_extension(format!("{stamp}.log"));
    if let Err(err) = fs::rename(&sink.path, &rotated) {
        tracing::warn!(path = %sink.path.display(), %err, "log rotation rename failed");
        return;
    }
    match OpenOptions::new().create(true).append(true).open(&sink.path) {
        Ok(file) => {
            sink.file = file;
            sink.written = 0;
        }
        Err(err) => {
            tracing::warn!(path = %sink.path.display(), %err, "log reopen after rotation failed");
        }
    }
}

fn lock_unpoisoned<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Process-wide logger used by the pipeline internals.
pub fn logger() -> &'static CameraLogger {
    static LOGGER: OnceLock<CameraLogger> = OnceLock::new();
    LOGGER.get_or_init(CameraLogger::new)
}

/// Level-filtered logging against a [`CameraLogger`]; the message is only
/// formatted when the level passes the filter.
macro_rules! camera_log {
    ($logger:expr, $id:expr, $level:expr, $($arg:tt)+) => {
        if $logger.enabled($level) {
            $logger.write($id, $level, format_args!($($arg)+));
        }
    };
}
pub(crate) use camera_log;

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_config(dir: &tempfile::TempDir, level: LogLevel) -> LogConfig {
        LogConfig {
            directory: dir.path().to_path_buf(),
            max_file_size_mb: 1,
            level,
        }
    }

    #[test]
    fn level_filter_gates_formatting() {
        let log = CameraLogger::new();
        log.set_level(LogLevel::Warning);
        assert!(log.enabled(LogLevel::Error));
        assert!(log.enabled(LogLevel::Warning));
        assert!(!log.enabled(LogLevel::Info));
        assert!(!log.enabled(LogLevel::Trace));
    }

    #[test]
    fn writes_land_in_per_camera_files() {
        let dir = tempfile::tempdir().unwrap();
        let log = CameraLogger::new();
        log.configure_files(temp_config(&dir, LogLevel::Debug)).unwrap();

        camera_log!(log, CameraId::new(4), LogLevel::Info, "stream {} opened", "rtsp");
        camera_log!(log, CameraId::new(9), LogLevel::Warning, "pool exhausted");

        let four = fs::read_to_string(dir.path().join("camera_4.log")).unwrap();
        assert!(four.contains("stream rtsp opened"));
        assert!(four.contains("[INFO ]"));

        let nine = fs::read_to_string(dir.path().join("camera_9.log")).unwrap();
        assert!(nine.contains("pool exhausted"));
        assert!(!nine.contains("stream rtsp opened"));
    }

    #[test]
    fn oversized_file_rotates_with_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let log = CameraLogger::new();
        log.configure_files(temp_config(&dir, LogLevel::Info)).unwrap();

        let filler = "x".repeat(4096);
        // Push past the 1 MiB threshold.
        for _ in 0..300 {
            camera_log!(log, CameraId::new(1), LogLevel::Info, "{filler}");
        }

        let entries: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().into_string().unwrap())
            .collect();
        assert!(entries.iter().any(|name| name == "camera_1.log"));
        assert!(
            entries
                .iter()
                .any(|name| name.starts_with("camera_1.") && name != "camera_1.log"),
            "expected a rotated file, got {entries:?}"
        );

        // The live file restarted below the threshold.
        let live = fs::metadata(dir.path().join("camera_1.log")).unwrap();
        assert!(live.len() < 1024 * 1024);
    }

    #[test]
    fn stall_check_tracks_activity_and_frames() {
        let log = CameraLogger::new();
        let id = CameraId::new(2);

        assert!(!log.check_processing_stall(id, Duration::ZERO));

        log.log_activity(id, ActivityKind::FrameDecoded, 1.5);
        assert!(!log.check_processing_stall(id, Duration::from_secs(60)));
        assert!(log.check_processing_stall(id, Duration::ZERO));

        log.log_activity(id, ActivityKind::FrameDelivered, 2.5);
        let stats = log.performance_stats(id).unwrap();
        assert_eq!(stats.activities, 2);
        assert!((stats.mean_processing_ms - 2.0).abs() < 1e-9);
        assert!(stats.last_frame_age.is_some());
    }

    #[test]
    fn heartbeats_are_tracked_per_component() {
        let log = CameraLogger::new();
        let id = CameraId::new(5);
        assert!(log.heartbeat_age(id, "pipeline").is_none());
        log.log_heartbeat(id, "pipeline");
        assert!(log.heartbeat_age(id, "pipeline").unwrap() < Duration::from_secs(5));
        log.forget(id);
        assert!(log.heartbeat_age(id, "pipeline").is_none());
    }
}
