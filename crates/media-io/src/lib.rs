//! Thin, well-defined facade over FFmpeg for live camera ingestion.
//!
//! The crate wraps exactly the slice of libav the camera pipeline needs:
//! opening a network input with low-latency options, picking the best video
//! stream, pumping packets through a single-threaded decoder, and scaling
//! decoded frames to packed BGR24. Blocking calls are cancellable through a
//! per-input interrupt hook.
//!
//! Everything here is meant to be created, used, and dropped on one thread;
//! the pipeline gives each camera its own worker and never shares these
//! wrappers across threads.

use std::sync::OnceLock;

pub use ffmpeg_next as ffmpeg;

pub use error::{IoStatus, MediaError};
pub use input::{Input, VideoStreamInfo};
pub use interrupt::InterruptHook;
pub use options::OpenOptions;
pub use scale::BgrScaler;

pub use decode::VideoDecoder;

mod decode;
mod error;
mod input;
mod interrupt;
mod options;
mod scale;

/// Pixel format code delivered to hosts for packed BGR24 buffers.
pub const BGR24_FORMAT_CODE: i32 = ffmpeg::ffi::AVPixelFormat::AV_PIX_FMT_BGR24 as i32;

/// One-time process-wide library initialisation: codec registration, the
/// network stack, and clamping FFmpeg's own logging to errors so per-frame
/// chatter never reaches the console.
pub fn ensure_init() -> Result<(), MediaError> {
    static INIT: OnceLock<Result<(), ffmpeg::Error>> = OnceLock::new();

    let result = INIT.get_or_init(|| {
        ffmpeg::init()?;
        unsafe {
            ffmpeg::ffi::avformat_network_init();
            ffmpeg::ffi::av_log_set_level(ffmpeg::ffi::AV_LOG_ERROR as i32);
        }
        Ok(())
    });

    result.clone().map_err(MediaError::Ffmpeg)
}
