//! Demux wrapper: opening an input and pulling packets from it.

use std::ffi::CString;
use std::ptr;

use anyhow::anyhow;
use ffmpeg_next as ffmpeg;

use ffmpeg::ffi;

use crate::error::{classify, IoStatus, MediaError};
use crate::interrupt::{interrupt_trampoline, HookCell, InterruptHook};
use crate::options::{dictionary_for, OpenOptions};

/// Properties of the selected video stream, cached once at decoder setup so
/// the hot loop never touches the format context for metadata.
pub struct VideoStreamInfo {
    /// Demuxer stream index; packets from other streams are discarded.
    pub index: usize,
    /// Stream time base in seconds per PTS tick.
    pub time_base: f64,
    /// Container-declared frame rate, when one is present and positive.
    pub guessed_fps: Option<f64>,
    /// Codec carried by the stream.
    pub codec_id: ffmpeg::codec::Id,
    pub(crate) parameters: ffmpeg::codec::Parameters,
}

/// An opened demuxer with its interrupt hook installed.
///
/// The hook cell must outlive the format context, which holds a raw pointer
/// to it; field order keeps the context dropping first.
pub struct Input {
    inner: ffmpeg::format::context::Input,
    _hook: Box<HookCell>,
}

impl Input {
    /// Open `url` with transport options and `hook` wired into the
    /// demuxer's interrupt callback.
    ///
    /// The format context is allocated by hand so the hook is registered
    /// before the connection attempt; open, stream probing, and every later
    /// read all poll it. The socket timeouts in `options` bound the open as
    /// well.
    pub fn open(url: &str, options: &OpenOptions, hook: InterruptHook) -> Result<Self, MediaError> {
        crate::ensure_init()?;

        let url_c = CString::new(url)
            .map_err(|_| MediaError::Other(anyhow!("input url contains a NUL byte")))?;
        let cell = HookCell::new(hook);
        let dict = dictionary_for(url, options);

        unsafe {
            let mut ctx = ffi::avformat_alloc_context();
            if ctx.is_null() {
                return Err(MediaError::Other(anyhow!(
                    "failed to allocate format context"
                )));
            }
            (*ctx).interrupt_callback.callback = Some(interrupt_trampoline);
            (*ctx).interrupt_callback.opaque = cell.as_opaque();

            let mut opts = dict.disown();
            let err = ffi::avformat_open_input(&mut ctx, url_c.as_ptr(), ptr::null(), &mut opts);
            ffi::av_dict_free(&mut opts);
            if err < 0 {
                // avformat_open_input frees the context on failure.
                return Err(ffmpeg::Error::from(err).into());
            }

            let err = ffi::avformat_find_stream_info(ctx, ptr::null_mut());
            if err < 0 {
                ffi::avformat_close_input(&mut ctx);
                return Err(ffmpeg::Error::from(err).into());
            }

            Ok(Self {
                inner: ffmpeg::format::context::Input::wrap(ctx),
                _hook: cell,
            })
        }
    }

    /// Pick the best video stream and snapshot the metadata the decode loop
    /// needs.
    pub fn best_video_stream(&self) -> Result<VideoStreamInfo, MediaError> {
        let stream = self
            .inner
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(MediaError::NoVideoStream)?;

        let guessed_fps = [stream.avg_frame_rate(), stream.rate()]
            .into_iter()
            .map(f64::from)
            .find(|rate| rate.is_finite() && *rate > 0.0);

        let parameters = stream.parameters();
        let codec_id = parameters.id();

        Ok(VideoStreamInfo {
            index: stream.index(),
            time_base: f64::from(stream.time_base()),
            guessed_fps,
            codec_id,
            parameters,
        })
    }

    /// Read the next packet into `packet`.
    pub fn read_into(&mut self, packet: &mut ffmpeg::Packet) -> Result<IoStatus, MediaError> {
        match packet.read(&mut self.inner) {
            Ok(()) => Ok(IoStatus::Ok),
            Err(err) => classify(err),
        }
    }
}
