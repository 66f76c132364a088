//! Video decoder wrapper built from a stream's codec parameters.

use anyhow::Context as _;
use ffmpeg_next as ffmpeg;

use crate::error::{classify, IoStatus, MediaError};
use crate::input::VideoStreamInfo;

/// A decoder opened for one video stream.
pub struct VideoDecoder {
    inner: ffmpeg::decoder::Video,
}

impl VideoDecoder {
    /// Allocate and open a decoder for the stream described by `info`.
    ///
    /// Decoding runs single threaded: with many cameras per process, one
    /// decode thread per stream keeps latency predictable and avoids an
    /// FFmpeg worker-pool explosion.
    pub fn open(info: &VideoStreamInfo) -> Result<Self, MediaError> {
        let mut context = ffmpeg::codec::context::Context::from_parameters(info.parameters.clone())
            .context("building decoder context from stream parameters")?;

        unsafe {
            (*context.as_mut_ptr()).thread_count = 1;
        }

        let inner = context
            .decoder()
            .video()
            .with_context(|| format!("opening decoder for {:?}", info.codec_id))?;

        Ok(Self { inner })
    }

    /// Feed one demuxed packet to the decoder.
    pub fn send(&mut self, packet: &ffmpeg::Packet) -> Result<IoStatus, MediaError> {
        match self.inner.send_packet(packet) {
            Ok(()) => Ok(IoStatus::Ok),
            Err(err) => classify(err),
        }
    }

    /// Pull the next decoded frame, if one is ready.
    pub fn receive(&mut self, frame: &mut ffmpeg::frame::Video) -> Result<IoStatus, MediaError> {
        match self.inner.receive_frame(frame) {
            Ok(()) => Ok(IoStatus::Ok),
            Err(err) => classify(err),
        }
    }
}
