//! Pixel format conversion to packed BGR24.

use ffmpeg_next as ffmpeg;

use ffmpeg::format::Pixel;
use ffmpeg::software::scaling::{context::Context as ScalerContext, flag::Flags as ScalerFlags};

use crate::error::MediaError;

/// Converter from whatever the decoder emits to BGR24 at the same size.
///
/// The scaling context is cached on the source shape and rebuilt only when
/// the stream changes resolution or pixel format mid-flight, which real
/// cameras do on renegotiation.
pub struct BgrScaler {
    context: Option<ScalerContext>,
    key: Option<(u32, u32, Pixel)>,
}

impl BgrScaler {
    pub fn new() -> Self {
        Self {
            context: None,
            key: None,
        }
    }

    /// Convert `src` into `dst`, reallocating `dst` only on shape changes.
    /// The destination inherits the source presentation timestamp.
    pub fn run(
        &mut self,
        src: &ffmpeg::frame::Video,
        dst: &mut ffmpeg::frame::Video,
    ) -> Result<(), MediaError> {
        let key = (src.width(), src.height(), src.format());

        let context = match &mut self.context {
            Some(context) if self.key == Some(key) => context,
            slot => {
                tracing::debug!(
                    width = key.0,
                    height = key.1,
                    format = ?key.2,
                    "rebuilding BGR24 scaler"
                );
                self.key = Some(key);
                slot.insert(ScalerContext::get(
                    src.format(),
                    src.width(),
                    src.height(),
                    Pixel::BGR24,
                    src.width(),
                    src.height(),
                    ScalerFlags::FAST_BILINEAR,
                )?)
            }
        };

        if dst.width() != src.width() || dst.height() != src.height() || dst.format() != Pixel::BGR24
        {
            *dst = ffmpeg::frame::Video::new(Pixel::BGR24, src.width(), src.height());
        }

        context.run(src, dst)?;
        dst.set_pts(src.pts());
        Ok(())
    }
}

impl Default for BgrScaler {
    fn default() -> Self {
        Self::new()
    }
}
