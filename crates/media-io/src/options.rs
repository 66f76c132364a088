//! Input option assembly for the supported live-stream transports.

use std::time::Duration;

use ffmpeg_next as ffmpeg;

/// Connection knobs applied when opening an input.
///
/// The defaults target low-latency live cameras: TCP transport for RTSP, no
/// demuxer buffering, a small probe window, and 10 s socket timeouts so a
/// dead endpoint cannot block an open or read indefinitely.
#[derive(Clone, Debug)]
pub struct OpenOptions {
    /// Force RTSP over TCP instead of UDP.
    pub rtsp_tcp: bool,
    /// Socket read/write timeout applied to the transport.
    pub io_timeout: Duration,
    /// Disable demuxer-side buffering and enable codec low-delay flags.
    pub low_latency: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            rtsp_tcp: true,
            io_timeout: Duration::from_secs(10),
            low_latency: true,
        }
    }
}

/// Build the option dictionary for one URL.
///
/// Scheme-specific entries come first, then the shared low-latency set, so a
/// caller inspecting failures sees the same ordering the demuxer consumed.
pub(crate) fn dictionary_for(url: &str, options: &OpenOptions) -> ffmpeg::Dictionary<'static> {
    let mut dict = ffmpeg::Dictionary::new();
    let timeout_us = options.io_timeout.as_micros().to_string();

    if url.starts_with("rtsp://") || url.starts_with("rtsps://") {
        if options.rtsp_tcp {
            dict.set("rtsp_transport", "tcp");
        }
        // RTSP keeps its own socket timeout option besides rw_timeout.
        dict.set("stimeout", &timeout_us);
    } else if url.starts_with("http://") || url.starts_with("https://") {
        dict.set("reconnect", "1");
        dict.set("reconnect_streamed", "1");
        dict.set("multiple_requests", "1");
    }

    if options.low_latency {
        dict.set("fflags", "nobuffer");
        dict.set("flags", "low_delay");
        dict.set("probesize", "500000");
        dict.set("analyzeduration", "500000");
    }

    dict.set("rw_timeout", &timeout_us);
    dict.set("tcp_nodelay", "1");

    dict
}
