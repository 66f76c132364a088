//! Error taxonomy shared by the demux, decode, and scaling wrappers.

use ffmpeg_next as ffmpeg;
use thiserror::Error;

/// Outcome of a demux or codec call that completed without a hard failure.
///
/// `Again` and `Eof` are ordinary control flow for live streams and are kept
/// out of the error channel so callers can match on them directly.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IoStatus {
    /// The call produced a packet or frame.
    Ok,
    /// Nothing available right now; retry the surrounding loop.
    Again,
    /// The stream signalled end of data.
    Eof,
}

#[derive(Debug, Error)]
/// Errors that can arise while opening or driving a media input.
pub enum MediaError {
    /// The container was opened but exposes no usable video stream.
    #[error("no video stream found in input")]
    NoVideoStream,
    #[error(transparent)]
    Ffmpeg(#[from] ffmpeg::Error),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl MediaError {
    /// Whether an open failure is worth retrying in place rather than going
    /// through the caller's full reconnect path. Covers the library asking
    /// for an immediate exit, plain I/O failures, and an unreachable network.
    pub fn is_retryable_open(&self) -> bool {
        match self {
            MediaError::Ffmpeg(err) => matches!(
                err,
                ffmpeg::Error::Exit
                    | ffmpeg::Error::Other { errno: libc::EIO }
                    | ffmpeg::Error::Other { errno: libc::ENETUNREACH }
            ),
            _ => false,
        }
    }
}

/// Fold an `ffmpeg` error into the three-way status, keeping real failures
/// in the error channel.
pub(crate) fn classify(err: ffmpeg::Error) -> Result<IoStatus, MediaError> {
    match err {
        ffmpeg::Error::Eof => Ok(IoStatus::Eof),
        ffmpeg::Error::Other {
            errno: libc::EAGAIN,
        } => Ok(IoStatus::Again),
        other => Err(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eof_and_eagain_are_status_not_errors() {
        assert_eq!(classify(ffmpeg::Error::Eof).unwrap(), IoStatus::Eof);
        assert_eq!(
            classify(ffmpeg::Error::Other {
                errno: libc::EAGAIN
            })
            .unwrap(),
            IoStatus::Again
        );
    }

    #[test]
    fn hard_errors_stay_errors() {
        assert!(classify(ffmpeg::Error::InvalidData).is_err());
    }

    #[test]
    fn open_retry_classification() {
        let retryable = [
            MediaError::Ffmpeg(ffmpeg::Error::Exit),
            MediaError::Ffmpeg(ffmpeg::Error::Other { errno: libc::EIO }),
            MediaError::Ffmpeg(ffmpeg::Error::Other {
                errno: libc::ENETUNREACH,
            }),
        ];
        for err in retryable {
            assert!(err.is_retryable_open(), "{err} should be retryable");
        }

        let terminal = [
            MediaError::Ffmpeg(ffmpeg::Error::InvalidData),
            MediaError::Ffmpeg(ffmpeg::Error::Other {
                errno: libc::ECONNREFUSED,
            }),
            MediaError::NoVideoStream,
        ];
        for err in terminal {
            assert!(!err.is_retryable_open(), "{err} should not be retryable");
        }
    }
}
