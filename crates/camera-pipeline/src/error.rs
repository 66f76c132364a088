//! Errors surfaced across the public API boundary.

use thiserror::Error;

use crate::state::CameraId;

/// Failures returned by the registry operations.
///
/// Every variant maps onto a stable negative integer via [`ApiError::code`],
/// so bindings that re-export the interface as a flat C-style API keep the
/// historical return values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApiError {
    #[error("pipeline system is not initialized")]
    NotInitialized,
    #[error("camera {0} is not registered")]
    CameraNotFound(CameraId),
    #[error("stream url is empty")]
    InvalidUrl,
    #[error("camera id {0} is out of range or already in use")]
    CameraIdUnavailable(CameraId),
    #[error("allocation failed while registering camera {0}")]
    AllocationFailed(CameraId),
    #[error("worker thread for camera {0} could not be spawned")]
    WorkerSpawn(CameraId),
    #[error("previous worker for camera {0} is still running")]
    WorkerStillRunning(CameraId),
}

impl ApiError {
    /// Stable boundary code for this error.
    pub fn code(&self) -> i32 {
        match self {
            ApiError::NotInitialized => -1,
            ApiError::CameraNotFound(_) => -2,
            ApiError::InvalidUrl => -3,
            ApiError::CameraIdUnavailable(_) => -4,
            ApiError::AllocationFailed(_) => -5,
            ApiError::WorkerSpawn(_) => -6,
            ApiError::WorkerStillRunning(_) => -7,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boundary_codes_are_stable() {
        let id = CameraId::new(7);
        assert_eq!(ApiError::NotInitialized.code(), -1);
        assert_eq!(ApiError::CameraNotFound(id).code(), -2);
        assert_eq!(ApiError::InvalidUrl.code(), -3);
        assert_eq!(ApiError::CameraIdUnavailable(id).code(), -4);
        assert_eq!(ApiError::AllocationFailed(id).code(), -5);
        assert_eq!(ApiError::WorkerSpawn(id).code(), -6);
        assert_eq!(ApiError::WorkerStillRunning(id).code(), -7);
    }
}
