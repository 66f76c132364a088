//! Camera identity and the per-camera connection state machine.

use std::fmt;

/// Caller-assigned camera identifier.
///
/// Unique among currently registered pipelines; the id becomes reusable the
/// moment the registry drops its entry, independent of worker teardown.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CameraId(i32);

impl CameraId {
    pub fn new(id: i32) -> Self {
        Self(id)
    }

    pub fn get(self) -> i32 {
        self.0
    }

    /// Ids are non-negative and bounded by the compile-time camera limit.
    pub fn is_valid(self) -> bool {
        self.0 >= 0 && (self.0 as usize) < crate::config::MAX_CAMERAS
    }
}

impl From<i32> for CameraId {
    fn from(id: i32) -> Self {
        Self(id)
    }
}

impl fmt::Display for CameraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Connection lifecycle of one camera pipeline.
///
/// Transitions are made only by the camera's own worker:
/// `Connecting → Connected → Disconnected → WaitingReconnect → Reconnecting
/// → Connected → …`, and any state moves to `Stopped` once a stop is
/// requested. Observers see a monotonic, duplicate-free stream of changes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CameraState {
    Stopped,
    Connecting,
    Connected,
    Disconnected,
    WaitingReconnect,
    Reconnecting,
}

impl CameraState {
    /// Numeric code delivered through the status callback.
    pub fn code(self) -> i32 {
        match self {
            CameraState::Stopped => 0,
            CameraState::Connecting => 1,
            CameraState::Connected => 2,
            CameraState::Disconnected => 3,
            CameraState::WaitingReconnect => 4,
            CameraState::Reconnecting => 5,
        }
    }
}

impl fmt::Display for CameraState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CameraState::Stopped => "stopped",
            CameraState::Connecting => "connecting",
            CameraState::Connected => "connected",
            CameraState::Disconnected => "disconnected",
            CameraState::WaitingReconnect => "waiting-reconnect",
            CameraState::Reconnecting => "reconnecting",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_are_stable() {
        assert_eq!(CameraState::Stopped.code(), 0);
        assert_eq!(CameraState::Connecting.code(), 1);
        assert_eq!(CameraState::Connected.code(), 2);
        assert_eq!(CameraState::Disconnected.code(), 3);
        assert_eq!(CameraState::WaitingReconnect.code(), 4);
        assert_eq!(CameraState::Reconnecting.code(), 5);
    }

    #[test]
    fn id_validity_bounds() {
        assert!(CameraId::new(0).is_valid());
        assert!(CameraId::new(127).is_valid());
        assert!(!CameraId::new(-1).is_valid());
        assert!(!CameraId::new(128).is_valid());
    }
}
