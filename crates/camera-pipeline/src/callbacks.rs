//! The contract a host implements to receive status changes and frames.

use std::sync::Arc;

use crate::pool::FrameDescriptor;
use crate::state::{CameraId, CameraState};

/// Invoked on every state transition of a camera, plus each re-entry into
/// the waiting/reconnecting pair. Calls for one camera are serialized and
/// arrive in state-machine order.
///
/// Host context that a C-style API would pass as an opaque pointer travels
/// as closure captures instead.
pub type StatusCallback = Arc<dyn Fn(CameraId, CameraState, &str) + Send + Sync>;

/// Invoked for every delivered frame, ordered by send sequence within one
/// camera. The host must release the descriptor's handle exactly once, from
/// any thread, once it is done reading the pixels.
pub type FrameCallback = Arc<dyn Fn(FrameDescriptor) + Send + Sync>;
