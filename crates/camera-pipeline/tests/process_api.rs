//! The process-wide top-level API, driven once through a full lifecycle.
//!
//! Everything lives in a single test because the functions share one global
//! registry.

use std::sync::Arc;
use std::time::Duration;

use camera_pipeline::{FrameCallback, StatusCallback};

#[test]
fn global_api_lifecycle() {
    let status_cb: StatusCallback = Arc::new(|_, _, _| {});
    let frame_cb: FrameCallback = Arc::new(|_| {});

    // Nothing works before initialize.
    let err = camera_pipeline::add_camera(
        0,
        "rtsp://127.0.0.1:9/stream",
        status_cb.clone(),
        frame_cb.clone(),
        10,
    )
    .unwrap_err();
    assert_eq!(err.code(), -1);

    camera_pipeline::initialize().unwrap();
    camera_pipeline::initialize().unwrap();

    camera_pipeline::add_camera(
        0,
        "rtsp://127.0.0.1:9/stream",
        status_cb.clone(),
        frame_cb.clone(),
        10,
    )
    .unwrap();

    // Empty URL and negative id are rejected without disturbing the
    // registered camera.
    assert_eq!(
        camera_pipeline::add_camera(1, "", status_cb.clone(), frame_cb.clone(), 10)
            .unwrap_err()
            .code(),
        -3
    );
    assert_eq!(
        camera_pipeline::add_camera(-1, "rtsp://x", status_cb, frame_cb, 10)
            .unwrap_err()
            .code(),
        -4
    );

    std::thread::sleep(Duration::from_millis(200));
    camera_pipeline::stop_camera(0).unwrap();
    assert_eq!(camera_pipeline::stop_camera(0).unwrap_err().code(), -2);

    camera_pipeline::shutdown();

    // The system can come back up after a shutdown.
    camera_pipeline::initialize().unwrap();
    camera_pipeline::shutdown();
}
