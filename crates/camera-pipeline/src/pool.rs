//! Bounded pool of frame descriptors that carries decoded pixels across the
//! boundary to the host.
//!
//! The pool hands out a stable [`FrameHandle`] (slot index plus generation)
//! with every delivery. Releasing a stale or foreign handle is a logged
//! no-op; it can never touch another delivery's memory, because generations
//! advance on every slot recycle. The free-list mutex is held only for index
//! bookkeeping; pixel allocation and copying happen outside of it.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::state::CameraId;

/// Pixel layouts the pool can deliver.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Bgr24,
}

impl PixelFormat {
    /// Numeric format code as seen by hosts.
    pub fn code(self) -> i32 {
        match self {
            PixelFormat::Bgr24 => media_io::BGR24_FORMAT_CODE,
        }
    }

    /// Bytes per pixel for this layout.
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Bgr24 => 3,
        }
    }
}

/// Stable reference to one pool slot, valid for exactly one delivery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameHandle {
    pub(crate) index: u32,
    pub(crate) generation: u32,
}

/// One delivered frame: metadata plus shared ownership of the pixel bytes.
///
/// The slot keeps its own reference until [`FramePool::release`] is called
/// with the embedded handle, so the bytes stay valid however long the host
/// holds this value.
#[derive(Clone)]
pub struct FrameDescriptor {
    handle: FrameHandle,
    pub camera_id: CameraId,
    pub width: u32,
    pub height: u32,
    pub pixel_format: PixelFormat,
    pub pts: Option<i64>,
    stride: usize,
    data: Arc<Vec<u8>>,
}

impl FrameDescriptor {
    pub fn handle(&self) -> FrameHandle {
        self.handle
    }

    /// Tightly packed pixel rows, `stride()` bytes apart.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    pub fn byte_size(&self) -> usize {
        self.data.len()
    }
}

/// Borrowed view of a source image handed to [`FramePool::acquire`].
///
/// `data` is laid out with `stride` bytes per row, of which only
/// `width * bytes_per_pixel` are meaningful; the copy drops any padding.
pub struct SourceImage<'a> {
    pub width: u32,
    pub height: u32,
    pub stride: usize,
    pub pts: Option<i64>,
    pub data: &'a [u8],
}

struct Slot {
    generation: u32,
    held: Option<FrameDescriptor>,
}

struct PoolInner {
    slots: Vec<Slot>,
    free: Vec<usize>,
    initialized: bool,
}

/// Fixed-size descriptor pool shared by every camera worker.
pub struct FramePool {
    inner: Mutex<PoolInner>,
}

impl FramePool {
    pub const fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                slots: Vec::new(),
                free: Vec::new(),
                initialized: false,
            }),
        }
    }

    /// Allocate `size` slots. Calling again while initialized is a no-op.
    pub fn initialize(&self, size: usize) {
        let mut inner = self.lock();
        if inner.initialized {
            debug!("frame pool already initialized");
            return;
        }
        inner.slots = (0..size)
            .map(|_| Slot {
                generation: 0,
                held: None,
            })
            .collect();
        inner.free = (0..size).collect();
        inner.initialized = true;
        debug!(size, "frame pool initialized");
    }

    /// Copy `src` into a free slot and return the descriptor for delivery,
    /// or `None` when the pool is exhausted or the source is malformed.
    pub fn acquire(&self, camera_id: CameraId, src: &SourceImage<'_>) -> Option<FrameDescriptor> {
        let row_bytes = src.width as usize * PixelFormat::Bgr24.bytes_per_pixel();
        if src.width == 0 || src.height == 0 || src.stride < row_bytes {
            warn!(camera = %camera_id, "rejecting malformed source image");
            return None;
        }
        let needed = src.stride * (src.height as usize - 1) + row_bytes;
        if src.data.len() < needed {
            warn!(
                camera = %camera_id,
                have = src.data.len(),
                needed,
                "source image buffer shorter than its geometry"
            );
            return None;
        }

        // Reserve a slot; the index stays out of the free list until release.
        let (index, generation) = {
            let mut inner = self.lock();
            if !inner.initialized {
                warn!(camera = %camera_id, "frame pool used before initialization");
                return None;
            }
            let Some(index) = inner.free.pop() else {
                warn!(camera = %camera_id, "frame pool exhausted, dropping frame");
                return None;
            };
            (index, inner.slots[index].generation)
        };

        // Allocation and row copy run without the lock held.
        let mut pixels = Vec::with_capacity(row_bytes * src.height as usize);
        if src.stride == row_bytes {
            pixels.extend_from_slice(&src.data[..needed]);
        } else {
            for row in 0..src.height as usize {
                let start = row * src.stride;
                pixels.extend_from_slice(&src.data[start..start + row_bytes]);
            }
        }

        let descriptor = FrameDescriptor {
            handle: FrameHandle {
                index: index as u32,
                generation,
            },
            camera_id,
            width: src.width,
            height: src.height,
            pixel_format: PixelFormat::Bgr24,
            pts: src.pts,
            stride: row_bytes,
            data: Arc::new(pixels),
        };

        let mut inner = self.lock();
        let Some(slot) = inner.slots.get_mut(index) else {
            // The pool was torn down while the copy ran; nothing to hold.
            warn!(camera = %camera_id, "frame pool destroyed during acquire");
            return None;
        };
        slot.held = Some(descriptor.clone());
        Some(descriptor)
    }

    /// Return a delivered slot to the pool.
    ///
    /// Double releases and handles that never came from this pool are logged
    /// and ignored.
    pub fn release(&self, handle: FrameHandle) {
        let reclaimed = {
            let mut inner = self.lock();
            if !inner.initialized {
                warn!(?handle, "release on an uninitialized frame pool");
                return;
            }
            let index = handle.index as usize;
            let Some(slot) = inner.slots.get_mut(index) else {
                warn!(?handle, "release with a foreign frame handle");
                return;
            };
            if slot.generation != handle.generation {
                warn!(?handle, "release with a stale frame handle");
                return;
            }
            let Some(held) = slot.held.take() else {
                warn!(?handle, "release of a slot that holds no frame");
                return;
            };
            slot.generation = slot.generation.wrapping_add(1);
            inner.free.push(index);
            held
        };
        // The slot's pixel reference drops outside the lock.
        drop(reclaimed);
    }

    /// Tear the pool down, reclaiming any slots the host never released.
    pub fn destroy(&self) {
        let leaked = {
            let mut inner = self.lock();
            if !inner.initialized {
                return;
            }
            let leaked: Vec<FrameDescriptor> = inner
                .slots
                .iter_mut()
                .filter_map(|slot| slot.held.take())
                .collect();
            inner.slots = Vec::new();
            inner.free = Vec::new();
            inner.initialized = false;
            leaked
        };
        for frame in &leaked {
            warn!(
                camera = %frame.camera_id,
                handle = ?frame.handle(),
                "frame never released by host, reclaiming at pool teardown"
            );
        }
    }

    /// Number of slots currently free.
    pub fn available(&self) -> usize {
        self.lock().free.len()
    }

    /// Number of slots currently delivered to the host.
    pub fn in_use(&self) -> usize {
        self.lock()
            .slots
            .iter()
            .filter(|slot| slot.held.is_some())
            .count()
    }

    pub fn capacity(&self) -> usize {
        self.lock().slots.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, PoolInner> {
        // Slot bookkeeping cannot leave the pool inconsistent mid-panic, so
        // a poisoned lock is still usable.
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Default for FramePool {
    fn default() -> Self {
        Self::new()
    }
}
