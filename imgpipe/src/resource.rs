//! Reference-counted lifecycle for decoded images.
//!
//! A [`DecodedResource`] is shared between the memory cache and any request
//! that is about to hand it to a display surface. Either side may ask for the
//! resource to be recycled, but the pixel buffer is only released once the
//! recycle has been requested *and* no [`ResourceRef`] is outstanding:
//!
//! ```text
//!                recycle()                 last ResourceRef dropped
//! [live] ─────────────────────► [recycled, refs > 0] ─────────────────► [reclaimed]
//!    │                                                                      ▲
//!    └──────────── recycle() with refs == 0 ────────────────────────────────┘
//! ```
//!
//! The count and the flag live under one lock so that "check recycled, then
//! take a reference" is atomic: [`DecodedResource::try_acquire`] never hands
//! out a reference to a resource that is already recycled.

use crate::identity::CacheKey;
use crate::request::ImageFrom;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

/// RGBA8 pixel buffer.
#[derive(Clone, PartialEq, Eq)]
pub struct ImageBuffer {
    pub width: u32,
    pub height: u32,
    pub pixels: Vec<u8>,
}

impl ImageBuffer {
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            pixels,
        }
    }

    /// Size of the pixel data in bytes.
    pub fn byte_count(&self) -> usize {
        self.pixels.len()
    }
}

impl fmt::Debug for ImageBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImageBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("bytes", &self.pixels.len())
            .finish()
    }
}

/// Metadata describing a decoded image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageInfo {
    /// Dimensions of the source image before any resize.
    pub origin_width: u32,
    pub origin_height: u32,
    /// e.g. `image/png`
    pub mime_type: String,
}

/// Output of a decoder, before it is wrapped in a [`DecodedResource`].
#[derive(Debug)]
pub struct Decoded {
    pub buffer: ImageBuffer,
    pub info: ImageInfo,
    /// Animated images are never memory-cached.
    pub animated: bool,
}

#[derive(Debug)]
struct Lifecycle {
    ref_count: usize,
    recycled: bool,
    buffer: Option<ImageBuffer>,
}

/// A decoded, displayable image with a reference-counted lifetime.
pub struct DecodedResource {
    key: CacheKey,
    info: ImageInfo,
    from: ImageFrom,
    animated: bool,
    byte_count: usize,
    state: Mutex<Lifecycle>,
}

impl DecodedResource {
    /// Wraps a freshly decoded image. The reference count starts at zero.
    pub fn new(key: CacheKey, decoded: Decoded, from: ImageFrom) -> Arc<Self> {
        let byte_count = decoded.buffer.byte_count();
        Arc::new(Self {
            key,
            info: decoded.info,
            from,
            animated: decoded.animated,
            byte_count,
            state: Mutex::new(Lifecycle {
                ref_count: 0,
                recycled: false,
                buffer: Some(decoded.buffer),
            }),
        })
    }

    pub fn key(&self) -> &CacheKey {
        &self.key
    }

    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    pub fn mime_type(&self) -> &str {
        &self.info.mime_type
    }

    /// Where the bytes this resource was decoded from came from.
    pub fn image_from(&self) -> ImageFrom {
        self.from
    }

    pub fn is_animated(&self) -> bool {
        self.animated
    }

    /// Size of the pixel data, fixed at construction.
    pub fn byte_count(&self) -> usize {
        self.byte_count
    }

    /// True once a recycle has been requested.
    pub fn is_recycled(&self) -> bool {
        self.state.lock().recycled
    }

    /// True once the pixel buffer has been released.
    pub fn is_reclaimed(&self) -> bool {
        self.state.lock().buffer.is_none()
    }

    /// Number of outstanding [`ResourceRef`]s.
    pub fn ref_count(&self) -> usize {
        self.state.lock().ref_count
    }

    /// Requests reclamation.
    ///
    /// Releases the buffer immediately if nothing references the resource,
    /// otherwise defers until the last [`ResourceRef`] is dropped. Repeated
    /// calls are harmless.
    pub fn recycle(&self, caller: &str) {
        let mut state = self.state.lock();
        if !state.recycled {
            state.recycled = true;
            debug!(key = %self.key, caller, refs = state.ref_count, "Resource recycle requested");
        }
        if state.ref_count == 0 {
            Self::reclaim(&self.key, &mut state);
        }
    }

    /// Wraps a freshly decoded image and takes the first pending-display
    /// reference on it.
    ///
    /// The reference exists before any other owner can see the resource, so
    /// nothing can recycle it in between.
    pub fn new_held(
        key: CacheKey,
        decoded: Decoded,
        from: ImageFrom,
        caller: &'static str,
    ) -> ResourceRef {
        let resource = Self::new(key, decoded, from);
        resource.state.lock().ref_count = 1;
        trace!(key = %resource.key, caller, refs = 1, "Resource reference acquired");
        ResourceRef { resource, caller }
    }

    /// Takes a pending-display reference, or returns `None` if the resource
    /// has already been recycled.
    pub fn try_acquire(self: &Arc<Self>, caller: &'static str) -> Option<ResourceRef> {
        let mut state = self.state.lock();
        if state.recycled {
            return None;
        }
        state.ref_count += 1;
        trace!(key = %self.key, caller, refs = state.ref_count, "Resource reference acquired");
        Some(ResourceRef {
            resource: Arc::clone(self),
            caller,
        })
    }

    /// Runs `f` against the pixel buffer if it has not been reclaimed.
    pub fn with_buffer<R>(&self, f: impl FnOnce(&ImageBuffer) -> R) -> Option<R> {
        let state = self.state.lock();
        state.buffer.as_ref().map(f)
    }

    fn release(&self, caller: &str) {
        let mut state = self.state.lock();
        state.ref_count = state.ref_count.saturating_sub(1);
        trace!(key = %self.key, caller, refs = state.ref_count, "Resource reference released");
        if state.recycled && state.ref_count == 0 {
            Self::reclaim(&self.key, &mut state);
        }
    }

    fn reclaim(key: &CacheKey, state: &mut Lifecycle) {
        if let Some(buffer) = state.buffer.take() {
            debug!(key = %key, bytes = buffer.byte_count(), "Resource reclaimed");
        }
    }
}

impl fmt::Debug for DecodedResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DecodedResource")
            .field("key", &self.key)
            .field("mime_type", &self.info.mime_type)
            .field("from", &self.from)
            .field("animated", &self.animated)
            .field("ref_count", &state.ref_count)
            .field("recycled", &state.recycled)
            .field("reclaimed", &state.buffer.is_none())
            .finish()
    }
}

/// A pending-display reference. Dropping it releases the reference.
pub struct ResourceRef {
    resource: Arc<DecodedResource>,
    caller: &'static str,
}

impl ResourceRef {
    pub fn resource(&self) -> &Arc<DecodedResource> {
        &self.resource
    }
}

impl fmt::Debug for ResourceRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceRef")
            .field("key", self.resource.key())
            .field("caller", &self.caller)
            .finish()
    }
}

impl Drop for ResourceRef {
    fn drop(&mut self) {
        self.resource.release(self.caller);
    }
}
