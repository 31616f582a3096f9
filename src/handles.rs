//! Type-safe handles to GPU objects owned by a [`GpuBackend`](crate::GpuBackend).
//!
//! Every object the effect pipeline touches lives inside the backend; the core
//! only ever holds these small copyable handles. Backends never reuse a handle
//! value during their lifetime, so comparing two handles is enough to tell
//! whether a buffer was reallocated between frames.

use std::fmt;

/// Handle to a texture (owned or pool-borrowed).
///
/// # Example
///
/// ```ignore
/// let tex: TextureId = backend.create_texture(&desc)?;
/// backend.attach_texture(fb, 1, tex, 0)?; // can't pass a FramebufferId here
/// ```
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureId(pub(crate) u64);

/// Handle to a framebuffer (a set of texture attachments).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FramebufferId(pub(crate) u64);

/// Handle to a compiled shader variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(pub(crate) u64);

/// Handle to a pass: a shader plus the fixed render state it draws with.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PassId(pub(crate) u64);

macro_rules! impl_handle {
    ($name:ident, $prefix:literal) => {
        impl $name {
            /// Builds a handle from a raw value. Intended for backend implementations.
            pub fn from_raw(raw: u64) -> Self {
                Self(raw)
            }

            /// Raw value of this handle.
            pub fn raw(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "#{}"), self.0)
            }
        }
    };
}

impl_handle!(TextureId, "tex");
impl_handle!(FramebufferId, "fb");
impl_handle!(ShaderId, "shader");
impl_handle!(PassId, "pass");

/// Monotonic handle allocator shared by the backends.
#[derive(Debug, Default)]
pub(crate) struct HandleCounter(u64);

impl HandleCounter {
    pub(crate) fn next(&mut self) -> u64 {
        self.0 += 1;
        self.0
    }
}
