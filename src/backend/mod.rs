//! The GPU collaborator seam.
//!
//! The effect pipeline never talks to a graphics API directly. Everything it
//! needs from the GPU (textures, framebuffers, shader variants, passes and
//! fullscreen draws) goes through [`GpuBackend`]. Two implementations ship
//! with the crate:
//!
//! - [`WgpuBackend`]: renders for real on a wgpu device.
//! - [`RecordingBackend`]: keeps everything in memory and records every call,
//!   for tests and for hosts that want to inspect what a frame would do.
//!
//! # Framebuffer slots
//!
//! Framebuffer attachments are addressed by slot: slot [`DEPTH_SLOT`] is the
//! depth attachment, slots from [`COLOR_SLOT`] upward are colour attachments.

mod recording;
mod shaders;
mod wgpu_backend;

pub use recording::{Event, RecordedDraw, RecordingBackend};
pub use shaders::{InputKind, shader_source};
pub use wgpu_backend::WgpuBackend;

use crate::error::EffectsResult;
use crate::handles::{FramebufferId, PassId, ShaderId, TextureId};

/// Depth attachment slot.
pub const DEPTH_SLOT: usize = 0;
/// First colour attachment slot.
pub const COLOR_SLOT: usize = 1;

/// `DrawParams::flags` bit: discard the history instead of blending with it.
pub const FLAG_RESET_HISTORY: u32 = 1 << 0;

/// Storage formats the pipeline allocates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureFormat {
    Rgba16Float,
    Rg16,
    R32Float,
    Depth24,
    Depth24Stencil8,
    Depth32Float,
}

impl TextureFormat {
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            TextureFormat::Depth24 | TextureFormat::Depth24Stencil8 | TextureFormat::Depth32Float
        )
    }

    /// Framebuffer slot a texture of this format is attached to.
    pub fn attachment_slot(self) -> usize {
        if self.is_depth() { DEPTH_SLOT } else { COLOR_SLOT }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TextureKind {
    D2,
    D2Array,
    Cube,
}

/// Description of a texture to allocate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub size: [u32; 2],
    /// Array layers; always 6 for cube textures.
    pub layers: u32,
    pub kind: TextureKind,
    pub format: TextureFormat,
    pub mipmapped: bool,
}

impl TextureDesc {
    pub fn d2(label: &'static str, size: [u32; 2], format: TextureFormat) -> Self {
        Self {
            label,
            size,
            layers: 1,
            kind: TextureKind::D2,
            format,
            mipmapped: false,
        }
    }

    pub fn cube(label: &'static str, size: u32, format: TextureFormat) -> Self {
        Self {
            label,
            size: [size, size],
            layers: 6,
            kind: TextureKind::Cube,
            format,
            mipmapped: true,
        }
    }

    pub fn with_mips(mut self) -> Self {
        self.mipmapped = true;
        self
    }

    pub fn with_layers(mut self, layers: u32) -> Self {
        self.kind = TextureKind::D2Array;
        self.layers = layers.max(1);
        self
    }

    /// Number of mip levels the texture carries.
    pub fn mip_count(&self) -> u32 {
        if self.mipmapped {
            full_mip_count(self.size)
        } else {
            1
        }
    }

    /// Size of mip `level`, or `None` past the last level.
    pub fn mip_size(&self, level: u32) -> Option<[u32; 2]> {
        (level < self.mip_count()).then(|| mip_extent(self.size, level))
    }
}

/// Length of a complete mip chain for `size`.
pub fn full_mip_count(size: [u32; 2]) -> u32 {
    let max_dim = size[0].max(size[1]).max(1);
    32 - max_dim.leading_zeros()
}

/// Size of mip `level` of a `base`-sized image: halved per level, rounded down, at least 1.
pub fn mip_extent(base: [u32; 2], level: u32) -> [u32; 2] {
    [
        base[0].checked_shr(level).unwrap_or(0).max(1),
        base[1].checked_shr(level).unwrap_or(0).max(1),
    ]
}

/// What the device can and can't do, queried once at startup.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DeviceCaps {
    /// Rendering into a framebuffer with only a depth attachment works.
    /// When false the HiZ pyramid is stored in a single-channel float colour
    /// texture instead.
    pub supports_depth_only_framebuffer: bool,
}

impl Default for DeviceCaps {
    fn default() -> Self {
        Self {
            supports_depth_only_framebuffer: true,
        }
    }
}

/// One framebuffer attachment: a texture at a given mip level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Attachment {
    pub texture: TextureId,
    pub mip: u32,
}

impl Attachment {
    pub fn new(texture: TextureId) -> Self {
        Self { texture, mip: 0 }
    }
}

/// Which attachment a pass writes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum WriteMask {
    Color,
    Depth,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DepthReduce {
    Max,
    Min,
}

/// How a HiZ shader fills its level.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HizStep {
    /// Reduce 2x2 texels of the previous pyramid level.
    DownLevel,
    /// Reduce 2x2 texels of the source depth (half-resolution top level).
    DownDepth,
    /// Copy the source depth texel for texel (full-resolution top level).
    CopyDepth,
}

/// Every shader variant the pipeline compiles.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ShaderKind {
    Downsample,
    DownsampleCube,
    VelocityResolve,
    Hiz {
        reduce: DepthReduce,
        step: HizStep,
        layered: bool,
    },
    MotionBlur,
    DepthOfField,
    TemporalResolve,
    BloomResolve,
}

impl ShaderKind {
    pub const fn hiz(reduce: DepthReduce, step: HizStep, layered: bool) -> Self {
        ShaderKind::Hiz {
            reduce,
            step,
            layered,
        }
    }
}

/// A shader plus the fixed state it draws with.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PassDesc {
    pub label: &'static str,
    pub shader: ShaderId,
    pub write: WriteMask,
    /// Depth test always passes (HiZ passes overwrite whatever is there).
    pub depth_always: bool,
    /// Instanced draws per call; 6 renders every face of a cube target.
    pub instances: u32,
}

impl PassDesc {
    pub fn color(label: &'static str, shader: ShaderId) -> Self {
        Self {
            label,
            shader,
            write: WriteMask::Color,
            depth_always: false,
            instances: 1,
        }
    }
}

/// A texture read by a draw. `mip` restricts the view to a single level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Binding {
    pub name: &'static str,
    pub texture: TextureId,
    pub mip: Option<u32>,
}

impl Binding {
    pub fn new(name: &'static str, texture: TextureId) -> Self {
        Self {
            name,
            texture,
            mip: None,
        }
    }

    pub fn level(name: &'static str, texture: TextureId, mip: u32) -> Self {
        Self {
            name,
            texture,
            mip: Some(mip),
        }
    }
}

/// Uniform block shared by every pass.
///
/// # WGSL Declaration
///
/// ```wgsl
/// struct DrawParams {
///     mat_a: mat4x4f,
///     mat_b: mat4x4f,
///     viewport: vec2f,
///     texel_size: f32,
///     firefly_factor: f32,
///     layer: i32,
///     flags: u32,
///     level: u32,
///     intensity: f32,
/// }
/// ```
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct DrawParams {
    /// Current inverse view-projection for reprojecting passes.
    pub mat_a: [[f32; 4]; 4],
    /// Previous-frame view-projection for reprojecting passes.
    pub mat_b: [[f32; 4]; 4],
    pub viewport: [f32; 2],
    pub texel_size: f32,
    pub firefly_factor: f32,
    pub layer: i32,
    pub flags: u32,
    pub level: u32,
    pub intensity: f32,
}

impl Default for DrawParams {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

impl DrawParams {
    pub fn viewport(size: [u32; 2]) -> Self {
        Self {
            viewport: [size[0] as f32, size[1] as f32],
            ..Self::default()
        }
    }
}

/// One fullscreen draw into `target`.
#[derive(Clone, Debug)]
pub struct DrawCall<'a> {
    pub pass: PassId,
    pub target: FramebufferId,
    pub viewport: [u32; 2],
    pub inputs: &'a [Binding],
    pub params: DrawParams,
}

/// GPU resource and command interface consumed by the pipeline.
///
/// Commands are ordered: a draw that reads a texture written by an earlier
/// draw always observes the earlier result.
pub trait GpuBackend {
    fn capabilities(&self) -> DeviceCaps;

    fn create_texture(&mut self, desc: &TextureDesc) -> EffectsResult<TextureId>;
    fn destroy_texture(&mut self, texture: TextureId);
    fn texture_desc(&self, texture: TextureId) -> Option<&TextureDesc>;

    /// Borrows a texture from the frame-scoped pool.
    ///
    /// Pool textures are only valid until [`release_pool`](Self::release_pool);
    /// callers must not keep them across frames.
    fn pool_texture(
        &mut self,
        label: &'static str,
        size: [u32; 2],
        format: TextureFormat,
    ) -> EffectsResult<TextureId>;

    /// Ends the pool's frame. Textures nobody borrowed since the previous
    /// call are destroyed; the rest become free for the next frame.
    fn release_pool(&mut self);

    fn create_framebuffer(
        &mut self,
        label: &'static str,
        attachments: &[Option<Attachment>],
    ) -> EffectsResult<FramebufferId>;
    fn destroy_framebuffer(&mut self, framebuffer: FramebufferId);
    fn attach_texture(
        &mut self,
        framebuffer: FramebufferId,
        slot: usize,
        texture: TextureId,
        mip: u32,
    ) -> EffectsResult<()>;
    fn detach_texture(&mut self, framebuffer: FramebufferId, texture: TextureId)
    -> EffectsResult<()>;

    fn create_shader(&mut self, kind: ShaderKind) -> EffectsResult<ShaderId>;
    fn destroy_shader(&mut self, shader: ShaderId);

    fn create_pass(&mut self, desc: &PassDesc) -> EffectsResult<PassId>;
    fn destroy_pass(&mut self, pass: PassId);

    fn draw(&mut self, call: &DrawCall<'_>) -> EffectsResult<()>;
}
