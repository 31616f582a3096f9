//! # screenfx
//!
//! **Screen-space post-processing for deferred renderers.**
//!
//! screenfx manages the buffers, the hierarchical depth pyramid and the
//! compositing stack of a set of screen-space effects: velocity resolve,
//! motion blur, depth of field, temporal anti-aliasing and bloom. The host
//! renders its scene into the main colour buffer; screenfx decides which
//! effects run, keeps their history buffers alive across frames and hands
//! back the final texture.
//!
//! ## Quick Start
//!
//! ```no_run
//! use screenfx::*;
//!
//! fn main() -> EffectsResult<()> {
//!     let mut gpu = WgpuBackend::new(GpuContext::new_headless()?);
//!     let mut effects = EffectsContext::new(EffectsConfig::default());
//!     let mut view = effects.viewport();
//!
//!     let settings = RenderSettings::load_or_default("screenfx.toml")?;
//!     let inputs = FrameInputs::new([1280, 720], CameraState::new(), settings);
//!     let depth = gpu.create_texture(&TextureDesc::d2(
//!         "depth",
//!         inputs.viewport,
//!         TextureFormat::Depth24Stencil8,
//!     ))?;
//!
//!     effects.effects_init(&mut gpu, &mut view, &inputs, depth)?;
//!     effects.effects_cache_init(&mut gpu, &mut view)?;
//!     // ... render the scene into view.buffers().fb(BufferId::MainColor) ...
//!     effects.create_minmax_buffer(&mut gpu, &view, depth, None)?;
//!     let output = effects.draw_effects(&mut gpu, &mut view, &inputs)?;
//!     gpu.release_pool();
//!     gpu.flush();
//!
//!     println!("final image in {}", output.texture);
//!     Ok(())
//! }
//! ```
//!
//! ## Layout
//!
//! - [`resolve_effects`] turns settings and camera state into an [`EffectSet`].
//! - [`BufferSet`] provisions exactly the buffers that set needs.
//! - [`build_pyramid`] and the [`downsample`] helpers build mip chains.
//! - [`composite`] runs the effect stack; [`FrameHistory`] carries state to the next frame.
//! - Everything GPU-facing goes through the [`GpuBackend`] trait.

mod backend;
mod buffers;
mod camera;
mod compositor;
mod config;
mod context;
pub mod downsample;
mod effect_set;
pub mod effects;
mod error;
mod gpu;
mod handles;
mod history;
mod passes;
mod pyramid;

pub use backend::{
    Attachment, Binding, COLOR_SLOT, DEPTH_SLOT, DepthReduce, DeviceCaps, DrawCall, DrawParams,
    Event, FLAG_RESET_HISTORY, GpuBackend, HizStep, InputKind, PassDesc, RecordedDraw,
    RecordingBackend, ShaderKind, TextureDesc, TextureFormat, TextureKind, WgpuBackend, WriteMask,
    full_mip_count, mip_extent, shader_source,
};
pub use buffers::{
    BUFFER_TABLE, BufferChanges, BufferId, BufferSet, BufferSlot, BufferSpec, FormatRule,
    FramebufferLayout, NORMAL_SLOT, Ownership, Resolution, hiz_size,
};
pub use camera::{CameraLens, CameraState};
pub use compositor::{FinalOutput, StageContext, composite};
pub use config::{
    BloomSettings, DEBUG_VELOCITY_BUFFER, DepthOfFieldSettings, FrameInputs, MotionBlurSettings,
    OcclusionSettings, RenderMode, RenderSettings, ScreenRaytraceSettings, SubsurfaceSettings,
    TemporalSettings, VolumetricSettings,
};
pub use context::{CommonUniforms, EffectsConfig, EffectsContext, ViewportEffects};
pub use effect_set::EffectSet;
pub use effects::{EFFECTS, EffectDescriptor, resolve_effects};
pub use error::{EffectsError, EffectsResult};
pub use gpu::{GpuContext, VENDOR_INTEL};
pub use handles::{FramebufferId, PassId, ShaderId, TextureId};
pub use history::FrameHistory;
pub use passes::{EffectPasses, HizPasses, ShaderLibrary, all_shader_kinds};
pub use pyramid::{
    HIZ_MAX_LEVEL, MIP_RATIO_LEVELS, PyramidBuild, PyramidSource, TopLevel, build_pyramid,
    mip_ratios,
};

// Re-export glam math types for convenience
pub use glam::{Mat4, Vec3};
