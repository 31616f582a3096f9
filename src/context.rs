//! Lifecycle entry points called by the host renderer.
//!
//! One [`EffectsContext`] lives for the whole engine and owns the compiled
//! shader variants. Each viewport the host draws keeps its own
//! [`ViewportEffects`]: buffers, passes and the history that carries over
//! between its frames.
//!
//! A frame goes through the entry points in this order:
//!
//! ```text
//! effects_init -> effects_cache_init -> (host renders into main colour)
//!     -> create_minmax_buffer -> draw_effects -> GpuBackend::release_pool
//! ```

use crate::backend::GpuBackend;
use crate::buffers::{BufferId, BufferSet};
use crate::compositor::{FinalOutput, composite};
use crate::config::FrameInputs;
use crate::downsample::{downsample_color, downsample_cube};
use crate::effect_set::EffectSet;
use crate::effects::resolve_effects;
use crate::error::{EffectsError, EffectsResult};
use crate::handles::TextureId;
use crate::history::FrameHistory;
use crate::passes::{EffectPasses, ShaderLibrary};
use crate::pyramid::{MIP_RATIO_LEVELS, PyramidBuild, PyramidSource, build_pyramid, mip_ratios};

/// Engine-wide options.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EffectsConfig {
    /// Build the HiZ pyramid at full instead of half resolution.
    pub full_res_hiz: bool,
}

/// Values shared by every effect shader of a viewport.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CommonUniforms {
    /// `xy` holds the viewport-to-mip ratio of each colour mip.
    pub mip_ratio: [[f32; 4]; MIP_RATIO_LEVELS],
    /// Mip of the HiZ pyramid matching colour mip 0.
    pub hiz_mip_offset: u32,
    pub _padding: [u32; 3],
}

impl Default for CommonUniforms {
    fn default() -> Self {
        bytemuck::Zeroable::zeroed()
    }
}

/// Per-viewport state.
#[derive(Debug)]
pub struct ViewportEffects {
    buffers: BufferSet,
    passes: Option<EffectPasses>,
    enabled: EffectSet,
    common: CommonUniforms,
    history: FrameHistory,
    depth: Option<TextureId>,
    firefly_factor: f32,
    final_output: Option<FinalOutput>,
}

impl ViewportEffects {
    pub fn new(config: EffectsConfig) -> Self {
        Self {
            buffers: BufferSet::new(config.full_res_hiz),
            passes: None,
            enabled: EffectSet::empty(),
            common: CommonUniforms::default(),
            history: FrameHistory::default(),
            depth: None,
            firefly_factor: 0.0,
            final_output: None,
        }
    }

    pub fn buffers(&self) -> &BufferSet {
        &self.buffers
    }

    pub fn passes(&self) -> Option<&EffectPasses> {
        self.passes.as_ref()
    }

    /// Effect set of the last successful [`EffectsContext::effects_init`].
    pub fn enabled(&self) -> EffectSet {
        self.enabled
    }

    pub fn common(&self) -> &CommonUniforms {
        &self.common
    }

    pub fn history(&self) -> &FrameHistory {
        &self.history
    }

    /// Output of the last [`EffectsContext::draw_effects`].
    pub fn final_output(&self) -> Option<FinalOutput> {
        self.final_output
    }

    /// Whether the last frame asked the host for another one. Clears the request.
    pub fn take_redraw_request(&mut self) -> bool {
        self.history.take_redraw_request()
    }

    fn ready_passes(&self) -> EffectsResult<&EffectPasses> {
        if self.depth.is_none() {
            return Err(EffectsError::NotInitialized("effects_init"));
        }
        self.passes
            .as_ref()
            .filter(|passes| passes.built_for() == self.enabled)
            .ok_or(EffectsError::NotInitialized("effects_cache_init"))
    }
}

/// Owner of the shader variants shared by all viewports.
#[derive(Debug, Default)]
pub struct EffectsContext {
    config: EffectsConfig,
    shaders: Option<ShaderLibrary>,
}

impl EffectsContext {
    pub fn new(config: EffectsConfig) -> Self {
        Self {
            config,
            shaders: None,
        }
    }

    pub fn config(&self) -> EffectsConfig {
        self.config
    }

    /// Fresh per-viewport state using this context's configuration.
    pub fn viewport(&self) -> ViewportEffects {
        ViewportEffects::new(self.config)
    }

    /// Resolves the frame's effects, provisions and releases buffers and
    /// recomputes the mip-ratio table.
    ///
    /// `depth` is the host's scene depth for this viewport.
    ///
    /// # Errors
    ///
    /// An allocation failure aborts the frame: the viewport refuses to draw
    /// until a later `effects_init` succeeds.
    pub fn effects_init<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        view: &mut ViewportEffects,
        inputs: &FrameInputs,
        depth: TextureId,
    ) -> EffectsResult<EffectSet> {
        let enabled = resolve_effects(inputs);
        let changes = match view.buffers.apply(backend, enabled, inputs.viewport, depth) {
            Ok(changes) => changes,
            Err(err) => {
                log::error!("effects_init failed: {err}");
                // Rows before the failing one may have been reallocated.
                view.history.invalidate_all();
                view.depth = None;
                return Err(err);
            }
        };
        view.history.invalidate(&changes);
        view.enabled = enabled;
        view.depth = Some(depth);
        view.firefly_factor = inputs.settings.ssr_firefly_factor;

        let color_size = view
            .buffers
            .get(BufferId::MainColor)
            .map_or(inputs.viewport, |slot| slot.size);
        let ratios = mip_ratios(inputs.viewport_f32(), color_size);
        for (dst, [x, y]) in view.common.mip_ratio.iter_mut().zip(ratios) {
            *dst = [x, y, 0.0, 0.0];
        }
        view.common.hiz_mip_offset = view.buffers.hiz_mip_offset();
        Ok(enabled)
    }

    /// Builds the viewport's passes when its effect set changed since the
    /// last build. Compiles the shader library on first use.
    pub fn effects_cache_init<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        view: &mut ViewportEffects,
    ) -> EffectsResult<()> {
        if view.depth.is_none() {
            return Err(EffectsError::NotInitialized("effects_init"));
        }
        if self.shaders.is_none() {
            self.shaders = Some(ShaderLibrary::create(backend)?);
        }
        let Some(shaders) = self.shaders.as_ref() else {
            return Err(EffectsError::NotInitialized("shader library"));
        };
        if view
            .passes
            .as_ref()
            .is_some_and(|passes| passes.built_for() == view.enabled)
        {
            return Ok(());
        }
        if let Some(old) = view.passes.take() {
            old.release(backend);
        }
        view.passes = Some(EffectPasses::build(backend, shaders, view.enabled)?);
        Ok(())
    }

    /// Builds the viewport's HiZ pyramid from `depth_src`, or from one
    /// `layer` of it when it is an array texture.
    pub fn create_minmax_buffer<B: GpuBackend + ?Sized>(
        &self,
        backend: &mut B,
        view: &ViewportEffects,
        depth_src: TextureId,
        layer: Option<u32>,
    ) -> EffectsResult<PyramidBuild> {
        let passes = view.ready_passes()?;
        let fb = view
            .buffers
            .downsample_fb()
            .ok_or(EffectsError::NotInitialized("downsample framebuffer"))?;
        let source = PyramidSource {
            texture: depth_src,
            layer,
        };

        let maxz = view
            .buffers
            .texture(BufferId::MaxZ)
            .ok_or(EffectsError::NotInitialized("maxzbuffer"))?;
        let build = build_pyramid(backend, fb, &passes.maxz, maxz, source)?;

        #[cfg(feature = "min-hiz")]
        {
            let minz = view
                .buffers
                .texture(BufferId::MinZ)
                .ok_or(EffectsError::NotInitialized("minzbuffer"))?;
            build_pyramid(backend, fb, &passes.minz, minz, source)?;
        }

        Ok(build)
    }

    /// Rebuilds mips `1..=level` of a colour texture. Returns the levels drawn.
    pub fn downsample_buffer<B: GpuBackend + ?Sized>(
        &self,
        backend: &mut B,
        view: &ViewportEffects,
        texture: TextureId,
        level: u32,
    ) -> EffectsResult<u32> {
        let passes = view.ready_passes()?;
        let fb = view
            .buffers
            .downsample_fb()
            .ok_or(EffectsError::NotInitialized("downsample framebuffer"))?;
        downsample_color(
            backend,
            fb,
            passes.color_downsample,
            texture,
            level,
            view.firefly_factor,
        )
    }

    /// Rebuilds mips `1..=level` of a cube map, six faces per level.
    pub fn downsample_cube_buffer<B: GpuBackend + ?Sized>(
        &self,
        backend: &mut B,
        view: &ViewportEffects,
        texture: TextureId,
        level: u32,
    ) -> EffectsResult<u32> {
        let passes = view.ready_passes()?;
        let fb = view
            .buffers
            .downsample_fb()
            .ok_or(EffectsError::NotInitialized("downsample framebuffer"))?;
        downsample_cube(
            backend,
            fb,
            passes.color_downsample_cube,
            texture,
            level,
            view.firefly_factor,
        )
    }

    /// Runs the effect stack and records the frame for the next one.
    pub fn draw_effects<B: GpuBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        view: &mut ViewportEffects,
        inputs: &FrameInputs,
    ) -> EffectsResult<FinalOutput> {
        view.ready_passes()?;
        let (Some(depth), Some(passes)) = (view.depth, view.passes.as_ref()) else {
            return Err(EffectsError::NotInitialized("effects_cache_init"));
        };

        view.history.begin_draw();
        let output = composite(
            backend,
            passes,
            &mut view.buffers,
            inputs,
            view.enabled,
            depth,
            &mut view.history,
        )?;
        view.history.commit(inputs.camera.persmat(), &view.buffers);
        view.final_output = Some(output);
        Ok(output)
    }

    /// Releases the shader library. Viewports keep their buffers and passes
    /// until [`release_all`](Self::release_all).
    pub fn effects_free<B: GpuBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(shaders) = self.shaders.take() {
            shaders.release(backend);
        }
    }

    /// Destroys every pass and owned buffer of a viewport.
    pub fn release_all<B: GpuBackend + ?Sized>(&self, backend: &mut B, view: &mut ViewportEffects) {
        if let Some(passes) = view.passes.take() {
            passes.release(backend);
        }
        view.buffers.release_all(backend);
        view.depth = None;
        view.final_output = None;
        view.history = FrameHistory::default();
    }
}
