//! Bloom: thresholded lower mips added back onto the frame.

use super::EffectDescriptor;
use crate::backend::{Binding, DrawParams, GpuBackend};
use crate::compositor::StageContext;
use crate::config::FrameInputs;
use crate::downsample::downsample_color;
use crate::effect_set::EffectSet;
use crate::error::{EffectsError, EffectsResult};

pub struct Bloom;

impl EffectDescriptor for Bloom {
    fn name(&self) -> &'static str {
        "bloom"
    }

    fn flags(&self) -> EffectSet {
        EffectSet::BLOOM
    }

    fn wants_enabled(&self, inputs: &FrameInputs) -> bool {
        inputs.settings.bloom.enabled
    }

    fn dependencies(&self, _inputs: &FrameInputs) -> EffectSet {
        EffectSet::POST_BUFFER
    }
}

pub(crate) fn draw<B: GpuBackend + ?Sized>(ctx: &mut StageContext<'_, B>) -> EffectsResult<()> {
    let Some(pass) = ctx.passes.bloom else {
        return Ok(());
    };
    if !ctx.enabled.contains(EffectSet::BLOOM) {
        return Ok(());
    }
    let settings = ctx.inputs.settings.bloom.clone();
    let source = ctx.source();
    let fb = ctx
        .buffers
        .downsample_fb()
        .ok_or(EffectsError::NotInitialized("downsample framebuffer"))?;

    // No firefly clamp: bright texels are what bloom is after.
    let levels = downsample_color(
        &mut *ctx.backend,
        fb,
        ctx.passes.color_downsample,
        source,
        settings.levels,
        0.0,
    )?;

    let inputs = [Binding::new("source", source)];
    let params = DrawParams {
        level: levels,
        texel_size: settings.threshold,
        intensity: settings.intensity,
        ..DrawParams::default()
    };
    ctx.draw_to_target(pass, &inputs, params)?;
    ctx.swap_buffers()
}
