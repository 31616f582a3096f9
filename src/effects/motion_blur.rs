//! Camera motion blur.

use super::EffectDescriptor;
use crate::backend::{Binding, DrawParams, GpuBackend};
use crate::compositor::StageContext;
use crate::config::FrameInputs;
use crate::effect_set::EffectSet;
use crate::error::EffectsResult;

/// Blurs along the screen motion of the camera between two frames. Only
/// active when looking through a scene camera.
pub struct MotionBlur;

impl EffectDescriptor for MotionBlur {
    fn name(&self) -> &'static str {
        "motion blur"
    }

    fn flags(&self) -> EffectSet {
        EffectSet::MOTION_BLUR
    }

    fn wants_enabled(&self, inputs: &FrameInputs) -> bool {
        inputs.settings.motion_blur.enabled && inputs.camera.camera_view
    }

    fn dependencies(&self, _inputs: &FrameInputs) -> EffectSet {
        EffectSet::POST_BUFFER
    }
}

pub(crate) fn draw<B: GpuBackend + ?Sized>(ctx: &mut StageContext<'_, B>) -> EffectsResult<()> {
    let Some(pass) = ctx.passes.motion_blur else {
        return Ok(());
    };
    if !ctx.enabled.contains(EffectSet::MOTION_BLUR) {
        return Ok(());
    }
    let settings = &ctx.inputs.settings.motion_blur;
    let inputs = [
        Binding::new("color", ctx.source()),
        Binding::new("depth_buffer", ctx.depth),
    ];
    let params = DrawParams {
        mat_a: ctx.persmat.inverse().to_cols_array_2d(),
        mat_b: ctx.prev_persmat.to_cols_array_2d(),
        level: settings.samples,
        intensity: settings.shutter,
        ..DrawParams::default()
    };
    ctx.draw_to_target(pass, &inputs, params)?;
    ctx.swap_buffers()
}
