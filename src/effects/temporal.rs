//! Temporal anti-aliasing and sample accumulation.
//!
//! Every frame renders with a sub-pixel jitter and the resolve blends it into
//! the TAA history. With reprojection the history follows the camera through
//! the velocity buffer and the previous depth; without it, any camera change
//! restarts accumulation.

use super::EffectDescriptor;
use crate::backend::{Binding, DrawParams, FLAG_RESET_HISTORY, GpuBackend};
use crate::buffers::BufferId;
use crate::compositor::StageContext;
use crate::config::FrameInputs;
use crate::effect_set::EffectSet;
use crate::error::{EffectsError, EffectsResult};

pub struct TemporalSampling;

impl EffectDescriptor for TemporalSampling {
    fn name(&self) -> &'static str {
        "temporal sampling"
    }

    fn flags(&self) -> EffectSet {
        EffectSet::TAA
    }

    fn wants_enabled(&self, inputs: &FrameInputs) -> bool {
        inputs.settings.temporal.samples != 1 || inputs.mode.is_image_render()
    }

    fn dependencies(&self, inputs: &FrameInputs) -> EffectSet {
        let mut bits = EffectSet::DOUBLE_BUFFER | EffectSet::POST_BUFFER;
        if reprojects(inputs) {
            bits |= EffectSet::TAA_REPROJECT
                | EffectSet::VELOCITY_BUFFER
                | EffectSet::DEPTH_DOUBLE_BUFFER;
        }
        bits
    }
}

/// Reprojection only pays off while the interactive view is at rest.
fn reprojects(inputs: &FrameInputs) -> bool {
    inputs.settings.temporal.reprojection
        && !inputs.mode.is_image_render()
        && !inputs.camera.navigating
}

/// Weight of the new sample when accumulating `samples` samples.
pub fn blend_weight(samples: u32) -> f32 {
    1.0 / samples.max(1) as f32
}

pub(crate) fn draw<B: GpuBackend + ?Sized>(ctx: &mut StageContext<'_, B>) -> EffectsResult<()> {
    let Some(pass) = ctx.passes.temporal_resolve else {
        return Ok(());
    };
    if !ctx.enabled.contains(EffectSet::TAA) {
        return Ok(());
    }
    let history = ctx
        .buffers
        .texture(BufferId::TaaHistory)
        .ok_or(EffectsError::NotInitialized("taa_history"))?;

    let view_changed = ctx.persmat != ctx.prev_persmat;
    let reset = !ctx.valid_taa_history
        || (view_changed && !ctx.enabled.contains(EffectSet::TAA_REPROJECT));
    if reset {
        log::trace!("TAA history reset");
    }

    let inputs = [
        Binding::new("color", ctx.source()),
        Binding::new("history", history),
    ];
    let params = DrawParams {
        flags: if reset { FLAG_RESET_HISTORY } else { 0 },
        intensity: blend_weight(ctx.inputs.settings.temporal.samples),
        ..DrawParams::default()
    };
    ctx.draw_to_target(pass, &inputs, params)?;
    ctx.swap_buffers_taa()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraState;
    use crate::config::{RenderMode, RenderSettings};

    fn frame(samples: u32, reprojection: bool) -> FrameInputs {
        let mut settings = RenderSettings::default();
        settings.temporal.samples = samples;
        settings.temporal.reprojection = reprojection;
        FrameInputs::new([64, 64], CameraState::new(), settings)
    }

    #[test]
    fn single_sample_disables_viewport_taa_but_not_renders() {
        let viewport = frame(1, false);
        assert!(TemporalSampling.contribute(&viewport).is_empty());
        let render = frame(1, false).with_mode(RenderMode::ImageRender);
        assert!(TemporalSampling.contribute(&render).contains(EffectSet::TAA));
    }

    #[test]
    fn reprojection_needs_a_resting_interactive_view() {
        let bits = TemporalSampling.contribute(&frame(16, true));
        assert!(bits.contains(EffectSet::TAA_REPROJECT | EffectSet::VELOCITY_BUFFER));
        assert!(bits.contains(EffectSet::DEPTH_DOUBLE_BUFFER));

        let mut moving = frame(16, true);
        moving.camera = moving.camera.navigating(true);
        assert!(!TemporalSampling.contribute(&moving).contains(EffectSet::TAA_REPROJECT));

        let render = frame(16, true).with_mode(RenderMode::ImageRender);
        assert!(!TemporalSampling.contribute(&render).contains(EffectSet::VELOCITY_BUFFER));
    }

    #[test]
    fn blend_weight_never_divides_by_zero() {
        assert_eq!(blend_weight(0), 1.0);
        assert_eq!(blend_weight(4), 0.25);
    }
}
