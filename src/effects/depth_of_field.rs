//! Lens depth of field.

use glam::Vec3;

use super::EffectDescriptor;
use crate::backend::{Binding, DrawParams, GpuBackend};
use crate::camera::CameraState;
use crate::compositor::StageContext;
use crate::config::FrameInputs;
use crate::effect_set::EffectSet;
use crate::error::EffectsResult;

pub struct DepthOfField;

impl EffectDescriptor for DepthOfField {
    fn name(&self) -> &'static str {
        "depth of field"
    }

    fn flags(&self) -> EffectSet {
        EffectSet::DOF
    }

    fn wants_enabled(&self, inputs: &FrameInputs) -> bool {
        inputs.settings.depth_of_field.enabled
            && inputs.camera.camera_view
            && inputs.camera.has_depth_of_field()
    }

    fn dependencies(&self, _inputs: &FrameInputs) -> EffectSet {
        EffectSet::POST_BUFFER
    }
}

/// Depth-buffer value of the lens' focal plane.
pub fn focus_depth(camera: &CameraState) -> f32 {
    let distance = camera.lens.map_or(camera.far, |lens| lens.focus_distance);
    let distance = distance.clamp(camera.near, camera.far);
    camera
        .projection_matrix()
        .project_point3(Vec3::new(0.0, 0.0, -distance))
        .z
}

pub(crate) fn draw<B: GpuBackend + ?Sized>(ctx: &mut StageContext<'_, B>) -> EffectsResult<()> {
    let Some(pass) = ctx.passes.depth_of_field else {
        return Ok(());
    };
    if !ctx.enabled.contains(EffectSet::DOF) {
        return Ok(());
    }
    let inputs = [
        Binding::new("color", ctx.source()),
        Binding::new("depth_buffer", ctx.depth),
    ];
    let params = DrawParams {
        texel_size: focus_depth(&ctx.inputs.camera),
        intensity: ctx.inputs.settings.depth_of_field.max_radius,
        ..DrawParams::default()
    };
    ctx.draw_to_target(pass, &inputs, params)?;
    ctx.swap_buffers()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::CameraLens;

    #[test]
    fn focus_depth_grows_with_distance() {
        let near = CameraState::new().through_camera(Some(CameraLens {
            focus_distance: 1.0,
            ..CameraLens::default()
        }));
        let far = CameraState::new().through_camera(Some(CameraLens {
            focus_distance: 50.0,
            ..CameraLens::default()
        }));
        let (a, b) = (focus_depth(&near), focus_depth(&far));
        assert!(a > 0.0 && a < b && b <= 1.0);
    }
}
