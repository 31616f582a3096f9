//! Effect modules and the capability resolver.
//!
//! Every optional effect is described by an [`EffectDescriptor`]: it decides
//! from the frame's inputs whether it runs and which buffer bits it needs.
//! [`resolve_effects`] folds all descriptors in [`EFFECTS`] into the frame's
//! [`EffectSet`]. The buffer manager only ever looks at the resulting bits.
//!
//! Effects that composite onto the colour buffer also provide a stage draw,
//! run by the compositor in a fixed order.

pub mod bloom;
pub mod depth_of_field;
pub mod lighting;
pub mod motion_blur;
pub mod temporal;

use crate::config::{DEBUG_VELOCITY_BUFFER, FrameInputs};
use crate::effect_set::EffectSet;

/// An optional screen-space effect as seen by the capability resolver.
pub trait EffectDescriptor {
    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// The effect's own bits.
    fn flags(&self) -> EffectSet;

    /// Whether the frame's settings and camera ask for this effect.
    fn wants_enabled(&self, inputs: &FrameInputs) -> bool;

    /// Buffer bits the effect needs while enabled.
    fn dependencies(&self, inputs: &FrameInputs) -> EffectSet;

    /// Bits contributed to the frame: flags plus dependencies, or nothing.
    fn contribute(&self, inputs: &FrameInputs) -> EffectSet {
        if self.wants_enabled(inputs) {
            self.flags() | self.dependencies(inputs)
        } else {
            EffectSet::empty()
        }
    }
}

/// Every effect known to the resolver.
pub const EFFECTS: &[&dyn EffectDescriptor] = &[
    &lighting::Volumetrics,
    &lighting::AmbientOcclusion,
    &lighting::Subsurface,
    &lighting::Reflections,
    &lighting::Refraction,
    &depth_of_field::DepthOfField,
    &bloom::Bloom,
    &motion_blur::MotionBlur,
    &temporal::TemporalSampling,
];

/// Bits the pipeline adds on its own, independent of any effect.
pub fn pipeline_bits(inputs: &FrameInputs) -> EffectSet {
    let mut bits = EffectSet::empty();
    if inputs.settings.debug_value == DEBUG_VELOCITY_BUFFER {
        bits |= EffectSet::VELOCITY_BUFFER;
    }
    if inputs.mode.is_image_render() && inputs.normal_pass {
        bits |= EffectSet::NORMAL_BUFFER;
    }
    bits
}

/// Computes the frame's effect set from its inputs alone.
pub fn resolve_effects(inputs: &FrameInputs) -> EffectSet {
    let enabled = EFFECTS
        .iter()
        .fold(pipeline_bits(inputs), |bits, effect| {
            let contributed = effect.contribute(inputs);
            if !contributed.is_empty() {
                log::trace!("{}: {contributed:?}", effect.name());
            }
            bits | contributed
        });
    log::debug!("resolved effects {enabled:?}");
    enabled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::{CameraLens, CameraState};
    use crate::config::{RenderMode, RenderSettings};

    fn inputs(settings: RenderSettings) -> FrameInputs {
        FrameInputs::new([640, 360], CameraState::new(), settings)
    }

    fn no_taa() -> RenderSettings {
        let mut settings = RenderSettings::default();
        settings.temporal.samples = 1;
        settings
    }

    #[test]
    fn nothing_enabled_resolves_empty() {
        assert_eq!(resolve_effects(&inputs(no_taa())), EffectSet::empty());
    }

    #[test]
    fn default_settings_enable_temporal_sampling() {
        let enabled = resolve_effects(&inputs(RenderSettings::default()));
        assert!(enabled.contains(EffectSet::TAA | EffectSet::DOUBLE_BUFFER | EffectSet::POST_BUFFER));
        assert!(!enabled.contains(EffectSet::TAA_REPROJECT));
    }

    #[test]
    fn every_effect_brings_its_dependencies() {
        let mut settings = no_taa();
        settings.bloom.enabled = true;
        settings.occlusion.enabled = true;
        settings.screen_raytrace.refraction = true;
        let enabled = resolve_effects(&inputs(settings));
        assert_eq!(
            enabled,
            EffectSet::BLOOM
                | EffectSet::POST_BUFFER
                | EffectSet::GTAO
                | EffectSet::NORMAL_BUFFER
                | EffectSet::REFRACTION
                | EffectSet::DOUBLE_BUFFER
        );
    }

    #[test]
    fn debug_value_forces_velocity_buffer() {
        let mut settings = no_taa();
        settings.debug_value = DEBUG_VELOCITY_BUFFER;
        assert_eq!(resolve_effects(&inputs(settings)), EffectSet::VELOCITY_BUFFER);
    }

    #[test]
    fn normal_pass_only_counts_for_image_renders() {
        let frame = inputs(no_taa()).with_normal_pass(true);
        assert!(!resolve_effects(&frame).contains(EffectSet::NORMAL_BUFFER));
        let frame = frame.with_mode(RenderMode::ImageRender);
        assert!(resolve_effects(&frame).contains(EffectSet::NORMAL_BUFFER));
    }

    #[test]
    fn camera_effects_need_a_camera_view() {
        let mut settings = no_taa();
        settings.motion_blur.enabled = true;
        settings.depth_of_field.enabled = true;
        let free = inputs(settings.clone());
        assert_eq!(resolve_effects(&free), EffectSet::empty());

        let mut through = inputs(settings);
        through.camera = CameraState::new().through_camera(Some(CameraLens::default()));
        let enabled = resolve_effects(&through);
        assert!(enabled.contains(EffectSet::MOTION_BLUR | EffectSet::DOF | EffectSet::POST_BUFFER));
    }
}
