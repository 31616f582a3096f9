//! Lighting effects that only need buffers from the pipeline.
//!
//! These run inside the host's material passes, not as compositing stages:
//! their contribution here is limited to the bits that keep the normal input,
//! the double buffer and the post buffer alive.

use super::EffectDescriptor;
use crate::config::FrameInputs;
use crate::effect_set::EffectSet;

pub struct Volumetrics;

impl EffectDescriptor for Volumetrics {
    fn name(&self) -> &'static str {
        "volumetrics"
    }

    fn flags(&self) -> EffectSet {
        EffectSet::VOLUMETRIC
    }

    fn wants_enabled(&self, inputs: &FrameInputs) -> bool {
        inputs.settings.volumetrics.enabled
    }

    fn dependencies(&self, _inputs: &FrameInputs) -> EffectSet {
        EffectSet::POST_BUFFER
    }
}

/// Ground-truth ambient occlusion; reads the normal input.
pub struct AmbientOcclusion;

impl EffectDescriptor for AmbientOcclusion {
    fn name(&self) -> &'static str {
        "ambient occlusion"
    }

    fn flags(&self) -> EffectSet {
        EffectSet::GTAO
    }

    fn wants_enabled(&self, inputs: &FrameInputs) -> bool {
        inputs.settings.occlusion.enabled
    }

    fn dependencies(&self, _inputs: &FrameInputs) -> EffectSet {
        EffectSet::NORMAL_BUFFER
    }
}

pub struct Subsurface;

impl EffectDescriptor for Subsurface {
    fn name(&self) -> &'static str {
        "subsurface scattering"
    }

    fn flags(&self) -> EffectSet {
        EffectSet::SSS
    }

    fn wants_enabled(&self, inputs: &FrameInputs) -> bool {
        inputs.settings.subsurface.enabled
    }

    fn dependencies(&self, _inputs: &FrameInputs) -> EffectSet {
        EffectSet::empty()
    }
}

/// Screen-space reflections; trace against last frame's colour.
pub struct Reflections;

impl EffectDescriptor for Reflections {
    fn name(&self) -> &'static str {
        "screen-space reflections"
    }

    fn flags(&self) -> EffectSet {
        EffectSet::SSR
    }

    fn wants_enabled(&self, inputs: &FrameInputs) -> bool {
        inputs.settings.screen_raytrace.reflections
    }

    fn dependencies(&self, _inputs: &FrameInputs) -> EffectSet {
        EffectSet::NORMAL_BUFFER | EffectSet::DOUBLE_BUFFER
    }
}

pub struct Refraction;

impl EffectDescriptor for Refraction {
    fn name(&self) -> &'static str {
        "screen-space refraction"
    }

    fn flags(&self) -> EffectSet {
        EffectSet::REFRACTION
    }

    fn wants_enabled(&self, inputs: &FrameInputs) -> bool {
        inputs.settings.screen_raytrace.refraction
    }

    fn dependencies(&self, _inputs: &FrameInputs) -> EffectSet {
        EffectSet::DOUBLE_BUFFER
    }
}
