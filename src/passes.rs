//! Shader variants and the passes built from them.
//!
//! [`ShaderLibrary`] is created once per [`EffectsContext`](crate::EffectsContext)
//! and shared by all its viewports. [`EffectPasses`] belongs to a viewport and
//! is rebuilt whenever its effect set changes.

use std::collections::HashMap;

use crate::backend::{DepthReduce, GpuBackend, HizStep, PassDesc, ShaderKind, WriteMask};
use crate::effect_set::EffectSet;
use crate::error::{EffectsError, EffectsResult};
use crate::handles::{PassId, ShaderId};

const HIZ_STEPS: [(HizStep, bool); 5] = [
    (HizStep::DownLevel, false),
    (HizStep::DownDepth, false),
    (HizStep::DownDepth, true),
    (HizStep::CopyDepth, false),
    (HizStep::CopyDepth, true),
];

/// Every shader variant the library compiles.
pub fn all_shader_kinds() -> Vec<ShaderKind> {
    let mut kinds = vec![
        ShaderKind::Downsample,
        ShaderKind::DownsampleCube,
        ShaderKind::VelocityResolve,
    ];
    for (step, layered) in HIZ_STEPS {
        kinds.push(ShaderKind::hiz(DepthReduce::Max, step, layered));
    }
    #[cfg(feature = "min-hiz")]
    for (step, layered) in HIZ_STEPS {
        kinds.push(ShaderKind::hiz(DepthReduce::Min, step, layered));
    }
    kinds.extend([
        ShaderKind::MotionBlur,
        ShaderKind::DepthOfField,
        ShaderKind::TemporalResolve,
        ShaderKind::BloomResolve,
    ]);
    kinds
}

/// The compiled shader variants.
#[derive(Debug, Default)]
pub struct ShaderLibrary {
    shaders: HashMap<ShaderKind, ShaderId>,
}

impl ShaderLibrary {
    pub fn create<B: GpuBackend + ?Sized>(backend: &mut B) -> EffectsResult<Self> {
        let mut shaders = HashMap::new();
        for kind in all_shader_kinds() {
            match backend.create_shader(kind) {
                Ok(id) => {
                    shaders.insert(kind, id);
                }
                Err(err) => {
                    for id in shaders.into_values() {
                        backend.destroy_shader(id);
                    }
                    return Err(err);
                }
            }
        }
        log::info!("created {} effect shaders", shaders.len());
        Ok(Self { shaders })
    }

    pub fn get(&self, kind: ShaderKind) -> EffectsResult<ShaderId> {
        self.shaders
            .get(&kind)
            .copied()
            .ok_or(EffectsError::NotInitialized("shader library"))
    }

    pub fn len(&self) -> usize {
        self.shaders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shaders.is_empty()
    }

    pub fn release<B: GpuBackend + ?Sized>(self, backend: &mut B) {
        let count = self.shaders.len();
        for id in self.shaders.into_values() {
            backend.destroy_shader(id);
        }
        log::info!("freed {count} effect shaders");
    }
}

/// The HiZ passes of one reduction (max or min).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HizPasses {
    pub downlevel: PassId,
    pub downdepth: PassId,
    pub downdepth_layer: PassId,
    pub copydepth: PassId,
    pub copydepth_layer: PassId,
}

impl HizPasses {
    fn build<B: GpuBackend + ?Sized>(
        backend: &mut B,
        shaders: &ShaderLibrary,
        reduce: DepthReduce,
        write: WriteMask,
        created: &mut Vec<PassId>,
    ) -> EffectsResult<Self> {
        let labels = match reduce {
            DepthReduce::Max => [
                "HiZ Max Down Level",
                "HiZ Max Copy Depth Halfres",
                "HiZ Max Copy DepthLayer Halfres",
                "HiZ Max Copy Depth Fullres",
                "HiZ Max Copy DepthLayer Fullres",
            ],
            DepthReduce::Min => [
                "HiZ Min Down Level",
                "HiZ Min Copy Depth Halfres",
                "HiZ Min Copy DepthLayer Halfres",
                "HiZ Min Copy Depth Fullres",
                "HiZ Min Copy DepthLayer Fullres",
            ],
        };
        let mut ids = [PassId(0); 5];
        for (i, (step, layered)) in HIZ_STEPS.into_iter().enumerate() {
            let desc = PassDesc {
                label: labels[i],
                shader: shaders.get(ShaderKind::hiz(reduce, step, layered))?,
                write,
                depth_always: true,
                instances: 1,
            };
            ids[i] = backend.create_pass(&desc)?;
            created.push(ids[i]);
        }
        Ok(Self {
            downlevel: ids[0],
            downdepth: ids[1],
            downdepth_layer: ids[2],
            copydepth: ids[3],
            copydepth_layer: ids[4],
        })
    }

    /// Pass that fills the top level from the source depth.
    pub fn top_level(&self, full_res: bool, layered: bool) -> PassId {
        match (full_res, layered) {
            (true, false) => self.copydepth,
            (true, true) => self.copydepth_layer,
            (false, false) => self.downdepth,
            (false, true) => self.downdepth_layer,
        }
    }
}

/// Passes of one viewport.
#[derive(Clone, Debug)]
pub struct EffectPasses {
    pub color_downsample: PassId,
    pub color_downsample_cube: PassId,
    pub maxz: HizPasses,
    #[cfg(feature = "min-hiz")]
    pub minz: HizPasses,
    pub velocity_resolve: Option<PassId>,
    pub motion_blur: Option<PassId>,
    pub depth_of_field: Option<PassId>,
    pub temporal_resolve: Option<PassId>,
    pub bloom: Option<PassId>,
    /// Attachment the HiZ passes write.
    pub hiz_write: WriteMask,
    built_for: EffectSet,
    all: Vec<PassId>,
}

impl EffectPasses {
    /// Builds the fixed passes plus the stage passes `enabled` needs.
    pub fn build<B: GpuBackend + ?Sized>(
        backend: &mut B,
        shaders: &ShaderLibrary,
        enabled: EffectSet,
    ) -> EffectsResult<Self> {
        let mut all = Vec::new();
        match Self::build_into(backend, shaders, enabled, &mut all) {
            Ok(passes) => Ok(passes),
            Err(err) => {
                for pass in all {
                    backend.destroy_pass(pass);
                }
                Err(err)
            }
        }
    }

    fn build_into<B: GpuBackend + ?Sized>(
        backend: &mut B,
        shaders: &ShaderLibrary,
        enabled: EffectSet,
        all: &mut Vec<PassId>,
    ) -> EffectsResult<Self> {
        let hiz_write = if backend.capabilities().supports_depth_only_framebuffer {
            WriteMask::Depth
        } else {
            log::warn!("device can't render to depth-only framebuffers, HiZ uses float colour");
            WriteMask::Color
        };

        let color = |backend: &mut B,
                     label: &'static str,
                     kind: ShaderKind,
                     instances: u32,
                     all: &mut Vec<PassId>|
         -> EffectsResult<PassId> {
            let desc = PassDesc {
                instances,
                ..PassDesc::color(label, shaders.get(kind)?)
            };
            let id = backend.create_pass(&desc)?;
            all.push(id);
            Ok(id)
        };

        let color_downsample = color(backend, "Downsample", ShaderKind::Downsample, 1, all)?;
        let color_downsample_cube = color(
            backend,
            "Downsample Cube",
            ShaderKind::DownsampleCube,
            6,
            all,
        )?;

        let maxz = HizPasses::build(backend, shaders, DepthReduce::Max, hiz_write, all)?;
        #[cfg(feature = "min-hiz")]
        let minz = HizPasses::build(backend, shaders, DepthReduce::Min, hiz_write, all)?;

        let stage = |bit: EffectSet,
                     label: &'static str,
                     kind: ShaderKind,
                     backend: &mut B,
                     all: &mut Vec<PassId>|
         -> EffectsResult<Option<PassId>> {
            if enabled.contains(bit) {
                color(backend, label, kind, 1, all).map(Some)
            } else {
                Ok(None)
            }
        };

        let velocity_resolve = stage(
            EffectSet::VELOCITY_BUFFER,
            "Velocity Resolve",
            ShaderKind::VelocityResolve,
            backend,
            all,
        )?;
        let motion_blur = stage(
            EffectSet::MOTION_BLUR,
            "Motion Blur",
            ShaderKind::MotionBlur,
            backend,
            all,
        )?;
        let depth_of_field = stage(
            EffectSet::DOF,
            "Depth Of Field",
            ShaderKind::DepthOfField,
            backend,
            all,
        )?;
        let temporal_resolve = stage(
            EffectSet::TAA,
            "TAA Resolve",
            ShaderKind::TemporalResolve,
            backend,
            all,
        )?;
        let bloom = stage(
            EffectSet::BLOOM,
            "Bloom Resolve",
            ShaderKind::BloomResolve,
            backend,
            all,
        )?;

        log::debug!("built {} passes for {enabled:?}", all.len());
        Ok(Self {
            color_downsample,
            color_downsample_cube,
            maxz,
            #[cfg(feature = "min-hiz")]
            minz,
            velocity_resolve,
            motion_blur,
            depth_of_field,
            temporal_resolve,
            bloom,
            hiz_write,
            built_for: enabled,
            all: all.clone(),
        })
    }

    /// Effect set the passes were built for.
    pub fn built_for(&self) -> EffectSet {
        self.built_for
    }

    pub fn len(&self) -> usize {
        self.all.len()
    }

    pub fn is_empty(&self) -> bool {
        self.all.is_empty()
    }

    pub fn release<B: GpuBackend + ?Sized>(self, backend: &mut B) {
        for pass in self.all {
            backend.destroy_pass(pass);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceCaps, RecordingBackend};

    #[test]
    fn library_compiles_every_variant_once() {
        let mut gpu = RecordingBackend::new();
        let lib = ShaderLibrary::create(&mut gpu).unwrap();
        assert_eq!(lib.len(), all_shader_kinds().len());
        assert_eq!(gpu.live_shaders(), lib.len());
        let min_variants = all_shader_kinds()
            .into_iter()
            .filter(|k| {
                matches!(
                    k,
                    ShaderKind::Hiz {
                        reduce: DepthReduce::Min,
                        ..
                    }
                )
            })
            .count();
        let expected = if cfg!(feature = "min-hiz") { HIZ_STEPS.len() } else { 0 };
        assert_eq!(min_variants, expected);
        lib.release(&mut gpu);
        assert_eq!(gpu.live_shaders(), 0);
    }

    #[test]
    fn stage_passes_follow_the_effect_set() {
        let mut gpu = RecordingBackend::new();
        let lib = ShaderLibrary::create(&mut gpu).unwrap();
        let passes =
            EffectPasses::build(&mut gpu, &lib, EffectSet::BLOOM | EffectSet::POST_BUFFER)
                .unwrap();
        assert!(passes.bloom.is_some());
        assert!(passes.velocity_resolve.is_none());
        assert!(passes.temporal_resolve.is_none());
        assert_eq!(gpu.live_passes(), passes.len());
    }

    #[test]
    fn hiz_passes_write_color_without_depth_only_support() {
        let mut gpu = RecordingBackend::with_caps(DeviceCaps {
            supports_depth_only_framebuffer: false,
        });
        let lib = ShaderLibrary::create(&mut gpu).unwrap();
        let passes = EffectPasses::build(&mut gpu, &lib, EffectSet::empty()).unwrap();
        assert_eq!(passes.hiz_write, WriteMask::Color);
        let desc = gpu.pass_desc(passes.maxz.downlevel).unwrap();
        assert_eq!(desc.write, WriteMask::Color);
        assert!(desc.depth_always);
        let cube = gpu.pass_desc(passes.color_downsample_cube).unwrap();
        assert_eq!(cube.instances, 6);
    }
}
