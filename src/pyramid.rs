//! Hierarchical-Z pyramid construction.
//!
//! The pyramid's top level is filled from the scene depth, either by copying
//! it texel for texel (the pyramid has the depth's size) or by reducing 2x2
//! blocks (half-resolution pyramid). Lower levels are then reduced from the
//! level above through the recursive downsampler.

use crate::backend::{Binding, DrawCall, DrawParams, GpuBackend, mip_extent};
use crate::downsample::downsample_levels;
use crate::error::{EffectsError, EffectsResult};
use crate::handles::{FramebufferId, TextureId};
use crate::passes::HizPasses;

/// Levels built below the top of the pyramid.
pub const HIZ_MAX_LEVEL: u32 = 8;

/// Entries of the mip-ratio table.
pub const MIP_RATIO_LEVELS: usize = 10;

/// The depth the pyramid is built from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PyramidSource {
    pub texture: TextureId,
    /// Array layer of a layered depth texture; `None` for plain 2D depth.
    pub layer: Option<u32>,
}

impl PyramidSource {
    pub fn new(texture: TextureId) -> Self {
        Self {
            texture,
            layer: None,
        }
    }

    pub fn layer(texture: TextureId, layer: u32) -> Self {
        Self {
            texture,
            layer: Some(layer),
        }
    }
}

/// How the top level was produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TopLevel {
    /// Same size as the source: copied.
    Copy,
    /// Smaller than the source: 2x2 reduced.
    Reduce,
}

/// Outcome of one pyramid build.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PyramidBuild {
    pub top: TopLevel,
    /// Levels reduced below the top one.
    pub levels: u32,
}

/// Fills `pyramid` from `source` using the scratch framebuffer `fb`.
pub fn build_pyramid<B: GpuBackend + ?Sized>(
    backend: &mut B,
    fb: FramebufferId,
    passes: &HizPasses,
    pyramid: TextureId,
    source: PyramidSource,
) -> EffectsResult<PyramidBuild> {
    let source_size = backend
        .texture_desc(source.texture)
        .ok_or(EffectsError::UnknownTexture(source.texture))?
        .size;
    let desc = backend
        .texture_desc(pyramid)
        .ok_or(EffectsError::UnknownTexture(pyramid))?;
    let (top_size, slot) = (desc.size, desc.format.attachment_slot());

    let top = if top_size == source_size {
        TopLevel::Copy
    } else {
        TopLevel::Reduce
    };
    let layered = source.layer.is_some();
    let pass = passes.top_level(top == TopLevel::Copy, layered);

    backend.attach_texture(fb, slot, pyramid, 0)?;
    let inputs = [Binding::new("depth_buffer", source.texture)];
    backend.draw(&DrawCall {
        pass,
        target: fb,
        viewport: top_size,
        inputs: &inputs,
        params: DrawParams {
            layer: source.layer.map_or(0, |l| l as i32),
            ..DrawParams::viewport(top_size)
        },
    })?;

    let downlevel = passes.downlevel;
    let levels = downsample_levels(backend, fb, pyramid, HIZ_MAX_LEVEL, |backend, mip| {
        let inputs = [Binding::level("depth_buffer", pyramid, mip.level - 1)];
        backend.draw(&DrawCall {
            pass: downlevel,
            target: fb,
            viewport: mip.size,
            inputs: &inputs,
            params: DrawParams {
                level: mip.level,
                ..DrawParams::viewport(mip.size)
            },
        })
    })?;

    log::debug!(
        "HiZ {pyramid}: {:?} top {}x{} from {}x{}{}, {levels} levels",
        top,
        top_size[0],
        top_size[1],
        source_size[0],
        source_size[1],
        source.layer.map_or(String::new(), |l| format!(" layer {l}"))
    );
    Ok(PyramidBuild { top, levels })
}

/// Per-mip ratio between the viewport and the colour mip chain:
/// `ratio[i] = viewport / (mip_size(i) * 2^i)`.
///
/// Exactly `1.0` where the mip divides evenly; above `1.0` where rounding
/// down made the mip smaller than a true halving.
pub fn mip_ratios(viewport: [f32; 2], color_size: [u32; 2]) -> [[f32; 2]; MIP_RATIO_LEVELS] {
    let mut ratios = [[0.0; 2]; MIP_RATIO_LEVELS];
    for (i, ratio) in ratios.iter_mut().enumerate() {
        let mip = mip_extent(color_size, i as u32);
        let scale = 2f32.powi(i as i32);
        *ratio = [
            viewport[0] / (mip[0] as f32 * scale),
            viewport[1] / (mip[1] as f32 * scale),
        ];
    }
    ratios
}
