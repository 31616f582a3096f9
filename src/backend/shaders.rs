//! WGSL source assembly.
//!
//! Each effect is a template defining `fn effect(frag: vec2f, face: u32) -> vec4f`.
//! The final module is `common.wgsl`, the variant constants, the input
//! bindings for the textures actually bound, the template and an entry point
//! that writes either colour or depth. Texture types differ between devices
//! (a HiZ pyramid is a depth texture on most GPUs and a float texture on
//! some), so the bindings are generated from the draw rather than fixed.

use std::fmt::Write as _;

use super::{DepthReduce, HizStep, ShaderKind, TextureFormat, TextureKind, WriteMask};

const COMMON: &str = include_str!("../shaders/common.wgsl");
const DOWNSAMPLE: &str = include_str!("../shaders/downsample.wgsl");
const DOWNSAMPLE_CUBE: &str = include_str!("../shaders/downsample_cube.wgsl");
const MINMAXZ: &str = include_str!("../shaders/minmaxz.wgsl");
const VELOCITY_RESOLVE: &str = include_str!("../shaders/velocity_resolve.wgsl");
const MOTION_BLUR: &str = include_str!("../shaders/motion_blur.wgsl");
const DEPTH_OF_FIELD: &str = include_str!("../shaders/depth_of_field.wgsl");
const TEMPORAL_RESOLVE: &str = include_str!("../shaders/temporal_resolve.wgsl");
const BLOOM: &str = include_str!("../shaders/bloom.wgsl");

/// Binding slot of the first input texture.
pub(crate) const FIRST_INPUT_BINDING: u32 = 2;

/// How a bound texture is declared in WGSL.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum InputKind {
    Float,
    FloatArray,
    Depth,
    DepthArray,
    Cube,
}

impl InputKind {
    /// Declaration for a texture of `format` and `kind` viewed as a whole.
    pub fn of(format: TextureFormat, kind: TextureKind) -> Self {
        match (format.is_depth(), kind) {
            (_, TextureKind::Cube) => InputKind::Cube,
            (true, TextureKind::D2Array) => InputKind::DepthArray,
            (true, TextureKind::D2) => InputKind::Depth,
            (false, TextureKind::D2Array) => InputKind::FloatArray,
            (false, TextureKind::D2) => InputKind::Float,
        }
    }
}

fn template(kind: ShaderKind) -> &'static str {
    match kind {
        ShaderKind::Downsample => DOWNSAMPLE,
        ShaderKind::DownsampleCube => DOWNSAMPLE_CUBE,
        ShaderKind::VelocityResolve => VELOCITY_RESOLVE,
        ShaderKind::Hiz { .. } => MINMAXZ,
        ShaderKind::MotionBlur => MOTION_BLUR,
        ShaderKind::DepthOfField => DEPTH_OF_FIELD,
        ShaderKind::TemporalResolve => TEMPORAL_RESOLVE,
        ShaderKind::BloomResolve => BLOOM,
    }
}

fn defines(kind: ShaderKind, out: &mut String) {
    if let ShaderKind::Hiz {
        reduce,
        step,
        layered,
    } = kind
    {
        let _ = writeln!(out, "const MAX_PASS: bool = {};", reduce == DepthReduce::Max);
        let _ = writeln!(out, "const MIN_PASS: bool = {};", reduce == DepthReduce::Min);
        let _ = writeln!(out, "const COPY_DEPTH: bool = {};", step == HizStep::CopyDepth);
        let _ = writeln!(out, "const LAYERED: bool = {layered};");
    }
}

fn input_binding(index: usize, kind: InputKind, out: &mut String) {
    let binding = FIRST_INPUT_BINDING as usize + index;
    let (ty, load) = match kind {
        InputKind::Float => (
            "texture_2d<f32>",
            format!("textureLoad(input{index}, c, lvl)"),
        ),
        InputKind::FloatArray => (
            "texture_2d_array<f32>",
            format!("textureLoad(input{index}, c, params.layer, lvl)"),
        ),
        InputKind::Depth => (
            "texture_depth_2d",
            format!("vec4f(textureLoad(input{index}, c, lvl))"),
        ),
        InputKind::DepthArray => (
            "texture_depth_2d_array",
            format!("vec4f(textureLoad(input{index}, c, params.layer, lvl))"),
        ),
        InputKind::Cube => {
            let _ = writeln!(
                out,
                "@group(0) @binding({binding}) var input{index}: texture_cube<f32>;\n\
                 fn cube{index}(dir: vec3f, lod: f32) -> vec4f {{ \
                 return textureSampleLevel(input{index}, linear_sampler, dir, lod); }}"
            );
            return;
        }
    };
    let _ = writeln!(
        out,
        "@group(0) @binding({binding}) var input{index}: {ty};\n\
         fn load{index}(c: vec2i, lvl: i32) -> vec4f {{ return {load}; }}\n\
         fn size{index}(lvl: i32) -> vec2i {{ return vec2i(textureDimensions(input{index}, lvl)); }}"
    );
}

fn entry_point(write: WriteMask, out: &mut String) {
    match write {
        WriteMask::Color => out.push_str(
            "@fragment\n\
             fn fs(v: VsOut) -> @location(0) vec4f {\n    \
             return effect(v.pos.xy, v.face);\n}\n",
        ),
        WriteMask::Depth => out.push_str(
            "struct DepthOut {\n    @builtin(frag_depth) depth: f32,\n}\n\n\
             @fragment\n\
             fn fs(v: VsOut) -> DepthOut {\n    \
             var out: DepthOut;\n    \
             out.depth = effect(v.pos.xy, v.face).r;\n    \
             return out;\n}\n",
        ),
    }
}

/// Assembles the WGSL module for `kind` drawn with `write` and `inputs` bound
/// in order.
pub fn shader_source(kind: ShaderKind, write: WriteMask, inputs: &[InputKind]) -> String {
    let mut out = String::with_capacity(4096);
    out.push_str(COMMON);
    out.push('\n');
    defines(kind, &mut out);
    for (index, input) in inputs.iter().enumerate() {
        input_binding(index, *input, &mut out);
    }
    out.push('\n');
    out.push_str(template(kind));
    out.push('\n');
    entry_point(write, &mut out);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hiz_variants_get_their_defines() {
        let src = shader_source(
            ShaderKind::hiz(DepthReduce::Min, HizStep::CopyDepth, true),
            WriteMask::Depth,
            &[InputKind::DepthArray],
        );
        assert!(src.contains("const MIN_PASS: bool = true;"));
        assert!(src.contains("const COPY_DEPTH: bool = true;"));
        assert!(src.contains("texture_depth_2d_array"));
        assert!(src.contains("@builtin(frag_depth)"));
    }

    #[test]
    fn input_kind_follows_format() {
        assert_eq!(
            InputKind::of(TextureFormat::R32Float, TextureKind::D2),
            InputKind::Float
        );
        assert_eq!(
            InputKind::of(TextureFormat::Depth24Stencil8, TextureKind::D2Array),
            InputKind::DepthArray
        );
    }
}
