//! Every generated shader variant parses and validates without a GPU.

use screenfx::{
    DepthReduce, HizStep, InputKind, ShaderKind, WriteMask, all_shader_kinds, shader_source,
};

/// The inputs and attachment a variant is drawn with.
fn signatures(kind: ShaderKind) -> Vec<(WriteMask, Vec<InputKind>)> {
    use InputKind::*;
    match kind {
        ShaderKind::Downsample => vec![(WriteMask::Color, vec![Float])],
        ShaderKind::DownsampleCube => vec![(WriteMask::Color, vec![Cube])],
        ShaderKind::VelocityResolve => vec![(WriteMask::Color, vec![Depth])],
        ShaderKind::Hiz {
            step: HizStep::DownLevel,
            ..
        } => vec![
            (WriteMask::Depth, vec![Depth]),
            (WriteMask::Color, vec![Float]),
        ],
        ShaderKind::Hiz { layered, .. } => {
            let input = if layered { DepthArray } else { Depth };
            vec![(WriteMask::Depth, vec![input]), (WriteMask::Color, vec![input])]
        }
        ShaderKind::MotionBlur | ShaderKind::DepthOfField => {
            vec![(WriteMask::Color, vec![Float, Depth])]
        }
        ShaderKind::TemporalResolve => vec![(WriteMask::Color, vec![Float, Float])],
        ShaderKind::BloomResolve => vec![(WriteMask::Color, vec![Float])],
    }
}

fn validate(kind: ShaderKind, write: WriteMask, inputs: &[InputKind]) {
    let src = shader_source(kind, write, inputs);
    let module = naga::front::wgsl::parse_str(&src).unwrap_or_else(|e| {
        panic!(
            "{kind:?} {write:?} {inputs:?}: WGSL parse failed: {}\nWGSL:\n{src}",
            e.emit_to_string(&src)
        )
    });
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .unwrap_or_else(|e| panic!("{kind:?} {write:?} {inputs:?}: validation failed: {e:?}"));
}

#[test]
fn every_variant_validates() {
    for kind in all_shader_kinds() {
        for (write, inputs) in signatures(kind) {
            validate(kind, write, &inputs);
        }
    }
}

#[test]
fn min_pyramid_variants_validate() {
    for kind in all_shader_kinds() {
        if let ShaderKind::Hiz {
            reduce: DepthReduce::Max,
            step,
            layered,
        } = kind
        {
            let min = ShaderKind::hiz(DepthReduce::Min, step, layered);
            for (write, inputs) in signatures(min) {
                validate(min, write, &inputs);
            }
        }
    }
}

#[test]
fn array_colour_inputs_validate() {
    validate(
        ShaderKind::Downsample,
        WriteMask::Color,
        &[InputKind::FloatArray],
    );
}

#[test]
fn min_and_max_variants_differ_only_in_defines() {
    let max = shader_source(
        ShaderKind::hiz(DepthReduce::Max, HizStep::DownLevel, false),
        WriteMask::Depth,
        &[InputKind::Depth],
    );
    let min = shader_source(
        ShaderKind::hiz(DepthReduce::Min, HizStep::DownLevel, false),
        WriteMask::Depth,
        &[InputKind::Depth],
    );
    let diff: Vec<_> = max
        .lines()
        .zip(min.lines())
        .filter(|(a, b)| a != b)
        .collect();
    assert_eq!(
        diff,
        vec![
            ("const MAX_PASS: bool = true;", "const MAX_PASS: bool = false;"),
            ("const MIN_PASS: bool = false;", "const MIN_PASS: bool = true;"),
        ]
    );
}

#[test]
fn inputs_bind_after_params_and_sampler() {
    let src = shader_source(
        ShaderKind::TemporalResolve,
        WriteMask::Color,
        &[InputKind::Float, InputKind::Float],
    );
    assert!(src.contains("@group(0) @binding(0) var<uniform> params: DrawParams;"));
    assert!(src.contains("@group(0) @binding(2) var input0: texture_2d<f32>;"));
    assert!(src.contains("@group(0) @binding(3) var input1: texture_2d<f32>;"));
}
