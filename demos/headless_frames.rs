//! Drives a few frames of the effect pipeline on a headless GPU and prints
//! what each frame produced. Set `RUST_LOG=screenfx=debug` to watch buffers
//! come and go.

use screenfx::{
    CameraLens, CameraState, EffectsConfig, EffectsContext, EffectsResult, FrameInputs,
    GpuBackend, GpuContext, RenderSettings, TextureDesc, TextureFormat, WgpuBackend,
};

fn main() -> EffectsResult<()> {
    env_logger::init();

    let mut gpu = WgpuBackend::new(GpuContext::new_headless()?);
    let mut effects = EffectsContext::new(EffectsConfig::default());
    let mut view = effects.viewport();

    let mut settings = RenderSettings::load_or_default("screenfx.toml")?;
    settings.bloom.enabled = true;
    settings.motion_blur.enabled = true;

    let viewport = [960, 540];
    let depth = gpu.create_texture(&TextureDesc::d2(
        "scene_depth",
        viewport,
        TextureFormat::Depth24Stencil8,
    ))?;

    for frame in 0..4 {
        let camera = CameraState::new()
            .at(frame as f32 * 0.25, 1.0, 5.0)
            .looking_at(0.0, 0.0, 0.0)
            .through_camera(Some(CameraLens::default()));
        let inputs = FrameInputs::new(viewport, camera, settings.clone());

        let enabled = effects.effects_init(&mut gpu, &mut view, &inputs, depth)?;
        effects.effects_cache_init(&mut gpu, &mut view)?;
        let pyramid = effects.create_minmax_buffer(&mut gpu, &view, depth, None)?;
        let output = effects.draw_effects(&mut gpu, &mut view, &inputs)?;
        gpu.release_pool();
        gpu.flush();

        println!(
            "frame {frame}: {enabled:?}, HiZ {:?} + {} levels, final {} in {}, redraw {}",
            pyramid.top,
            pyramid.levels,
            output.texture,
            output.framebuffer,
            view.take_redraw_request()
        );
    }

    effects.release_all(&mut gpu, &mut view);
    effects.effects_free(&mut gpu);
    Ok(())
}
