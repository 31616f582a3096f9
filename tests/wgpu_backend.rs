//! Full frames on wgpu's noop backend, which validates every pipeline and
//! pass without a GPU.

use screenfx::{
    CameraState, DeviceCaps, EffectsConfig, EffectsContext, FrameInputs, GpuBackend, GpuContext,
    RenderSettings, TextureDesc, TextureFormat, WgpuBackend,
};

const VIEWPORT: [u32; 2] = [64, 48];

fn noop_backend(caps: DeviceCaps) -> WgpuBackend {
    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::NOOP,
        backend_options: wgpu::BackendOptions {
            noop: wgpu::NoopBackendOptions { enable: true },
            ..Default::default()
        },
        ..Default::default()
    });
    let gpu = GpuContext::from_instance(&instance).unwrap();
    WgpuBackend::with_caps(gpu, caps)
}

fn run_frames(caps: DeviceCaps) -> Option<wgpu::Error> {
    let mut gpu = noop_backend(caps);
    gpu.gpu()
        .device
        .push_error_scope(wgpu::ErrorFilter::Validation);

    let mut effects = EffectsContext::new(EffectsConfig::default());
    let mut view = effects.viewport();
    let mut settings = RenderSettings::default();
    settings.bloom.enabled = true;
    let depth = gpu
        .create_texture(&TextureDesc::d2(
            "scene_depth",
            VIEWPORT,
            TextureFormat::Depth24Stencil8,
        ))
        .unwrap();

    for _ in 0..2 {
        let inputs = FrameInputs::new(VIEWPORT, CameraState::new(), settings.clone());
        effects
            .effects_init(&mut gpu, &mut view, &inputs, depth)
            .unwrap();
        effects.effects_cache_init(&mut gpu, &mut view).unwrap();
        effects
            .create_minmax_buffer(&mut gpu, &view, depth, None)
            .unwrap();
        effects.draw_effects(&mut gpu, &mut view, &inputs).unwrap();
        gpu.release_pool();
        gpu.flush();
    }
    effects.release_all(&mut gpu, &mut view);
    effects.effects_free(&mut gpu);

    pollster::block_on(gpu.gpu().device.pop_error_scope())
}

#[test]
fn depth_pyramid_frames_validate() {
    let error = run_frames(DeviceCaps {
        supports_depth_only_framebuffer: true,
    });
    assert!(error.is_none(), "{error:?}");
}

#[test]
fn float_pyramid_frames_validate() {
    let error = run_frames(DeviceCaps {
        supports_depth_only_framebuffer: false,
    });
    assert!(error.is_none(), "{error:?}");
}
