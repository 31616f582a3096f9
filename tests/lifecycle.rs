//! Frame lifecycle driven against the recording backend.

use screenfx::{
    BufferId, COLOR_SLOT, CameraLens, CameraState, DEBUG_VELOCITY_BUFFER, EffectSet,
    EffectsConfig, EffectsContext, EffectsError, FLAG_RESET_HISTORY, FinalOutput, FrameInputs,
    GpuBackend, Event, NORMAL_SLOT, RecordedDraw, RecordingBackend, RenderMode, RenderSettings,
    ShaderKind, TextureDesc, TextureFormat, TextureId, ViewportEffects,
};

const VIEWPORT: [u32; 2] = [320, 180];

struct Harness {
    gpu: RecordingBackend,
    effects: EffectsContext,
    view: ViewportEffects,
    depth: TextureId,
}

impl Harness {
    fn new() -> Self {
        let mut gpu = RecordingBackend::new();
        let depth = gpu
            .create_texture(&TextureDesc::d2(
                "scene_depth",
                VIEWPORT,
                TextureFormat::Depth24Stencil8,
            ))
            .unwrap();
        let effects = EffectsContext::new(EffectsConfig::default());
        let view = effects.viewport();
        Self {
            gpu,
            effects,
            view,
            depth,
        }
    }

    fn frame(&mut self, inputs: &FrameInputs) -> Result<FinalOutput, EffectsError> {
        self.effects
            .effects_init(&mut self.gpu, &mut self.view, inputs, self.depth)?;
        self.effects
            .effects_cache_init(&mut self.gpu, &mut self.view)?;
        self.effects
            .create_minmax_buffer(&mut self.gpu, &self.view, self.depth, None)?;
        let output = self
            .effects
            .draw_effects(&mut self.gpu, &mut self.view, inputs)?;
        self.gpu.release_pool();
        Ok(output)
    }

    fn stage_draws(&self) -> Vec<RecordedDraw> {
        self.gpu
            .draws()
            .filter(|d| !matches!(d.shader, ShaderKind::Hiz { .. } | ShaderKind::Downsample))
            .cloned()
            .collect()
    }
}

fn quiet_settings() -> RenderSettings {
    let mut settings = RenderSettings::default();
    settings.temporal.samples = 1;
    settings
}

fn inputs(settings: RenderSettings) -> FrameInputs {
    FrameInputs::new(VIEWPORT, CameraState::new(), settings)
}

fn written(draw: &RecordedDraw) -> TextureId {
    draw.attachments[COLOR_SLOT].unwrap().texture
}

#[test]
fn entry_points_refuse_to_run_before_init() {
    let mut h = Harness::new();
    let frame = inputs(quiet_settings());

    let err = h
        .effects
        .draw_effects(&mut h.gpu, &mut h.view, &frame)
        .unwrap_err();
    assert!(matches!(err, EffectsError::NotInitialized(_)));
    assert!(h.effects.effects_cache_init(&mut h.gpu, &mut h.view).is_err());
    assert!(
        h.effects
            .create_minmax_buffer(&mut h.gpu, &h.view, h.depth, None)
            .is_err()
    );

    h.effects
        .effects_init(&mut h.gpu, &mut h.view, &frame, h.depth)
        .unwrap();
    let err = h
        .effects
        .draw_effects(&mut h.gpu, &mut h.view, &frame)
        .unwrap_err();
    assert!(matches!(err, EffectsError::NotInitialized("effects_cache_init")));
    assert_eq!(h.gpu.draws().count(), 0);
}

#[test]
fn double_buffer_alone_swaps_exactly_once() {
    let mut h = Harness::new();
    let mut settings = quiet_settings();
    settings.screen_raytrace.refraction = true;
    let frame = inputs(settings);

    h.effects
        .effects_init(&mut h.gpu, &mut h.view, &frame, h.depth)
        .unwrap();
    h.effects.effects_cache_init(&mut h.gpu, &mut h.view).unwrap();
    assert_eq!(
        h.view.enabled(),
        EffectSet::REFRACTION | EffectSet::DOUBLE_BUFFER
    );

    let main = h.view.buffers().texture(BufferId::MainColor).unwrap();
    let main_fb = h.view.buffers().fb(BufferId::MainColor).unwrap();
    let double = h.view.buffers().texture(BufferId::DoubleBuffer).unwrap();

    let output = h
        .effects
        .draw_effects(&mut h.gpu, &mut h.view, &frame)
        .unwrap();
    assert_eq!(output.texture, main);
    assert_eq!(output.framebuffer, main_fb);
    assert_eq!(h.view.buffers().texture(BufferId::MainColor), Some(double));
    assert_eq!(h.view.buffers().texture(BufferId::DoubleBuffer), Some(main));
    assert_eq!(h.stage_draws().len(), 0);
}

#[test]
fn warm_up_frame_requests_one_redraw() {
    let mut h = Harness::new();
    let frame = inputs(RenderSettings::default());

    h.frame(&frame).unwrap();
    assert!(h.view.enabled().contains(EffectSet::TAA | EffectSet::DOUBLE_BUFFER));
    assert!(h.view.take_redraw_request());
    assert!(!h.view.take_redraw_request());

    h.frame(&frame).unwrap();
    assert!(!h.view.take_redraw_request());
}

#[test]
fn image_renders_never_request_redraws() {
    let mut h = Harness::new();
    let frame = inputs(RenderSettings::default()).with_mode(RenderMode::ImageRender);
    h.frame(&frame).unwrap();
    assert!(!h.view.take_redraw_request());
    assert!(h.view.history().valid_double_buffer);
    assert!(h.view.history().valid_taa_history);
}

#[test]
fn resize_invalidates_history_again() {
    let mut h = Harness::new();
    let frame = inputs(RenderSettings::default());
    h.frame(&frame).unwrap();
    h.frame(&frame).unwrap();
    assert!(!h.view.take_redraw_request());

    let resized = FrameInputs::new([160, 90], CameraState::new(), RenderSettings::default());
    h.frame(&resized).unwrap();
    assert!(h.view.take_redraw_request());
}

#[test]
fn temporal_resolve_resets_then_accumulates() {
    let mut h = Harness::new();
    let frame = inputs(RenderSettings::default());
    let resolves = |h: &Harness| -> Vec<u32> {
        h.gpu
            .draws()
            .filter(|d| d.shader == ShaderKind::TemporalResolve)
            .map(|d| d.params.flags)
            .collect()
    };

    h.frame(&frame).unwrap();
    h.frame(&frame).unwrap();
    let moved = FrameInputs::new(
        VIEWPORT,
        CameraState::new().at(1.0, 0.0, 5.0),
        RenderSettings::default(),
    );
    h.frame(&moved).unwrap();

    assert_eq!(resolves(&h), vec![FLAG_RESET_HISTORY, 0, FLAG_RESET_HISTORY]);
}

#[test]
fn temporal_output_lands_in_history() {
    let mut h = Harness::new();
    let frame = inputs(RenderSettings::default());
    let output = h.frame(&frame).unwrap();

    let buffers = h.view.buffers();
    assert_eq!(Some(output.texture), buffers.texture(BufferId::TaaHistory));
    assert_eq!(Some(output.framebuffer), buffers.fb(BufferId::TaaHistory));

    let resolve = h.stage_draws().pop().unwrap();
    assert_eq!(resolve.shader, ShaderKind::TemporalResolve);
    assert_eq!(written(&resolve), output.texture);
}

#[test]
fn stages_run_in_order_and_chain_their_outputs() {
    let mut h = Harness::new();
    let mut settings = RenderSettings::default();
    settings.motion_blur.enabled = true;
    settings.depth_of_field.enabled = true;
    settings.bloom.enabled = true;
    settings.debug_value = DEBUG_VELOCITY_BUFFER;
    let mut frame = inputs(settings);
    frame.camera = CameraState::new().through_camera(Some(CameraLens::default()));

    let output = h.frame(&frame).unwrap();
    let stages = h.stage_draws();
    let shaders: Vec<ShaderKind> = stages.iter().map(|d| d.shader).collect();
    assert_eq!(
        shaders,
        vec![
            ShaderKind::VelocityResolve,
            ShaderKind::MotionBlur,
            ShaderKind::DepthOfField,
            ShaderKind::TemporalResolve,
            ShaderKind::BloomResolve,
        ]
    );

    for pair in stages[1..].windows(2) {
        let produced = written(&pair[0]);
        assert!(pair[1].reads(produced), "{:?} skipped the previous stage", pair[1].shader);
        assert_ne!(produced, written(&pair[1]));
    }
    assert_eq!(output.texture, written(stages.last().unwrap()));
}

#[test]
fn bloom_builds_the_source_mip_chain_first() {
    let mut h = Harness::new();
    let mut settings = quiet_settings();
    settings.bloom.enabled = true;
    settings.bloom.levels = 3;
    let frame = inputs(settings);

    let main = {
        h.effects
            .effects_init(&mut h.gpu, &mut h.view, &frame, h.depth)
            .unwrap();
        h.view.buffers().texture(BufferId::MainColor).unwrap()
    };
    h.effects.effects_cache_init(&mut h.gpu, &mut h.view).unwrap();
    h.gpu.clear_events();
    h.effects
        .draw_effects(&mut h.gpu, &mut h.view, &frame)
        .unwrap();

    let draws: Vec<&RecordedDraw> = h.gpu.draws().collect();
    let sizes: Vec<[u32; 2]> = draws
        .iter()
        .filter(|d| d.shader == ShaderKind::Downsample)
        .map(|d| d.viewport)
        .collect();
    assert_eq!(sizes, vec![[160, 90], [80, 45], [40, 22]]);
    let resolve = draws.last().unwrap();
    assert_eq!(resolve.shader, ShaderKind::BloomResolve);
    assert_eq!(resolve.params.level, 3);
    assert!(resolve.reads(main));
}

#[test]
fn velocity_resolve_sees_the_previous_view() {
    let mut h = Harness::new();
    let mut settings = quiet_settings();
    settings.debug_value = DEBUG_VELOCITY_BUFFER;
    let first = CameraState::new().at(0.0, 0.0, 5.0);
    let second = CameraState::new().at(0.5, 0.0, 5.0);

    h.frame(&FrameInputs::new(VIEWPORT, first, settings.clone()))
        .unwrap();
    h.frame(&FrameInputs::new(VIEWPORT, second, settings)).unwrap();

    let velocity: Vec<&RecordedDraw> = h
        .gpu
        .draws()
        .filter(|d| d.shader == ShaderKind::VelocityResolve)
        .collect();
    assert_eq!(velocity.len(), 2);
    assert_eq!(velocity[0].params.mat_b, first.persmat().to_cols_array_2d());
    assert_eq!(velocity[1].params.mat_b, first.persmat().to_cols_array_2d());
    assert_eq!(velocity[1].params.mat_a, second.persinv().to_cols_array_2d());
    assert!(velocity[1].reads(h.depth));
}

#[test]
fn allocation_failure_aborts_the_frame() {
    let mut h = Harness::new();
    let mut settings = quiet_settings();
    settings.bloom.enabled = true;
    let frame = inputs(settings);
    h.gpu.fail_allocations_for("color_post");

    let err = h.frame(&frame).unwrap_err();
    assert!(err.is_allocation());
    let err = h
        .effects
        .draw_effects(&mut h.gpu, &mut h.view, &frame)
        .unwrap_err();
    assert!(matches!(err, EffectsError::NotInitialized(_)));
    assert_eq!(h.gpu.draws().count(), 0);
}

#[test]
fn passes_are_rebuilt_only_when_effects_change() {
    let mut h = Harness::new();
    let count_passes = |h: &Harness| {
        h.gpu
            .events()
            .iter()
            .filter(|e| matches!(e, Event::CreatePass { .. }))
            .count()
    };
    let frame = inputs(quiet_settings());
    h.frame(&frame).unwrap();
    let built = count_passes(&h);
    h.frame(&frame).unwrap();
    assert_eq!(count_passes(&h), built);

    let mut settings = quiet_settings();
    settings.bloom.enabled = true;
    h.frame(&inputs(settings)).unwrap();
    assert!(count_passes(&h) > built);
    assert_eq!(h.gpu.live_passes(), h.view.passes().unwrap().len());
}

#[test]
fn mip_ratios_and_hiz_offset_are_published() {
    let mut h = Harness::new();
    h.frame(&inputs(quiet_settings())).unwrap();
    let common = h.view.common();
    assert_eq!(common.mip_ratio[0], [1.0, 1.0, 0.0, 0.0]);
    assert_eq!(common.hiz_mip_offset, 1);
    // 180 >> 2 = 45 exactly, 180 >> 3 = 22 rounds down
    assert_eq!(common.mip_ratio[2][1], 1.0);
    assert!(common.mip_ratio[3][1] > 1.0);
}

#[test]
fn teardown_releases_everything() {
    let mut h = Harness::new();
    let mut settings = RenderSettings::default();
    settings.bloom.enabled = true;
    settings.occlusion.enabled = true;
    h.frame(&inputs(settings)).unwrap();

    h.effects.release_all(&mut h.gpu, &mut h.view);
    h.effects.effects_free(&mut h.gpu);
    assert_eq!(h.gpu.live_textures(), 1);
    assert_eq!(h.gpu.live_framebuffers(), 0);
    assert_eq!(h.gpu.live_passes(), 0);
    assert_eq!(h.gpu.live_shaders(), 0);
}

#[test]
fn resize_with_occlusion_keeps_normals_on_main_framebuffer() {
    let mut h = Harness::new();
    let mut settings = RenderSettings::default();
    settings.occlusion.enabled = true;
    h.frame(&inputs(settings.clone())).unwrap();
    h.frame(&inputs(settings.clone())).unwrap();

    for size in [[160, 90], [200, 120], [320, 180]] {
        let resized = FrameInputs::new(size, CameraState::new(), settings.clone());
        h.frame(&resized).unwrap();
        let buffers = h.view.buffers();
        let main_fb = buffers.fb(BufferId::MainColor).unwrap();
        let normal = buffers.texture(BufferId::NormalInput).unwrap();
        assert_eq!(
            h.gpu.attachments(main_fb).unwrap()[NORMAL_SLOT].map(|a| a.texture),
            Some(normal)
        );
    }
}

#[test]
fn disabling_reflections_keeps_occlusion_running() {
    let mut h = Harness::new();
    let mut settings = quiet_settings();
    settings.occlusion.enabled = true;
    settings.screen_raytrace.reflections = true;
    h.frame(&inputs(settings.clone())).unwrap();
    h.frame(&inputs(settings.clone())).unwrap();

    settings.screen_raytrace.reflections = false;
    h.frame(&inputs(settings.clone())).unwrap();
    assert!(h.view.enabled().contains(EffectSet::GTAO));
    assert!(!h.view.buffers().contains(BufferId::DoubleBuffer));

    settings.screen_raytrace.reflections = true;
    h.frame(&inputs(settings)).unwrap();
    assert!(h.view.buffers().contains(BufferId::DoubleBuffer));
}

#[test]
fn failed_resize_drops_history_validity() {
    let mut h = Harness::new();
    let frame = inputs(RenderSettings::default());
    h.frame(&frame).unwrap();
    h.frame(&frame).unwrap();
    assert!(h.view.history().valid_double_buffer);
    assert!(h.view.history().valid_taa_history);

    // The double buffer is reallocated before the TAA history fails.
    h.gpu.fail_allocations_for("taa_history");
    let resized = FrameInputs::new([160, 90], CameraState::new(), RenderSettings::default());
    assert!(h.frame(&resized).unwrap_err().is_allocation());
    assert!(!h.view.history().valid_double_buffer);
    assert!(!h.view.history().valid_taa_history);

    h.gpu.clear_allocation_failures();
    h.frame(&resized).unwrap();
    assert!(h.view.take_redraw_request());
}

#[test]
fn pool_drops_textures_of_old_sizes() {
    let mut h = Harness::new();
    let mut settings = quiet_settings();
    settings.debug_value = DEBUG_VELOCITY_BUFFER;

    for width in (0..12).map(|i| 320 - i * 16) {
        let resized = FrameInputs::new([width, 180], CameraState::new(), settings.clone());
        h.frame(&resized).unwrap();
        assert!(h.gpu.pool_len() <= 2, "pool grew to {}", h.gpu.pool_len());
    }

    // A frame without the velocity buffer leaves its texture idle; the
    // next one destroys it.
    let plain = inputs(quiet_settings());
    h.frame(&plain).unwrap();
    h.frame(&plain).unwrap();
    assert_eq!(h.gpu.pool_len(), 0);
}
