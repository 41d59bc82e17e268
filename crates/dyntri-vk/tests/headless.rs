// SPDX-License-Identifier: CEPL-1.0
//! End-to-end frames against `VK_EXT_headless_surface`. Every test returns
//! early on machines without a usable Vulkan 1.3 driver.
use dyntri_render::{HeadlessProvider, RenderSize};
use dyntri_vk::{
    build_triangle_pipeline, vk, ClearStrategy, FrameLoop, FrameStatus, InitError,
    PipelineConfig, RenderConfig, RenderContext, ShaderSet,
};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};

/// Set to anything but `0` to fail instead of skipping when Vulkan is missing.
const REQUIRE_VULKAN_ENV: &str = "DYNTRI_REQUIRE_VULKAN";

fn shader_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../shaders")
}

fn test_config() -> RenderConfig {
    RenderConfig {
        app_name: "dyntri-tests".into(),
        shaders: ShaderSet {
            vertex: shader_dir().join("vertex.vert.spv"),
            fragment: shader_dir().join("fragment.frag.spv"),
        },
        ..Default::default()
    }
}

fn vulkan_required(value: Option<&OsStr>) -> bool {
    value.is_some_and(|v| !v.is_empty() && v != "0")
}

fn context_or_skip(provider: &HeadlessProvider, cfg: &RenderConfig) -> Option<RenderContext> {
    dyntri_core::init_tracing();
    match RenderContext::new(provider, cfg) {
        Ok(ctx) => Some(ctx),
        Err(
            e @ (InitError::Loading(_)
            | InitError::InstanceCreation(_)
            | InitError::SurfaceCreationFailed(_)
            | InitError::MissingRequiredFeature(_)
            | InitError::NoSuitableDevice(_)),
        ) => {
            if vulkan_required(std::env::var_os(REQUIRE_VULKAN_ENV).as_deref()) {
                panic!("{REQUIRE_VULKAN_ENV} is set but Vulkan is unavailable: {e}");
            }
            eprintln!("skipping: Vulkan unavailable ({e})");
            None
        }
        Err(e) => panic!("context creation failed: {e}"),
    }
}

fn assert_presented(status: FrameStatus, image_count: usize) -> (u32, bool) {
    match status {
        FrameStatus::Presented {
            image_index,
            rebuilt,
        } => {
            assert!((image_index as usize) < image_count);
            (image_index, rebuilt)
        }
        FrameStatus::Skipped => panic!("frame was skipped"),
    }
}

#[test]
fn require_vulkan_switch() {
    assert!(!vulkan_required(None));
    assert!(!vulkan_required(Some(OsStr::new(""))));
    assert!(!vulkan_required(Some(OsStr::new("0"))));
    assert!(vulkan_required(Some(OsStr::new("1"))));
    assert!(vulkan_required(Some(OsStr::new("yes"))));
}

#[test]
fn three_frames_present_cleanly() {
    let provider = HeadlessProvider::new(RenderSize::new(64, 64));
    let cfg = RenderConfig {
        image_count: Some(2),
        ..test_config()
    };
    let Some(ctx) = context_or_skip(&provider, &cfg) else {
        return;
    };

    assert!(ctx.image_count() >= 1);
    // FIFO is the vsync default and always supported.
    assert_eq!(ctx.present_mode(), vk::PresentModeKHR::FIFO);
    assert_eq!(ctx.image_count(), ctx.view_count());
    assert_eq!(ctx.sync().image_semaphore_count(), ctx.image_count());
    for i in 0..ctx.image_count() {
        assert_eq!(ctx.image_layout(i), Some(vk::ImageLayout::UNDEFINED));
    }

    let mut frames = FrameLoop::new(ctx, &cfg).expect("pipeline");
    assert_eq!(
        frames.pipeline().color_format(),
        frames.context().swapchain_format()
    );

    for _ in 0..3 {
        let status = frames.draw_frame(RenderSize::new(64, 64)).expect("frame");
        let (index, rebuilt) = assert_presented(status, frames.context().image_count());
        assert!(!rebuilt);
        assert_eq!(
            frames.context().image_layout(index as usize),
            Some(vk::ImageLayout::PRESENT_SRC_KHR)
        );
    }
    assert_eq!(frames.context().validation_errors(), 0);
}

#[test]
fn transfer_clear_presents() {
    let provider = HeadlessProvider::new(RenderSize::new(32, 32));
    let cfg = RenderConfig {
        clear_strategy: ClearStrategy::Transfer,
        clear_color: [0.2, 0.3, 0.4, 1.0],
        ..test_config()
    };
    let Some(ctx) = context_or_skip(&provider, &cfg) else {
        return;
    };
    let mut frames = FrameLoop::new(ctx, &cfg).expect("pipeline");

    let status = frames.draw_frame(RenderSize::new(32, 32)).expect("frame");
    let (index, _) = assert_presented(status, frames.context().image_count());
    assert_eq!(
        frames.context().image_layout(index as usize),
        Some(vk::ImageLayout::PRESENT_SRC_KHR)
    );
    assert_eq!(frames.context().validation_errors(), 0);
}

#[test]
fn stale_swapchain_is_rebuilt_before_next_frame() {
    let provider = HeadlessProvider::new(RenderSize::new(64, 64));
    let cfg = test_config();
    let Some(ctx) = context_or_skip(&provider, &cfg) else {
        return;
    };
    let mut frames = FrameLoop::new(ctx, &cfg).expect("pipeline");

    assert_presented(
        frames.draw_frame(RenderSize::new(64, 64)).expect("first frame"),
        frames.context().image_count(),
    );

    frames.mark_stale();
    let status = frames.draw_frame(RenderSize::new(96, 48)).expect("rebuilt frame");
    let (_, rebuilt) = assert_presented(status, frames.context().image_count());
    assert!(rebuilt);
    // Headless surfaces take their extent from the swapchain.
    let extent = frames.context().extent();
    assert_eq!((extent.width, extent.height), (96, 48));
    assert_eq!(frames.context().image_count(), frames.context().view_count());
    assert_eq!(
        frames.context().sync().image_semaphore_count(),
        frames.context().image_count()
    );

    let status = frames.draw_frame(RenderSize::new(96, 48)).expect("frame after");
    let (_, rebuilt) = assert_presented(status, frames.context().image_count());
    assert!(!rebuilt);
    assert_eq!(frames.context().validation_errors(), 0);
}

#[test]
fn run_honors_frame_budget_and_resizes() {
    let mut provider = HeadlessProvider::new(RenderSize::new(48, 48)).with_frame_budget(4);
    let cfg = test_config();
    let Some(ctx) = context_or_skip(&provider, &cfg) else {
        return;
    };
    let mut frames = FrameLoop::new(ctx, &cfg).expect("pipeline");

    provider.resize(RenderSize::new(40, 30));
    let summary = frames.run(&mut provider, None).expect("run");
    assert_eq!(summary.presented, 4);
    assert_eq!(summary.rebuilds, 1);
    assert_eq!(summary.skipped, 0);
    assert_eq!(provider.frames_pumped(), 4);
}

#[test]
fn zero_area_frame_is_skipped() {
    let provider = HeadlessProvider::new(RenderSize::new(16, 16));
    let cfg = test_config();
    let Some(ctx) = context_or_skip(&provider, &cfg) else {
        return;
    };
    let mut frames = FrameLoop::new(ctx, &cfg).expect("pipeline");
    assert_eq!(
        frames.draw_frame(RenderSize::new(0, 16)).expect("skip"),
        FrameStatus::Skipped
    );
}

#[test]
fn bad_shaders_fail_pipeline_creation() {
    let provider = HeadlessProvider::new(RenderSize::new(16, 16));
    let cfg = test_config();
    let Some(ctx) = context_or_skip(&provider, &cfg) else {
        return;
    };

    let garbage = std::env::temp_dir().join(format!("dyntri-garbage-{}.spv", std::process::id()));
    std::fs::write(&garbage, [0x5Au8; 12]).expect("write temp file");

    let bad = ShaderSet {
        vertex: garbage.clone(),
        fragment: cfg.shaders.fragment.clone(),
    };
    let err = build_triangle_pipeline(
        ctx.device(),
        ctx.swapchain_format(),
        &bad,
        &PipelineConfig::default(),
    )
    .err()
    .expect("garbage must be rejected");
    assert!(matches!(err, InitError::ShaderModuleInvalid { .. }), "{err}");

    let missing = ShaderSet {
        vertex: shader_dir().join("nope.vert.spv"),
        fragment: cfg.shaders.fragment.clone(),
    };
    let err = build_triangle_pipeline(
        ctx.device(),
        ctx.swapchain_format(),
        &missing,
        &PipelineConfig::default(),
    )
    .err()
    .expect("missing file must be rejected");
    assert!(matches!(err, InitError::ShaderFileNotFound { .. }), "{err}");

    let _ = std::fs::remove_file(garbage);
    assert_eq!(ctx.validation_errors(), 0);
}
