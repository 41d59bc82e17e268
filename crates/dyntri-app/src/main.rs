// SPDX-License-Identifier: CEPL-1.0
#![deny(unsafe_op_in_unsafe_fn)]
use anyhow::{Context, Result};
use clap::Parser;
use dyntri_core::init_tracing;
use dyntri_platform::WindowProvider;
use dyntri_render::{HeadlessProvider, RenderSize, SurfaceProvider};
use dyntri_vk::{
    ClearStrategy, FrameLoop, PipelineConfig, RenderConfig, RenderContext, ShaderSet,
    VsyncMode as VkVsyncMode,
};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

const EXIT_INIT: u8 = 1;
const EXIT_FRAME: u8 = 2;
const DEFAULT_HEADLESS_FRAMES: u64 = 3;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML config file; missing means defaults
    #[arg(long, default_value = "dyntri.toml")]
    config: PathBuf,
    /// Render to an offscreen headless surface instead of a window
    #[arg(long)]
    headless: bool,
    /// Stop after presenting this many frames
    #[arg(long)]
    frames: Option<u64>,
    /// Skip the Khronos validation layer
    #[arg(long)]
    no_validation: bool,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum VsyncMode {
    #[default]
    Fifo,
    Mailbox,
}

#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
enum ClearStrategyCfg {
    #[default]
    LoadOp,
    Transfer,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
struct WindowCfg {
    title: String,
    width: u32,
    height: u32,
}

impl Default for WindowCfg {
    fn default() -> Self {
        WindowCfg {
            title: "Vulkan window".into(),
            width: 800,
            height: 600,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(default)]
struct RenderCfg {
    app_name: String,
    clear_color: [f32; 4],
    vsync: bool,
    vsync_mode: VsyncMode,
    image_count: Option<u32>,
    clear_strategy: ClearStrategyCfg,
    validation: bool,
    max_rebuild_attempts: u32,
    vertex_shader: PathBuf,
    fragment_shader: PathBuf,
}

impl Default for RenderCfg {
    fn default() -> Self {
        let base = RenderConfig::default();
        RenderCfg {
            app_name: base.app_name,
            clear_color: base.clear_color,
            vsync: base.vsync,
            vsync_mode: VsyncMode::Fifo,
            image_count: base.image_count,
            clear_strategy: ClearStrategyCfg::LoadOp,
            validation: base.validation,
            max_rebuild_attempts: base.max_rebuild_attempts,
            vertex_shader: base.shaders.vertex,
            fragment_shader: base.shaders.fragment,
        }
    }
}

impl RenderCfg {
    fn to_render_config(&self, no_validation: bool) -> RenderConfig {
        RenderConfig {
            app_name: self.app_name.clone(),
            validation: self.validation && !no_validation,
            vsync: self.vsync,
            vsync_mode: match self.vsync_mode {
                VsyncMode::Fifo => VkVsyncMode::Fifo,
                VsyncMode::Mailbox => VkVsyncMode::Mailbox,
            },
            image_count: self.image_count,
            clear_color: self.clear_color,
            clear_strategy: match self.clear_strategy {
                ClearStrategyCfg::LoadOp => ClearStrategy::LoadOp,
                ClearStrategyCfg::Transfer => ClearStrategy::Transfer,
            },
            max_rebuild_attempts: self.max_rebuild_attempts,
            shaders: ShaderSet {
                vertex: self.vertex_shader.clone(),
                fragment: self.fragment_shader.clone(),
            },
            pipeline: PipelineConfig::default(),
        }
    }
}

#[derive(Debug, Deserialize, Default, Clone, PartialEq)]
#[serde(default)]
struct AppCfg {
    window: WindowCfg,
    render: RenderCfg,
}

fn parse_cfg(text: &str) -> Result<AppCfg, toml::de::Error> {
    toml::from_str::<AppCfg>(text)
}

fn load_cfg(path: &Path) -> AppCfg {
    match fs::read_to_string(path) {
        Ok(s) => parse_cfg(&s).unwrap_or_else(|e| {
            warn!("{}: {e}; using defaults", path.display());
            AppCfg::default()
        }),
        Err(_) => {
            info!("no config at {}, using defaults", path.display());
            AppCfg::default()
        }
    }
}

fn open_provider(args: &Args, cfg: &AppCfg) -> Result<Box<dyn SurfaceProvider>> {
    let size = RenderSize::new(cfg.window.width, cfg.window.height);
    if args.headless {
        let budget = args.frames.unwrap_or(DEFAULT_HEADLESS_FRAMES);
        info!("headless run: {} frames at {}x{}", budget, size.width, size.height);
        let frames = u32::try_from(budget).unwrap_or(u32::MAX);
        return Ok(Box::new(HeadlessProvider::new(size).with_frame_budget(frames)));
    }
    let window = WindowProvider::open(&cfg.window.title, size).context("opening the window")?;
    Ok(Box::new(window))
}

fn init_renderer(provider: &dyn SurfaceProvider, cfg: &RenderConfig) -> Result<FrameLoop> {
    let ctx = RenderContext::new(provider, cfg).context("creating the Vulkan context")?;
    let frames = FrameLoop::new(ctx, cfg).context("building the triangle pipeline")?;
    Ok(frames)
}

fn main() -> ExitCode {
    init_tracing();
    let args = Args::parse();
    let cfg = load_cfg(&args.config);
    let render_cfg = cfg.render.to_render_config(args.no_validation);

    let mut provider = match open_provider(&args, &cfg) {
        Ok(p) => p,
        Err(e) => {
            error!("{e:#}");
            return ExitCode::from(EXIT_INIT);
        }
    };

    // Declared after the provider so it is dropped (and the surface destroyed) first.
    let mut frames = match init_renderer(provider.as_ref(), &render_cfg) {
        Ok(f) => f,
        Err(e) => {
            error!("initialization failed: {e:#}");
            return ExitCode::from(EXIT_INIT);
        }
    };
    info!(
        "rendering on {} ({}x{}, {:?})",
        frames.context().gpu().name,
        frames.context().extent().width,
        frames.context().extent().height,
        frames.context().present_mode()
    );

    match frames.run(provider.as_mut(), args.frames) {
        Ok(summary) => {
            info!("exiting after {} frames", summary.presented);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("fatal frame error: {e}");
            ExitCode::from(EXIT_FRAME)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let cfg = parse_cfg("").unwrap();
        assert_eq!(cfg, AppCfg::default());
        assert_eq!(cfg.window.title, "Vulkan window");
        assert_eq!((cfg.window.width, cfg.window.height), (800, 600));
        assert_eq!(cfg.render.app_name, "Vulkan Test");
        assert_eq!(cfg.render.clear_color, [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn partial_sections_keep_other_defaults() {
        let cfg = parse_cfg(
            r#"
            [window]
            width = 1024

            [render]
            vsync_mode = "mailbox"
            clear_strategy = "transfer"
            image_count = 2
            "#,
        )
        .unwrap();
        assert_eq!(cfg.window.width, 1024);
        assert_eq!(cfg.window.height, 600);
        assert_eq!(cfg.render.vsync_mode, VsyncMode::Mailbox);
        assert_eq!(cfg.render.clear_strategy, ClearStrategyCfg::Transfer);
        assert_eq!(cfg.render.image_count, Some(2));
        assert!(cfg.render.vsync);
    }

    #[test]
    fn render_config_mapping() {
        let cfg = parse_cfg(
            r#"
            [render]
            vsync = false
            clear_color = [0.1, 0.2, 0.3, 1.0]
            vertex_shader = "a.spv"
            fragment_shader = "b.spv"
            "#,
        )
        .unwrap();
        let rc = cfg.render.to_render_config(false);
        assert!(!rc.vsync);
        assert!(rc.validation);
        assert_eq!(rc.clear_color, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(rc.shaders.vertex, PathBuf::from("a.spv"));
        assert_eq!(rc.shaders.fragment, PathBuf::from("b.spv"));
        assert_eq!(rc.clear_strategy, ClearStrategy::LoadOp);
        assert_eq!(rc.max_rebuild_attempts, 3);
    }

    #[test]
    fn no_validation_flag_wins() {
        let rc = RenderCfg::default().to_render_config(true);
        assert!(!rc.validation);
    }

    #[test]
    fn unknown_enum_value_is_an_error() {
        assert!(parse_cfg("[render]\nvsync_mode = \"sometimes\"").is_err());
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let path = std::env::temp_dir().join(format!("dyntri-bad-{}.toml", std::process::id()));
        fs::write(&path, "[render\nvsync = ").unwrap();
        let cfg = load_cfg(&path);
        let _ = fs::remove_file(&path);
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = load_cfg(Path::new("definitely/missing/dyntri.toml"));
        assert_eq!(cfg, AppCfg::default());
    }

    #[test]
    fn cli_flags_parse() {
        let args = Args::parse_from(["dyntri", "--headless", "--frames", "5", "--no-validation"]);
        assert!(args.headless && args.no_validation);
        assert_eq!(args.frames, Some(5));
        assert_eq!(args.config, PathBuf::from("dyntri.toml"));
    }
}
