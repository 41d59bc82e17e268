// SPDX-License-Identifier: CEPL-1.0
use crate::image::DEFAULT_CLEAR;
use crate::pipeline::{PipelineConfig, ShaderSet};
use crate::swapchain::VsyncMode;

/// How the color attachment gets its background each frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ClearStrategy {
    /// `LOAD_OP_CLEAR` on the rendering attachment.
    #[default]
    LoadOp,
    /// `vkCmdClearColorImage` in `TRANSFER_DST_OPTIMAL`, then rendering loads it.
    Transfer,
}

/// Everything the backend needs from the outside world.
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub app_name: String,
    pub validation: bool,
    pub vsync: bool,
    pub vsync_mode: VsyncMode,
    pub image_count: Option<u32>,
    pub clear_color: [f32; 4],
    pub clear_strategy: ClearStrategy,
    /// Swapchain rebuilds tried within one frame when acquire keeps reporting
    /// out-of-date.
    pub max_rebuild_attempts: u32,
    pub shaders: ShaderSet,
    pub pipeline: PipelineConfig,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            app_name: "Vulkan Test".into(),
            validation: true,
            vsync: true,
            vsync_mode: VsyncMode::Fifo,
            image_count: None,
            clear_color: DEFAULT_CLEAR,
            clear_strategy: ClearStrategy::LoadOp,
            max_rebuild_attempts: 3,
            shaders: ShaderSet::default(),
            pipeline: PipelineConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_demo() {
        let c = RenderConfig::default();
        assert_eq!(c.app_name, "Vulkan Test");
        assert!(c.validation && c.vsync);
        assert_eq!(c.clear_color, [0.0, 0.0, 0.0, 1.0]);
        assert_eq!(c.clear_strategy, ClearStrategy::LoadOp);
        assert_eq!(c.max_rebuild_attempts, 3);
        assert!(c.shaders.vertex.ends_with("vertex.vert.spv"));
        assert!(c.shaders.fragment.ends_with("fragment.frag.spv"));
    }
}
