// SPDX-License-Identifier: CEPL-1.0
//! Vulkan 1.3 dynamic rendering backend: context setup, the triangle pipeline
//! and the per-frame loop.
mod commands;
mod config;
mod context;
mod debug;
mod device;
mod error;
mod frame;
mod image;
mod instance;
mod pipeline;
mod shader;
mod swapchain;
mod sync;

pub use ash::vk;

pub use commands::CommandResources;
pub use config::{ClearStrategy, RenderConfig};
pub use context::RenderContext;
pub use device::GpuSelection;
pub use error::{FrameError, FrameResult, InitError, InitResult, Recoverable};
pub use frame::{FrameLoop, FrameStatus, RunSummary};
pub use image::{
    basic_subresource_range, clear_image, image_barrier, insert_memory_barrier, LayoutTracker,
    DEFAULT_CLEAR,
};
pub use instance::REQUIRED_API_VERSION;
pub use pipeline::{
    attachment_formats, build_triangle_pipeline, create_dynamic_rendering_pipeline,
    DynamicRenderingPipeline, PipelineConfig, ShaderSet,
};
pub use shader::{
    create_shader_module, parse_spirv, read_spirv_words, ShaderModule, ShaderStage,
    ShaderStageDesc, DEFAULT_ENTRY_POINT,
};
pub use swapchain::{SwapchainBundle, VsyncMode};
pub use sync::{FrameSyncRing, FRAMES_IN_FLIGHT};
