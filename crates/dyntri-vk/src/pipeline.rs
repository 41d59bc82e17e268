// SPDX-License-Identifier: CEPL-1.0
use ash::vk;
use std::path::PathBuf;
use tracing::info;

use crate::error::{InitError, InitResult};
use crate::shader::{create_shader_module, ShaderStage, ShaderStageDesc};

/// Fixed-function state for a dynamic rendering pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineConfig {
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    pub topology: vk::PrimitiveTopology,
    pub sample_count: vk::SampleCountFlags,
    pub depth_test: bool,
    pub blend: bool,
    /// Duplicates are ignored. Viewport and scissor must be in here.
    pub dynamic_states: Vec<vk::DynamicState>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::CLOCKWISE,
            topology: vk::PrimitiveTopology::TRIANGLE_LIST,
            sample_count: vk::SampleCountFlags::TYPE_1,
            depth_test: false,
            blend: false,
            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }
}

impl PipelineConfig {
    /// `dynamic_states` in first-seen order without repeats.
    pub fn dynamic_state_set(&self) -> Vec<vk::DynamicState> {
        let mut out: Vec<vk::DynamicState> = Vec::with_capacity(self.dynamic_states.len());
        for &s in &self.dynamic_states {
            if !out.contains(&s) {
                out.push(s);
            }
        }
        out
    }
}

/// SPIR-V files for the two stages of the triangle pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShaderSet {
    pub vertex: PathBuf,
    pub fragment: PathBuf,
}

impl Default for ShaderSet {
    fn default() -> Self {
        Self {
            vertex: PathBuf::from("shaders/vertex.vert.spv"),
            fragment: PathBuf::from("shaders/fragment.frag.spv"),
        }
    }
}

/// Color attachment format followed by the (unused) depth and stencil formats.
pub fn attachment_formats(color: vk::Format) -> [vk::Format; 3] {
    [color, vk::Format::UNDEFINED, vk::Format::UNDEFINED]
}

pub struct DynamicRenderingPipeline {
    pub layout: vk::PipelineLayout,
    pub pipeline: vk::Pipeline,
    pub formats: [vk::Format; 3],
}

impl DynamicRenderingPipeline {
    pub fn color_format(&self) -> vk::Format {
        self.formats[0]
    }

    pub(crate) unsafe fn destroy(&self, device: &ash::Device) {
        device.destroy_pipeline(self.pipeline, None);
        device.destroy_pipeline_layout(self.layout, None);
    }
}

pub(crate) fn validate_stages(stages: &[ShaderStageDesc<'_>], cfg: &PipelineConfig) -> InitResult<()> {
    for kind in [ShaderStage::Vertex, ShaderStage::Fragment] {
        let n = stages.iter().filter(|s| s.stage == kind).count();
        if n != 1 {
            return Err(InitError::PipelineCompilationFailed(format!(
                "expected exactly one {kind} stage, got {n}"
            )));
        }
    }
    if let Some(s) = stages.iter().find(|s| s.module == vk::ShaderModule::null()) {
        return Err(InitError::PipelineCompilationFailed(format!(
            "{} stage has no module",
            s.stage
        )));
    }
    if let Some(s) = stages.iter().find(|s| s.entry_point.is_empty()) {
        return Err(InitError::PipelineCompilationFailed(format!(
            "{} stage has an empty entry point",
            s.stage
        )));
    }
    let dynamic = cfg.dynamic_state_set();
    if !dynamic.contains(&vk::DynamicState::VIEWPORT) || !dynamic.contains(&vk::DynamicState::SCISSOR) {
        return Err(InitError::PipelineCompilationFailed(
            "viewport and scissor must be dynamic state".into(),
        ));
    }
    Ok(())
}

/// Builds a graphics pipeline that renders into a single `color_format`
/// attachment with `vkCmdBeginRendering`. No vertex buffers, no descriptors.
///
/// The shader modules behind `stages` may be destroyed once this returns.
pub unsafe fn create_dynamic_rendering_pipeline(
    device: &ash::Device,
    color_format: vk::Format,
    stages: &[ShaderStageDesc<'_>],
    cfg: &PipelineConfig,
) -> InitResult<DynamicRenderingPipeline> {
    // STRICT: the color format must match the swapchain; rebuild when it changes.
    validate_stages(stages, cfg)?;

    let stage_infos: Vec<_> = stages.iter().map(ShaderStageDesc::create_info).collect();

    // Vertices come from gl_VertexIndex.
    let vertex_input = vk::PipelineVertexInputStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VERTEX_INPUT_STATE_CREATE_INFO,
        ..Default::default()
    };
    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_INPUT_ASSEMBLY_STATE_CREATE_INFO,
        topology: cfg.topology,
        ..Default::default()
    };
    let dyn_states = cfg.dynamic_state_set();
    let dynamic_state = vk::PipelineDynamicStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DYNAMIC_STATE_CREATE_INFO,
        dynamic_state_count: dyn_states.len() as u32,
        p_dynamic_states: dyn_states.as_ptr(),
        ..Default::default()
    };
    let viewport_state = vk::PipelineViewportStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_VIEWPORT_STATE_CREATE_INFO,
        viewport_count: 1,
        scissor_count: 1,
        ..Default::default()
    };
    let raster = vk::PipelineRasterizationStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_RASTERIZATION_STATE_CREATE_INFO,
        polygon_mode: vk::PolygonMode::FILL,
        cull_mode: cfg.cull_mode,
        front_face: cfg.front_face,
        line_width: 1.0,
        ..Default::default()
    };
    let multisample = vk::PipelineMultisampleStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_MULTISAMPLE_STATE_CREATE_INFO,
        rasterization_samples: cfg.sample_count,
        ..Default::default()
    };
    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_DEPTH_STENCIL_STATE_CREATE_INFO,
        depth_test_enable: cfg.depth_test.into(),
        depth_write_enable: cfg.depth_test.into(),
        depth_compare_op: vk::CompareOp::LESS_OR_EQUAL,
        ..Default::default()
    };
    let color_blend_att = vk::PipelineColorBlendAttachmentState {
        color_write_mask: vk::ColorComponentFlags::RGBA,
        blend_enable: cfg.blend.into(),
        src_color_blend_factor: vk::BlendFactor::SRC_ALPHA,
        dst_color_blend_factor: vk::BlendFactor::ONE_MINUS_SRC_ALPHA,
        color_blend_op: vk::BlendOp::ADD,
        src_alpha_blend_factor: vk::BlendFactor::ONE,
        dst_alpha_blend_factor: vk::BlendFactor::ZERO,
        alpha_blend_op: vk::BlendOp::ADD,
    };
    let color_blend = vk::PipelineColorBlendStateCreateInfo {
        s_type: vk::StructureType::PIPELINE_COLOR_BLEND_STATE_CREATE_INFO,
        attachment_count: 1,
        p_attachments: &color_blend_att,
        ..Default::default()
    };

    let layout_info = vk::PipelineLayoutCreateInfo {
        s_type: vk::StructureType::PIPELINE_LAYOUT_CREATE_INFO,
        ..Default::default()
    };
    let layout = device
        .create_pipeline_layout(&layout_info, None)
        .map_err(|e| InitError::PipelineCompilationFailed(format!("create_pipeline_layout: {e}")))?;

    let formats = attachment_formats(color_format);
    let rendering = vk::PipelineRenderingCreateInfo {
        s_type: vk::StructureType::PIPELINE_RENDERING_CREATE_INFO,
        color_attachment_count: 1,
        p_color_attachment_formats: &formats[0],
        depth_attachment_format: formats[1],
        stencil_attachment_format: formats[2],
        ..Default::default()
    };

    let pipeline_info = vk::GraphicsPipelineCreateInfo {
        s_type: vk::StructureType::GRAPHICS_PIPELINE_CREATE_INFO,
        p_next: (&rendering as *const vk::PipelineRenderingCreateInfo<'_>).cast(),
        stage_count: stage_infos.len() as u32,
        p_stages: stage_infos.as_ptr(),
        p_vertex_input_state: &vertex_input,
        p_input_assembly_state: &input_assembly,
        p_viewport_state: &viewport_state,
        p_rasterization_state: &raster,
        p_multisample_state: &multisample,
        p_depth_stencil_state: &depth_stencil,
        p_color_blend_state: &color_blend,
        p_dynamic_state: &dynamic_state,
        layout,
        ..Default::default()
    };

    let pipeline = match device.create_graphics_pipelines(
        vk::PipelineCache::null(),
        std::slice::from_ref(&pipeline_info),
        None,
    ) {
        Ok(p) => p[0],
        Err((_, err)) => {
            device.destroy_pipeline_layout(layout, None);
            return Err(InitError::PipelineCompilationFailed(format!(
                "create_graphics_pipelines: {err}"
            )));
        }
    };

    Ok(DynamicRenderingPipeline {
        layout,
        pipeline,
        formats,
    })
}

/// Loads `shaders`, builds the pipeline for `color_format` and drops the modules.
pub fn build_triangle_pipeline(
    device: &ash::Device,
    color_format: vk::Format,
    shaders: &ShaderSet,
    cfg: &PipelineConfig,
) -> InitResult<DynamicRenderingPipeline> {
    let vs = create_shader_module(device, &shaders.vertex)?;
    let fs = create_shader_module(device, &shaders.fragment)?;
    let stages = [
        ShaderStageDesc::main(ShaderStage::Vertex, &vs),
        ShaderStageDesc::main(ShaderStage::Fragment, &fs),
    ];
    let pipeline = unsafe { create_dynamic_rendering_pipeline(device, color_format, &stages, cfg)? };
    info!("pipeline ready for {:?}", color_format);
    Ok(pipeline)
}
