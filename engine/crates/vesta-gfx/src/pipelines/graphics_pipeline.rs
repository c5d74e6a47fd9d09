use std::convert::identity;

use ash::vk;
use itertools::Itertools;

use crate::{
    error::{GfxResult, VkCheck},
    foundation::debug_messenger::DebugType,
    gfx_context::GfxContext,
    pipelines::shader::{GfxShaderModule, ShaderStageInfo},
};

/// 图形管线，只持有 vk::Pipeline；layout 由调用方共享持有
pub struct GfxGraphicsPipeline {
    pipeline: vk::Pipeline,
    layout: vk::PipelineLayout,
}
impl GfxGraphicsPipeline {
    pub fn new(
        ctx: &GfxContext,
        create_info: &GfxGraphicsPipelineCreateInfo,
        pipeline_layout: vk::PipelineLayout,
        pipeline_cache: vk::PipelineCache,
        debug_name: &str,
    ) -> GfxResult<Self> {
        let _span = tracy_client::span!("GfxGraphicsPipeline::new");

        // shader module 在 pipeline 创建之后即可销毁
        let mut shader_modules = scopeguard::guard(
            Vec::with_capacity(create_info.shader_stages.len()),
            |modules: Vec<GfxShaderModule>| modules.into_iter().for_each(|module| module.destroy(ctx)),
        );
        for stage in &create_info.shader_stages {
            shader_modules.push(GfxShaderModule::new(ctx, &stage.path)?);
        }
        let shader_stages_info = create_info
            .shader_stages
            .iter()
            .zip(shader_modules.iter())
            .map(|(stage, module)| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(stage.stage)
                    .module(module.handle())
                    .name(stage.entry_point)
            })
            .collect_vec();

        // dynamic rendering 需要的 framebuffer 信息
        let mut attach_info = vk::PipelineRenderingCreateInfo::default()
            .color_attachment_formats(&create_info.color_attach_formats)
            .depth_attachment_format(create_info.depth_attach_format);

        // 顶点数据通过 bindless storage buffer 在 shader 中读取
        let vertex_input_state_info = vk::PipelineVertexInputStateCreateInfo::default();

        let input_assembly_info = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(create_info.primitive_topology)
            .primitive_restart_enable(false);

        // viewport 和 scissor 具体值由 dynamic 决定，但是数量由该 create info 决定
        let viewport_info = vk::PipelineViewportStateCreateInfo {
            viewport_count: 1,
            scissor_count: 1,
            ..Default::default()
        };

        let msaa_info = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // 每个 color attachment 需要一个 blend state
        let color_attach_blend_states = create_info
            .color_attach_formats
            .iter()
            .map(|_| {
                vk::PipelineColorBlendAttachmentState::default()
                    .blend_enable(false)
                    .color_write_mask(vk::ColorComponentFlags::RGBA)
            })
            .collect_vec();
        let color_blend_info = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(&color_attach_blend_states);

        let dynamic_state_info =
            vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&create_info.dynamic_states);

        let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
            .stages(&shader_stages_info)
            .vertex_input_state(&vertex_input_state_info)
            .input_assembly_state(&input_assembly_info)
            .viewport_state(&viewport_info)
            .rasterization_state(&create_info.rasterize_state_info)
            .multisample_state(&msaa_info)
            .color_blend_state(&color_blend_info)
            .depth_stencil_state(&create_info.depth_stencil_info)
            .layout(pipeline_layout)
            .dynamic_state(&dynamic_state_info)
            .push_next(&mut attach_info);

        let pipelines = unsafe {
            ctx.device().create_graphics_pipelines(pipeline_cache, std::slice::from_ref(&pipeline_info), None)
        }
        .map_err(|(_, result)| result)
        .vk_check("vkCreateGraphicsPipelines")?;

        let pipeline = Self {
            pipeline: pipelines[0],
            layout: pipeline_layout,
        };
        ctx.device().set_debug_name(&pipeline, debug_name);
        Ok(pipeline)
    }

    #[inline]
    pub fn handle(&self) -> vk::Pipeline {
        self.pipeline
    }

    #[inline]
    pub fn layout(&self) -> vk::PipelineLayout {
        self.layout
    }

    #[inline]
    pub fn destroy(self, ctx: &GfxContext) {
        unsafe {
            ctx.device().destroy_pipeline(self.pipeline, None);
        }
    }
}
impl DebugType for GfxGraphicsPipeline {
    fn debug_type_name() -> &'static str {
        "GfxGraphicsPipeline"
    }

    fn vk_handle(&self) -> impl vk::Handle {
        self.pipeline
    }
}

pub struct GfxGraphicsPipelineCreateInfo {
    /// dynamic render 需要的 framebuffer 信息
    color_attach_formats: Vec<vk::Format>,
    /// UNDEFINED 表示不使用 depth attachment
    depth_attach_format: vk::Format,

    shader_stages: Vec<ShaderStageInfo>,

    primitive_topology: vk::PrimitiveTopology,

    rasterize_state_info: vk::PipelineRasterizationStateCreateInfo<'static>,

    depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo<'static>,

    dynamic_states: Vec<vk::DynamicState>,
}
impl Default for GfxGraphicsPipelineCreateInfo {
    fn default() -> Self {
        Self {
            color_attach_formats: vec![],
            depth_attach_format: vk::Format::UNDEFINED,

            shader_stages: vec![],

            primitive_topology: vk::PrimitiveTopology::TRIANGLE_LIST,

            rasterize_state_info: vk::PipelineRasterizationStateCreateInfo::default()
                .depth_clamp_enable(false)
                .rasterizer_discard_enable(false)
                .polygon_mode(vk::PolygonMode::FILL)
                .line_width(1.0)
                .cull_mode(vk::CullModeFlags::NONE)
                // viewport 的 y 轴是翻转的，front face 随之取 CW
                .front_face(vk::FrontFace::CLOCKWISE)
                .depth_bias_enable(false),

            depth_stencil_info: vk::PipelineDepthStencilStateCreateInfo::default()
                .depth_test_enable(true)
                .depth_write_enable(true)
                .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
                .depth_bounds_test_enable(false)
                .stencil_test_enable(false),

            dynamic_states: vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR],
        }
    }
}
// builder
impl GfxGraphicsPipelineCreateInfo {
    #[inline]
    pub fn attach_info(&mut self, color_attach_formats: Vec<vk::Format>, depth_format: Option<vk::Format>) -> &mut Self {
        self.color_attach_formats = color_attach_formats;
        self.depth_attach_format = depth_format.unwrap_or(vk::Format::UNDEFINED);
        self
    }

    #[inline]
    pub fn vertex_shader_stage(&mut self, path: impl Into<std::path::PathBuf>) -> &mut Self {
        self.shader_stages.push(ShaderStageInfo::new(vk::ShaderStageFlags::VERTEX, path));
        self
    }

    #[inline]
    pub fn fragment_shader_stage(&mut self, path: impl Into<std::path::PathBuf>) -> &mut Self {
        self.shader_stages.push(ShaderStageInfo::new(vk::ShaderStageFlags::FRAGMENT, path));
        self
    }

    #[inline]
    pub fn cull_mode(&mut self, mode: vk::CullModeFlags, front_face: vk::FrontFace) -> &mut Self {
        self.rasterize_state_info.cull_mode = mode;
        self.rasterize_state_info.front_face = front_face;
        self
    }

    #[inline]
    pub fn depth_test(&mut self, depth_test_op: Option<vk::CompareOp>, depth_write: bool) -> &mut Self {
        self.depth_stencil_info.depth_test_enable = depth_test_op.map_or(vk::FALSE, |_| vk::TRUE);
        self.depth_stencil_info.depth_compare_op = depth_test_op.map_or(vk::CompareOp::NEVER, identity);
        self.depth_stencil_info.depth_write_enable = if depth_write { vk::TRUE } else { vk::FALSE };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_material_pipeline_state() {
        let info = GfxGraphicsPipelineCreateInfo::default();
        assert_eq!(info.rasterize_state_info.cull_mode, vk::CullModeFlags::NONE);
        assert_eq!(info.rasterize_state_info.front_face, vk::FrontFace::CLOCKWISE);
        assert_eq!(info.depth_stencil_info.depth_compare_op, vk::CompareOp::LESS_OR_EQUAL);
        assert_eq!(info.depth_stencil_info.depth_write_enable, vk::TRUE);
        assert_eq!(info.dynamic_states, vec![vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR]);
    }

    #[test]
    fn test_depth_test_builder() {
        let mut info = GfxGraphicsPipelineCreateInfo::default();
        info.depth_test(None, false).attach_info(vec![vk::Format::B8G8R8A8_SRGB], Some(vk::Format::D32_SFLOAT));
        assert_eq!(info.depth_stencil_info.depth_test_enable, vk::FALSE);
        assert_eq!(info.depth_attach_format, vk::Format::D32_SFLOAT);
        assert_eq!(info.color_attach_formats.len(), 1);
    }
}
