// Graphics pipeline creation
//
// The pipeline is built once from two SPIR-V blobs and never changes.
// No vertex input: the vertex shader emits the triangle's corners itself.

use ash::vk;
use std::sync::Arc;

use super::shader::{ShaderCode, ShaderModule};
use super::{RenderPass, VulkanDevice};
use crate::error::{RendererError, Result, Stage, VkResultExt};

pub struct Pipeline {
    pub pipeline: vk::Pipeline,
    pub layout: vk::PipelineLayout,
    device: Arc<VulkanDevice>,
}

impl Pipeline {
    /// Build the triangle pipeline.
    ///
    /// Shader bytes are validated before any Vulkan object is created, and
    /// the shader modules are released as soon as the pipeline exists.
    pub fn new(
        device: Arc<VulkanDevice>,
        render_pass: &RenderPass,
        vertex_shader: &[u8],
        fragment_shader: &[u8],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let vertex_code = ShaderCode::from_bytes("vertex", vertex_shader)?;
        let fragment_code = ShaderCode::from_bytes("fragment", fragment_shader)?;

        let vert_module = ShaderModule::new(&device, &vertex_code)?;
        let frag_module = ShaderModule::new(&device, &fragment_code)?;

        let entry_point = c"main";

        let vert_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(vert_module.module)
            .name(entry_point)
            .build();

        let frag_stage = vk::PipelineShaderStageCreateInfo::builder()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(frag_module.module)
            .name(entry_point)
            .build();

        let shader_stages = &[vert_stage, frag_stage];

        // Vertex input (none)
        let vertex_input_info = vk::PipelineVertexInputStateCreateInfo::builder();

        let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::builder()
            .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
            .primitive_restart_enable(false);

        // Viewport and scissor cover the whole surface
        let viewport = vk::Viewport::builder()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)
            .build();

        let scissor = vk::Rect2D::builder()
            .offset(vk::Offset2D { x: 0, y: 0 })
            .extent(extent)
            .build();

        let viewports = &[viewport];
        let scissors = &[scissor];
        let viewport_state = vk::PipelineViewportStateCreateInfo::builder()
            .viewports(viewports)
            .scissors(scissors);

        let rasterizer = vk::PipelineRasterizationStateCreateInfo::builder()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(vk::PolygonMode::FILL)
            .line_width(1.0)
            .cull_mode(vk::CullModeFlags::BACK)
            .front_face(vk::FrontFace::CLOCKWISE)
            .depth_bias_enable(false);

        // Multisampling (disabled)
        let multisampling = vk::PipelineMultisampleStateCreateInfo::builder()
            .sample_shading_enable(false)
            .rasterization_samples(vk::SampleCountFlags::TYPE_1);

        // Color blending (no blending, opaque)
        let color_blend_attachment = vk::PipelineColorBlendAttachmentState::builder()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(false)
            .build();

        let color_blend_attachments = &[color_blend_attachment];
        let color_blending = vk::PipelineColorBlendStateCreateInfo::builder()
            .logic_op_enable(false)
            .attachments(color_blend_attachments);

        // No descriptor sets, no push constants
        let layout_info = vk::PipelineLayoutCreateInfo::builder();

        let layout = unsafe { device.device.create_pipeline_layout(&layout_info, None) }
            .stage(Stage::PipelineLayout)?;

        let pipeline_info = vk::GraphicsPipelineCreateInfo::builder()
            .stages(shader_stages)
            .vertex_input_state(&vertex_input_info)
            .input_assembly_state(&input_assembly)
            .viewport_state(&viewport_state)
            .rasterization_state(&rasterizer)
            .multisample_state(&multisampling)
            .color_blend_state(&color_blending)
            .layout(layout)
            .render_pass(render_pass.render_pass)
            .subpass(0)
            .build();

        let pipelines = unsafe {
            device
                .device
                .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
        };

        let pipeline = match pipelines {
            Ok(pipelines) => pipelines.first().copied(),
            Err((_, source)) => {
                unsafe { device.device.destroy_pipeline_layout(layout, None) };
                return Err(RendererError::Vulkan {
                    stage: Stage::Pipeline,
                    source,
                });
            }
        };

        let Some(pipeline) = pipeline else {
            unsafe { device.device.destroy_pipeline_layout(layout, None) };
            return Err(RendererError::PipelineCreation(
                "driver returned no pipeline".to_string(),
            ));
        };

        // Shader modules are only needed until here
        drop(vert_module);
        drop(frag_module);

        log::info!("Created graphics pipeline");

        Ok(Self {
            pipeline,
            layout,
            device,
        })
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_pipeline(self.pipeline, None);
            self.device.device.destroy_pipeline_layout(self.layout, None);
        }
        log::debug!("Destroyed graphics pipeline");
    }
}
