// Render pass and framebuffers
//
// One color attachment: cleared on load, stored on end, transitioned from
// UNDEFINED to PRESENT_SRC across a single graphics subpass. Every swapchain
// view gets its own framebuffer bound to attachment slot 0.

use ash::vk;
use std::sync::Arc;

use super::{create_all, VulkanDevice};
use crate::error::{Result, Stage, VkResultExt};

pub struct RenderPass {
    pub render_pass: vk::RenderPass,
    device: Arc<VulkanDevice>,
}

impl RenderPass {
    pub fn new(device: Arc<VulkanDevice>, format: vk::Format) -> Result<Self> {
        // Color attachment (the swapchain image)
        let color_attachment = vk::AttachmentDescription::builder()
            .format(format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR)
            .build();

        let color_attachment_ref = vk::AttachmentReference::builder()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL)
            .build();

        let color_attachments = &[color_attachment_ref];
        let subpass = vk::SubpassDescription::builder()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(color_attachments)
            .build();

        // The layout transition must wait until the acquire semaphore fired,
        // which the submit only guarantees at COLOR_ATTACHMENT_OUTPUT.
        let dependency = vk::SubpassDependency::builder()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .src_access_mask(vk::AccessFlags::empty())
            .dst_stage_mask(vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT)
            .dst_access_mask(vk::AccessFlags::COLOR_ATTACHMENT_WRITE)
            .build();

        let attachments = &[color_attachment];
        let subpasses = &[subpass];
        let dependencies = &[dependency];

        let render_pass_info = vk::RenderPassCreateInfo::builder()
            .attachments(attachments)
            .subpasses(subpasses)
            .dependencies(dependencies);

        let render_pass = unsafe { device.device.create_render_pass(&render_pass_info, None) }
            .stage(Stage::RenderPass)?;

        log::debug!("Created render pass for {:?}", format);

        Ok(Self { render_pass, device })
    }
}

impl Drop for RenderPass {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_render_pass(self.render_pass, None);
        }
        log::debug!("Destroyed render pass");
    }
}

/// One framebuffer per swapchain image, created and destroyed as a set
pub struct Framebuffers {
    pub framebuffers: Vec<vk::Framebuffer>,
    device: Arc<VulkanDevice>,
}

impl Framebuffers {
    pub fn new(
        device: Arc<VulkanDevice>,
        render_pass: &RenderPass,
        image_views: &[vk::ImageView],
        extent: vk::Extent2D,
    ) -> Result<Self> {
        let framebuffers = create_all(
            image_views.iter().copied(),
            |image_view| {
                let attachments = &[image_view];
                let framebuffer_info = vk::FramebufferCreateInfo::builder()
                    .render_pass(render_pass.render_pass)
                    .attachments(attachments)
                    .width(extent.width)
                    .height(extent.height)
                    .layers(1);

                unsafe { device.device.create_framebuffer(&framebuffer_info, None) }
                    .stage(Stage::Framebuffer)
            },
            |framebuffer| unsafe { device.device.destroy_framebuffer(framebuffer, None) },
        )?;

        log::debug!("Created {} framebuffers", framebuffers.len());

        Ok(Self {
            framebuffers,
            device,
        })
    }

    /// Framebuffer bound to the swapchain image at `image_index`
    pub fn get(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    pub(crate) fn len(&self) -> usize {
        self.framebuffers.len()
    }
}

impl Drop for Framebuffers {
    fn drop(&mut self) {
        unsafe {
            for &framebuffer in &self.framebuffers {
                self.device.device.destroy_framebuffer(framebuffer, None);
            }
        }
        log::debug!("Destroyed {} framebuffers", self.framebuffers.len());
    }
}
