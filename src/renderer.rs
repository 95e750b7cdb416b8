// =============================================================================
// RENDERER - every Vulkan object the triangle needs, in one place
// =============================================================================
//
// CREATION ORDER:
//   device (instance, surface, queues, command pool)
//     └── swapchain + image views
//           └── render pass
//                 └── pipeline
//                       └── framebuffers
//                             └── command buffer, semaphores
//
// Rust drops struct fields top to bottom, so the fields below are declared
// in reverse creation order and teardown needs no hand-written sequencing.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use winit::window::Window;

use crate::backend::{shader, FrameSync, Framebuffers, Pipeline, RenderPass, Swapchain, VulkanDevice};
use crate::config::{Config, RenderSettings};
use crate::error::{self, RendererError, Stage, VkResultExt};
use crate::frame::FrameTarget;

pub struct Renderer {
    // Field order is drop order!
    sync: FrameSync,
    command_buffer: vk::CommandBuffer,
    framebuffers: Framebuffers,
    pipeline: Pipeline,
    render_pass: RenderPass,
    swapchain: Swapchain,
    device: Arc<VulkanDevice>,

    clear_color: vk::ClearValue,
    wait_stages: [vk::PipelineStageFlags; 1],
}

impl Renderer {
    /// Create everything, aborting on the first failure
    pub fn new(window: &Window, config: &Config) -> Result<Self> {
        log::info!("Initializing Vulkan...");

        let mut settings: RenderSettings = config.render_settings();
        let size = window.inner_size();
        settings.extent = vk::Extent2D {
            width: size.width,
            height: size.height,
        };

        let device = VulkanDevice::new(window, &settings).context("device selection")?;

        let swapchain =
            Swapchain::new(device.clone(), &settings).context("swapchain setup")?;

        let render_pass =
            RenderPass::new(device.clone(), swapchain.format).context("render pass setup")?;

        let vertex_shader = shader::read_shader_file(&config.shaders.vertex)
            .context("loading vertex shader")?;
        let fragment_shader = shader::read_shader_file(&config.shaders.fragment)
            .context("loading fragment shader")?;

        let pipeline = Pipeline::new(
            device.clone(),
            &render_pass,
            &vertex_shader,
            &fragment_shader,
            swapchain.extent,
        )
        .context("pipeline setup")?;

        let framebuffers = Framebuffers::new(
            device.clone(),
            &render_pass,
            &swapchain.image_views,
            swapchain.extent,
        )
        .context("framebuffer setup")?;

        // Freed together with the command pool when the device goes away
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(device.command_pool)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(1);

        let command_buffer = unsafe { device.device.allocate_command_buffers(&alloc_info) }
            .stage(Stage::CommandBuffer)?
            .into_iter()
            .next()
            .context("driver allocated no command buffer")?;

        let sync = FrameSync::new(device.clone()).context("semaphore setup")?;

        log::info!(
            "Vulkan initialized: {} swapchain images, {} framebuffers",
            swapchain.images.len(),
            framebuffers.len()
        );

        Ok(Self {
            sync,
            command_buffer,
            framebuffers,
            pipeline,
            render_pass,
            swapchain,
            device,
            clear_color: vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: settings.clear_color,
                },
            },
            wait_stages: [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT],
        })
    }

    /// Number of presentable images, which is also the framebuffer count
    pub fn image_count(&self) -> usize {
        self.swapchain.images.len()
    }
}

impl FrameTarget for Renderer {
    fn acquire(&mut self) -> error::Result<u32> {
        self.swapchain.acquire_next_image(self.sync.image_available)
    }

    fn record(&mut self, image_index: u32) -> error::Result<()> {
        let device = &self.device.device;
        let cmd = self.command_buffer;

        let framebuffer = self
            .framebuffers
            .get(image_index)
            .ok_or(RendererError::MissingFramebuffer(image_index))?;

        let clear_values = [self.clear_color];
        let render_pass_begin = vk::RenderPassBeginInfo::builder()
            .render_pass(self.render_pass.render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D { x: 0, y: 0 },
                extent: self.swapchain.extent,
            })
            .clear_values(&clear_values);

        unsafe {
            // The pool allows per-buffer reset, so begin discards last frame
            let begin_info = vk::CommandBufferBeginInfo::builder();
            device.begin_command_buffer(cmd, &begin_info).stage(Stage::Record)?;

            device.cmd_begin_render_pass(cmd, &render_pass_begin, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(cmd, vk::PipelineBindPoint::GRAPHICS, self.pipeline.pipeline);
            device.cmd_draw(cmd, 3, 1, 0, 0);
            device.cmd_end_render_pass(cmd);

            device.end_command_buffer(cmd).stage(Stage::Record)
        }
    }

    fn submit(&mut self) -> error::Result<()> {
        let wait_semaphores = [self.sync.image_available];
        let signal_semaphores = [self.sync.render_finished];
        let command_buffers = [self.command_buffer];

        let submit_info = vk::SubmitInfo::builder()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&self.wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.device.device.queue_submit(
                self.device.graphics_queue,
                &[submit_info.build()],
                vk::Fence::null(),
            )
        }
        .stage(Stage::Submit)
    }

    fn present(&mut self, image_index: u32) -> error::Result<()> {
        self.swapchain.present(
            self.device.present_queue,
            image_index,
            &[self.sync.render_finished],
        )
    }

    fn wait_idle(&mut self) -> error::Result<()> {
        unsafe { self.device.device.queue_wait_idle(self.device.present_queue) }
            .stage(Stage::WaitIdle)
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        log::info!("Cleaning up Vulkan resources...");

        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.device.wait_idle() {
            log::error!("Failed to wait for device idle during shutdown: {}", e);
        }
    }
}
