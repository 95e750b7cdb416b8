// Error taxonomy for renderer setup and the frame loop
//
// Every Vulkan call that can fail is tagged with the stage it belongs to,
// so the single fatal exit path in main can say exactly what broke.

use ash::prelude::VkResult;
use ash::vk;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// What was being created (or which frame step was running) when a call failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Instance,
    DebugMessenger,
    Surface,
    DeviceEnumeration,
    Device,
    CommandPool,
    CommandBuffer,
    Swapchain,
    ImageView,
    RenderPass,
    Framebuffer,
    ShaderModule,
    PipelineLayout,
    Pipeline,
    Semaphore,
    Acquire,
    Record,
    Submit,
    Present,
    WaitIdle,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Instance => "instance",
            Stage::DebugMessenger => "debug messenger",
            Stage::Surface => "surface",
            Stage::DeviceEnumeration => "device enumeration",
            Stage::Device => "logical device",
            Stage::CommandPool => "command pool",
            Stage::CommandBuffer => "command buffer",
            Stage::Swapchain => "swapchain",
            Stage::ImageView => "image view",
            Stage::RenderPass => "render pass",
            Stage::Framebuffer => "framebuffer",
            Stage::ShaderModule => "shader module",
            Stage::PipelineLayout => "pipeline layout",
            Stage::Pipeline => "graphics pipeline",
            Stage::Semaphore => "semaphore",
            Stage::Acquire => "image acquire",
            Stage::Record => "command recording",
            Stage::Submit => "queue submit",
            Stage::Present => "present",
            Stage::WaitIdle => "queue wait idle",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum RendererError {
    /// The Vulkan loader library could not be found or opened.
    #[error("failed to load Vulkan library: {0}")]
    Loader(#[from] ash::LoadingError),

    #[error("{stage} failed: {source}")]
    Vulkan {
        stage: Stage,
        #[source]
        source: vk::Result,
    },

    #[error("no suitable GPU found")]
    NoSuitableDevice,

    #[error("failed to read shader file {path:?}: {source}")]
    ShaderFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("swapchain image {0} has no framebuffer")]
    MissingFramebuffer(u32),

    /// Pipeline assembly rejected its inputs before any Vulkan object existed.
    #[error("failed to create graphics pipeline: {0}")]
    PipelineCreation(String),
}

pub type Result<T, E = RendererError> = std::result::Result<T, E>;

/// Tags a raw `VkResult` with the stage it came from.
pub trait VkResultExt<T> {
    fn stage(self, stage: Stage) -> Result<T>;
}

impl<T> VkResultExt<T> for VkResult<T> {
    fn stage(self, stage: Stage) -> Result<T> {
        self.map_err(|source| RendererError::Vulkan { stage, source })
    }
}
