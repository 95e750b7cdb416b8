// Synchronization primitives
//
// One semaphore pair reused every frame. The frame loop drains the present
// queue before the next acquire, so a single pair is enough and no fence is
// needed.

use ash::vk;
use std::sync::Arc;

use super::VulkanDevice;
use crate::error::{Result, Stage, VkResultExt};

pub struct FrameSync {
    /// Signaled by the presentation engine when the acquired image is free
    pub image_available: vk::Semaphore,
    /// Signaled by the graphics queue when the frame's commands finished
    pub render_finished: vk::Semaphore,
    device: Arc<VulkanDevice>,
}

impl FrameSync {
    pub fn new(device: Arc<VulkanDevice>) -> Result<Self> {
        let semaphore_info = vk::SemaphoreCreateInfo::builder();

        let image_available = unsafe { device.device.create_semaphore(&semaphore_info, None) }
            .stage(Stage::Semaphore)?;

        let render_finished = match unsafe { device.device.create_semaphore(&semaphore_info, None) }
            .stage(Stage::Semaphore)
        {
            Ok(semaphore) => semaphore,
            Err(e) => {
                unsafe { device.device.destroy_semaphore(image_available, None) };
                return Err(e);
            }
        };

        Ok(Self {
            image_available,
            render_finished,
            device,
        })
    }
}

impl Drop for FrameSync {
    fn drop(&mut self) {
        unsafe {
            self.device.device.destroy_semaphore(self.image_available, None);
            self.device.device.destroy_semaphore(self.render_finished, None);
        }
        log::debug!("Destroyed frame semaphores");
    }
}
