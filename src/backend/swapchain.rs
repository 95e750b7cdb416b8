// Swapchain - Window presentation
//
// Manages the ring of images we render to and present to the screen.
// Created once at startup; the window is not resizable so it never
// needs to be rebuilt.

use ash::vk;
use std::sync::Arc;

use super::{create_all, VulkanDevice};
use crate::config::RenderSettings;
use crate::error::{RendererError, Result, Stage, VkResultExt};

pub struct Swapchain {
    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::extensions::khr::Swapchain,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<vk::ImageView>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    pub fn new(device: Arc<VulkanDevice>, settings: &RenderSettings) -> Result<Self> {
        let surface_loader = &device.surface_loader;

        // Query surface capabilities
        let surface_caps = unsafe {
            surface_loader
                .get_physical_device_surface_capabilities(device.physical_device, device.surface)
        }
        .stage(Stage::Swapchain)?;

        let formats = unsafe {
            surface_loader.get_physical_device_surface_formats(device.physical_device, device.surface)
        }
        .stage(Stage::Swapchain)?;

        let present_modes = unsafe {
            surface_loader
                .get_physical_device_surface_present_modes(device.physical_device, device.surface)
        }
        .stage(Stage::Swapchain)?;

        let surface_format = choose_surface_format(&formats, settings.surface_format);
        let present_mode = choose_present_mode(&present_modes, settings.present_mode);
        let extent = choose_extent(&surface_caps, settings.extent);
        let image_count = choose_image_count(&surface_caps, settings.min_image_count);

        let pre_transform = if surface_caps
            .supported_transforms
            .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
        {
            vk::SurfaceTransformFlagsKHR::IDENTITY
        } else {
            surface_caps.current_transform
        };

        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            image_count,
            surface_format.format,
            present_mode
        );

        // Graphics and present may live on different families
        let queue_family_indices = [device.graphics_queue_family, device.present_queue_family];
        let sharing_mode = if device.graphics_queue_family != device.present_queue_family {
            vk::SharingMode::CONCURRENT
        } else {
            vk::SharingMode::EXCLUSIVE
        };

        let swapchain_loader = ash::extensions::khr::Swapchain::new(&device.instance, &device.device);

        let mut create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(device.surface)
            .min_image_count(image_count)
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .pre_transform(pre_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true);

        if sharing_mode == vk::SharingMode::CONCURRENT {
            create_info = create_info.queue_family_indices(&queue_family_indices);
        }

        let swapchain = unsafe { swapchain_loader.create_swapchain(&create_info, None) }
            .stage(Stage::Swapchain)?;

        let images = match unsafe { swapchain_loader.get_swapchain_images(swapchain) } {
            Ok(images) => images,
            Err(source) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(RendererError::Vulkan {
                    stage: Stage::Swapchain,
                    source,
                });
            }
        };

        log::info!("Created swapchain with {} images", images.len());

        // One plain 2D color view per image
        let image_views = create_all(
            images.iter().copied(),
            |image| {
                let create_info = vk::ImageViewCreateInfo::builder()
                    .image(image)
                    .view_type(vk::ImageViewType::TYPE_2D)
                    .format(surface_format.format)
                    .components(vk::ComponentMapping {
                        r: vk::ComponentSwizzle::IDENTITY,
                        g: vk::ComponentSwizzle::IDENTITY,
                        b: vk::ComponentSwizzle::IDENTITY,
                        a: vk::ComponentSwizzle::IDENTITY,
                    })
                    .subresource_range(vk::ImageSubresourceRange {
                        aspect_mask: vk::ImageAspectFlags::COLOR,
                        base_mip_level: 0,
                        level_count: 1,
                        base_array_layer: 0,
                        layer_count: 1,
                    });

                unsafe { device.device.create_image_view(&create_info, None) }.stage(Stage::ImageView)
            },
            |view| unsafe { device.device.destroy_image_view(view, None) },
        );

        let image_views = match image_views {
            Ok(views) => views,
            Err(e) => {
                unsafe { swapchain_loader.destroy_swapchain(swapchain, None) };
                return Err(e);
            }
        };

        Ok(Self {
            swapchain,
            swapchain_loader,
            images,
            image_views,
            format: surface_format.format,
            extent,
            device,
        })
    }

    /// Acquire next image for rendering, blocking until one is available.
    ///
    /// `semaphore` is signaled once the presentation engine releases the image.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> Result<u32> {
        let (index, suboptimal) = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                semaphore,
                vk::Fence::null(),
            )
        }
        .stage(Stage::Acquire)?;

        if suboptimal {
            log::trace!("Acquired image {} from a suboptimal swapchain", index);
        }

        Ok(index)
    }

    /// Queue an image for presentation once `wait_semaphores` are signaled
    pub fn present(
        &self,
        queue: vk::Queue,
        image_index: u32,
        wait_semaphores: &[vk::Semaphore],
    ) -> Result<()> {
        let swapchains = [self.swapchain];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let suboptimal = unsafe { self.swapchain_loader.queue_present(queue, &present_info) }
            .stage(Stage::Present)?;

        if suboptimal {
            log::trace!("Presented image {} to a suboptimal swapchain", image_index);
        }

        Ok(())
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.device.destroy_image_view(view, None);
            }
            self.swapchain_loader.destroy_swapchain(self.swapchain, None);
        }
        log::debug!("Destroyed swapchain and {} image views", self.image_views.len());
    }
}

/// Preferred format if the surface offers it, else whatever it lists first
fn choose_surface_format(
    formats: &[vk::SurfaceFormatKHR],
    preferred: vk::SurfaceFormatKHR,
) -> vk::SurfaceFormatKHR {
    formats
        .iter()
        .copied()
        .find(|f| f.format == preferred.format && f.color_space == preferred.color_space)
        .or_else(|| {
            let fallback = formats.first().copied();
            if let Some(f) = fallback {
                log::warn!(
                    "Surface does not offer {:?}/{:?}, using {:?}/{:?}",
                    preferred.format,
                    preferred.color_space,
                    f.format,
                    f.color_space
                );
            }
            fallback
        })
        .unwrap_or(preferred)
}

/// FIFO is always supported, so it is the fallback for anything else
fn choose_present_mode(
    modes: &[vk::PresentModeKHR],
    preferred: vk::PresentModeKHR,
) -> vk::PresentModeKHR {
    if modes.contains(&preferred) {
        preferred
    } else {
        log::warn!("Present mode {:?} unsupported, using FIFO", preferred);
        vk::PresentModeKHR::FIFO
    }
}

fn choose_extent(caps: &vk::SurfaceCapabilitiesKHR, requested: vk::Extent2D) -> vk::Extent2D {
    if caps.current_extent.width != u32::MAX {
        caps.current_extent
    } else {
        vk::Extent2D {
            width: requested
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: requested
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    }
}

/// At least what was asked for and what the surface needs; zero max means unbounded
fn choose_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}
