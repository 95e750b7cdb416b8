// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Instance creation with validation layers
// - Window surface creation
// - Physical device selection (see selection.rs for the rules)
// - Logical device + graphics/present queue creation
// - Command pool for the graphics queue family

use ash::extensions::{ext::DebugUtils, khr::Surface};
use ash::{vk, Entry};
use raw_window_handle::{HasRawDisplayHandle, HasRawWindowHandle};
use std::ffi::{CStr, CString};
use std::sync::Arc;
use winit::window::Window;

use super::selection::{self, DeviceCandidate, DeviceQueries, QueueFamilyIndices};
use crate::config::RenderSettings;
use crate::error::{RendererError, Result, Stage, VkResultExt};

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    pub command_pool: vk::CommandPool,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub surface: vk::SurfaceKHR,
    pub surface_loader: Surface,
    debug_utils: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    pub instance: ash::Instance,
    _entry: Entry,

    // Queue handles, possibly the same queue twice
    pub graphics_queue: vk::Queue,
    pub graphics_queue_family: u32,
    pub present_queue: vk::Queue,
    pub present_queue_family: u32,
}

impl VulkanDevice {
    /// Create instance, surface and the best suitable logical device
    pub fn new(window: &Window, settings: &RenderSettings) -> Result<Arc<Self>> {
        log::info!("Creating Vulkan device: {}", settings.app_name);

        let entry = unsafe { Entry::load() }?;

        let (instance, validation_enabled) = Self::create_instance(&entry, window, settings)?;

        // From here on every early return must clean up what exists so far.
        let debug_utils = if validation_enabled {
            match Self::setup_debug_messenger(&entry, &instance) {
                Ok(messenger) => Some(messenger),
                Err(e) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(e);
                }
            }
        } else {
            None
        };

        let surface_loader = Surface::new(&entry, &instance);
        let surface = match unsafe {
            ash_window::create_surface(
                &entry,
                &instance,
                window.raw_display_handle(),
                window.raw_window_handle(),
                None,
            )
        } {
            Ok(surface) => surface,
            Err(source) => {
                unsafe { Self::destroy_instance(&instance, &debug_utils) };
                return Err(RendererError::Vulkan {
                    stage: Stage::Surface,
                    source,
                });
            }
        };

        let partial = PartialSetup {
            instance: &instance,
            debug_utils: &debug_utils,
            surface_loader: &surface_loader,
            surface,
        };

        let (physical_device, queue_families) =
            partial.guard(Self::pick_physical_device(&instance, &surface_loader, surface, settings))?;

        // pick_physical_device only returns complete index sets
        let (graphics_queue_family, present_queue_family) =
            match (queue_families.graphics, queue_families.present) {
                (Some(graphics), Some(present)) => (graphics, present),
                _ => return partial.guard(Err(RendererError::NoSuitableDevice)),
            };

        let device = partial.guard(Self::create_logical_device(
            &instance,
            physical_device,
            &queue_families,
            settings,
        ))?;

        let command_pool = match Self::create_command_pool(&device, graphics_queue_family) {
            Ok(pool) => pool,
            Err(e) => {
                unsafe { device.destroy_device(None) };
                return partial.guard(Err(e));
            }
        };

        let (graphics_queue, present_queue) = unsafe {
            (
                device.get_device_queue(graphics_queue_family, 0),
                device.get_device_queue(present_queue_family, 0),
            )
        };

        let properties = unsafe { instance.get_physical_device_properties(physical_device) };

        log::info!(
            "Selected GPU: {}",
            unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }.to_string_lossy()
        );
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );
        log::info!(
            "Queue families: graphics={}, present={}",
            graphics_queue_family,
            present_queue_family
        );

        Ok(Arc::new(Self {
            command_pool,
            device,
            physical_device,
            surface,
            surface_loader,
            debug_utils,
            instance,
            _entry: entry,
            graphics_queue,
            graphics_queue_family,
            present_queue,
            present_queue_family,
        }))
    }

    fn create_instance(
        entry: &Entry,
        window: &Window,
        settings: &RenderSettings,
    ) -> Result<(ash::Instance, bool)> {
        // Interior NULs cannot come from a sane title, fall back rather than fail
        let app_name_cstr = CString::new(settings.app_name.as_str())
            .unwrap_or_else(|_| CString::from(c"triangle"));

        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name_cstr)
            .application_version(vk::make_api_version(0, 0, 1, 0))
            .engine_name(c"No Engine")
            .engine_version(vk::make_api_version(0, 0, 1, 0))
            .api_version(vk::API_VERSION_1_2);

        // Platform-specific surface extensions
        let mut extensions = ash_window::enumerate_required_extensions(window.raw_display_handle())
            .stage(Stage::Instance)?
            .to_vec();

        let layer_names = Self::available_layers(entry, settings)?;
        if !layer_names.is_empty() {
            extensions.push(DebugUtils::name().as_ptr());
        }

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extensions)
            .enabled_layer_names(&layer_names);

        let instance =
            unsafe { entry.create_instance(&create_info, None) }.stage(Stage::Instance)?;

        Ok((instance, !layer_names.is_empty()))
    }

    /// Requested validation layers, or none if any are not installed
    fn available_layers(
        entry: &Entry,
        settings: &RenderSettings,
    ) -> Result<Vec<*const std::ffi::c_char>> {
        if !settings.enable_validation {
            return Ok(Vec::new());
        }

        let installed = entry
            .enumerate_instance_layer_properties()
            .stage(Stage::Instance)?;
        let installed: Vec<&CStr> = installed
            .iter()
            .map(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) })
            .collect();

        let missing = selection::missing_extensions(&installed, &settings.validation_layers);
        if !missing.is_empty() {
            log::warn!("Validation layers not available: {:?}, continuing without", missing);
            return Ok(Vec::new());
        }

        log::info!("Validation layers enabled");
        Ok(settings.validation_layers.iter().map(|name| name.as_ptr()).collect())
    }

    fn setup_debug_messenger(
        entry: &Entry,
        instance: &ash::Instance,
    ) -> Result<(DebugUtils, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = DebugUtils::new(entry, instance);

        let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
            .message_severity(
                vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
                    | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
            )
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
            )
            .pfn_user_callback(Some(debug_callback));

        let messenger = unsafe { debug_utils.create_debug_utils_messenger(&create_info, None) }
            .stage(Stage::DebugMessenger)?;

        Ok((debug_utils, messenger))
    }

    fn pick_physical_device(
        instance: &ash::Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
        settings: &RenderSettings,
    ) -> Result<(vk::PhysicalDevice, QueueFamilyIndices)> {
        let devices =
            unsafe { instance.enumerate_physical_devices() }.stage(Stage::DeviceEnumeration)?;

        if devices.is_empty() {
            log::error!("No Vulkan-capable GPU found");
            return Err(RendererError::NoSuitableDevice);
        }

        // A device whose queries fail is merely unsuitable, only enumeration is fatal
        let candidates: Vec<DeviceCandidate> = devices
            .iter()
            .map(|&device| Self::describe(instance, surface_loader, surface, device, settings))
            .collect();

        let best = selection::pick_best(&candidates).ok_or(RendererError::NoSuitableDevice)?;

        Ok((devices[best], candidates[best].queue_families))
    }

    /// Gather what selection needs to know about one device
    fn describe(
        instance: &ash::Instance,
        surface_loader: &Surface,
        surface: vk::SurfaceKHR,
        device: vk::PhysicalDevice,
        settings: &RenderSettings,
    ) -> DeviceCandidate {
        let props = unsafe { instance.get_physical_device_properties(device) };
        let name = unsafe { CStr::from_ptr(props.device_name.as_ptr()) }
            .to_string_lossy()
            .into_owned();

        let queue_families = unsafe { instance.get_physical_device_queue_family_properties(device) };
        let present_support = (0..queue_families.len() as u32)
            .map(|index| unsafe {
                surface_loader.get_physical_device_surface_support(device, index, surface)
            })
            .collect();

        let extension_properties = unsafe { instance.enumerate_device_extension_properties(device) };
        let extensions = extension_properties.as_ref().map_err(|e| *e).map(|properties| {
            properties
                .iter()
                .map(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) })
                .collect::<Vec<_>>()
        });

        // Surface queries are only meaningful once the swapchain extension exists
        let has_extensions = extensions.as_ref().map_or(false, |available| {
            selection::missing_extensions(available, &settings.device_extensions).is_empty()
        });
        let (surface_formats, present_modes) = if has_extensions {
            unsafe {
                (
                    surface_loader
                        .get_physical_device_surface_formats(device, surface)
                        .map(|formats| formats.len()),
                    surface_loader
                        .get_physical_device_surface_present_modes(device, surface)
                        .map(|modes| modes.len()),
                )
            }
        } else {
            (Ok(0), Ok(0))
        };

        DeviceCandidate::from_queries(
            DeviceQueries {
                name,
                device_type: props.device_type,
                queue_families,
                present_support,
                extensions,
                surface_formats,
                present_modes,
            },
            &settings.device_extensions,
        )
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        queue_families: &QueueFamilyIndices,
        settings: &RenderSettings,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let queue_create_infos: Vec<vk::DeviceQueueCreateInfo> = queue_families
            .unique()
            .into_iter()
            .map(|family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&queue_priorities)
                    .build()
            })
            .collect();

        let extensions: Vec<_> = settings
            .device_extensions
            .iter()
            .map(|name| name.as_ptr())
            .collect();

        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions)
            .enabled_features(&features);

        unsafe { instance.create_device(physical_device, &create_info, None) }.stage(Stage::Device)
    }

    fn create_command_pool(device: &ash::Device, graphics_queue_family: u32) -> Result<vk::CommandPool> {
        // RESET: beginning the command buffer implicitly resets it each frame
        let pool_info = vk::CommandPoolCreateInfo::builder()
            .queue_family_index(graphics_queue_family)
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

        unsafe { device.create_command_pool(&pool_info, None) }.stage(Stage::CommandPool)
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.stage(Stage::WaitIdle)
    }

    unsafe fn destroy_instance(
        instance: &ash::Instance,
        debug_utils: &Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    ) {
        if let Some((debug_utils, messenger)) = debug_utils {
            debug_utils.destroy_debug_utils_messenger(*messenger, None);
        }
        instance.destroy_instance(None);
    }
}

/// Instance-level objects that exist before the logical device does
struct PartialSetup<'a> {
    instance: &'a ash::Instance,
    debug_utils: &'a Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
    surface_loader: &'a Surface,
    surface: vk::SurfaceKHR,
}

impl PartialSetup<'_> {
    /// Tear everything down if `result` is an error, pass it through otherwise
    fn guard<T>(&self, result: Result<T>) -> Result<T> {
        if result.is_err() {
            unsafe {
                self.surface_loader.destroy_surface(self.surface, None);
                VulkanDevice::destroy_instance(self.instance, self.debug_utils);
            }
        }
        result
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        // Cleanup in reverse order
        unsafe {
            self.device.destroy_command_pool(self.command_pool, None);
            self.device.destroy_device(None);
            log::debug!("Destroyed logical device");

            self.surface_loader.destroy_surface(self.surface, None);
            log::debug!("Destroyed surface");

            Self::destroy_instance(&self.instance, &self.debug_utils);
            log::debug!("Destroyed instance");
        }
    }
}

// Debug callback for validation layers
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    _message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _p_user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    let message = CStr::from_ptr((*p_callback_data).p_message);

    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => {
            log::error!("[Vulkan] {}", message.to_string_lossy());
        }
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => {
            log::warn!("[Vulkan] {}", message.to_string_lossy());
        }
        _ => {
            log::debug!("[Vulkan] {}", message.to_string_lossy());
        }
    }

    vk::FALSE
}
