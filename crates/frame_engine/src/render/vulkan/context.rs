//! Vulkan context management
//!
//! [`GpuContext`] owns the instance, the optional presentation surface, the selected
//! physical device and the logical device. Field order is drop order: surface, then
//! device, then instance.

use std::ffi::{c_char, CStr, CString};

use ash::extensions::ext::DebugUtils;
use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Device, Entry, Instance};

use super::device::{DeviceRequirements, PhysicalDeviceInfo, QueueFamilyIndices};
use super::{VulkanError, VulkanResult};
use crate::config::RendererConfig;

const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";
const ENGINE_NAME: &CStr = c"frame_engine";

/// Source of a presentation surface, implemented by the windowing shell
pub trait SurfaceProvider {
    /// Instance extensions the window system needs
    fn required_instance_extensions(&self) -> VulkanResult<Vec<String>>;

    /// Create a surface for `instance`
    fn create_surface(&mut self, instance: vk::Instance) -> VulkanResult<vk::SurfaceKHR>;

    /// Current framebuffer size in pixels
    fn framebuffer_extent(&self) -> vk::Extent2D;
}

/// Vulkan instance wrapper with RAII cleanup
pub struct VulkanInstance {
    entry: Entry,
    instance: Instance,
    debug: Option<(DebugUtils, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanInstance {
    /// Create an instance with the given extensions, optionally with validation
    pub fn new(app_name: &str, required_extensions: &[String], enable_validation: bool) -> VulkanResult<Self> {
        let entry = unsafe { Entry::load() }.map_err(|e| VulkanError::Loading(e.to_string()))?;

        let enable_validation = enable_validation && {
            let available = validation_layer_available(&entry);
            if !available {
                log::warn!("Validation requested but VK_LAYER_KHRONOS_validation is not installed");
            }
            available
        };

        let mut extension_names = required_extensions
            .iter()
            .map(|ext| CString::new(ext.as_str()).map_err(|_| VulkanError::MissingInstanceExtension(ext.clone())))
            .collect::<VulkanResult<Vec<_>>>()?;
        if enable_validation {
            extension_names.push(DebugUtils::name().to_owned());
        }
        check_instance_extensions(&entry, &extension_names)?;

        let app_name = CString::new(app_name).unwrap_or_else(|_| ENGINE_NAME.to_owned());
        let app_info = vk::ApplicationInfo::builder()
            .application_name(&app_name)
            .application_version(vk::make_api_version(0, 1, 0, 0))
            .engine_name(ENGINE_NAME)
            .engine_version(vk::make_api_version(0, 1, 0, 0))
            .api_version(vk::API_VERSION_1_0);

        let extension_ptrs: Vec<*const c_char> = extension_names.iter().map(|ext| ext.as_ptr()).collect();
        let layer_ptrs: Vec<*const c_char> = if enable_validation {
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let create_info = vk::InstanceCreateInfo::builder()
            .application_info(&app_info)
            .enabled_extension_names(&extension_ptrs)
            .enabled_layer_names(&layer_ptrs);

        let instance = unsafe {
            entry
                .create_instance(&create_info, None)
                .map_err(VulkanError::setup("Create instance"))?
        };

        let debug = if enable_validation {
            let debug_utils = DebugUtils::new(&entry, &instance);
            match create_debug_messenger(&debug_utils) {
                Ok(messenger) => Some((debug_utils, messenger)),
                Err(err) => {
                    unsafe { instance.destroy_instance(None) };
                    return Err(err);
                }
            }
        } else {
            None
        };

        log::debug!(
            "Created Vulkan instance ({} extensions, validation {})",
            extension_ptrs.len(),
            if enable_validation { "on" } else { "off" }
        );

        Ok(Self { entry, instance, debug })
    }

    /// Vulkan entry points
    pub const fn entry(&self) -> &Entry {
        &self.entry
    }

    /// Instance function table
    pub const fn instance(&self) -> &Instance {
        &self.instance
    }
}

impl Drop for VulkanInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((debug_utils, messenger)) = self.debug.take() {
                debug_utils.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
        log::debug!("Destroyed Vulkan instance");
    }
}

fn validation_layer_available(entry: &Entry) -> bool {
    entry.enumerate_instance_layer_properties().map_or(false, |layers| {
        layers
            .iter()
            .any(|layer| unsafe { CStr::from_ptr(layer.layer_name.as_ptr()) } == VALIDATION_LAYER)
    })
}

fn check_instance_extensions(entry: &Entry, wanted: &[CString]) -> VulkanResult<()> {
    let available = entry
        .enumerate_instance_extension_properties(None)
        .map_err(VulkanError::setup("Enumerate instance extensions"))?;

    for name in wanted {
        let found = available
            .iter()
            .any(|ext| unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) } == name.as_c_str());
        if !found {
            return Err(VulkanError::MissingInstanceExtension(name.to_string_lossy().into_owned()));
        }
    }
    Ok(())
}

fn create_debug_messenger(debug_utils: &DebugUtils) -> VulkanResult<vk::DebugUtilsMessengerEXT> {
    let create_info = vk::DebugUtilsMessengerCreateInfoEXT::builder()
        .message_severity(
            vk::DebugUtilsMessageSeverityFlagsEXT::WARNING | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR,
        )
        .message_type(
            vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE,
        )
        .pfn_user_callback(Some(debug_callback));

    unsafe {
        debug_utils
            .create_debug_utils_messenger(&create_info, None)
            .map_err(VulkanError::setup("Create debug messenger"))
    }
}

/// Forwards validation messages into `log`
unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT,
    _user_data: *mut std::ffi::c_void,
) -> vk::Bool32 {
    if callback_data.is_null() || (*callback_data).p_message.is_null() {
        return vk::FALSE;
    }
    let message = CStr::from_ptr((*callback_data).p_message).to_string_lossy();

    if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::ERROR {
        log::error!("[Vulkan] {:?} - {}", message_type, message);
    } else if message_severity >= vk::DebugUtilsMessageSeverityFlagsEXT::WARNING {
        log::warn!("[Vulkan] {:?} - {}", message_type, message);
    } else {
        log::debug!("[Vulkan] {:?} - {}", message_type, message);
    }

    vk::FALSE
}

/// Window surface with its extension loader
pub struct PresentationSurface {
    loader: Surface,
    surface: vk::SurfaceKHR,
}

impl PresentationSurface {
    /// Surface extension loader
    pub const fn loader(&self) -> &Surface {
        &self.loader
    }

    /// Raw surface handle
    pub const fn handle(&self) -> vk::SurfaceKHR {
        self.surface
    }
}

impl Drop for PresentationSurface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.surface, None) };
        log::debug!("Destroyed surface");
    }
}

/// Logical device wrapper with RAII cleanup
pub struct LogicalDevice {
    device: Device,
    graphics_queue: vk::Queue,
    present_queue: vk::Queue,
    swapchain_loader: Option<SwapchainLoader>,
}

impl LogicalDevice {
    /// Create a logical device with one queue per unique family
    pub fn new(instance: &Instance, physical: &PhysicalDeviceInfo, enable_swapchain: bool) -> VulkanResult<Self> {
        let families = physical.queue_families;
        let unique = families.unique();
        let priorities = [1.0_f32];

        let queue_infos: Vec<vk::DeviceQueueCreateInfo> = unique
            .iter()
            .map(|&family| {
                vk::DeviceQueueCreateInfo::builder()
                    .queue_family_index(family)
                    .queue_priorities(&priorities)
                    .build()
            })
            .collect();

        let extension_ptrs: Vec<*const c_char> = if enable_swapchain {
            vec![SwapchainLoader::name().as_ptr()]
        } else {
            Vec::new()
        };
        let features = vk::PhysicalDeviceFeatures::default();

        let create_info = vk::DeviceCreateInfo::builder()
            .queue_create_infos(&queue_infos)
            .enabled_extension_names(&extension_ptrs)
            .enabled_features(&features);

        let device = unsafe {
            instance
                .create_device(physical.device, &create_info, None)
                .map_err(VulkanError::setup("Create logical device"))?
        };

        let graphics_queue = unsafe { device.get_device_queue(families.graphics, 0) };
        let present_queue = unsafe { device.get_device_queue(families.present, 0) };
        let swapchain_loader = enable_swapchain.then(|| SwapchainLoader::new(instance, &device));

        log::debug!("Created logical device with {} queue famil(ies)", unique.len());

        Ok(Self {
            device,
            graphics_queue,
            present_queue,
            swapchain_loader,
        })
    }
}

impl Drop for LogicalDevice {
    fn drop(&mut self) {
        unsafe {
            let _ = self.device.device_wait_idle();
            self.device.destroy_device(None);
        }
        log::debug!("Destroyed logical device");
    }
}

/// Instance, surface and device for one rendering session
pub struct GpuContext {
    surface: Option<PresentationSurface>,
    physical: PhysicalDeviceInfo,
    device: LogicalDevice,
    instance: VulkanInstance,
}

impl GpuContext {
    /// Create a context that presents to the shell's window
    pub fn new(provider: &mut impl SurfaceProvider, config: &RendererConfig) -> VulkanResult<Self> {
        let extensions = provider.required_instance_extensions()?;
        let instance = VulkanInstance::new(&config.application_name, &extensions, config.validation_enabled())?;

        let loader = Surface::new(instance.entry(), instance.instance());
        let handle = provider.create_surface(instance.instance().handle())?;
        let surface = PresentationSurface { loader, surface: handle };

        let physical = PhysicalDeviceInfo::select(
            instance.instance(),
            Some((surface.loader(), surface.handle())),
            &DeviceRequirements::for_presentation(),
        )?;
        let device = LogicalDevice::new(instance.instance(), &physical, true)?;

        Ok(Self {
            surface: Some(surface),
            physical,
            device,
            instance,
        })
    }

    /// Create a context with no surface, for offscreen work such as transfers
    pub fn new_headless(config: &RendererConfig) -> VulkanResult<Self> {
        let instance = VulkanInstance::new(&config.application_name, &[], config.validation_enabled())?;
        let physical = PhysicalDeviceInfo::select(instance.instance(), None, &DeviceRequirements::headless())?;
        let device = LogicalDevice::new(instance.instance(), &physical, false)?;

        Ok(Self {
            surface: None,
            physical,
            device,
            instance,
        })
    }

    /// Instance function table
    pub const fn instance(&self) -> &Instance {
        self.instance.instance()
    }

    /// Device function table
    pub const fn device(&self) -> &Device {
        &self.device.device
    }

    /// Selected physical device
    pub const fn physical(&self) -> &PhysicalDeviceInfo {
        &self.physical
    }

    /// Chosen queue families
    pub const fn queue_families(&self) -> QueueFamilyIndices {
        self.physical.queue_families
    }

    /// Memory types of the selected device
    pub const fn memory_properties(&self) -> &vk::PhysicalDeviceMemoryProperties {
        &self.physical.memory_properties
    }

    /// Queue used for rendering and transfers
    pub const fn graphics_queue(&self) -> vk::Queue {
        self.device.graphics_queue
    }

    /// Queue used for presentation
    pub const fn present_queue(&self) -> vk::Queue {
        self.device.present_queue
    }

    /// Presentation surface, absent for headless contexts
    pub fn surface(&self) -> VulkanResult<&PresentationSurface> {
        self.surface.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "headless context has no surface".to_string(),
        })
    }

    /// Swapchain extension loader, absent for headless contexts
    pub fn swapchain_loader(&self) -> VulkanResult<&SwapchainLoader> {
        self.device.swapchain_loader.as_ref().ok_or_else(|| VulkanError::InvalidOperation {
            reason: "headless context has no swapchain support".to_string(),
        })
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> VulkanResult<()> {
        unsafe {
            self.device()
                .device_wait_idle()
                .map_err(VulkanError::frame("Wait for device idle"))
        }
    }
}
