//! Swapchain construction
//!
//! The `choose_*` functions turn surface capabilities into swapchain parameters and are
//! pure. [`Swapchain::new`] queries the surface, applies them and creates one view per
//! image. Swapchains are built once; there is no recreation path.

use ash::extensions::khr::Swapchain as SwapchainLoader;
use ash::{vk, Device};

use super::{GpuContext, QueueFamilyIndices, VulkanError, VulkanResult};

/// Format used when the surface leaves the choice open
pub const PREFERRED_FORMAT: vk::SurfaceFormatKHR = vk::SurfaceFormatKHR {
    format: vk::Format::R8G8B8A8_UNORM,
    color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
};

/// Pick the surface format
///
/// A single `UNDEFINED` entry means any format is allowed, so the preferred one is
/// used. Otherwise the first 8-bit UNORM RGBA or BGRA format in the sRGB color space
/// wins, falling back to the first reported format.
pub fn choose_surface_format(formats: &[vk::SurfaceFormatKHR]) -> Option<vk::SurfaceFormatKHR> {
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return Some(PREFERRED_FORMAT);
        }
    }

    formats
        .iter()
        .find(|candidate| {
            matches!(candidate.format, vk::Format::R8G8B8A8_UNORM | vk::Format::B8G8R8A8_UNORM)
                && candidate.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        })
        .or_else(|| formats.first())
        .copied()
}

/// Prefer mailbox, otherwise FIFO which every driver supports
pub fn choose_present_mode(modes: &[vk::PresentModeKHR]) -> vk::PresentModeKHR {
    if modes.contains(&vk::PresentModeKHR::MAILBOX) {
        vk::PresentModeKHR::MAILBOX
    } else {
        vk::PresentModeKHR::FIFO
    }
}

/// Use the surface's fixed extent, or clamp the window size when the surface reports
/// the flexible sentinel (`u32::MAX`)
pub fn choose_extent(capabilities: &vk::SurfaceCapabilitiesKHR, window_extent: vk::Extent2D) -> vk::Extent2D {
    if capabilities.current_extent.width != u32::MAX {
        return capabilities.current_extent;
    }

    let min = capabilities.min_image_extent;
    let max = capabilities.max_image_extent;
    vk::Extent2D {
        width: window_extent.width.max(min.width).min(max.width),
        height: window_extent.height.max(min.height).min(max.height),
    }
}

/// One more than the minimum, capped by a nonzero maximum
pub fn choose_image_count(capabilities: &vk::SurfaceCapabilitiesKHR) -> u32 {
    let desired = capabilities.min_image_count.saturating_add(1);
    if capabilities.max_image_count > 0 {
        desired.min(capabilities.max_image_count)
    } else {
        desired
    }
}

/// Concurrent sharing across two distinct families, exclusive otherwise
pub fn choose_sharing(families: QueueFamilyIndices) -> (vk::SharingMode, Vec<u32>) {
    if families.is_shared() {
        (vk::SharingMode::EXCLUSIVE, Vec::new())
    } else {
        (vk::SharingMode::CONCURRENT, families.unique())
    }
}

/// Presentable image chain with one view per image
pub struct Swapchain {
    device: Device,
    loader: SwapchainLoader,
    swapchain: vk::SwapchainKHR,
    images: Vec<vk::Image>,
    image_views: Vec<vk::ImageView>,
    format: vk::SurfaceFormatKHR,
    extent: vk::Extent2D,
}

impl Swapchain {
    /// Negotiate parameters with the surface and build the swapchain
    pub fn new(context: &GpuContext, window_extent: vk::Extent2D) -> VulkanResult<Self> {
        let surface = context.surface()?;
        let physical = context.physical().device;

        let (capabilities, formats, modes) = unsafe {
            let loader = surface.loader();
            (
                loader
                    .get_physical_device_surface_capabilities(physical, surface.handle())
                    .map_err(VulkanError::setup("Query surface capabilities"))?,
                loader
                    .get_physical_device_surface_formats(physical, surface.handle())
                    .map_err(VulkanError::setup("Query surface formats"))?,
                loader
                    .get_physical_device_surface_present_modes(physical, surface.handle())
                    .map_err(VulkanError::setup("Query present modes"))?,
            )
        };

        let format = choose_surface_format(&formats).ok_or(VulkanError::Setup {
            stage: "Choose surface format",
            result: vk::Result::ERROR_FORMAT_NOT_SUPPORTED,
        })?;
        let present_mode = choose_present_mode(&modes);
        let extent = choose_extent(&capabilities, window_extent);
        let image_count = choose_image_count(&capabilities);
        let (sharing_mode, family_indices) = choose_sharing(context.queue_families());

        let create_info = vk::SwapchainCreateInfoKHR::builder()
            .surface(surface.handle())
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(sharing_mode)
            .queue_family_indices(&family_indices)
            .pre_transform(capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(vk::SwapchainKHR::null());

        let loader = context.swapchain_loader()?.clone();
        let swapchain = unsafe {
            loader
                .create_swapchain(&create_info, None)
                .map_err(VulkanError::setup("Create swapchain"))?
        };

        // From here on `Self` owns the handle so any failure below still destroys it.
        let mut chain = Self {
            device: context.device().clone(),
            loader,
            swapchain,
            images: Vec::new(),
            image_views: Vec::new(),
            format,
            extent,
        };

        chain.images = unsafe {
            chain
                .loader
                .get_swapchain_images(swapchain)
                .map_err(VulkanError::setup("Get swapchain images"))?
        };

        for &image in &chain.images {
            let view = create_color_view(&chain.device, image, format.format)?;
            chain.image_views.push(view);
        }

        log::info!(
            "Swapchain: {} image(s) of {:?} at {}x{}, {:?}",
            chain.images.len(),
            format.format,
            extent.width,
            extent.height,
            present_mode
        );

        Ok(chain)
    }

    /// Acquire the next image, signaling `semaphore` once it may be written
    ///
    /// A suboptimal swapchain is still usable and is only reported by the flag.
    pub fn acquire_next_image(&self, semaphore: vk::Semaphore) -> VulkanResult<(u32, bool)> {
        unsafe {
            self.loader
                .acquire_next_image(self.swapchain, u64::MAX, semaphore, vk::Fence::null())
                .map_err(VulkanError::frame("Acquire next image"))
        }
    }

    /// Queue `image_index` for presentation after `wait` is signaled
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait: vk::Semaphore) -> VulkanResult<bool> {
        let wait_semaphores = [wait];
        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let present_info = vk::PresentInfoKHR::builder()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe {
            self.loader
                .queue_present(queue, &present_info)
                .map_err(VulkanError::frame("Present image"))
        }
    }

    /// Chosen surface format
    pub const fn format(&self) -> vk::SurfaceFormatKHR {
        self.format
    }

    /// Image extent
    pub const fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Number of images actually created by the driver
    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    /// One view per image, in image order
    pub fn image_views(&self) -> &[vk::ImageView] {
        &self.image_views
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            for &view in &self.image_views {
                self.device.destroy_image_view(view, None);
            }
            self.loader.destroy_swapchain(self.swapchain, None);
        }
        log::debug!("Destroyed swapchain and {} image view(s)", self.image_views.len());
    }
}

fn create_color_view(device: &Device, image: vk::Image, format: vk::Format) -> VulkanResult<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::builder()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
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

    unsafe {
        device
            .create_image_view(&create_info, None)
            .map_err(VulkanError::setup("Create image view"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps(min: u32, max: u32) -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: min,
            max_image_count: max,
            ..Default::default()
        }
    }

    fn format(format: vk::Format, color_space: vk::ColorSpaceKHR) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR { format, color_space }
    }

    #[test]
    fn test_image_count_clamped_to_max() {
        assert_eq!(choose_image_count(&caps(2, 3)), 3);
        assert_eq!(choose_image_count(&caps(3, 3)), 3, "min+1 is clamped down to max");
    }

    #[test]
    fn test_image_count_unbounded() {
        assert_eq!(choose_image_count(&caps(2, 0)), 3, "zero max means no upper bound");
        assert_eq!(choose_image_count(&caps(5, 0)), 6);
    }

    #[test]
    fn test_undefined_format_means_anything() {
        let formats = [format(vk::Format::UNDEFINED, vk::ColorSpaceKHR::SRGB_NONLINEAR)];
        assert_eq!(choose_surface_format(&formats), Some(PREFERRED_FORMAT));
    }

    #[test]
    fn test_format_prefers_unorm_srgb_nonlinear() {
        let formats = [
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::EXTENDED_SRGB_LINEAR_EXT),
            format(vk::Format::B8G8R8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::R8G8B8A8_UNORM, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[2]));
    }

    #[test]
    fn test_format_falls_back_to_first() {
        let formats = [
            format(vk::Format::A2B10G10R10_UNORM_PACK32, vk::ColorSpaceKHR::SRGB_NONLINEAR),
            format(vk::Format::B8G8R8A8_SRGB, vk::ColorSpaceKHR::SRGB_NONLINEAR),
        ];
        assert_eq!(choose_surface_format(&formats), Some(formats[0]));
        assert_eq!(choose_surface_format(&[]), None);
    }

    #[test]
    fn test_present_mode_selection() {
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::FIFO, vk::PresentModeKHR::MAILBOX]),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            choose_present_mode(&[vk::PresentModeKHR::IMMEDIATE, vk::PresentModeKHR::FIFO_RELAXED]),
            vk::PresentModeKHR::FIFO
        );
        assert_eq!(choose_present_mode(&[]), vk::PresentModeKHR::FIFO);
    }

    #[test]
    fn test_fixed_extent_used_verbatim() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: 640, height: 480 },
            min_image_extent: vk::Extent2D { width: 1, height: 1 },
            max_image_extent: vk::Extent2D { width: 4096, height: 4096 },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, vk::Extent2D { width: 800, height: 600 });
        assert_eq!((extent.width, extent.height), (640, 480));
    }

    #[test]
    fn test_flexible_extent_is_clamped() {
        let capabilities = vk::SurfaceCapabilitiesKHR {
            current_extent: vk::Extent2D { width: u32::MAX, height: u32::MAX },
            min_image_extent: vk::Extent2D { width: 100, height: 100 },
            max_image_extent: vk::Extent2D { width: 1000, height: 500 },
            ..Default::default()
        };
        let extent = choose_extent(&capabilities, vk::Extent2D { width: 1920, height: 50 });
        assert_eq!((extent.width, extent.height), (1000, 100));

        let extent = choose_extent(&capabilities, vk::Extent2D { width: 800, height: 300 });
        assert_eq!((extent.width, extent.height), (800, 300));
    }

    #[test]
    fn test_sharing_mode() {
        let (mode, indices) = choose_sharing(QueueFamilyIndices { graphics: 0, present: 0 });
        assert_eq!(mode, vk::SharingMode::EXCLUSIVE);
        assert!(indices.is_empty());

        let (mode, indices) = choose_sharing(QueueFamilyIndices { graphics: 0, present: 2 });
        assert_eq!(mode, vk::SharingMode::CONCURRENT);
        assert_eq!(indices, vec![0, 2]);
    }
}
