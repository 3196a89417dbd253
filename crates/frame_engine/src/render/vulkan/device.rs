//! Device/queue resolver
//!
//! Physical devices are first described as plain [`DeviceCandidate`] data, then the
//! first one meeting [`DeviceRequirements`] is chosen. Only the gathering step talks
//! to the driver.

use std::ffi::CStr;
use std::fmt;

use ash::extensions::khr::{Surface, Swapchain as SwapchainLoader};
use ash::{vk, Instance};

use super::{VulkanError, VulkanResult};

/// Graphics and presentation queue family indices
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueFamilyIndices {
    /// Family used for rendering and transfers
    pub graphics: u32,
    /// Family used for presentation
    pub present: u32,
}

impl QueueFamilyIndices {
    /// Distinct family indices, graphics first
    pub fn unique(&self) -> Vec<u32> {
        if self.is_shared() {
            vec![self.graphics]
        } else {
            vec![self.graphics, self.present]
        }
    }

    /// Whether one family serves both roles
    pub const fn is_shared(&self) -> bool {
        self.graphics == self.present
    }
}

/// Capabilities of one queue family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueFamilyCaps {
    /// Number of queues in the family
    pub queue_count: u32,
    /// Supports graphics operations
    pub graphics: bool,
    /// Can present to the target surface
    pub present: bool,
}

/// Everything the resolver needs to know about one physical device
#[derive(Debug, Clone, Default)]
pub struct DeviceCandidate {
    /// Driver-reported device name
    pub name: String,
    /// Queue families in driver order
    pub queue_families: Vec<QueueFamilyCaps>,
    /// Supported device extension names
    pub extensions: Vec<String>,
    /// Surface reports at least one format
    pub has_surface_formats: bool,
    /// Surface reports at least one present mode
    pub has_present_modes: bool,
}

/// What a device must offer to be selected
#[derive(Debug, Clone)]
pub struct DeviceRequirements {
    /// Device extensions that must all be present
    pub extensions: Vec<String>,
    /// Whether a presentation queue and swapchain support are needed
    pub presentation: bool,
}

impl DeviceRequirements {
    /// Requirements for rendering to a window surface
    pub fn for_presentation() -> Self {
        Self {
            extensions: vec![SwapchainLoader::name().to_string_lossy().into_owned()],
            presentation: true,
        }
    }

    /// Requirements for offscreen work without a surface
    pub const fn headless() -> Self {
        Self {
            extensions: Vec::new(),
            presentation: false,
        }
    }
}

/// Why a candidate was passed over
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// A required extension is absent
    MissingExtension(String),
    /// No usable graphics or presentation family
    MissingQueueFamily,
    /// The surface offers no formats or present modes
    InadequateSwapchain,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingExtension(name) => write!(f, "missing extension {name}"),
            Self::MissingQueueFamily => f.write_str("no graphics/present queue family"),
            Self::InadequateSwapchain => f.write_str("surface has no formats or present modes"),
        }
    }
}

/// Pick graphics and presentation families
///
/// A family that can do both is preferred. Otherwise the first graphics family and the
/// first presenting family are paired. Families with no queues are ignored. When
/// `presentation` is false the graphics family doubles as the present family.
pub fn find_queue_families(families: &[QueueFamilyCaps], presentation: bool) -> Option<QueueFamilyIndices> {
    let usable = || {
        families
            .iter()
            .enumerate()
            .filter(|(_, family)| family.queue_count > 0)
            .map(|(index, family)| (index as u32, family))
    };

    if !presentation {
        let graphics = usable().find(|(_, f)| f.graphics).map(|(i, _)| i)?;
        return Some(QueueFamilyIndices { graphics, present: graphics });
    }

    if let Some((index, _)) = usable().find(|(_, f)| f.graphics && f.present) {
        return Some(QueueFamilyIndices { graphics: index, present: index });
    }

    let graphics = usable().find(|(_, f)| f.graphics).map(|(i, _)| i)?;
    let present = usable().find(|(_, f)| f.present).map(|(i, _)| i)?;
    Some(QueueFamilyIndices { graphics, present })
}

/// Check one candidate, returning its queue families if it qualifies
pub fn evaluate_candidate(
    candidate: &DeviceCandidate,
    requirements: &DeviceRequirements,
) -> Result<QueueFamilyIndices, Rejection> {
    if let Some(missing) = requirements
        .extensions
        .iter()
        .find(|required| !candidate.extensions.iter().any(|available| available == *required))
    {
        return Err(Rejection::MissingExtension(missing.clone()));
    }

    let families = find_queue_families(&candidate.queue_families, requirements.presentation)
        .ok_or(Rejection::MissingQueueFamily)?;

    if requirements.presentation && !(candidate.has_surface_formats && candidate.has_present_modes) {
        return Err(Rejection::InadequateSwapchain);
    }

    Ok(families)
}

/// Return the index of the first qualifying candidate and its queue families
pub fn select_device(
    candidates: &[DeviceCandidate],
    requirements: &DeviceRequirements,
) -> VulkanResult<(usize, QueueFamilyIndices)> {
    for (index, candidate) in candidates.iter().enumerate() {
        match evaluate_candidate(candidate, requirements) {
            Ok(families) => return Ok((index, families)),
            Err(reason) => log::debug!("Skipping GPU {}: {}", candidate.name, reason),
        }
    }

    Err(VulkanError::NoSuitableDevice {
        candidates: candidates.len(),
    })
}

/// Selected physical device and the data later stages read from it
pub struct PhysicalDeviceInfo {
    /// Vulkan physical device handle
    pub device: vk::PhysicalDevice,
    /// Device name for logging
    pub name: String,
    /// Memory heaps and types
    pub memory_properties: vk::PhysicalDeviceMemoryProperties,
    /// Chosen queue families
    pub queue_families: QueueFamilyIndices,
}

impl PhysicalDeviceInfo {
    /// Enumerate devices and choose the first one meeting `requirements`
    ///
    /// `surface` must be provided when `requirements.presentation` is set.
    pub fn select(
        instance: &Instance,
        surface: Option<(&Surface, vk::SurfaceKHR)>,
        requirements: &DeviceRequirements,
    ) -> VulkanResult<Self> {
        let devices = unsafe {
            instance
                .enumerate_physical_devices()
                .map_err(VulkanError::setup("Enumerate physical devices"))?
        };

        let candidates = devices
            .iter()
            .map(|&device| describe_device(instance, device, surface))
            .collect::<VulkanResult<Vec<_>>>()?;

        let (index, queue_families) = select_device(&candidates, requirements)?;
        let device = devices[index];
        let name = candidates[index].name.clone();
        log::info!(
            "Selected GPU: {} (graphics family {}, present family {})",
            name,
            queue_families.graphics,
            queue_families.present
        );

        let memory_properties = unsafe { instance.get_physical_device_memory_properties(device) };

        Ok(Self {
            device,
            name,
            memory_properties,
            queue_families,
        })
    }
}

fn describe_device(
    instance: &Instance,
    device: vk::PhysicalDevice,
    surface: Option<(&Surface, vk::SurfaceKHR)>,
) -> VulkanResult<DeviceCandidate> {
    let properties = unsafe { instance.get_physical_device_properties(device) };
    let name = unsafe { CStr::from_ptr(properties.device_name.as_ptr()) }
        .to_string_lossy()
        .into_owned();

    let families = unsafe { instance.get_physical_device_queue_family_properties(device) };
    let mut queue_families = Vec::with_capacity(families.len());
    for (index, family) in families.iter().enumerate() {
        let present = match surface {
            Some((loader, surface)) => unsafe {
                loader
                    .get_physical_device_surface_support(device, index as u32, surface)
                    .map_err(VulkanError::setup("Query surface support"))?
            },
            None => false,
        };
        queue_families.push(QueueFamilyCaps {
            queue_count: family.queue_count,
            graphics: family.queue_flags.contains(vk::QueueFlags::GRAPHICS),
            present,
        });
    }

    let extensions = unsafe {
        instance
            .enumerate_device_extension_properties(device)
            .map_err(VulkanError::setup("Enumerate device extensions"))?
    }
    .iter()
    .map(|ext| {
        unsafe { CStr::from_ptr(ext.extension_name.as_ptr()) }
            .to_string_lossy()
            .into_owned()
    })
    .collect();

    let (has_surface_formats, has_present_modes) = match surface {
        Some((loader, surface)) => unsafe {
            let formats = loader
                .get_physical_device_surface_formats(device, surface)
                .map_err(VulkanError::setup("Query surface formats"))?;
            let modes = loader
                .get_physical_device_surface_present_modes(device, surface)
                .map_err(VulkanError::setup("Query present modes"))?;
            (!formats.is_empty(), !modes.is_empty())
        },
        None => (false, false),
    };

    Ok(DeviceCandidate {
        name,
        queue_families,
        extensions,
        has_surface_formats,
        has_present_modes,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const GRAPHICS: QueueFamilyCaps = QueueFamilyCaps { queue_count: 1, graphics: true, present: false };
    const PRESENT: QueueFamilyCaps = QueueFamilyCaps { queue_count: 1, graphics: false, present: true };
    const BOTH: QueueFamilyCaps = QueueFamilyCaps { queue_count: 1, graphics: true, present: true };

    fn swapchain_ext() -> String {
        SwapchainLoader::name().to_string_lossy().into_owned()
    }

    fn candidate(name: &str, families: Vec<QueueFamilyCaps>) -> DeviceCandidate {
        DeviceCandidate {
            name: name.to_string(),
            queue_families: families,
            extensions: vec![swapchain_ext()],
            has_surface_formats: true,
            has_present_modes: true,
        }
    }

    #[test]
    fn test_prefers_family_with_both_roles() {
        let families = [GRAPHICS, PRESENT, BOTH];
        let indices = find_queue_families(&families, true).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 2, present: 2 });
        assert!(indices.is_shared());
        assert_eq!(indices.unique(), vec![2]);
    }

    #[test]
    fn test_pairs_separate_families() {
        let families = [PRESENT, GRAPHICS];
        let indices = find_queue_families(&families, true).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 1, present: 0 });
        assert_eq!(indices.unique(), vec![1, 0], "graphics family is listed first");
    }

    #[test]
    fn test_empty_families_are_ignored() {
        let empty = QueueFamilyCaps { queue_count: 0, graphics: true, present: true };
        assert_eq!(find_queue_families(&[empty], true), None);
        assert_eq!(
            find_queue_families(&[empty, BOTH], true),
            Some(QueueFamilyIndices { graphics: 1, present: 1 })
        );
    }

    #[test]
    fn test_headless_uses_graphics_for_both() {
        let indices = find_queue_families(&[PRESENT, GRAPHICS], false).unwrap();
        assert_eq!(indices, QueueFamilyIndices { graphics: 1, present: 1 });
    }

    #[test]
    fn test_first_suitable_device_wins() {
        let mut no_ext = candidate("no-swapchain", vec![BOTH]);
        no_ext.extensions.clear();
        let no_present = candidate("compute-only", vec![GRAPHICS]);
        let good_a = candidate("good-a", vec![GRAPHICS, PRESENT]);
        let good_b = candidate("good-b", vec![BOTH]);

        let (index, families) =
            select_device(&[no_ext, no_present, good_a, good_b], &DeviceRequirements::for_presentation()).unwrap();
        assert_eq!(index, 2, "first qualifying device is selected, not the best one");
        assert_eq!(families, QueueFamilyIndices { graphics: 0, present: 1 });
    }

    #[test]
    fn test_rejection_reasons() {
        let requirements = DeviceRequirements::for_presentation();

        let mut missing_ext = candidate("a", vec![BOTH]);
        missing_ext.extensions = vec!["VK_KHR_other".to_string()];
        assert_eq!(
            evaluate_candidate(&missing_ext, &requirements),
            Err(Rejection::MissingExtension(swapchain_ext()))
        );

        assert_eq!(
            evaluate_candidate(&candidate("b", vec![GRAPHICS]), &requirements),
            Err(Rejection::MissingQueueFamily)
        );

        let mut no_modes = candidate("c", vec![BOTH]);
        no_modes.has_present_modes = false;
        assert_eq!(evaluate_candidate(&no_modes, &requirements), Err(Rejection::InadequateSwapchain));
    }

    #[test]
    fn test_no_suitable_device() {
        let result = select_device(&[candidate("a", vec![PRESENT])], &DeviceRequirements::for_presentation());
        assert!(
            matches!(result, Err(VulkanError::NoSuitableDevice { candidates: 1 })),
            "a device without graphics support must be rejected"
        );

        let result = select_device(&[], &DeviceRequirements::for_presentation());
        assert!(matches!(result, Err(VulkanError::NoSuitableDevice { candidates: 0 })));
    }

    #[test]
    fn test_headless_ignores_surface_adequacy() {
        let mut device = candidate("offscreen", vec![GRAPHICS]);
        device.extensions.clear();
        device.has_surface_formats = false;
        device.has_present_modes = false;
        assert!(evaluate_candidate(&device, &DeviceRequirements::headless()).is_ok());
    }
}
