// Vulkan Device - Core GPU interface
//
// Responsibilities:
// - Physical device selection (swapchain support, limits, queue families)
// - Logical device + graphics/present queue creation
// - Memory allocator setup

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use parking_lot::{Mutex, MutexGuard};
use std::mem::ManuallyDrop;
use std::sync::Arc;
use super::instance::has_extension;
use super::{Instance, Surface};

/// Smallest 2D image dimension a device must support
const MIN_IMAGE_DIMENSION_2D: u32 = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueParameters {
    pub handle: vk::Queue,
    pub family_index: u32,
}

/// What device selection needs to know about a single queue family
#[derive(Debug, Clone, Copy)]
pub struct QueueFamilyInfo {
    pub flags: vk::QueueFlags,
    pub queue_count: u32,
    pub supports_present: bool,
}

/// Vulkan device wrapper with automatic cleanup
pub struct VulkanDevice {
    // Dropped manually before the device is destroyed
    allocator: ManuallyDrop<Mutex<Allocator>>,
    pub device: ash::Device,
    pub physical_device: vk::PhysicalDevice,
    pub physical_device_name: String,
    pub properties: vk::PhysicalDeviceProperties,
    pub graphics_queue: QueueParameters,
    pub present_queue: QueueParameters,
    pub instance: Arc<Instance>,
}

impl VulkanDevice {
    pub fn new(instance: &Arc<Instance>, surface: &Surface) -> Result<Arc<Self>> {
        let physical_devices = unsafe { instance.instance.enumerate_physical_devices() }
            .context("Could not enumerate physical devices!")?;

        if physical_devices.is_empty() {
            anyhow::bail!("No Vulkan-capable GPU found");
        }

        let mut selected = None;
        for physical_device in physical_devices {
            match Self::check_physical_device(instance, surface, physical_device) {
                Ok(families) => {
                    selected = Some((physical_device, families));
                    break;
                }
                Err(reason) => log::info!("Skipping physical device: {:#}", reason),
            }
        }

        let (physical_device, (graphics_family, present_family)) = selected
            .context("Could not select physical device based on the chosen properties!")?;

        let properties = unsafe { instance.instance.get_physical_device_properties(physical_device) };
        let physical_device_name = properties
            .device_name_as_c_str()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "Unknown device".to_string());

        log::info!("Selected GPU: {}", physical_device_name);
        log::info!(
            "API Version: {}.{}.{}",
            vk::api_version_major(properties.api_version),
            vk::api_version_minor(properties.api_version),
            vk::api_version_patch(properties.api_version)
        );

        let device = Self::create_logical_device(
            &instance.instance,
            physical_device,
            graphics_family,
            present_family,
        )?;

        let graphics_queue = QueueParameters {
            handle: unsafe { device.get_device_queue(graphics_family, 0) },
            family_index: graphics_family,
        };
        let present_queue = QueueParameters {
            handle: unsafe { device.get_device_queue(present_family, 0) },
            family_index: present_family,
        };

        let allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.instance.clone(),
            device: device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_leaks_on_shutdown: true,
                ..Default::default()
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })
        .context("Failed to create memory allocator")?;

        Ok(Arc::new(Self {
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            device,
            physical_device,
            physical_device_name,
            properties,
            graphics_queue,
            present_queue,
            instance: instance.clone(),
        }))
    }

    /// Returns the (graphics, present) queue families when the device is usable
    fn check_physical_device(
        instance: &Instance,
        surface: &Surface,
        physical_device: vk::PhysicalDevice,
    ) -> Result<(u32, u32)> {
        let extensions = unsafe {
            instance
                .instance
                .enumerate_device_extension_properties(physical_device)
        }
        .context("Error occurred during physical device extensions enumeration!")?;

        let properties = unsafe { instance.instance.get_physical_device_properties(physical_device) };
        check_device_properties(
            has_extension(&extensions, ash::khr::swapchain::NAME),
            &properties,
        )?;

        let families = unsafe {
            instance
                .instance
                .get_physical_device_queue_family_properties(physical_device)
        };
        let families = families
            .iter()
            .enumerate()
            .map(|(index, props)| {
                Ok(QueueFamilyInfo {
                    flags: props.queue_flags,
                    queue_count: props.queue_count,
                    supports_present: surface.supports_present(physical_device, index as u32)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        select_queue_families(&families)
            .context("Could not find queue families with required properties")
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_family: u32,
        present_family: u32,
    ) -> Result<ash::Device> {
        let queue_priorities = [1.0];
        let mut queue_create_infos = vec![vk::DeviceQueueCreateInfo::default()
            .queue_family_index(graphics_family)
            .queue_priorities(&queue_priorities)];
        if graphics_family != present_family {
            queue_create_infos.push(
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(present_family)
                    .queue_priorities(&queue_priorities),
            );
        }

        let extensions = [ash::khr::swapchain::NAME.as_ptr()];

        let create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&extensions);

        unsafe { instance.create_device(physical_device, &create_info, None) }
            .context("Could not create logical device!")
    }

    pub fn allocator(&self) -> MutexGuard<'_, Allocator> {
        self.allocator.lock()
    }

    /// Wait for device to be idle (e.g., before cleanup)
    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.device.device_wait_idle() }.context("Failed to wait for device idle")
    }
}

impl Drop for VulkanDevice {
    fn drop(&mut self) {
        log::info!("Destroying Vulkan device...");

        let _ = self.wait_idle();

        unsafe {
            ManuallyDrop::drop(&mut self.allocator);
            self.device.destroy_device(None);
        }
    }
}

/// Checks the extension and limit requirements of a physical device
pub fn check_device_properties(
    has_swapchain_extension: bool,
    properties: &vk::PhysicalDeviceProperties,
) -> Result<()> {
    if !has_swapchain_extension {
        anyhow::bail!(
            "Physical device doesn't support extension named \"{}\"!",
            ash::khr::swapchain::NAME.to_string_lossy()
        );
    }

    let major_version = vk::api_version_major(properties.api_version);
    if major_version < 1 || properties.limits.max_image_dimension2_d < MIN_IMAGE_DIMENSION_2D {
        anyhow::bail!("Physical device doesn't support required parameters!");
    }

    Ok(())
}

/// Picks (graphics, present) queue families.
///
/// A single family that can do both wins; otherwise the first graphics family
/// is paired with the first family that can present.
pub fn select_queue_families(families: &[QueueFamilyInfo]) -> Option<(u32, u32)> {
    let mut graphics = None;
    let mut present = None;
    for (index, family) in families.iter().enumerate().filter(|(_, f)| f.queue_count > 0) {
        let index = index as u32;
        let has_graphics = family.flags.contains(vk::QueueFlags::GRAPHICS);

        if has_graphics && family.supports_present {
            return Some((index, index));
        }
        if has_graphics && graphics.is_none() {
            graphics = Some(index);
        }
        if family.supports_present && present.is_none() {
            present = Some(index);
        }
    }

    graphics.zip(present)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags, queue_count: u32, supports_present: bool) -> QueueFamilyInfo {
        QueueFamilyInfo {
            flags,
            queue_count,
            supports_present,
        }
    }

    #[test]
    fn prefers_combined_family() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 1, false),
            family(vk::QueueFlags::COMPUTE, 1, true),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 1, true),
        ];
        assert_eq!(select_queue_families(&families), Some((2, 2)));
    }

    #[test]
    fn falls_back_to_separate_families() {
        let families = [
            family(vk::QueueFlags::TRANSFER, 1, false),
            family(vk::QueueFlags::GRAPHICS, 1, false),
            family(vk::QueueFlags::COMPUTE, 1, true),
            family(vk::QueueFlags::GRAPHICS, 1, false),
        ];
        assert_eq!(select_queue_families(&families), Some((1, 2)));
    }

    #[test]
    fn ignores_families_without_queues() {
        let families = [
            family(vk::QueueFlags::GRAPHICS, 0, true),
            family(vk::QueueFlags::GRAPHICS, 2, false),
        ];
        assert_eq!(select_queue_families(&families), None);
    }

    #[test]
    fn rejects_device_without_swapchain() {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.api_version = vk::API_VERSION_1_0;
        properties.limits.max_image_dimension2_d = 16384;

        assert!(check_device_properties(false, &properties).is_err());
        assert!(check_device_properties(true, &properties).is_ok());
    }

    #[test]
    fn rejects_small_image_limit() {
        let mut properties = vk::PhysicalDeviceProperties::default();
        properties.api_version = vk::API_VERSION_1_0;
        properties.limits.max_image_dimension2_d = 2048;

        assert!(check_device_properties(true, &properties).is_err());
    }
}
