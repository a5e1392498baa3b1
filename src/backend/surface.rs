// Presentation surface
//
// Connects the winit window to Vulkan and answers the per-device queries the
// swapchain needs (capabilities, formats, present modes).

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::sync::Arc;
use winit::window::Window;
use super::Instance;

pub struct Surface {
    pub loader: ash::khr::surface::Instance,
    pub handle: vk::SurfaceKHR,
    _instance: Arc<Instance>,
}

impl Surface {
    pub fn new(instance: &Arc<Instance>, window: &Window) -> Result<Self> {
        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();
        let window_handle = window
            .window_handle()
            .context("Failed to get window handle")?
            .as_raw();

        let handle = unsafe {
            ash_window::create_surface(
                &instance.entry,
                &instance.instance,
                display_handle,
                window_handle,
                None,
            )
        }
        .context("Could not create presentation surface!")?;

        let loader = ash::khr::surface::Instance::new(&instance.entry, &instance.instance);

        Ok(Self {
            loader,
            handle,
            _instance: instance.clone(),
        })
    }

    pub fn supports_present(&self, physical_device: vk::PhysicalDevice, family: u32) -> Result<bool> {
        unsafe {
            self.loader
                .get_physical_device_surface_support(physical_device, family, self.handle)
        }
        .context("Failed to query surface present support")
    }

    pub fn capabilities(&self, physical_device: vk::PhysicalDevice) -> Result<vk::SurfaceCapabilitiesKHR> {
        unsafe {
            self.loader
                .get_physical_device_surface_capabilities(physical_device, self.handle)
        }
        .context("Could not check presentation surface capabilities!")
    }

    pub fn formats(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::SurfaceFormatKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_formats(physical_device, self.handle)
        }
        .context("Error occurred during presentation surface formats enumeration!")
    }

    pub fn present_modes(&self, physical_device: vk::PhysicalDevice) -> Result<Vec<vk::PresentModeKHR>> {
        unsafe {
            self.loader
                .get_physical_device_surface_present_modes(physical_device, self.handle)
        }
        .context("Error occurred during presentation modes enumeration!")
    }
}

impl Drop for Surface {
    fn drop(&mut self) {
        unsafe { self.loader.destroy_surface(self.handle, None) };
    }
}
