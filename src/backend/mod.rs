// Backend module - Vulkan abstraction layer
//
// Thin wrappers around ash. `VulkanCommon` owns the objects every sample needs
// (instance, surface, device, swapchain); the remaining modules are helpers
// for creating and filling individual resources.

pub mod buffer;
pub mod commands;
pub mod descriptor;
pub mod device;
pub mod handle;
pub mod image;
pub mod instance;
pub mod pipeline;
pub mod shader;
pub mod surface;
pub mod swapchain;
pub mod sync;

pub use device::VulkanDevice;
pub use instance::Instance;
pub use surface::Surface;
pub use swapchain::{Swapchain, SwapchainDesc};

use anyhow::{Context, Result};
use ash::vk;
use raw_window_handle::HasDisplayHandle;
use std::sync::Arc;
use winit::window::Window;

/// Instance, surface, device and swapchain of one window
pub struct VulkanCommon {
    // Field order is drop order: swapchain before surface
    swapchain: Option<Swapchain>,
    desc: SwapchainDesc,
    can_render: bool,
    device: Arc<VulkanDevice>,
    // Surface and device keep the instance alive
    surface: Surface,
}

impl VulkanCommon {
    pub fn new(window: &Window, app_name: &str, desc: SwapchainDesc, enable_validation: bool) -> Result<Self> {
        let display_handle = window
            .display_handle()
            .context("Failed to get display handle")?
            .as_raw();

        let instance = Instance::new(app_name, display_handle, enable_validation)?;
        let surface = Surface::new(&instance, window)?;
        let device = VulkanDevice::new(&instance, &surface)?;

        let mut common = Self {
            swapchain: None,
            desc,
            can_render: false,
            device,
            surface,
        };
        common.create_swapchain()?;

        Ok(common)
    }

    /// (Re)create the swapchain for the current surface size.
    ///
    /// Leaves `can_render` false when the surface has no area.
    pub fn create_swapchain(&mut self) -> Result<()> {
        self.can_render = false;
        self.device.wait_idle()?;

        // The old swapchain is retired by the new one and destroyed afterwards
        let old = self.swapchain.take();
        self.swapchain = Swapchain::new(&self.device, &self.surface, &self.desc, old.as_ref())?;
        drop(old);

        self.can_render = self.swapchain.is_some();
        Ok(())
    }

    pub fn can_render(&self) -> bool {
        self.can_render
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        &self.device
    }

    pub fn swapchain(&self) -> Result<&Swapchain> {
        self.swapchain.as_ref().context("Swapchain not initialized")
    }

    /// Extent of the current swapchain, zero when there is none
    pub fn extent(&self) -> vk::Extent2D {
        self.swapchain
            .as_ref()
            .map_or(vk::Extent2D::default(), |swapchain| swapchain.extent)
    }

    /// Color format of swapchain images, queried from the surface while there is no swapchain
    pub fn format(&self) -> Result<vk::Format> {
        match &self.swapchain {
            Some(swapchain) => Ok(swapchain.format),
            None => {
                let formats = self.surface.formats(self.device.physical_device)?;
                Ok(swapchain::select_format(&formats)?.format)
            }
        }
    }
}
