// Swapchain - Window presentation
//
// Manages the chain of images we render to and present to the screen.
// Parameter selection is split into small pure functions so each rule can be
// checked without a GPU.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::handle::Unique;
use super::image::create_image_view;
use super::{Surface, VulkanDevice};

/// Window extent used when the surface lets the swapchain decide
const DEFAULT_EXTENT: vk::Extent2D = vk::Extent2D {
    width: 640,
    height: 480,
};

/// Requested swapchain properties, adjusted to what the surface supports
#[derive(Debug, Clone, Copy)]
pub struct SwapchainDesc {
    pub image_count: u32,
    pub present_mode: vk::PresentModeKHR,
    pub usage: vk::ImageUsageFlags,
}

impl Default for SwapchainDesc {
    fn default() -> Self {
        Self {
            image_count: 3,
            present_mode: vk::PresentModeKHR::MAILBOX,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
        }
    }
}

pub struct Swapchain {
    pub handle: vk::SwapchainKHR,
    pub loader: ash::khr::swapchain::Device,
    pub images: Vec<vk::Image>,
    pub image_views: Vec<Unique<vk::ImageView>>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    device: Arc<VulkanDevice>,
}

impl Swapchain {
    /// Create a swapchain, retiring `old` if given.
    ///
    /// Returns `None` when the surface currently has a zero-sized extent
    /// (e.g. a minimized window), in which case nothing can be rendered.
    pub fn new(
        device: &Arc<VulkanDevice>,
        surface: &Surface,
        desc: &SwapchainDesc,
        old: Option<&Swapchain>,
    ) -> Result<Option<Self>> {
        let caps = surface.capabilities(device.physical_device)?;
        let formats = surface.formats(device.physical_device)?;
        let present_modes = surface.present_modes(device.physical_device)?;

        let image_count = select_image_count(&caps, desc.image_count);
        let format = select_format(&formats)?;
        let extent = select_extent(&caps);
        let usage = select_usage(&caps, desc.usage)?;
        let transform = select_transform(&caps);
        let present_mode = select_present_mode(&present_modes, desc.present_mode)?;

        if extent.width == 0 || extent.height == 0 {
            log::debug!("Surface extent is zero, skipping swapchain creation");
            return Ok(None);
        }

        log::info!(
            "Creating swapchain: {}x{}, {} images, {:?}, {:?}",
            extent.width,
            extent.height,
            image_count,
            format.format,
            present_mode
        );

        let loader = ash::khr::swapchain::Device::new(&device.instance.instance, &device.device);

        let create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(surface.handle)
            .min_image_count(image_count)
            .image_format(format.format)
            .image_color_space(format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(usage)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .old_swapchain(old.map_or(vk::SwapchainKHR::null(), |old| old.handle));

        let handle = unsafe { loader.create_swapchain(&create_info, None) }
            .context("Could not create swap chain!")?;

        let images = unsafe { loader.get_swapchain_images(handle) }
            .context("Could not get swap chain images!")?;

        let image_views = images
            .iter()
            .map(|&image| {
                create_image_view(device, image, format.format, vk::ImageAspectFlags::COLOR)
            })
            .collect::<Result<Vec<_>>>();

        let image_views = match image_views {
            Ok(views) => views,
            Err(e) => {
                unsafe { loader.destroy_swapchain(handle, None) };
                return Err(e);
            }
        };

        Ok(Some(Self {
            handle,
            loader,
            images,
            image_views,
            format: format.format,
            extent,
            device: device.clone(),
        }))
    }

    /// Acquire next image from swapchain, returns (index, suboptimal)
    pub fn acquire_next_image(&self, timeout: u64, semaphore: vk::Semaphore) -> Result<(u32, bool), vk::Result> {
        unsafe {
            self.loader
                .acquire_next_image(self.handle, timeout, semaphore, vk::Fence::null())
        }
    }

    /// Present image to screen, returns true when the swapchain is suboptimal
    pub fn present(&self, queue: vk::Queue, image_index: u32, wait_semaphores: &[vk::Semaphore]) -> Result<bool, vk::Result> {
        let swapchains = [self.handle];
        let image_indices = [image_index];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        unsafe { self.loader.queue_present(queue, &present_info) }
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        if let Err(e) = self.device.wait_idle() {
            log::warn!("Device wait failed before destroying the swapchain: {:#}", e);
        }
        self.image_views.clear();
        unsafe { self.loader.destroy_swapchain(self.handle, None) };
    }
}

/// At least the requested count and the surface minimum, capped at the maximum if any
pub fn select_image_count(caps: &vk::SurfaceCapabilitiesKHR, requested: u32) -> u32 {
    let count = requested.max(caps.min_image_count);
    if caps.max_image_count > 0 {
        count.min(caps.max_image_count)
    } else {
        count
    }
}

pub fn select_format(formats: &[vk::SurfaceFormatKHR]) -> Result<vk::SurfaceFormatKHR> {
    // A lone UNDEFINED entry means any format may be used
    if let [only] = formats {
        if only.format == vk::Format::UNDEFINED {
            return Ok(vk::SurfaceFormatKHR {
                format: vk::Format::R8G8B8A8_UNORM,
                color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
            });
        }
    }

    formats
        .iter()
        .find(|f| f.format == vk::Format::R8G8B8A8_UNORM)
        .or_else(|| formats.first())
        .copied()
        .context("No surface formats available")
}

pub fn select_extent(caps: &vk::SurfaceCapabilitiesKHR) -> vk::Extent2D {
    // u32::MAX means the size is determined by the swapchain
    if caps.current_extent.width == u32::MAX {
        vk::Extent2D {
            width: DEFAULT_EXTENT
                .width
                .clamp(caps.min_image_extent.width, caps.max_image_extent.width),
            height: DEFAULT_EXTENT
                .height
                .clamp(caps.min_image_extent.height, caps.max_image_extent.height),
        }
    } else {
        caps.current_extent
    }
}

pub fn select_usage(caps: &vk::SurfaceCapabilitiesKHR, desired: vk::ImageUsageFlags) -> Result<vk::ImageUsageFlags> {
    if caps.supported_usage_flags.contains(desired) {
        return Ok(desired);
    }
    anyhow::bail!(
        "Image usage flags {:?} not supported. Supported swap chain image usages include: {:?}",
        desired,
        caps.supported_usage_flags
    )
}

pub fn select_transform(caps: &vk::SurfaceCapabilitiesKHR) -> vk::SurfaceTransformFlagsKHR {
    if caps
        .supported_transforms
        .contains(vk::SurfaceTransformFlagsKHR::IDENTITY)
    {
        vk::SurfaceTransformFlagsKHR::IDENTITY
    } else {
        caps.current_transform
    }
}

/// Desired mode, then IMMEDIATE, MAILBOX and FIFO in that order
pub fn select_present_mode(
    modes: &[vk::PresentModeKHR],
    desired: vk::PresentModeKHR,
) -> Result<vk::PresentModeKHR> {
    [
        desired,
        vk::PresentModeKHR::IMMEDIATE,
        vk::PresentModeKHR::MAILBOX,
        vk::PresentModeKHR::FIFO,
    ]
    .into_iter()
    .find(|mode| modes.contains(mode))
    .context("FIFO present mode is not supported by the swap chain!")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caps() -> vk::SurfaceCapabilitiesKHR {
        vk::SurfaceCapabilitiesKHR {
            min_image_count: 2,
            max_image_count: 8,
            current_extent: vk::Extent2D {
                width: 1000,
                height: 800,
            },
            min_image_extent: vk::Extent2D {
                width: 1,
                height: 1,
            },
            max_image_extent: vk::Extent2D {
                width: 4096,
                height: 4096,
            },
            supported_transforms: vk::SurfaceTransformFlagsKHR::IDENTITY,
            current_transform: vk::SurfaceTransformFlagsKHR::IDENTITY,
            supported_usage_flags: vk::ImageUsageFlags::COLOR_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST,
            ..Default::default()
        }
    }

    fn format(format: vk::Format) -> vk::SurfaceFormatKHR {
        vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        }
    }

    #[test]
    fn image_count_respects_surface_limits() {
        let mut caps = caps();
        assert_eq!(select_image_count(&caps, 3), 3);
        assert_eq!(select_image_count(&caps, 1), 2);
        assert_eq!(select_image_count(&caps, 12), 8);

        // No upper limit
        caps.max_image_count = 0;
        assert_eq!(select_image_count(&caps, 12), 12);
    }

    #[test]
    fn undefined_format_means_free_choice() {
        let chosen = select_format(&[format(vk::Format::UNDEFINED)]).unwrap();
        assert_eq!(chosen.format, vk::Format::R8G8B8A8_UNORM);
        assert_eq!(chosen.color_space, vk::ColorSpaceKHR::SRGB_NONLINEAR);
    }

    #[test]
    fn prefers_rgba_unorm_then_first() {
        let formats = [format(vk::Format::B8G8R8A8_SRGB), format(vk::Format::R8G8B8A8_UNORM)];
        assert_eq!(select_format(&formats).unwrap().format, vk::Format::R8G8B8A8_UNORM);

        let formats = [format(vk::Format::B8G8R8A8_SRGB), format(vk::Format::B8G8R8A8_UNORM)];
        assert_eq!(select_format(&formats).unwrap().format, vk::Format::B8G8R8A8_SRGB);

        assert!(select_format(&[]).is_err());
    }

    #[test]
    fn extent_follows_surface_or_default() {
        let mut caps = caps();
        assert_eq!(select_extent(&caps).width, 1000);

        caps.current_extent.width = u32::MAX;
        assert_eq!(select_extent(&caps), DEFAULT_EXTENT);

        caps.max_image_extent = vk::Extent2D {
            width: 320,
            height: 240,
        };
        let extent = select_extent(&caps);
        assert_eq!((extent.width, extent.height), (320, 240));
    }

    #[test]
    fn usage_must_be_supported() {
        let mut caps = caps();
        assert!(select_usage(&caps, vk::ImageUsageFlags::COLOR_ATTACHMENT).is_ok());

        caps.supported_usage_flags = vk::ImageUsageFlags::TRANSFER_DST;
        assert!(select_usage(&caps, vk::ImageUsageFlags::COLOR_ATTACHMENT).is_err());
    }

    #[test]
    fn transform_prefers_identity() {
        let mut caps = caps();
        assert_eq!(select_transform(&caps), vk::SurfaceTransformFlagsKHR::IDENTITY);

        caps.supported_transforms = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        caps.current_transform = vk::SurfaceTransformFlagsKHR::ROTATE_90;
        assert_eq!(select_transform(&caps), vk::SurfaceTransformFlagsKHR::ROTATE_90);
    }

    #[test]
    fn present_mode_fallback_order() {
        let all = [
            vk::PresentModeKHR::FIFO,
            vk::PresentModeKHR::MAILBOX,
            vk::PresentModeKHR::IMMEDIATE,
        ];
        assert_eq!(
            select_present_mode(&all, vk::PresentModeKHR::MAILBOX).unwrap(),
            vk::PresentModeKHR::MAILBOX
        );
        assert_eq!(
            select_present_mode(&all, vk::PresentModeKHR::FIFO_RELAXED).unwrap(),
            vk::PresentModeKHR::IMMEDIATE
        );
        assert_eq!(
            select_present_mode(&[vk::PresentModeKHR::FIFO], vk::PresentModeKHR::MAILBOX).unwrap(),
            vk::PresentModeKHR::FIFO
        );
        assert!(select_present_mode(&[], vk::PresentModeKHR::MAILBOX).is_err());
    }
}
