// Images, views, samplers and layout transitions
//
// Textures and depth attachments share `ImageParameters`. Uploads go through
// a staging buffer and a blocking one-time submit, which is fine for setup.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use super::buffer::{AccessScope, BufferParameters};
use super::commands::one_time_submit;
use super::handle::Unique;
use super::VulkanDevice;

/// Image, its default view and an optional sampler
pub struct ImageParameters {
    pub handle: vk::Image,
    pub view: vk::ImageView,
    pub sampler: Option<Unique<vk::Sampler>>,
    pub format: vk::Format,
    pub extent: vk::Extent2D,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl ImageParameters {
    /// 2D image with one mip level and one layer, plus a matching view
    pub fn new(
        device: &Arc<VulkanDevice>,
        name: &str,
        extent: vk::Extent2D,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect: vk::ImageAspectFlags,
    ) -> Result<Self> {
        let create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(vk::SampleCountFlags::TYPE_1)
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let handle = unsafe { device.device.create_image(&create_info, None) }
            .with_context(|| format!("Could not create image \"{}\"!", name))?;

        let requirements = unsafe { device.device.get_image_memory_requirements(handle) };
        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location: MemoryLocation::GpuOnly,
            linear: false,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_image(handle, None) };
                return Err(e).with_context(|| format!("Could not allocate memory for image \"{}\"!", name));
            }
        };

        let mut image = Self {
            handle,
            view: vk::ImageView::null(),
            sampler: None,
            format,
            extent,
            allocation: Some(allocation),
            device: device.clone(),
        };

        if let Some(allocation) = &image.allocation {
            unsafe {
                device
                    .device
                    .bind_image_memory(handle, allocation.memory(), allocation.offset())
            }
            .with_context(|| format!("Could not bind memory to image \"{}\"!", name))?;
        }

        let view_info = view_create_info(handle, format, aspect);
        image.view = unsafe { device.device.create_image_view(&view_info, None) }
            .with_context(|| format!("Could not create image view for \"{}\"!", name))?;

        Ok(image)
    }
}

impl Drop for ImageParameters {
    fn drop(&mut self) {
        self.sampler = None;
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.device.destroy_image_view(self.view, None);
            }
            self.device.device.destroy_image(self.handle, None);
        }
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().free(allocation) {
                log::warn!("Failed to free image memory: {}", e);
            }
        }
    }
}

fn view_create_info(
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> vk::ImageViewCreateInfo<'static> {
    vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping::default())
        .subresource_range(subresource_range(aspect))
}

/// View over the first mip level and layer of an image
pub fn create_image_view(
    device: &Arc<VulkanDevice>,
    image: vk::Image,
    format: vk::Format,
    aspect: vk::ImageAspectFlags,
) -> Result<Unique<vk::ImageView>> {
    let create_info = view_create_info(image, format, aspect);
    let view = unsafe { device.device.create_image_view(&create_info, None) }
        .context("Could not create image view!")?;
    Ok(Unique::new(device, view))
}

/// Single mip level, single layer range
pub fn subresource_range(aspect: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask: aspect,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SamplerDesc {
    pub mag_filter: vk::Filter,
    pub min_filter: vk::Filter,
    pub mipmap_mode: vk::SamplerMipmapMode,
    pub address_mode: vk::SamplerAddressMode,
    pub unnormalized_coordinates: bool,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            mag_filter: vk::Filter::LINEAR,
            min_filter: vk::Filter::LINEAR,
            mipmap_mode: vk::SamplerMipmapMode::NEAREST,
            address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
            unnormalized_coordinates: false,
        }
    }
}

pub fn create_sampler(device: &Arc<VulkanDevice>, desc: &SamplerDesc) -> Result<Unique<vk::Sampler>> {
    let create_info = vk::SamplerCreateInfo::default()
        .mag_filter(desc.mag_filter)
        .min_filter(desc.min_filter)
        .mipmap_mode(desc.mipmap_mode)
        .address_mode_u(desc.address_mode)
        .address_mode_v(desc.address_mode)
        .address_mode_w(desc.address_mode)
        .mip_lod_bias(0.0)
        .anisotropy_enable(false)
        .max_anisotropy(1.0)
        .compare_enable(false)
        .compare_op(vk::CompareOp::ALWAYS)
        .min_lod(0.0)
        .max_lod(0.0)
        .border_color(vk::BorderColor::FLOAT_OPAQUE_BLACK)
        .unnormalized_coordinates(desc.unnormalized_coordinates);

    let sampler = unsafe { device.device.create_sampler(&create_info, None) }
        .context("Could not create sampler!")?;
    Ok(Unique::new(device, sampler))
}

/// Layout change of an image together with who used it before and who uses it after
#[derive(Debug, Clone, Copy)]
pub struct ImageTransition {
    pub old_layout: vk::ImageLayout,
    pub before: AccessScope,
    pub new_layout: vk::ImageLayout,
    pub after: AccessScope,
}

fn image_barrier(
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    old_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    new_layout: vk::ImageLayout,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(range)
}

/// Transition `image` to a new layout and wait for it to complete
pub fn set_image_memory_barrier(
    device: &Arc<VulkanDevice>,
    image: vk::Image,
    range: vk::ImageSubresourceRange,
    transition: ImageTransition,
) -> Result<()> {
    one_time_submit(device, |dev, cmd| unsafe {
        let barrier = image_barrier(
            image,
            range,
            transition.old_layout,
            transition.before.access,
            transition.new_layout,
            transition.after.access,
        );
        dev.cmd_pipeline_barrier(
            cmd,
            transition.before.stages,
            transition.after.stages,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[barrier],
        );
    })
}

/// Buffer-to-image copy regions for every mip level in `range`.
///
/// Level data is expected tightly packed one after another, each level half
/// the size of the previous one.
pub fn copy_regions(
    width: u32,
    height: u32,
    bytes_per_pixel: u32,
    range: &vk::ImageSubresourceRange,
) -> Vec<vk::BufferImageCopy> {
    let mut offset: vk::DeviceSize = 0;
    (range.base_mip_level..range.base_mip_level + range.level_count)
        .map(|level| {
            let shift = level - range.base_mip_level;
            let level_width = (width >> shift).max(1);
            let level_height = (height >> shift).max(1);

            let region = vk::BufferImageCopy {
                buffer_offset: offset,
                buffer_row_length: 0,
                buffer_image_height: 0,
                image_subresource: vk::ImageSubresourceLayers {
                    aspect_mask: range.aspect_mask,
                    mip_level: level,
                    base_array_layer: range.base_array_layer,
                    layer_count: range.layer_count,
                },
                image_offset: vk::Offset3D::default(),
                image_extent: vk::Extent3D {
                    width: level_width,
                    height: level_height,
                    depth: 1,
                },
            };

            offset += u64::from(level_width)
                * u64::from(level_height)
                * u64::from(bytes_per_pixel)
                * u64::from(range.layer_count);
            region
        })
        .collect()
}

/// Upload RGBA8 pixel data into `image` and leave it in `transition.new_layout`
pub fn copy_data_to_image(
    device: &Arc<VulkanDevice>,
    image: vk::Image,
    extent: vk::Extent2D,
    data: &[u8],
    range: vk::ImageSubresourceRange,
    transition: ImageTransition,
) -> Result<()> {
    let mut staging = BufferParameters::new(
        device,
        "image staging buffer",
        data.len() as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
    )?;
    staging.write(0, data)?;

    let regions = copy_regions(extent.width, extent.height, 4, &range);

    one_time_submit(device, |dev, cmd| unsafe {
        let pre_transfer = image_barrier(
            image,
            range,
            transition.old_layout,
            transition.before.access,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
        );
        dev.cmd_pipeline_barrier(
            cmd,
            transition.before.stages,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[pre_transfer],
        );

        dev.cmd_copy_buffer_to_image(
            cmd,
            staging.handle,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &regions,
        );

        let post_transfer = image_barrier(
            image,
            range,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            vk::AccessFlags::TRANSFER_WRITE,
            transition.new_layout,
            transition.after.access,
        );
        dev.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            transition.after.stages,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[post_transfer],
        );
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn single_level_copy_covers_whole_image() {
        let range = subresource_range(vk::ImageAspectFlags::COLOR);
        let regions = copy_regions(256, 128, 4, &range);

        assert_eq!(regions.len(), 1);
        assert_eq!(regions[0].buffer_offset, 0);
        assert_eq!(regions[0].image_subresource.mip_level, 0);
        assert_eq!(regions[0].image_extent.width, 256);
        assert_eq!(regions[0].image_extent.height, 128);
    }

    #[test]
    fn mip_levels_are_packed_back_to_back() {
        let range = vk::ImageSubresourceRange {
            level_count: 3,
            ..subresource_range(vk::ImageAspectFlags::COLOR)
        };
        let regions = copy_regions(4, 2, 4, &range);

        let offsets: Vec<_> = regions.iter().map(|r| r.buffer_offset).collect();
        assert_eq!(offsets, vec![0, 32, 40]);

        let last = regions[2].image_extent;
        assert_eq!((last.width, last.height), (1, 1));
    }
}
