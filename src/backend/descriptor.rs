// Descriptor set layout, pool and a single allocated set

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::handle::Unique;
use super::VulkanDevice;

pub struct DescriptorSetParameters {
    pub handle: vk::DescriptorSet,
    pub layout: Unique<vk::DescriptorSetLayout>,
    // Owns the set; destroying it frees the set as well
    pub pool: Unique<vk::DescriptorPool>,
}

/// Create a layout from `bindings`, a pool big enough for one set and allocate that set
pub fn create_descriptor_resources(
    device: &Arc<VulkanDevice>,
    bindings: &[vk::DescriptorSetLayoutBinding<'_>],
    pool_sizes: &[vk::DescriptorPoolSize],
) -> Result<DescriptorSetParameters> {
    let layout_info = vk::DescriptorSetLayoutCreateInfo::default().bindings(bindings);
    let layout = unsafe { device.device.create_descriptor_set_layout(&layout_info, None) }
        .context("Could not create descriptor set layout!")?;
    let layout = Unique::new(device, layout);

    let pool_info = vk::DescriptorPoolCreateInfo::default()
        .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
        .max_sets(1)
        .pool_sizes(pool_sizes);
    let pool = unsafe { device.device.create_descriptor_pool(&pool_info, None) }
        .context("Could not create descriptor pool!")?;
    let pool = Unique::new(device, pool);

    let set_layouts = [*layout];
    let allocate_info = vk::DescriptorSetAllocateInfo::default()
        .descriptor_pool(*pool)
        .set_layouts(&set_layouts);
    let handle = unsafe { device.device.allocate_descriptor_sets(&allocate_info) }
        .context("Could not allocate descriptor set!")?[0];

    Ok(DescriptorSetParameters {
        handle,
        layout,
        pool,
    })
}

/// Combined image sampler binding visible to `stages`
pub fn sampler_binding(binding: u32, stages: vk::ShaderStageFlags) -> vk::DescriptorSetLayoutBinding<'static> {
    vk::DescriptorSetLayoutBinding::default()
        .binding(binding)
        .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
        .descriptor_count(1)
        .stage_flags(stages)
}

/// Point `binding` of `set` at the given images
pub fn update_descriptor_set(
    device: &VulkanDevice,
    set: vk::DescriptorSet,
    descriptor_type: vk::DescriptorType,
    binding: u32,
    array_element: u32,
    image_infos: &[vk::DescriptorImageInfo],
) {
    let write = vk::WriteDescriptorSet::default()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(array_element)
        .descriptor_type(descriptor_type)
        .image_info(image_infos);

    unsafe { device.device.update_descriptor_sets(&[write], &[]) };
}
