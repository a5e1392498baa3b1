// Command pools and buffers
//
// Per-frame pools are created by the sample; `one_time_submit` covers the
// blocking setup work (layout transitions, staging copies).

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::handle::Unique;
use super::sync::{create_fence, wait_for_fence};
use super::VulkanDevice;

/// How long setup submissions may take before giving up (3 s)
pub const SETUP_FENCE_TIMEOUT_NS: u64 = 3_000_000_000;

pub fn create_command_pool(
    device: &Arc<VulkanDevice>,
    flags: vk::CommandPoolCreateFlags,
) -> Result<Unique<vk::CommandPool>> {
    let create_info = vk::CommandPoolCreateInfo::default()
        .flags(flags)
        .queue_family_index(device.graphics_queue.family_index);
    let pool = unsafe { device.device.create_command_pool(&create_info, None) }
        .context("Could not create command pool!")?;
    Ok(Unique::new(device, pool))
}

pub fn allocate_command_buffers(
    device: &VulkanDevice,
    pool: vk::CommandPool,
    level: vk::CommandBufferLevel,
    count: u32,
) -> Result<Vec<vk::CommandBuffer>> {
    let allocate_info = vk::CommandBufferAllocateInfo::default()
        .command_pool(pool)
        .level(level)
        .command_buffer_count(count);
    unsafe { device.device.allocate_command_buffers(&allocate_info) }
        .context("Could not allocate command buffers!")
}

/// Record commands into a throwaway command buffer, submit them on the
/// graphics queue and block until they finish.
pub fn one_time_submit<F>(device: &Arc<VulkanDevice>, record: F) -> Result<()>
where
    F: FnOnce(&ash::Device, vk::CommandBuffer),
{
    let pool = create_command_pool(device, vk::CommandPoolCreateFlags::TRANSIENT)?;
    let command_buffer =
        allocate_command_buffers(device, *pool, vk::CommandBufferLevel::PRIMARY, 1)?[0];

    let begin_info =
        vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

    unsafe {
        device
            .device
            .begin_command_buffer(command_buffer, &begin_info)
            .context("Could not begin command buffer!")?;
        record(&device.device, command_buffer);
        device
            .device
            .end_command_buffer(command_buffer)
            .context("Could not record command buffer!")?;
    }

    let fence = create_fence(device, false)?;
    let command_buffers = [command_buffer];
    let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

    unsafe {
        device
            .device
            .queue_submit(device.graphics_queue.handle, &[submit_info], *fence)
            .context("Failed to submit setup commands")?;
    }

    wait_for_fence(device, *fence, SETUP_FENCE_TIMEOUT_NS)
}
