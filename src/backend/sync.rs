// Synchronization primitives
//
// Fences for GPU-CPU sync, semaphores for GPU-GPU sync

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::handle::Unique;
use super::VulkanDevice;

pub fn create_semaphore(device: &Arc<VulkanDevice>) -> Result<Unique<vk::Semaphore>> {
    let create_info = vk::SemaphoreCreateInfo::default();
    let semaphore = unsafe { device.device.create_semaphore(&create_info, None) }
        .context("Could not create semaphore!")?;
    Ok(Unique::new(device, semaphore))
}

pub fn create_fence(device: &Arc<VulkanDevice>, signaled: bool) -> Result<Unique<vk::Fence>> {
    let flags = if signaled {
        vk::FenceCreateFlags::SIGNALED
    } else {
        vk::FenceCreateFlags::empty()
    };
    let create_info = vk::FenceCreateInfo::default().flags(flags);
    let fence = unsafe { device.device.create_fence(&create_info, None) }
        .context("Could not create fence!")?;
    Ok(Unique::new(device, fence))
}

/// Wait for a single fence, treating a timeout as an error
pub fn wait_for_fence(device: &VulkanDevice, fence: vk::Fence, timeout_ns: u64) -> Result<()> {
    match unsafe { device.device.wait_for_fences(&[fence], false, timeout_ns) } {
        Ok(()) => Ok(()),
        Err(vk::Result::TIMEOUT) => anyhow::bail!("Waiting for a fence takes too long!"),
        Err(e) => Err(e).context("Failed to wait for fence"),
    }
}
