// Frame resources - everything one frame in flight needs
//
// The sample keeps a fixed pool of these and cycles through the first
// `resource_count` of them. While the GPU still works on one slot the CPU can
// already record into the next.

use anyhow::Result;
use ash::vk;
use std::sync::Arc;

use crate::backend::commands::{allocate_command_buffers, create_command_pool};
use crate::backend::handle::Unique;
use crate::backend::image::ImageParameters;
use crate::backend::sync::{create_fence, create_semaphore};
use crate::backend::VulkanDevice;

pub struct FrameResources {
    pub image_available: Unique<vk::Semaphore>,
    pub finished_rendering: Unique<vk::Semaphore>,
    /// Signaled once the GPU is done with this slot; created signaled
    pub fence: Unique<vk::Fence>,
    // The framebuffer references the depth view, so it goes first
    pub framebuffer: Option<Unique<vk::Framebuffer>>,
    pub depth_attachment: Option<ImageParameters>,
    /// Sample commands, submitted right after acquire
    pub pre_command_buffer: vk::CommandBuffer,
    /// GUI commands, submitted together with the present
    pub post_command_buffer: vk::CommandBuffer,
    // Freed with the pool
    pub command_pool: Unique<vk::CommandPool>,
}

impl FrameResources {
    pub fn new(device: &Arc<VulkanDevice>) -> Result<Self> {
        let command_pool = create_command_pool(
            device,
            vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER | vk::CommandPoolCreateFlags::TRANSIENT,
        )?;
        let command_buffers =
            allocate_command_buffers(device, *command_pool, vk::CommandBufferLevel::PRIMARY, 2)?;

        Ok(Self {
            image_available: create_semaphore(device)?,
            finished_rendering: create_semaphore(device)?,
            fence: create_fence(device, true)?,
            framebuffer: None,
            depth_attachment: None,
            pre_command_buffer: command_buffers[0],
            post_command_buffer: command_buffers[1],
            command_pool,
        })
    }

    pub fn create_pool(device: &Arc<VulkanDevice>, size: usize) -> Result<Vec<Self>> {
        (0..size).map(|_| Self::new(device)).collect()
    }
}

/// Which pool slot and which swapchain image the current frame uses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CurrentFrame {
    pub resource_index: usize,
    pub resource_count: usize,
    pub image_index: u32,
}

impl CurrentFrame {
    pub fn new(resource_count: usize) -> Self {
        Self {
            resource_index: 0,
            resource_count: resource_count.max(1),
            image_index: 0,
        }
    }

    /// Move to the next slot among the active ones
    pub fn advance(&mut self) {
        self.resource_index = next_resource_index(self.resource_index, self.resource_count);
    }
}

pub fn next_resource_index(current: usize, count: usize) -> usize {
    (current + 1) % count.max(1)
}

/// Number of slots to cycle: `requested` clamped to `1..=pool_size`
pub fn frame_resources_in_use(requested: usize, pool_size: usize) -> usize {
    requested.clamp(1, pool_size.max(1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn index_wraps_at_count() {
        assert_eq!(next_resource_index(0, 3), 1);
        assert_eq!(next_resource_index(2, 3), 0);
        assert_eq!(next_resource_index(0, 1), 0);
    }

    #[test]
    fn shrinking_count_pulls_index_back_into_range() {
        // Index 4 from a pool of five, count lowered to two
        assert_eq!(next_resource_index(4, 2), 1);
    }

    #[test]
    fn current_frame_cycles_active_slots() {
        let mut frame = CurrentFrame::new(3);
        let visited: Vec<usize> = (0..6)
            .map(|_| {
                frame.advance();
                frame.resource_index
            })
            .collect();
        assert_eq!(visited, vec![1, 2, 0, 1, 2, 0]);
    }

    #[test]
    fn zero_count_is_treated_as_one() {
        let mut frame = CurrentFrame::new(0);
        frame.advance();
        assert_eq!(frame.resource_index, 0);
    }

    #[test]
    fn requested_count_is_clamped_to_pool() {
        assert_eq!(frame_resources_in_use(0, 5), 1);
        assert_eq!(frame_resources_in_use(3, 5), 3);
        assert_eq!(frame_resources_in_use(9, 5), 5);
    }
}
