// Owned device handles
//
// Wraps a raw Vulkan handle together with the device that created it so the
// handle is destroyed exactly once, when its owner goes out of scope.

use ash::vk;
use std::ops::Deref;
use std::sync::Arc;
use super::VulkanDevice;

/// A device-level Vulkan object that knows how to destroy itself
pub trait DeviceHandle: Copy {
    /// # Safety
    /// The handle must have been created from `device` and be unused by the GPU.
    unsafe fn destroy(self, device: &ash::Device);
}

macro_rules! device_handle {
    ($($ty:ty => $destroy:ident),* $(,)?) => {
        $(
            impl DeviceHandle for $ty {
                unsafe fn destroy(self, device: &ash::Device) {
                    device.$destroy(self, None);
                }
            }
        )*
    };
}

device_handle! {
    vk::Semaphore => destroy_semaphore,
    vk::Fence => destroy_fence,
    vk::CommandPool => destroy_command_pool,
    vk::Framebuffer => destroy_framebuffer,
    vk::RenderPass => destroy_render_pass,
    vk::PipelineLayout => destroy_pipeline_layout,
    vk::Pipeline => destroy_pipeline,
    vk::ShaderModule => destroy_shader_module,
    vk::Sampler => destroy_sampler,
    vk::ImageView => destroy_image_view,
    vk::DescriptorSetLayout => destroy_descriptor_set_layout,
    vk::DescriptorPool => destroy_descriptor_pool,
}

/// Owning wrapper, destroys the handle on drop
pub struct Unique<T: DeviceHandle> {
    handle: T,
    device: Arc<VulkanDevice>,
}

impl<T: DeviceHandle> Unique<T> {
    pub fn new(device: &Arc<VulkanDevice>, handle: T) -> Self {
        Self {
            handle,
            device: device.clone(),
        }
    }

    pub fn get(&self) -> T {
        self.handle
    }
}

impl<T: DeviceHandle> Deref for Unique<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.handle
    }
}

impl<T: DeviceHandle> Drop for Unique<T> {
    fn drop(&mut self) {
        unsafe { self.handle.destroy(&self.device.device) };
    }
}
