// Buffer utilities for vertex, index and staging buffers
//
// Memory comes from gpu-allocator. Device-local buffers are filled through a
// temporary CPU-visible staging buffer.

use anyhow::{Context, Result};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme};
use gpu_allocator::MemoryLocation;
use std::sync::Arc;
use super::commands::one_time_submit;
use super::VulkanDevice;

/// Buffer handle plus the memory bound to it
pub struct BufferParameters {
    pub handle: vk::Buffer,
    pub size: vk::DeviceSize,
    allocation: Option<Allocation>,
    device: Arc<VulkanDevice>,
}

impl BufferParameters {
    pub fn new(
        device: &Arc<VulkanDevice>,
        name: &str,
        size: vk::DeviceSize,
        usage: vk::BufferUsageFlags,
        location: MemoryLocation,
    ) -> Result<Self> {
        let buffer_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let handle = unsafe { device.device.create_buffer(&buffer_info, None) }
            .with_context(|| format!("Could not create buffer \"{}\"!", name))?;

        let requirements = unsafe { device.device.get_buffer_memory_requirements(handle) };

        let allocation = device.allocator().allocate(&AllocationCreateDesc {
            name,
            requirements,
            location,
            linear: true,
            allocation_scheme: AllocationScheme::GpuAllocatorManaged,
        });
        let allocation = match allocation {
            Ok(allocation) => allocation,
            Err(e) => {
                unsafe { device.device.destroy_buffer(handle, None) };
                return Err(e).with_context(|| format!("Could not allocate memory for buffer \"{}\"!", name));
            }
        };

        // From here on Drop releases both the handle and the memory
        let buffer = Self {
            handle,
            size,
            allocation: Some(allocation),
            device: device.clone(),
        };

        if let Some(allocation) = &buffer.allocation {
            unsafe {
                device
                    .device
                    .bind_buffer_memory(handle, allocation.memory(), allocation.offset())
            }
            .with_context(|| format!("Could not bind memory to buffer \"{}\"!", name))?;
        }

        Ok(buffer)
    }

    /// Copy `data` into a host-visible buffer at byte `offset`.
    ///
    /// `T` must be plain data without padding (vertex and index types).
    pub fn write<T: Copy>(&mut self, offset: usize, data: &[T]) -> Result<()> {
        let bytes = unsafe {
            std::slice::from_raw_parts(data.as_ptr() as *const u8, std::mem::size_of_val(data))
        };
        let mapped = self
            .allocation
            .as_mut()
            .and_then(|a| a.mapped_slice_mut())
            .context("Buffer memory is not host visible")?;

        let end = offset + bytes.len();
        if end > mapped.len() {
            anyhow::bail!(
                "Write of {} bytes at offset {} exceeds buffer of {} bytes",
                bytes.len(),
                offset,
                mapped.len()
            );
        }

        mapped[offset..end].copy_from_slice(bytes);
        Ok(())
    }
}

impl Drop for BufferParameters {
    fn drop(&mut self) {
        unsafe { self.device.device.destroy_buffer(self.handle, None) };
        if let Some(allocation) = self.allocation.take() {
            if let Err(e) = self.device.allocator().free(allocation) {
                log::warn!("Failed to free buffer memory: {}", e);
            }
        }
    }
}

/// Access and stage scopes describing who touches a resource around a copy
#[derive(Debug, Clone, Copy)]
pub struct AccessScope {
    pub access: vk::AccessFlags,
    pub stages: vk::PipelineStageFlags,
}

impl AccessScope {
    pub const fn new(access: vk::AccessFlags, stages: vk::PipelineStageFlags) -> Self {
        Self { access, stages }
    }
}

/// Upload `data` into `target` at `offset` through a staging buffer.
///
/// `before` describes prior use of the target, `after` the consumer that
/// must see the new contents.
pub fn copy_data_to_buffer<T: bytemuck::Pod>(
    device: &Arc<VulkanDevice>,
    data: &[T],
    target: vk::Buffer,
    offset: vk::DeviceSize,
    before: AccessScope,
    after: AccessScope,
) -> Result<()> {
    let bytes: &[u8] = bytemuck::cast_slice(data);
    let size = bytes.len() as vk::DeviceSize;

    let mut staging = BufferParameters::new(
        device,
        "staging buffer",
        size,
        vk::BufferUsageFlags::TRANSFER_SRC,
        MemoryLocation::CpuToGpu,
    )?;
    staging.write(0, bytes)?;

    one_time_submit(device, |dev, cmd| unsafe {
        let pre_transfer = vk::BufferMemoryBarrier::default()
            .src_access_mask(before.access)
            .dst_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(target)
            .offset(offset)
            .size(size);
        dev.cmd_pipeline_barrier(
            cmd,
            before.stages,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[pre_transfer],
            &[],
        );

        let region = vk::BufferCopy {
            src_offset: 0,
            dst_offset: offset,
            size,
        };
        dev.cmd_copy_buffer(cmd, staging.handle, target, &[region]);

        let post_transfer = vk::BufferMemoryBarrier::default()
            .src_access_mask(vk::AccessFlags::TRANSFER_WRITE)
            .dst_access_mask(after.access)
            .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
            .buffer(target)
            .offset(offset)
            .size(size);
        dev.cmd_pipeline_barrier(
            cmd,
            vk::PipelineStageFlags::TRANSFER,
            after.stages,
            vk::DependencyFlags::empty(),
            &[],
            &[post_transfer],
            &[],
        );
    })
}
