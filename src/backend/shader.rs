// Shader module loading
//
// Vulkan consumes SPIR-V. build.rs compiles shaders/*.vert|frag to .spv next
// to their sources; they are read from disk at start-up.

use anyhow::{Context, Result};
use ash::vk;
use std::path::Path;
use std::sync::Arc;
use super::handle::Unique;
use super::VulkanDevice;

/// Create a shader module from SPIR-V bytes
pub fn create_shader_module_from_bytes(device: &Arc<VulkanDevice>, bytes: &[u8]) -> Result<Unique<vk::ShaderModule>> {
    // read_spv checks the magic number and realigns to u32 words
    let code = ash::util::read_spv(&mut std::io::Cursor::new(bytes))
        .context("Invalid SPIR-V binary")?;

    let create_info = vk::ShaderModuleCreateInfo::default().code(&code);
    let module = unsafe { device.device.create_shader_module(&create_info, None) }
        .context("Could not create shader module!")?;
    Ok(Unique::new(device, module))
}

pub fn create_shader_module(device: &Arc<VulkanDevice>, path: &Path) -> Result<Unique<vk::ShaderModule>> {
    let bytes = crate::tools::get_binary_file_contents(path)?;
    create_shader_module_from_bytes(device, &bytes)
        .with_context(|| format!("Failed to load shader {:?}", path))
}
