// Render passes, framebuffers and graphics pipelines
//
// Both the scene and the GUI pipelines are built from one description; only
// vertex input, depth testing and blending differ between them.
// Viewport and scissor are always dynamic so pipelines survive window resizes.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use super::handle::Unique;
use super::VulkanDevice;

/// One render pass attachment, single-sampled with stencil ignored
#[derive(Debug, Clone, Copy)]
pub struct RenderPassAttachmentData {
    pub format: vk::Format,
    pub load_op: vk::AttachmentLoadOp,
    pub store_op: vk::AttachmentStoreOp,
    pub initial_layout: vk::ImageLayout,
    pub final_layout: vk::ImageLayout,
}

impl RenderPassAttachmentData {
    pub fn description(&self) -> vk::AttachmentDescription {
        vk::AttachmentDescription::default()
            .format(self.format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(self.load_op)
            .store_op(self.store_op)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(self.initial_layout)
            .final_layout(self.final_layout)
    }
}

#[derive(Debug, Clone, Default)]
pub struct RenderPassSubpassData {
    pub input_attachments: Vec<vk::AttachmentReference>,
    pub color_attachments: Vec<vk::AttachmentReference>,
    pub depth_stencil_attachment: Option<vk::AttachmentReference>,
}

pub fn create_render_pass(
    device: &Arc<VulkanDevice>,
    attachments: &[RenderPassAttachmentData],
    subpasses: &[RenderPassSubpassData],
    dependencies: &[vk::SubpassDependency],
) -> Result<Unique<vk::RenderPass>> {
    let attachment_descriptions: Vec<_> = attachments.iter().map(|a| a.description()).collect();

    let subpass_descriptions: Vec<_> = subpasses
        .iter()
        .map(|subpass| {
            let description = vk::SubpassDescription::default()
                .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
                .input_attachments(&subpass.input_attachments)
                .color_attachments(&subpass.color_attachments);
            match &subpass.depth_stencil_attachment {
                Some(depth) => description.depth_stencil_attachment(depth),
                None => description,
            }
        })
        .collect();

    let create_info = vk::RenderPassCreateInfo::default()
        .attachments(&attachment_descriptions)
        .subpasses(&subpass_descriptions)
        .dependencies(dependencies);

    let render_pass = unsafe { device.device.create_render_pass(&create_info, None) }
        .context("Could not create render pass!")?;
    Ok(Unique::new(device, render_pass))
}

pub fn create_framebuffer(
    device: &Arc<VulkanDevice>,
    views: &[vk::ImageView],
    extent: vk::Extent2D,
    render_pass: vk::RenderPass,
) -> Result<Unique<vk::Framebuffer>> {
    let create_info = vk::FramebufferCreateInfo::default()
        .render_pass(render_pass)
        .attachments(views)
        .width(extent.width)
        .height(extent.height)
        .layers(1);

    let framebuffer = unsafe { device.device.create_framebuffer(&create_info, None) }
        .context("Could not create a framebuffer!")?;
    Ok(Unique::new(device, framebuffer))
}

pub fn create_pipeline_layout(
    device: &Arc<VulkanDevice>,
    set_layouts: &[vk::DescriptorSetLayout],
    push_constant_ranges: &[vk::PushConstantRange],
) -> Result<Unique<vk::PipelineLayout>> {
    let create_info = vk::PipelineLayoutCreateInfo::default()
        .set_layouts(set_layouts)
        .push_constant_ranges(push_constant_ranges);

    let layout = unsafe { device.device.create_pipeline_layout(&create_info, None) }
        .context("Could not create pipeline layout!")?;
    Ok(Unique::new(device, layout))
}

/// Fixed-function and shader setup of a graphics pipeline
pub struct GraphicsPipelineDesc<'a> {
    pub vertex_shader: vk::ShaderModule,
    pub fragment_shader: vk::ShaderModule,
    pub vertex_bindings: &'a [vk::VertexInputBindingDescription],
    pub vertex_attributes: &'a [vk::VertexInputAttributeDescription],
    pub cull_mode: vk::CullModeFlags,
    pub front_face: vk::FrontFace,
    /// Depth test and write with LESS_OR_EQUAL
    pub depth_test: bool,
    /// `None` disables blending
    pub blend: Option<vk::PipelineColorBlendAttachmentState>,
    pub layout: vk::PipelineLayout,
    pub render_pass: vk::RenderPass,
}

/// Standard "over" alpha blending
pub fn alpha_blend_state() -> vk::PipelineColorBlendAttachmentState {
    vk::PipelineColorBlendAttachmentState::default()
        .blend_enable(true)
        .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
        .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
        .color_blend_op(vk::BlendOp::ADD)
        .src_alpha_blend_factor(vk::BlendFactor::ONE)
        .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
        .alpha_blend_op(vk::BlendOp::ADD)
        .color_write_mask(vk::ColorComponentFlags::RGBA)
}

pub fn create_graphics_pipeline(
    device: &Arc<VulkanDevice>,
    desc: &GraphicsPipelineDesc<'_>,
) -> Result<Unique<vk::Pipeline>> {
    let shader_stages = [
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::VERTEX)
            .module(desc.vertex_shader)
            .name(c"main"),
        vk::PipelineShaderStageCreateInfo::default()
            .stage(vk::ShaderStageFlags::FRAGMENT)
            .module(desc.fragment_shader)
            .name(c"main"),
    ];

    let vertex_input = vk::PipelineVertexInputStateCreateInfo::default()
        .vertex_binding_descriptions(desc.vertex_bindings)
        .vertex_attribute_descriptions(desc.vertex_attributes);

    let input_assembly = vk::PipelineInputAssemblyStateCreateInfo::default()
        .topology(vk::PrimitiveTopology::TRIANGLE_LIST)
        .primitive_restart_enable(false);

    // Set per frame with cmd_set_viewport / cmd_set_scissor
    let viewport_state = vk::PipelineViewportStateCreateInfo::default()
        .viewport_count(1)
        .scissor_count(1);

    let rasterizer = vk::PipelineRasterizationStateCreateInfo::default()
        .depth_clamp_enable(false)
        .rasterizer_discard_enable(false)
        .polygon_mode(vk::PolygonMode::FILL)
        .cull_mode(desc.cull_mode)
        .front_face(desc.front_face)
        .depth_bias_enable(false)
        .line_width(1.0);

    let multisampling = vk::PipelineMultisampleStateCreateInfo::default()
        .sample_shading_enable(false)
        .rasterization_samples(vk::SampleCountFlags::TYPE_1);

    let depth_stencil = vk::PipelineDepthStencilStateCreateInfo::default()
        .depth_test_enable(desc.depth_test)
        .depth_write_enable(desc.depth_test)
        .depth_compare_op(vk::CompareOp::LESS_OR_EQUAL)
        .depth_bounds_test_enable(false)
        .stencil_test_enable(false);

    let color_blend_attachments = [desc.blend.unwrap_or_else(|| {
        vk::PipelineColorBlendAttachmentState::default()
            .blend_enable(false)
            .color_write_mask(vk::ColorComponentFlags::RGBA)
    })];
    let color_blending = vk::PipelineColorBlendStateCreateInfo::default()
        .logic_op_enable(false)
        .attachments(&color_blend_attachments);

    let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
    let dynamic_state = vk::PipelineDynamicStateCreateInfo::default().dynamic_states(&dynamic_states);

    let pipeline_info = vk::GraphicsPipelineCreateInfo::default()
        .stages(&shader_stages)
        .vertex_input_state(&vertex_input)
        .input_assembly_state(&input_assembly)
        .viewport_state(&viewport_state)
        .rasterization_state(&rasterizer)
        .multisample_state(&multisampling)
        .depth_stencil_state(&depth_stencil)
        .color_blend_state(&color_blending)
        .dynamic_state(&dynamic_state)
        .layout(desc.layout)
        .render_pass(desc.render_pass)
        .subpass(0);

    let pipelines = unsafe {
        device
            .device
            .create_graphics_pipelines(vk::PipelineCache::null(), &[pipeline_info], None)
    }
    .map_err(|(_, e)| e)
    .context("Could not create graphics pipeline!")?;

    Ok(Unique::new(device, pipelines[0]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attachment_ignores_stencil() {
        let data = RenderPassAttachmentData {
            format: vk::Format::D16_UNORM,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        };
        let description = data.description();

        assert_eq!(description.format, vk::Format::D16_UNORM);
        assert_eq!(description.samples, vk::SampleCountFlags::TYPE_1);
        assert_eq!(description.stencil_load_op, vk::AttachmentLoadOp::DONT_CARE);
        assert_eq!(description.stencil_store_op, vk::AttachmentStoreOp::DONT_CARE);
    }

    #[test]
    fn alpha_blending_is_over_operator() {
        let blend = alpha_blend_state();
        assert_eq!(blend.blend_enable, vk::TRUE);
        assert_eq!(blend.src_color_blend_factor, vk::BlendFactor::SRC_ALPHA);
        assert_eq!(blend.dst_color_blend_factor, vk::BlendFactor::ONE_MINUS_SRC_ALPHA);
        assert_eq!(blend.dst_alpha_blend_factor, vk::BlendFactor::ZERO);
    }
}
