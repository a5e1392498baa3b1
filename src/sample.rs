// Frame resources count sample
//
// Draws many instanced, textured quads over a background and lets the user
// change how many frame resource sets are cycled. With one set the CPU waits
// for the GPU every frame; with more, recording of the next frame overlaps
// with GPU work on the previous ones. Artificial CPU work before and after
// submission makes the difference visible in the frame time readouts.

use anyhow::{Context, Result};
use ash::vk;
use bytemuck::{Pod, Zeroable};
use gpu_allocator::MemoryLocation;
use imgui::{Condition, WindowFlags};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use winit::window::Window;

use crate::backend::buffer::{copy_data_to_buffer, AccessScope, BufferParameters};
use crate::backend::descriptor::{
    create_descriptor_resources, sampler_binding, update_descriptor_set, DescriptorSetParameters,
};
use crate::backend::handle::Unique;
use crate::backend::image::{
    copy_data_to_image, create_sampler, set_image_memory_barrier, subresource_range, ImageParameters,
    ImageTransition, SamplerDesc,
};
use crate::backend::pipeline::{
    create_graphics_pipeline, create_pipeline_layout, create_render_pass, GraphicsPipelineDesc,
    RenderPassAttachmentData, RenderPassSubpassData,
};
use crate::backend::shader::create_shader_module;
use crate::backend::VulkanDevice;
use crate::config::{Config, MAX_CPU_WORK_MS, MIN_OBJECTS, OBJECTS_STEP};
use crate::gui::Gui;
use crate::input::MouseState;
use crate::sample_common::SampleCommon;
use crate::tools::{get_image_data_or_placeholder, ImageData};

pub const DEPTH_FORMAT: vk::Format = vk::Format::D16_UNORM;
pub const QUAD_TESSELLATION: u32 = 40;
pub const QUAD_SIZE: f32 = 0.12;

/// Weights of the previous value and the new sample in the frame time averages
const AVERAGE_WEIGHT: f32 = 0.99;
const AVERAGE_SAMPLE_WEIGHT: f32 = 0.01;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct VertexData {
    pub position: [f32; 4],
    pub texcoords: [f32; 2],
}

/// Per-instance offset; xy in clip space, z is depth
pub type InstanceData = [f32; 4];

/// Values controlled through the GUI plus the measured frame times
#[derive(Debug, Clone, PartialEq)]
pub struct SampleParameters {
    pub objects_count: u32,
    pub max_objects: u32,
    pub frame_resources_count: usize,
    pub pre_submit_cpu_work_ms: u32,
    pub post_submit_cpu_work_ms: u32,
    /// Milliseconds spent between acquire and GUI submission, averaged
    pub frame_generation_time: f32,
    /// Milliseconds for the whole frame, averaged
    pub total_frame_time: f32,
}

impl SampleParameters {
    pub fn from_config(config: &Config) -> Self {
        Self {
            objects_count: config.sample.objects_count,
            max_objects: config.sample.max_objects,
            frame_resources_count: config.sample.frame_resources_count,
            pre_submit_cpu_work_ms: config.sample.pre_submit_cpu_work_ms,
            post_submit_cpu_work_ms: config.sample.post_submit_cpu_work_ms,
            frame_generation_time: 0.0,
            total_frame_time: 0.0,
        }
    }
}

pub struct FrameResourcesSample {
    title: String,
    hardware: String,
    parameters: SampleParameters,
    gui: Gui,
    instance_buffer: BufferParameters,
    vertex_buffer: BufferParameters,
    pipeline: Unique<vk::Pipeline>,
    pipeline_layout: Unique<vk::PipelineLayout>,
    descriptor_set: DescriptorSetParameters,
    _background_texture: ImageParameters,
    _object_texture: ImageParameters,
    post_render_pass: Unique<vk::RenderPass>,
    render_pass: Unique<vk::RenderPass>,
    // Owns the device and swapchain; dropped last
    common: SampleCommon,
}

impl FrameResourcesSample {
    pub fn new(window: &Window, config: &Config) -> Result<Self> {
        let common = SampleCommon::new(window, config)?;
        let device = common.device().clone();
        let color_format = common.vulkan().format()?;

        log::info!("Preparing sample on {}", device.physical_device_name);

        let render_pass = create_render_pass(
            &device,
            &main_pass_attachments(color_format),
            &[color_depth_subpass()],
            &attachment_dependencies(),
        )?;
        let post_render_pass = create_render_pass(
            &device,
            &post_pass_attachments(color_format),
            &[color_depth_subpass()],
            &attachment_dependencies(),
        )?;

        let descriptor_set = create_descriptor_resources(
            &device,
            &[
                sampler_binding(0, vk::ShaderStageFlags::FRAGMENT),
                sampler_binding(1, vk::ShaderStageFlags::FRAGMENT),
            ],
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 2,
            }],
        )?;

        let data_dir = &config.assets.data_dir;
        let background_texture = create_texture(
            &device,
            "background texture",
            &get_image_data_or_placeholder(&data_dir.join("Common").join("Background.png"), [40, 60, 90, 255]),
        )?;
        let object_texture = create_texture(
            &device,
            "object texture",
            &get_image_data_or_placeholder(&data_dir.join("01").join("FrameResources.png"), [230, 120, 30, 255]),
        )?;
        bind_texture(&device, &descriptor_set, 0, &background_texture)?;
        bind_texture(&device, &descriptor_set, 1, &object_texture)?;

        let pipeline_layout = create_pipeline_layout(
            &device,
            &[*descriptor_set.layout],
            &[vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::VERTEX,
                offset: 0,
                size: std::mem::size_of::<f32>() as u32,
            }],
        )?;

        let pipeline = create_sample_pipeline(
            &device,
            &config.assets.shader_dir,
            *pipeline_layout,
            *render_pass,
        )?;

        let parameters = SampleParameters::from_config(config);

        let vertex_data = quad_vertices(QUAD_TESSELLATION, QUAD_SIZE);
        let vertex_buffer = create_device_local_buffer(&device, "vertex buffer", &vertex_data)?;

        let mut rng = match config.sample.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let instance_data = instance_offsets(parameters.max_objects as usize, &mut rng);
        let instance_buffer = create_device_local_buffer(&device, "instance buffer", &instance_data)?;

        let gui = Gui::new(
            &device,
            common.vulkan().extent(),
            common.frame_resources_pool_size(),
            *post_render_pass,
            &config.assets.shader_dir,
        )?;

        let mut sample = Self {
            title: config.window.title.clone(),
            hardware: device.physical_device_name.clone(),
            parameters,
            gui,
            instance_buffer,
            vertex_buffer,
            pipeline,
            pipeline_layout,
            descriptor_set,
            _background_texture: background_texture,
            _object_texture: object_texture,
            post_render_pass,
            render_pass,
            common,
        };

        if sample.common.can_render() {
            sample.on_sample_window_size_changed_post()?;
        }

        log::info!(
            "Sample ready: {} objects, {} of {} frame resources",
            sample.parameters.objects_count,
            sample.parameters.frame_resources_count,
            sample.common.frame_resources_pool_size()
        );
        Ok(sample)
    }

    pub fn ready_to_draw(&self) -> bool {
        self.common.can_render()
    }

    pub fn mouse_mut(&mut self) -> &mut MouseState {
        self.common.mouse_mut()
    }

    pub fn draw(&mut self) -> Result<()> {
        self.common
            .set_frame_resources_count(self.parameters.frame_resources_count);

        let frame_begin = Instant::now();

        let title = self.title.as_str();
        let hardware = self.hardware.as_str();
        let pool_size = self.common.frame_resources_pool_size();
        let parameters = &mut self.parameters;
        self.common.start_frame(&mut self.gui, |ui| {
            prepare_gui_frame(ui, title, hardware, pool_size, parameters)
        })?;

        if !self.common.acquire_image(*self.render_pass)? {
            self.gui.discard_frame();
            return self.on_window_size_changed();
        }

        let generation_begin = Instant::now();
        self.common
            .perform_hardcore_calculations(self.parameters.pre_submit_cpu_work_ms);
        self.draw_sample()?;
        self.common
            .perform_hardcore_calculations(self.parameters.post_submit_cpu_work_ms);
        self.parameters.frame_generation_time = moving_average(
            self.parameters.frame_generation_time,
            elapsed_ms(generation_begin),
        );

        let recreate = self.common.finish_frame(&mut self.gui, *self.post_render_pass)?;

        self.parameters.total_frame_time =
            moving_average(self.parameters.total_frame_time, elapsed_ms(frame_begin));

        if recreate {
            self.on_window_size_changed()?;
        }
        Ok(())
    }

    /// Record and submit the scene into the current frame's pre command buffer
    fn draw_sample(&self) -> Result<()> {
        let device = self.common.device();
        let extent = self.common.vulkan().extent();
        let frame = self.common.current_resources()?;
        let framebuffer = frame
            .framebuffer
            .as_ref()
            .context("Framebuffer missing for frame")?;
        let command_buffer = frame.pre_command_buffer;

        let clear_values = [
            vk::ClearValue {
                color: vk::ClearColorValue {
                    float32: [0.0, 0.0, 0.0, 1.0],
                },
            },
            vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth: 1.0, stencil: 0 },
            },
        ];
        let render_area = vk::Rect2D {
            offset: vk::Offset2D::default(),
            extent,
        };
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(*self.render_pass)
            .framebuffer(**framebuffer)
            .render_area(render_area)
            .clear_values(&clear_values);

        let viewport = vk::Viewport {
            x: 0.0,
            y: 0.0,
            width: extent.width as f32,
            height: extent.height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        };
        let scaling_factor = extent.width as f32 / extent.height as f32;
        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        unsafe {
            let d = &device.device;
            d.begin_command_buffer(command_buffer, &begin_info)
                .context("Could not begin sample command buffer!")?;
            d.cmd_begin_render_pass(command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
            d.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, *self.pipeline);
            d.cmd_set_viewport(command_buffer, 0, &[viewport]);
            d.cmd_set_scissor(command_buffer, 0, &[render_area]);
            d.cmd_bind_vertex_buffers(
                command_buffer,
                0,
                &[self.vertex_buffer.handle, self.instance_buffer.handle],
                &[0, 0],
            );
            d.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                *self.pipeline_layout,
                0,
                &[self.descriptor_set.handle],
                &[],
            );
            d.cmd_push_constants(
                command_buffer,
                *self.pipeline_layout,
                vk::ShaderStageFlags::VERTEX,
                0,
                bytemuck::bytes_of(&scaling_factor),
            );
            d.cmd_draw(
                command_buffer,
                6 * QUAD_TESSELLATION * QUAD_TESSELLATION,
                self.parameters.objects_count,
                0,
                0,
            );
            d.cmd_end_render_pass(command_buffer);
            d.end_command_buffer(command_buffer)
                .context("Could not record sample command buffer!")?;
        }

        let wait_semaphores = [*frame.image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers);

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue.handle, &[submit_info], vk::Fence::null())
                .context("Could not submit sample command buffer!")
        }
    }

    /// Recreate the swapchain and everything sized after it
    pub fn on_window_size_changed(&mut self) -> Result<()> {
        if self.common.on_window_size_changed()? {
            self.gui.on_window_size_changed(self.common.vulkan().extent());
            self.on_sample_window_size_changed_post()?;
        }
        Ok(())
    }

    /// New depth attachments for every frame and swapchain images moved to PRESENT_SRC
    fn on_sample_window_size_changed_post(&mut self) -> Result<()> {
        let device = self.common.device().clone();
        let extent = self.common.vulkan().extent();

        for frame in self.common.frame_resources_mut() {
            // The framebuffer still points at the old depth view
            frame.framebuffer = None;
            frame.depth_attachment = None;

            let depth = ImageParameters::new(
                &device,
                "depth attachment",
                extent,
                DEPTH_FORMAT,
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
                vk::ImageAspectFlags::DEPTH,
            )?;
            set_image_memory_barrier(
                &device,
                depth.handle,
                subresource_range(vk::ImageAspectFlags::DEPTH),
                ImageTransition {
                    old_layout: vk::ImageLayout::UNDEFINED,
                    before: AccessScope::new(vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
                    new_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                    after: AccessScope::new(
                        vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
                        vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
                    ),
                },
            )?;
            frame.depth_attachment = Some(depth);
        }

        let images = self.common.vulkan().swapchain()?.images.clone();
        for image in images {
            set_image_memory_barrier(
                &device,
                image,
                subresource_range(vk::ImageAspectFlags::COLOR),
                ImageTransition {
                    old_layout: vk::ImageLayout::UNDEFINED,
                    before: AccessScope::new(vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
                    new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                    after: AccessScope::new(vk::AccessFlags::MEMORY_READ, vk::PipelineStageFlags::BOTTOM_OF_PIPE),
                },
            )?;
        }

        log::debug!("Frame attachments resized to {}x{}", extent.width, extent.height);
        Ok(())
    }
}

impl Drop for FrameResourcesSample {
    fn drop(&mut self) {
        if let Err(e) = self.common.device().wait_idle() {
            log::error!("Failed to wait for the device before cleanup: {:#}", e);
        }
    }
}

// =============================================================================
// GUI
// =============================================================================

fn prepare_gui_frame(
    ui: &imgui::Ui,
    title: &str,
    hardware: &str,
    pool_size: usize,
    parameters: &mut SampleParameters,
) {
    ui.window(title)
        .position([20.0, 20.0], Condition::Always)
        .flags(WindowFlags::ALWAYS_AUTO_RESIZE)
        .build(|| {
            ui.text(format!("Hardware: {}", hardware));
            ui.new_line();

            let mut objects = parameters.objects_count;
            if ui.slider("Scene complexity", MIN_OBJECTS, parameters.max_objects, &mut objects) {
                parameters.objects_count =
                    snap_to_step(objects, MIN_OBJECTS, OBJECTS_STEP, parameters.max_objects);
            }

            let mut frame_resources = parameters.frame_resources_count as u32;
            if ui.slider("Frame resources count", 1, pool_size as u32, &mut frame_resources) {
                parameters.frame_resources_count = frame_resources as usize;
            }

            ui.slider(
                "Pre-submit CPU work time [ms]",
                0,
                MAX_CPU_WORK_MS,
                &mut parameters.pre_submit_cpu_work_ms,
            );
            ui.slider(
                "Post-submit CPU work time [ms]",
                0,
                MAX_CPU_WORK_MS,
                &mut parameters.post_submit_cpu_work_ms,
            );

            ui.new_line();
            ui.text(format!("Frame generation time: {:5.2} ms", parameters.frame_generation_time));
            ui.text(format!("Total frame time: {:5.2} ms", parameters.total_frame_time));
        });
}

// =============================================================================
// RESOURCE CREATION
// =============================================================================

/// Color attachment written from scratch, depth cleared
pub fn main_pass_attachments(color_format: vk::Format) -> [RenderPassAttachmentData; 2] {
    [
        RenderPassAttachmentData {
            format: color_format,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            final_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        },
        RenderPassAttachmentData {
            format: DEPTH_FORMAT,
            load_op: vk::AttachmentLoadOp::CLEAR,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        },
    ]
}

/// Color attachment kept for the GUI overlay and handed to presentation
pub fn post_pass_attachments(color_format: vk::Format) -> [RenderPassAttachmentData; 2] {
    [
        RenderPassAttachmentData {
            format: color_format,
            load_op: vk::AttachmentLoadOp::LOAD,
            store_op: vk::AttachmentStoreOp::STORE,
            initial_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
            final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
        },
        RenderPassAttachmentData {
            format: DEPTH_FORMAT,
            load_op: vk::AttachmentLoadOp::DONT_CARE,
            store_op: vk::AttachmentStoreOp::DONT_CARE,
            initial_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
            final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        },
    ]
}

fn color_depth_subpass() -> RenderPassSubpassData {
    RenderPassSubpassData {
        input_attachments: Vec::new(),
        color_attachments: vec![vk::AttachmentReference {
            attachment: 0,
            layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }],
        depth_stencil_attachment: Some(vk::AttachmentReference {
            attachment: 1,
            layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
        }),
    }
}

/// Color writes of earlier and later passes are ordered against this one
pub fn attachment_dependencies() -> [vk::SubpassDependency; 2] {
    let dependency = |src_subpass, dst_subpass| vk::SubpassDependency {
        src_subpass,
        dst_subpass,
        src_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        dst_stage_mask: vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT,
        src_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dst_access_mask: vk::AccessFlags::COLOR_ATTACHMENT_WRITE,
        dependency_flags: vk::DependencyFlags::BY_REGION,
    };
    [dependency(vk::SUBPASS_EXTERNAL, 0), dependency(0, vk::SUBPASS_EXTERNAL)]
}

/// Binding 0 per vertex, binding 1 per instance
pub fn vertex_input_description() -> (
    [vk::VertexInputBindingDescription; 2],
    [vk::VertexInputAttributeDescription; 3],
) {
    let bindings = [
        vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<VertexData>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        },
        vk::VertexInputBindingDescription {
            binding: 1,
            stride: std::mem::size_of::<InstanceData>() as u32,
            input_rate: vk::VertexInputRate::INSTANCE,
        },
    ];
    let attributes = [
        vk::VertexInputAttributeDescription {
            location: 0,
            binding: 0,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: std::mem::offset_of!(VertexData, position) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 1,
            binding: 0,
            format: vk::Format::R32G32_SFLOAT,
            offset: std::mem::offset_of!(VertexData, texcoords) as u32,
        },
        vk::VertexInputAttributeDescription {
            location: 2,
            binding: 1,
            format: vk::Format::R32G32B32A32_SFLOAT,
            offset: 0,
        },
    ];
    (bindings, attributes)
}

fn create_sample_pipeline(
    device: &Arc<VulkanDevice>,
    shader_dir: &Path,
    layout: vk::PipelineLayout,
    render_pass: vk::RenderPass,
) -> Result<Unique<vk::Pipeline>> {
    let vertex_shader = create_shader_module(device, &shader_dir.join("sample.vert.spv"))?;
    let fragment_shader = create_shader_module(device, &shader_dir.join("sample.frag.spv"))?;
    let (vertex_bindings, vertex_attributes) = vertex_input_description();

    create_graphics_pipeline(
        device,
        &GraphicsPipelineDesc {
            vertex_shader: *vertex_shader,
            fragment_shader: *fragment_shader,
            vertex_bindings: &vertex_bindings,
            vertex_attributes: &vertex_attributes,
            cull_mode: vk::CullModeFlags::BACK,
            front_face: vk::FrontFace::COUNTER_CLOCKWISE,
            depth_test: true,
            blend: None,
            layout,
            render_pass,
        },
    )
}

fn create_texture(device: &Arc<VulkanDevice>, name: &str, image: &ImageData) -> Result<ImageParameters> {
    let extent = vk::Extent2D {
        width: image.width,
        height: image.height,
    };
    let mut texture = ImageParameters::new(
        device,
        name,
        extent,
        vk::Format::R8G8B8A8_UNORM,
        vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
        vk::ImageAspectFlags::COLOR,
    )?;

    copy_data_to_image(
        device,
        texture.handle,
        extent,
        &image.pixels,
        subresource_range(vk::ImageAspectFlags::COLOR),
        ImageTransition {
            old_layout: vk::ImageLayout::UNDEFINED,
            before: AccessScope::new(vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            after: AccessScope::new(vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER),
        },
    )?;

    texture.sampler = Some(create_sampler(device, &SamplerDesc::default())?);
    log::debug!("Loaded {} ({}x{})", name, image.width, image.height);
    Ok(texture)
}

fn bind_texture(
    device: &VulkanDevice,
    set: &DescriptorSetParameters,
    binding: u32,
    texture: &ImageParameters,
) -> Result<()> {
    let sampler = texture.sampler.as_ref().context("Texture has no sampler")?;
    update_descriptor_set(
        device,
        set.handle,
        vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
        binding,
        0,
        &[vk::DescriptorImageInfo {
            sampler: sampler.get(),
            image_view: texture.view,
            image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }],
    );
    Ok(())
}

fn create_device_local_buffer<T: Pod>(
    device: &Arc<VulkanDevice>,
    name: &str,
    data: &[T],
) -> Result<BufferParameters> {
    let buffer = BufferParameters::new(
        device,
        name,
        std::mem::size_of_val(data) as vk::DeviceSize,
        vk::BufferUsageFlags::TRANSFER_DST | vk::BufferUsageFlags::VERTEX_BUFFER,
        MemoryLocation::GpuOnly,
    )?;
    copy_data_to_buffer(
        device,
        data,
        buffer.handle,
        0,
        AccessScope::new(vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
        AccessScope::new(vk::AccessFlags::VERTEX_ATTRIBUTE_READ, vk::PipelineStageFlags::VERTEX_INPUT),
    )?;
    Ok(buffer)
}

// =============================================================================
// GEOMETRY AND HELPERS
// =============================================================================

/// A square of side `2 * size` centred at the origin, split into
/// `tessellation`² cells of two triangles each
pub fn quad_vertices(tessellation: u32, size: f32) -> Vec<VertexData> {
    let step = 2.0 * size / tessellation as f32;
    let uv = |i: u32| i as f32 / tessellation as f32;
    let mut vertices = Vec::with_capacity((6 * tessellation * tessellation) as usize);

    for x in 0..tessellation {
        for y in 0..tessellation {
            let pos_x = -size + x as f32 * step;
            let pos_y = -size + y as f32 * step;
            let vertex = |px: f32, py: f32, u: f32, v: f32| VertexData {
                position: [px, py, 0.0, 1.0],
                texcoords: [u, v],
            };

            vertices.extend_from_slice(&[
                vertex(pos_x, pos_y, uv(x), uv(y)),
                vertex(pos_x, pos_y + step, uv(x), uv(y + 1)),
                vertex(pos_x + step, pos_y, uv(x + 1), uv(y)),
                vertex(pos_x + step, pos_y, uv(x + 1), uv(y)),
                vertex(pos_x, pos_y + step, uv(x), uv(y + 1)),
                vertex(pos_x + step, pos_y + step, uv(x + 1), uv(y + 1)),
            ]);
        }
    }
    vertices
}

/// Random offsets: x and y in [-1, 1] on a 1/256 grid, depth in [0, 1] on a 1/512 grid
pub fn instance_offsets<R: Rng>(count: usize, rng: &mut R) -> Vec<InstanceData> {
    (0..count)
        .map(|_| {
            let x = rng.gen_range(0..513) as f32 / 256.0 - 1.0;
            let y = rng.gen_range(0..513) as f32 / 256.0 - 1.0;
            let z = rng.gen_range(0..513) as f32 / 512.0;
            [x, y, z, 0.0]
        })
        .collect()
}

/// Exponential moving average used for the frame time readouts
pub fn moving_average(previous: f32, sample: f32) -> f32 {
    previous * AVERAGE_WEIGHT + sample * AVERAGE_SAMPLE_WEIGHT
}

/// Round `value` to the nearest `min + k * step` that does not exceed `max`
pub fn snap_to_step(value: u32, min: u32, step: u32, max: u32) -> u32 {
    if step == 0 || value <= min {
        return min.min(max);
    }
    let steps = (value - min + step / 2) / step;
    let max_steps = max.saturating_sub(min) / step;
    min + steps.min(max_steps) * step
}

fn elapsed_ms(since: Instant) -> f32 {
    since.elapsed().as_secs_f32() * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn vertex_layout_matches_shader_inputs() {
        let (bindings, attributes) = vertex_input_description();
        assert_eq!(bindings[0].stride, 24);
        assert_eq!(bindings[1].stride, 16);
        assert_eq!(bindings[1].input_rate, vk::VertexInputRate::INSTANCE);
        assert_eq!(attributes[1].offset, 16);
        assert_eq!(attributes[2].binding, 1);
    }

    #[test]
    fn quad_has_six_vertices_per_cell() {
        let vertices = quad_vertices(QUAD_TESSELLATION, QUAD_SIZE);
        assert_eq!(vertices.len(), (6 * QUAD_TESSELLATION * QUAD_TESSELLATION) as usize);
    }

    #[test]
    fn quad_spans_size_in_both_directions() {
        let vertices = quad_vertices(4, 0.5);
        let first = vertices[0];
        let last = vertices[vertices.len() - 1];

        assert_eq!(first.position, [-0.5, -0.5, 0.0, 1.0]);
        assert_eq!(first.texcoords, [0.0, 0.0]);
        assert_relative_eq!(last.position[0], 0.5);
        assert_relative_eq!(last.position[1], 0.5);
        assert_relative_eq!(last.texcoords[0], 1.0);
        assert_relative_eq!(last.texcoords[1], 1.0);
    }

    #[test]
    fn cell_triangles_share_the_diagonal() {
        let vertices = quad_vertices(1, 1.0);
        assert_eq!(vertices[1], vertices[4]);
        assert_eq!(vertices[2], vertices[3]);
    }

    #[test]
    fn instance_offsets_stay_in_range() {
        let mut rng = StdRng::seed_from_u64(1);
        let offsets = instance_offsets(1000, &mut rng);
        assert_eq!(offsets.len(), 1000);
        for [x, y, z, w] in offsets {
            assert!((-1.0f32..=1.0 + 1.0 / 256.0).contains(&x));
            assert!((-1.0f32..=1.0 + 1.0 / 256.0).contains(&y));
            assert!((0.0f32..=1.0 + 1.0 / 512.0).contains(&z));
            assert_eq!(w, 0.0);
        }
    }

    #[test]
    fn seeded_offsets_are_reproducible() {
        let a = instance_offsets(16, &mut StdRng::seed_from_u64(42));
        let b = instance_offsets(16, &mut StdRng::seed_from_u64(42));
        assert_eq!(a, b);
    }

    #[test]
    fn moving_average_favours_history() {
        assert_relative_eq!(moving_average(10.0, 20.0), 10.1, epsilon = 1e-4);
        assert_relative_eq!(moving_average(0.0, 100.0), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn objects_snap_to_fifty_step_grid() {
        assert_eq!(snap_to_step(10, 10, 50, 1000), 10);
        assert_eq!(snap_to_step(34, 10, 50, 1000), 10);
        assert_eq!(snap_to_step(35, 10, 50, 1000), 60);
        assert_eq!(snap_to_step(487, 10, 50, 1000), 510);
        assert_eq!(snap_to_step(1000, 10, 50, 1000), 960);
        assert_eq!(snap_to_step(3, 10, 50, 1000), 10);
    }

    #[test]
    fn main_pass_clears_and_post_pass_presents() {
        let format = vk::Format::B8G8R8A8_UNORM;
        let main = main_pass_attachments(format);
        let post = post_pass_attachments(format);

        assert_eq!(main[0].load_op, vk::AttachmentLoadOp::CLEAR);
        assert_eq!(main[0].final_layout, post[0].initial_layout);
        assert_eq!(post[0].load_op, vk::AttachmentLoadOp::LOAD);
        assert_eq!(post[0].final_layout, vk::ImageLayout::PRESENT_SRC_KHR);
        assert_eq!(main[1].format, DEPTH_FORMAT);
        assert_eq!(post[1].load_op, vk::AttachmentLoadOp::DONT_CARE);
    }

    #[test]
    fn dependencies_wrap_the_subpass() {
        let [incoming, outgoing] = attachment_dependencies();
        assert_eq!(incoming.src_subpass, vk::SUBPASS_EXTERNAL);
        assert_eq!(incoming.dst_subpass, 0);
        assert_eq!(outgoing.src_subpass, 0);
        assert_eq!(outgoing.dst_subpass, vk::SUBPASS_EXTERNAL);
        assert!(incoming.dependency_flags.contains(vk::DependencyFlags::BY_REGION));
    }

    #[test]
    fn parameters_start_from_config() {
        let config = Config::default();
        let parameters = SampleParameters::from_config(&config);
        assert_eq!(parameters.objects_count, 100);
        assert_eq!(parameters.frame_resources_count, 1);
        assert_eq!(parameters.total_frame_time, 0.0);
    }
}
