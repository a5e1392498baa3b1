// GUI overlay - Dear ImGui rendered with Vulkan
//
// Draws the statistics window (FPS / frame time histograms) plus whatever the
// sample adds, on top of the already rendered frame. Each frame resource gets
// its own host-visible vertex and index buffers that grow on demand.

use anyhow::{Context, Result};
use ash::vk;
use glam::Vec2;
use gpu_allocator::MemoryLocation;
use imgui::{Condition, DrawCmd, DrawCmdParams, DrawIdx, DrawVert, StyleColor, WindowFlags};
use std::path::Path;
use std::sync::Arc;

use crate::backend::buffer::{AccessScope, BufferParameters};
use crate::backend::descriptor::{
    create_descriptor_resources, sampler_binding, update_descriptor_set, DescriptorSetParameters,
};
use crate::backend::handle::Unique;
use crate::backend::image::{
    copy_data_to_image, create_sampler, subresource_range, ImageParameters, ImageTransition,
    SamplerDesc,
};
use crate::backend::pipeline::{
    alpha_blend_state, create_graphics_pipeline, create_pipeline_layout, GraphicsPipelineDesc,
};
use crate::backend::shader::create_shader_module;
use crate::backend::VulkanDevice;
use crate::input::MouseState;
use crate::timer::TimerData;

/// Push constant block of the GUI vertex shader: scale followed by translate
pub type GuiPushConstants = [f32; 4];

const STATS_WINDOW_SIZE: [f32; 2] = [100.0, 100.0];
const STATS_WINDOW_MARGIN: f32 = 20.0;
const HISTOGRAM_SIZE: [f32; 2] = [85.0, 30.0];

#[derive(Default)]
struct FrameDrawBuffers {
    vertex: Option<BufferParameters>,
    index: Option<BufferParameters>,
}

pub struct Gui {
    context: imgui::Context,
    show_fps: bool,
    frame_buffers: Vec<FrameDrawBuffers>,
    pipeline: Unique<vk::Pipeline>,
    pipeline_layout: Unique<vk::PipelineLayout>,
    descriptor_set: DescriptorSetParameters,
    _font_texture: ImageParameters,
    device: Arc<VulkanDevice>,
}

impl Gui {
    /// `render_pass` must load the color attachment; the GUI draws over it
    pub fn new(
        device: &Arc<VulkanDevice>,
        extent: vk::Extent2D,
        frame_count: usize,
        render_pass: vk::RenderPass,
        shader_dir: &Path,
    ) -> Result<Self> {
        let mut context = imgui::Context::create();
        context.set_ini_filename(None);
        apply_style(context.style_mut());
        context.io_mut().display_size = [extent.width as f32, extent.height as f32];

        let font_texture = Self::create_font_texture(device, &mut context)?;

        let descriptor_set = create_descriptor_resources(
            device,
            &[sampler_binding(0, vk::ShaderStageFlags::FRAGMENT)],
            &[vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: 1,
            }],
        )?;
        let sampler = font_texture
            .sampler
            .as_ref()
            .context("Font texture has no sampler")?;
        update_descriptor_set(
            device,
            descriptor_set.handle,
            vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
            0,
            0,
            &[vk::DescriptorImageInfo {
                sampler: sampler.get(),
                image_view: font_texture.view,
                image_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
            }],
        );

        let pipeline_layout = create_pipeline_layout(
            device,
            &[*descriptor_set.layout],
            &[vk::PushConstantRange {
                stage_flags: vk::ShaderStageFlags::VERTEX,
                offset: 0,
                size: std::mem::size_of::<GuiPushConstants>() as u32,
            }],
        )?;

        let vertex_shader = create_shader_module(device, &shader_dir.join("gui.vert.spv"))?;
        let fragment_shader = create_shader_module(device, &shader_dir.join("gui.frag.spv"))?;

        let vertex_bindings = [vk::VertexInputBindingDescription {
            binding: 0,
            stride: std::mem::size_of::<DrawVert>() as u32,
            input_rate: vk::VertexInputRate::VERTEX,
        }];
        let vertex_attributes = [
            vk::VertexInputAttributeDescription {
                location: 0,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(DrawVert, pos) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 1,
                binding: 0,
                format: vk::Format::R32G32_SFLOAT,
                offset: std::mem::offset_of!(DrawVert, uv) as u32,
            },
            vk::VertexInputAttributeDescription {
                location: 2,
                binding: 0,
                format: vk::Format::R8G8B8A8_UNORM,
                offset: std::mem::offset_of!(DrawVert, col) as u32,
            },
        ];

        let pipeline = create_graphics_pipeline(
            device,
            &GraphicsPipelineDesc {
                vertex_shader: *vertex_shader,
                fragment_shader: *fragment_shader,
                vertex_bindings: &vertex_bindings,
                vertex_attributes: &vertex_attributes,
                cull_mode: vk::CullModeFlags::NONE,
                front_face: vk::FrontFace::COUNTER_CLOCKWISE,
                depth_test: false,
                blend: Some(alpha_blend_state()),
                layout: *pipeline_layout,
                render_pass,
            },
        )?;

        let frame_buffers = (0..frame_count).map(|_| FrameDrawBuffers::default()).collect();

        log::info!("GUI prepared for {} frame resources", frame_count);

        Ok(Self {
            context,
            show_fps: true,
            frame_buffers,
            pipeline,
            pipeline_layout,
            descriptor_set,
            _font_texture: font_texture,
            device: device.clone(),
        })
    }

    fn create_font_texture(device: &Arc<VulkanDevice>, context: &mut imgui::Context) -> Result<ImageParameters> {
        let fonts = context.fonts();
        let atlas = fonts.build_rgba32_texture();
        let extent = vk::Extent2D {
            width: atlas.width,
            height: atlas.height,
        };

        let mut texture = ImageParameters::new(
            device,
            "imgui font texture",
            extent,
            vk::Format::R8G8B8A8_UNORM,
            vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST,
            vk::ImageAspectFlags::COLOR,
        )?;

        copy_data_to_image(
            device,
            texture.handle,
            extent,
            atlas.data,
            subresource_range(vk::ImageAspectFlags::COLOR),
            ImageTransition {
                old_layout: vk::ImageLayout::UNDEFINED,
                before: AccessScope::new(vk::AccessFlags::empty(), vk::PipelineStageFlags::TOP_OF_PIPE),
                new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                after: AccessScope::new(vk::AccessFlags::SHADER_READ, vk::PipelineStageFlags::FRAGMENT_SHADER),
            },
        )?;

        texture.sampler = Some(create_sampler(
            device,
            &SamplerDesc {
                mag_filter: vk::Filter::NEAREST,
                min_filter: vk::Filter::NEAREST,
                mipmap_mode: vk::SamplerMipmapMode::NEAREST,
                address_mode: vk::SamplerAddressMode::CLAMP_TO_EDGE,
                unnormalized_coordinates: false,
            },
        )?);

        context.fonts().tex_id = imgui::TextureId::new(0);
        Ok(texture)
    }

    pub fn on_window_size_changed(&mut self, extent: vk::Extent2D) {
        self.context.io_mut().display_size = [extent.width as f32, extent.height as f32];
    }

    /// Begin a GUI frame, draw the statistics window and let `build` add its own widgets
    pub fn start_frame<F>(&mut self, timer: &TimerData, mouse: &mut MouseState, build: F)
    where
        F: FnOnce(&imgui::Ui),
    {
        let io = self.context.io_mut();
        io.delta_time = timer.delta_time().max(f32::MIN_POSITIVE);
        io.add_mouse_pos_event([mouse.position.x, mouse.position.y]);
        io.add_mouse_button_event(imgui::MouseButton::Left, mouse.buttons[0].is_pressed);
        io.add_mouse_button_event(imgui::MouseButton::Right, mouse.buttons[1].is_pressed);
        mouse.available = !io.want_capture_mouse;

        let show_fps = &mut self.show_fps;
        let ui = self.context.new_frame();
        let display_width = ui.io().display_size[0];

        ui.window("Stats")
            .position(
                [display_width - STATS_WINDOW_SIZE[0] - STATS_WINDOW_MARGIN, STATS_WINDOW_MARGIN],
                Condition::Always,
            )
            .size(STATS_WINDOW_SIZE, Condition::Always)
            .flags(WindowFlags::NO_RESIZE | WindowFlags::NO_SCROLLBAR)
            .build(|| {
                if ui.radio_button_bool("FPS", *show_fps) {
                    *show_fps = true;
                }
                ui.same_line();
                if ui.radio_button_bool("ms", !*show_fps) {
                    *show_fps = false;
                }

                let y = ui.cursor_pos()[1];
                ui.set_cursor_pos([STATS_WINDOW_MARGIN, y]);
                if *show_fps {
                    ui.text(format!("{:7.1}", timer.average_fps()));
                    ui.plot_histogram("##fps", &timer.fps_histogram()[..])
                        .scale_min(0.0)
                        .scale_max(f32::MAX)
                        .graph_size(HISTOGRAM_SIZE)
                        .build();
                } else {
                    ui.text(format!("{:9.3}", timer.average_delta_time()));
                    ui.plot_histogram("##ms", &timer.delta_time_histogram()[..])
                        .scale_min(0.0)
                        .scale_max(f32::MAX)
                        .graph_size(HISTOGRAM_SIZE)
                        .build();
                }
            });

        build(ui);
    }

    /// Close a started frame that will not be drawn
    pub fn discard_frame(&mut self) {
        self.context.render();
    }

    /// Record the GUI into `command_buffer` using the buffers of frame `frame_index`
    pub fn draw(
        &mut self,
        frame_index: usize,
        command_buffer: vk::CommandBuffer,
        render_pass: vk::RenderPass,
        framebuffer: vk::Framebuffer,
        extent: vk::Extent2D,
    ) -> Result<()> {
        let device = &self.device.device;

        let begin_info =
            vk::CommandBufferBeginInfo::default().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        let render_pass_begin = vk::RenderPassBeginInfo::default()
            .render_pass(render_pass)
            .framebuffer(framebuffer)
            .render_area(vk::Rect2D {
                offset: vk::Offset2D::default(),
                extent,
            });

        unsafe {
            device
                .begin_command_buffer(command_buffer, &begin_info)
                .context("Could not begin GUI command buffer!")?;
            device.cmd_begin_render_pass(command_buffer, &render_pass_begin, vk::SubpassContents::INLINE);
            device.cmd_bind_pipeline(command_buffer, vk::PipelineBindPoint::GRAPHICS, *self.pipeline);
            device.cmd_bind_descriptor_sets(
                command_buffer,
                vk::PipelineBindPoint::GRAPHICS,
                *self.pipeline_layout,
                0,
                &[self.descriptor_set.handle],
                &[],
            );
        }

        let draw_data = self.context.render();
        let display_size = draw_data.display_size;

        unsafe {
            let viewport = vk::Viewport {
                x: 0.0,
                y: 0.0,
                width: display_size[0],
                height: display_size[1],
                min_depth: 0.0,
                max_depth: 1.0,
            };
            device.cmd_set_viewport(command_buffer, 0, &[viewport]);
        }

        if draw_data.total_vtx_count > 0 {
            let buffers = self
                .frame_buffers
                .get_mut(frame_index)
                .context("GUI frame index out of range")?;

            let vertex_size = draw_data.total_vtx_count as usize * std::mem::size_of::<DrawVert>();
            let index_size = draw_data.total_idx_count as usize * std::mem::size_of::<DrawIdx>();
            let vertex_buffer = ensure_capacity(
                &mut buffers.vertex,
                &self.device,
                "imgui vertex buffer",
                vertex_size as vk::DeviceSize,
                vk::BufferUsageFlags::VERTEX_BUFFER,
            )?;

            let mut offset = 0;
            for draw_list in draw_data.draw_lists() {
                let vertices = draw_list.vtx_buffer();
                vertex_buffer.write(offset, vertices)?;
                offset += std::mem::size_of_val(vertices);
            }
            let vertex_handle = vertex_buffer.handle;

            let index_buffer = ensure_capacity(
                &mut buffers.index,
                &self.device,
                "imgui index buffer",
                index_size as vk::DeviceSize,
                vk::BufferUsageFlags::INDEX_BUFFER,
            )?;

            let mut offset = 0;
            for draw_list in draw_data.draw_lists() {
                let indices = draw_list.idx_buffer();
                index_buffer.write(offset, indices)?;
                offset += std::mem::size_of_val(indices);
            }
            let index_handle = index_buffer.handle;

            let push_constants = push_constants(display_size);

            unsafe {
                device.cmd_bind_vertex_buffers(command_buffer, 0, &[vertex_handle], &[0]);
                device.cmd_bind_index_buffer(command_buffer, index_handle, 0, vk::IndexType::UINT16);
                device.cmd_push_constants(
                    command_buffer,
                    *self.pipeline_layout,
                    vk::ShaderStageFlags::VERTEX,
                    0,
                    bytemuck::cast_slice(&push_constants),
                );
            }

            let mut vertex_offset = 0;
            let mut index_offset = 0;
            for draw_list in draw_data.draw_lists() {
                for command in draw_list.commands() {
                    if let DrawCmd::Elements {
                        count,
                        cmd_params:
                            DrawCmdParams {
                                clip_rect,
                                vtx_offset,
                                idx_offset,
                                ..
                            },
                    } = command
                    {
                        let scissor =
                            scissor_rect(clip_rect, draw_data.display_pos, draw_data.framebuffer_scale);
                        if scissor.extent.width == 0 || scissor.extent.height == 0 {
                            continue;
                        }

                        unsafe {
                            device.cmd_set_scissor(command_buffer, 0, &[scissor]);
                            device.cmd_draw_indexed(
                                command_buffer,
                                count as u32,
                                1,
                                index_offset + idx_offset as u32,
                                vertex_offset + vtx_offset as i32,
                                0,
                            );
                        }
                    }
                }
                index_offset += draw_list.idx_buffer().len() as u32;
                vertex_offset += draw_list.vtx_buffer().len() as i32;
            }
        }

        unsafe {
            device.cmd_end_render_pass(command_buffer);
            device
                .end_command_buffer(command_buffer)
                .context("Could not record GUI command buffer!")?;
        }

        Ok(())
    }
}

fn apply_style(style: &mut imgui::Style) {
    style.use_dark_colors();
    style.colors[StyleColor::TitleBg as usize] = [0.16, 0.29, 0.48, 0.9];
    style.colors[StyleColor::TitleBgActive as usize] = [0.16, 0.29, 0.48, 0.9];
    style.colors[StyleColor::WindowBg as usize] = [0.06, 0.07, 0.08, 0.8];
    style.colors[StyleColor::PlotHistogram as usize] = [0.20, 0.40, 0.60, 1.0];
    style.colors[StyleColor::PlotHistogramHovered as usize] = [0.20, 0.45, 0.90, 1.0];
}

/// Make sure `slot` holds a mapped buffer of at least `size` bytes
fn ensure_capacity<'a>(
    slot: &'a mut Option<BufferParameters>,
    device: &Arc<VulkanDevice>,
    name: &str,
    size: vk::DeviceSize,
    usage: vk::BufferUsageFlags,
) -> Result<&'a mut BufferParameters> {
    let current = slot.as_ref().map_or(0, |buffer| buffer.size);
    if current < size {
        // The previous buffer of this frame is no longer in use once its fence was waited on
        *slot = None;
        *slot = Some(BufferParameters::new(
            device,
            name,
            grown_capacity(current, size),
            usage,
            MemoryLocation::CpuToGpu,
        )?);
    }
    slot.as_mut().context("GUI buffer missing")
}

/// New buffer size when `needed` bytes do not fit in `current`
pub fn grown_capacity(current: vk::DeviceSize, needed: vk::DeviceSize) -> vk::DeviceSize {
    needed.max(current.saturating_mul(2)).next_power_of_two()
}

/// Maps pixel coordinates to clip space: `pos * scale + translate`
pub fn push_constants(display_size: [f32; 2]) -> GuiPushConstants {
    let scale = Vec2::splat(2.0) / Vec2::from(display_size);
    let translate = Vec2::splat(-1.0);
    [scale.x, scale.y, translate.x, translate.y]
}

/// Scissor for one draw command, clamped to the framebuffer origin
pub fn scissor_rect(clip_rect: [f32; 4], display_pos: [f32; 2], scale: [f32; 2]) -> vk::Rect2D {
    let origin = Vec2::from(display_pos);
    let scale = Vec2::from(scale);
    let min = ((Vec2::new(clip_rect[0], clip_rect[1]) - origin) * scale).max(Vec2::ZERO);
    let max = (Vec2::new(clip_rect[2], clip_rect[3]) - origin) * scale;
    let size = (max - min).max(Vec2::ZERO);

    vk::Rect2D {
        offset: vk::Offset2D {
            x: min.x as i32,
            y: min.y as i32,
        },
        extent: vk::Extent2D {
            width: size.x as u32,
            height: size.y as u32,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn push_constants_map_corners_to_clip_space() {
        let [sx, sy, tx, ty] = push_constants([1000.0, 800.0]);
        assert_relative_eq!(0.0 * sx + tx, -1.0);
        assert_relative_eq!(1000.0 * sx + tx, 1.0);
        assert_relative_eq!(800.0 * sy + ty, 1.0);
    }

    #[test]
    fn scissor_is_clamped_to_origin() {
        let rect = scissor_rect([-10.0, 5.0, 110.0, 55.0], [0.0, 0.0], [1.0, 1.0]);
        assert_eq!((rect.offset.x, rect.offset.y), (0, 5));
        assert_eq!((rect.extent.width, rect.extent.height), (110, 50));
    }

    #[test]
    fn scissor_applies_display_offset_and_scale() {
        let rect = scissor_rect([20.0, 20.0, 40.0, 30.0], [10.0, 10.0], [2.0, 2.0]);
        assert_eq!((rect.offset.x, rect.offset.y), (20, 20));
        assert_eq!((rect.extent.width, rect.extent.height), (40, 20));
    }

    #[test]
    fn inverted_clip_rect_gives_empty_scissor() {
        let rect = scissor_rect([50.0, 50.0, 10.0, 10.0], [0.0, 0.0], [1.0, 1.0]);
        assert_eq!(rect.extent.width, 0);
        assert_eq!(rect.extent.height, 0);
    }

    #[test]
    fn buffers_grow_geometrically() {
        assert_eq!(grown_capacity(0, 1000), 1024);
        assert_eq!(grown_capacity(1024, 1100), 2048);
        assert_eq!(grown_capacity(4096, 5000), 8192);
    }
}
