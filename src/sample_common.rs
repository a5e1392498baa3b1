// Frame flow shared by samples
//
// start_frame -> acquire_image -> (sample records and submits) -> finish_frame
//
// The pool slot used by a frame is only touched again after its fence
// signals, so with N active slots the CPU may run up to N frames ahead.

use anyhow::{Context, Result};
use ash::vk;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::window::Window;

use crate::backend::pipeline::create_framebuffer;
use crate::backend::sync::wait_for_fence;
use crate::backend::{SwapchainDesc, VulkanCommon, VulkanDevice};
use crate::config::Config;
use crate::frame::{frame_resources_in_use, CurrentFrame, FrameResources};
use crate::gui::Gui;
use crate::input::MouseState;
use crate::timer::TimerData;

/// How long a frame slot's fence may stay unsignaled (1 s)
pub const FRAME_FENCE_TIMEOUT_NS: u64 = 1_000_000_000;
/// How long acquiring a swapchain image may take (3 s)
pub const ACQUIRE_TIMEOUT_NS: u64 = 3_000_000_000;

pub struct SampleCommon {
    // Dropped before the device they were created from
    frame_resources: Vec<FrameResources>,
    current_frame: CurrentFrame,
    timer: TimerData,
    mouse: MouseState,
    vulkan: VulkanCommon,
}

impl SampleCommon {
    pub fn new(window: &Window, config: &Config) -> Result<Self> {
        let enable_validation = cfg!(debug_assertions) && config.debug.validation_layers;
        let desc = SwapchainDesc {
            image_count: config.graphics.swapchain_image_count,
            present_mode: config.present_mode(),
            ..SwapchainDesc::default()
        };
        let vulkan = VulkanCommon::new(window, &config.window.title, desc, enable_validation)?;

        let pool_size = config.graphics.frame_resources_pool_size;
        let frame_resources = FrameResources::create_pool(vulkan.device(), pool_size)?;
        log::info!("Created a pool of {} frame resources", pool_size);

        Ok(Self {
            frame_resources,
            current_frame: CurrentFrame::new(frame_resources_in_use(
                config.sample.frame_resources_count,
                pool_size,
            )),
            timer: TimerData::new(),
            mouse: MouseState::default(),
            vulkan,
        })
    }

    /// Update the timer, build the GUI frame and wait until the next slot is free
    pub fn start_frame<F>(&mut self, gui: &mut Gui, build: F) -> Result<()>
    where
        F: FnOnce(&imgui::Ui),
    {
        self.timer.update();
        gui.start_frame(&self.timer, &mut self.mouse, build);
        // The GUI has consumed this frame's clicks
        self.mouse.end_frame();

        self.current_frame.advance();
        let frame = self.current_resources()?;
        wait_for_fence(self.vulkan.device(), *frame.fence, FRAME_FENCE_TIMEOUT_NS)
    }

    /// Acquire a swapchain image and build the slot's framebuffer for it.
    ///
    /// Returns false when the swapchain is out of date; the frame must then be
    /// skipped and the swapchain recreated.
    pub fn acquire_image(&mut self, render_pass: vk::RenderPass) -> Result<bool> {
        let index = self.current_frame.resource_index;
        let device = self.vulkan.device().clone();
        let swapchain = self.vulkan.swapchain()?;
        let frame = self
            .frame_resources
            .get_mut(index)
            .context("Frame resource index out of range")?;

        let acquired = swapchain.acquire_next_image(ACQUIRE_TIMEOUT_NS, *frame.image_available);
        let image_index = match acquire_outcome(acquired) {
            AcquireOutcome::Proceed(image_index) => image_index,
            AcquireOutcome::Recreate => {
                log::debug!("Swapchain out of date while acquiring an image");
                return Ok(false);
            }
            AcquireOutcome::Fail(e) => return Err(e).context("Could not acquire swapchain image!"),
        };

        unsafe { device.device.reset_fences(&[*frame.fence]) }.context("Could not reset fence!")?;

        let color_view = **swapchain
            .image_views
            .get(image_index as usize)
            .context("Swapchain returned an invalid image index")?;
        let depth_view = frame
            .depth_attachment
            .as_ref()
            .context("Depth attachment missing for frame")?
            .view;

        // Release the previous framebuffer of this slot before creating a new one
        frame.framebuffer = None;
        frame.framebuffer = Some(create_framebuffer(
            &device,
            &[color_view, depth_view],
            swapchain.extent,
            render_pass,
        )?);

        self.current_frame.image_index = image_index;
        Ok(true)
    }

    /// Record the GUI, submit it and present the frame.
    ///
    /// Returns true when the swapchain should be recreated.
    pub fn finish_frame(&mut self, gui: &mut Gui, render_pass: vk::RenderPass) -> Result<bool> {
        let device = self.vulkan.device();
        let swapchain = self.vulkan.swapchain()?;
        let frame_index = self.current_frame.resource_index;
        let image_index = self.current_frame.image_index;
        let frame = self.current_resources()?;
        let framebuffer = frame
            .framebuffer
            .as_ref()
            .context("Framebuffer missing for frame")?;

        gui.draw(
            frame_index,
            frame.post_command_buffer,
            render_pass,
            **framebuffer,
            swapchain.extent,
        )?;

        let command_buffers = [frame.post_command_buffer];
        let signal_semaphores = [*frame.finished_rendering];
        let submit_info = vk::SubmitInfo::default()
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            device
                .device
                .queue_submit(device.graphics_queue.handle, &[submit_info], *frame.fence)
                .context("Could not submit GUI command buffer!")?;
        }

        match swapchain.present(device.present_queue.handle, image_index, &signal_semaphores) {
            Ok(suboptimal) => Ok(suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(true),
            Err(e) => Err(e).context("Could not present swapchain image!"),
        }
    }

    /// Keep the CPU busy for `duration_ms` milliseconds
    pub fn perform_hardcore_calculations(&self, duration_ms: u32) {
        hardcore_calculations(self.timer.time(), duration_ms);
    }

    /// Recreate the swapchain; returns whether rendering is possible afterwards
    pub fn on_window_size_changed(&mut self) -> Result<bool> {
        self.vulkan.device().wait_idle()?;
        self.vulkan.create_swapchain()?;
        if self.vulkan.can_render() {
            let extent = self.vulkan.extent();
            log::info!("Swapchain recreated: {}x{}", extent.width, extent.height);
        }
        Ok(self.vulkan.can_render())
    }

    /// Cycle through `count` pool slots, clamped to the pool size
    pub fn set_frame_resources_count(&mut self, count: usize) {
        self.current_frame.resource_count = frame_resources_in_use(count, self.frame_resources.len());
    }

    pub fn current_resources(&self) -> Result<&FrameResources> {
        self.frame_resources
            .get(self.current_frame.resource_index)
            .context("Frame resource index out of range")
    }

    pub fn frame_resources_mut(&mut self) -> &mut [FrameResources] {
        &mut self.frame_resources
    }

    pub fn frame_resources_pool_size(&self) -> usize {
        self.frame_resources.len()
    }

    pub fn vulkan(&self) -> &VulkanCommon {
        &self.vulkan
    }

    pub fn device(&self) -> &Arc<VulkanDevice> {
        self.vulkan.device()
    }

    pub fn can_render(&self) -> bool {
        self.vulkan.can_render()
    }

    pub fn mouse_mut(&mut self) -> &mut MouseState {
        &mut self.mouse
    }
}

/// What a frame does with the result of acquiring a swapchain image
#[derive(Debug, PartialEq, Eq)]
pub enum AcquireOutcome {
    /// Reset the slot's fence and render into this image
    Proceed(u32),
    /// Leave the fence signaled, skip the frame and recreate the swapchain
    Recreate,
    Fail(vk::Result),
}

/// Only `Proceed` may reset the slot's fence: a skipped frame submits nothing
/// that would signal it again.
pub fn acquire_outcome(acquired: Result<(u32, bool), vk::Result>) -> AcquireOutcome {
    match acquired {
        Ok((image_index, _suboptimal)) => AcquireOutcome::Proceed(image_index),
        Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => AcquireOutcome::Recreate,
        Err(e) => AcquireOutcome::Fail(e),
    }
}

/// Busy loop of transcendental math seeded with `time`, returns after `duration_ms`
pub fn hardcore_calculations(time: f32, duration_ms: u32) {
    let duration = Duration::from_millis(u64::from(duration_ms));
    let start = Instant::now();

    loop {
        let sin = time.cos().sin();
        let pow = time.powf(sin);
        std::hint::black_box(pow.sin().cos());

        if start.elapsed() >= duration {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn calculations_take_at_least_the_requested_time() {
        let start = Instant::now();
        hardcore_calculations(1.5, 5);
        assert!(start.elapsed() >= Duration::from_millis(5));
    }

    #[test]
    fn acquired_image_proceeds_even_when_suboptimal() {
        assert_eq!(acquire_outcome(Ok((2, false))), AcquireOutcome::Proceed(2));
        assert_eq!(acquire_outcome(Ok((0, true))), AcquireOutcome::Proceed(0));
    }

    #[test]
    fn out_of_date_skips_frame_without_touching_fence() {
        assert_eq!(
            acquire_outcome(Err(vk::Result::ERROR_OUT_OF_DATE_KHR)),
            AcquireOutcome::Recreate
        );
    }

    #[test]
    fn other_acquire_errors_fail() {
        assert_eq!(
            acquire_outcome(Err(vk::Result::TIMEOUT)),
            AcquireOutcome::Fail(vk::Result::TIMEOUT)
        );
        assert_eq!(
            acquire_outcome(Err(vk::Result::ERROR_SURFACE_LOST_KHR)),
            AcquireOutcome::Fail(vk::Result::ERROR_SURFACE_LOST_KHR)
        );
    }

    #[test]
    fn zero_duration_returns_immediately() {
        let start = Instant::now();
        hardcore_calculations(0.0, 0);
        assert!(start.elapsed() < Duration::from_millis(100));
    }
}
