pub mod config;

mod core;
mod resources;
mod vk;

use std::sync::Arc;
use ash::vk as ash_vk;
use color_eyre::Result;
use winit::window::Window;
use crate::renderer::config::Config;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::frame::FrameContext;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::target::{FramebufferComposition, RenderTarget};
use crate::renderer::vk::util::{clear_color_image, clear_depth_image, transition_image_layout};

/// What happened to the swapchain during a frame
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FrameOutcome {
    Presented,
    SwapchainOutOfDate,
}

pub struct Renderer {
    // Field order is destruction order
    frm: FrameContext,
    tgt: RenderTarget,
    dev: RenderDevice,
    ins: RenderInstance,

    clear_color: ash_vk::ClearColorValue,
    resize_requested: bool,
}

impl Renderer {
    pub fn new(
        window: Arc<Window>,
        config: &Config,
    ) -> Result<Self> {
        let ins = RenderInstance::new(&window, &config.app, &config.render)?;

        let surface = ins.create_surface(&window)?;
        log::info!("Window surface created");

        let dev = match RenderDevice::new(&ins.instance, surface, &ins.surface_loader) {
            Ok(dev) => dev,
            Err(e) => {
                unsafe { ins.surface_loader.destroy_surface(surface, None) };
                return Err(e);
            }
        };

        let tgt = RenderTarget::new(window, surface, &ins, &dev, &config.render)?;
        log::info!(
            "Framebuffer compositions ready: {} color + depth ({:?}) attachments",
            tgt.framebuffer_compositions.len(),
            tgt.depth_format,
        );

        let frm = FrameContext::new(
            config.render.frames_in_flight(),
            &dev.graphics_queue,
            dev.logical.clone(),
        )?;
        log::info!("{} frames in flight", config.render.frames_in_flight());

        Ok(Self {
            frm,
            tgt,
            dev,
            ins,
            clear_color: config.render.clear_color_value(),
            resize_requested: false,
        })
    }

    pub fn request_resize(&mut self) {
        self.resize_requested = true;
    }

    pub fn draw(&mut self) -> Result<()> {
        if self.resize_requested {
            if !self.tgt.recreate()? {
                // Minimized; try again on the next resize event
                return Ok(());
            }
            self.resize_requested = false;
        }

        if self.draw_frame()? == FrameOutcome::SwapchainOutOfDate {
            self.resize_requested = true;
        }

        Ok(())
    }

    fn draw_frame(&mut self) -> Result<FrameOutcome> {
        let device = self.dev.logical.clone();
        let frame = self.frm.current();

        unsafe {
            device.wait_for_fences(&[frame.in_flight_fence], true, u64::MAX)?;
        }

        let acquire_result = unsafe {
            self.tgt.swapchain_loader.acquire_next_image(
                self.tgt.swapchain,
                u64::MAX,
                frame.image_available_semaphore,
                ash_vk::Fence::null(),
            )
        };
        let (image_index, suboptimal) = match acquire_result {
            Ok(result) => result,
            Err(ash_vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                return Ok(FrameOutcome::SwapchainOutOfDate);
            }
            Err(e) => return Err(e.into()),
        };

        // Only reset once we know work will be submitted, otherwise the next wait deadlocks
        unsafe {
            device.reset_fences(&[frame.in_flight_fence])?;
        }

        let cmd = frame.command_buffer;
        let composition = self.tgt.framebuffer_compositions[image_index as usize];
        unsafe {
            device.reset_command_buffer(cmd, ash_vk::CommandBufferResetFlags::empty())?;
            let begin_info = ash_vk::CommandBufferBeginInfo::default()
                .flags(ash_vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            device.begin_command_buffer(cmd, &begin_info)?;
        }

        self.record_clear(cmd, &composition, &device);

        unsafe {
            device.end_command_buffer(cmd)?;
        }

        let render_finished = self.tgt.render_finished_semaphores[image_index as usize];
        let wait_infos = [
            ash_vk::SemaphoreSubmitInfo::default()
                .semaphore(frame.image_available_semaphore)
                .stage_mask(ash_vk::PipelineStageFlags2::ALL_TRANSFER),
        ];
        let signal_infos = [
            ash_vk::SemaphoreSubmitInfo::default()
                .semaphore(render_finished)
                .stage_mask(ash_vk::PipelineStageFlags2::ALL_COMMANDS),
        ];
        let cmd_infos = [
            ash_vk::CommandBufferSubmitInfo::default()
                .command_buffer(cmd),
        ];
        let submit_info = ash_vk::SubmitInfo2::default()
            .wait_semaphore_infos(&wait_infos)
            .command_buffer_infos(&cmd_infos)
            .signal_semaphore_infos(&signal_infos);
        unsafe {
            device.queue_submit2(
                self.dev.graphics_queue.handle,
                &[submit_info],
                frame.in_flight_fence,
            )?;
        }

        let wait_semaphores = [render_finished];
        let swapchains = [self.tgt.swapchain];
        let image_indices = [image_index];
        let present_info = ash_vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);
        let present_result = unsafe {
            self.tgt.swapchain_loader.queue_present(self.dev.graphics_queue.handle, &present_info)
        };

        self.frm.advance();

        match present_result {
            Ok(false) if !suboptimal => Ok(FrameOutcome::Presented),
            Ok(_) | Err(ash_vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(FrameOutcome::SwapchainOutOfDate),
            Err(e) => Err(e.into()),
        }
    }

    fn record_clear(
        &self,
        cmd: ash_vk::CommandBuffer,
        composition: &FramebufferComposition,
        device: &ash::Device,
    ) {
        let color = &composition.color;
        transition_image_layout(
            cmd,
            color.image,
            color.aspect,
            ash_vk::ImageLayout::UNDEFINED,
            ash_vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            device,
        );
        clear_color_image(cmd, color.image, &self.clear_color, device);
        transition_image_layout(
            cmd,
            color.image,
            color.aspect,
            ash_vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            color.final_layout,
            device,
        );

        let depth = &composition.depth;
        transition_image_layout(
            cmd,
            depth.image,
            depth.aspect,
            ash_vk::ImageLayout::UNDEFINED,
            ash_vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            device,
        );
        clear_depth_image(
            cmd,
            depth.image,
            depth.aspect,
            &ash_vk::ClearDepthStencilValue {
                depth: 1.0,
                stencil: 0,
            },
            device,
        );
        transition_image_layout(
            cmd,
            depth.image,
            depth.aspect,
            ash_vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            depth.final_layout,
            device,
        );
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        // Nothing may be destroyed while the GPU still uses it
        if let Err(e) = self.dev.wait_idle() {
            log::error!("Failed to wait for device idle: {}", e);
        }
        log::info!("Releasing Vulkan objects");
    }
}
