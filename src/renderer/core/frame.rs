use std::sync::Arc;
use ash::vk;
use color_eyre::Result;
use crate::renderer::core::queue::Queue;
use crate::renderer::vk::util::release_on_err;

/// Per-frame-in-flight command recording and synchronization
pub struct Frame {
    pub command_buffer: vk::CommandBuffer,

    // Signals when the acquired swapchain image is ready to be rendered to
    pub image_available_semaphore: vk::Semaphore,

    // Signals when all rendering commands of this frame have finished execution
    pub in_flight_fence: vk::Fence,

    command_pool: vk::CommandPool,
    device: Arc<ash::Device>,
}

impl Frame {
    pub fn new(
        queue: &Queue,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let command_pool_info = vk::CommandPoolCreateInfo::default()
            .queue_family_index(queue.family.index)
            // Allow the pool to reset individual command buffers
            .flags(vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);
        let command_pool =
            unsafe { device.create_command_pool(&command_pool_info, None)? };

        let destroy_pool = || unsafe { device.destroy_command_pool(command_pool, None) };

        let command_buffer_info = vk::CommandBufferAllocateInfo::default()
            .command_pool(command_pool)
            .command_buffer_count(1)
            .level(vk::CommandBufferLevel::PRIMARY);
        let command_buffer = release_on_err(
            unsafe { device.allocate_command_buffers(&command_buffer_info) },
            destroy_pool,
        )?[0];

        let image_available_semaphore = release_on_err(
            unsafe { device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None) },
            destroy_pool,
        )?;
        // Created signaled so the first wait on it returns immediately
        let in_flight_fence = release_on_err(
            unsafe {
                device.create_fence(
                    &vk::FenceCreateInfo::default().flags(vk::FenceCreateFlags::SIGNALED),
                    None,
                )
            },
            || unsafe {
                device.destroy_semaphore(image_available_semaphore, None);
                destroy_pool();
            },
        )?;

        Ok(Self {
            command_buffer,
            image_available_semaphore,
            in_flight_fence,
            command_pool,
            device,
        })
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        unsafe {
            self.device.destroy_fence(self.in_flight_fence, None);
            self.device.destroy_semaphore(self.image_available_semaphore, None);
            self.device.destroy_command_pool(self.command_pool, None);
        }
    }
}

/// Round-robin position over the frames in flight
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRing {
    len: usize,
    current: usize,
}

impl FrameRing {
    pub fn new(len: usize) -> Self {
        Self {
            len: len.max(1),
            current: 0,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn advance(&mut self) -> usize {
        self.current = (self.current + 1) % self.len;
        self.current
    }
}

pub struct FrameContext {
    frames: Vec<Frame>,
    ring: FrameRing,
}

impl FrameContext {
    pub fn new(
        count: usize,
        queue: &Queue,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let ring = FrameRing::new(count);
        let frames = (0..ring.len)
            .map(|_| Frame::new(queue, device.clone()))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            frames,
            ring,
        })
    }

    pub fn current(&self) -> &Frame {
        &self.frames[self.ring.current()]
    }

    pub fn advance(&mut self) {
        self.ring.advance();
    }
}
