use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::{eyre, OptionExt, Result};
use gpu_allocator::{
    vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator},
    MemoryLocation,
};
use crate::renderer::core::surface::depth_aspect;
use crate::renderer::vk::util::{release_on_err, subresource_range};

pub struct ImageCreateInfo<'a> {
    pub format: vk::Format,
    pub extent: vk::Extent3D,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub name: &'a str,
}

/// A GPU-only image with its own memory and a view over the whole image
pub struct Image {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,

    allocation: Option<Allocation>,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
}

impl Image {
    // The memory is left uninitialized; depth images are cleared every frame anyway
    fn new(
        create_info: &ImageCreateInfo,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let image = {
            let info = vk::ImageCreateInfo::default()
                .format(create_info.format)
                .usage(create_info.usage)
                .extent(create_info.extent)
                .image_type(vk::ImageType::TYPE_2D)
                .mip_levels(1)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);
            unsafe { device.create_image(&info, None)? }
        };
        let reqs = unsafe { device.get_image_memory_requirements(image) };
        let allocation = memory_allocator
            .lock()
            .map_err(|e| eyre!(e.to_string()))
            .and_then(|mut allocator| {
                Ok(allocator.allocate(&AllocationCreateDesc {
                    name: create_info.name,
                    requirements: reqs,
                    location: MemoryLocation::GpuOnly,
                    linear: false,
                    allocation_scheme: AllocationScheme::DedicatedImage(image),
                })?)
            });
        let allocation = release_on_err(allocation, || unsafe {
            device.destroy_image(image, None);
        })?;

        // From here on `Drop` releases whatever exists
        let mut result = Self {
            image,
            view: vk::ImageView::null(),
            format: create_info.format,
            usage: create_info.usage,
            aspect: create_info.aspect,

            allocation: Some(allocation),
            memory_allocator,
            device,
        };
        result.bind_and_create_view()?;

        Ok(result)
    }

    fn bind_and_create_view(&mut self) -> Result<()> {
        let allocation = self.allocation
            .as_ref()
            .ok_or_eyre("Image memory already freed")?;
        unsafe {
            self.device.bind_image_memory(self.image, allocation.memory(), allocation.offset())?;
        }
        let info = vk::ImageViewCreateInfo::default()
            .view_type(vk::ImageViewType::TYPE_2D)
            .image(self.image)
            .format(self.format)
            .subresource_range(subresource_range(self.aspect));
        self.view = unsafe { self.device.create_image_view(&info, None)? };
        Ok(())
    }

    /// Create a depth attachment that can also be cleared with a transfer command
    pub fn new_depth_image(
        width: u32,
        height: u32,
        format: vk::Format,
        memory_allocator: Arc<Mutex<Allocator>>,
        device: Arc<ash::Device>,
    ) -> Result<Self> {
        let create_info = ImageCreateInfo {
            format,
            extent: vk::Extent3D {
                width,
                height,
                depth: 1,
            },
            usage: vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
                | vk::ImageUsageFlags::TRANSFER_DST,
            aspect: depth_aspect(format),
            name: "Depth Image",
        };
        Self::new(&create_info, memory_allocator, device)
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        unsafe {
            if self.view != vk::ImageView::null() {
                self.device.destroy_image_view(self.view, None);
            }
            self.device.destroy_image(self.image, None);
        }
        if let Some(allocation) = self.allocation.take() {
            match self.memory_allocator.lock() {
                Ok(mut allocator) => {
                    if let Err(e) = allocator.free(allocation) {
                        log::error!("Failed to free image memory: {}", e);
                    }
                }
                Err(e) => log::error!("Memory allocator lock poisoned: {}", e),
            }
        }
    }
}
