use std::sync::{Arc, Mutex};
use ash::prelude::VkResult;
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_allocator::vulkan::Allocator;
use winit::window::Window;

use crate::renderer::config::RenderConfig;
use crate::renderer::core::device::RenderDevice;
use crate::renderer::core::instance::RenderInstance;
use crate::renderer::core::surface::{self, SurfaceSupport};
use crate::renderer::resources::image::Image;
use crate::renderer::vk::util::{release_on_err, subresource_range};

/// One attachment of a framebuffer and the layout it is left in after a frame
#[derive(Clone, Copy, Debug)]
pub struct AttachmentDetails {
    pub image: vk::Image,
    pub view: vk::ImageView,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub aspect: vk::ImageAspectFlags,
    pub final_layout: vk::ImageLayout,
}

/// The attachments rendered into when a given swapchain image is drawn
#[derive(Clone, Copy, Debug)]
pub struct FramebufferComposition {
    pub color: AttachmentDetails,
    pub depth: AttachmentDetails,
}

/// Presentation target of the renderer, encapsulating the window, surface, and swapchain
pub struct RenderTarget {
    pub window: Arc<Window>,

    pub surface: vk::SurfaceKHR,
    pub surface_format: vk::SurfaceFormatKHR,
    pub present_mode: vk::PresentModeKHR,
    pub depth_format: vk::Format,

    pub swapchain: vk::SwapchainKHR,
    pub swapchain_loader: ash::khr::swapchain::Device,
    pub swapchain_extent: vk::Extent2D,
    pub swapchain_images: Vec<vk::Image>,
    pub swapchain_image_views: Vec<vk::ImageView>,

    // Indexed by swapchain image, signaled when that image may be presented
    pub render_finished_semaphores: Vec<vk::Semaphore>,
    pub framebuffer_compositions: Vec<FramebufferComposition>,

    depth_images: Vec<Image>,
    surface_loader: ash::khr::surface::Instance,
    physical_device: vk::PhysicalDevice,
    memory_allocator: Arc<Mutex<Allocator>>,
    device: Arc<ash::Device>,
    vsync: bool,
}

impl RenderTarget {
    const SWAPCHAIN_IMAGE_USAGE: vk::ImageUsageFlags = vk::ImageUsageFlags::from_raw(
        vk::ImageUsageFlags::COLOR_ATTACHMENT.as_raw()
            | vk::ImageUsageFlags::TRANSFER_DST.as_raw(),
    );

    /// Takes ownership of `surface`. It is destroyed here when creation fails.
    pub fn new(
        window: Arc<Window>,
        surface: vk::SurfaceKHR,
        ins: &RenderInstance,
        dev: &RenderDevice,
        config: &RenderConfig,
    ) -> Result<Self> {
        let prepared = surface::choose_depth_format(|format| unsafe {
            ins.instance.get_physical_device_format_properties(dev.physical, format)
        })
            .and_then(|depth_format| Ok((depth_format, dev.memory_allocator()?)));
        let (depth_format, memory_allocator) = release_on_err(prepared, || unsafe {
            ins.surface_loader.destroy_surface(surface, None);
        })?;

        let swapchain_loader = ash::khr::swapchain::Device::new(&ins.instance, &dev.logical);

        let mut target = Self {
            window,
            surface,
            surface_format: vk::SurfaceFormatKHR::default(),
            present_mode: vk::PresentModeKHR::FIFO,
            depth_format,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            swapchain_extent: vk::Extent2D::default(),
            swapchain_images: Vec::new(),
            swapchain_image_views: Vec::new(),
            render_finished_semaphores: Vec::new(),
            framebuffer_compositions: Vec::new(),
            depth_images: Vec::new(),
            surface_loader: ins.surface_loader.clone(),
            physical_device: dev.physical,
            memory_allocator,
            device: dev.logical.clone(),
            vsync: config.vsync,
        };

        target.build()?;
        log::info!(
            "Swapchain created: {} images of {}x{}, {:?} / {:?}, {:?}",
            target.image_count(),
            target.swapchain_extent.width,
            target.swapchain_extent.height,
            target.surface_format.format,
            target.surface_format.color_space,
            target.present_mode,
        );

        Ok(target)
    }

    pub fn image_count(&self) -> usize {
        self.swapchain_images.len()
    }

    /// Rebuilds the swapchain for the window's current size.
    /// Returns `false` when the window has no area to present to.
    pub fn recreate(&mut self) -> Result<bool> {
        let size = self.window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Ok(false);
        }

        unsafe { self.device.device_wait_idle()? };
        self.build()?;
        log::info!(
            "Swapchain recreated at {}x{}",
            self.swapchain_extent.width,
            self.swapchain_extent.height,
        );

        Ok(true)
    }

    fn build(&mut self) -> Result<()> {
        let support = SurfaceSupport::query(&self.surface_loader, self.physical_device, self.surface)?;
        let surface_format = surface::choose_surface_format(&support.formats)?;
        let present_mode = surface::choose_present_mode(&support.present_modes, self.vsync);
        let image_extent = surface::choose_image_extent(&support.capabilities, self.window.inner_size());

        let old_swapchain = self.swapchain;
        let swapchain_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(surface::choose_image_count(&support.capabilities))
            .image_format(surface_format.format)
            .image_color_space(surface_format.color_space)
            .image_extent(image_extent)
            .image_usage(Self::SWAPCHAIN_IMAGE_USAGE)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface::surface_transform(&support.capabilities))
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(present_mode)
            .clipped(true)
            .image_array_layers(1)
            .old_swapchain(old_swapchain);

        let swapchain = unsafe {
            self.swapchain_loader.create_swapchain(&swapchain_info, None)?
        };

        self.destroy_derived();
        if old_swapchain != vk::SwapchainKHR::null() {
            unsafe {
                self.swapchain_loader.destroy_swapchain(old_swapchain, None);
            }
        }

        self.swapchain = swapchain;
        self.surface_format = surface_format;
        self.present_mode = present_mode;
        self.swapchain_extent = image_extent;

        self.swapchain_images = unsafe {
            self.swapchain_loader.get_swapchain_images(swapchain)?
        };
        if self.swapchain_images.is_empty() {
            return Err(eyre!("Swapchain images not retrieved"));
        }

        // Pushed one by one so a failure part way leaves everything created so far
        // owned by `self`, where `destroy_derived` finds it
        for image in self.swapchain_images.clone() {
            let view = self.create_swapchain_image_view(image)?;
            self.swapchain_image_views.push(view);

            let semaphore = unsafe {
                self.device.create_semaphore(&vk::SemaphoreCreateInfo::default(), None)?
            };
            self.render_finished_semaphores.push(semaphore);

            self.depth_images.push(Image::new_depth_image(
                image_extent.width,
                image_extent.height,
                self.depth_format,
                self.memory_allocator.clone(),
                self.device.clone(),
            )?);
        }
        self.framebuffer_compositions = self.compose_framebuffers();

        Ok(())
    }

    fn create_swapchain_image_view(&self, image: vk::Image) -> VkResult<vk::ImageView> {
        let view_info = vk::ImageViewCreateInfo::default()
            .view_type(vk::ImageViewType::TYPE_2D)
            .format(self.surface_format.format)
            .components(vk::ComponentMapping {
                r: vk::ComponentSwizzle::R,
                g: vk::ComponentSwizzle::G,
                b: vk::ComponentSwizzle::B,
                a: vk::ComponentSwizzle::A,
            })
            .subresource_range(subresource_range(vk::ImageAspectFlags::COLOR))
            .image(image);
        unsafe {
            self.device.create_image_view(&view_info, None)
        }
    }

    fn compose_framebuffers(&self) -> Vec<FramebufferComposition> {
        self.swapchain_images
            .iter()
            .zip(&self.swapchain_image_views)
            .zip(&self.depth_images)
            .map(|((image, view), depth)| FramebufferComposition {
                color: AttachmentDetails {
                    image: *image,
                    view: *view,
                    format: self.surface_format.format,
                    usage: Self::SWAPCHAIN_IMAGE_USAGE,
                    aspect: vk::ImageAspectFlags::COLOR,
                    final_layout: vk::ImageLayout::PRESENT_SRC_KHR,
                },
                depth: AttachmentDetails {
                    image: depth.image,
                    view: depth.view,
                    format: depth.format,
                    usage: depth.usage,
                    aspect: depth.aspect,
                    final_layout: vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
                },
            })
            .collect()
    }

    // Swapchain images themselves belong to the swapchain
    fn destroy_derived(&mut self) {
        self.framebuffer_compositions.clear();
        unsafe {
            for semaphore in self.render_finished_semaphores.drain(..) {
                self.device.destroy_semaphore(semaphore, None);
            }
            for view in self.swapchain_image_views.drain(..) {
                self.device.destroy_image_view(view, None);
            }
        }
        self.depth_images.clear();
        self.swapchain_images.clear();
    }
}

impl Drop for RenderTarget {
    fn drop(&mut self) {
        self.destroy_derived();
        unsafe {
            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}
