use std::ffi::{c_char, CStr};
use std::sync::{Arc, Mutex};
use ash::vk;
use color_eyre::eyre::OptionExt;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use crate::renderer::core::queue::{select_queue_family_index, Queue, QueueFamily};
use crate::renderer::core::support::contains_name;

/// What we learned about one enumerated physical device
#[derive(Clone, Debug)]
pub struct DeviceCandidate {
    pub device_type: vk::PhysicalDeviceType,
    pub api_version: u32,
    pub has_required_extensions: bool,
    pub supports_synchronization2: bool,
    pub queue_family_index: Option<u32>,
}

impl DeviceCandidate {
    pub fn is_suitable(&self) -> bool {
        self.has_required_extensions
            && self.supports_synchronization2
            && self.api_version >= vk::API_VERSION_1_3
            && self.queue_family_index.is_some()
    }
}

/// Lower is better
pub fn device_type_rank(device_type: vk::PhysicalDeviceType) -> u32 {
    match device_type {
        vk::PhysicalDeviceType::DISCRETE_GPU => 0,
        vk::PhysicalDeviceType::INTEGRATED_GPU => 1,
        vk::PhysicalDeviceType::VIRTUAL_GPU => 2,
        vk::PhysicalDeviceType::CPU => 3,
        vk::PhysicalDeviceType::OTHER => 4,
        _ => 5,
    }
}

/// Index of the best suitable candidate. Among equally ranked devices the
/// first enumerated one wins.
pub fn select_physical_device_index(candidates: &[DeviceCandidate]) -> Option<usize> {
    candidates
        .iter()
        .enumerate()
        .filter(|(_, c)| c.is_suitable())
        .min_by_key(|(_, c)| device_type_rank(c.device_type))
        .map(|(i, _)| i)
}

/// Main structure for the renderer's GPU side: one device, one queue, one allocator
pub struct RenderDevice {
    pub logical: Arc<ash::Device>,
    pub physical: vk::PhysicalDevice,

    // Supports both graphics and presentation to the window surface
    pub graphics_queue: Arc<Queue>,

    memory_allocator: Option<Arc<Mutex<Allocator>>>,
}

impl RenderDevice {
    pub fn new(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<Self> {
        let (physical_device, graphics_queue_family) = Self::select_physical_device(
            instance,
            surface,
            surface_loader,
        )?;

        let (logical_device, graphics_queue) = Self::create_logical_device(
            instance,
            physical_device,
            graphics_queue_family,
        )?;
        log::info!("Logical device and queue created");

        let memory_allocator = Allocator::new(&AllocatorCreateDesc {
            instance: instance.clone(),
            device: logical_device.clone(),
            physical_device,
            debug_settings: gpu_allocator::AllocatorDebugSettings {
                log_memory_information: false,
                log_leaks_on_shutdown: true,
                store_stack_traces: false,
                log_allocations: false,
                log_frees: false,
                log_stack_traces: false,
            },
            buffer_device_address: false,
            allocation_sizes: Default::default(),
        })?;

        Ok(Self {
            logical: Arc::new(logical_device),
            physical: physical_device,
            graphics_queue: Arc::new(graphics_queue),
            memory_allocator: Some(Arc::new(Mutex::new(memory_allocator))),
        })
    }

    pub fn memory_allocator(&self) -> Result<Arc<Mutex<Allocator>>> {
        self.memory_allocator
            .clone()
            .ok_or_eyre("Memory allocator already released")
    }

    pub fn wait_idle(&self) -> Result<()> {
        unsafe { self.logical.device_wait_idle()? };
        Ok(())
    }

    fn select_physical_device(
        instance: &ash::Instance,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<(vk::PhysicalDevice, QueueFamily)> {
        let physical_devices = unsafe { instance.enumerate_physical_devices()? };
        if physical_devices.is_empty() {
            return Err(eyre!("No Vulkan-capable physical device found"));
        }

        let candidates = physical_devices
            .iter()
            .map(|device| Self::describe_physical_device(instance, *device, surface, surface_loader))
            .collect::<Result<Vec<_>>>()?;

        let selected = select_physical_device_index(&candidates)
            .ok_or_eyre("No suitable physical device found")?;
        let physical_device = physical_devices[selected];
        let queue_family_index = candidates[selected]
            .queue_family_index
            .ok_or_eyre("Selected physical device has no graphics and present queue family")?;

        let families = unsafe {
            instance.get_physical_device_queue_family_properties(physical_device)
        };
        let family_props = families
            .get(queue_family_index as usize)
            .ok_or_else(|| eyre!("Invalid queue family index {} selected", queue_family_index))?;

        let props = unsafe { instance.get_physical_device_properties(physical_device) };
        log::info!(
            "Selected physical device {:?} ({:?}), queue family {}",
            props.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            props.device_type,
            queue_family_index,
        );

        let family = QueueFamily::new(queue_family_index, *family_props, true);
        if !family.supports_graphics() || !family.supports_present() {
            return Err(eyre!("Queue family {} cannot both render and present", family.index));
        }

        Ok((physical_device, family))
    }

    fn describe_physical_device(
        instance: &ash::Instance,
        device: vk::PhysicalDevice,
        surface: vk::SurfaceKHR,
        surface_loader: &ash::khr::surface::Instance,
    ) -> Result<DeviceCandidate> {
        let props = unsafe { instance.get_physical_device_properties(device) };

        let supported_extensions = unsafe {
            instance.enumerate_device_extension_properties(device)?
        };
        let has_required_extensions = Self::get_required_device_extensions()
            .iter()
            .all(|req| {
                contains_name(
                    supported_extensions
                        .iter()
                        .filter_map(|ext| ext.extension_name_as_c_str().ok()),
                    req,
                )
            });

        let supports_synchronization2 = props.api_version >= vk::API_VERSION_1_3 && {
            let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default();
            let mut features = vk::PhysicalDeviceFeatures2::default()
                .push_next(&mut vulkan13_features);
            unsafe {
                instance.get_physical_device_features2(device, &mut features);
            }
            vulkan13_features.synchronization2 == vk::TRUE
        };

        let families = unsafe {
            instance.get_physical_device_queue_family_properties(device)
        };
        let queue_family_index = select_queue_family_index(&families, |i| unsafe {
            surface_loader
                .get_physical_device_surface_support(device, i, surface)
                .unwrap_or(false)
        });

        log::debug!(
            "Found physical device {:?}: type {:?}, api {}.{}, extensions ok: {}, queue family {:?}",
            props.device_name_as_c_str().unwrap_or(c"<unnamed>"),
            props.device_type,
            vk::api_version_major(props.api_version),
            vk::api_version_minor(props.api_version),
            has_required_extensions,
            queue_family_index,
        );

        Ok(DeviceCandidate {
            device_type: props.device_type,
            api_version: props.api_version,
            has_required_extensions,
            supports_synchronization2,
            queue_family_index,
        })
    }

    fn create_logical_device(
        instance: &ash::Instance,
        physical_device: vk::PhysicalDevice,
        graphics_queue_family: QueueFamily,
    ) -> Result<(ash::Device, Queue)> {
        let queue_priorities = [1.0];
        let queue_create_infos = [
            vk::DeviceQueueCreateInfo::default()
                .queue_family_index(graphics_queue_family.index)
                .queue_priorities(&queue_priorities),
        ];

        let enabled_extension_names = Self::get_required_device_extensions()
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        let mut vulkan13_features = vk::PhysicalDeviceVulkan13Features::default()
            .synchronization2(true);

        let device_create_info = vk::DeviceCreateInfo::default()
            .queue_create_infos(&queue_create_infos)
            .enabled_extension_names(&enabled_extension_names)
            .push_next(&mut vulkan13_features);

        let device = unsafe {
            instance.create_device(physical_device, &device_create_info, None)?
        };

        let graphics_queue = unsafe {
            let queue = device.get_device_queue(graphics_queue_family.index, 0);
            Queue::new(graphics_queue_family, queue)
        };

        Ok((device, graphics_queue))
    }

    fn get_required_device_extensions() -> Vec<&'static CStr> {
        vec![
            ash::khr::swapchain::NAME,

            #[cfg(target_os = "macos")]
            ash::khr::portability_subset::NAME,
        ]
    }
}

impl Drop for RenderDevice {
    fn drop(&mut self) {
        // Everything allocated from it is gone by now
        drop(self.memory_allocator.take());
        unsafe {
            self.logical.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candidate(device_type: vk::PhysicalDeviceType) -> DeviceCandidate {
        DeviceCandidate {
            device_type,
            api_version: vk::API_VERSION_1_3,
            has_required_extensions: true,
            supports_synchronization2: true,
            queue_family_index: Some(0),
        }
    }

    #[test]
    fn prefers_discrete_over_integrated() {
        let candidates = [
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(vk::PhysicalDeviceType::DISCRETE_GPU),
        ];
        assert_eq!(select_physical_device_index(&candidates), Some(1));
    }

    #[test]
    fn first_device_wins_among_equals() {
        let candidates = [
            candidate(vk::PhysicalDeviceType::CPU),
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU),
            candidate(vk::PhysicalDeviceType::INTEGRATED_GPU),
        ];
        assert_eq!(select_physical_device_index(&candidates), Some(1));
    }

    #[test]
    fn unsuitable_devices_are_skipped() {
        let mut no_queue = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        no_queue.queue_family_index = None;
        let mut no_swapchain = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        no_swapchain.has_required_extensions = false;
        let mut too_old = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        too_old.api_version = vk::API_VERSION_1_1;
        let mut no_sync2 = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        no_sync2.supports_synchronization2 = false;

        let candidates = [
            no_queue,
            no_swapchain,
            too_old,
            no_sync2,
            candidate(vk::PhysicalDeviceType::VIRTUAL_GPU),
        ];
        assert_eq!(select_physical_device_index(&candidates), Some(4));
    }

    #[test]
    fn nothing_suitable_selects_nothing() {
        let mut c = candidate(vk::PhysicalDeviceType::DISCRETE_GPU);
        c.queue_family_index = None;
        assert_eq!(select_physical_device_index(&[c]), None);
        assert_eq!(select_physical_device_index(&[]), None);
    }

    #[test]
    fn ranks_are_ordered() {
        assert!(device_type_rank(vk::PhysicalDeviceType::DISCRETE_GPU)
            < device_type_rank(vk::PhysicalDeviceType::INTEGRATED_GPU));
        assert!(device_type_rank(vk::PhysicalDeviceType::VIRTUAL_GPU)
            < device_type_rank(vk::PhysicalDeviceType::CPU));
        assert!(device_type_rank(vk::PhysicalDeviceType::CPU)
            < device_type_rank(vk::PhysicalDeviceType::OTHER));
    }
}
