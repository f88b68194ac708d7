use std::ffi::{c_char, c_void, CStr, CString};
use ash::vk;
use color_eyre::eyre::eyre;
use color_eyre::Result;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use smallvec::SmallVec;
use winit::window::Window;
use crate::renderer::config::{AppInfo, RenderConfig};
use crate::renderer::core::support;
use crate::renderer::vk::util::release_on_err;

pub const VALIDATION_LAYER: &CStr = c"VK_LAYER_KHRONOS_validation";

/// Initializes Vulkan and keeps the Vulkan instance alive
pub struct RenderInstance {
    pub entry: ash::Entry,
    pub instance: ash::Instance,
    pub surface_loader: ash::khr::surface::Instance,
    debug_utils: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl RenderInstance {
    pub fn new(
        window: &Window,
        app: &AppInfo,
        config: &RenderConfig,
    ) -> Result<Self> {
        let entry = ash::Entry::linked();

        let debug_utils_enabled = config.enable_validation
            && support::is_instance_extension_supported(&entry, ash::ext::debug_utils::NAME)?;
        if config.enable_validation && !debug_utils_enabled {
            log::warn!(
                "{:?} is not supported, validation messages will not be logged",
                ash::ext::debug_utils::NAME
            );
        }

        let instance = Self::create_instance(&entry, window, app, config, debug_utils_enabled)?;

        let debug_utils = if debug_utils_enabled {
            let messenger = Self::create_debug_utils_messenger(&entry, &instance);
            Some(release_on_err(messenger, || unsafe { instance.destroy_instance(None) })?)
        } else {
            None
        };

        let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);

        Ok(Self {
            entry,
            instance,
            surface_loader,
            debug_utils,
        })
    }

    pub fn create_surface(&self, window: &Window) -> Result<vk::SurfaceKHR> {
        let surface = unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.instance,
                window.display_handle()?.as_raw(),
                window.window_handle()?.as_raw(),
                None,
            )?
        };
        Ok(surface)
    }

    fn create_instance(
        entry: &ash::Entry,
        window: &Window,
        app: &AppInfo,
        config: &RenderConfig,
        debug_utils_enabled: bool,
    ) -> Result<ash::Instance> {
        let enabled_layer_names = if config.enable_validation {
            if !support::is_instance_layer_supported(entry, VALIDATION_LAYER)? {
                return Err(eyre!(
                    "Validation layer {:?} is not supported",
                    VALIDATION_LAYER
                ));
            }
            log::info!("Validation layer {:?} is supported", VALIDATION_LAYER);
            vec![VALIDATION_LAYER.as_ptr()]
        } else {
            Vec::new()
        };

        let required_extensions = Self::get_required_instance_extensions(window, debug_utils_enabled)?;
        support::require_instance_extensions(entry, &required_extensions)?;
        let enabled_extension_names = required_extensions
            .iter()
            .map(|ext| ext.as_ptr())
            .collect::<Vec<*const c_char>>();

        let application_name = CString::new(app.application_name.as_str())?;
        let engine_name = CString::new(app.engine_name.as_str())?;
        let application_info = vk::ApplicationInfo::default()
            .application_name(&application_name)
            .application_version(app.packed_application_version())
            .engine_name(&engine_name)
            .engine_version(app.packed_engine_version())
            .api_version(vk::API_VERSION_1_3);

        let mut debug_info = debug_utils_messenger_create_info();
        let instance_info = vk::InstanceCreateInfo::default()
            .application_info(&application_info)
            .enabled_layer_names(&enabled_layer_names)
            .enabled_extension_names(&enabled_extension_names);

        // Also catches messages from instance creation and destruction
        let instance_info = if debug_utils_enabled {
            instance_info.push_next(&mut debug_info)
        } else {
            instance_info
        };

        #[cfg(target_os = "macos")]
        let instance_info = instance_info
            .flags(vk::InstanceCreateFlags::ENUMERATE_PORTABILITY_KHR);

        let instance = unsafe { entry.create_instance(&instance_info, None)? };
        log::info!("Vulkan instance created");
        Ok(instance)
    }

    fn create_debug_utils_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils_loader = ash::ext::debug_utils::Instance::new(entry, instance);
        let debug_utils_info = debug_utils_messenger_create_info();
        let debug_utils_messenger = unsafe {
            debug_utils_loader.create_debug_utils_messenger(&debug_utils_info, None)?
        };
        Ok((debug_utils_loader, debug_utils_messenger))
    }

    fn get_required_instance_extensions(
        window: &Window,
        debug_utils_enabled: bool,
    ) -> Result<SmallVec<[&'static CStr; 8]>> {
        let mut exts = ash_window::enumerate_required_extensions(
            window.display_handle()?.as_raw()
        )?
            .iter()
            .map(|ext| unsafe {
                CStr::from_ptr(*ext)
            })
            .collect::<SmallVec<[&'static CStr; 8]>>();

        if debug_utils_enabled {
            exts.push(ash::ext::debug_utils::NAME);
        }

        #[cfg(target_os = "macos")]
        {
            exts.push(ash::khr::portability_enumeration::NAME);
            exts.push(ash::khr::get_physical_device_properties2::NAME);
        }

        Ok(exts)
    }
}

impl Drop for RenderInstance {
    fn drop(&mut self) {
        unsafe {
            if let Some((loader, messenger)) = self.debug_utils.take() {
                loader.destroy_debug_utils_messenger(messenger, None);
            }
            self.instance.destroy_instance(None);
        }
    }
}

fn debug_utils_messenger_create_info(
) -> vk::DebugUtilsMessengerCreateInfoEXT<'static> {
    let message_severity = vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE
        | vk::DebugUtilsMessageSeverityFlagsEXT::INFO
        | vk::DebugUtilsMessageSeverityFlagsEXT::WARNING
        | vk::DebugUtilsMessageSeverityFlagsEXT::ERROR;
    let message_type = vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
        | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
        | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE;
    vk::DebugUtilsMessengerCreateInfoEXT::default()
        .message_severity(message_severity)
        .message_type(message_type)
        .pfn_user_callback(Some(debug_callback))
}

unsafe extern "system" fn debug_callback(
    message_severity: vk::DebugUtilsMessageSeverityFlagsEXT,
    message_type: vk::DebugUtilsMessageTypeFlagsEXT,
    p_callback_data: *const vk::DebugUtilsMessengerCallbackDataEXT<'_>,
    _p_user_data: *mut c_void,
) -> vk::Bool32 {
    let msg_type = message_type_label(message_type);
    let msg = unsafe {
        if p_callback_data.is_null() || (*p_callback_data).p_message.is_null() {
            c"<no message>"
        } else {
            CStr::from_ptr((*p_callback_data).p_message)
        }
    };
    log::log!(severity_level(message_severity), "{} {:?}", msg_type, msg);

    vk::FALSE
}

fn message_type_label(message_type: vk::DebugUtilsMessageTypeFlagsEXT) -> &'static str {
    match message_type {
        vk::DebugUtilsMessageTypeFlagsEXT::GENERAL => "[General]",
        vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE => "[Performance]",
        vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION => "[Validation]",
        _ => "[Unknown]",
    }
}

fn severity_level(message_severity: vk::DebugUtilsMessageSeverityFlagsEXT) -> log::Level {
    match message_severity {
        vk::DebugUtilsMessageSeverityFlagsEXT::VERBOSE => log::Level::Trace,
        vk::DebugUtilsMessageSeverityFlagsEXT::INFO => log::Level::Info,
        vk::DebugUtilsMessageSeverityFlagsEXT::WARNING => log::Level::Warn,
        vk::DebugUtilsMessageSeverityFlagsEXT::ERROR => log::Level::Error,
        _ => log::Level::Warn,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severities_map_onto_log_levels() {
        use vk::DebugUtilsMessageSeverityFlagsEXT as S;
        assert_eq!(severity_level(S::VERBOSE), log::Level::Trace);
        assert_eq!(severity_level(S::INFO), log::Level::Info);
        assert_eq!(severity_level(S::WARNING), log::Level::Warn);
        assert_eq!(severity_level(S::ERROR), log::Level::Error);
    }

    #[test]
    fn combined_message_types_are_unknown() {
        use vk::DebugUtilsMessageTypeFlagsEXT as T;
        assert_eq!(message_type_label(T::VALIDATION), "[Validation]");
        assert_eq!(message_type_label(T::GENERAL | T::PERFORMANCE), "[Unknown]");
    }
}
