use ash::vk;
use glam::Vec4;
use winit::dpi::PhysicalSize;
use winit::window::{Fullscreen, WindowAttributes};

/// Everything the application can be tuned with, grouped by concern
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub window: WindowConfig,
    pub app: AppInfo,
    pub render: RenderConfig,
}

#[derive(Clone, Debug)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    pub title: String,
    pub fullscreen: bool,
    pub resizable: bool,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 800,
            title: "Tutorial Window".into(),
            fullscreen: false,
            resizable: false,
        }
    }
}

impl WindowConfig {
    pub fn window_attributes(&self) -> WindowAttributes {
        let attributes = WindowAttributes::default()
            .with_title(self.title.clone())
            .with_inner_size(PhysicalSize::new(self.width, self.height))
            .with_resizable(self.resizable);

        if self.fullscreen {
            // `None` picks the monitor the window would otherwise open on
            attributes.with_fullscreen(Some(Fullscreen::Borderless(None)))
        } else {
            attributes
        }
    }
}

/// Metadata handed to the driver through `vk::ApplicationInfo`
#[derive(Clone, Debug)]
pub struct AppInfo {
    pub application_name: String,
    pub application_version: (u32, u32, u32, u32),
    pub engine_name: String,
    pub engine_version: (u32, u32, u32, u32),
}

impl Default for AppInfo {
    fn default() -> Self {
        Self {
            application_name: "An Introduction to Vulkan".into(),
            application_version: (0, 2023, 1, 1),
            engine_name: "Vulkan Launchpad".into(),
            engine_version: (0, 2023, 1, 0),
        }
    }
}

impl AppInfo {
    pub fn packed_application_version(&self) -> u32 {
        let (variant, major, minor, patch) = self.application_version;
        vk::make_api_version(variant, major, minor, patch)
    }

    pub fn packed_engine_version(&self) -> u32 {
        let (variant, major, minor, patch) = self.engine_version;
        vk::make_api_version(variant, major, minor, patch)
    }
}

/// Contains configuration options for the renderer like vsync and the clear color
#[derive(Clone, Debug)]
pub struct RenderConfig {
    pub vsync: bool,
    pub enable_validation: bool,
    pub clear_color: Vec4,
    pub frames_in_flight: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            vsync: true,
            enable_validation: cfg!(debug_assertions),
            clear_color: Vec4::new(0.1, 0.1, 0.12, 1.0),
            frames_in_flight: 2,
        }
    }
}

impl RenderConfig {
    pub fn clear_color_value(&self) -> vk::ClearColorValue {
        vk::ClearColorValue {
            float32: self.clear_color.to_array(),
        }
    }

    pub fn frames_in_flight(&self) -> usize {
        self.frames_in_flight.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_defaults_match_tutorial_window() {
        let window = WindowConfig::default();
        assert_eq!(window.width, 800);
        assert_eq!(window.height, 800);
        assert_eq!(window.title, "Tutorial Window");
        assert!(!window.fullscreen);
        assert!(!window.resizable);
    }

    #[test]
    fn app_versions_are_packed() {
        let app = AppInfo::default();
        let version = app.packed_application_version();
        assert_eq!(vk::api_version_major(version), 2023);
        assert_eq!(vk::api_version_minor(version), 1);
        assert_eq!(vk::api_version_patch(version), 1);

        assert_eq!(app.engine_name, "Vulkan Launchpad");
        let engine = app.packed_engine_version();
        assert_eq!(vk::api_version_patch(engine), 0);
    }

    #[test]
    fn clear_color_is_forwarded() {
        let config = RenderConfig {
            clear_color: Vec4::new(1.0, 0.5, 0.25, 1.0),
            ..Default::default()
        };
        let value = config.clear_color_value();
        assert_eq!(unsafe { value.float32 }, [1.0, 0.5, 0.25, 1.0]);
    }

    #[test]
    fn zero_frames_in_flight_is_clamped() {
        let config = RenderConfig {
            frames_in_flight: 0,
            ..Default::default()
        };
        assert_eq!(config.frames_in_flight(), 1);
    }
}
