/// "Core" refers to the Vulkan objects the renderer is built from, in creation order:
/// instance, surface, device and queue, swapchain target, frames in flight.

pub mod support;
pub mod instance;
pub mod queue;
pub mod device;
pub mod surface;
pub mod target;
pub mod frame;
