use ash::vk;

pub fn subresource_range(aspect_mask: vk::ImageAspectFlags) -> vk::ImageSubresourceRange {
    vk::ImageSubresourceRange {
        aspect_mask,
        base_mip_level: 0,
        level_count: 1,
        base_array_layer: 0,
        layer_count: 1,
    }
}

pub fn transition_image_layout(
    cmd: vk::CommandBuffer,
    image: vk::Image,
    image_aspect: vk::ImageAspectFlags,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    device: &ash::Device,
) {
    if old_layout == new_layout {
        return;
    }

    let image_barrier = vk::ImageMemoryBarrier2::default()
        .src_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .src_access_mask(vk::AccessFlags2::MEMORY_WRITE)
        .dst_stage_mask(vk::PipelineStageFlags2::ALL_COMMANDS)
        .dst_access_mask(vk::AccessFlags2::MEMORY_WRITE | vk::AccessFlags2::MEMORY_READ)
        .old_layout(old_layout)
        .new_layout(new_layout)
        .subresource_range(subresource_range(image_aspect))
        .image(image);

    let image_barriers = [image_barrier];
    let dep_info = vk::DependencyInfo::default()
        .image_memory_barriers(&image_barriers);

    unsafe {
        device.cmd_pipeline_barrier2(cmd, &dep_info);
    }
}

/// Expects `image` in TRANSFER_DST_OPTIMAL
pub fn clear_color_image(
    cmd: vk::CommandBuffer,
    image: vk::Image,
    color: &vk::ClearColorValue,
    device: &ash::Device,
) {
    unsafe {
        device.cmd_clear_color_image(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            color,
            &[subresource_range(vk::ImageAspectFlags::COLOR)],
        );
    }
}

/// Expects `image` in TRANSFER_DST_OPTIMAL
pub fn clear_depth_image(
    cmd: vk::CommandBuffer,
    image: vk::Image,
    aspect: vk::ImageAspectFlags,
    value: &vk::ClearDepthStencilValue,
    device: &ash::Device,
) {
    unsafe {
        device.cmd_clear_depth_stencil_image(
            cmd,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            value,
            &[subresource_range(aspect)],
        );
    }
}

/// Runs `release` when `result` is an error, so handles created before a failing
/// call are not leaked. The result is passed through unchanged.
pub fn release_on_err<T, E>(result: Result<T, E>, release: impl FnOnce()) -> Result<T, E> {
    if result.is_err() {
        release();
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn release_runs_only_on_error() {
        let released = Cell::new(0);
        let ok: Result<u32, vk::Result> = release_on_err(Ok(7), || released.set(released.get() + 1));
        assert_eq!(ok, Ok(7));
        assert_eq!(released.get(), 0);

        let err: Result<u32, vk::Result> = release_on_err(
            Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY),
            || released.set(released.get() + 1),
        );
        assert_eq!(err, Err(vk::Result::ERROR_OUT_OF_DEVICE_MEMORY));
        assert_eq!(released.get(), 1);
    }

    #[test]
    fn release_keeps_eyre_errors() {
        let mut released = false;
        let result: color_eyre::Result<()> = release_on_err(
            Err(color_eyre::eyre::eyre!("No supported depth attachment format found")),
            || released = true,
        );
        assert!(released);
        assert!(result.unwrap_err().to_string().contains("depth attachment"));
    }

    #[test]
    fn subresource_range_covers_single_mip_and_layer() {
        let range = subresource_range(vk::ImageAspectFlags::DEPTH);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::DEPTH);
        assert_eq!((range.base_mip_level, range.level_count), (0, 1));
        assert_eq!((range.base_array_layer, range.layer_count), (0, 1));
    }
}
