use ash::vk;

pub struct Queue {
    pub family: QueueFamily,
    pub handle: vk::Queue,
}

impl Queue {
    pub fn new(
        family: QueueFamily,
        handle: vk::Queue,
    ) -> Self {
        Self {
            family,
            handle,
        }
    }
}

#[derive(Clone, Debug)]
pub struct QueueFamily {
    pub index: u32,
    pub properties: vk::QueueFamilyProperties,
    supports_present: bool,
}

impl QueueFamily {
    pub fn new(
        index: u32,
        properties: vk::QueueFamilyProperties,
        supports_present: bool
    ) -> Self {
        Self {
            index,
            properties,
            supports_present,
        }
    }

    pub fn supports_present(&self) -> bool {
        self.supports_present
    }

    pub fn supports_graphics(&self) -> bool {
        self.properties.queue_flags.contains(vk::QueueFlags::GRAPHICS)
    }
}

impl PartialEq for QueueFamily {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl Eq for QueueFamily {}

/// Returns the first queue family that can both render and present.
///
/// `supports_present` is only asked about families that already support graphics.
pub fn select_queue_family_index<F>(
    families: &[vk::QueueFamilyProperties],
    mut supports_present: F,
) -> Option<u32>
where
    F: FnMut(u32) -> bool,
{
    families
        .iter()
        .enumerate()
        .filter(|(_, props)| props.queue_count > 0)
        .filter(|(_, props)| props.queue_flags.contains(vk::QueueFlags::GRAPHICS))
        .map(|(i, _)| i as u32)
        .find(|&i| supports_present(i))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(flags: vk::QueueFlags) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: 1,
            ..Default::default()
        }
    }

    #[test]
    fn picks_first_graphics_family_with_present() {
        let families = [
            family(vk::QueueFlags::TRANSFER),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        assert_eq!(select_queue_family_index(&families, |_| true), Some(1));
    }

    #[test]
    fn skips_graphics_family_without_present() {
        let families = [
            family(vk::QueueFlags::GRAPHICS),
            family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER),
        ];
        assert_eq!(select_queue_family_index(&families, |i| i == 1), Some(1));
    }

    #[test]
    fn present_only_family_is_not_enough() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::TRANSFER),
        ];
        assert_eq!(select_queue_family_index(&families, |_| true), None);
    }

    #[test]
    fn present_is_only_queried_for_graphics_families() {
        let families = [
            family(vk::QueueFlags::COMPUTE),
            family(vk::QueueFlags::GRAPHICS),
        ];
        let mut queried = Vec::new();
        let selected = select_queue_family_index(&families, |i| {
            queried.push(i);
            true
        });
        assert_eq!(selected, Some(1));
        assert_eq!(queried, vec![1]);
    }

    #[test]
    fn empty_families_are_ignored() {
        let mut empty = family(vk::QueueFlags::GRAPHICS);
        empty.queue_count = 0;
        let families = [empty, family(vk::QueueFlags::GRAPHICS)];
        assert_eq!(select_queue_family_index(&families, |_| true), Some(1));
    }

    #[test]
    fn queue_family_capabilities() {
        let props = family(vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER);
        let qf = QueueFamily::new(2, props, true);
        assert!(qf.supports_graphics());
        assert!(qf.supports_present());
        assert!(!QueueFamily::new(3, family(vk::QueueFlags::COMPUTE), true).supports_graphics());
        assert_eq!(qf, QueueFamily::new(2, family(vk::QueueFlags::COMPUTE), false));
    }
}
