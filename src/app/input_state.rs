use std::collections::HashSet;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Which keys are held down right now
#[derive(Default)]
pub struct InputState {
    keys_down: HashSet<KeyCode>,
}

impl InputState {
    /// Feeds one window event. Returns the key this event released, if any.
    pub fn process_window_events(&mut self, event: &WindowEvent) -> Option<KeyCode> {
        match event {
            WindowEvent::KeyboardInput {
                event,
                ..
            } => self.process_key(event.physical_key, event.state),
            WindowEvent::Focused(false) => {
                // Releases that happen while unfocused never reach us
                self.keys_down.clear();
                None
            }
            _ => None,
        }
    }

    /// A release is reported even when its press was never seen
    pub fn process_key(&mut self, key: PhysicalKey, state: ElementState) -> Option<KeyCode> {
        let PhysicalKey::Code(code) = key else {
            return None;
        };
        self.set_key(code, state);
        match state {
            ElementState::Released => Some(code),
            ElementState::Pressed => None,
        }
    }

    pub fn set_key(&mut self, code: KeyCode, state: ElementState) {
        match state {
            ElementState::Pressed => {
                self.keys_down.insert(code);
            }
            ElementState::Released => {
                self.keys_down.remove(&code);
            }
        }
    }

    #[allow(dead_code)]
    pub fn is_key_down(&self, code: KeyCode) -> bool {
        self.keys_down.contains(&code)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::keyboard::NativeKeyCode;

    #[test]
    fn unknown_keys_are_up() {
        let input = InputState::default();
        assert!(!input.is_key_down(KeyCode::KeyW));
    }

    #[test]
    fn press_and_release() {
        let mut input = InputState::default();
        input.set_key(KeyCode::Space, ElementState::Pressed);
        assert!(input.is_key_down(KeyCode::Space));
        assert!(!input.is_key_down(KeyCode::Escape));

        input.set_key(KeyCode::Space, ElementState::Released);
        assert!(!input.is_key_down(KeyCode::Space));
    }

    #[test]
    fn repeated_presses_need_one_release() {
        let mut input = InputState::default();
        input.set_key(KeyCode::KeyA, ElementState::Pressed);
        input.set_key(KeyCode::KeyA, ElementState::Pressed);
        input.set_key(KeyCode::KeyA, ElementState::Released);
        assert!(!input.is_key_down(KeyCode::KeyA));
    }

    #[test]
    fn release_is_reported_once() {
        let mut input = InputState::default();
        let escape = PhysicalKey::Code(KeyCode::Escape);
        assert_eq!(input.process_key(escape, ElementState::Pressed), None);
        assert!(input.is_key_down(KeyCode::Escape));
        assert_eq!(input.process_key(escape, ElementState::Released), Some(KeyCode::Escape));
        assert!(!input.is_key_down(KeyCode::Escape));
    }

    #[test]
    fn release_after_focus_loss_is_still_reported() {
        let mut input = InputState::default();
        let escape = PhysicalKey::Code(KeyCode::Escape);
        input.process_key(escape, ElementState::Pressed);
        assert_eq!(input.process_window_events(&WindowEvent::Focused(false)), None);
        assert_eq!(input.process_window_events(&WindowEvent::Focused(true)), None);
        assert_eq!(input.process_key(escape, ElementState::Released), Some(KeyCode::Escape));
    }

    #[test]
    fn unidentified_keys_are_ignored() {
        let mut input = InputState::default();
        let key = PhysicalKey::Unidentified(NativeKeyCode::Unidentified);
        assert_eq!(input.process_key(key, ElementState::Released), None);
    }

    #[test]
    fn losing_focus_releases_everything() {
        let mut input = InputState::default();
        input.set_key(KeyCode::KeyA, ElementState::Pressed);
        input.set_key(KeyCode::KeyD, ElementState::Pressed);
        input.process_window_events(&WindowEvent::Focused(false));
        assert!(!input.is_key_down(KeyCode::KeyA));
        assert!(!input.is_key_down(KeyCode::KeyD));
    }
}
