//! Per-frame input snapshots
//!
//! The window loop feeds winit events into [`InputState`]; the engine reads it
//! once per frame and then calls [`InputState::end_frame`]. Dropped files
//! arrive through a [`DropSlot`].

use glam::Vec2;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use winit::event::{ElementState, WindowEvent};
use winit::keyboard::PhysicalKey;

pub use winit::event::MouseButton;
pub use winit::keyboard::KeyCode;

/// Pointer position and held buttons
#[derive(Debug, Clone, Default)]
pub struct MouseState {
    pub position: Vec2,
    buttons: HashSet<MouseButton>,
}

impl MouseState {
    pub fn is_pressed(&self, button: MouseButton) -> bool {
        self.buttons.contains(&button)
    }
}

/// Held keys plus the keys that went down this frame
#[derive(Debug, Clone, Default)]
pub struct KeyboardState {
    held: HashSet<KeyCode>,
    just_pressed: HashSet<KeyCode>,
}

impl KeyboardState {
    pub fn is_down(&self, key: KeyCode) -> bool {
        self.held.contains(&key)
    }

    pub fn just_pressed(&self, key: KeyCode) -> bool {
        self.just_pressed.contains(&key)
    }

    pub fn press(&mut self, key: KeyCode) {
        if self.held.insert(key) {
            self.just_pressed.insert(key);
        }
    }

    pub fn release(&mut self, key: KeyCode) {
        self.held.remove(&key);
    }
}

/// Mouse and keyboard state with per-button drag tracking
#[derive(Debug, Clone, Default)]
pub struct InputState {
    pub mouse: MouseState,
    pub keyboard: KeyboardState,
    drag_origin: HashMap<MouseButton, Vec2>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a window event; returns true when the event was consumed
    pub fn handle_window_event(&mut self, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::CursorMoved { position, .. } => {
                self.set_cursor(Vec2::new(position.x as f32, position.y as f32));
                true
            }
            WindowEvent::MouseInput { state, button, .. } => {
                match state {
                    ElementState::Pressed => self.press_button(*button),
                    ElementState::Released => self.release_button(*button),
                }
                true
            }
            WindowEvent::KeyboardInput { event, .. } => {
                let PhysicalKey::Code(code) = event.physical_key else {
                    return false;
                };
                match event.state {
                    ElementState::Pressed => self.keyboard.press(code),
                    ElementState::Released => self.keyboard.release(code),
                }
                true
            }
            WindowEvent::Focused(false) => {
                self.mouse.buttons.clear();
                self.keyboard.held.clear();
                self.drag_origin.clear();
                true
            }
            _ => false,
        }
    }

    pub fn set_cursor(&mut self, position: Vec2) {
        self.mouse.position = position;
    }

    pub fn press_button(&mut self, button: MouseButton) {
        if self.mouse.buttons.insert(button) {
            self.drag_origin.insert(button, self.mouse.position);
        }
    }

    pub fn release_button(&mut self, button: MouseButton) {
        self.mouse.buttons.remove(&button);
        self.drag_origin.remove(&button);
    }

    /// Cursor movement since the previous frame while `button` is held
    pub fn drag_delta(&self, button: MouseButton) -> Vec2 {
        self.drag_origin
            .get(&button)
            .map(|origin| self.mouse.position - *origin)
            .unwrap_or(Vec2::ZERO)
    }

    pub fn is_dragging(&self, button: MouseButton) -> bool {
        self.mouse.is_pressed(button)
    }

    /// Start a new frame: drags restart from the current cursor and
    /// just-pressed keys are forgotten
    pub fn end_frame(&mut self) {
        let position = self.mouse.position;
        for origin in self.drag_origin.values_mut() {
            *origin = position;
        }
        self.keyboard.just_pressed.clear();
    }
}

/// Single-slot handoff of a dropped file path from the window thread
#[derive(Debug, Clone, Default)]
pub struct DropSlot {
    pending: Arc<Mutex<Option<PathBuf>>>,
}

impl DropSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer a path, replacing any path not yet taken
    pub fn offer(&self, path: PathBuf) {
        *self.pending.lock() = Some(path);
    }

    pub fn take(&self) -> Option<PathBuf> {
        self.pending.lock().take()
    }
}

/// Parse a key name such as `"W"`, `"KeyW"`, `"Digit1"`, `"F5"` or `"Space"`
pub fn parse_key_code(name: &str) -> Option<KeyCode> {
    let name = name.trim();
    let name = name.strip_prefix("Key").filter(|s| s.len() == 1).unwrap_or(name);
    let name = name.strip_prefix("Digit").filter(|s| s.len() == 1).unwrap_or(name);

    let key = match name.to_ascii_uppercase().as_str() {
        "A" => KeyCode::KeyA,
        "B" => KeyCode::KeyB,
        "C" => KeyCode::KeyC,
        "D" => KeyCode::KeyD,
        "E" => KeyCode::KeyE,
        "F" => KeyCode::KeyF,
        "G" => KeyCode::KeyG,
        "H" => KeyCode::KeyH,
        "I" => KeyCode::KeyI,
        "J" => KeyCode::KeyJ,
        "K" => KeyCode::KeyK,
        "L" => KeyCode::KeyL,
        "M" => KeyCode::KeyM,
        "N" => KeyCode::KeyN,
        "O" => KeyCode::KeyO,
        "P" => KeyCode::KeyP,
        "Q" => KeyCode::KeyQ,
        "R" => KeyCode::KeyR,
        "S" => KeyCode::KeyS,
        "T" => KeyCode::KeyT,
        "U" => KeyCode::KeyU,
        "V" => KeyCode::KeyV,
        "W" => KeyCode::KeyW,
        "X" => KeyCode::KeyX,
        "Y" => KeyCode::KeyY,
        "Z" => KeyCode::KeyZ,
        "0" => KeyCode::Digit0,
        "1" => KeyCode::Digit1,
        "2" => KeyCode::Digit2,
        "3" => KeyCode::Digit3,
        "4" => KeyCode::Digit4,
        "5" => KeyCode::Digit5,
        "6" => KeyCode::Digit6,
        "7" => KeyCode::Digit7,
        "8" => KeyCode::Digit8,
        "9" => KeyCode::Digit9,
        "F1" => KeyCode::F1,
        "F2" => KeyCode::F2,
        "F3" => KeyCode::F3,
        "F4" => KeyCode::F4,
        "F5" => KeyCode::F5,
        "F6" => KeyCode::F6,
        "F7" => KeyCode::F7,
        "F8" => KeyCode::F8,
        "F9" => KeyCode::F9,
        "F10" => KeyCode::F10,
        "F11" => KeyCode::F11,
        "F12" => KeyCode::F12,
        "SPACE" => KeyCode::Space,
        "TAB" => KeyCode::Tab,
        "ENTER" => KeyCode::Enter,
        "ESCAPE" => KeyCode::Escape,
        "ARROWUP" | "UP" => KeyCode::ArrowUp,
        "ARROWDOWN" | "DOWN" => KeyCode::ArrowDown,
        "ARROWLEFT" | "LEFT" => KeyCode::ArrowLeft,
        "ARROWRIGHT" | "RIGHT" => KeyCode::ArrowRight,
        _ => return None,
    };
    Some(key)
}

/// Parse `"Left"`, `"Right"` or `"Middle"`
pub fn parse_mouse_button(name: &str) -> Option<MouseButton> {
    match name.trim().to_ascii_lowercase().as_str() {
        "left" => Some(MouseButton::Left),
        "right" => Some(MouseButton::Right),
        "middle" => Some(MouseButton::Middle),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_delta_restarts_each_frame() {
        let mut input = InputState::new();
        input.set_cursor(Vec2::new(100.0, 100.0));
        input.press_button(MouseButton::Left);
        input.set_cursor(Vec2::new(110.0, 95.0));
        assert_eq!(input.drag_delta(MouseButton::Left), Vec2::new(10.0, -5.0));
        assert_eq!(input.drag_delta(MouseButton::Right), Vec2::ZERO);

        input.end_frame();
        assert_eq!(input.drag_delta(MouseButton::Left), Vec2::ZERO);
        input.release_button(MouseButton::Left);
        input.set_cursor(Vec2::ZERO);
        assert_eq!(input.drag_delta(MouseButton::Left), Vec2::ZERO);
    }

    #[test]
    fn just_pressed_lasts_one_frame() {
        let mut input = InputState::new();
        input.keyboard.press(KeyCode::KeyW);
        assert!(input.keyboard.just_pressed(KeyCode::KeyW));
        input.end_frame();
        assert!(input.keyboard.is_down(KeyCode::KeyW));
        assert!(!input.keyboard.just_pressed(KeyCode::KeyW));
        // Key repeat does not re-trigger
        input.keyboard.press(KeyCode::KeyW);
        assert!(!input.keyboard.just_pressed(KeyCode::KeyW));
    }

    #[test]
    fn drop_slot_keeps_latest_path() {
        let slot = DropSlot::new();
        let producer = slot.clone();
        producer.offer("a.png".into());
        producer.offer("b.png".into());
        assert_eq!(slot.take(), Some(PathBuf::from("b.png")));
        assert_eq!(slot.take(), None);
    }

    #[test]
    fn key_names() {
        assert_eq!(parse_key_code("w"), Some(KeyCode::KeyW));
        assert_eq!(parse_key_code("KeyQ"), Some(KeyCode::KeyQ));
        assert_eq!(parse_key_code("Digit2"), Some(KeyCode::Digit2));
        assert_eq!(parse_key_code("F12"), Some(KeyCode::F12));
        assert_eq!(parse_key_code("Hyper"), None);
        assert_eq!(parse_mouse_button("Right"), Some(MouseButton::Right));
    }
}
