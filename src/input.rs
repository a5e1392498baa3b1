// Mouse state shared between the window loop and the GUI
//
// Buttons keep a level (`is_pressed`) and two edge flags that stay set for
// exactly one frame.

use winit::event::{ElementState, MouseButton};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ButtonState {
    pub is_pressed: bool,
    pub was_clicked: bool,
    pub was_released: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub delta_x: f32,
    pub delta_y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MouseState {
    /// Left and right button
    pub buttons: [ButtonState; 2],
    pub position: Position,
    /// False while the GUI is using the mouse
    pub available: bool,
}

impl Default for MouseState {
    fn default() -> Self {
        Self {
            buttons: [ButtonState::default(); 2],
            position: Position::default(),
            available: true,
        }
    }
}

impl MouseState {
    pub fn on_button(&mut self, button: MouseButton, state: ElementState) {
        let index = match button {
            MouseButton::Left => 0,
            MouseButton::Right => 1,
            _ => return,
        };
        let button = &mut self.buttons[index];
        match state {
            ElementState::Pressed => {
                button.is_pressed = true;
                button.was_clicked = true;
            }
            ElementState::Released => {
                button.is_pressed = false;
                button.was_released = true;
            }
        }
    }

    pub fn on_move(&mut self, x: f32, y: f32) {
        self.position.delta_x += x - self.position.x;
        self.position.delta_y += y - self.position.y;
        self.position.x = x;
        self.position.y = y;
    }

    /// Clear per-frame edges and motion
    pub fn end_frame(&mut self) {
        for button in &mut self.buttons {
            button.was_clicked = false;
            button.was_released = false;
        }
        self.position.delta_x = 0.0;
        self.position.delta_y = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn click_sets_level_and_edge() {
        let mut mouse = MouseState::default();
        mouse.on_button(MouseButton::Left, ElementState::Pressed);
        assert!(mouse.buttons[0].is_pressed);
        assert!(mouse.buttons[0].was_clicked);

        mouse.end_frame();
        assert!(mouse.buttons[0].is_pressed);
        assert!(!mouse.buttons[0].was_clicked);

        mouse.on_button(MouseButton::Left, ElementState::Released);
        assert!(!mouse.buttons[0].is_pressed);
        assert!(mouse.buttons[0].was_released);
    }

    #[test]
    fn other_buttons_are_ignored() {
        let mut mouse = MouseState::default();
        mouse.on_button(MouseButton::Middle, ElementState::Pressed);
        assert_eq!(mouse, MouseState::default());
    }

    #[test]
    fn motion_accumulates_until_frame_end() {
        let mut mouse = MouseState::default();
        mouse.on_move(10.0, 5.0);
        mouse.on_move(12.0, 4.0);
        assert_eq!(mouse.position.delta_x, 12.0);
        assert_eq!(mouse.position.delta_y, 4.0);

        mouse.end_frame();
        assert_eq!(mouse.position.delta_x, 0.0);
        assert_eq!((mouse.position.x, mouse.position.y), (12.0, 4.0));
    }
}
