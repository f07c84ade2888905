//! Mouse and keyboard mapping onto map actions

use macroquad::prelude::*;

/// Pointer travel, in pixels, after which a press becomes a drag.
const DRAG_THRESHOLD: f32 = 4.0;
/// Zoom factor per wheel notch; below one zooms in.
const ZOOM_STEP: f64 = 0.8;
/// Radius change per key press, in overworld blocks.
pub const RADIUS_STEP: f64 = 1_000.0;

#[derive(Debug, Clone, PartialEq)]
pub enum InputAction {
    Click { x: f32, y: f32 },
    Pan { dx: f32, dy: f32 },
    Zoom { factor: f64, x: f32, y: f32 },
    Recenter,
    Radius(f64),
    /// Rescale the selected coordinate, `1/8` into nether units, `8` back.
    ScaleSelection(f64),
    ShareSelection,
    Quit,
}

/// Press/drag/release tracking, kept free of window calls so it can be tested.
#[derive(Debug, Default)]
pub struct PointerState {
    pressed_at: Option<(f32, f32)>,
    last: (f32, f32),
    dragging: bool,
}

impl PointerState {
    pub fn update(&mut self, position: (f32, f32), down: bool) -> Option<InputAction> {
        let action = match (self.pressed_at, down) {
            (None, true) => {
                self.pressed_at = Some(position);
                self.dragging = false;
                None
            }
            (Some(start), true) => {
                let travelled = ((position.0 - start.0).powi(2) + (position.1 - start.1).powi(2)).sqrt();
                if travelled > DRAG_THRESHOLD {
                    self.dragging = true;
                }
                let (dx, dy) = (position.0 - self.last.0, position.1 - self.last.1);
                if self.dragging && (dx != 0.0 || dy != 0.0) {
                    Some(InputAction::Pan { dx, dy })
                } else {
                    None
                }
            }
            (Some(_), false) => {
                self.pressed_at = None;
                if self.dragging {
                    self.dragging = false;
                    None
                } else {
                    Some(InputAction::Click {
                        x: position.0,
                        y: position.1,
                    })
                }
            }
            (None, false) => None,
        };

        self.last = position;
        action
    }
}

pub struct InputManager {
    pointer: PointerState,
    radius: f64,

    // Previous frame key states for edge detection
    prev_key_c: bool,
    prev_key_n: bool,
    prev_key_o: bool,
    prev_key_j: bool,
    prev_key_up: bool,
    prev_key_down: bool,
    prev_key_0: bool,
}

impl InputManager {
    pub fn new(radius: f64) -> Self {
        Self {
            pointer: PointerState::default(),
            radius: radius.max(0.0),
            prev_key_c: false,
            prev_key_n: false,
            prev_key_o: false,
            prev_key_j: false,
            prev_key_up: false,
            prev_key_down: false,
            prev_key_0: false,
        }
    }

    pub fn radius(&self) -> f64 {
        self.radius
    }

    fn step_radius(&mut self, delta: f64) -> InputAction {
        self.radius = (self.radius + delta).max(0.0);
        InputAction::Radius(self.radius)
    }

    /// Samples this frame's input.
    pub fn update(&mut self) -> Vec<InputAction> {
        let mut actions = Vec::new();

        let position = mouse_position();
        if let Some(action) = self
            .pointer
            .update(position, is_mouse_button_down(MouseButton::Left))
        {
            actions.push(action);
        }

        let (_, wheel) = mouse_wheel();
        if wheel != 0.0 {
            let factor = if wheel > 0.0 { ZOOM_STEP } else { 1.0 / ZOOM_STEP };
            actions.push(InputAction::Zoom {
                factor,
                x: position.0,
                y: position.1,
            });
        }

        let key_c = is_key_down(KeyCode::C);
        let key_n = is_key_down(KeyCode::N);
        let key_o = is_key_down(KeyCode::O);
        let key_j = is_key_down(KeyCode::J);
        let key_up = is_key_down(KeyCode::Up);
        let key_down = is_key_down(KeyCode::Down);
        let key_0 = is_key_down(KeyCode::Key0);

        if key_c && !self.prev_key_c {
            actions.push(InputAction::Recenter);
        }
        if key_n && !self.prev_key_n {
            actions.push(InputAction::ScaleSelection(0.125));
        }
        if key_o && !self.prev_key_o {
            actions.push(InputAction::ScaleSelection(8.0));
        }
        if key_j && !self.prev_key_j {
            actions.push(InputAction::ShareSelection);
        }
        if key_up && !self.prev_key_up {
            actions.push(self.step_radius(RADIUS_STEP));
        }
        if key_down && !self.prev_key_down {
            actions.push(self.step_radius(-RADIUS_STEP));
        }
        if key_0 && !self.prev_key_0 {
            self.radius = 0.0;
            actions.push(InputAction::Radius(0.0));
        }
        if is_key_down(KeyCode::Escape) {
            actions.push(InputAction::Quit);
        }

        self.prev_key_c = key_c;
        self.prev_key_n = key_n;
        self.prev_key_o = key_o;
        self.prev_key_j = key_j;
        self.prev_key_up = key_up;
        self.prev_key_down = key_down;
        self.prev_key_0 = key_0;

        actions
    }
}

impl Default for InputManager {
    fn default() -> Self {
        Self::new(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_press_release_in_place_is_click() {
        let mut pointer = PointerState::default();
        assert_eq!(pointer.update((10.0, 10.0), true), None);
        assert_eq!(pointer.update((11.0, 10.0), true), None);
        assert_eq!(
            pointer.update((11.0, 10.0), false),
            Some(InputAction::Click { x: 11.0, y: 10.0 })
        );
    }

    #[test]
    fn test_drag_pans_without_click() {
        let mut pointer = PointerState::default();
        pointer.update((10.0, 10.0), true);
        assert_eq!(
            pointer.update((30.0, 15.0), true),
            Some(InputAction::Pan { dx: 20.0, dy: 5.0 })
        );
        assert_eq!(
            pointer.update((35.0, 15.0), true),
            Some(InputAction::Pan { dx: 5.0, dy: 0.0 })
        );
        assert_eq!(pointer.update((35.0, 15.0), false), None);
        assert_eq!(pointer.update((35.0, 15.0), false), None);
    }

    #[test]
    fn test_radius_steps_never_negative() {
        let mut input = InputManager::new(500.0);
        assert_eq!(input.step_radius(RADIUS_STEP), InputAction::Radius(1_500.0));
        assert_eq!(input.step_radius(-5_000.0), InputAction::Radius(0.0));
        assert_eq!(input.radius(), 0.0);
    }
}
