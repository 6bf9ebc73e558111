//! Arcball camera driven by pointer and wheel input.
//!
//! The controller is a plain value: [`CameraController::apply`] maps the
//! current state and one [`InputEvent`] to the next state without touching
//! any windowing system.

use glam::{Mat3, Quat, Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Dot products at or above `1 - ARCBALL_EPSILON` count as "no movement".
pub const ARCBALL_EPSILON: f32 = 1e-6;

/// Rotation, pan and zoom consumed by the ray marcher.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CameraState {
    /// Accumulated orthonormal rotation applied to the volume.
    pub rotation: Mat3,
    /// Offset as a fraction of the viewport, y pointing up.
    pub pan: Vec2,
    pub scale: f32,
}

impl Default for CameraState {
    fn default() -> Self {
        Self {
            rotation: Mat3::IDENTITY,
            pan: Vec2::ZERO,
            scale: 1.0,
        }
    }
}

impl CameraState {
    pub fn zoom_percent(&self) -> f32 {
        self.scale * 100.0
    }
}

/// Zoom bounds and wheel step factors.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub min_scale: f32,
    pub max_scale: f32,
    /// Applied when the wheel scrolls toward the user (`delta_y > 0`).
    pub zoom_out_factor: f32,
    pub zoom_in_factor: f32,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            min_scale: 0.1,
            max_scale: 5.0,
            zoom_out_factor: 0.9,
            zoom_in_factor: 1.1,
        }
    }
}

impl CameraConfig {
    /// Positive finite zoom bounds with `min_scale <= max_scale`.
    ///
    /// Unusable bounds fall back to the defaults and reversed bounds are
    /// swapped.
    pub fn sanitized(self) -> Self {
        let defaults = Self::default();
        let usable = |value: f32, fallback: f32| {
            if value.is_finite() && value > 0.0 {
                value
            } else {
                fallback
            }
        };
        let a = usable(self.min_scale, defaults.min_scale);
        let b = usable(self.max_scale, defaults.max_scale);
        Self {
            min_scale: a.min(b),
            max_scale: a.max(b),
            ..self
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PointerButton {
    Primary,
    Secondary,
    Middle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DragMode {
    #[default]
    Idle,
    Rotating,
    Panning,
}

/// Pointer positions are canvas pixels with y pointing down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum InputEvent {
    PointerDown { button: PointerButton, position: Vec2 },
    PointerMove { position: Vec2 },
    PointerUp { button: PointerButton },
    Wheel { delta_y: f32 },
    Resize { width: f32, height: f32 },
    Reset,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraController {
    config: CameraConfig,
    viewport: Vec2,
    mode: DragMode,
    last_pointer: Option<Vec2>,
    state: CameraState,
}

impl CameraController {
    /// Zoom bounds in `config` are passed through [`CameraConfig::sanitized`].
    pub fn new(config: CameraConfig, width: f32, height: f32) -> Self {
        Self {
            config: config.sanitized(),
            viewport: Vec2::new(width, height).max(Vec2::ONE),
            mode: DragMode::Idle,
            last_pointer: None,
            state: CameraState::default(),
        }
    }

    pub fn state(&self) -> &CameraState {
        &self.state
    }

    pub fn mode(&self) -> DragMode {
        self.mode
    }

    pub fn viewport(&self) -> Vec2 {
        self.viewport
    }

    /// Next controller state after `event`.
    #[must_use]
    pub fn apply(&self, event: &InputEvent) -> Self {
        let mut next = *self;
        match *event {
            InputEvent::PointerDown { button, position } => {
                next.mode = match button {
                    PointerButton::Primary => DragMode::Panning,
                    PointerButton::Secondary => DragMode::Rotating,
                    PointerButton::Middle => self.mode,
                };
                next.last_pointer = Some(position);
            }
            InputEvent::PointerMove { position } => {
                if let Some(previous) = self.last_pointer {
                    match self.mode {
                        DragMode::Rotating => {
                            let incremental = arcball_rotation(
                                self.to_ndc(previous),
                                self.to_ndc(position),
                            );
                            if incremental != Mat3::IDENTITY {
                                next.state.rotation =
                                    orthonormalize(incremental * self.state.rotation);
                            }
                        }
                        DragMode::Panning => {
                            let delta = (position - previous) / self.viewport;
                            // Canvas y grows downward, pan y grows upward.
                            next.state.pan += Vec2::new(delta.x, -delta.y);
                        }
                        DragMode::Idle => {}
                    }
                }
                next.last_pointer = Some(position);
            }
            InputEvent::PointerUp { .. } => {
                next.mode = DragMode::Idle;
                next.last_pointer = None;
            }
            InputEvent::Wheel { delta_y } => {
                next.state.scale = self.zoomed_scale(delta_y);
            }
            InputEvent::Resize { width, height } => {
                next.viewport = Vec2::new(width, height).max(Vec2::ONE);
            }
            InputEvent::Reset => {
                next.mode = DragMode::Idle;
                next.last_pointer = None;
                next.state = CameraState::default();
            }
        }
        next
    }

    /// In-place variant of [`apply`](Self::apply).
    pub fn handle(&mut self, event: &InputEvent) {
        *self = self.apply(event);
    }

    fn zoomed_scale(&self, delta_y: f32) -> f32 {
        if delta_y == 0.0 || delta_y.is_nan() {
            return self.state.scale;
        }
        let factor = if delta_y > 0.0 {
            self.config.zoom_out_factor
        } else {
            self.config.zoom_in_factor
        };
        (self.state.scale * factor).clamp(self.config.min_scale, self.config.max_scale)
    }

    fn to_ndc(&self, position: Vec2) -> Vec2 {
        Vec2::new(
            2.0 * position.x / self.viewport.x - 1.0,
            1.0 - 2.0 * position.y / self.viewport.y,
        )
    }
}

/// Projects a point in normalized device coordinates onto the unit arcball.
pub fn project_to_sphere(point: Vec2) -> Vec3 {
    let length_squared = point.length_squared();
    if length_squared <= 1.0 {
        Vec3::new(point.x, point.y, (1.0 - length_squared).sqrt())
    } else {
        point.extend(0.0).normalize()
    }
}

/// Incremental rotation for a drag from `from` to `to` (both in NDC).
///
/// Returns exactly [`Mat3::IDENTITY`] when the projected vectors coincide or
/// the rotation axis degenerates.
pub fn arcball_rotation(from: Vec2, to: Vec2) -> Mat3 {
    let v0 = project_to_sphere(from);
    let v1 = project_to_sphere(to);

    let dot = v0.dot(v1).clamp(-1.0, 1.0);
    if dot >= 1.0 - ARCBALL_EPSILON {
        return Mat3::IDENTITY;
    }

    let axis = v0.cross(v1);
    if axis.length_squared() <= f32::EPSILON * f32::EPSILON {
        return Mat3::IDENTITY;
    }

    Mat3::from_axis_angle(axis.normalize(), dot.acos())
}

fn orthonormalize(rotation: Mat3) -> Mat3 {
    Mat3::from_quat(Quat::from_mat3(&rotation).normalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn controller() -> CameraController {
        CameraController::new(CameraConfig::default(), 200.0, 100.0)
    }

    fn assert_orthonormal(m: Mat3) {
        let product = m * m.transpose();
        for (a, b) in product
            .to_cols_array()
            .iter()
            .zip(Mat3::IDENTITY.to_cols_array().iter())
        {
            assert_abs_diff_eq!(a, b, epsilon = 1e-4);
        }
        assert_abs_diff_eq!(m.determinant(), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn unmoved_pointer_is_exact_identity() {
        for point in [Vec2::ZERO, Vec2::new(0.3, -0.2), Vec2::new(1.5, 2.0)] {
            assert_eq!(arcball_rotation(point, point), Mat3::IDENTITY);
        }
    }

    #[test]
    fn hemisphere_projection_is_unit_length() {
        for point in [Vec2::new(0.2, 0.4), Vec2::new(3.0, -4.0), Vec2::new(1.0, 0.0)] {
            assert_abs_diff_eq!(project_to_sphere(point).length(), 1.0, epsilon = 1e-6);
        }
        let rim = project_to_sphere(Vec2::new(3.0, 4.0));
        assert_abs_diff_eq!(rim.x, 0.6, epsilon = 1e-6);
        assert_abs_diff_eq!(rim.y, 0.8, epsilon = 1e-6);
        assert_eq!(rim.z, 0.0);
    }

    #[test]
    fn arcball_maps_start_vector_onto_end_vector() {
        let from = Vec2::new(-0.2, 0.1);
        let to = Vec2::new(0.4, 0.3);
        let rotation = arcball_rotation(from, to);
        let moved = rotation * project_to_sphere(from);
        assert_abs_diff_eq!(moved.x, project_to_sphere(to).x, epsilon = 1e-5);
        assert_abs_diff_eq!(moved.y, project_to_sphere(to).y, epsilon = 1e-5);
        assert_abs_diff_eq!(moved.z, project_to_sphere(to).z, epsilon = 1e-5);
    }

    #[test]
    fn opposite_points_fall_back_to_identity() {
        let rotation = arcball_rotation(Vec2::new(2.0, 0.0), Vec2::new(-2.0, 0.0));
        assert_eq!(rotation, Mat3::IDENTITY);
    }

    #[test]
    fn buttons_drive_transitions() {
        let mut camera = controller();
        assert_eq!(camera.mode(), DragMode::Idle);

        camera.handle(&InputEvent::PointerDown {
            button: PointerButton::Primary,
            position: Vec2::new(10.0, 10.0),
        });
        assert_eq!(camera.mode(), DragMode::Panning);

        camera.handle(&InputEvent::PointerUp {
            button: PointerButton::Primary,
        });
        assert_eq!(camera.mode(), DragMode::Idle);

        camera.handle(&InputEvent::PointerDown {
            button: PointerButton::Secondary,
            position: Vec2::new(10.0, 10.0),
        });
        assert_eq!(camera.mode(), DragMode::Rotating);

        camera.handle(&InputEvent::Wheel { delta_y: -1.0 });
        assert_eq!(camera.mode(), DragMode::Rotating);
    }

    #[test]
    fn apply_does_not_mutate_the_source() {
        let camera = controller();
        let next = camera.apply(&InputEvent::Wheel { delta_y: -3.0 });
        assert_eq!(camera.state().scale, 1.0);
        assert_abs_diff_eq!(next.state().scale, 1.1, epsilon = 1e-6);
    }

    #[test]
    fn pan_accumulates_normalized_delta_with_inverted_y() {
        let mut camera = controller();
        camera.handle(&InputEvent::PointerDown {
            button: PointerButton::Primary,
            position: Vec2::new(100.0, 50.0),
        });
        camera.handle(&InputEvent::PointerMove {
            position: Vec2::new(150.0, 75.0),
        });
        camera.handle(&InputEvent::PointerMove {
            position: Vec2::new(170.0, 85.0),
        });
        let pan = camera.state().pan;
        assert_abs_diff_eq!(pan.x, 0.35, epsilon = 1e-6);
        assert_abs_diff_eq!(pan.y, -0.35, epsilon = 1e-6);

        camera.handle(&InputEvent::PointerUp {
            button: PointerButton::Primary,
        });
        camera.handle(&InputEvent::PointerMove {
            position: Vec2::new(0.0, 0.0),
        });
        assert_eq!(camera.state().pan, pan);
    }

    #[test]
    fn rotation_composes_across_drags() {
        let mut camera = controller();
        let drags = [
            (Vec2::new(100.0, 50.0), Vec2::new(130.0, 50.0)),
            (Vec2::new(100.0, 50.0), Vec2::new(100.0, 30.0)),
        ];
        let mut expected = Mat3::IDENTITY;
        for (start, end) in drags {
            camera.handle(&InputEvent::PointerDown {
                button: PointerButton::Secondary,
                position: start,
            });
            camera.handle(&InputEvent::PointerMove { position: end });
            camera.handle(&InputEvent::PointerUp {
                button: PointerButton::Secondary,
            });
            expected = arcball_rotation(camera.to_ndc(start), camera.to_ndc(end)) * expected;
        }

        let actual = camera.state().rotation.to_cols_array();
        for (a, b) in actual.iter().zip(expected.to_cols_array().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 1e-5);
        }
        assert_ne!(camera.state().rotation, Mat3::IDENTITY);
    }

    #[test]
    fn long_drags_stay_orthonormal() {
        let mut camera = controller();
        camera.handle(&InputEvent::PointerDown {
            button: PointerButton::Secondary,
            position: Vec2::new(100.0, 50.0),
        });
        for step in 0..2000 {
            let t = step as f32 * 0.05;
            camera.handle(&InputEvent::PointerMove {
                position: Vec2::new(100.0 + 80.0 * t.sin(), 50.0 + 40.0 * (1.3 * t).cos()),
            });
        }
        assert_orthonormal(camera.state().rotation);
    }

    #[test]
    fn zoom_stays_bounded_under_alternating_wheel() {
        let mut camera = controller();
        for i in 0..10_000 {
            let delta_y = if (i / 37) % 2 == 0 { 1.0 } else { -1.0 };
            camera.handle(&InputEvent::Wheel { delta_y });
            let scale = camera.state().scale;
            assert!((0.1..=5.0).contains(&scale), "scale {scale} escaped bounds");
        }
        for _ in 0..100 {
            camera.handle(&InputEvent::Wheel { delta_y: -1.0 });
        }
        assert_eq!(camera.state().scale, 5.0);
        for _ in 0..100 {
            camera.handle(&InputEvent::Wheel { delta_y: 1.0 });
        }
        assert_eq!(camera.state().scale, 0.1);
    }

    #[test]
    fn reversed_zoom_bounds_are_swapped() {
        let config = CameraConfig {
            min_scale: 6.0,
            max_scale: 5.0,
            ..CameraConfig::default()
        };
        let mut camera = CameraController::new(config, 200.0, 100.0);
        camera.handle(&InputEvent::Wheel { delta_y: 1.0 });
        assert_eq!(camera.state().scale, 5.0);
        for _ in 0..10 {
            camera.handle(&InputEvent::Wheel { delta_y: -1.0 });
        }
        assert_eq!(camera.state().scale, 6.0);
    }

    #[test]
    fn unusable_zoom_bounds_fall_back_to_defaults() {
        let config = CameraConfig {
            min_scale: f32::NAN,
            max_scale: -1.0,
            ..CameraConfig::default()
        }
        .sanitized();
        assert_eq!(config.min_scale, 0.1);
        assert_eq!(config.max_scale, 5.0);
    }

    #[test]
    fn zero_wheel_delta_is_ignored() {
        let camera = controller();
        assert_eq!(camera.apply(&InputEvent::Wheel { delta_y: 0.0 }), camera);
    }

    #[test]
    fn reset_restores_defaults() {
        let mut camera = controller();
        camera.handle(&InputEvent::Wheel { delta_y: -1.0 });
        camera.handle(&InputEvent::PointerDown {
            button: PointerButton::Primary,
            position: Vec2::new(0.0, 0.0),
        });
        camera.handle(&InputEvent::PointerMove {
            position: Vec2::new(20.0, 20.0),
        });
        camera.handle(&InputEvent::Reset);

        assert_eq!(camera.mode(), DragMode::Idle);
        assert_eq!(*camera.state(), CameraState::default());
        assert_eq!(camera.state().zoom_percent(), 100.0);
    }

    #[test]
    fn resize_changes_pan_normalization() {
        let mut camera = controller();
        camera.handle(&InputEvent::Resize {
            width: 400.0,
            height: 400.0,
        });
        camera.handle(&InputEvent::PointerDown {
            button: PointerButton::Primary,
            position: Vec2::ZERO,
        });
        camera.handle(&InputEvent::PointerMove {
            position: Vec2::new(100.0, 0.0),
        });
        assert_abs_diff_eq!(camera.state().pan.x, 0.25, epsilon = 1e-6);
    }
}
