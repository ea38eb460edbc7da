//! Orbit camera driven by pointer deltas.
//!
//! The controller is a pure transition over [`CameraPose`]: drag bookkeeping
//! (press, move, release) belongs to the host, which only forwards deltas while
//! a drag is active.

use glam::{Mat4, Quat, Vec3};
use serde::Deserialize;

/// Radians of orbit per pixel of drag.
pub const SENSITIVITY: f32 = 0.01;
/// World units of dolly per pixel of horizontal drag.
pub const DOLLY_SENSITIVITY: f32 = 0.01;
/// Pitch limit; stops short of straight up/down so the orbit never flips.
pub const MAX_PITCH: f32 = 89.0 * std::f32::consts::PI / 180.0;
/// Closest the camera may get to the orbit target.
pub const MIN_DOLLY: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPose {
    /// Rotation about the world Y axis, radians.
    pub yaw: f32,
    /// Elevation above the XZ plane, radians.
    pub pitch: f32,
    /// Distance from the orbit target.
    pub dolly: f32,
}

impl CameraPose {
    pub const fn new(yaw: f32, pitch: f32, dolly: f32) -> Self {
        Self { yaw, pitch, dolly }
    }

    /// Camera position in world space, orbiting the origin.
    pub fn eye(&self) -> Vec3 {
        let rotation = Quat::from_rotation_y(self.yaw) * Quat::from_rotation_x(-self.pitch);
        rotation * Vec3::new(0.0, 0.0, self.dolly)
    }

    pub fn view_matrix(&self) -> Mat4 {
        Mat4::look_at_rh(self.eye(), Vec3::ZERO, Vec3::Y)
    }
}

impl Default for CameraPose {
    fn default() -> Self {
        Self::new(20f32.to_radians(), 10f32.to_radians(), 20.0)
    }
}

/// One forwarded pointer-move.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DragDelta {
    pub dx: f32,
    pub dy: f32,
    /// Held modifier switches from orbit to dolly.
    pub modifier: bool,
}

impl DragDelta {
    pub const fn new(dx: f32, dy: f32, modifier: bool) -> Self {
        Self { dx, dy, modifier }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct CameraSettings {
    pub sensitivity: f32,
    pub dolly_sensitivity: f32,
    pub max_pitch_degrees: f32,
    pub min_dolly: f32,
}

impl Default for CameraSettings {
    fn default() -> Self {
        Self {
            sensitivity: SENSITIVITY,
            dolly_sensitivity: DOLLY_SENSITIVITY,
            max_pitch_degrees: MAX_PITCH.to_degrees(),
            min_dolly: MIN_DOLLY,
        }
    }
}

/// Applies drag deltas to a pose. Holds only tuning constants, never drag state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraController {
    sensitivity: f32,
    dolly_sensitivity: f32,
    max_pitch: f32,
    min_dolly: f32,
}

impl CameraController {
    pub fn new(settings: &CameraSettings) -> Self {
        Self {
            sensitivity: settings.sensitivity,
            dolly_sensitivity: settings.dolly_sensitivity,
            max_pitch: settings.max_pitch_degrees.to_radians(),
            min_dolly: settings.min_dolly.max(0.0),
        }
    }

    pub fn max_pitch(&self) -> f32 {
        self.max_pitch
    }

    pub fn min_dolly(&self) -> f32 {
        self.min_dolly
    }

    /// Bring an arbitrary pose inside the controller's limits.
    pub fn clamp(&self, pose: CameraPose) -> CameraPose {
        CameraPose {
            yaw: pose.yaw,
            pitch: pose.pitch.clamp(-self.max_pitch, self.max_pitch),
            dolly: pose.dolly.max(self.min_dolly),
        }
    }

    /// Orbit (no modifier) or dolly (modifier) by one pointer delta.
    ///
    /// Dolly only follows the horizontal component; `dy` is ignored while the
    /// modifier is held. Zero or non-finite deltas leave the pose unchanged.
    pub fn apply_delta(&self, pose: CameraPose, dx: f32, dy: f32, modifier: bool) -> CameraPose {
        if !dx.is_finite() || !dy.is_finite() || (dx == 0.0 && dy == 0.0) {
            return pose;
        }

        if modifier {
            CameraPose {
                dolly: (pose.dolly - dx * self.dolly_sensitivity).max(self.min_dolly),
                ..pose
            }
        } else {
            CameraPose {
                yaw: pose.yaw + dx * self.sensitivity,
                pitch: (pose.pitch + dy * self.sensitivity).clamp(-self.max_pitch, self.max_pitch),
                dolly: pose.dolly,
            }
        }
    }

    /// Fold a delta sequence over `pose`.
    pub fn fold<I>(&self, pose: CameraPose, deltas: I) -> CameraPose
    where
        I: IntoIterator<Item = DragDelta>,
    {
        deltas.into_iter().fold(pose, |pose, d| {
            self.apply_delta(pose, d.dx, d.dy, d.modifier)
        })
    }
}

impl Default for CameraController {
    fn default() -> Self {
        Self::new(&CameraSettings::default())
    }
}
