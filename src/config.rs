use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, ensure};
use serde::Deserialize;
use tracing::warn;

use crate::camera::{CameraPose, CameraSettings};
use crate::codec::DEFAULT_MAX_DIMENSION;
use crate::render::raster::{MAX_FRAME_DIMENSION, RenderSettings};
use crate::scene::ColorCubeSettings;

pub const DEFAULT_REFRESH_RATE_HZ: f32 = 60.0;
pub const MAX_REFRESH_RATE_HZ: f32 = 1000.0;

/// Pose a freshly bound session starts from, in degrees and world units.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct InitialPose {
    pub yaw_degrees: f32,
    pub pitch_degrees: f32,
    pub dolly: f32,
}

impl InitialPose {
    pub fn to_pose(&self) -> CameraPose {
        CameraPose::new(
            self.yaw_degrees.to_radians(),
            self.pitch_degrees.to_radians(),
            self.dolly,
        )
    }
}

impl Default for InitialPose {
    fn default() -> Self {
        Self {
            yaw_degrees: 20.0,
            pitch_degrees: 10.0,
            dolly: 20.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct DecodeOptions {
    /// Largest accepted width or height of an uploaded image.
    pub max_dimension: u32,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
        }
    }
}

/// Desktop window settings; ignored by headless runs.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct HostOptions {
    pub window_width: u32,
    pub window_height: u32,
    pub title: String,
    /// Hue change per arrow key press.
    pub angle_step_degrees: f32,
    /// Hue angle applied before the first frame.
    pub initial_angle: f32,
}

impl Default for HostOptions {
    fn default() -> Self {
        Self {
            window_width: 1024,
            window_height: 768,
            title: "glc-viewer".into(),
            angle_step_degrees: 15.0,
            initial_angle: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case", default, deny_unknown_fields)]
pub struct Configuration {
    /// Render loop cadence.
    pub refresh_rate_hz: f32,
    /// Drag sensitivities and pose limits.
    pub camera: CameraSettings,
    /// Pose every session starts from.
    pub initial_pose: InitialPose,
    /// Histogram lattice drawn as the scene.
    pub color_cube: ColorCubeSettings,
    /// Software rasterizer options.
    pub render: RenderSettings,
    /// Upload decoding limits.
    pub decode: DecodeOptions,
    /// Desktop window behaviour.
    pub host: HostOptions,
}

impl Configuration {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        Self::from_yaml_str(&s)
    }

    pub fn from_yaml_str(s: &str) -> Result<Self> {
        // an empty document means "all defaults"
        if s.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(s)?)
    }

    /// Time between ticks.
    ///
    /// Rates `validated()` would reject fall back to the default cadence.
    pub fn frame_period(&self) -> Duration {
        let hz = self.refresh_rate_hz;
        let hz = if hz.is_finite() && hz > 0.0 {
            hz.min(MAX_REFRESH_RATE_HZ)
        } else {
            warn!(refresh_rate_hz = hz, "invalid refresh rate; using default");
            DEFAULT_REFRESH_RATE_HZ
        };
        Duration::try_from_secs_f32(1.0 / hz)
            .unwrap_or_else(|_| Duration::from_secs_f32(1.0 / DEFAULT_REFRESH_RATE_HZ))
    }

    /// Validate runtime invariants that cannot be expressed via serde defaults alone.
    pub fn validated(self) -> Result<Self> {
        ensure!(
            self.refresh_rate_hz.is_finite() && self.refresh_rate_hz > 0.0,
            "refresh-rate-hz must be positive"
        );
        ensure!(
            self.refresh_rate_hz <= MAX_REFRESH_RATE_HZ,
            "refresh-rate-hz must not exceed {MAX_REFRESH_RATE_HZ}"
        );

        let camera = &self.camera;
        ensure!(
            camera.sensitivity.is_finite() && camera.sensitivity > 0.0,
            "camera.sensitivity must be positive"
        );
        ensure!(
            camera.dolly_sensitivity.is_finite() && camera.dolly_sensitivity > 0.0,
            "camera.dolly-sensitivity must be positive"
        );
        ensure!(
            camera.max_pitch_degrees > 0.0 && camera.max_pitch_degrees < 90.0,
            "camera.max-pitch-degrees must be inside (0, 90)"
        );
        ensure!(
            camera.min_dolly.is_finite() && camera.min_dolly >= 0.0,
            "camera.min-dolly must be non-negative"
        );

        let pose = &self.initial_pose;
        ensure!(
            pose.yaw_degrees.is_finite() && pose.pitch_degrees.is_finite(),
            "initial-pose angles must be finite"
        );
        ensure!(
            pose.pitch_degrees.abs() <= camera.max_pitch_degrees,
            "initial-pose.pitch-degrees must lie within camera.max-pitch-degrees"
        );
        ensure!(
            pose.dolly.is_finite() && pose.dolly >= camera.min_dolly,
            "initial-pose.dolly must be at least camera.min-dolly"
        );

        let cube = &self.color_cube;
        ensure!(
            (2..=64).contains(&cube.resolution),
            "color-cube.resolution must be between 2 and 64"
        );
        ensure!(
            cube.size.is_finite() && cube.size > 0.0,
            "color-cube.size must be positive"
        );
        ensure!(
            cube.threshold > 0.0 && cube.threshold <= 1.0,
            "color-cube.threshold must be inside (0, 1]"
        );

        let render = &self.render;
        ensure!(
            render.field_of_view_degrees > 0.0 && render.field_of_view_degrees < 180.0,
            "render.field-of-view-degrees must be inside (0, 180)"
        );
        ensure!(
            render.near > 0.0 && render.far > render.near,
            "render.near must be positive and below render.far"
        );
        ensure!(
            (0.0..=1.0).contains(&render.inset_fraction),
            "render.inset-fraction must be inside [0, 1]"
        );

        ensure!(
            self.decode.max_dimension > 0,
            "decode.max-dimension must be greater than zero"
        );

        let host = &self.host;
        ensure!(
            host.window_width > 0 && host.window_height > 0,
            "host window size must be non-zero"
        );
        ensure!(
            host.window_width <= MAX_FRAME_DIMENSION && host.window_height <= MAX_FRAME_DIMENSION,
            "host window size must not exceed {MAX_FRAME_DIMENSION}px"
        );
        ensure!(
            host.angle_step_degrees.is_finite(),
            "host.angle-step-degrees must be finite"
        );
        ensure!(
            host.initial_angle.is_finite() && (0.0..360.0).contains(&host.initial_angle),
            "host.initial-angle must be inside [0, 360)"
        );
        Ok(self)
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            refresh_rate_hz: DEFAULT_REFRESH_RATE_HZ,
            camera: CameraSettings::default(),
            initial_pose: InitialPose::default(),
            color_cube: ColorCubeSettings::default(),
            render: RenderSettings::default(),
            decode: DecodeOptions::default(),
            host: HostOptions::default(),
        }
    }
}
