use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::demos::DemoRegistry;
use crate::input::SensorOptions;
use crate::tilt::DEFAULT_MAX_TILT;

/// Which tilt sources the host attaches to the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputMode {
    /// Try the motion sensor and fall back to the pointer when access is denied.
    #[default]
    Auto,
    Pointer,
    /// Motion sensor only; a denied permission leaves the tilt neutral.
    Sensor,
}

#[derive(Debug, Clone, PartialEq)]
pub struct InputOptions {
    pub mode: InputMode,
    /// Attitude (degrees) mapped onto the full horizontal range.
    pub max_tilt_x: f32,
    /// Attitude (degrees) mapped onto the full vertical range.
    pub max_tilt_y: f32,
    pub sensor_rate_hz: u32,
    pub sensor_deadband: f32,
    /// Cycle length of the synthetic sweep used when no motion hardware exists.
    pub sweep_period: Duration,
}

impl InputOptions {
    pub fn sensor_options(&self) -> SensorOptions {
        SensorOptions {
            max_tilt_x: self.max_tilt_x,
            max_tilt_y: self.max_tilt_y,
            rate_hz: self.sensor_rate_hz,
            deadband: self.sensor_deadband,
        }
    }
}

impl Default for InputOptions {
    fn default() -> Self {
        let sensor = SensorOptions::default();
        Self {
            mode: InputMode::default(),
            max_tilt_x: DEFAULT_MAX_TILT,
            max_tilt_y: DEFAULT_MAX_TILT,
            sensor_rate_hz: sensor.rate_hz,
            sensor_deadband: sensor.deadband,
            sweep_period: Duration::from_secs(8),
        }
    }
}

/// Anti-aliasing policy for the render pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Antialiasing {
    /// Pick the highest sample count supported by the surface format.
    #[default]
    Auto,
    /// Disable MSAA and render directly into the swapchain.
    Off,
    /// Request a specific MSAA sample count (clamped to what the device supports).
    Samples(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GpuPowerPreference {
    #[default]
    Low,
    High,
}

/// Immutable configuration passed to the renderer at start-up.
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Window size in physical pixels.
    pub surface_size: (u32, u32),
    /// Demo shown first. `None` picks the registry default.
    pub initial_demo: Option<String>,
    pub registry: Arc<DemoRegistry>,
    /// Directory that image names in the registry are resolved against.
    pub asset_root: PathBuf,
    pub input: InputOptions,
    pub antialiasing: Antialiasing,
    pub power: GpuPowerPreference,
}

impl RendererConfig {
    pub fn initial_demo_id(&self) -> &str {
        self.initial_demo
            .as_deref()
            .unwrap_or_else(|| self.registry.default_id())
    }
}

impl Default for RendererConfig {
    /// 1280x720 window showing the built-in demos from `./assets`.
    fn default() -> Self {
        Self {
            surface_size: (1280, 720),
            initial_demo: None,
            registry: DemoRegistry::builtin(),
            asset_root: PathBuf::from("assets"),
            input: InputOptions::default(),
            antialiasing: Antialiasing::default(),
            power: GpuPowerPreference::default(),
        }
    }
}
