//! Parallax renderer for fake3d.
//!
//! Turns a photograph plus a grayscale depth map into a tilt-reactive "fake 3D" image. Every
//! fragment samples the depth map and shifts its color lookup by
//! `(depth - 0.5) * tilt / threshold`, so near pixels slide further than far ones. The flow is:
//!
//! ```text
//!   pointer / sensor ──▶ TiltTarget ─┐
//!                                    ▼
//!   fake3d ── RendererConfig ──▶ Renderer::run ──▶ winit loop ──▶ RenderSession::tick()
//!                                                                  │
//!                                  FramePool::acquire ◀────────────┤
//!                                                                  ▼
//!                                                   GpuBackend::submit_frame ─▶ uniform ring
//! ```
//!
//! [`RenderSession`] holds everything that does not touch the GPU (easing, demo switching, the
//! texture cache, teardown) and drives any [`FrameBackend`]. [`GpuBackend`] is the wgpu
//! implementation; `Renderer` opens the window and wires the two together.

mod aspect;
mod assets;
mod compile;
mod demos;
mod error;
mod frames;
mod gpu;
mod input;
mod runtime;
mod session;
mod tilt;
mod types;
mod uniforms;
mod window;

use anyhow::Result;

pub use aspect::{fit, FitScale};
pub use assets::{AssetDirectory, DecodeFuture, DecodedImage, ImageSource};
pub use demos::{DemoDescriptor, DemoRegistry, Thresholds, DEFAULT_DEMO};
pub use error::RenderError;
pub use frames::{FramePool, SlotLease};
pub use gpu::{GpuBackend, GpuTexture};
pub use input::{
    Attitude, MotionSensor, PointerSource, SensorOptions, SensorSource, SweepSensor, TiltCallback,
    TiltSource,
};
pub use runtime::{BoxedTimeSource, ManualTimeSource, SystemTimeSource, TimeSample, TimeSource};
pub use session::{
    FrameBackend, FrameOutcome, FrameSubmission, LoopState, RenderSession, ShutdownHandle,
    TextureSet,
};
pub use tilt::{
    normalize, pointer_target, ticks_to_converge, Tilt, TiltTarget, TiltVector, DEFAULT_MAX_TILT,
    EASE_FACTOR,
};
pub use types::{Antialiasing, GpuPowerPreference, InputMode, InputOptions, RendererConfig};
pub use uniforms::{slot_stride, ParallaxUniforms, Viewport, FRAMES_IN_FLIGHT, UNIFORM_BLOCK_SIZE};

/// High-level entry point that owns the chosen configuration.
pub struct Renderer {
    config: RendererConfig,
}

impl Renderer {
    pub fn new(config: RendererConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    /// Opens the window and renders until it is closed.
    ///
    /// Returns an error if no GPU context can be created or the shaders fail to build. Texture
    /// and input failures are logged and the renderer keeps going.
    pub fn run(&mut self) -> Result<()> {
        window::run(&self.config)
    }
}
