//! wgpu implementation of [`crate::session::FrameBackend`].
//!
//! - `context` owns the instance, device and surface wiring and reconfigures the swapchain when
//!   the window resizes.
//! - `pipeline` builds the bind group layouts and the single depth displacement pipeline.
//! - `state` ties both together, keeps the uniform ring buffer and returns frame slots once the
//!   GPU signals completion.

mod context;
mod pipeline;
mod state;

pub use state::{GpuBackend, GpuTexture};
