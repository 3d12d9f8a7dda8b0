use bytemuck::{Pod, Zeroable};

use crate::aspect::FitScale;
use crate::demos::Thresholds;
use crate::tilt::Tilt;

/// Number of uniform slots that may be in flight at once.
pub const FRAMES_IN_FLIGHT: usize = 3;

/// Logical size of [`ParallaxUniforms`] in bytes.
pub const UNIFORM_BLOCK_SIZE: u64 = std::mem::size_of::<ParallaxUniforms>() as u64;

/// Largest device scale factor honoured when deriving the pixel ratio.
pub const MAX_PIXEL_RATIO: f64 = 2.0;

/// CPU mirror of the `ParallaxParams` std140 block declared in the fragment shader.
#[repr(C, align(16))]
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ParallaxUniforms {
    /// Logical viewport width/height followed by the letterbox scale.
    pub resolution: [f32; 4],
    pub tilt: [f32; 2],
    pub threshold: [f32; 2],
    pub time: f32,
    /// Inverse of the (clamped) device scale factor.
    pub pixel_ratio: f32,
    pub padding: [f32; 2],
}

unsafe impl Zeroable for ParallaxUniforms {}
unsafe impl Pod for ParallaxUniforms {}

impl ParallaxUniforms {
    pub fn compose(
        viewport: &Viewport,
        scale: FitScale,
        tilt: Tilt,
        thresholds: Thresholds,
        time: f32,
    ) -> Self {
        let (width, height) = viewport.logical_size();
        Self {
            resolution: [width, height, scale.x, scale.y],
            tilt: tilt.as_array(),
            threshold: [thresholds.horizontal, thresholds.vertical],
            time,
            pixel_ratio: viewport.inverse_pixel_ratio(),
            padding: [0.0; 2],
        }
    }
}

/// Physical surface size plus the host scale factor.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
    pub scale_factor: f64,
}

impl Viewport {
    pub fn new(width: u32, height: u32, scale_factor: f64) -> Self {
        Self {
            width,
            height,
            scale_factor,
        }
    }

    /// Scale factor clamped into `[1, MAX_PIXEL_RATIO]`; invalid factors fall back to `1`.
    pub fn pixel_ratio(&self) -> f64 {
        if self.scale_factor.is_finite() && self.scale_factor > 0.0 {
            self.scale_factor.clamp(1.0, MAX_PIXEL_RATIO)
        } else {
            1.0
        }
    }

    pub fn inverse_pixel_ratio(&self) -> f32 {
        (1.0 / self.pixel_ratio()) as f32
    }

    /// Surface size expressed in pixel-ratio units, matching what the shader divides by.
    pub fn logical_size(&self) -> (f32, f32) {
        let ratio = self.pixel_ratio();
        (
            (f64::from(self.width) / ratio) as f32,
            (f64::from(self.height) / ratio) as f32,
        )
    }
}

/// Rounds the uniform block size up to the device's dynamic offset alignment.
pub fn slot_stride(offset_alignment: u32) -> u64 {
    let alignment = u64::from(offset_alignment.max(1));
    UNIFORM_BLOCK_SIZE.div_ceil(alignment) * alignment
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::mem::{align_of, size_of};

    #[test]
    fn uniforms_follow_std140_layout() {
        let uniforms = ParallaxUniforms::zeroed();
        let base = &uniforms as *const _ as usize;

        assert_eq!(align_of::<ParallaxUniforms>(), 16);
        assert_eq!(size_of::<ParallaxUniforms>(), 48);
        assert_eq!((&uniforms.resolution as *const _ as usize) - base, 0);
        assert_eq!((&uniforms.tilt as *const _ as usize) - base, 16);
        assert_eq!((&uniforms.threshold as *const _ as usize) - base, 24);
        assert_eq!((&uniforms.time as *const _ as usize) - base, 32);
        assert_eq!((&uniforms.pixel_ratio as *const _ as usize) - base, 36);
        assert_eq!((&uniforms.padding as *const _ as usize) - base, 40);
    }

    #[test]
    fn stride_rounds_to_offset_alignment() {
        assert_eq!(slot_stride(256), 256);
        assert_eq!(slot_stride(64), 64);
        assert_eq!(slot_stride(32), 64);
        assert_eq!(slot_stride(16), 48);
        assert_eq!(slot_stride(0), 48);
    }

    #[test]
    fn compose_fills_every_field() {
        let viewport = Viewport::new(2000, 1000, 2.0);
        let uniforms = ParallaxUniforms::compose(
            &viewport,
            FitScale { x: 0.5, y: 1.0 },
            Tilt::new(0.25, -0.75),
            Thresholds::new(35.0, 15.0),
            1.5,
        );
        assert_eq!(uniforms.resolution, [1000.0, 500.0, 0.5, 1.0]);
        assert_eq!(uniforms.tilt, [0.25, -0.75]);
        assert_eq!(uniforms.threshold, [35.0, 15.0]);
        assert_eq!(uniforms.time, 1.5);
        assert_eq!(uniforms.pixel_ratio, 0.5);
        assert_eq!(uniforms.padding, [0.0, 0.0]);
    }

    #[test]
    fn pixel_ratio_is_clamped() {
        assert_eq!(Viewport::new(10, 10, 3.0).pixel_ratio(), 2.0);
        assert_eq!(Viewport::new(10, 10, 0.5).pixel_ratio(), 1.0);
        assert_eq!(Viewport::new(10, 10, f64::NAN).pixel_ratio(), 1.0);
        assert_eq!(Viewport::new(10, 10, 1.25).inverse_pixel_ratio(), 0.8);
    }
}
