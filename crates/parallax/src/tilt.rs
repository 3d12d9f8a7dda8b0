//! Tilt normalisation and the eased tilt vector fed into the uniform block.
//!
//! Raw input arrives either as device attitude in degrees or as a pointer position in pixels.
//! Both collapse into a [`Tilt`] in `[-1, 1]` per axis. The horizontal axis is inverted for
//! attitude input so that tilting the device right looks "around" the subject to the right.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Fixed per-tick low-pass factor. Deliberately not scaled by frame delta.
pub const EASE_FACTOR: f32 = 0.05;

/// Default attitude range (degrees) that maps onto the full `[-1, 1]` span.
pub const DEFAULT_MAX_TILT: f32 = 15.0;

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Tilt {
    pub x: f32,
    pub y: f32,
}

impl Tilt {
    pub const NEUTRAL: Tilt = Tilt { x: 0.0, y: 0.0 };

    /// Builds a tilt, clamping both axes into `[-1, 1]`. NaN collapses to zero.
    pub fn new(x: f32, y: f32) -> Self {
        Self {
            x: clamp_unit(x),
            y: clamp_unit(y),
        }
    }

    pub fn as_array(self) -> [f32; 2] {
        [self.x, self.y]
    }

    pub(crate) fn max_axis_delta(self, other: Tilt) -> f32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }
}

fn clamp_unit(value: f32) -> f32 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(-1.0, 1.0)
    }
}

/// Maps a raw attitude sample onto `[-1, 1]`.
///
/// `x = -clamp(horizontal) / max_x`, `y = clamp(vertical) / max_y`. A non-positive or
/// non-finite range yields a neutral axis instead of dividing by zero.
pub fn normalize(raw_horizontal: f32, raw_vertical: f32, max_tilt_x: f32, max_tilt_y: f32) -> Tilt {
    Tilt::new(
        -normalize_axis(raw_horizontal, max_tilt_x),
        normalize_axis(raw_vertical, max_tilt_y),
    )
}

fn normalize_axis(raw: f32, max_tilt: f32) -> f32 {
    if !(max_tilt.is_finite() && max_tilt > 0.0) || raw.is_nan() {
        return 0.0;
    }
    raw.clamp(-max_tilt, max_tilt) / max_tilt
}

/// Centered, inverted pointer offset: `((w/2 - x) / (w/2), (h/2 - y) / (h/2))`.
///
/// A pointer left of or above the center produces positive values. Positions outside the
/// viewport are clamped.
pub fn pointer_target(pointer_x: f64, pointer_y: f64, width: f64, height: f64) -> Tilt {
    let half_x = width / 2.0;
    let half_y = height / 2.0;
    if half_x <= 0.0 || half_y <= 0.0 {
        return Tilt::NEUTRAL;
    }
    Tilt::new(
        ((half_x - pointer_x) / half_x) as f32,
        ((half_y - pointer_y) / half_y) as f32,
    )
}

/// Current and target tilt, eased toward each other once per frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TiltVector {
    pub current: Tilt,
    pub target: Tilt,
}

impl TiltVector {
    pub fn set_target(&mut self, target: Tilt) {
        self.target = target;
    }

    /// Applies one first-order low-pass step and returns the new current value.
    pub fn ease(&mut self) -> Tilt {
        self.current.x += (self.target.x - self.current.x) * EASE_FACTOR;
        self.current.y += (self.target.y - self.current.y) * EASE_FACTOR;
        self.current
    }
}

/// Lock-free slot holding the latest tilt target.
///
/// Both axes are packed into one `AtomicU64` so a reader never observes `x` from one write and
/// `y` from another.
#[derive(Debug, Clone, Default)]
pub struct TiltTarget {
    bits: Arc<AtomicU64>,
}

impl TiltTarget {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn store(&self, tilt: Tilt) {
        self.bits.store(pack(tilt), Ordering::Release);
    }

    pub fn load(&self) -> Tilt {
        unpack(self.bits.load(Ordering::Acquire))
    }

    pub fn reset(&self) {
        self.store(Tilt::NEUTRAL);
    }
}

fn pack(tilt: Tilt) -> u64 {
    (u64::from(tilt.x.to_bits()) << 32) | u64::from(tilt.y.to_bits())
}

fn unpack(bits: u64) -> Tilt {
    Tilt {
        x: f32::from_bits((bits >> 32) as u32),
        y: f32::from_bits(bits as u32),
    }
}

/// Number of ticks the easing needs to bring the remaining distance below `epsilon`
/// (relative to a unit starting distance).
pub fn ticks_to_converge(epsilon: f32) -> u32 {
    let ratio = 1.0 - EASE_FACTOR;
    (epsilon.ln() / ratio.ln()).ceil() as u32
}
