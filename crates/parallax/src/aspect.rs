use crate::error::RenderError;

/// Anisotropic scale that letterboxes an image inside the viewport.
///
/// Both factors lie in `(0, 1]` and at least one of them is exactly `1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FitScale {
    pub x: f32,
    pub y: f32,
}

impl FitScale {
    pub const IDENTITY: FitScale = FitScale { x: 1.0, y: 1.0 };
}

impl Default for FitScale {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Computes the letterbox scale for an image of `image_w x image_h` shown in a
/// `viewport_w x viewport_h` viewport.
///
/// A relatively wider viewport shrinks the horizontal axis, otherwise the vertical one. The whole
/// image stays visible and undistorted.
pub fn fit(viewport_w: f32, viewport_h: f32, image_w: f32, image_h: f32) -> Result<FitScale, RenderError> {
    ensure_positive(viewport_w, viewport_h)?;
    ensure_positive(image_w, image_h)?;

    let view_aspect = viewport_w / viewport_h;
    let image_aspect = image_w / image_h;

    if view_aspect > image_aspect {
        Ok(FitScale {
            x: image_aspect / view_aspect,
            y: 1.0,
        })
    } else {
        Ok(FitScale {
            x: 1.0,
            y: view_aspect / image_aspect,
        })
    }
}

fn ensure_positive(width: f32, height: f32) -> Result<(), RenderError> {
    let valid = |value: f32| value.is_finite() && value > 0.0;
    if valid(width) && valid(height) {
        Ok(())
    } else {
        Err(RenderError::InvalidDimension { width, height })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wide_viewport_square_image() {
        let scale = fit(1000.0, 500.0, 800.0, 800.0).unwrap();
        assert_eq!(scale, FitScale { x: 0.5, y: 1.0 });
    }

    #[test]
    fn tall_viewport_square_image() {
        let scale = fit(500.0, 1000.0, 800.0, 800.0).unwrap();
        assert_eq!(scale, FitScale { x: 1.0, y: 0.5 });
    }

    #[test]
    fn matching_aspect_is_identity() {
        let scale = fit(1920.0, 1080.0, 1280.0, 720.0).unwrap();
        assert!((scale.x - 1.0).abs() < 1e-6);
        assert!((scale.y - 1.0).abs() < 1e-6);
    }

    #[test]
    fn scales_are_bounded_and_one_axis_is_full() {
        let sizes = [1.0_f32, 3.0, 17.0, 240.0, 1080.0, 1920.0, 4096.0];
        for &vw in &sizes {
            for &vh in &sizes {
                for &iw in &sizes {
                    for &ih in &sizes {
                        let scale = fit(vw, vh, iw, ih).unwrap();
                        assert!(scale.x > 0.0 && scale.x <= 1.0);
                        assert!(scale.y > 0.0 && scale.y <= 1.0);
                        assert_eq!(scale.x.max(scale.y), 1.0);
                    }
                }
            }
        }
    }

    #[test]
    fn rejects_degenerate_dimensions() {
        for (vw, vh, iw, ih) in [
            (0.0, 500.0, 800.0, 800.0),
            (500.0, 0.0, 800.0, 800.0),
            (500.0, 500.0, 0.0, 800.0),
            (500.0, 500.0, 800.0, -1.0),
            (f32::NAN, 500.0, 800.0, 800.0),
            (f32::INFINITY, 500.0, 800.0, 800.0),
        ] {
            let err = fit(vw, vh, iw, ih).unwrap_err();
            assert!(matches!(err, RenderError::InvalidDimension { .. }));
        }
    }
}
