// ============================================================================
// TRANSFORM MODEL — pan / zoom / rotate between canvas and image space
// ============================================================================
//
// `forward` places the image on the canvas:
//
//     canvas = pan + R(rotation) · (zoom · image)
//
// `inverse` maps canvas pixels back to image pixels.  The two are always
// rebuilt together from the same (pan, zoom, rotation) triple.
// ============================================================================

/// Column-major 3×3 matrix.  Only affine matrices (last row `0 0 1`) are
/// produced by this crate.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Mat3 {
    pub cols: [[f32; 3]; 3],
}

impl Mat3 {
    pub const IDENTITY: Mat3 = Mat3 {
        cols: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
    };

    /// Build an affine matrix from its 2×2 linear part `[a c; b d]` and
    /// translation `(tx, ty)`.
    pub fn affine(a: f32, b: f32, c: f32, d: f32, tx: f32, ty: f32) -> Self {
        Self {
            cols: [[a, b, 0.0], [c, d, 0.0], [tx, ty, 1.0]],
        }
    }

    /// `self · rhs`
    pub fn mul(&self, rhs: &Mat3) -> Mat3 {
        let mut out = [[0.0f32; 3]; 3];
        for (col, out_col) in out.iter_mut().enumerate() {
            for (row, v) in out_col.iter_mut().enumerate() {
                *v = (0..3).map(|k| self.cols[k][row] * rhs.cols[col][k]).sum();
            }
        }
        Mat3 { cols: out }
    }

    pub fn transform_point(&self, p: [f32; 2]) -> [f32; 2] {
        let [c0, c1, c2] = self.cols;
        [
            c0[0] * p[0] + c1[0] * p[1] + c2[0],
            c0[1] * p[0] + c1[1] * p[1] + c2[1],
        ]
    }

    pub fn determinant(&self) -> f32 {
        let [c0, c1, _] = self.cols;
        c0[0] * c1[1] - c1[0] * c0[1]
    }

    /// General affine inverse.  `None` if the linear part is singular.
    pub fn inverse(&self) -> Option<Mat3> {
        let det = self.determinant();
        if det.abs() <= f32::EPSILON || !det.is_finite() {
            return None;
        }
        let inv_det = 1.0 / det;
        let [c0, c1, c2] = self.cols;
        let (a, b, c, d) = (c0[0], c0[1], c1[0], c1[1]);
        let (tx, ty) = (c2[0], c2[1]);
        let ia = d * inv_det;
        let ib = -b * inv_det;
        let ic = -c * inv_det;
        let id = a * inv_det;
        Some(Mat3::affine(
            ia,
            ib,
            ic,
            id,
            -(ia * tx + ic * ty),
            -(ib * tx + id * ty),
        ))
    }

    /// Column layout used by GPU uniform buffers: each column padded to 16 bytes.
    pub fn to_padded_cols(&self) -> [[f32; 4]; 3] {
        self.cols.map(|c| [c[0], c[1], c[2], 0.0])
    }
}

impl Default for Mat3 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Rejected transform update.  The stored matrices are untouched when this
/// is returned.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TransformError {
    /// Zoom was zero, negative, NaN or infinite.
    InvalidZoom(f32),
    /// Pan or rotation contained NaN / infinity.
    NonFinite,
}

impl std::fmt::Display for TransformError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransformError::InvalidZoom(z) => write!(f, "zoom must be positive and finite, got {}", z),
            TransformError::NonFinite => write!(f, "pan and rotation must be finite"),
        }
    }
}

impl std::error::Error for TransformError {}

/// Canvas view transform.
#[derive(Clone, Debug)]
pub struct CanvasTransform {
    pan: [f32; 2],
    zoom: f32,
    rotation: f32,
    forward: Mat3,
    inverse: Mat3,
}

impl CanvasTransform {
    pub fn new() -> Self {
        Self {
            pan: [0.0, 0.0],
            zoom: 1.0,
            rotation: 0.0,
            forward: Mat3::IDENTITY,
            inverse: Mat3::IDENTITY,
        }
    }

    /// Recompute both matrices.  Callers clamp zoom to a sane range first;
    /// invalid values are refused rather than silently corrected.
    pub fn set_transform(&mut self, pan: [f32; 2], zoom: f32, rotation: f32) -> Result<(), TransformError> {
        if !zoom.is_finite() || zoom <= 0.0 {
            return Err(TransformError::InvalidZoom(zoom));
        }
        if !pan[0].is_finite() || !pan[1].is_finite() || !rotation.is_finite() {
            return Err(TransformError::NonFinite);
        }

        let (s, c) = rotation.sin_cos();
        let forward = Mat3::affine(c * zoom, s * zoom, -s * zoom, c * zoom, pan[0], pan[1]);

        // Closed-form inverse: S(1/z) · R(-θ) · T(-pan)
        let iz = 1.0 / zoom;
        let (ia, ib, ic, id) = (c * iz, -s * iz, s * iz, c * iz);
        let inverse = Mat3::affine(
            ia,
            ib,
            ic,
            id,
            -(ia * pan[0] + ic * pan[1]),
            -(ib * pan[0] + id * pan[1]),
        );

        self.pan = pan;
        self.zoom = zoom;
        self.rotation = rotation;
        self.forward = forward;
        self.inverse = inverse;
        Ok(())
    }

    /// Fit `image_size` inside `canvas_size`, centered, without rotation.
    pub fn fit(canvas_size: [f32; 2], image_size: [f32; 2]) -> Self {
        let mut t = Self::new();
        if image_size[0] > 0.0 && image_size[1] > 0.0 {
            let zoom = (canvas_size[0] / image_size[0]).min(canvas_size[1] / image_size[1]);
            let pan = [
                (canvas_size[0] - image_size[0] * zoom) * 0.5,
                (canvas_size[1] - image_size[1] * zoom) * 0.5,
            ];
            if t.set_transform(pan, zoom, 0.0).is_err() {
                crate::log_warn!("fit: degenerate canvas {:?} for image {:?}", canvas_size, image_size);
            }
        }
        t
    }

    pub fn canvas_to_image(&self, p: [f32; 2]) -> [f32; 2] {
        self.inverse.transform_point(p)
    }

    pub fn image_to_canvas(&self, p: [f32; 2]) -> [f32; 2] {
        self.forward.transform_point(p)
    }

    pub fn forward(&self) -> &Mat3 {
        &self.forward
    }

    pub fn inverse(&self) -> &Mat3 {
        &self.inverse
    }

    pub fn pan(&self) -> [f32; 2] {
        self.pan
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }
}

impl Default for CanvasTransform {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: [f32; 2], b: [f32; 2], eps: f32) -> bool {
        (a[0] - b[0]).abs() <= eps && (a[1] - b[1]).abs() <= eps
    }

    #[test]
    fn round_trip_over_many_transforms() {
        let mut t = CanvasTransform::new();
        let pans = [[0.0, 0.0], [120.5, -40.0], [-800.0, 333.3]];
        let zooms = [0.05, 0.5, 1.0, 3.7, 40.0];
        let rotations = [0.0, 0.3, -1.2, std::f32::consts::PI, 5.0];
        let points = [[0.0, 0.0], [10.0, 20.0], [-300.0, 512.25], [1919.0, 1079.0]];
        for pan in pans {
            for zoom in zooms {
                for rot in rotations {
                    t.set_transform(pan, zoom, rot).unwrap();
                    for p in points {
                        let back = t.image_to_canvas(t.canvas_to_image(p));
                        assert!(close(back, p, 1e-2), "{:?} -> {:?} (pan {:?} zoom {} rot {})", p, back, pan, zoom, rot);
                    }
                }
            }
        }
    }

    #[test]
    fn forward_and_inverse_multiply_to_identity() {
        let mut t = CanvasTransform::new();
        t.set_transform([15.0, -7.0], 2.5, 0.75).unwrap();
        let id = t.forward().mul(t.inverse());
        for (col, expected) in id.cols.iter().zip(Mat3::IDENTITY.cols.iter()) {
            for (v, e) in col.iter().zip(expected.iter()) {
                assert!((v - e).abs() < 1e-5);
            }
        }
        let general = t.forward().inverse().unwrap();
        assert!(close(
            general.transform_point([3.0, 4.0]),
            t.inverse().transform_point([3.0, 4.0]),
            1e-4
        ));
    }

    #[test]
    fn rejected_updates_leave_state_untouched() {
        let mut t = CanvasTransform::new();
        t.set_transform([5.0, 6.0], 2.0, 0.1).unwrap();
        let before = (*t.forward(), *t.inverse());

        assert_eq!(t.set_transform([0.0, 0.0], 0.0, 0.0), Err(TransformError::InvalidZoom(0.0)));
        assert!(t.set_transform([0.0, 0.0], -1.0, 0.0).is_err());
        assert!(t.set_transform([0.0, 0.0], f32::NAN, 0.0).is_err());
        assert!(t.set_transform([0.0, 0.0], f32::INFINITY, 0.0).is_err());
        assert_eq!(t.set_transform([f32::NAN, 0.0], 1.0, 0.0), Err(TransformError::NonFinite));
        assert!(t.set_transform([0.0, 0.0], 1.0, f32::INFINITY).is_err());

        assert_eq!((*t.forward(), *t.inverse()), before);
        assert_eq!(t.zoom(), 2.0);
    }

    #[test]
    fn pan_and_zoom_place_image_origin() {
        let mut t = CanvasTransform::new();
        t.set_transform([100.0, 50.0], 2.0, 0.0).unwrap();
        assert!(close(t.image_to_canvas([0.0, 0.0]), [100.0, 50.0], 1e-6));
        assert!(close(t.image_to_canvas([10.0, 10.0]), [120.0, 70.0], 1e-6));
        assert!(close(t.canvas_to_image([120.0, 70.0]), [10.0, 10.0], 1e-5));
    }

    #[test]
    fn quarter_turn_rotates_axes() {
        let mut t = CanvasTransform::new();
        t.set_transform([0.0, 0.0], 1.0, std::f32::consts::FRAC_PI_2).unwrap();
        assert!(close(t.image_to_canvas([1.0, 0.0]), [0.0, 1.0], 1e-6));
        assert!(close(t.image_to_canvas([0.0, 1.0]), [-1.0, 0.0], 1e-6));
    }

    #[test]
    fn fit_centers_image() {
        let t = CanvasTransform::fit([200.0, 100.0], [100.0, 100.0]);
        assert_eq!(t.zoom(), 1.0);
        assert!(close(t.image_to_canvas([0.0, 0.0]), [50.0, 0.0], 1e-6));
    }

    #[test]
    fn padded_columns_keep_translation_in_third_column() {
        let m = Mat3::affine(1.0, 2.0, 3.0, 4.0, 5.0, 6.0);
        assert_eq!(m.to_padded_cols(), [[1.0, 2.0, 0.0, 0.0], [3.0, 4.0, 0.0, 0.0], [5.0, 6.0, 1.0, 0.0]]);
    }
}
