use std::fmt::Debug;

use approx::{AbsDiffEq, RelativeEq};

use crate::{Error, Point, Rect, RasterSize, Result};

/// Affine mapping between pixel/line coordinates and georeferenced coordinates.
#[derive(Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeoTransform([f64; 6]);

impl GeoTransform {
    /// Creates a new `GeoTransform` from the provided coefficients.
    ///
    /// The coefficients are in the order: [top left x, pixel width, rotation (0 if north is up), top left y, rotation (0 if north is up), pixel height].
    pub const fn new(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }

    /// North up transform with the given origin and pixel sizes, `res_y` is the (positive) pixel height
    pub fn north_up(top_left_x: f64, top_left_y: f64, res_x: f64, res_y: f64) -> Self {
        Self::new([top_left_x, res_x, 0.0, top_left_y, 0.0, -res_y.abs()])
    }

    /// Translates a pixel/line location to a georeferenced point.
    /// Location (0, 0) is the top left corner of the top left pixel.
    pub fn apply(&self, col: f64, row: f64) -> Point<f64> {
        let x = self.0[0] + self.0[1] * col + self.0[2] * row;
        let y = self.0[3] + self.0[4] * col + self.0[5] * row;
        Point::new(x, y)
    }

    pub fn top_left(&self) -> Point {
        Point::new(self.0[0], self.0[3])
    }

    /// The horizontal cell size
    pub fn cell_size_x(&self) -> f64 {
        self.0[1]
    }

    /// The vertical cell size (negative for north up rasters)
    pub fn cell_size_y(&self) -> f64 {
        self.0[5]
    }

    /// Returns the coefficients of the transformation.
    pub fn coefficients(&self) -> [f64; 6] {
        self.0
    }

    /// True when there is no rotation or shear term and the raster is north up
    pub fn is_axis_aligned(&self) -> bool {
        self.0[2] == 0.0 && self.0[4] == 0.0 && self.0[5] < 0.0
    }

    /// Same transform for a raster decimated by the given factors
    pub fn scaled(&self, factor_x: f64, factor_y: f64) -> Self {
        let gt = &self.0;
        Self::new([gt[0], gt[1] * factor_x, gt[2] * factor_y, gt[3], gt[4] * factor_x, gt[5] * factor_y])
    }

    /// Georeferenced bounding box of a raster of the given size
    pub fn bounds(&self, size: RasterSize) -> Rect<f64> {
        let cols = size.cols as f64;
        let rows = size.rows as f64;
        let corners = [self.apply(0.0, 0.0), self.apply(cols, 0.0), self.apply(0.0, rows), self.apply(cols, rows)];
        Rect::from_point_cloud(&corners).unwrap_or_else(|| Rect::from_points(self.top_left(), self.top_left()))
    }

    pub fn invert(&self) -> Result<Self> {
        let gt_in = &self.0;
        let mut gt_out = [0.0; 6];

        if gt_in[2] == 0.0 && gt_in[4] == 0.0 && gt_in[1] != 0.0 && gt_in[5] != 0.0 {
            // No rotation, avoid the determinant to keep full precision
            gt_out[0] = -gt_in[0] / gt_in[1];
            gt_out[1] = 1.0 / gt_in[1];
            gt_out[2] = 0.0;
            gt_out[3] = -gt_in[3] / gt_in[5];
            gt_out[4] = 0.0;
            gt_out[5] = 1.0 / gt_in[5];
            return Ok(gt_out.into());
        }

        // Assume a 3rd row that is [1 0 0].
        let det = gt_in[1] * gt_in[5] - gt_in[2] * gt_in[4];
        let magnitude = f64::max(f64::max(gt_in[1].abs(), gt_in[2].abs()), f64::max(gt_in[4].abs(), gt_in[5].abs()));

        if det.abs() <= 1e-10 * magnitude * magnitude {
            return Err(Error::Runtime(
                "GeoTransform::invert: Determinant is too small, cannot compute inverse.".to_string(),
            ));
        }

        let inv_det = 1.0 / det;

        // Compute adjoint, and divide by determinant
        gt_out[1] = gt_in[5] * inv_det;
        gt_out[4] = -gt_in[4] * inv_det;

        gt_out[2] = -gt_in[2] * inv_det;
        gt_out[5] = gt_in[1] * inv_det;

        gt_out[0] = (gt_in[2] * gt_in[3] - gt_in[0] * gt_in[5]) * inv_det;
        gt_out[3] = (-gt_in[1] * gt_in[3] + gt_in[0] * gt_in[4]) * inv_det;

        Ok(gt_out.into())
    }
}

impl From<[f64; 6]> for GeoTransform {
    fn from(coefficients: [f64; 6]) -> Self {
        GeoTransform(coefficients)
    }
}

impl From<GeoTransform> for [f64; 6] {
    fn from(geo_trans: GeoTransform) -> [f64; 6] {
        geo_trans.0
    }
}

impl Debug for GeoTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "GeoTransform(topleft: ({}, {}), pixel_width: {}, pixel_height: {}, rotation: ({}, {}))",
            self.0[0],
            self.0[3],
            self.cell_size_x(),
            self.cell_size_y(),
            self.0[2],
            self.0[4],
        )
    }
}

impl AbsDiffEq for GeoTransform {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.0.abs_diff_eq(&other.0, epsilon)
    }
}

impl RelativeEq for GeoTransform {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.0.relative_eq(&other.0, epsilon, max_relative)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn invert_north_up() -> Result<()> {
        let gt = GeoTransform::north_up(100.0, 200.0, 10.0, 10.0);
        let inv = gt.invert()?;

        let px = inv.apply(150.0, 150.0);
        assert_relative_eq!(px.x(), 5.0);
        assert_relative_eq!(px.y(), 5.0);
        Ok(())
    }

    #[test]
    fn invert_rotated() -> Result<()> {
        let gt = GeoTransform::new([10.0, 2.0, 0.5, 20.0, 0.25, -2.0]);
        let inv = gt.invert()?;
        let georef = gt.apply(3.0, 7.0);
        let px = inv.apply(georef.x(), georef.y());
        assert_relative_eq!(px.x(), 3.0, epsilon = 1e-9);
        assert_relative_eq!(px.y(), 7.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn invert_singular() {
        let gt = GeoTransform::new([0.0, 1.0, 1.0, 0.0, 1.0, 1.0]);
        assert!(gt.invert().is_err());
    }

    #[test]
    fn axis_alignment() {
        assert!(GeoTransform::north_up(0.0, 0.0, 1.0, 1.0).is_axis_aligned());
        assert!(!GeoTransform::new([0.0, 1.0, 0.1, 0.0, 0.0, -1.0]).is_axis_aligned());
        assert!(!GeoTransform::new([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]).is_axis_aligned());
    }

    #[test]
    fn bounds() {
        let gt = GeoTransform::north_up(0.0, 50.0, 0.5, 0.25);
        let bounds = gt.bounds(RasterSize::with_rows_cols(100, 20));
        assert_relative_eq!(bounds, Rect::from_bounds(0.0, 25.0, 10.0, 50.0));
    }
}
