//! Suggested output grid of a warp and edge sampled bounding box transformation.

use crate::{
    CoordinateTransformer, Error, GeoTransform, Point, RasterSize, Rect, Result,
    transformer::{Direction, Transformer},
};

/// Number of intervals each edge is divided in, resulting in `EDGE_STEPS + 1` points per edge
pub const EDGE_STEPS: usize = 20;

/// Resulting geotransform and size of [`suggested_warp_output`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SuggestedOutput {
    pub geo_transform: GeoTransform,
    pub size: RasterSize,
    pub extent: Rect<f64>,
}

impl SuggestedOutput {
    pub fn resolution(&self) -> f64 {
        self.geo_transform.cell_size_x()
    }
}

/// `steps + 1` points on each edge of the rectangle, corners included once
pub fn edge_points(rect: &Rect<f64>, steps: usize) -> Vec<Point> {
    let steps = steps.max(1);
    let mut points = Vec::with_capacity(steps * 4);

    let mut add_edge = |start: Point, end: Point| {
        for i in 0..steps {
            let t = i as f64 / steps as f64;
            points.push(Point::new(start.x() + t * (end.x() - start.x()), start.y() + t * (end.y() - start.y())));
        }
    };

    add_edge(rect.top_left(), rect.top_right());
    add_edge(rect.top_right(), rect.bottom_right());
    add_edge(rect.bottom_right(), rect.bottom_left());
    add_edge(rect.bottom_left(), rect.top_left());
    points
}

/// Regular grid of `(steps + 1)²` points covering the rectangle
fn grid_points(rect: &Rect<f64>, steps: usize) -> Vec<Point> {
    let mut points = Vec::with_capacity((steps + 1) * (steps + 1));
    for row in 0..=steps {
        for col in 0..=steps {
            let tx = col as f64 / steps as f64;
            let ty = row as f64 / steps as f64;
            points.push(Point::new(rect.min_x() + tx * rect.width(), rect.min_y() + ty * rect.height()));
        }
    }
    points
}

fn transform_sample(transformer: &dyn Transformer, direction: Direction, points: &[Point]) -> Result<Vec<Option<Point>>> {
    let mut x: Vec<f64> = points.iter().map(|p| p.x()).collect();
    let mut y: Vec<f64> = points.iter().map(|p| p.y()).collect();
    let mut z = vec![0.0; points.len()];
    let success = transformer.transform(direction, &mut x, &mut y, &mut z)?;

    Ok(success
        .into_iter()
        .enumerate()
        .map(|(i, ok)| (ok && x[i].is_finite() && y[i].is_finite()).then(|| Point::new(x[i], y[i])))
        .collect())
}

/// Computes the extent and square pixel size of a warp output covering the source raster (or the `window` of it, in pixel/line coordinates).
///
/// The transformer maps source pixel/line coordinates to destination georeferenced coordinates.
/// The edges of the source are sampled, when some of the edge points fail to transform the whole source area is sampled.
/// The pixel size is chosen so the number of pixels on the diagonal is preserved.
pub fn suggested_warp_output(transformer: &dyn Transformer, src_size: RasterSize, window: Option<Rect<f64>>) -> Result<SuggestedOutput> {
    if src_size.is_empty() {
        return Err(Error::InvalidArgument("Cannot suggest a warp output for an empty raster".into()));
    }

    let window = window.unwrap_or_else(|| Rect::from_bounds(0.0, 0.0, src_size.cols as f64, src_size.rows as f64));
    let mut transformed = transform_sample(transformer, Direction::SrcToDst, &edge_points(&window, EDGE_STEPS))?;

    let failures = transformed.iter().filter(|p| p.is_none()).count();
    if failures > 0 {
        log::debug!("{failures} edge points failed to transform, sampling the interior of the source");
        transformed.extend(transform_sample(transformer, Direction::SrcToDst, &grid_points(&window, EDGE_STEPS))?);
    }

    let valid: Vec<Point> = transformed.into_iter().flatten().collect();
    let extent = Rect::from_point_cloud(&valid)
        .ok_or_else(|| Error::Transform("Failed to compute the output bounds, all sample points failed to transform".into()))?;

    // Pixel size preserving the diagonal pixel count of the window
    let window_diagonal = window.width().hypot(window.height());
    let corners = transform_sample(transformer, Direction::SrcToDst, &[window.top_left(), window.bottom_right()])?;
    let dst_diagonal = match (corners[0], corners[1]) {
        (Some(tl), Some(br)) if tl != br => (tl.x() - br.x()).hypot(tl.y() - br.y()),
        _ => extent.width().hypot(extent.height()),
    };

    let resolution = dst_diagonal / window_diagonal;
    if !resolution.is_finite() || resolution <= 0.0 {
        return Err(Error::Transform(format!("Failed to compute an output resolution ({resolution})")));
    }

    let cols = (extent.width() / resolution + 0.5).floor();
    let rows = (extent.height() / resolution + 0.5).floor();
    if cols > i32::MAX as f64 || rows > i32::MAX as f64 {
        return Err(Error::Runtime(format!("Computed output size too large: {cols}x{rows}")));
    }

    let size = RasterSize::with_rows_cols((rows as usize).max(1), (cols as usize).max(1));
    let extent = Rect::from_bounds(
        extent.min_x(),
        extent.max_y() - size.rows as f64 * resolution,
        extent.min_x() + size.cols as f64 * resolution,
        extent.max_y(),
    );

    Ok(SuggestedOutput {
        geo_transform: GeoTransform::north_up(extent.min_x(), extent.max_y(), resolution, resolution),
        size,
        extent,
    })
}

/// Transforms a bounding box by sampling points along its edges, more accurate than transforming only the corners
/// when the transformation involves curvature.
pub fn warp_bounding_box(bbox: &Rect<f64>, coord_trans: &CoordinateTransformer) -> Result<Rect<f64>> {
    let mut points = edge_points(bbox, EDGE_STEPS);
    coord_trans.transform_points_in_place(&mut points)?;
    Rect::from_point_cloud(&points).ok_or_else(|| Error::Transform("Failed to transform bounding box".into()))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{NameValueList, RasterDataset, SpatialReference, testutils, transformer::GenImgProjTransformer};

    #[test]
    fn edge_points_cover_corners_once() {
        let points = edge_points(&Rect::from_bounds(0.0, 0.0, 10.0, 10.0), 5);
        assert_eq!(points.len(), 20);
        assert_eq!(points.iter().filter(|p| **p == Point::new(0.0, 0.0)).count(), 1);
        assert_eq!(points.iter().filter(|p| **p == Point::new(10.0, 10.0)).count(), 1);
    }

    #[test]
    fn identity_suggestion_matches_source() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 200, 100, [1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]);
        let transformer = GenImgProjTransformer::new(&src, src.spatial_ref(), src.spatial_ref(), &NameValueList::new(), None)?;

        let suggested = suggested_warp_output(&transformer, src.raster_size(), None)?;
        assert_eq!(suggested.size, RasterSize::with_rows_cols(100, 200));
        assert_relative_eq!(suggested.geo_transform, GeoTransform::new([1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]), epsilon = 1e-6);
        Ok(())
    }

    #[test_log::test]
    fn geographic_to_web_mercator() -> Result<()> {
        let src = testutils::geographic_raster("src.tif", 100, 100, [0.0, 0.1, 0.0, 50.0, 0.0, -0.1]);
        let transformer = GenImgProjTransformer::new(
            &src,
            src.spatial_ref(),
            Some(&SpatialReference::web_mercator()),
            &NameValueList::new(),
            None,
        )?;

        let first = suggested_warp_output(&transformer, src.raster_size(), None)?;
        let second = suggested_warp_output(&transformer, src.raster_size(), None)?;
        assert_eq!(first, second);
        assert!(!first.size.is_empty());
        assert!(first.size.rows > first.size.cols);
        assert_relative_eq!(first.extent.min_x(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(first.extent.max_y(), 6446275.841, epsilon = 1e-2);
        Ok(())
    }
}
