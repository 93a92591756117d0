//! Image to image transformers mapping destination pixel space to source pixel space.

use std::{fmt::Debug, sync::Arc};

use crate::{
    CoordinateTransformer, Error, GeoTransform, NameValueList, RasterDataset, Result, SpatialReference,
    georef::{GeorefMethod, PixelModel, create_pixel_model, georef_method},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    SrcToDst,
    DstToSrc,
}

/// Batch point mapping between two pixel spaces.
///
/// Returns the success state per point, or an error when the requested direction is not supported at all.
pub trait Transformer: Send + Sync + Debug {
    fn transform(&self, direction: Direction, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Result<Vec<bool>>;

    /// Human readable description, used when serializing warp descriptions
    fn describe(&self) -> String;
}

/// Shared transformer, either owned by one warp or handed over to a virtual dataset
pub type TransformerHandle = Arc<dyn Transformer>;

/// Composes the source georeferencing model, an optional reprojection and the destination geotransform
#[derive(Debug)]
pub struct GenImgProjTransformer {
    src_model: Box<dyn PixelModel>,
    reproject: Option<CoordinateTransformer>,
    reproject_inverse: Option<std::result::Result<CoordinateTransformer, String>>,
    dst_geo_transform: Option<(GeoTransform, GeoTransform)>,
}

impl GenImgProjTransformer {
    /// Transformer from the source pixel space to the destination georeferenced space.
    /// `coordinate_operation` replaces the operation derived from the spatial references (`-ct`).
    pub fn new(
        src: &dyn RasterDataset,
        src_srs: Option<&SpatialReference>,
        dst_srs: Option<&SpatialReference>,
        options: &NameValueList,
        coordinate_operation: Option<&str>,
    ) -> Result<Self> {
        let method = georef_method(src, options)?;
        let src_model = create_pixel_model(src, method, options)?;

        let reproject = match (src_srs, dst_srs, coordinate_operation) {
            (Some(s), Some(d), Some(op)) => Some(CoordinateTransformer::with_operation(s, d, op)?),
            (Some(s), Some(d), None) => {
                let ct = CoordinateTransformer::new(s, d)?;
                (!ct.is_identity()).then_some(ct)
            }
            (_, _, Some(_)) => {
                return Err(Error::Configuration(
                    "A coordinate operation requires both a source and a target spatial reference".into(),
                ));
            }
            _ => None,
        };

        let reproject_inverse = reproject.as_ref().map(|ct| ct.inverse().map_err(|e| e.to_string()));

        Ok(GenImgProjTransformer {
            src_model,
            reproject,
            reproject_inverse,
            dst_geo_transform: None,
        })
    }

    pub fn method(&self) -> GeorefMethod {
        self.src_model.method()
    }

    pub fn has_reprojection(&self) -> bool {
        self.reproject.is_some()
    }

    /// Maps destination georeferenced coordinates to destination pixels from now on
    pub fn set_dst_geo_transform(&mut self, gt: GeoTransform) -> Result {
        self.dst_geo_transform = Some((gt, gt.invert()?));
        Ok(())
    }

    pub fn dst_geo_transform(&self) -> Option<GeoTransform> {
        self.dst_geo_transform.map(|(gt, _)| gt)
    }
}

fn and_into(success: &mut [bool], stage: Vec<bool>) {
    for (ok, stage_ok) in success.iter_mut().zip(stage) {
        *ok = *ok && stage_ok;
    }
}

impl Transformer for GenImgProjTransformer {
    fn transform(&self, direction: Direction, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Result<Vec<bool>> {
        let mut success = vec![true; x.len()];

        match direction {
            Direction::SrcToDst => {
                and_into(&mut success, self.src_model.pixel_to_georef(x, y, z));
                if let Some(ct) = &self.reproject {
                    and_into(&mut success, ct.transform_coords(x, y, z));
                }
                if let Some((_, inverse)) = &self.dst_geo_transform {
                    for (x, y) in x.iter_mut().zip(y.iter_mut()) {
                        let p = inverse.apply(*x, *y);
                        (*x, *y) = (p.x(), p.y());
                    }
                }
            }
            Direction::DstToSrc => {
                if let Some((forward, _)) = &self.dst_geo_transform {
                    for (x, y) in x.iter_mut().zip(y.iter_mut()) {
                        let p = forward.apply(*x, *y);
                        (*x, *y) = (p.x(), p.y());
                    }
                }
                match &self.reproject_inverse {
                    Some(Ok(ct)) => and_into(&mut success, ct.transform_coords(x, y, z)),
                    Some(Err(msg)) => return Err(Error::InverseUnsupported(msg.clone())),
                    None => {}
                }
                and_into(&mut success, self.src_model.georef_to_pixel(x, y, z));
            }
        }

        Ok(success)
    }

    fn describe(&self) -> String {
        let reprojection = match &self.reproject {
            Some(ct) => format!("{} -> {}", ct.source_srs(), ct.target_srs()),
            None => "none".to_string(),
        };

        format!(
            "GenImgProjTransformer(method: {:?}, reprojection: {reprojection}, dst geotransform: {:?})",
            self.method(),
            self.dst_geo_transform().map(|gt| gt.coefficients())
        )
    }
}

/// Linear approximation of another transformer along scanlines.
///
/// The first, middle and last point of a scanline are transformed exactly, when the middle point of the linear interpolation
/// between the end points is within `max_error` the remaining points are interpolated, otherwise the scanline is subdivided.
#[derive(Debug)]
pub struct ApproxTransformer {
    base: TransformerHandle,
    max_error: f64,
}

/// Scanlines shorter than this are transformed exactly
const MIN_APPROX_POINTS: usize = 5;

impl ApproxTransformer {
    pub fn new(base: TransformerHandle, max_error: f64) -> Self {
        ApproxTransformer { base, max_error }
    }

    pub fn max_error(&self) -> f64 {
        self.max_error
    }

    fn is_scanline(x: &[f64], y: &[f64], z: &[f64]) -> bool {
        let n = x.len();
        n >= MIN_APPROX_POINTS && x[n - 1] != x[0] && y.iter().all(|v| *v == y[0]) && z.iter().all(|v| *v == z[0])
    }

    fn transform_segment(&self, direction: Direction, x: &mut [f64], y: &mut [f64], z: &mut [f64], success: &mut [bool]) -> Result {
        let n = x.len();
        if n < MIN_APPROX_POINTS {
            let exact = self.base.transform(direction, x, y, z)?;
            success.copy_from_slice(&exact);
            return Ok(());
        }

        let middle = n / 2;
        let mut px = [x[0], x[middle], x[n - 1]];
        let mut py = [y[0], y[middle], y[n - 1]];
        let mut pz = [z[0], z[middle], z[n - 1]];
        let ok = self.base.transform(direction, &mut px, &mut py, &mut pz)?;

        if ok.iter().all(|v| *v) {
            let span = x[n - 1] - x[0];
            let t = (x[middle] - x[0]) / span;
            let err_x = (px[0] + t * (px[2] - px[0]) - px[1]).abs();
            let err_y = (py[0] + t * (py[2] - py[0]) - py[1]).abs();

            if err_x.max(err_y) <= self.max_error {
                let x0 = x[0];
                for i in 0..n {
                    let t = (x[i] - x0) / span;
                    x[i] = px[0] + t * (px[2] - px[0]);
                    y[i] = py[0] + t * (py[2] - py[0]);
                    z[i] = pz[0] + t * (pz[2] - pz[0]);
                    success[i] = true;
                }
                return Ok(());
            }
        }

        let (x_left, x_right) = x.split_at_mut(middle);
        let (y_left, y_right) = y.split_at_mut(middle);
        let (z_left, z_right) = z.split_at_mut(middle);
        let (s_left, s_right) = success.split_at_mut(middle);
        self.transform_segment(direction, x_left, y_left, z_left, s_left)?;
        self.transform_segment(direction, x_right, y_right, z_right, s_right)
    }
}

impl Transformer for ApproxTransformer {
    fn transform(&self, direction: Direction, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Result<Vec<bool>> {
        if !Self::is_scanline(x, y, z) {
            return self.base.transform(direction, x, y, z);
        }

        let mut success = vec![false; x.len()];
        self.transform_segment(direction, x, y, z, &mut success)?;
        Ok(success)
    }

    fn describe(&self) -> String {
        format!("ApproxTransformer(max_error: {}, {})", self.max_error, self.base.describe())
    }
}

/// Transforms a single point, `None` when the point failed
pub fn transform_point(transformer: &dyn Transformer, direction: Direction, x: f64, y: f64) -> Result<Option<(f64, f64)>> {
    let (mut xs, mut ys, mut zs) = ([x], [y], [0.0]);
    let ok = transformer.transform(direction, &mut xs, &mut ys, &mut zs)?;
    Ok(ok[0].then_some((xs[0], ys[0])))
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::testutils;

    #[test]
    fn reprojecting_transformer_round_trip() -> Result<()> {
        let src = testutils::geographic_raster("src.tif", 100, 100, [0.0, 0.1, 0.0, 50.0, 0.0, -0.1]);
        let mut trans = GenImgProjTransformer::new(
            &src,
            src.spatial_ref(),
            Some(&SpatialReference::web_mercator()),
            &NameValueList::new(),
            None,
        )?;
        assert!(trans.has_reprojection());
        trans.set_dst_geo_transform(GeoTransform::north_up(0.0, 6446275.84, 1000.0, 1000.0))?;

        let (x, y) = transform_point(&trans, Direction::SrcToDst, 50.0, 50.0)?.expect("valid point");
        let (sx, sy) = transform_point(&trans, Direction::DstToSrc, x, y)?.expect("valid point");
        assert_relative_eq!(sx, 50.0, epsilon = 1e-6);
        assert_relative_eq!(sy, 50.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn singular_operation_reports_unsupported_inverse() -> Result<()> {
        let src = testutils::geographic_raster("src.tif", 10, 10, [0.0, 0.1, 0.0, 50.0, 0.0, -0.1]);
        let wgs84 = SpatialReference::wgs84();
        let trans = GenImgProjTransformer::new(&src, Some(&wgs84), Some(&wgs84), &NameValueList::new(), Some("+proj=affine +s11=0"))?;

        let (mut x, mut y, mut z) = ([1.0], [1.0], [0.0]);
        assert!(trans.transform(Direction::SrcToDst, &mut x, &mut y, &mut z).is_ok());
        assert!(matches!(
            trans.transform(Direction::DstToSrc, &mut x, &mut y, &mut z),
            Err(Error::InverseUnsupported(_))
        ));
        Ok(())
    }

    #[test]
    fn approx_matches_exact_within_threshold() -> Result<()> {
        let src = testutils::geographic_raster("src.tif", 200, 200, [-10.0, 0.1, 0.0, 60.0, 0.0, -0.1]);
        let mut exact = GenImgProjTransformer::new(
            &src,
            src.spatial_ref(),
            Some(&SpatialReference::web_mercator()),
            &NameValueList::new(),
            None,
        )?;
        exact.set_dst_geo_transform(GeoTransform::north_up(-1113194.9, 8399737.9, 10000.0, 10000.0))?;
        let exact: TransformerHandle = Arc::new(exact);
        let approx = ApproxTransformer::new(exact.clone(), 0.125);

        let n = 200;
        let mut ax: Vec<f64> = (0..n).map(|i| i as f64 + 0.5).collect();
        let mut ay = vec![100.5; n];
        let mut az = vec![0.0; n];
        let (mut ex, mut ey, mut ez) = (ax.clone(), ay.clone(), az.clone());

        let approx_ok = approx.transform(Direction::DstToSrc, &mut ax, &mut ay, &mut az)?;
        let exact_ok = exact.transform(Direction::DstToSrc, &mut ex, &mut ey, &mut ez)?;
        for i in 0..n {
            if approx_ok[i] && exact_ok[i] {
                assert!((ax[i] - ex[i]).abs() <= 0.25, "x deviation at {i}");
                assert!((ay[i] - ey[i]).abs() <= 0.25, "y deviation at {i}");
            }
        }
        Ok(())
    }
}
