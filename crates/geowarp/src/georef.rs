//! Georeferencing models mapping between source pixel/line space and georeferenced coordinates.

use std::{fmt::Debug, str::FromStr};

use crate::{Error, GeoTransform, NameValueList, RasterDataset, RasterSize, Result, SpatialReference, dataset::dataset_name, rpc::RpcModel};

const DEFAULT_RPC_PIXEL_ERROR_THRESHOLD: f64 = 0.1;
const GEOLOC_INVERSE_MAX_ITERATIONS: usize = 30;
const GEOLOC_INVERSE_TOLERANCE: f64 = 1e-6;

/// Ground control point
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Gcp {
    pub pixel: f64,
    pub line: f64,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Geolocation arrays: georeferenced coordinates sampled on a regular grid of the image
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeolocationArrays {
    pub size: RasterSize,
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub pixel_offset: f64,
    pub pixel_step: f64,
    pub line_offset: f64,
    pub line_step: f64,
    pub srs: Option<SpatialReference>,
}

impl GeolocationArrays {
    fn value(&self, values: &[f64], col: usize, row: usize) -> f64 {
        values[row * self.size.cols + col]
    }

    /// Bilinear interpolation (linear extrapolation outside the grid) at fractional array coordinates
    fn interpolate(&self, i: f64, j: f64) -> (f64, f64) {
        let max_col = self.size.cols.saturating_sub(2);
        let max_row = self.size.rows.saturating_sub(2);
        let col = (i.floor().max(0.0) as usize).min(max_col);
        let row = (j.floor().max(0.0) as usize).min(max_row);
        let col1 = (col + 1).min(self.size.cols - 1);
        let row1 = (row + 1).min(self.size.rows - 1);
        let fx = i - col as f64;
        let fy = j - row as f64;

        let lerp = |values: &[f64]| {
            let top = self.value(values, col, row) * (1.0 - fx) + self.value(values, col1, row) * fx;
            let bottom = self.value(values, col, row1) * (1.0 - fx) + self.value(values, col1, row1) * fx;
            top * (1.0 - fy) + bottom * fy
        };

        (lerp(&self.x), lerp(&self.y))
    }

    /// Array coordinates of an image location, samples refer to pixel centers
    fn to_array(&self, pixel: f64, line: f64) -> (f64, f64) {
        (
            (pixel - 0.5 - self.pixel_offset) / self.pixel_step,
            (line - 0.5 - self.line_offset) / self.line_step,
        )
    }

    fn to_image(&self, i: f64, j: f64) -> (f64, f64) {
        (
            self.pixel_offset + i * self.pixel_step + 0.5,
            self.line_offset + j * self.line_step + 0.5,
        )
    }

    /// Same arrays for an image decimated by the given factors
    pub fn scaled(&self, factor_x: f64, factor_y: f64) -> GeolocationArrays {
        let mut geoloc = self.clone();
        geoloc.pixel_offset = (self.pixel_offset + 0.5) / factor_x - 0.5;
        geoloc.line_offset = (self.line_offset + 0.5) / factor_y - 0.5;
        geoloc.pixel_step /= factor_x;
        geoloc.line_step /= factor_y;
        geoloc
    }
}

/// How pixel/line coordinates of a raster are related to georeferenced coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeorefMethod {
    GeoTransform,
    GcpPolynomial,
    Rpc,
    GeolocArray,
    /// Pixel/line coordinates are used as georeferenced coordinates
    NoGeoTransform,
}

impl FromStr for GeorefMethod {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GEOTRANSFORM" => Ok(GeorefMethod::GeoTransform),
            "GCP_POLYNOMIAL" => Ok(GeorefMethod::GcpPolynomial),
            "RPC" => Ok(GeorefMethod::Rpc),
            "GEOLOC_ARRAY" => Ok(GeorefMethod::GeolocArray),
            "NO_GEOTRANSFORM" => Ok(GeorefMethod::NoGeoTransform),
            other => Err(Error::Configuration(format!("Unsupported georeferencing method: {other}"))),
        }
    }
}

/// Mapping between the pixel/line space of one raster and its georeferenced coordinates
pub trait PixelModel: Send + Sync + Debug {
    fn method(&self) -> GeorefMethod;

    /// Pixel/line to georeferenced coordinates, returns the success state per point
    fn pixel_to_georef(&self, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Vec<bool>;

    /// Georeferenced coordinates to pixel/line, returns the success state per point
    fn georef_to_pixel(&self, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Vec<bool>;
}

#[derive(Debug, Clone)]
pub struct AffineModel {
    forward: GeoTransform,
    inverse: GeoTransform,
    method: GeorefMethod,
}

impl AffineModel {
    pub fn new(gt: GeoTransform) -> Result<Self> {
        Ok(AffineModel {
            forward: gt,
            inverse: gt.invert()?,
            method: GeorefMethod::GeoTransform,
        })
    }

    fn identity() -> Self {
        let gt = GeoTransform::new([0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);
        AffineModel {
            forward: gt,
            inverse: gt,
            method: GeorefMethod::NoGeoTransform,
        }
    }

    /// First order polynomial fitted on the ground control points
    pub fn from_gcps(gcps: &[Gcp]) -> Result<Self> {
        if gcps.len() < 3 {
            return Err(Error::Configuration(format!(
                "At least 3 GCPs are needed for a first order polynomial, got {}",
                gcps.len()
            )));
        }

        let forward = fit_affine(gcps.iter().map(|g| ((g.pixel, g.line), (g.x, g.y))))?;
        let inverse = fit_affine(gcps.iter().map(|g| ((g.x, g.y), (g.pixel, g.line))))?;
        Ok(AffineModel {
            forward,
            inverse,
            method: GeorefMethod::GcpPolynomial,
        })
    }
}

impl PixelModel for AffineModel {
    fn method(&self) -> GeorefMethod {
        self.method
    }

    fn pixel_to_georef(&self, x: &mut [f64], y: &mut [f64], _z: &mut [f64]) -> Vec<bool> {
        apply_affine(&self.forward, x, y)
    }

    fn georef_to_pixel(&self, x: &mut [f64], y: &mut [f64], _z: &mut [f64]) -> Vec<bool> {
        apply_affine(&self.inverse, x, y)
    }
}

fn apply_affine(gt: &GeoTransform, x: &mut [f64], y: &mut [f64]) -> Vec<bool> {
    x.iter_mut()
        .zip(y.iter_mut())
        .map(|(x, y)| {
            let p = gt.apply(*x, *y);
            (*x, *y) = (p.x(), p.y());
            x.is_finite() && y.is_finite()
        })
        .collect()
}

/// Least squares fit of `to = a0 + a1 * from.x + a2 * from.y` for both output coordinates
fn fit_affine(pairs: impl Iterator<Item = ((f64, f64), (f64, f64))>) -> Result<GeoTransform> {
    let mut ata = [[0.0; 3]; 3];
    let mut atx = [0.0; 3];
    let mut aty = [0.0; 3];

    for ((u, v), (x, y)) in pairs {
        let row = [1.0, u, v];
        for i in 0..3 {
            for j in 0..3 {
                ata[i][j] += row[i] * row[j];
            }
            atx[i] += row[i] * x;
            aty[i] += row[i] * y;
        }
    }

    let cx = solve3(&ata, &atx).ok_or_else(|| Error::Configuration("GCPs are collinear, cannot fit a polynomial".into()))?;
    let cy = solve3(&ata, &aty).ok_or_else(|| Error::Configuration("GCPs are collinear, cannot fit a polynomial".into()))?;
    Ok(GeoTransform::new([cx[0], cx[1], cx[2], cy[0], cy[1], cy[2]]))
}

fn det3(m: &[[f64; 3]; 3]) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1]) - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

/// Cramer's rule
fn solve3(m: &[[f64; 3]; 3], b: &[f64; 3]) -> Option<[f64; 3]> {
    let det = det3(m);
    let scale = m.iter().flatten().fold(0.0_f64, |acc, v| acc.max(v.abs()));
    if det.abs() <= 1e-12 * scale.powi(3) || det == 0.0 {
        return None;
    }

    let mut result = [0.0; 3];
    for (col, value) in result.iter_mut().enumerate() {
        let mut mc = *m;
        for row in 0..3 {
            mc[row][col] = b[row];
        }
        *value = det3(&mc) / det;
    }
    Some(result)
}

#[derive(Debug, Clone)]
pub struct RpcPixelModel {
    rpc: RpcModel,
    height: f64,
    pixel_error_threshold: f64,
}

impl RpcPixelModel {
    pub fn new(rpc: RpcModel, options: &NameValueList) -> Result<Self> {
        Ok(RpcPixelModel {
            rpc,
            height: options.get_f64("RPC_HEIGHT")?.unwrap_or(0.0),
            pixel_error_threshold: options
                .get_f64("RPC_PIXEL_ERROR_THRESHOLD")?
                .unwrap_or(DEFAULT_RPC_PIXEL_ERROR_THRESHOLD),
        })
    }
}

impl PixelModel for RpcPixelModel {
    fn method(&self) -> GeorefMethod {
        GeorefMethod::Rpc
    }

    fn pixel_to_georef(&self, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Vec<bool> {
        (0..x.len())
            .map(|i| match self.rpc.image_to_ground(x[i], y[i], self.height + z[i], self.pixel_error_threshold) {
                Some((long, lat)) => {
                    (x[i], y[i]) = (long, lat);
                    true
                }
                None => false,
            })
            .collect()
    }

    fn georef_to_pixel(&self, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Vec<bool> {
        (0..x.len())
            .map(|i| match self.rpc.ground_to_image(x[i], y[i], self.height + z[i]) {
                Some((sample, line)) => {
                    (x[i], y[i]) = (sample, line);
                    true
                }
                None => false,
            })
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct GeolocationModel {
    arrays: GeolocationArrays,
}

impl GeolocationModel {
    pub fn new(arrays: GeolocationArrays) -> Result<Self> {
        if arrays.size.cols < 2 || arrays.size.rows < 2 || arrays.x.len() != arrays.size.cell_count() || arrays.y.len() != arrays.size.cell_count() {
            return Err(Error::Configuration("Geolocation arrays must be at least 2x2 and match their size".into()));
        }

        Ok(GeolocationModel { arrays })
    }

    fn invert_point(&self, gx: f64, gy: f64) -> Option<(f64, f64)> {
        let geo = &self.arrays;
        let mut i = (geo.size.cols as f64 - 1.0) / 2.0;
        let mut j = (geo.size.rows as f64 - 1.0) / 2.0;
        let h = 1e-3;

        for _ in 0..GEOLOC_INVERSE_MAX_ITERATIONS {
            let (x, y) = geo.interpolate(i, j);
            let (rx, ry) = (gx - x, gy - y);

            let (xi, yi) = geo.interpolate(i + h, j);
            let (xj, yj) = geo.interpolate(i, j + h);
            let (j11, j21) = ((xi - x) / h, (yi - y) / h);
            let (j12, j22) = ((xj - x) / h, (yj - y) / h);
            let det = j11 * j22 - j12 * j21;
            if det.abs() < 1e-30 {
                return None;
            }

            let di = (j22 * rx - j12 * ry) / det;
            let dj = (-j21 * rx + j11 * ry) / det;
            i += di;
            j += dj;
            if di.abs() < GEOLOC_INVERSE_TOLERANCE && dj.abs() < GEOLOC_INVERSE_TOLERANCE {
                return Some(geo.to_image(i, j));
            }
        }

        None
    }
}

impl PixelModel for GeolocationModel {
    fn method(&self) -> GeorefMethod {
        GeorefMethod::GeolocArray
    }

    fn pixel_to_georef(&self, x: &mut [f64], y: &mut [f64], _z: &mut [f64]) -> Vec<bool> {
        x.iter_mut()
            .zip(y.iter_mut())
            .map(|(x, y)| {
                let (i, j) = self.arrays.to_array(*x, *y);
                (*x, *y) = self.arrays.interpolate(i, j);
                x.is_finite() && y.is_finite()
            })
            .collect()
    }

    fn georef_to_pixel(&self, x: &mut [f64], y: &mut [f64], _z: &mut [f64]) -> Vec<bool> {
        x.iter_mut()
            .zip(y.iter_mut())
            .map(|(x, y)| match self.invert_point(*x, *y) {
                Some((px, py)) => {
                    (*x, *y) = (px, py);
                    true
                }
                None => false,
            })
            .collect()
    }
}

/// Georeferencing method of a raster: the `METHOD`/`SRC_METHOD` transformer option, otherwise the first available of
/// geotransform, GCPs, RPC and geolocation arrays
pub fn georef_method(ds: &dyn RasterDataset, options: &NameValueList) -> Result<GeorefMethod> {
    if let Some(method) = options.get("SRC_METHOD").or(options.get("METHOD")) {
        return method.parse();
    }

    if ds.geo_transform().is_some() {
        Ok(GeorefMethod::GeoTransform)
    } else if !ds.gcps().is_empty() {
        Ok(GeorefMethod::GcpPolynomial)
    } else if ds.rpc().is_some() {
        Ok(GeorefMethod::Rpc)
    } else if ds.geolocation().is_some() {
        Ok(GeorefMethod::GeolocArray)
    } else {
        Err(Error::Configuration(format!(
            "Unable to compute a transformation between pixel/line and georeferenced coordinates for {}. \
             There is no affine transformation and no GCPs. Specify transformation option SRC_METHOD=NO_GEOTRANSFORM to bypass this check.",
            dataset_name(ds)
        )))
    }
}

/// Pixel model of a raster for the given georeferencing method
pub fn create_pixel_model(ds: &dyn RasterDataset, method: GeorefMethod, options: &NameValueList) -> Result<Box<dyn PixelModel>> {
    let missing = |what: &str| Error::Configuration(format!("{} has no {what}", dataset_name(ds)));

    Ok(match method {
        GeorefMethod::GeoTransform => Box::new(AffineModel::new(ds.geo_transform().ok_or_else(|| missing("geotransform"))?)?),
        GeorefMethod::GcpPolynomial => Box::new(AffineModel::from_gcps(ds.gcps())?),
        GeorefMethod::Rpc => Box::new(RpcPixelModel::new(ds.rpc().cloned().ok_or_else(|| missing("RPC metadata"))?, options)?),
        GeorefMethod::GeolocArray => Box::new(GeolocationModel::new(
            ds.geolocation().cloned().ok_or_else(|| missing("geolocation arrays"))?,
        )?),
        GeorefMethod::NoGeoTransform => Box::new(AffineModel::identity()),
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn gcp_polynomial_fit() -> Result<()> {
        let gt = GeoTransform::new([100.0, 2.0, 0.1, 500.0, -0.2, -2.0]);
        let gcps: Vec<Gcp> = [(0.0, 0.0), (100.0, 0.0), (0.0, 100.0), (100.0, 100.0), (50.0, 30.0)]
            .into_iter()
            .map(|(pixel, line)| {
                let p = gt.apply(pixel, line);
                Gcp {
                    pixel,
                    line,
                    x: p.x(),
                    y: p.y(),
                    z: 0.0,
                }
            })
            .collect();

        let model = AffineModel::from_gcps(&gcps)?;
        let (mut x, mut y, mut z) = (vec![25.0], vec![75.0], vec![0.0]);
        assert_eq!(model.pixel_to_georef(&mut x, &mut y, &mut z), vec![true]);
        let expected = gt.apply(25.0, 75.0);
        assert_relative_eq!(x[0], expected.x(), epsilon = 1e-9);
        assert_relative_eq!(y[0], expected.y(), epsilon = 1e-9);

        model.georef_to_pixel(&mut x, &mut y, &mut z);
        assert_relative_eq!(x[0], 25.0, epsilon = 1e-9);
        assert_relative_eq!(y[0], 75.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn collinear_gcps_fail() {
        let gcps: Vec<Gcp> = (0..4)
            .map(|i| Gcp {
                pixel: i as f64,
                line: i as f64,
                x: i as f64,
                y: i as f64,
                z: 0.0,
            })
            .collect();
        assert!(AffineModel::from_gcps(&gcps).is_err());
        assert!(AffineModel::from_gcps(&gcps[..2]).is_err());
    }

    #[test]
    fn geolocation_round_trip() -> Result<()> {
        let size = RasterSize::with_rows_cols(5, 6);
        let mut xs = Vec::new();
        let mut ys = Vec::new();
        for row in 0..size.rows {
            for col in 0..size.cols {
                xs.push(10.0 + col as f64 * 0.1 + row as f64 * 0.01);
                ys.push(50.0 - row as f64 * 0.1);
            }
        }

        let model = GeolocationModel::new(GeolocationArrays {
            size,
            x: xs,
            y: ys,
            pixel_offset: 0.0,
            pixel_step: 10.0,
            line_offset: 0.0,
            line_step: 10.0,
            srs: None,
        })?;

        let (mut x, mut y, mut z) = (vec![25.5], vec![17.25], vec![0.0]);
        assert_eq!(model.pixel_to_georef(&mut x, &mut y, &mut z), vec![true]);
        assert_eq!(model.georef_to_pixel(&mut x, &mut y, &mut z), vec![true]);
        assert_relative_eq!(x[0], 25.5, epsilon = 1e-4);
        assert_relative_eq!(y[0], 17.25, epsilon = 1e-4);
        Ok(())
    }

    #[test]
    fn parse_method() -> Result<()> {
        assert_eq!("rpc".parse::<GeorefMethod>()?, GeorefMethod::Rpc);
        assert!("GCP_TPS".parse::<GeorefMethod>().is_err());
        Ok(())
    }
}
