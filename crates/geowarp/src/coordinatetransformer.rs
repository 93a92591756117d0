//! Coordinate operations between spatial references.
//!
//! Reprojections are delegated to proj4rs, explicit `-ct` operations are PROJ style affine transformations.

use crate::{Error, Point, Result, srs::SpatialReference};

mod proj4rs;

/// PROJ style affine operation (`+proj=affine`)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineOperation {
    pub xoff: f64,
    pub yoff: f64,
    pub zoff: f64,
    pub s11: f64,
    pub s12: f64,
    pub s21: f64,
    pub s22: f64,
    pub s33: f64,
}

impl Default for AffineOperation {
    fn default() -> Self {
        AffineOperation {
            xoff: 0.0,
            yoff: 0.0,
            zoff: 0.0,
            s11: 1.0,
            s12: 0.0,
            s21: 0.0,
            s22: 1.0,
            s33: 1.0,
        }
    }
}

impl AffineOperation {
    pub fn apply(&self, x: f64, y: f64, z: f64) -> (f64, f64, f64) {
        (
            self.xoff + self.s11 * x + self.s12 * y,
            self.yoff + self.s21 * x + self.s22 * y,
            self.zoff + self.s33 * z,
        )
    }

    pub fn inverse(&self) -> Result<AffineOperation> {
        let det = self.s11 * self.s22 - self.s12 * self.s21;
        if det.abs() < 1e-15 || self.s33 == 0.0 {
            return Err(Error::InverseUnsupported("affine operation is singular".into()));
        }

        let s11 = self.s22 / det;
        let s12 = -self.s12 / det;
        let s21 = -self.s21 / det;
        let s22 = self.s11 / det;
        Ok(AffineOperation {
            xoff: -(s11 * self.xoff + s12 * self.yoff),
            yoff: -(s21 * self.xoff + s22 * self.yoff),
            zoff: -self.zoff / self.s33,
            s11,
            s12,
            s21,
            s22,
            s33: 1.0 / self.s33,
        })
    }
}

#[derive(Debug, Clone)]
enum Operation {
    Identity,
    Affine(AffineOperation),
    Proj4rs(proj4rs::Proj4rsOperation),
}

impl Operation {
    fn inverse(&self) -> Result<Operation> {
        Ok(match self {
            Operation::Identity => Operation::Identity,
            Operation::Affine(affine) => Operation::Affine(affine.inverse()?),
            Operation::Proj4rs(op) => Operation::Proj4rs(op.inverse()),
        })
    }

    fn apply(&self, x: &mut [f64], y: &mut [f64], z: &mut [f64], success: &mut [bool]) {
        match self {
            Operation::Identity => {}
            Operation::Affine(affine) => {
                for i in 0..x.len() {
                    (x[i], y[i], z[i]) = affine.apply(x[i], y[i], z[i]);
                }
            }
            Operation::Proj4rs(op) => op.apply(x, y, z, success),
        }
    }
}

/// Transforms coordinates from a source to a target spatial reference
#[derive(Debug, Clone)]
pub struct CoordinateTransformer {
    source: SpatialReference,
    target: SpatialReference,
    operation: Operation,
}

impl CoordinateTransformer {
    pub fn new(source: &SpatialReference, target: &SpatialReference) -> Result<Self> {
        Ok(CoordinateTransformer {
            source: source.clone(),
            target: target.clone(),
            operation: Self::find_operation(source, target)?,
        })
    }

    /// Uses an explicit coordinate operation (`-ct`) instead of the one derived from the spatial references
    pub fn with_operation(source: &SpatialReference, target: &SpatialReference, definition: &str) -> Result<Self> {
        Ok(CoordinateTransformer {
            source: source.clone(),
            target: target.clone(),
            operation: parse_operation(definition)?,
        })
    }

    fn find_operation(source: &SpatialReference, target: &SpatialReference) -> Result<Operation> {
        if source.is_same_horizontal(target) {
            return Ok(Operation::Identity);
        }

        Ok(Operation::Proj4rs(proj4rs::Proj4rsOperation::new(source, target)))
    }

    pub fn inverse(&self) -> Result<Self> {
        Ok(CoordinateTransformer {
            source: self.target.clone(),
            target: self.source.clone(),
            operation: self.operation.inverse()?,
        })
    }

    pub fn source_srs(&self) -> &SpatialReference {
        &self.source
    }

    pub fn target_srs(&self) -> &SpatialReference {
        &self.target
    }

    pub fn is_identity(&self) -> bool {
        matches!(self.operation, Operation::Identity)
    }

    /// Transforms the coordinates in place, returns the success state per point
    pub fn transform_coords(&self, x: &mut [f64], y: &mut [f64], z: &mut [f64]) -> Vec<bool> {
        let mut success: Vec<bool> = x.iter().zip(y.iter()).map(|(x, y)| x.is_finite() && y.is_finite()).collect();
        self.operation.apply(x, y, z, &mut success);
        for (i, ok) in success.iter_mut().enumerate() {
            *ok = *ok && x[i].is_finite() && y[i].is_finite();
        }
        success
    }

    pub fn transform_point(&self, point: Point) -> Result<Point> {
        let (mut x, mut y, mut z) = ([point.x()], [point.y()], [0.0]);
        if self.transform_coords(&mut x, &mut y, &mut z)[0] {
            Ok(Point::new(x[0], y[0]))
        } else {
            Err(Error::Transform(format!(
                "Failed to transform point ({}, {}) from {} to {}",
                point.x(),
                point.y(),
                self.source,
                self.target
            )))
        }
    }

    pub fn transform_points_in_place(&self, points: &mut [Point]) -> Result<()> {
        for point in points.iter_mut() {
            *point = self.transform_point(*point)?;
        }
        Ok(())
    }
}

fn parse_operation(definition: &str) -> Result<Operation> {
    let mut affine = AffineOperation::default();
    let mut proj = None;
    let mut inverse = false;

    for token in definition.split_whitespace() {
        let token = token.strip_prefix('+').unwrap_or(token);
        let (key, value) = token.split_once('=').unwrap_or((token, ""));
        let number = || {
            value
                .parse::<f64>()
                .map_err(|_| Error::InvalidArgument(format!("Invalid value for '{key}' in coordinate operation: '{value}'")))
        };

        match key {
            "proj" => proj = Some(value.to_string()),
            "inv" => inverse = true,
            "xoff" => affine.xoff = number()?,
            "yoff" => affine.yoff = number()?,
            "zoff" => affine.zoff = number()?,
            "s11" => affine.s11 = number()?,
            "s12" => affine.s12 = number()?,
            "s21" => affine.s21 = number()?,
            "s22" => affine.s22 = number()?,
            "s33" => affine.s33 = number()?,
            "no_defs" | "type" => {}
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "Unsupported parameter '{key}' in coordinate operation '{definition}'"
                )));
            }
        }
    }

    let operation = match proj.as_deref() {
        Some("affine") => Operation::Affine(affine),
        Some("noop") => Operation::Identity,
        _ => {
            return Err(Error::InvalidArgument(format!(
                "Unsupported coordinate operation '{definition}', expected +proj=affine or +proj=noop"
            )));
        }
    };

    if inverse { operation.inverse() } else { Ok(operation) }
}
