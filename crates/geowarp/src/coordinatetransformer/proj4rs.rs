use proj4rs::Proj;
use proj4rs::transform::transform;

use crate::SpatialReference;

#[derive(Debug, Clone)]
pub struct Proj4rsOperation {
    source: Proj,
    target: Proj,
}

impl Proj4rsOperation {
    pub fn new(source: &SpatialReference, target: &SpatialReference) -> Self {
        Proj4rsOperation {
            source: source.proj().clone(),
            target: target.proj().clone(),
        }
    }

    pub fn inverse(&self) -> Self {
        Proj4rsOperation {
            source: self.target.clone(),
            target: self.source.clone(),
        }
    }

    pub fn apply(&self, x: &mut [f64], y: &mut [f64], z: &mut [f64], success: &mut [bool]) {
        for i in 0..x.len() {
            if !success[i] {
                continue;
            }

            // proj4rs works in radians for geographic coordinates
            let mut point = if self.source.is_latlong() {
                (x[i].to_radians(), y[i].to_radians(), z[i])
            } else {
                (x[i], y[i], z[i])
            };

            match transform(&self.source, &self.target, &mut point) {
                Ok(()) => {
                    if self.target.is_latlong() {
                        point.0 = point.0.to_degrees();
                        point.1 = point.1.to_degrees();
                    }
                    (x[i], y[i], z[i]) = point;
                }
                Err(err) => {
                    log::debug!("proj4rs transform failed: {err:?}");
                    success[i] = false;
                }
            }
        }
    }
}
