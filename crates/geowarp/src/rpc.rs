//! Rational polynomial coefficient (RPC00B) sensor model.

/// Number of terms of each cubic rational polynomial
pub const RPC_TERM_COUNT: usize = 20;

const INVERSE_MAX_ITERATIONS: usize = 20;

/// RPC00B sensor model, maps longitude/latitude/height to image sample/line
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RpcModel {
    pub line_off: f64,
    pub samp_off: f64,
    pub lat_off: f64,
    pub long_off: f64,
    pub height_off: f64,
    pub line_scale: f64,
    pub samp_scale: f64,
    pub lat_scale: f64,
    pub long_scale: f64,
    pub height_scale: f64,
    pub line_num_coeff: [f64; RPC_TERM_COUNT],
    pub line_den_coeff: [f64; RPC_TERM_COUNT],
    pub samp_num_coeff: [f64; RPC_TERM_COUNT],
    pub samp_den_coeff: [f64; RPC_TERM_COUNT],
}

fn terms(l: f64, p: f64, h: f64) -> [f64; RPC_TERM_COUNT] {
    [
        1.0,
        l,
        p,
        h,
        l * p,
        l * h,
        p * h,
        l * l,
        p * p,
        h * h,
        p * l * h,
        l * l * l,
        l * p * p,
        l * h * h,
        l * l * p,
        p * p * p,
        p * h * h,
        l * l * h,
        p * p * h,
        h * h * h,
    ]
}

fn evaluate(coefficients: &[f64; RPC_TERM_COUNT], terms: &[f64; RPC_TERM_COUNT]) -> f64 {
    coefficients.iter().zip(terms).map(|(c, t)| c * t).sum()
}

impl RpcModel {
    /// Image location of a ground point as (sample, line), relative to the top left corner of the image.
    /// The RPC sample/line values refer to pixel centers.
    pub fn ground_to_image(&self, long: f64, lat: f64, height: f64) -> Option<(f64, f64)> {
        let l = (long - self.long_off) / self.long_scale;
        let p = (lat - self.lat_off) / self.lat_scale;
        let h = (height - self.height_off) / self.height_scale;
        let t = terms(l, p, h);

        let line_den = evaluate(&self.line_den_coeff, &t);
        let samp_den = evaluate(&self.samp_den_coeff, &t);
        if line_den == 0.0 || samp_den == 0.0 {
            return None;
        }

        let line = evaluate(&self.line_num_coeff, &t) / line_den * self.line_scale + self.line_off;
        let samp = evaluate(&self.samp_num_coeff, &t) / samp_den * self.samp_scale + self.samp_off;
        (line.is_finite() && samp.is_finite()).then_some((samp + 0.5, line + 0.5))
    }

    /// Ground location of an image point, solved iteratively until the reprojected point is within `pixel_threshold`
    pub fn image_to_ground(&self, sample: f64, line: f64, height: f64, pixel_threshold: f64) -> Option<(f64, f64)> {
        let mut long = self.long_off;
        let mut lat = self.lat_off;
        let d_long = self.long_scale.abs().max(1e-9) * 1e-4;
        let d_lat = self.lat_scale.abs().max(1e-9) * 1e-4;

        for _ in 0..INVERSE_MAX_ITERATIONS {
            let (s, l) = self.ground_to_image(long, lat, height)?;
            let (res_s, res_l) = (sample - s, line - l);
            if res_s.abs() <= pixel_threshold && res_l.abs() <= pixel_threshold {
                return Some((long, lat));
            }

            let (s_dx, l_dx) = self.ground_to_image(long + d_long, lat, height)?;
            let (s_dy, l_dy) = self.ground_to_image(long, lat + d_lat, height)?;
            let (j11, j21) = ((s_dx - s) / d_long, (l_dx - l) / d_long);
            let (j12, j22) = ((s_dy - s) / d_lat, (l_dy - l) / d_lat);

            let det = j11 * j22 - j12 * j21;
            if det.abs() < 1e-20 {
                return None;
            }

            long += (j22 * res_s - j12 * res_l) / det;
            lat += (-j21 * res_s + j11 * res_l) / det;
        }

        let (s, l) = self.ground_to_image(long, lat, height)?;
        ((sample - s).abs() <= pixel_threshold && (line - l).abs() <= pixel_threshold).then_some((long, lat))
    }

    /// Model of an image decimated by the given factors (e.g. an overview)
    pub fn scaled(&self, factor_x: f64, factor_y: f64) -> RpcModel {
        let mut rpc = self.clone();
        rpc.samp_off = (self.samp_off + 0.5) / factor_x - 0.5;
        rpc.line_off = (self.line_off + 0.5) / factor_y - 0.5;
        rpc.samp_scale /= factor_x;
        rpc.line_scale /= factor_y;
        rpc
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// Near affine model with a small quadratic term covering a 1000x1000 image around (5, 50)
    pub fn test_rpc() -> RpcModel {
        let mut line_num = [0.0; RPC_TERM_COUNT];
        let mut samp_num = [0.0; RPC_TERM_COUNT];
        let mut den = [0.0; RPC_TERM_COUNT];
        den[0] = 1.0;
        line_num[2] = -1.0;
        line_num[7] = 0.01;
        samp_num[1] = 1.0;
        samp_num[8] = 0.01;

        RpcModel {
            line_off: 500.0,
            samp_off: 500.0,
            lat_off: 50.0,
            long_off: 5.0,
            height_off: 0.0,
            line_scale: 500.0,
            samp_scale: 500.0,
            lat_scale: 0.05,
            long_scale: 0.05,
            height_scale: 500.0,
            line_num_coeff: line_num,
            line_den_coeff: den,
            samp_num_coeff: samp_num,
            samp_den_coeff: den,
        }
    }

    #[test]
    fn ground_to_image_center() {
        let rpc = test_rpc();
        let (s, l) = rpc.ground_to_image(5.0, 50.0, 0.0).expect("valid");
        assert_relative_eq!(s, 500.5);
        assert_relative_eq!(l, 500.5);
    }

    #[test]
    fn image_to_ground_inverts() {
        let rpc = test_rpc();
        let (s, l) = rpc.ground_to_image(5.03, 49.98, 0.0).expect("valid");
        let (long, lat) = rpc.image_to_ground(s, l, 0.0, 1e-6).expect("converges");
        assert_relative_eq!(long, 5.03, epsilon = 1e-7);
        assert_relative_eq!(lat, 49.98, epsilon = 1e-7);
    }

    #[test]
    fn scaled_model_matches_decimated_image() {
        let rpc = test_rpc();
        let half = rpc.scaled(2.0, 2.0);
        let (s, l) = rpc.ground_to_image(5.01, 50.02, 0.0).expect("valid");
        let (s2, l2) = half.ground_to_image(5.01, 50.02, 0.0).expect("valid");
        assert_relative_eq!(s2, s / 2.0, epsilon = 1e-9);
        assert_relative_eq!(l2, l / 2.0, epsilon = 1e-9);
    }
}
