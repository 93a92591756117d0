//! Vertical datum and unit correction of elevation rasters.

use crate::{RasterBand, SpatialReference, srs::LinearUnit};

use super::VerticalShiftPolicy;

/// Decides whether elevation values are corrected during the warp.
///
/// Automatically applied when a single band is warped, at least one of the spatial references has a vertical axis and
/// both spatial references differ.
pub fn must_apply_vertical_shift(
    policy: VerticalShiftPolicy,
    src_srs: Option<&SpatialReference>,
    dst_srs: Option<&SpatialReference>,
    warped_band_count: usize,
) -> bool {
    match policy {
        VerticalShiftPolicy::Force => true,
        VerticalShiftPolicy::Disable => false,
        VerticalShiftPolicy::Auto => {
            let (Some(src), Some(dst)) = (src_srs, dst_srs) else {
                return false;
            };

            warped_band_count == 1 && (src.has_vertical_axis() || dst.has_vertical_axis()) && !src.is_same(dst)
        }
    }
}

/// Meters per unit of the elevation values: the band unit when recognized, otherwise the vertical axis unit
fn to_meter(unit_type: &str, srs: Option<&SpatialReference>) -> f64 {
    if let Some(unit) = LinearUnit::from_name(unit_type) {
        return unit.to_meter;
    }

    if !unit_type.is_empty() {
        log::debug!("Unrecognized elevation unit '{unit_type}', using the unit of the vertical axis");
    }

    srs.and_then(|srs| srs.vertical_unit()).map_or(1.0, |unit| unit.to_meter)
}

/// Multiplication factor converting source elevations to destination elevation units
pub fn vertical_shift_factor(
    src_band: &dyn RasterBand,
    src_srs: Option<&SpatialReference>,
    dst_band: Option<&dyn RasterBand>,
    dst_srs: Option<&SpatialReference>,
) -> f64 {
    let src_to_meter = to_meter(src_band.unit_type(), src_srs);
    let dst_to_meter = to_meter(dst_band.map_or("", |band| band.unit_type()), dst_srs);
    src_to_meter / dst_to_meter
}

/// Unit type of the destination band after a vertical shift
pub fn destination_unit_type(dst_srs: Option<&SpatialReference>) -> Option<&'static str> {
    let unit = dst_srs.and_then(|srs| srs.vertical_unit())?;
    match unit.name.as_str() {
        "metre" => Some("m"),
        "foot" => Some("ft"),
        "US survey foot" => Some("US survey foot"),
        _ => None,
    }
}
