//! Per source spatial reference and transformer setup.

use crate::{
    RasterDataset, RasterSize, Rect, Result, SpatialReference,
    georef::GeorefMethod,
    transformer::{Direction, GenImgProjTransformer, Transformer, transform_point},
};

use super::WarpRequest;

/// Latitude where web mercator northings reach the extent of the square world
pub const MERCATOR_MAX_LATITUDE: f64 = 85.0511287798066;

fn requested_method(request: &WarpRequest) -> Result<Option<GeorefMethod>> {
    let options = &request.transformer_options;
    options.get("SRC_METHOD").or(options.get("METHOD")).map(str::parse).transpose()
}

/// Effective spatial reference of a source raster.
///
/// In order of priority: `-s_srs`, the `SRC_SRS` transformer option, the geolocation SRS when `SRC_METHOD=GEOLOC_ARRAY`,
/// the raster SRS when georeferenced with a geotransform,
/// the GCP SRS, WGS84 for RPC and finally the SRS of the geolocation arrays.
pub fn source_srs(src: &dyn RasterDataset, request: &WarpRequest) -> Result<Option<SpatialReference>> {
    if let Some(srs) = &request.source_srs {
        return Ok(Some(srs.clone()));
    }

    if let Some(definition) = request.transformer_options.get("SRC_SRS") {
        return Ok(Some(definition.parse()?));
    }

    let method = requested_method(request)?;
    if method == Some(GeorefMethod::GeolocArray) {
        if let Some(srs) = src.geolocation().and_then(|geoloc| geoloc.srs.as_ref()) {
            return Ok(Some(srs.clone()));
        }
    }

    let allows = |candidate: GeorefMethod| method.is_none() || method == Some(candidate);

    if allows(GeorefMethod::GeoTransform) {
        if let Some(srs) = src.spatial_ref() {
            return Ok(Some(srs.clone()));
        }
    }

    if allows(GeorefMethod::GcpPolynomial) && !src.gcps().is_empty() {
        if let Some(srs) = src.gcp_spatial_ref() {
            return Ok(Some(srs.clone()));
        }
    }

    if allows(GeorefMethod::Rpc) && src.rpc().is_some() {
        return Ok(Some(SpatialReference::wgs84()));
    }

    Ok(src.geolocation().and_then(|geoloc| geoloc.srs.clone()))
}

/// Transformer from source pixel space to the (not yet known) destination georeferenced space
pub fn create_transformer(
    src: &dyn RasterDataset,
    src_srs: Option<&SpatialReference>,
    dst_srs: Option<&SpatialReference>,
    request: &WarpRequest,
) -> Result<GenImgProjTransformer> {
    GenImgProjTransformer::new(
        src,
        src_srs,
        dst_srs,
        &request.transformer_options,
        request.coordinate_operation.as_deref(),
    )
}

/// Source window (pixel/line) excluding the latitudes mercator cannot represent, `None` when the whole source can be used
pub fn mercator_clamp_window(
    src: &dyn RasterDataset,
    src_srs: Option<&SpatialReference>,
    dst_srs: Option<&SpatialReference>,
) -> Option<Rect<f64>> {
    let (src_srs, dst_srs) = (src_srs?, dst_srs?);
    if !dst_srs.is_mercator_derived() || !src_srs.is_geographic() {
        return None;
    }

    let gt = src.geo_transform().filter(|gt| gt.is_axis_aligned())?;
    let size = src.raster_size();
    let bounds = gt.bounds(size);
    if bounds.min_y() >= -MERCATOR_MAX_LATITUDE && bounds.max_y() <= MERCATOR_MAX_LATITUDE {
        return None;
    }

    let top_y = gt.top_left().y();
    let top_row = ((bounds.max_y().min(MERCATOR_MAX_LATITUDE) - top_y) / gt.cell_size_y()).max(0.0);
    let bottom_row = ((bounds.min_y().max(-MERCATOR_MAX_LATITUDE) - top_y) / gt.cell_size_y()).min(size.rows as f64);
    if bottom_row <= top_row {
        return None;
    }

    log::debug!("Clamping the source latitudes to +/-{MERCATOR_MAX_LATITUDE} for the mercator output");
    Some(Rect::from_bounds(0.0, top_row, size.cols as f64, bottom_row))
}

/// Checks the inverse transformation at the center of the destination raster.
///
/// An unsupported inverse makes the warp impossible, a failing point is acceptable.
pub fn check_invertible(transformer: &dyn Transformer, dst_size: RasterSize) -> Result {
    let center = (dst_size.cols as f64 / 2.0, dst_size.rows as f64 / 2.0);
    if transform_point(transformer, Direction::DstToSrc, center.0, center.1)?.is_none() {
        log::debug!("Center of the destination raster does not map to the source");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{Error, NameValueList, testutils};

    #[test]
    fn source_srs_priority() -> Result<()> {
        let src = testutils::geographic_raster("src.tif", 10, 10, [0.0, 1.0, 0.0, 10.0, 0.0, -1.0]);

        let request = WarpRequest::builder().build();
        assert_eq!(source_srs(&src, &request)?.and_then(|srs| srs.epsg()), Some(4326));

        let request = WarpRequest::builder().source_srs(SpatialReference::from_epsg(31370)?).build();
        assert_eq!(source_srs(&src, &request)?.and_then(|srs| srs.epsg()), Some(31370));

        let request = WarpRequest::builder()
            .transformer_options(NameValueList::parse(&["SRC_SRS=EPSG:3857"])?)
            .build();
        assert_eq!(source_srs(&src, &request)?.and_then(|srs| srs.epsg()), Some(3857));

        let rpc = testutils::rpc_raster("rpc.tif");
        assert_eq!(source_srs(&rpc, &WarpRequest::builder().build())?.and_then(|srs| srs.epsg()), Some(4326));
        Ok(())
    }

    #[test]
    fn mercator_window_clamps_polar_latitudes() {
        let src = testutils::geographic_raster("world.tif", 360, 180, [-180.0, 1.0, 0.0, 90.0, 0.0, -1.0]);
        let window = mercator_clamp_window(&src, src.spatial_ref(), Some(&SpatialReference::web_mercator())).expect("window");
        assert_relative_eq!(window.min_y(), 90.0 - MERCATOR_MAX_LATITUDE, epsilon = 1e-9);
        assert_relative_eq!(window.max_y(), 90.0 + MERCATOR_MAX_LATITUDE, epsilon = 1e-9);
        assert_eq!(window.width(), 360.0);

        let small = testutils::geographic_raster("small.tif", 10, 10, [0.0, 1.0, 0.0, 50.0, 0.0, -1.0]);
        assert!(mercator_clamp_window(&small, small.spatial_ref(), Some(&SpatialReference::web_mercator())).is_none());
    }

    #[test]
    fn non_invertible_transformer_is_detected() -> Result<()> {
        let src = testutils::geographic_raster("src.tif", 10, 10, [0.0, 1.0, 0.0, 10.0, 0.0, -1.0]);
        let request = WarpRequest::builder()
            .target_srs(SpatialReference::wgs84())
            .coordinate_operation("+proj=affine +s11=0 +s22=0")
            .build();
        let wgs84 = SpatialReference::wgs84();
        let transformer = create_transformer(&src, Some(&wgs84), Some(&wgs84), &request)?;

        assert!(matches!(
            check_invertible(&transformer, RasterSize::square(10)),
            Err(Error::InverseUnsupported(_))
        ));
        Ok(())
    }
}
