//! Cutline loading and its transformation to the pixel space of each source.

use geo_types::MultiPolygon;

use crate::{
    CoordinateTransformer, DriverRegistry, Error, GeoTransform, RasterDataset, Rect, Result, SpatialReference,
    geometry,
    georef::{create_pixel_model, georef_method},
    vector::Layer,
};

use super::{CutlineSource, DensifyCutline, RuntimeConfig, WarpRequest};

/// Upper bound of densification attempts, each attempt either refines the segment length or backs off when the
/// densified polygon became invalid. Reprojections are rarely curved enough to need more than a few.
pub const MAX_DENSIFY_ITERATIONS: usize = 10;

/// Segments longer than this (in source pixels) are densified
const MAX_SEGMENT_LENGTH_PIXELS: f64 = 1.0;

/// Tolerance in pixels when snapping a cropped extent inwards to the source grid
const SNAP_EPSILON: f64 = 1e-8;

/// The cutline as loaded, in its own spatial reference
#[derive(Debug, Clone)]
pub struct Cutline {
    pub geometry: MultiPolygon<f64>,
    pub srs: Option<SpatialReference>,
}

fn collect_polygons<'a>(features: impl Iterator<Item = &'a crate::vector::Feature>) -> Result<MultiPolygon<f64>> {
    let mut polygons = Vec::new();
    for feature in features {
        let geometry = feature
            .geometry
            .clone()
            .ok_or_else(|| Error::Cutline("Cutline feature without a geometry".into()))?;
        let multi = geometry::to_multipolygon(geometry).ok_or_else(|| Error::Cutline("Cutline not of polygon type".into()))?;
        polygons.extend(multi);
    }

    if polygons.is_empty() {
        return Err(Error::Cutline("Did not get any cutline features".into()));
    }

    Ok(MultiPolygon::new(polygons))
}

fn layer_polygons(layer: &dyn Layer) -> Result<(MultiPolygon<f64>, Option<SpatialReference>)> {
    Ok((collect_polygons(layer.features().iter())?, layer.spatial_ref().cloned()))
}

/// Loads the cutline polygons, the `-cutline_srs` spatial reference overrides the one of the layer
pub fn load_cutline(registry: &dyn DriverRegistry, source: &CutlineSource, cutline_srs: Option<&SpatialReference>) -> Result<Cutline> {
    let (geometry, layer_srs) = match source {
        CutlineSource::Wkt(wkt) => (geometry::parse_wkt(wkt)?, None),
        CutlineSource::Datasource {
            path,
            layer,
            where_clause,
            sql,
        } => {
            let vector = registry.open_vector(path)?;
            if let Some(sql) = sql {
                layer_polygons(vector.execute_sql(sql)?.as_ref())?
            } else if let Some(where_clause) = where_clause {
                layer_polygons(vector.filter_layer(layer.as_deref(), where_clause)?.as_ref())?
            } else {
                let selected = match layer {
                    Some(name) => vector.layer_by_name(name),
                    None => vector.layer(0),
                }
                .ok_or_else(|| {
                    Error::Configuration(format!(
                        "Cannot find layer {} in {path}",
                        layer.as_deref().unwrap_or("(first layer)")
                    ))
                })?;
                layer_polygons(selected)?
            }
        }
    };

    Ok(Cutline {
        geometry,
        srs: cutline_srs.cloned().or(layer_srs),
    })
}

/// Coordinate transformation from the cutline SRS to the source SRS, `None` when no reprojection is needed.
///
/// A cutline in the target SRS with an explicit coordinate operation uses the inverse of that operation.
fn cutline_to_source_srs(
    cutline_srs: Option<&SpatialReference>,
    src_srs: Option<&SpatialReference>,
    dst_srs: Option<&SpatialReference>,
    coordinate_operation: Option<&str>,
) -> Result<Option<CoordinateTransformer>> {
    let (Some(cutline_srs), Some(src_srs)) = (cutline_srs, src_srs) else {
        if cutline_srs.is_some() {
            log::debug!("Source has no spatial reference, cutline used as is");
        }
        return Ok(None);
    };

    if let (Some(dst_srs), Some(operation)) = (dst_srs, coordinate_operation) {
        if cutline_srs.is_same(dst_srs) {
            return Ok(Some(CoordinateTransformer::with_operation(src_srs, dst_srs, operation)?.inverse()?));
        }
    }

    if cutline_srs.is_same(src_srs) {
        return Ok(None);
    }

    let ct = CoordinateTransformer::new(cutline_srs, src_srs)?;
    Ok((!ct.is_identity()).then_some(ct))
}

fn invalid_cutline(reason: &str, config: &RuntimeConfig) -> Result {
    if config.ignore_bad_cutline {
        log::warn!("Cutline is not valid after transformation, continuing: {reason}");
        Ok(())
    } else {
        Err(Error::Cutline(format!("Cutline is not valid after transformation: {reason}")))
    }
}

/// Transforms the cutline to the pixel/line space of a source raster.
///
/// Returns `None` when the cutline contains the whole source footprint (grown by the blend distance), applying it would
/// not exclude any pixel.
pub fn cutline_to_source_pixels(
    cutline: &Cutline,
    src: &dyn RasterDataset,
    src_srs: Option<&SpatialReference>,
    request: &WarpRequest,
    config: &RuntimeConfig,
) -> Result<Option<MultiPolygon<f64>>> {
    let geometry = geometry::remove_zero_width_slivers(&cutline.geometry);
    let reproject = cutline_to_source_srs(
        cutline.srs.as_ref(),
        src_srs,
        request.target_srs.as_ref(),
        request.coordinate_operation.as_deref(),
    )?;

    let options = &request.transformer_options;
    let model = create_pixel_model(src, georef_method(src, options)?, options)?;

    let to_pixels = |geom: &MultiPolygon<f64>| {
        geometry::transform_multipolygon(geom, |x, y, z| {
            let mut success = match &reproject {
                Some(ct) => ct.transform_coords(x, y, z),
                None => vec![true; x.len()],
            };
            for (ok, pixel_ok) in success.iter_mut().zip(model.georef_to_pixel(x, y, z)) {
                *ok = *ok && pixel_ok;
            }
            Ok(success)
        })
    };

    let transformed = to_pixels(&geometry).map_err(|e| Error::Cutline(format!("Cannot transform cutline to source pixel space: {e}")))?;
    let was_valid = geometry::is_valid(&transformed);

    let densify = match config.densify_cutline {
        DensifyCutline::Yes => true,
        DensifyCutline::No => false,
        DensifyCutline::OnlyIfInvalid => !was_valid,
    };

    let pixels = if densify {
        densify_in_pixel_space(&geometry, transformed, was_valid, config, to_pixels)
    } else {
        transformed
    };

    match geometry::validate(&pixels) {
        Ok(()) => {
            let size = src.raster_size();
            let footprint =
                Rect::from_bounds(0.0, 0.0, size.cols as f64, size.rows as f64).buffered(request.cutline_blend_distance.unwrap_or(0.0));
            if geometry::contains_rect(&pixels, &footprint) {
                log::debug!("Cutline contains the footprint of {}, not applied", src.description());
                return Ok(None);
            }
        }
        Err(reason) => invalid_cutline(&reason, config)?,
    }

    Ok(Some(pixels))
}

/// Re-segments the original geometry until no transformed segment is longer than a pixel.
///
/// When densification makes a valid polygon invalid the segment length is doubled, when the iteration limit is reached
/// the best densified polygon so far (or the undensified one) is kept.
fn densify_in_pixel_space(
    geometry: &MultiPolygon<f64>,
    transformed: MultiPolygon<f64>,
    was_valid: bool,
    config: &RuntimeConfig,
    to_pixels: impl Fn(&MultiPolygon<f64>) -> Result<MultiPolygon<f64>>,
) -> MultiPolygon<f64> {
    let initial_length = geometry::max_segment_length(&transformed);
    if initial_length <= MAX_SEGMENT_LENGTH_PIXELS {
        return transformed;
    }

    let mut segment_length = geometry::max_segment_length(geometry) / initial_length * MAX_SEGMENT_LENGTH_PIXELS;
    let mut best = None;

    for _ in 0..MAX_DENSIFY_ITERATIONS {
        let candidate = match to_pixels(&geometry::segmentize(geometry, segment_length)) {
            Ok(candidate) => candidate,
            Err(err) => {
                log::warn!("Failed to densify the cutline, using the cutline as transformed: {err}");
                return best.unwrap_or(transformed);
            }
        };

        if was_valid && !geometry::is_valid(&candidate) {
            segment_length *= 2.0;
            continue;
        }

        let pixel_length = geometry::max_segment_length(&candidate);
        best = Some(candidate);
        if pixel_length <= MAX_SEGMENT_LENGTH_PIXELS * (1.0 + SNAP_EPSILON) {
            return best.unwrap_or(transformed);
        }

        segment_length *= MAX_SEGMENT_LENGTH_PIXELS / pixel_length;
    }

    config.log_non_convergence("Cutline densification");
    best.unwrap_or(transformed)
}

/// Bounding box of the cutline in the target spatial reference
pub fn cutline_extent(cutline: &Cutline, dst_srs: Option<&SpatialReference>) -> Result<Rect<f64>> {
    let geometry = match (&cutline.srs, dst_srs) {
        (Some(cutline_srs), Some(dst_srs)) if !cutline_srs.is_same(dst_srs) => {
            let ct = CoordinateTransformer::new(cutline_srs, dst_srs)?;
            geometry::transform_multipolygon(&cutline.geometry, |x, y, z| Ok(ct.transform_coords(x, y, z)))?
        }
        _ => cutline.geometry.clone(),
    };

    geometry::bounding_rect(&geometry).ok_or_else(|| Error::Cutline("Empty cutline geometry".into()))
}

/// Aligns a cropped extent on the pixel boundaries of the source grid.
///
/// `all_touched` rounds outwards so every touched pixel is kept, otherwise rounds inwards (within a small tolerance)
/// so only pixels inside the extent are kept.
pub fn snap_to_source_grid(extent: &Rect<f64>, src_gt: &GeoTransform, all_touched: bool) -> Rect<f64> {
    let (origin, res_x, res_y) = (src_gt.top_left(), src_gt.cell_size_x(), src_gt.cell_size_y().abs());
    let to_col = |x: f64| (x - origin.x()) / res_x;
    let to_row = |y: f64| (origin.y() - y) / res_y;

    let (left, right) = (to_col(extent.min_x()), to_col(extent.max_x()));
    let (top, bottom) = (to_row(extent.max_y()), to_row(extent.min_y()));

    let (mut left_px, mut right_px, mut top_px, mut bottom_px) = if all_touched {
        (left.floor(), right.ceil(), top.floor(), bottom.ceil())
    } else {
        (
            (left - SNAP_EPSILON).ceil(),
            (right + SNAP_EPSILON).floor(),
            (top - SNAP_EPSILON).ceil(),
            (bottom + SNAP_EPSILON).floor(),
        )
    };

    if right_px <= left_px {
        (left_px, right_px) = (left.floor(), right.ceil());
    }
    if bottom_px <= top_px {
        (top_px, bottom_px) = (top.floor(), bottom.ceil());
    }

    Rect::from_bounds(
        origin.x() + left_px * res_x,
        origin.y() - bottom_px * res_y,
        origin.x() + right_px * res_x,
        origin.y() - top_px * res_y,
    )
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        mem::{MemLayer, MemRegistry, MemVectorSource},
        testutils,
        vector::FieldValue,
    };

    fn config() -> RuntimeConfig {
        RuntimeConfig::default()
    }

    #[test]
    fn load_from_wkt() -> Result<()> {
        let registry = MemRegistry::new();
        let cutline = load_cutline(
            &registry,
            &CutlineSource::Wkt("POLYGON((0 0,10 0,10 10,0 10,0 0))".into()),
            Some(&SpatialReference::wgs84()),
        )?;
        assert_eq!(cutline.geometry.0.len(), 1);
        assert_eq!(cutline.srs.and_then(|srs| srs.epsg()), Some(4326));

        assert!(matches!(
            load_cutline(&registry, &CutlineSource::Wkt("POINT(1 2)".into()), None),
            Err(Error::Cutline(_))
        ));
        Ok(())
    }

    fn cutline_registry() -> Result<MemRegistry> {
        let mut layer = MemLayer::new("zones", Some(SpatialReference::web_mercator()));
        layer.add_wkt("POLYGON((0 0,10 0,10 10,0 10,0 0))", vec![("id".into(), FieldValue::Integer(1))])?;
        layer.add_wkt("POLYGON((20 0,30 0,30 10,20 10,20 0))", vec![("id".into(), FieldValue::Integer(2))])?;

        let mut lines = MemLayer::new("lines", None);
        lines.add_wkt("LINESTRING(0 0,1 1)", Vec::new())?;

        let mut source = MemVectorSource::new("zones.json");
        source.add_layer(layer);
        source.add_layer(lines);

        let mut registry = MemRegistry::new();
        registry.register_vector("zones.json", source);
        Ok(registry)
    }

    fn datasource(layer: Option<&str>, where_clause: Option<&str>, sql: Option<&str>) -> CutlineSource {
        CutlineSource::Datasource {
            path: "zones.json".into(),
            layer: layer.map(str::to_string),
            where_clause: where_clause.map(str::to_string),
            sql: sql.map(str::to_string),
        }
    }

    #[test_log::test]
    fn load_from_datasource() -> Result<()> {
        let registry = cutline_registry()?;

        let all = load_cutline(&registry, &datasource(None, None, None), None)?;
        assert_eq!(all.geometry.0.len(), 2);
        assert_eq!(all.srs.and_then(|srs| srs.epsg()), Some(3857));

        let filtered = load_cutline(&registry, &datasource(Some("zones"), Some("id = 2"), None), None)?;
        assert_eq!(filtered.geometry.0.len(), 1);
        assert_eq!(geometry::bounding_rect(&filtered.geometry).map(|r| r.min_x()), Some(20.0));

        let queried = load_cutline(&registry, &datasource(None, None, Some("SELECT * FROM zones WHERE id = 1")), None)?;
        assert_eq!(queried.geometry.0.len(), 1);

        assert!(matches!(
            load_cutline(&registry, &datasource(Some("missing"), None, None), None),
            Err(Error::Configuration(_))
        ));
        assert!(matches!(
            load_cutline(&registry, &datasource(Some("lines"), None, None), None),
            Err(Error::Cutline(_))
        ));
        assert!(matches!(
            load_cutline(&registry, &datasource(Some("zones"), Some("id = 3"), None), None),
            Err(Error::Cutline(_))
        ));
        Ok(())
    }

    #[test]
    fn to_pixel_space_of_projected_source() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 100, 100, [1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]);
        let cutline = Cutline {
            geometry: geometry::parse_wkt("POLYGON((1100 4000,1500 4000,1500 4800,1100 4800,1100 4000))")?,
            srs: src.spatial_ref().cloned(),
        };
        let request = WarpRequest::builder().build();

        let pixels = cutline_to_source_pixels(&cutline, &src, src.spatial_ref(), &request, &config())?.expect("cutline applied");
        let bounds = geometry::bounding_rect(&pixels).expect("bounds");
        assert_relative_eq!(bounds.min_x(), 10.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.max_x(), 50.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.min_y(), 20.0, epsilon = 1e-9);
        assert_relative_eq!(bounds.max_y(), 100.0, epsilon = 1e-9);
        assert!(geometry::max_segment_length(&pixels) <= 1.0 + 1e-6);
        Ok(())
    }

    #[test]
    fn densification_can_be_disabled() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 100, 100, [1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]);
        let cutline = Cutline {
            geometry: geometry::parse_wkt("POLYGON((1100 4000,1500 4000,1500 4800,1100 4800,1100 4000))")?,
            srs: None,
        };
        let config = RuntimeConfig::builder().densify_cutline(DensifyCutline::No).build();

        let pixels = cutline_to_source_pixels(&cutline, &src, src.spatial_ref(), &WarpRequest::builder().build(), &config)?
            .expect("cutline applied");
        assert_eq!(pixels.0[0].exterior().0.len(), 5);
        Ok(())
    }

    #[test]
    fn cutline_covering_the_source_is_dropped() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 100, 100, [1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]);
        let request = WarpRequest::builder().build();

        let exact = Cutline {
            geometry: geometry::parse_wkt("POLYGON((1000 4000,2000 4000,2000 5000,1000 5000,1000 4000))")?,
            srs: None,
        };
        assert!(cutline_to_source_pixels(&exact, &src, src.spatial_ref(), &request, &config())?.is_none());

        let blended = WarpRequest::builder().cutline_blend_distance(5.0).build();
        assert!(cutline_to_source_pixels(&exact, &src, src.spatial_ref(), &blended, &config())?.is_some());
        Ok(())
    }

    #[test]
    fn round_trip_through_explicit_operation() -> Result<()> {
        // cutline in the target SRS, mapped back with the inverse of -ct
        let src = testutils::geographic_raster("src.tif", 100, 100, [0.0, 0.1, 0.0, 10.0, 0.0, -0.1]);
        let operation = "+proj=affine +xoff=1000 +yoff=2000 +s11=10 +s22=10";
        let request = WarpRequest::builder()
            .target_srs(SpatialReference::web_mercator())
            .coordinate_operation(operation)
            .build();
        let cutline = Cutline {
            geometry: geometry::parse_wkt("POLYGON((1010 2010,1050 2010,1050 2060,1010 2060,1010 2010))")?,
            srs: Some(SpatialReference::web_mercator()),
        };

        let pixels = cutline_to_source_pixels(&cutline, &src, src.spatial_ref(), &request, &config())?.expect("cutline applied");
        let bounds = geometry::bounding_rect(&pixels).expect("bounds");
        assert_relative_eq!(bounds.min_x(), 10.0, epsilon = 1e-6);
        assert_relative_eq!(bounds.max_x(), 50.0, epsilon = 1e-6);
        assert_relative_eq!(bounds.min_y(), 40.0, epsilon = 1e-6);
        assert_relative_eq!(bounds.max_y(), 90.0, epsilon = 1e-6);

        // and back to the target SRS
        let forward = CoordinateTransformer::with_operation(&SpatialReference::wgs84(), &SpatialReference::web_mercator(), operation)?;
        let gt = src.geo_transform().expect("geotransform");
        let round_trip = geometry::transform_multipolygon(&pixels, |x, y, z| {
            for (px, py) in x.iter_mut().zip(y.iter_mut()) {
                let georef = gt.apply(*px, *py);
                (*px, *py) = (georef.x(), georef.y());
            }
            Ok(forward.transform_coords(x, y, z))
        })?;
        let bounds = geometry::bounding_rect(&round_trip).expect("bounds");
        assert_relative_eq!(bounds.min_x(), 1010.0, epsilon = 1e-6);
        assert_relative_eq!(bounds.max_y(), 2060.0, epsilon = 1e-6);
        Ok(())
    }

    #[test]
    fn reprojected_cutline_extent() -> Result<()> {
        let cutline = Cutline {
            geometry: geometry::parse_wkt("POLYGON((0 0,1 0,1 1,0 1,0 0))")?,
            srs: Some(SpatialReference::wgs84()),
        };
        let extent = cutline_extent(&cutline, Some(&SpatialReference::web_mercator()))?;
        assert_relative_eq!(extent.min_x(), 0.0, epsilon = 1e-6);
        assert_relative_eq!(extent.max_x(), 111319.49079327357, epsilon = 1e-3);

        let same = cutline_extent(&cutline, None)?;
        assert_eq!(same.max_x(), 1.0);
        Ok(())
    }

    #[test]
    fn snapping_to_source_pixels() {
        let gt = GeoTransform::north_up(0.0, 100.0, 10.0, 10.0);
        let extent = Rect::from_bounds(12.0, 31.0, 57.0, 88.0);

        let inward = snap_to_source_grid(&extent, &gt, false);
        assert_eq!(inward, Rect::from_bounds(20.0, 40.0, 50.0, 80.0));

        let outward = snap_to_source_grid(&extent, &gt, true);
        assert_eq!(outward, Rect::from_bounds(10.0, 30.0, 60.0, 90.0));

        let aligned = Rect::from_bounds(10.0, 30.0, 60.0, 90.0);
        assert_eq!(snap_to_source_grid(&aligned, &gt, false), aligned);
    }

    #[test]
    fn invalid_cutline_fails_unless_ignored() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 100, 100, [1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]);
        let cutline = Cutline {
            geometry: geometry::parse_wkt("POLYGON((1100 4000,1500 4800,1500 4000,1100 4800,1100 4000))")?,
            srs: None,
        };
        let request = WarpRequest::builder().build();

        assert!(matches!(
            cutline_to_source_pixels(&cutline, &src, src.spatial_ref(), &request, &config()),
            Err(Error::Cutline(_))
        ));

        let lenient = RuntimeConfig::builder().ignore_bad_cutline(true).build();
        assert!(cutline_to_source_pixels(&cutline, &src, src.spatial_ref(), &request, &lenient)?.is_some());
        Ok(())
    }
}
