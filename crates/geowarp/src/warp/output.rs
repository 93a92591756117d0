//! Output grid resolution and creation of the destination dataset.

use crate::{
    CoordinateTransformer, DataType, Driver, Error, GeoTransform, NameValueList, RasterBand, RasterDataset, RasterSize, Rect, Result,
    SpatialReference,
    dataset::{ColorInterpretation, alpha_band},
    suggest::{suggested_warp_output, warp_bounding_box},
    transformer::{Direction, Transformer},
};

use super::{
    AlphaPolicy, RuntimeConfig, WarpRequest,
    cutline::{Cutline, cutline_extent, snap_to_source_grid},
    transform::{create_transformer, mercator_clamp_window, source_srs},
    vshift::must_apply_vertical_shift,
};

/// Each iteration trims at most one pixel per edge, rounding of the suggested extent leaves at most one blank pixel per edge.
pub const MAX_BLANK_BORDER_ITERATIONS: usize = 10;

/// Everything derived from the request and the sources that describes the destination.
/// The request itself is never modified.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedPlan {
    pub geo_transform: GeoTransform,
    pub size: RasterSize,
    pub extent: Rect<f64>,
    pub srs: Option<SpatialReference>,
    pub data_type: DataType,
    pub band_count: usize,
    pub dst_alpha_band: Option<usize>,
    /// Creation options including the defaults added for the output format
    pub creation_options: NameValueList,
}

impl ResolvedPlan {
    /// Plan describing an existing destination (update mode)
    pub fn from_existing(dst: &dyn RasterDataset, request: &WarpRequest) -> Result<Self> {
        let geo_transform = dst
            .geo_transform()
            .ok_or_else(|| Error::Configuration(format!("Destination {} has no geotransform", dst.description())))?;
        let size = dst.raster_size();
        let band_count = dst.band_count();
        if band_count == 0 {
            return Err(Error::Configuration(format!("Destination {} has no bands", dst.description())));
        }

        let dst_alpha_band = if request.dst_alpha { Some(band_count) } else { alpha_band(dst) };

        Ok(ResolvedPlan {
            geo_transform,
            size,
            extent: geo_transform.bounds(size),
            srs: dst.spatial_ref().cloned(),
            data_type: dst.band(1)?.data_type(),
            band_count,
            dst_alpha_band,
            creation_options: NameValueList::new(),
        })
    }

    /// Bands receiving warped values (the alpha band excluded)
    pub fn data_band_count(&self) -> usize {
        self.band_count - usize::from(self.dst_alpha_band.is_some())
    }
}

/// Alpha band of a source according to the `-srcalpha`/`-nosrcalpha` policy.
/// Automatic detection only happens when no explicit band selection was made.
pub fn source_alpha_band(src: &dyn RasterDataset, request: &WarpRequest) -> Option<usize> {
    match request.src_alpha {
        AlphaPolicy::Force => (src.band_count() > 0).then_some(src.band_count()),
        AlphaPolicy::Disable => None,
        AlphaPolicy::Auto if request.src_bands.is_empty() => alpha_band(src),
        AlphaPolicy::Auto => None,
    }
}

/// Source bands that are warped, one based
pub fn warped_source_bands(src: &dyn RasterDataset, request: &WarpRequest) -> Vec<usize> {
    if !request.src_bands.is_empty() {
        return request.src_bands.clone();
    }

    let alpha = source_alpha_band(src, request);
    (1..=src.band_count()).filter(|band| Some(*band) != alpha).collect()
}

/// Spatial reference of the destination: `-t_srs` or the spatial reference of the first source
pub fn target_srs(sources: &[&dyn RasterDataset], request: &WarpRequest) -> Result<Option<SpatialReference>> {
    if let Some(srs) = &request.target_srs {
        return Ok(Some(srs.clone()));
    }

    match sources.first() {
        Some(first) => source_srs(*first, request),
        None => Ok(None),
    }
}

/// Working extent and resolution derived from the suggested output of every source
struct SuggestedGrid {
    extent: Rect<f64>,
    resolution: f64,
}

fn suggested_grid(sources: &[&dyn RasterDataset], dst_srs: Option<&SpatialReference>, request: &WarpRequest) -> Result<SuggestedGrid> {
    let mut grid: Option<SuggestedGrid> = None;

    for src in sources {
        let src_srs = source_srs(*src, request)?;
        let transformer = create_transformer(*src, src_srs.as_ref(), dst_srs, request)?;
        let window = mercator_clamp_window(*src, src_srs.as_ref(), dst_srs);
        let suggested = suggested_warp_output(&transformer, src.raster_size(), window)
            .map_err(|e| Error::Transform(format!("Cannot compute the output bounds of {}: {e}", src.description())))?;

        grid = Some(match grid {
            None => SuggestedGrid {
                extent: suggested.extent,
                resolution: suggested.resolution(),
            },
            Some(grid) => SuggestedGrid {
                extent: grid.extent.union(&suggested.extent),
                resolution: grid.resolution.min(suggested.resolution()),
            },
        });
    }

    grid.ok_or_else(|| Error::Usage("No source dataset specified".into()))
}

/// Number of pixels covering `span`, rounded to the nearest integer
fn pixel_count(span: f64, resolution: f64) -> f64 {
    (span / resolution + 0.5).floor()
}

fn checked_size(cols: f64, rows: f64) -> Result<RasterSize> {
    if !(cols.is_finite() && rows.is_finite()) || cols > i32::MAX as f64 || rows > i32::MAX as f64 {
        return Err(Error::Runtime(format!("Attempt to create {cols}x{rows} dataset is above authorized limits")));
    }

    if cols < 1.0 || rows < 1.0 {
        return Err(Error::Runtime(format!("Computed output size is empty ({cols}x{rows})")));
    }

    Ok(RasterSize::with_rows_cols(rows as usize, cols as usize))
}

/// Extent of an axis aligned source when the cutline crop can be snapped on its pixel grid:
/// a single source, no reprojection and no explicit resolution.
fn snapped_crop(
    sources: &[&dyn RasterDataset],
    request: &WarpRequest,
    dst_srs: Option<&SpatialReference>,
    extent: &Rect<f64>,
) -> Result<Option<(Rect<f64>, (f64, f64))>> {
    let [src] = sources else {
        return Ok(None);
    };

    if request.target_resolution.is_some() || request.coordinate_operation.is_some() {
        return Ok(None);
    }

    let Some(gt) = src.geo_transform().filter(|gt| gt.is_axis_aligned()) else {
        return Ok(None);
    };

    let src_srs = source_srs(*src, request)?;
    let reprojected = match (src_srs.as_ref(), dst_srs) {
        (Some(s), Some(d)) => !s.is_same(d),
        _ => false,
    };
    if reprojected {
        return Ok(None);
    }

    let all_touched = request.warp_options.get_bool("CUTLINE_ALL_TOUCHED", false);
    Ok(Some((snap_to_source_grid(extent, &gt, all_touched), (gt.cell_size_x(), gt.cell_size_y().abs()))))
}

/// Computes the destination grid, data type and band layout.
///
/// Explicit `-te`, `-tr` and `-ts` values take precedence, missing values are derived from the union of the suggested
/// outputs of all sources (finest resolution).
pub fn resolve_output(
    sources: &[&dyn RasterDataset],
    request: &WarpRequest,
    cutline: Option<&Cutline>,
    driver: &dyn Driver,
    config: &RuntimeConfig,
) -> Result<ResolvedPlan> {
    let first = *sources.first().ok_or_else(|| Error::Usage("No source dataset specified".into()))?;
    let dst_srs = target_srs(sources, request)?;

    let explicit_grid = request.target_extent.is_some() && (request.target_resolution.is_some() || request.target_size.is_some());
    let suggested = if explicit_grid {
        None
    } else {
        Some(suggested_grid(sources, dst_srs.as_ref(), request)?)
    };

    let mut resolution = request.target_resolution;
    let mut extent_is_explicit = true;
    let extent = if let Some(extent) = &request.target_extent {
        match (&request.target_extent_srs, &dst_srs) {
            (Some(te_srs), Some(dst)) if !te_srs.is_same(dst) => warp_bounding_box(extent, &CoordinateTransformer::new(te_srs, dst)?)?,
            _ => *extent,
        }
    } else if let (true, Some(cutline)) = (request.crop_to_cutline, cutline) {
        let extent = cutline_extent(cutline, dst_srs.as_ref())?;
        match snapped_crop(sources, request, dst_srs.as_ref(), &extent)? {
            Some((snapped, source_resolution)) => {
                resolution = Some(source_resolution);
                snapped
            }
            None => extent,
        }
    } else {
        extent_is_explicit = false;
        suggested
            .as_ref()
            .map(|grid| grid.extent)
            .ok_or_else(|| Error::Runtime("No output extent".into()))?
    };

    let working_resolution = suggested.as_ref().map(|grid| grid.resolution);
    let (mut extent, size) = match (resolution, request.target_size) {
        (_, Some((cols, rows))) => {
            let (cols, rows) = match (cols, rows) {
                (0, rows) => (pixel_count(extent.width(), extent.height() / rows as f64), rows as f64),
                (cols, 0) => (cols as f64, pixel_count(extent.height(), extent.width() / cols as f64)),
                (cols, rows) => (cols as f64, rows as f64),
            };
            (extent, checked_size(cols, rows)?)
        }
        (Some((res_x, res_y)), None) => {
            let extent = if request.target_aligned_pixels {
                Rect::from_bounds(
                    (extent.min_x() / res_x).floor() * res_x,
                    (extent.min_y() / res_y).floor() * res_y,
                    (extent.max_x() / res_x).ceil() * res_x,
                    (extent.max_y() / res_y).ceil() * res_y,
                )
            } else {
                extent
            };

            let size = checked_size(pixel_count(extent.width(), res_x), pixel_count(extent.height(), res_y))?;
            let extent = Rect::from_bounds(
                extent.min_x(),
                extent.max_y() - size.rows as f64 * res_y,
                extent.min_x() + size.cols as f64 * res_x,
                extent.max_y(),
            );
            (extent, size)
        }
        (None, None) => {
            let resolution = working_resolution.ok_or_else(|| Error::Runtime("No output resolution".into()))?;
            let size = checked_size(pixel_count(extent.width(), resolution), pixel_count(extent.height(), resolution))?;
            if extent_is_explicit {
                // keep the requested extent, adapt the resolution
                (extent, size)
            } else {
                let extent = Rect::from_bounds(
                    extent.min_x(),
                    extent.max_y() - size.rows as f64 * resolution,
                    extent.min_x() + size.cols as f64 * resolution,
                    extent.max_y(),
                );
                (extent, size)
            }
        }
    };

    let mut size = size;
    let shrink_borders = sources.len() == 1
        && request.target_extent.is_none()
        && request.target_size.is_none()
        && !request.target_aligned_pixels
        && !request.crop_to_cutline;
    if shrink_borders {
        (extent, size) = trim_blank_borders(first, request, dst_srs.as_ref(), extent, size, config)?;
    }

    let geo_transform = GeoTransform::north_up(
        extent.min_x(),
        extent.max_y(),
        extent.width() / size.cols as f64,
        extent.height() / size.rows as f64,
    );

    let data_type = match request.output_type {
        Some(data_type) => data_type,
        None => first
            .band(1)
            .map_err(|_| Error::Configuration(format!("Input file {} has no raster bands", first.description())))?
            .data_type(),
    };

    let data_bands = if request.dst_bands.is_empty() {
        warped_source_bands(first, request).len()
    } else {
        request.dst_bands.iter().copied().max().unwrap_or(0)
    };
    let band_count = data_bands + usize::from(request.dst_alpha);
    let dst_alpha_band = request.dst_alpha.then_some(band_count);

    let mut creation_options = request.creation_options.clone();
    if driver.supports_creation_option("PHOTOMETRIC") && !creation_options.contains("PHOTOMETRIC") && is_rgb(first, request)? {
        log::debug!("Setting PHOTOMETRIC=RGB for the RGB source bands");
        creation_options.set("PHOTOMETRIC", "RGB");
    }

    Ok(ResolvedPlan {
        geo_transform,
        size,
        extent,
        srs: dst_srs,
        data_type,
        band_count,
        dst_alpha_band,
        creation_options,
    })
}

/// True when the first three warped bands are red, green and blue
fn is_rgb(src: &dyn RasterDataset, request: &WarpRequest) -> Result<bool> {
    let bands = warped_source_bands(src, request);
    if bands.len() < 3 {
        return Ok(false);
    }

    let expected = [ColorInterpretation::Red, ColorInterpretation::Green, ColorInterpretation::Blue];
    for (band, interp) in bands.iter().zip(expected) {
        if src.band(*band)?.color_interpretation() != interp {
            return Ok(false);
        }
    }
    Ok(true)
}

#[derive(Debug, Clone, Copy)]
enum Edge {
    Top,
    Bottom,
    Left,
    Right,
}

/// Shrinks the output while an outer row or column of the destination does not map into the source
fn trim_blank_borders(
    src: &dyn RasterDataset,
    request: &WarpRequest,
    dst_srs: Option<&SpatialReference>,
    mut extent: Rect<f64>,
    mut size: RasterSize,
    config: &RuntimeConfig,
) -> Result<(Rect<f64>, RasterSize)> {
    let src_srs = source_srs(src, request)?;
    let mut transformer = create_transformer(src, src_srs.as_ref(), dst_srs, request)?;
    let (res_x, res_y) = (extent.width() / size.cols as f64, extent.height() / size.rows as f64);
    let src_size = src.raster_size();

    for _ in 0..MAX_BLANK_BORDER_ITERATIONS {
        transformer.set_dst_geo_transform(GeoTransform::north_up(extent.min_x(), extent.max_y(), res_x, res_y))?;

        let mut changed = false;
        for edge in [Edge::Top, Edge::Bottom, Edge::Left, Edge::Right] {
            let too_small = match edge {
                Edge::Top | Edge::Bottom => size.rows <= 1,
                Edge::Left | Edge::Right => size.cols <= 1,
            };
            if too_small || !is_blank_edge(&transformer, edge, size, src_size)? {
                continue;
            }

            log::debug!("Removing blank {edge:?} border of the output");
            changed = true;
            match edge {
                Edge::Top => {
                    extent = Rect::from_bounds(extent.min_x(), extent.min_y(), extent.max_x(), extent.max_y() - res_y);
                    size.rows -= 1;
                }
                Edge::Bottom => {
                    extent = Rect::from_bounds(extent.min_x(), extent.min_y() + res_y, extent.max_x(), extent.max_y());
                    size.rows -= 1;
                }
                Edge::Left => {
                    extent = Rect::from_bounds(extent.min_x() + res_x, extent.min_y(), extent.max_x(), extent.max_y());
                    size.cols -= 1;
                }
                Edge::Right => {
                    extent = Rect::from_bounds(extent.min_x(), extent.min_y(), extent.max_x() - res_x, extent.max_y());
                    size.cols -= 1;
                }
            }
            // the other edges are tested against the updated geotransform
            break;
        }

        if !changed {
            return Ok((extent, size));
        }
    }

    config.log_non_convergence("Blank border detection");
    Ok((extent, size))
}

/// True when no pixel center of the outer row/column maps inside the source raster
fn is_blank_edge(transformer: &dyn Transformer, edge: Edge, size: RasterSize, src_size: RasterSize) -> Result<bool> {
    let (mut x, mut y): (Vec<f64>, Vec<f64>) = match edge {
        Edge::Top => (0..size.cols).map(|col| (col as f64 + 0.5, 0.5)).unzip(),
        Edge::Bottom => (0..size.cols).map(|col| (col as f64 + 0.5, size.rows as f64 - 0.5)).unzip(),
        Edge::Left => (0..size.rows).map(|row| (0.5, row as f64 + 0.5)).unzip(),
        Edge::Right => (0..size.rows).map(|row| (size.cols as f64 - 0.5, row as f64 + 0.5)).unzip(),
    };
    let mut z = vec![0.0; x.len()];

    let success = transformer.transform(Direction::DstToSrc, &mut x, &mut y, &mut z)?;
    let inside = |i: usize| success[i] && x[i] >= 0.0 && y[i] >= 0.0 && x[i] <= src_size.cols as f64 && y[i] <= src_size.rows as f64;
    Ok(!(0..x.len()).any(inside))
}

/// Metadata of all lists, items with differing values get the conflict value
fn merge_metadata<'a>(lists: impl Iterator<Item = &'a NameValueList>, conflict_value: &str) -> NameValueList {
    let mut merged = NameValueList::new();
    for list in lists {
        for (key, value) in list.iter() {
            match merged.get(key) {
                None => merged.set(key, value),
                Some(existing) if existing != value => merged.set(key, conflict_value),
                Some(_) => {}
            }
        }
    }
    merged
}

/// Copies band properties of the first source: description, unit, color interpretation, color table and attribute table.
/// Categorical tables are only kept when the resampling preserves the source values.
/// The unit is not copied when the values are converted by a vertical shift.
fn copy_band_properties(src_band: &dyn RasterBand, dst_band: &mut dyn RasterBand, request: &WarpRequest, copy_unit: bool) -> Result {
    if !src_band.description().is_empty() {
        dst_band.set_description(src_band.description())?;
    }
    if copy_unit && !src_band.unit_type().is_empty() {
        dst_band.set_unit_type(src_band.unit_type())?;
    }

    let interp = src_band.color_interpretation();
    if interp != ColorInterpretation::Alpha {
        dst_band.set_color_interpretation(interp)?;
    }

    let categorical = request.resample.preserves_categories();
    if let Some(table) = src_band.color_table() {
        if categorical {
            dst_band.set_color_table(Some(table.clone()))?;
        } else {
            log::warn!("Color table not copied to the output, resampling with {} would corrupt it", request.resample);
        }
    }

    if let Some(rat) = src_band.attribute_table() {
        if !rat.is_thematic() || categorical {
            dst_band.set_attribute_table(Some(rat.clone()))?;
        } else {
            log::warn!("Thematic attribute table not copied to the output, resampling with {} would corrupt it", request.resample);
        }
    }

    Ok(())
}

/// Creates the destination dataset described by the plan and initializes its metadata from the sources
pub fn create_output(
    driver: &dyn Driver,
    path: &str,
    plan: &ResolvedPlan,
    sources: &[&dyn RasterDataset],
    request: &WarpRequest,
) -> Result<Box<dyn RasterDataset>> {
    log::info!(
        "Creating output {path} of {} with {} band(s) of type {} ({})",
        plan.size,
        plan.band_count,
        plan.data_type,
        driver.name()
    );

    let mut dst = driver.create(path, plan.size, plan.band_count, plan.data_type, &plan.creation_options)?;
    dst.set_geo_transform(plan.geo_transform)?;
    dst.set_spatial_ref(plan.srs.clone())?;

    let first = *sources.first().ok_or_else(|| Error::Usage("No source dataset specified".into()))?;
    let dst_bands: Vec<usize> = if request.dst_bands.is_empty() {
        (1..=plan.data_band_count()).collect()
    } else {
        request.dst_bands.clone()
    };

    let src_bands = warped_source_bands(first, request);
    let vertical_shift = must_apply_vertical_shift(
        request.vertical_shift,
        source_srs(first, request)?.as_ref(),
        plan.srs.as_ref(),
        src_bands.len(),
    );
    for (src_band, dst_band) in src_bands.into_iter().zip(dst_bands) {
        copy_band_properties(first.band(src_band)?, dst.band_mut(dst_band)?, request, !vertical_shift)?;
    }

    if let Some(alpha) = plan.dst_alpha_band {
        dst.band_mut(alpha)?.set_color_interpretation(ColorInterpretation::Alpha)?;
    }

    if request.copy_metadata {
        let metadata = merge_metadata(sources.iter().map(|src| src.metadata()), &request.metadata_conflict_value);
        for (key, value) in metadata.iter() {
            dst.set_metadata_item(key, value)?;
        }
    }

    Ok(dst)
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        dataset::{ColorEntry, ColorTable, RasterAttributeTable, RatTableType},
        mem::{MemDataset, MemDriver},
        testutils,
        warp::ResampleAlg,
    };

    fn mem_driver() -> MemDriver {
        MemDriver::new("MEM")
    }

    fn resolve(sources: &[&dyn RasterDataset], request: &WarpRequest) -> Result<ResolvedPlan> {
        resolve_output(sources, request, None, &mem_driver(), &RuntimeConfig::default())
    }

    #[test]
    fn identity_warp_keeps_the_source_grid() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 50, 40, [1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]);
        let plan = resolve(&[&src], &WarpRequest::builder().build())?;

        assert_eq!(plan.size, RasterSize::with_rows_cols(40, 50));
        assert_relative_eq!(plan.geo_transform, GeoTransform::new([1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]), epsilon = 1e-6);
        assert_eq!(plan.band_count, 1);
        assert_eq!(plan.data_type, DataType::Byte);
        Ok(())
    }

    #[test]
    fn extent_computation_is_deterministic() -> Result<()> {
        let src = testutils::geographic_raster("src.tif", 100, 100, [4.0, 0.01, 0.0, 51.0, 0.0, -0.01]);
        let request = WarpRequest::builder().target_srs(SpatialReference::web_mercator()).build();

        let first = resolve(&[&src], &request)?;
        let second = resolve(&[&src], &request)?;
        assert_eq!(first.geo_transform, second.geo_transform);
        assert_eq!(first.size, second.size);
        Ok(())
    }

    #[test]
    fn geographic_to_web_mercator() -> Result<()> {
        let src = testutils::geographic_raster("src.tif", 100, 100, [4.0, 0.01, 0.0, 51.0, 0.0, -0.01]);
        let plan = resolve(&[&src], &WarpRequest::builder().target_srs(SpatialReference::web_mercator()).build())?;

        assert!(plan.size.cols > 0 && plan.size.rows > 0);
        assert!(plan.size.cols < i32::MAX as usize && plan.size.rows < i32::MAX as usize);
        // one degree of longitude is ~111 km, one degree of latitude ~175 km at this latitude
        assert!((65..=85).contains(&plan.size.cols));
        assert!((105..=130).contains(&plan.size.rows));
        assert_eq!(plan.srs.as_ref().and_then(|srs| srs.epsg()), Some(3857));
        assert_relative_eq!(plan.geo_transform.cell_size_x(), -plan.geo_transform.cell_size_y(), epsilon = 1e-9);
        Ok(())
    }

    #[test_log::test]
    fn blank_borders_are_trimmed() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 20, 20, [1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]);
        // two blank rows on top, one blank column on the right
        let extent = Rect::from_bounds(1000.0, 4800.0, 1210.0, 5020.0);
        let size = RasterSize::with_rows_cols(22, 21);

        let request = WarpRequest::builder().build();
        let (extent, size) = trim_blank_borders(&src, &request, src.spatial_ref(), extent, size, &RuntimeConfig::default())?;
        assert_eq!(size, RasterSize::with_rows_cols(20, 20));
        assert_relative_eq!(extent, Rect::from_bounds(1000.0, 4800.0, 1200.0, 5000.0), epsilon = 1e-9);
        Ok(())
    }

    #[test_log::test]
    fn blank_border_trimming_stops_at_the_iteration_cap() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 20, 20, [1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]);
        let blank_rows = MAX_BLANK_BORDER_ITERATIONS + 5;
        let extent = Rect::from_bounds(1000.0, 4800.0, 1200.0, 5000.0 + 10.0 * blank_rows as f64);
        let size = RasterSize::with_rows_cols(20 + blank_rows, 20);

        let request = WarpRequest::builder().build();
        let (extent, size) = trim_blank_borders(&src, &request, src.spatial_ref(), extent, size, &RuntimeConfig::default())?;
        assert_eq!(size, RasterSize::with_rows_cols(25, 20));
        assert_relative_eq!(extent.max_y(), 5050.0, epsilon = 1e-9);
        Ok(())
    }

    #[test]
    fn reprojected_output_has_no_blank_edges() -> Result<()> {
        let src = testutils::geographic_raster("src.tif", 100, 100, [4.0, 0.01, 0.0, 51.0, 0.0, -0.01]);
        let request = WarpRequest::builder().target_srs(SpatialReference::web_mercator()).build();
        let plan = resolve(&[&src], &request)?;

        let mut transformer = create_transformer(&src, src.spatial_ref(), plan.srs.as_ref(), &request)?;
        transformer.set_dst_geo_transform(plan.geo_transform)?;
        for edge in [Edge::Top, Edge::Bottom, Edge::Left, Edge::Right] {
            assert!(!is_blank_edge(&transformer, edge, plan.size, src.raster_size())?, "{edge:?} edge is blank");
        }
        Ok(())
    }

    #[test]
    fn explicit_extent_and_resolution() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 50, 50, [1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]);
        let request = WarpRequest::builder()
            .target_extent(Rect::from_bounds(1000.0, 4600.0, 1400.0, 5000.0))
            .target_resolution((20.0, 25.0))
            .build();
        let plan = resolve(&[&src], &request)?;

        assert_eq!(plan.size, RasterSize::with_rows_cols(16, 20));
        assert_relative_eq!(plan.geo_transform, GeoTransform::new([1000.0, 20.0, 0.0, 5000.0, 0.0, -25.0]));
        Ok(())
    }

    #[test]
    fn target_size_with_square_pixels() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 50, 50, [1000.0, 10.0, 0.0, 5000.0, 0.0, -10.0]);
        let request = WarpRequest::builder()
            .target_extent(Rect::from_bounds(1000.0, 4800.0, 1400.0, 5000.0))
            .target_size((0, 10))
            .build();
        let plan = resolve(&[&src], &request)?;

        assert_eq!(plan.size, RasterSize::with_rows_cols(10, 20));
        assert_relative_eq!(plan.geo_transform.cell_size_x(), 20.0);
        Ok(())
    }

    #[test]
    fn target_aligned_pixels() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 50, 50, [1003.0, 10.0, 0.0, 4998.0, 0.0, -10.0]);
        let request = WarpRequest::builder()
            .target_resolution((20.0, 20.0))
            .target_aligned_pixels(true)
            .build();
        let plan = resolve(&[&src], &request)?;

        let extent = plan.extent;
        assert_relative_eq!(extent.min_x(), 1000.0);
        assert_relative_eq!(extent.max_x(), 1520.0);
        assert_relative_eq!(extent.max_y(), 5000.0);
        assert_relative_eq!(extent.min_y(), 4480.0);
        assert_eq!(plan.size, RasterSize::with_rows_cols(26, 26));
        Ok(())
    }

    #[test]
    fn union_of_sources_at_finest_resolution() -> Result<()> {
        let coarse = testutils::projected_raster("a.tif", 10, 10, [0.0, 20.0, 0.0, 200.0, 0.0, -20.0]);
        let fine = testutils::projected_raster("b.tif", 20, 20, [200.0, 10.0, 0.0, 200.0, 0.0, -10.0]);
        let plan = resolve(&[&coarse, &fine], &WarpRequest::builder().build())?;

        assert_relative_eq!(plan.geo_transform.cell_size_x(), 10.0, epsilon = 1e-9);
        assert_eq!(plan.size, RasterSize::with_rows_cols(20, 40));
        Ok(())
    }

    #[test]
    fn alpha_band_accounting() -> Result<()> {
        let src = testutils::rgba_raster("src.tif", 10, 10, [0.0, 1.0, 0.0, 10.0, 0.0, -1.0]);

        let plan = resolve(&[&src], &WarpRequest::builder().build())?;
        assert_eq!(plan.band_count, 3);
        assert_eq!(plan.dst_alpha_band, None);

        let plan = resolve(&[&src], &WarpRequest::builder().dst_alpha(true).build())?;
        assert_eq!(plan.band_count, 4);
        assert_eq!(plan.dst_alpha_band, Some(4));

        let plan = resolve(&[&src], &WarpRequest::builder().src_alpha(AlphaPolicy::Disable).dst_alpha(true).build())?;
        assert_eq!(plan.band_count, 5);

        let plan = resolve(&[&src], &WarpRequest::builder().src_bands(vec![1, 2]).build())?;
        assert_eq!(plan.band_count, 2);
        Ok(())
    }

    #[test]
    fn photometric_rgb_for_rgb_sources() -> Result<()> {
        let src = testutils::rgba_raster("src.tif", 10, 10, [0.0, 1.0, 0.0, 10.0, 0.0, -1.0]);
        let gtiff = MemDriver::new("GTiff").with_creation_options(&["PHOTOMETRIC", "COMPRESS"]);

        let plan = resolve_output(&[&src], &WarpRequest::builder().build(), None, &gtiff, &RuntimeConfig::default())?;
        assert_eq!(plan.creation_options.get("PHOTOMETRIC"), Some("RGB"));

        let request = WarpRequest::builder()
            .creation_options(NameValueList::parse(&["PHOTOMETRIC=MINISBLACK"])?)
            .build();
        let plan = resolve_output(&[&src], &request, None, &gtiff, &RuntimeConfig::default())?;
        assert_eq!(plan.creation_options.get("PHOTOMETRIC"), Some("MINISBLACK"));

        let plan = resolve(&[&src], &WarpRequest::builder().build())?;
        assert!(!plan.creation_options.contains("PHOTOMETRIC"));
        Ok(())
    }

    #[test]
    fn crop_to_cutline_snaps_to_source_pixels() -> Result<()> {
        let src = testutils::projected_raster("src.tif", 100, 100, [0.0, 10.0, 0.0, 1000.0, 0.0, -10.0]);
        let cutline = Cutline {
            geometry: crate::geometry::parse_wkt("POLYGON((12 31,57 31,57 88,12 88,12 31))")?,
            srs: None,
        };
        let request = WarpRequest::builder()
            .cutline(crate::warp::CutlineSource::Wkt(String::new()))
            .crop_to_cutline(true)
            .build();

        let plan = resolve_output(&[&src], &request, Some(&cutline), &mem_driver(), &RuntimeConfig::default())?;
        assert_eq!(plan.extent, Rect::from_bounds(20.0, 40.0, 50.0, 80.0));
        assert_eq!(plan.size, RasterSize::with_rows_cols(4, 3));

        let all_touched = WarpRequest::builder()
            .cutline(crate::warp::CutlineSource::Wkt(String::new()))
            .crop_to_cutline(true)
            .warp_options(NameValueList::parse(&["CUTLINE_ALL_TOUCHED=TRUE"])?)
            .build();
        let plan = resolve_output(&[&src], &all_touched, Some(&cutline), &mem_driver(), &RuntimeConfig::default())?;
        assert_eq!(plan.extent, Rect::from_bounds(10.0, 30.0, 60.0, 90.0));
        Ok(())
    }

    #[test]
    fn oversized_output_is_rejected() {
        let src = testutils::projected_raster("src.tif", 10, 10, [0.0, 1.0, 0.0, 10.0, 0.0, -1.0]);
        let request = WarpRequest::builder()
            .target_extent(Rect::from_bounds(0.0, 0.0, 1e12, 10.0))
            .target_resolution((1.0, 1.0))
            .build();
        assert!(matches!(resolve(&[&src], &request), Err(Error::Runtime(_))));
    }

    #[test]
    fn metadata_conflicts() -> Result<()> {
        let mut a = testutils::projected_raster("a.tif", 10, 10, [0.0, 1.0, 0.0, 10.0, 0.0, -1.0]);
        let mut b = testutils::projected_raster("b.tif", 10, 10, [10.0, 1.0, 0.0, 10.0, 0.0, -1.0]);
        a.set_metadata_item("SENSOR", "S2")?;
        b.set_metadata_item("SENSOR", "S2")?;
        a.set_metadata_item("DATE", "2024-01-01")?;
        b.set_metadata_item("DATE", "2024-02-01")?;

        let sources: [&dyn RasterDataset; 2] = [&a, &b];
        let request = WarpRequest::builder().build();
        let plan = resolve(&sources, &request)?;
        let dst = create_output(&mem_driver(), "dst", &plan, &sources, &request)?;
        assert_eq!(dst.metadata().get("SENSOR"), Some("S2"));
        assert_eq!(dst.metadata().get("DATE"), Some("*"));

        let request = WarpRequest::builder().copy_metadata(false).build();
        let dst = create_output(&mem_driver(), "dst", &plan, &sources, &request)?;
        assert!(dst.metadata().get("SENSOR").is_none());
        Ok(())
    }

    #[test_log::test]
    fn categorical_tables_need_categorical_resampling() -> Result<()> {
        let mut src = testutils::projected_raster("src.tif", 10, 10, [0.0, 1.0, 0.0, 10.0, 0.0, -1.0]);
        let table = ColorTable {
            entries: vec![ColorEntry { c1: 255, c2: 0, c3: 0, c4: 255 }],
        };
        let thematic = RasterAttributeTable {
            table_type: RatTableType::Thematic,
            columns: Vec::new(),
        };
        let band = src.band_mut(1)?;
        band.set_color_table(Some(table.clone()))?;
        band.set_attribute_table(Some(thematic))?;
        band.set_unit_type("m")?;

        let sources: [&dyn RasterDataset; 1] = [&src];
        let near = WarpRequest::builder().build();
        let plan = resolve(&sources, &near)?;
        let dst = create_output(&mem_driver(), "dst", &plan, &sources, &near)?;
        assert_eq!(dst.band(1)?.color_table(), Some(&table));
        assert!(dst.band(1)?.attribute_table().is_some());
        assert_eq!(dst.band(1)?.unit_type(), "m");

        let cubic = WarpRequest::builder().resample(ResampleAlg::Cubic).build();
        let dst = create_output(&mem_driver(), "dst", &plan, &sources, &cubic)?;
        assert!(dst.band(1)?.color_table().is_none());
        assert!(dst.band(1)?.attribute_table().is_none());
        Ok(())
    }

    #[test]
    fn alpha_band_is_tagged() -> Result<()> {
        let src = testutils::rgba_raster("src.tif", 10, 10, [0.0, 1.0, 0.0, 10.0, 0.0, -1.0]);
        let sources: [&dyn RasterDataset; 1] = [&src];
        let request = WarpRequest::builder().dst_alpha(true).build();
        let plan = resolve(&sources, &request)?;
        let dst = create_output(&mem_driver(), "dst", &plan, &sources, &request)?;

        assert_eq!(dst.band(1)?.color_interpretation(), ColorInterpretation::Red);
        assert_eq!(dst.band(3)?.color_interpretation(), ColorInterpretation::Blue);
        assert_eq!(dst.band(4)?.color_interpretation(), ColorInterpretation::Alpha);
        Ok(())
    }

    #[test]
    fn existing_destination_plan() -> Result<()> {
        let dst = MemDataset::copy_from(&testutils::rgba_raster("dst.tif", 8, 6, [0.0, 1.0, 0.0, 6.0, 0.0, -1.0]), "dst.tif")?;
        let plan = ResolvedPlan::from_existing(&dst, &WarpRequest::builder().build())?;
        assert_eq!(plan.size, RasterSize::with_rows_cols(6, 8));
        assert_eq!(plan.dst_alpha_band, Some(4));
        assert_eq!(plan.data_band_count(), 3);
        Ok(())
    }
}
