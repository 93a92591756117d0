//! Per source warp: transformer, overview, vertical shift, nodata and cutline setup followed by the engine invocation.

use std::sync::Arc;

use crate::{
    Error, PixelWindow, RasterDataset, RasterSize, Result, SpatialReference, TransformerHandle,
    dataset::dataset_name,
    georef::GeorefMethod,
    overview::{OverviewDataset, select_overview_level},
    suggest::{edge_points, suggested_warp_output},
    transformer::{ApproxTransformer, Direction, GenImgProjTransformer, Transformer, transform_point},
};

use super::{
    ProgressFn, ResolvedPlan, ScaledProgress, WarpContext, WarpDescription, WarpOptions, WarpRequest,
    cutline::{Cutline, cutline_to_source_pixels},
    nodata::{destination_nodata, imaginary_parts, source_nodata},
    output::{source_alpha_band, warped_source_bands},
    transform::{check_invertible, create_transformer, source_srs},
    vshift::{destination_unit_type, must_apply_vertical_shift, vertical_shift_factor},
};

/// `-wm` values below this are megabytes, larger values are bytes
const WARP_MEMORY_MB_THRESHOLD: f64 = 10000.0;

/// Number of samples along each source edge when computing the footprint of an RPC source
const FOOTPRINT_EDGE_STEPS: usize = 20;

/// Destination being warped into and what is known about it
pub(crate) struct Destination<'a> {
    pub dataset: &'a mut dyn RasterDataset,
    pub plan: &'a ResolvedPlan,
    /// The destination was created by this warp, `INIT_DEST` and `SKIP_NOSOURCE` defaults only apply to new datasets
    pub created: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SourceOutcome {
    Warped,
    Skipped,
}

/// Warps every source into the destination in order, later sources overwrite earlier ones where they have data
pub(crate) fn warp_sources(
    ctx: &WarpContext,
    dst: &mut Destination,
    sources: &[&dyn RasterDataset],
    request: &WarpRequest,
    cutline: Option<&Cutline>,
    progress: &mut ProgressFn,
) -> Result {
    for (index, src) in sources.iter().enumerate() {
        log::info!("Processing {} [{}/{}]", dataset_name(*src), index + 1, sources.len());

        let mut scaled = ScaledProgress::new(progress, index, sources.len());
        if warp_source(ctx, dst, index, *src, request, cutline, &mut scaled)? == SourceOutcome::Skipped && !scaled.report(1.0) {
            return Err(Error::Cancelled);
        }
    }

    Ok(())
}

/// Destination bands receiving the warped source bands
fn destination_bands(request: &WarpRequest, src_bands: &[usize]) -> Vec<usize> {
    if request.dst_bands.is_empty() {
        (1..=src_bands.len()).collect()
    } else {
        request.dst_bands.clone()
    }
}

fn check_bands(src: &dyn RasterDataset, dst: &dyn RasterDataset, src_bands: &[usize], dst_bands: &[usize], dst_alpha: Option<usize>) -> Result {
    if src_bands.is_empty() {
        return Err(Error::Configuration(format!("No bands of {} to warp", dataset_name(src))));
    }

    if src_bands.len() != dst_bands.len() {
        return Err(Error::Configuration(format!(
            "{} source band(s) are warped into {} destination band(s)",
            src_bands.len(),
            dst_bands.len()
        )));
    }

    if let Some(band) = src_bands.iter().find(|band| **band == 0 || **band > src.band_count()) {
        return Err(Error::Configuration(format!(
            "Source band {band} does not exist in {} ({} bands)",
            dataset_name(src),
            src.band_count()
        )));
    }

    if let Some(band) = dst_bands.iter().find(|band| **band == 0 || **band > dst.band_count()) {
        return Err(Error::Configuration(format!(
            "Destination band {band} does not exist in {} ({} bands)",
            dataset_name(dst),
            dst.band_count()
        )));
    }

    if let Some(alpha) = dst_alpha.filter(|alpha| dst_bands.contains(alpha)) {
        return Err(Error::Configuration(format!(
            "Destination alpha band {alpha} is also the target of a warped band"
        )));
    }

    Ok(())
}

/// Transformer from source pixels to the destination pixels of the plan
fn pixel_transformer(
    src: &dyn RasterDataset,
    src_srs: Option<&SpatialReference>,
    plan: &ResolvedPlan,
    request: &WarpRequest,
) -> Result<GenImgProjTransformer> {
    let mut transformer = create_transformer(src, src_srs, plan.srs.as_ref(), request)?;
    transformer.set_dst_geo_transform(plan.geo_transform)?;
    Ok(transformer)
}

/// Number of source pixels per destination pixel
fn decimation_ratio(
    src: &dyn RasterDataset,
    src_srs: Option<&SpatialReference>,
    transformer: &dyn Transformer,
    plan: &ResolvedPlan,
    request: &WarpRequest,
) -> Result<f64> {
    let size = plan.size;
    let top_left = transform_point(transformer, Direction::DstToSrc, 0.0, 0.0)?;
    let bottom_right = transform_point(transformer, Direction::DstToSrc, size.cols as f64, size.rows as f64)?;
    if let (Some(tl), Some(br)) = (top_left, bottom_right) {
        let src_diagonal = (br.0 - tl.0).hypot(br.1 - tl.1);
        if src_diagonal > 0.0 {
            return Ok(src_diagonal / size.diagonal());
        }
    }

    log::debug!("Destination corners do not map to the source, using the suggested resolution");
    let georef_transformer = create_transformer(src, src_srs, plan.srs.as_ref(), request)?;
    let suggested = suggested_warp_output(&georef_transformer, src.raster_size(), None)?;
    Ok(plan.geo_transform.cell_size_x().abs() / suggested.resolution())
}

fn selected_overview(
    src: &dyn RasterDataset,
    src_srs: Option<&SpatialReference>,
    transformer: &dyn Transformer,
    plan: &ResolvedPlan,
    request: &WarpRequest,
) -> Result<Option<usize>> {
    let first_band = src.band(1)?;
    let overview_widths: Vec<usize> = (0..first_band.overview_count())
        .filter_map(|level| first_band.overview(level).map(|ovr| ovr.size().cols))
        .collect();
    if overview_widths.is_empty() {
        return Ok(None);
    }

    let ratio = decimation_ratio(src, src_srs, transformer, plan, request)?;
    Ok(select_overview_level(request.overview, src.raster_size().cols, &overview_widths, ratio))
}

/// Destination pixel window covered by the footprint of an RPC source, `None` when the footprint misses the destination
fn rpc_footprint_window(src: &dyn RasterDataset, transformer: &dyn Transformer, dst_size: RasterSize, margin: f64) -> Result<Option<PixelWindow>> {
    let size = src.raster_size();
    let outline = crate::Rect::from_bounds(0.0, 0.0, size.cols as f64, size.rows as f64);
    let points = edge_points(&outline, FOOTPRINT_EDGE_STEPS);

    let mut x: Vec<f64> = points.iter().map(|p| p.x()).collect();
    let mut y: Vec<f64> = points.iter().map(|p| p.y()).collect();
    let mut z = vec![0.0; points.len()];
    let success = transformer.transform(Direction::SrcToDst, &mut x, &mut y, &mut z)?;

    let mut footprint: Option<(f64, f64, f64, f64)> = None;
    for ((x, y), ok) in x.iter().zip(&y).zip(success) {
        if !ok {
            continue;
        }
        footprint = Some(match footprint {
            None => (*x, *y, *x, *y),
            Some((min_x, min_y, max_x, max_y)) => (min_x.min(*x), min_y.min(*y), max_x.max(*x), max_y.max(*y)),
        });
    }

    // without a single transformed point the whole destination is considered
    let Some((min_x, min_y, max_x, max_y)) = footprint else {
        return Ok(Some(PixelWindow::full(dst_size)));
    };

    let x_off = (min_x - margin).floor().max(0.0);
    let y_off = (min_y - margin).floor().max(0.0);
    let x_end = (max_x + margin).ceil().min(dst_size.cols as f64);
    let y_end = (max_y + margin).ceil().min(dst_size.rows as f64);
    if x_end <= x_off || y_end <= y_off {
        return Ok(None);
    }

    Ok(Some(PixelWindow {
        x_off: x_off as usize,
        y_off: y_off as usize,
        x_size: (x_end - x_off) as usize,
        y_size: (y_end - y_off) as usize,
    }))
}

fn warp_source(
    ctx: &WarpContext,
    dst: &mut Destination,
    index: usize,
    src: &dyn RasterDataset,
    request: &WarpRequest,
    cutline: Option<&Cutline>,
    progress: &mut ScaledProgress,
) -> Result<SourceOutcome> {
    let plan = dst.plan;
    let src_alpha_band = source_alpha_band(src, request);
    let src_bands = warped_source_bands(src, request);
    let dst_bands = destination_bands(request, &src_bands);
    check_bands(src, &*dst.dataset, &src_bands, &dst_bands, plan.dst_alpha_band)?;

    let src_srs = source_srs(src, request)?;
    let dst_srs = plan.srs.as_ref();
    let mut transformer = pixel_transformer(src, src_srs.as_ref(), plan, request)?;
    check_invertible(&transformer, plan.size)?;

    let overview_ds;
    let mut working: &dyn RasterDataset = src;
    if let Some(level) = selected_overview(src, src_srs.as_ref(), &transformer, plan, request)? {
        overview_ds = OverviewDataset::new(src, level)?;
        log::info!(
            "Using overview level {level} ({}) of {}",
            overview_ds.raster_size(),
            dataset_name(src)
        );
        working = &overview_ds;
        transformer = pixel_transformer(working, src_srs.as_ref(), plan, request)?;
    }

    let mut engine_options = request.warp_options.clone();
    let mut use_approx = request.error_threshold > 0.0;
    let first_bands = src_bands.first().copied().zip(dst_bands.first().copied());
    if let Some((src_band, dst_band)) = first_bands.filter(|_| {
        must_apply_vertical_shift(request.vertical_shift, src_srs.as_ref(), dst_srs, src_bands.len())
    }) {
        // a created destination has no elevation unit of its own yet, the vertical axis of its SRS decides
        let existing_dst_band = if dst.created { None } else { dst.dataset.band(dst_band).ok() };
        let factor = vertical_shift_factor(working.band(src_band)?, src_srs.as_ref(), existing_dst_band, dst_srs);
        log::debug!("Applying vertical shift with multiplication factor {factor}");
        engine_options.set("APPLY_VERTICAL_SHIFT", "YES");
        engine_options.set("MULT_FACTOR_VERTICAL_SHIFT", factor.to_string());
        use_approx = false;

        if dst.created && index == 0 {
            if let Some(unit) = destination_unit_type(dst_srs) {
                dst.dataset.band_mut(dst_band)?.set_unit_type(unit)?;
            }
        }
    }

    let is_rpc = transformer.method() == GeorefMethod::Rpc;
    let exact: TransformerHandle = Arc::new(transformer);
    let handle: TransformerHandle = if use_approx {
        Arc::new(ApproxTransformer::new(exact.clone(), request.error_threshold))
    } else {
        exact.clone()
    };

    let mut options = WarpOptions::new(handle);
    options.resample = request.resample;
    options.src_bands = src_bands;
    options.dst_bands = dst_bands;
    options.src_alpha_band = src_alpha_band;
    options.dst_alpha_band = plan.dst_alpha_band;
    options.working_data_type = plan.data_type;
    options.memory_limit = request
        .warp_memory
        .map(|mem| if mem < WARP_MEMORY_MB_THRESHOLD { mem * 1024.0 * 1024.0 } else { mem });

    if let Some(distance) = request.cutline_blend_distance.filter(|d| *d > 0.0) {
        options.cutline_blend_distance = distance;
        engine_options.set("CUTLINE_BLEND_DIST", distance.to_string());
    }

    options.src_nodata_real = source_nodata(src, &options.src_bands, request.src_nodata.as_ref(), &mut engine_options)?;
    options.src_nodata_imag = imaginary_parts(options.src_nodata_real.as_ref());
    options.dst_nodata_real = destination_nodata(
        &mut *dst.dataset,
        &options.dst_bands,
        request.dst_nodata.as_ref(),
        options.src_nodata_real.as_deref(),
        dst.created && index == 0,
    )?;
    options.dst_nodata_imag = imaginary_parts(options.dst_nodata_real.as_ref());

    let user_options = &request.warp_options;
    if dst.created && !user_options.contains("INIT_DEST") && !user_options.contains("SKIP_NOSOURCE") {
        if ctx.config.supports_skip_nosource(dst.dataset.driver_name()) {
            engine_options.set("SKIP_NOSOURCE", "YES");
        }
    }

    if index > 0 {
        // the destination was initialized by the first source
        engine_options.remove("INIT_DEST");
    } else if dst.created && !user_options.contains("INIT_DEST") {
        let init = if options.dst_nodata_real.is_some() { "NO_DATA" } else { "0" };
        engine_options.set("INIT_DEST", init);
    }
    options.options = engine_options;

    let mut window = PixelWindow::full(plan.size);
    if is_rpc && options.options.get_bool("SKIP_NOSOURCE", false) {
        match rpc_footprint_window(working, exact.as_ref(), plan.size, ctx.config.rpc_footprint_margin)? {
            Some(footprint) => window = footprint,
            None => {
                log::info!("Skipping {}: its footprint does not intersect the destination", dataset_name(src));
                return Ok(SourceOutcome::Skipped);
            }
        }
    }

    if let Some(cutline) = cutline {
        options.cutline = cutline_to_source_pixels(cutline, working, src_srs.as_ref(), request, &ctx.config)?;
    }

    if dst.dataset.driver_name().eq_ignore_ascii_case("VRT") {
        dst.dataset.set_warp_description(WarpDescription {
            source: dataset_name(src),
            options,
        })?;
        return Ok(SourceOutcome::Warped);
    }

    log::debug!("Warping window {window} with {}", options.transformer.describe());
    let mut report = |complete: f64| progress.report(complete);
    if request.multi {
        ctx.engine
            .chunk_and_warp_multi(working, &mut *dst.dataset, &options, window, &mut report)?;
    } else {
        ctx.engine.chunk_and_warp(working, &mut *dst.dataset, &options, window, &mut report)?;
    }

    Ok(SourceOutcome::Warped)
}
