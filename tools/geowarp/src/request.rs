//! Translation of the command line options into a warp request.

use std::str::FromStr;

use geowarp::{
    DataType, Error, NameValueList, Rect, SpatialReference,
    overview::OverviewPolicy,
    warp::{AlphaPolicy, CutlineSource, DensifyCutline, NodataSpec, ResampleAlg, RuntimeConfig, VerticalShiftPolicy, WarpRequest},
};

use crate::Opt;

fn parse<T: FromStr<Err = Error>>(value: Option<&String>) -> geowarp::Result<Option<T>> {
    value.map(|v| v.parse()).transpose()
}

fn parse_srs(value: Option<&String>) -> geowarp::Result<Option<SpatialReference>> {
    value
        .map(|v| v.parse().map_err(|e: Error| Error::Usage(format!("Invalid SRS '{v}': {e}"))))
        .transpose()
}

fn pair<T: Copy>(values: Option<&Vec<T>>) -> Option<(T, T)> {
    values.and_then(|v| match v.as_slice() {
        [a, b] => Some((*a, *b)),
        _ => None,
    })
}

fn cutline_source(opt: &Opt) -> Option<CutlineSource> {
    let cutline = opt.cutline.as_ref()?;
    let upper = cutline.trim_start().to_ascii_uppercase();
    if upper.starts_with("POLYGON") || upper.starts_with("MULTIPOLYGON") {
        return Some(CutlineSource::Wkt(cutline.clone()));
    }

    Some(CutlineSource::Datasource {
        path: cutline.clone(),
        layer: opt.cutline_layer.clone(),
        where_clause: opt.cutline_where.clone(),
        sql: opt.cutline_sql.clone(),
    })
}

/// Builds the request, invalid values are usage errors
pub fn warp_request(opt: &Opt) -> geowarp::Result<WarpRequest> {
    let target_extent = match opt.target_extent.as_deref() {
        Some([min_x, min_y, max_x, max_y]) => Some(Rect::from_bounds(*min_x, *min_y, *max_x, *max_y)),
        Some(_) => return Err(Error::Usage("-te requires 4 values".into())),
        None => None,
    };

    let src_alpha = match (opt.src_alpha, opt.no_src_alpha) {
        (true, _) => AlphaPolicy::Force,
        (_, true) => AlphaPolicy::Disable,
        _ => AlphaPolicy::Auto,
    };

    let vertical_shift = match (opt.vshift, opt.no_vshift) {
        (true, _) => VerticalShiftPolicy::Force,
        (_, true) => VerticalShiftPolicy::Disable,
        _ => VerticalShiftPolicy::Auto,
    };

    let request = WarpRequest::builder()
        .maybe_target_extent(target_extent)
        .maybe_target_extent_srs(parse_srs(opt.target_extent_srs.as_ref())?)
        .maybe_target_resolution(pair(opt.target_resolution.as_ref()))
        .target_aligned_pixels(opt.target_aligned_pixels)
        .maybe_target_size(pair(opt.target_size.as_ref()))
        .maybe_source_srs(parse_srs(opt.source_srs.as_ref())?)
        .maybe_target_srs(parse_srs(opt.target_srs.as_ref())?)
        .maybe_coordinate_operation(opt.coordinate_operation.clone())
        .resample(parse::<ResampleAlg>(opt.resample.as_ref())?.unwrap_or_default())
        .maybe_error_threshold(opt.error_threshold)
        .maybe_src_nodata(parse::<NodataSpec>(opt.src_nodata.as_ref())?)
        .maybe_dst_nodata(parse::<NodataSpec>(opt.dst_nodata.as_ref())?)
        .src_alpha(src_alpha)
        .dst_alpha(opt.dst_alpha)
        .src_bands(opt.src_bands.clone())
        .dst_bands(opt.dst_bands.clone())
        .maybe_cutline(cutline_source(opt))
        .maybe_cutline_srs(parse_srs(opt.cutline_srs.as_ref())?)
        .maybe_cutline_blend_distance(opt.cutline_blend)
        .crop_to_cutline(opt.crop_to_cutline)
        .transformer_options(NameValueList::parse(&opt.transformer_options)?)
        .warp_options(NameValueList::parse(&opt.warp_options)?)
        .overview(parse::<OverviewPolicy>(opt.overview.as_ref())?.unwrap_or_default())
        .vertical_shift(vertical_shift)
        .multi(opt.multi)
        .maybe_format(opt.format.clone())
        .maybe_output_type(parse::<DataType>(opt.output_type.as_ref())?)
        .creation_options(NameValueList::parse(&opt.creation_options)?)
        .overwrite(opt.overwrite)
        .copy_metadata(!opt.no_metadata)
        .maybe_metadata_conflict_value(opt.metadata_conflict_value.clone())
        .maybe_warp_memory(opt.warp_memory)
        .build();

    request.validate()?;
    Ok(request)
}

pub fn runtime_config(opt: &Opt) -> geowarp::Result<RuntimeConfig> {
    Ok(RuntimeConfig::builder()
        .maybe_densify_cutline(parse::<DensifyCutline>(opt.densify_cutline.as_ref())?)
        .ignore_bad_cutline(opt.ignore_bad_cutline)
        .build())
}
