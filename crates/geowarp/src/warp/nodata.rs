//! Source and destination nodata resolution.

use crate::{NameValueList, RasterDataset, Result};

use super::NodataSpec;

/// Nodata used for source bands without nodata when other bands of the same source do have one,
/// far outside the range of any value stored in practice
pub const MISSING_BAND_NODATA: f64 = -1.1e20;

/// Per band source nodata: the `-srcnodata` values, otherwise the nodata of the source bands.
///
/// Explicit values imply `UNIFIED_SRC_NODATA=YES` (a pixel is only nodata when all bands are) unless the option was set.
pub fn source_nodata(
    src: &dyn RasterDataset,
    src_bands: &[usize],
    spec: Option<&NodataSpec>,
    warp_options: &mut NameValueList,
) -> Result<Option<Vec<f64>>> {
    match spec {
        Some(NodataSpec::None) => Ok(None),
        Some(spec @ NodataSpec::Values(_)) => {
            if !warp_options.contains("UNIFIED_SRC_NODATA") {
                warp_options.set("UNIFIED_SRC_NODATA", "YES");
            }
            Ok(Some((0..src_bands.len()).filter_map(|pos| spec.value(pos)).collect()))
        }
        None => {
            let band_nodata = src_bands
                .iter()
                .map(|band| Ok(src.band(*band)?.nodata()))
                .collect::<Result<Vec<Option<f64>>>>()?;

            if band_nodata.iter().all(Option::is_none) {
                return Ok(None);
            }

            Ok(Some(band_nodata.into_iter().map(|nd| nd.unwrap_or(MISSING_BAND_NODATA)).collect()))
        }
    }
}

/// Per band destination nodata, applied to the destination bands.
///
/// Explicit `-dstnodata` values are clamped to the band data type. Without them the nodata already present on the
/// destination is kept, a destination created by this warp inherits the source nodata.
pub fn destination_nodata(
    dst: &mut dyn RasterDataset,
    dst_bands: &[usize],
    spec: Option<&NodataSpec>,
    src_nodata: Option<&[f64]>,
    created: bool,
) -> Result<Option<Vec<f64>>> {
    let requested: Vec<Option<f64>> = match spec {
        Some(NodataSpec::None) => return Ok(None),
        Some(spec @ NodataSpec::Values(_)) => (0..dst_bands.len()).map(|pos| spec.value(pos)).collect(),
        None => {
            let existing = dst_bands
                .iter()
                .map(|band| Ok(dst.band(*band)?.nodata()))
                .collect::<Result<Vec<Option<f64>>>>()?;

            if existing.iter().any(Option::is_some) {
                return Ok(Some(existing.into_iter().map(|nd| nd.unwrap_or(MISSING_BAND_NODATA)).collect()));
            }

            match src_nodata {
                Some(src_nodata) if created => (0..dst_bands.len())
                    .map(|pos| src_nodata.get(pos).or(src_nodata.last()).copied())
                    .map(|nd| nd.filter(|v| *v != MISSING_BAND_NODATA))
                    .collect(),
                _ => return Ok(None),
            }
        }
    };

    let mut values = Vec::with_capacity(dst_bands.len());
    for (band_index, value) in dst_bands.iter().zip(requested) {
        let band = dst.band_mut(*band_index)?;
        let Some(mut value) = value else {
            values.push(MISSING_BAND_NODATA);
            continue;
        };

        let data_type = band.data_type();
        if !data_type.can_represent(value) {
            let clamped = data_type.clamp(value);
            log::warn!("Destination nodata value {value} not representable as {data_type}, using {clamped}");
            value = clamped;
        }

        band.set_nodata(Some(value))?;
        values.push(value);
    }

    Ok(Some(values))
}

/// Imaginary nodata parts, zero for every band
pub fn imaginary_parts(real: Option<&Vec<f64>>) -> Option<Vec<f64>> {
    real.map(|real| vec![0.0; real.len()])
}
