use std::ffi::{c_char, c_double, c_int, c_void};

use ::gdal::{Dataset, vector::Geometry};

use crate::{
    Error, PixelWindow, RasterDataset, Result, TransformerHandle, geometry,
    transformer::Direction,
    warp::{ProgressFn, WarpEngine, WarpOptions},
};

use super::{
    GdalDataset,
    dataset::lock,
    driver::in_memory_copy,
    interop::{self, FALSE, check_pointer, check_rc},
};

const TRUE: c_int = 1;

/// Warp engine running `GDALChunkAndWarpImage` with the pixel transformer of the warp options.
///
/// Rasters living outside GDAL are staged in GDAL `MEM` datasets, the warped window of a staged destination is copied
/// back after the warp.
#[derive(Debug, Clone, Copy, Default)]
pub struct GdalWarpEngine;

/// Called by GDAL for every batch of points, maps between the destination and the source pixel spaces
unsafe extern "C" fn transform_points(
    arg: *mut c_void,
    dst_to_src: c_int,
    count: c_int,
    x: *mut c_double,
    y: *mut c_double,
    z: *mut c_double,
    success: *mut c_int,
) -> c_int {
    if arg.is_null() || count <= 0 {
        return TRUE;
    }

    let transformer = unsafe { &*arg.cast::<TransformerHandle>() };
    let count = count as usize;
    let (x, y) = unsafe { (std::slice::from_raw_parts_mut(x, count), std::slice::from_raw_parts_mut(y, count)) };
    let mut z_values = vec![0.0; count];
    let z = if z.is_null() {
        z_values.as_mut_slice()
    } else {
        unsafe { std::slice::from_raw_parts_mut(z, count) }
    };

    let direction = if dst_to_src != FALSE { Direction::DstToSrc } else { Direction::SrcToDst };
    match transformer.transform(direction, x, y, z) {
        Ok(point_success) => {
            if !success.is_null() {
                let success = unsafe { std::slice::from_raw_parts_mut(success, count) };
                for (dst, ok) in success.iter_mut().zip(point_success) {
                    *dst = if ok { TRUE } else { FALSE };
                }
            }
            TRUE
        }
        Err(err) => {
            log::debug!("Point transformation failed: {err}");
            FALSE
        }
    }
}

struct ProgressState<'a, 'b> {
    progress: &'a mut ProgressFn<'b>,
    cancelled: bool,
}

unsafe extern "C" fn report_progress(complete: c_double, _message: *const c_char, arg: *mut c_void) -> c_int {
    if arg.is_null() {
        return TRUE;
    }

    let state = unsafe { &mut *arg.cast::<ProgressState>() };
    if (state.progress)(complete) {
        TRUE
    } else {
        state.cancelled = true;
        FALSE
    }
}

/// Owns the `GDALWarpOptions`, the transformer and progress arguments stay owned by the caller
struct GdalWarpOptions(*mut gdal_sys::GDALWarpOptions);

impl Drop for GdalWarpOptions {
    fn drop(&mut self) {
        unsafe { gdal_sys::GDALDestroyWarpOptions(self.0) };
    }
}

struct WarpOperation(gdal_sys::GDALWarpOperationH);

impl Drop for WarpOperation {
    fn drop(&mut self) {
        unsafe { gdal_sys::GDALDestroyWarpOperation(self.0) };
    }
}

/// Per band value, the last value applies to the remaining bands
fn band_values(values: &Option<Vec<f64>>, band_count: usize) -> Option<Vec<f64>> {
    let values = values.as_ref().filter(|values| !values.is_empty())?;
    Some(
        (0..band_count)
            .map(|index| values.get(index).or(values.last()).copied().unwrap_or_default())
            .collect(),
    )
}

/// Array allocated by GDAL, freed by `GDALDestroyWarpOptions`
fn gdal_array<T: Copy>(values: &[T]) -> *mut T {
    let array = unsafe { gdal_sys::CPLMalloc(std::mem::size_of_val(values)) }.cast::<T>();
    for (index, value) in values.iter().enumerate() {
        unsafe { array.add(index).write(*value) };
    }
    array
}

fn create_warp_options(
    src: &Dataset,
    dst: &Dataset,
    options: &WarpOptions,
    transformer: &TransformerHandle,
    progress: &mut ProgressState,
) -> Result<GdalWarpOptions> {
    if options.src_bands.len() != options.dst_bands.len() {
        return Err(Error::InvalidArgument(format!(
            "Source and destination band count differ ({} <> {})",
            options.src_bands.len(),
            options.dst_bands.len()
        )));
    }

    let band_count = options.src_bands.len();
    let src_bands = options.src_bands.iter().map(|band| *band as c_int).collect::<Vec<_>>();
    let dst_bands = options.dst_bands.iter().map(|band| *band as c_int).collect::<Vec<_>>();
    let c_options = interop::create_string_list(&options.options)?;

    let cutline = options
        .cutline
        .as_ref()
        .map(|cutline| Geometry::from_wkt(&geometry::to_wkt(cutline)))
        .transpose()?;

    let warp_options = GdalWarpOptions(check_pointer(unsafe { gdal_sys::GDALCreateWarpOptions() }, "GDALCreateWarpOptions")?);
    let wo = warp_options.0;
    unsafe {
        (*wo).papszWarpOptions = gdal_sys::CSLDuplicate(c_options.as_ptr());
        (*wo).hSrcDS = src.c_dataset();
        (*wo).hDstDS = dst.c_dataset();
        (*wo).eResampleAlg = interop::to_gdal_resample_alg(options.resample);
        (*wo).eWorkingDataType = interop::to_gdal_data_type(options.working_data_type);
        (*wo).dfWarpMemoryLimit = options.memory_limit.unwrap_or(0.0);

        (*wo).nBandCount = band_count as c_int;
        if band_count > 0 {
            (*wo).panSrcBands = gdal_array(&src_bands);
            (*wo).panDstBands = gdal_array(&dst_bands);
        }
        (*wo).nSrcAlphaBand = options.src_alpha_band.unwrap_or(0) as c_int;
        (*wo).nDstAlphaBand = options.dst_alpha_band.unwrap_or(0) as c_int;

        if let Some(values) = band_values(&options.src_nodata_real, band_count) {
            (*wo).padfSrcNoDataReal = gdal_array(&values);
        }
        if let Some(values) = band_values(&options.src_nodata_imag, band_count) {
            (*wo).padfSrcNoDataImag = gdal_array(&values);
        }
        if let Some(values) = band_values(&options.dst_nodata_real, band_count) {
            (*wo).padfDstNoDataReal = gdal_array(&values);
        }
        if let Some(values) = band_values(&options.dst_nodata_imag, band_count) {
            (*wo).padfDstNoDataImag = gdal_array(&values);
        }

        if let Some(cutline) = &cutline {
            // the warp options own the clone
            (*wo).hCutline = gdal_sys::OGR_G_Clone(cutline.c_geometry());
        }
        (*wo).dfCutlineBlendDist = options.cutline_blend_distance;

        (*wo).pfnTransformer = Some(transform_points);
        (*wo).pTransformerArg = (transformer as *const TransformerHandle).cast_mut().cast::<c_void>();
        (*wo).pfnProgress = Some(report_progress);
        (*wo).pProgressArg = (progress as *mut ProgressState).cast::<c_void>();
    }

    Ok(warp_options)
}

fn warp(src: &Dataset, dst: &Dataset, options: &WarpOptions, window: PixelWindow, progress: &mut ProgressFn, multi: bool) -> Result {
    let transformer = options.transformer.clone();
    let mut state = ProgressState {
        progress,
        cancelled: false,
    };

    let warp_options = create_warp_options(src, dst, options, &transformer, &mut state)?;
    let operation = WarpOperation(check_pointer(
        unsafe { gdal_sys::GDALCreateWarpOperation(warp_options.0) },
        "GDALCreateWarpOperation",
    )?);

    let (x_off, y_off) = (window.x_off as c_int, window.y_off as c_int);
    let (x_size, y_size) = (window.x_size as c_int, window.y_size as c_int);
    let rc = unsafe {
        if multi {
            gdal_sys::GDALChunkAndWarpMulti(operation.0, x_off, y_off, x_size, y_size)
        } else {
            gdal_sys::GDALChunkAndWarpImage(operation.0, x_off, y_off, x_size, y_size)
        }
    };

    drop(operation);
    drop(warp_options);
    if state.cancelled {
        return Err(Error::Cancelled);
    }

    check_rc(rc)
}

/// Copies the warped window of the staged destination bands back into the destination
fn copy_window_back(staged: &GdalDataset, dst: &mut dyn RasterDataset, options: &WarpOptions, window: PixelWindow) -> Result {
    let mut values = vec![0.0; window.pixel_count()];
    for band in options.dst_bands.iter().copied().chain(options.dst_alpha_band) {
        staged.band(band)?.read(window, &mut values)?;
        dst.band_mut(band)?.write(window, &values)?;
    }

    Ok(())
}

impl GdalWarpEngine {
    fn run(
        &self,
        src: &dyn RasterDataset,
        dst: &mut dyn RasterDataset,
        options: &WarpOptions,
        window: PixelWindow,
        progress: &mut ProgressFn,
        multi: bool,
    ) -> Result {
        if window.is_empty() {
            return Ok(());
        }

        let staged_src = match src.gdal_dataset() {
            Some(_) => None,
            None => Some(in_memory_copy(src)?),
        };
        let src_dataset = match (&staged_src, src.gdal_dataset()) {
            (Some(staged), _) => staged.shared().clone(),
            (None, Some(dataset)) => dataset.clone(),
            (None, None) => return Err(Error::Runtime("Source dataset not available to GDAL".into())),
        };

        match dst.gdal_dataset().cloned() {
            Some(dst_dataset) => {
                let (src_ds, dst_ds) = (lock(&src_dataset)?, lock(&dst_dataset)?);
                warp(&src_ds, &dst_ds, options, window, progress, multi)
            }
            None => {
                log::debug!("Staging the destination in a GDAL MEM dataset");
                let staged_dst = in_memory_copy(&*dst)?;
                {
                    let (src_ds, dst_ds) = (lock(&src_dataset)?, lock(staged_dst.shared())?);
                    warp(&src_ds, &dst_ds, options, window, progress, multi)?;
                }
                copy_window_back(&staged_dst, dst, options, window)
            }
        }
    }
}

impl WarpEngine for GdalWarpEngine {
    fn chunk_and_warp(
        &self,
        src: &dyn RasterDataset,
        dst: &mut dyn RasterDataset,
        options: &WarpOptions,
        window: PixelWindow,
        progress: &mut ProgressFn,
    ) -> Result {
        self.run(src, dst, options, window, progress, false)
    }

    fn chunk_and_warp_multi(
        &self,
        src: &dyn RasterDataset,
        dst: &mut dyn RasterDataset,
        options: &WarpOptions,
        window: PixelWindow,
        progress: &mut ProgressFn,
    ) -> Result {
        self.run(src, dst, options, window, progress, true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use approx::assert_relative_eq;

    use super::*;
    use crate::{
        DataType, GeoTransform, NameValueList, RasterSize,
        mem::{MemBand, MemDataset},
        testutils,
        transformer::GenImgProjTransformer,
    };

    fn source() -> Result<MemDataset> {
        let mut src = testutils::projected_raster("src.tif", 4, 4, [0.0, 1.0, 0.0, 4.0, 0.0, -1.0]);
        let values = (1..=16).map(f64::from).collect();
        *src.mem_band_mut(1)? = MemBand::with_data(RasterSize::square(4), DataType::Byte, values)?;
        Ok(src)
    }

    fn options(src: &MemDataset, dst: &MemDataset) -> Result<WarpOptions> {
        let mut transformer = GenImgProjTransformer::new(src, src.spatial_ref(), dst.spatial_ref(), &NameValueList::new(), None)?;
        transformer.set_dst_geo_transform(dst.geo_transform().expect("geotransform"))?;

        let mut options = WarpOptions::new(Arc::new(transformer));
        options.src_bands = vec![1];
        options.dst_bands = vec![1];
        options.working_data_type = DataType::Byte;
        Ok(options)
    }

    fn destination(src: &MemDataset, gt: [f64; 6]) -> Result<MemDataset> {
        let mut dst = MemDataset::new("dst", RasterSize::square(4), 1, DataType::Byte);
        dst.set_geo_transform(GeoTransform::new(gt))?;
        dst.set_spatial_ref(src.spatial_ref().cloned())?;
        Ok(dst)
    }

    #[test_log::test]
    fn warp_into_staged_destination() -> Result<()> {
        let src = source()?;
        let mut dst = destination(&src, [0.0, 1.0, 0.0, 4.0, 0.0, -1.0])?;
        let options = options(&src, &dst)?;

        let window = PixelWindow::full(dst.raster_size());
        GdalWarpEngine.chunk_and_warp(&src, &mut dst, &options, window, &mut |_| true)?;
        assert_eq!(dst.mem_band(1)?.data(), src.mem_band(1)?.data());
        Ok(())
    }

    #[test_log::test]
    fn only_the_window_is_warped() -> Result<()> {
        let src = source()?;
        let mut dst = destination(&src, [0.0, 1.0, 0.0, 4.0, 0.0, -1.0])?;
        dst.mem_band_mut(1)?.fill(99.0);
        let options = options(&src, &dst)?;

        let window = PixelWindow {
            x_off: 0,
            y_off: 2,
            x_size: 4,
            y_size: 2,
        };
        GdalWarpEngine.chunk_and_warp(&src, &mut dst, &options, window, &mut |_| true)?;
        assert_eq!(dst.mem_band(1)?.value(0, 0), 99.0);
        assert_eq!(dst.mem_band(1)?.value(3, 3), 16.0);
        Ok(())
    }

    #[test_log::test]
    fn vertical_shift_factor_is_applied() -> Result<()> {
        let src = source()?;
        let mut dst = MemDataset::new("dst", RasterSize::square(4), 1, DataType::Float32);
        dst.set_geo_transform(GeoTransform::new([0.0, 1.0, 0.0, 4.0, 0.0, -1.0]))?;
        dst.set_spatial_ref(src.spatial_ref().cloned())?;

        let mut options = options(&src, &dst)?;
        options.working_data_type = DataType::Float32;
        options.options.set("APPLY_VERTICAL_SHIFT", "YES");
        options.options.set("MULT_FACTOR_VERTICAL_SHIFT", "0.3048");

        let window = PixelWindow::full(dst.raster_size());
        GdalWarpEngine.chunk_and_warp(&src, &mut dst, &options, window, &mut |_| true)?;
        assert_relative_eq!(dst.mem_band(1)?.value(3, 3), 16.0 * 0.3048, epsilon = 1e-4);
        Ok(())
    }

    #[test_log::test]
    fn cancelled_warp() -> Result<()> {
        let src = source()?;
        let mut dst = destination(&src, [0.0, 1.0, 0.0, 4.0, 0.0, -1.0])?;
        let options = options(&src, &dst)?;

        let window = PixelWindow::full(dst.raster_size());
        let result = GdalWarpEngine.chunk_and_warp(&src, &mut dst, &options, window, &mut |_| false);
        assert!(matches!(result, Err(Error::Cancelled)));
        Ok(())
    }

    #[test]
    fn nodata_values_per_band() {
        assert_eq!(band_values(&Some(vec![1.0]), 3), Some(vec![1.0, 1.0, 1.0]));
        assert_eq!(band_values(&Some(vec![1.0, 2.0]), 2), Some(vec![1.0, 2.0]));
        assert_eq!(band_values(&Some(vec![]), 2), None);
        assert_eq!(band_values(&None, 2), None);
    }
}
