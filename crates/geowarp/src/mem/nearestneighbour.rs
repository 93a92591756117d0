use geo::Contains;
use geo_types::MultiPolygon;

use crate::{
    Error, PixelWindow, Point, RasterDataset, RasterSize, Result,
    transformer::Direction,
    warp::{ProgressFn, WarpEngine, WarpOptions},
};

/// Value of a destination alpha pixel covered by a source pixel
const ALPHA_OPAQUE: f64 = 255.0;

/// Reference warp engine assigning every destination pixel the value of the source pixel its center maps to.
///
/// The resampling algorithm of the options is not used, all algorithms behave as nearest neighbour.
/// Destination pixels without a valid source pixel are never written, `INIT_DEST` initializes the window before the warp
/// unless `SKIP_NOSOURCE=YES` and the window does not receive any source pixel.
#[derive(Debug, Clone, Copy, Default)]
pub struct NearestNeighbourEngine;

/// Source pixels of the warped bands, read once per warp
struct SourcePixels {
    size: RasterSize,
    bands: Vec<Vec<f64>>,
    alpha: Option<Vec<f64>>,
}

impl SourcePixels {
    fn read(src: &dyn RasterDataset, options: &WarpOptions) -> Result<Self> {
        let size = src.raster_size();
        let window = PixelWindow::full(size);
        let read_band = |index: usize| -> Result<Vec<f64>> {
            let mut values = vec![0.0; size.cell_count()];
            src.band(index)?.read(window, &mut values)?;
            Ok(values)
        };

        Ok(SourcePixels {
            size,
            bands: options.src_bands.iter().map(|index| read_band(*index)).collect::<Result<_>>()?,
            alpha: options.src_alpha_band.map(read_band).transpose()?,
        })
    }
}

/// Warped values of one destination row: per band, `None` where the band has no valid source value
struct WarpedRow {
    values: Vec<Vec<Option<f64>>>,
    covered: Vec<bool>,
}

struct RowWarper<'a> {
    source: SourcePixels,
    options: &'a WarpOptions,
    window: PixelWindow,
    cutline: Option<&'a MultiPolygon<f64>>,
    unified_nodata: bool,
    vertical_factor: Option<f64>,
}

fn is_nodata(value: f64, nodata: Option<f64>) -> bool {
    nodata.is_some_and(|nd| nd == value || (nd.is_nan() && value.is_nan()))
}

fn band_value(values: &Option<Vec<f64>>, band_position: usize) -> Option<f64> {
    values
        .as_ref()
        .and_then(|values| values.get(band_position).or(values.last()).copied())
}

impl RowWarper<'_> {
    /// Source pixel index of the transformed destination pixel center
    fn source_index(&self, x: f64, y: f64) -> Option<usize> {
        if !x.is_finite() || !y.is_finite() || x < 0.0 || y < 0.0 {
            return None;
        }

        let (col, row) = (x.floor() as usize, y.floor() as usize);
        if col >= self.source.size.cols || row >= self.source.size.rows {
            return None;
        }

        if let Some(cutline) = self.cutline {
            if !cutline.contains(&Point::new(x, y)) {
                return None;
            }
        }

        Some(row * self.source.size.cols + col)
    }

    fn warp_row(&self, row: usize) -> Result<WarpedRow> {
        let cols = self.window.x_size;
        let dst_y = (self.window.y_off + row) as f64 + 0.5;
        let mut x: Vec<f64> = (0..cols).map(|col| (self.window.x_off + col) as f64 + 0.5).collect();
        let mut y = vec![dst_y; cols];
        let mut z = vec![0.0; cols];
        let success = self.options.transformer.transform(Direction::DstToSrc, &mut x, &mut y, &mut z)?;

        let band_count = self.source.bands.len();
        let mut warped = WarpedRow {
            values: vec![vec![None; cols]; band_count],
            covered: vec![false; cols],
        };

        for col in 0..cols {
            let Some(index) = success[col].then(|| self.source_index(x[col], y[col])).flatten() else {
                continue;
            };

            if self.source.alpha.as_ref().is_some_and(|alpha| alpha[index] == 0.0) {
                continue;
            }

            let valid: Vec<bool> = (0..band_count)
                .map(|b| !is_nodata(self.source.bands[b][index], band_value(&self.options.src_nodata_real, b)))
                .collect();
            let any_valid = valid.iter().any(|v| *v);

            for b in 0..band_count {
                if valid[b] || (self.unified_nodata && any_valid) {
                    let value = self.source.bands[b][index];
                    warped.values[b][col] = Some(self.vertical_factor.map_or(value, |factor| value * factor));
                }
            }
            warped.covered[col] = any_valid;
        }

        Ok(warped)
    }
}

#[cfg(feature = "rayon")]
fn create_scoped_thread_pool(thread_count: Option<usize>) -> Result<rayon::ThreadPool> {
    let mut pool_builder = rayon::ThreadPoolBuilder::new();
    if let Some(count) = thread_count {
        pool_builder = pool_builder.num_threads(count);
    }
    pool_builder
        .build()
        .map_err(|e| Error::Runtime(format!("Failed to create threadpool: {e}")))
}

/// `NUM_THREADS` warp option, `None` for all cpus
fn thread_count(options: &WarpOptions) -> Result<Option<usize>> {
    match options.options.get("NUM_THREADS") {
        None => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("ALL_CPUS") => Ok(None),
        Some(value) => value
            .parse::<usize>()
            .map(|count| Some(count.max(1)))
            .map_err(|_| Error::InvalidArgument(format!("Invalid NUM_THREADS value: {value}"))),
    }
}

/// `INIT_DEST` value for a destination band position, `NO_DATA` uses the destination nodata value (or 0)
fn init_dest_value(options: &WarpOptions, band_position: usize) -> Result<Option<f64>> {
    match options.options.get("INIT_DEST") {
        None => Ok(None),
        Some(value) if value.eq_ignore_ascii_case("NO_DATA") => {
            Ok(Some(band_value(&options.dst_nodata_real, band_position).unwrap_or(0.0)))
        }
        Some(value) => value
            .parse::<f64>()
            .map(Some)
            .map_err(|_| Error::InvalidArgument(format!("Invalid INIT_DEST value: {value}"))),
    }
}

impl NearestNeighbourEngine {
    fn validate(src: &dyn RasterDataset, dst: &dyn RasterDataset, options: &WarpOptions, window: PixelWindow) -> Result {
        if options.src_bands.len() != options.dst_bands.len() {
            return Err(Error::InvalidArgument(format!(
                "Source and destination band lists differ in length ({} vs {})",
                options.src_bands.len(),
                options.dst_bands.len()
            )));
        }

        for band in options.src_bands.iter().chain(&options.src_alpha_band) {
            src.band(*band)?;
        }

        for band in options.dst_bands.iter().chain(&options.dst_alpha_band) {
            dst.band(*band)?;
        }

        let size = dst.raster_size();
        if window.x_off + window.x_size > size.cols || window.y_off + window.y_size > size.rows {
            return Err(Error::InvalidArgument(format!("Window {window} outside of the destination raster {size}")));
        }

        Ok(())
    }

    fn initialize(dst: &mut dyn RasterDataset, options: &WarpOptions, window: PixelWindow) -> Result {
        for (position, band) in options.dst_bands.iter().enumerate() {
            if let Some(value) = init_dest_value(options, position)? {
                dst.band_mut(*band)?.write(window, &vec![value; window.pixel_count()])?;
            }
        }

        if let Some(alpha) = options.dst_alpha_band {
            if options.options.contains("INIT_DEST") {
                dst.band_mut(alpha)?.write(window, &vec![0.0; window.pixel_count()])?;
            }
        }

        Ok(())
    }

    fn write_rows(dst: &mut dyn RasterDataset, options: &WarpOptions, window: PixelWindow, rows: Vec<WarpedRow>, progress: &mut ProgressFn) -> Result {
        let row_count = rows.len();
        for (row, warped) in rows.into_iter().enumerate() {
            let row_window = PixelWindow {
                x_off: window.x_off,
                y_off: window.y_off + row,
                x_size: window.x_size,
                y_size: 1,
            };

            if warped.covered.iter().any(|c| *c) {
                let mut buffer = vec![0.0; window.x_size];
                for (values, dst_band) in warped.values.iter().zip(&options.dst_bands) {
                    let band = dst.band_mut(*dst_band)?;
                    band.read(row_window, &mut buffer)?;
                    for (dst_value, value) in buffer.iter_mut().zip(values) {
                        if let Some(value) = value {
                            *dst_value = *value;
                        }
                    }
                    band.write(row_window, &buffer)?;
                }

                if let Some(alpha) = options.dst_alpha_band {
                    let band = dst.band_mut(alpha)?;
                    band.read(row_window, &mut buffer)?;
                    for (dst_value, covered) in buffer.iter_mut().zip(&warped.covered) {
                        if *covered {
                            *dst_value = ALPHA_OPAQUE;
                        }
                    }
                    band.write(row_window, &buffer)?;
                }
            }

            if !progress((row + 1) as f64 / row_count as f64) {
                return Err(Error::Cancelled);
            }
        }

        Ok(())
    }

    fn warp(
        &self,
        src: &dyn RasterDataset,
        dst: &mut dyn RasterDataset,
        options: &WarpOptions,
        window: PixelWindow,
        progress: &mut ProgressFn,
        multi: bool,
    ) -> Result {
        Self::validate(src, dst, options, window)?;
        if window.is_empty() {
            return Ok(());
        }

        if let Some(limit) = options.memory_limit {
            log::debug!("Warp memory limit {limit} bytes");
        }

        let warper = RowWarper {
            source: SourcePixels::read(src, options)?,
            options,
            window,
            cutline: options.cutline.as_ref(),
            unified_nodata: options.options.get_bool("UNIFIED_SRC_NODATA", false),
            vertical_factor: options.vertical_shift_factor()?,
        };

        let rows = if multi {
            Self::warp_rows_multi(&warper, thread_count(options)?)?
        } else {
            (0..window.y_size).map(|row| warper.warp_row(row)).collect::<Result<Vec<_>>>()?
        };

        let has_source = rows.iter().any(|row| row.covered.iter().any(|c| *c));
        if !has_source && options.options.get_bool("SKIP_NOSOURCE", false) {
            log::debug!("No source pixels for window {window}, skipping");
            return if progress(1.0) { Ok(()) } else { Err(Error::Cancelled) };
        }

        Self::initialize(dst, options, window)?;
        Self::write_rows(dst, options, window, rows, progress)
    }

    #[cfg(feature = "rayon")]
    fn warp_rows_multi(warper: &RowWarper, thread_count: Option<usize>) -> Result<Vec<WarpedRow>> {
        use rayon::prelude::*;

        let pool = create_scoped_thread_pool(thread_count)?;
        pool.install(|| (0..warper.window.y_size).into_par_iter().map(|row| warper.warp_row(row)).collect())
    }

    #[cfg(not(feature = "rayon"))]
    fn warp_rows_multi(warper: &RowWarper, _thread_count: Option<usize>) -> Result<Vec<WarpedRow>> {
        log::debug!("Multi threaded warp requires the rayon feature, warping on the calling thread");
        (0..warper.window.y_size).map(|row| warper.warp_row(row)).collect()
    }
}

impl WarpEngine for NearestNeighbourEngine {
    fn chunk_and_warp(
        &self,
        src: &dyn RasterDataset,
        dst: &mut dyn RasterDataset,
        options: &WarpOptions,
        window: PixelWindow,
        progress: &mut ProgressFn,
    ) -> Result {
        self.warp(src, dst, options, window, progress, false)
    }

    fn chunk_and_warp_multi(
        &self,
        src: &dyn RasterDataset,
        dst: &mut dyn RasterDataset,
        options: &WarpOptions,
        window: PixelWindow,
        progress: &mut ProgressFn,
    ) -> Result {
        self.warp(src, dst, options, window, progress, true)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        DataType, GeoTransform, NameValueList, SpatialReference, TransformerHandle,
        mem::{MemBand, MemDataset},
        testutils,
        transformer::GenImgProjTransformer,
    };

    fn identity_options(src: &MemDataset, dst: &MemDataset) -> Result<WarpOptions> {
        let mut transformer = GenImgProjTransformer::new(src, src.spatial_ref(), dst.spatial_ref(), &NameValueList::new(), None)?;
        transformer.set_dst_geo_transform(dst.geo_transform().expect("geotransform"))?;
        let transformer: TransformerHandle = Arc::new(transformer);

        let mut options = WarpOptions::new(transformer);
        options.src_bands = vec![1];
        options.dst_bands = vec![1];
        Ok(options)
    }

    fn source() -> Result<MemDataset> {
        let mut src = testutils::projected_raster("src.tif", 4, 4, [0.0, 1.0, 0.0, 4.0, 0.0, -1.0]);
        let values = vec![
            1.0, 2.0, 3.0, 4.0, //
            5.0, 0.0, 0.0, 8.0, //
            9.0, 10.0, 11.0, 12.0, //
            13.0, 14.0, 15.0, 16.0,
        ];
        *src.mem_band_mut(1)? = MemBand::with_data(RasterSize::square(4), DataType::Byte, values)?;
        Ok(src)
    }

    fn destination(src: &MemDataset) -> Result<MemDataset> {
        let mut dst = MemDataset::new("dst", RasterSize::square(4), 1, DataType::Byte);
        dst.set_geo_transform(GeoTransform::new([0.0, 1.0, 0.0, 4.0, 0.0, -1.0]))?;
        dst.set_spatial_ref(src.spatial_ref().cloned())?;
        Ok(dst)
    }

    #[test]
    fn identity_warp_copies_pixels() -> Result<()> {
        let src = source()?;
        let mut dst = destination(&src)?;
        let options = identity_options(&src, &dst)?;

        let window = PixelWindow::full(dst.raster_size());
        NearestNeighbourEngine.chunk_and_warp(&src, &mut dst, &options, window, &mut |_| true)?;
        assert_eq!(dst.mem_band(1)?.data(), src.mem_band(1)?.data());
        Ok(())
    }

    #[test]
    fn nodata_pixels_are_not_written() -> Result<()> {
        let src = source()?;
        let mut dst = destination(&src)?;
        dst.mem_band_mut(1)?.fill(99.0);
        let mut options = identity_options(&src, &dst)?;
        options.src_nodata_real = Some(vec![0.0]);

        let window = PixelWindow::full(dst.raster_size());
        NearestNeighbourEngine.chunk_and_warp(&src, &mut dst, &options, window, &mut |_| true)?;
        assert_eq!(dst.mem_band(1)?.value(1, 1), 99.0);
        assert_eq!(dst.mem_band(1)?.value(1, 0), 5.0);
        Ok(())
    }

    #[test]
    fn init_dest_is_skipped_without_source_pixels() -> Result<()> {
        let src = source()?;
        let mut dst = MemDataset::new("dst", RasterSize::square(4), 1, DataType::Byte);
        dst.set_geo_transform(GeoTransform::new([100.0, 1.0, 0.0, 104.0, 0.0, -1.0]))?;
        dst.set_spatial_ref(src.spatial_ref().cloned())?;
        dst.mem_band_mut(1)?.fill(7.0);

        let mut options = identity_options(&src, &dst)?;
        options.options.set("INIT_DEST", "0");
        options.options.set("SKIP_NOSOURCE", "YES");
        let window = PixelWindow::full(dst.raster_size());
        NearestNeighbourEngine.chunk_and_warp(&src, &mut dst, &options, window, &mut |_| true)?;
        assert!(dst.mem_band(1)?.data().iter().all(|v| *v == 7.0));

        options.options.set("SKIP_NOSOURCE", "NO");
        let window = PixelWindow::full(dst.raster_size());
        NearestNeighbourEngine.chunk_and_warp(&src, &mut dst, &options, window, &mut |_| true)?;
        assert!(dst.mem_band(1)?.data().iter().all(|v| *v == 0.0));
        Ok(())
    }

    #[test]
    fn destination_alpha_marks_covered_pixels() -> Result<()> {
        let src = source()?;
        let mut dst = MemDataset::new("dst", RasterSize::square(4), 2, DataType::Byte);
        dst.set_geo_transform(GeoTransform::new([2.0, 1.0, 0.0, 4.0, 0.0, -1.0]))?;
        dst.set_spatial_ref(src.spatial_ref().cloned())?;

        let mut options = identity_options(&src, &dst)?;
        options.dst_alpha_band = Some(2);
        options.options.set("INIT_DEST", "NO_DATA");
        let window = PixelWindow::full(dst.raster_size());
        NearestNeighbourEngine.chunk_and_warp(&src, &mut dst, &options, window, &mut |_| true)?;

        let alpha = dst.mem_band(2)?;
        assert_eq!(alpha.value(0, 0), 255.0);
        assert_eq!(alpha.value(0, 3), 0.0);
        assert_eq!(dst.mem_band(1)?.value(0, 1), 4.0);
        Ok(())
    }

    #[test]
    fn cancellation() -> Result<()> {
        let src = source()?;
        let mut dst = destination(&src)?;
        let options = identity_options(&src, &dst)?;

        let window = PixelWindow::full(dst.raster_size());
        let result = NearestNeighbourEngine.chunk_and_warp(&src, &mut dst, &options, window, &mut |_| false);
        assert!(matches!(result, Err(Error::Cancelled)));
        Ok(())
    }

    #[test]
    fn multi_threaded_matches_single_threaded() -> Result<()> {
        let src = testutils::geographic_raster("src.tif", 40, 40, [0.0, 0.25, 0.0, 50.0, 0.0, -0.25]);
        let mut single = MemDataset::new("single", RasterSize::square(30), 1, DataType::Byte);
        single.set_geo_transform(GeoTransform::north_up(0.0, 6446275.84, 40000.0, 40000.0))?;
        single.set_spatial_ref(Some(SpatialReference::web_mercator()))?;
        let mut multi = single.clone();

        let options = identity_options(&src, &single)?;
        let window = PixelWindow::full(single.raster_size());
        NearestNeighbourEngine.chunk_and_warp(&src, &mut single, &options, window, &mut |_| true)?;
        NearestNeighbourEngine.chunk_and_warp_multi(&src, &mut multi, &options, window, &mut |_| true)?;
        assert_eq!(single.mem_band(1)?.data(), multi.mem_band(1)?.data());
        Ok(())
    }
}
