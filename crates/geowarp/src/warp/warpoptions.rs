use geo_types::MultiPolygon;

use crate::{DataType, NameValueList, PixelWindow, RasterDataset, Result, TransformerHandle, geometry};

use super::ResampleAlg;

/// Progress callback receiving the completed fraction, returning `false` cancels the operation
pub type ProgressFn<'a> = dyn FnMut(f64) -> bool + 'a;

/// Per source settings handed to the warp engine, rebuilt for every source
#[derive(Debug, Clone)]
pub struct WarpOptions {
    pub resample: ResampleAlg,
    /// One based source bands
    pub src_bands: Vec<usize>,
    /// One based destination bands, same length as `src_bands`
    pub dst_bands: Vec<usize>,
    pub src_alpha_band: Option<usize>,
    pub dst_alpha_band: Option<usize>,
    /// Per band source nodata (real and imaginary part)
    pub src_nodata_real: Option<Vec<f64>>,
    pub src_nodata_imag: Option<Vec<f64>>,
    pub dst_nodata_real: Option<Vec<f64>>,
    pub dst_nodata_imag: Option<Vec<f64>>,
    /// Maps destination pixel/line to source pixel/line
    pub transformer: TransformerHandle,
    /// Cutline in source pixel/line coordinates
    pub cutline: Option<MultiPolygon<f64>>,
    pub cutline_blend_distance: f64,
    /// Engine tuning options (`INIT_DEST`, `SKIP_NOSOURCE`, `UNIFIED_SRC_NODATA`, ...)
    pub options: NameValueList,
    pub working_data_type: DataType,
    /// Memory limit in bytes
    pub memory_limit: Option<f64>,
}

impl WarpOptions {
    pub fn new(transformer: TransformerHandle) -> Self {
        WarpOptions {
            resample: ResampleAlg::default(),
            src_bands: Vec::new(),
            dst_bands: Vec::new(),
            src_alpha_band: None,
            dst_alpha_band: None,
            src_nodata_real: None,
            src_nodata_imag: None,
            dst_nodata_real: None,
            dst_nodata_imag: None,
            transformer,
            cutline: None,
            cutline_blend_distance: 0.0,
            options: NameValueList::new(),
            working_data_type: DataType::Byte,
            memory_limit: None,
        }
    }

    /// Vertical shift multiplication factor when the vertical shift is applied
    pub fn vertical_shift_factor(&self) -> Result<Option<f64>> {
        if !self.options.get_bool("APPLY_VERTICAL_SHIFT", false) {
            return Ok(None);
        }

        Ok(Some(self.options.get_f64("MULT_FACTOR_VERTICAL_SHIFT")?.unwrap_or(1.0)))
    }
}

/// Warp stored by virtual datasets instead of pixels, resampling happens when the dataset is read
#[derive(Debug, Clone)]
pub struct WarpDescription {
    pub source: String,
    pub options: WarpOptions,
}

impl std::fmt::Display for WarpDescription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let opts = &self.options;
        writeln!(f, "Source: {}", self.source)?;
        writeln!(f, "Resampling: {}", opts.resample)?;
        writeln!(f, "Working data type: {}", opts.working_data_type)?;
        writeln!(f, "Bands: {:?} -> {:?}", opts.src_bands, opts.dst_bands)?;
        if let Some(alpha) = opts.src_alpha_band {
            writeln!(f, "Source alpha band: {alpha}")?;
        }
        if let Some(alpha) = opts.dst_alpha_band {
            writeln!(f, "Destination alpha band: {alpha}")?;
        }
        if let Some(nodata) = &opts.src_nodata_real {
            writeln!(f, "Source nodata: {nodata:?}")?;
        }
        if let Some(nodata) = &opts.dst_nodata_real {
            writeln!(f, "Destination nodata: {nodata:?}")?;
        }
        writeln!(f, "Transformer: {}", opts.transformer.describe())?;
        if let Some(cutline) = &opts.cutline {
            writeln!(f, "Cutline: {}", geometry::to_wkt(cutline))?;
        }
        write!(f, "Options: {}", opts.options)
    }
}

/// Executes a warp for one source: resamples the source pixels into `window` of the destination
pub trait WarpEngine: Send + Sync {
    fn chunk_and_warp(
        &self,
        src: &dyn RasterDataset,
        dst: &mut dyn RasterDataset,
        options: &WarpOptions,
        window: PixelWindow,
        progress: &mut ProgressFn,
    ) -> Result;

    /// Multi threaded variant
    fn chunk_and_warp_multi(
        &self,
        src: &dyn RasterDataset,
        dst: &mut dyn RasterDataset,
        options: &WarpOptions,
        window: PixelWindow,
        progress: &mut ProgressFn,
    ) -> Result {
        self.chunk_and_warp(src, dst, options, window, progress)
    }
}

/// Maps the progress of one source (`index` of `count`) onto the overall progress
pub struct ScaledProgress<'a, 'b> {
    parent: &'a mut ProgressFn<'b>,
    start: f64,
    end: f64,
}

impl<'a, 'b> ScaledProgress<'a, 'b> {
    pub fn new(parent: &'a mut ProgressFn<'b>, index: usize, count: usize) -> Self {
        let count = count.max(1) as f64;
        ScaledProgress {
            parent,
            start: index as f64 / count,
            end: (index + 1) as f64 / count,
        }
    }

    pub fn report(&mut self, complete: f64) -> bool {
        (self.parent)(self.start + complete.clamp(0.0, 1.0) * (self.end - self.start))
    }
}
