use std::{
    ffi::{CString, c_int, c_void},
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use ::gdal::{Dataset, DatasetOptions, GdalOpenFlags, Metadata as _, errors::GdalError, spatial_ref::SpatialRef};
use gdal_sys::{GDALRATFieldType, GDALRATFieldUsage, GDALRATTableType, GDALRWFlag, GDALRasterBandH};

use crate::{
    DataType, Error, GeoTransform, NameValueList, PixelWindow, RasterBand, RasterDataset, RasterSize, Result, SpatialReference,
    dataset::{ColorEntry, ColorInterpretation, ColorTable, RasterAttributeTable, RatColumn, RatTableType},
    georef::Gcp,
    rpc::{RPC_TERM_COUNT, RpcModel},
};

use super::interop::{self, check_pointer, check_rc, major_object, string};

/// GDAL dataset shared by a raster and its bands, GDAL handles are not safe for concurrent use
pub type SharedDataset = Arc<Mutex<Dataset>>;

pub(super) fn lock(dataset: &SharedDataset) -> Result<MutexGuard<'_, Dataset>> {
    dataset
        .lock()
        .map_err(|_| Error::Runtime("GDAL dataset lock poisoned".into()))
}

fn dataset_object(ds: &Dataset) -> gdal_sys::GDALMajorObjectH {
    major_object(unsafe { ds.c_dataset() })
}

/// Band number and overview level, `None` for the full resolution band
#[derive(Debug, Clone, Copy)]
struct BandRef {
    index: usize,
    overview: Option<usize>,
}

/// Band handle, only valid while the dataset lock is held
fn band_handle(ds: &Dataset, band: BandRef) -> Result<GDALRasterBandH> {
    let handle = check_pointer(
        unsafe { gdal_sys::GDALGetRasterBand(ds.c_dataset(), band.index as c_int) },
        "GDALGetRasterBand",
    )?;

    match band.overview {
        None => Ok(handle),
        Some(level) => check_pointer(unsafe { gdal_sys::GDALGetOverview(handle, level as c_int) }, "GDALGetOverview"),
    }
}

fn read_color_table(band: GDALRasterBandH) -> Option<ColorTable> {
    let table = unsafe { gdal_sys::GDALGetRasterColorTable(band) };
    if table.is_null() {
        return None;
    }

    let count = unsafe { gdal_sys::GDALGetColorEntryCount(table) };
    let entries = (0..count)
        .filter_map(|index| {
            let entry = unsafe { gdal_sys::GDALGetColorEntry(table, index) };
            (!entry.is_null()).then(|| {
                let entry = unsafe { *entry };
                ColorEntry {
                    c1: entry.c1,
                    c2: entry.c2,
                    c3: entry.c3,
                    c4: entry.c4,
                }
            })
        })
        .collect();

    Some(ColorTable { entries })
}

fn write_color_table(band: GDALRasterBandH, table: Option<&ColorTable>) -> Result {
    let Some(table) = table else {
        return check_rc(unsafe { gdal_sys::GDALSetRasterColorTable(band, std::ptr::null_mut()) });
    };

    let gdal_table = check_pointer(
        unsafe { gdal_sys::GDALCreateColorTable(gdal_sys::GDALPaletteInterp::GPI_RGB) },
        "GDALCreateColorTable",
    )?;
    for (index, entry) in table.entries.iter().enumerate() {
        let entry = gdal_sys::GDALColorEntry {
            c1: entry.c1,
            c2: entry.c2,
            c3: entry.c3,
            c4: entry.c4,
        };
        unsafe { gdal_sys::GDALSetColorEntry(gdal_table, index as c_int, &entry) };
    }

    let rc = unsafe { gdal_sys::GDALSetRasterColorTable(band, gdal_table) };
    unsafe { gdal_sys::GDALDestroyColorTable(gdal_table) };
    check_rc(rc)
}

const RAT_USAGES: [(GDALRATFieldUsage::Type, &str); 10] = [
    (GDALRATFieldUsage::GFU_Generic, "Generic"),
    (GDALRATFieldUsage::GFU_PixelCount, "PixelCount"),
    (GDALRATFieldUsage::GFU_Name, "Name"),
    (GDALRATFieldUsage::GFU_Min, "Min"),
    (GDALRATFieldUsage::GFU_Max, "Max"),
    (GDALRATFieldUsage::GFU_MinMax, "MinMax"),
    (GDALRATFieldUsage::GFU_Red, "Red"),
    (GDALRATFieldUsage::GFU_Green, "Green"),
    (GDALRATFieldUsage::GFU_Blue, "Blue"),
    (GDALRATFieldUsage::GFU_Alpha, "Alpha"),
];

fn read_attribute_table(band: GDALRasterBandH) -> Option<RasterAttributeTable> {
    let rat = unsafe { gdal_sys::GDALGetDefaultRAT(band) };
    if rat.is_null() {
        return None;
    }

    let (col_count, row_count) = unsafe { (gdal_sys::GDALRATGetColumnCount(rat), gdal_sys::GDALRATGetRowCount(rat)) };
    let columns = (0..col_count)
        .map(|col| {
            let usage = unsafe { gdal_sys::GDALRATGetUsageOfCol(rat, col) };
            RatColumn {
                name: string(unsafe { gdal_sys::GDALRATGetNameOfCol(rat, col) }),
                usage: RAT_USAGES
                    .iter()
                    .find(|(gdal_usage, _)| *gdal_usage == usage)
                    .map_or("Generic", |(_, name)| name)
                    .to_string(),
                values: (0..row_count)
                    .map(|row| string(unsafe { gdal_sys::GDALRATGetValueAsString(rat, row, col) }))
                    .collect(),
            }
        })
        .collect();

    let table_type = match unsafe { gdal_sys::GDALRATGetTableType(rat) } {
        GDALRATTableType::GRTT_ATHEMATIC => RatTableType::Athematic,
        _ => RatTableType::Thematic,
    };

    Some(RasterAttributeTable { table_type, columns })
}

fn write_attribute_table(band: GDALRasterBandH, table: &RasterAttributeTable) -> Result {
    let rat = check_pointer(unsafe { gdal_sys::GDALCreateRasterAttributeTable() }, "GDALCreateRasterAttributeTable")?;
    let result = (|| {
        for column in &table.columns {
            let name = CString::new(column.name.as_str())?;
            let usage = RAT_USAGES
                .iter()
                .find(|(_, usage)| usage.eq_ignore_ascii_case(&column.usage))
                .map_or(GDALRATFieldUsage::GFU_Generic, |(usage, _)| *usage);
            check_rc(unsafe { gdal_sys::GDALRATCreateColumn(rat, name.as_ptr(), GDALRATFieldType::GFT_String, usage) })?;
        }

        unsafe { gdal_sys::GDALRATSetRowCount(rat, table.row_count() as c_int) };
        for (col, column) in table.columns.iter().enumerate() {
            for (row, value) in column.values.iter().enumerate() {
                let value = CString::new(value.as_str())?;
                unsafe { gdal_sys::GDALRATSetValueAsString(rat, row as c_int, col as c_int, value.as_ptr()) };
            }
        }

        let table_type = match table.table_type {
            RatTableType::Thematic => GDALRATTableType::GRTT_THEMATIC,
            RatTableType::Athematic => GDALRATTableType::GRTT_ATHEMATIC,
        };
        check_rc(unsafe { gdal_sys::GDALRATSetTableType(rat, table_type) })?;
        check_rc(unsafe { gdal_sys::GDALSetDefaultRAT(band, rat) })
    })();

    unsafe { gdal_sys::GDALDestroyRasterAttributeTable(rat) };
    result
}

/// Band of a [`GdalDataset`], the properties are read when the dataset is opened
pub struct GdalBand {
    dataset: SharedDataset,
    band: BandRef,
    data_type: DataType,
    size: RasterSize,
    nodata: Option<f64>,
    metadata: NameValueList,
    color_interpretation: ColorInterpretation,
    color_table: Option<ColorTable>,
    attribute_table: Option<RasterAttributeTable>,
    unit_type: String,
    description: String,
    overviews: Vec<GdalBand>,
}

impl GdalBand {
    fn read(dataset: &SharedDataset, ds: &Dataset, band: BandRef) -> Result<Self> {
        let handle = band_handle(ds, band)?;

        let mut has_nodata: c_int = 0;
        let nodata = unsafe { gdal_sys::GDALGetRasterNoDataValue(handle, &mut has_nodata) };

        let overviews = match band.overview {
            Some(_) => Vec::new(),
            None => (0..unsafe { gdal_sys::GDALGetOverviewCount(handle) }.max(0) as usize)
                .map(|level| {
                    GdalBand::read(
                        dataset,
                        ds,
                        BandRef {
                            overview: Some(level),
                            ..band
                        },
                    )
                })
                .collect::<Result<_>>()?,
        };

        Ok(GdalBand {
            dataset: dataset.clone(),
            band,
            data_type: interop::from_gdal_data_type(unsafe { gdal_sys::GDALGetRasterDataType(handle) })?,
            size: RasterSize::with_rows_cols(
                unsafe { gdal_sys::GDALGetRasterBandYSize(handle) } as usize,
                unsafe { gdal_sys::GDALGetRasterBandXSize(handle) } as usize,
            ),
            nodata: (has_nodata != 0).then_some(nodata),
            metadata: interop::read_metadata(major_object(handle), None)?,
            color_interpretation: interop::from_gdal_color_interpretation(unsafe {
                gdal_sys::GDALGetRasterColorInterpretation(handle)
            }),
            color_table: read_color_table(handle),
            attribute_table: read_attribute_table(handle),
            unit_type: string(unsafe { gdal_sys::GDALGetRasterUnitType(handle) }),
            description: string(unsafe { gdal_sys::GDALGetDescription(major_object(handle)) }),
            overviews,
        })
    }

    fn with_handle<T>(&self, op: impl FnOnce(GDALRasterBandH) -> Result<T>) -> Result<T> {
        let ds = lock(&self.dataset)?;
        op(band_handle(&ds, self.band)?)
    }

    fn raster_io(&self, flag: GDALRWFlag::Type, window: PixelWindow, buffer: *mut c_void) -> Result {
        self.with_handle(|handle| {
            check_rc(unsafe {
                gdal_sys::GDALRasterIO(
                    handle,
                    flag,
                    window.x_off as c_int,
                    window.y_off as c_int,
                    window.x_size as c_int,
                    window.y_size as c_int,
                    buffer,
                    window.x_size as c_int,
                    window.y_size as c_int,
                    gdal_sys::GDALDataType::GDT_Float64,
                    0,
                    0,
                )
            })
        })
    }

    fn check_window(&self, window: PixelWindow, len: usize) -> Result {
        if window.x_off + window.x_size > self.size.cols || window.y_off + window.y_size > self.size.rows {
            return Err(Error::InvalidArgument(format!("Window {window} outside of raster {}", self.size)));
        }

        if len < window.pixel_count() {
            return Err(Error::InvalidArgument(format!(
                "Buffer of {len} values too small for window {window}"
            )));
        }

        Ok(())
    }
}

impl RasterBand for GdalBand {
    fn data_type(&self) -> DataType {
        self.data_type
    }

    fn size(&self) -> RasterSize {
        self.size
    }

    fn nodata(&self) -> Option<f64> {
        self.nodata
    }

    fn set_nodata(&mut self, nodata: Option<f64>) -> Result {
        self.with_handle(|handle| match nodata {
            Some(value) => check_rc(unsafe { gdal_sys::GDALSetRasterNoDataValue(handle, value) }),
            None => check_rc(unsafe { gdal_sys::GDALDeleteRasterNoDataValue(handle) }),
        })?;
        self.nodata = nodata;
        Ok(())
    }

    fn metadata(&self) -> &NameValueList {
        &self.metadata
    }

    fn set_metadata_item(&mut self, key: &str, value: &str) -> Result {
        self.with_handle(|handle| interop::set_metadata_item(major_object(handle), key, value))?;
        self.metadata.set(key, value);
        Ok(())
    }

    fn color_interpretation(&self) -> ColorInterpretation {
        self.color_interpretation
    }

    fn set_color_interpretation(&mut self, interp: ColorInterpretation) -> Result {
        self.with_handle(|handle| {
            check_rc(unsafe { gdal_sys::GDALSetRasterColorInterpretation(handle, interop::to_gdal_color_interpretation(interp)) })
        })?;
        self.color_interpretation = interp;
        Ok(())
    }

    fn color_table(&self) -> Option<&ColorTable> {
        self.color_table.as_ref()
    }

    fn set_color_table(&mut self, table: Option<ColorTable>) -> Result {
        self.with_handle(|handle| write_color_table(handle, table.as_ref()))?;
        self.color_table = table;
        Ok(())
    }

    fn attribute_table(&self) -> Option<&RasterAttributeTable> {
        self.attribute_table.as_ref()
    }

    fn set_attribute_table(&mut self, table: Option<RasterAttributeTable>) -> Result {
        match &table {
            Some(table) => self.with_handle(|handle| write_attribute_table(handle, table))?,
            None => log::debug!("GDAL bands keep their raster attribute table"),
        }
        self.attribute_table = table;
        Ok(())
    }

    fn unit_type(&self) -> &str {
        &self.unit_type
    }

    fn set_unit_type(&mut self, unit: &str) -> Result {
        let c_unit = CString::new(unit)?;
        self.with_handle(|handle| check_rc(unsafe { gdal_sys::GDALSetRasterUnitType(handle, c_unit.as_ptr()) }))?;
        self.unit_type = unit.to_string();
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn set_description(&mut self, description: &str) -> Result {
        self.with_handle(|handle| interop::set_description(major_object(handle), description))?;
        self.description = description.to_string();
        Ok(())
    }

    fn overview_count(&self) -> usize {
        self.overviews.len()
    }

    fn overview(&self, level: usize) -> Option<&dyn RasterBand> {
        self.overviews.get(level).map(|band| band as &dyn RasterBand)
    }

    fn read(&self, window: PixelWindow, buffer: &mut [f64]) -> Result {
        self.check_window(window, buffer.len())?;
        if window.is_empty() {
            return Ok(());
        }

        self.raster_io(GDALRWFlag::GF_Read, window, buffer.as_mut_ptr().cast::<c_void>())
    }

    fn write(&mut self, window: PixelWindow, data: &[f64]) -> Result {
        self.check_window(window, data.len())?;
        if window.is_empty() {
            return Ok(());
        }

        // GDALRasterIO only reads from the buffer in write mode
        self.raster_io(GDALRWFlag::GF_Write, window, data.as_ptr().cast_mut().cast::<c_void>())
    }
}

fn rpc_coefficients(metadata: &NameValueList, key: &str) -> Result<Option<[f64; RPC_TERM_COUNT]>> {
    let Some(value) = metadata.get(key) else {
        return Ok(None);
    };

    let values = value
        .split_whitespace()
        .map(|v| v.parse::<f64>().map_err(|_| Error::InvalidArgument(format!("Invalid RPC coefficient in {key}: {v}"))))
        .collect::<Result<Vec<_>>>()?;

    values
        .try_into()
        .map(Some)
        .map_err(|values: Vec<f64>| Error::InvalidArgument(format!("{key} has {} coefficients instead of {RPC_TERM_COUNT}", values.len())))
}

/// RPC model of the `RPC` metadata domain, `None` when the domain is incomplete
fn rpc_from_metadata(metadata: &NameValueList) -> Result<Option<RpcModel>> {
    if metadata.is_empty() {
        return Ok(None);
    }

    let value = |key: &str| -> Result<Option<f64>> { metadata.get_f64(key) };
    let offsets_and_scales = (
        value("LINE_OFF")?,
        value("SAMP_OFF")?,
        value("LAT_OFF")?,
        value("LONG_OFF")?,
        value("HEIGHT_OFF")?,
        value("LINE_SCALE")?,
        value("SAMP_SCALE")?,
        value("LAT_SCALE")?,
        value("LONG_SCALE")?,
        value("HEIGHT_SCALE")?,
    );
    let coefficients = (
        rpc_coefficients(metadata, "LINE_NUM_COEFF")?,
        rpc_coefficients(metadata, "LINE_DEN_COEFF")?,
        rpc_coefficients(metadata, "SAMP_NUM_COEFF")?,
        rpc_coefficients(metadata, "SAMP_DEN_COEFF")?,
    );

    match (offsets_and_scales, coefficients) {
        (
            (
                Some(line_off),
                Some(samp_off),
                Some(lat_off),
                Some(long_off),
                Some(height_off),
                Some(line_scale),
                Some(samp_scale),
                Some(lat_scale),
                Some(long_scale),
                Some(height_scale),
            ),
            (Some(line_num_coeff), Some(line_den_coeff), Some(samp_num_coeff), Some(samp_den_coeff)),
        ) => Ok(Some(RpcModel {
            line_off,
            samp_off,
            lat_off,
            long_off,
            height_off,
            line_scale,
            samp_scale,
            lat_scale,
            long_scale,
            height_scale,
            line_num_coeff,
            line_den_coeff,
            samp_num_coeff,
            samp_den_coeff,
        })),
        _ => {
            log::warn!("Incomplete RPC metadata, the RPC model is ignored");
            Ok(None)
        }
    }
}

fn read_spatial_ref(srs: std::result::Result<SpatialRef, GdalError>, what: &str) -> Option<SpatialReference> {
    let srs = srs.ok()?;
    match interop::to_spatial_reference(&srs) {
        Ok(srs) => Some(srs),
        Err(err) => {
            log::warn!("Unsupported {what} spatial reference, use an explicit spatial reference instead ({err})");
            None
        }
    }
}

fn read_gcps(ds: &Dataset) -> (Vec<Gcp>, Option<SpatialReference>) {
    let count = unsafe { gdal_sys::GDALGetGCPCount(ds.c_dataset()) }.max(0) as usize;
    let gcps_ptr = unsafe { gdal_sys::GDALGetGCPs(ds.c_dataset()) };
    if count == 0 || gcps_ptr.is_null() {
        return (Vec::new(), None);
    }

    let gcps = (0..count)
        .map(|index| {
            let gcp = unsafe { &*gcps_ptr.add(index) };
            Gcp {
                pixel: gcp.dfGCPPixel,
                line: gcp.dfGCPLine,
                x: gcp.dfGCPX,
                y: gcp.dfGCPY,
                z: gcp.dfGCPZ,
            }
        })
        .collect();

    let wkt = string(unsafe { gdal_sys::GDALGetGCPProjection(ds.c_dataset()) });
    let srs = if wkt.is_empty() {
        None
    } else {
        read_spatial_ref(SpatialRef::from_wkt(&wkt), "GCP")
    };

    (gcps, srs)
}

/// Raster dataset opened or created through GDAL
pub struct GdalDataset {
    dataset: SharedDataset,
    description: String,
    driver_name: String,
    size: RasterSize,
    geo_transform: Option<GeoTransform>,
    srs: Option<SpatialReference>,
    metadata: NameValueList,
    gcps: Vec<Gcp>,
    gcp_srs: Option<SpatialReference>,
    rpc: Option<RpcModel>,
    bands: Vec<GdalBand>,
}

fn open_with_options(path: &str, options: DatasetOptions) -> Result<Dataset> {
    Dataset::open_ex(path, options).map_err(|err| match err {
        // cleaner error message when the file does not exist
        GdalError::NullPointer { .. } if !Path::new(path).exists() && !path.starts_with("/vsi") => Error::IOError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{path}: No such file or directory"),
        )),
        _ => Error::Runtime(format!("Failed to open raster dataset: {path} ({err})")),
    })
}

impl GdalDataset {
    /// Opens a raster read-only
    pub fn open(path: &str) -> Result<Self> {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_READONLY | GdalOpenFlags::GDAL_OF_RASTER,
            ..Default::default()
        };

        Self::from_dataset(open_with_options(path, options)?)
    }

    /// Opens a raster for update
    pub fn open_update(path: &str) -> Result<Self> {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_UPDATE | GdalOpenFlags::GDAL_OF_RASTER,
            ..Default::default()
        };

        Self::from_dataset(open_with_options(path, options)?)
    }

    pub fn from_dataset(ds: Dataset) -> Result<Self> {
        let (cols, rows) = ds.raster_size();
        let (gcps, gcp_srs) = read_gcps(&ds);
        let rpc = rpc_from_metadata(&interop::read_metadata(dataset_object(&ds), Some("RPC"))?)?;

        let mut result = GdalDataset {
            dataset: Arc::new(Mutex::new(ds)),
            description: String::new(),
            driver_name: String::new(),
            size: RasterSize::with_rows_cols(rows, cols),
            geo_transform: None,
            srs: None,
            metadata: NameValueList::new(),
            gcps,
            gcp_srs,
            rpc,
            bands: Vec::new(),
        };

        let has_geolocation = {
            let ds = lock(&result.dataset)?;
            result.description = ds.description().unwrap_or_default();
            result.driver_name = ds.driver().short_name();
            result.geo_transform = ds.geo_transform().ok().map(GeoTransform::new);
            result.srs = read_spatial_ref(ds.spatial_ref(), "raster");
            result.metadata = interop::read_metadata(dataset_object(&ds), None)?;
            result.bands = (1..=ds.raster_count())
                .map(|index| GdalBand::read(&result.dataset, &ds, BandRef { index, overview: None }))
                .collect::<Result<_>>()?;
            !unsafe { gdal_sys::GDALGetMetadata(dataset_object(&ds), c"GEOLOCATION".as_ptr()) }.is_null()
        };

        if has_geolocation {
            log::warn!(
                "Geolocation arrays of {} are not read, use the GCPs or an explicit georeferencing instead",
                result.description
            );
        }

        Ok(result)
    }

    pub(super) fn shared(&self) -> &SharedDataset {
        &self.dataset
    }

    fn with_dataset<T>(&self, op: impl FnOnce(&mut Dataset) -> Result<T>) -> Result<T> {
        let mut ds = lock(&self.dataset)?;
        op(&mut ds)
    }
}

impl RasterDataset for GdalDataset {
    fn description(&self) -> &str {
        &self.description
    }

    fn driver_name(&self) -> &str {
        &self.driver_name
    }

    fn raster_size(&self) -> RasterSize {
        self.size
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn band(&self, index: usize) -> Result<&dyn RasterBand> {
        self.bands
            .get(index.wrapping_sub(1))
            .map(|band| band as &dyn RasterBand)
            .ok_or_else(|| Error::InvalidArgument(format!("Band {index} out of range (1..={})", self.bands.len())))
    }

    fn band_mut(&mut self, index: usize) -> Result<&mut dyn RasterBand> {
        let count = self.bands.len();
        self.bands
            .get_mut(index.wrapping_sub(1))
            .map(|band| band as &mut dyn RasterBand)
            .ok_or_else(|| Error::InvalidArgument(format!("Band {index} out of range (1..={count})")))
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        self.geo_transform
    }

    fn spatial_ref(&self) -> Option<&SpatialReference> {
        self.srs.as_ref()
    }

    fn metadata(&self) -> &NameValueList {
        &self.metadata
    }

    fn set_geo_transform(&mut self, gt: GeoTransform) -> Result {
        self.with_dataset(|ds| Ok(ds.set_geo_transform(&gt.coefficients())?))?;
        self.geo_transform = Some(gt);
        Ok(())
    }

    fn set_spatial_ref(&mut self, srs: Option<SpatialReference>) -> Result {
        self.with_dataset(|ds| match &srs {
            Some(srs) => Ok(ds.set_spatial_ref(&interop::to_gdal_spatial_ref(srs)?)?),
            None => check_rc(unsafe { gdal_sys::GDALSetProjection(ds.c_dataset(), c"".as_ptr()) }),
        })?;
        self.srs = srs;
        Ok(())
    }

    fn set_metadata_item(&mut self, key: &str, value: &str) -> Result {
        self.with_dataset(|ds| interop::set_metadata_item(dataset_object(&ds), key, value))?;
        self.metadata.set(key, value);
        Ok(())
    }

    fn gcps(&self) -> &[Gcp] {
        &self.gcps
    }

    fn gcp_spatial_ref(&self) -> Option<&SpatialReference> {
        self.gcp_srs.as_ref()
    }

    fn rpc(&self) -> Option<&RpcModel> {
        self.rpc.as_ref()
    }

    fn flush(&mut self) -> Result {
        self.with_dataset(|ds| Ok(ds.flush_cache()?))
    }

    fn gdal_dataset(&self) -> Option<&SharedDataset> {
        Some(&self.dataset)
    }
}
