//! Raster dataset abstraction consumed by the warp orchestration.
//!
//! Band numbers start at 1, as on the command line.

use crate::{
    DataType, Error, GeoTransform, NameValueList, PixelWindow, RasterSize, Rect, Result, SpatialReference,
    georef::{Gcp, GeolocationArrays},
    rpc::RpcModel,
    warp::WarpDescription,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ColorInterpretation {
    #[default]
    Undefined,
    Gray,
    Palette,
    Red,
    Green,
    Blue,
    Alpha,
    Hue,
    Saturation,
    Lightness,
    Cyan,
    Magenta,
    Yellow,
    Black,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorEntry {
    pub c1: i16,
    pub c2: i16,
    pub c3: i16,
    pub c4: i16,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ColorTable {
    pub entries: Vec<ColorEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum RatTableType {
    #[default]
    Thematic,
    Athematic,
}

#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RatColumn {
    pub name: String,
    pub usage: String,
    pub values: Vec<String>,
}

/// Raster attribute table
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RasterAttributeTable {
    pub table_type: RatTableType,
    pub columns: Vec<RatColumn>,
}

impl RasterAttributeTable {
    pub fn is_thematic(&self) -> bool {
        self.table_type == RatTableType::Thematic
    }

    pub fn row_count(&self) -> usize {
        self.columns.iter().map(|c| c.values.len()).max().unwrap_or(0)
    }
}

fn unsupported<T>(what: &str) -> Result<T> {
    Err(Error::Runtime(format!("{what} is not supported by this raster")))
}

pub trait RasterBand: Send + Sync {
    fn data_type(&self) -> DataType;
    fn size(&self) -> RasterSize;
    fn nodata(&self) -> Option<f64>;
    fn set_nodata(&mut self, nodata: Option<f64>) -> Result;
    fn metadata(&self) -> &NameValueList;
    fn set_metadata_item(&mut self, key: &str, value: &str) -> Result;

    fn color_interpretation(&self) -> ColorInterpretation {
        ColorInterpretation::Undefined
    }

    fn set_color_interpretation(&mut self, _interp: ColorInterpretation) -> Result {
        unsupported("Setting the color interpretation")
    }

    fn color_table(&self) -> Option<&ColorTable> {
        None
    }

    fn set_color_table(&mut self, _table: Option<ColorTable>) -> Result {
        unsupported("Setting a color table")
    }

    fn attribute_table(&self) -> Option<&RasterAttributeTable> {
        None
    }

    fn set_attribute_table(&mut self, _table: Option<RasterAttributeTable>) -> Result {
        unsupported("Setting a raster attribute table")
    }

    /// Unit of the pixel values (e.g. `m` or `ft` for elevations)
    fn unit_type(&self) -> &str {
        ""
    }

    fn set_unit_type(&mut self, _unit: &str) -> Result {
        unsupported("Setting the unit type")
    }

    fn description(&self) -> &str {
        ""
    }

    fn set_description(&mut self, _description: &str) -> Result {
        unsupported("Setting the band description")
    }

    fn overview_count(&self) -> usize {
        0
    }

    /// Overview band, level 0 is the finest overview
    fn overview(&self, _level: usize) -> Option<&dyn RasterBand> {
        None
    }

    /// Reads the window into `buffer` (row major, `window.pixel_count()` values)
    fn read(&self, window: PixelWindow, buffer: &mut [f64]) -> Result;

    fn write(&mut self, _window: PixelWindow, _data: &[f64]) -> Result {
        unsupported("Writing")
    }
}

pub trait RasterDataset: Send + Sync {
    /// Name of the dataset (path), empty for anonymous in-memory datasets
    fn description(&self) -> &str;
    fn driver_name(&self) -> &str;
    fn raster_size(&self) -> RasterSize;
    fn band_count(&self) -> usize;
    fn band(&self, index: usize) -> Result<&dyn RasterBand>;
    fn band_mut(&mut self, index: usize) -> Result<&mut dyn RasterBand>;
    fn geo_transform(&self) -> Option<GeoTransform>;
    fn spatial_ref(&self) -> Option<&SpatialReference>;
    fn metadata(&self) -> &NameValueList;

    fn set_geo_transform(&mut self, _gt: GeoTransform) -> Result {
        unsupported("Setting the geotransform")
    }

    fn set_spatial_ref(&mut self, _srs: Option<SpatialReference>) -> Result {
        unsupported("Setting the spatial reference")
    }

    fn set_metadata_item(&mut self, _key: &str, _value: &str) -> Result {
        unsupported("Setting metadata")
    }

    fn gcps(&self) -> &[Gcp] {
        &[]
    }

    fn gcp_spatial_ref(&self) -> Option<&SpatialReference> {
        None
    }

    fn rpc(&self) -> Option<&RpcModel> {
        None
    }

    fn geolocation(&self) -> Option<&GeolocationArrays> {
        None
    }

    /// Number of overview levels, taken from the first band
    fn overview_count(&self) -> usize {
        self.band(1).map(|b| b.overview_count()).unwrap_or(0)
    }

    /// Stores a warp description instead of pixels (virtual datasets)
    fn set_warp_description(&mut self, _description: WarpDescription) -> Result {
        Err(Error::Configuration(format!(
            "Driver {} cannot store a warp description",
            self.driver_name()
        )))
    }

    fn warp_description(&self) -> Option<&WarpDescription> {
        None
    }

    fn flush(&mut self) -> Result {
        Ok(())
    }

    /// The GDAL dataset backing this raster, `None` for rasters living outside GDAL
    #[cfg(feature = "gdal")]
    fn gdal_dataset(&self) -> Option<&crate::gdal::SharedDataset> {
        None
    }
}

/// Band number of the alpha band if the last band is flagged as alpha
pub fn alpha_band(ds: &dyn RasterDataset) -> Option<usize> {
    let count = ds.band_count();
    if count == 0 {
        return None;
    }

    ds.band(count)
        .ok()
        .filter(|band| band.color_interpretation() == ColorInterpretation::Alpha)
        .map(|_| count)
}

/// Georeferenced footprint of an affine georeferenced dataset
pub fn dataset_bounds(ds: &dyn RasterDataset) -> Option<Rect<f64>> {
    ds.geo_transform().map(|gt| gt.bounds(ds.raster_size()))
}

/// Printable identification of a dataset for diagnostics
pub fn dataset_name(ds: &dyn RasterDataset) -> String {
    if ds.description().is_empty() {
        format!("<anonymous {} dataset>", ds.driver_name())
    } else {
        ds.description().to_string()
    }
}
