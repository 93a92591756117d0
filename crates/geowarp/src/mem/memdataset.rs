use std::path::PathBuf;

use crate::{
    DataType, Error, GeoTransform, NameValueList, PixelWindow, RasterBand, RasterDataset, RasterSize, Result, SpatialReference,
    dataset::{ColorInterpretation, ColorTable, RasterAttributeTable},
    georef::{Gcp, GeolocationArrays},
    rpc::RpcModel,
    warp::WarpDescription,
};

/// Raster band with all pixels in memory, values are stored as `f64` regardless of the data type
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemBand {
    data_type: DataType,
    size: RasterSize,
    data: Vec<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    nodata: Option<f64>,
    #[cfg_attr(feature = "serde", serde(default))]
    metadata: NameValueList,
    #[cfg_attr(feature = "serde", serde(default))]
    color_interpretation: ColorInterpretation,
    #[cfg_attr(feature = "serde", serde(default))]
    color_table: Option<ColorTable>,
    #[cfg_attr(feature = "serde", serde(default))]
    attribute_table: Option<RasterAttributeTable>,
    #[cfg_attr(feature = "serde", serde(default))]
    unit_type: String,
    #[cfg_attr(feature = "serde", serde(default))]
    description: String,
    #[cfg_attr(feature = "serde", serde(default))]
    overviews: Vec<MemBand>,
}

impl MemBand {
    pub fn new(size: RasterSize, data_type: DataType) -> Self {
        MemBand {
            data_type,
            size,
            data: vec![0.0; size.cell_count()],
            nodata: None,
            metadata: NameValueList::new(),
            color_interpretation: ColorInterpretation::Undefined,
            color_table: None,
            attribute_table: None,
            unit_type: String::new(),
            description: String::new(),
            overviews: Vec::new(),
        }
    }

    pub fn with_data(size: RasterSize, data_type: DataType, data: Vec<f64>) -> Result<Self> {
        if data.len() != size.cell_count() {
            return Err(Error::InvalidArgument(format!(
                "Band data length {} does not match the raster size {size}",
                data.len()
            )));
        }

        Ok(MemBand { data, ..MemBand::new(size, data_type) })
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    pub fn value(&self, row: usize, col: usize) -> f64 {
        self.data[row * self.size.cols + col]
    }

    pub fn fill(&mut self, value: f64) {
        let value = self.data_type.clamp(value);
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// Nearest neighbour decimation by `factor`
    fn decimated(&self, factor: usize) -> MemBand {
        let size = RasterSize::with_rows_cols(self.size.rows.div_ceil(factor), self.size.cols.div_ceil(factor));
        let mut data = Vec::with_capacity(size.cell_count());
        for row in 0..size.rows {
            for col in 0..size.cols {
                data.push(self.value(row * factor, col * factor));
            }
        }

        MemBand {
            data,
            nodata: self.nodata,
            color_interpretation: self.color_interpretation,
            ..MemBand::new(size, self.data_type)
        }
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

impl RasterBand for MemBand {
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
        self.nodata = nodata;
        Ok(())
    }

    fn metadata(&self) -> &NameValueList {
        &self.metadata
    }

    fn set_metadata_item(&mut self, key: &str, value: &str) -> Result {
        self.metadata.set(key, value);
        Ok(())
    }

    fn color_interpretation(&self) -> ColorInterpretation {
        self.color_interpretation
    }

    fn set_color_interpretation(&mut self, interp: ColorInterpretation) -> Result {
        self.color_interpretation = interp;
        Ok(())
    }

    fn color_table(&self) -> Option<&ColorTable> {
        self.color_table.as_ref()
    }

    fn set_color_table(&mut self, table: Option<ColorTable>) -> Result {
        self.color_table = table;
        Ok(())
    }

    fn attribute_table(&self) -> Option<&RasterAttributeTable> {
        self.attribute_table.as_ref()
    }

    fn set_attribute_table(&mut self, table: Option<RasterAttributeTable>) -> Result {
        self.attribute_table = table;
        Ok(())
    }

    fn unit_type(&self) -> &str {
        &self.unit_type
    }

    fn set_unit_type(&mut self, unit: &str) -> Result {
        self.unit_type = unit.to_string();
        Ok(())
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn set_description(&mut self, description: &str) -> Result {
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
        for row in 0..window.y_size {
            let start = (window.y_off + row) * self.size.cols + window.x_off;
            buffer[row * window.x_size..(row + 1) * window.x_size].copy_from_slice(&self.data[start..start + window.x_size]);
        }
        Ok(())
    }

    fn write(&mut self, window: PixelWindow, data: &[f64]) -> Result {
        self.check_window(window, data.len())?;
        for row in 0..window.y_size {
            let start = (window.y_off + row) * self.size.cols + window.x_off;
            for (dst, src) in self.data[start..start + window.x_size]
                .iter_mut()
                .zip(&data[row * window.x_size..(row + 1) * window.x_size])
            {
                *dst = self.data_type.clamp(*src);
            }
        }
        Ok(())
    }
}

/// Raster dataset kept in memory, optionally persisted as JSON when flushed
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MemDataset {
    #[cfg_attr(feature = "serde", serde(skip))]
    description: String,
    #[cfg_attr(feature = "serde", serde(skip))]
    driver: String,
    size: RasterSize,
    #[cfg_attr(feature = "serde", serde(default))]
    geo_transform: Option<GeoTransform>,
    #[cfg_attr(feature = "serde", serde(default))]
    srs: Option<SpatialReference>,
    bands: Vec<MemBand>,
    #[cfg_attr(feature = "serde", serde(default))]
    metadata: NameValueList,
    #[cfg_attr(feature = "serde", serde(default))]
    gcps: Vec<Gcp>,
    #[cfg_attr(feature = "serde", serde(default))]
    gcp_srs: Option<SpatialReference>,
    #[cfg_attr(feature = "serde", serde(default))]
    rpc: Option<RpcModel>,
    #[cfg_attr(feature = "serde", serde(default))]
    geolocation: Option<GeolocationArrays>,
    #[cfg_attr(feature = "serde", serde(skip))]
    warp_description: Option<WarpDescription>,
    #[cfg_attr(feature = "serde", serde(skip))]
    persist_path: Option<PathBuf>,
}

impl MemDataset {
    pub fn new(description: &str, size: RasterSize, band_count: usize, data_type: DataType) -> Self {
        MemDataset {
            description: description.to_string(),
            driver: "MEM".to_string(),
            size,
            geo_transform: None,
            srs: None,
            bands: (0..band_count).map(|_| MemBand::new(size, data_type)).collect(),
            metadata: NameValueList::new(),
            gcps: Vec::new(),
            gcp_srs: None,
            rpc: None,
            geolocation: None,
            warp_description: None,
            persist_path: None,
        }
    }

    /// Copies all bands, georeferencing and metadata of another dataset
    pub fn copy_from(src: &dyn RasterDataset, description: &str) -> Result<Self> {
        let size = src.raster_size();
        let mut ds = MemDataset::new(description, size, 0, DataType::Byte);
        ds.geo_transform = src.geo_transform();
        ds.srs = src.spatial_ref().cloned();
        ds.metadata = src.metadata().clone();
        ds.gcps = src.gcps().to_vec();
        ds.gcp_srs = src.gcp_spatial_ref().cloned();
        ds.rpc = src.rpc().cloned();
        ds.geolocation = src.geolocation().cloned();

        for index in 1..=src.band_count() {
            let band = src.band(index)?;
            let mut data = vec![0.0; size.cell_count()];
            band.read(PixelWindow::full(size), &mut data)?;

            let mut copy = MemBand::with_data(size, band.data_type(), data)?;
            copy.nodata = band.nodata();
            copy.metadata = band.metadata().clone();
            copy.color_interpretation = band.color_interpretation();
            copy.color_table = band.color_table().cloned();
            copy.attribute_table = band.attribute_table().cloned();
            copy.unit_type = band.unit_type().to_string();
            copy.description = band.description().to_string();
            ds.bands.push(copy);
        }

        Ok(ds)
    }

    pub fn with_driver(mut self, driver: &str) -> Self {
        self.driver = driver.to_string();
        self
    }

    pub fn set_description(&mut self, description: &str) {
        self.description = description.to_string();
    }

    pub fn push_band(&mut self, band: MemBand) -> Result {
        if band.size() != self.size {
            return Err(Error::InvalidArgument(format!(
                "Band size {} does not match the dataset size {}",
                band.size(),
                self.size
            )));
        }

        self.bands.push(band);
        Ok(())
    }

    pub fn mem_band(&self, index: usize) -> Result<&MemBand> {
        index
            .checked_sub(1)
            .and_then(|i| self.bands.get(i))
            .ok_or_else(|| Error::Configuration(format!("Invalid band number {index}")))
    }

    pub fn mem_band_mut(&mut self, index: usize) -> Result<&mut MemBand> {
        index
            .checked_sub(1)
            .and_then(|i| self.bands.get_mut(i))
            .ok_or_else(|| Error::Configuration(format!("Invalid band number {index}")))
    }

    pub fn set_gcps(&mut self, gcps: Vec<Gcp>, srs: Option<SpatialReference>) {
        self.gcps = gcps;
        self.gcp_srs = srs;
    }

    pub fn set_rpc(&mut self, rpc: Option<RpcModel>) {
        self.rpc = rpc;
    }

    pub fn set_geolocation(&mut self, geolocation: Option<GeolocationArrays>) {
        self.geolocation = geolocation;
    }

    pub fn clear_geo_transform(&mut self) {
        self.geo_transform = None;
    }

    /// Builds nearest neighbour overviews for the given decimation factors (e.g. `[2, 4, 8]`)
    pub fn build_overviews(&mut self, factors: &[usize]) -> Result {
        if factors.iter().any(|f| *f < 2) {
            return Err(Error::InvalidArgument("Overview factors must be at least 2".into()));
        }

        for band in &mut self.bands {
            band.overviews = factors.iter().map(|factor| band.decimated(*factor)).collect();
        }
        Ok(())
    }

    /// Writes the dataset as JSON to this path when flushed
    pub fn persist_to(&mut self, path: impl Into<PathBuf>) {
        self.persist_path = Some(path.into());
    }

    #[cfg(feature = "serde")]
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        let mut ds: MemDataset = serde_json::from_reader(file)?;
        if ds.bands.iter().any(|band| band.size != ds.size || band.data.len() != ds.size.cell_count()) {
            return Err(Error::Runtime(format!("Band sizes in {} do not match the raster size", path.display())));
        }

        ds.description = path.to_string_lossy().to_string();
        ds.driver = "JSON".to_string();
        Ok(ds)
    }

    #[cfg(feature = "serde")]
    pub fn write_json_file(&self, path: &std::path::Path) -> Result {
        let file = std::io::BufWriter::new(std::fs::File::create(path)?);
        serde_json::to_writer(file, self)?;
        Ok(())
    }
}

impl RasterDataset for MemDataset {
    fn description(&self) -> &str {
        &self.description
    }

    fn driver_name(&self) -> &str {
        &self.driver
    }

    fn raster_size(&self) -> RasterSize {
        self.size
    }

    fn band_count(&self) -> usize {
        self.bands.len()
    }

    fn band(&self, index: usize) -> Result<&dyn RasterBand> {
        Ok(self.mem_band(index)?)
    }

    fn band_mut(&mut self, index: usize) -> Result<&mut dyn RasterBand> {
        Ok(self.mem_band_mut(index)?)
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
        self.geo_transform = Some(gt);
        Ok(())
    }

    fn set_spatial_ref(&mut self, srs: Option<SpatialReference>) -> Result {
        self.srs = srs;
        Ok(())
    }

    fn set_metadata_item(&mut self, key: &str, value: &str) -> Result {
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

    fn geolocation(&self) -> Option<&GeolocationArrays> {
        self.geolocation.as_ref()
    }

    fn set_warp_description(&mut self, description: WarpDescription) -> Result {
        if self.driver != "VRT" {
            return Err(Error::Configuration(format!(
                "Driver {} cannot store a warp description",
                self.driver
            )));
        }

        self.warp_description = Some(description);
        Ok(())
    }

    fn warp_description(&self) -> Option<&WarpDescription> {
        self.warp_description.as_ref()
    }

    fn flush(&mut self) -> Result {
        match &self.persist_path {
            #[cfg(feature = "serde")]
            Some(path) => self.write_json_file(path),
            #[cfg(not(feature = "serde"))]
            Some(path) => Err(Error::Runtime(format!(
                "Writing {} requires the serde feature",
                path.display()
            ))),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_write_window() -> Result<()> {
        let mut ds = MemDataset::new("test", RasterSize::with_rows_cols(3, 4), 1, DataType::Byte);
        let window = PixelWindow {
            x_off: 1,
            y_off: 1,
            x_size: 2,
            y_size: 2,
        };
        ds.band_mut(1)?.write(window, &[1.0, 2.0, 300.0, -4.0])?;

        let mut buffer = vec![0.0; 4];
        ds.band(1)?.read(window, &mut buffer)?;
        assert_eq!(buffer, vec![1.0, 2.0, 255.0, 0.0]);
        assert!(ds.band(1)?.read(PixelWindow { x_off: 3, ..window }, &mut buffer).is_err());
        assert!(ds.band(2).is_err());
        assert!(ds.band(0).is_err());
        Ok(())
    }

    #[test]
    fn overviews() -> Result<()> {
        let size = RasterSize::with_rows_cols(5, 5);
        let mut ds = MemDataset::new("test", size, 0, DataType::Int16);
        ds.push_band(MemBand::with_data(size, DataType::Int16, (0..25).map(f64::from).collect())?)?;
        ds.build_overviews(&[2, 4])?;

        assert_eq!(ds.overview_count(), 2);
        let ovr = ds.band(1)?.overview(0).expect("overview");
        assert_eq!(ovr.size(), RasterSize::with_rows_cols(3, 3));
        let mut buffer = vec![0.0; 9];
        ovr.read(PixelWindow::full(ovr.size()), &mut buffer)?;
        assert_eq!(buffer, vec![0.0, 2.0, 4.0, 10.0, 12.0, 14.0, 20.0, 22.0, 24.0]);
        Ok(())
    }

    #[test]
    fn driver_name() {
        let ds = MemDataset::new("test", RasterSize::square(2), 1, DataType::Byte);
        let vrt = ds.clone().with_driver("VRT");
        assert_eq!(ds.driver_name(), "MEM");
        assert_eq!(vrt.driver_name(), "VRT");
    }

    #[cfg(feature = "serde")]
    #[test]
    fn json_round_trip() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("raster.json");

        let mut ds = MemDataset::new("test", RasterSize::with_rows_cols(2, 3), 1, DataType::Float32);
        ds.set_geo_transform(GeoTransform::north_up(10.0, 20.0, 1.0, 1.0))?;
        ds.set_spatial_ref(Some(SpatialReference::from_epsg(31370)?))?;
        ds.band_mut(1)?.set_nodata(Some(-9999.0))?;
        ds.persist_to(&path);
        ds.flush()?;

        let loaded = MemDataset::from_json_file(&path)?;
        assert_eq!(loaded.raster_size(), RasterSize::with_rows_cols(2, 3));
        assert_eq!(loaded.geo_transform(), ds.geo_transform());
        assert_eq!(loaded.spatial_ref().and_then(|srs| srs.epsg()), Some(31370));
        assert_eq!(loaded.band(1)?.nodata(), Some(-9999.0));
        assert_eq!(loaded.driver_name(), "JSON");
        Ok(())
    }
}
