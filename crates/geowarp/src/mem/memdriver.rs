use std::collections::HashMap;

use crate::{
    DataType, Driver, DriverRegistry, Error, GeoTransform, NameValueList, PixelWindow, RasterBand, RasterDataset, RasterSize, Rect,
    Result,
    dataset::{ColorInterpretation, alpha_band},
    vector::VectorSource,
};

use super::{MemDataset, MemVectorSource};

/// Driver producing in-memory datasets, optionally persisted as JSON files when flushed
#[derive(Debug, Clone)]
pub struct MemDriver {
    name: String,
    extensions: Vec<&'static str>,
    can_create: bool,
    can_create_copy: bool,
    creation_options: Vec<&'static str>,
    file_backed: bool,
}

impl MemDriver {
    pub fn new(name: &str) -> Self {
        MemDriver {
            name: name.to_string(),
            extensions: Vec::new(),
            can_create: true,
            can_create_copy: true,
            creation_options: Vec::new(),
            file_backed: false,
        }
    }

    pub fn with_extensions(mut self, extensions: &[&'static str]) -> Self {
        self.extensions = extensions.to_vec();
        self
    }

    pub fn with_creation_options(mut self, options: &[&'static str]) -> Self {
        self.creation_options = options.to_vec();
        self
    }

    /// Only supports creating a copy of a complete dataset (e.g. cloud optimized formats)
    pub fn copy_only(mut self) -> Self {
        self.can_create = false;
        self
    }

    /// Datasets are written to their path as JSON when flushed
    pub fn file_backed(mut self) -> Self {
        self.file_backed = true;
        self
    }

    fn check_creation_options(&self, options: &NameValueList) {
        for (key, _) in options.iter() {
            if !self.supports_creation_option(key) {
                log::warn!("Driver {} does not support creation option {key}", self.name);
            }
        }
    }

    fn finish(&self, path: &str, mut ds: MemDataset, options: &NameValueList) -> Result<MemDataset> {
        ds.set_description(path);
        for (key, value) in options.iter().filter(|(key, _)| self.supports_creation_option(key)) {
            ds.set_metadata_item(&format!("CREATION_{key}"), value)?;
        }

        if self.file_backed && !path.is_empty() {
            if cfg!(feature = "serde") {
                ds.persist_to(path);
            } else {
                log::debug!("Dataset {path} is kept in memory only, JSON persistence requires the serde feature");
            }
        }

        Ok(ds.with_driver(&self.name))
    }
}

impl Driver for MemDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn extensions(&self) -> Vec<&str> {
        self.extensions.clone()
    }

    fn can_create(&self) -> bool {
        self.can_create
    }

    fn can_create_copy(&self) -> bool {
        self.can_create_copy
    }

    fn creation_option_names(&self) -> Vec<&str> {
        self.creation_options.clone()
    }

    fn create(
        &self,
        path: &str,
        size: RasterSize,
        band_count: usize,
        data_type: DataType,
        options: &NameValueList,
    ) -> Result<Box<dyn RasterDataset>> {
        if !self.can_create {
            return Err(Error::Configuration(format!("Driver {} does not support Create()", self.name)));
        }

        if size.is_empty() {
            return Err(Error::InvalidArgument(format!("Cannot create {path} with an empty size {size}")));
        }

        self.check_creation_options(options);
        let ds = MemDataset::new(path, size, band_count, data_type);
        Ok(Box::new(self.finish(path, ds, options)?))
    }

    fn create_copy(&self, path: &str, src: &dyn RasterDataset, options: &NameValueList) -> Result<Box<dyn RasterDataset>> {
        if !self.can_create_copy {
            return Err(Error::Configuration(format!("Driver {} does not support CreateCopy()", self.name)));
        }

        self.check_creation_options(options);
        let mut ds = self.finish(path, MemDataset::copy_from(src, path)?, options)?;
        ds.flush()?;
        Ok(Box::new(ds))
    }
}

/// Registry with the in-memory drivers and datasets registered by name
pub struct MemRegistry {
    drivers: Vec<Box<dyn Driver>>,
    rasters: HashMap<String, MemDataset>,
    vectors: HashMap<String, MemVectorSource>,
}

impl Default for MemRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl MemRegistry {
    /// Registry with the `JSON`, `VRT` and `MEM` drivers, file formats like `GTiff` are served by the GDAL registry
    pub fn new() -> Self {
        let mut registry = MemRegistry {
            drivers: Vec::new(),
            rasters: HashMap::new(),
            vectors: HashMap::new(),
        };

        registry.register_driver(Box::new(MemDriver::new("JSON").with_extensions(&["json"]).file_backed()));
        registry.register_driver(Box::new(MemDriver::new("VRT").with_extensions(&["vrt"])));
        registry.register_driver(Box::new(MemDriver::new("MEM")));
        registry
    }

    pub fn register_driver(&mut self, driver: Box<dyn Driver>) {
        self.drivers.push(driver);
    }

    /// Makes the dataset available to `open_raster` under `name`
    pub fn register_raster(&mut self, name: &str, mut ds: MemDataset) {
        ds.set_description(name);
        self.rasters.insert(name.to_string(), ds);
    }

    pub fn register_vector(&mut self, name: &str, source: MemVectorSource) {
        self.vectors.insert(name.to_string(), source);
    }

    fn not_found(path: &str) -> Error {
        Error::IOError(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{path}: No such file or directory"),
        ))
    }

    #[cfg(feature = "serde")]
    fn load_raster_file(path: &str) -> Result<Option<MemDataset>> {
        let file = std::path::Path::new(path);
        if !file.is_file() {
            return Ok(None);
        }

        Ok(Some(MemDataset::from_json_file(file)?))
    }

    #[cfg(not(feature = "serde"))]
    fn load_raster_file(_path: &str) -> Result<Option<MemDataset>> {
        Ok(None)
    }
}

impl DriverRegistry for MemRegistry {
    fn driver_by_name(&self, name: &str) -> Option<&dyn Driver> {
        self.drivers
            .iter()
            .find(|driver| driver.name().eq_ignore_ascii_case(name))
            .map(|driver| driver.as_ref())
    }

    fn drivers(&self) -> Vec<&dyn Driver> {
        self.drivers.iter().map(|driver| driver.as_ref()).collect()
    }

    fn open_raster(&self, path: &str) -> Result<Box<dyn RasterDataset>> {
        if let Some(ds) = self.rasters.get(path) {
            return Ok(Box::new(ds.clone()));
        }

        match Self::load_raster_file(path)? {
            Some(ds) => Ok(Box::new(ds)),
            None => Err(Self::not_found(path)),
        }
    }

    fn open_update(&self, path: &str) -> Result<Option<Box<dyn RasterDataset>>> {
        Ok(Self::load_raster_file(path)?.map(|mut ds| {
            ds.persist_to(path);
            Box::new(ds) as Box<dyn RasterDataset>
        }))
    }

    fn open_vector(&self, path: &str) -> Result<Box<dyn VectorSource>> {
        if let Some(source) = self.vectors.get(path) {
            return Ok(Box::new(source.clone()));
        }

        #[cfg(feature = "serde")]
        if std::path::Path::new(path).is_file() {
            return Ok(Box::new(MemVectorSource::from_json_file(std::path::Path::new(path))?));
        }

        Err(Self::not_found(path))
    }

    fn build_mosaic(&self, path: &str, sources: &[&dyn RasterDataset]) -> Result<Box<dyn RasterDataset>> {
        let first = sources
            .first()
            .ok_or_else(|| Error::InvalidArgument("Cannot build a mosaic without sources".into()))?;
        let first_gt = first
            .geo_transform()
            .ok_or_else(|| Error::InvalidArgument("Mosaic sources require a geotransform".into()))?;
        let res_x = first_gt.cell_size_x();
        let res_y = first_gt.cell_size_y().abs();

        let mut extent: Option<Rect<f64>> = None;
        for src in sources {
            let bounds = crate::dataset::dataset_bounds(*src)
                .ok_or_else(|| Error::InvalidArgument("Mosaic sources require a geotransform".into()))?;
            extent = Some(extent.map_or(bounds, |e| e.union(&bounds)));
        }
        let extent = extent.ok_or_else(|| Error::Runtime("Empty mosaic extent".into()))?;

        let size = RasterSize::with_rows_cols(
            (extent.height() / res_y).round() as usize,
            (extent.width() / res_x).round() as usize,
        );

        let band_count = first.band_count();
        let data_type = first.band(1)?.data_type();
        let mut mosaic = MemDataset::new(path, size, band_count, data_type).with_driver("VRT");
        mosaic.set_geo_transform(GeoTransform::north_up(extent.min_x(), extent.max_y(), res_x, res_y))?;
        mosaic.set_spatial_ref(first.spatial_ref().cloned())?;
        for index in 1..=band_count {
            let src_band = first.band(index)?;
            let band = mosaic.mem_band_mut(index)?;
            band.set_nodata(src_band.nodata())?;
            band.set_color_interpretation(src_band.color_interpretation())?;
            band.set_color_table(src_band.color_table().cloned())?;
        }

        for src in sources {
            let src_size = src.raster_size();
            let Some(gt) = src.geo_transform() else { continue };
            let window = PixelWindow {
                x_off: ((gt.top_left().x() - extent.min_x()) / res_x).round() as usize,
                y_off: ((extent.max_y() - gt.top_left().y()) / res_y).round() as usize,
                x_size: src_size.cols.min(size.cols),
                y_size: src_size.rows.min(size.rows),
            };
            let window = PixelWindow {
                x_size: window.x_size.min(size.cols - window.x_off.min(size.cols)),
                y_size: window.y_size.min(size.rows - window.y_off.min(size.rows)),
                ..window
            };
            if window.is_empty() {
                continue;
            }

            let src_window = PixelWindow {
                x_off: 0,
                y_off: 0,
                ..window
            };

            let alpha = match alpha_band(*src) {
                Some(index) => {
                    let mut values = vec![0.0; window.pixel_count()];
                    src.band(index)?.read(src_window, &mut values)?;
                    Some(values)
                }
                None => None,
            };

            for index in 1..=band_count.min(src.band_count()) {
                let src_band = src.band(index)?;
                let is_alpha = src_band.color_interpretation() == ColorInterpretation::Alpha;
                let mut values = vec![0.0; window.pixel_count()];
                src_band.read(src_window, &mut values)?;

                let dst_band = mosaic.mem_band_mut(index)?;
                let mut merged = vec![0.0; window.pixel_count()];
                dst_band.read(window, &mut merged)?;
                for (i, value) in values.into_iter().enumerate() {
                    let transparent = alpha.as_ref().is_some_and(|a| a[i] == 0.0) && !is_alpha;
                    let nodata = src_band.nodata().is_some_and(|nd| nd == value || (nd.is_nan() && value.is_nan()));
                    if !transparent && !nodata {
                        merged[i] = value;
                    }
                }
                dst_band.write(window, &merged)?;
            }
        }

        log::debug!("Built mosaic {path} of {} sources ({size})", sources.len());
        Ok(Box::new(mosaic))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutils;

    #[test]
    fn create_and_copy() -> Result<()> {
        let registry = MemRegistry::new();
        let driver = registry.driver_by_name("mem").expect("MEM driver");
        let ds = driver.create("", RasterSize::with_rows_cols(2, 3), 2, DataType::UInt16, &NameValueList::new())?;
        assert_eq!(ds.band_count(), 2);
        assert_eq!(ds.band(2)?.data_type(), DataType::UInt16);
        assert_eq!(ds.driver_name(), "MEM");

        let copy_only = MemDriver::new("COG").copy_only();
        assert!(copy_only.create("out.tif", RasterSize::square(2), 1, DataType::Byte, &NameValueList::new()).is_err());
        let copy = copy_only.create_copy("", ds.as_ref(), &NameValueList::new())?;
        assert_eq!(copy.raster_size(), RasterSize::with_rows_cols(2, 3));
        assert_eq!(copy.driver_name(), "COG");
        Ok(())
    }

    #[test]
    fn open_registered_raster() -> Result<()> {
        let mut registry = MemRegistry::new();
        registry.register_raster("src.tif", testutils::geographic_raster("", 4, 4, [0.0, 1.0, 0.0, 4.0, 0.0, -1.0]));

        let ds = registry.open_raster("src.tif")?;
        assert_eq!(ds.description(), "src.tif");
        assert!(matches!(registry.open_raster("missing.tif"), Err(Error::IOError(_))));
        assert!(registry.open_update("missing.tif")?.is_none());
        Ok(())
    }

    #[test]
    fn mosaic_of_adjacent_tiles() -> Result<()> {
        let mut left = testutils::geographic_raster("left.tif", 2, 2, [0.0, 1.0, 0.0, 2.0, 0.0, -1.0]);
        let mut right = testutils::geographic_raster("right.tif", 2, 2, [2.0, 1.0, 0.0, 2.0, 0.0, -1.0]);
        left.mem_band_mut(1)?.fill(1.0);
        right.mem_band_mut(1)?.fill(2.0);

        let registry = MemRegistry::new();
        let mosaic = registry.build_mosaic("mosaic.vrt", &[&left, &right])?;
        assert_eq!(mosaic.raster_size(), RasterSize::with_rows_cols(2, 4));
        assert_eq!(mosaic.driver_name(), "VRT");

        let mut values = vec![0.0; 8];
        mosaic.band(1)?.read(PixelWindow::full(mosaic.raster_size()), &mut values)?;
        assert_eq!(values, vec![1.0, 1.0, 2.0, 2.0, 1.0, 1.0, 2.0, 2.0]);
        Ok(())
    }
}
