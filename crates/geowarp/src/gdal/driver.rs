use std::{
    ffi::{CString, c_char, c_int},
    path::Path,
};

use ::gdal::{Dataset, DriverManager, Metadata as _};

use crate::{
    DataType, Driver, DriverRegistry, Error, NameValueList, PixelWindow, RasterDataset, RasterSize, Result,
    dataset::dataset_name, vector::VectorSource,
};

use super::{
    GdalDataset, GdalVectorSource,
    dataset::lock,
    interop::{self, FALSE, check_pointer, check_rc},
};

/// Option names of a `DMD_CREATIONOPTIONLIST` document
fn parse_creation_option_names(xml: &str) -> Vec<String> {
    xml.split("<Option")
        .skip(1)
        .filter_map(|option| {
            let start = option.find("name=")? + "name=".len();
            let quote = option[start..].chars().next().filter(|c| *c == '\'' || *c == '"')?;
            let value = &option[start + 1..];
            value.find(quote).map(|end| value[..end].to_string())
        })
        .collect()
}

/// Raster driver of the GDAL driver manager, the capabilities are read when the registry is created
#[derive(Debug, Clone)]
pub struct GdalDriver {
    name: String,
    extensions: Vec<String>,
    can_create: bool,
    can_create_copy: bool,
    creation_options: Vec<String>,
}

impl GdalDriver {
    fn from_gdal(driver: &::gdal::Driver) -> Self {
        let capability = |key: &str| driver.metadata_item(key, "").is_some_and(|value| value.eq_ignore_ascii_case("YES"));

        GdalDriver {
            name: driver.short_name(),
            extensions: driver
                .metadata_item("DMD_EXTENSIONS", "")
                .unwrap_or_default()
                .split_whitespace()
                .map(str::to_ascii_lowercase)
                .collect(),
            can_create: capability("DCAP_CREATE"),
            can_create_copy: capability("DCAP_CREATECOPY"),
            creation_options: parse_creation_option_names(&driver.metadata_item("DMD_CREATIONOPTIONLIST", "").unwrap_or_default()),
        }
    }

    fn gdal_driver(&self) -> Result<::gdal::Driver> {
        Ok(DriverManager::get_driver_by_name(&self.name)?)
    }

    fn check_creation_options(&self, options: &NameValueList) {
        for (key, _) in options.iter() {
            if !self.supports_creation_option(key) {
                log::warn!("Driver {} does not support creation option {key}", self.name);
            }
        }
    }
}

impl Driver for GdalDriver {
    fn name(&self) -> &str {
        &self.name
    }

    fn extensions(&self) -> Vec<&str> {
        self.extensions.iter().map(String::as_str).collect()
    }

    fn can_create(&self) -> bool {
        self.can_create
    }

    fn can_create_copy(&self) -> bool {
        self.can_create_copy
    }

    fn creation_option_names(&self) -> Vec<&str> {
        self.creation_options.iter().map(String::as_str).collect()
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
        let driver = self.gdal_driver()?;
        let c_path = CString::new(path)?;
        let c_options = interop::create_string_list(options)?;
        let handle = check_pointer(
            unsafe {
                gdal_sys::GDALCreate(
                    driver.c_driver(),
                    c_path.as_ptr(),
                    size.cols as c_int,
                    size.rows as c_int,
                    band_count as c_int,
                    interop::to_gdal_data_type(data_type),
                    c_options.as_ptr(),
                )
            },
            "GDALCreate",
        )?;

        Ok(Box::new(GdalDataset::from_dataset(unsafe { Dataset::from_c_dataset(handle) })?))
    }

    fn create_copy(&self, path: &str, src: &dyn RasterDataset, options: &NameValueList) -> Result<Box<dyn RasterDataset>> {
        if !self.can_create_copy {
            return Err(Error::Configuration(format!("Driver {} does not support CreateCopy()", self.name)));
        }

        self.check_creation_options(options);
        let staged;
        let src_dataset = match src.gdal_dataset() {
            Some(dataset) => dataset,
            None => {
                staged = in_memory_copy(src)?;
                staged.shared()
            }
        };

        let driver = self.gdal_driver()?;
        let c_path = CString::new(path)?;
        let c_options = interop::create_string_list(options)?;
        let src_ds = lock(src_dataset)?;
        let handle = check_pointer(
            unsafe {
                gdal_sys::GDALCreateCopy(
                    driver.c_driver(),
                    c_path.as_ptr(),
                    src_ds.c_dataset(),
                    FALSE,
                    c_options.as_ptr(),
                    Some(gdal_sys::GDALDummyProgress),
                    std::ptr::null_mut(),
                )
            },
            "GDALCreateCopy",
        )
        .map_err(|err| Error::Runtime(format!("Failed to write {path}: {err}")))?;

        Ok(Box::new(GdalDataset::from_dataset(unsafe { Dataset::from_c_dataset(handle) })?))
    }

    fn delete(&self, path: &str) -> Result {
        if !Path::new(path).exists() {
            return Ok(());
        }

        let driver = self.gdal_driver()?;
        let c_path = CString::new(path)?;
        check_rc(unsafe { gdal_sys::GDALDeleteDataset(driver.c_driver(), c_path.as_ptr()) })
    }
}

/// Copy of a raster in a GDAL `MEM` dataset, for GDAL operations on rasters living outside GDAL
pub(super) fn in_memory_copy(src: &dyn RasterDataset) -> Result<GdalDataset> {
    let data_type = match src.band_count() {
        0 => DataType::Byte,
        _ => src.band(1)?.data_type(),
    };

    let mem = DriverManager::get_driver_by_name("MEM")?;
    let size = src.raster_size();
    let handle = check_pointer(
        unsafe {
            gdal_sys::GDALCreate(
                mem.c_driver(),
                c"".as_ptr(),
                size.cols as c_int,
                size.rows as c_int,
                src.band_count() as c_int,
                interop::to_gdal_data_type(data_type),
                std::ptr::null_mut(),
            )
        },
        "GDALCreate",
    )?;

    let mut copy = GdalDataset::from_dataset(unsafe { Dataset::from_c_dataset(handle) })?;
    if let Some(gt) = src.geo_transform() {
        copy.set_geo_transform(gt)?;
    }
    copy.set_spatial_ref(src.spatial_ref().cloned())?;

    let window = PixelWindow::full(size);
    let mut values = vec![0.0; size.cell_count()];
    for index in 1..=src.band_count() {
        let src_band = src.band(index)?;
        let band = copy.band_mut(index)?;
        if src_band.nodata().is_some() {
            band.set_nodata(src_band.nodata())?;
        }
        band.set_color_interpretation(src_band.color_interpretation())?;
        if let Some(table) = src_band.color_table() {
            band.set_color_table(Some(table.clone()))?;
        }
        if !src_band.unit_type().is_empty() {
            band.set_unit_type(src_band.unit_type())?;
        }

        src_band.read(window, &mut values)?;
        band.write(window, &values)?;
    }

    log::debug!("Copied {} into a GDAL MEM dataset", dataset_name(src));
    Ok(copy)
}

/// Registry of the raster drivers known to GDAL
pub struct GdalRegistry {
    drivers: Vec<GdalDriver>,
}

impl Default for GdalRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl GdalRegistry {
    pub fn new() -> Self {
        DriverManager::register_all();

        let drivers = (0..DriverManager::count())
            .filter_map(|index| DriverManager::get_driver(index).ok())
            .filter(|driver| driver.metadata_item("DCAP_RASTER", "").is_some())
            .map(|driver| GdalDriver::from_gdal(&driver))
            .collect::<Vec<_>>();

        log::debug!("{} GDAL raster drivers available", drivers.len());
        GdalRegistry { drivers }
    }
}

impl DriverRegistry for GdalRegistry {
    fn driver_by_name(&self, name: &str) -> Option<&dyn Driver> {
        self.drivers
            .iter()
            .find(|driver| driver.name.eq_ignore_ascii_case(name))
            .map(|driver| driver as &dyn Driver)
    }

    fn drivers(&self) -> Vec<&dyn Driver> {
        self.drivers.iter().map(|driver| driver as &dyn Driver).collect()
    }

    fn open_raster(&self, path: &str) -> Result<Box<dyn RasterDataset>> {
        Ok(Box::new(GdalDataset::open(path)?))
    }

    fn open_update(&self, path: &str) -> Result<Option<Box<dyn RasterDataset>>> {
        if !Path::new(path).exists() {
            return Ok(None);
        }

        Ok(Some(Box::new(GdalDataset::open_update(path)?)))
    }

    fn open_vector(&self, path: &str) -> Result<Box<dyn VectorSource>> {
        Ok(Box::new(GdalVectorSource::open(path)?))
    }

    /// In-memory VRT of the sources, which have to be files GDAL can open
    fn build_mosaic(&self, path: &str, sources: &[&dyn RasterDataset]) -> Result<Box<dyn RasterDataset>> {
        if sources.is_empty() {
            return Err(Error::InvalidArgument("Cannot build a mosaic without sources".into()));
        }

        let names = sources
            .iter()
            .map(|src| {
                if src.description().is_empty() || src.gdal_dataset().is_none() {
                    return Err(Error::Configuration(format!(
                        "Mosaic source {} is not a GDAL dataset opened from a file",
                        dataset_name(*src)
                    )));
                }
                Ok(CString::new(src.description())?)
            })
            .collect::<Result<Vec<_>>>()?;
        let mut name_ptrs: Vec<*const c_char> = names.iter().map(|name| name.as_ptr()).collect();
        name_ptrs.push(std::ptr::null());

        let mut usage_error: c_int = FALSE;
        let handle = check_pointer(
            unsafe {
                gdal_sys::GDALBuildVRT(
                    c"".as_ptr(),
                    sources.len() as c_int,
                    std::ptr::null_mut(),
                    name_ptrs.as_ptr(),
                    std::ptr::null(),
                    &mut usage_error,
                )
            },
            "GDALBuildVRT",
        )?;

        log::debug!("Built mosaic {path} of {} sources", sources.len());
        Ok(Box::new(GdalDataset::from_dataset(unsafe { Dataset::from_c_dataset(handle) })?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_option_list() {
        let xml = r#"<CreationOptionList>
            <Option name='COMPRESS' type='string-select'><Value>LZW</Value></Option>
            <Option name="TILED" type="boolean" description="Tiled"/>
            <Option type='int' name='BLOCKXSIZE'/>
        </CreationOptionList>"#;

        assert_eq!(parse_creation_option_names(xml), vec!["COMPRESS", "TILED", "BLOCKXSIZE"]);
        assert!(parse_creation_option_names("").is_empty());
    }

    #[test]
    fn gdal_registry_drivers() -> Result<()> {
        let registry = GdalRegistry::new();
        let gtiff = registry.driver_by_name("gtiff").expect("GTiff driver");
        assert!(gtiff.can_create());
        assert!(gtiff.extensions().contains(&"tif"));
        assert!(gtiff.supports_creation_option("COMPRESS"));
        assert_eq!(crate::format::guess_output_format(&registry, "out.tif")?, "GTiff");
        Ok(())
    }
}
