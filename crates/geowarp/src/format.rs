//! Raster drivers and the registry used to open sources and create destinations.

use std::path::Path;

use crate::{DataType, Error, NameValueList, RasterDataset, RasterSize, Result, vector::VectorSource};

pub trait Driver: Send + Sync {
    fn name(&self) -> &str;

    /// Lowercase file extensions associated with the driver
    fn extensions(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Supports creating a dataset and writing it in random order
    fn can_create(&self) -> bool;

    /// Supports creating a dataset as a copy of a complete source dataset
    fn can_create_copy(&self) -> bool;

    /// Names of the supported creation options
    fn creation_option_names(&self) -> Vec<&str> {
        Vec::new()
    }

    fn supports_creation_option(&self, name: &str) -> bool {
        self.creation_option_names().iter().any(|opt| opt.eq_ignore_ascii_case(name))
    }

    fn create(&self, path: &str, size: RasterSize, band_count: usize, data_type: DataType, options: &NameValueList)
    -> Result<Box<dyn RasterDataset>>;

    fn create_copy(&self, _path: &str, _src: &dyn RasterDataset, _options: &NameValueList) -> Result<Box<dyn RasterDataset>> {
        Err(Error::Configuration(format!("Driver {} does not support CreateCopy()", self.name())))
    }

    /// Removes an existing dataset (`-overwrite`)
    fn delete(&self, path: &str) -> Result {
        if Path::new(path).exists() {
            std::fs::remove_file(path)?;
        }
        Ok(())
    }
}

pub trait DriverRegistry: Send + Sync {
    fn driver_by_name(&self, name: &str) -> Option<&dyn Driver>;
    fn drivers(&self) -> Vec<&dyn Driver>;

    /// Opens a raster read-only
    fn open_raster(&self, path: &str) -> Result<Box<dyn RasterDataset>>;

    /// Opens an existing raster for update, `None` when it does not exist
    fn open_update(&self, _path: &str) -> Result<Option<Box<dyn RasterDataset>>> {
        Ok(None)
    }

    fn open_vector(&self, path: &str) -> Result<Box<dyn VectorSource>>;

    /// Virtual mosaic stacking non overlapping sources with identical grids
    fn build_mosaic(&self, path: &str, sources: &[&dyn RasterDataset]) -> Result<Box<dyn RasterDataset>>;
}

/// Output format derived from the file extension, `GTiff` when there is no extension
pub fn guess_output_format(registry: &dyn DriverRegistry, path: &str) -> Result<String> {
    let extension = match Path::new(path).extension().and_then(|ext| ext.to_str()) {
        Some(ext) => ext.to_ascii_lowercase(),
        None => return Ok("GTiff".to_string()),
    };

    let candidates: Vec<&dyn Driver> = registry
        .drivers()
        .into_iter()
        .filter(|driver| driver.can_create() || driver.can_create_copy())
        .filter(|driver| driver.extensions().contains(&extension.as_str()))
        .collect();

    match candidates.as_slice() {
        [] => Err(Error::Configuration(format!(
            "Cannot guess driver for {path}, use an explicit output format"
        ))),
        [driver] => Ok(driver.name().to_string()),
        [first, ..] => {
            log::warn!(
                "Several drivers matching {extension} extension. Using {}",
                first.name()
            );
            Ok(first.name().to_string())
        }
    }
}

/// Resolves the output driver: the explicit format or the one guessed from the destination path
pub fn output_driver<'a>(registry: &'a dyn DriverRegistry, format: Option<&str>, path: &str) -> Result<&'a dyn Driver> {
    let name = match format {
        Some(format) => format.to_string(),
        None => guess_output_format(registry, path)?,
    };

    let driver = registry
        .driver_by_name(&name)
        .ok_or_else(|| Error::Configuration(format!("Output driver `{name}' not recognised")))?;

    if !driver.can_create() && !driver.can_create_copy() {
        return Err(Error::Configuration(format!(
            "Output driver `{name}' has neither Create() nor CreateCopy() support"
        )));
    }

    Ok(driver)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mem::{MemDriver, MemRegistry};

    #[test]
    fn guess_format_from_extension() -> Result<()> {
        let mut registry = MemRegistry::new();
        registry.register_driver(Box::new(MemDriver::new("GTiff").with_extensions(&["tif", "tiff"])));
        assert_eq!(guess_output_format(&registry, "out.tif")?, "GTiff");
        assert_eq!(guess_output_format(&registry, "out.TIFF")?, "GTiff");
        assert_eq!(guess_output_format(&registry, "out")?, "GTiff");
        assert_eq!(guess_output_format(&registry, "out.vrt")?, "VRT");
        assert_eq!(guess_output_format(&registry, "out.json")?, "JSON");
        assert!(matches!(guess_output_format(&registry, "out.xyz"), Err(Error::Configuration(_))));
        Ok(())
    }

    #[test]
    fn resolve_output_driver() -> Result<()> {
        let registry = MemRegistry::new();
        assert_eq!(output_driver(&registry, Some("MEM"), "ignored.tif")?.name(), "MEM");
        assert!(output_driver(&registry, Some("NOPE"), "out.tif").is_err());
        Ok(())
    }
}
