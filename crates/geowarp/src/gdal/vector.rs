use std::{
    path::Path,
    sync::{Mutex, MutexGuard},
};

use ::gdal::{
    Dataset, DatasetOptions, GdalOpenFlags,
    errors::GdalError,
    vector::{FieldValue as OgrFieldValue, LayerAccess, sql::Dialect},
};

use crate::{
    Error, Result,
    mem::MemLayer,
    vector::{Feature, FieldValue, Layer, VectorSource},
};

use super::interop;

fn to_field_value(value: OgrFieldValue) -> Option<FieldValue> {
    match value {
        OgrFieldValue::IntegerValue(v) => Some(FieldValue::Integer(v.into())),
        OgrFieldValue::Integer64Value(v) => Some(FieldValue::Integer(v)),
        OgrFieldValue::RealValue(v) => Some(FieldValue::Real(v)),
        OgrFieldValue::StringValue(v) => Some(FieldValue::String(v)),
        other => other.into_string().map(FieldValue::String),
    }
}

/// Reads the features of an OGR layer (honoring an active attribute filter) into memory
fn read_layer(layer: &mut impl LayerAccess, name: &str) -> Result<MemLayer> {
    let srs = match layer.spatial_ref() {
        Some(srs) => match interop::to_spatial_reference(&srs) {
            Ok(srs) => Some(srs),
            Err(err) => {
                log::warn!("Unsupported spatial reference of layer {name}: {err}");
                None
            }
        },
        None => None,
    };

    let mut result = MemLayer::new(name, srs);
    for feature in layer.features() {
        let geometry = feature.geometry().map(|geom| geom.to_geo()).transpose()?;
        let fields = feature
            .fields()
            .filter_map(|(name, value)| value.and_then(to_field_value).map(|value| (name, value)))
            .collect();
        result.add_feature(Feature { geometry, fields });
    }

    Ok(result)
}

/// Vector datasource opened through OGR, the layers are read when the datasource is opened.
///
/// Attribute filters and SQL statements are evaluated by OGR on the underlying dataset.
pub struct GdalVectorSource {
    dataset: Mutex<Dataset>,
    description: String,
    layers: Vec<MemLayer>,
}

impl GdalVectorSource {
    pub fn open(path: &str) -> Result<Self> {
        let options = DatasetOptions {
            open_flags: GdalOpenFlags::GDAL_OF_READONLY | GdalOpenFlags::GDAL_OF_VECTOR,
            ..Default::default()
        };

        let ds = Dataset::open_ex(path, options).map_err(|err| match err {
            GdalError::NullPointer { .. } if !Path::new(path).exists() => Error::IOError(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("{path}: No such file or directory"),
            )),
            _ => Error::Runtime(format!("Failed to open vector dataset: {path} ({err})")),
        })?;

        let layers = (0..ds.layer_count() as usize)
            .map(|index| {
                let mut layer = ds.layer(index)?;
                let name = layer.name();
                read_layer(&mut layer, &name)
            })
            .collect::<Result<Vec<_>>>()?;

        log::debug!("Opened {path} with {} layer(s)", layers.len());
        Ok(GdalVectorSource {
            dataset: Mutex::new(ds),
            description: path.to_string(),
            layers,
        })
    }

    fn dataset(&self) -> Result<MutexGuard<'_, Dataset>> {
        self.dataset
            .lock()
            .map_err(|_| Error::Runtime("GDAL dataset lock poisoned".into()))
    }
}

impl VectorSource for GdalVectorSource {
    fn description(&self) -> &str {
        &self.description
    }

    fn layer_count(&self) -> usize {
        self.layers.len()
    }

    fn layer(&self, index: usize) -> Option<&dyn Layer> {
        self.layers.get(index).map(|layer| layer as &dyn Layer)
    }

    fn layer_by_name(&self, name: &str) -> Option<&dyn Layer> {
        self.layers
            .iter()
            .find(|layer| layer.name() == name)
            .map(|layer| layer as &dyn Layer)
    }

    fn execute_sql(&self, sql: &str) -> Result<Box<dyn Layer>> {
        let ds = self.dataset()?;
        let mut result = ds
            .execute_sql(sql, None, Dialect::DEFAULT)?
            .ok_or_else(|| Error::Configuration(format!("SQL statement did not return a layer: {sql}")))?;

        Ok(Box::new(read_layer(&mut *result, "SELECT")?))
    }

    fn filter_layer(&self, layer: Option<&str>, where_clause: &str) -> Result<Box<dyn Layer>> {
        let ds = self.dataset()?;
        let mut ds_layer = match layer {
            Some(name) => ds.layer_by_name(name).map_err(|err| {
                log::debug!("{err}");
                Error::Configuration(format!("Cannot find layer {name} in {}", self.description))
            })?,
            None => ds.layer(0)?,
        };

        let name = ds_layer.name();
        ds_layer.set_attribute_filter(where_clause)?;
        let result = read_layer(&mut ds_layer, &name);
        ds_layer.clear_attribute_filter();

        Ok(Box::new(result?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const REGIONS: &str = r#"{
        "type": "FeatureCollection",
        "name": "regions",
        "crs": { "type": "name", "properties": { "name": "urn:ogc:def:crs:EPSG::31370" } },
        "features": [
            { "type": "Feature", "properties": { "id": 1, "name": "west" },
              "geometry": { "type": "Polygon", "coordinates": [[[0, 0], [10, 0], [10, 10], [0, 10], [0, 0]]] } },
            { "type": "Feature", "properties": { "id": 2, "name": "east" },
              "geometry": { "type": "Polygon", "coordinates": [[[20, 0], [30, 0], [30, 10], [20, 10], [20, 0]]] } }
        ]
    }"#;

    fn regions() -> Result<(tempfile::TempDir, GdalVectorSource)> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("regions.geojson");
        std::fs::write(&path, REGIONS)?;
        let source = GdalVectorSource::open(&path.to_string_lossy())?;
        Ok((dir, source))
    }

    #[test_log::test]
    fn read_layers() -> Result<()> {
        let (_dir, source) = regions()?;
        assert_eq!(source.layer_count(), 1);

        let layer = source.layer_by_name("regions").expect("regions layer");
        assert_eq!(layer.features().len(), 2);
        assert_eq!(layer.spatial_ref().and_then(|srs| srs.epsg()), Some(31370));
        assert_eq!(layer.features()[1].field("name"), Some(&FieldValue::String("east".into())));
        Ok(())
    }

    #[test_log::test]
    fn attribute_filter_is_evaluated_by_ogr() -> Result<()> {
        let (_dir, source) = regions()?;

        let filtered = source.filter_layer(None, "id > 1 AND name LIKE 'ea%'")?;
        assert_eq!(filtered.features().len(), 1);
        assert_eq!(filtered.features()[0].field("id"), Some(&FieldValue::Integer(2)));

        // the filter does not stick to the layer
        assert_eq!(source.filter_layer(Some("regions"), "1 = 1")?.features().len(), 2);
        assert!(source.filter_layer(Some("roads"), "id = 1").is_err());
        Ok(())
    }

    #[test_log::test]
    fn sql_is_evaluated_by_ogr() -> Result<()> {
        let (_dir, source) = regions()?;

        let result = source.execute_sql("SELECT * FROM regions WHERE id IN (1, 2) ORDER BY id DESC")?;
        assert_eq!(result.features().len(), 2);
        assert_eq!(result.features()[0].field("id"), Some(&FieldValue::Integer(2)));
        assert!(result.features()[0].geometry.is_some());

        assert!(source.execute_sql("SELECT * FROM roads").is_err());
        Ok(())
    }

    #[test_log::test]
    fn cutline_where_clause_through_ogr() -> Result<()> {
        use crate::warp::{CutlineSource, cutline::load_cutline};

        let (dir, _) = regions()?;
        let source = CutlineSource::Datasource {
            path: dir.path().join("regions.geojson").to_string_lossy().to_string(),
            layer: Some("regions".into()),
            where_clause: Some("name LIKE 'w%' OR id >= 10".into()),
            sql: None,
        };

        let cutline = load_cutline(&crate::gdal::GdalRegistry::new(), &source, None)?;
        assert_eq!(cutline.geometry.0.len(), 1);
        assert_eq!(cutline.srs.and_then(|srs| srs.epsg()), Some(31370));
        Ok(())
    }

    #[test]
    fn missing_vector_file() {
        assert!(matches!(GdalVectorSource::open("/nonexistent/cutline.shp"), Err(Error::IOError(_))));
    }
}
