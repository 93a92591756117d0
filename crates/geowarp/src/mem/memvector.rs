use crate::{
    Error, Result, SpatialReference,
    vector::{Feature, Layer, VectorSource},
};

use super::memquery::{AttributeFilter, SelectQuery};

#[derive(Debug, Clone, PartialEq)]
pub struct MemLayer {
    name: String,
    srs: Option<SpatialReference>,
    features: Vec<Feature>,
}

impl MemLayer {
    pub fn new(name: &str, srs: Option<SpatialReference>) -> Self {
        MemLayer {
            name: name.to_string(),
            srs,
            features: Vec::new(),
        }
    }

    pub fn add_feature(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// Adds a feature from WKT with the given attributes
    pub fn add_wkt(&mut self, wkt: &str, fields: Vec<(String, crate::vector::FieldValue)>) -> Result {
        use wkt::TryFromWkt;

        let geometry = geo_types::Geometry::<f64>::try_from_wkt_str(wkt).map_err(|err| Error::Wkt(err.to_string()))?;
        self.features.push(Feature {
            geometry: Some(geometry),
            fields,
        });
        Ok(())
    }
}

impl Layer for MemLayer {
    fn name(&self) -> &str {
        &self.name
    }

    fn spatial_ref(&self) -> Option<&SpatialReference> {
        self.srs.as_ref()
    }

    fn features(&self) -> &[Feature] {
        &self.features
    }
}

/// Vector datasource kept in memory
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MemVectorSource {
    description: String,
    layers: Vec<MemLayer>,
}

impl MemVectorSource {
    pub fn new(description: &str) -> Self {
        MemVectorSource {
            description: description.to_string(),
            layers: Vec::new(),
        }
    }

    pub fn add_layer(&mut self, layer: MemLayer) {
        self.layers.push(layer);
    }

    /// Loads a JSON document: `{"layers": [{"name": ..., "srs": ..., "features": [{"wkt": ..., "fields": {...}}]}]}`
    #[cfg(feature = "serde")]
    pub fn from_json_file(path: &std::path::Path) -> Result<Self> {
        let file = std::io::BufReader::new(std::fs::File::open(path)?);
        let document: json::VectorDocument = serde_json::from_reader(file)?;

        let mut source = MemVectorSource::new(&path.to_string_lossy());
        for layer in document.layers {
            let mut mem_layer = MemLayer::new(&layer.name, layer.srs);
            for feature in layer.features {
                match feature.wkt {
                    Some(wkt) => mem_layer.add_wkt(&wkt, feature.fields.into_iter().collect())?,
                    None => mem_layer.add_feature(Feature {
                        geometry: None,
                        fields: feature.fields.into_iter().collect(),
                    }),
                }
            }
            source.add_layer(mem_layer);
        }

        Ok(source)
    }
}

impl VectorSource for MemVectorSource {
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
            .find(|layer| layer.name.eq_ignore_ascii_case(name))
            .map(|layer| layer as &dyn Layer)
    }

    fn execute_sql(&self, sql: &str) -> Result<Box<dyn Layer>> {
        let query = SelectQuery::parse(sql)?;
        let layer = self
            .layers
            .iter()
            .find(|layer| layer.name.eq_ignore_ascii_case(&query.layer))
            .ok_or_else(|| Error::Configuration(format!("Layer {} not found in {}", query.layer, self.description)))?;

        let mut result = MemLayer::new("SELECT", layer.srs.clone());
        result.features = layer
            .features
            .iter()
            .filter(|feature| query.filter.as_ref().is_none_or(|filter| filter.matches(feature)))
            .cloned()
            .collect();
        Ok(Box::new(result))
    }

    fn filter_layer(&self, layer: Option<&str>, where_clause: &str) -> Result<Box<dyn Layer>> {
        let filter = AttributeFilter::parse(where_clause)?;
        let src = match layer {
            Some(name) => self.layer_by_name(name),
            None => self.layer(0),
        }
        .ok_or_else(|| Error::Configuration(format!("Cannot find layer {} in {}", layer.unwrap_or("(first layer)"), self.description)))?;

        let mut result = MemLayer::new(src.name(), src.spatial_ref().cloned());
        result.features = src.features().iter().filter(|feature| filter.matches(feature)).cloned().collect();
        Ok(Box::new(result))
    }
}

#[cfg(feature = "serde")]
mod json {
    use std::collections::BTreeMap;

    use crate::{SpatialReference, vector::FieldValue};

    #[derive(serde::Deserialize)]
    pub struct FeatureRecord {
        pub wkt: Option<String>,
        #[serde(default)]
        pub fields: BTreeMap<String, FieldValue>,
    }

    #[derive(serde::Deserialize)]
    pub struct LayerRecord {
        pub name: String,
        pub srs: Option<SpatialReference>,
        pub features: Vec<FeatureRecord>,
    }

    #[derive(serde::Deserialize)]
    pub struct VectorDocument {
        pub layers: Vec<LayerRecord>,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector::FieldValue;

    fn regions() -> Result<MemVectorSource> {
        let mut layer = MemLayer::new("regions", Some(SpatialReference::wgs84()));
        layer.add_wkt("POLYGON ((0 0, 1 0, 1 1, 0 1, 0 0))", vec![("id".into(), FieldValue::Integer(1))])?;
        layer.add_wkt("POLYGON ((2 2, 3 2, 3 3, 2 3, 2 2))", vec![("id".into(), FieldValue::Integer(2))])?;

        let mut source = MemVectorSource::new("regions.json");
        source.add_layer(layer);
        Ok(source)
    }

    #[test]
    fn select_layer_features() -> Result<()> {
        let source = regions()?;
        assert_eq!(source.layer_count(), 1);
        assert!(source.layer_by_name("REGIONS").is_some());
        assert!(source.layer_by_name("roads").is_none());

        let result = source.execute_sql("SELECT * FROM regions WHERE id = 2")?;
        assert_eq!(result.features().len(), 1);
        assert!(result.spatial_ref().is_some());
        assert!(source.execute_sql("SELECT * FROM roads").is_err());
        Ok(())
    }

    #[test]
    fn filter_layer_features() -> Result<()> {
        let source = regions()?;
        let filtered = source.filter_layer(None, "id <> 2")?;
        assert_eq!(filtered.name(), "regions");
        assert_eq!(filtered.features().len(), 1);
        assert_eq!(filtered.features()[0].field("id"), Some(&FieldValue::Integer(1)));

        assert_eq!(source.filter_layer(Some("REGIONS"), "id = 3")?.features().len(), 0);
        assert!(source.filter_layer(Some("roads"), "id = 1").is_err());
        Ok(())
    }

    #[cfg(feature = "serde")]
    #[test]
    fn load_json_document() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("cutline.json");
        std::fs::write(
            &path,
            r#"{"layers": [{"name": "cut", "srs": "EPSG:4326", "features": [{"wkt": "POLYGON ((0 0, 1 0, 1 1, 0 0))", "fields": {"name": "a"}}]}]}"#,
        )?;

        let source = MemVectorSource::from_json_file(&path)?;
        let layer = source.layer(0).expect("layer");
        assert_eq!(layer.name(), "cut");
        assert_eq!(layer.features().len(), 1);
        assert_eq!(layer.features()[0].field("name"), Some(&FieldValue::String("a".into())));
        Ok(())
    }
}
