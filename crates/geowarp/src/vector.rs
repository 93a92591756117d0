//! Vector feature access used to load cutlines.

use crate::{Result, SpatialReference};

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(untagged))]
pub enum FieldValue {
    Integer(i64),
    Real(f64),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Option<geo_types::Geometry<f64>>,
    pub fields: Vec<(String, FieldValue)>,
}

impl Feature {
    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(n, _)| n.eq_ignore_ascii_case(name)).map(|(_, v)| v)
    }
}

pub trait Layer {
    fn name(&self) -> &str;
    fn spatial_ref(&self) -> Option<&SpatialReference>;
    fn features(&self) -> &[Feature];
}

pub trait VectorSource {
    fn description(&self) -> &str;
    fn layer_count(&self) -> usize;
    fn layer(&self, index: usize) -> Option<&dyn Layer>;
    fn layer_by_name(&self, name: &str) -> Option<&dyn Layer>;

    /// Executes a query, the result is an independent layer
    fn execute_sql(&self, sql: &str) -> Result<Box<dyn Layer>>;

    /// Features of a layer matching an attribute filter, the first layer when `layer` is `None`
    fn filter_layer(&self, layer: Option<&str>, where_clause: &str) -> Result<Box<dyn Layer>>;
}
