//! Spatial reference model.
//!
//! Definitions are resolved through the EPSG database of `crs-definitions` and parsed by proj4rs. On top of the projection
//! the warp decision logic needs: geographic or projected, mercator derived projections, the presence of a vertical
//! axis (compound or 3D CRS) and the linear units of the axes.

use std::str::FromStr;

use proj4rs::Proj;

use crate::{Error, Result};

/// Linear unit of an axis
#[derive(Debug, Clone, PartialEq)]
pub struct LinearUnit {
    pub name: String,
    pub to_meter: f64,
}

impl LinearUnit {
    pub fn metre() -> Self {
        LinearUnit {
            name: "metre".into(),
            to_meter: 1.0,
        }
    }

    pub fn foot() -> Self {
        LinearUnit {
            name: "foot".into(),
            to_meter: 0.3048,
        }
    }

    pub fn us_survey_foot() -> Self {
        LinearUnit {
            name: "US survey foot".into(),
            to_meter: 12.0 / 39.37,
        }
    }

    /// Recognizes unit names as they appear in band unit types and PROJ strings
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "m" | "meter" | "metre" | "meters" | "metres" => Some(Self::metre()),
            "ft" | "foot" | "feet" | "international foot" => Some(Self::foot()),
            "us-ft" | "us survey foot" | "ftus" | "us_survey_foot" => Some(Self::us_survey_foot()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    /// Spherical mercator on the WGS84 semi major axis (EPSG:3857)
    WebMercator,
    /// Ellipsoidal mercator on WGS84 (EPSG:3395)
    Mercator,
    /// Any other projection, named after its PROJ identifier
    Other(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum HorizontalCrs {
    Geographic { datum: String },
    Projected { projection: Projection, unit: LinearUnit },
}

#[derive(Debug, Clone, PartialEq)]
pub struct VerticalCrs {
    pub name: String,
    pub epsg: Option<u32>,
    pub unit: LinearUnit,
}

/// 3D geographic CRSs and their 2D counterpart, the EPSG database only covers the latter
const GEOGRAPHIC_3D: [(u32, u32); 2] = [(4979, 4326), (4937, 4258)];

/// Legacy alias codes
const EPSG_ALIASES: [(u32, u32); 1] = [(900913, 3857)];

/// Serialized as its definition string
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(try_from = "String", into = "String"))]
pub struct SpatialReference {
    definition: String,
    name: String,
    epsg: Option<u32>,
    horizontal: HorizontalCrs,
    vertical: Option<VerticalCrs>,
    ellipsoidal_height: bool,
    proj_string: String,
    proj: Proj,
}

impl SpatialReference {
    /// Parses `EPSG:<code>`, `EPSG:<horizontal>+<vertical>`, `WGS84`, `CRS84` or a PROJ string
    pub fn from_definition(def: &str) -> Result<Self> {
        let trimmed = def.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidSrs("Empty spatial reference definition".into()));
        }

        let upper = trimmed.to_ascii_uppercase();
        let mut srs = if upper == "WGS84" || upper == "CRS84" || upper == "OGC:CRS84" {
            Self::from_epsg(4326)?
        } else if let Some(codes) = upper.strip_prefix("EPSG:") {
            match codes.split_once('+') {
                Some((horizontal, vertical)) => Self::compound(parse_code(horizontal)?, parse_code(vertical)?)?,
                None => Self::from_epsg(parse_code(codes)?)?,
            }
        } else if trimmed.starts_with('+') {
            Self::from_proj_string(trimmed)?
        } else {
            return Err(Error::InvalidSrs(format!("Unsupported spatial reference definition: '{trimmed}'")));
        };

        srs.definition = trimmed.to_string();
        Ok(srs)
    }

    pub fn from_epsg(code: u32) -> Result<Self> {
        if let Some((_, code_2d)) = GEOGRAPHIC_3D.iter().find(|(code_3d, _)| *code_3d == code) {
            let mut srs = Self::from_epsg(*code_2d)?;
            srs.name = format!("{} (3D)", srs.name);
            srs.definition = format!("EPSG:{code}");
            srs.epsg = Some(code);
            srs.ellipsoidal_height = true;
            return Ok(srs);
        }

        let database_code = EPSG_ALIASES
            .iter()
            .find(|(alias, _)| *alias == code)
            .map_or(code, |(_, target)| *target);

        let def = u16::try_from(database_code)
            .ok()
            .and_then(crs_definitions::from_code)
            .ok_or_else(|| Error::InvalidSrs(format!("Unknown EPSG code {code}")))?;

        let mut srs = Self::from_proj_string(def.proj4)?;
        srs.definition = format!("EPSG:{code}");
        if let Some(name) = wkt_name(def.wkt) {
            srs.name = name;
        }
        srs.epsg = Some(code);
        Ok(srs)
    }

    /// Compound CRS of a horizontal CRS and a vertical datum
    pub fn compound(horizontal: u32, vertical: u32) -> Result<Self> {
        let mut srs = Self::from_epsg(horizontal)?;
        if srs.ellipsoidal_height {
            return Err(Error::InvalidSrs(format!(
                "EPSG:{horizontal} is already a 3D CRS and cannot be combined with a vertical CRS"
            )));
        }

        let vertical = vertical_crs(vertical)?;
        srs.name = format!("{} + {}", srs.name, vertical.name);
        srs.definition = format!("EPSG:{horizontal}+{}", vertical.epsg.unwrap_or_default());
        srs.vertical = Some(vertical);
        Ok(srs)
    }

    pub fn from_proj_string(proj_string: &str) -> Result<Self> {
        let proj = Proj::from_proj_string(proj_string).map_err(|err| Error::InvalidSrs(format!("{proj_string}: {err:?}")))?;

        let params = parse_proj_params(proj_string);
        let param = |key: &str| params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str());
        let num = |key: &str| param(key).and_then(|v| v.parse::<f64>().ok());

        let horizontal = if proj.is_latlong() {
            geographic(param("datum").or(param("ellps")).unwrap_or("unknown"))
        } else {
            let unit = LinearUnit::from_name(proj.units()).unwrap_or_else(|| LinearUnit {
                name: proj.units().to_string(),
                to_meter: proj.to_meter(),
            });

            let is_default = |key: &str, default: f64| num(key).is_none_or(|v| v == default);
            let plain_mercator = proj.projname() == "merc"
                && is_default("lon_0", 0.0)
                && is_default("x_0", 0.0)
                && is_default("y_0", 0.0)
                && is_default("k", 1.0);

            let projection = if plain_mercator {
                let spherical = num("R") == Some(6378137.0) || (num("a") == Some(6378137.0) && num("b") == Some(6378137.0));
                let wgs84 = param("datum") == Some("WGS84") || param("ellps") == Some("WGS84");
                if spherical {
                    Projection::WebMercator
                } else if wgs84 && is_default("lat_ts", 0.0) {
                    Projection::Mercator
                } else {
                    Projection::Other(proj.projname().to_string())
                }
            } else {
                Projection::Other(proj.projname().to_string())
            };

            projected(projection, unit)
        };

        let vertical = param("vunits")
            .map(|name| {
                LinearUnit::from_name(name)
                    .map(|unit| VerticalCrs {
                        name: format!("height ({name})"),
                        epsg: None,
                        unit,
                    })
                    .ok_or_else(|| Error::InvalidSrs(format!("Unsupported vertical unit '{name}'")))
            })
            .transpose()?;

        Ok(SpatialReference {
            definition: proj_string.to_string(),
            name: proj.projname().to_string(),
            epsg: None,
            horizontal,
            vertical,
            ellipsoidal_height: false,
            proj_string: proj_string.to_string(),
            proj,
        })
    }

    pub fn wgs84() -> Self {
        Self::from_epsg(4326).unwrap_or_else(|_| unreachable!("EPSG:4326 is part of the EPSG database"))
    }

    pub fn web_mercator() -> Self {
        Self::from_epsg(3857).unwrap_or_else(|_| unreachable!("EPSG:3857 is part of the EPSG database"))
    }

    /// The definition this reference was created from
    pub fn definition(&self) -> &str {
        &self.definition
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn epsg(&self) -> Option<u32> {
        self.epsg
    }

    pub fn horizontal(&self) -> &HorizontalCrs {
        &self.horizontal
    }

    pub fn vertical(&self) -> Option<&VerticalCrs> {
        self.vertical.as_ref()
    }

    pub fn proj_string(&self) -> &str {
        &self.proj_string
    }

    pub(crate) fn proj(&self) -> &Proj {
        &self.proj
    }

    pub fn is_geographic(&self) -> bool {
        matches!(self.horizontal, HorizontalCrs::Geographic { .. })
    }

    pub fn is_projected(&self) -> bool {
        matches!(self.horizontal, HorizontalCrs::Projected { .. })
    }

    pub fn is_mercator_derived(&self) -> bool {
        matches!(
            &self.horizontal,
            HorizontalCrs::Projected {
                projection: Projection::WebMercator | Projection::Mercator,
                ..
            }
        ) || matches!(&self.horizontal, HorizontalCrs::Projected { projection: Projection::Other(name), .. } if name == "merc")
    }

    pub fn is_compound(&self) -> bool {
        self.vertical.is_some()
    }

    /// Geographic or projected CRS with an ellipsoidal height axis
    pub fn is_3d(&self) -> bool {
        self.ellipsoidal_height
    }

    pub fn has_vertical_axis(&self) -> bool {
        self.is_compound() || self.is_3d()
    }

    /// Unit of the vertical axis, if any
    pub fn vertical_unit(&self) -> Option<LinearUnit> {
        match &self.vertical {
            Some(vertical) => Some(vertical.unit.clone()),
            None if self.ellipsoidal_height => Some(LinearUnit::metre()),
            None => None,
        }
    }

    /// Same horizontal and vertical definition
    pub fn is_same(&self, other: &SpatialReference) -> bool {
        self.is_same_horizontal_definition(other) && self.vertical == other.vertical && self.ellipsoidal_height == other.ellipsoidal_height
    }

    fn is_same_horizontal_definition(&self, other: &SpatialReference) -> bool {
        match (self.horizontal_epsg(), other.horizontal_epsg()) {
            (Some(a), Some(b)) => a == b,
            _ => self.horizontal == other.horizontal && self.proj_string == other.proj_string,
        }
    }

    /// Same horizontal component, ignoring vertical axes
    pub fn is_same_horizontal(&self, other: &SpatialReference) -> bool {
        self.is_same_horizontal_definition(other) || (self.is_geographic() && self.horizontal == other.horizontal)
    }

    /// EPSG code of the horizontal component, aliases and 3D codes resolved
    fn horizontal_epsg(&self) -> Option<u32> {
        let code = self.epsg?;
        let code = EPSG_ALIASES.iter().find(|(alias, _)| *alias == code).map_or(code, |(_, target)| *target);
        Some(GEOGRAPHIC_3D.iter().find(|(code_3d, _)| *code_3d == code).map_or(code, |(_, code_2d)| *code_2d))
    }
}

impl PartialEq for SpatialReference {
    fn eq(&self, other: &Self) -> bool {
        self.is_same(other)
    }
}

impl FromStr for SpatialReference {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_definition(s)
    }
}

impl TryFrom<String> for SpatialReference {
    type Error = Error;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::from_definition(&value)
    }
}

impl From<SpatialReference> for String {
    fn from(srs: SpatialReference) -> Self {
        srs.definition
    }
}

impl std::fmt::Display for SpatialReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.definition)
    }
}

/// Name of the root node of a WKT definition
fn wkt_name(wkt: &str) -> Option<String> {
    let start = wkt.find("[\"")? + 2;
    let len = wkt[start..].find('"')?;
    Some(wkt[start..start + len].to_string())
}

fn geographic(datum: &str) -> HorizontalCrs {
    HorizontalCrs::Geographic { datum: datum.to_string() }
}

fn projected(projection: Projection, unit: LinearUnit) -> HorizontalCrs {
    HorizontalCrs::Projected { projection, unit }
}

fn parse_code(code: &str) -> Result<u32> {
    code.trim()
        .parse::<u32>()
        .map_err(|_| Error::InvalidSrs(format!("Invalid EPSG code '{code}'")))
}

/// Vertical datums, the EPSG database only holds horizontal definitions
fn vertical_crs(code: u32) -> Result<VerticalCrs> {
    let (name, unit) = match code {
        5773 => ("EGM96 height", LinearUnit::metre()),
        3855 => ("EGM2008 height", LinearUnit::metre()),
        5703 => ("NAVD88 height", LinearUnit::metre()),
        6360 => ("NAVD88 height (ftUS)", LinearUnit::us_survey_foot()),
        8228 => ("NAVD88 height (ft)", LinearUnit::foot()),
        5709 => ("NAP height", LinearUnit::metre()),
        5710 => ("Ostend height", LinearUnit::metre()),
        _ => return Err(Error::InvalidSrs(format!("Unknown vertical CRS EPSG:{code}"))),
    };

    Ok(VerticalCrs {
        name: name.to_string(),
        epsg: Some(code),
        unit,
    })
}

fn parse_proj_params(proj: &str) -> Vec<(String, String)> {
    proj.split_whitespace()
        .filter_map(|token| token.strip_prefix('+'))
        .map(|token| match token.split_once('=') {
            Some((key, value)) => (key.to_string(), value.to_string()),
            None => (token.to_string(), String::new()),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn parse_epsg() -> Result<()> {
        let srs = SpatialReference::from_definition("EPSG:4326")?;
        assert!(srs.is_geographic());
        assert!(!srs.has_vertical_axis());

        let merc = SpatialReference::from_definition("epsg:3857")?;
        assert!(merc.is_projected());
        assert!(merc.is_mercator_derived());
        assert!(merc.is_same(&SpatialReference::from_epsg(900913)?));
        assert!(!merc.is_same(&srs));
        Ok(())
    }

    #[test]
    fn epsg_database_lookup() -> Result<()> {
        let lambert = SpatialReference::from_epsg(31370)?;
        assert_eq!(lambert.name(), "Belge 1972 / Belgian Lambert 72");
        assert!(lambert.is_projected());
        assert!(!lambert.is_mercator_derived());

        let world_mercator = SpatialReference::from_epsg(3395)?;
        assert_eq!(
            world_mercator.horizontal(),
            &projected(Projection::Mercator, LinearUnit::metre())
        );

        let long_island = SpatialReference::from_epsg(2263)?;
        assert!(matches!(long_island.horizontal(), HorizontalCrs::Projected { unit, .. } if unit == &LinearUnit::us_survey_foot()));

        assert!(SpatialReference::from_epsg(99999).is_err());
        Ok(())
    }

    #[test]
    fn parse_compound() -> Result<()> {
        let srs = SpatialReference::from_definition("EPSG:32631+6360")?;
        assert!(srs.is_compound());
        assert!(srs.has_vertical_axis());
        assert_relative_eq!(srs.vertical_unit().expect("vertical unit").to_meter, 12.0 / 39.37);
        assert!(!srs.is_same(&SpatialReference::from_epsg(32631)?));
        assert!(srs.is_same_horizontal(&SpatialReference::from_epsg(32631)?));

        assert!(SpatialReference::from_definition("EPSG:4979+5773").is_err());
        Ok(())
    }

    #[test]
    fn parse_3d_geographic() -> Result<()> {
        let srs = SpatialReference::from_definition("EPSG:4979")?;
        assert!(srs.is_3d());
        assert!(srs.has_vertical_axis());
        assert!(!srs.is_same(&SpatialReference::wgs84()));
        Ok(())
    }

    #[test]
    fn parse_proj_strings() -> Result<()> {
        let srs = SpatialReference::from_definition("+proj=longlat +datum=WGS84 +no_defs")?;
        assert!(srs.is_geographic());

        let merc = SpatialReference::from_definition("+proj=merc +a=6378137 +b=6378137 +units=m")?;
        assert_eq!(merc.horizontal(), &projected(Projection::WebMercator, LinearUnit::metre()));

        let utm_ft = SpatialReference::from_definition("+proj=utm +zone=31 +datum=WGS84 +units=ft")?;
        assert!(utm_ft.is_projected());
        assert!(!utm_ft.is_mercator_derived());
        Ok(())
    }

    #[test]
    fn invalid_definitions() {
        assert!(SpatialReference::from_definition("").is_err());
        assert!(SpatialReference::from_definition("EPSG:abc").is_err());
        assert!(SpatialReference::from_definition("not a crs").is_err());
        assert!(SpatialReference::from_definition("EPSG:4326+9999").is_err());
    }

    #[test]
    fn unit_names() {
        assert_eq!(LinearUnit::from_name("m"), Some(LinearUnit::metre()));
        assert_eq!(LinearUnit::from_name("US survey foot"), Some(LinearUnit::us_survey_foot()));
        assert_eq!(LinearUnit::from_name("ft"), Some(LinearUnit::foot()));
        assert_eq!(LinearUnit::from_name("furlong"), None);
    }
}
