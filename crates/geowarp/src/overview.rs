//! Overview level selection and a read-only dataset view on one overview level.

use crate::{
    Error, GeoTransform, NameValueList, RasterBand, RasterDataset, RasterSize, Result, SpatialReference,
    georef::{Gcp, GeolocationArrays},
    rpc::RpcModel,
};

/// Two decimation ratios closer than this are considered equal
const RATIO_TOLERANCE: f64 = 0.1;

/// Which overview level of the sources is used for the warp
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum OverviewPolicy {
    /// Overview level matching the target resolution
    #[default]
    Auto,
    /// `n` levels finer than the automatically selected one
    AutoMinus(usize),
    /// Always use the full resolution
    None,
    /// Fixed level (0 is the first overview), the coarsest available level is used if it does not exist
    Explicit(usize),
}

impl std::str::FromStr for OverviewPolicy {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "AUTO" => Ok(OverviewPolicy::Auto),
            "NONE" => Ok(OverviewPolicy::None),
            _ => {
                if let Some(n) = upper.strip_prefix("AUTO-") {
                    n.parse()
                        .map(OverviewPolicy::AutoMinus)
                        .map_err(|_| Error::Usage(format!("Invalid overview level: {s}")))
                } else {
                    s.parse()
                        .map(OverviewPolicy::Explicit)
                        .map_err(|_| Error::Usage(format!("Invalid overview level: {s}")))
                }
            }
        }
    }
}

/// Selects the overview level to read for a `target_ratio` (destination pixel size / source pixel size).
///
/// `overview_widths` are the widths of the available overviews from fine to coarse.
/// Returns `None` when the full resolution raster should be used.
pub fn select_overview_level(policy: OverviewPolicy, source_width: usize, overview_widths: &[usize], target_ratio: f64) -> Option<usize> {
    if overview_widths.is_empty() {
        return None;
    }

    match policy {
        OverviewPolicy::None => None,
        OverviewPolicy::Explicit(level) => Some(level.min(overview_widths.len() - 1)),
        OverviewPolicy::Auto | OverviewPolicy::AutoMinus(_) => {
            if target_ratio <= 1.0 {
                return None;
            }

            let ratio = |level: isize| -> f64 {
                if level < 0 {
                    1.0
                } else {
                    source_width as f64 / overview_widths[level as usize] as f64
                }
            };

            let count = overview_widths.len() as isize;
            let mut level = -1;
            while level < count - 1 {
                let current = ratio(level);
                let next = ratio(level + 1);
                if current < target_ratio && next > target_ratio {
                    break;
                }
                if (current - target_ratio).abs() < RATIO_TOLERANCE {
                    break;
                }
                level += 1;
            }

            if let OverviewPolicy::AutoMinus(n) = policy {
                level -= n as isize;
            }

            (level >= 0).then_some(level as usize)
        }
    }
}

/// Read-only view of a dataset at one of its overview levels
pub struct OverviewDataset<'a> {
    base: &'a dyn RasterDataset,
    level: usize,
    size: RasterSize,
    geo_transform: Option<GeoTransform>,
    gcps: Vec<Gcp>,
    rpc: Option<RpcModel>,
    geolocation: Option<GeolocationArrays>,
}

impl<'a> OverviewDataset<'a> {
    pub fn new(base: &'a dyn RasterDataset, level: usize) -> Result<Self> {
        let size = base
            .band(1)?
            .overview(level)
            .ok_or_else(|| Error::Configuration(format!("Overview level {level} does not exist")))?
            .size();
        if size.is_empty() {
            return Err(Error::Configuration(format!("Overview level {level} is empty")));
        }

        let base_size = base.raster_size();
        let factor_x = base_size.cols as f64 / size.cols as f64;
        let factor_y = base_size.rows as f64 / size.rows as f64;

        Ok(OverviewDataset {
            base,
            level,
            size,
            geo_transform: base.geo_transform().map(|gt| gt.scaled(factor_x, factor_y)),
            gcps: base
                .gcps()
                .iter()
                .map(|gcp| Gcp {
                    pixel: gcp.pixel / factor_x,
                    line: gcp.line / factor_y,
                    ..*gcp
                })
                .collect(),
            rpc: base.rpc().map(|rpc| rpc.scaled(factor_x, factor_y)),
            geolocation: base.geolocation().map(|geoloc| geoloc.scaled(factor_x, factor_y)),
        })
    }

    pub fn level(&self) -> usize {
        self.level
    }
}

impl RasterDataset for OverviewDataset<'_> {
    fn description(&self) -> &str {
        self.base.description()
    }

    fn driver_name(&self) -> &str {
        self.base.driver_name()
    }

    fn raster_size(&self) -> RasterSize {
        self.size
    }

    fn band_count(&self) -> usize {
        self.base.band_count()
    }

    fn band(&self, index: usize) -> Result<&dyn RasterBand> {
        self.base
            .band(index)?
            .overview(self.level)
            .ok_or_else(|| Error::Configuration(format!("Band {index} has no overview level {}", self.level)))
    }

    fn band_mut(&mut self, _index: usize) -> Result<&mut dyn RasterBand> {
        Err(Error::Runtime("Overview views are read-only".into()))
    }

    fn geo_transform(&self) -> Option<GeoTransform> {
        self.geo_transform
    }

    fn spatial_ref(&self) -> Option<&SpatialReference> {
        self.base.spatial_ref()
    }

    fn metadata(&self) -> &NameValueList {
        self.base.metadata()
    }

    fn gcps(&self) -> &[Gcp] {
        &self.gcps
    }

    fn gcp_spatial_ref(&self) -> Option<&SpatialReference> {
        self.base.gcp_spatial_ref()
    }

    fn rpc(&self) -> Option<&RpcModel> {
        self.rpc.as_ref()
    }

    fn geolocation(&self) -> Option<&GeolocationArrays> {
        self.geolocation.as_ref()
    }

    fn overview_count(&self) -> usize {
        0
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::testutils;

    const WIDTHS: [usize; 3] = [500, 250, 125];

    #[test]
    fn auto_selection() {
        assert_eq!(select_overview_level(OverviewPolicy::Auto, 1000, &WIDTHS, 1.0), None);
        assert_eq!(select_overview_level(OverviewPolicy::Auto, 1000, &WIDTHS, 1.5), None);
        assert_eq!(select_overview_level(OverviewPolicy::Auto, 1000, &WIDTHS, 2.0), Some(0));
        assert_eq!(select_overview_level(OverviewPolicy::Auto, 1000, &WIDTHS, 2.05), Some(0));
        assert_eq!(select_overview_level(OverviewPolicy::Auto, 1000, &WIDTHS, 3.0), Some(0));
        assert_eq!(select_overview_level(OverviewPolicy::Auto, 1000, &WIDTHS, 4.0), Some(1));
        assert_eq!(select_overview_level(OverviewPolicy::Auto, 1000, &WIDTHS, 100.0), Some(2));
        assert_eq!(select_overview_level(OverviewPolicy::Auto, 1000, &[], 100.0), None);
    }

    #[test]
    fn shifted_and_explicit_selection() {
        assert_eq!(select_overview_level(OverviewPolicy::AutoMinus(1), 1000, &WIDTHS, 4.0), Some(0));
        assert_eq!(select_overview_level(OverviewPolicy::AutoMinus(2), 1000, &WIDTHS, 4.0), None);
        assert_eq!(select_overview_level(OverviewPolicy::None, 1000, &WIDTHS, 4.0), None);
        assert_eq!(select_overview_level(OverviewPolicy::Explicit(1), 1000, &WIDTHS, 1.0), Some(1));
        assert_eq!(select_overview_level(OverviewPolicy::Explicit(7), 1000, &WIDTHS, 1.0), Some(2));
    }

    #[test]
    fn parse_policy() -> Result<()> {
        assert_eq!("auto".parse::<OverviewPolicy>()?, OverviewPolicy::Auto);
        assert_eq!("AUTO-2".parse::<OverviewPolicy>()?, OverviewPolicy::AutoMinus(2));
        assert_eq!("NONE".parse::<OverviewPolicy>()?, OverviewPolicy::None);
        assert_eq!("1".parse::<OverviewPolicy>()?, OverviewPolicy::Explicit(1));
        assert!("AUTO-x".parse::<OverviewPolicy>().is_err());
        Ok(())
    }

    #[test]
    fn overview_view_scales_georeferencing() -> Result<()> {
        let mut ds = testutils::geographic_raster("src.tif", 100, 80, [0.0, 0.1, 0.0, 50.0, 0.0, -0.1]);
        ds.build_overviews(&[2, 4])?;

        let view = OverviewDataset::new(&ds, 1)?;
        assert_eq!(view.raster_size(), RasterSize::with_rows_cols(20, 25));
        assert_relative_eq!(view.geo_transform().expect("georeferenced"), GeoTransform::new([0.0, 0.4, 0.0, 50.0, 0.0, -0.4]));
        assert_eq!(view.band(1)?.size(), RasterSize::with_rows_cols(20, 25));
        assert!(OverviewDataset::new(&ds, 2).is_err());
        Ok(())
    }
}
