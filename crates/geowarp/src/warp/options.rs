use std::str::FromStr;

use crate::{DataType, Error, NameValueList, Rect, Result, SpatialReference, overview::OverviewPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ResampleAlg {
    #[default]
    NearestNeighbour,
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
    Rms,
    Mode,
    Max,
    Min,
    Median,
    Q1,
    Q3,
    Sum,
}

impl ResampleAlg {
    const ALL: [ResampleAlg; 14] = [
        ResampleAlg::NearestNeighbour,
        ResampleAlg::Bilinear,
        ResampleAlg::Cubic,
        ResampleAlg::CubicSpline,
        ResampleAlg::Lanczos,
        ResampleAlg::Average,
        ResampleAlg::Rms,
        ResampleAlg::Mode,
        ResampleAlg::Max,
        ResampleAlg::Min,
        ResampleAlg::Median,
        ResampleAlg::Q1,
        ResampleAlg::Q3,
        ResampleAlg::Sum,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ResampleAlg::NearestNeighbour => "near",
            ResampleAlg::Bilinear => "bilinear",
            ResampleAlg::Cubic => "cubic",
            ResampleAlg::CubicSpline => "cubicspline",
            ResampleAlg::Lanczos => "lanczos",
            ResampleAlg::Average => "average",
            ResampleAlg::Rms => "rms",
            ResampleAlg::Mode => "mode",
            ResampleAlg::Max => "max",
            ResampleAlg::Min => "min",
            ResampleAlg::Median => "med",
            ResampleAlg::Q1 => "q1",
            ResampleAlg::Q3 => "q3",
            ResampleAlg::Sum => "sum",
        }
    }

    /// Algorithms that only ever produce values present in the source, so categorical lookup tables stay meaningful
    pub fn preserves_categories(&self) -> bool {
        matches!(self, ResampleAlg::NearestNeighbour | ResampleAlg::Mode)
    }
}

impl FromStr for ResampleAlg {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let lower = s.to_ascii_lowercase();
        match lower.as_str() {
            "nearest" => Ok(ResampleAlg::NearestNeighbour),
            "median" => Ok(ResampleAlg::Median),
            _ => Self::ALL
                .into_iter()
                .find(|alg| alg.name() == lower)
                .ok_or_else(|| Error::Usage(format!("Unknown resampling method: {s}"))),
        }
    }
}

impl std::fmt::Display for ResampleAlg {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Handling of an alpha band in the sources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AlphaPolicy {
    /// The last band is used as alpha band when its color interpretation is alpha
    #[default]
    Auto,
    /// The last band is used as alpha band
    Force,
    /// The last band is warped as a regular band
    Disable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VerticalShiftPolicy {
    /// Applied when the source and target spatial references imply a vertical datum or unit change
    #[default]
    Auto,
    Force,
    Disable,
}

/// Explicit nodata values (`-srcnodata`, `-dstnodata`), one per band, the last value is repeated for remaining bands
#[derive(Debug, Clone, PartialEq)]
pub enum NodataSpec {
    /// No nodata at all, even when the sources define one
    None,
    Values(Vec<f64>),
}

impl NodataSpec {
    /// Value for the given zero based band position, `None` when nodata is disabled
    pub fn value(&self, band_position: usize) -> Option<f64> {
        match self {
            NodataSpec::None => None,
            NodataSpec::Values(values) => values.get(band_position).or(values.last()).copied(),
        }
    }
}

impl FromStr for NodataSpec {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("none") {
            return Ok(NodataSpec::None);
        }

        let values = s
            .split([' ', ','])
            .filter(|v| !v.is_empty())
            .map(|v| {
                if v.eq_ignore_ascii_case("nan") {
                    Ok(f64::NAN)
                } else {
                    v.parse::<f64>().map_err(|_| Error::Usage(format!("Invalid nodata value: {v}")))
                }
            })
            .collect::<Result<Vec<f64>>>()?;

        if values.is_empty() {
            return Err(Error::Usage("Empty nodata value list".into()));
        }

        Ok(NodataSpec::Values(values))
    }
}

/// Where the cutline polygons come from
#[derive(Debug, Clone, PartialEq)]
pub enum CutlineSource {
    /// Literal `POLYGON` or `MULTIPOLYGON` WKT
    Wkt(String),
    Datasource {
        path: String,
        /// Layer name (`-cl`), the first layer when unset
        layer: Option<String>,
        /// Attribute filter (`-cwhere`)
        where_clause: Option<String>,
        /// Query selecting the cutline features (`-csql`)
        sql: Option<String>,
    },
}

/// The user request, immutable once built. Values derived during the warp end up in [`super::ResolvedPlan`].
#[derive(Debug, Clone, bon::Builder)]
pub struct WarpRequest {
    /// Output extent in the target SRS (or in `target_extent_srs`)
    pub target_extent: Option<Rect<f64>>,
    pub target_extent_srs: Option<SpatialReference>,
    /// Output resolution (x, y), both positive
    pub target_resolution: Option<(f64, f64)>,
    #[builder(default)]
    pub target_aligned_pixels: bool,
    /// Output size in (columns, rows), 0 for one of them keeps square pixels
    pub target_size: Option<(usize, usize)>,
    pub source_srs: Option<SpatialReference>,
    pub target_srs: Option<SpatialReference>,
    /// Explicit coordinate operation from the source to the target SRS
    #[builder(into)]
    pub coordinate_operation: Option<String>,
    #[builder(default)]
    pub resample: ResampleAlg,
    /// Maximum error in pixels of the approximated transformer, 0 uses the exact transformer
    #[builder(default = 0.125)]
    pub error_threshold: f64,
    pub src_nodata: Option<NodataSpec>,
    pub dst_nodata: Option<NodataSpec>,
    #[builder(default)]
    pub src_alpha: AlphaPolicy,
    #[builder(default)]
    pub dst_alpha: bool,
    /// One based source bands to warp, all bands when empty
    #[builder(default)]
    pub src_bands: Vec<usize>,
    /// One based destination bands receiving `src_bands`
    #[builder(default)]
    pub dst_bands: Vec<usize>,
    pub cutline: Option<CutlineSource>,
    pub cutline_srs: Option<SpatialReference>,
    pub cutline_blend_distance: Option<f64>,
    #[builder(default)]
    pub crop_to_cutline: bool,
    /// Transformer options (`-to`)
    #[builder(default)]
    pub transformer_options: NameValueList,
    /// Warp options (`-wo`)
    #[builder(default)]
    pub warp_options: NameValueList,
    #[builder(default)]
    pub overview: OverviewPolicy,
    #[builder(default)]
    pub vertical_shift: VerticalShiftPolicy,
    /// Use the multi threaded warp entry point
    #[builder(default)]
    pub multi: bool,
    #[builder(into)]
    pub format: Option<String>,
    pub output_type: Option<DataType>,
    #[builder(default)]
    pub creation_options: NameValueList,
    #[builder(default)]
    pub overwrite: bool,
    /// Copy the source metadata to the destination
    #[builder(default = true)]
    pub copy_metadata: bool,
    /// Value for metadata items that differ between the sources
    #[builder(default = String::from("*"), into)]
    pub metadata_conflict_value: String,
    /// Warp memory limit, in MB when below 10000, otherwise in bytes
    pub warp_memory: Option<f64>,
}

impl WarpRequest {
    pub fn has_creation_flags(&self) -> bool {
        self.target_extent.is_some()
            || self.target_resolution.is_some()
            || self.target_size.is_some()
            || self.target_aligned_pixels
            || self.format.is_some()
            || self.output_type.is_some()
            || !self.creation_options.is_empty()
    }

    /// Structural checks, done before any dataset is opened
    pub fn validate(&self) -> Result {
        let usage = |msg: &str| Err(Error::Usage(msg.to_string()));

        if let Some(extent) = &self.target_extent {
            if !extent.is_finite() || extent.min_x() >= extent.max_x() || extent.min_y() >= extent.max_y() {
                return usage("Invalid -te: min values must be smaller than max values");
            }
        }

        if self.target_extent_srs.is_some() && self.target_extent.is_none() {
            return usage("-te_srs ignored since -te is not specified");
        }

        if let Some((x_res, y_res)) = self.target_resolution {
            if !(x_res.is_finite() && y_res.is_finite()) || x_res <= 0.0 || y_res <= 0.0 {
                return usage("Wrong value for -tr parameters");
            }
        }

        if let Some((cols, rows)) = self.target_size {
            if cols == 0 && rows == 0 {
                return usage("-ts 0 0 is invalid");
            }
        }

        if let (Some(res), Some(size)) = (self.target_resolution, self.target_size) {
            let Some(extent) = &self.target_extent else {
                return usage("-tr and -ts options cannot be used at the same time without -te");
            };
            check_resolution_consistency(extent, res, size)?;
        }

        if self.target_aligned_pixels && self.target_resolution.is_none() {
            return usage("-tap option cannot be used without using -tr");
        }

        if !self.dst_bands.is_empty() && self.dst_bands.len() != self.src_bands.len() {
            return usage("-dstband should be used as many times as -b");
        }

        if self.src_bands.iter().chain(&self.dst_bands).any(|b| *b == 0) {
            return usage("Band numbers start at 1");
        }

        if self.error_threshold < 0.0 || !self.error_threshold.is_finite() {
            return usage("Invalid error threshold");
        }

        match &self.cutline {
            Some(CutlineSource::Datasource {
                where_clause: Some(_),
                sql: Some(_),
                ..
            }) => return usage("-cwhere and -csql are mutually exclusive"),
            None if self.crop_to_cutline => return usage("-crop_to_cutline requires -cutline"),
            None if self.cutline_srs.is_some() => return usage("-cutline_srs requires -cutline"),
            _ => {}
        }

        if let Some(blend) = self.cutline_blend_distance {
            if blend < 0.0 {
                return usage("Cutline blend distance must be positive");
            }
        }

        Ok(())
    }
}

/// Target size and resolution are only accepted together when they agree with the extent
pub fn check_resolution_consistency(extent: &Rect<f64>, (x_res, y_res): (f64, f64), (cols, rows): (usize, usize)) -> Result {
    let consistent = |span: f64, res: f64, count: usize| count == 0 || ((span / res) - count as f64).abs() <= 1e-8 * count as f64;

    if !consistent(extent.width(), x_res, cols) || !consistent(extent.height(), y_res, rows) {
        return Err(Error::Usage(format!(
            "-tr {x_res} {y_res} is inconsistent with -ts {cols} {rows} for the requested extent"
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resample_names() -> Result<()> {
        assert_eq!("near".parse::<ResampleAlg>()?, ResampleAlg::NearestNeighbour);
        assert_eq!("Bilinear".parse::<ResampleAlg>()?, ResampleAlg::Bilinear);
        assert_eq!("median".parse::<ResampleAlg>()?, ResampleAlg::Median);
        assert!(matches!("bicubic".parse::<ResampleAlg>(), Err(Error::Usage(_))));
        assert!(ResampleAlg::Mode.preserves_categories());
        assert!(!ResampleAlg::Cubic.preserves_categories());
        Ok(())
    }

    #[test]
    fn nodata_spec() -> Result<()> {
        let spec: NodataSpec = "0 255".parse()?;
        assert_eq!(spec.value(0), Some(0.0));
        assert_eq!(spec.value(1), Some(255.0));
        assert_eq!(spec.value(5), Some(255.0));
        assert_eq!("None".parse::<NodataSpec>()?.value(0), None);
        assert!("nan".parse::<NodataSpec>()?.value(0).is_some_and(f64::is_nan));
        assert!("abc".parse::<NodataSpec>().is_err());
        Ok(())
    }

    #[test]
    fn consistent_resolution_and_size() -> Result<()> {
        let extent = Rect::from_bounds(0.0, 0.0, 100.0, 50.0);
        let request = WarpRequest::builder()
            .target_extent(extent)
            .target_resolution((10.0, 10.0))
            .target_size((10, 5))
            .build();
        request.validate()?;

        let request = WarpRequest::builder()
            .target_extent(extent)
            .target_resolution((10.0, 10.0))
            .target_size((11, 5))
            .build();
        assert!(matches!(request.validate(), Err(Error::Usage(_))));

        let request = WarpRequest::builder().target_resolution((10.0, 10.0)).target_size((10, 5)).build();
        assert!(request.validate().is_err());
        Ok(())
    }

    #[test]
    fn usage_errors() {
        assert!(WarpRequest::builder().target_aligned_pixels(true).build().validate().is_err());
        assert!(WarpRequest::builder().target_resolution((0.0, 1.0)).build().validate().is_err());
        assert!(WarpRequest::builder().crop_to_cutline(true).build().validate().is_err());
        assert!(WarpRequest::builder().src_bands(vec![1, 2]).dst_bands(vec![1]).build().validate().is_err());
        assert!(
            WarpRequest::builder()
                .cutline(CutlineSource::Datasource {
                    path: "cut.json".into(),
                    layer: None,
                    where_clause: Some("id = 1".into()),
                    sql: Some("SELECT * FROM cut".into()),
                })
                .build()
                .validate()
                .is_err()
        );
        assert!(WarpRequest::builder().build().validate().is_ok());
    }
}
