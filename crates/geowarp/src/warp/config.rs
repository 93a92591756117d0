use bon::bon;

/// When the cutline is densified after its transformation to source pixel space
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DensifyCutline {
    #[default]
    Yes,
    No,
    /// Only when the directly transformed cutline is invalid
    OnlyIfInvalid,
}

impl std::str::FromStr for DensifyCutline {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "YES" | "TRUE" | "ON" => Ok(DensifyCutline::Yes),
            "NO" | "FALSE" | "OFF" => Ok(DensifyCutline::No),
            "ONLY_IF_INVALID" => Ok(DensifyCutline::OnlyIfInvalid),
            _ => Err(crate::Error::InvalidArgument(format!("Invalid cutline densification mode: {s}"))),
        }
    }
}

/// Formats known to leave destination pixels untouched when a chunk has no source pixels
pub const DEFAULT_SKIP_NOSOURCE_FORMATS: [&str; 4] = ["GTiff", "MEM", "ENVI", "HFA"];

/// Run wide settings, resolved once before the warp starts
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeConfig {
    pub densify_cutline: DensifyCutline,
    /// Continue with an invalid cutline instead of failing, for debugging only
    pub ignore_bad_cutline: bool,
    /// Output formats for which `SKIP_NOSOURCE=YES` is enabled automatically
    pub skip_nosource_formats: Vec<String>,
    /// Padding in destination pixels around the footprint of RPC sources
    pub rpc_footprint_margin: f64,
    /// Capped iterations that stop without converging are reported as warnings instead of debug messages
    pub report_non_convergence: bool,
}

#[bon]
impl RuntimeConfig {
    #[builder]
    pub fn new(
        densify_cutline: Option<DensifyCutline>,
        ignore_bad_cutline: Option<bool>,
        skip_nosource_formats: Option<Vec<String>>,
        rpc_footprint_margin: Option<f64>,
        report_non_convergence: Option<bool>,
    ) -> Self {
        Self {
            densify_cutline: densify_cutline.unwrap_or_default(),
            ignore_bad_cutline: ignore_bad_cutline.unwrap_or(false),
            skip_nosource_formats: skip_nosource_formats
                .unwrap_or_else(|| DEFAULT_SKIP_NOSOURCE_FORMATS.iter().map(|f| f.to_string()).collect()),
            rpc_footprint_margin: rpc_footprint_margin.unwrap_or(1.0),
            report_non_convergence: report_non_convergence.unwrap_or(true),
        }
    }

    pub fn supports_skip_nosource(&self, format: &str) -> bool {
        self.skip_nosource_formats.iter().any(|f| f.eq_ignore_ascii_case(format))
    }

    /// Logs that a capped loop stopped without converging
    pub(crate) fn log_non_convergence(&self, what: &str) {
        if self.report_non_convergence {
            log::warn!("{what} did not converge within the iteration limit");
        } else {
            log::debug!("{what} did not converge within the iteration limit");
        }
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig::builder().build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = RuntimeConfig::default();
        assert_eq!(config.densify_cutline, DensifyCutline::Yes);
        assert!(!config.ignore_bad_cutline);
        assert!(config.supports_skip_nosource("gtiff"));
        assert!(!config.supports_skip_nosource("VRT"));
        assert_eq!(config.rpc_footprint_margin, 1.0);
    }

    #[test]
    fn overrides() {
        let config = RuntimeConfig::builder()
            .densify_cutline(DensifyCutline::OnlyIfInvalid)
            .skip_nosource_formats(vec!["JSON".to_string()])
            .build();
        assert_eq!(config.densify_cutline, DensifyCutline::OnlyIfInvalid);
        assert!(config.supports_skip_nosource("JSON"));
        assert!(!config.supports_skip_nosource("GTiff"));
    }
}
