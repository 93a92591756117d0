use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Structurally invalid request, detected before any dataset is touched
    #[error("Usage error: {0}")]
    Usage(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    /// Invalid setup detected while preparing the warp (unknown driver, bad band index, missing cutline layer, ...)
    #[error("Configuration error: {0}")]
    Configuration(String),
    #[error("Invalid spatial reference: {0}")]
    InvalidSrs(String),
    #[error("Transform error: {0}")]
    Transform(String),
    #[error("Inverse transformation not supported: {0}")]
    InverseUnsupported(String),
    #[error("Cutline error: {0}")]
    Cutline(String),
    #[error("Runtime error: {0}")]
    Runtime(String),
    #[error("Operation cancelled")]
    Cancelled,
    #[error("Invalid WKT: {0}")]
    Wkt(String),
    #[error("IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[cfg(feature = "gdal")]
    #[error("GDAL error: {0}")]
    GdalError(#[from] ::gdal::errors::GdalError),
    #[error("Invalid string: {0}")]
    InvalidString(#[from] std::ffi::NulError),
    #[cfg(feature = "serde")]
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub fn is_usage(&self) -> bool {
        matches!(self, Error::Usage(_))
    }
}
