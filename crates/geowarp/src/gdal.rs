//! GDAL backed implementations of the raster, vector, driver and warp engine abstractions.
//!
//! Datasets are opened and created through the GDAL driver manager, warps run through `GDALChunkAndWarpImage`
//! with the pixel transformer of the warp options, cutline attribute filters and SQL statements are evaluated by OGR.

mod dataset;
mod driver;
mod interop;
mod vector;
mod warp;

pub use dataset::{GdalBand, GdalDataset, SharedDataset};
pub use driver::{GdalDriver, GdalRegistry};
pub use interop::setup_logging;
pub use vector::GdalVectorSource;
pub use warp::GdalWarpEngine;
