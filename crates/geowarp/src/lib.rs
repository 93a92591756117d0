#![warn(clippy::unwrap_used)]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Warp orchestration: decides per source raster the transformer, output grid, nodata policy, cutline and overview level
//! and drives a warp engine to produce a reprojected mosaic.

pub mod coordinatetransformer;
pub mod dataset;
mod datatype;
mod error;
pub mod format;
#[cfg(feature = "gdal")]
pub mod gdal;
pub mod geometry;
pub mod georef;
mod geotransform;
pub mod mem;
mod namevalue;
pub mod overview;
mod rastersize;
mod rect;
pub mod rpc;
pub mod srs;
pub mod suggest;
#[cfg(test)]
mod testutils;
pub mod transformer;
pub mod vector;
pub mod warp;

#[doc(inline)]
pub use {
    coordinatetransformer::CoordinateTransformer,
    dataset::{RasterBand, RasterDataset},
    datatype::DataType,
    error::Error,
    format::{Driver, DriverRegistry},
    geotransform::GeoTransform,
    namevalue::NameValueList,
    rastersize::PixelWindow,
    rastersize::RasterSize,
    rect::Rect,
    srs::SpatialReference,
    transformer::{Transformer, TransformerHandle},
    warp::{WarpContext, WarpRequest, warp},
};

pub type Result<T = ()> = std::result::Result<T, Error>;
pub type Point<T = f64> = geo_types::Point<T>;
