//! Synthetic rasters used by the unit tests.

use crate::{
    DataType, GeoTransform, RasterDataset, RasterSize, SpatialReference,
    dataset::ColorInterpretation,
    georef::Gcp,
    mem::{MemBand, MemDataset},
    rpc,
};

fn raster(name: &str, cols: usize, rows: usize, gt: [f64; 6], srs: Option<SpatialReference>) -> MemDataset {
    let mut ds = MemDataset::new(name, RasterSize::with_rows_cols(rows, cols), 1, DataType::Byte);
    ds.set_geo_transform(GeoTransform::new(gt)).expect("mem dataset");
    ds.set_spatial_ref(srs).expect("mem dataset");
    ds
}

/// Single byte band raster in WGS84
pub fn geographic_raster(name: &str, cols: usize, rows: usize, gt: [f64; 6]) -> MemDataset {
    raster(name, cols, rows, gt, Some(SpatialReference::wgs84()))
}

/// Single byte band raster in Belgian Lambert 72
pub fn projected_raster(name: &str, cols: usize, rows: usize, gt: [f64; 6]) -> MemDataset {
    raster(name, cols, rows, gt, Some(SpatialReference::from_epsg(31370).expect("EPSG database")))
}

/// Raster with values `row * cols + col + 1` (modulo 250)
pub fn gradient_raster(name: &str, cols: usize, rows: usize, gt: [f64; 6]) -> MemDataset {
    let mut ds = projected_raster(name, cols, rows, gt);
    let values = (0..rows * cols).map(|i| ((i % 250) + 1) as f64).collect();
    *ds.mem_band_mut(1).expect("band") = MemBand::with_data(ds.raster_size(), DataType::Byte, values).expect("band data");
    ds
}

/// 1000x1000 image georeferenced by an RPC model around (5, 50)
pub fn rpc_raster(name: &str) -> MemDataset {
    let mut ds = MemDataset::new(name, RasterSize::square(1000), 1, DataType::Byte);
    ds.set_rpc(Some(rpc::tests::test_rpc()));
    ds
}

/// Image georeferenced by GCPs describing a 0.01 degree grid with its origin at (4, 51)
pub fn gcp_raster(name: &str, cols: usize, rows: usize) -> MemDataset {
    let mut ds = MemDataset::new(name, RasterSize::with_rows_cols(rows, cols), 1, DataType::Byte);
    let gcp = |pixel: f64, line: f64| Gcp {
        pixel,
        line,
        x: 4.0 + pixel * 0.01,
        y: 51.0 - line * 0.01,
        z: 0.0,
    };
    let (c, r) = (cols as f64, rows as f64);
    ds.set_gcps(vec![gcp(0.0, 0.0), gcp(c, 0.0), gcp(0.0, r), gcp(c, r)], Some(SpatialReference::wgs84()));
    ds
}

/// RGB raster with an alpha band
pub fn rgba_raster(name: &str, cols: usize, rows: usize, gt: [f64; 6]) -> MemDataset {
    let mut ds = projected_raster(name, cols, rows, gt);
    for _ in 0..3 {
        ds.push_band(MemBand::new(ds.raster_size(), DataType::Byte)).expect("band");
    }

    let interpretations = [
        ColorInterpretation::Red,
        ColorInterpretation::Green,
        ColorInterpretation::Blue,
        ColorInterpretation::Alpha,
    ];
    for (index, interp) in interpretations.into_iter().enumerate() {
        crate::RasterBand::set_color_interpretation(ds.mem_band_mut(index + 1).expect("band"), interp).expect("interpretation");
    }
    ds
}
