//! Detection of sources that can be stacked in a virtual mosaic instead of being warped one by one.

use approx::relative_eq;

use crate::{
    RasterDataset, Rect,
    dataset::{alpha_band, dataset_bounds},
};

fn same_srs(a: &dyn RasterDataset, b: &dyn RasterDataset) -> bool {
    match (a.spatial_ref(), b.spatial_ref()) {
        (Some(a), Some(b)) => a.is_same(b),
        (None, None) => true,
        _ => false,
    }
}

/// True when the sources only need stacking: named, axis aligned, identical band count, spatial reference and resolution.
/// Sources with an alpha band must not overlap, the stacking order would otherwise matter for transparent pixels.
pub fn can_use_mosaic(sources: &[&dyn RasterDataset]) -> bool {
    let Some(first) = sources.first() else {
        return false;
    };
    let Some(first_gt) = first.geo_transform() else {
        return false;
    };

    let mut has_alpha = false;
    for src in sources {
        if src.description().is_empty() {
            log::debug!("Mosaic not possible: anonymous source dataset");
            return false;
        }

        let Some(gt) = src.geo_transform() else {
            return false;
        };

        if !gt.is_axis_aligned() {
            log::debug!("Mosaic not possible: {} is rotated", src.description());
            return false;
        }

        if src.band_count() != first.band_count() || !same_srs(*first, *src) {
            return false;
        }

        if !relative_eq!(gt.cell_size_x(), first_gt.cell_size_x(), max_relative = 1e-10)
            || !relative_eq!(gt.cell_size_y(), first_gt.cell_size_y(), max_relative = 1e-10)
        {
            log::debug!("Mosaic not possible: resolution of {} differs", src.description());
            return false;
        }

        has_alpha |= alpha_band(*src).is_some();
    }

    if has_alpha {
        let footprints: Vec<Rect<f64>> = sources.iter().filter_map(|src| dataset_bounds(*src)).collect();
        for (i, a) in footprints.iter().enumerate() {
            // touching footprints are fine
            if footprints[i + 1..].iter().any(|b| a.intersects(b)) {
                log::debug!("Mosaic not possible: overlapping sources with an alpha band");
                return false;
            }
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{GeoTransform, SpatialReference, testutils};

    fn tile(name: &str, x: f64) -> crate::mem::MemDataset {
        testutils::projected_raster(name, 10, 10, [x, 1.0, 0.0, 100.0, 0.0, -1.0])
    }

    #[test]
    fn adjacent_tiles() {
        let (a, b, c) = (tile("a.tif", 0.0), tile("b.tif", 10.0), tile("c.tif", 20.0));
        assert!(can_use_mosaic(&[&a, &b, &c]));
    }

    #[test]
    fn rotated_source() -> crate::Result<()> {
        let a = tile("a.tif", 0.0);
        let mut b = tile("b.tif", 10.0);
        b.set_geo_transform(GeoTransform::new([10.0, 1.0, 0.1, 100.0, 0.0, -1.0]))?;
        assert!(!can_use_mosaic(&[&a, &b]));
        Ok(())
    }

    #[test]
    fn incompatible_sources() -> crate::Result<()> {
        let a = tile("a.tif", 0.0);

        let coarse = testutils::projected_raster("coarse.tif", 10, 10, [10.0, 2.0, 0.0, 100.0, 0.0, -2.0]);
        assert!(!can_use_mosaic(&[&a, &coarse]));

        let mut other_srs = tile("b.tif", 10.0);
        other_srs.set_spatial_ref(Some(SpatialReference::web_mercator()))?;
        assert!(!can_use_mosaic(&[&a, &other_srs]));

        let anonymous = tile("", 10.0);
        assert!(!can_use_mosaic(&[&a, &anonymous]));
        Ok(())
    }

    #[test]
    fn overlapping_sources_with_alpha() {
        let a = testutils::rgba_raster("a.tif", 10, 10, [0.0, 1.0, 0.0, 100.0, 0.0, -1.0]);
        let b = testutils::rgba_raster("b.tif", 10, 10, [5.0, 1.0, 0.0, 100.0, 0.0, -1.0]);
        let c = testutils::rgba_raster("c.tif", 10, 10, [10.0, 1.0, 0.0, 100.0, 0.0, -1.0]);
        assert!(!can_use_mosaic(&[&a, &b]));
        assert!(can_use_mosaic(&[&a, &c]));

        let (d, e) = (tile("d.tif", 0.0), tile("e.tif", 5.0));
        assert!(can_use_mosaic(&[&d, &e]));
    }
}
