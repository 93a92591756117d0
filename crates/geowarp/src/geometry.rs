//! Polygon helpers used to prepare cutlines: WKT io, segmentizing, sliver removal, validation and batch transformation.

use geo::{
    BoundingRect, Relate,
    algorithm::line_intersection::{LineIntersection, line_intersection},
};
use geo_types::{Coord, Line, LineString, MultiPolygon, Polygon};
use rstar::{AABB, RTree, RTreeObject};
use wkt::{ToWkt, TryFromWkt};

use crate::{Error, Rect, Result};

/// Parses a `POLYGON` or `MULTIPOLYGON` WKT string
pub fn parse_wkt(wkt: &str) -> Result<MultiPolygon<f64>> {
    let geometry = geo_types::Geometry::<f64>::try_from_wkt_str(wkt).map_err(|err| Error::Wkt(err.to_string()))?;
    to_multipolygon(geometry).ok_or_else(|| Error::Cutline("Cutline not of polygon type".into()))
}

/// Polygonal geometries as a multipolygon, `None` for other geometry types
pub fn to_multipolygon(geometry: geo_types::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        geo_types::Geometry::Polygon(poly) => Some(MultiPolygon::new(vec![poly])),
        geo_types::Geometry::MultiPolygon(mp) => Some(mp),
        geo_types::Geometry::Rect(rect) => Some(MultiPolygon::new(vec![rect.to_polygon()])),
        _ => None,
    }
}

pub fn to_wkt(geometry: &MultiPolygon<f64>) -> String {
    geometry.wkt_string()
}

pub fn bounding_rect(geometry: &MultiPolygon<f64>) -> Option<Rect<f64>> {
    geometry.bounding_rect().map(Rect::from)
}

fn rings(poly: &Polygon<f64>) -> impl Iterator<Item = &LineString<f64>> {
    std::iter::once(poly.exterior()).chain(poly.interiors())
}

fn map_rings(geometry: &MultiPolygon<f64>, mut f: impl FnMut(&LineString<f64>) -> LineString<f64>) -> MultiPolygon<f64> {
    MultiPolygon::new(
        geometry
            .iter()
            .map(|poly| Polygon::new(f(poly.exterior()), poly.interiors().iter().map(&mut f).collect()))
            .collect(),
    )
}

/// Length of the longest segment of all rings
pub fn max_segment_length(geometry: &MultiPolygon<f64>) -> f64 {
    geometry
        .iter()
        .flat_map(rings)
        .flat_map(|ring| ring.lines())
        .map(|line| line.dx().hypot(line.dy()))
        .fold(0.0, f64::max)
}

/// Adds vertices so that no segment is longer than `max_length`
pub fn segmentize(geometry: &MultiPolygon<f64>, max_length: f64) -> MultiPolygon<f64> {
    if max_length.is_nan() || max_length <= 0.0 || max_length.is_infinite() {
        return geometry.clone();
    }

    map_rings(geometry, |ring| {
        let mut coords = Vec::with_capacity(ring.0.len());
        for line in ring.lines() {
            let length = line.dx().hypot(line.dy());
            let parts = ((length / max_length).ceil() as usize).max(1);
            for i in 0..parts {
                let t = i as f64 / parts as f64;
                coords.push(Coord {
                    x: line.start.x + t * line.dx(),
                    y: line.start.y + t * line.dy(),
                });
            }
        }

        if let Some(last) = ring.0.last() {
            coords.push(*last);
        }
        LineString::new(coords)
    })
}

fn is_spike(prev: Coord<f64>, cur: Coord<f64>, next: Coord<f64>) -> bool {
    let (dx1, dy1) = (cur.x - prev.x, cur.y - prev.y);
    let (dx2, dy2) = (next.x - cur.x, next.y - cur.y);
    let scalar_product = dx1 * dx2 + dy1 * dy2;
    let square_norm1 = dx1 * dx1 + dy1 * dy1;
    let square_norm2 = dx2 * dx2 + dy2 * dy2;

    scalar_product < 0.0 && (scalar_product * scalar_product - square_norm1 * square_norm2).abs() <= 1e-15 * square_norm1 * square_norm2
}

/// Removes vertices where the ring goes back on itself (the previous and next segment are anti-parallel),
/// such spikes can flip the ring orientation after a non linear transformation.
///
/// The ring is treated as cyclic so a spike on the closing vertex is removed as well, the result is closed again.
pub fn remove_zero_width_slivers(geometry: &MultiPolygon<f64>) -> MultiPolygon<f64> {
    map_rings(geometry, |ring| {
        let mut coords = ring.0.clone();
        if coords.len() > 1 && coords.first() == coords.last() {
            coords.pop();
        }

        let mut removed = true;
        while removed {
            removed = false;
            let mut i = 0;
            while coords.len() > 3 && i < coords.len() {
                let n = coords.len();
                let (prev, cur, next) = (coords[(i + n - 1) % n], coords[i], coords[(i + 1) % n]);
                if !is_spike(prev, cur, next) {
                    i += 1;
                    continue;
                }

                log::debug!("Removing zero-width sliver at ({}, {})", cur.x, cur.y);
                coords.remove(i);
                let n = coords.len();
                let at = i % n;
                if coords[at] == coords[(at + n - 1) % n] {
                    coords.remove(at);
                }
                removed = true;
                i = i.saturating_sub(1);
            }
        }

        if let Some(first) = coords.first().copied() {
            coords.push(first);
        }
        LineString::new(coords)
    })
}

/// Transforms all vertices in one batch, fails when a single vertex cannot be transformed
pub fn transform_multipolygon(
    geometry: &MultiPolygon<f64>,
    transform: impl FnOnce(&mut [f64], &mut [f64], &mut [f64]) -> Result<Vec<bool>>,
) -> Result<MultiPolygon<f64>> {
    let coords: Vec<Coord<f64>> = geometry.iter().flat_map(rings).flat_map(|ring| ring.0.iter().copied()).collect();
    let mut x: Vec<f64> = coords.iter().map(|c| c.x).collect();
    let mut y: Vec<f64> = coords.iter().map(|c| c.y).collect();
    let mut z = vec![0.0; coords.len()];

    let success = transform(&mut x, &mut y, &mut z)?;
    if let Some(index) = success.iter().position(|ok| !ok) {
        return Err(Error::Transform(format!(
            "Failed to transform cutline vertex ({}, {})",
            coords[index].x, coords[index].y
        )));
    }

    let mut index = 0;
    Ok(map_rings(geometry, |ring| {
        let transformed = (0..ring.0.len())
            .map(|_| {
                let c = Coord { x: x[index], y: y[index] };
                index += 1;
                c
            })
            .collect();
        LineString::new(transformed)
    }))
}

/// True when `geometry` contains the rectangle (boundary contact allowed)
pub fn contains_rect(geometry: &MultiPolygon<f64>, rect: &Rect<f64>) -> bool {
    let footprint: Polygon<f64> = (*rect).into();
    geometry.relate(&footprint).is_contains()
}

struct RingSegment {
    ring: usize,
    index: usize,
    ring_segments: usize,
    line: Line<f64>,
}

impl RingSegment {
    fn is_adjacent(&self, other: &RingSegment) -> bool {
        if self.ring != other.ring {
            return false;
        }

        let diff = self.index.abs_diff(other.index);
        diff == 1 || diff == self.ring_segments - 1
    }
}

impl RTreeObject for RingSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.line.start.x, self.line.start.y], [self.line.end.x, self.line.end.y])
    }
}

/// Validity check of a polygonal geometry, the error describes the first problem found
pub fn validate(geometry: &MultiPolygon<f64>) -> std::result::Result<(), String> {
    let mut segments = Vec::new();

    for (ring_id, ring) in geometry.iter().flat_map(rings).enumerate() {
        let mut ring = ring.clone();
        ring.0.dedup();
        if ring.0.len() < 4 {
            return Err(format!("Ring with less than 4 points ({})", ring.0.len()));
        }

        if !ring.is_closed() {
            return Err("Ring is not closed".to_string());
        }

        if ring.0.iter().any(|c| !c.x.is_finite() || !c.y.is_finite()) {
            return Err("Ring contains non finite coordinates".to_string());
        }

        let ring_segments = ring.0.len() - 1;
        segments.extend(ring.lines().enumerate().map(|(index, line)| RingSegment {
            ring: ring_id,
            index,
            ring_segments,
            line,
        }));
    }

    let tree = RTree::bulk_load(segments);
    for (a, b) in tree.intersection_candidates_with_other_tree(&tree) {
        if (a.ring, a.index) >= (b.ring, b.index) {
            continue;
        }

        let invalid = match line_intersection(a.line, b.line) {
            None => false,
            Some(LineIntersection::Collinear { .. }) => true,
            Some(LineIntersection::SinglePoint { is_proper, .. }) => {
                if a.ring == b.ring {
                    is_proper || !a.is_adjacent(b)
                } else {
                    is_proper
                }
            }
        };

        if invalid {
            return Err(format!(
                "Self-intersection near ({}, {})",
                (a.line.start.x + a.line.end.x) / 2.0,
                (a.line.start.y + a.line.end.y) / 2.0
            ));
        }
    }

    Ok(())
}

pub fn is_valid(geometry: &MultiPolygon<f64>) -> bool {
    validate(geometry).is_ok()
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    #[test]
    fn parse_polygon_as_multipolygon() -> Result<()> {
        let mp = parse_wkt("POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0))")?;
        assert_eq!(mp.0.len(), 1);
        assert_eq!(bounding_rect(&mp), Some(Rect::from_bounds(0.0, 0.0, 10.0, 10.0)));
        assert!(matches!(parse_wkt("POINT (1 2)"), Err(Error::Cutline(_))));
        assert!(parse_wkt("POLYGON ((0 0, 10").is_err());
        Ok(())
    }

    #[test]
    fn segmentize_limits_segment_length() -> Result<()> {
        let mp = parse_wkt("POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0))")?;
        assert_relative_eq!(max_segment_length(&mp), 10.0);

        let dense = segmentize(&mp, 3.0);
        assert_relative_eq!(max_segment_length(&dense), 2.5);
        assert_eq!(dense.0[0].exterior().0.len(), 17);
        assert!(is_valid(&dense));
        Ok(())
    }

    #[test]
    fn sliver_is_removed() -> Result<()> {
        let mp = parse_wkt("POLYGON ((0 0, 10 0, 10 5, 15 5, 10 5, 10 10, 0 10, 0 0))")?;
        assert!(!is_valid(&mp));

        let cleaned = remove_zero_width_slivers(&mp);
        let ring = cleaned.0[0].exterior();
        assert_eq!(ring.0.len(), 6);
        assert!(is_valid(&cleaned));
        Ok(())
    }

    #[test]
    fn sliver_on_the_closing_vertex_is_removed() -> Result<()> {
        let mp = parse_wkt("POLYGON ((15 5, 10 5, 10 10, 0 10, 0 0, 10 0, 10 5, 15 5))")?;
        assert!(!is_valid(&mp));

        let cleaned = remove_zero_width_slivers(&mp);
        let ring = cleaned.0[0].exterior();
        assert_eq!(ring.0.len(), 6);
        assert_eq!(ring.0.first(), ring.0.last());
        assert!(!ring.0.contains(&Coord { x: 15.0, y: 5.0 }));
        assert!(is_valid(&cleaned));
        Ok(())
    }

    #[test]
    fn bow_tie_is_invalid() -> Result<()> {
        let mp = parse_wkt("POLYGON ((0 0, 10 10, 10 0, 0 10, 0 0))")?;
        assert!(validate(&mp).is_err());
        Ok(())
    }

    #[test]
    fn polygon_with_hole_is_valid() -> Result<()> {
        let mp = parse_wkt("POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0), (2 2, 4 2, 4 4, 2 4, 2 2))")?;
        assert!(is_valid(&mp));
        Ok(())
    }

    #[test]
    fn transform_vertices() -> Result<()> {
        let mp = parse_wkt("POLYGON ((0 0, 10 0, 10 10, 0 0))")?;
        let moved = transform_multipolygon(&mp, |x, y, _z| {
            x.iter_mut().for_each(|v| *v += 100.0);
            y.iter_mut().for_each(|v| *v *= 2.0);
            Ok(vec![true; x.len()])
        })?;
        assert_eq!(bounding_rect(&moved), Some(Rect::from_bounds(100.0, 0.0, 110.0, 20.0)));

        let failed = transform_multipolygon(&mp, |x, _y, _z| Ok(vec![false; x.len()]));
        assert!(matches!(failed, Err(Error::Transform(_))));
        Ok(())
    }

    #[test]
    fn containment() -> Result<()> {
        let mp = parse_wkt("POLYGON ((0 0, 10 0, 10 10, 0 10, 0 0))")?;
        assert!(contains_rect(&mp, &Rect::from_bounds(0.0, 0.0, 10.0, 10.0)));
        assert!(contains_rect(&mp, &Rect::from_bounds(1.0, 1.0, 9.0, 9.0)));
        assert!(!contains_rect(&mp, &Rect::from_bounds(-1.0, 1.0, 9.0, 9.0)));
        Ok(())
    }
}
