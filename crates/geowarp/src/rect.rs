//! Axis aligned rectangle used for extents and pixel windows.

use std::fmt::Debug;

use approx::{AbsDiffEq, RelativeEq};
use geo_types::CoordNum;

use crate::Point;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect<T>
where
    T: Copy + CoordNum,
{
    top_left: Point<T>,
    bottom_right: Point<T>,
}

impl<T> Rect<T>
where
    T: Copy + CoordNum,
{
    pub fn from_points(p1: Point<T>, p2: Point<T>) -> Self {
        let top_left = Point::new(min(p1.x(), p2.x()), max(p1.y(), p2.y()));
        let bottom_right = Point::new(max(p1.x(), p2.x()), min(p1.y(), p2.y()));

        Rect { top_left, bottom_right }
    }

    /// Rectangle from its extreme coordinates (`-te` order: min x, min y, max x, max y)
    pub fn from_bounds(min_x: T, min_y: T, max_x: T, max_y: T) -> Self {
        Self::from_points(Point::new(min_x, min_y), Point::new(max_x, max_y))
    }

    /// Smallest rectangle containing all the points, `None` for an empty slice
    pub fn from_point_cloud(points: &[Point<T>]) -> Option<Self> {
        let first = points.first()?;
        Some(points.iter().skip(1).fold(Rect::from_points(*first, *first), |rect, p| rect.expanded_to(*p)))
    }

    pub fn min_x(&self) -> T {
        self.top_left.x()
    }

    pub fn max_x(&self) -> T {
        self.bottom_right.x()
    }

    pub fn min_y(&self) -> T {
        self.bottom_right.y()
    }

    pub fn max_y(&self) -> T {
        self.top_left.y()
    }

    pub fn width(&self) -> T {
        self.bottom_right.x() - self.top_left.x()
    }

    pub fn height(&self) -> T {
        self.top_left.y() - self.bottom_right.y()
    }

    pub fn is_empty(&self) -> bool {
        self.width() == T::zero() || self.height() == T::zero()
    }

    pub fn top_left(&self) -> Point<T> {
        self.top_left
    }

    pub fn top_right(&self) -> Point<T> {
        Point::new(self.bottom_right.x(), self.top_left.y())
    }

    pub fn bottom_left(&self) -> Point<T> {
        Point::new(self.top_left.x(), self.bottom_right.y())
    }

    pub fn bottom_right(&self) -> Point<T> {
        self.bottom_right
    }

    pub fn expanded_to(&self, p: Point<T>) -> Rect<T> {
        Rect {
            top_left: Point::new(min(self.top_left.x(), p.x()), max(self.top_left.y(), p.y())),
            bottom_right: Point::new(max(self.bottom_right.x(), p.x()), min(self.bottom_right.y(), p.y())),
        }
    }

    /// Smallest rectangle covering both rectangles
    pub fn union(&self, other: &Rect<T>) -> Rect<T> {
        self.expanded_to(other.top_left).expanded_to(other.bottom_right)
    }

    /// Rectangles that only share an edge do not intersect
    pub fn intersects(&self, other: &Rect<T>) -> bool {
        !self.is_empty()
            && !other.is_empty()
            && self.top_left.x() < other.bottom_right.x()
            && self.bottom_right.x() > other.top_left.x()
            && self.top_left.y() > other.bottom_right.y()
            && self.bottom_right.y() < other.top_left.y()
    }

    pub fn intersection(&self, other: &Rect<T>) -> Rect<T> {
        if !self.intersects(other) {
            // Rectangles do not overlap, return an empty rectangle
            return Rect::from_points(Point::new(T::zero(), T::zero()), Point::new(T::zero(), T::zero()));
        }

        let top_left = Point::new(
            max(self.top_left.x(), other.top_left.x()),
            min(self.top_left.y(), other.top_left.y()),
        );
        let bottom_right = Point::new(
            min(self.bottom_right.x(), other.bottom_right.x()),
            max(self.bottom_right.y(), other.bottom_right.y()),
        );

        Rect::from_points(top_left, bottom_right)
    }
}

impl Rect<f64> {
    pub fn is_finite(&self) -> bool {
        self.top_left.x().is_finite() && self.top_left.y().is_finite() && self.bottom_right.x().is_finite() && self.bottom_right.y().is_finite()
    }

    /// Grows the rectangle by `distance` on every side
    pub fn buffered(&self, distance: f64) -> Rect<f64> {
        Rect::from_bounds(self.min_x() - distance, self.min_y() - distance, self.max_x() + distance, self.max_y() + distance)
    }
}

fn min<T: PartialOrd>(a: T, b: T) -> T {
    if a < b { a } else { b }
}

fn max<T: PartialOrd>(a: T, b: T) -> T {
    if b > a { b } else { a }
}

impl From<Rect<f64>> for geo_types::Polygon<f64> {
    fn from(rect: Rect<f64>) -> geo_types::Polygon<f64> {
        geo_types::Polygon::new(
            geo_types::LineString::from(vec![
                rect.top_left(),
                rect.top_right(),
                rect.bottom_right,
                rect.bottom_left(),
                rect.top_left(),
            ]),
            Vec::default(),
        )
    }
}

impl From<geo_types::Rect<f64>> for Rect<f64> {
    fn from(rect: geo_types::Rect<f64>) -> Self {
        Rect::from_bounds(rect.min().x, rect.min().y, rect.max().x, rect.max().y)
    }
}

impl<T> AbsDiffEq for Rect<T>
where
    T: PartialEq + std::fmt::Debug + Copy + CoordNum + AbsDiffEq<Epsilon = T>,
{
    type Epsilon = T;

    fn default_epsilon() -> Self::Epsilon {
        T::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.top_left.abs_diff_eq(&other.top_left, epsilon) && self.bottom_right.abs_diff_eq(&other.bottom_right, epsilon)
    }
}

impl<T: PartialEq + std::fmt::Debug + Copy + CoordNum + RelativeEq<Epsilon = T>> RelativeEq for Rect<T> {
    fn default_max_relative() -> Self::Epsilon {
        T::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        Point::<T>::relative_eq(&self.top_left, &other.top_left, epsilon, max_relative)
            && Point::<T>::relative_eq(&self.bottom_right, &other.bottom_right, epsilon, max_relative)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rectangle_intersection() {
        let r1 = Rect::from_points(Point::new(0, 10), Point::new(10, 0));
        let r2 = Rect::from_points(Point::new(4, 4), Point::new(5, 5));

        let intersection = r1.intersection(&r2);

        assert_eq!(intersection.top_left, Point::new(4, 5));
        assert_eq!(intersection.bottom_right, Point::new(5, 4));
    }

    #[test]
    fn rectangle_touching_edges_do_not_intersect() {
        let r1 = Rect::from_bounds(0.0, 0.0, 10.0, 10.0);
        let r2 = Rect::from_bounds(10.0, 0.0, 20.0, 10.0);
        assert!(!r1.intersects(&r2));
        assert!(r1.intersection(&r2).is_empty());
    }

    #[test]
    fn rectangle_union() {
        let r1 = Rect::from_bounds(0.0, 0.0, 10.0, 10.0);
        let r2 = Rect::from_bounds(5.0, -5.0, 20.0, 8.0);
        assert_eq!(r1.union(&r2), Rect::from_bounds(0.0, -5.0, 20.0, 10.0));
    }

    #[test]
    fn rectangle_from_point_cloud() {
        let points = [Point::new(3.0, 1.0), Point::new(-1.0, 4.0), Point::new(2.0, -2.0)];
        let rect = Rect::from_point_cloud(&points).expect("non empty");
        assert_eq!(rect.min_x(), -1.0);
        assert_eq!(rect.max_x(), 3.0);
        assert_eq!(rect.min_y(), -2.0);
        assert_eq!(rect.max_y(), 4.0);
        assert!(Rect::<f64>::from_point_cloud(&[]).is_none());
    }
}
