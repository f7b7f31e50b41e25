//! Room geometry: points, the six walls of a shoebox room, and the
//! first-order reflection points the SDN junctions sit on.

use crate::error::{config_err, Result};
use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Immutable position in metres. Serialized as `[x, y, z]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 3]", into = "[f64; 3]")]
pub struct Point3D {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3D {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance(&self, other: &Point3D) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    /// Point a fraction `t` of the way from `self` to `other`.
    pub fn lerp(&self, other: &Point3D, t: f64) -> Point3D {
        Point3D::new(
            self.x + t * (other.x - self.x),
            self.y + t * (other.y - self.y),
            self.z + t * (other.z - self.z),
        )
    }

    pub fn axis(&self, axis: usize) -> f64 {
        match axis {
            0 => self.x,
            1 => self.y,
            _ => self.z,
        }
    }

    fn with_axis(mut self, axis: usize, value: f64) -> Self {
        match axis {
            0 => self.x = value,
            1 => self.y = value,
            _ => self.z = value,
        }
        self
    }
}

impl From<[f64; 3]> for Point3D {
    fn from(v: [f64; 3]) -> Self {
        Point3D::new(v[0], v[1], v[2])
    }
}

impl From<Point3D> for [f64; 3] {
    fn from(p: Point3D) -> Self {
        [p.x, p.y, p.z]
    }
}

/// The six boundaries of a rectangular room.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Wall {
    North,
    South,
    East,
    West,
    Floor,
    Ceiling,
}

impl Wall {
    pub const ALL: [Wall; 6] = [
        Wall::North,
        Wall::South,
        Wall::East,
        Wall::West,
        Wall::Floor,
        Wall::Ceiling,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    /// Axis normal to the wall and whether the wall sits at the far end
    /// (`dims[axis]`) rather than at zero.
    pub const fn plane(self) -> (usize, bool) {
        match self {
            Wall::West => (0, false),
            Wall::East => (0, true),
            Wall::South => (1, false),
            Wall::North => (1, true),
            Wall::Floor => (2, false),
            Wall::Ceiling => (2, true),
        }
    }
}

/// Per-wall values stored in a fixed array, indexed by `Wall`.
///
/// Serialized as a six-element array in `Wall::ALL` order.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WallMap<T>(pub [T; 6]);

impl<T> WallMap<T> {
    pub fn from_fn(mut f: impl FnMut(Wall) -> T) -> Self {
        WallMap(Wall::ALL.map(|w| f(w)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (Wall, &T)> {
        Wall::ALL.into_iter().zip(self.0.iter())
    }

    pub fn map<U>(&self, mut f: impl FnMut(Wall, &T) -> U) -> WallMap<U> {
        WallMap::from_fn(|w| f(w, &self.0[w.index()]))
    }
}

impl<T: Clone> WallMap<T> {
    pub fn uniform(value: T) -> Self {
        WallMap::from_fn(|_| value.clone())
    }
}

impl<T> Index<Wall> for WallMap<T> {
    type Output = T;

    fn index(&self, wall: Wall) -> &T {
        &self.0[wall.index()]
    }
}

impl<T> IndexMut<Wall> for WallMap<T> {
    fn index_mut(&mut self, wall: Wall) -> &mut T {
        &mut self.0[wall.index()]
    }
}

/// Image source as delivered by an external geometric-acoustics engine.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ImageSource {
    pub position: Point3D,
    /// Wall of the last reflection along the path.
    pub wall: Wall,
}

/// Shoebox room with a source and a microphone.
#[derive(Debug, Clone, PartialEq)]
pub struct Room {
    dims: [f64; 3],
    source: Point3D,
    mic: Point3D,
}

impl Room {
    /// Validate dimensions and positions. Source and mic must lie strictly
    /// inside the room.
    pub fn new(dims: [f64; 3], source: Point3D, mic: Point3D) -> Result<Self> {
        if dims.iter().any(|d| !d.is_finite() || *d <= 0.0) {
            return config_err(format!("room dimensions must be positive, got {dims:?}"));
        }
        for (name, p) in [("source", source), ("mic", mic)] {
            for axis in 0..3 {
                let v = p.axis(axis);
                if !(v > 0.0 && v < dims[axis]) {
                    return config_err(format!(
                        "{name} position {:?} must lie inside the room {dims:?}",
                        <[f64; 3]>::from(p)
                    ));
                }
            }
        }
        if source.distance(&mic) <= 0.0 {
            return config_err("source and mic must not coincide");
        }
        Ok(Self { dims, source, mic })
    }

    pub fn dims(&self) -> [f64; 3] {
        self.dims
    }

    pub fn source(&self) -> Point3D {
        self.source
    }

    pub fn mic(&self) -> Point3D {
        self.mic
    }

    pub fn volume(&self) -> f64 {
        self.dims[0] * self.dims[1] * self.dims[2]
    }

    pub fn surface_areas(&self) -> WallMap<f64> {
        let [l, w, h] = self.dims;
        WallMap::from_fn(|wall| match wall {
            Wall::West | Wall::East => w * h,
            Wall::South | Wall::North => l * h,
            Wall::Floor | Wall::Ceiling => l * w,
        })
    }

    pub fn total_surface(&self) -> f64 {
        self.surface_areas().0.iter().sum()
    }

    /// Mean free path `4V / S`.
    pub fn mean_free_path(&self) -> f64 {
        4.0 * self.volume() / self.total_surface()
    }

    fn plane_value(&self, wall: Wall) -> (usize, f64) {
        let (axis, far) = wall.plane();
        (axis, if far { self.dims[axis] } else { 0.0 })
    }

    /// Mirror image of the source across one wall.
    pub fn image_source(&self, wall: Wall) -> Point3D {
        let (axis, value) = self.plane_value(wall);
        self.source.with_axis(axis, 2.0 * value - self.source.axis(axis))
    }

    /// First-order image sources for every wall.
    pub fn first_order_image_sources(&self) -> Vec<ImageSource> {
        Wall::ALL
            .iter()
            .map(|&wall| ImageSource {
                position: self.image_source(wall),
                wall,
            })
            .collect()
    }

    /// Specular reflection point on `wall` for the source→mic path.
    pub fn reflection_point(&self, wall: Wall) -> Point3D {
        let (axis, value) = self.plane_value(wall);
        let image = self.image_source(wall);
        let t = (value - image.axis(axis)) / (self.mic.axis(axis) - image.axis(axis));
        image.lerp(&self.mic, t).with_axis(axis, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn room() -> Room {
        Room::new(
            [5.0, 7.0, 5.0],
            Point3D::new(2.9, 2.5, 2.5),
            Point3D::new(4.4, 4.8, 4.7),
        )
        .unwrap()
    }

    #[test]
    fn rejects_non_positive_dims() {
        let err = Room::new([5.0, 0.0, 3.0], Point3D::new(1.0, 1.0, 1.0), Point3D::new(2.0, 2.0, 2.0));
        assert!(err.is_err());
    }

    #[test]
    fn rejects_source_outside() {
        let err = Room::new([5.0, 5.0, 3.0], Point3D::new(6.0, 1.0, 1.0), Point3D::new(2.0, 2.0, 2.0));
        assert!(err.is_err());
    }

    #[test]
    fn areas_and_volume() {
        let r = room();
        assert_eq!(r.volume(), 175.0);
        let a = r.surface_areas();
        assert_eq!(a[Wall::West], 35.0);
        assert_eq!(a[Wall::North], 25.0);
        assert_eq!(a[Wall::Floor], 35.0);
        assert_eq!(r.total_surface(), 190.0);
        assert!((r.mean_free_path() - 4.0 * 175.0 / 190.0).abs() < 1e-12);
    }

    #[test]
    fn reflection_point_lies_on_wall_and_on_image_path() {
        let r = room();
        for wall in Wall::ALL {
            let p = r.reflection_point(wall);
            let (axis, far) = wall.plane();
            let expected = if far { r.dims()[axis] } else { 0.0 };
            assert!((p.axis(axis) - expected).abs() < 1e-12, "{wall:?}");
            // source→p→mic has the same length as image→mic
            let path = r.source().distance(&p) + p.distance(&r.mic());
            let image_path = r.image_source(wall).distance(&r.mic());
            assert!((path - image_path).abs() < 1e-9, "{wall:?}");
        }
    }

    #[test]
    fn wall_map_indexing() {
        let mut m = WallMap::uniform(0.0);
        m[Wall::Ceiling] = 3.0;
        assert_eq!(m.0[5], 3.0);
        let doubled = m.map(|_, v| v * 2.0);
        assert_eq!(doubled[Wall::Ceiling], 6.0);
        assert_eq!(m.iter().count(), 6);
    }

    #[test]
    fn point_serializes_as_array() {
        let p: Point3D = serde_json::from_str("[1.0, 2.0, 3.0]").unwrap();
        assert_eq!(p, Point3D::new(1.0, 2.0, 3.0));
        assert_eq!(serde_json::to_string(&p).unwrap(), "[1.0,2.0,3.0]");
    }
}
