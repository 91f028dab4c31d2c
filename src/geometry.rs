//! Collision geometry primitives.
//!
//! Obstacles are owned by the [`crate::ProblemSolver`]; this module only gives them a
//! shape. Everything is expressed with [`nalgebra`] `f64` types so results can be
//! returned to callers as plain coordinate triples.

use nalgebra::{Isometry3, Point3, Vector3};
use serde::{Deserialize, Serialize};

/// A triangle with concrete vertex positions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Triangle {
    pub v0: Point3<f64>,
    pub v1: Point3<f64>,
    pub v2: Point3<f64>,
}

impl Triangle {
    pub fn new(v0: Point3<f64>, v1: Point3<f64>, v2: Point3<f64>) -> Self {
        Self { v0, v1, v2 }
    }

    /// Builds a triangle from raw `[x, y, z]` triples, as they arrive over the wire.
    pub fn from_arrays(v0: [f64; 3], v1: [f64; 3], v2: [f64; 3]) -> Self {
        Self::new(Point3::from(v0), Point3::from(v1), Point3::from(v2))
    }

    pub fn vertices(&self) -> [Point3<f64>; 3] {
        [self.v0, self.v1, self.v2]
    }

    /// Unit face normal (right-hand rule), `None` for degenerate triangles.
    pub fn normal(&self) -> Option<Vector3<f64>> {
        (self.v1 - self.v0)
            .cross(&(self.v2 - self.v0))
            .try_normalize(f64::EPSILON)
    }

    pub fn area(&self) -> f64 {
        (self.v1 - self.v0).cross(&(self.v2 - self.v0)).norm() * 0.5
    }

    /// The triangle moved by `pose`.
    pub fn transformed(&self, pose: &Isometry3<f64>) -> Self {
        Self::new(pose * self.v0, pose * self.v1, pose * self.v2)
    }
}

/// An indexed triangle mesh in the obstacle's local frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TriangleMesh {
    pub vertices: Vec<Point3<f64>>,
    pub triangles: Vec<[usize; 3]>,
}

impl TriangleMesh {
    pub fn new(vertices: Vec<Point3<f64>>, triangles: Vec<[usize; 3]>) -> Self {
        Self {
            vertices,
            triangles,
        }
    }

    /// A mesh is usable when every index is in range, every coordinate is finite and at
    /// least one triangle has a non-zero area.
    pub fn is_well_formed(&self) -> bool {
        if self.triangles.is_empty() {
            return false;
        }
        let finite = self
            .vertices
            .iter()
            .all(|v| v.coords.iter().all(|c| c.is_finite()));
        let indices_in_range = self
            .triangles
            .iter()
            .all(|t| t.iter().all(|&i| i < self.vertices.len()));

        finite && indices_in_range && self.faces().any(|t| t.normal().is_some())
    }

    /// Iterates over the triangles whose indices are in range.
    pub fn faces(&self) -> impl Iterator<Item = Triangle> + '_ {
        self.triangles.iter().filter_map(|&[a, b, c]| {
            Some(Triangle::new(
                *self.vertices.get(a)?,
                *self.vertices.get(b)?,
                *self.vertices.get(c)?,
            ))
        })
    }
}

/// The shape attached to an obstacle.
///
/// Only [`CollisionGeometry::Mesh`] can be analysed; primitive shapes are accepted by
/// the store but rejected by `checkModel`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "snake_case")]
pub enum CollisionGeometry {
    Mesh(TriangleMesh),
    Box { half_extents: Vector3<f64> },
    Sphere { radius: f64 },
    Cylinder { radius: f64, half_length: f64 },
}

impl CollisionGeometry {
    /// The triangle mesh, if this geometry is one.
    pub fn as_mesh(&self) -> Option<&TriangleMesh> {
        match self {
            CollisionGeometry::Mesh(mesh) => Some(mesh),
            _ => None,
        }
    }
}

/// A named rigid collision geometry placed in the world.
#[derive(Debug, Clone, PartialEq)]
pub struct Obstacle {
    pub name: String,
    pub geometry: CollisionGeometry,
    pub pose: Isometry3<f64>,
}

impl Obstacle {
    /// An obstacle at the world origin.
    pub fn new(name: impl Into<String>, geometry: CollisionGeometry) -> Self {
        Self {
            name: name.into(),
            geometry,
            pose: Isometry3::identity(),
        }
    }

    pub fn with_pose(mut self, pose: Isometry3<f64>) -> Self {
        self.pose = pose;
        self
    }

    /// Mesh triangles expressed in the world frame. Empty for primitive shapes.
    pub fn world_triangles(&self) -> Vec<Triangle> {
        match self.geometry.as_mesh() {
            Some(mesh) => mesh.faces().map(|t| t.transformed(&self.pose)).collect(),
            None => Vec::new(),
        }
    }
}

/// A connected surface patch produced by affordance extraction, in world coordinates.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AffordanceRegion {
    pub triangles: Vec<Triangle>,
}

impl AffordanceRegion {
    pub fn new(triangles: Vec<Triangle>) -> Self {
        Self { triangles }
    }

    /// Sum of the triangle areas.
    pub fn area(&self) -> f64 {
        self.triangles.iter().map(Triangle::area).sum()
    }

    /// Mean of all triangle vertices.
    pub fn centroid(&self) -> Option<Point3<f64>> {
        if self.triangles.is_empty() {
            return None;
        }
        let sum = self
            .triangles
            .iter()
            .flat_map(|t| t.vertices())
            .fold(Vector3::zeros(), |acc, v| acc + v.coords);
        Some(Point3::from(sum / (self.triangles.len() * 3) as f64))
    }

    /// Moves every vertex `distance` towards the centroid, stopping at the centroid.
    pub fn shrunk(&self, distance: f64) -> Self {
        let Some(centroid) = self.centroid() else {
            return self.clone();
        };
        let pull = |v: Point3<f64>| {
            let offset = v - centroid;
            let length = offset.norm();
            if length <= distance {
                centroid
            } else {
                v - offset * (distance / length)
            }
        };
        Self::new(
            self.triangles
                .iter()
                .map(|t| Triangle::new(pull(t.v0), pull(t.v1), pull(t.v2)))
                .collect(),
        )
    }

    /// Triangle → vertex → `[x, y, z]`.
    pub fn to_points(&self) -> Vec<Vec<Vec<f64>>> {
        self.triangles
            .iter()
            .map(|t| {
                t.vertices()
                    .iter()
                    .map(|v| vec![v.x, v.y, v.z])
                    .collect()
            })
            .collect()
    }
}

/// Builds an axis-aligned rectangle in the `z = height` plane as two triangles facing +Z.
#[cfg(test)]
pub(crate) fn horizontal_quad(min: [f64; 2], max: [f64; 2], height: f64) -> TriangleMesh {
    TriangleMesh::new(
        vec![
            Point3::new(min[0], min[1], height),
            Point3::new(max[0], min[1], height),
            Point3::new(max[0], max[1], height),
            Point3::new(min[0], max[1], height),
        ],
        vec![[0, 1, 2], [0, 2, 3]],
    )
}
