//! Affordance extraction.
//!
//! [`AffordanceExtractor`] is the seam behind which the geometric analysis lives. The
//! façade only validates inputs, hands an obstacle and a configured operation set to the
//! extractor, and stores what comes back.

use std::collections::{BTreeMap, HashMap, VecDeque};

use nalgebra::{Point3, Vector3};
use tracing::debug;

use crate::error::{AffordError, Result};
use crate::geometry::{AffordanceRegion, Obstacle, Triangle};
use crate::operation::ConfiguredOperation;

/// Computes affordance regions for one obstacle.
pub trait AffordanceExtractor: Send + Sync {
    /// Returns one list of regions per entry of `operations`, in the same order.
    ///
    /// `reduce_sizes` is either empty or has one entry per operation.
    fn extract(
        &self,
        obstacle: &Obstacle,
        operations: &[ConfiguredOperation],
        reduce_sizes: &[f64],
    ) -> Result<Vec<Vec<AffordanceRegion>>>;
}

/// Clusters mesh triangles whose normals satisfy an operation's requirement.
///
/// Triangles are neighbours when they share a vertex; vertices closer than
/// `vertex_tolerance` are treated as the same vertex.
#[derive(Debug, Clone)]
pub struct TriangleClusterExtractor {
    pub vertex_tolerance: f64,
}

impl Default for TriangleClusterExtractor {
    fn default() -> Self {
        Self {
            vertex_tolerance: 1e-9,
        }
    }
}

struct Face {
    triangle: Triangle,
    normal: Vector3<f64>,
    corners: [usize; 3],
}

/// Merges points closer than `tolerance` into one id.
///
/// Points are bucketed on a grid of `tolerance`-sized cells, so a lookup only compares
/// against the points in the 27 cells around the query.
struct VertexWelder {
    tolerance: f64,
    cell_size: f64,
    points: Vec<Point3<f64>>,
    cells: HashMap<[i64; 3], Vec<usize>>,
}

impl VertexWelder {
    fn new(tolerance: f64) -> Self {
        let tolerance = tolerance.max(0.0);
        Self {
            tolerance,
            cell_size: tolerance.max(1e-12),
            points: Vec::new(),
            cells: HashMap::new(),
        }
    }

    fn cell(&self, p: &Point3<f64>) -> [i64; 3] {
        // `as` saturates, which only makes far-away cells coarser.
        [
            (p.x / self.cell_size).floor() as i64,
            (p.y / self.cell_size).floor() as i64,
            (p.z / self.cell_size).floor() as i64,
        ]
    }

    fn weld(&mut self, p: Point3<f64>) -> usize {
        let [cx, cy, cz] = self.cell(&p);
        for dx in -1..=1 {
            for dy in -1..=1 {
                for dz in -1..=1 {
                    let key = [
                        cx.saturating_add(dx),
                        cy.saturating_add(dy),
                        cz.saturating_add(dz),
                    ];
                    let Some(ids) = self.cells.get(&key) else {
                        continue;
                    };
                    if let Some(&id) = ids
                        .iter()
                        .find(|&&id| (p - self.points[id]).norm() <= self.tolerance)
                    {
                        return id;
                    }
                }
            }
        }

        let id = self.points.len();
        self.points.push(p);
        self.cells.entry([cx, cy, cz]).or_default().push(id);
        id
    }
}

impl TriangleClusterExtractor {
    pub fn new(vertex_tolerance: f64) -> Self {
        Self { vertex_tolerance }
    }

    /// World-frame, non-degenerate faces with welded corner ids.
    fn faces(&self, obstacle: &Obstacle) -> Vec<Face> {
        let mut welder = VertexWelder::new(self.vertex_tolerance);
        obstacle
            .world_triangles()
            .into_iter()
            .filter_map(|triangle| {
                let normal = triangle.normal()?;
                let corners = [
                    welder.weld(triangle.v0),
                    welder.weld(triangle.v1),
                    welder.weld(triangle.v2),
                ];
                Some(Face {
                    triangle,
                    normal,
                    corners,
                })
            })
            .collect()
    }

    fn clusters(&self, faces: &[Face], operation: &ConfiguredOperation) -> Vec<AffordanceRegion> {
        let params = &operation.params;
        let requirement = &operation.descriptor.requirement;

        let candidate: Vec<bool> = faces
            .iter()
            .map(|f| requirement.accepts(&f.normal, params.margin))
            .collect();

        let mut faces_by_corner: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (index, face) in faces.iter().enumerate().filter(|(i, _)| candidate[*i]) {
            for corner in face.corners {
                faces_by_corner.entry(corner).or_default().push(index);
            }
        }

        let mut visited = vec![false; faces.len()];
        let mut regions = Vec::new();

        for seed in 0..faces.len() {
            if !candidate[seed] || visited[seed] {
                continue;
            }
            visited[seed] = true;
            let seed_normal = faces[seed].normal;
            let mut members = vec![seed];
            let mut queue = VecDeque::from([seed]);

            while let Some(current) = queue.pop_front() {
                for corner in faces[current].corners {
                    for &next in faces_by_corner.get(&corner).into_iter().flatten() {
                        if visited[next] {
                            continue;
                        }
                        if (faces[next].normal - seed_normal).norm()
                            < params.neighbouring_triangle_margin
                        {
                            visited[next] = true;
                            members.push(next);
                            queue.push_back(next);
                        }
                    }
                }
            }

            let region =
                AffordanceRegion::new(members.iter().map(|&i| faces[i].triangle).collect());
            if region.area() >= params.minimum_area {
                regions.push(region);
            }
        }

        regions
    }
}

impl AffordanceExtractor for TriangleClusterExtractor {
    fn extract(
        &self,
        obstacle: &Obstacle,
        operations: &[ConfiguredOperation],
        reduce_sizes: &[f64],
    ) -> Result<Vec<Vec<AffordanceRegion>>> {
        match obstacle.geometry.as_mesh() {
            Some(mesh) if mesh.is_well_formed() => {}
            Some(_) => {
                return Err(AffordError::InvalidArgument(format!(
                    "obstacle '{}' has a malformed triangle mesh",
                    obstacle.name
                )))
            }
            None => {
                return Err(AffordError::InvalidArgument(format!(
                    "obstacle '{}' has no triangle mesh",
                    obstacle.name
                )))
            }
        }
        if !reduce_sizes.is_empty() && reduce_sizes.len() != operations.len() {
            return Err(AffordError::InvalidArgument(format!(
                "{} reduce sizes given for {} operations",
                reduce_sizes.len(),
                operations.len()
            )));
        }

        let faces = self.faces(obstacle);

        let results = operations
            .iter()
            .enumerate()
            .map(|(i, operation)| {
                let regions = self.clusters(&faces, operation);
                let reduce = reduce_sizes.get(i).copied().unwrap_or(0.0);
                let regions: Vec<_> = if reduce > 0.0 {
                    regions
                        .into_iter()
                        .map(|r| r.shrunk(reduce))
                        .filter(|r| r.area() >= operation.params.minimum_area)
                        .collect()
                } else {
                    regions
                };
                debug!(
                    obstacle = %obstacle.name,
                    affordance = %operation.descriptor.affordance_type,
                    regions = regions.len(),
                    "extracted affordance regions"
                );
                regions
            })
            .collect();

        Ok(results)
    }
}
