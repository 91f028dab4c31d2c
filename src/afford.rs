//! The affordance façade.
//!
//! [`Afford`] owns the per-type affordance configuration and bridges every request to
//! the shared [`ProblemSolver`] and to an [`AffordanceExtractor`]. Calls are expected to
//! arrive one at a time; the store is still guarded by a lock so that a host may share
//! it with other components.
//!
//! Every mutating operation validates its inputs and finishes any extraction before it
//! touches the store, so a failed call leaves prior state unchanged. The one exception
//! is [`Afford::analyse_all`], which keeps the results of the obstacles that succeeded.

use std::collections::BTreeMap;
use std::sync::{RwLockReadGuard, RwLockWriteGuard};

use tracing::{debug, info, instrument, warn};

use crate::error::{AffordError, Result};
use crate::extraction::{AffordanceExtractor, TriangleClusterExtractor};
use crate::geometry::{AffordanceRegion, CollisionGeometry};
use crate::operation::{
    default_affordance_config, AffordanceParams, ConfiguredOperation, OperationDescriptor,
};
use crate::problem::{ProblemSolver, SharedProblemSolver};

/// Region → triangle → vertex → coordinate.
pub type AffordancePoints = Vec<Vec<Vec<Vec<f64>>>>;

/// Per-type affordance configuration plus every operation that works on the shared
/// store.
pub struct Afford {
    problem_solver: SharedProblemSolver,
    extractor: Box<dyn AffordanceExtractor>,
    configs: BTreeMap<String, AffordanceParams>,
}

impl std::fmt::Debug for Afford {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Afford")
            .field("configs", &self.configs)
            .finish_non_exhaustive()
    }
}

impl Afford {
    /// A façade with an empty configuration using the triangle clustering extractor.
    pub fn new(problem_solver: SharedProblemSolver) -> Self {
        Self::with_extractor(problem_solver, Box::new(TriangleClusterExtractor::default()))
    }

    /// A façade that delegates extraction to `extractor`.
    pub fn with_extractor(
        problem_solver: SharedProblemSolver,
        extractor: Box<dyn AffordanceExtractor>,
    ) -> Self {
        Self {
            problem_solver,
            extractor,
            configs: BTreeMap::new(),
        }
    }

    /// The store this façade reads from and writes to.
    pub fn problem_solver(&self) -> &SharedProblemSolver {
        &self.problem_solver
    }

    fn store(&self) -> Result<RwLockReadGuard<'_, ProblemSolver>> {
        self.problem_solver
            .read()
            .map_err(|_| AffordError::poisoned())
    }

    fn store_mut(&self) -> Result<RwLockWriteGuard<'_, ProblemSolver>> {
        self.problem_solver
            .write()
            .map_err(|_| AffordError::poisoned())
    }

    /// Forgets every configured type.
    pub fn reset_affordance_config(&mut self) {
        info!("resetting affordance configuration");
        self.configs.clear();
    }

    /// Inserts the `Support`, `Lean` and `Support45` presets, overwriting those types.
    pub fn load_default_affordance_config(&mut self) {
        for (affordance_type, params) in default_affordance_config() {
            self.set_affordance_params(affordance_type, params);
        }
    }

    /// Sets `[margin, neighbouringTriangleMargin, minimumArea]` for a type. Any other
    /// length is rejected with `InvalidArgument`.
    #[instrument(skip(self))]
    pub fn set_affordance_config(&mut self, affordance_type: &str, config: &[f64]) -> Result<()> {
        let params = AffordanceParams::from_slice(config)?;
        self.set_affordance_params(affordance_type, params);
        Ok(())
    }

    /// Typed form of [`Afford::set_affordance_config`].
    pub fn set_affordance_params(&mut self, affordance_type: &str, params: AffordanceParams) {
        self.configs.insert(affordance_type.to_string(), params);
    }

    /// The parameters of a configured type, `UnknownAffordanceType` otherwise.
    pub fn affordance_params(&self, affordance_type: &str) -> Result<AffordanceParams> {
        self.configs
            .get(affordance_type)
            .copied()
            .ok_or_else(|| AffordError::UnknownAffordanceType(affordance_type.to_string()))
    }

    /// The configured triple of a type, in `setAffordanceConfig` order.
    pub fn get_affordance_config(&self, affordance_type: &str) -> Result<Vec<f64>> {
        self.affordance_params(affordance_type).map(AffordanceParams::to_vec)
    }

    /// The single-field setters create the type with the other fields at zero when it is
    /// not configured yet.
    pub fn set_margin(&mut self, affordance_type: &str, margin: f64) {
        self.config_entry(affordance_type).margin = margin;
    }

    pub fn set_neighbouring_triangle_margin(&mut self, affordance_type: &str, margin: f64) {
        self.config_entry(affordance_type).neighbouring_triangle_margin = margin;
    }

    pub fn set_minimum_area(&mut self, affordance_type: &str, minimum_area: f64) {
        self.config_entry(affordance_type).minimum_area = minimum_area;
    }

    fn config_entry(&mut self, affordance_type: &str) -> &mut AffordanceParams {
        self.configs
            .entry(affordance_type.to_string())
            .or_insert_with(|| {
                debug!(affordance_type, "creating zeroed affordance configuration");
                AffordanceParams::default()
            })
    }

    /// Configured types, sorted.
    pub fn get_affordance_config_types(&self) -> Vec<String> {
        self.configs.keys().cloned().collect()
    }

    /// One descriptor per configured type with a known requirement, sorted by type.
    pub fn create_operations(&self) -> Vec<OperationDescriptor> {
        self.configs
            .keys()
            .filter_map(|affordance_type| {
                let descriptor = OperationDescriptor::standard(affordance_type);
                if descriptor.is_none() {
                    warn!(affordance_type = %affordance_type, "no requirement known, skipping");
                }
                descriptor
            })
            .collect()
    }

    /// Whether the obstacle carries a mesh that analysis will accept.
    pub fn check_model(&self, obstacle_name: &str) -> Result<bool> {
        let store = self.store()?;
        let obstacle = store.obstacle(obstacle_name)?;
        Ok(match &obstacle.geometry {
            CollisionGeometry::Mesh(mesh) => mesh.is_well_formed(),
            _ => false,
        })
    }

    /// Registered obstacle names, sorted.
    pub fn get_obstacle_names(&self) -> Result<Vec<String>> {
        Ok(self.store()?.obstacle_names())
    }

    /// Runs extraction on one obstacle and replaces its results for every analysed
    /// type. Returns the number of regions stored.
    ///
    /// Extraction runs without holding the store lock. If the obstacle was replaced or
    /// removed in the meantime the results are discarded and the call fails with
    /// `SystemFailure`.
    #[instrument(skip(self, operations), fields(operation_count = operations.len()))]
    pub fn affordance_analysis(
        &self,
        obstacle_name: &str,
        operations: &[OperationDescriptor],
        reduce_sizes: &[f64],
    ) -> Result<usize> {
        let obstacle = self.store()?.obstacle(obstacle_name)?.clone();
        let configured = self.configure(operations, reduce_sizes)?;

        let results = self
            .extractor
            .extract(&obstacle, &configured, reduce_sizes)?;
        if results.len() != configured.len() {
            return Err(AffordError::SystemFailure(format!(
                "extractor returned {} result sets for {} operations",
                results.len(),
                configured.len()
            )));
        }

        let mut by_type: BTreeMap<&str, Vec<AffordanceRegion>> = BTreeMap::new();
        for (operation, regions) in operations.iter().zip(results) {
            by_type
                .entry(operation.affordance_type.as_str())
                .or_default()
                .extend(regions);
        }

        let mut store = self.store_mut()?;
        if store.obstacle(obstacle_name).ok() != Some(&obstacle) {
            warn!(obstacle = obstacle_name, "obstacle changed during analysis");
            return Err(AffordError::SystemFailure(format!(
                "obstacle '{obstacle_name}' changed while it was being analysed"
            )));
        }
        let mut stored = 0;
        for (affordance_type, regions) in by_type {
            stored += regions.len();
            store.replace_affordances(obstacle_name, affordance_type, regions)?;
        }
        info!(obstacle = obstacle_name, regions = stored, "affordance analysis stored");
        Ok(stored)
    }

    fn configure(
        &self,
        operations: &[OperationDescriptor],
        reduce_sizes: &[f64],
    ) -> Result<Vec<ConfiguredOperation>> {
        validate_reduce_sizes(operations.len(), reduce_sizes)?;
        operations
            .iter()
            .map(|descriptor| -> Result<ConfiguredOperation> {
                descriptor.requirement.validate()?;
                Ok(ConfiguredOperation {
                    params: self.affordance_params(&descriptor.affordance_type)?,
                    descriptor: descriptor.clone(),
                })
            })
            .collect()
    }

    /// Analyses one obstacle with [`Afford::create_operations`].
    pub fn analyse_object(&self, obstacle_name: &str, reduce_sizes: &[f64]) -> Result<()> {
        let operations = self.default_operations()?;
        self.affordance_analysis(obstacle_name, &operations, reduce_sizes)
            .map(|_| ())
    }

    /// Analyses every obstacle in name order. Failing obstacles are skipped; the first
    /// failure is returned once all obstacles were attempted.
    #[instrument(skip(self))]
    pub fn analyse_all(&self, reduce_sizes: &[f64]) -> Result<()> {
        let operations = self.default_operations()?;
        validate_reduce_sizes(operations.len(), reduce_sizes)?;

        let names = self.store()?.obstacle_names();
        let mut first_error = None;
        for name in names {
            if let Err(err) = self.affordance_analysis(&name, &operations, reduce_sizes) {
                warn!(obstacle = %name, error = %err, "skipping obstacle");
                first_error.get_or_insert(err);
            }
        }

        match first_error {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn default_operations(&self) -> Result<Vec<OperationDescriptor>> {
        let operations = self.create_operations();
        if operations.is_empty() {
            return Err(AffordError::InvalidArgument(
                "no configured affordance type has a known requirement".to_string(),
            ));
        }
        Ok(operations)
    }

    /// Removes the results of one type for `obstacle_name`, or for all obstacles when
    /// the name is empty.
    pub fn delete_affordances_by_type(
        &self,
        affordance_type: &str,
        obstacle_name: &str,
    ) -> Result<()> {
        let mut store = self.store_mut()?;
        if obstacle_name.is_empty() {
            store.remove_affordance_type(affordance_type);
        } else {
            store.remove_affordances(obstacle_name, affordance_type)?;
        }
        info!(affordance_type, obstacle = obstacle_name, "deleted affordances");
        Ok(())
    }

    /// Removes all results of `obstacle_name`, or of every obstacle when the name is
    /// empty.
    pub fn delete_affordances(&self, obstacle_name: &str) -> Result<()> {
        let mut store = self.store_mut()?;
        if obstacle_name.is_empty() {
            store.clear_all_affordances();
        } else {
            store.clear_affordances(obstacle_name)?;
        }
        info!(obstacle = obstacle_name, "deleted affordances");
        Ok(())
    }

    /// Registers precomputed regions, `object_sets[i]` belonging to `operations[i]`.
    /// Regions are appended to existing results.
    pub fn add_aff_objects(
        &self,
        operations: &[OperationDescriptor],
        object_sets: Vec<Vec<AffordanceRegion>>,
        obstacle_name: &str,
    ) -> Result<()> {
        if operations.len() != object_sets.len() {
            return Err(AffordError::InvalidArgument(format!(
                "{} object sets given for {} operations",
                object_sets.len(),
                operations.len()
            )));
        }

        let mut store = self.store_mut()?;
        store.obstacle(obstacle_name)?;
        for (operation, regions) in operations.iter().zip(object_sets) {
            store.append_affordances(obstacle_name, &operation.affordance_type, regions)?;
        }
        Ok(())
    }

    /// Vertex coordinates of every stored region of one type, ordered by obstacle name.
    pub fn get_affordance_points(&self, affordance_type: &str) -> Result<AffordancePoints> {
        Ok(self
            .store()?
            .affordances_of_type(affordance_type)
            .map(|(_, region)| region.to_points())
            .collect())
    }

    /// Owner of each entry of [`Afford::get_affordance_points`], index for index.
    pub fn get_aff_ref_obstacles(&self, affordance_type: &str) -> Result<Vec<String>> {
        Ok(self
            .store()?
            .affordances_of_type(affordance_type)
            .map(|(obstacle, _)| obstacle.to_string())
            .collect())
    }

    /// Types with at least one stored region, sorted.
    pub fn get_affordance_types(&self) -> Result<Vec<String>> {
        Ok(self.store()?.affordance_types().into_iter().collect())
    }
}

fn validate_reduce_sizes(operations: usize, reduce_sizes: &[f64]) -> Result<()> {
    if !reduce_sizes.is_empty() && reduce_sizes.len() != operations {
        return Err(AffordError::InvalidArgument(format!(
            "{} reduce sizes given for {operations} operations",
            reduce_sizes.len()
        )));
    }
    if let Some(bad) = reduce_sizes.iter().find(|r| !r.is_finite() || **r < 0.0) {
        return Err(AffordError::InvalidArgument(format!(
            "reduce size {bad} must be finite and non-negative"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::{horizontal_quad, Obstacle, Triangle};
    use crate::operation::{Requirement, LEAN, SUPPORT};

    fn facade_with(obstacles: Vec<Obstacle>) -> Afford {
        let mut store = ProblemSolver::new();
        for obstacle in obstacles {
            store.add_obstacle(obstacle);
        }
        Afford::new(store.shared())
    }

    fn floor() -> Obstacle {
        Obstacle::new(
            "floor",
            CollisionGeometry::Mesh(horizontal_quad([-1.0, -1.0], [1.0, 1.0], 0.0)),
        )
    }

    fn step() -> Obstacle {
        Obstacle::new(
            "step",
            CollisionGeometry::Mesh(horizontal_quad([2.0, 0.0], [2.5, 0.5], 0.15)),
        )
    }

    fn support_ops() -> Vec<OperationDescriptor> {
        vec![OperationDescriptor::new(SUPPORT, Requirement::Support)]
    }

    #[test]
    fn config_round_trips() {
        let mut afford = facade_with(vec![]);
        afford.set_affordance_config("Support", &[0.01, 0.02, 0.001]).unwrap();
        assert_eq!(
            afford.get_affordance_config("Support").unwrap(),
            vec![0.01, 0.02, 0.001]
        );
    }

    #[test]
    fn config_needs_three_values() {
        let mut afford = facade_with(vec![]);
        let err = afford.set_affordance_config("Support", &[0.1, 0.2]).unwrap_err();
        assert!(matches!(err, AffordError::InvalidArgument(_)));
        assert!(afford.get_affordance_config_types().is_empty());
    }

    #[test]
    fn unknown_type_is_not_found_on_fresh_facade() {
        let afford = facade_with(vec![]);
        let err = afford.get_affordance_config("Unknown").unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::NotFound);
    }

    #[test]
    fn reset_empties_the_configuration() {
        let mut afford = facade_with(vec![]);
        afford.load_default_affordance_config();
        assert_eq!(
            afford.get_affordance_config_types(),
            vec!["Lean", "Support", "Support45"]
        );
        afford.reset_affordance_config();
        assert!(afford.get_affordance_config_types().is_empty());
        assert!(afford.get_affordance_config("Support").is_err());
    }

    #[test]
    fn single_field_setters_create_zeroed_entries() {
        let mut afford = facade_with(vec![]);
        afford.set_margin("Climb", 0.4);
        assert_eq!(afford.get_affordance_config("Climb").unwrap(), vec![0.4, 0.0, 0.0]);

        afford.set_neighbouring_triangle_margin("Climb", 0.2);
        afford.set_minimum_area("Climb", 0.05);
        assert_eq!(afford.get_affordance_config("Climb").unwrap(), vec![0.4, 0.2, 0.05]);

        afford.set_minimum_area("Other", 1.0);
        assert_eq!(afford.get_affordance_config("Other").unwrap(), vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn check_model_distinguishes_meshes_from_primitives() {
        let afford = facade_with(vec![
            floor(),
            Obstacle::new("ball", CollisionGeometry::Sphere { radius: 0.3 }),
        ]);
        assert!(afford.check_model("floor").unwrap());
        assert!(!afford.check_model("ball").unwrap());
        assert!(matches!(
            afford.check_model("ghost"),
            Err(AffordError::UnknownObstacle(_))
        ));
    }

    #[test]
    fn analyse_object_finds_support_on_floor() {
        let mut afford = facade_with(vec![floor()]);
        afford.set_affordance_config("Support", &[0.01, 0.02, 0.001]).unwrap();

        afford.analyse_object("floor", &[]).unwrap();

        assert!(afford
            .get_affordance_types()
            .unwrap()
            .contains(&"Support".to_string()));
        let points = afford.get_affordance_points("Support").unwrap();
        assert!(!points.is_empty());
        // two triangles, three vertices each, xyz
        assert_eq!(points[0].len(), 2);
        assert_eq!(points[0][0].len(), 3);
        assert_eq!(points[0][0][0].len(), 3);
    }

    #[test]
    fn analysis_on_unknown_obstacle_is_not_found() {
        let mut afford = facade_with(vec![]);
        afford.load_default_affordance_config();
        assert!(matches!(
            afford.affordance_analysis("floor", &support_ops(), &[]),
            Err(AffordError::UnknownObstacle(_))
        ));
    }

    #[test]
    fn analysis_of_unconfigured_type_is_not_found() {
        let afford = facade_with(vec![floor()]);
        assert!(matches!(
            afford.affordance_analysis("floor", &support_ops(), &[]),
            Err(AffordError::UnknownAffordanceType(_))
        ));
    }

    #[test]
    fn mismatched_reduce_sizes_leave_results_untouched() {
        let mut afford = facade_with(vec![floor()]);
        afford.load_default_affordance_config();
        afford.affordance_analysis("floor", &support_ops(), &[]).unwrap();
        let before = afford.get_affordance_points("Support").unwrap();

        let err = afford
            .affordance_analysis("floor", &support_ops(), &[0.1, 0.1])
            .unwrap_err();
        assert!(matches!(err, AffordError::InvalidArgument(_)));
        assert_eq!(afford.get_affordance_points("Support").unwrap(), before);
    }

    #[test]
    fn negative_reduce_size_is_rejected() {
        let mut afford = facade_with(vec![floor()]);
        afford.load_default_affordance_config();
        assert!(matches!(
            afford.affordance_analysis("floor", &support_ops(), &[-0.1]),
            Err(AffordError::InvalidArgument(_))
        ));
    }

    #[test]
    fn reanalysis_replaces_prior_results() {
        let mut afford = facade_with(vec![floor()]);
        afford.load_default_affordance_config();
        afford.affordance_analysis("floor", &support_ops(), &[]).unwrap();
        afford.affordance_analysis("floor", &support_ops(), &[]).unwrap();
        assert_eq!(afford.get_aff_ref_obstacles("Support").unwrap(), vec!["floor"]);
    }

    #[test]
    fn delete_by_type_removes_only_that_obstacle_slice() {
        let mut afford = facade_with(vec![floor(), step()]);
        afford.load_default_affordance_config();
        afford.analyse_all(&[]).unwrap();
        assert_eq!(
            afford.get_aff_ref_obstacles("Support").unwrap(),
            vec!["floor", "step"]
        );

        afford.delete_affordances_by_type("Support", "floor").unwrap();
        assert_eq!(afford.get_aff_ref_obstacles("Support").unwrap(), vec!["step"]);
        assert_eq!(afford.get_affordance_points("Support").unwrap().len(), 1);

        // missing slice is a no-op, unknown obstacle is not
        afford.delete_affordances_by_type("Support", "floor").unwrap();
        assert!(afford.delete_affordances_by_type("Support", "ghost").is_err());
    }

    #[test]
    fn delete_by_type_with_empty_name_covers_all_obstacles() {
        let mut afford = facade_with(vec![floor(), step()]);
        afford.load_default_affordance_config();
        afford.analyse_all(&[]).unwrap();
        afford.delete_affordances_by_type("Support", "").unwrap();
        assert!(afford.get_affordance_points("Support").unwrap().is_empty());
    }

    #[test]
    fn delete_affordances_clears_every_type_of_an_obstacle() {
        let mut afford = facade_with(vec![floor(), step()]);
        afford.set_affordance_config(SUPPORT, &[0.3, 0.3, 0.0]).unwrap();
        afford.set_affordance_config(LEAN, &[0.1, 0.3, 0.0]).unwrap();
        afford.analyse_all(&[]).unwrap();
        let region = AffordanceRegion::new(vec![Triangle::from_arrays(
            [2.0, 0.0, 0.0],
            [2.0, 1.0, 0.0],
            [2.0, 0.0, 1.0],
        )]);
        afford
            .add_aff_objects(
                &[OperationDescriptor::new(LEAN, Requirement::Lean)],
                vec![vec![region]],
                "step",
            )
            .unwrap();

        afford.delete_affordances("step").unwrap();
        for ty in [SUPPORT, LEAN] {
            assert!(!afford
                .get_aff_ref_obstacles(ty)
                .unwrap()
                .contains(&"step".to_string()));
        }
        assert_eq!(afford.get_aff_ref_obstacles(SUPPORT).unwrap(), vec!["floor"]);

        afford.delete_affordances("").unwrap();
        assert!(afford.get_affordance_types().unwrap().is_empty());
    }

    #[test]
    fn points_and_ref_obstacles_stay_parallel() {
        let mut afford = facade_with(vec![floor(), step()]);
        afford.load_default_affordance_config();
        afford.analyse_all(&[]).unwrap();
        let extra = AffordanceRegion::new(vec![Triangle::from_arrays(
            [0.0, 0.0, 0.0],
            [0.1, 0.0, 0.0],
            [0.0, 0.1, 0.0],
        )]);
        afford
            .add_aff_objects(&support_ops(), vec![vec![extra.clone(), extra]], "floor")
            .unwrap();

        let points = afford.get_affordance_points(SUPPORT).unwrap();
        let owners = afford.get_aff_ref_obstacles(SUPPORT).unwrap();
        assert_eq!(points.len(), owners.len());
        assert_eq!(owners, vec!["floor", "floor", "floor", "step"]);
        // the step sits at z = 0.15
        assert!(points[3]
            .iter()
            .flatten()
            .all(|vertex| (vertex[2] - 0.15).abs() < 1e-12));
    }

    #[test]
    fn add_aff_objects_validates_before_mutating() {
        let afford = facade_with(vec![floor()]);
        let err = afford
            .add_aff_objects(&support_ops(), vec![], "floor")
            .unwrap_err();
        assert!(matches!(err, AffordError::InvalidArgument(_)));

        let err = afford
            .add_aff_objects(&support_ops(), vec![vec![]], "ghost")
            .unwrap_err();
        assert!(matches!(err, AffordError::UnknownObstacle(_)));
        assert!(afford.get_affordance_types().unwrap().is_empty());
    }

    #[test]
    fn analyse_all_skips_failures_and_reports_the_first() {
        let mut afford = facade_with(vec![
            Obstacle::new("ball", CollisionGeometry::Sphere { radius: 0.3 }),
            floor(),
        ]);
        afford.load_default_affordance_config();

        let err = afford.analyse_all(&[]).unwrap_err();
        assert!(matches!(err, AffordError::InvalidArgument(_)));
        assert_eq!(afford.get_aff_ref_obstacles(SUPPORT).unwrap(), vec!["floor"]);
    }

    #[test]
    fn analyse_all_checks_reduce_sizes_up_front() {
        let mut afford = facade_with(vec![floor()]);
        afford.load_default_affordance_config();
        assert!(afford.analyse_all(&[0.1]).is_err());
        assert!(afford.get_affordance_types().unwrap().is_empty());

        afford.analyse_all(&[0.0, 0.1, 0.0]).unwrap();
        assert!(!afford.get_affordance_points(SUPPORT).unwrap().is_empty());
    }

    #[test]
    fn analyse_object_without_known_types_fails() {
        let mut afford = facade_with(vec![floor()]);
        afford.set_margin("Climb", 0.1);
        assert!(matches!(
            afford.analyse_object("floor", &[]),
            Err(AffordError::InvalidArgument(_))
        ));
        assert!(afford.create_operations().is_empty());
    }

    #[test]
    fn explicit_descriptors_analyse_custom_types() {
        let mut afford = facade_with(vec![floor()]);
        afford.set_affordance_config("Ceiling", &[0.1, 0.1, 0.0]).unwrap();
        let ops = [OperationDescriptor::new(
            "Ceiling",
            Requirement::Facing {
                direction: nalgebra::Vector3::z(),
            },
        )];
        assert_eq!(afford.affordance_analysis("floor", &ops, &[]).unwrap(), 1);
        assert_eq!(afford.get_affordance_types().unwrap(), vec!["Ceiling"]);
    }

    #[test]
    fn malformed_mesh_fails_check_and_analysis_alike() {
        let mut mesh = horizontal_quad([0.0, 0.0], [1.0, 1.0], 0.0);
        mesh.triangles.push([0, 1, 99]);
        let broken = Obstacle::new("broken", CollisionGeometry::Mesh(mesh));
        let mut afford = facade_with(vec![broken]);
        afford.load_default_affordance_config();

        assert!(!afford.check_model("broken").unwrap());
        assert!(matches!(
            afford.analyse_object("broken", &[]),
            Err(AffordError::InvalidArgument(_))
        ));
        assert!(afford.get_affordance_types().unwrap().is_empty());
    }

    /// Swaps the analysed obstacle for a new one while extraction is running.
    struct ReplacingExtractor {
        store: SharedProblemSolver,
        inner: TriangleClusterExtractor,
    }

    impl AffordanceExtractor for ReplacingExtractor {
        fn extract(
            &self,
            obstacle: &Obstacle,
            operations: &[ConfiguredOperation],
            reduce_sizes: &[f64],
        ) -> Result<Vec<Vec<AffordanceRegion>>> {
            let results = self.inner.extract(obstacle, operations, reduce_sizes)?;
            let replacement = Obstacle::new(
                obstacle.name.clone(),
                CollisionGeometry::Mesh(horizontal_quad([5.0, 5.0], [6.0, 6.0], 1.0)),
            );
            self.store.write().unwrap().add_obstacle(replacement);
            Ok(results)
        }
    }

    #[test]
    fn results_for_a_replaced_obstacle_are_discarded() {
        let mut store = ProblemSolver::new();
        store.add_obstacle(floor());
        let store = store.shared();
        let mut afford = Afford::with_extractor(
            store.clone(),
            Box::new(ReplacingExtractor {
                store: store.clone(),
                inner: TriangleClusterExtractor::default(),
            }),
        );
        afford.load_default_affordance_config();

        let err = afford
            .affordance_analysis("floor", &support_ops(), &[])
            .unwrap_err();
        assert!(matches!(err, AffordError::SystemFailure(_)));
        assert!(afford.get_affordance_types().unwrap().is_empty());

        // The replacement is what the store now holds.
        let floor = store.read().unwrap().obstacle("floor").unwrap().clone();
        assert!(floor
            .world_triangles()
            .iter()
            .all(|t| (t.v0.z - 1.0).abs() < 1e-12));
    }
}
