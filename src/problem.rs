//! The planning problem store: registered obstacles and the affordance results
//! attached to them.
//!
//! The store is owned by the host and handed to the façade as a
//! [`SharedProblemSolver`]. Affordance results are kept per obstacle and per
//! affordance type; a slice that would become empty is removed so that only types with
//! at least one region are ever reported.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, RwLock};

use tracing::info;

use crate::error::{AffordError, Result};
use crate::geometry::{AffordanceRegion, Obstacle};

/// Handle shared between the host process and the façade.
pub type SharedProblemSolver = Arc<RwLock<ProblemSolver>>;

type AffordanceSlices = BTreeMap<String, Vec<AffordanceRegion>>;

/// Named obstacles plus the affordance regions computed for them.
#[derive(Debug, Default)]
pub struct ProblemSolver {
    obstacles: BTreeMap<String, Obstacle>,
    /// obstacle name → affordance type → regions
    affordances: BTreeMap<String, AffordanceSlices>,
}

impl ProblemSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps the store so the host and the façade can both reach it.
    pub fn shared(self) -> SharedProblemSolver {
        Arc::new(RwLock::new(self))
    }

    /// Registers an obstacle, replacing (and clearing the results of) any obstacle with
    /// the same name.
    pub fn add_obstacle(&mut self, obstacle: Obstacle) -> Option<Obstacle> {
        info!(obstacle = %obstacle.name, "registering obstacle");
        self.affordances.remove(&obstacle.name);
        self.obstacles.insert(obstacle.name.clone(), obstacle)
    }

    /// Unregisters an obstacle together with every result attached to it.
    pub fn remove_obstacle(&mut self, name: &str) -> Option<Obstacle> {
        if self.obstacles.contains_key(name) {
            info!(obstacle = name, "removing obstacle");
        }
        self.affordances.remove(name);
        self.obstacles.remove(name)
    }

    /// Looks up an obstacle, failing with `UnknownObstacle` when it is not registered.
    pub fn obstacle(&self, name: &str) -> Result<&Obstacle> {
        self.obstacles
            .get(name)
            .ok_or_else(|| AffordError::UnknownObstacle(name.to_string()))
    }

    /// Obstacles in name order.
    pub fn obstacles(&self) -> impl Iterator<Item = &Obstacle> {
        self.obstacles.values()
    }

    /// Registered names, sorted.
    pub fn obstacle_names(&self) -> Vec<String> {
        self.obstacles.keys().cloned().collect()
    }

    /// Replaces the `(obstacle, type)` slice. An empty `regions` removes it.
    pub fn replace_affordances(
        &mut self,
        obstacle: &str,
        affordance_type: &str,
        regions: Vec<AffordanceRegion>,
    ) -> Result<()> {
        self.obstacle(obstacle)?;
        let slices = self.affordances.entry(obstacle.to_string()).or_default();
        if regions.is_empty() {
            slices.remove(affordance_type);
        } else {
            slices.insert(affordance_type.to_string(), regions);
        }
        self.prune(obstacle);
        Ok(())
    }

    /// Appends regions to the `(obstacle, type)` slice.
    pub fn append_affordances(
        &mut self,
        obstacle: &str,
        affordance_type: &str,
        regions: Vec<AffordanceRegion>,
    ) -> Result<()> {
        self.obstacle(obstacle)?;
        if regions.is_empty() {
            return Ok(());
        }
        self.affordances
            .entry(obstacle.to_string())
            .or_default()
            .entry(affordance_type.to_string())
            .or_default()
            .extend(regions);
        Ok(())
    }

    /// Removes the `(obstacle, type)` slice; a missing slice is not an error.
    pub fn remove_affordances(&mut self, obstacle: &str, affordance_type: &str) -> Result<()> {
        self.obstacle(obstacle)?;
        if let Some(slices) = self.affordances.get_mut(obstacle) {
            slices.remove(affordance_type);
        }
        self.prune(obstacle);
        Ok(())
    }

    /// Removes every slice attached to `obstacle`.
    pub fn clear_affordances(&mut self, obstacle: &str) -> Result<()> {
        self.obstacle(obstacle)?;
        self.affordances.remove(obstacle);
        Ok(())
    }

    /// Removes the slices of one type across all obstacles.
    pub fn remove_affordance_type(&mut self, affordance_type: &str) {
        for slices in self.affordances.values_mut() {
            slices.remove(affordance_type);
        }
        self.affordances.retain(|_, slices| !slices.is_empty());
    }

    /// Drops every stored result; obstacles stay registered.
    pub fn clear_all_affordances(&mut self) {
        self.affordances.clear();
    }

    /// `(obstacle name, region)` pairs of one type, ordered by obstacle name then
    /// insertion order.
    pub fn affordances_of_type<'a>(
        &'a self,
        affordance_type: &'a str,
    ) -> impl Iterator<Item = (&'a str, &'a AffordanceRegion)> + 'a {
        self.affordances.iter().flat_map(move |(obstacle, slices)| {
            slices
                .get(affordance_type)
                .into_iter()
                .flatten()
                .map(move |region| (obstacle.as_str(), region))
        })
    }

    /// The regions of one `(obstacle, type)` slice, empty when nothing is stored.
    pub fn affordances_of(&self, obstacle: &str, affordance_type: &str) -> &[AffordanceRegion] {
        self.affordances
            .get(obstacle)
            .and_then(|slices| slices.get(affordance_type))
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Types with at least one stored region.
    pub fn affordance_types(&self) -> BTreeSet<String> {
        self.affordances
            .values()
            .flat_map(|slices| slices.keys().cloned())
            .collect()
    }

    fn prune(&mut self, obstacle: &str) {
        if self
            .affordances
            .get(obstacle)
            .is_some_and(|slices| slices.is_empty())
        {
            self.affordances.remove(obstacle);
        }
    }
}
