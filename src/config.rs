//! Server configuration and bootstrap.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use nalgebra::{Isometry3, Vector3};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::afford::Afford;
use crate::error::{AffordError, Result};
use crate::geometry::{CollisionGeometry, Obstacle};
use crate::operation::AffordanceParams;
use crate::problem::{ProblemSolver, SharedProblemSolver};
use crate::server::AffordanceServer;
use crate::AFFORDANCE_IPC_NAME;

/// Configuration of the `affordance-server` binary, read from JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_ipc_name")]
    pub ipc_name: String,
    /// `tracing_subscriber` filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_log_filter")]
    pub log_filter: String,
    #[serde(default = "default_true")]
    pub load_default_affordance_config: bool,
    /// Applied after the defaults.
    #[serde(default)]
    pub affordance_config: BTreeMap<String, AffordanceParams>,
    #[serde(default)]
    pub obstacles: Vec<ObstacleConfig>,
    #[serde(default)]
    pub analyse_on_startup: bool,
}

fn default_ipc_name() -> String {
    AFFORDANCE_IPC_NAME.to_string()
}

fn default_log_filter() -> String {
    "info".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            ipc_name: default_ipc_name(),
            log_filter: default_log_filter(),
            load_default_affordance_config: true,
            affordance_config: BTreeMap::new(),
            obstacles: Vec::new(),
            analyse_on_startup: false,
        }
    }
}

/// An obstacle to register at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObstacleConfig {
    pub name: String,
    pub geometry: CollisionGeometry,
    #[serde(default)]
    pub translation: [f64; 3],
    /// Scaled rotation axis (axis × angle in radians).
    #[serde(default)]
    pub rotation: [f64; 3],
}

impl ObstacleConfig {
    pub fn to_obstacle(&self) -> Obstacle {
        Obstacle::new(self.name.clone(), self.geometry.clone()).with_pose(Isometry3::new(
            Vector3::from(self.translation),
            Vector3::from(self.rotation),
        ))
    }
}

impl ServerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.ipc_name.trim().is_empty() {
            return Err(AffordError::InvalidArgument(
                "ipc_name cannot be empty".to_string(),
            ));
        }
        if self.log_filter.trim().is_empty() {
            return Err(AffordError::InvalidArgument(
                "log_filter cannot be empty".to_string(),
            ));
        }
        let mut seen = BTreeSet::new();
        for obstacle in &self.obstacles {
            if obstacle.name.is_empty() {
                return Err(AffordError::InvalidArgument(
                    "obstacle names cannot be empty".to_string(),
                ));
            }
            if !seen.insert(obstacle.name.as_str()) {
                return Err(AffordError::InvalidArgument(format!(
                    "obstacle '{}' is listed twice",
                    obstacle.name
                )));
            }
        }
        Ok(())
    }

    pub fn populate(&self, store: &mut ProblemSolver) {
        for obstacle in &self.obstacles {
            store.add_obstacle(obstacle.to_obstacle());
        }
    }

    pub fn build_afford(&self, problem_solver: SharedProblemSolver) -> Afford {
        let mut afford = Afford::new(problem_solver);
        if self.load_default_affordance_config {
            afford.load_default_affordance_config();
        }
        for (affordance_type, params) in &self.affordance_config {
            afford.set_affordance_params(affordance_type, *params);
        }
        afford
    }

    /// Builds the store and the façade, optionally analyses the scene, and binds the
    /// server.
    pub fn start(&self) -> Result<AffordanceServer> {
        let mut store = ProblemSolver::new();
        self.populate(&mut store);
        let afford = self.build_afford(store.shared());
        info!(
            obstacles = self.obstacles.len(),
            affordance_types = ?afford.get_affordance_config_types(),
            "problem loaded"
        );

        if self.analyse_on_startup {
            if let Err(err) = afford.analyse_all(&[]) {
                warn!(error = %err, "startup analysis incomplete");
            }
        }

        AffordanceServer::bind(&self.ipc_name, afford)
    }
}
