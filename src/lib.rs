//! Affordance analysis bridge for a motion-planning problem store.
//!
//! This crate defines:
//! - [`Afford`]: the façade that configures affordance types and runs, queries and
//!   clears affordance analysis on obstacles.
//! - [`ProblemSolver`]: the store of named obstacles and the affordance results attached
//!   to them, shared with the host through a [`SharedProblemSolver`].
//! - [`AffordanceExtractor`]: the seam behind which surface extraction runs, with
//!   [`TriangleClusterExtractor`] as the bundled implementation.
//! - [`AffordanceServer`] / [`AffordanceClient`]: line-delimited JSON RPC over a local
//!   socket, serving one call at a time.

pub mod afford;
pub mod config;
pub mod error;
pub mod extraction;
pub mod geometry;
pub mod operation;
pub mod problem;
pub mod server;

pub use afford::{Afford, AffordancePoints};
pub use config::{ObstacleConfig, ServerConfig};
pub use error::{AffordError, ErrorKind, Result};
pub use extraction::{AffordanceExtractor, TriangleClusterExtractor};
pub use geometry::{AffordanceRegion, CollisionGeometry, Obstacle, Triangle, TriangleMesh};
pub use operation::{AffordanceParams, ConfiguredOperation, OperationDescriptor, Requirement};
pub use problem::{ProblemSolver, SharedProblemSolver};
pub use server::{AffordanceClient, AffordanceServer, Request, Response, ShutdownHandle};

/// Default IPC channel name (local socket / pipe).
///
/// On Unix we use a filesystem-backed socket in `/tmp` so clients in other processes can
/// discover it.
#[cfg(unix)]
pub const AFFORDANCE_IPC_NAME: &str = "/tmp/affordance_corba_pipe";

/// Default IPC channel name (non-Unix platforms).
#[cfg(not(unix))]
pub const AFFORDANCE_IPC_NAME: &str = "affordance_corba_pipe";
