//! Line-delimited JSON RPC over a local socket.
//!
//! Each request is one JSON object on its own line, answered by exactly one JSON line.
//! The server serves one connection at a time and one request at a time, so calls
//! reach the façade strictly serialized.

use std::io::{BufRead, BufReader, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use interprocess::local_socket::{LocalSocketListener, LocalSocketStream};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::afford::{Afford, AffordancePoints};
use crate::error::{AffordError, ErrorKind, Result};
use crate::geometry::AffordanceRegion;
use crate::operation::OperationDescriptor;

/// One RPC call. The `method` tag carries the operation name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "method",
    content = "params",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum Request {
    ResetAffordanceConfig,
    SetAffordanceConfig {
        affordance_type: String,
        config: Vec<f64>,
    },
    GetAffordanceConfig {
        affordance_type: String,
    },
    SetMargin {
        affordance_type: String,
        margin: f64,
    },
    SetNeighbouringTriangleMargin {
        affordance_type: String,
        margin: f64,
    },
    SetMinimumArea {
        affordance_type: String,
        minimum_area: f64,
    },
    CheckModel {
        obstacle_name: String,
    },
    AffordanceAnalysis {
        obstacle_name: String,
        operations: Vec<OperationDescriptor>,
        #[serde(default)]
        reduce_sizes: Vec<f64>,
    },
    AnalyseObject {
        obstacle_name: String,
        #[serde(default)]
        reduce_sizes: Vec<f64>,
    },
    AnalyseAll {
        #[serde(default)]
        reduce_sizes: Vec<f64>,
    },
    DeleteAffordancesByType {
        affordance_type: String,
        #[serde(default)]
        obstacle_name: String,
    },
    DeleteAffordances {
        #[serde(default)]
        obstacle_name: String,
    },
    AddAffObjects {
        operations: Vec<OperationDescriptor>,
        object_sets: Vec<Vec<AffordanceRegion>>,
        obstacle_name: String,
    },
    GetAffordancePoints {
        affordance_type: String,
    },
    GetAffRefObstacles {
        affordance_type: String,
    },
    GetAffordanceTypes,
    GetAffordanceConfigTypes,
    CreateOperations,
    GetObstacleNames,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
    Ok { result: Value },
    Error { kind: ErrorKind, message: String },
}

impl Response {
    pub fn from_result<T: Serialize>(result: Result<T>) -> Self {
        match result.and_then(|value| Ok(serde_json::to_value(value)?)) {
            Ok(result) => Response::Ok { result },
            Err(err) => Response::from_error(&err),
        }
    }

    pub fn from_error(err: &AffordError) -> Self {
        Response::Error {
            kind: err.kind(),
            message: err.to_string(),
        }
    }

    pub fn into_result<T: DeserializeOwned>(self) -> Result<T> {
        match self {
            Response::Ok { result } => Ok(serde_json::from_value(result)?),
            Response::Error { kind, message } => Err(AffordError::Remote { kind, message }),
        }
    }
}

/// Serves an [`Afford`] façade on a local socket.
pub struct AffordanceServer {
    listener: LocalSocketListener,
    ipc_name: String,
    afford: Afford,
    stopping: Arc<AtomicBool>,
}

/// Asks a running [`AffordanceServer::process_requests`] loop to return.
///
/// The handle is `Send`, so it can be used from a signal handler or another thread while
/// the server blocks in `accept`.
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    ipc_name: String,
    stopping: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// Flags the server as stopping and wakes a blocked `accept` with a throwaway
    /// connection. The loop returns once the connection it is currently serving ends.
    pub fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(ipc_name = %self.ipc_name, "stop requested");
        if let Err(err) = LocalSocketStream::connect(self.ipc_name.as_str()) {
            debug!(error = %err, "wake-up connection failed; server already gone");
        }
    }

    pub fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

impl Drop for AffordanceServer {
    fn drop(&mut self) {
        info!(ipc_name = %self.ipc_name, "affordance server shutting down");
        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(&self.ipc_name);
        }
    }
}

impl std::fmt::Debug for AffordanceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AffordanceServer")
            .field("ipc_name", &self.ipc_name)
            .field("afford", &self.afford)
            .finish()
    }
}

impl AffordanceServer {
    /// Binds the listener, removing a socket file left behind by a previous run.
    pub fn bind(ipc_name: &str, afford: Afford) -> Result<Self> {
        #[cfg(unix)]
        {
            let _ = std::fs::remove_file(ipc_name);
        }

        let listener = LocalSocketListener::bind(ipc_name).map_err(|e| {
            AffordError::SystemFailure(format!("failed to bind IPC server ({ipc_name}): {e}"))
        })?;
        info!(ipc_name, "affordance server bound");

        Ok(Self {
            listener,
            ipc_name: ipc_name.to_string(),
            afford,
            stopping: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn ipc_name(&self) -> &str {
        &self.ipc_name
    }

    pub fn afford(&self) -> &Afford {
        &self.afford
    }

    /// A handle that stops [`process_requests`](Self::process_requests) from another
    /// thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            ipc_name: self.ipc_name.clone(),
            stopping: Arc::clone(&self.stopping),
        }
    }

    /// Accepts connections and serves each one until the client hangs up. Returns after
    /// the first connection unless `loop_forever` is set, and as soon as a
    /// [`ShutdownHandle`] has asked it to stop.
    pub fn process_requests(&mut self, loop_forever: bool) -> Result<()> {
        loop {
            if self.stopping.load(Ordering::SeqCst) {
                info!("request loop stopped");
                return Ok(());
            }
            let stream = self.listener.accept()?;
            if self.stopping.load(Ordering::SeqCst) {
                info!("request loop stopped");
                return Ok(());
            }
            debug!("client connected");
            if let Err(err) = self.serve_connection(stream) {
                warn!(error = %err, "client connection dropped");
            }
            if !loop_forever {
                return Ok(());
            }
        }
    }

    fn serve_connection(&mut self, stream: LocalSocketStream) -> std::io::Result<()> {
        let mut reader = BufReader::new(stream);
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line)? == 0 {
                debug!("client disconnected");
                return Ok(());
            }
            if line.trim().is_empty() {
                continue;
            }

            let response = self.handle_line(&line);
            let mut payload = serde_json::to_string(&response)?;
            payload.push('\n');
            let stream = reader.get_mut();
            stream.write_all(payload.as_bytes())?;
            stream.flush()?;
        }
    }

    pub(crate) fn handle_line(&mut self, line: &str) -> Response {
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.dispatch(request),
            Err(e) => Response::from_error(&AffordError::InvalidArgument(format!(
                "malformed request: {e}"
            ))),
        }
    }

    /// Runs one request against the façade.
    pub fn dispatch(&mut self, request: Request) -> Response {
        debug!(?request, "dispatching");
        let afford = &mut self.afford;
        match request {
            Request::ResetAffordanceConfig => {
                afford.reset_affordance_config();
                Response::from_result(Ok(()))
            }
            Request::SetAffordanceConfig {
                affordance_type,
                config,
            } => Response::from_result(afford.set_affordance_config(&affordance_type, &config)),
            Request::GetAffordanceConfig { affordance_type } => {
                Response::from_result(afford.get_affordance_config(&affordance_type))
            }
            Request::SetMargin {
                affordance_type,
                margin,
            } => {
                afford.set_margin(&affordance_type, margin);
                Response::from_result(Ok(()))
            }
            Request::SetNeighbouringTriangleMargin {
                affordance_type,
                margin,
            } => {
                afford.set_neighbouring_triangle_margin(&affordance_type, margin);
                Response::from_result(Ok(()))
            }
            Request::SetMinimumArea {
                affordance_type,
                minimum_area,
            } => {
                afford.set_minimum_area(&affordance_type, minimum_area);
                Response::from_result(Ok(()))
            }
            Request::CheckModel { obstacle_name } => {
                Response::from_result(afford.check_model(&obstacle_name))
            }
            Request::AffordanceAnalysis {
                obstacle_name,
                operations,
                reduce_sizes,
            } => Response::from_result(afford.affordance_analysis(
                &obstacle_name,
                &operations,
                &reduce_sizes,
            )),
            Request::AnalyseObject {
                obstacle_name,
                reduce_sizes,
            } => Response::from_result(afford.analyse_object(&obstacle_name, &reduce_sizes)),
            Request::AnalyseAll { reduce_sizes } => {
                Response::from_result(afford.analyse_all(&reduce_sizes))
            }
            Request::DeleteAffordancesByType {
                affordance_type,
                obstacle_name,
            } => Response::from_result(
                afford.delete_affordances_by_type(&affordance_type, &obstacle_name),
            ),
            Request::DeleteAffordances { obstacle_name } => {
                Response::from_result(afford.delete_affordances(&obstacle_name))
            }
            Request::AddAffObjects {
                operations,
                object_sets,
                obstacle_name,
            } => Response::from_result(afford.add_aff_objects(
                &operations,
                object_sets,
                &obstacle_name,
            )),
            Request::GetAffordancePoints { affordance_type } => {
                Response::from_result(afford.get_affordance_points(&affordance_type))
            }
            Request::GetAffRefObstacles { affordance_type } => {
                Response::from_result(afford.get_aff_ref_obstacles(&affordance_type))
            }
            Request::GetAffordanceTypes => Response::from_result(afford.get_affordance_types()),
            Request::GetAffordanceConfigTypes => {
                Response::from_result(Ok(afford.get_affordance_config_types()))
            }
            Request::CreateOperations => Response::from_result(Ok(afford.create_operations())),
            Request::GetObstacleNames => Response::from_result(afford.get_obstacle_names()),
        }
    }
}

/// Typed client for an [`AffordanceServer`].
pub struct AffordanceClient {
    stream: BufReader<LocalSocketStream>,
}

impl AffordanceClient {
    pub fn connect(ipc_name: &str) -> Result<Self> {
        let stream = LocalSocketStream::connect(ipc_name).map_err(|e| {
            AffordError::SystemFailure(format!("failed to connect to {ipc_name}: {e}"))
        })?;
        Ok(Self {
            stream: BufReader::new(stream),
        })
    }

    pub fn call<T: DeserializeOwned>(&mut self, request: &Request) -> Result<T> {
        let mut line = serde_json::to_string(request)?;
        line.push('\n');
        let stream = self.stream.get_mut();
        stream.write_all(line.as_bytes())?;
        stream.flush()?;

        let mut reply = String::new();
        if self.stream.read_line(&mut reply)? == 0 {
            return Err(AffordError::SystemFailure(
                "connection closed by affordance server".to_string(),
            ));
        }
        serde_json::from_str::<Response>(&reply)?.into_result()
    }

    pub fn reset_affordance_config(&mut self) -> Result<()> {
        self.call(&Request::ResetAffordanceConfig)
    }

    pub fn set_affordance_config(&mut self, affordance_type: &str, config: &[f64]) -> Result<()> {
        self.call(&Request::SetAffordanceConfig {
            affordance_type: affordance_type.to_string(),
            config: config.to_vec(),
        })
    }

    pub fn get_affordance_config(&mut self, affordance_type: &str) -> Result<Vec<f64>> {
        self.call(&Request::GetAffordanceConfig {
            affordance_type: affordance_type.to_string(),
        })
    }

    pub fn set_margin(&mut self, affordance_type: &str, margin: f64) -> Result<()> {
        self.call(&Request::SetMargin {
            affordance_type: affordance_type.to_string(),
            margin,
        })
    }

    pub fn set_neighbouring_triangle_margin(
        &mut self,
        affordance_type: &str,
        margin: f64,
    ) -> Result<()> {
        self.call(&Request::SetNeighbouringTriangleMargin {
            affordance_type: affordance_type.to_string(),
            margin,
        })
    }

    pub fn set_minimum_area(&mut self, affordance_type: &str, minimum_area: f64) -> Result<()> {
        self.call(&Request::SetMinimumArea {
            affordance_type: affordance_type.to_string(),
            minimum_area,
        })
    }

    pub fn check_model(&mut self, obstacle_name: &str) -> Result<bool> {
        self.call(&Request::CheckModel {
            obstacle_name: obstacle_name.to_string(),
        })
    }

    pub fn affordance_analysis(
        &mut self,
        obstacle_name: &str,
        operations: &[OperationDescriptor],
        reduce_sizes: &[f64],
    ) -> Result<usize> {
        self.call(&Request::AffordanceAnalysis {
            obstacle_name: obstacle_name.to_string(),
            operations: operations.to_vec(),
            reduce_sizes: reduce_sizes.to_vec(),
        })
    }

    pub fn analyse_object(&mut self, obstacle_name: &str, reduce_sizes: &[f64]) -> Result<()> {
        self.call(&Request::AnalyseObject {
            obstacle_name: obstacle_name.to_string(),
            reduce_sizes: reduce_sizes.to_vec(),
        })
    }

    pub fn analyse_all(&mut self, reduce_sizes: &[f64]) -> Result<()> {
        self.call(&Request::AnalyseAll {
            reduce_sizes: reduce_sizes.to_vec(),
        })
    }

    pub fn delete_affordances_by_type(
        &mut self,
        affordance_type: &str,
        obstacle_name: &str,
    ) -> Result<()> {
        self.call(&Request::DeleteAffordancesByType {
            affordance_type: affordance_type.to_string(),
            obstacle_name: obstacle_name.to_string(),
        })
    }

    pub fn delete_affordances(&mut self, obstacle_name: &str) -> Result<()> {
        self.call(&Request::DeleteAffordances {
            obstacle_name: obstacle_name.to_string(),
        })
    }

    pub fn add_aff_objects(
        &mut self,
        operations: &[OperationDescriptor],
        object_sets: Vec<Vec<AffordanceRegion>>,
        obstacle_name: &str,
    ) -> Result<()> {
        self.call(&Request::AddAffObjects {
            operations: operations.to_vec(),
            object_sets,
            obstacle_name: obstacle_name.to_string(),
        })
    }

    pub fn get_affordance_points(&mut self, affordance_type: &str) -> Result<AffordancePoints> {
        self.call(&Request::GetAffordancePoints {
            affordance_type: affordance_type.to_string(),
        })
    }

    pub fn get_aff_ref_obstacles(&mut self, affordance_type: &str) -> Result<Vec<String>> {
        self.call(&Request::GetAffRefObstacles {
            affordance_type: affordance_type.to_string(),
        })
    }

    pub fn get_affordance_types(&mut self) -> Result<Vec<String>> {
        self.call(&Request::GetAffordanceTypes)
    }

    pub fn get_affordance_config_types(&mut self) -> Result<Vec<String>> {
        self.call(&Request::GetAffordanceConfigTypes)
    }

    pub fn create_operations(&mut self) -> Result<Vec<OperationDescriptor>> {
        self.call(&Request::CreateOperations)
    }

    pub fn get_obstacle_names(&mut self) -> Result<Vec<String>> {
        self.call(&Request::GetObstacleNames)
    }
}
