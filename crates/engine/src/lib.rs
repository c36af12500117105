//! # Thesis Engine
//!
//! Executes thesis specifications: stories of scenarios whose Given/When/Then
//! theses issue HTTP requests and assert on the results.
//!
//! ## Architecture
//!
//! - **`graph`**: compiles a scenario into an acyclic action graph
//! - **`sync_group`**: gates each thesis on its prerequisites at run time
//! - **`performer`**: the performer contract plus the HTTP and assertion roles
//! - **`performance`**: the execution core emitting a stream of steps
//! - **`flow`**: the state machine and reducer turning steps into snapshots
//! - **`maintainer`**: locking, cancellation, timeouts, and step policies
//!
//! ## Usage
//!
//! ```rust
//! use thesis_engine::parse_specification_file;
//!
//! let temp_dir = tempfile::tempdir()?;
//! let path = temp_dir.path().join("health.yaml");
//! std::fs::write(&path, r#"
//! stories:
//!   service:
//!     scenarios:
//!       health:
//!         theses:
//!           ping:
//!             statement: { stage: when, behavior: the service answers }
//!             http:
//!               request: { method: GET, url: "http://localhost:8080/health" }
//!               response: { allowedCodes: [200] }
//! "#)?;
//!
//! let specification = parse_specification_file(&path)?;
//! assert_eq!(specification.id(), "health");
//! assert_eq!(specification.theses().count(), 1);
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use thesis_types::{Specification, SpecificationDocument};

pub mod cancel;
pub mod cancel_bus;
pub mod config;
pub mod environment;
pub mod errors;
pub mod flow;
pub mod graph;
pub mod guard;
pub mod maintainer;
pub mod performance;
pub mod performer;
pub mod resolve;
pub mod sync_group;

// Lets the shared fixtures under tests/ name this crate the way integration
// tests do.
#[cfg(test)]
extern crate self as thesis_engine;
#[cfg(test)]
#[path = "../tests/support/mod.rs"]
mod testing;

pub use cancel::CancelScope;
pub use cancel_bus::{CancelBus, CancelSubscription, InMemoryCancelBus};
pub use config::{EngineConfig, default_config_path, load_config, load_config_from_path, parse_duration};
pub use environment::Environment;
pub use errors::{CancelBusError, CancelCause, FlowStoreError, GuardError, PerformanceError, StepError};
pub use flow::{Flow, FlowError, FlowStore, InMemoryFlowStore, Reducer, State, Status};
pub use graph::ActionGraph;
pub use guard::{InMemoryPerformanceGuard, PerformanceGuard};
pub use maintainer::{ForwardPolicy, Maintainer, Message, MessageError, RunTermination, SaveEveryStepPolicy, StepsPolicy};
pub use performance::{Event, Performance, Step};
pub use performer::{AssertionPerformer, HttpPerformer, PerformResult, Performer, PerformerType, Performers, ResultState};
pub use sync_group::ScenarioSyncGroup;

/// Loads a specification file (YAML or JSON) and validates it.
///
/// The specification id is the file stem.
pub fn parse_specification_file(file_path: impl AsRef<Path>) -> Result<Specification> {
    let file_path = file_path.as_ref();
    let content = fs::read_to_string(file_path).with_context(|| format!("Failed to read specification file: {}", file_path.display()))?;
    let document: SpecificationDocument =
        serde_yaml::from_str(&content).with_context(|| format!("Failed to parse specification file: {}", file_path.display()))?;

    let id = file_path
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "specification".to_string());
    Specification::from_document(id, &document).with_context(|| format!("Invalid specification: {}", file_path.display()))
}
