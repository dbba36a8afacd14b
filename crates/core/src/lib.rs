//! # Foundry Core
//!
//! Turns an analyzed business requirement into a deployable application
//! by driving a fixed sequence of generation stages, streaming progress to
//! any number of observers along the way.
//!
//! ## Architecture
//!
//! - `models` - Requirement and per-run options
//! - `pipeline/` - Orchestrator, stage runner, progress broadcaster, run state, result assembly
//! - `collaborators/` - Generator and deployer traits plus built-in scaffold implementations
//! - `state/` - Run status persistence (SQLite)
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use foundry_core::collaborators::{FilesystemDeployer, GeneratorRegistry};
//! use foundry_core::pipeline::{Orchestrator, OrchestratorConfig, ProgressBroadcaster};
//!
//! let config = OrchestratorConfig::default();
//! let generators = GeneratorRegistry::scaffold(config.approval_thresholds);
//! let orchestrator = Arc::new(Orchestrator::new(
//!     config,
//!     generators,
//!     Arc::new(FilesystemDeployer::new("out")),
//!     Arc::new(ProgressBroadcaster::new()),
//! ));
//!
//! let handle = orchestrator.start_run(requirement, RunOptions::default());
//! let mut progress = orchestrator.broadcaster().subscribe(&handle.run_id);
//! let result = handle.join.await?;
//! ```

pub mod collaborators;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod state;

pub use error::{PipelineError, PipelineResult};
