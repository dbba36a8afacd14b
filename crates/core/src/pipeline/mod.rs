//! # Generation Pipeline
//!
//! Orchestrates the generators for one run and streams its progress.
//!
//! ## Pipeline Flow
//!
//! ```text
//! Init → Analyze → UI → API → Schema → Optional* → Integrate → Document → Validate → Deploy → Completed
//!    └──────────────── any required failure ────────────────────────────────────────────────→ Failed
//! ```

pub mod assembler;
pub mod broadcaster;
pub mod events;
pub mod orchestrator;
pub mod runner;
pub mod stage;
pub mod state;

pub use assembler::{CompositeResult, ResultAssembler, RunMetrics};
pub use broadcaster::{ObserverId, ProgressBroadcaster, Subscription};
pub use events::{EventKind, ProgressEvent};
pub use orchestrator::{
    new_run_id, validate_run_id, Orchestrator, OrchestratorConfig, RunHandle, MAX_RUN_ID_LEN,
};
pub use runner::{FailureKind, StageError, StageOutcome, StageRunner};
pub use stage::{
    categories, planned_stage_count, stages_for, PipelinePhase, StageId, StageKind, StageSpec,
    STAGE_TABLE,
};
pub use state::PipelineState;
