//! # Orchestrator
//!
//! Drives a run from requirement to composite result. One driver loop walks
//! the phases of the stage table; within a phase, stages are scheduled by
//! dependency with a bounded number in flight. A concurrency limit of 1
//! with no retries reproduces strict sequential execution.

use anyhow::Context;
use futures::future::{BoxFuture, FutureExt};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

use super::assembler::{CompositeResult, ResultAssembler};
use super::broadcaster::ProgressBroadcaster;
use super::runner::{FailureKind, StageError, StageOutcome, StageRunner};
use super::stage::{
    categories, planned_stage_count, stages_for, PipelinePhase, StageId, StageKind, StageSpec,
};
use super::state::PipelineState;
use crate::collaborators::{
    ApprovalThresholds, Deployer, DeploymentBundle, DeploymentReport, GeneratorRegistry,
    RunMetadata, StageContext,
};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{ArtifactCategories, Requirement, RunOptions};
use crate::state::{RunStatus, RunStatusUpdate, RunStore};

/// Configuration for the orchestrator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Maximum stages in flight within one phase (1 = sequential)
    pub max_concurrency: usize,
    /// Extra attempts for a failing optional stage
    pub max_retries: u32,
    /// Pause between attempts of the same stage
    pub retry_backoff_ms: u64,
    /// Quote approval routing thresholds for generated workflows
    pub approval_thresholds: ApprovalThresholds,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 3,
            max_retries: 2,
            retry_backoff_ms: 250,
            approval_thresholds: ApprovalThresholds::default(),
        }
    }
}

impl OrchestratorConfig {
    /// One stage at a time, in table order, no retries
    pub fn sequential() -> Self {
        Self {
            max_concurrency: 1,
            max_retries: 0,
            retry_backoff_ms: 0,
            ..Self::default()
        }
    }
}

/// A run accepted by [`Orchestrator::start_run`]
pub struct RunHandle {
    pub run_id: String,
    pub join: JoinHandle<CompositeResult>,
}

/// Generate a fresh run id
pub fn new_run_id() -> String {
    format!("run-{}", uuid::Uuid::new_v4().simple())
}

fn run_id_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_-]*$").expect("run id pattern is a valid regex")
    })
}

/// Maximum run id length
pub const MAX_RUN_ID_LEN: usize = 64;

/// Check a caller-supplied run id before anything executes
pub fn validate_run_id(run_id: &str) -> PipelineResult<()> {
    let invalid = |reason: &str| PipelineError::InvalidRunId {
        run_id: run_id.to_string(),
        reason: reason.to_string(),
    };
    if run_id.is_empty() {
        return Err(invalid("run id is empty"));
    }
    if run_id.len() > MAX_RUN_ID_LEN {
        return Err(invalid("run id is longer than 64 characters"));
    }
    if !run_id_pattern().is_match(run_id) {
        return Err(invalid(
            "run id must start with a letter or digit and contain only letters, digits, '-' or '_'",
        ));
    }
    Ok(())
}

enum Flow {
    Continue,
    Abort,
}

type StageTask = BoxFuture<'static, (StageId, StageOutcome, Duration)>;

/// Per-run bookkeeping owned by the driver loop
struct ActiveRun {
    state: PipelineState,
    requirement: Arc<Requirement>,
    options: RunOptions,
    started: Instant,
    current_stage: StageId,
    planned: usize,
    completed: usize,
    stage_time: Duration,
}

impl ActiveRun {
    fn new(run_id: String, requirement: Arc<Requirement>, options: RunOptions) -> Self {
        let planned = planned_stage_count(&options);
        Self {
            state: PipelineState::new(run_id),
            requirement,
            options,
            started: Instant::now(),
            current_stage: StageId::Analyze,
            planned,
            completed: 0,
            stage_time: Duration::ZERO,
        }
    }

    fn stage_finished(&mut self, elapsed: Duration) {
        self.completed += 1;
        self.stage_time += elapsed;
        let average = self.stage_time.as_secs_f64() / self.completed as f64;
        let remaining = self.planned.saturating_sub(self.completed) as f64;
        self.state.set_eta(Some((average * remaining).round() as u64));
    }
}

/// The generation pipeline
pub struct Orchestrator {
    config: OrchestratorConfig,
    generators: GeneratorRegistry,
    deployer: Arc<dyn Deployer>,
    run_store: Option<Arc<dyn RunStore>>,
    broadcaster: Arc<ProgressBroadcaster>,
    runner: StageRunner,
}

impl Orchestrator {
    pub fn new(
        config: OrchestratorConfig,
        generators: GeneratorRegistry,
        deployer: Arc<dyn Deployer>,
        broadcaster: Arc<ProgressBroadcaster>,
    ) -> Self {
        let runner = StageRunner::new(Duration::from_millis(config.retry_backoff_ms));
        Self {
            config,
            generators,
            deployer,
            run_store: None,
            broadcaster,
            runner,
        }
    }

    /// Record run status in `store` after a successful deployment
    pub fn with_run_store(mut self, store: Arc<dyn RunStore>) -> Self {
        self.run_store = Some(store);
        self
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn broadcaster(&self) -> &Arc<ProgressBroadcaster> {
        &self.broadcaster
    }

    /// Accept a run under a fresh id and execute it in the background
    pub fn start_run(self: &Arc<Self>, requirement: Requirement, options: RunOptions) -> RunHandle {
        let run_id = new_run_id();
        let join = self.spawn(run_id.clone(), requirement, options);
        RunHandle { run_id, join }
    }

    /// Accept a run under a caller-chosen id and execute it in the background
    pub fn spawn_run(
        self: &Arc<Self>,
        run_id: &str,
        requirement: Requirement,
        options: RunOptions,
    ) -> PipelineResult<RunHandle> {
        validate_run_id(run_id)?;
        let join = self.spawn(run_id.to_string(), requirement, options);
        Ok(RunHandle {
            run_id: run_id.to_string(),
            join,
        })
    }

    fn spawn(
        self: &Arc<Self>,
        run_id: String,
        requirement: Requirement,
        options: RunOptions,
    ) -> JoinHandle<CompositeResult> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move {
            orchestrator
                .execute(run_id, Arc::new(requirement), options)
                .await
        })
    }

    /// Execute a run to completion. Only an invalid run id is returned as
    /// an error; every stage failure is reported inside the result.
    #[tracing::instrument(skip(self, requirement, options), fields(run_id = %run_id))]
    pub async fn run(
        &self,
        run_id: &str,
        requirement: &Requirement,
        options: &RunOptions,
    ) -> PipelineResult<CompositeResult> {
        validate_run_id(run_id)?;
        Ok(self
            .execute(
                run_id.to_string(),
                Arc::new(requirement.clone()),
                options.clone(),
            )
            .await)
    }

    async fn execute(
        &self,
        run_id: String,
        requirement: Arc<Requirement>,
        options: RunOptions,
    ) -> CompositeResult {
        let mut run = ActiveRun::new(run_id, requirement, options);
        info!(
            event = "run.started",
            run_id = %run.state.run_id(),
            planned_stages = run.planned,
            max_concurrency = self.config.max_concurrency,
        );
        self.publish(&mut run);

        match self.drive(&mut run).await {
            Ok(Flow::Continue) => {
                let message = if run.state.errors().is_empty() {
                    "Generation complete"
                } else {
                    "Generation complete with warnings"
                };
                run.state.enter(PipelinePhase::Complete, message);
            }
            Ok(Flow::Abort) => {}
            Err(e) => {
                let message = format!("{:#}", e);
                warn!(run_id = %run.state.run_id(), error = %message, "Pipeline driver failed");
                run.state
                    .record_error(StageError::new(run.current_stage, FailureKind::Error, message));
                run.state.fail("Pipeline failed unexpectedly");
            }
        }
        self.publish(&mut run);

        let result = ResultAssembler::assemble(&run.state, run.started.elapsed());
        info!(
            event = "run.finished",
            run_id = %result.run_id,
            final_stage = %result.final_stage,
            success = result.success,
            errors = result.errors.len(),
            duration_ms = result.metrics.elapsed_ms,
        );
        result
    }

    fn publish(&self, run: &mut ActiveRun) {
        let event = run.state.snapshot();
        let delivered = self.broadcaster.publish(run.state.run_id(), &event);
        debug!(
            run_id = %event.run_id,
            seq = event.seq,
            stage = %event.stage,
            percent = event.percent,
            observers = delivered,
            "Progress published"
        );
    }

    async fn drive(&self, run: &mut ActiveRun) -> anyhow::Result<Flow> {
        for phase in PipelinePhase::DRIVEN {
            let stages = stages_for(phase, &run.options);
            let Some(first) = stages.first() else {
                continue;
            };
            let flow = match first.kind {
                StageKind::Generate => self.run_group(run, phase, stages).await?,
                StageKind::Validate => self.validate(run),
                StageKind::Deploy => {
                    self.deploy(run).await;
                    Flow::Continue
                }
            };
            if let Flow::Abort = flow {
                return Ok(Flow::Abort);
            }
        }
        Ok(Flow::Continue)
    }

    /// Run every stage of `phase`, launching each once its in-phase
    /// dependencies have finished and a concurrency slot is free
    async fn run_group(
        &self,
        run: &mut ActiveRun,
        phase: PipelinePhase,
        stages: Vec<&'static StageSpec>,
    ) -> anyhow::Result<Flow> {
        let names: Vec<&str> = stages.iter().map(|s| s.id.as_str()).collect();
        run.state.enter(phase, format!("Running {}", names.join(", ")));
        self.publish(run);

        let limit = self.config.max_concurrency.max(1);
        let total = stages.len();
        let in_phase: HashSet<StageId> = stages.iter().map(|s| s.id).collect();
        let mut pending = stages;
        let mut finished: HashSet<StageId> = HashSet::new();
        let mut in_flight: JoinSet<(StageId, StageOutcome, Duration)> = JoinSet::new();
        let mut flow = Flow::Continue;

        loop {
            let mut index = 0;
            while index < pending.len() && in_flight.len() < limit {
                let spec = pending[index];
                let waiting = spec
                    .depends_on
                    .iter()
                    .any(|dep| in_phase.contains(dep) && !finished.contains(dep));
                if waiting {
                    index += 1;
                    continue;
                }
                pending.remove(index);
                run.current_stage = spec.id;

                match self.prepare(run, spec) {
                    Ok(task) => {
                        run.state.report(
                            run.state.percent(),
                            format!("Generating {}", spec.id),
                            Some(spec.id.to_string()),
                        );
                        self.publish(run);
                        in_flight.spawn(task);
                    }
                    Err(error) => {
                        finished.insert(spec.id);
                        let outcome = StageOutcome::Skipped { error };
                        if let Flow::Abort =
                            self.apply(run, spec, outcome, Duration::ZERO, finished.len(), total)
                        {
                            flow = Flow::Abort;
                        }
                        // A skip may unblock stages earlier in the list
                        index = 0;
                    }
                }
            }

            let Some(joined) = in_flight.join_next().await else {
                if pending.is_empty() {
                    break;
                }
                let stuck: Vec<&str> = pending.iter().map(|s| s.id.as_str()).collect();
                anyhow::bail!("stages [{}] can never be scheduled", stuck.join(", "));
            };
            let (stage, outcome, elapsed) = joined.context("stage task was cancelled")?;
            finished.insert(stage);
            run.current_stage = stage;
            if let Flow::Abort =
                self.apply(run, stage.spec(), outcome, elapsed, finished.len(), total)
            {
                flow = Flow::Abort;
            }
        }

        Ok(flow)
    }

    /// Build the task for one stage, or the reason it cannot start
    fn prepare(&self, run: &ActiveRun, spec: &'static StageSpec) -> Result<StageTask, StageError> {
        let mut inputs = ArtifactCategories::new();
        for dep in spec.depends_on {
            let Some(category) = dep.spec().category else {
                continue;
            };
            match run.state.category(category) {
                Some(artifacts) => {
                    inputs.insert(category.to_string(), artifacts.clone());
                }
                None => {
                    return Err(StageError::new(
                        spec.id,
                        FailureKind::DependencyUnavailable,
                        format!("{} produced no artifacts", dep),
                    ));
                }
            }
        }

        let generator = self.generators.get(spec.id).ok_or_else(|| {
            StageError::new(spec.id, FailureKind::Error, "no generator registered")
        })?;

        let context = StageContext {
            run_id: run.state.run_id().to_string(),
            stage: spec.id,
            options: run.options.clone(),
            inputs,
        };
        let attempts = if spec.required {
            1
        } else {
            self.config.max_retries + 1
        };
        let runner = self.runner.clone();
        let requirement = Arc::clone(&run.requirement);
        let stage = spec.id;

        Ok(async move {
            let started = Instant::now();
            let outcome = runner
                .execute_with_retry(stage, attempts, || {
                    let generator = Arc::clone(&generator);
                    let requirement = Arc::clone(&requirement);
                    let context = context.clone();
                    async move { generator.generate(&requirement, &context).await }
                })
                .await;
            (stage, outcome, started.elapsed())
        }
        .boxed())
    }

    /// Record one stage outcome and publish it
    fn apply(
        &self,
        run: &mut ActiveRun,
        spec: &'static StageSpec,
        outcome: StageOutcome,
        elapsed: Duration,
        done: usize,
        total: usize,
    ) -> Flow {
        let required_failed = spec.required && !outcome.is_produced();
        let message = match &outcome {
            StageOutcome::Produced { artifacts, .. } => {
                format!("{} produced {} artifacts", spec.id, artifacts.len())
            }
            StageOutcome::Skipped { error } => format!("{} skipped: {}", spec.id, error.message),
        };
        if let Some(error) = outcome.error() {
            warn!(
                run_id = %run.state.run_id(),
                stage = %spec.id,
                kind = ?error.kind,
                attempts = error.attempts,
                required = spec.required,
                "Stage did not produce artifacts"
            );
        }

        run.state.record_outcome(spec, outcome);
        run.stage_finished(elapsed);
        let base = spec.phase.base_percent() as usize;
        let span = spec.phase.ceiling_percent() as usize - base;
        let percent = base + span * done / total.max(1);
        run.state
            .report(percent as u8, message, Some(spec.id.to_string()));
        self.publish(run);

        if required_failed {
            run.state
                .fail(format!("Required stage {} failed", spec.id));
            Flow::Abort
        } else {
            Flow::Continue
        }
    }

    fn validate(&self, run: &mut ActiveRun) -> Flow {
        run.current_stage = StageId::Validate;
        run.state
            .enter(PipelinePhase::Validate, "Validating generated artifacts");
        self.publish(run);

        // Blank artifacts do not count towards the deliverable
        let missing: Vec<&str> = [categories::COMPONENTS, categories::API_ENDPOINTS]
            .into_iter()
            .filter(|category| {
                !run.state.category(category).is_some_and(|artifacts| {
                    artifacts.values().any(|content| !content.trim().is_empty())
                })
            })
            .collect();
        run.stage_finished(Duration::ZERO);

        if !missing.is_empty() {
            let error = StageError::new(
                StageId::Validate,
                FailureKind::Validation,
                format!("no usable artifacts in {}", missing.join(", ")),
            );
            warn!(run_id = %run.state.run_id(), error = %error, "Validation failed");
            run.state.record_error(error);
            run.state.fail("Validation failed");
            return Flow::Abort;
        }

        run.state.report(
            PipelinePhase::Validate.ceiling_percent(),
            "Validation passed",
            None,
        );
        self.publish(run);
        Flow::Continue
    }

    async fn deploy(&self, run: &mut ActiveRun) {
        run.current_stage = StageId::Deploy;
        let target = run.options.deployment_target;
        run.state
            .enter(PipelinePhase::Deploy, format!("Deploying to {}", target.as_str()));
        self.publish(run);

        let artifacts = |category: &str| run.state.category(category).cloned().unwrap_or_default();
        let bundle = DeploymentBundle {
            components: artifacts(categories::COMPONENTS),
            api_endpoints: artifacts(categories::API_ENDPOINTS),
            database_schema: artifacts(categories::DATABASE_SCHEMA),
        };
        let metadata = RunMetadata {
            run_id: run.state.run_id().to_string(),
            target,
            started_at: run.state.started_at(),
        };

        let started = Instant::now();
        let (report, failure) = match self
            .runner
            .capture(
                StageId::Deploy,
                self.deployer.deploy(&run.requirement, &metadata, bundle),
            )
            .await
        {
            Ok(report) => (report, None),
            Err(error) => (DeploymentReport::failed(), Some(error.message)),
        };
        run.stage_finished(started.elapsed());

        if report.success {
            self.persist_deployment(run).await;
            run.state.report(
                PipelinePhase::Deploy.ceiling_percent(),
                match &report.deployment_url {
                    Some(url) => format!("Deployed to {}", url),
                    None => "Deployed".to_string(),
                },
                None,
            );
        } else {
            let message = failure.unwrap_or_else(|| "deployment reported failure".to_string());
            run.state.record_error(StageError::new(
                StageId::Deploy,
                FailureKind::Deployment,
                message,
            ));
            run.state.report(
                PipelinePhase::Deploy.ceiling_percent(),
                "Deployment failed; artifacts are still available",
                None,
            );
        }
        run.state.record_deployment(report);
        self.publish(run);
    }

    async fn persist_deployment(&self, run: &mut ActiveRun) {
        let Some(store) = &self.run_store else {
            return;
        };
        let update = RunStatusUpdate {
            status: RunStatus::Deployed,
            completion_percentage: 100,
        };
        if let Err(e) = store.update_run_status(run.state.run_id(), update).await {
            let message = format!("failed to persist run status: {:#}", e);
            warn!(run_id = %run.state.run_id(), error = %message, "Run store update failed");
            run.state
                .record_error(StageError::new(StageId::Deploy, FailureKind::Error, message));
        }
    }
}
