//! # Pipeline State
//!
//! Per-run aggregate owned by the orchestrator. Percentage only moves
//! forward, errors and warnings are append-only, and recorded artifacts are
//! never removed.

use chrono::{DateTime, Utc};

use super::events::{EventKind, ProgressEvent};
use super::runner::{StageError, StageOutcome};
use super::stage::{PipelinePhase, StageSpec};
use crate::collaborators::DeploymentReport;
use crate::models::{ArtifactCategories, ArtifactMap};

#[derive(Debug, Clone)]
pub struct PipelineState {
    run_id: String,
    phase: PipelinePhase,
    percent: u8,
    message: String,
    sub_activity: Option<String>,
    eta_seconds: Option<u64>,
    errors: Vec<StageError>,
    warnings: Vec<String>,
    artifacts: ArtifactCategories,
    deployment: Option<DeploymentReport>,
    started_at: DateTime<Utc>,
    next_seq: u64,
}

impl PipelineState {
    pub fn new(run_id: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            phase: PipelinePhase::Init,
            percent: 0,
            message: "Run accepted".to_string(),
            sub_activity: None,
            eta_seconds: None,
            errors: Vec::new(),
            warnings: Vec::new(),
            artifacts: ArtifactCategories::new(),
            deployment: None,
            started_at: Utc::now(),
            next_seq: 0,
        }
    }

    /// Move to `phase`. Phases only move forward; re-entering a phase or
    /// leaving a terminal phase is refused.
    pub fn enter(&mut self, phase: PipelinePhase, message: impl Into<String>) -> bool {
        if self.phase.is_terminal() || phase <= self.phase {
            tracing::debug!(
                run_id = %self.run_id,
                from = %self.phase,
                to = %phase,
                "Ignoring backward phase transition"
            );
            return false;
        }
        self.phase = phase;
        self.message = message.into();
        self.sub_activity = None;
        if phase != PipelinePhase::Failed {
            self.advance_percent(phase.base_percent());
        }
        true
    }

    /// Terminal failure, reachable from any non-terminal phase
    pub fn fail(&mut self, message: impl Into<String>) -> bool {
        self.enter(PipelinePhase::Failed, message)
    }

    /// Update the progress line without changing phase
    pub fn report(&mut self, percent: u8, message: impl Into<String>, sub_activity: Option<String>) {
        self.advance_percent(percent);
        self.message = message.into();
        self.sub_activity = sub_activity;
    }

    fn advance_percent(&mut self, percent: u8) {
        self.percent = self.percent.max(percent.min(100));
    }

    pub fn set_eta(&mut self, eta_seconds: Option<u64>) {
        self.eta_seconds = eta_seconds;
    }

    /// Apply a stage outcome produced by the stage runner
    pub fn record_outcome(&mut self, spec: &StageSpec, outcome: StageOutcome) {
        match outcome {
            StageOutcome::Produced {
                artifacts,
                warnings,
            } => {
                if let Some(category) = spec.category {
                    self.record_artifacts(category, artifacts);
                }
                self.warnings.extend(warnings);
            }
            StageOutcome::Skipped { error } => self.record_error(error),
        }
    }

    /// Merge artifacts into `category`; existing entries are kept
    pub fn record_artifacts(&mut self, category: &str, artifacts: ArtifactMap) {
        let entry = self.artifacts.entry(category.to_string()).or_default();
        for (name, content) in artifacts {
            entry.entry(name).or_insert(content);
        }
    }

    pub fn record_error(&mut self, error: StageError) {
        self.errors.push(error);
    }

    pub fn record_deployment(&mut self, report: DeploymentReport) {
        self.deployment = Some(report);
    }

    /// Artifacts of `category`, if any were recorded
    pub fn category(&self, category: &str) -> Option<&ArtifactMap> {
        self.artifacts
            .get(category)
            .filter(|artifacts| !artifacts.is_empty())
    }

    /// Snapshot the state as the next event in publication order
    pub fn snapshot(&mut self) -> ProgressEvent {
        let seq = self.next_seq;
        self.next_seq += 1;
        ProgressEvent {
            kind: EventKind::Progress,
            run_id: self.run_id.clone(),
            seq,
            stage: self.phase,
            percent: self.percent,
            message: self.message.clone(),
            sub_activity: self.sub_activity.clone(),
            eta_seconds: self.eta_seconds,
            errors: self.errors.clone(),
            timestamp: Utc::now(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn phase(&self) -> PipelinePhase {
        self.phase
    }

    pub fn percent(&self) -> u8 {
        self.percent
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn errors(&self) -> &[StageError] {
        &self.errors
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn artifacts(&self) -> &ArtifactCategories {
        &self.artifacts
    }

    pub fn deployment(&self) -> Option<&DeploymentReport> {
        self.deployment.as_ref()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }
}
