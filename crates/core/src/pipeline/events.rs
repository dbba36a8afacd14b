//! # Progress Events
//!
//! Snapshots of a run's [`PipelineState`](super::PipelineState) pushed to
//! observers at every transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::runner::StageError;
use super::stage::PipelinePhase;

/// Record tag on the progress channel
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    #[default]
    Progress,
}

/// Immutable snapshot of a run's progress
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    pub kind: EventKind,
    pub run_id: String,
    /// Position in the run's publication order, starting at 0
    pub seq: u64,
    pub stage: PipelinePhase,
    pub percent: u8,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_activity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<u64>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<StageError>,
    pub timestamp: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    pub fn is_failed(&self) -> bool {
        self.stage == PipelinePhase::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::runner::FailureKind;
    use crate::pipeline::stage::StageId;

    fn event(stage: PipelinePhase, percent: u8) -> ProgressEvent {
        ProgressEvent {
            kind: EventKind::Progress,
            run_id: "run-1".to_string(),
            seq: 3,
            stage,
            percent,
            message: "Generating".to_string(),
            sub_activity: None,
            eta_seconds: None,
            errors: Vec::new(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_event_wire_shape() {
        let json = serde_json::to_value(event(PipelinePhase::GenerateApi, 25)).unwrap();
        assert_eq!(json["kind"], "progress");
        assert_eq!(json["runId"], "run-1");
        assert_eq!(json["stage"], "generate_api");
        assert_eq!(json["percent"], 25);
        assert!(json.get("subActivity").is_none());
        assert!(json.get("errors").is_none());
    }

    #[test]
    fn test_terminal_event_carries_errors() {
        let mut failed = event(PipelinePhase::Failed, 35);
        failed.errors.push(StageError::new(
            StageId::Schema,
            FailureKind::Error,
            "schema backend timed out",
        ));
        assert!(failed.is_terminal());
        assert!(failed.is_failed());

        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["stage"], "failed");
        assert_eq!(json["errors"][0]["stage"], "schema");
        assert_eq!(json["errors"][0]["kind"], "error");
    }
}
