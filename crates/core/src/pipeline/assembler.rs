//! # Result Assembler
//!
//! Turns the final [`PipelineState`] into the [`CompositeResult`] handed
//! back to the caller. Artifacts are passed through as recorded.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::runner::StageError;
use super::stage::{categories, PipelinePhase};
use super::state::PipelineState;
use crate::models::ArtifactCategories;

/// Summary metrics of a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetrics {
    pub elapsed_ms: u64,
    pub component_count: usize,
    pub endpoint_count: usize,
    pub schema_table_count: usize,
}

/// Final deliverable of a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompositeResult {
    pub run_id: String,
    /// True iff the deployment stage ran and reported success
    pub success: bool,
    pub final_stage: PipelinePhase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_url: Option<String>,
    /// Metrics reported by the deployment collaborator
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_metrics: Option<serde_json::Value>,
    pub artifacts: ArtifactCategories,
    pub errors: Vec<StageError>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub metrics: RunMetrics,
}

impl CompositeResult {
    pub fn is_failed(&self) -> bool {
        self.final_stage == PipelinePhase::Failed
    }
}

pub struct ResultAssembler;

impl ResultAssembler {
    pub fn assemble(state: &PipelineState, elapsed: Duration) -> CompositeResult {
        let artifacts = state.artifacts().clone();
        let count = |category: &str| artifacts.get(category).map(|a| a.len()).unwrap_or(0);

        let metrics = RunMetrics {
            elapsed_ms: elapsed.as_millis() as u64,
            component_count: count(categories::COMPONENTS),
            endpoint_count: count(categories::API_ENDPOINTS),
            schema_table_count: count(categories::DATABASE_SCHEMA),
        };

        let deployment = state.deployment();

        CompositeResult {
            run_id: state.run_id().to_string(),
            success: deployment.map(|d| d.success).unwrap_or(false),
            final_stage: state.phase(),
            deployment_url: deployment.and_then(|d| d.deployment_url.clone()),
            deployment_metrics: deployment.and_then(|d| d.metrics.clone()),
            artifacts,
            errors: state.errors().to_vec(),
            warnings: state.warnings().to_vec(),
            metrics,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::DeploymentReport;
    use crate::models::ArtifactMap;

    fn named(prefix: &str, count: usize) -> ArtifactMap {
        (0..count)
            .map(|i| (format!("{}{}", prefix, i), "content".to_string()))
            .collect()
    }

    #[test]
    fn test_metrics_count_known_categories() {
        let mut state = PipelineState::new("run-1");
        state.record_artifacts(categories::COMPONENTS, named("Component", 7));
        state.record_artifacts(categories::API_ENDPOINTS, named("route", 4));
        state.record_artifacts(categories::DATABASE_SCHEMA, named("table", 3));
        state.record_artifacts(categories::CRM, named("pipeline", 2));

        let result = ResultAssembler::assemble(&state, Duration::from_millis(1500));
        assert_eq!(result.metrics.component_count, 7);
        assert_eq!(result.metrics.endpoint_count, 4);
        assert_eq!(result.metrics.schema_table_count, 3);
        // Other categories pass through unmeasured
        assert_eq!(result.artifacts[categories::CRM].len(), 2);
        assert_eq!(result.metrics.elapsed_ms, 1500);
        assert!(result.artifacts.contains_key(categories::CRM));
    }

    #[test]
    fn test_success_requires_deployment() {
        let mut state = PipelineState::new("run-1");
        let result = ResultAssembler::assemble(&state, Duration::ZERO);
        assert!(!result.success);

        state.record_deployment(DeploymentReport {
            success: true,
            deployment_url: Some("file:///tmp/out".to_string()),
            metrics: None,
        });
        let result = ResultAssembler::assemble(&state, Duration::ZERO);
        assert!(result.success);
        assert_eq!(result.deployment_url.as_deref(), Some("file:///tmp/out"));
    }
}
