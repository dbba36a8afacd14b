//! # Pipeline Stages
//!
//! Defines the phases of a generation run and the declarative stage table
//! the orchestrator's driver loop consumes.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::models::RunOptions;

/// Well-known artifact category names
pub mod categories {
    pub const ANALYSIS: &str = "analysis";
    pub const COMPONENTS: &str = "components";
    pub const API_ENDPOINTS: &str = "apiEndpoints";
    pub const DATABASE_SCHEMA: &str = "databaseSchema";
    pub const WORKFLOWS: &str = "workflows";
    pub const WORKFLOW_COMPONENTS: &str = "workflowComponents";
    pub const FORMS: &str = "forms";
    pub const CHAT_ASSISTANT: &str = "chatAssistant";
    pub const VOICE: &str = "voice";
    pub const TELEPHONY: &str = "telephony";
    pub const CRM: &str = "crm";
    pub const SALES_AUTOMATION: &str = "salesAutomation";
    pub const MARKETING_AUTOMATION: &str = "marketingAutomation";
    pub const SUPPORT: &str = "support";
    pub const ANALYTICS: &str = "analytics";
    pub const INTEGRATIONS: &str = "integrations";
    pub const CROSS_SYSTEM_INTEGRATION: &str = "crossSystemIntegration";
    pub const DOCUMENTATION: &str = "documentation";
}

/// Phase of a run. Phases are ordered and each is entered at most once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelinePhase {
    Init,
    Analyze,
    GenerateUi,
    GenerateApi,
    GenerateSchema,
    /// Zero or more optional generators
    GenerateOptional,
    Integrate,
    Document,
    Validate,
    Deploy,
    #[serde(rename = "completed")]
    Complete,
    Failed,
}

impl PipelinePhase {
    /// Phases the driver loop walks, in order
    pub const DRIVEN: [PipelinePhase; 9] = [
        PipelinePhase::Analyze,
        PipelinePhase::GenerateUi,
        PipelinePhase::GenerateApi,
        PipelinePhase::GenerateSchema,
        PipelinePhase::GenerateOptional,
        PipelinePhase::Integrate,
        PipelinePhase::Document,
        PipelinePhase::Validate,
        PipelinePhase::Deploy,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Init => "init",
            Self::Analyze => "analyze",
            Self::GenerateUi => "generate_ui",
            Self::GenerateApi => "generate_api",
            Self::GenerateSchema => "generate_schema",
            Self::GenerateOptional => "generate_optional",
            Self::Integrate => "integrate",
            Self::Document => "document",
            Self::Validate => "validate",
            Self::Deploy => "deploy",
            Self::Complete => "completed",
            Self::Failed => "failed",
        }
    }

    /// Percentage reported when the phase is entered
    pub fn base_percent(&self) -> u8 {
        match self {
            Self::Init => 0,
            Self::Analyze => 5,
            Self::GenerateUi => 15,
            Self::GenerateApi => 25,
            Self::GenerateSchema => 35,
            Self::GenerateOptional => 45,
            Self::Integrate => 70,
            Self::Document => 80,
            Self::Validate => 88,
            Self::Deploy => 92,
            Self::Complete => 100,
            // Failed keeps whatever percentage was reached
            Self::Failed => 0,
        }
    }

    /// Percentage at which the phase hands over to the next one
    pub fn ceiling_percent(&self) -> u8 {
        match self {
            Self::Init => 5,
            Self::Analyze => 15,
            Self::GenerateUi => 25,
            Self::GenerateApi => 35,
            Self::GenerateSchema => 45,
            Self::GenerateOptional => 70,
            Self::Integrate => 80,
            Self::Document => 88,
            Self::Validate => 92,
            Self::Deploy => 99,
            Self::Complete => 100,
            Self::Failed => 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for PipelinePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Concrete unit of pipeline work
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    Analyze,
    Ui,
    Api,
    Schema,
    Workflows,
    WorkflowUi,
    Forms,
    ChatAssistant,
    Voice,
    Telephony,
    Crm,
    SalesAutomation,
    MarketingAutomation,
    Support,
    Analytics,
    Integrations,
    CrossSystemIntegration,
    Documentation,
    Validate,
    Deploy,
}

impl StageId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Analyze => "analyze",
            Self::Ui => "ui",
            Self::Api => "api",
            Self::Schema => "schema",
            Self::Workflows => "workflows",
            Self::WorkflowUi => "workflow_ui",
            Self::Forms => "forms",
            Self::ChatAssistant => "chat_assistant",
            Self::Voice => "voice",
            Self::Telephony => "telephony",
            Self::Crm => "crm",
            Self::SalesAutomation => "sales_automation",
            Self::MarketingAutomation => "marketing_automation",
            Self::Support => "support",
            Self::Analytics => "analytics",
            Self::Integrations => "integrations",
            Self::CrossSystemIntegration => "cross_system_integration",
            Self::Documentation => "documentation",
            Self::Validate => "validate",
            Self::Deploy => "deploy",
        }
    }

    /// Table entry for this stage
    pub fn spec(&self) -> &'static StageSpec {
        STAGE_TABLE
            .iter()
            .find(|spec| spec.id == *self)
            .unwrap_or(&STAGE_TABLE[0])
    }

    /// Whether the run options switch this stage on
    pub fn enabled_by(&self, options: &RunOptions) -> bool {
        match self {
            Self::Analyze | Self::Ui | Self::Api | Self::Schema => true,
            Self::Validate | Self::Deploy => true,
            // Workflow UI renders the generated patterns, so it follows the same flag
            Self::Workflows | Self::WorkflowUi => options.workflows,
            Self::Forms => options.forms,
            Self::ChatAssistant => options.chat_assistant,
            Self::Voice => options.voice,
            Self::Telephony => options.telephony,
            Self::Crm => options.crm,
            Self::SalesAutomation => options.sales_automation,
            Self::MarketingAutomation => options.marketing_automation,
            Self::Support => options.support,
            Self::Analytics => options.analytics,
            Self::Integrations => options.integrations,
            Self::CrossSystemIntegration => options.cross_system_integration,
            Self::Documentation => options.documentation,
        }
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How the driver loop executes a stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    /// Invokes a registered generator collaborator
    Generate,
    /// Internal artifact check
    Validate,
    /// Invokes the deployment collaborator
    Deploy,
}

/// One row of the stage table
#[derive(Debug)]
pub struct StageSpec {
    pub id: StageId,
    pub phase: PipelinePhase,
    pub kind: StageKind,
    /// A failure of a required stage fails the run
    pub required: bool,
    /// Category the stage's artifacts are recorded under
    pub category: Option<&'static str>,
    /// Stages whose artifacts must exist before this one starts
    pub depends_on: &'static [StageId],
}

const fn generate(
    id: StageId,
    phase: PipelinePhase,
    required: bool,
    category: &'static str,
    depends_on: &'static [StageId],
) -> StageSpec {
    StageSpec {
        id,
        phase,
        kind: StageKind::Generate,
        required,
        category: Some(category),
        depends_on,
    }
}

use categories as cat;
use PipelinePhase as P;
use StageId as S;

const UI_AND_API: &[StageId] = &[S::Ui, S::Api];
const API_AND_SCHEMA: &[StageId] = &[S::Api, S::Schema];

/// The dependency graph of a run, in driver order
pub static STAGE_TABLE: &[StageSpec] = &[
    generate(S::Analyze, P::Analyze, true, cat::ANALYSIS, &[]),
    generate(S::Ui, P::GenerateUi, true, cat::COMPONENTS, &[S::Analyze]),
    generate(S::Api, P::GenerateApi, true, cat::API_ENDPOINTS, &[S::Analyze]),
    generate(S::Schema, P::GenerateSchema, true, cat::DATABASE_SCHEMA, &[S::Analyze]),
    generate(S::Workflows, P::GenerateOptional, false, cat::WORKFLOWS, &[S::Analyze]),
    generate(
        S::WorkflowUi,
        P::GenerateOptional,
        false,
        cat::WORKFLOW_COMPONENTS,
        &[S::Workflows, S::Ui],
    ),
    generate(S::Forms, P::GenerateOptional, false, cat::FORMS, &[S::Ui]),
    generate(S::ChatAssistant, P::GenerateOptional, false, cat::CHAT_ASSISTANT, UI_AND_API),
    generate(S::Voice, P::GenerateOptional, false, cat::VOICE, UI_AND_API),
    generate(S::Telephony, P::GenerateOptional, false, cat::TELEPHONY, &[S::Api]),
    generate(S::Crm, P::GenerateOptional, false, cat::CRM, UI_AND_API),
    generate(S::SalesAutomation, P::GenerateOptional, false, cat::SALES_AUTOMATION, UI_AND_API),
    generate(
        S::MarketingAutomation,
        P::GenerateOptional,
        false,
        cat::MARKETING_AUTOMATION,
        UI_AND_API,
    ),
    generate(S::Support, P::GenerateOptional, false, cat::SUPPORT, UI_AND_API),
    generate(S::Analytics, P::GenerateOptional, false, cat::ANALYTICS, UI_AND_API),
    generate(S::Integrations, P::Integrate, false, cat::INTEGRATIONS, API_AND_SCHEMA),
    generate(
        S::CrossSystemIntegration,
        P::Integrate,
        false,
        cat::CROSS_SYSTEM_INTEGRATION,
        API_AND_SCHEMA,
    ),
    generate(S::Documentation, P::Document, false, cat::DOCUMENTATION, UI_AND_API),
    StageSpec {
        id: S::Validate,
        phase: P::Validate,
        kind: StageKind::Validate,
        required: true,
        category: None,
        depends_on: UI_AND_API,
    },
    StageSpec {
        id: S::Deploy,
        phase: P::Deploy,
        kind: StageKind::Deploy,
        required: false,
        category: None,
        depends_on: UI_AND_API,
    },
];

/// Table rows belonging to `phase` that `options` enables, in table order
pub fn stages_for(phase: PipelinePhase, options: &RunOptions) -> Vec<&'static StageSpec> {
    STAGE_TABLE
        .iter()
        .filter(|spec| spec.phase == phase && spec.id.enabled_by(options))
        .collect()
}

/// Number of stages a run with `options` will attempt
pub fn planned_stage_count(options: &RunOptions) -> usize {
    STAGE_TABLE
        .iter()
        .filter(|spec| spec.id.enabled_by(options))
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order_matches_driver_order() {
        let mut previous = PipelinePhase::Init;
        for phase in PipelinePhase::DRIVEN {
            assert!(phase > previous);
            assert!(phase.base_percent() >= previous.base_percent());
            previous = phase;
        }
        assert!(PipelinePhase::Complete > PipelinePhase::Deploy);
    }

    #[test]
    fn test_terminal_phase_serialization() {
        let json = serde_json::to_string(&PipelinePhase::Complete).unwrap();
        assert_eq!(json, "\"completed\"");
        let json = serde_json::to_string(&PipelinePhase::GenerateUi).unwrap();
        assert_eq!(json, "\"generate_ui\"");
    }

    #[test]
    fn test_dependencies_never_point_forward() {
        for (index, spec) in STAGE_TABLE.iter().enumerate() {
            for dep in spec.depends_on {
                let dep_index = STAGE_TABLE.iter().position(|s| s.id == *dep).unwrap();
                assert!(dep_index < index, "{} depends on later stage {}", spec.id, dep);
                assert!(dep.spec().phase <= spec.phase);
            }
        }
    }

    #[test]
    fn test_workflow_patterns_precede_workflow_ui() {
        let optional = stages_for(PipelinePhase::GenerateOptional, &RunOptions::default());
        let patterns = optional.iter().position(|s| s.id == StageId::Workflows);
        let ui = optional.iter().position(|s| s.id == StageId::WorkflowUi);
        assert!(patterns.unwrap() < ui.unwrap());
    }

    #[test]
    fn test_options_filter_optional_stages() {
        let options = RunOptions::minimal();
        assert!(stages_for(PipelinePhase::GenerateOptional, &options).is_empty());
        assert!(stages_for(PipelinePhase::Document, &options).is_empty());
        assert_eq!(stages_for(PipelinePhase::GenerateUi, &options).len(), 1);
        // analyze, ui, api, schema, validate, deploy
        assert_eq!(planned_stage_count(&options), 6);
    }

    #[test]
    fn test_required_stages() {
        let required: Vec<StageId> = STAGE_TABLE
            .iter()
            .filter(|s| s.required)
            .map(|s| s.id)
            .collect();
        assert_eq!(
            required,
            vec![S::Analyze, S::Ui, S::Api, S::Schema, S::Validate]
        );
    }
}
