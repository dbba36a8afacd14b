//! # Foundry Collaborators
//!
//! Interfaces the pipeline drives, plus deterministic scaffold
//! implementations that need no text-generation backend.
//!
//! ## Architecture
//!
//! ```text
//! Orchestrator
//!   ├── Generator (one per StageId, via GeneratorRegistry)
//!   ├── Deployer
//!   └── RunStore (state::run_store)
//! ```
//!
//! ## Scaffold Generators
//!
//! **Required:**
//! - `RequirementAnalyzer` - Summary and entity inventory
//! - `UiScaffold` / `ApiScaffold` / `SchemaScaffold` - Core application layers
//!
//! **Optional:**
//! - `WorkflowPatternGenerator` / `WorkflowUiGenerator` - Workflow patterns and their screens
//! - `FormValidationGenerator` - Form validation schemas
//! - `DomainKitGenerator` - Chat assistant, voice, telephony, CRM, sales, marketing, support, analytics
//! - `IntegrationGenerator` / `CrossSystemGenerator` - Connectors and sync maps
//! - `DocumentationGenerator` - README and run documentation
//!
//! **Deployment:**
//! - `FilesystemDeployer` - Writes the deliverable to disk

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

use crate::models::{ArtifactCategories, ArtifactMap, DeploymentTarget, Requirement, RunOptions};
use crate::pipeline::StageId;

pub mod analyzer;
pub mod approval;
pub mod deploy;
pub mod docs;
pub mod domain_kits;
pub mod integrations;
pub mod scaffold;
pub mod templates;
pub mod workflow;

pub use analyzer::RequirementAnalyzer;
pub use approval::{route_quote_approval, ApprovalThresholds};
pub use deploy::FilesystemDeployer;
pub use docs::DocumentationGenerator;
pub use domain_kits::{DomainKit, DomainKitGenerator};
pub use integrations::{CrossSystemGenerator, IntegrationGenerator};
pub use scaffold::{ApiScaffold, FormValidationGenerator, SchemaScaffold, UiScaffold};
pub use workflow::{WorkflowPatternGenerator, WorkflowUiGenerator};

/// Inputs handed to a generator besides the requirement itself.
/// Identical across retries of the same stage.
#[derive(Debug, Clone)]
pub struct StageContext {
    pub run_id: String,
    pub stage: StageId,
    pub options: RunOptions,
    /// Artifacts of the stages this one depends on, by category
    pub inputs: ArtifactCategories,
}

impl StageContext {
    pub fn input(&self, category: &str) -> Option<&ArtifactMap> {
        self.inputs.get(category)
    }
}

/// An external content generator
#[async_trait]
pub trait Generator: Send + Sync {
    /// Turn the requirement into named artifacts. Must not mutate shared
    /// state when it fails.
    async fn generate(
        &self,
        requirement: &Requirement,
        context: &StageContext,
    ) -> anyhow::Result<ArtifactMap>;
}

/// Run details passed to the deployment collaborator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadata {
    pub run_id: String,
    pub target: DeploymentTarget,
    pub started_at: DateTime<Utc>,
}

/// The artifacts a deployment ships
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentBundle {
    pub components: ArtifactMap,
    pub api_endpoints: ArtifactMap,
    pub database_schema: ArtifactMap,
}

/// What the deployment collaborator reports back
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentReport {
    pub success: bool,
    #[serde(default)]
    pub deployment_url: Option<String>,
    #[serde(default)]
    pub metrics: Option<serde_json::Value>,
}

impl DeploymentReport {
    pub fn failed() -> Self {
        Self {
            success: false,
            deployment_url: None,
            metrics: None,
        }
    }
}

/// The deployment collaborator
#[async_trait]
pub trait Deployer: Send + Sync {
    async fn deploy(
        &self,
        requirement: &Requirement,
        metadata: &RunMetadata,
        bundle: DeploymentBundle,
    ) -> anyhow::Result<DeploymentReport>;
}

/// Generators keyed by the stage they serve
#[derive(Clone, Default)]
pub struct GeneratorRegistry {
    generators: HashMap<StageId, Arc<dyn Generator>>,
}

impl GeneratorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) the generator for `stage`
    pub fn with(mut self, stage: StageId, generator: Arc<dyn Generator>) -> Self {
        self.generators.insert(stage, generator);
        self
    }

    pub fn insert(&mut self, stage: StageId, generator: Arc<dyn Generator>) {
        self.generators.insert(stage, generator);
    }

    pub fn get(&self, stage: StageId) -> Option<Arc<dyn Generator>> {
        self.generators.get(&stage).cloned()
    }

    pub fn len(&self) -> usize {
        self.generators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.generators.is_empty()
    }

    /// The full set of deterministic scaffold generators
    pub fn scaffold(thresholds: ApprovalThresholds) -> Self {
        Self::new()
            .with(StageId::Analyze, Arc::new(RequirementAnalyzer))
            .with(StageId::Ui, Arc::new(UiScaffold))
            .with(StageId::Api, Arc::new(ApiScaffold))
            .with(StageId::Schema, Arc::new(SchemaScaffold))
            .with(
                StageId::Workflows,
                Arc::new(WorkflowPatternGenerator::new(thresholds)),
            )
            .with(StageId::WorkflowUi, Arc::new(WorkflowUiGenerator))
            .with(StageId::Forms, Arc::new(FormValidationGenerator))
            .with(
                StageId::ChatAssistant,
                Arc::new(DomainKitGenerator::new(DomainKit::ChatAssistant)),
            )
            .with(StageId::Voice, Arc::new(DomainKitGenerator::new(DomainKit::Voice)))
            .with(
                StageId::Telephony,
                Arc::new(DomainKitGenerator::new(DomainKit::Telephony)),
            )
            .with(StageId::Crm, Arc::new(DomainKitGenerator::new(DomainKit::Crm)))
            .with(
                StageId::SalesAutomation,
                Arc::new(DomainKitGenerator::new(DomainKit::SalesAutomation)),
            )
            .with(
                StageId::MarketingAutomation,
                Arc::new(DomainKitGenerator::new(DomainKit::MarketingAutomation)),
            )
            .with(StageId::Support, Arc::new(DomainKitGenerator::new(DomainKit::Support)))
            .with(
                StageId::Analytics,
                Arc::new(DomainKitGenerator::new(DomainKit::Analytics)),
            )
            .with(StageId::Integrations, Arc::new(IntegrationGenerator))
            .with(StageId::CrossSystemIntegration, Arc::new(CrossSystemGenerator))
            .with(StageId::Documentation, Arc::new(DocumentationGenerator))
    }
}
