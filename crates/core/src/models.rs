//! # Foundry Models
//!
//! Input types for a generation run: the analyzed business requirement and
//! the per-run options selecting which optional stages execute.
//!
//! ## Example
//! ```rust,ignore
//! use foundry_core::models::{Requirement, RunOptions};
//!
//! let requirement: Requirement = serde_json::from_str(&json)?;
//! requirement.validate()?;
//! let options = RunOptions::default(); // every optional stage enabled
//! ```

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Artifact name -> generated content
pub type ArtifactMap = BTreeMap<String, String>;

/// Artifact category -> artifacts in that category
pub type ArtifactCategories = BTreeMap<String, ArtifactMap>;

/// A business process extracted from the requirement text
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct BusinessProcess {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Ordered step names
    #[serde(default)]
    pub steps: Vec<String>,
    /// Roles involved in the process
    #[serde(default)]
    pub roles: Vec<String>,
}

/// Input field type of a form
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    #[default]
    Text,
    Number,
    Currency,
    Date,
    Email,
    Boolean,
    Select,
}

impl FieldType {
    /// SQL column type used by the schema scaffold
    pub fn sql_type(&self) -> &'static str {
        match self {
            FieldType::Text | FieldType::Email | FieldType::Select => "TEXT",
            FieldType::Number => "INTEGER",
            FieldType::Currency => "NUMERIC(12, 2)",
            FieldType::Date => "TIMESTAMP",
            FieldType::Boolean => "BOOLEAN",
        }
    }

    /// TypeScript type used by the UI and API scaffolds
    pub fn ts_type(&self) -> &'static str {
        match self {
            FieldType::Text | FieldType::Email | FieldType::Select | FieldType::Date => "string",
            FieldType::Number | FieldType::Currency => "number",
            FieldType::Boolean => "boolean",
        }
    }
}

/// A single form field
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FormField {
    pub name: String,
    #[serde(default)]
    pub field_type: FieldType,
    #[serde(default)]
    pub required: bool,
}

/// A data-capture form
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct FormSpec {
    pub name: String,
    #[serde(default)]
    pub fields: Vec<FormField>,
}

/// An approval requirement. `amount_field` names the monetary value that
/// drives threshold routing, when present.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct ApprovalSpec {
    pub name: String,
    #[serde(default)]
    pub approver_roles: Vec<String>,
    #[serde(default)]
    pub amount_field: Option<String>,
}

/// An external system the generated application talks to
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct IntegrationSpec {
    pub system: String,
    #[serde(default)]
    pub purpose: String,
}

/// Risk level of the requirement
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    #[default]
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct RiskAssessment {
    #[serde(default)]
    pub level: RiskLevel,
    #[serde(default)]
    pub factors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Default)]
pub struct ResourceRequirements {
    #[serde(default)]
    pub expected_users: u32,
    #[serde(default)]
    pub storage_gb: u32,
    #[serde(default)]
    pub roles: Vec<String>,
}

/// The analyzed business requirement. Supplied once per run and never
/// mutated by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct Requirement {
    /// Original free-text description
    pub text: String,
    #[serde(default)]
    pub processes: Vec<BusinessProcess>,
    #[serde(default)]
    pub forms: Vec<FormSpec>,
    #[serde(default)]
    pub approvals: Vec<ApprovalSpec>,
    #[serde(default)]
    pub integrations: Vec<IntegrationSpec>,
    /// Workflow pattern hints ("sequential", "parallel", "conditional", "approval_chain")
    #[serde(default)]
    pub workflow_patterns: Vec<String>,
    #[serde(default)]
    pub risk_assessment: Option<RiskAssessment>,
    #[serde(default)]
    pub resource_requirements: Option<ResourceRequirements>,
    /// Extraction confidence in [0, 1]
    pub confidence: f64,
}

impl Requirement {
    /// Create a requirement with only free text and full confidence
    pub fn from_text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            processes: Vec::new(),
            forms: Vec::new(),
            approvals: Vec::new(),
            integrations: Vec::new(),
            workflow_patterns: Vec::new(),
            risk_assessment: None,
            resource_requirements: None,
            confidence: 1.0,
        }
    }

    /// Check the structural invariants of the requirement
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.text.trim().is_empty() {
            anyhow::bail!("requirement text is empty");
        }
        if !(0.0..=1.0).contains(&self.confidence) || self.confidence.is_nan() {
            anyhow::bail!(
                "confidence score {} is outside the range [0, 1]",
                self.confidence
            );
        }
        Ok(())
    }

    /// Every role named anywhere in the requirement, deduplicated
    pub fn roles(&self) -> Vec<String> {
        let mut roles: Vec<String> = self
            .processes
            .iter()
            .flat_map(|p| p.roles.iter())
            .chain(self.approvals.iter().flat_map(|a| a.approver_roles.iter()))
            .chain(
                self.resource_requirements
                    .iter()
                    .flat_map(|r| r.roles.iter()),
            )
            .cloned()
            .collect();
        roles.sort();
        roles.dedup();
        roles
    }
}

/// JSON schema of [`Requirement`], for clients preparing run input
pub fn requirement_schema() -> schemars::Schema {
    schemars::schema_for!(Requirement)
}

/// Where the deployment collaborator should place the result
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentTarget {
    #[default]
    Local,
    Preview,
    Production,
}

impl DeploymentTarget {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentTarget::Local => "local",
            DeploymentTarget::Preview => "preview",
            DeploymentTarget::Production => "production",
        }
    }
}

fn enabled() -> bool {
    true
}

/// Per-run options. Omitted stage flags default to enabled.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct RunOptions {
    #[serde(default = "enabled")]
    pub workflows: bool,
    #[serde(default = "enabled")]
    pub forms: bool,
    #[serde(default = "enabled")]
    pub integrations: bool,
    #[serde(default = "enabled")]
    pub chat_assistant: bool,
    #[serde(default = "enabled")]
    pub voice: bool,
    #[serde(default = "enabled")]
    pub telephony: bool,
    #[serde(default = "enabled")]
    pub crm: bool,
    #[serde(default = "enabled")]
    pub sales_automation: bool,
    #[serde(default = "enabled")]
    pub marketing_automation: bool,
    #[serde(default = "enabled")]
    pub support: bool,
    #[serde(default = "enabled")]
    pub analytics: bool,
    #[serde(default = "enabled")]
    pub cross_system_integration: bool,
    #[serde(default)]
    pub deployment_target: DeploymentTarget,
    #[serde(default = "enabled")]
    pub documentation: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workflows: true,
            forms: true,
            integrations: true,
            chat_assistant: true,
            voice: true,
            telephony: true,
            crm: true,
            sales_automation: true,
            marketing_automation: true,
            support: true,
            analytics: true,
            cross_system_integration: true,
            deployment_target: DeploymentTarget::Local,
            documentation: true,
        }
    }
}

impl RunOptions {
    /// Options with every optional stage and documentation turned off
    pub fn minimal() -> Self {
        Self {
            workflows: false,
            forms: false,
            integrations: false,
            chat_assistant: false,
            voice: false,
            telephony: false,
            crm: false,
            sales_automation: false,
            marketing_automation: false,
            support: false,
            analytics: false,
            cross_system_integration: false,
            deployment_target: DeploymentTarget::Local,
            documentation: false,
        }
    }
}
