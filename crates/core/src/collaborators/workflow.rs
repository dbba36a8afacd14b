//! # Workflow Patterns
//!
//! Data model for the workflows a generated application runs, and the two
//! generators that produce them: one emits the patterns as JSON, the other
//! renders a tracker screen per pattern.
//!
//! Conditions are a decision table for a downstream engine. Nothing here
//! evaluates them.

use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::approval::{routing_pattern, ApprovalThresholds};
use super::templates::{kebab_case, pascal_case, snake_case, to_json};
use super::{Generator, StageContext};
use crate::models::{ArtifactMap, BusinessProcess, Requirement, RiskLevel};
use crate::pipeline::categories;

/// Artifact suffix shared by both workflow generators
pub const WORKFLOW_SUFFIX: &str = ".workflow.json";

const DEFAULT_SLA_HOURS: u32 = 24;
const HIGH_RISK_SLA_HOURS: u32 = 8;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Sequential,
    Parallel,
    Conditional,
    ApprovalChain,
}

impl PatternKind {
    fn from_hint(hint: &str) -> Option<Self> {
        match snake_case(hint).as_str() {
            "sequential" => Some(Self::Sequential),
            "parallel" => Some(Self::Parallel),
            "conditional" => Some(Self::Conditional),
            "approval_chain" | "approval" => Some(Self::ApprovalChain),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NotificationTrigger {
    StepStart,
    StepComplete,
    Overdue,
    Escalation,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Assignee,
    Creator,
    Manager,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub trigger: NotificationTrigger,
    pub recipients: Vec<Recipient>,
    pub template: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_minutes: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRule {
    pub after_hours: u32,
    pub escalate_to: Vec<String>,
    pub notification: Notification,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowStep {
    pub id: String,
    pub name: String,
    /// Roles allowed to act on the step
    pub assignees: Vec<String>,
    #[serde(default)]
    pub required_inputs: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sla_hours: Option<u32>,
    #[serde(default)]
    pub escalations: Vec<EscalationRule>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    /// Values later steps may consume
    #[serde(default)]
    pub outputs: Vec<String>,
    #[serde(default = "default_required")]
    pub required: bool,
    /// Terminal step completed without a human decision
    #[serde(default)]
    pub auto_approved: bool,
}

fn default_required() -> bool {
    true
}

impl WorkflowStep {
    /// A required step for `roles` with no SLA and no notifications
    pub fn new(id: impl Into<String>, name: impl Into<String>, roles: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            assignees: roles,
            required_inputs: Vec::new(),
            sla_hours: None,
            escalations: Vec::new(),
            notifications: Vec::new(),
            outputs: Vec::new(),
            required: true,
            auto_approved: false,
        }
    }

    /// Attach an SLA with the standard overdue notice and manager escalation
    pub fn with_sla(mut self, hours: u32) -> Self {
        self.sla_hours = Some(hours);
        self.notifications.push(Notification {
            trigger: NotificationTrigger::Overdue,
            recipients: vec![Recipient::Assignee],
            template: format!("{}_overdue", self.id),
            delay_minutes: None,
        });
        self.escalations.push(EscalationRule {
            after_hours: hours * 2,
            escalate_to: vec!["manager".to_string()],
            notification: Notification {
                trigger: NotificationTrigger::Escalation,
                recipients: vec![Recipient::Manager],
                template: format!("{}_escalated", self.id),
                delay_minutes: None,
            },
        });
        self
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    GreaterThan,
    LessThan,
    Contains,
    In,
}

/// One row of a decision table: after `step`, compare `field` and move on
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowCondition {
    pub step: String,
    pub field: String,
    pub operator: ConditionOperator,
    pub value: serde_json::Value,
    pub next_step: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub else_step: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkflowPattern {
    pub name: String,
    pub kind: PatternKind,
    pub steps: Vec<WorkflowStep>,
    #[serde(default)]
    pub conditions: Vec<WorkflowCondition>,
}

impl WorkflowPattern {
    pub fn step(&self, id: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.id == id)
    }
}

/// Emits one pattern per business process and approval
pub struct WorkflowPatternGenerator {
    thresholds: ApprovalThresholds,
}

impl WorkflowPatternGenerator {
    pub fn new(thresholds: ApprovalThresholds) -> Self {
        Self { thresholds }
    }

    fn process_pattern(&self, process: &BusinessProcess, requirement: &Requirement) -> WorkflowPattern {
        let kind = requirement
            .workflow_patterns
            .iter()
            .find_map(|hint| PatternKind::from_hint(hint))
            .filter(|kind| *kind != PatternKind::ApprovalChain)
            .unwrap_or(PatternKind::Sequential);

        let sla = match requirement.risk_assessment.as_ref().map(|r| r.level) {
            Some(RiskLevel::High) => HIGH_RISK_SLA_HOURS,
            _ => DEFAULT_SLA_HOURS,
        };

        let step_names: Vec<String> = if process.steps.is_empty() {
            vec!["Submit".to_string(), "Review".to_string(), "Complete".to_string()]
        } else {
            process.steps.clone()
        };
        let roles = if process.roles.is_empty() {
            vec!["owner".to_string()]
        } else {
            process.roles.clone()
        };

        let mut steps: Vec<WorkflowStep> = Vec::with_capacity(step_names.len());
        for (index, name) in step_names.iter().enumerate() {
            let id = snake_case(name);
            let role = roles[index % roles.len()].clone();
            let mut step = WorkflowStep::new(id.clone(), name.clone(), vec![role]).with_sla(sla);
            step.outputs.push(format!("{}_result", id));
            step.notifications.push(Notification {
                trigger: NotificationTrigger::StepStart,
                recipients: vec![Recipient::Assignee],
                template: format!("{}_assigned", id),
                delay_minutes: None,
            });
            if kind != PatternKind::Parallel {
                if let Some(previous) = steps.last() {
                    step.required_inputs = previous.outputs.clone();
                }
            }
            steps.push(step);
        }
        if let Some(last) = steps.last_mut() {
            last.notifications.push(Notification {
                trigger: NotificationTrigger::StepComplete,
                recipients: vec![Recipient::Creator],
                template: format!("{}_completed", snake_case(&process.name)),
                delay_minutes: Some(5),
            });
        }

        let mut conditions = Vec::new();
        if kind == PatternKind::Conditional && steps.len() >= 3 {
            // Rejection at the first decision skips straight to the last step
            let first = &steps[0];
            conditions.push(WorkflowCondition {
                step: first.id.clone(),
                field: format!("{}_result", first.id),
                operator: ConditionOperator::Equals,
                value: serde_json::json!("approved"),
                next_step: steps[1].id.clone(),
                else_step: steps.last().map(|s| s.id.clone()),
            });
        }

        WorkflowPattern {
            name: process.name.clone(),
            kind,
            steps,
            conditions,
        }
    }
}

#[async_trait]
impl Generator for WorkflowPatternGenerator {
    async fn generate(
        &self,
        requirement: &Requirement,
        _context: &StageContext,
    ) -> anyhow::Result<ArtifactMap> {
        let mut artifacts = ArtifactMap::new();

        for process in &requirement.processes {
            let pattern = self.process_pattern(process, requirement);
            artifacts.insert(
                format!("{}{}", kebab_case(&process.name), WORKFLOW_SUFFIX),
                to_json(&pattern)?,
            );
        }

        for approval in &requirement.approvals {
            let pattern = match &approval.amount_field {
                Some(field) => routing_pattern(&approval.name, field, &self.thresholds),
                None => {
                    let roles = if approval.approver_roles.is_empty() {
                        vec!["manager".to_string()]
                    } else {
                        approval.approver_roles.clone()
                    };
                    WorkflowPattern {
                        name: approval.name.clone(),
                        kind: PatternKind::ApprovalChain,
                        steps: roles
                            .iter()
                            .map(|role| {
                                WorkflowStep::new(
                                    format!("{}_approval", snake_case(role)),
                                    format!("{} approval", pascal_case(role)),
                                    vec![role.clone()],
                                )
                                .with_sla(DEFAULT_SLA_HOURS)
                            })
                            .collect(),
                        conditions: Vec::new(),
                    }
                }
            };
            artifacts.insert(
                format!("{}{}", kebab_case(&approval.name), WORKFLOW_SUFFIX),
                to_json(&pattern)?,
            );
        }

        Ok(artifacts)
    }
}

/// Renders a tracker component per generated workflow pattern
pub struct WorkflowUiGenerator;

#[async_trait]
impl Generator for WorkflowUiGenerator {
    async fn generate(
        &self,
        _requirement: &Requirement,
        context: &StageContext,
    ) -> anyhow::Result<ArtifactMap> {
        let workflows = context
            .input(categories::WORKFLOWS)
            .context("workflow patterns are not available")?;

        let mut artifacts = ArtifactMap::new();
        let mut trackers = Vec::new();

        for (name, body) in workflows.iter().filter(|(n, _)| n.ends_with(WORKFLOW_SUFFIX)) {
            let pattern: WorkflowPattern = serde_json::from_str(body)
                .with_context(|| format!("invalid workflow pattern {}", name))?;
            let component = format!("{}Tracker", pascal_case(&pattern.name));

            let steps: String = pattern
                .steps
                .iter()
                .map(|step| {
                    format!(
                        "  {{ id: '{}', name: '{}', assignees: [{}], slaHours: {} }},\n",
                        step.id,
                        step.name.replace('\'', "\\'"),
                        step.assignees
                            .iter()
                            .map(|r| format!("'{}'", r))
                            .collect::<Vec<_>>()
                            .join(", "),
                        step.sla_hours
                            .map(|h| h.to_string())
                            .unwrap_or_else(|| "null".to_string()),
                    )
                })
                .collect();

            artifacts.insert(
                format!("{}.tsx", component),
                format!(
                    "import {{ StepTimeline }} from '../components/StepTimeline';\n\n\
                     const steps = [\n{steps}];\n\n\
                     export function {component}({{ instanceId }}: {{ instanceId: string }}) {{\n  \
                     return <StepTimeline workflow=\"{kind}\" instanceId={{instanceId}} steps={{steps}} />;\n}}\n",
                    steps = steps,
                    component = component,
                    kind = kebab_case(&pattern.name),
                ),
            );
            trackers.push(component);
        }

        if trackers.is_empty() {
            return Ok(artifacts);
        }

        let imports: String = trackers
            .iter()
            .map(|t| format!("import {{ {t} }} from './{t}';\n", t = t))
            .collect();
        let rows: String = trackers
            .iter()
            .map(|t| format!("      <{} instanceId={{selected}} />\n", t))
            .collect();
        artifacts.insert(
            "TaskInbox.tsx".to_string(),
            format!(
                "{imports}\nexport function TaskInbox({{ selected }}: {{ selected: string }}) {{\n  \
                 return (\n    <section>\n{rows}    </section>\n  );\n}}\n",
                imports = imports,
                rows = rows,
            ),
        );

        Ok(artifacts)
    }
}
