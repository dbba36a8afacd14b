//! Threshold routing for monetary approvals.
//!
//! ```text
//! value < T1        → auto_approve
//! T1 ≤ value < T2   → manager_approval
//! value ≥ T2        → manager_approval → finance_approval
//! ```

use serde::{Deserialize, Serialize};

use super::templates::snake_case;
use super::workflow::{
    ConditionOperator, PatternKind, WorkflowCondition, WorkflowPattern, WorkflowStep,
};

/// Step id a condition points at when the workflow is finished
pub const END_STEP: &str = "end";

const APPROVAL_SLA_HOURS: u32 = 24;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct ApprovalThresholds {
    /// T1: values below this are approved without review
    pub auto_approve_below: f64,
    /// T2: values at or above this also need finance sign-off
    pub finance_review_from: f64,
}

impl Default for ApprovalThresholds {
    fn default() -> Self {
        Self {
            auto_approve_below: 10_000.0,
            finance_review_from: 50_000.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalTier {
    AutoApproved,
    Manager,
    ManagerAndFinance,
}

impl ApprovalThresholds {
    pub fn tier(&self, value: f64) -> ApprovalTier {
        if value < self.auto_approve_below {
            ApprovalTier::AutoApproved
        } else if value < self.finance_review_from {
            ApprovalTier::Manager
        } else {
            ApprovalTier::ManagerAndFinance
        }
    }
}

fn auto_approve_step() -> WorkflowStep {
    let mut step = WorkflowStep::new("auto_approve", "Auto approval", vec!["system".to_string()]);
    step.auto_approved = true;
    step.outputs.push("approval_decision".to_string());
    step
}

fn manager_step() -> WorkflowStep {
    let mut step = WorkflowStep::new(
        "manager_approval",
        "Manager approval",
        vec!["manager".to_string()],
    )
    .with_sla(APPROVAL_SLA_HOURS);
    step.outputs.push("manager_decision".to_string());
    step
}

fn finance_step() -> WorkflowStep {
    let mut step = WorkflowStep::new(
        "finance_approval",
        "Finance approval",
        vec!["finance".to_string()],
    )
    .with_sla(APPROVAL_SLA_HOURS);
    step.required_inputs.push("manager_decision".to_string());
    step.outputs.push("finance_decision".to_string());
    step
}

/// The approval chain a quote of `value` has to pass, in order
pub fn route_quote_approval(value: f64, thresholds: &ApprovalThresholds) -> Vec<WorkflowStep> {
    match thresholds.tier(value) {
        ApprovalTier::AutoApproved => vec![auto_approve_step()],
        ApprovalTier::Manager => vec![manager_step()],
        ApprovalTier::ManagerAndFinance => vec![manager_step(), finance_step()],
    }
}

/// All three tiers as one conditional pattern keyed on `amount_field`
pub fn routing_pattern(
    name: &str,
    amount_field: &str,
    thresholds: &ApprovalThresholds,
) -> WorkflowPattern {
    let field = snake_case(amount_field);
    let mut submit = WorkflowStep::new("submit", "Submit", vec!["requester".to_string()]);
    submit.required_inputs.push(field.clone());

    WorkflowPattern {
        name: name.to_string(),
        kind: PatternKind::Conditional,
        steps: vec![submit, auto_approve_step(), manager_step(), finance_step()],
        conditions: vec![
            WorkflowCondition {
                step: "submit".to_string(),
                field: field.clone(),
                operator: ConditionOperator::LessThan,
                value: serde_json::json!(thresholds.auto_approve_below),
                next_step: "auto_approve".to_string(),
                else_step: Some("manager_approval".to_string()),
            },
            WorkflowCondition {
                step: "manager_approval".to_string(),
                field,
                operator: ConditionOperator::LessThan,
                value: serde_json::json!(thresholds.finance_review_from),
                next_step: END_STEP.to_string(),
                else_step: Some("finance_approval".to_string()),
            },
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roles(chain: &[WorkflowStep]) -> Vec<&str> {
        chain
            .iter()
            .flat_map(|s| s.assignees.iter().map(String::as_str))
            .collect()
    }

    #[test]
    fn test_routing_at_threshold_boundaries() {
        let thresholds = ApprovalThresholds::default();

        let chain = route_quote_approval(9_999.0, &thresholds);
        assert_eq!(chain.len(), 1);
        assert!(chain[0].auto_approved);

        let chain = route_quote_approval(10_000.0, &thresholds);
        assert_eq!(roles(&chain), vec!["manager"]);

        let chain = route_quote_approval(49_999.0, &thresholds);
        assert_eq!(roles(&chain), vec!["manager"]);

        let chain = route_quote_approval(50_000.0, &thresholds);
        assert_eq!(roles(&chain), vec!["manager", "finance"]);
        assert!(chain.iter().all(|s| s.required));
    }

    #[test]
    fn test_custom_thresholds() {
        let thresholds = ApprovalThresholds {
            auto_approve_below: 100.0,
            finance_review_from: 1_000.0,
        };
        assert_eq!(thresholds.tier(99.5), ApprovalTier::AutoApproved);
        assert_eq!(thresholds.tier(100.0), ApprovalTier::Manager);
        assert_eq!(thresholds.tier(1_000.0), ApprovalTier::ManagerAndFinance);
    }

    #[test]
    fn test_routing_pattern_decision_table() {
        let pattern = routing_pattern("Quote approval", "quoteTotal", &ApprovalThresholds::default());

        assert_eq!(pattern.kind, PatternKind::Conditional);
        assert_eq!(pattern.conditions.len(), 2);
        assert_eq!(pattern.conditions[0].field, "quote_total");
        assert_eq!(pattern.conditions[0].value, serde_json::json!(10_000.0));
        assert_eq!(pattern.conditions[1].next_step, END_STEP);
        assert!(pattern.step("finance_approval").is_some());
    }

    #[test]
    fn test_thresholds_deserialize_with_defaults() {
        let thresholds: ApprovalThresholds =
            serde_json::from_str(r#"{"autoApproveBelow": 5000}"#).unwrap();
        assert_eq!(thresholds.auto_approve_below, 5_000.0);
        assert_eq!(thresholds.finance_review_from, 50_000.0);
    }
}
