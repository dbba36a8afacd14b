//! Requirement analysis: checks the requirement and writes a summary plus
//! an entity inventory the later stages and the documentation can cite.

use async_trait::async_trait;
use serde_json::json;

use super::templates::{pascal_case, title_from_text, to_json};
use super::{Generator, StageContext};
use crate::models::{ArtifactMap, Requirement};

/// Below this the summary flags the requirement for human review
const LOW_CONFIDENCE: f64 = 0.5;

pub struct RequirementAnalyzer;

impl RequirementAnalyzer {
    fn summary(requirement: &Requirement) -> String {
        let mut out = format!("# {}\n\n", title_from_text(&requirement.text));
        out.push_str(requirement.text.trim());
        out.push_str("\n\n## Inventory\n\n");
        out.push_str(&format!("- Processes: {}\n", requirement.processes.len()));
        out.push_str(&format!("- Forms: {}\n", requirement.forms.len()));
        out.push_str(&format!("- Approvals: {}\n", requirement.approvals.len()));
        out.push_str(&format!("- Integrations: {}\n", requirement.integrations.len()));

        let roles = requirement.roles();
        if !roles.is_empty() {
            out.push_str(&format!("- Roles: {}\n", roles.join(", ")));
        }
        out.push_str(&format!("- Confidence: {:.2}\n", requirement.confidence));

        if requirement.confidence < LOW_CONFIDENCE {
            out.push_str("\n> Extraction confidence is low. Review the generated output before deploying.\n");
        }

        if let Some(risk) = &requirement.risk_assessment {
            out.push_str(&format!("\n## Risk\n\nLevel: {:?}\n", risk.level));
            for factor in &risk.factors {
                out.push_str(&format!("- {}\n", factor));
            }
        }
        out
    }

    fn entities(requirement: &Requirement) -> anyhow::Result<String> {
        let entities: Vec<_> = requirement
            .forms
            .iter()
            .map(|form| {
                json!({
                    "entity": pascal_case(&form.name),
                    "source": "form",
                    "fields": form.fields.iter().map(|f| &f.name).collect::<Vec<_>>(),
                })
            })
            .chain(requirement.processes.iter().map(|process| {
                json!({
                    "entity": format!("{}Instance", pascal_case(&process.name)),
                    "source": "process",
                    "fields": ["status", "assignee", "started_at"],
                })
            }))
            .collect();
        to_json(&json!({
            "entities": entities,
            "roles": requirement.roles(),
            "integrations": requirement.integrations.iter().map(|i| &i.system).collect::<Vec<_>>(),
        }))
    }
}

#[async_trait]
impl Generator for RequirementAnalyzer {
    async fn generate(
        &self,
        requirement: &Requirement,
        _context: &StageContext,
    ) -> anyhow::Result<ArtifactMap> {
        requirement.validate()?;

        let mut artifacts = ArtifactMap::new();
        artifacts.insert("summary.md".to_string(), Self::summary(requirement));
        artifacts.insert("entities.json".to_string(), Self::entities(requirement)?);
        Ok(artifacts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FormField, FormSpec, RunOptions};
    use crate::pipeline::StageId;

    fn context() -> StageContext {
        StageContext {
            run_id: "run-test".to_string(),
            stage: StageId::Analyze,
            options: RunOptions::default(),
            inputs: Default::default(),
        }
    }

    #[tokio::test]
    async fn test_analyzer_produces_summary_and_entities() {
        let mut requirement = Requirement::from_text("Vendor onboarding\nCollect vendor details.");
        requirement.forms.push(FormSpec {
            name: "vendor profile".to_string(),
            fields: vec![FormField {
                name: "company".to_string(),
                field_type: Default::default(),
                required: true,
            }],
        });

        let artifacts = RequirementAnalyzer.generate(&requirement, &context()).await.unwrap();
        assert!(artifacts["summary.md"].starts_with("# Vendor onboarding"));

        let entities: serde_json::Value = serde_json::from_str(&artifacts["entities.json"]).unwrap();
        assert_eq!(entities["entities"][0]["entity"], "VendorProfile");
    }

    #[tokio::test]
    async fn test_analyzer_flags_low_confidence() {
        let mut requirement = Requirement::from_text("Something vague");
        requirement.confidence = 0.2;

        let artifacts = RequirementAnalyzer.generate(&requirement, &context()).await.unwrap();
        assert!(artifacts["summary.md"].contains("confidence is low"));
    }

    #[tokio::test]
    async fn test_analyzer_rejects_invalid_requirement() {
        let requirement = Requirement::from_text("  ");
        assert!(RequirementAnalyzer.generate(&requirement, &context()).await.is_err());
    }
}
