//! README and API reference for the generated application.

use anyhow::Context;
use async_trait::async_trait;

use super::templates::title_from_text;
use super::{Generator, StageContext};
use crate::models::{ArtifactMap, Requirement, RunOptions};
use crate::pipeline::categories;

pub struct DocumentationGenerator;

fn enabled_modules(options: &RunOptions) -> Vec<&'static str> {
    [
        (options.workflows, "Workflows"),
        (options.forms, "Form validation"),
        (options.chat_assistant, "Chat assistant"),
        (options.voice, "Voice commands"),
        (options.telephony, "Telephony"),
        (options.crm, "CRM"),
        (options.sales_automation, "Sales automation"),
        (options.marketing_automation, "Marketing automation"),
        (options.support, "Support desk"),
        (options.analytics, "Analytics"),
        (options.integrations, "Integrations"),
        (options.cross_system_integration, "Cross-system sync"),
    ]
    .into_iter()
    .filter_map(|(on, label)| on.then_some(label))
    .collect()
}

#[async_trait]
impl Generator for DocumentationGenerator {
    async fn generate(
        &self,
        requirement: &Requirement,
        context: &StageContext,
    ) -> anyhow::Result<ArtifactMap> {
        let components = context
            .input(categories::COMPONENTS)
            .context("UI components are not available")?;
        let endpoints = context
            .input(categories::API_ENDPOINTS)
            .context("API endpoints are not available")?;

        let mut readme = format!(
            "# {}\n\n{}\n\nRun `{}` targeting `{}`.\n\n## Modules\n\n",
            title_from_text(&requirement.text),
            requirement.text.trim(),
            context.run_id,
            context.options.deployment_target.as_str(),
        );
        for module in enabled_modules(&context.options) {
            readme.push_str(&format!("- {}\n", module));
        }
        readme.push_str("\n## Components\n\n");
        for name in components.keys() {
            readme.push_str(&format!("- `{}`\n", name));
        }
        let roles = requirement.roles();
        if !roles.is_empty() {
            readme.push_str("\n## Roles\n\n");
            for role in roles {
                readme.push_str(&format!("- {}\n", role));
            }
        }

        let mut api = String::from("# API Reference\n\n");
        for (name, source) in endpoints {
            api.push_str(&format!("## {}\n\n", name));
            // Route lines look like `router.get('/api/...', ...)`
            for line in source.lines().filter(|l| l.starts_with("router.")) {
                if let Some((method, rest)) = line
                    .strip_prefix("router.")
                    .and_then(|l| l.split_once("('"))
                {
                    let path = rest.split('\'').next().unwrap_or_default();
                    api.push_str(&format!("- `{} {}`\n", method.to_uppercase(), path));
                }
            }
            api.push('\n');
        }

        let mut artifacts = ArtifactMap::new();
        artifacts.insert("README.md".to_string(), readme);
        artifacts.insert("API.md".to_string(), api);
        Ok(artifacts)
    }
}
