//! Connectors for the external systems a requirement names, and the
//! cross-system sync map between generated tables and those systems.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::templates::{kebab_case, pascal_case, to_json};
use super::{Generator, StageContext};
use crate::models::{ArtifactMap, Requirement};
use crate::pipeline::categories;

fn table_names(context: &StageContext) -> anyhow::Result<Vec<String>> {
    let schema = context
        .input(categories::DATABASE_SCHEMA)
        .context("database schema is not available")?;
    Ok(schema
        .keys()
        .filter_map(|k| k.strip_suffix(".sql"))
        .map(str::to_string)
        .collect())
}

/// One connector module per integration, or a generic webhook module
pub struct IntegrationGenerator;

#[async_trait]
impl Generator for IntegrationGenerator {
    async fn generate(
        &self,
        requirement: &Requirement,
        context: &StageContext,
    ) -> anyhow::Result<ArtifactMap> {
        context
            .input(categories::API_ENDPOINTS)
            .context("API endpoints are not available")?;
        let tables = table_names(context)?;

        let mut artifacts = ArtifactMap::new();
        for integration in &requirement.integrations {
            let name = pascal_case(&integration.system);
            let env = kebab_case(&integration.system).replace('-', "_").to_uppercase();
            artifacts.insert(
                format!("{}.connector.ts", kebab_case(&integration.system)),
                format!(
                    "// {purpose}\n\
                     export class {name}Connector {{\n  \
                     private baseUrl = process.env.{env}_BASE_URL ?? '';\n  \
                     private token = process.env.{env}_TOKEN ?? '';\n\n  \
                     async push(resource: string, payload: unknown): Promise<Response> {{\n    \
                     return fetch(`${{this.baseUrl}}/${{resource}}`, {{\n      method: 'POST',\n      \
                     headers: {{ Authorization: `Bearer ${{this.token}}`, 'Content-Type': 'application/json' }},\n      \
                     body: JSON.stringify(payload),\n    }});\n  }}\n}}\n",
                    purpose = if integration.purpose.is_empty() {
                        integration.system.as_str()
                    } else {
                        integration.purpose.as_str()
                    },
                    name = name,
                    env = env,
                ),
            );
        }

        if requirement.integrations.is_empty() {
            artifacts.insert(
                "webhooks.ts".to_string(),
                format!(
                    "const tables = {:?};\n\n\
                     export async function emit(table: string, event: string, payload: unknown) {{\n  \
                     if (!tables.includes(table)) return;\n  \
                     const url = process.env.WEBHOOK_URL;\n  \
                     if (url) await fetch(url, {{ method: 'POST', body: JSON.stringify({{ table, event, payload }}) }});\n}}\n",
                    tables
                ),
            );
        }

        artifacts.insert(
            "integrations.json".to_string(),
            to_json(&json!({
                "systems": requirement.integrations,
                "tables": tables,
            }))?,
        );
        Ok(artifacts)
    }
}

/// Sync map between every generated table and every external system
pub struct CrossSystemGenerator;

#[async_trait]
impl Generator for CrossSystemGenerator {
    async fn generate(
        &self,
        requirement: &Requirement,
        context: &StageContext,
    ) -> anyhow::Result<ArtifactMap> {
        let tables = table_names(context)?;

        let mappings: Vec<_> = tables
            .iter()
            .flat_map(|table| {
                requirement.integrations.iter().map(move |integration| {
                    json!({
                        "table": table,
                        "system": integration.system,
                        "direction": "outbound",
                        "trigger": ["insert", "update"],
                    })
                })
            })
            .collect();

        let mut artifacts = ArtifactMap::new();
        artifacts.insert(
            "sync-map.json".to_string(),
            to_json(&json!({ "mappings": mappings }))?,
        );
        artifacts.insert(
            "event-bus.ts".to_string(),
            "type Handler = (payload: unknown) => Promise<void>;\n\n\
             const handlers = new Map<string, Handler[]>();\n\n\
             export function on(topic: string, handler: Handler) {\n  \
             handlers.set(topic, [...(handlers.get(topic) ?? []), handler]);\n}\n\n\
             export async function publish(topic: string, payload: unknown) {\n  \
             await Promise.all((handlers.get(topic) ?? []).map((h) => h(payload)));\n}\n"
                .to_string(),
        );
        Ok(artifacts)
    }
}
