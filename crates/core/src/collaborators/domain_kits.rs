//! Domain kits: small vertical add-ons (assistant, voice, telephony, CRM,
//! sales, marketing, support, analytics) generated from the requirement
//! and the API surface produced earlier in the run.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::json;

use super::templates::{camel_case, kebab_case, pascal_case, snake_case, to_json};
use super::{Generator, StageContext};
use crate::models::{ArtifactMap, FieldType, Requirement, RiskLevel};
use crate::pipeline::categories;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DomainKit {
    ChatAssistant,
    Voice,
    Telephony,
    Crm,
    SalesAutomation,
    MarketingAutomation,
    Support,
    Analytics,
}

impl DomainKit {
    pub fn label(&self) -> &'static str {
        match self {
            Self::ChatAssistant => "chat assistant",
            Self::Voice => "voice",
            Self::Telephony => "telephony",
            Self::Crm => "CRM",
            Self::SalesAutomation => "sales automation",
            Self::MarketingAutomation => "marketing automation",
            Self::Support => "support",
            Self::Analytics => "analytics",
        }
    }
}

pub struct DomainKitGenerator {
    kit: DomainKit,
}

impl DomainKitGenerator {
    pub fn new(kit: DomainKit) -> Self {
        Self { kit }
    }

    pub fn kit(&self) -> DomainKit {
        self.kit
    }
}

/// Route module names from the API stage, without the `.routes.ts` suffix
fn api_modules(context: &StageContext) -> anyhow::Result<Vec<String>> {
    let endpoints = context
        .input(categories::API_ENDPOINTS)
        .context("API endpoints are not available")?;
    Ok(endpoints
        .keys()
        .filter_map(|k| k.strip_suffix(".routes.ts"))
        .filter(|k| *k != "health")
        .map(str::to_string)
        .collect())
}

fn chat_assistant(requirement: &Requirement, context: &StageContext) -> anyhow::Result<ArtifactMap> {
    let modules = api_modules(context)?;
    let intents: Vec<_> = requirement
        .processes
        .iter()
        .map(|p| {
            json!({
                "intent": format!("start_{}", snake_case(&p.name)),
                "examples": [format!("start a {}", p.name.to_lowercase()), format!("new {}", p.name.to_lowercase())],
                "endpoint": format!("/api/{}/instances", kebab_case(&p.name)),
            })
        })
        .chain(requirement.forms.iter().map(|f| {
            json!({
                "intent": format!("find_{}", snake_case(&f.name)),
                "examples": [format!("show my {}", f.name.to_lowercase())],
                "endpoint": format!("/api/{}", kebab_case(&f.name)),
            })
        }))
        .collect();

    let mut artifacts = ArtifactMap::new();
    artifacts.insert("intents.json".to_string(), to_json(&json!({ "intents": intents }))?);
    artifacts.insert(
        "ChatWidget.tsx".to_string(),
        format!(
            "import {{ useAssistant }} from './useAssistant';\n\n\
             const modules = {:?};\n\n\
             export function ChatWidget() {{\n  \
             const {{ messages, send }} = useAssistant('/assistant/intents.json', modules);\n  \
             return <ChatPanel messages={{messages}} onSend={{send}} />;\n}}\n",
            modules
        ),
    );
    Ok(artifacts)
}

fn voice(_requirement: &Requirement, context: &StageContext) -> anyhow::Result<ArtifactMap> {
    let modules = api_modules(context)?;
    let commands: Vec<_> = modules
        .iter()
        .map(|m| json!({ "phrase": format!("open {}", m.replace('-', " ")), "route": format!("/{}", m) }))
        .collect();

    let mut artifacts = ArtifactMap::new();
    artifacts.insert("commands.json".to_string(), to_json(&json!({ "commands": commands }))?);
    artifacts.insert(
        "VoiceController.ts".to_string(),
        "import commands from './commands.json';\n\n\
         export function matchCommand(transcript: string): string | undefined {\n  \
         const text = transcript.trim().toLowerCase();\n  \
         return commands.commands.find((c) => text.startsWith(c.phrase))?.route;\n}\n"
            .to_string(),
    );
    Ok(artifacts)
}

fn telephony(requirement: &Requirement, context: &StageContext) -> anyhow::Result<ArtifactMap> {
    let modules = api_modules(context)?;
    let options: Vec<_> = requirement
        .processes
        .iter()
        .enumerate()
        .map(|(i, p)| json!({ "digit": (i + 1) % 10, "label": p.name, "action": format!("/api/{}/instances", kebab_case(&p.name)) }))
        .take(9)
        .collect();

    let mut artifacts = ArtifactMap::new();
    artifacts.insert(
        "ivr.json".to_string(),
        to_json(&json!({
            "greeting": "Thank you for calling.",
            "menu": options,
            "fallback": { "digit": 0, "action": "operator" },
        }))?,
    );
    artifacts.insert(
        "call-routes.ts".to_string(),
        format!(
            "import {{ Router }} from 'express';\n\nexport const router = Router();\nconst lookups = {:?};\n\n\
             router.post('/telephony/inbound', (req, res) => res.type('text/xml').send(renderMenu(req.body)));\n\
             router.post('/telephony/lookup/:module', (req, res) => res.json(lookups.includes(req.params.module)));\n",
            modules
        ),
    );
    Ok(artifacts)
}

fn crm(requirement: &Requirement, context: &StageContext) -> anyhow::Result<ArtifactMap> {
    api_modules(context)?;
    let entities: Vec<_> = requirement
        .forms
        .iter()
        .map(|f| {
            json!({
                "name": pascal_case(&f.name),
                "fields": f.fields.iter().map(|field| json!({ "name": camel_case(&field.name), "type": field.field_type })).collect::<Vec<_>>(),
            })
        })
        .collect();

    let mut artifacts = ArtifactMap::new();
    artifacts.insert(
        "contacts.json".to_string(),
        to_json(&json!({
            "contact": { "fields": ["name", "email", "phone", "company", "owner"] },
            "linkedEntities": entities,
        }))?,
    );
    artifacts.insert(
        "timeline.ts".to_string(),
        "export type Activity = { contactId: string; kind: 'note' | 'call' | 'email'; at: string };\n\n\
         export function sortTimeline(items: Activity[]): Activity[] {\n  \
         return [...items].sort((a, b) => b.at.localeCompare(a.at));\n}\n"
            .to_string(),
    );
    Ok(artifacts)
}

fn sales(requirement: &Requirement, context: &StageContext) -> anyhow::Result<ArtifactMap> {
    api_modules(context)?;
    let amount_fields: Vec<String> = requirement
        .forms
        .iter()
        .flat_map(|f| f.fields.iter())
        .filter(|f| f.field_type == FieldType::Currency)
        .map(|f| camel_case(&f.name))
        .collect();

    let mut artifacts = ArtifactMap::new();
    artifacts.insert(
        "pipeline-stages.json".to_string(),
        to_json(&json!({
            "stages": ["lead", "qualified", "proposal", "negotiation", "won", "lost"],
            "valueFields": amount_fields,
        }))?,
    );
    artifacts.insert(
        "forecast.ts".to_string(),
        "const weights: Record<string, number> = { lead: 0.1, qualified: 0.25, proposal: 0.5, negotiation: 0.75, won: 1, lost: 0 };\n\n\
         export function weightedForecast(deals: { stage: string; value: number }[]): number {\n  \
         return deals.reduce((sum, d) => sum + d.value * (weights[d.stage] ?? 0), 0);\n}\n"
            .to_string(),
    );
    Ok(artifacts)
}

fn marketing(requirement: &Requirement, context: &StageContext) -> anyhow::Result<ArtifactMap> {
    api_modules(context)?;
    let segments: Vec<_> = requirement
        .roles()
        .into_iter()
        .map(|role| json!({ "segment": snake_case(&role), "rule": { "field": "role", "equals": role } }))
        .collect();

    let mut artifacts = ArtifactMap::new();
    artifacts.insert(
        "segments.json".to_string(),
        to_json(&json!({ "segments": segments }))?,
    );
    artifacts.insert(
        "campaigns.json".to_string(),
        to_json(&json!({
            "campaigns": [
                { "name": "welcome", "trigger": "user_created", "delayHours": 0 },
                { "name": "re-engagement", "trigger": "inactive_30_days", "delayHours": 24 },
            ]
        }))?,
    );
    Ok(artifacts)
}

fn support(requirement: &Requirement, context: &StageContext) -> anyhow::Result<ArtifactMap> {
    api_modules(context)?;
    let first_response_hours = match requirement.risk_assessment.as_ref().map(|r| r.level) {
        Some(RiskLevel::High) => 1,
        Some(RiskLevel::Medium) => 4,
        _ => 8,
    };
    let categories: Vec<String> = requirement
        .processes
        .iter()
        .map(|p| snake_case(&p.name))
        .chain(std::iter::once("general".to_string()))
        .collect();

    let mut artifacts = ArtifactMap::new();
    artifacts.insert(
        "ticket-categories.json".to_string(),
        to_json(&json!({ "categories": categories }))?,
    );
    artifacts.insert(
        "sla.json".to_string(),
        to_json(&json!({
            "firstResponseHours": first_response_hours,
            "resolutionHours": first_response_hours * 6,
        }))?,
    );
    Ok(artifacts)
}

fn analytics(requirement: &Requirement, context: &StageContext) -> anyhow::Result<ArtifactMap> {
    api_modules(context)?;
    let metrics: Vec<_> = requirement
        .forms
        .iter()
        .map(|f| json!({ "metric": format!("{}_count", snake_case(&f.name)), "aggregate": "count", "table": snake_case(&f.name) }))
        .chain(requirement.processes.iter().map(|p| {
            json!({
                "metric": format!("{}_cycle_time", snake_case(&p.name)),
                "aggregate": "avg",
                "table": "process_instances",
                "filter": { "process": kebab_case(&p.name) },
            })
        }))
        .collect();
    let tiles: String = metrics
        .iter()
        .filter_map(|m| m["metric"].as_str())
        .map(|m| format!("      <MetricTile metric=\"{}\" />\n", m))
        .collect();

    let mut artifacts = ArtifactMap::new();
    artifacts.insert("metrics.json".to_string(), to_json(&json!({ "metrics": metrics }))?);
    artifacts.insert(
        "AnalyticsDashboard.tsx".to_string(),
        format!(
            "export function AnalyticsDashboard() {{\n  return (\n    <section className=\"grid\">\n{}    </section>\n  );\n}}\n",
            tiles
        ),
    );
    Ok(artifacts)
}

#[async_trait]
impl Generator for DomainKitGenerator {
    async fn generate(
        &self,
        requirement: &Requirement,
        context: &StageContext,
    ) -> anyhow::Result<ArtifactMap> {
        let artifacts = match self.kit {
            DomainKit::ChatAssistant => chat_assistant(requirement, context),
            DomainKit::Voice => voice(requirement, context),
            DomainKit::Telephony => telephony(requirement, context),
            DomainKit::Crm => crm(requirement, context),
            DomainKit::SalesAutomation => sales(requirement, context),
            DomainKit::MarketingAutomation => marketing(requirement, context),
            DomainKit::Support => support(requirement, context),
            DomainKit::Analytics => analytics(requirement, context),
        }
        .with_context(|| format!("{} kit", self.kit.label()))?;

        tracing::debug!(kit = self.kit.label(), artifacts = artifacts.len(), "Domain kit generated");
        Ok(artifacts)
    }
}
