//! # Application Scaffolds
//!
//! Template generators for the three core layers (UI components, API
//! routes, database tables) and the form validation schemas derived from
//! them.

use anyhow::Context;
use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::templates::{camel_case, kebab_case, pascal_case, snake_case, title_from_text, to_json};
use super::{Generator, StageContext};
use crate::models::{ArtifactMap, FieldType, FormSpec, Requirement};
use crate::pipeline::categories;

fn form_component(form: &FormSpec) -> String {
    let name = pascal_case(&form.name);
    let props: String = form
        .fields
        .iter()
        .map(|f| {
            format!(
                "  {}{}: {};\n",
                camel_case(&f.name),
                if f.required { "" } else { "?" },
                f.field_type.ts_type()
            )
        })
        .collect();
    let inputs: String = form
        .fields
        .iter()
        .map(|f| {
            let input_type = match f.field_type {
                FieldType::Number | FieldType::Currency => "number",
                FieldType::Date => "date",
                FieldType::Email => "email",
                FieldType::Boolean => "checkbox",
                FieldType::Text | FieldType::Select => "text",
            };
            format!(
                "      <Field name=\"{}\" label=\"{}\" type=\"{}\"{} />\n",
                camel_case(&f.name),
                f.name,
                input_type,
                if f.required { " required" } else { "" }
            )
        })
        .collect();

    format!(
        "import {{ Field, FormShell }} from './FormShell';\n\n\
         export interface {name}Values {{\n{props}}}\n\n\
         export function {name}Form({{ onSubmit }}: {{ onSubmit: (values: {name}Values) => void }}) {{\n  \
         return (\n    <FormShell title=\"{title}\" endpoint=\"/api/{route}\" onSubmit={{onSubmit}}>\n\
         {inputs}    </FormShell>\n  );\n}}\n",
        name = name,
        props = props,
        title = form.name,
        route = kebab_case(&form.name),
        inputs = inputs,
    )
}

/// One component per form and process plus the app shell
pub struct UiScaffold;

#[async_trait]
impl Generator for UiScaffold {
    async fn generate(
        &self,
        requirement: &Requirement,
        _context: &StageContext,
    ) -> anyhow::Result<ArtifactMap> {
        let mut artifacts = ArtifactMap::new();
        let mut screens = Vec::new();

        for form in &requirement.forms {
            let file = format!("{}Form.tsx", pascal_case(&form.name));
            artifacts.insert(file.clone(), form_component(form));
            screens.push((format!("{}Form", pascal_case(&form.name)), kebab_case(&form.name)));
        }

        for process in &requirement.processes {
            let name = format!("{}Dashboard", pascal_case(&process.name));
            let route = kebab_case(&process.name);
            artifacts.insert(
                format!("{}.tsx", name),
                format!(
                    "import {{ useInstances }} from './hooks';\n\n\
                     export function {name}() {{\n  \
                     const instances = useInstances('/api/{route}/instances');\n  \
                     return <InstanceTable title=\"{title}\" rows={{instances}} />;\n}}\n",
                    name = name,
                    route = route,
                    title = process.name,
                ),
            );
            screens.push((name, route));
        }

        if screens.is_empty() {
            artifacts.insert(
                "Home.tsx".to_string(),
                "export function Home() {\n  return <main>Welcome</main>;\n}\n".to_string(),
            );
            screens.push(("Home".to_string(), String::new()));
        }

        let imports: String = screens
            .iter()
            .map(|(name, _)| format!("import {{ {n} }} from './{n}';\n", n = name))
            .collect();
        let routes: String = screens
            .iter()
            .map(|(name, route)| format!("        <Route path=\"/{}\" element={{<{} />}} />\n", route, name))
            .collect();
        artifacts.insert(
            "App.tsx".to_string(),
            format!(
                "import {{ BrowserRouter, Routes, Route }} from 'react-router-dom';\n{imports}\n\
                 export default function App() {{\n  \
                 return (\n    <BrowserRouter>\n      <h1>{title}</h1>\n      <Routes>\n{routes}      </Routes>\n    </BrowserRouter>\n  );\n}}\n",
                imports = imports,
                title = title_from_text(&requirement.text),
                routes = routes,
            ),
        );

        Ok(artifacts)
    }
}

/// One route module per form (CRUD) and per process (lifecycle)
pub struct ApiScaffold;

#[async_trait]
impl Generator for ApiScaffold {
    async fn generate(
        &self,
        requirement: &Requirement,
        _context: &StageContext,
    ) -> anyhow::Result<ArtifactMap> {
        let mut artifacts = ArtifactMap::new();

        for form in &requirement.forms {
            let route = kebab_case(&form.name);
            let table = snake_case(&form.name);
            artifacts.insert(
                format!("{}.routes.ts", route),
                format!(
                    "import {{ Router }} from 'express';\nimport {{ db }} from '../db';\n\n\
                     export const router = Router();\n\n\
                     router.get('/api/{route}', async (_req, res) => res.json(await db.list('{table}')));\n\
                     router.get('/api/{route}/:id', async (req, res) => res.json(await db.get('{table}', req.params.id)));\n\
                     router.post('/api/{route}', async (req, res) => res.status(201).json(await db.insert('{table}', req.body)));\n\
                     router.put('/api/{route}/:id', async (req, res) => res.json(await db.update('{table}', req.params.id, req.body)));\n\
                     router.delete('/api/{route}/:id', async (req, res) => res.status(204).json(await db.remove('{table}', req.params.id)));\n",
                    route = route,
                    table = table,
                ),
            );
        }

        for process in &requirement.processes {
            let route = kebab_case(&process.name);
            artifacts.insert(
                format!("{}-process.routes.ts", route),
                format!(
                    "import {{ Router }} from 'express';\nimport {{ engine }} from '../workflow';\n\n\
                     export const router = Router();\n\n\
                     router.post('/api/{route}/instances', async (req, res) => res.status(201).json(await engine.start('{route}', req.body)));\n\
                     router.get('/api/{route}/instances', async (_req, res) => res.json(await engine.list('{route}')));\n\
                     router.post('/api/{route}/instances/:id/advance', async (req, res) => res.json(await engine.advance(req.params.id, req.body)));\n",
                    route = route,
                ),
            );
        }

        artifacts.insert(
            "health.routes.ts".to_string(),
            "import { Router } from 'express';\n\nexport const router = Router();\n\n\
             router.get('/api/health', (_req, res) => res.json({ status: 'ok' }));\n"
                .to_string(),
        );

        Ok(artifacts)
    }
}

/// One table per form, plus process instance tracking
pub struct SchemaScaffold;

#[async_trait]
impl Generator for SchemaScaffold {
    async fn generate(
        &self,
        requirement: &Requirement,
        _context: &StageContext,
    ) -> anyhow::Result<ArtifactMap> {
        let mut artifacts = ArtifactMap::new();

        for form in &requirement.forms {
            let table = snake_case(&form.name);
            let columns: String = form
                .fields
                .iter()
                .map(|f| {
                    format!(
                        "    {} {}{},\n",
                        snake_case(&f.name),
                        f.field_type.sql_type(),
                        if f.required { " NOT NULL" } else { "" }
                    )
                })
                .collect();
            artifacts.insert(
                format!("{}.sql", table),
                format!(
                    "CREATE TABLE IF NOT EXISTS {table} (\n    id UUID PRIMARY KEY,\n{columns}    \
                     created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\n);\n",
                    table = table,
                    columns = columns,
                ),
            );
        }

        if !requirement.processes.is_empty() {
            artifacts.insert(
                "process_instances.sql".to_string(),
                "CREATE TABLE IF NOT EXISTS process_instances (\n    id UUID PRIMARY KEY,\n    \
                 process TEXT NOT NULL,\n    current_step TEXT NOT NULL,\n    assignee TEXT,\n    \
                 status TEXT NOT NULL,\n    started_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP\n);\n"
                    .to_string(),
            );
        }

        let roles = requirement.roles();
        if !roles.is_empty() || artifacts.is_empty() {
            let seed: String = roles
                .iter()
                .map(|r| format!("INSERT INTO roles (name) VALUES ('{}');\n", r.replace('\'', "''")))
                .collect();
            artifacts.insert(
                "users.sql".to_string(),
                format!(
                    "CREATE TABLE IF NOT EXISTS roles (\n    name TEXT PRIMARY KEY\n);\n\n\
                     CREATE TABLE IF NOT EXISTS users (\n    id UUID PRIMARY KEY,\n    email TEXT NOT NULL UNIQUE,\n    \
                     role TEXT REFERENCES roles (name)\n);\n\n{}",
                    seed
                ),
            );
        }

        Ok(artifacts)
    }
}

/// JSON schema per form whose component the UI stage produced
pub struct FormValidationGenerator;

#[async_trait]
impl Generator for FormValidationGenerator {
    async fn generate(
        &self,
        requirement: &Requirement,
        context: &StageContext,
    ) -> anyhow::Result<ArtifactMap> {
        let components = context
            .input(categories::COMPONENTS)
            .context("UI components are not available")?;

        let mut artifacts = ArtifactMap::new();
        for form in &requirement.forms {
            let component = format!("{}Form.tsx", pascal_case(&form.name));
            if !components.contains_key(&component) {
                continue;
            }

            let mut properties = Map::new();
            for field in &form.fields {
                let property = match field.field_type {
                    FieldType::Text | FieldType::Select => json!({ "type": "string", "minLength": 1 }),
                    FieldType::Email => json!({ "type": "string", "format": "email" }),
                    FieldType::Date => json!({ "type": "string", "format": "date" }),
                    FieldType::Number => json!({ "type": "integer" }),
                    FieldType::Currency => json!({ "type": "number", "minimum": 0 }),
                    FieldType::Boolean => json!({ "type": "boolean" }),
                };
                properties.insert(camel_case(&field.name), property);
            }
            let required: Vec<Value> = form
                .fields
                .iter()
                .filter(|f| f.required)
                .map(|f| Value::String(camel_case(&f.name)))
                .collect();

            artifacts.insert(
                format!("{}.schema.json", kebab_case(&form.name)),
                to_json(&json!({
                    "$schema": "https://json-schema.org/draft/2020-12/schema",
                    "title": form.name,
                    "type": "object",
                    "properties": properties,
                    "required": required,
                    "additionalProperties": false,
                }))?,
            );
        }

        Ok(artifacts)
    }
}
