//! # Filesystem Deployer
//!
//! Writes the deliverable of a run under
//! `<out_dir>/<target>/<run_id>/<category>/<artifact>`.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tokio::fs;

use super::{Deployer, DeploymentBundle, DeploymentReport, RunMetadata};
use crate::models::{ArtifactMap, Requirement};
use crate::pipeline::categories;

/// Default output directory when none is configured
pub fn default_out_dir() -> PathBuf {
    if let Ok(path) = std::env::var("FOUNDRY_OUT_DIR") {
        return PathBuf::from(path);
    }

    std::env::current_dir()
        .unwrap_or_else(|_| PathBuf::from("."))
        .join(".foundry")
        .join("deployments")
}

/// Keep artifact names inside their category directory
fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_start_matches('.');
    if trimmed.is_empty() {
        "artifact".to_string()
    } else {
        trimmed.to_string()
    }
}

/// A safe file name not yet in `taken`. Names that sanitize to the same
/// file get a numeric suffix before the extension.
fn unique_file_name(name: &str, taken: &mut HashSet<String>) -> String {
    let base = safe_file_name(name);
    let (stem, ext) = match base.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{}", ext)),
        _ => (base.clone(), String::new()),
    };
    let mut candidate = base;
    let mut n = 2;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{}-{}{}", stem, n, ext);
        n += 1;
    }
    candidate
}

pub struct FilesystemDeployer {
    out_dir: PathBuf,
}

impl FilesystemDeployer {
    pub fn new(out_dir: impl Into<PathBuf>) -> Self {
        Self {
            out_dir: out_dir.into(),
        }
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    async fn write_category(dir: &Path, artifacts: &ArtifactMap) -> Result<(usize, usize)> {
        fs::create_dir_all(dir)
            .await
            .with_context(|| format!("Failed to create directory: {:?}", dir))?;

        let mut taken = HashSet::new();
        let mut bytes = 0;
        for (name, content) in artifacts {
            let file_name = unique_file_name(name, &mut taken);
            if file_name != safe_file_name(name) {
                tracing::debug!(artifact = %name, file = %file_name, "Renamed colliding artifact");
            }
            let path = dir.join(file_name);
            fs::write(&path, content)
                .await
                .with_context(|| format!("Failed to write file: {:?}", path))?;
            bytes += content.len();
        }
        Ok((artifacts.len(), bytes))
    }
}

#[async_trait]
impl Deployer for FilesystemDeployer {
    async fn deploy(
        &self,
        _requirement: &Requirement,
        metadata: &RunMetadata,
        bundle: DeploymentBundle,
    ) -> Result<DeploymentReport> {
        if bundle.components.is_empty() || bundle.api_endpoints.is_empty() {
            tracing::warn!(run_id = %metadata.run_id, "Nothing to deploy");
            return Ok(DeploymentReport::failed());
        }

        let root = self
            .out_dir
            .join(metadata.target.as_str())
            .join(safe_file_name(&metadata.run_id));

        let mut files = 0;
        let mut bytes = 0;
        for (category, artifacts) in [
            (categories::COMPONENTS, &bundle.components),
            (categories::API_ENDPOINTS, &bundle.api_endpoints),
            (categories::DATABASE_SCHEMA, &bundle.database_schema),
        ] {
            if artifacts.is_empty() {
                continue;
            }
            let (n, b) = Self::write_category(&root.join(category), artifacts).await?;
            files += n;
            bytes += b;
        }

        let absolute = fs::canonicalize(&root).await.unwrap_or(root);
        tracing::info!(
            run_id = %metadata.run_id,
            path = %absolute.display(),
            files,
            "Deployment written"
        );

        Ok(DeploymentReport {
            success: true,
            deployment_url: Some(format!("file://{}", absolute.display())),
            metrics: Some(json!({
                "filesWritten": files,
                "bytesWritten": bytes,
                "target": metadata.target.as_str(),
                "deployedAt": chrono::Utc::now().to_rfc3339(),
            })),
        })
    }
}
