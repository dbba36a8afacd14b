//! Persisted server configuration at `.foundry/config.json`, merged with
//! command-line flags and environment variables.

use foundry_core::collaborators::ApprovalThresholds;
use foundry_core::pipeline::OrchestratorConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use utoipa::ToSchema;

pub const CONFIG_PATH: &str = ".foundry/config.json";
pub const DATABASE_PATH: &str = ".foundry/foundry.db";

/// Every field is optional; unset fields fall back to [`ConfigDefaults`]
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, ToSchema)]
pub struct PersistedConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_concurrency: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retries: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_backoff_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auto_approve_below: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finance_review_from: Option<f64>,
    /// Where the filesystem deployer writes deliverables
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(value_type = Option<String>)]
    pub out_dir: Option<PathBuf>,
}

impl PersistedConfig {
    pub async fn load() -> Self {
        Self::load_from(Path::new(CONFIG_PATH)).await
    }

    pub async fn load_from(path: &Path) -> Self {
        match tokio::fs::read_to_string(path).await {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring malformed config");
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub async fn save(&self) -> Result<(), std::io::Error> {
        self.save_to(Path::new(CONFIG_PATH)).await
    }

    pub async fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        tokio::fs::write(path, content).await
    }

    /// Overlay every field `other` sets
    pub fn merge(&mut self, other: PersistedConfig) {
        if other.max_concurrency.is_some() {
            self.max_concurrency = other.max_concurrency;
        }
        if other.max_retries.is_some() {
            self.max_retries = other.max_retries;
        }
        if other.retry_backoff_ms.is_some() {
            self.retry_backoff_ms = other.retry_backoff_ms;
        }
        if other.auto_approve_below.is_some() {
            self.auto_approve_below = other.auto_approve_below;
        }
        if other.finance_review_from.is_some() {
            self.finance_review_from = other.finance_review_from;
        }
        if other.out_dir.is_some() {
            self.out_dir = other.out_dir;
        }
    }

    /// Resolve against the orchestrator defaults
    pub fn orchestrator_config(&self) -> OrchestratorConfig {
        let defaults = OrchestratorConfig::default();
        OrchestratorConfig {
            max_concurrency: self.max_concurrency.unwrap_or(defaults.max_concurrency),
            max_retries: self.max_retries.unwrap_or(defaults.max_retries),
            retry_backoff_ms: self.retry_backoff_ms.unwrap_or(defaults.retry_backoff_ms),
            approval_thresholds: ApprovalThresholds {
                auto_approve_below: self
                    .auto_approve_below
                    .unwrap_or(defaults.approval_thresholds.auto_approve_below),
                finance_review_from: self
                    .finance_review_from
                    .unwrap_or(defaults.approval_thresholds.finance_review_from),
            },
        }
    }

    /// Reject combinations the orchestrator cannot honour
    pub fn validate(&self) -> Result<(), String> {
        if self.max_concurrency == Some(0) {
            return Err("max_concurrency must be at least 1".to_string());
        }
        let thresholds = self.orchestrator_config().approval_thresholds;
        if thresholds.auto_approve_below > thresholds.finance_review_from {
            return Err("auto_approve_below must not exceed finance_review_from".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigResponse {
    pub config: PersistedConfig,
    pub defaults: ConfigDefaults,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ConfigDefaults {
    pub max_concurrency: usize,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    pub auto_approve_below: f64,
    pub finance_review_from: f64,
    pub out_dir: String,
}

impl Default for ConfigDefaults {
    fn default() -> Self {
        let config = OrchestratorConfig::default();
        Self {
            max_concurrency: config.max_concurrency,
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
            auto_approve_below: config.approval_thresholds.auto_approve_below,
            finance_review_from: config.approval_thresholds.finance_review_from,
            out_dir: ".foundry/deployments".to_string(),
        }
    }
}
