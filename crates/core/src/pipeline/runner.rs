//! # Stage Runner
//!
//! Error boundary around a single collaborator call. Any error or panic is
//! captured and classified into a [`StageOutcome`]; nothing is rethrown and
//! no run state is touched here.

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::time::Duration;

use super::stage::StageId;
use crate::models::ArtifactMap;

/// Classification of a captured stage failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// The collaborator returned an error
    Error,
    /// The collaborator panicked
    Panic,
    /// The collaborator succeeded but produced nothing
    NoArtifacts,
    /// A stage this one depends on produced no artifacts
    DependencyUnavailable,
    /// Validation found required artifacts missing
    Validation,
    /// The deployment collaborator reported failure
    Deployment,
}

/// A captured stage failure, as recorded in the run's error list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageError {
    pub stage: StageId,
    pub kind: FailureKind,
    pub message: String,
    /// Attempts made before giving up (0 when never attempted)
    pub attempts: u32,
}

impl StageError {
    pub fn new(stage: StageId, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            stage,
            kind,
            message: message.into(),
            attempts: 0,
        }
    }

    fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }
}

impl fmt::Display for StageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.stage, self.message)
    }
}

/// Result of executing one stage
#[derive(Debug, Clone, PartialEq)]
pub enum StageOutcome {
    /// Non-empty artifacts, possibly with warnings
    Produced {
        artifacts: ArtifactMap,
        warnings: Vec<String>,
    },
    /// No artifacts; the stage is skipped and the error recorded
    Skipped { error: StageError },
}

impl StageOutcome {
    pub fn is_produced(&self) -> bool {
        matches!(self, StageOutcome::Produced { .. })
    }

    pub fn error(&self) -> Option<&StageError> {
        match self {
            StageOutcome::Skipped { error } => Some(error),
            StageOutcome::Produced { .. } => None,
        }
    }

    pub fn artifacts(&self) -> Option<&ArtifactMap> {
        match self {
            StageOutcome::Produced { artifacts, .. } => Some(artifacts),
            StageOutcome::Skipped { .. } => None,
        }
    }
}

/// Executes collaborator calls inside an error boundary
#[derive(Debug, Clone)]
pub struct StageRunner {
    retry_backoff: Duration,
}

impl Default for StageRunner {
    fn default() -> Self {
        Self::new(Duration::ZERO)
    }
}

impl StageRunner {
    pub fn new(retry_backoff: Duration) -> Self {
        Self { retry_backoff }
    }

    /// Await `call`, converting errors and panics into a [`StageError`]
    pub async fn capture<T, Fut>(&self, stage: StageId, call: Fut) -> Result<T, StageError>
    where
        Fut: Future<Output = anyhow::Result<T>>,
    {
        match AssertUnwindSafe(call).catch_unwind().await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => {
                let message = format!("{:#}", e);
                tracing::warn!(stage = %stage, error = %message, "Stage failed");
                Err(StageError::new(stage, FailureKind::Error, message))
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                tracing::warn!(stage = %stage, error = %message, "Stage panicked");
                Err(StageError::new(
                    stage,
                    FailureKind::Panic,
                    format!("generator panicked: {}", message),
                ))
            }
        }
    }

    /// Run one attempt of a generator call and classify it
    pub async fn execute<Fut>(&self, stage: StageId, call: Fut) -> StageOutcome
    where
        Fut: Future<Output = anyhow::Result<ArtifactMap>>,
    {
        match self.capture(stage, call).await {
            Ok(artifacts) if artifacts.is_empty() => {
                tracing::warn!(stage = %stage, "Stage produced no artifacts");
                StageOutcome::Skipped {
                    error: StageError::new(stage, FailureKind::NoArtifacts, "produced no artifacts")
                        .with_attempts(1),
                }
            }
            Ok(artifacts) => StageOutcome::Produced {
                artifacts,
                warnings: Vec::new(),
            },
            Err(error) => StageOutcome::Skipped {
                error: error.with_attempts(1),
            },
        }
    }

    /// Run up to `attempts` identical attempts, returning the first success
    /// or the last failure
    pub async fn execute_with_retry<F, Fut>(
        &self,
        stage: StageId,
        attempts: u32,
        mut call: F,
    ) -> StageOutcome
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = anyhow::Result<ArtifactMap>>,
    {
        let attempts = attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.execute(stage, call()).await {
                StageOutcome::Produced {
                    artifacts,
                    mut warnings,
                } => {
                    if attempt > 1 {
                        warnings.push(format!("{} succeeded after {} attempts", stage, attempt));
                    }
                    return StageOutcome::Produced {
                        artifacts,
                        warnings,
                    };
                }
                StageOutcome::Skipped { error } if attempt >= attempts => {
                    return StageOutcome::Skipped {
                        error: error.with_attempts(attempt),
                    };
                }
                StageOutcome::Skipped { error } => {
                    tracing::debug!(
                        stage = %stage,
                        attempt = attempt,
                        max_attempts = attempts,
                        error = %error.message,
                        "Retrying stage"
                    );
                    if !self.retry_backoff.is_zero() {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                    attempt += 1;
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
