//! # Config API
//!
//! Read and patch the persisted configuration. A patch rebuilds the
//! orchestrator; runs already in flight keep the configuration they
//! started with.

use axum::{extract::State, http::StatusCode, Json};

use super::{error_response, ApiError, ApiResponse};
use crate::config::{ConfigDefaults, ConfigResponse, PersistedConfig};
use crate::{build_orchestrator, SharedState};

/// Get current configuration
#[utoipa::path(
    get,
    path = "/api/v1/config",
    tag = "config",
    responses(
        (status = 200, description = "Current configuration and defaults", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Json<ConfigResponse> {
    let config = state.config.read().await.clone();
    Json(ConfigResponse {
        config,
        defaults: ConfigDefaults::default(),
    })
}

/// Update configuration (partial merge)
#[utoipa::path(
    patch,
    path = "/api/v1/config",
    tag = "config",
    request_body = PersistedConfig,
    responses(
        (status = 200, description = "Updated configuration", body = ConfigResponse),
        (status = 400, description = "Rejected configuration", body = ApiResponse)
    )
)]
pub async fn update_config(
    State(state): State<SharedState>,
    Json(updates): Json<PersistedConfig>,
) -> Result<Json<ConfigResponse>, ApiError> {
    // Held until the new orchestrator is installed so patches apply in order
    let mut current = state.config.write().await;
    let mut config = current.clone();
    config.merge(updates);
    config
        .validate()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, e))?;

    if let Some(path) = &state.config_path {
        if let Err(e) = config.save_to(path).await {
            tracing::warn!(path = %path.display(), error = %e, "Failed to save config");
        }
    }

    let orchestrator =
        build_orchestrator(&config, state.broadcaster.clone(), state.run_store.clone());
    *state.orchestrator.write().await = orchestrator;
    *current = config.clone();
    drop(current);
    tracing::info!("Configuration updated");

    Ok(Json(ConfigResponse {
        config,
        defaults: ConfigDefaults::default(),
    }))
}
