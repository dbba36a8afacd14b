//! # Runs API
//!
//! Start generation runs and follow their progress over WebSocket or SSE.

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse, Json, Response,
    },
    routing::{get, post},
    Router,
};
use foundry_core::models::{Requirement, RunOptions};
use foundry_core::pipeline::{
    new_run_id, validate_run_id, CompositeResult, PipelinePhase, ProgressBroadcaster,
    ProgressEvent, RunHandle, Subscription,
};
use futures::{
    stream::{self, Stream},
    SinkExt, StreamExt,
};
use serde::{Deserialize, Serialize};
use std::{convert::Infallible, sync::Arc, time::Duration};
use utoipa::ToSchema;

use super::{error_response, ApiError, ApiResponse};
use crate::SharedState;

const HEARTBEAT: Duration = Duration::from_secs(15);

/// Client message that ends a WebSocket subscription
const UNSUBSCRIBE: &str = "unsubscribe";

/// What the server remembers about a run
#[derive(Debug, Clone, Default)]
pub struct RunEntry {
    pub latest: Option<ProgressEvent>,
    pub result: Option<CompositeResult>,
}

impl RunEntry {
    fn status(&self) -> &'static str {
        match &self.result {
            None => "running",
            Some(result) if result.final_stage == PipelinePhase::Complete => "completed",
            Some(_) => "failed",
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartRunRequest {
    #[schema(value_type = Object)]
    pub requirement: Requirement,
    /// Omitted stage flags default to enabled
    #[serde(default)]
    #[schema(value_type = Object)]
    pub options: RunOptions,
    /// Caller-chosen run id; generated when absent
    #[serde(default)]
    pub run_id: Option<String>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StartRunResponse {
    pub run_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunView {
    pub run_id: String,
    /// running, completed or failed
    pub status: String,
    #[schema(value_type = Option<Object>)]
    pub latest: Option<ProgressEvent>,
    #[schema(value_type = Option<Object>)]
    pub result: Option<CompositeResult>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RunListResponse {
    pub runs: Vec<RunSummary>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    pub status: String,
    pub percent: u8,
}

pub fn run_routes() -> Router<SharedState> {
    Router::new()
        .route("/", post(start_run).get(list_runs))
        .route("/:id", get(get_run))
        .route("/:id/ws", get(run_socket))
        .route("/:id/events", get(run_events))
}

/// Start a generation run
#[utoipa::path(
    post,
    path = "/api/v1/runs",
    tag = "runs",
    request_body = StartRunRequest,
    responses(
        (status = 202, description = "Run accepted", body = StartRunResponse),
        (status = 400, description = "Invalid requirement or run id", body = ApiResponse),
        (status = 409, description = "Run id already in use", body = ApiResponse)
    )
)]
pub async fn start_run(
    State(state): State<SharedState>,
    Json(req): Json<StartRunRequest>,
) -> Result<(StatusCode, Json<StartRunResponse>), ApiError> {
    req.requirement
        .validate()
        .map_err(|e| error_response(StatusCode::BAD_REQUEST, format!("{:#}", e)))?;

    let run_id = req.run_id.unwrap_or_else(new_run_id);
    validate_run_id(&run_id).map_err(|e| error_response(StatusCode::BAD_REQUEST, e.to_string()))?;

    {
        let mut runs = state.runs.write().await;
        if runs.contains_key(&run_id) {
            return Err(error_response(
                StatusCode::CONFLICT,
                format!("run {} already exists", run_id),
            ));
        }
        runs.insert(run_id.clone(), RunEntry::default());
    }

    // Subscribe before the run starts so the tracker sees every event
    let tracker = state.broadcaster.subscribe(&run_id);
    let orchestrator = state.orchestrator.read().await.clone();
    let handle = match orchestrator.spawn_run(&run_id, req.requirement, req.options) {
        Ok(handle) => handle,
        Err(e) => {
            state.broadcaster.unsubscribe(&run_id, tracker.id);
            state.runs.write().await.remove(&run_id);
            return Err(error_response(StatusCode::BAD_REQUEST, e.to_string()));
        }
    };
    tracing::info!(run_id = %run_id, "Run accepted");
    tokio::spawn(track_run(state.clone(), tracker, handle));

    Ok((StatusCode::ACCEPTED, Json(StartRunResponse { run_id })))
}

/// Keep the run entry current, then release the run's observers
async fn track_run(state: SharedState, mut tracker: Subscription, handle: RunHandle) {
    let RunHandle { run_id, mut join } = handle;

    let joined = loop {
        tokio::select! {
            Some(event) = tracker.recv() => record_latest(&state, event).await,
            joined = &mut join => break joined,
        }
    };
    while let Some(event) = tracker.try_recv() {
        record_latest(&state, event).await;
    }

    match joined {
        Ok(result) => {
            if let Some(entry) = state.runs.write().await.get_mut(&run_id) {
                entry.result = Some(result);
            }
        }
        Err(e) => tracing::error!(run_id = %run_id, error = %e, "Run task ended abnormally"),
    }

    state.broadcaster.unsubscribe(&run_id, tracker.id);
    let closed = state.broadcaster.close_run(&run_id);
    tracing::debug!(run_id = %run_id, observers = closed, "Run observers released");
}

async fn record_latest(state: &SharedState, event: ProgressEvent) {
    if let Some(entry) = state.runs.write().await.get_mut(&event.run_id) {
        entry.latest = Some(event);
    }
}

/// List known runs
#[utoipa::path(
    get,
    path = "/api/v1/runs",
    tag = "runs",
    responses(
        (status = 200, description = "Runs started by this server", body = RunListResponse)
    )
)]
pub async fn list_runs(State(state): State<SharedState>) -> Json<RunListResponse> {
    let runs = state.runs.read().await;
    let mut summaries: Vec<RunSummary> = runs
        .iter()
        .map(|(run_id, entry)| RunSummary {
            run_id: run_id.clone(),
            status: entry.status().to_string(),
            percent: entry.latest.as_ref().map(|e| e.percent).unwrap_or(0),
        })
        .collect();
    summaries.sort_by(|a, b| a.run_id.cmp(&b.run_id));
    Json(RunListResponse { runs: summaries })
}

/// Latest progress of a run, plus its result once finished
#[utoipa::path(
    get,
    path = "/api/v1/runs/{id}",
    tag = "runs",
    params(("id" = String, Path, description = "Run id")),
    responses(
        (status = 200, description = "Run state", body = RunView),
        (status = 404, description = "Unknown run", body = ApiResponse)
    )
)]
pub async fn get_run(
    Path(run_id): Path<String>,
    State(state): State<SharedState>,
) -> Result<Json<RunView>, ApiError> {
    let runs = state.runs.read().await;
    let entry = runs
        .get(&run_id)
        .ok_or_else(|| unknown_run(&run_id))?;
    Ok(Json(RunView {
        run_id: run_id.clone(),
        status: entry.status().to_string(),
        latest: entry.latest.clone(),
        result: entry.result.clone(),
    }))
}

fn unknown_run(run_id: &str) -> ApiError {
    error_response(StatusCode::NOT_FOUND, format!("unknown run {}", run_id))
}

/// The terminal event of a finished run
async fn finished_event(state: &SharedState, run_id: &str) -> Option<ProgressEvent> {
    let runs = state.runs.read().await;
    let entry = runs.get(run_id)?;
    let latest = entry.latest.clone()?;
    (entry.result.is_some() || latest.is_terminal()).then_some(latest)
}

async fn ensure_known(state: &SharedState, run_id: &str) -> Result<(), ApiError> {
    if state.runs.read().await.contains_key(run_id) {
        Ok(())
    } else {
        Err(unknown_run(run_id))
    }
}

/// A run subscription that leaves the broadcaster when dropped
struct Observer {
    broadcaster: Arc<ProgressBroadcaster>,
    subscription: Subscription,
}

impl Observer {
    fn join(state: &SharedState, run_id: &str) -> Self {
        Self {
            broadcaster: state.broadcaster.clone(),
            subscription: state.broadcaster.subscribe(run_id),
        }
    }

    async fn recv(&mut self) -> Option<ProgressEvent> {
        self.subscription.recv().await
    }
}

impl Drop for Observer {
    fn drop(&mut self) {
        self.broadcaster
            .unsubscribe(&self.subscription.run_id, self.subscription.id);
    }
}

/// WebSocket progress channel. Send `unsubscribe` to leave early.
pub async fn run_socket(
    ws: WebSocketUpgrade,
    Path(run_id): Path<String>,
    State(state): State<SharedState>,
) -> Response {
    if let Err(e) = ensure_known(&state, &run_id).await {
        return e.into_response();
    }
    ws.on_upgrade(move |socket| handle_run_socket(socket, state, run_id))
}

async fn handle_run_socket(socket: WebSocket, state: SharedState, run_id: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut observer = Observer::join(&state, &run_id);

    // Set when the run ended before this client saw its terminal event
    let mut replay = finished_event(&state, &run_id).await;
    if replay.is_none() {
        loop {
            tokio::select! {
                event = observer.recv() => {
                    let Some(event) = event else {
                        // Observers were released between the terminal
                        // publish and this subscription
                        replay = finished_event(&state, &run_id).await;
                        break;
                    };
                    let terminal = event.is_terminal();
                    let json = match serde_json::to_string(&event) {
                        Ok(json) => json,
                        Err(e) => {
                            tracing::warn!(run_id = %run_id, error = %e, "Failed to encode event");
                            continue;
                        }
                    };
                    if sender.send(Message::Text(json)).await.is_err() || terminal {
                        break;
                    }
                }
                message = receiver.next() => match message {
                    Some(Ok(Message::Text(text))) if text.trim() == UNSUBSCRIBE => break,
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                },
            }
        }
    }
    drop(observer);

    if let Some(event) = replay {
        if let Ok(json) = serde_json::to_string(&event) {
            let _ = sender.send(Message::Text(json)).await;
        }
    }
    let _ = sender.send(Message::Close(None)).await;
}

fn to_sse(event: &ProgressEvent) -> Event {
    let json = serde_json::to_string(event).unwrap_or_default();
    Event::default().event("progress").data(json)
}

/// SSE progress stream with heartbeat; ends after the terminal event
pub async fn run_events(
    Path(run_id): Path<String>,
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    ensure_known(&state, &run_id).await?;
    let observer = Observer::join(&state, &run_id);
    let finished = finished_event(&state, &run_id).await;

    let stream = stream::unfold(
        (observer, state, finished, false),
        |(mut observer, state, finished, done)| async move {
            if done {
                return None;
            }
            if let Some(event) = finished {
                return Some((Ok::<_, Infallible>(to_sse(&event)), (observer, state, None, true)));
            }
            match tokio::time::timeout(HEARTBEAT, observer.recv()).await {
                Ok(Some(event)) => {
                    let terminal = event.is_terminal();
                    Some((Ok(to_sse(&event)), (observer, state, None, terminal)))
                }
                // Observers released; the terminal event may have been
                // published before this stream subscribed
                Ok(None) => {
                    let run_id = observer.subscription.run_id.clone();
                    let event = finished_event(&state, &run_id).await?;
                    Some((Ok(to_sse(&event)), (observer, state, None, true)))
                }
                Err(_) => Some((
                    Ok(Event::default().comment("heartbeat")),
                    (observer, state, None, false),
                )),
            }
        },
    );

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use foundry_core::pipeline::{PipelineState, ResultAssembler};

    #[test]
    fn test_entry_status() {
        let mut entry = RunEntry::default();
        assert_eq!(entry.status(), "running");

        let mut state = PipelineState::new("run-1");
        state.fail("boom");
        entry.result = Some(ResultAssembler::assemble(&state, Duration::ZERO));
        assert_eq!(entry.status(), "failed");
    }

    #[test]
    fn test_start_request_defaults_options() {
        let req: StartRunRequest =
            serde_json::from_str(r#"{"requirement": {"text": "Leave requests", "confidence": 0.9}}"#)
                .unwrap();
        assert!(req.options.workflows);
        assert!(req.run_id.is_none());
    }
}
