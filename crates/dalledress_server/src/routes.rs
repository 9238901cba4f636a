// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::fmt::{self, Debug};

use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Extension, Json, Router};
use dalledress::{Generator, Orchestrator, RequestOptions};
use jiff::Timestamp;
use tick::Clock;
use vitals::{HealthAggregator, HealthStatus};

use crate::envelope::{self, ApiError};
use crate::middleware::{self, RequestId, Telemetry};
use crate::ArtifactStore;

const PROMETHEUS_CONTENT_TYPE: &str = "text/plain; version=0.0.4";

type Params = Query<HashMap<String, String>>;

/// Everything the HTTP handlers share.
pub struct AppState<G> {
    orchestrator: Orchestrator<G>,
    health: HealthAggregator,
    artifacts: ArtifactStore,
    clock: Clock,
}

impl<G> Clone for AppState<G> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            health: self.health.clone(),
            artifacts: self.artifacts.clone(),
            clock: self.clock.clone(),
        }
    }
}

impl<G> Debug for AppState<G> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("orchestrator", &self.orchestrator)
            .field("artifacts", &self.artifacts)
            .finish_non_exhaustive()
    }
}

impl<G: Generator> AppState<G> {
    /// Bundles the orchestrator, the health checks and the artifact store.
    #[must_use]
    pub fn new(orchestrator: Orchestrator<G>, health: HealthAggregator, artifacts: ArtifactStore, clock: Clock) -> Self {
        Self {
            orchestrator,
            health,
            artifacts,
            clock,
        }
    }

    /// The orchestrator behind `/dalle`.
    #[must_use]
    pub fn orchestrator(&self) -> &Orchestrator<G> {
        &self.orchestrator
    }

    /// The health checks behind `/health`.
    #[must_use]
    pub fn health(&self) -> &HealthAggregator {
        &self.health
    }

    fn now(&self) -> Timestamp {
        self.clock.system_time_as()
    }
}

/// Builds the HTTP API.
///
/// | Route | Purpose |
/// |---|---|
/// | `GET /dalle/{series}/{address}` | progress of the generation, started on first request; `?generate` regenerates, `?remove` deletes the image |
/// | `GET /health` | full health report; `?check=liveness` or `?check=readiness` for the short forms |
/// | `GET /liveness`, `GET /readiness` | probes for orchestration platforms |
/// | `GET /metrics` | Prometheus text exposition |
/// | `GET /errors` | error report; `?format=json` for the raw snapshot, `?clear` to reset |
/// | `GET /series` | accepted series |
pub fn router<G: Generator>(state: AppState<G>) -> Router {
    let telemetry = Telemetry::new(state.orchestrator.collector().clone(), state.clock.clone());

    Router::new()
        .route("/dalle/{series}/{address}", get(dalle::<G>))
        .route("/dalle/{series}", get(dalle_without_address::<G>))
        .route("/health", get(health::<G>))
        .route("/liveness", get(liveness::<G>))
        .route("/readiness", get(readiness::<G>))
        .route("/metrics", get(metrics::<G>))
        .route("/errors", get(errors::<G>))
        .route("/series", get(series::<G>))
        .fallback(not_found)
        .with_state(state)
        .layer(axum::middleware::from_fn_with_state(telemetry, middleware::track))
}

async fn dalle<G: Generator>(
    State(state): State<AppState<G>>,
    Extension(request_id): Extension<RequestId>,
    Path((series, address)): Path<(String, String)>,
    Query(params): Params,
) -> Response {
    let orchestrator = &state.orchestrator;
    let key = match orchestrator.key(&series, &address) {
        Ok(key) => key,
        Err(error) => {
            let error = ApiError::from_key_error(&error, state.now()).with_request_id(&request_id);
            return envelope::failure(StatusCode::BAD_REQUEST, error);
        }
    };

    if params.contains_key("remove") {
        match state.artifacts.remove(&key).await {
            Ok(Some(path)) => {
                orchestrator.collector().record_file_operation(true);
                orchestrator.invalidate(&key);
                return format!("image removed {}\n", path.display()).into_response();
            }
            Ok(None) => {
                orchestrator.invalidate(&key);
            }
            Err(error) => {
                orchestrator.collector().record_file_operation(false);
                let error = ApiError::new(
                    "FILE_SYSTEM_ERROR",
                    "File system operation failed",
                    Some(format!("remove: {error}")),
                    state.now(),
                )
                .with_request_id(&request_id);
                return envelope::failure(StatusCode::INTERNAL_SERVER_ERROR, error);
            }
        }
    }

    let options = if params.contains_key("generate") {
        RequestOptions::regenerate()
    } else {
        RequestOptions::default()
    };

    match orchestrator.request_with(key, options) {
        Ok(progress) => envelope::success(progress, &request_id),
        Err(error) => {
            let error = ApiError::from_key_error(&error, state.now()).with_request_id(&request_id);
            envelope::failure(StatusCode::BAD_REQUEST, error)
        }
    }
}

async fn dalle_without_address<G: Generator>(
    State(state): State<AppState<G>>,
    Extension(request_id): Extension<RequestId>,
    Path(series): Path<String>,
) -> Response {
    let error = match state.orchestrator.key(&series, "") {
        Err(error) => ApiError::from_key_error(&error, state.now()),
        Ok(_) => ApiError::internal("empty address accepted", state.now()),
    };
    envelope::failure(StatusCode::BAD_REQUEST, error.with_request_id(&request_id))
}

async fn health<G: Generator>(
    State(state): State<AppState<G>>,
    Extension(request_id): Extension<RequestId>,
    Query(params): Params,
) -> Response {
    match params.get("check").map(String::as_str) {
        Some("liveness") => return liveness(State(state)).await,
        Some("readiness") => return readiness(State(state), Extension(request_id)).await,
        _ => {}
    }

    let aggregator = state.health.clone();
    match tokio::task::spawn_blocking(move || aggregator.check_health()).await {
        Ok(report) => {
            let status = if report.status == HealthStatus::Unhealthy {
                StatusCode::SERVICE_UNAVAILABLE
            } else {
                StatusCode::OK
            };
            (status, Json(report)).into_response()
        }
        Err(error) => internal_error(&state, &request_id, &error),
    }
}

async fn liveness<G: Generator>(State(state): State<AppState<G>>) -> Response {
    Json(state.health.liveness()).into_response()
}

async fn readiness<G: Generator>(
    State(state): State<AppState<G>>,
    Extension(request_id): Extension<RequestId>,
) -> Response {
    let aggregator = state.health.clone();
    match tokio::task::spawn_blocking(move || aggregator.readiness()).await {
        Ok(readiness) => {
            let status = if readiness.ready {
                StatusCode::OK
            } else {
                StatusCode::SERVICE_UNAVAILABLE
            };
            (status, Json(readiness)).into_response()
        }
        Err(error) => internal_error(&state, &request_id, &error),
    }
}

async fn metrics<G: Generator>(
    State(state): State<AppState<G>>,
    Extension(request_id): Extension<RequestId>,
) -> Response {
    let orchestrator = &state.orchestrator;
    orchestrator.collector().update_circuit_breaker(&orchestrator.breaker().metrics());

    match orchestrator.collector().prometheus() {
        Ok(text) => ([(header::CONTENT_TYPE, PROMETHEUS_CONTENT_TYPE)], text).into_response(),
        Err(error) => internal_error(&state, &request_id, &error),
    }
}

async fn errors<G: Generator>(State(state): State<AppState<G>>, Query(params): Params) -> Response {
    let collector = state.orchestrator.collector();

    if params.contains_key("clear") {
        collector.reset();
        return "Error metrics cleared.\n".into_response();
    }
    if params.get("format").is_some_and(|format| format == "json") {
        return Json(collector.snapshot()).into_response();
    }
    collector.error_report().into_response()
}

async fn series<G: Generator>(
    State(state): State<AppState<G>>,
    Extension(request_id): Extension<RequestId>,
) -> Response {
    envelope::success(state.orchestrator.series(), &request_id)
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found\n").into_response()
}

fn internal_error<G: Generator>(state: &AppState<G>, request_id: &RequestId, error: &dyn fmt::Display) -> Response {
    tracing::event!(
        name: "dalledress_server.internal_error",
        tracing::Level::ERROR,
        request.id = %request_id,
        error = %error,
    );
    let error = ApiError::internal(error.to_string(), state.now()).with_request_id(request_id);
    envelope::failure(StatusCode::INTERNAL_SERVER_ERROR, error)
}
