// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::middleware::Next;
use axum::response::Response;
use tally::MetricsCollector;
use tick::Clock;
use tracing::Instrument as _;

/// Header carrying the request identifier in both directions.
pub static REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

const REQUEST_ID_LEN: usize = 8;
const SLOW_REQUEST: Duration = Duration::from_secs(5);

/// Short identifier assigned to every request, taken from a random UUID.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestId(Arc<str>);

impl RequestId {
    /// A fresh identifier of eight hexadecimal characters.
    #[must_use]
    pub fn generate() -> Self {
        let mut id = uuid::Uuid::new_v4().simple().to_string();
        id.truncate(REQUEST_ID_LEN);
        Self(id.into())
    }

    /// The identifier as text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self(id.into())
    }
}

/// What the request middleware needs from the application.
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub(crate) collector: MetricsCollector,
    pub(crate) clock: Clock,
}

impl Telemetry {
    /// Records into `collector`, timing requests with `clock`.
    #[must_use]
    pub fn new(collector: MetricsCollector, clock: Clock) -> Self {
        Self { collector, clock }
    }
}

/// Assigns a request id, runs the request inside a span and records its outcome.
///
/// Every response carries `X-Request-ID`. The response time of every request is recorded,
/// and responses with a status of 400 or above are counted as errors under a code derived
/// from the status and the endpoint name.
pub async fn track(State(telemetry): State<Telemetry>, mut request: Request, next: Next) -> Response {
    let request_id = RequestId::generate();
    request.extensions_mut().insert(request_id.clone());

    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let endpoint = endpoint_name(&path);
    let span = tracing::info_span!("request", request.id = %request_id, http.method = %method, http.path = %path);

    let stopwatch = telemetry.clock.stopwatch();
    let mut response = next.run(request).instrument(span.clone()).await;
    let elapsed = stopwatch.elapsed();
    let status = response.status();

    telemetry
        .collector
        .record_response_time(u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX));
    if status.is_client_error() || status.is_server_error() {
        telemetry.collector.record_error(error_code(status), endpoint);
    }

    if let Ok(value) = HeaderValue::from_str(request_id.as_str()) {
        response.headers_mut().insert(REQUEST_ID_HEADER.clone(), value);
    }

    let _entered = span.enter();
    tracing::event!(
        name: "dalledress_server.request",
        tracing::Level::INFO,
        http.status = status.as_u16(),
        endpoint,
        duration_ms = elapsed.as_secs_f64() * 1000.0,
    );
    if elapsed > SLOW_REQUEST {
        tracing::event!(
            name: "dalledress_server.slow_request",
            tracing::Level::WARN,
            duration_ms = elapsed.as_secs_f64() * 1000.0,
        );
    }
    if status.is_server_error() {
        tracing::event!(name: "dalledress_server.server_error", tracing::Level::ERROR, http.status = status.as_u16());
    }

    response
}

/// Groups request paths into the endpoint names used in metrics.
#[must_use]
pub fn endpoint_name(path: &str) -> &'static str {
    match path {
        "/readiness" => "readiness",
        "/liveness" => "liveness",
        p if p.starts_with("/dalle/") => "dalle",
        p if p.starts_with("/series") => "series",
        p if p.starts_with("/health") => "health",
        p if p.starts_with("/metrics") => "metrics",
        p if p.starts_with("/errors") => "errors",
        _ => "other",
    }
}

/// Error code recorded for a failed response.
#[must_use]
pub fn error_code(status: StatusCode) -> &'static str {
    match status.as_u16() {
        400 => "BAD_REQUEST",
        401 => "UNAUTHORIZED",
        403 => "FORBIDDEN",
        404 => "NOT_FOUND",
        408 => "REQUEST_TIMEOUT",
        429 => "RATE_LIMITED",
        500 => "INTERNAL_ERROR",
        502 => "BAD_GATEWAY",
        503 => "SERVICE_UNAVAILABLE",
        504 => "GATEWAY_TIMEOUT",
        400..=499 => "CLIENT_ERROR",
        _ => "SERVER_ERROR",
    }
}
