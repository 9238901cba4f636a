// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![cfg_attr(coverage_nightly, feature(coverage_attribute))]
#![cfg_attr(docsrs, feature(doc_cfg))]

//! HTTP front end for the [`dalledress`] orchestrator.
//!
//! [`router`] exposes generation progress, health, metrics and error reports over HTTP.
//! Responses of `/dalle` and `/series` use the [`ApiResponse`] envelope; a generation that
//! failed is still a successful response whose progress is in the `Failed` phase.
//!
//! [`run`] wires a [`SimulatedGenerator`] into a full server configured through
//! [`ServerConfig`].

mod app;
mod config;
mod envelope;
mod error;
mod generator;
mod middleware;
mod routes;
mod status;

pub use app::{prepare_data_dir, run, simulated_state};
pub use config::{CONFIG_ENV, ConfigError, DATA_DIR_ENV, PORT_ENV, ServerConfig};
pub use envelope::{ApiError, ApiResponse};
pub use error::ServerError;
pub use generator::{ArtifactStore, SimulatedGenerator};
pub use middleware::{REQUEST_ID_HEADER, RequestId, Telemetry, endpoint_name, error_code, track};
pub use routes::{AppState, router};
pub use status::{render_status, spawn_status_reporter};
