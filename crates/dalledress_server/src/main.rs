// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The `dalledress` HTTP server.

use std::process::ExitCode;

use dalledress_server::ServerConfig;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let result = match ServerConfig::load() {
        Ok(config) => dalledress_server::run(config).await,
        Err(error) => Err(error.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::event!(name: "dalledress_server.failed", tracing::Level::ERROR, error = %error);
            ExitCode::FAILURE
        }
    }
}
