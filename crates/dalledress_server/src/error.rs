// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::io;

use crate::ConfigError;

/// Why the server stopped with an error.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ServerError {
    /// The configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The listening socket could not be opened.
    #[error("cannot listen on port {port}: {source}")]
    Bind {
        /// The port.
        port: u16,
        /// The underlying error.
        #[source]
        source: io::Error,
    },

    /// Serving connections failed.
    #[error("server failed: {0}")]
    Serve(#[source] io::Error),
}
