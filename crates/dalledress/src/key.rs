// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

const ADDRESS_HEX_LEN: usize = 40;

/// Identifies one generation: a series and an address.
///
/// Both parts are stored lowercase, so keys that differ only in case are the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenerationKey {
    series: String,
    address: String,
}

impl GenerationKey {
    /// Validates and canonicalizes a series name and an address.
    ///
    /// Surrounding whitespace is ignored. A series consists of ASCII letters, digits, `-`
    /// and `_`; an address is `0x` followed by 40 hexadecimal digits.
    ///
    /// # Errors
    ///
    /// Returns a [`KeyError`] naming the first part that is missing or malformed.
    pub fn parse(series: &str, address: &str) -> Result<Self, KeyError> {
        let series = series.trim().to_ascii_lowercase();
        let address = address.trim().to_ascii_lowercase();

        if series.is_empty() {
            return Err(KeyError::EmptySeries);
        }
        if address.is_empty() {
            return Err(KeyError::EmptyAddress);
        }
        if !series.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_') {
            return Err(KeyError::InvalidSeries(series));
        }
        if !is_address(&address) {
            return Err(KeyError::InvalidAddress(address));
        }

        Ok(Self { series, address })
    }

    /// The lowercase series name.
    #[must_use]
    pub fn series(&self) -> &str {
        &self.series
    }

    /// The lowercase address, including the `0x` prefix.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.address
    }

    /// The address shortened for display, e.g. `0x1234…abcd`.
    #[must_use]
    pub fn short_address(&self) -> String {
        let (head, tail) = self.address.split_at(6);
        format!("{head}…{}", &tail[tail.len() - 4..])
    }
}

impl Display for GenerationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.series, self.address)
    }
}

fn is_address(address: &str) -> bool {
    address
        .strip_prefix("0x")
        .is_some_and(|hex| hex.len() == ADDRESS_HEX_LEN && hex.bytes().all(|b| b.is_ascii_hexdigit()))
}

/// Why a series/address pair was rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum KeyError {
    /// No series was given.
    #[error("series is required")]
    EmptySeries,

    /// No address was given.
    #[error("address is required")]
    EmptyAddress,

    /// The series contains characters outside `[a-z0-9_-]`.
    #[error("series '{0}' is not a valid series name")]
    InvalidSeries(String),

    /// The series is well formed but not configured.
    #[error("series '{0}' not found in available series")]
    UnknownSeries(String),

    /// The address is not `0x` followed by 40 hexadecimal digits.
    #[error("address '{0}' is not a valid Ethereum address")]
    InvalidAddress(String),
}

impl KeyError {
    /// Stable machine-readable code, used in API error envelopes and error metrics.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::EmptySeries | Self::EmptyAddress => "MISSING_PARAMETER",
            Self::InvalidSeries(_) | Self::UnknownSeries(_) => "INVALID_SERIES",
            Self::InvalidAddress(_) => "INVALID_ADDRESS",
        }
    }

    /// Short human-readable summary.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::EmptySeries | Self::EmptyAddress => "Missing required parameter",
            Self::InvalidSeries(_) | Self::UnknownSeries(_) => "Invalid series name",
            Self::InvalidAddress(_) => "Invalid address format",
        }
    }

    /// Longer explanation naming the offending value.
    #[must_use]
    pub fn details(&self) -> String {
        match self {
            Self::EmptySeries => "Parameter 'series' is required".to_string(),
            Self::EmptyAddress => "Parameter 'address' is required".to_string(),
            Self::InvalidSeries(series) => format!("Series '{series}' contains invalid characters"),
            Self::UnknownSeries(series) => format!("Series '{series}' not found in available series"),
            Self::InvalidAddress(address) => format!("Address '{address}' is not a valid Ethereum address"),
        }
    }
}
