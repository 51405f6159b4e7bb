/*
 * slurpy - Arch User Repository search/download/update helper.
 * Copyright (C) 2025  slurpy contributors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 * GNU General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Error types shared by the AUR client, the pacman bridge and the CLI.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for slurpy operations
#[derive(Debug, Error)]
pub enum SlurpyError {
    /// Network errors during API calls or snapshot downloads
    #[error("Network error for {url}: {message}")]
    Network {
        url: String,
        message: String,
        /// HTTP status, when the server answered at all
        status: Option<u16>,
        #[source]
        source: Option<reqwest::Error>,
    },

    /// The AUR answered with an error envelope
    #[error("AUR RPC error: {message}")]
    Rpc { message: String },

    /// The AUR answered with something that is not an RPC envelope
    #[error("Malformed AUR response: {message}")]
    MalformedResponse { message: String },

    /// One or more requested packages are not in the AUR
    #[error("package(s) not found in the AUR: {}", .packages.join(", "))]
    PackagesNotFound { packages: Vec<String> },

    /// A search returned nothing
    #[error("no results found for '{query}'")]
    NoResults { query: String },

    /// Download destination already exists
    #[error("'{}' already exists (use --force to overwrite)", .path.display())]
    TargetExists { path: PathBuf },

    /// Snapshot archive could not be unpacked
    #[error("Failed to extract snapshot for '{package}': {message}")]
    Extract { package: String, message: String },

    /// Querying the local package database failed
    #[error("pacman query failed: {reason}")]
    PacmanQuery { reason: String },

    /// makepkg returned a non-zero status
    #[error("Build failed for '{package}' (exit code {})", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "unknown".to_string()))]
    BuildFailed {
        package: String,
        exit_code: Option<i32>,
    },

    /// Configuration errors
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// File system errors
    #[error("File system error for '{}': {message}", .path.display())]
    FileSystem {
        path: PathBuf,
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Bad combination of command-line arguments
    #[error("{message}")]
    InvalidArguments { message: String },

    /// Several independent per-package operations failed
    #[error("{failed} of {total} package(s) failed")]
    PartialFailure { failed: usize, total: usize },
}

impl SlurpyError {
    /// Whether the failed request is worth repeating.
    ///
    /// Rate limiting (429), server-side failures (5xx) and transport errors
    /// that never produced a status are transient; everything else is not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SlurpyError::Network { status: Some(code), .. } => *code == 429 || *code >= 500,
            SlurpyError::Network { status: None, .. } => true,
            _ => false,
        }
    }

    /// Create a network error from a reqwest failure
    pub fn network(url: impl Into<String>, source: reqwest::Error) -> Self {
        SlurpyError::Network {
            url: url.into(),
            message: source.to_string(),
            status: source.status().map(|s| s.as_u16()),
            source: Some(source),
        }
    }

    /// Create a network error for an unexpected HTTP status
    pub fn http_status(url: impl Into<String>, status: u16) -> Self {
        SlurpyError::Network {
            url: url.into(),
            message: format!("HTTP {}", status),
            status: Some(status),
            source: None,
        }
    }

    /// Create a filesystem error
    pub fn filesystem(path: impl Into<PathBuf>, message: impl Into<String>, source: std::io::Error) -> Self {
        SlurpyError::FileSystem {
            path: path.into(),
            message: message.into(),
            source: Some(source),
        }
    }

    pub fn invalid_args(message: impl Into<String>) -> Self {
        SlurpyError::InvalidArguments { message: message.into() }
    }
}

/// Result type alias for slurpy operations
pub type SlurpyResult<T> = std::result::Result<T, SlurpyError>;
