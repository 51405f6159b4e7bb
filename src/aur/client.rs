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

//! AUR RPC API client with rate limiting and retries.

use clap::ValueEnum;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::AurRpcResponse;
use crate::config::AurConfig;
use crate::error::{SlurpyError, SlurpyResult};

/// Names per info request; keeps the query string well below URI limits
const INFO_BATCH_SIZE: usize = 100;

/// Delay before the first retry, doubled on every further attempt
const INITIAL_RETRY_DELAY: Duration = Duration::from_millis(500);

/// AUR package record from the RPC API
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct AurPackage {
    #[serde(rename = "ID", default)]
    pub id: u64,
    pub name: String,
    pub package_base: String,
    #[serde(rename = "PackageBaseID", default)]
    pub package_base_id: u64,
    pub version: String,
    pub description: Option<String>,
    #[serde(rename = "URL")]
    pub url: Option<String>,
    #[serde(default)]
    pub num_votes: u32,
    #[serde(default)]
    pub popularity: f64,
    pub out_of_date: Option<i64>,
    pub maintainer: Option<String>,
    pub submitter: Option<String>,
    #[serde(default)]
    pub first_submitted: i64,
    #[serde(default)]
    pub last_modified: i64,
    #[serde(rename = "URLPath")]
    pub url_path: Option<String>,

    // Only present in info results
    #[serde(default)]
    pub depends: Vec<String>,
    #[serde(default)]
    pub make_depends: Vec<String>,
    #[serde(default)]
    pub opt_depends: Vec<String>,
    #[serde(default)]
    pub check_depends: Vec<String>,
    #[serde(default)]
    pub conflicts: Vec<String>,
    #[serde(default)]
    pub provides: Vec<String>,
    #[serde(default)]
    pub replaces: Vec<String>,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub license: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
}

impl AurPackage {
    /// Snapshot tarball URL under the given AUR web root
    pub fn snapshot_url(&self, base_url: &str) -> SlurpyResult<String> {
        let path = match &self.url_path {
            Some(path) if !path.is_empty() => path.clone(),
            _ => format!("/cgit/aur.git/snapshot/{}.tar.gz", self.package_base),
        };
        let base = url::Url::parse(base_url).map_err(|e| SlurpyError::ConfigError {
            message: format!("invalid AUR base URL '{}': {}", base_url, e),
        })?;
        let joined = base.join(&path).map_err(|e| SlurpyError::MalformedResponse {
            message: format!("bad snapshot path '{}': {}", path, e),
        })?;
        Ok(joined.to_string())
    }

    /// Package page on the AUR web interface
    pub fn aur_page(&self, base_url: &str) -> String {
        format!("{}/packages/{}", base_url.trim_end_matches('/'), self.name)
    }

    pub fn is_orphan(&self) -> bool {
        self.maintainer.is_none()
    }

    pub fn is_out_of_date(&self) -> bool {
        self.out_of_date.is_some()
    }
}

/// Field the AUR matches a search term against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum SearchField {
    Name,
    #[default]
    NameDesc,
    Maintainer,
    Depends,
    #[value(name = "makedepends")]
    MakeDepends,
    #[value(name = "optdepends")]
    OptDepends,
    #[value(name = "checkdepends")]
    CheckDepends,
}

impl SearchField {
    /// Value of the RPC `by` parameter
    pub fn as_str(&self) -> &'static str {
        match self {
            SearchField::Name => "name",
            SearchField::NameDesc => "name-desc",
            SearchField::Maintainer => "maintainer",
            SearchField::Depends => "depends",
            SearchField::MakeDepends => "makedepends",
            SearchField::OptDepends => "optdepends",
            SearchField::CheckDepends => "checkdepends",
        }
    }
}

/// Parse an RPC body, turning error envelopes into errors
pub fn parse_rpc_response(body: &str) -> SlurpyResult<Vec<AurPackage>> {
    let response: AurRpcResponse =
        serde_json::from_str(body).map_err(|e| SlurpyError::MalformedResponse {
            message: e.to_string(),
        })?;

    if let Some(error) = response.error {
        return Err(SlurpyError::Rpc { message: error });
    }
    if response.response_type == "error" {
        return Err(SlurpyError::Rpc {
            message: "unknown error".to_string(),
        });
    }
    if response.resultcount != response.results.len() {
        debug!(
            declared = response.resultcount,
            received = response.results.len(),
            "resultcount disagrees with results"
        );
    }

    Ok(response.results)
}

/// Split info results into the requested order plus the names the AUR did not know
pub fn partition_requested(
    requested: &[String],
    results: Vec<AurPackage>,
) -> (Vec<AurPackage>, Vec<String>) {
    let mut by_name: HashMap<String, AurPackage> =
        results.into_iter().map(|p| (p.name.clone(), p)).collect();

    let mut found = Vec::new();
    let mut missing = Vec::new();
    for name in requested {
        match by_name.remove(name) {
            Some(pkg) => found.push(pkg),
            // duplicate request for an already-found name
            None if found.iter().any(|p: &AurPackage| &p.name == name) => {}
            None => missing.push(name.clone()),
        }
    }
    (found, missing)
}

/// AUR RPC client
pub struct AurClient {
    client: reqwest::Client,
    rpc_url: String,
    last_request: Arc<Mutex<Option<Instant>>>,
    min_request_interval: Duration,
    max_retries: u32,
}

impl AurClient {
    /// Create a client from the `[aur]` config section
    pub fn new(config: &AurConfig) -> SlurpyResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .connect_timeout(Duration::from_secs(config.timeout_secs.min(10)))
            .user_agent(concat!("slurpy/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| SlurpyError::ConfigError {
                message: format!("failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            rpc_url: config.rpc_url.clone(),
            last_request: Arc::new(Mutex::new(None)),
            min_request_interval: Duration::from_millis(config.request_interval_ms),
            max_retries: config.max_retries,
        })
    }

    /// Space requests so the AUR is not hammered
    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let elapsed = previous.elapsed();
            if elapsed < self.min_request_interval {
                tokio::time::sleep(self.min_request_interval - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Search URL for a single term
    pub fn search_url(&self, field: SearchField, term: &str) -> String {
        format!(
            "{}?v=5&type=search&by={}&arg={}",
            self.rpc_url,
            field.as_str(),
            urlencoding::encode(term)
        )
    }

    /// Info URL for a batch of names
    pub fn info_url(&self, names: &[String]) -> String {
        let args: Vec<String> = names
            .iter()
            .map(|n| format!("arg[]={}", urlencoding::encode(n)))
            .collect();
        format!("{}?v=5&type=info&{}", self.rpc_url, args.join("&"))
    }

    /// Search for packages by keyword
    pub async fn search(&self, field: SearchField, term: &str) -> SlurpyResult<Vec<AurPackage>> {
        let url = self.search_url(field, term);
        self.request(&url).await
    }

    /// Detailed records for the given names, batched. Unknown names are
    /// silently absent from the result.
    pub async fn info(&self, names: &[String]) -> SlurpyResult<Vec<AurPackage>> {
        if names.is_empty() {
            return Ok(vec![]);
        }

        let mut all_results = Vec::with_capacity(names.len());
        for chunk in names.chunks(INFO_BATCH_SIZE) {
            let url = self.info_url(chunk);
            all_results.extend(self.request(&url).await?);
        }
        Ok(all_results)
    }

    /// Issue an RPC request, retrying transient failures
    async fn request(&self, url: &str) -> SlurpyResult<Vec<AurPackage>> {
        let mut attempt = 0;
        let mut delay = INITIAL_RETRY_DELAY;

        loop {
            self.rate_limit().await;
            match self.fetch_body(url).await {
                Ok(body) => return parse_rpc_response(&body),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    attempt += 1;
                    warn!("{} (retry {}/{} in {:?})", e, attempt, self.max_retries, delay);
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_body(&self, url: &str) -> SlurpyResult<String> {
        debug!(url, "AUR request");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SlurpyError::network(url, e))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| SlurpyError::network(url, e))?;

        if status.is_success() {
            return Ok(body);
        }
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(SlurpyError::http_status(url, status.as_u16()));
        }

        // Client errors usually still carry an RPC error envelope
        match parse_rpc_response(&body) {
            Err(e @ SlurpyError::Rpc { .. }) => Err(e),
            _ => Err(SlurpyError::http_status(url, status.as_u16())),
        }
    }
}
