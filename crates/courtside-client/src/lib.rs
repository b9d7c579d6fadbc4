//! HTTP client for the api-tennis fixtures endpoint.

pub mod normalize;

use std::time::Duration;

use anyhow::{bail, Context};
use courtside_core::{FetchFailure, FetchOutcome, FetchRequest};
use reqwest::{StatusCode, Url};
use serde_json::Value as JsonValue;
use tracing::{debug, error, info, info_span, Instrument};

pub use normalize::{normalize_event, normalize_events};

pub const CRATE_NAME: &str = "courtside-client";

pub const DEFAULT_BASE_URL: &str = "https://api.api-tennis.com/tennis/";
pub const FIXTURES_METHOD: &str = "get_fixtures";

/// Bodies are truncated to this many bytes before they are logged or kept.
const BODY_SNIPPET_LIMIT: usize = 1000;

#[derive(Debug, Clone)]
pub struct ApiConfig {
    pub base_url: String,
    pub method: String,
    pub api_key: String,
    pub timeout: Duration,
    pub user_agent: Option<String>,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            method: FIXTURES_METHOD.to_string(),
            api_key: String::new(),
            timeout: Duration::from_secs(30),
            user_agent: Some(format!("courtside/{}", env!("CARGO_PKG_VERSION"))),
        }
    }
}

impl ApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            base_url: std::env::var("COURTSIDE_API_BASE_URL").unwrap_or(defaults.base_url),
            api_key: std::env::var("API_KEY").unwrap_or_default(),
            timeout: std::env::var("COURTSIDE_HTTP_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.timeout),
            ..defaults
        }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

/// Issues one fixtures query per call. No retries, paging or rate limiting.
#[derive(Debug, Clone)]
pub struct FixtureClient {
    client: reqwest::Client,
    config: ApiConfig,
}

impl FixtureClient {
    /// Fails before any I/O when the API key is absent or blank.
    pub fn new(config: ApiConfig) -> anyhow::Result<Self> {
        if config.api_key.trim().is_empty() {
            bail!("API_KEY is not set");
        }

        let mut builder = reqwest::Client::builder()
            .gzip(true)
            .brotli(true)
            .timeout(config.timeout);

        if let Some(user_agent) = &config.user_agent {
            builder = builder.user_agent(user_agent.clone());
        }

        let client = builder.build().context("building reqwest client")?;
        Ok(Self { client, config })
    }

    pub fn fixtures_url(&self, request: &FetchRequest) -> Result<Url, FetchFailure> {
        let mut params = vec![
            ("method", self.config.method.clone()),
            ("date_start", request.date_start_str()),
            ("date_stop", request.date_stop_str()),
        ];
        if let Some(player_key) = request.player_key() {
            params.push(("player_key", player_key.to_string()));
        }
        params.push(("APIkey", self.config.api_key.clone()));

        Url::parse_with_params(&self.config.base_url, &params).map_err(|err| {
            FetchFailure::InvalidRequest(format!("bad base url {}: {err}", self.config.base_url))
        })
    }

    /// Fetch fixtures for the request. Every failure mode is returned as
    /// `FetchOutcome::Failed`; this never panics or propagates an error.
    pub async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        let span = info_span!(
            "fixtures_fetch",
            date_start = %request.date_start_str(),
            date_stop = %request.date_stop_str(),
            player_key = request.player_key().unwrap_or(""),
        );
        self.fetch_inner(request).instrument(span).await
    }

    async fn fetch_inner(&self, request: &FetchRequest) -> FetchOutcome {
        if let Err(failure) = request.validate() {
            error!(%failure, "rejecting fixtures request");
            return FetchOutcome::Failed(failure);
        }
        let url = match self.fixtures_url(request) {
            Ok(url) => url,
            Err(failure) => {
                error!(%failure, "cannot build fixtures url");
                return FetchOutcome::Failed(failure);
            }
        };
        debug!(url = %redact_api_key(&url), "requesting fixtures");

        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(err) => {
                let err = err.without_url();
                error!(error = %err, "fixtures request failed");
                return FetchOutcome::Failed(FetchFailure::Transport(err.to_string()));
            }
        };

        let status = resp.status();
        let body = match resp.bytes().await {
            Ok(body) => body,
            Err(err) => {
                let err = err.without_url();
                error!(error = %err, %status, "reading fixtures response body failed");
                return FetchOutcome::Failed(FetchFailure::Transport(err.to_string()));
            }
        };

        classify_response(status, &body, request.player_key())
    }
}

/// Turn a raw HTTP response into a fetch outcome.
pub fn classify_response(status: StatusCode, body: &[u8], player_key: Option<&str>) -> FetchOutcome {
    if status.is_server_error() {
        let body = body_snippet(body);
        error!(status = status.as_u16(), %body, "server error from fixtures endpoint");
        return FetchOutcome::Failed(FetchFailure::ServerError {
            status: status.as_u16(),
            body,
        });
    }

    if !status.is_success() {
        let body = body_snippet(body);
        error!(status = status.as_u16(), %body, "HTTP error from fixtures endpoint");
        return FetchOutcome::Failed(FetchFailure::HttpStatus {
            status: status.as_u16(),
            body,
        });
    }

    let payload: JsonValue = match serde_json::from_slice(body) {
        Ok(payload) => payload,
        Err(err) => {
            error!(error = %err, body = %body_snippet(body), "fixtures response is not valid JSON");
            return FetchOutcome::Failed(FetchFailure::MalformedBody(err.to_string()));
        }
    };

    let result = payload.get("result");
    if !result.is_some_and(is_truthy) {
        info!("no fixtures available for the requested range");
        return FetchOutcome::Empty;
    }

    match result.and_then(JsonValue::as_array) {
        Some(events) => {
            let rows = normalize_events(events, player_key);
            info!(rows = rows.len(), "fetched fixtures");
            FetchOutcome::Fixtures(rows)
        }
        None => {
            error!("fixtures payload `result` is not an array");
            FetchOutcome::Failed(FetchFailure::UnexpectedShape(
                "`result` is not an array".to_string(),
            ))
        }
    }
}

/// Truthiness of a JSON value: null, false, zero and empty containers are falsy.
fn is_truthy(value: &JsonValue) -> bool {
    match value {
        JsonValue::Null => false,
        JsonValue::Bool(b) => *b,
        JsonValue::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        JsonValue::String(s) => !s.is_empty(),
        JsonValue::Array(a) => !a.is_empty(),
        JsonValue::Object(o) => !o.is_empty(),
    }
}

fn body_snippet(body: &[u8]) -> String {
    let end = body.len().min(BODY_SNIPPET_LIMIT);
    String::from_utf8_lossy(&body[..end]).into_owned()
}

fn redact_api_key(url: &Url) -> Url {
    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let v = if k == "APIkey" { "***".into() } else { v.into_owned() };
            (k.into_owned(), v)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted
}
