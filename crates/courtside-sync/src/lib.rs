//! Daily fixture sync: fetch one day of fixtures and load them into Postgres.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{Local, NaiveDate};
use courtside_client::{ApiConfig, FixtureClient};
use courtside_core::{FetchOutcome, FetchRequest, FixtureEvent, LoadResult, DATE_FORMAT};
use courtside_store::{BulkLoader, DbConfig, DEFAULT_SCHEMA, DEFAULT_TABLE};
use tracing::{info, info_span, warn, Instrument};

pub const CRATE_NAME: &str = "courtside-sync";

/// Where fixtures come from.
#[async_trait]
pub trait FixtureSource: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome;
}

/// Where fixtures go.
#[async_trait]
pub trait FixtureSink: Send + Sync {
    async fn load(&self, rows: &[FixtureEvent], schema: &str, table: &str) -> LoadResult;
}

#[async_trait]
impl FixtureSource for FixtureClient {
    async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
        FixtureClient::fetch(self, request).await
    }
}

#[async_trait]
impl FixtureSink for BulkLoader {
    async fn load(&self, rows: &[FixtureEvent], schema: &str, table: &str) -> LoadResult {
        BulkLoader::load(self, rows, schema, table).await
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub schema: String,
    pub table: String,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            schema: DEFAULT_SCHEMA.to_string(),
            table: DEFAULT_TABLE.to_string(),
        }
    }
}

impl SyncConfig {
    pub fn from_env() -> Self {
        Self {
            schema: std::env::var("COURTSIDE_SCHEMA").unwrap_or_else(|_| DEFAULT_SCHEMA.to_string()),
            table: std::env::var("COURTSIDE_TABLE").unwrap_or_else(|_| DEFAULT_TABLE.to_string()),
        }
    }
}

/// `fetch -> (empty? stop : load) -> report`, once per call.
pub struct Orchestrator {
    config: SyncConfig,
    source: Box<dyn FixtureSource>,
    sink: Box<dyn FixtureSink>,
}

impl Orchestrator {
    pub fn new(config: SyncConfig, source: Box<dyn FixtureSource>, sink: Box<dyn FixtureSink>) -> Self {
        Self {
            config,
            source,
            sink,
        }
    }

    pub async fn run(&self, date: NaiveDate) -> LoadResult {
        let span = info_span!("fixtures_sync", date = %date.format(DATE_FORMAT));
        self.run_inner(date).instrument(span).await
    }

    pub async fn run_today(&self) -> LoadResult {
        self.run(today()).await
    }

    async fn run_inner(&self, date: NaiveDate) -> LoadResult {
        info!("fetching fixtures");
        let rows = match self.source.fetch(&FetchRequest::single_day(date)).await {
            FetchOutcome::Fixtures(rows) if !rows.is_empty() => rows,
            FetchOutcome::Fixtures(_) | FetchOutcome::Empty => {
                warn!("no fixtures found; skipping load");
                return LoadResult::no_fixtures(date);
            }
            FetchOutcome::Failed(failure) => {
                warn!(%failure, "fetch failed; skipping load");
                return LoadResult::failed(format!(
                    "Failed to fetch fixtures for {}: {failure}",
                    date.format(DATE_FORMAT)
                ));
            }
        };

        info!(rows = rows.len(), schema = %self.config.schema, table = %self.config.table, "loading fixtures");
        let result = self
            .sink
            .load(&rows, &self.config.schema, &self.config.table)
            .await;
        info!(success = result.success, rows_inserted = result.rows_inserted, "sync finished");
        result
    }
}

/// Today's date in the local time zone.
pub fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub fn orchestrator_from_env() -> Result<Orchestrator> {
    let client = FixtureClient::new(ApiConfig::from_env()).context("building fixture client")?;
    let loader = BulkLoader::new(DbConfig::from_env());
    Ok(Orchestrator::new(
        SyncConfig::from_env(),
        Box::new(client),
        Box::new(loader),
    ))
}

pub async fn run_today_from_env() -> Result<LoadResult> {
    Ok(orchestrator_from_env()?.run_today().await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use courtside_core::{FetchFailure, FIXTURE_COLUMNS};
    use courtside_store::{insert_builder, QualifiedTable};

    fn day(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    struct StubSource {
        outcome: FetchOutcome,
        requests: Arc<Mutex<Vec<FetchRequest>>>,
    }

    #[async_trait]
    impl FixtureSource for StubSource {
        async fn fetch(&self, request: &FetchRequest) -> FetchOutcome {
            self.requests.lock().unwrap().push(request.clone());
            self.outcome.clone()
        }
    }

    #[derive(Debug, Clone)]
    struct SinkCall {
        rows: usize,
        target: String,
        statement: String,
    }

    #[derive(Default)]
    struct RecordingSink {
        calls: Arc<Mutex<Vec<SinkCall>>>,
    }

    #[async_trait]
    impl FixtureSink for RecordingSink {
        async fn load(&self, rows: &[FixtureEvent], schema: &str, table: &str) -> LoadResult {
            let target = QualifiedTable::new(schema, table).unwrap();
            self.calls.lock().unwrap().push(SinkCall {
                rows: rows.len(),
                target: target.to_string(),
                statement: insert_builder(&target, rows).sql().to_string(),
            });
            LoadResult::inserted(rows.len(), &target.to_string())
        }
    }

    fn fixture(key: &str) -> FixtureEvent {
        FixtureEvent {
            event_key: Some(key.to_string()),
            event_date: Some("2026-01-18".into()),
            event_type_type: Some("Atp Singles".into()),
            ..Default::default()
        }
    }

    fn orchestrator(
        outcome: FetchOutcome,
    ) -> (Orchestrator, Arc<Mutex<Vec<FetchRequest>>>, Arc<Mutex<Vec<SinkCall>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let sink = RecordingSink::default();
        let calls = sink.calls.clone();
        let orchestrator = Orchestrator::new(
            SyncConfig::default(),
            Box::new(StubSource {
                outcome,
                requests: requests.clone(),
            }),
            Box::new(sink),
        );
        (orchestrator, requests, calls)
    }

    #[tokio::test]
    async fn three_rows_are_loaded_with_fixture_columns() {
        let rows = vec![fixture("1"), fixture("2"), fixture("3")];
        let (orchestrator, requests, calls) = orchestrator(FetchOutcome::Fixtures(rows));

        let result = orchestrator.run(day("2026-01-18")).await;
        assert!(result.success);
        assert_eq!(result.rows_inserted, 3);
        assert_eq!(result.message, "Successfully inserted 3 rows into sample.fixtures");

        let requests = requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0], FetchRequest::single_day(day("2026-01-18")));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].rows, 3);
        assert_eq!(calls[0].target, "sample.fixtures");
        let column_list = format!("({})", FIXTURE_COLUMNS.join(", "));
        assert!(calls[0].statement.contains(&column_list), "{}", calls[0].statement);
    }

    #[tokio::test]
    async fn empty_marker_short_circuits_without_loading() {
        let (orchestrator, _requests, calls) = orchestrator(FetchOutcome::Empty);
        let result = orchestrator.run(day("2026-01-19")).await;
        assert!(!result.success);
        assert_eq!(result.rows_inserted, 0);
        assert!(result.message.contains("No fixtures found for 2026-01-19"));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn zero_rows_is_treated_like_empty() {
        let (orchestrator, _requests, calls) = orchestrator(FetchOutcome::Fixtures(Vec::new()));
        let result = orchestrator.run(day("2026-01-19")).await;
        assert_eq!(result, LoadResult::no_fixtures(day("2026-01-19")));
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_and_skips_load() {
        let (orchestrator, _requests, calls) = orchestrator(FetchOutcome::Failed(FetchFailure::ServerError {
            status: 500,
            body: "boom".into(),
        }));
        let result = orchestrator.run(day("2026-01-20")).await;
        assert!(!result.success);
        assert_eq!(
            result.message,
            "Failed to fetch fixtures for 2026-01-20: server error (HTTP 500)"
        );
        assert!(calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn loader_result_is_returned_unchanged() {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let orchestrator = Orchestrator::new(
            SyncConfig::default(),
            Box::new(StubSource {
                outcome: FetchOutcome::Fixtures(vec![fixture("1")]),
                requests,
            }),
            Box::new(BulkLoader::new(DbConfig::default())),
        );
        let result = orchestrator.run(day("2026-01-18")).await;
        assert_eq!(
            result,
            LoadResult::failed("Configuration error: DB_HOST is not set")
        );
    }

    #[tokio::test]
    async fn env_wiring_refuses_to_run_without_api_key() {
        std::env::set_var("API_KEY", " ");
        let err = run_today_from_env().await.unwrap_err();
        assert_eq!(format!("{err:#}"), "building fixture client: API_KEY is not set");
    }

    #[tokio::test]
    async fn custom_destination_is_passed_to_sink() {
        let sink = RecordingSink::default();
        let calls = sink.calls.clone();
        let orchestrator = Orchestrator::new(
            SyncConfig {
                schema: "tennis".into(),
                table: "daily_fixtures".into(),
            },
            Box::new(StubSource {
                outcome: FetchOutcome::Fixtures(vec![fixture("9")]),
                requests: Arc::default(),
            }),
            Box::new(sink),
        );
        let result = orchestrator.run_today().await;
        assert!(result.success);
        assert_eq!(calls.lock().unwrap()[0].target, "tennis.daily_fixtures");
    }
}
