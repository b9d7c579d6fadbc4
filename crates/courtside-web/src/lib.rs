//! Axum + Askama dashboard over the fixture client.

use std::collections::BTreeMap;
use std::sync::Arc;

use askama::Template;
use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Form, Json, Router,
};
use chrono::NaiveDate;
use courtside_client::{ApiConfig, FixtureClient};
use courtside_core::{FetchOutcome, FetchRequest, FixtureEvent, DATE_FORMAT, FIXTURE_COLUMNS};
use courtside_sync::{today, FixtureSource};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::net::TcpListener;
use tracing::{info, warn};
use url::form_urlencoded;

pub const CRATE_NAME: &str = "courtside-web";

pub const SESSION_COOKIE: &str = "courtside_session";
pub const DEFAULT_PORT: u16 = 8000;

const UNKNOWN_EVENT_TYPE: &str = "Unknown";

#[derive(Clone)]
pub struct AppState {
    source: Arc<dyn FixtureSource>,
    password: Option<String>,
}

impl AppState {
    pub fn new(source: Arc<dyn FixtureSource>, password: Option<String>) -> Self {
        Self {
            source,
            password: password.filter(|p| !p.is_empty()),
        }
    }

    fn session_token(&self) -> Option<String> {
        self.password.as_deref().map(session_token)
    }
}

#[derive(Debug, Deserialize, Default)]
struct FixturesQuery {
    date_start: Option<String>,
    date_stop: Option<String>,
    player_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginForm {
    password: String,
}

#[derive(Template)]
#[template(path = "login.html")]
struct LoginTemplate {
    password_configured: bool,
    error: Option<String>,
}

#[derive(Template)]
#[template(path = "fixtures.html")]
struct FixturesTemplate {
    date_start: String,
    date_stop: String,
    player_key: String,
    columns: Vec<&'static str>,
    rows: Vec<Vec<String>>,
    type_counts: Vec<(String, usize)>,
    notice: Option<String>,
    error: Option<String>,
    csv_href: String,
    chart_href: String,
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/", get(|| async { Redirect::to("/fixtures") }))
        .route("/login", get(login_page_handler).post(login_handler))
        .route("/logout", post(logout_handler))
        .route("/fixtures", get(fixtures_handler))
        .route("/fixtures.csv", get(fixtures_csv_handler))
        .route("/fixtures/chart", get(fixtures_chart_handler))
        .with_state(Arc::new(state))
}

pub async fn serve(port: u16, state: AppState) -> anyhow::Result<()> {
    let listener = TcpListener::bind(("0.0.0.0", port)).await?;
    info!(port, "dashboard listening");
    axum::serve(listener, app(state)).await?;
    Ok(())
}

pub async fn serve_from_env(port: Option<u16>) -> anyhow::Result<()> {
    let port = port
        .or_else(|| {
            std::env::var("COURTSIDE_WEB_PORT")
                .ok()
                .and_then(|v| v.parse().ok())
        })
        .unwrap_or(DEFAULT_PORT);
    let client = FixtureClient::new(ApiConfig::from_env())?;
    let password = std::env::var("APP_PASSWORD").ok();
    if password.as_deref().unwrap_or_default().is_empty() {
        warn!("APP_PASSWORD is not set; every login will be refused");
    }
    serve(port, AppState::new(Arc::new(client), password)).await
}

/// Cookie value proving a successful login for `password`.
pub fn session_token(password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(b"courtside:");
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}

fn is_logged_in(state: &AppState, headers: &HeaderMap) -> bool {
    let Some(expected) = state.session_token() else {
        return false;
    };
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .any(|(name, value)| name == SESSION_COOKIE && value == expected)
}

async fn login_page_handler(State(state): State<Arc<AppState>>) -> Response {
    render_html(LoginTemplate {
        password_configured: state.password.is_some(),
        error: None,
    })
}

async fn login_handler(State(state): State<Arc<AppState>>, Form(form): Form<LoginForm>) -> Response {
    match state.password.as_deref() {
        Some(password) if form.password == password => {
            let cookie = format!(
                "{SESSION_COOKIE}={}; Path=/; HttpOnly; SameSite=Lax",
                session_token(password)
            );
            ([(header::SET_COOKIE, cookie)], Redirect::to("/fixtures")).into_response()
        }
        _ => {
            let page = render_html(LoginTemplate {
                password_configured: state.password.is_some(),
                error: Some("Invalid password".to_string()),
            });
            (StatusCode::UNAUTHORIZED, page).into_response()
        }
    }
}

async fn logout_handler() -> Response {
    let cookie = format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    ([(header::SET_COOKIE, cookie)], Redirect::to("/login")).into_response()
}

async fn fixtures_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<FixturesQuery>,
) -> Response {
    if !is_logged_in(&state, &headers) {
        return Redirect::to("/login").into_response();
    }

    let default_day = today();
    let mut tpl = FixturesTemplate {
        date_start: query.date_start.clone().unwrap_or_else(|| default_day.format(DATE_FORMAT).to_string()),
        date_stop: query.date_stop.clone().unwrap_or_default(),
        player_key: query.player_key.clone().unwrap_or_default(),
        columns: FIXTURE_COLUMNS.to_vec(),
        rows: Vec::new(),
        type_counts: Vec::new(),
        notice: None,
        error: None,
        csv_href: String::new(),
        chart_href: String::new(),
    };

    let request = match fetch_request(&query, default_day) {
        Ok(request) => request,
        Err(message) => {
            tpl.error = Some(message);
            return (StatusCode::BAD_REQUEST, render_html(tpl)).into_response();
        }
    };
    tpl.date_start = request.date_start_str();
    tpl.date_stop = request.date_stop_str();
    let query_string = query_string(&request);
    tpl.csv_href = format!("/fixtures.csv?{query_string}");
    tpl.chart_href = format!("/fixtures/chart?{query_string}");

    match state.source.fetch(&request).await {
        FetchOutcome::Fixtures(rows) if !rows.is_empty() => {
            tpl.type_counts = count_by_event_type(&rows);
            tpl.rows = rows.iter().map(row_cells).collect();
        }
        FetchOutcome::Fixtures(_) | FetchOutcome::Empty => {
            tpl.notice = Some("No fixtures found for the selected range.".to_string());
        }
        FetchOutcome::Failed(failure) => {
            tpl.error = Some(format!("Failed to fetch fixtures: {failure}"));
        }
    }
    render_html(tpl)
}

async fn fixtures_csv_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<FixturesQuery>,
) -> Response {
    if !is_logged_in(&state, &headers) {
        return Redirect::to("/login").into_response();
    }
    let request = match fetch_request(&query, today()) {
        Ok(request) => request,
        Err(message) => return (StatusCode::BAD_REQUEST, message).into_response(),
    };
    let rows = match state.source.fetch(&request).await {
        FetchOutcome::Fixtures(rows) => rows,
        FetchOutcome::Empty => Vec::new(),
        FetchOutcome::Failed(failure) => {
            return (StatusCode::BAD_GATEWAY, format!("Failed to fetch fixtures: {failure}")).into_response();
        }
    };
    let filename = format!(
        "attachment; filename=\"fixtures_{}_{}.csv\"",
        request.date_start_str(),
        request.date_stop_str()
    );
    (
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, filename),
        ],
        fixtures_csv(&rows),
    )
        .into_response()
}

async fn fixtures_chart_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<FixturesQuery>,
) -> Response {
    if !is_logged_in(&state, &headers) {
        return Redirect::to("/login").into_response();
    }
    let request = match fetch_request(&query, today()) {
        Ok(request) => request,
        Err(message) => {
            return (StatusCode::BAD_REQUEST, Json(serde_json::json!({ "error": message }))).into_response();
        }
    };
    let rows = match state.source.fetch(&request).await {
        FetchOutcome::Fixtures(rows) => rows,
        FetchOutcome::Empty => Vec::new(),
        FetchOutcome::Failed(failure) => {
            return (
                StatusCode::BAD_GATEWAY,
                Json(serde_json::json!({ "error": failure.to_string() })),
            )
                .into_response();
        }
    };

    let counts = count_by_event_type(&rows);
    let x = counts.iter().map(|(t, _)| t.clone()).collect::<Vec<_>>();
    let y = counts.iter().map(|(_, c)| *c).collect::<Vec<_>>();
    Json(serde_json::json!({
        "data": [{
            "type": "bar",
            "x": x,
            "y": y,
            "marker": {"color": "#0ea5e9"}
        }],
        "layout": {
            "title": "Fixtures by Event Type",
            "xaxis": {"title": "event_type_type"},
            "yaxis": {"title": "fixtures"},
            "paper_bgcolor": "#ffffff",
            "plot_bgcolor": "#f8fafc"
        }
    }))
    .into_response()
}

fn fetch_request(query: &FixturesQuery, today: NaiveDate) -> Result<FetchRequest, String> {
    let date_start = parse_date(query.date_start.as_deref(), "date_start")?.unwrap_or(today);
    let date_stop = parse_date(query.date_stop.as_deref(), "date_stop")?.unwrap_or(date_start);
    let request = FetchRequest::new(date_start, date_stop)
        .with_player_key(query.player_key.clone().unwrap_or_default());
    request.validate().map_err(|failure| failure.to_string())?;
    Ok(request)
}

fn parse_date(value: Option<&str>, name: &str) -> Result<Option<NaiveDate>, String> {
    match value.map(str::trim).filter(|v| !v.is_empty()) {
        None => Ok(None),
        Some(v) => NaiveDate::parse_from_str(v, DATE_FORMAT)
            .map(Some)
            .map_err(|_| format!("{name} must be a YYYY-MM-DD date, got {v:?}")),
    }
}

fn query_string(request: &FetchRequest) -> String {
    let mut qs = form_urlencoded::Serializer::new(String::new());
    qs.append_pair("date_start", &request.date_start_str())
        .append_pair("date_stop", &request.date_stop_str());
    if let Some(player_key) = request.player_key() {
        qs.append_pair("player_key", player_key);
    }
    qs.finish()
}

fn row_cells(row: &FixtureEvent) -> Vec<String> {
    row.values()
        .into_iter()
        .map(|v| v.unwrap_or_default().to_string())
        .collect()
}

/// Rows per `event_type_type`, most common first, ties by name.
pub fn count_by_event_type(rows: &[FixtureEvent]) -> Vec<(String, usize)> {
    let mut counts = BTreeMap::<String, usize>::new();
    for row in rows {
        let event_type = row
            .event_type_type
            .as_deref()
            .filter(|t| !t.is_empty())
            .unwrap_or(UNKNOWN_EVENT_TYPE);
        *counts.entry(event_type.to_string()).or_default() += 1;
    }
    let mut counts = counts.into_iter().collect::<Vec<_>>();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

/// CSV export with a header row; absent values are empty cells.
pub fn fixtures_csv(rows: &[FixtureEvent]) -> String {
    let mut out = String::new();
    push_csv_line(&mut out, FIXTURE_COLUMNS.iter().copied());
    for row in rows {
        push_csv_line(&mut out, row.values().into_iter().map(Option::unwrap_or_default));
    }
    out
}

fn push_csv_line<'a>(out: &mut String, cells: impl Iterator<Item = &'a str>) {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            out.push(',');
        }
        if cell.contains([',', '"', '\n', '\r']) {
            out.push('"');
            out.push_str(&cell.replace('"', "\"\""));
            out.push('"');
        } else {
            out.push_str(cell);
        }
    }
    out.push('\n');
}

fn render_html<T: Template>(tpl: T) -> Response {
    match tpl.render() {
        Ok(html) => Html(html).into_response(),
        Err(err) => server_error(anyhow::anyhow!(err.to_string())),
    }
}

fn server_error(err: anyhow::Error) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Html(format!("Server error: {}", err)),
    )
        .into_response()
}
