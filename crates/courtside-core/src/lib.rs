//! Core fixture model and pipeline outcome types for courtside.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const CRATE_NAME: &str = "courtside-core";

/// Calendar date format used on the wire and in messages.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Number of persisted fixture columns.
pub const FIXTURE_COLUMN_COUNT: usize = 22;

macro_rules! fixture_event {
    ($(#[$meta:meta])* pub struct $name:ident { $($field:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
        pub struct $name {
            $(pub $field: Option<String>,)+
        }

        /// Persisted column names, in table order.
        pub const FIXTURE_COLUMNS: [&str; FIXTURE_COLUMN_COUNT] = [$(stringify!($field)),+];

        impl $name {
            /// Build a row by asking `value_for` for every column in table order.
            pub fn from_fn(mut value_for: impl FnMut(&'static str) -> Option<String>) -> Self {
                Self {
                    $($field: value_for(stringify!($field)),)+
                }
            }

            /// Column values in table order; `None` is an absent upstream value.
            pub fn values(&self) -> [Option<&str>; FIXTURE_COLUMN_COUNT] {
                [$(self.$field.as_deref()),+]
            }

            /// Value of a named column. Outer `None` means the column does not exist.
            pub fn value(&self, column: &str) -> Option<Option<&str>> {
                match column {
                    $(stringify!($field) => Some(self.$field.as_deref()),)+
                    _ => None,
                }
            }
        }
    };
}

fixture_event! {
    /// One normalized fixture row. Every column is nullable text.
    pub struct FixtureEvent {
        results_for_player_key,
        event_key,
        event_date,
        event_time,
        event_first_player,
        first_player_key,
        event_second_player,
        second_player_key,
        event_final_result,
        event_game_result,
        event_serve,
        event_winner,
        event_status,
        event_type_type,
        tournament_name,
        tournament_key,
        tournament_round,
        tournament_season,
        event_live,
        event_qualification,
        event_first_player_logo,
        event_second_player_logo,
    }
}

/// Parameters of one fixtures query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchRequest {
    pub date_start: NaiveDate,
    pub date_stop: NaiveDate,
    pub player_key: Option<String>,
}

impl FetchRequest {
    pub fn new(date_start: NaiveDate, date_stop: NaiveDate) -> Self {
        Self {
            date_start,
            date_stop,
            player_key: None,
        }
    }

    pub fn single_day(date: NaiveDate) -> Self {
        Self::new(date, date)
    }

    /// Attach a player filter. Blank keys are treated as no filter.
    pub fn with_player_key(mut self, player_key: impl Into<String>) -> Self {
        let key = player_key.into();
        let key = key.trim();
        self.player_key = if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        };
        self
    }

    pub fn player_key(&self) -> Option<&str> {
        self.player_key.as_deref()
    }

    pub fn date_start_str(&self) -> String {
        self.date_start.format(DATE_FORMAT).to_string()
    }

    pub fn date_stop_str(&self) -> String {
        self.date_stop.format(DATE_FORMAT).to_string()
    }

    pub fn validate(&self) -> Result<(), FetchFailure> {
        if self.date_start > self.date_stop {
            return Err(FetchFailure::InvalidRequest(format!(
                "date_start {} is after date_stop {}",
                self.date_start_str(),
                self.date_stop_str()
            )));
        }
        Ok(())
    }
}

/// Why a fetch produced no usable payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchFailure {
    #[error("server error (HTTP {status})")]
    ServerError { status: u16, body: String },
    #[error("HTTP error {status}")]
    HttpStatus { status: u16, body: String },
    #[error("response is not valid JSON: {0}")]
    MalformedBody(String),
    #[error("unexpected payload shape: {0}")]
    UnexpectedShape(String),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Three-way result of a fixtures query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Fixtures(Vec<FixtureEvent>),
    /// The query succeeded and matched nothing.
    Empty,
    Failed(FetchFailure),
}

/// Outcome of a bulk insert or of a full pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadResult {
    pub success: bool,
    pub message: String,
    pub rows_inserted: usize,
}

impl LoadResult {
    pub fn inserted(rows_inserted: usize, target: &str) -> Self {
        Self {
            success: true,
            message: format!("Successfully inserted {rows_inserted} rows into {target}"),
            rows_inserted,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            rows_inserted: 0,
        }
    }

    pub fn no_fixtures(date: NaiveDate) -> Self {
        Self::failed(format!("No fixtures found for {}", date.format(DATE_FORMAT)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, DATE_FORMAT).unwrap()
    }

    #[test]
    fn column_list_is_fixed_and_ordered() {
        assert_eq!(FIXTURE_COLUMNS.len(), FIXTURE_COLUMN_COUNT);
        assert_eq!(FIXTURE_COLUMNS[0], "results_for_player_key");
        assert_eq!(FIXTURE_COLUMNS[1], "event_key");
        assert_eq!(FIXTURE_COLUMNS[21], "event_second_player_logo");
        assert_eq!(FixtureEvent::default().values().len(), FIXTURE_COLUMNS.len());
    }

    #[test]
    fn from_fn_visits_columns_in_table_order() {
        let mut seen = Vec::new();
        let event = FixtureEvent::from_fn(|column| {
            seen.push(column);
            Some(column.to_uppercase())
        });
        assert_eq!(seen, FIXTURE_COLUMNS);
        assert_eq!(event.event_key.as_deref(), Some("EVENT_KEY"));
        assert_eq!(event.values()[2], Some("EVENT_DATE"));
    }

    #[test]
    fn value_lookup_distinguishes_unknown_column_from_null() {
        let event = FixtureEvent {
            event_key: Some("12345".into()),
            ..Default::default()
        };
        assert_eq!(event.value("event_key"), Some(Some("12345")));
        assert_eq!(event.value("event_winner"), Some(None));
        assert_eq!(event.value("not_a_column"), None);
    }

    #[test]
    fn serde_uses_column_names_and_null_for_absent() {
        let event = FixtureEvent {
            event_key: Some("1".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(&event).unwrap();
        let obj = json.as_object().unwrap();
        assert_eq!(obj.len(), FIXTURE_COLUMNS.len());
        assert_eq!(obj["event_key"], "1");
        assert!(obj["event_winner"].is_null());
    }

    #[test]
    fn blank_player_key_means_no_filter() {
        let req = FetchRequest::single_day(date("2026-01-18")).with_player_key("  ");
        assert_eq!(req.player_key(), None);
        let req = req.with_player_key("1905");
        assert_eq!(req.player_key(), Some("1905"));
        assert_eq!(req.date_start_str(), "2026-01-18");
    }

    #[test]
    fn reversed_range_is_rejected() {
        let req = FetchRequest::new(date("2026-01-20"), date("2026-01-18"));
        assert!(matches!(req.validate(), Err(FetchFailure::InvalidRequest(_))));
        assert!(FetchRequest::single_day(date("2026-01-18")).validate().is_ok());
    }

    #[test]
    fn no_fixtures_result_names_the_date() {
        let result = LoadResult::no_fixtures(date("2026-01-19"));
        assert!(!result.success);
        assert_eq!(result.rows_inserted, 0);
        assert_eq!(result.message, "No fixtures found for 2026-01-19");
    }
}
