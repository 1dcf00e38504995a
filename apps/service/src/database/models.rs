use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::monitoring::types::{ProbeErrorKind, ProbeOutcome};

/// Target model - a monitored HTTP(S) endpoint plus its last known result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: Uuid,
    pub url: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,

    /// Time of the last successful probe
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_probe_at: Option<DateTime<Utc>>,
    pub last_response_time_ms: Option<u64>,
    pub last_status_code: Option<u16>,

    /// Time of the most recent attempt, successful or not
    #[serde(with = "chrono::serde::ts_milliseconds_option")]
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Set when the most recent attempt failed
    pub last_error: Option<ProbeErrorKind>,
}

impl Target {
    /// Create a new, never probed target
    pub fn new(url: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            url,
            created_at: Utc::now(),
            last_probe_at: None,
            last_response_time_ms: None,
            last_status_code: None,
            last_attempt_at: None,
            last_error: None,
        }
    }

    /// Fold an outcome into the in-memory copy, mirroring what the store does
    ///
    /// A failure keeps the last known result and only records the attempt.
    pub fn apply_outcome(&mut self, outcome: &ProbeOutcome, at: DateTime<Utc>) {
        self.last_attempt_at = Some(at);
        if outcome.success {
            self.last_probe_at = Some(at);
            self.last_response_time_ms = Some(outcome.response_time_ms);
            self.last_status_code = outcome.http_status;
            self.last_error = None;
        } else {
            self.last_error = Some(outcome.error);
        }
    }

    /// Convert DateTime to Unix milliseconds
    pub fn timestamp_to_i64(time: DateTime<Utc>) -> i64 {
        time.timestamp_millis()
    }

    /// Convert Unix milliseconds to DateTime
    pub fn i64_to_timestamp(timestamp: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(timestamp).unwrap_or_default()
    }
}
