use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Classification of a failed probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeErrorKind {
    None,
    Timeout,
    Network,
    Other,
}

impl ProbeErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeErrorKind::None => "none",
            ProbeErrorKind::Timeout => "timeout",
            ProbeErrorKind::Network => "network",
            ProbeErrorKind::Other => "other",
        }
    }

    /// Parse the persisted form; unknown values map to `Other`
    pub fn from_db(value: &str) -> Self {
        match value {
            "none" => ProbeErrorKind::None,
            "timeout" => ProbeErrorKind::Timeout,
            "network" => ProbeErrorKind::Network,
            _ => ProbeErrorKind::Other,
        }
    }
}

impl std::fmt::Display for ProbeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of a single probe
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeOutcome {
    /// ID of the target that was probed
    pub target_id: Uuid,

    /// True whenever the target answered with a status code, 2xx or not
    pub success: bool,

    /// HTTP status code (if a response arrived)
    pub http_status: Option<u16>,

    /// Wall-clock time from call start to outcome, populated on failure too
    pub response_time_ms: u64,

    pub error: ProbeErrorKind,

    /// Human readable failure detail
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl ProbeOutcome {
    pub fn success(target_id: Uuid, http_status: u16, response_time_ms: u64) -> Self {
        Self {
            target_id,
            success: true,
            http_status: Some(http_status),
            response_time_ms,
            error: ProbeErrorKind::None,
            detail: None,
        }
    }

    pub fn failure(
        target_id: Uuid,
        error: ProbeErrorKind,
        response_time_ms: u64,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            target_id,
            success: false,
            http_status: None,
            response_time_ms,
            error,
            detail: Some(detail.into()),
        }
    }
}
