use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::database::models::Target;
use crate::monitoring::state::CycleSnapshot;
use crate::monitoring::types::ProbeOutcome;

/// Bumped whenever the payload of an existing event changes shape
pub const EVENT_SCHEMA_VERSION: u32 = 1;

/// Events streamed to live subscribers
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerEvent {
    /// Sent to a fresh subscriber right after it attaches
    Connected {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
    },

    /// One probe finished
    UrlPinged {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
        target: Target,
        outcome: ProbeOutcome,
    },

    /// Scheduling snapshot, sent after every cycle and on attach
    IntervalStatus {
        #[serde(with = "chrono::serde::ts_milliseconds")]
        timestamp: DateTime<Utc>,
        #[serde(flatten)]
        status: CycleSnapshot,
    },
}

impl ServerEvent {
    pub fn connected() -> Self {
        ServerEvent::Connected { timestamp: Utc::now() }
    }

    pub fn url_pinged(target: Target, outcome: ProbeOutcome) -> Self {
        ServerEvent::UrlPinged { timestamp: Utc::now(), target, outcome }
    }

    pub fn interval_status(status: CycleSnapshot) -> Self {
        ServerEvent::IntervalStatus { timestamp: Utc::now(), status }
    }

    /// Event name used for stream framing
    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Connected { .. } => "connected",
            ServerEvent::UrlPinged { .. } => "url_pinged",
            ServerEvent::IntervalStatus { .. } => "interval_status",
        }
    }

    /// Serialize once into a frame that can be handed to every sink
    pub fn to_frame(&self) -> Result<EventFrame, serde_json::Error> {
        #[derive(Serialize)]
        struct Envelope<'a> {
            version: u32,
            #[serde(flatten)]
            event: &'a ServerEvent,
        }

        let data = serde_json::to_string(&Envelope { version: EVENT_SCHEMA_VERSION, event: self })?;
        Ok(EventFrame { name: self.name(), data: data.into() })
    }
}

/// A serialized event: name plus JSON payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventFrame {
    pub name: &'static str,
    pub data: Arc<str>,
}

impl EventFrame {
    /// Server-sent events wire format
    pub fn to_sse(&self) -> String {
        format!("event: {}\ndata: {}\n\n", self.name, self.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitoring::state::CycleState;
    use std::time::Duration;

    #[test]
    fn test_connected_frame() {
        let frame = ServerEvent::connected().to_frame().unwrap();
        assert_eq!(frame.name, "connected");

        let json: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(json["type"], "connected");
        assert_eq!(json["version"], EVENT_SCHEMA_VERSION);
        assert!(json["timestamp"].is_i64());
    }

    #[test]
    fn test_interval_status_is_flat() {
        let state = CycleState::new(Duration::from_millis(1000));
        let frame = ServerEvent::interval_status(state.snapshot()).to_frame().unwrap();

        let json: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(json["type"], "interval_status");
        assert_eq!(json["lastCycleStartedAt"], serde_json::Value::Null);
        assert!(json["nextCycleAt"].is_i64());
    }

    #[test]
    fn test_url_pinged_carries_target_and_outcome() {
        let target = Target::new("https://example.com".into());
        let outcome = ProbeOutcome::success(target.id, 200, 10);
        let frame = ServerEvent::url_pinged(target.clone(), outcome).to_frame().unwrap();

        let json: serde_json::Value = serde_json::from_str(&frame.data).unwrap();
        assert_eq!(json["type"], "url_pinged");
        assert_eq!(json["target"]["url"], "https://example.com");
        assert_eq!(json["outcome"]["targetId"], target.id.to_string());
        assert_eq!(json["outcome"]["httpStatus"], 200);
    }

    #[test]
    fn test_sse_framing() {
        let frame = EventFrame { name: "connected", data: "{\"a\":1}".into() };
        assert_eq!(frame.to_sse(), "event: connected\ndata: {\"a\":1}\n\n");
    }
}
