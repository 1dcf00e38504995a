use std::time::{Duration, Instant};

use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::types::{ProbeErrorKind, ProbeOutcome};

/// Prober trait - one reachability check against one target
///
/// Implementations never fail: transport problems are reported through the
/// returned outcome. There are no retries, a failed probe is simply picked up
/// again on the next cycle.
#[async_trait::async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target_id: Uuid, url: &str, deadline: Duration) -> ProbeOutcome;
}

/// HTTP/HTTPS prober issuing a single GET
pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pulseboard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait::async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target_id: Uuid, url: &str, deadline: Duration) -> ProbeOutcome {
        let start = Instant::now();

        // reqwest gets the deadline too so the connection is torn down on its side,
        // the outer timeout is what guarantees we return on time
        let request = self.client.get(url).timeout(deadline).send();
        let result = timeout(deadline, request).await;

        let response_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(response)) => {
                let status = response.status().as_u16();
                info!(%target_id, url, status, response_time_ms, "Probe succeeded");
                ProbeOutcome::success(target_id, status, response_time_ms)
            }
            Ok(Err(e)) => {
                let kind = classify_error(&e);
                warn!(%target_id, url, error = %kind, response_time_ms, "Probe failed: {}", e);
                ProbeOutcome::failure(target_id, kind, response_time_ms, e.to_string())
            }
            Err(_) => {
                warn!(%target_id, url, response_time_ms, "Probe timed out");
                ProbeOutcome::failure(
                    target_id,
                    ProbeErrorKind::Timeout,
                    response_time_ms,
                    "Request timed out",
                )
            }
        }
    }
}

/// Map a reqwest failure onto the outcome taxonomy
fn classify_error(error: &reqwest::Error) -> ProbeErrorKind {
    if error.is_timeout() {
        ProbeErrorKind::Timeout
    } else if error.is_builder() {
        // The request never left: malformed URL, unsupported scheme...
        ProbeErrorKind::Other
    } else if error.is_connect() || error.is_request() || error.is_redirect() || error.is_body() {
        ProbeErrorKind::Network
    } else {
        debug!("Unclassified probe error: {:?}", error);
        ProbeErrorKind::Other
    }
}
