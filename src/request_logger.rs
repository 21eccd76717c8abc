use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A record of one request sent to DHIS2, and what came back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestLogEntry {
    pub domain: String,
    pub method: String,
    pub url: String,
    pub payload: Value,
    /// `None` if no response was received.
    pub response_status: Option<u16>,
    pub response_body: Option<String>,
    pub error: Option<String>,
    pub timestamp: String,
}

impl RequestLogEntry {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
            && self
                .response_status
                .is_some_and(|status| (200..300).contains(&status))
    }
}

/// Receives a [`RequestLogEntry`] for every request sent, so that administrators can review what
/// was sent to DHIS2 and why it failed.
pub trait RequestLogger {
    fn log_request(&self, entry: RequestLogEntry);
}

pub(crate) struct NoopRequestLogger;
impl RequestLogger for NoopRequestLogger {
    fn log_request(&self, _entry: RequestLogEntry) {}
}

impl<T: Fn(RequestLogEntry)> RequestLogger for T {
    fn log_request(&self, entry: RequestLogEntry) {
        self(entry);
    }
}
