use crate::source::DEFAULT_MAX_IN_FLIGHT;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PubSubConfig {
    /// Event bus endpoint, `host:port`
    pub endpoint: String,

    /// Topic to subscribe to, e.g. `/data/AccountChangeEvent`
    pub topic_name: String,

    /// Number of events to receive before the subscription completes
    #[serde(default = "default_event_receive_limit")]
    pub event_receive_limit: u32,

    /// Upper bound on events requested but not yet delivered
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: u32,

    /// Cancel the subscription after this long without progress
    #[serde(default)]
    pub stall_timeout_secs: Option<u64>,
}

fn default_event_receive_limit() -> u32 {
    1
}

fn default_max_in_flight() -> u32 {
    DEFAULT_MAX_IN_FLIGHT
}
