use crate::error::Result;
use crate::models::TopicSchema;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use super::pubsub::auth::SessionCredentials;

/// Server-side ceiling on events requested per fetch
pub const DEFAULT_MAX_IN_FLIGHT: u32 = 100;

/// One event as delivered on the wire
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawEvent {
    /// Server-assigned event id, may be empty
    pub id: String,
    pub schema_id: String,
    /// Big-endian replay token
    pub replay_id: Bytes,
    /// Avro binary payload
    pub payload: Bytes,
}

/// A batch of events in server delivery order
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FetchBatch {
    pub events: Vec<RawEvent>,
    pub latest_replay_id: Option<Bytes>,
    /// Events the server still owes on outstanding requests
    pub pending_num_requested: Option<u32>,
    pub rpc_id: String,
}

impl FetchBatch {
    pub fn new(events: Vec<RawEvent>) -> Self {
        Self {
            events,
            ..Default::default()
        }
    }

    /// Empty batches keep the stream alive and carry no events
    pub fn is_keepalive(&self) -> bool {
        self.events.is_empty()
    }
}

/// Demand sent to the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub topic_name: String,
    pub num_requested: u32,
}

/// An open server-streamed subscription
#[async_trait]
pub trait FetchStream: Send {
    /// Resolves once the stream accepts demand
    async fn ready(&mut self) -> Result<()>;

    async fn send_demand(&mut self, request: FetchRequest) -> Result<()>;

    /// Next batch in delivery order; `None` once the server ends the stream
    async fn next_batch(&mut self) -> Option<Result<FetchBatch>>;

    /// Close the stream. Closing an already closed stream is a no-op.
    async fn close(&mut self) -> Result<()>;
}

/// The streaming RPC surface the subscription runs against
#[async_trait]
pub trait StreamingTransport: Send + Sync {
    /// Avro JSON schema of the events published on `topic`
    async fn topic_schema(&self, topic: &str) -> Result<String>;

    async fn open(&self, topic: &str, schema: &TopicSchema) -> Result<Box<dyn FetchStream>>;

    /// Largest number of events that may be requested but undelivered
    fn max_in_flight(&self) -> u32 {
        DEFAULT_MAX_IN_FLIGHT
    }

    /// Release the underlying channel
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}

/// Establishes a transport to an endpoint with the given credentials
#[async_trait]
pub trait TransportConnector: Send + Sync {
    async fn connect(
        &self,
        endpoint: &str,
        credentials: &SessionCredentials,
    ) -> Result<Arc<dyn StreamingTransport>>;
}
