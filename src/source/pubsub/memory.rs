//! In-process transport.
//!
//! Topics are registered with their schema and fed through a [`TopicFeed`];
//! one subscriber per topic receives whatever was fed, in order. Captured
//! streams can be loaded from a YAML file and replayed through it.

use super::auth::SessionCredentials;
use crate::error::{CdcStreamError, Result};
use crate::models::TopicSchema;
use crate::source::adapter::{
    FetchBatch, FetchRequest, FetchStream, RawEvent, StreamingTransport, TransportConnector,
    DEFAULT_MAX_IN_FLIGHT,
};
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{debug, info};

#[derive(Debug)]
enum FeedMessage {
    Batch(FetchBatch),
    Error(String),
    End,
}

struct TopicState {
    schema_json: String,
    sender: mpsc::UnboundedSender<FeedMessage>,
    receiver: Option<mpsc::UnboundedReceiver<FeedMessage>>,
}

#[derive(Default)]
struct Shared {
    topics: Mutex<HashMap<String, TopicState>>,
    demands: Mutex<Vec<FetchRequest>>,
    credentials: Mutex<Option<SessionCredentials>>,
    streams_closed: AtomicUsize,
    shutdowns: AtomicUsize,
}

#[derive(Clone)]
pub struct MemoryTransport {
    shared: Arc<Shared>,
    max_in_flight: u32,
}

impl Default for MemoryTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryTransport {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared::default()),
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }

    pub fn with_max_in_flight(mut self, max_in_flight: u32) -> Self {
        self.max_in_flight = max_in_flight;
        self
    }

    /// Register `topic` and return the feed that publishes to it
    pub fn register_topic(&self, topic: &str, schema_json: impl Into<String>) -> TopicFeed {
        let (sender, receiver) = mpsc::unbounded_channel();
        let state = TopicState {
            schema_json: schema_json.into(),
            sender: sender.clone(),
            receiver: Some(receiver),
        };
        lock(&self.shared.topics).insert(topic.to_string(), state);
        TopicFeed { sender }
    }

    /// Build a transport that replays a captured stream, ending it afterwards
    pub fn from_capture(capture: &Capture) -> Result<Self> {
        let transport = Self::new();
        let feed = transport.register_topic(&capture.topic, capture.schema.clone());
        for batch in &capture.batches {
            feed.send_batch(batch.to_fetch_batch()?)?;
        }
        feed.end()?;
        info!(
            "Loaded capture of {} batches for {}",
            capture.batches.len(),
            capture.topic
        );
        Ok(transport)
    }

    /// Every demand sent so far, in order
    pub fn demands(&self) -> Vec<FetchRequest> {
        lock(&self.shared.demands).clone()
    }

    pub fn streams_closed(&self) -> usize {
        self.shared.streams_closed.load(Ordering::SeqCst)
    }

    pub fn shutdowns(&self) -> usize {
        self.shared.shutdowns.load(Ordering::SeqCst)
    }

    /// Credentials presented by the last connect
    pub fn credentials(&self) -> Option<SessionCredentials> {
        lock(&self.shared.credentials).clone()
    }
}

#[async_trait]
impl StreamingTransport for MemoryTransport {
    async fn topic_schema(&self, topic: &str) -> Result<String> {
        lock(&self.shared.topics)
            .get(topic)
            .map(|state| state.schema_json.clone())
            .ok_or_else(|| CdcStreamError::Transport(format!("Unknown topic '{}'", topic)))
    }

    async fn open(&self, topic: &str, _schema: &TopicSchema) -> Result<Box<dyn FetchStream>> {
        let receiver = lock(&self.shared.topics)
            .get_mut(topic)
            .ok_or_else(|| CdcStreamError::Transport(format!("Unknown topic '{}'", topic)))?
            .receiver
            .take()
            .ok_or_else(|| {
                CdcStreamError::Transport(format!("Topic '{}' already has a subscriber", topic))
            })?;

        debug!("Opened in-memory stream for {}", topic);
        Ok(Box::new(MemoryStream {
            receiver,
            shared: self.shared.clone(),
            closed: false,
        }))
    }

    fn max_in_flight(&self) -> u32 {
        self.max_in_flight
    }

    async fn shutdown(&self) -> Result<()> {
        self.shared.shutdowns.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[async_trait]
impl TransportConnector for MemoryTransport {
    async fn connect(
        &self,
        endpoint: &str,
        credentials: &SessionCredentials,
    ) -> Result<Arc<dyn StreamingTransport>> {
        debug!("In-memory transport standing in for {}", endpoint);
        *lock(&self.shared.credentials) = Some(credentials.clone());
        Ok(Arc::new(self.clone()))
    }
}

/// Publishing side of a registered topic
#[derive(Clone)]
pub struct TopicFeed {
    sender: mpsc::UnboundedSender<FeedMessage>,
}

impl TopicFeed {
    pub fn send_batch(&self, batch: FetchBatch) -> Result<()> {
        self.send(FeedMessage::Batch(batch))
    }

    pub fn send_events(&self, events: Vec<RawEvent>) -> Result<()> {
        self.send_batch(FetchBatch::new(events))
    }

    /// Deliver a transport error to the subscriber
    pub fn fail(&self, message: impl Into<String>) -> Result<()> {
        self.send(FeedMessage::Error(message.into()))
    }

    /// Signal end of stream
    pub fn end(&self) -> Result<()> {
        self.send(FeedMessage::End)
    }

    fn send(&self, message: FeedMessage) -> Result<()> {
        self.sender
            .send(message)
            .map_err(|_| CdcStreamError::ChannelSend)
    }
}

struct MemoryStream {
    receiver: mpsc::UnboundedReceiver<FeedMessage>,
    shared: Arc<Shared>,
    closed: bool,
}

#[async_trait]
impl FetchStream for MemoryStream {
    async fn ready(&mut self) -> Result<()> {
        if self.closed {
            return Err(CdcStreamError::Transport("Stream is closed".to_string()));
        }
        Ok(())
    }

    async fn send_demand(&mut self, request: FetchRequest) -> Result<()> {
        if self.closed {
            return Err(CdcStreamError::Transport("Stream is closed".to_string()));
        }
        lock(&self.shared.demands).push(request);
        Ok(())
    }

    async fn next_batch(&mut self) -> Option<Result<FetchBatch>> {
        if self.closed {
            return None;
        }
        match self.receiver.recv().await {
            Some(FeedMessage::Batch(batch)) => Some(Ok(batch)),
            Some(FeedMessage::Error(message)) => Some(Err(CdcStreamError::Transport(message))),
            Some(FeedMessage::End) | None => None,
        }
    }

    async fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.closed = true;
            self.receiver.close();
            self.shared.streams_closed.fetch_add(1, Ordering::SeqCst);
        }
        Ok(())
    }
}

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A recorded stream: the topic schema plus batches of hex-encoded items
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Capture {
    pub topic: String,
    /// Avro JSON schema text
    pub schema: String,
    #[serde(default)]
    pub batches: Vec<CaptureBatch>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureBatch {
    #[serde(default)]
    pub events: Vec<CaptureEvent>,
    #[serde(default)]
    pub pending_num_requested: Option<u32>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CaptureEvent {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub schema_id: String,
    /// Hex-encoded replay token
    pub replay_id: String,
    /// Hex-encoded Avro payload
    pub payload: String,
}

impl Capture {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_yaml::from_str(&content)?)
    }
}

impl CaptureBatch {
    fn to_fetch_batch(&self) -> Result<FetchBatch> {
        let events = self
            .events
            .iter()
            .map(CaptureEvent::to_raw_event)
            .collect::<Result<Vec<_>>>()?;
        Ok(FetchBatch {
            latest_replay_id: events.last().map(|e| e.replay_id.clone()),
            events,
            pending_num_requested: self.pending_num_requested,
            rpc_id: String::new(),
        })
    }
}

impl CaptureEvent {
    fn to_raw_event(&self) -> Result<RawEvent> {
        Ok(RawEvent {
            id: self.id.clone(),
            schema_id: self.schema_id.clone(),
            replay_id: Bytes::from(decode_hex("replay_id", &self.replay_id)?),
            payload: Bytes::from(decode_hex("payload", &self.payload)?),
        })
    }
}

fn decode_hex(field: &str, value: &str) -> Result<Vec<u8>> {
    hex::decode(value.trim())
        .map_err(|e| CdcStreamError::Validation(format!("Capture {} is not hex: {}", field, e)))
}
