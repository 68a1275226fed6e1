use super::auth::{SessionCredentials, SessionProvider};
use super::payload::AvroPayloadDecoder;
use super::session::SubscriptionSession;
use crate::config::PubSubConfig;
use crate::error::retry::{with_retry, RetryConfig};
use crate::error::{CdcStreamError, Result};
use crate::models::TopicSchema;
use crate::source::adapter::{StreamingTransport, TransportConnector};
use std::sync::Arc;
use tracing::info;

/// Connects to the event bus and creates subscriptions
pub struct PubSubClient {
    transport: Option<Arc<dyn StreamingTransport>>,
    credentials: SessionCredentials,
    max_in_flight: u32,
}

impl PubSubClient {
    /// Log in through `provider` (retried per `retry`) and open a transport
    pub async fn connect(
        provider: &dyn SessionProvider,
        connector: &dyn TransportConnector,
        config: &PubSubConfig,
        retry: &RetryConfig,
    ) -> Result<Self> {
        info!("PubSub API: retrieving session...");
        let credentials = with_retry(retry, "login", || provider.login())
            .await
            .map_err(|e| {
                if matches!(e, CdcStreamError::Authentication(_)) {
                    e
                } else {
                    CdcStreamError::Authentication(e.to_string())
                }
            })?;

        info!("PubSub API: connecting to {}...", config.endpoint);
        let transport = connector.connect(&config.endpoint, &credentials).await?;

        Ok(Self {
            transport: Some(transport),
            credentials,
            max_in_flight: config.max_in_flight,
        })
    }

    pub fn credentials(&self) -> &SessionCredentials {
        &self.credentials
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    fn transport(&self) -> Result<&Arc<dyn StreamingTransport>> {
        self.transport
            .as_ref()
            .ok_or_else(|| CdcStreamError::Transport("Client is disconnected".to_string()))
    }

    pub async fn retrieve_topic_schema(&self, topic: &str) -> Result<TopicSchema> {
        info!("PubSub API: retrieving schema for topic {}...", topic);
        let schema_json = self.transport()?.topic_schema(topic).await?;
        TopicSchema::parse(&schema_json)
    }

    /// Create a session that stops after `event_count` events
    pub fn subscribe(
        &self,
        topic: &str,
        schema: Arc<TopicSchema>,
        event_count: u32,
    ) -> Result<SubscriptionSession> {
        let schema_json = schema.schema_json().ok_or_else(|| {
            CdcStreamError::SchemaResolution(format!(
                "Schema for {} carries no Avro definition",
                topic
            ))
        })?;
        let decoder = Arc::new(AvroPayloadDecoder::new(schema_json)?);

        let session = SubscriptionSession::new(
            self.transport()?.clone(),
            topic,
            schema,
            decoder,
            event_count,
        )?;
        Ok(session.with_max_in_flight(self.max_in_flight))
    }

    /// Shut the transport down. Repeated calls are no-ops.
    pub async fn disconnect(&mut self) -> Result<()> {
        if let Some(transport) = self.transport.take() {
            info!("PubSub API: disconnecting...");
            transport.shutdown().await?;
        }
        Ok(())
    }
}
