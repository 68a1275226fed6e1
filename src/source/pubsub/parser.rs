use super::header::{decode_header, CHANGE_EVENT_HEADER_KEY};
use super::payload::PayloadDecoder;
use crate::error::{CdcStreamError, Result};
use crate::models::{Event, ReplayId, TopicSchema};
use crate::source::adapter::RawEvent;
use serde_json::Value;
use std::sync::Arc;

/// Decodes wire items of one topic into [`Event`]s
#[derive(Clone)]
pub struct EventParser {
    schema: Arc<TopicSchema>,
    decoder: Arc<dyn PayloadDecoder>,
}

impl EventParser {
    pub fn new(schema: Arc<TopicSchema>, decoder: Arc<dyn PayloadDecoder>) -> Self {
        Self { schema, decoder }
    }

    pub fn schema(&self) -> &TopicSchema {
        &self.schema
    }

    /// Decode one wire item. Any failure is reported as a single
    /// [`CdcStreamError::Decode`] naming the item.
    pub fn parse(&self, raw: &RawEvent) -> Result<Event> {
        self.parse_inner(raw).map_err(|source| CdcStreamError::Decode {
            item: describe_item(raw),
            source: Box::new(source),
        })
    }

    fn parse_inner(&self, raw: &RawEvent) -> Result<Event> {
        let replay_id = ReplayId::from_bytes(&raw.replay_id)?;
        let payload = self.decoder.decode(&raw.payload)?;

        let header_record = payload
            .get(CHANGE_EVENT_HEADER_KEY)
            .and_then(Value::as_object)
            .ok_or_else(|| {
                CdcStreamError::PayloadDecode(format!(
                    "Payload has no '{}' record",
                    CHANGE_EVENT_HEADER_KEY
                ))
            })?;
        let header = decode_header(&self.schema, header_record)?;

        Ok(Event::new(header, replay_id, payload))
    }
}

fn describe_item(raw: &RawEvent) -> String {
    if !raw.id.is_empty() {
        format!("'{}'", raw.id)
    } else {
        format!("with replay token 0x{}", hex::encode(&raw.replay_id))
    }
}
