use crate::error::{CdcStreamError, Result};
use byteorder::{BigEndian, ByteOrder};
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;

/// Decoded payload: top-level field name to value
pub type Payload = Map<String, Value>;

/// Kind of record change carried by an event. Closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChangeType {
    Create,
    Update,
    Delete,
    Undelete,
    GapCreate,
    GapUpdate,
    GapDelete,
    GapUndelete,
    GapOverflow,
}

impl ChangeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeType::Create => "CREATE",
            ChangeType::Update => "UPDATE",
            ChangeType::Delete => "DELETE",
            ChangeType::Undelete => "UNDELETE",
            ChangeType::GapCreate => "GAP_CREATE",
            ChangeType::GapUpdate => "GAP_UPDATE",
            ChangeType::GapDelete => "GAP_DELETE",
            ChangeType::GapUndelete => "GAP_UNDELETE",
            ChangeType::GapOverflow => "GAP_OVERFLOW",
        }
    }

    /// Gap events signal that changes were not captured in full
    pub fn is_gap(&self) -> bool {
        matches!(
            self,
            ChangeType::GapCreate
                | ChangeType::GapUpdate
                | ChangeType::GapDelete
                | ChangeType::GapUndelete
                | ChangeType::GapOverflow
        )
    }
}

impl FromStr for ChangeType {
    type Err = CdcStreamError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "CREATE" => Ok(ChangeType::Create),
            "UPDATE" => Ok(ChangeType::Update),
            "DELETE" => Ok(ChangeType::Delete),
            "UNDELETE" => Ok(ChangeType::Undelete),
            "GAP_CREATE" => Ok(ChangeType::GapCreate),
            "GAP_UPDATE" => Ok(ChangeType::GapUpdate),
            "GAP_DELETE" => Ok(ChangeType::GapDelete),
            "GAP_UNDELETE" => Ok(ChangeType::GapUndelete),
            "GAP_OVERFLOW" => Ok(ChangeType::GapOverflow),
            other => Err(CdcStreamError::UnknownChangeType(other.to_string())),
        }
    }
}

impl fmt::Display for ChangeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Opaque position of an event within its topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReplayId(pub u64);

impl ReplayId {
    /// Decode a big-endian replay token. Exactly 8 bytes are accepted.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != 8 {
            return Err(CdcStreamError::ReplayTokenFormat(bytes.len()));
        }
        Ok(ReplayId(BigEndian::read_u64(bytes)))
    }

    pub fn to_bytes(self) -> [u8; 8] {
        let mut buf = [0u8; 8];
        BigEndian::write_u64(&mut buf, self.0);
        buf
    }
}

impl fmt::Display for ReplayId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeEventHeader {
    pub entity_name: String,
    pub record_ids: Vec<String>,
    pub change_type: ChangeType,
    pub change_origin: String,
    pub transaction_key: String,
    pub sequence_number: i32,
    /// Milliseconds since the epoch
    pub commit_timestamp: i64,
    pub commit_number: i64,
    pub commit_user: String,
    /// Expanded field names; treat as a set
    pub nulled_fields: Vec<String>,
    pub diff_fields: Vec<String>,
    pub changed_fields: Vec<String>,
}

impl ChangeEventHeader {
    pub fn commit_time(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.commit_timestamp).single()
    }
}

/// A fully decoded change event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    header: ChangeEventHeader,
    replay_id: ReplayId,
    payload: Payload,
}

impl Event {
    pub fn new(header: ChangeEventHeader, replay_id: ReplayId, payload: Payload) -> Self {
        Self {
            header,
            replay_id,
            payload,
        }
    }

    pub fn header(&self) -> &ChangeEventHeader {
        &self.header
    }

    pub fn replay_id(&self) -> ReplayId {
        self.replay_id
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn into_parts(self) -> (ChangeEventHeader, ReplayId, Payload) {
        (self.header, self.replay_id, self.payload)
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", Value::Object(self.payload.clone()))
    }
}
