pub mod retry;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CdcStreamError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Authentication error: {0}")]
    Authentication(String),

    /// A union shape or field reference could not be resolved against the schema
    #[error("Schema resolution error: {0}")]
    SchemaResolution(String),

    /// Malformed hex in a field bitmap
    #[error("Bitmap format error: {0}")]
    BitmapFormat(String),

    #[error("Unknown change type: {0}")]
    UnknownChangeType(String),

    #[error("Replay token format error: expected 8 bytes, got {0}")]
    ReplayTokenFormat(usize),

    #[error("Payload decode error: {0}")]
    PayloadDecode(String),

    #[error("Transport error: {0}")]
    Transport(String),

    /// A wire item failed to decode; `item` identifies it within its batch
    #[error("Failed to decode event {item}: {source}")]
    Decode {
        item: String,
        #[source]
        source: Box<CdcStreamError>,
    },

    #[error("Channel send error")]
    ChannelSend,

    #[error("Channel receive error")]
    ChannelReceive,
}

impl CdcStreamError {
    /// Short, stable label used for metrics
    pub fn kind(&self) -> &'static str {
        match self {
            CdcStreamError::Config(_) => "config",
            CdcStreamError::Validation(_) => "validation",
            CdcStreamError::Io(_) => "io",
            CdcStreamError::Serialization(_) => "serialization",
            CdcStreamError::Yaml(_) => "yaml",
            CdcStreamError::Authentication(_) => "authentication",
            CdcStreamError::SchemaResolution(_) => "schema_resolution",
            CdcStreamError::BitmapFormat(_) => "bitmap_format",
            CdcStreamError::UnknownChangeType(_) => "unknown_change_type",
            CdcStreamError::ReplayTokenFormat(_) => "replay_token_format",
            CdcStreamError::PayloadDecode(_) => "payload_decode",
            CdcStreamError::Transport(_) => "transport",
            CdcStreamError::Decode { source, .. } => source.kind(),
            CdcStreamError::ChannelSend => "channel_send",
            CdcStreamError::ChannelReceive => "channel_receive",
        }
    }

    /// Whether this error was raised while decoding a single event
    pub fn is_decode_error(&self) -> bool {
        matches!(
            self,
            CdcStreamError::Decode { .. }
                | CdcStreamError::SchemaResolution(_)
                | CdcStreamError::BitmapFormat(_)
                | CdcStreamError::UnknownChangeType(_)
                | CdcStreamError::ReplayTokenFormat(_)
                | CdcStreamError::PayloadDecode(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, CdcStreamError>;
