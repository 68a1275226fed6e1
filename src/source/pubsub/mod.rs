pub mod auth;
pub mod bitmap;
pub mod client;
pub mod handler;
pub mod header;
pub mod memory;
pub mod parser;
pub mod payload;
pub mod session;

pub use auth::{SessionCredentials, SessionProvider, StaticSessionProvider};
pub use client::PubSubClient;
pub use handler::{EventHandler, LoggingHandler};
pub use memory::{Capture, CaptureBatch, CaptureEvent, MemoryTransport, TopicFeed};
pub use parser::EventParser;
pub use payload::{AvroPayloadDecoder, PayloadDecoder};
pub use session::{
    CompletionReason, FetchRunState, SessionOutcome, SessionProgress, SessionState,
    SubscriptionHandle, SubscriptionSession,
};
