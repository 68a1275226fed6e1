use crate::error::retry::RetryConfig;
use serde::{Deserialize, Serialize};

mod auth;
mod loader;
mod logging;
mod pubsub;
mod validation;

pub use auth::*;
pub use loader::*;
pub use logging::*;
pub use pubsub::*;
pub use validation::*;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Application metadata
    #[serde(default)]
    pub app: AppConfig,

    /// Session credentials
    pub auth: AuthConfig,

    /// Event bus endpoint and subscription settings
    pub pubsub: PubSubConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Retry policy for credential acquisition
    #[serde(default)]
    pub retry: RetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default = "default_instance_id")]
    pub instance_id: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            instance_id: default_instance_id(),
        }
    }
}

fn default_name() -> String {
    "cdcstream".to_string()
}

fn default_instance_id() -> String {
    uuid::Uuid::new_v4().to_string()
}
