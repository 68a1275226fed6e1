use super::Config;
use crate::error::{CdcStreamError, Result};
use config::{Config as ConfigBuilder, Environment, File};
use std::env;
use std::path::Path;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Load from `CDCSTREAM_CONFIG` or the default file names, then apply
    /// environment overrides
    pub fn load() -> Result<Config> {
        match env::var("CDCSTREAM_CONFIG") {
            Ok(path) => Self::load_from_file(&path),
            Err(_) => {
                let default = ["config.yaml", "config.yml", "cdcstream.yaml", "cdcstream.yml"]
                    .into_iter()
                    .find(|file| Path::new(file).exists());
                Self::build(default)
            }
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &str) -> Result<Config> {
        if !Path::new(path).exists() {
            return Err(CdcStreamError::Config(format!(
                "Configuration file not found: {}",
                path
            )));
        }
        Self::build(Some(path))
    }

    fn build(path: Option<&str>) -> Result<Config> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = path {
            builder = builder.add_source(File::with_name(path));
        }

        // CDCSTREAM__PUBSUB__TOPIC_NAME=/data/X becomes pubsub.topic_name
        builder = builder.add_source(
            Environment::with_prefix("CDCSTREAM")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder
            .build()
            .map_err(|e| CdcStreamError::Config(format!("Failed to build config: {}", e)))?;

        let config: Config = config.try_deserialize().map_err(|e| {
            CdcStreamError::Config(format!("Failed to deserialize config: {}", e))
        })?;

        Self::validate(&config)?;

        Ok(config)
    }

    /// Mandatory settings check; all problems are reported together
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        let mandatory = [
            ("auth.access_token", &config.auth.access_token),
            ("auth.instance_url", &config.auth.instance_url),
            ("auth.org_id", &config.auth.org_id),
            ("pubsub.endpoint", &config.pubsub.endpoint),
            ("pubsub.topic_name", &config.pubsub.topic_name),
        ];
        for (key, value) in mandatory {
            if value.trim().is_empty() {
                errors.push(format!("Missing mandatory property: {}", key));
            }
        }

        if config.pubsub.event_receive_limit == 0 {
            errors.push("pubsub.event_receive_limit must be >= 1".to_string());
        }
        if config.pubsub.max_in_flight == 0 {
            errors.push("pubsub.max_in_flight must be >= 1".to_string());
        }
        if config.pubsub.stall_timeout_secs == Some(0) {
            errors.push("pubsub.stall_timeout_secs must be > 0 when set".to_string());
        }

        if !errors.is_empty() {
            return Err(CdcStreamError::Validation(errors.join(", ")));
        }

        Ok(())
    }

    /// Create a sample configuration file
    pub fn generate_sample() -> &'static str {
        r#"# cdcstream configuration
# Copy this file to config.yaml and adjust for your environment

app:
  name: cdcstream-dev
  # instance_id: auto  # Automatically generated if not specified

# Pre-issued session
auth:
  access_token: ${CDCSTREAM__AUTH__ACCESS_TOKEN}
  instance_url: https://example.my.salesforce.com
  org_id: 00D000000000000

# Event bus subscription
pubsub:
  endpoint: api.pubsub.salesforce.com:7443
  topic_name: /data/AccountChangeEvent
  event_receive_limit: 10
  max_in_flight: 100
  # stall_timeout_secs: 300

# Logging configuration
logging:
  level: info
  format: text  # text, json, or pretty

# Retry policy for login
retry:
  max_retries: 3
  initial_delay_ms: 1000
  max_delay_ms: 30000
  multiplier: 2.0
  jitter: true
"#
    }
}
