use crate::config::Config;
use tracing::{info, warn};

/// Validates the configuration and provides warnings/suggestions
pub struct ConfigValidator {
    config: Config,
}

impl ConfigValidator {
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Validate the entire configuration
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::new();
        self.validate_pubsub(&mut report);
        self.validate_auth(&mut report);
        report
    }

    fn validate_pubsub(&self, report: &mut ValidationReport) {
        let pubsub = &self.config.pubsub;

        if !pubsub.topic_name.starts_with('/') {
            report.add_error(format!(
                "Topic '{}' must be a path such as /data/AccountChangeEvent",
                pubsub.topic_name
            ));
        }

        if !pubsub.endpoint.contains(':') {
            report.add_warning(format!(
                "Endpoint '{}' has no port; the transport default will be used",
                pubsub.endpoint
            ));
        }

        if pubsub.event_receive_limit > pubsub.max_in_flight {
            report.add_info(format!(
                "event_receive_limit {} exceeds max_in_flight {}; demand will be topped up as credit drains",
                pubsub.event_receive_limit, pubsub.max_in_flight
            ));
        }

        if pubsub.stall_timeout_secs.is_none() {
            report.add_info("No stall timeout configured; a silent stream waits forever".to_string());
        }
    }

    fn validate_auth(&self, report: &mut ValidationReport) {
        let auth = &self.config.auth;
        if !auth.instance_url.starts_with("https://") {
            report.add_warning(format!(
                "Instance URL '{}' is not https",
                auth.instance_url
            ));
        }
    }
}

#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub info: Vec<String>,
}

impl ValidationReport {
    fn new() -> Self {
        Self::default()
    }

    fn add_error(&mut self, error: String) {
        self.errors.push(error);
    }

    fn add_warning(&mut self, warning: String) {
        self.warnings.push(warning);
    }

    fn add_info(&mut self, info: String) {
        self.info.push(info);
    }

    /// Check if configuration is valid (no errors)
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// Print the validation report
    pub fn print(&self) {
        if !self.errors.is_empty() {
            warn!("Configuration validation errors:");
            for error in &self.errors {
                warn!("  ❌ {}", error);
            }
        }

        if !self.warnings.is_empty() {
            warn!("Configuration warnings:");
            for warning in &self.warnings {
                warn!("  ⚠️  {}", warning);
            }
        }

        if !self.info.is_empty() {
            info!("Configuration info:");
            for info in &self.info {
                info!("  ℹ️  {}", info);
            }
        }

        if self.is_valid() {
            info!("✅ Configuration validation passed");
        }
    }
}
