use crate::config::AuthConfig;
use crate::error::{CdcStreamError, Result};
use async_trait::async_trait;
use tracing::debug;

/// Session established by a login
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCredentials {
    pub access_token: String,
    pub instance_url: String,
    pub org_id: String,
}

impl SessionCredentials {
    /// Headers attached to every request on the transport
    pub fn metadata(&self) -> Vec<(&'static str, String)> {
        vec![
            ("accesstoken", self.access_token.clone()),
            ("instanceurl", self.instance_url.clone()),
            ("tenantid", self.org_id.clone()),
        ]
    }
}

/// Produces session credentials. Failures are reported as
/// [`CdcStreamError::Authentication`].
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn login(&self) -> Result<SessionCredentials>;
}

/// Hands out a pre-issued session
pub struct StaticSessionProvider {
    credentials: SessionCredentials,
}

impl StaticSessionProvider {
    pub fn new(credentials: SessionCredentials) -> Self {
        Self { credentials }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(SessionCredentials {
            access_token: config.access_token.clone(),
            instance_url: config.instance_url.clone(),
            org_id: config.org_id.clone(),
        })
    }
}

#[async_trait]
impl SessionProvider for StaticSessionProvider {
    async fn login(&self) -> Result<SessionCredentials> {
        if self.credentials.access_token.is_empty() {
            return Err(CdcStreamError::Authentication(
                "No access token configured".to_string(),
            ));
        }
        debug!("Using pre-issued session for org {}", self.credentials.org_id);
        Ok(self.credentials.clone())
    }
}
