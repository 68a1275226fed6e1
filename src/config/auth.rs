use serde::{Deserialize, Serialize};
use std::fmt;

/// A pre-issued session
#[derive(Clone, Deserialize, Serialize, Default)]
pub struct AuthConfig {
    #[serde(default)]
    pub access_token: String,

    #[serde(default)]
    pub instance_url: String,

    #[serde(default)]
    pub org_id: String,
}

impl fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthConfig")
            .field("access_token", &"<redacted>")
            .field("instance_url", &self.instance_url)
            .field("org_id", &self.org_id)
            .finish()
    }
}
