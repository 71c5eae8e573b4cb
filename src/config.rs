//! Provisioner Configuration
//!
//! Array connection settings loaded from YAML. Every field has a default so
//! a file only needs to name what differs; CLI flags override file values.

use crate::error::{Error, Result};
use crate::reconcile::poller::PollPolicy;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

/// Scope of a local array user
pub const LOCAL_USER_SCOPE: &str = "0";

// =============================================================================
// Readiness Polling
// =============================================================================

/// Readiness wait used after LUN and snapshot creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Maximum readiness checks
    pub attempts: u32,
    /// Milliseconds between readiness checks
    pub interval_ms: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            attempts: 10,
            interval_ms: 1000,
        }
    }
}

impl PollConfig {
    pub fn policy(&self) -> PollPolicy {
        PollPolicy {
            max_attempts: self.attempts,
            interval: Duration::from_millis(self.interval_ms),
        }
    }
}

// =============================================================================
// Array Connection
// =============================================================================

/// Connection settings for one dual-controller array
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArrayConfig {
    /// Management endpoints, one per controller, tried in order at login
    pub endpoints: Vec<String>,
    pub username: String,
    pub password: String,
    /// "0" for local users, "1" for LDAP users
    pub scope: String,
    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
    /// Transport-level retries of transient failures
    pub max_retries: u32,
    /// Verify the array's TLS certificate
    pub verify_tls: bool,
    /// Readiness polling
    pub poll: PollConfig,
}

impl Default for ArrayConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            username: String::new(),
            password: String::new(),
            scope: LOCAL_USER_SCOPE.to_string(),
            request_timeout_secs: 30,
            max_retries: 3,
            verify_tls: false,
            poll: PollConfig::default(),
        }
    }
}

impl fmt::Debug for ArrayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayConfig")
            .field("endpoints", &self.endpoints)
            .field("username", &self.username)
            .field("password", &"***")
            .field("scope", &self.scope)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("max_retries", &self.max_retries)
            .field("verify_tls", &self.verify_tls)
            .field("poll", &self.poll)
            .finish()
    }
}

impl ArrayConfig {
    /// Load from a YAML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::Configuration(format!("Cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&raw)
    }

    pub fn from_yaml(raw: &str) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(raw)?;
        config.normalize();
        Ok(config)
    }

    /// Strip trailing slashes so paths can be appended verbatim
    pub fn normalize(&mut self) {
        for endpoint in &mut self.endpoints {
            while endpoint.ends_with('/') {
                endpoint.pop();
            }
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check the settings needed to reach a real array
    pub fn validate(&self) -> Result<()> {
        if self.endpoints.is_empty() {
            return Err(Error::Configuration(
                "at least one management endpoint is required".into(),
            ));
        }
        if let Some(bad) = self
            .endpoints
            .iter()
            .find(|e| !(e.starts_with("https://") || e.starts_with("http://")))
        {
            return Err(Error::Configuration(format!(
                "endpoint must be an http(s) URL: {}",
                bad
            )));
        }
        if self.username.is_empty() {
            return Err(Error::Configuration("username is required".into()));
        }
        if self.poll.attempts == 0 {
            return Err(Error::Configuration("poll.attempts must be at least 1".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use std::io::Write;

    #[test]
    fn test_load_yaml_with_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "endpoints:\n  - https://192.0.2.10:8088/\n  - https://192.0.2.11:8088\nusername: admin\npassword: secret\npoll:\n  interval_ms: 250"
        )
        .unwrap();

        let config = ArrayConfig::load(file.path()).unwrap();
        assert_eq!(config.endpoints[0], "https://192.0.2.10:8088");
        assert_eq!(config.scope, LOCAL_USER_SCOPE);
        assert_eq!(config.max_retries, 3);
        assert_eq!(
            config.poll.policy(),
            PollPolicy {
                max_attempts: 10,
                interval: Duration::from_millis(250),
            }
        );
        config.validate().unwrap();
    }

    #[test]
    fn test_validate() {
        let config = ArrayConfig::default();
        assert_matches!(config.validate(), Err(Error::Configuration(_)));

        let config = ArrayConfig {
            endpoints: vec!["192.0.2.10:8088".into()],
            username: "admin".into(),
            ..Default::default()
        };
        assert_matches!(config.validate(), Err(Error::Configuration(_)));
    }

    #[test]
    fn test_debug_hides_password() {
        let config = ArrayConfig {
            username: "admin".into(),
            password: "s3cret".into(),
            ..Default::default()
        };
        let printed = format!("{:?}", config);
        assert!(printed.contains("admin"));
        assert!(!printed.contains("s3cret"));
    }

    #[test]
    fn test_missing_file() {
        assert_matches!(
            ArrayConfig::load("/nonexistent/dorado.yaml"),
            Err(Error::Configuration(_))
        );
    }

    #[test]
    fn test_default_poll_matches_policy_default() {
        assert_eq!(PollConfig::default().policy(), PollPolicy::default());
    }
}
