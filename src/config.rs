//! Configuration types for the call core

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration for a [`CallSession`](crate::CallSession)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// STUN server URLs (at least one required; no TURN relay, by scope)
    pub stun_servers: Vec<String>,

    /// ICE candidate pool size hint passed to the peer connection
    pub ice_candidate_pool_size: u8,

    /// Length of the generated meeting code (lowercase alphanumeric)
    pub meeting_code_length: usize,

    /// Upper bound on the ICE-gathering wait before a negotiation step
    /// fails, in seconds. Without a bound an unreachable network would
    /// hang offer generation forever.
    pub gather_timeout_secs: u64,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            stun_servers: vec![
                "stun:stun.l.google.com:19302".to_string(),
                "stun:stun1.l.google.com:19302".to_string(),
            ],
            ice_candidate_pool_size: 10,
            meeting_code_length: 10,
            gather_timeout_secs: 15,
        }
    }
}

impl CallConfig {
    /// Validate configuration parameters
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `stun_servers` is empty or contains a non-`stun:` URL
    /// - `meeting_code_length` is not in range 4-32
    /// - `gather_timeout_secs` is not in range 1-120
    pub fn validate(&self) -> crate::Result<()> {
        use crate::Error;

        if self.stun_servers.is_empty() {
            return Err(Error::InvalidConfig(
                "At least one STUN server is required".to_string(),
            ));
        }

        for url in &self.stun_servers {
            if !url.starts_with("stun:") {
                return Err(Error::InvalidConfig(format!(
                    "STUN server URL must start with stun:, got {}",
                    url
                )));
            }
        }

        if self.meeting_code_length < 4 || self.meeting_code_length > 32 {
            return Err(Error::InvalidConfig(format!(
                "meeting_code_length must be in range 4-32, got {}",
                self.meeting_code_length
            )));
        }

        if self.gather_timeout_secs == 0 || self.gather_timeout_secs > 120 {
            return Err(Error::InvalidConfig(format!(
                "gather_timeout_secs must be in range 1-120, got {}",
                self.gather_timeout_secs
            )));
        }

        Ok(())
    }

    /// ICE-gathering wait bound as a [`Duration`]
    pub fn gather_timeout(&self) -> Duration {
        Duration::from_secs(self.gather_timeout_secs)
    }

    /// Replace the STUN server list
    ///
    /// Useful for chaining on `CallConfig::default()`.
    pub fn with_stun_servers(mut self, stun_servers: Vec<String>) -> Self {
        self.stun_servers = stun_servers;
        self
    }

    /// Set the ICE-gathering timeout
    ///
    /// Useful for chaining on `CallConfig::default()`.
    pub fn with_gather_timeout_secs(mut self, secs: u64) -> Self {
        self.gather_timeout_secs = secs;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = CallConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.ice_candidate_pool_size, 10);
        assert_eq!(config.meeting_code_length, 10);
    }

    #[test]
    fn test_empty_stun_servers_fails() {
        let mut config = CallConfig::default();
        config.stun_servers.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_non_stun_url_fails() {
        let mut config = CallConfig::default();
        config.stun_servers = vec!["turn:relay.example.com:3478".to_string()];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_meeting_code_length_fails() {
        let mut config = CallConfig::default();
        config.meeting_code_length = 3;
        assert!(config.validate().is_err());

        config.meeting_code_length = 33;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_invalid_gather_timeout_fails() {
        let mut config = CallConfig::default();
        config.gather_timeout_secs = 0;
        assert!(config.validate().is_err());

        config.gather_timeout_secs = 121;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_builder_chain() {
        let config = CallConfig::default()
            .with_stun_servers(vec!["stun:stun.example.com:3478".to_string()])
            .with_gather_timeout_secs(5);
        assert!(config.validate().is_ok());
        assert_eq!(config.stun_servers.len(), 1);
        assert_eq!(config.gather_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_config_serialization() {
        let config = CallConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: CallConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.stun_servers, deserialized.stun_servers);
        assert_eq!(config.gather_timeout_secs, deserialized.gather_timeout_secs);
    }
}
