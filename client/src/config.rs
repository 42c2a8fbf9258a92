use crate::network::REQUEST_TIMEOUT;
use std::time::Duration;

/// Delays between consecutive hash checks
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PollTiming {
    /// After a successful check, changed or not
    pub success: Duration,
    /// After a network or server error
    pub error: Duration,
}

impl Default for PollTiming {
    fn default() -> Self {
        Self {
            success: Duration::from_millis(500),
            error: Duration::from_millis(1000),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClientConfig {
    /// Base URL of the game server, e.g. `http://127.0.0.1:8000`
    pub server: String,
    pub game_tag: String,
    pub timing: PollTiming,
    /// How long a failed submission keeps the error indicator lit
    pub error_flash: Duration,
    /// Push config mode changes to the server as soon as they are made
    pub auto_update_mode: bool,
    /// Longest any single request may take before it counts as a network error
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(server: &str, game_tag: &str) -> Self {
        Self {
            server: server.to_string(),
            game_tag: game_tag.to_string(),
            timing: PollTiming::default(),
            error_flash: Duration::from_secs(1),
            auto_update_mode: true,
            request_timeout: REQUEST_TIMEOUT,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_timing() {
        let timing = PollTiming::default();
        assert_eq!(timing.success, Duration::from_millis(500));
        assert_eq!(timing.error, Duration::from_millis(1000));
        assert!(timing.error > timing.success);
    }

    #[test]
    fn test_client_config_defaults() {
        let config = ClientConfig::new("http://127.0.0.1:8000", "brave-lunar-wolf");
        assert_eq!(config.error_flash, Duration::from_secs(1));
        assert!(config.auto_update_mode);
        assert_eq!(config.timing, PollTiming::default());
        assert!(config.request_timeout > config.timing.error);
    }
}
