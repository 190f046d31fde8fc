use std::env;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub control_host: String,
    pub control_port: u16,
    pub signaling_url: String,
    /// Name shown to other participants unless a join overrides it
    pub display_name: String,
    /// Expire relay requests still Pending after this long. Unset means wait forever.
    pub relay_request_timeout: Option<Duration>,
    /// Give up on an unanswered switch after this long. Unset means wait forever.
    pub switch_timeout: Option<Duration>,
    pub ping_interval: Duration,
    pub event_buffer: usize,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        Ok(Config {
            control_host: env::var("CONTROL_HOST").unwrap_or_else(|_| "127.0.0.1".to_string()),
            control_port: env::var("CONTROL_PORT")
                .unwrap_or_else(|_| "8090".to_string())
                .parse()
                .map_err(|_| ConfigError::InvalidPort)?,
            signaling_url: env::var("SIGNALING_URL")
                .map_err(|_| ConfigError::MissingSignalingUrl)?,
            display_name: env::var("DISPLAY_NAME").unwrap_or_else(|_| "Guest".to_string()),
            relay_request_timeout: optional_secs("RELAY_REQUEST_TIMEOUT_SECS")?,
            switch_timeout: optional_secs("SWITCH_TIMEOUT_SECS")?,
            ping_interval: optional_secs("PING_INTERVAL_SECS")?
                .filter(|d| !d.is_zero())
                .unwrap_or(Duration::from_secs(30)),
            event_buffer: env::var("EVENT_BUFFER")
                .unwrap_or_else(|_| "256".to_string())
                .parse()
                .unwrap_or(256),
        })
    }

    pub fn control_addr(&self) -> String {
        format!("{}:{}", self.control_host, self.control_port)
    }
}

fn optional_secs(key: &'static str) -> Result<Option<Duration>, ConfigError> {
    match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .map(|secs| Some(Duration::from_secs(secs)))
            .map_err(|_| ConfigError::InvalidDuration(key)),
        Err(_) => Ok(None),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid control port")]
    InvalidPort,
    #[error("SIGNALING_URL environment variable is required")]
    MissingSignalingUrl,
    #[error("{0} must be a whole number of seconds")]
    InvalidDuration(&'static str),
}
