#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    pub request_timeout_ms: u64,
    /// Ceiling on a single backoff sleep, whatever the endpoint policy says.
    pub max_backoff_ms: u64,
    /// Stored response bodies are clamped to this many characters.
    pub response_excerpt_max: usize,
}

impl DispatcherConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("RELAY_REQUEST_TIMEOUT_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.request_timeout_ms = parsed.max(1);
        }
        if let Ok(value) = std::env::var("RELAY_MAX_BACKOFF_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.max_backoff_ms = parsed.max(1);
        }
        if let Ok(value) = std::env::var("RELAY_RESPONSE_EXCERPT_MAX")
            && let Ok(parsed) = value.parse::<usize>()
        {
            config.response_excerpt_max = parsed;
        }

        config
    }
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: 30_000,
            max_backoff_ms: 600_000,
            response_excerpt_max: 1_000,
        }
    }
}
