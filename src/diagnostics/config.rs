/// Thresholds and weights for the diagnostic battery and the health score.
/// The weights are tunable rather than contractual; the defaults favour the
/// categories that actually break deliveries.
#[derive(Debug, Clone)]
pub struct DiagnosticsConfig {
    pub probe_timeout_ms: u64,
    /// How many recent attempts feed the reliability check.
    pub recent_window: i64,
    /// Failure-rate band: above `fail` fails the check, above `warn` warns.
    pub failure_rate_warn: f64,
    pub failure_rate_fail: f64,
    /// Average response time bands, in milliseconds.
    pub response_time_warn_ms: f64,
    pub response_time_fail_ms: f64,
    /// Health score weights; should sum to 1.0.
    pub weight_connectivity: f64,
    pub weight_authentication: f64,
    pub weight_reliability: f64,
    pub weight_performance: f64,
}

impl DiagnosticsConfig {
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("RELAY_PROBE_TIMEOUT_MS")
            && let Ok(parsed) = value.parse::<u64>()
        {
            config.probe_timeout_ms = parsed.max(1);
        }
        if let Ok(value) = std::env::var("RELAY_DIAG_RECENT_WINDOW")
            && let Ok(parsed) = value.parse::<i64>()
        {
            config.recent_window = parsed.max(1);
        }
        if let Ok(value) = std::env::var("RELAY_DIAG_FAILURE_RATE_WARN")
            && let Ok(parsed) = value.parse::<f64>()
        {
            config.failure_rate_warn = parsed;
        }
        if let Ok(value) = std::env::var("RELAY_DIAG_FAILURE_RATE_FAIL")
            && let Ok(parsed) = value.parse::<f64>()
        {
            config.failure_rate_fail = parsed;
        }
        if let Ok(value) = std::env::var("RELAY_DIAG_RESPONSE_WARN_MS")
            && let Ok(parsed) = value.parse::<f64>()
        {
            config.response_time_warn_ms = parsed;
        }
        if let Ok(value) = std::env::var("RELAY_DIAG_RESPONSE_FAIL_MS")
            && let Ok(parsed) = value.parse::<f64>()
        {
            config.response_time_fail_ms = parsed;
        }

        config
    }
}

impl Default for DiagnosticsConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: 10_000,
            recent_window: 20,
            failure_rate_warn: 0.1,
            failure_rate_fail: 0.5,
            response_time_warn_ms: 2_000.0,
            response_time_fail_ms: 5_000.0,
            weight_connectivity: 0.30,
            weight_authentication: 0.20,
            weight_reliability: 0.30,
            weight_performance: 0.20,
        }
    }
}
