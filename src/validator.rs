use std::time::{Duration, Instant};

/// Result of the pure syntactic check. Never errors; malformed input is a
/// value, not an exception.
#[derive(Debug, Clone)]
pub struct UrlValidation {
    pub is_valid: bool,
    pub error: Option<String>,
}

impl UrlValidation {
    fn ok() -> Self {
        Self {
            is_valid: true,
            error: None,
        }
    }

    fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error: Some(message.into()),
        }
    }
}

/// Syntactic validation only: parseable, http(s) scheme, non-empty host.
/// No I/O; reachability is [`probe`]'s job.
pub fn validate(url: &str) -> UrlValidation {
    let parsed = match reqwest::Url::parse(url) {
        Ok(parsed) => parsed,
        Err(err) => return UrlValidation::invalid(format!("invalid URL: {err}")),
    };

    match parsed.scheme() {
        "http" | "https" => {}
        other => {
            return UrlValidation::invalid(format!(
                "unsupported scheme '{other}': only http and https are allowed"
            ));
        }
    }

    if parsed.host_str().map_or(true, str::is_empty) {
        return UrlValidation::invalid("URL has no host");
    }

    UrlValidation::ok()
}

#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub is_reachable: bool,
    pub latency_ms: Option<i64>,
    pub error: Option<String>,
    /// True when the failure was specifically the probe timeout elapsing.
    pub timed_out: bool,
}

/// Lightweight reachability probe: a HEAD request with a bounded timeout.
///
/// Any HTTP response counts as reachable, 4xx/5xx included: the host
/// answered, even if the application rejected the request. Only transport
/// failures (DNS, refused connection, timeout) are unreachable.
pub async fn probe(client: &reqwest::Client, url: &str, timeout: Duration) -> ProbeResult {
    let started = Instant::now();
    let result = client.head(url).timeout(timeout).send().await;
    let latency_ms = started.elapsed().as_millis() as i64;

    match result {
        Ok(_) => ProbeResult {
            is_reachable: true,
            latency_ms: Some(latency_ms),
            error: None,
            timed_out: false,
        },
        Err(err) => ProbeResult {
            is_reachable: false,
            latency_ms: None,
            error: Some(err.to_string()),
            timed_out: err.is_timeout(),
        },
    }
}
