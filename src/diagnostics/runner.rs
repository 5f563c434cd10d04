use std::time::Instant;

use chrono::{SecondsFormat, Utc};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::diagnostics::DiagnosticsConfig;
use crate::history;
use crate::registry;
use crate::signer;
use crate::types::{
    DeliveryStatus, DiagnosticCategory, DiagnosticReport, DiagnosticStatus, DiagnosticSummary,
    DiagnosticTest, EndpointHealth, HealthFactor, HealthGrade, HealthScore, WebhookEndpoint,
};
use crate::validator::{self, ProbeResult};

#[derive(Debug, Error)]
pub enum RunnerError {
    #[error("database error: {0}")]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    NotFound(String),
    #[error("storage error: {0}")]
    Store(String),
}

impl From<registry::StoreError> for RunnerError {
    fn from(err: registry::StoreError) -> Self {
        match err {
            registry::StoreError::Db(db) => Self::Db(db),
            registry::StoreError::NotFound(message) => Self::NotFound(message),
            registry::StoreError::Validation(message) | registry::StoreError::Parse(message) => {
                Self::Store(message)
            }
        }
    }
}

impl From<history::StoreError> for RunnerError {
    fn from(err: history::StoreError) -> Self {
        match err {
            history::StoreError::Db(db) => Self::Db(db),
            history::StoreError::NotFound(message) => Self::NotFound(message),
            history::StoreError::Parse(message) => Self::Store(message),
        }
    }
}

/// Executes the fixed diagnostic battery against one endpoint and derives
/// the weighted health score from the results.
#[derive(Clone)]
pub struct DiagnosticsRunner {
    pool: SqlitePool,
    client: reqwest::Client,
    config: DiagnosticsConfig,
}

impl DiagnosticsRunner {
    pub fn new(pool: SqlitePool, client: reqwest::Client, config: DiagnosticsConfig) -> Self {
        Self {
            pool,
            client,
            config,
        }
    }

    /// Runs the suite in its fixed order: connectivity, authentication,
    /// reliability, performance.
    pub async fn run_report(&self, endpoint_id: Uuid) -> Result<DiagnosticReport, RunnerError> {
        let endpoint = registry::get_endpoint(&self.pool, endpoint_id).await?;

        let (connectivity, probe) = self.connectivity_test(&endpoint).await;
        let authentication = authentication_test(&endpoint);
        let reliability = self.reliability_test(&endpoint).await?;
        let performance = self.performance_test(&endpoint, probe.as_ref()).await?;

        let tests = vec![connectivity, authentication, reliability, performance];
        let (summary, overall, recommendations) = summarize(&tests);

        info!(
            endpoint_id = %endpoint_id,
            passed = summary.passed,
            warnings = summary.warnings,
            failed = summary.failed,
            "diagnostics completed"
        );

        Ok(DiagnosticReport {
            endpoint_id,
            tests,
            summary,
            overall,
            recommendations,
            generated_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        })
    }

    pub async fn health_score(&self, endpoint_id: Uuid) -> Result<HealthScore, RunnerError> {
        let report = self.run_report(endpoint_id).await?;
        Ok(score_report(&report, &self.config))
    }

    /// One-off reachability probe for a URL that may not belong to any
    /// stored endpoint.
    pub async fn probe_url(&self, url: &str) -> ProbeResult {
        validator::probe(
            &self.client,
            url,
            std::time::Duration::from_millis(self.config.probe_timeout_ms),
        )
        .await
    }

    async fn connectivity_test(
        &self,
        endpoint: &WebhookEndpoint,
    ) -> (DiagnosticTest, Option<ProbeResult>) {
        let started = Instant::now();
        let mut test = DiagnosticTest {
            id: "connectivity".to_string(),
            category: DiagnosticCategory::Connectivity,
            name: "Endpoint reachability".to_string(),
            description: "URL syntax check and HTTP reachability probe".to_string(),
            status: DiagnosticStatus::Running,
            result: None,
            error: None,
            duration_ms: None,
            suggestions: Vec::new(),
        };

        let syntax = validator::validate(&endpoint.target_url);
        if !syntax.is_valid {
            test.status = DiagnosticStatus::Failed;
            test.error = syntax.error;
            test.suggestions
                .push("Fix the endpoint URL; it must be http(s) with a host".to_string());
            test.duration_ms = Some(started.elapsed().as_millis() as i64);
            return (test, None);
        }

        let probe = validator::probe(
            &self.client,
            &endpoint.target_url,
            std::time::Duration::from_millis(self.config.probe_timeout_ms),
        )
        .await;

        if probe.is_reachable {
            test.status = DiagnosticStatus::Passed;
            test.result = Some(match probe.latency_ms {
                Some(latency) => format!("host responded in {latency}ms"),
                None => "host responded".to_string(),
            });
        } else {
            test.status = DiagnosticStatus::Failed;
            test.error = probe.error.clone();
            test.suggestions
                .push("Check that the endpoint server is running and reachable".to_string());
            if probe.timed_out {
                test.suggestions.push("Increase timeout".to_string());
            }
        }

        test.duration_ms = Some(started.elapsed().as_millis() as i64);
        (test, Some(probe))
    }

    async fn reliability_test(
        &self,
        endpoint: &WebhookEndpoint,
    ) -> Result<DiagnosticTest, RunnerError> {
        let started = Instant::now();
        let attempts =
            history::list_attempts(&self.pool, endpoint.id, self.config.recent_window).await?;

        let mut test = DiagnosticTest {
            id: "reliability".to_string(),
            category: DiagnosticCategory::Reliability,
            name: "Recent delivery failure rate".to_string(),
            description: format!(
                "Failure rate over the last {} delivery attempts",
                self.config.recent_window
            ),
            status: DiagnosticStatus::Passed,
            result: None,
            error: None,
            duration_ms: None,
            suggestions: Vec::new(),
        };

        if attempts.is_empty() {
            test.result = Some("no recent delivery attempts".to_string());
            test.duration_ms = Some(started.elapsed().as_millis() as i64);
            return Ok(test);
        }

        let failures = attempts
            .iter()
            .filter(|attempt| attempt.status != DeliveryStatus::Delivered)
            .count();
        let rate = failures as f64 / attempts.len() as f64;
        test.result = Some(format!(
            "{:.0}% of the last {} attempts failed",
            rate * 100.0,
            attempts.len()
        ));

        if rate > self.config.failure_rate_fail {
            test.status = DiagnosticStatus::Failed;
            test.suggestions
                .push("Check endpoint server logs".to_string());
            test.suggestions
                .push("Retry failed deliveries once the target is fixed".to_string());
        } else if rate >= self.config.failure_rate_warn {
            test.status = DiagnosticStatus::Warning;
            test.suggestions
                .push("Check endpoint server logs".to_string());
        }

        test.duration_ms = Some(started.elapsed().as_millis() as i64);
        Ok(test)
    }

    async fn performance_test(
        &self,
        endpoint: &WebhookEndpoint,
        probe: Option<&ProbeResult>,
    ) -> Result<DiagnosticTest, RunnerError> {
        let started = Instant::now();
        let mut test = DiagnosticTest {
            id: "performance".to_string(),
            category: DiagnosticCategory::Performance,
            name: "Response time".to_string(),
            description: "Average delivery response time against fixed thresholds".to_string(),
            status: DiagnosticStatus::Passed,
            result: None,
            error: None,
            duration_ms: None,
            suggestions: Vec::new(),
        };

        if probe.is_some_and(|probe| probe.timed_out) {
            test.status = DiagnosticStatus::Failed;
            test.error = Some("reachability probe timed out".to_string());
            test.suggestions.push("Increase timeout".to_string());
            test.duration_ms = Some(started.elapsed().as_millis() as i64);
            return Ok(test);
        }

        let stats = history::stats(&self.pool, Some(endpoint.id)).await?;
        let average = stats
            .average_response_time_ms
            .or_else(|| probe.and_then(|probe| probe.latency_ms).map(|ms| ms as f64));

        match average {
            Some(average) => {
                test.result = Some(format!("average response time {average:.0}ms"));
                if average > self.config.response_time_fail_ms {
                    test.status = DiagnosticStatus::Failed;
                    test.suggestions.push("Increase timeout".to_string());
                    test.suggestions
                        .push("Investigate endpoint response time".to_string());
                } else if average > self.config.response_time_warn_ms {
                    test.status = DiagnosticStatus::Warning;
                    test.suggestions
                        .push("Investigate endpoint response time".to_string());
                }
            }
            None => {
                test.result = Some("no response time data yet".to_string());
            }
        }

        test.duration_ms = Some(started.elapsed().as_millis() as i64);
        Ok(test)
    }
}

/// Sign/verify round-trip over a fixed sample payload. The engine never
/// receives webhooks, so this is the only consumer of [`signer::verify`].
fn authentication_test(endpoint: &WebhookEndpoint) -> DiagnosticTest {
    let started = Instant::now();
    let mut test = DiagnosticTest {
        id: "authentication".to_string(),
        category: DiagnosticCategory::Authentication,
        name: "Signature round-trip".to_string(),
        description: "HMAC signing consistency for the configured secret".to_string(),
        status: DiagnosticStatus::Passed,
        result: None,
        error: None,
        duration_ms: None,
        suggestions: Vec::new(),
    };

    match endpoint.secret.as_deref() {
        Some(secret) => {
            let sample = br#"{"event":"webhook.test","data":{"probe":true}}"#;
            let signature = signer::sign(sample, secret);
            if signer::verify(sample, &signature, secret) {
                test.result = Some("signature round-trip verified".to_string());
            } else {
                test.status = DiagnosticStatus::Failed;
                test.error = Some("signature verification mismatch".to_string());
                test.suggestions.push("Rotate secret".to_string());
            }
        }
        None => {
            // Informational, not a failure: unsigned webhooks are a valid
            // configuration.
            test.result = Some("no secret configured, signature disabled".to_string());
        }
    }

    test.duration_ms = Some(started.elapsed().as_millis() as i64);
    test
}

fn summarize(tests: &[DiagnosticTest]) -> (DiagnosticSummary, EndpointHealth, Vec<String>) {
    let mut summary = DiagnosticSummary::default();
    let mut recommendations: Vec<String> = Vec::new();

    for test in tests {
        summary.total += 1;
        match test.status {
            DiagnosticStatus::Passed => summary.passed += 1,
            DiagnosticStatus::Warning => summary.warnings += 1,
            DiagnosticStatus::Failed => summary.failed += 1,
            DiagnosticStatus::Pending | DiagnosticStatus::Running => {}
        }
        for suggestion in &test.suggestions {
            if !recommendations.contains(suggestion) {
                recommendations.push(suggestion.clone());
            }
        }
    }

    let overall = if summary.failed > 0 {
        EndpointHealth::Unhealthy
    } else if summary.warnings > 0 {
        EndpointHealth::Warning
    } else {
        EndpointHealth::Healthy
    };

    (summary, overall, recommendations)
}

/// Maps each category's outcome to 0-100 and combines them through the
/// configured weights.
pub fn score_report(report: &DiagnosticReport, config: &DiagnosticsConfig) -> HealthScore {
    let factors: Vec<HealthFactor> = [
        (DiagnosticCategory::Connectivity, config.weight_connectivity),
        (
            DiagnosticCategory::Authentication,
            config.weight_authentication,
        ),
        (DiagnosticCategory::Reliability, config.weight_reliability),
        (DiagnosticCategory::Performance, config.weight_performance),
    ]
    .into_iter()
    .map(|(category, weight)| HealthFactor {
        category,
        score: category_score(report, category),
        weight,
    })
    .collect();

    let score = factors
        .iter()
        .map(|factor| factor.score * factor.weight)
        .sum::<f64>()
        .clamp(0.0, 100.0);

    HealthScore {
        endpoint_id: report.endpoint_id,
        score,
        grade: grade_for(score),
        factors,
    }
}

fn category_score(report: &DiagnosticReport, category: DiagnosticCategory) -> f64 {
    report
        .tests
        .iter()
        .filter(|test| test.category == category)
        .map(|test| factor_score(test.status))
        .fold(None, |worst: Option<f64>, score| {
            Some(worst.map_or(score, |worst| worst.min(score)))
        })
        .unwrap_or(0.0)
}

fn factor_score(status: DiagnosticStatus) -> f64 {
    match status {
        DiagnosticStatus::Passed => 100.0,
        DiagnosticStatus::Warning => 60.0,
        DiagnosticStatus::Failed | DiagnosticStatus::Pending | DiagnosticStatus::Running => 0.0,
    }
}

fn grade_for(score: f64) -> HealthGrade {
    if score >= 90.0 {
        HealthGrade::A
    } else if score >= 75.0 {
        HealthGrade::B
    } else if score >= 60.0 {
        HealthGrade::C
    } else if score >= 40.0 {
        HealthGrade::D
    } else {
        HealthGrade::F
    }
}
