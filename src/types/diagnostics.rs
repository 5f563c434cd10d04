use serde::{Deserialize, Serialize};
use specta::Type;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticCategory {
    Connectivity,
    Authentication,
    Performance,
    Reliability,
}

impl DiagnosticCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connectivity => "connectivity",
            Self::Authentication => "authentication",
            Self::Performance => "performance",
            Self::Reliability => "reliability",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStatus {
    Pending,
    Running,
    Passed,
    Warning,
    Failed,
}

/// One executed check from the diagnostic battery.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct DiagnosticTest {
    pub id: String,
    pub category: DiagnosticCategory,
    pub name: String,
    pub description: String,
    pub status: DiagnosticStatus,
    pub result: Option<String>,
    pub error: Option<String>,
    pub duration_ms: Option<i64>,
    pub suggestions: Vec<String>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Type)]
pub struct DiagnosticSummary {
    pub passed: u32,
    pub warnings: u32,
    pub failed: u32,
    pub total: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "snake_case")]
pub enum EndpointHealth {
    Healthy,
    Warning,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct DiagnosticReport {
    pub endpoint_id: Uuid,
    pub tests: Vec<DiagnosticTest>,
    pub summary: DiagnosticSummary,
    pub overall: EndpointHealth,
    /// Deduplicated remediation suggestions from all non-passing tests.
    pub recommendations: Vec<String>,
    pub generated_at: String,
}

/// One weighted component of the health score, 0-100 before weighting.
#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct HealthFactor {
    pub category: DiagnosticCategory,
    pub score: f64,
    pub weight: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
pub enum HealthGrade {
    A,
    B,
    C,
    D,
    F,
}

#[derive(Debug, Clone, Serialize, Deserialize, Type)]
pub struct HealthScore {
    pub endpoint_id: Uuid,
    /// Weighted composite, 0-100.
    pub score: f64,
    pub grade: HealthGrade,
    pub factors: Vec<HealthFactor>,
}
