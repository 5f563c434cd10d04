mod config;
mod runner;

pub use config::DiagnosticsConfig;
pub use runner::{DiagnosticsRunner, RunnerError, score_report};
