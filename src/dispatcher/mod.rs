mod config;
mod engine;

pub use config::DispatcherConfig;
pub use engine::{DispatchError, Dispatcher, WebhookEvent, backoff_delay, build_client};
