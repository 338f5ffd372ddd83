pub mod config;
pub mod models;
pub mod notifier;
pub mod report;
pub mod service;
pub mod steps;
pub mod validation;
pub mod workflow;

#[cfg(test)]
pub(crate) mod testing;

pub use config::{AppConfig, ConfigError, MailSettings};
pub use models::*;
pub use service::{AppState, build_router, create_app};
pub use workflow::{DocumentControlWorkflow, WizardAction, WizardError, create_flow_runner};
