#![forbid(unsafe_code)]
#![warn(
    unreachable_pub,
    clippy::all,
    clippy::pedantic,
    rustdoc::broken_intra_doc_links,
    missing_docs
)]

//! Swarmhub application wiring.
//!
//! Layout: `config.rs` (environment settings), `bootstrap.rs` (service
//! wiring), `orchestrator.rs` (workflow over engine and notifier),
//! `webhook.rs` (completion callback).

/// Application bootstrap.
pub mod bootstrap;
/// Environment-driven configuration.
pub mod config;
/// Application error type.
pub mod error;
/// Workflow orchestration over the engine and the notifier.
pub mod orchestrator;
/// Completion web-hook client.
pub mod webhook;

pub use bootstrap::{BootstrapDependencies, run_app, run_app_with};
pub use config::{AppConfig, ConfigError};
pub use error::{AppError, AppResult};
pub use orchestrator::TorrentOrchestrator;
pub use webhook::{COMPLETION_STATE, CompletionHook, CompletionPayload};
