//! Delivery of digests and alerts.
//!
//! This crate provides:
//! - `Notifier` trait for pluggable notification channels
//! - Webhook, email and GitHub issue channels
//! - Minijinja rendering for the daily digest and E2E failure reports
//! - `Broadcaster` that fans one notification out to every channel

pub mod broadcast;
pub mod email;
pub mod github;
pub mod templating;
pub mod traits;
pub mod webhook;

pub use broadcast::Broadcaster;
pub use email::EmailNotifier;
pub use github::GithubIssueNotifier;
pub use templating::{DigestContext, E2eIssueContext, TemplateRenderer};
pub use traits::{DeliveryResult, Notification, Notifier, NotifyError};
pub use webhook::WebhookNotifier;
