//! Fan-out notification layer: once a quote request is persisted and its
//! campaign links are queued, this crate gets the lead in front of the
//! matched companies.
//!
//! - **Dispatcher** (`dispatcher`) - batch sweep over deliverable links
//!   with per-record retry bookkeeping and a best-effort delivery log
//! - **Shortener** (`shortener`) - ordered cascade over independent URL
//!   shortening providers; fails closed when all of them are down
//! - **Email** (`email`) - provider-agnostic sender with per-provider
//!   config variants and ordered failover
//! - **Templates** (`templates`) - tera-rendered notification HTML
//!
//! The dispatcher is deliberately the only caller of the shortener: the
//! conversational path must never block on slow external providers.

pub mod dispatcher;
pub mod email;
pub mod shortener;
pub mod templates;

pub use dispatcher::{DispatchSummary, NotificationDispatcher, SenderIdentity};
pub use email::{EmailMessage, EmailReceipt, EmailSender, FailoverEmailSender, InMemoryEmailSender};
pub use shortener::{ShortenError, ShortenProvider, UrlShortener};
pub use templates::{lead_subject, render_lead_email, LeadEmailContext};
