//! Domain core of the mudey lead pipeline.
//!
//! Everything here is deterministic and free of I/O: the intake state
//! machine, input validators, pricing floor rules, anti-spam guard
//! interfaces, audit events, and configuration. Network and persistence
//! adapters live in the sibling crates and depend on this one.
//!
//! # Safety principle
//!
//! The completion service is strictly an estimator. It never decides
//! whether a price is plausible: the deterministic floor in [`pricing`]
//! always has the last word, even over model output.

pub mod audit;
pub mod config;
pub mod domain;
pub mod errors;
pub mod guard;
pub mod intake;
pub mod pricing;
pub mod validate;

pub use domain::campaign::{
    Campaign, CampaignId, CampaignLink, Company, CompanyId, DeliveryStatus, ErrorClass, LinkId,
};
pub use domain::request::{
    Channel, ContactInfo, PriceRange, PropertyType, QuoteRequest, RequestId,
};
pub use domain::session::{
    CompletedIntake, InMemorySessionStore, IntakeSession, RequestDraft, SessionStore,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use intake::{AnswerInput, IntakeFlow, IntakeStep, TurnOutcome};
pub use pricing::{PriceEstimate, PricingPolicy};

// Re-exported so adapter crates share one chrono version surface.
pub use chrono;
