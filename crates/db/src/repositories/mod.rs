use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use mudey_core::domain::campaign::{
    Campaign, CampaignLink, Company, CompanyId, DeliveryStatus, LinkId,
};
use mudey_core::domain::request::{QuoteRequest, RequestId};

pub mod campaign;
pub mod delivery_log;
pub mod link;
pub mod memory;
pub mod request;

pub use campaign::SqlCampaignRepository;
pub use delivery_log::{DeliveryLogEntry, SqlDeliveryLogRepository};
pub use link::SqlCampaignLinkRepository;
pub use memory::{
    InMemoryCampaignLinkRepository, InMemoryCampaignRepository, InMemoryDeliveryLogRepository,
    InMemoryQuoteRequestRepository,
};
pub use request::SqlQuoteRequestRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
}

#[async_trait]
pub trait QuoteRequestRepository: Send + Sync {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<QuoteRequest>, RepositoryError>;
    async fn save(&self, request: QuoteRequest) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait CampaignRepository: Send + Sync {
    async fn find_company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError>;
    async fn save_company(&self, company: Company) -> Result<(), RepositoryError>;
    async fn save_campaign(&self, campaign: Campaign) -> Result<(), RepositoryError>;

    /// Campaigns active at `now` whose origin-state filter (if any) matches.
    async fn list_matching_campaigns(
        &self,
        origin_state: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Campaign>, RepositoryError>;
}

#[async_trait]
pub trait CampaignLinkRepository: Send + Sync {
    async fn find_by_id(&self, id: &LinkId) -> Result<Option<CampaignLink>, RepositoryError>;
    async fn save(&self, link: CampaignLink) -> Result<(), RepositoryError>;

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<CampaignLink>, RepositoryError>;

    /// Atomically claims up to `limit` deliverable links, oldest first.
    ///
    /// The `queued|failed -> sending` transition and the attempt increment
    /// happen inside the selection statement, so a claimed link is invisible
    /// to concurrent sweeps (optimistic lock on the status column).
    async fn claim_due(
        &self,
        limit: usize,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<CampaignLink>, RepositoryError>;

    async fn count_by_status(
        &self,
        status: DeliveryStatus,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait DeliveryLogRepository: Send + Sync {
    async fn append(&self, entry: delivery_log::DeliveryLogEntry) -> Result<(), RepositoryError>;

    async fn list_for_link(
        &self,
        link_id: &LinkId,
    ) -> Result<Vec<delivery_log::DeliveryLogEntry>, RepositoryError>;
}
