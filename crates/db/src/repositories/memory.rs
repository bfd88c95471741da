use std::collections::HashMap;

use tokio::sync::RwLock;

use mudey_core::chrono::{DateTime, Utc};
use mudey_core::domain::campaign::{
    Campaign, CampaignLink, Company, CompanyId, DeliveryStatus, ErrorClass, LinkId,
};
use mudey_core::domain::request::{QuoteRequest, RequestId};

use super::delivery_log::DeliveryLogEntry;
use super::{
    CampaignLinkRepository, CampaignRepository, DeliveryLogRepository, QuoteRequestRepository,
    RepositoryError,
};

#[derive(Default)]
pub struct InMemoryQuoteRequestRepository {
    requests: RwLock<HashMap<String, QuoteRequest>>,
}

#[async_trait::async_trait]
impl QuoteRequestRepository for InMemoryQuoteRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<QuoteRequest>, RepositoryError> {
        let requests = self.requests.read().await;
        Ok(requests.get(&id.0).cloned())
    }

    async fn save(&self, request: QuoteRequest) -> Result<(), RepositoryError> {
        let mut requests = self.requests.write().await;
        requests.insert(request.id.0.clone(), request);
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryCampaignRepository {
    companies: RwLock<HashMap<String, Company>>,
    campaigns: RwLock<Vec<Campaign>>,
}

#[async_trait::async_trait]
impl CampaignRepository for InMemoryCampaignRepository {
    async fn find_company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let companies = self.companies.read().await;
        Ok(companies.get(&id.0).cloned())
    }

    async fn save_company(&self, company: Company) -> Result<(), RepositoryError> {
        let mut companies = self.companies.write().await;
        companies.insert(company.id.0.clone(), company);
        Ok(())
    }

    async fn save_campaign(&self, campaign: Campaign) -> Result<(), RepositoryError> {
        let mut campaigns = self.campaigns.write().await;
        campaigns.retain(|existing| existing.id != campaign.id);
        campaigns.push(campaign);
        Ok(())
    }

    async fn list_matching_campaigns(
        &self,
        origin_state: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Campaign>, RepositoryError> {
        let campaigns = self.campaigns.read().await;
        Ok(campaigns.iter().filter(|campaign| campaign.matches(origin_state, now)).cloned().collect())
    }
}

#[derive(Default)]
pub struct InMemoryCampaignLinkRepository {
    links: RwLock<HashMap<String, CampaignLink>>,
}

impl InMemoryCampaignLinkRepository {
    pub async fn all(&self) -> Vec<CampaignLink> {
        self.links.read().await.values().cloned().collect()
    }
}

#[async_trait::async_trait]
impl CampaignLinkRepository for InMemoryCampaignLinkRepository {
    async fn find_by_id(&self, id: &LinkId) -> Result<Option<CampaignLink>, RepositoryError> {
        let links = self.links.read().await;
        Ok(links.get(&id.0).cloned())
    }

    async fn save(&self, link: CampaignLink) -> Result<(), RepositoryError> {
        let mut links = self.links.write().await;
        links.insert(link.id.0.clone(), link);
        Ok(())
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<CampaignLink>, RepositoryError> {
        let links = self.links.read().await;
        let mut matching: Vec<CampaignLink> =
            links.values().filter(|link| link.request_id == *request_id).cloned().collect();
        matching.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(matching)
    }

    async fn claim_due(
        &self,
        limit: usize,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<CampaignLink>, RepositoryError> {
        let mut links = self.links.write().await;

        let mut due: Vec<(DateTime<Utc>, String)> = links
            .values()
            .filter(|link| match link.status {
                DeliveryStatus::Queued => true,
                DeliveryStatus::Failed => {
                    link.attempts < max_attempts
                        && link.error_class != Some(ErrorClass::Terminal)
                }
                _ => false,
            })
            .map(|link| (link.created_at, link.id.0.clone()))
            .collect();
        due.sort();
        due.truncate(limit);

        let mut claimed = Vec::with_capacity(due.len());
        for (_, id) in due {
            if let Some(link) = links.get_mut(&id) {
                link.status = DeliveryStatus::Sending;
                link.attempts += 1;
                link.updated_at = now;
                claimed.push(link.clone());
            }
        }
        Ok(claimed)
    }

    async fn count_by_status(&self, status: DeliveryStatus) -> Result<u64, RepositoryError> {
        let links = self.links.read().await;
        Ok(links.values().filter(|link| link.status == status).count() as u64)
    }
}

#[derive(Default)]
pub struct InMemoryDeliveryLogRepository {
    entries: RwLock<Vec<DeliveryLogEntry>>,
}

impl InMemoryDeliveryLogRepository {
    pub async fn entries(&self) -> Vec<DeliveryLogEntry> {
        self.entries.read().await.clone()
    }
}

#[async_trait::async_trait]
impl DeliveryLogRepository for InMemoryDeliveryLogRepository {
    async fn append(&self, entry: DeliveryLogEntry) -> Result<(), RepositoryError> {
        let mut entries = self.entries.write().await;
        entries.push(entry);
        Ok(())
    }

    async fn list_for_link(
        &self,
        link_id: &LinkId,
    ) -> Result<Vec<DeliveryLogEntry>, RepositoryError> {
        let entries = self.entries.read().await;
        Ok(entries.iter().filter(|entry| entry.link_id == *link_id).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use mudey_core::domain::campaign::{
        Campaign, CampaignId, CampaignLink, CompanyId, DeliveryStatus, LinkId,
    };
    use mudey_core::domain::request::RequestId;

    use super::InMemoryCampaignLinkRepository;
    use crate::repositories::CampaignLinkRepository;

    fn link(id: &str, age_minutes: i64) -> CampaignLink {
        let mut link = CampaignLink::new(
            RequestId("R-1".to_string()),
            &Campaign {
                id: CampaignId("CP-1".to_string()),
                company_id: CompanyId("CO-1".to_string()),
                starts_at: Utc::now() - Duration::days(1),
                ends_at: None,
                origin_state: None,
                active: true,
            },
            Utc::now() - Duration::minutes(age_minutes),
        );
        link.id = LinkId(id.to_string());
        link
    }

    #[tokio::test]
    async fn in_memory_claim_mirrors_sql_semantics() {
        let repo = InMemoryCampaignLinkRepository::default();
        repo.save(link("L-old", 30)).await.expect("save");
        repo.save(link("L-new", 5)).await.expect("save");

        let claimed = repo.claim_due(1, 3, Utc::now()).await.expect("claim");
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id.0, "L-old");
        assert_eq!(claimed[0].status, DeliveryStatus::Sending);
        assert_eq!(claimed[0].attempts, 1);

        let second = repo.claim_due(5, 3, Utc::now()).await.expect("claim rest");
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].id.0, "L-new");
    }
}
