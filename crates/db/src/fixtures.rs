use mudey_core::chrono::{Duration, Utc};
use mudey_core::domain::campaign::{Campaign, CampaignId, Company, CompanyId};

use crate::repositories::{CampaignRepository, RepositoryError, SqlCampaignRepository};
use crate::DbPool;

/// Outcome of seeding the demo dataset.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SeedResult {
    pub companies: usize,
    pub campaigns: usize,
}

/// Deterministic demo companies and campaigns for local runs and smoke
/// checks: two statewide SP campaigns, one RJ campaign, one nationwide
/// campaign, and one inactive company that must never receive leads.
pub async fn seed_demo_dataset(pool: &DbPool) -> Result<SeedResult, RepositoryError> {
    let repo = SqlCampaignRepository::new(pool.clone());
    let now = Utc::now();

    let companies = [
        ("CO-ANDORINHA", "Mudanças Andorinha", Some("leads@andorinha.example.com")),
        ("CO-HORIZONTE", "Transportes Horizonte", Some("contato@horizonte.example.com")),
        ("CO-GUANABARA", "Fretes Guanabara", Some("comercial@guanabara.example.com")),
        ("CO-NACIONAL", "Nacional Cargas", Some("leads@nacionalcargas.example.com")),
        ("CO-PARADA", "Parada Certa", None),
    ];

    for (id, name, contact_email) in &companies {
        repo.save_company(Company {
            id: CompanyId((*id).to_string()),
            name: (*name).to_string(),
            contact_email: contact_email.map(str::to_string),
            created_at: now,
        })
        .await?;
    }

    let campaigns = [
        ("CP-ANDORINHA-SP", "CO-ANDORINHA", Some("SP"), true),
        ("CP-HORIZONTE-SP", "CO-HORIZONTE", Some("SP"), true),
        ("CP-GUANABARA-RJ", "CO-GUANABARA", Some("RJ"), true),
        ("CP-NACIONAL", "CO-NACIONAL", None, true),
        ("CP-PARADA", "CO-PARADA", None, false),
    ];

    for (id, company_id, origin_state, active) in &campaigns {
        repo.save_campaign(Campaign {
            id: CampaignId((*id).to_string()),
            company_id: CompanyId((*company_id).to_string()),
            starts_at: now - Duration::days(7),
            ends_at: None,
            origin_state: origin_state.map(str::to_string),
            active: *active,
        })
        .await?;
    }

    Ok(SeedResult { companies: companies.len(), campaigns: campaigns.len() })
}
