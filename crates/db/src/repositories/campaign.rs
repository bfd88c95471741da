use mudey_core::chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use mudey_core::domain::campaign::{Campaign, CampaignId, Company, CompanyId};

use super::request::{parse_optional_timestamp, parse_timestamp};
use super::{CampaignRepository, RepositoryError};
use crate::DbPool;

pub struct SqlCampaignRepository {
    pool: DbPool,
}

impl SqlCampaignRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CampaignRepository for SqlCampaignRepository {
    async fn find_company(&self, id: &CompanyId) -> Result<Option<Company>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, name, contact_email, created_at
             FROM company
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(company_from_row).transpose()
    }

    async fn save_company(&self, company: Company) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO company (id, name, contact_email, created_at)
             VALUES (?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                contact_email = excluded.contact_email",
        )
        .bind(&company.id.0)
        .bind(&company.name)
        .bind(company.contact_email.as_deref())
        .bind(company.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn save_campaign(&self, campaign: Campaign) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO campaign (id, company_id, starts_at, ends_at, origin_state, active)
             VALUES (?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                company_id = excluded.company_id,
                starts_at = excluded.starts_at,
                ends_at = excluded.ends_at,
                origin_state = excluded.origin_state,
                active = excluded.active",
        )
        .bind(&campaign.id.0)
        .bind(&campaign.company_id.0)
        .bind(campaign.starts_at.to_rfc3339())
        .bind(campaign.ends_at.map(|value| value.to_rfc3339()))
        .bind(campaign.origin_state.as_deref())
        .bind(i64::from(campaign.active))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_matching_campaigns(
        &self,
        origin_state: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Vec<Campaign>, RepositoryError> {
        let now_text = now.to_rfc3339();
        let rows = sqlx::query(
            "SELECT id, company_id, starts_at, ends_at, origin_state, active
             FROM campaign
             WHERE active = 1
               AND starts_at <= ?
               AND (ends_at IS NULL OR ends_at >= ?)
               AND (origin_state IS NULL OR origin_state = ?)
             ORDER BY starts_at ASC",
        )
        .bind(&now_text)
        .bind(&now_text)
        .bind(origin_state.map(str::to_uppercase))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(campaign_from_row).collect()
    }
}

fn company_from_row(row: SqliteRow) -> Result<Company, RepositoryError> {
    Ok(Company {
        id: CompanyId(row.try_get("id")?),
        name: row.try_get("name")?,
        contact_email: row.try_get("contact_email")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn campaign_from_row(row: SqliteRow) -> Result<Campaign, RepositoryError> {
    Ok(Campaign {
        id: CampaignId(row.try_get("id")?),
        company_id: CompanyId(row.try_get("company_id")?),
        starts_at: parse_timestamp("starts_at", row.try_get("starts_at")?)?,
        ends_at: parse_optional_timestamp("ends_at", row.try_get("ends_at")?)?,
        origin_state: row.try_get("origin_state")?,
        active: row.try_get::<i64, _>("active")? != 0,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use mudey_core::domain::campaign::{Campaign, CampaignId, Company, CompanyId};

    use super::SqlCampaignRepository;
    use crate::repositories::CampaignRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn company(id: &str) -> Company {
        Company {
            id: CompanyId(id.to_string()),
            name: format!("Transportadora {id}"),
            contact_email: Some(format!("leads@{}.example.com", id.to_lowercase())),
            created_at: Utc::now(),
        }
    }

    fn campaign(id: &str, company_id: &str, origin_state: Option<&str>, active: bool) -> Campaign {
        Campaign {
            id: CampaignId(id.to_string()),
            company_id: CompanyId(company_id.to_string()),
            starts_at: Utc::now() - Duration::days(1),
            ends_at: None,
            origin_state: origin_state.map(str::to_string),
            active,
        }
    }

    #[tokio::test]
    async fn matching_honors_state_filter_window_and_active_flag() {
        let pool = setup_pool().await;
        let repo = SqlCampaignRepository::new(pool.clone());
        let now = Utc::now();

        for id in ["CO-1", "CO-2", "CO-3", "CO-4"] {
            repo.save_company(company(id)).await.expect("save company");
        }
        repo.save_campaign(campaign("CP-any", "CO-1", None, true)).await.expect("save");
        repo.save_campaign(campaign("CP-sp", "CO-2", Some("SP"), true)).await.expect("save");
        repo.save_campaign(campaign("CP-rj", "CO-3", Some("RJ"), true)).await.expect("save");
        repo.save_campaign(campaign("CP-off", "CO-4", None, false)).await.expect("save");

        let mut expired = campaign("CP-exp", "CO-4", None, true);
        expired.ends_at = Some(now - Duration::hours(2));
        repo.save_campaign(expired).await.expect("save");

        let matched = repo.list_matching_campaigns(Some("SP"), now).await.expect("list");
        let ids: Vec<&str> = matched.iter().map(|campaign| campaign.id.0.as_str()).collect();

        assert!(ids.contains(&"CP-any"));
        assert!(ids.contains(&"CP-sp"));
        assert!(!ids.contains(&"CP-rj"));
        assert!(!ids.contains(&"CP-off"));
        assert!(!ids.contains(&"CP-exp"));

        pool.close().await;
    }

    #[tokio::test]
    async fn unresolved_origin_state_matches_only_unfiltered_campaigns() {
        let pool = setup_pool().await;
        let repo = SqlCampaignRepository::new(pool.clone());

        repo.save_company(company("CO-1")).await.expect("save company");
        repo.save_company(company("CO-2")).await.expect("save company");
        repo.save_campaign(campaign("CP-any", "CO-1", None, true)).await.expect("save");
        repo.save_campaign(campaign("CP-sp", "CO-2", Some("SP"), true)).await.expect("save");

        let matched = repo.list_matching_campaigns(None, Utc::now()).await.expect("list");
        assert_eq!(matched.len(), 1);
        assert_eq!(matched[0].id.0, "CP-any");

        pool.close().await;
    }

    #[tokio::test]
    async fn company_round_trips() {
        let pool = setup_pool().await;
        let repo = SqlCampaignRepository::new(pool.clone());

        let company = company("CO-9");
        repo.save_company(company.clone()).await.expect("save company");

        let found = repo
            .find_company(&company.id)
            .await
            .expect("find company")
            .expect("company should exist");
        assert_eq!(found.name, company.name);
        assert_eq!(found.contact_email, company.contact_email);

        pool.close().await;
    }
}
