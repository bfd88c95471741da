use mudey_core::chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};

use mudey_core::domain::campaign::{
    CampaignId, CampaignLink, CompanyId, DeliveryStatus, ErrorClass, LinkId,
};
use mudey_core::domain::request::RequestId;

use super::request::parse_timestamp;
use super::{CampaignLinkRepository, RepositoryError};
use crate::DbPool;

const LINK_COLUMNS: &str = "id,
                request_id,
                company_id,
                campaign_id,
                status,
                attempts,
                last_error,
                error_class,
                message_id,
                created_at,
                updated_at";

pub struct SqlCampaignLinkRepository {
    pool: DbPool,
}

impl SqlCampaignLinkRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl CampaignLinkRepository for SqlCampaignLinkRepository {
    async fn find_by_id(&self, id: &LinkId) -> Result<Option<CampaignLink>, RepositoryError> {
        let sql = format!(
            "SELECT {LINK_COLUMNS}
             FROM campaign_link
             WHERE id = ?"
        );
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;

        row.map(link_from_row).transpose()
    }

    async fn save(&self, link: CampaignLink) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO campaign_link (
                id,
                request_id,
                company_id,
                campaign_id,
                status,
                attempts,
                last_error,
                error_class,
                message_id,
                created_at,
                updated_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                attempts = excluded.attempts,
                last_error = excluded.last_error,
                error_class = excluded.error_class,
                message_id = excluded.message_id,
                updated_at = excluded.updated_at",
        )
        .bind(&link.id.0)
        .bind(&link.request_id.0)
        .bind(&link.company_id.0)
        .bind(&link.campaign_id.0)
        .bind(link.status.as_str())
        .bind(i64::from(link.attempts))
        .bind(link.last_error.as_deref())
        .bind(link.error_class.map(|class| class.as_str()))
        .bind(link.message_id.as_deref())
        .bind(link.created_at.to_rfc3339())
        .bind(link.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_request(
        &self,
        request_id: &RequestId,
    ) -> Result<Vec<CampaignLink>, RepositoryError> {
        let sql = format!(
            "SELECT {LINK_COLUMNS}
             FROM campaign_link
             WHERE request_id = ?
             ORDER BY created_at ASC"
        );
        let rows = sqlx::query(&sql).bind(&request_id.0).fetch_all(&self.pool).await?;

        rows.into_iter().map(link_from_row).collect()
    }

    async fn claim_due(
        &self,
        limit: usize,
        max_attempts: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<CampaignLink>, RepositoryError> {
        let sql = format!(
            "UPDATE campaign_link SET
                status = 'sending',
                attempts = attempts + 1,
                updated_at = ?
             WHERE id IN (
                SELECT id FROM campaign_link
                WHERE status = 'queued'
                   OR (status = 'failed'
                       AND attempts < ?
                       AND (error_class IS NULL OR error_class = 'transient'))
                ORDER BY created_at ASC
                LIMIT ?
             )
             RETURNING {LINK_COLUMNS}"
        );
        let rows = sqlx::query(&sql)
            .bind(now.to_rfc3339())
            .bind(i64::from(max_attempts))
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        let mut links =
            rows.into_iter().map(link_from_row).collect::<Result<Vec<_>, _>>()?;
        // RETURNING order follows the row scan, not the subquery ORDER BY.
        links.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(links)
    }

    async fn count_by_status(&self, status: DeliveryStatus) -> Result<u64, RepositoryError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM campaign_link WHERE status = ?")
                .bind(status.as_str())
                .fetch_one(&self.pool)
                .await?;

        u64::try_from(count)
            .map_err(|_| RepositoryError::Decode(format!("negative status count {count}")))
    }
}

fn link_from_row(row: SqliteRow) -> Result<CampaignLink, RepositoryError> {
    let status_raw = row.try_get::<String, _>("status")?;
    let status = DeliveryStatus::parse(&status_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown delivery status `{status_raw}`"))
    })?;

    let error_class = row
        .try_get::<Option<String>, _>("error_class")?
        .map(|value| {
            ErrorClass::parse(&value)
                .ok_or_else(|| RepositoryError::Decode(format!("unknown error class `{value}`")))
        })
        .transpose()?;

    let attempts_raw = row.try_get::<i64, _>("attempts")?;
    let attempts = u32::try_from(attempts_raw).map_err(|_| {
        RepositoryError::Decode(format!("invalid attempts value {attempts_raw}"))
    })?;

    Ok(CampaignLink {
        id: LinkId(row.try_get("id")?),
        request_id: RequestId(row.try_get("request_id")?),
        company_id: CompanyId(row.try_get("company_id")?),
        campaign_id: CampaignId(row.try_get("campaign_id")?),
        status,
        attempts,
        last_error: row.try_get("last_error")?,
        error_class,
        message_id: row.try_get("message_id")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
        updated_at: parse_timestamp("updated_at", row.try_get("updated_at")?)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use mudey_core::domain::campaign::{
        Campaign, CampaignId, CampaignLink, CompanyId, DeliveryStatus, ErrorClass,
    };
    use mudey_core::domain::request::RequestId;

    use super::SqlCampaignLinkRepository;
    use crate::repositories::CampaignLinkRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    async fn seed_request_and_company(pool: &DbPool, request_id: &str, company_id: &str) {
        let timestamp = Utc::now().to_rfc3339();

        sqlx::query(
            "INSERT INTO quote_request (
                id, name, email, phone, origin_raw, destination_raw,
                property_type, has_elevator, needs_packing, channel, created_at
             ) VALUES (?, 'Ana', 'ana@x.com', '5511987654321', 'Moema SP', 'Santana SP',
                'two_bedrooms', 0, 1, 'whatsapp', ?)",
        )
        .bind(request_id)
        .bind(&timestamp)
        .execute(pool)
        .await
        .expect("insert quote request");

        sqlx::query("INSERT INTO company (id, name, contact_email, created_at) VALUES (?, 'Transportadora', 'leads@t.example.com', ?)")
            .bind(company_id)
            .bind(&timestamp)
            .execute(pool)
            .await
            .expect("insert company");

        sqlx::query(
            "INSERT INTO campaign (id, company_id, starts_at, active) VALUES (?, ?, ?, 1)",
        )
        .bind(format!("CP-{company_id}"))
        .bind(company_id)
        .bind(&timestamp)
        .execute(pool)
        .await
        .expect("insert campaign");
    }

    fn link(id: &str, request_id: &str, company_id: &str) -> CampaignLink {
        let mut link = CampaignLink::new(
            RequestId(request_id.to_string()),
            &Campaign {
                id: CampaignId(format!("CP-{company_id}")),
                company_id: CompanyId(company_id.to_string()),
                starts_at: Utc::now() - Duration::days(1),
                ends_at: None,
                origin_state: None,
                active: true,
            },
            Utc::now(),
        );
        link.id = mudey_core::domain::campaign::LinkId(id.to_string());
        link
    }

    #[tokio::test]
    async fn link_round_trips() {
        let pool = setup_pool().await;
        seed_request_and_company(&pool, "R-1", "CO-1").await;
        let repo = SqlCampaignLinkRepository::new(pool.clone());

        let link = link("L-1", "R-1", "CO-1");
        repo.save(link.clone()).await.expect("save link");

        let found = repo.find_by_id(&link.id).await.expect("find link");
        assert_eq!(found, Some(link));

        pool.close().await;
    }

    #[tokio::test]
    async fn claim_transitions_to_sending_and_increments_attempts() {
        let pool = setup_pool().await;
        seed_request_and_company(&pool, "R-1", "CO-1").await;
        let repo = SqlCampaignLinkRepository::new(pool.clone());

        repo.save(link("L-1", "R-1", "CO-1")).await.expect("save link");

        let claimed = repo.claim_due(50, 3, Utc::now()).await.expect("claim");
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].status, DeliveryStatus::Sending);
        assert_eq!(claimed[0].attempts, 1);

        // A second sweep sees nothing: the claim is the optimistic lock.
        let reclaimed = repo.claim_due(50, 3, Utc::now()).await.expect("claim again");
        assert!(reclaimed.is_empty());

        pool.close().await;
    }

    #[tokio::test]
    async fn claim_skips_exhausted_and_terminal_failures() {
        let pool = setup_pool().await;
        seed_request_and_company(&pool, "R-1", "CO-1").await;
        let repo = SqlCampaignLinkRepository::new(pool.clone());

        let mut retryable = link("L-retry", "R-1", "CO-1");
        retryable.status = DeliveryStatus::Failed;
        retryable.attempts = 2;
        retryable.error_class = Some(ErrorClass::Transient);
        repo.save(retryable).await.expect("save");

        let mut exhausted = link("L-done", "R-1", "CO-1");
        exhausted.status = DeliveryStatus::Failed;
        exhausted.attempts = 3;
        exhausted.error_class = Some(ErrorClass::Transient);
        repo.save(exhausted).await.expect("save");

        let mut terminal = link("L-term", "R-1", "CO-1");
        terminal.status = DeliveryStatus::Failed;
        terminal.attempts = 1;
        terminal.error_class = Some(ErrorClass::Terminal);
        repo.save(terminal).await.expect("save");

        let claimed = repo.claim_due(50, 3, Utc::now()).await.expect("claim");
        assert_eq!(claimed.len(), 1);
        assert_eq!(claimed[0].id.0, "L-retry");
        assert_eq!(claimed[0].attempts, 3);

        pool.close().await;
    }

    #[tokio::test]
    async fn claim_respects_limit_and_age_order() {
        let pool = setup_pool().await;
        seed_request_and_company(&pool, "R-1", "CO-1").await;
        let repo = SqlCampaignLinkRepository::new(pool.clone());

        let now = Utc::now();
        for (id, age_minutes) in [("L-old", 30), ("L-mid", 20), ("L-new", 10)] {
            let mut link = link(id, "R-1", "CO-1");
            link.created_at = now - Duration::minutes(age_minutes);
            repo.save(link).await.expect("save");
        }

        let claimed = repo.claim_due(2, 3, now).await.expect("claim");
        let ids: Vec<&str> = claimed.iter().map(|link| link.id.0.as_str()).collect();
        assert_eq!(ids, vec!["L-old", "L-mid"]);

        assert_eq!(
            repo.count_by_status(DeliveryStatus::Queued).await.expect("count"),
            1
        );

        pool.close().await;
    }
}
