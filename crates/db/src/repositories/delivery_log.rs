use mudey_core::chrono::{DateTime, Utc};
use sqlx::{sqlite::SqliteRow, Row};
use uuid::Uuid;

use mudey_core::domain::campaign::{CompanyId, LinkId};
use mudey_core::domain::request::RequestId;

use super::request::parse_timestamp;
use super::{DeliveryLogRepository, RepositoryError};
use crate::DbPool;

/// One audit-trail row per delivery outcome, success or failure.
///
/// Separate from the campaign link on purpose: links hold current state,
/// the log holds history with full request/response metadata for support.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeliveryLogEntry {
    pub id: String,
    pub link_id: LinkId,
    pub request_id: RequestId,
    pub company_id: CompanyId,
    pub outcome: String,
    pub detail_json: String,
    pub occurred_at: DateTime<Utc>,
}

impl DeliveryLogEntry {
    pub fn new(
        link_id: LinkId,
        request_id: RequestId,
        company_id: CompanyId,
        outcome: impl Into<String>,
        detail_json: impl Into<String>,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            link_id,
            request_id,
            company_id,
            outcome: outcome.into(),
            detail_json: detail_json.into(),
            occurred_at,
        }
    }
}

pub struct SqlDeliveryLogRepository {
    pool: DbPool,
}

impl SqlDeliveryLogRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl DeliveryLogRepository for SqlDeliveryLogRepository {
    async fn append(&self, entry: DeliveryLogEntry) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO delivery_log (
                id,
                link_id,
                request_id,
                company_id,
                outcome,
                detail_json,
                occurred_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&entry.id)
        .bind(&entry.link_id.0)
        .bind(&entry.request_id.0)
        .bind(&entry.company_id.0)
        .bind(&entry.outcome)
        .bind(&entry.detail_json)
        .bind(entry.occurred_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn list_for_link(
        &self,
        link_id: &LinkId,
    ) -> Result<Vec<DeliveryLogEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, link_id, request_id, company_id, outcome, detail_json, occurred_at
             FROM delivery_log
             WHERE link_id = ?
             ORDER BY occurred_at ASC",
        )
        .bind(&link_id.0)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(entry_from_row).collect()
    }
}

fn entry_from_row(row: SqliteRow) -> Result<DeliveryLogEntry, RepositoryError> {
    Ok(DeliveryLogEntry {
        id: row.try_get("id")?,
        link_id: LinkId(row.try_get("link_id")?),
        request_id: RequestId(row.try_get("request_id")?),
        company_id: CompanyId(row.try_get("company_id")?),
        outcome: row.try_get("outcome")?,
        detail_json: row.try_get("detail_json")?,
        occurred_at: parse_timestamp("occurred_at", row.try_get("occurred_at")?)?,
    })
}
