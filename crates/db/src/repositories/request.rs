use mudey_core::chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use sqlx::{sqlite::SqliteRow, Row};

use mudey_core::domain::request::{
    Channel, ContactInfo, PriceRange, PropertyType, QuoteRequest, RequestId,
};

use super::{QuoteRequestRepository, RepositoryError};
use crate::DbPool;

pub struct SqlQuoteRequestRepository {
    pool: DbPool,
}

impl SqlQuoteRequestRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl QuoteRequestRepository for SqlQuoteRequestRepository {
    async fn find_by_id(&self, id: &RequestId) -> Result<Option<QuoteRequest>, RepositoryError> {
        let row = sqlx::query(
            "SELECT
                id,
                name,
                email,
                phone,
                origin_raw,
                destination_raw,
                origin_city,
                origin_state,
                destination_city,
                destination_state,
                property_type,
                has_elevator,
                needs_packing,
                move_date,
                extra_items,
                distance_km,
                price_min,
                price_max,
                explanation,
                channel,
                client_ip,
                user_agent,
                created_at
             FROM quote_request
             WHERE id = ?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(request_from_row).transpose()
    }

    async fn save(&self, request: QuoteRequest) -> Result<(), RepositoryError> {
        sqlx::query(
            "INSERT INTO quote_request (
                id,
                name,
                email,
                phone,
                origin_raw,
                destination_raw,
                origin_city,
                origin_state,
                destination_city,
                destination_state,
                property_type,
                has_elevator,
                needs_packing,
                move_date,
                extra_items,
                distance_km,
                price_min,
                price_max,
                explanation,
                channel,
                client_ip,
                user_agent,
                created_at
             ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&request.id.0)
        .bind(&request.contact.name)
        .bind(&request.contact.email)
        .bind(&request.contact.phone)
        .bind(&request.origin_raw)
        .bind(&request.destination_raw)
        .bind(request.origin_city.as_deref())
        .bind(request.origin_state.as_deref())
        .bind(request.destination_city.as_deref())
        .bind(request.destination_state.as_deref())
        .bind(request.property_type.as_str())
        .bind(i64::from(request.has_elevator))
        .bind(i64::from(request.needs_packing))
        .bind(request.move_date.map(|date| date.to_string()))
        .bind(request.extra_items.as_deref())
        .bind(request.distance_km)
        .bind(request.price.map(|price| price.min.to_string()))
        .bind(request.price.map(|price| price.max.to_string()))
        .bind(request.explanation.as_deref())
        .bind(request.channel.as_str())
        .bind(request.client_ip.as_deref())
        .bind(request.user_agent.as_deref())
        .bind(request.created_at.to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

fn request_from_row(row: SqliteRow) -> Result<QuoteRequest, RepositoryError> {
    let property_raw = row.try_get::<String, _>("property_type")?;
    let property_type = PropertyType::parse(&property_raw).ok_or_else(|| {
        RepositoryError::Decode(format!("unknown property type `{property_raw}`"))
    })?;

    let channel_raw = row.try_get::<String, _>("channel")?;
    let channel = Channel::parse(&channel_raw)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown channel `{channel_raw}`")))?;

    let price = match (
        row.try_get::<Option<String>, _>("price_min")?,
        row.try_get::<Option<String>, _>("price_max")?,
    ) {
        (Some(min), Some(max)) => Some(PriceRange::new(
            parse_decimal("price_min", &min)?,
            parse_decimal("price_max", &max)?,
        )),
        (None, None) => None,
        _ => {
            return Err(RepositoryError::Decode(
                "price_min and price_max must be stored together".to_string(),
            ));
        }
    };

    Ok(QuoteRequest {
        id: RequestId(row.try_get("id")?),
        contact: ContactInfo {
            name: row.try_get("name")?,
            email: row.try_get("email")?,
            phone: row.try_get("phone")?,
        },
        origin_raw: row.try_get("origin_raw")?,
        destination_raw: row.try_get("destination_raw")?,
        origin_city: row.try_get("origin_city")?,
        origin_state: row.try_get("origin_state")?,
        destination_city: row.try_get("destination_city")?,
        destination_state: row.try_get("destination_state")?,
        property_type,
        has_elevator: row.try_get::<i64, _>("has_elevator")? != 0,
        needs_packing: row.try_get::<i64, _>("needs_packing")? != 0,
        move_date: parse_optional_date("move_date", row.try_get("move_date")?)?,
        extra_items: row.try_get("extra_items")?,
        distance_km: row.try_get("distance_km")?,
        price,
        explanation: row.try_get("explanation")?,
        channel,
        client_ip: row.try_get("client_ip")?,
        user_agent: row.try_get("user_agent")?,
        created_at: parse_timestamp("created_at", row.try_get("created_at")?)?,
    })
}

fn parse_decimal(column: &str, value: &str) -> Result<Decimal, RepositoryError> {
    value.parse::<Decimal>().map_err(|error| {
        RepositoryError::Decode(format!("invalid decimal in `{column}`: `{value}` ({error})"))
    })
}

pub(crate) fn parse_timestamp(column: &str, value: String) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(&value).map(|timestamp| timestamp.with_timezone(&Utc)).map_err(
        |error| {
            RepositoryError::Decode(format!("invalid timestamp in `{column}`: `{value}` ({error})"))
        },
    )
}

pub(crate) fn parse_optional_timestamp(
    column: &str,
    value: Option<String>,
) -> Result<Option<DateTime<Utc>>, RepositoryError> {
    value.map(|timestamp| parse_timestamp(column, timestamp)).transpose()
}

fn parse_optional_date(
    column: &str,
    value: Option<String>,
) -> Result<Option<NaiveDate>, RepositoryError> {
    value
        .map(|date| {
            date.parse::<NaiveDate>().map_err(|error| {
                RepositoryError::Decode(format!("invalid date in `{column}`: `{date}` ({error})"))
            })
        })
        .transpose()
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Utc};
    use rust_decimal::Decimal;

    use mudey_core::domain::request::{
        Channel, ContactInfo, PriceRange, PropertyType, QuoteRequest, RequestId,
    };

    use super::SqlQuoteRequestRepository;
    use crate::repositories::QuoteRequestRepository;
    use crate::{connect_with_settings, migrations, DbPool};

    async fn setup_pool() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30)
            .await
            .expect("connect test pool");
        migrations::run_pending(&pool).await.expect("run migrations");
        pool
    }

    fn sample_request(id: &str) -> QuoteRequest {
        QuoteRequest {
            id: RequestId(id.to_string()),
            contact: ContactInfo {
                name: "Ana".to_string(),
                email: "ana@x.com".to_string(),
                phone: "5511987654321".to_string(),
            },
            origin_raw: "Moema SP".to_string(),
            destination_raw: "Santana SP".to_string(),
            origin_city: Some("Moema".to_string()),
            origin_state: Some("SP".to_string()),
            destination_city: Some("Santana".to_string()),
            destination_state: Some("SP".to_string()),
            property_type: PropertyType::TwoBedrooms,
            has_elevator: false,
            needs_packing: true,
            move_date: NaiveDate::from_ymd_opt(2026, 3, 10),
            extra_items: Some("piano".to_string()),
            distance_km: Some(18.5),
            price: Some(PriceRange::new(Decimal::new(2_100_00, 2), Decimal::new(2_900_00, 2))),
            explanation: Some("estimativa local".to_string()),
            channel: Channel::WhatsApp,
            client_ip: Some("203.0.113.9".to_string()),
            user_agent: Some("WhatsApp/2.24".to_string()),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn quote_request_round_trips() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRequestRepository::new(pool.clone());
        let request = sample_request("R-REQ-001");

        repo.save(request.clone()).await.expect("save request");

        let found = repo
            .find_by_id(&request.id)
            .await
            .expect("find request")
            .expect("request should exist");

        assert_eq!(found.contact, request.contact);
        assert_eq!(found.price, request.price);
        assert_eq!(found.move_date, request.move_date);
        assert_eq!(found.property_type, request.property_type);
        assert_eq!(found.distance_km, request.distance_km);

        pool.close().await;
    }

    #[tokio::test]
    async fn missing_request_is_none() {
        let pool = setup_pool().await;
        let repo = SqlQuoteRequestRepository::new(pool.clone());

        let found = repo.find_by_id(&RequestId("R-NOPE".to_string())).await.expect("query");
        assert!(found.is_none());

        pool.close().await;
    }
}
