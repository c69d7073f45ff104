use async_trait::async_trait;
use rust_decimal::Decimal;
use sqlx::postgres::PgRow;
use sqlx::{PgPool, Row};

use super::models::{CatalogStatus, CustomRate, Provider, Service, ServiceLookup};
use crate::core_types::{ProviderId, ServiceId, UserId};
use crate::db::StoreError;

/// Read access to services, providers and custom rates
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Service by reference, regardless of status
    async fn service(&self, lookup: ServiceLookup) -> Result<Option<Service>, StoreError>;

    async fn provider(&self, provider_id: ProviderId) -> Result<Option<Provider>, StoreError>;

    /// Per-user price override for a service
    async fn custom_rate(
        &self,
        user_id: UserId,
        service_id: ServiceId,
    ) -> Result<Option<CustomRate>, StoreError>;

    async fn active_providers(&self) -> Result<Vec<Provider>, StoreError>;

    async fn list_active_services(&self) -> Result<Vec<Service>, StoreError>;
}

const SERVICE_COLUMNS: &str = r#"s.service_id, s.seq, s.title, s.description, s.service_type,
    s.min_amount, s.max_amount, s.rate, s.provider_service_id, s.provider_id,
    s.category_id, COALESCE(c.name, '') AS category_name, s.status"#;

pub struct PgCatalog {
    pool: PgPool,
}

impl PgCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    fn row_to_service(row: &PgRow) -> Result<Service, sqlx::Error> {
        Ok(Service {
            service_id: row.try_get("service_id")?,
            seq: row.try_get("seq")?,
            title: row.try_get("title")?,
            description: row.try_get("description")?,
            service_type: row.try_get("service_type")?,
            min_amount: row.try_get("min_amount")?,
            max_amount: row.try_get("max_amount")?,
            rate: row.try_get("rate")?,
            provider_service_id: row.try_get("provider_service_id")?,
            provider_id: row.try_get("provider_id")?,
            category_id: row.try_get("category_id")?,
            category_name: row.try_get("category_name")?,
            status: CatalogStatus::from(row.try_get::<i16, _>("status")?),
        })
    }

    fn row_to_provider(row: &PgRow) -> Result<Provider, sqlx::Error> {
        Ok(Provider {
            provider_id: row.try_get("provider_id")?,
            name: row.try_get("name")?,
            url: row.try_get("url")?,
            api_key: row.try_get("api_key")?,
            status: CatalogStatus::from(row.try_get::<i16, _>("status")?),
        })
    }
}

#[async_trait]
impl Catalog for PgCatalog {
    async fn service(&self, lookup: ServiceLookup) -> Result<Option<Service>, StoreError> {
        let (column, key) = match lookup {
            ServiceLookup::ById(id) => ("s.service_id", id),
            ServiceLookup::BySeq(seq) => ("s.seq", seq as i64),
        };
        let sql = format!(
            "SELECT {} FROM services_tb s LEFT JOIN categories_tb c ON c.category_id = s.category_id WHERE {} = $1",
            SERVICE_COLUMNS, column
        );
        let row = sqlx::query(&sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.as_ref().map(Self::row_to_service).transpose()?)
    }

    async fn provider(&self, provider_id: ProviderId) -> Result<Option<Provider>, StoreError> {
        let row = sqlx::query(
            "SELECT provider_id, name, url, api_key, status FROM providers_tb WHERE provider_id = $1",
        )
        .bind(provider_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.as_ref().map(Self::row_to_provider).transpose()?)
    }

    async fn custom_rate(
        &self,
        user_id: UserId,
        service_id: ServiceId,
    ) -> Result<Option<CustomRate>, StoreError> {
        let row = sqlx::query(
            "SELECT rate FROM custom_rates_tb WHERE user_id = $1 AND service_id = $2",
        )
        .bind(user_id)
        .bind(service_id)
        .fetch_optional(&self.pool)
        .await?;

        let rate: Option<Decimal> = row.map(|r| r.try_get("rate")).transpose()?;
        Ok(rate.map(|rate| CustomRate {
            user_id,
            service_id,
            rate,
        }))
    }

    async fn active_providers(&self) -> Result<Vec<Provider>, StoreError> {
        let rows = sqlx::query(
            "SELECT provider_id, name, url, api_key, status FROM providers_tb WHERE status = 1 ORDER BY provider_id",
        )
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(Self::row_to_provider)
            .collect::<Result<_, _>>()?)
    }

    async fn list_active_services(&self) -> Result<Vec<Service>, StoreError> {
        let sql = format!(
            "SELECT {} FROM services_tb s LEFT JOIN categories_tb c ON c.category_id = s.category_id WHERE s.status = 1 ORDER BY s.seq",
            SERVICE_COLUMNS
        );
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;

        Ok(rows
            .iter()
            .map(Self::row_to_service)
            .collect::<Result<_, _>>()?)
    }
}
