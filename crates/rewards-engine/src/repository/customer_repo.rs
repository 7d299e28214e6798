//! 顾客仓储
//!
//! 顾客记录与到店记录的数据访问。积分余额字段只由账本仓储写入。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool};
use tracing::debug;
use uuid::Uuid;

use super::traits::CustomerRepositoryTrait;
use crate::error::Result;
use crate::models::{Customer, Visit};

const CUSTOMER_COLUMNS: &str = r#"
    id, merchant_id, phone, name, balance, lifetime_points, visit_count, version,
    created_at, updated_at
"#;

const VISIT_COLUMNS: &str = r#"
    id, customer_id, merchant_id, purchase_amount, category, idempotency_key, visited_at
"#;

/// 顾客仓储
pub struct CustomerRepository {
    pool: PgPool,
}

impl CustomerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        let sql = format!("SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1");
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    pub async fn find_by_phone(&self, merchant_id: Uuid, phone: &str) -> Result<Option<Customer>> {
        let sql = format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE merchant_id = $1 AND phone = $2"
        );
        let customer = sqlx::query_as::<_, Customer>(&sql)
            .bind(merchant_id)
            .bind(phone)
            .fetch_optional(&self.pool)
            .await?;

        Ok(customer)
    }

    /// 创建顾客
    ///
    /// 并发首次到店时由唯一索引兜底，冲突方返回已存在的记录
    pub async fn create_customer(&self, customer: &Customer) -> Result<Customer> {
        let sql = format!(
            r#"
            INSERT INTO customers ({CUSTOMER_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (merchant_id, phone) DO UPDATE SET phone = EXCLUDED.phone
            RETURNING {CUSTOMER_COLUMNS}
            "#
        );
        let created = sqlx::query_as::<_, Customer>(&sql)
            .bind(customer.id)
            .bind(customer.merchant_id)
            .bind(&customer.phone)
            .bind(&customer.name)
            .bind(customer.balance)
            .bind(customer.lifetime_points)
            .bind(customer.visit_count)
            .bind(customer.version)
            .bind(customer.created_at)
            .bind(customer.updated_at)
            .fetch_one(&self.pool)
            .await?;

        Ok(created)
    }

    /// 写入到店记录
    ///
    /// 只累加 `visit_count`，不触碰 `version`，避免与积分提交互相冲突。
    /// 同键记录已存在时整个事务不产生变更。
    pub async fn record_visit(&self, visit: &Visit) -> Result<bool> {
        let mut tx = self.pool.begin().await?;

        if !insert_visit_in_tx(&mut *tx, visit).await? {
            tx.rollback().await?;
            return Ok(false);
        }

        sqlx::query(
            "UPDATE customers SET visit_count = visit_count + 1, updated_at = NOW() WHERE id = $1",
        )
        .bind(visit.customer_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    pub async fn find_visit_by_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Visit>> {
        let sql = format!(
            "SELECT {VISIT_COLUMNS} FROM visits WHERE merchant_id = $1 AND idempotency_key = $2"
        );
        let visit = sqlx::query_as::<_, Visit>(&sql)
            .bind(merchant_id)
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(visit)
    }

    pub async fn list_visits_since(
        &self,
        customer_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Visit>> {
        let sql = format!(
            r#"
            SELECT {VISIT_COLUMNS} FROM visits
            WHERE customer_id = $1 AND visited_at >= $2
            ORDER BY visited_at
            "#
        );
        let visits = sqlx::query_as::<_, Visit>(&sql)
            .bind(customer_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        Ok(visits)
    }
}

/// 在事务中写入到店记录，幂等键冲突时跳过并返回 false
pub(crate) async fn insert_visit_in_tx(tx: &mut PgConnection, visit: &Visit) -> Result<bool> {
    let sql = format!(
        r#"
        INSERT INTO visits ({VISIT_COLUMNS})
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        ON CONFLICT (merchant_id, idempotency_key) DO NOTHING
        "#
    );
    let result = sqlx::query(&sql)
        .bind(visit.id)
        .bind(visit.customer_id)
        .bind(visit.merchant_id)
        .bind(visit.purchase_amount)
        .bind(&visit.category)
        .bind(&visit.idempotency_key)
        .bind(visit.visited_at)
        .execute(tx)
        .await?;

    if result.rows_affected() == 0 {
        debug!(idempotency_key = ?visit.idempotency_key, "到店记录已存在，跳过");
        return Ok(false);
    }
    Ok(true)
}

#[async_trait]
impl CustomerRepositoryTrait for CustomerRepository {
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>> {
        self.get_customer(id).await
    }

    async fn find_by_phone(&self, merchant_id: Uuid, phone: &str) -> Result<Option<Customer>> {
        self.find_by_phone(merchant_id, phone).await
    }

    async fn create_customer(&self, customer: &Customer) -> Result<Customer> {
        self.create_customer(customer).await
    }

    async fn record_visit(&self, visit: &Visit) -> Result<bool> {
        self.record_visit(visit).await
    }

    async fn find_visit_by_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Visit>> {
        self.find_visit_by_key(merchant_id, idempotency_key).await
    }

    async fn list_visits_since(
        &self,
        customer_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Visit>> {
        self.list_visits_since(customer_id, since).await
    }
}
