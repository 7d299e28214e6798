//! 礼品卡仓储
//!
//! 状态变更一律带上旧状态作为条件，保证并发核销只有一个成功

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use super::ledger_repo::insert_gift_cards_in_tx;
use super::traits::GiftCardRepositoryTrait;
use crate::error::Result;
use crate::models::{GiftCard, GiftCardStatus};

const CARD_COLUMNS: &str = r#"
    id, customer_id, merchant_id, code, value, status, milestone, issued_at, redeemed_at,
    expires_at, expired_at
"#;

/// 礼品卡仓储
pub struct GiftCardRepository {
    pool: PgPool,
}

impl GiftCardRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_gift_card(&self, id: Uuid) -> Result<Option<GiftCard>> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM gift_cards WHERE id = $1");
        let card = sqlx::query_as::<_, GiftCard>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(card)
    }

    pub async fn get_by_code(&self, code: &str) -> Result<Option<GiftCard>> {
        let sql = format!("SELECT {CARD_COLUMNS} FROM gift_cards WHERE code = $1");
        let card = sqlx::query_as::<_, GiftCard>(&sql)
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;

        Ok(card)
    }

    /// 列出顾客的礼品卡，可按状态过滤
    pub async fn list_by_customer(
        &self,
        customer_id: Uuid,
        status: Option<GiftCardStatus>,
    ) -> Result<Vec<GiftCard>> {
        let sql = format!(
            r#"
            SELECT {CARD_COLUMNS} FROM gift_cards
            WHERE customer_id = $1 AND ($2::VARCHAR IS NULL OR status = $2)
            ORDER BY milestone
            "#
        );
        let cards = sqlx::query_as::<_, GiftCard>(&sql)
            .bind(customer_id)
            .bind(status)
            .fetch_all(&self.pool)
            .await?;

        Ok(cards)
    }

    pub async fn list_milestones(&self, customer_id: Uuid) -> Result<Vec<i64>> {
        let rows = sqlx::query(
            "SELECT milestone FROM gift_cards WHERE customer_id = $1 ORDER BY milestone",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.iter().map(|row| row.get("milestone")).collect())
    }

    pub async fn insert_gift_cards(&self, cards: &[GiftCard]) -> Result<Vec<GiftCard>> {
        if cards.is_empty() {
            return Ok(Vec::new());
        }
        let mut tx = self.pool.begin().await?;
        let inserted = insert_gift_cards_in_tx(&mut *tx, cards).await?;
        tx.commit().await?;
        Ok(inserted)
    }

    /// 比较并设置状态
    ///
    /// 返回 false 表示当前状态已不是 `from`（被并发请求抢先）
    pub async fn transition_status(&self, card: &GiftCard, from: GiftCardStatus) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE gift_cards
            SET status = $3, redeemed_at = $4, expired_at = $5
            WHERE id = $1 AND status = $2
            "#,
        )
        .bind(card.id)
        .bind(from)
        .bind(card.status)
        .bind(card.redeemed_at)
        .bind(card.expired_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    pub async fn list_overdue(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<GiftCard>> {
        let sql = format!(
            r#"
            SELECT {CARD_COLUMNS} FROM gift_cards
            WHERE status = 'available' AND expires_at IS NOT NULL AND expires_at < $1
            ORDER BY expires_at
            LIMIT $2
            "#
        );
        let cards = sqlx::query_as::<_, GiftCard>(&sql)
            .bind(now)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(cards)
    }
}

#[async_trait]
impl GiftCardRepositoryTrait for GiftCardRepository {
    async fn get_gift_card(&self, id: Uuid) -> Result<Option<GiftCard>> {
        self.get_gift_card(id).await
    }

    async fn get_by_code(&self, code: &str) -> Result<Option<GiftCard>> {
        self.get_by_code(code).await
    }

    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        status: Option<GiftCardStatus>,
    ) -> Result<Vec<GiftCard>> {
        self.list_by_customer(customer_id, status).await
    }

    async fn list_milestones(&self, customer_id: Uuid) -> Result<Vec<i64>> {
        self.list_milestones(customer_id).await
    }

    async fn insert_gift_cards(&self, cards: &[GiftCard]) -> Result<Vec<GiftCard>> {
        self.insert_gift_cards(cards).await
    }

    async fn transition_status(&self, card: &GiftCard, from: GiftCardStatus) -> Result<bool> {
        self.transition_status(card, from).await
    }

    async fn list_overdue(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<GiftCard>> {
        self.list_overdue(now, limit).await
    }
}
