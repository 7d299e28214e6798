//! 积分账本仓储
//!
//! 账本条目只追加，顾客余额投影与条目在同一事务内写入。
//! 并发控制依赖 `customers.version` 条件更新，不持有行锁等待。

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::types::Json;
use sqlx::{PgConnection, PgPool, Row};
use tracing::debug;
use uuid::Uuid;

use super::customer_repo::insert_visit_in_tx;
use super::traits::LedgerRepositoryTrait;
use crate::error::{Result, RewardsError};
use crate::models::{Customer, GiftCard, LedgerCommit, LedgerEntry};

const ENTRY_COLUMNS: &str = r#"
    id, customer_id, merchant_id, kind, delta, balance_after, description, purchase_amount,
    idempotency_key, challenge_bonuses, daily_limit_clamp, operator, created_at
"#;

/// 积分账本仓储
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn find_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<LedgerEntry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM ledger_entries WHERE merchant_id = $1 AND idempotency_key = $2"
        );
        let entry = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(merchant_id)
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await?;

        Ok(entry)
    }

    /// 原子提交一次账本追加
    ///
    /// 到店记录先写入，顾客投影更新时一并累加到店次数
    pub async fn commit_append(&self, commit: &LedgerCommit) -> Result<(Customer, Vec<GiftCard>)> {
        let mut tx = self.pool.begin().await?;

        let visit_added = match &commit.visit {
            Some(visit) => insert_visit_in_tx(&mut *tx, visit).await?,
            None => false,
        };

        let customer = sqlx::query_as::<_, Customer>(
            r#"
            UPDATE customers
            SET balance = $3, lifetime_points = $4, visit_count = visit_count + $6,
                version = version + 1, updated_at = $5
            WHERE id = $1 AND version = $2
            RETURNING id, merchant_id, phone, name, balance, lifetime_points, visit_count,
                      version, created_at, updated_at
            "#,
        )
        .bind(commit.customer.id)
        .bind(commit.expected_version)
        .bind(commit.customer.balance)
        .bind(commit.customer.lifetime_points)
        .bind(commit.customer.updated_at)
        .bind(i64::from(visit_added))
        .fetch_optional(&mut *tx)
        .await?;

        let Some(customer) = customer else {
            debug!(
                customer_id = %commit.customer.id,
                expected_version = commit.expected_version,
                "顾客版本已变化，放弃提交"
            );
            tx.rollback().await?;
            return Err(RewardsError::ConcurrencyConflict);
        };

        if !Self::lock_awarded_challenges(&mut *tx, &commit.entry).await? {
            debug!(entry_id = %commit.entry.id, "奖励引用的挑战已删除，放弃提交");
            tx.rollback().await?;
            return Err(RewardsError::ConcurrencyConflict);
        }

        Self::insert_entry_in_tx(&mut *tx, &commit.entry).await?;
        let cards = insert_gift_cards_in_tx(&mut *tx, &commit.gift_cards).await?;

        tx.commit().await?;
        Ok((customer, cards))
    }

    /// 对奖励引用的挑战加共享锁，与删除互斥；有挑战已不存在时返回 false
    async fn lock_awarded_challenges(tx: &mut PgConnection, entry: &LedgerEntry) -> Result<bool> {
        let mut ids: Vec<Uuid> = entry
            .challenge_bonuses
            .iter()
            .map(|b| b.challenge_id)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        if ids.is_empty() {
            return Ok(true);
        }

        let locked = sqlx::query("SELECT id FROM challenges WHERE id = ANY($1) FOR SHARE")
            .bind(&ids)
            .fetch_all(tx)
            .await?;

        Ok(locked.len() == ids.len())
    }

    /// 在事务中写入账本条目
    ///
    /// 幂等键唯一冲突说明另一请求抢先使用了同一个键
    pub async fn insert_entry_in_tx(tx: &mut PgConnection, entry: &LedgerEntry) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO ledger_entries ({ENTRY_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#
        );
        sqlx::query(&sql)
            .bind(entry.id)
            .bind(entry.customer_id)
            .bind(entry.merchant_id)
            .bind(entry.kind)
            .bind(entry.delta)
            .bind(entry.balance_after)
            .bind(&entry.description)
            .bind(entry.purchase_amount)
            .bind(&entry.idempotency_key)
            .bind(Json(&entry.challenge_bonuses))
            .bind(Json(&entry.daily_limit_clamp))
            .bind(&entry.operator)
            .bind(entry.created_at)
            .execute(tx)
            .await
            .map_err(|e| match &e {
                sqlx::Error::Database(db) if db.is_unique_violation() => {
                    RewardsError::IdempotencyKeyReused(entry.idempotency_key.clone())
                }
                _ => RewardsError::Database(e),
            })?;

        Ok(())
    }

    pub async fn list_entries(&self, customer_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM ledger_entries
            WHERE customer_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#
        );
        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(customer_id)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    pub async fn list_entries_since(
        &self,
        customer_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        let sql = format!(
            r#"
            SELECT {ENTRY_COLUMNS} FROM ledger_entries
            WHERE customer_id = $1 AND created_at >= $2
            ORDER BY created_at, id
            "#
        );
        let entries = sqlx::query_as::<_, LedgerEntry>(&sql)
            .bind(customer_id)
            .bind(since)
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    pub async fn sum_deltas(&self, customer_id: Uuid) -> Result<(i64, i64)> {
        let row = sqlx::query(
            r#"
            SELECT COALESCE(SUM(delta), 0)::BIGINT AS total,
                   COALESCE(SUM(GREATEST(delta, 0)), 0)::BIGINT AS lifetime
            FROM ledger_entries
            WHERE customer_id = $1
            "#,
        )
        .bind(customer_id)
        .fetch_one(&self.pool)
        .await?;

        Ok((row.get("total"), row.get("lifetime")))
    }

    /// 通过 JSONB 包含查询判断奖励快照中是否引用了挑战
    pub async fn has_challenge_awards(&self, challenge_id: Uuid) -> Result<bool> {
        let pattern = serde_json::json!([{ "challengeId": challenge_id }]);
        let row = sqlx::query(
            "SELECT EXISTS(SELECT 1 FROM ledger_entries WHERE challenge_bonuses @> $1) AS found",
        )
        .bind(Json(pattern))
        .fetch_one(&self.pool)
        .await?;

        Ok(row.get("found"))
    }
}

/// 在事务中写入礼品卡，已存在的门槛倍数跳过
pub(crate) async fn insert_gift_cards_in_tx(
    tx: &mut PgConnection,
    cards: &[GiftCard],
) -> Result<Vec<GiftCard>> {
    let mut inserted = Vec::with_capacity(cards.len());
    for card in cards {
        let result = sqlx::query(
            r#"
            INSERT INTO gift_cards (id, customer_id, merchant_id, code, value, status, milestone,
                                    issued_at, redeemed_at, expires_at, expired_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            ON CONFLICT (customer_id, milestone) DO NOTHING
            "#,
        )
        .bind(card.id)
        .bind(card.customer_id)
        .bind(card.merchant_id)
        .bind(&card.code)
        .bind(card.value)
        .bind(card.status)
        .bind(card.milestone)
        .bind(card.issued_at)
        .bind(card.redeemed_at)
        .bind(card.expires_at)
        .bind(card.expired_at)
        .execute(&mut *tx)
        .await?;

        if result.rows_affected() == 1 {
            inserted.push(card.clone());
        } else {
            debug!(customer_id = %card.customer_id, milestone = card.milestone, "门槛倍数已发放，跳过");
        }
    }
    Ok(inserted)
}

#[async_trait]
impl LedgerRepositoryTrait for LedgerRepository {
    async fn find_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<LedgerEntry>> {
        self.find_by_idempotency_key(merchant_id, idempotency_key)
            .await
    }

    async fn commit_append(&self, commit: &LedgerCommit) -> Result<(Customer, Vec<GiftCard>)> {
        self.commit_append(commit).await
    }

    async fn list_entries(&self, customer_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>> {
        self.list_entries(customer_id, limit).await
    }

    async fn list_entries_since(
        &self,
        customer_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>> {
        self.list_entries_since(customer_id, since).await
    }

    async fn sum_deltas(&self, customer_id: Uuid) -> Result<(i64, i64)> {
        self.sum_deltas(customer_id).await
    }

    async fn has_challenge_awards(&self, challenge_id: Uuid) -> Result<bool> {
        self.has_challenge_awards(challenge_id).await
    }
}
