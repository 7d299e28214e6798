//! 挑战仓储

use async_trait::async_trait;
use sqlx::PgPool;
use sqlx::types::Json;
use uuid::Uuid;

use super::traits::ChallengeRepositoryTrait;
use crate::error::Result;
use crate::models::{Challenge, ChallengeStatus};

const CHALLENGE_COLUMNS: &str = r#"
    id, merchant_id, name, description, rule, points, status, version, starts_at, ends_at,
    created_at, updated_at
"#;

/// 挑战仓储
pub struct ChallengeRepository {
    pool: PgPool,
}

impl ChallengeRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn get_challenge(&self, id: Uuid) -> Result<Option<Challenge>> {
        let sql = format!("SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE id = $1");
        let challenge = sqlx::query_as::<_, Challenge>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(challenge)
    }

    /// 列出商户全部挑战（含暂停），按创建顺序，评估顺序与此一致
    pub async fn list_by_merchant(&self, merchant_id: Uuid) -> Result<Vec<Challenge>> {
        let sql = format!(
            "SELECT {CHALLENGE_COLUMNS} FROM challenges WHERE merchant_id = $1 ORDER BY created_at, id"
        );
        let challenges = sqlx::query_as::<_, Challenge>(&sql)
            .bind(merchant_id)
            .fetch_all(&self.pool)
            .await?;

        Ok(challenges)
    }

    pub async fn create_challenge(&self, challenge: &Challenge) -> Result<()> {
        let sql = format!(
            r#"
            INSERT INTO challenges ({CHALLENGE_COLUMNS})
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            "#
        );
        sqlx::query(&sql)
            .bind(challenge.id)
            .bind(challenge.merchant_id)
            .bind(&challenge.name)
            .bind(&challenge.description)
            .bind(Json(&challenge.rule))
            .bind(challenge.points)
            .bind(challenge.status)
            .bind(challenge.version)
            .bind(challenge.starts_at)
            .bind(challenge.ends_at)
            .bind(challenge.created_at)
            .bind(challenge.updated_at)
            .execute(&self.pool)
            .await?;

        Ok(())
    }

    /// 按版本号条件更新
    pub async fn update_challenge(
        &self,
        challenge: &Challenge,
        expected_version: i32,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            UPDATE challenges
            SET name = $3, description = $4, rule = $5, points = $6, status = $7,
                version = $8, starts_at = $9, ends_at = $10, updated_at = $11
            WHERE id = $1 AND version = $2
            "#,
        )
        .bind(challenge.id)
        .bind(expected_version)
        .bind(&challenge.name)
        .bind(&challenge.description)
        .bind(Json(&challenge.rule))
        .bind(challenge.points)
        .bind(challenge.status)
        .bind(challenge.version)
        .bind(challenge.starts_at)
        .bind(challenge.ends_at)
        .bind(challenge.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 暂停/恢复不改变规则，版本号不变
    pub async fn set_status(&self, id: Uuid, status: ChallengeStatus) -> Result<bool> {
        let result =
            sqlx::query("UPDATE challenges SET status = $2, updated_at = NOW() WHERE id = $1")
                .bind(id)
                .bind(status)
                .execute(&self.pool)
                .await?;

        Ok(result.rows_affected() == 1)
    }

    /// 账本提交对引用的挑战持有共享锁，删除会等待其结束
    pub async fn delete_challenge(&self, id: Uuid) -> Result<bool> {
        let pattern = serde_json::json!([{ "challengeId": id }]);
        let result = sqlx::query(
            r#"
            DELETE FROM challenges
            WHERE id = $1
              AND NOT EXISTS (SELECT 1 FROM ledger_entries WHERE challenge_bonuses @> $2)
            "#,
        )
        .bind(id)
        .bind(Json(pattern))
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() == 1)
    }
}

#[async_trait]
impl ChallengeRepositoryTrait for ChallengeRepository {
    async fn get_challenge(&self, id: Uuid) -> Result<Option<Challenge>> {
        self.get_challenge(id).await
    }

    async fn list_by_merchant(&self, merchant_id: Uuid) -> Result<Vec<Challenge>> {
        self.list_by_merchant(merchant_id).await
    }

    async fn create_challenge(&self, challenge: &Challenge) -> Result<()> {
        self.create_challenge(challenge).await
    }

    async fn update_challenge(
        &self,
        challenge: &Challenge,
        expected_version: i32,
    ) -> Result<bool> {
        self.update_challenge(challenge, expected_version).await
    }

    async fn set_status(&self, id: Uuid, status: ChallengeStatus) -> Result<bool> {
        self.set_status(id, status).await
    }

    async fn delete_challenge(&self, id: Uuid) -> Result<bool> {
        self.delete_challenge(id).await
    }
}
