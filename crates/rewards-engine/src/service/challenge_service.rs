//! 挑战管理服务
//!
//! 编辑挑战时版本号 +1，历史奖励快照记录的是当时的版本。
//! 已有奖励引用的挑战不能删除，只能暂停。

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::dto::{CreateChallengeRequest, UpdateChallengeRequest};
use crate::error::{Result, RewardsError};
use crate::models::{Challenge, ChallengeStatus};
use crate::repository::{ChallengeRepositoryTrait, LedgerRepositoryTrait};

/// 挑战管理服务
#[derive(Clone)]
pub struct ChallengeService {
    challenges: Arc<dyn ChallengeRepositoryTrait>,
    ledger: Arc<dyn LedgerRepositoryTrait>,
}

impl ChallengeService {
    pub fn new(
        challenges: Arc<dyn ChallengeRepositoryTrait>,
        ledger: Arc<dyn LedgerRepositoryTrait>,
    ) -> Self {
        Self { challenges, ledger }
    }

    pub async fn list(&self, merchant_id: Uuid) -> Result<Vec<Challenge>> {
        self.challenges.list_by_merchant(merchant_id).await
    }

    pub async fn get(&self, id: Uuid) -> Result<Challenge> {
        self.challenges
            .get_challenge(id)
            .await?
            .ok_or(RewardsError::ChallengeNotFound(id))
    }

    #[instrument(skip(self, request), fields(merchant_id = %request.merchant_id, name = %request.name))]
    pub async fn create(&self, request: CreateChallengeRequest) -> Result<Challenge> {
        let mut challenge =
            Challenge::new(request.merchant_id, request.name, request.rule, request.points)
                .with_window(request.starts_at, request.ends_at);
        challenge.description = request.description;
        validate(&challenge)?;

        self.challenges.create_challenge(&challenge).await?;
        info!(challenge_id = %challenge.id, rule = challenge.rule.type_name(), "挑战已创建");
        Ok(challenge)
    }

    /// 更新挑战，版本号 +1
    ///
    /// 并发编辑时以版本号为条件，落后的一方得到 `ConcurrencyConflict`
    #[instrument(skip(self, request))]
    pub async fn update(&self, id: Uuid, request: UpdateChallengeRequest) -> Result<Challenge> {
        let current = self.get(id).await?;
        let expected_version = current.version;

        let mut updated = current;
        if let Some(name) = request.name {
            updated.name = name;
        }
        if let Some(description) = request.description {
            updated.description = Some(description);
        }
        if let Some(rule) = request.rule {
            updated.rule = rule;
        }
        if let Some(points) = request.points {
            updated.points = points;
        }
        if request.starts_at.is_some() {
            updated.starts_at = request.starts_at;
        }
        if request.ends_at.is_some() {
            updated.ends_at = request.ends_at;
        }
        updated.version = expected_version + 1;
        updated.updated_at = Utc::now();
        validate(&updated)?;

        if !self
            .challenges
            .update_challenge(&updated, expected_version)
            .await?
        {
            return Err(RewardsError::ConcurrencyConflict);
        }

        info!(challenge_id = %id, version = updated.version, "挑战已更新");
        Ok(updated)
    }

    pub async fn pause(&self, id: Uuid) -> Result<()> {
        self.set_status(id, ChallengeStatus::Paused).await
    }

    pub async fn resume(&self, id: Uuid) -> Result<()> {
        self.set_status(id, ChallengeStatus::Active).await
    }

    async fn set_status(&self, id: Uuid, status: ChallengeStatus) -> Result<()> {
        if !self.challenges.set_status(id, status).await? {
            return Err(RewardsError::ChallengeNotFound(id));
        }
        info!(challenge_id = %id, ?status, "挑战状态已变更");
        Ok(())
    }

    /// 删除挑战
    ///
    /// 有历史奖励引用时拒绝，调用方应改为暂停
    #[instrument(skip(self))]
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if self.challenges.delete_challenge(id).await? {
            info!(challenge_id = %id, "挑战已删除");
            return Ok(());
        }
        // 未删除时区分原因
        if self.ledger.has_challenge_awards(id).await? {
            return Err(RewardsError::ChallengeHasAwards(id));
        }
        Err(RewardsError::ChallengeNotFound(id))
    }
}

fn validate(challenge: &Challenge) -> Result<()> {
    if challenge.name.trim().is_empty() {
        return Err(RewardsError::Validation("挑战名称不能为空".to_string()));
    }
    if challenge.points < 0 {
        return Err(RewardsError::Validation("奖励积分不能为负数".to_string()));
    }
    if let (Some(start), Some(end)) = (challenge.starts_at, challenge.ends_at) {
        if start > end {
            return Err(RewardsError::Validation(
                "生效开始时间不能晚于结束时间".to_string(),
            ));
        }
    }
    challenge.rule.validate().map_err(RewardsError::Validation)
}
