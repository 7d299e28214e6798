//! 仓储 Trait 定义
//!
//! 服务层只依赖这些接口，PostgreSQL 与内存实现可互换，也便于 mock 测试

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::Result;
use crate::models::{
    Challenge, ChallengeStatus, Customer, GiftCard, GiftCardStatus, LedgerCommit, LedgerEntry,
    MerchantConfig, Visit,
};

/// 顾客仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CustomerRepositoryTrait: Send + Sync {
    async fn get_customer(&self, id: Uuid) -> Result<Option<Customer>>;
    async fn find_by_phone(&self, merchant_id: Uuid, phone: &str) -> Result<Option<Customer>>;

    /// 创建顾客，同一商户下手机号已存在时返回已有记录
    async fn create_customer(&self, customer: &Customer) -> Result<Customer>;

    /// 写入到店记录并累加到店次数（不改变版本号）
    ///
    /// 同一商户内幂等键已存在时不写入，返回 false
    async fn record_visit(&self, visit: &Visit) -> Result<bool>;
    async fn find_visit_by_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<Visit>>;
    async fn list_visits_since(
        &self,
        customer_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<Visit>>;
}

/// 积分账本仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerRepositoryTrait: Send + Sync {
    async fn find_by_idempotency_key(
        &self,
        merchant_id: Uuid,
        idempotency_key: &str,
    ) -> Result<Option<LedgerEntry>>;

    /// 原子提交：版本校验、写条目、更新顾客投影、写礼品卡、写到店记录
    ///
    /// 版本不匹配或奖励引用的挑战已删除时返回 `ConcurrencyConflict`，不写入任何内容。
    /// 返回更新后的顾客和实际写入的礼品卡。
    async fn commit_append(&self, commit: &LedgerCommit) -> Result<(Customer, Vec<GiftCard>)>;

    /// 按时间倒序返回最近 `limit` 条
    async fn list_entries(&self, customer_id: Uuid, limit: i64) -> Result<Vec<LedgerEntry>>;
    async fn list_entries_since(
        &self,
        customer_id: Uuid,
        since: DateTime<Utc>,
    ) -> Result<Vec<LedgerEntry>>;

    /// 全部条目的 (变动之和, 正向变动之和)
    async fn sum_deltas(&self, customer_id: Uuid) -> Result<(i64, i64)>;

    /// 是否有账本条目引用了该挑战的奖励
    async fn has_challenge_awards(&self, challenge_id: Uuid) -> Result<bool>;
}

/// 礼品卡仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GiftCardRepositoryTrait: Send + Sync {
    async fn get_gift_card(&self, id: Uuid) -> Result<Option<GiftCard>>;
    async fn get_by_code(&self, code: &str) -> Result<Option<GiftCard>>;
    async fn list_by_customer(
        &self,
        customer_id: Uuid,
        status: Option<GiftCardStatus>,
    ) -> Result<Vec<GiftCard>>;
    async fn list_milestones(&self, customer_id: Uuid) -> Result<Vec<i64>>;

    /// 批量写入，`(customer_id, milestone)` 已存在的跳过，返回实际写入的卡
    async fn insert_gift_cards(&self, cards: &[GiftCard]) -> Result<Vec<GiftCard>>;

    /// 比较并设置：仅当当前状态为 `from` 时写入 `card` 的状态与时间戳
    async fn transition_status(&self, card: &GiftCard, from: GiftCardStatus) -> Result<bool>;

    /// 仍为可用状态但已超过有效期的卡
    async fn list_overdue(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<GiftCard>>;
}

/// 挑战仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChallengeRepositoryTrait: Send + Sync {
    async fn get_challenge(&self, id: Uuid) -> Result<Option<Challenge>>;
    async fn list_by_merchant(&self, merchant_id: Uuid) -> Result<Vec<Challenge>>;
    async fn create_challenge(&self, challenge: &Challenge) -> Result<()>;

    /// 按版本号条件更新，`challenge.version` 为新版本
    async fn update_challenge(&self, challenge: &Challenge, expected_version: i32)
    -> Result<bool>;
    async fn set_status(&self, id: Uuid, status: ChallengeStatus) -> Result<bool>;
    /// 仅当挑战存在且没有账本条目引用其奖励时删除，检查与删除在同一语句内完成
    async fn delete_challenge(&self, id: Uuid) -> Result<bool>;
}

/// 商户积分配置仓储接口
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MerchantSettingsRepositoryTrait: Send + Sync {
    async fn get_settings(&self, merchant_id: Uuid) -> Result<Option<MerchantConfig>>;
    async fn save_settings(&self, config: &MerchantConfig) -> Result<()>;
}
