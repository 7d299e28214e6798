//! 积分账本
//!
//! 账本只追加不修改，更正通过追加冲正条目完成

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::award::DailyLimitClamp;
use super::challenge::ChallengeBonus;
use super::customer::{Customer, Visit};
use super::enums::EntryKind;
use super::gift_card::GiftCard;

/// 账本条目
///
/// 每条记录包含带符号的变动值和变动后余额，余额可由条目逐条累加复算
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub merchant_id: Uuid,
    pub kind: EntryKind,
    /// 带符号的积分变动
    pub delta: i64,
    /// 变动后的余额
    pub balance_after: i64,
    #[sqlx(default)]
    pub description: Option<String>,
    /// 产生该条目的消费金额
    #[sqlx(default)]
    pub purchase_amount: Option<Decimal>,
    /// 来源交易派生的幂等键，同一商户内唯一
    pub idempotency_key: String,
    /// 挑战奖励快照
    #[sqlx(json)]
    pub challenge_bonuses: Vec<ChallengeBonus>,
    /// 日上限截断报告，重放时原样返回
    #[sqlx(json)]
    #[serde(default)]
    pub daily_limit_clamp: Option<DailyLimitClamp>,
    /// 操作员（POS 账号等）
    #[sqlx(default)]
    pub operator: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl LedgerEntry {
    /// 是否计入累计获得积分
    pub fn lifetime_contribution(&self) -> i64 {
        self.delta.max(0)
    }
}

/// 账本追加请求
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendRequest {
    pub customer_id: Uuid,
    pub merchant_id: Uuid,
    pub kind: EntryKind,
    pub delta: i64,
    pub idempotency_key: String,
    pub description: Option<String>,
    pub purchase_amount: Option<Decimal>,
    #[serde(default)]
    pub challenge_bonuses: Vec<ChallengeBonus>,
    #[serde(default)]
    pub daily_limit_clamp: Option<DailyLimitClamp>,
    pub operator: Option<String>,
    /// 业务发生时间（为空时取当前时间）
    pub occurred_at: Option<DateTime<Utc>>,
    /// 与条目同事务写入的到店记录
    #[serde(default)]
    pub visit: Option<Visit>,
}

impl AppendRequest {
    pub fn new(
        customer_id: Uuid,
        merchant_id: Uuid,
        kind: EntryKind,
        delta: i64,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            customer_id,
            merchant_id,
            kind,
            delta,
            idempotency_key: idempotency_key.into(),
            description: None,
            purchase_amount: None,
            challenge_bonuses: Vec::new(),
            daily_limit_clamp: None,
            operator: None,
            occurred_at: None,
            visit: None,
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_purchase_amount(mut self, amount: Decimal) -> Self {
        self.purchase_amount = Some(amount);
        self
    }

    pub fn with_bonuses(mut self, bonuses: Vec<ChallengeBonus>) -> Self {
        self.challenge_bonuses = bonuses;
        self
    }

    pub fn with_clamp(mut self, clamp: Option<DailyLimitClamp>) -> Self {
        self.daily_limit_clamp = clamp;
        self
    }

    pub fn with_visit(mut self, visit: Visit) -> Self {
        self.visit = Some(visit);
        self
    }

    pub fn with_operator(mut self, operator: impl Into<String>) -> Self {
        self.operator = Some(operator.into());
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// 同一幂等键的重放是否与原请求一致
    pub fn matches_entry(&self, entry: &LedgerEntry) -> bool {
        entry.customer_id == self.customer_id
            && entry.merchant_id == self.merchant_id
            && entry.kind == self.kind
            && entry.delta == self.delta
    }
}

/// 一次原子提交的内容
///
/// 仓储必须在同一事务内完成：版本校验 + 条目写入 + 顾客投影更新 + 礼品卡写入 + 到店记录
#[derive(Debug, Clone)]
pub struct LedgerCommit {
    /// 提交前读取到的顾客版本号
    pub expected_version: i64,
    pub entry: LedgerEntry,
    /// 提交后的顾客投影
    pub customer: Customer,
    /// 由本次余额变动触发的礼品卡
    pub gift_cards: Vec<GiftCard>,
    /// 随本次消费写入的到店记录，已存在同键记录时跳过
    pub visit: Option<Visit>,
}

/// 追加结果状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppendStatus {
    /// 新写入
    Applied,
    /// 幂等重放，返回原条目，未产生任何变更
    Duplicate,
}

/// 账本追加回执
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendReceipt {
    pub status: AppendStatus,
    pub entry: LedgerEntry,
    pub customer: Customer,
    /// 本次追加新发放的礼品卡（重放时为空）
    pub issued_gift_cards: Vec<GiftCard>,
}

impl AppendReceipt {
    pub fn is_duplicate(&self) -> bool {
        self.status == AppendStatus::Duplicate
    }
}
