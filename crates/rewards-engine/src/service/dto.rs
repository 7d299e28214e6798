//! 服务层数据传输对象
//!
//! 定义服务层与外部（POS、后台）交互使用的请求与结果

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AppendReceipt, ChallengeRule, Customer, PointsOutcome, Visit};

/// 到店签到请求
///
/// 以手机号识别顾客，首次到店自动建档
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInRequest {
    pub merchant_id: Uuid,
    pub phone: String,
    pub name: String,
    /// 到店时间（为空时取当前时间）
    pub visited_at: Option<DateTime<Utc>>,
}

/// 签到结果
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckInResult {
    pub customer: Customer,
    pub visit: Visit,
    pub is_new_customer: bool,
}

/// 消费记分请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordPurchaseRequest {
    pub merchant_id: Uuid,
    pub customer_id: Uuid,
    pub amount: Decimal,
    pub category: Option<String>,
    /// POS 交易号，用于派生幂等键
    pub transaction_id: String,
    pub occurred_at: Option<DateTime<Utc>>,
    pub operator: Option<String>,
}

impl RecordPurchaseRequest {
    pub fn new(
        merchant_id: Uuid,
        customer_id: Uuid,
        amount: Decimal,
        transaction_id: impl Into<String>,
    ) -> Self {
        Self {
            merchant_id,
            customer_id,
            amount,
            category: None,
            transaction_id: transaction_id.into(),
            occurred_at: None,
            operator: None,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// 同一笔交易重试时得到相同的幂等键
    pub fn idempotency_key(&self) -> String {
        format!("purchase:{}", self.transaction_id)
    }
}

/// 消费记分结果
///
/// 不计分（低于最低消费、当日额度已满）时 `receipt` 为空
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseResult {
    pub outcome: PointsOutcome,
    pub receipt: Option<AppendReceipt>,
}

/// 余额核对报告
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceReport {
    pub customer_id: Uuid,
    /// 顾客记录上的余额投影
    pub projected_balance: i64,
    /// 账本变动之和
    pub ledger_balance: i64,
    pub projected_lifetime: i64,
    pub ledger_lifetime: i64,
}

impl BalanceReport {
    pub fn is_consistent(&self) -> bool {
        self.projected_balance == self.ledger_balance
            && self.projected_lifetime == self.ledger_lifetime
    }
}

/// 创建挑战请求
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChallengeRequest {
    pub merchant_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub rule: ChallengeRule,
    pub points: i64,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// 更新挑战请求（为空的字段不修改）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateChallengeRequest {
    pub name: Option<String>,
    pub description: Option<String>,
    pub rule: Option<ChallengeRule>,
    pub points: Option<i64>,
    pub starts_at: Option<DateTime<Utc>>,
    pub ends_at: Option<DateTime<Utc>>,
}

/// 过期清理结果
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpireSummary {
    /// 本批扫描到的过期卡
    pub scanned: usize,
    /// 实际推进为 expired 的卡
    pub expired: usize,
}
