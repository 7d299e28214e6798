//! 顾客、到店记录与顾客活动快照

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::challenge::ChallengeBonus;

/// 顾客
///
/// `balance` 与 `lifetime_points` 是账本的物化投影，只随账本追加一起写入
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub phone: String,
    pub name: String,
    /// 当前可用积分，始终等于全部账本变动之和
    pub balance: i64,
    /// 累计获得积分（正向变动之和），只增不减，用于礼品卡门槛计算
    pub lifetime_points: i64,
    pub visit_count: i64,
    /// 乐观并发版本号，每次账本追加 +1
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Customer {
    /// 首次到店时创建的新顾客
    pub fn new(merchant_id: Uuid, phone: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            merchant_id,
            phone: phone.into(),
            name: name.into(),
            balance: 0,
            lifetime_points: 0,
            visit_count: 0,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 到店记录
///
/// 频次挑战按到店次数统计。带消费的到店以交易幂等键去重，签到不带键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub merchant_id: Uuid,
    #[sqlx(default)]
    pub purchase_amount: Option<Decimal>,
    #[sqlx(default)]
    pub category: Option<String>,
    /// 来源交易的幂等键，同一商户内唯一
    #[sqlx(default)]
    #[serde(default)]
    pub idempotency_key: Option<String>,
    pub visited_at: DateTime<Utc>,
}

impl Visit {
    pub fn new(customer_id: Uuid, merchant_id: Uuid, visited_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            customer_id,
            merchant_id,
            purchase_amount: None,
            category: None,
            idempotency_key: None,
            visited_at,
        }
    }

    pub fn with_purchase(mut self, amount: Decimal, category: Option<String>) -> Self {
        self.purchase_amount = Some(amount);
        self.category = category;
        self
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }
}

/// 历史挑战奖励记录（从账本条目的快照中提取）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeAwardRecord {
    pub challenge_id: Uuid,
    pub awarded_at: DateTime<Utc>,
}

/// 顾客近期活动快照
///
/// 由调用方组装后传入计算器，评估过程本身不访问存储
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerActivity {
    pub customer_id: Uuid,
    /// 当前交易之前的到店时间（不含本次）
    pub recent_visits: Vec<DateTime<Utc>>,
    /// 近期已发放的挑战奖励
    pub challenge_awards: Vec<ChallengeAwardRecord>,
    /// 商户本地自然日内已获得的消费积分
    pub points_today: i64,
}

impl CustomerActivity {
    pub fn new(customer_id: Uuid) -> Self {
        Self {
            customer_id,
            ..Default::default()
        }
    }

    pub fn with_visits(mut self, visits: Vec<DateTime<Utc>>) -> Self {
        self.recent_visits = visits;
        self
    }

    pub fn with_points_today(mut self, points_today: i64) -> Self {
        self.points_today = points_today;
        self
    }

    pub fn with_challenge_awards(mut self, awards: Vec<ChallengeAwardRecord>) -> Self {
        self.challenge_awards = awards;
        self
    }

    /// 从已发放奖励快照批量追加记录
    pub fn record_bonuses(&mut self, bonuses: &[ChallengeBonus], awarded_at: DateTime<Utc>) {
        self.challenge_awards
            .extend(bonuses.iter().map(|b| ChallengeAwardRecord {
                challenge_id: b.challenge_id,
                awarded_at,
            }));
    }
}
