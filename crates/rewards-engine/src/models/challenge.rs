//! 挑战定义
//!
//! 挑战规则是按类型区分的和类型，评估器对其做穷尽匹配

use chrono::{DateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::{ChallengeStatus, FrequencyPeriod};

/// 挑战规则
///
/// JSON 形如 `{"type": "amount_min", "minAmount": "50.00"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum ChallengeRule {
    /// 单笔消费金额不低于 `min_amount`
    AmountMin { min_amount: Decimal },
    /// 商户本地时间落在 `[start_time, end_time]`，`start_time > end_time` 表示跨午夜
    TimeBased {
        start_time: NaiveTime,
        end_time: NaiveTime,
    },
    /// 统计周期内到店次数达到 `visits_required`，每个周期最多奖励一次
    Frequency {
        period: FrequencyPeriod,
        visits_required: u32,
    },
    /// 消费品类命中 `categories` 之一
    Category { categories: Vec<String> },
}

impl ChallengeRule {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AmountMin { .. } => "amount_min",
            Self::TimeBased { .. } => "time_based",
            Self::Frequency { .. } => "frequency",
            Self::Category { .. } => "category",
        }
    }

    /// 校验规则配置
    pub fn validate(&self) -> Result<(), String> {
        match self {
            Self::AmountMin { min_amount } if min_amount.is_sign_negative() => {
                Err("minAmount 不能为负数".to_string())
            }
            Self::TimeBased {
                start_time,
                end_time,
            } if start_time == end_time => Err("startTime 与 endTime 不能相同".to_string()),
            Self::Frequency {
                visits_required, ..
            } if *visits_required == 0 => Err("visitsRequired 必须大于 0".to_string()),
            Self::Category { categories } if categories.iter().all(|c| c.trim().is_empty()) => {
                Err("categories 不能为空".to_string())
            }
            _ => Ok(()),
        }
    }
}

/// 商户定义的挑战
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Challenge {
    pub id: Uuid,
    pub merchant_id: Uuid,
    pub name: String,
    #[sqlx(default)]
    pub description: Option<String>,
    #[sqlx(json)]
    pub rule: ChallengeRule,
    /// 满足时奖励的积分
    pub points: i64,
    pub status: ChallengeStatus,
    /// 每次编辑 +1，奖励快照记录当时的版本
    pub version: i32,
    /// 生效开始时间（为空表示立即生效）
    #[sqlx(default)]
    pub starts_at: Option<DateTime<Utc>>,
    /// 生效结束时间（为空表示长期有效）
    #[sqlx(default)]
    pub ends_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Challenge {
    pub fn new(merchant_id: Uuid, name: impl Into<String>, rule: ChallengeRule, points: i64) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(),
            merchant_id,
            name: name.into(),
            description: None,
            rule,
            points,
            status: ChallengeStatus::Active,
            version: 1,
            starts_at: None,
            ends_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_window(
        mut self,
        starts_at: Option<DateTime<Utc>>,
        ends_at: Option<DateTime<Utc>>,
    ) -> Self {
        self.starts_at = starts_at;
        self.ends_at = ends_at;
        self
    }

    pub fn paused(mut self) -> Self {
        self.status = ChallengeStatus::Paused;
        self
    }

    /// 检查挑战在给定时刻是否参与评估
    pub fn is_active(&self, now: DateTime<Utc>) -> bool {
        if self.status != ChallengeStatus::Active {
            return false;
        }

        let after_start = self.starts_at.is_none_or(|t| now >= t);
        let before_end = self.ends_at.is_none_or(|t| now <= t);

        after_start && before_end
    }

    /// 生成奖励快照
    pub fn bonus(&self, points: i64) -> ChallengeBonus {
        ChallengeBonus {
            challenge_id: self.id,
            challenge_version: self.version,
            name: self.name.clone(),
            points,
        }
    }
}

/// 单个挑战对一笔交易贡献的奖励
///
/// 同时作为账本条目里的快照，挑战后续被编辑不影响历史描述
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeBonus {
    pub challenge_id: Uuid,
    pub challenge_version: i32,
    pub name: String,
    pub points: i64,
}
