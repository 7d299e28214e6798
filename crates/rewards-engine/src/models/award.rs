//! 积分计算的输入与结果值对象（不直接持久化）

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::challenge::ChallengeBonus;

/// 一笔待计分的消费
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Purchase {
    pub amount: Decimal,
    /// 消费品类标签（由 POS 传入）
    pub category: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

impl Purchase {
    pub fn new(amount: Decimal, occurred_at: DateTime<Utc>) -> Self {
        Self {
            amount,
            category: None,
            occurred_at,
        }
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

/// 每日上限截断报告
///
/// 基础积分优先保留，挑战奖励按评估顺序先被削减或丢弃
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DailyLimitClamp {
    pub daily_limit: i64,
    pub points_today: i64,
    /// 截断前应得积分
    pub requested_points: i64,
    /// 截断后实得积分
    pub granted_points: i64,
    /// 被部分削减或完全丢弃的挑战奖励（记录原始奖励值）
    pub reduced_bonuses: Vec<ChallengeBonus>,
}

/// 积分计算结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PointsAward {
    pub base_points: i64,
    /// 实际计入的挑战奖励（截断后，不含被丢弃的）
    pub bonuses: Vec<ChallengeBonus>,
    pub total_points: i64,
    pub clamp: Option<DailyLimitClamp>,
}

impl PointsAward {
    pub fn bonus_points(&self) -> i64 {
        self.bonuses.iter().map(|b| b.points).sum()
    }

    pub fn is_clamped(&self) -> bool {
        self.clamp.is_some()
    }

    /// 账本条目描述
    pub fn describe(&self) -> String {
        if self.bonuses.is_empty() {
            return format!("消费积分 {}", self.base_points);
        }
        let names: Vec<&str> = self.bonuses.iter().map(|b| b.name.as_str()).collect();
        format!(
            "消费积分 {} + 挑战奖励 {}（{}）",
            self.base_points,
            self.bonus_points(),
            names.join("、")
        )
    }
}

/// 计算器输出
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case", rename_all_fields = "camelCase")]
pub enum PointsOutcome {
    /// 正常计分（可能已按每日上限截断）
    Awarded(PointsAward),
    /// 低于最低消费，不计分，调用方不应写账本
    BelowMinimumPurchase { amount: Decimal, minimum: Decimal },
}

impl PointsOutcome {
    pub fn award(&self) -> Option<&PointsAward> {
        match self {
            Self::Awarded(award) => Some(award),
            Self::BelowMinimumPurchase { .. } => None,
        }
    }

    pub fn total_points(&self) -> i64 {
        self.award().map_or(0, |a| a.total_points)
    }
}
