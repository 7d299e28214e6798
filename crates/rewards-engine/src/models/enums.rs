//! 积分引擎枚举类型定义
//!
//! 所有枚举都支持数据库（sqlx）和 JSON（serde）序列化

use serde::{Deserialize, Serialize};

/// 账本条目类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum EntryKind {
    /// 消费获得（+）
    Earn,
    /// 人工调整（±），用于冲正或补发
    Adjustment,
    /// 积分兑换消耗（-）
    Redemption,
}

impl EntryKind {
    /// 是否允许把余额扣减为负数前直接拒绝
    ///
    /// 获得类条目只会增加余额，不参与余额不足校验
    pub fn is_debit_capable(&self) -> bool {
        matches!(self, Self::Adjustment | Self::Redemption)
    }

    /// 校验变动值的符号是否与条目类型相符
    pub fn accepts_delta(&self, delta: i64) -> bool {
        match self {
            Self::Earn => delta > 0,
            Self::Redemption => delta < 0,
            Self::Adjustment => delta != 0,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Earn => "earn",
            Self::Adjustment => "adjustment",
            Self::Redemption => "redemption",
        }
    }
}

/// 礼品卡状态
///
/// 只能前进：available -> redeemed | expired
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum GiftCardStatus {
    /// 可用 - 初始状态
    #[default]
    Available,
    /// 已核销 - 终态
    Redeemed,
    /// 已过期 - 终态
    Expired,
}

impl GiftCardStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Available)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Available => "available",
            Self::Redeemed => "redeemed",
            Self::Expired => "expired",
        }
    }
}

/// 挑战状态
///
/// 挑战不做物理删除，有历史奖励时只能暂停
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "varchar", rename_all = "snake_case")]
pub enum ChallengeStatus {
    #[default]
    Active,
    Paused,
}

/// 频次挑战的统计周期
///
/// 按商户本地日历对齐，不是滚动窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyPeriod {
    Daily,
    /// 周一为一周起点
    Weekly,
    Monthly,
}
