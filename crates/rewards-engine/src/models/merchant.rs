//! 商户积分配置
//!
//! 每次调用显式传入，引擎内部不缓存也不持有全局"当前商户"

use chrono::Duration;
use chrono_tz::Tz;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Result, RewardsError};

/// 商户积分配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MerchantConfig {
    pub merchant_id: Uuid,
    /// 每单位消费金额获得的积分
    pub points_per_unit: Decimal,
    /// 最低计分消费金额
    pub minimum_purchase: Decimal,
    /// 每日积分上限（为空表示不限）
    pub daily_points_limit: Option<i64>,
    /// 礼品卡门槛积分（<= 0 表示不发放）
    pub gift_card_threshold: i64,
    /// 礼品卡面值
    pub gift_card_value: Decimal,
    /// 礼品卡有效天数（为空表示永久有效）
    pub gift_card_expiry_days: Option<i64>,
    /// 商户所在时区，用于时段挑战与自然日/周/月统计
    pub timezone: Tz,
}

impl MerchantConfig {
    /// 默认配置：1 积分/单位，无最低消费，100 积分换 5 元礼品卡
    pub fn new(merchant_id: Uuid) -> Self {
        Self {
            merchant_id,
            points_per_unit: Decimal::ONE,
            minimum_purchase: Decimal::ZERO,
            daily_points_limit: None,
            gift_card_threshold: 100,
            gift_card_value: Decimal::new(5, 0),
            gift_card_expiry_days: None,
            timezone: Tz::UTC,
        }
    }

    /// 校验配置
    pub fn validate(&self) -> Result<()> {
        if self.points_per_unit.is_sign_negative() {
            return Err(RewardsError::InvalidConfig(
                "pointsPerUnit 不能为负数".to_string(),
            ));
        }
        if self.minimum_purchase.is_sign_negative() {
            return Err(RewardsError::InvalidConfig(
                "minimumPurchase 不能为负数".to_string(),
            ));
        }
        if self.daily_points_limit.is_some_and(|limit| limit < 0) {
            return Err(RewardsError::InvalidConfig(
                "dailyPointsLimit 不能为负数".to_string(),
            ));
        }
        if self.gift_cards_enabled() && self.gift_card_value <= Decimal::ZERO {
            return Err(RewardsError::InvalidConfig(
                "giftCardValue 必须大于 0".to_string(),
            ));
        }
        if self.gift_card_expiry_days.is_some_and(|days| days <= 0) {
            return Err(RewardsError::InvalidConfig(
                "giftCardExpiryDays 必须大于 0".to_string(),
            ));
        }
        Ok(())
    }

    pub fn gift_cards_enabled(&self) -> bool {
        self.gift_card_threshold > 0
    }

    pub fn gift_card_expiry(&self) -> Option<Duration> {
        self.gift_card_expiry_days.map(Duration::days)
    }
}
