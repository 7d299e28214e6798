//! 礼品卡实体定义

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::enums::GiftCardStatus;

/// 礼品卡
///
/// 由门槛跨越自动发放，只改状态不删除
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct GiftCard {
    pub id: Uuid,
    pub customer_id: Uuid,
    pub merchant_id: Uuid,
    /// 展示给顾客的卡号，全局唯一
    pub code: String,
    /// 面值
    pub value: Decimal,
    pub status: GiftCardStatus,
    /// 对应的门槛倍数（第几张），同一顾客内唯一
    pub milestone: i64,
    pub issued_at: DateTime<Utc>,
    #[sqlx(default)]
    pub redeemed_at: Option<DateTime<Utc>>,
    /// 到期时间（为空表示永久有效）
    #[sqlx(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[sqlx(default)]
    pub expired_at: Option<DateTime<Utc>>,
}

impl GiftCard {
    /// 是否已超过有效期（不看状态）
    pub fn is_past_expiry(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|t| now > t)
    }

    /// 可用且未过期
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        self.status == GiftCardStatus::Available && !self.is_past_expiry(now)
    }
}
