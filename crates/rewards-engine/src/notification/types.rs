//! 通知类型定义

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Customer, GiftCard, PointsAward};

/// 通知类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    PointsAwarded,
    GiftCardIssued,
    GiftCardRedeemed,
}

/// 通知请求
///
/// 只携带渲染好的文案和业务数据，投递渠道（WhatsApp 等）由分发器决定
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub notification_id: Uuid,
    pub customer_id: Uuid,
    pub merchant_id: Uuid,
    /// 顾客手机号，投递地址
    pub phone: String,
    pub notification_type: NotificationType,
    pub title: String,
    pub body: String,
    /// 通知携带的业务数据
    pub data: HashMap<String, serde_json::Value>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    pub fn new(
        customer: &Customer,
        notification_type: NotificationType,
        title: impl Into<String>,
        body: impl Into<String>,
    ) -> Self {
        Self {
            notification_id: Uuid::now_v7(),
            customer_id: customer.id,
            merchant_id: customer.merchant_id,
            phone: customer.phone.clone(),
            notification_type,
            title: title.into(),
            body: body.into(),
            data: HashMap::new(),
            created_at: Utc::now(),
        }
    }

    /// 添加业务数据
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }
}

/// 通知构建器
pub struct NotificationBuilder;

impl NotificationBuilder {
    /// 积分到账通知
    pub fn points_awarded(customer: &Customer, award: &PointsAward) -> Notification {
        let mut body = format!(
            "{}，本次获得 {} 积分，当前余额 {} 积分。",
            customer.name, award.total_points, customer.balance
        );
        if award.is_clamped() {
            body.push_str("今日积分已达上限。");
        }

        Notification::new(customer, NotificationType::PointsAwarded, "积分到账", body)
            .with_data("totalPoints", serde_json::json!(award.total_points))
            .with_data("basePoints", serde_json::json!(award.base_points))
            .with_data("balance", serde_json::json!(customer.balance))
    }

    /// 礼品卡发放通知
    pub fn gift_card_issued(customer: &Customer, card: &GiftCard) -> Notification {
        let mut body = format!(
            "恭喜 {}，您获得一张面值 {} 的礼品卡，卡号 {}。",
            customer.name, card.value, card.code
        );
        if let Some(expires_at) = card.expires_at {
            body.push_str(&format!("有效期至 {}。", expires_at.format("%Y-%m-%d")));
        }

        Notification::new(customer, NotificationType::GiftCardIssued, "获得礼品卡", body)
            .with_data("giftCardId", serde_json::json!(card.id))
            .with_data("code", serde_json::json!(card.code))
            .with_data("value", serde_json::json!(card.value))
    }

    /// 礼品卡核销通知
    pub fn gift_card_redeemed(customer: &Customer, card: &GiftCard) -> Notification {
        let body = format!("礼品卡 {} 已核销，面值 {}。", card.code, card.value);
        Notification::new(customer, NotificationType::GiftCardRedeemed, "礼品卡已使用", body)
            .with_data("giftCardId", serde_json::json!(card.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::GiftCardStatus;
    use rust_decimal::Decimal;

    fn customer() -> Customer {
        let mut c = Customer::new(Uuid::now_v7(), "5215550001", "Ana");
        c.balance = 105;
        c
    }

    #[test]
    fn test_points_awarded_notification() {
        let award = PointsAward {
            base_points: 25,
            bonuses: Vec::new(),
            total_points: 25,
            clamp: None,
        };
        let n = NotificationBuilder::points_awarded(&customer(), &award);
        assert_eq!(n.notification_type, NotificationType::PointsAwarded);
        assert!(n.body.contains("25"));
        assert!(n.body.contains("105"));
        assert_eq!(n.phone, "5215550001");
    }

    #[test]
    fn test_gift_card_issued_notification() {
        let c = customer();
        let card = GiftCard {
            id: Uuid::now_v7(),
            customer_id: c.id,
            merchant_id: c.merchant_id,
            code: "GC-2345-6789".to_string(),
            value: Decimal::new(5, 0),
            status: GiftCardStatus::Available,
            milestone: 1,
            issued_at: Utc::now(),
            redeemed_at: None,
            expires_at: None,
            expired_at: None,
        };
        let n = NotificationBuilder::gift_card_issued(&c, &card);
        assert!(n.body.contains("GC-2345-6789"));
        assert_eq!(n.data["code"], serde_json::json!("GC-2345-6789"));
    }
}
