//! 礼品卡发放器
//!
//! 门槛计算基于累计获得积分（只增不减），跨越门槛不扣减积分。
//! 每张卡带有门槛倍数 `milestone`，存储层对 `(customer_id, milestone)` 做唯一约束，
//! 因此无论余额如何到达（一次大额、多次小额、人工调整），每个倍数最多发一张。

use chrono::{DateTime, Utc};
use tracing::debug;
use uuid::Uuid;

use super::code::generate_code;
use crate::models::{GiftCard, GiftCardStatus, MerchantConfig};

/// 礼品卡发放器
#[derive(Debug, Clone, Copy, Default)]
pub struct GiftCardIssuer;

impl GiftCardIssuer {
    /// 累计积分变动时计算应发放的礼品卡
    ///
    /// 张数 = floor(new/threshold) - floor(old/threshold)，不会为负
    pub fn on_balance_changed(
        customer_id: Uuid,
        merchant_id: Uuid,
        old_lifetime: i64,
        new_lifetime: i64,
        config: &MerchantConfig,
        now: DateTime<Utc>,
    ) -> Vec<GiftCard> {
        if !config.gift_cards_enabled() {
            return Vec::new();
        }

        let threshold = config.gift_card_threshold;
        let from = milestones_reached(old_lifetime, threshold);
        let to = milestones_reached(new_lifetime, threshold);
        if to <= from {
            return Vec::new();
        }

        debug!(
            customer_id = %customer_id,
            old_lifetime,
            new_lifetime,
            threshold,
            count = to - from,
            "跨越礼品卡门槛"
        );

        (from + 1..=to)
            .map(|milestone| Self::mint(customer_id, merchant_id, milestone, config, now))
            .collect()
    }

    /// 根据累计积分和已发放的门槛倍数，补齐缺失的礼品卡
    ///
    /// 可重复调用：已存在的倍数不会再次生成
    pub fn reconcile(
        customer_id: Uuid,
        merchant_id: Uuid,
        lifetime_points: i64,
        issued_milestones: &[i64],
        config: &MerchantConfig,
        now: DateTime<Utc>,
    ) -> Vec<GiftCard> {
        if !config.gift_cards_enabled() {
            return Vec::new();
        }

        let due = milestones_reached(lifetime_points, config.gift_card_threshold);
        (1..=due)
            .filter(|m| !issued_milestones.contains(m))
            .map(|milestone| Self::mint(customer_id, merchant_id, milestone, config, now))
            .collect()
    }

    fn mint(
        customer_id: Uuid,
        merchant_id: Uuid,
        milestone: i64,
        config: &MerchantConfig,
        now: DateTime<Utc>,
    ) -> GiftCard {
        GiftCard {
            id: Uuid::now_v7(),
            customer_id,
            merchant_id,
            code: generate_code(),
            value: config.gift_card_value,
            status: GiftCardStatus::Available,
            milestone,
            issued_at: now,
            redeemed_at: None,
            expires_at: config.gift_card_expiry().map(|d| now + d),
            expired_at: None,
        }
    }
}

fn milestones_reached(points: i64, threshold: i64) -> i64 {
    points.max(0).div_euclid(threshold)
}
