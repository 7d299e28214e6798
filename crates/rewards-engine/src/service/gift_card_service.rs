//! 礼品卡服务
//!
//! 核销、查询（惰性过期）、批量过期与补发。
//! 所有状态写入都以旧状态为条件，并发核销同一张卡只有一个成功。

use std::sync::Arc;

use chrono::{DateTime, Utc};
use loyalty_shared::observability::metrics as obs;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::dto::ExpireSummary;
use crate::error::{Result, RewardsError};
use crate::gift_card::{GiftCardIssuer, lifecycle, normalize_code};
use crate::models::{GiftCard, GiftCardStatus, MerchantConfig};
use crate::repository::{CustomerRepositoryTrait, GiftCardRepositoryTrait};

/// 礼品卡服务
#[derive(Clone)]
pub struct GiftCardService {
    gift_cards: Arc<dyn GiftCardRepositoryTrait>,
    customers: Arc<dyn CustomerRepositoryTrait>,
}

impl GiftCardService {
    pub fn new(
        gift_cards: Arc<dyn GiftCardRepositoryTrait>,
        customers: Arc<dyn CustomerRepositoryTrait>,
    ) -> Self {
        Self {
            gift_cards,
            customers,
        }
    }

    /// 按 ID 核销
    #[instrument(skip(self))]
    pub async fn redeem(&self, gift_card_id: Uuid, now: DateTime<Utc>) -> Result<GiftCard> {
        let card = self
            .gift_cards
            .get_gift_card(gift_card_id)
            .await?
            .ok_or_else(|| RewardsError::GiftCardNotFound(gift_card_id.to_string()))?;
        self.redeem_card(card, now).await
    }

    /// 按卡号核销（POS 操作员输入）
    ///
    /// 卡号不区分大小写，忽略空白；卡必须属于当前商户
    #[instrument(skip(self, code))]
    pub async fn redeem_by_code(
        &self,
        merchant_id: Uuid,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<GiftCard> {
        let code = normalize_code(code);
        let card = self
            .gift_cards
            .get_by_code(&code)
            .await?
            .ok_or_else(|| RewardsError::GiftCardNotFound(code.clone()))?;

        if card.merchant_id != merchant_id {
            // 不向其他商户暴露卡号是否存在
            return Err(RewardsError::GiftCardNotFound(code));
        }
        self.redeem_card(card, now).await
    }

    async fn redeem_card(&self, mut card: GiftCard, now: DateTime<Utc>) -> Result<GiftCard> {
        let result = match lifecycle::redeem(&mut card, now) {
            Ok(()) => {
                if self
                    .gift_cards
                    .transition_status(&card, GiftCardStatus::Available)
                    .await?
                {
                    info!(gift_card_id = %card.id, code = %card.code, "礼品卡已核销");
                    Ok(card)
                } else {
                    Err(self.lost_race(card.id).await)
                }
            }
            Err(RewardsError::Expired(id)) => {
                if self
                    .gift_cards
                    .transition_status(&card, GiftCardStatus::Available)
                    .await?
                {
                    obs::record_gift_cards_expired(1);
                    info!(gift_card_id = %id, "核销时发现已过有效期，标记为过期");
                    Err(RewardsError::Expired(id))
                } else {
                    Err(self.lost_race(id).await)
                }
            }
            Err(e) => Err(e),
        };

        let status = match &result {
            Ok(_) => "redeemed",
            Err(e) => e.error_code(),
        };
        obs::record_gift_card_redemption(status);

        result
    }

    /// 条件写入失败：重新读取当前状态，给出对应的终态错误
    async fn lost_race(&self, id: Uuid) -> RewardsError {
        match self.gift_cards.get_gift_card(id).await {
            Ok(Some(current)) => match current.status {
                GiftCardStatus::Redeemed => RewardsError::AlreadyRedeemed(id),
                GiftCardStatus::Expired => RewardsError::AlreadyExpired(id),
                GiftCardStatus::Available => RewardsError::ConcurrencyConflict,
            },
            Ok(None) => RewardsError::GiftCardNotFound(id.to_string()),
            Err(e) => e,
        }
    }

    /// 查询单张礼品卡，已过有效期的顺带推进为过期
    pub async fn get_gift_card(&self, id: Uuid, now: DateTime<Utc>) -> Result<GiftCard> {
        let card = self
            .gift_cards
            .get_gift_card(id)
            .await?
            .ok_or_else(|| RewardsError::GiftCardNotFound(id.to_string()))?;
        self.apply_lazy_expiry(card, now).await
    }

    /// 列出顾客的礼品卡
    ///
    /// 先做惰性过期再按状态过滤，过期卡不会出现在 `available` 结果里
    #[instrument(skip(self))]
    pub async fn list_gift_cards(
        &self,
        customer_id: Uuid,
        status: Option<GiftCardStatus>,
        now: DateTime<Utc>,
    ) -> Result<Vec<GiftCard>> {
        let cards = self.gift_cards.list_by_customer(customer_id, None).await?;

        let mut result = Vec::with_capacity(cards.len());
        for card in cards {
            let card = self.apply_lazy_expiry(card, now).await?;
            if status.is_none_or(|s| card.status == s) {
                result.push(card);
            }
        }
        Ok(result)
    }

    async fn apply_lazy_expiry(&self, mut card: GiftCard, now: DateTime<Utc>) -> Result<GiftCard> {
        if !lifecycle::expire_if_overdue(&mut card, now) {
            return Ok(card);
        }

        if self
            .gift_cards
            .transition_status(&card, GiftCardStatus::Available)
            .await?
        {
            obs::record_gift_cards_expired(1);
            return Ok(card);
        }

        // 被并发核销或过期抢先，以存储中的状态为准
        self.gift_cards
            .get_gift_card(card.id)
            .await?
            .ok_or_else(|| RewardsError::GiftCardNotFound(card.id.to_string()))
    }

    /// 批量过期已超过有效期的可用礼品卡
    #[instrument(skip(self))]
    pub async fn expire_overdue(&self, now: DateTime<Utc>, limit: i64) -> Result<ExpireSummary> {
        let overdue = self.gift_cards.list_overdue(now, limit).await?;
        let mut summary = ExpireSummary {
            scanned: overdue.len(),
            expired: 0,
        };

        for mut card in overdue {
            if !lifecycle::expire_if_overdue(&mut card, now) {
                continue;
            }
            if self
                .gift_cards
                .transition_status(&card, GiftCardStatus::Available)
                .await?
            {
                summary.expired += 1;
            }
        }

        if summary.expired > 0 {
            obs::record_gift_cards_expired(summary.expired as u64);
            info!(expired = summary.expired, "礼品卡过期处理完成");
        }
        Ok(summary)
    }

    /// 按累计积分补发缺失的礼品卡
    ///
    /// 可重复执行，已发放的门槛倍数不会重复发放
    #[instrument(skip(self, config))]
    pub async fn reconcile(
        &self,
        customer_id: Uuid,
        config: &MerchantConfig,
        now: DateTime<Utc>,
    ) -> Result<Vec<GiftCard>> {
        let customer = self
            .customers
            .get_customer(customer_id)
            .await?
            .ok_or(RewardsError::CustomerNotFound(customer_id))?;
        if customer.merchant_id != config.merchant_id {
            return Err(RewardsError::MerchantMismatch {
                expected: customer.merchant_id,
                actual: config.merchant_id,
            });
        }

        let milestones = self.gift_cards.list_milestones(customer_id).await?;
        let missing = GiftCardIssuer::reconcile(
            customer.id,
            customer.merchant_id,
            customer.lifetime_points,
            &milestones,
            config,
            now,
        );
        if missing.is_empty() {
            return Ok(Vec::new());
        }

        let inserted = self.gift_cards.insert_gift_cards(&missing).await?;
        if !inserted.is_empty() {
            obs::record_gift_cards_issued(inserted.len() as u64, "reconcile");
            warn!(
                customer_id = %customer_id,
                count = inserted.len(),
                lifetime_points = customer.lifetime_points,
                "补发缺失的礼品卡"
            );
        }
        Ok(inserted)
    }
}
