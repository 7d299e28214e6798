//! 礼品卡状态机
//!
//! `available -> redeemed | expired`，终态不可再变。
//! 这里只负责内存中的状态推进，持久化由服务层以"比较并设置"方式完成。

use chrono::{DateTime, Utc};

use crate::error::{Result, RewardsError};
use crate::models::{GiftCard, GiftCardStatus};

/// 核销礼品卡
///
/// 已超过有效期的卡会被推进到 `expired` 并返回 `Expired`，调用方需要持久化这次变更
pub fn redeem(card: &mut GiftCard, now: DateTime<Utc>) -> Result<()> {
    match card.status {
        GiftCardStatus::Redeemed => return Err(RewardsError::AlreadyRedeemed(card.id)),
        GiftCardStatus::Expired => return Err(RewardsError::AlreadyExpired(card.id)),
        GiftCardStatus::Available => {}
    }

    if expire_if_overdue(card, now) {
        return Err(RewardsError::Expired(card.id));
    }

    card.status = GiftCardStatus::Redeemed;
    card.redeemed_at = Some(now);
    Ok(())
}

/// 惰性过期：可用且已过有效期的卡推进到 `expired`
///
/// 返回是否发生了状态变更
pub fn expire_if_overdue(card: &mut GiftCard, now: DateTime<Utc>) -> bool {
    if card.status != GiftCardStatus::Available || !card.is_past_expiry(now) {
        return false;
    }
    card.status = GiftCardStatus::Expired;
    card.expired_at = Some(now);
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use rust_decimal::Decimal;
    use uuid::Uuid;

    fn card(expires_at: Option<DateTime<Utc>>) -> GiftCard {
        GiftCard {
            id: Uuid::now_v7(),
            customer_id: Uuid::now_v7(),
            merchant_id: Uuid::now_v7(),
            code: "GC-2345-6789".to_string(),
            value: Decimal::new(5, 0),
            status: GiftCardStatus::Available,
            milestone: 1,
            issued_at: Utc::now(),
            redeemed_at: None,
            expires_at,
            expired_at: None,
        }
    }

    #[test]
    fn test_redeem_available() {
        let now = Utc::now();
        let mut c = card(None);
        redeem(&mut c, now).unwrap();
        assert_eq!(c.status, GiftCardStatus::Redeemed);
        assert_eq!(c.redeemed_at, Some(now));
    }

    #[test]
    fn test_redeem_twice() {
        let now = Utc::now();
        let mut c = card(None);
        redeem(&mut c, now).unwrap();
        let err = redeem(&mut c, now).unwrap_err();
        assert!(matches!(err, RewardsError::AlreadyRedeemed(_)));
    }

    #[test]
    fn test_redeem_overdue_flips_to_expired() {
        let now = Utc::now();
        let mut c = card(Some(now - Duration::hours(1)));
        let err = redeem(&mut c, now).unwrap_err();
        assert!(matches!(err, RewardsError::Expired(_)));
        assert_eq!(c.status, GiftCardStatus::Expired);
        assert_eq!(c.expired_at, Some(now));
        assert!(c.redeemed_at.is_none());

        // 再次核销得到终态错误
        let err = redeem(&mut c, now).unwrap_err();
        assert!(matches!(err, RewardsError::AlreadyExpired(_)));
    }

    #[test]
    fn test_redeem_at_expiry_instant() {
        let now = Utc::now();
        let mut c = card(Some(now));
        assert!(redeem(&mut c, now).is_ok());
    }

    #[test]
    fn test_expire_if_overdue_ignores_terminal_cards() {
        let now = Utc::now();
        let mut c = card(Some(now - Duration::days(1)));
        c.status = GiftCardStatus::Redeemed;
        assert!(!expire_if_overdue(&mut c, now));
        assert_eq!(c.status, GiftCardStatus::Redeemed);

        let mut c = card(Some(now + Duration::days(1)));
        assert!(!expire_if_overdue(&mut c, now));
    }
}
