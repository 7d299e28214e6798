//! 积分计算器
//!
//! 基础积分 = floor(消费金额 × 每单位积分)，只在最后截断一次；
//! 挑战奖励由 [`ChallengeEvaluator`] 提供；每日上限只截断不拒绝。

use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use tracing::{debug, instrument};

use super::challenge_evaluator::ChallengeEvaluator;
use crate::error::{Result, RewardsError};
use crate::models::{
    Challenge, ChallengeBonus, CustomerActivity, DailyLimitClamp, MerchantConfig, PointsAward,
    PointsOutcome, Purchase,
};

/// 积分计算器
#[derive(Debug, Clone, Copy, Default)]
pub struct PointsCalculator;

impl PointsCalculator {
    pub fn new() -> Self {
        Self
    }

    /// 计算一笔消费应得的积分
    ///
    /// 低于最低消费时返回 `BelowMinimumPurchase`，不是错误
    #[instrument(skip_all, fields(merchant_id = %config.merchant_id, amount = %purchase.amount))]
    pub fn calculate(
        &self,
        purchase: &Purchase,
        config: &MerchantConfig,
        challenges: &[Challenge],
        activity: &CustomerActivity,
    ) -> Result<PointsOutcome> {
        config.validate()?;

        if purchase.amount.is_sign_negative() {
            return Err(RewardsError::InvalidAmount(purchase.amount));
        }

        if purchase.amount < config.minimum_purchase {
            debug!(minimum = %config.minimum_purchase, "低于最低消费，不计分");
            return Ok(PointsOutcome::BelowMinimumPurchase {
                amount: purchase.amount,
                minimum: config.minimum_purchase,
            });
        }

        let base_points = Self::base_points(purchase.amount, config.points_per_unit)?;

        let bonuses = ChallengeEvaluator::new(config.merchant_id, config.timezone).evaluate(
            purchase,
            challenges,
            activity,
        );

        let award = match config.daily_points_limit {
            Some(limit) => apply_daily_limit(base_points, bonuses, limit, activity.points_today),
            None => unclamped(base_points, bonuses),
        };

        debug!(
            base_points = award.base_points,
            bonus_points = award.bonus_points(),
            total_points = award.total_points,
            clamped = award.is_clamped(),
            "积分计算完成"
        );

        Ok(PointsOutcome::Awarded(award))
    }

    /// 基础积分，向零截断
    pub fn base_points(amount: Decimal, points_per_unit: Decimal) -> Result<i64> {
        amount
            .checked_mul(points_per_unit)
            .map(|raw| raw.trunc())
            .and_then(|points| points.to_i64())
            .ok_or(RewardsError::InvalidAmount(amount))
    }
}

fn unclamped(base_points: i64, bonuses: Vec<ChallengeBonus>) -> PointsAward {
    let total_points = base_points + bonuses.iter().map(|b| b.points).sum::<i64>();
    PointsAward {
        base_points,
        bonuses,
        total_points,
        clamp: None,
    }
}

/// 按每日剩余额度截断
///
/// 基础积分优先，挑战奖励按评估顺序依次削减，削减为 0 的奖励被丢弃
fn apply_daily_limit(
    base_points: i64,
    bonuses: Vec<ChallengeBonus>,
    daily_limit: i64,
    points_today: i64,
) -> PointsAward {
    let requested = base_points + bonuses.iter().map(|b| b.points).sum::<i64>();
    let headroom = (daily_limit - points_today).max(0);

    if requested <= headroom {
        return unclamped(base_points, bonuses);
    }

    let granted_base = base_points.min(headroom);
    let mut remaining = headroom - granted_base;
    let mut kept = Vec::with_capacity(bonuses.len());
    let mut reduced = Vec::new();

    for bonus in bonuses {
        let granted = bonus.points.min(remaining);
        remaining -= granted;
        if granted < bonus.points {
            reduced.push(bonus.clone());
        }
        if granted > 0 {
            kept.push(ChallengeBonus {
                points: granted,
                ..bonus
            });
        }
    }

    let total_points = granted_base + kept.iter().map(|b| b.points).sum::<i64>();

    PointsAward {
        base_points: granted_base,
        bonuses: kept,
        total_points,
        clamp: Some(DailyLimitClamp {
            daily_limit,
            points_today,
            requested_points: requested,
            granted_points: total_points,
            reduced_bonuses: reduced,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChallengeRule, FrequencyPeriod};
    use chrono::{DateTime, Utc};
    use uuid::Uuid;

    fn at() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2026-10-15T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn config() -> MerchantConfig {
        MerchantConfig::new(Uuid::from_u128(7))
    }

    fn amount_challenge(min: i64, points: i64) -> Challenge {
        Challenge::new(
            Uuid::from_u128(7),
            format!("满 {min}"),
            ChallengeRule::AmountMin {
                min_amount: Decimal::new(min, 0),
            },
            points,
        )
    }

    #[test]
    fn test_base_points_truncate() {
        assert_eq!(
            PointsCalculator::base_points(Decimal::new(2599, 2), Decimal::ONE).unwrap(),
            25
        );
        assert_eq!(
            PointsCalculator::base_points(Decimal::new(1000, 2), Decimal::new(15, 1)).unwrap(),
            15
        );
        assert_eq!(
            PointsCalculator::base_points(Decimal::new(333, 2), Decimal::new(3, 0)).unwrap(),
            9
        );
    }

    #[test]
    fn test_base_points_matches_floor_across_amounts() {
        let rate = Decimal::new(125, 2);
        for cents in (0..5000).step_by(37) {
            let amount = Decimal::new(cents, 2);
            let expected = (amount * rate).floor().to_i64().unwrap();
            assert_eq!(
                PointsCalculator::base_points(amount, rate).unwrap(),
                expected
            );
        }
    }

    #[test]
    fn test_simple_purchase_without_challenges() {
        let purchase = Purchase::new(Decimal::new(2500, 2), at());
        let outcome = PointsCalculator::new()
            .calculate(&purchase, &config(), &[], &CustomerActivity::default())
            .unwrap();
        let award = outcome.award().unwrap();
        assert_eq!(award.base_points, 25);
        assert_eq!(award.total_points, 25);
        assert!(award.bonuses.is_empty());
        assert!(!award.is_clamped());
    }

    #[test]
    fn test_below_minimum_purchase() {
        let mut config = config();
        config.minimum_purchase = Decimal::new(10, 0);
        let purchase = Purchase::new(Decimal::new(999, 2), at());
        let outcome = PointsCalculator::new()
            .calculate(&purchase, &config, &[], &CustomerActivity::default())
            .unwrap();
        assert!(matches!(outcome, PointsOutcome::BelowMinimumPurchase { .. }));
        assert_eq!(outcome.total_points(), 0);
    }

    #[test]
    fn test_negative_amount_rejected() {
        let purchase = Purchase::new(Decimal::new(-1, 0), at());
        let result =
            PointsCalculator::new().calculate(&purchase, &config(), &[], &CustomerActivity::default());
        assert!(matches!(result, Err(RewardsError::InvalidAmount(_))));
    }

    #[test]
    fn test_bonuses_are_summed() {
        let challenges = vec![amount_challenge(10, 5), amount_challenge(20, 8)];
        let purchase = Purchase::new(Decimal::new(25, 0), at());
        let award = PointsCalculator::new()
            .calculate(&purchase, &config(), &challenges, &CustomerActivity::default())
            .unwrap()
            .award()
            .cloned()
            .unwrap();
        assert_eq!(award.base_points, 25);
        assert_eq!(award.bonus_points(), 13);
        assert_eq!(award.total_points, 38);
    }

    #[test]
    fn test_daily_limit_drops_bonuses_before_base() {
        let mut config = config();
        config.daily_points_limit = Some(100);
        let challenges = vec![amount_challenge(10, 10), amount_challenge(10, 10)];
        let purchase = Purchase::new(Decimal::new(25, 0), at());
        let activity = CustomerActivity::default().with_points_today(70);

        let award = PointsCalculator::new()
            .calculate(&purchase, &config, &challenges, &activity)
            .unwrap()
            .award()
            .cloned()
            .unwrap();

        // 剩余 30：基础 25 全额保留，第一个奖励削减为 5，第二个被丢弃
        assert_eq!(award.base_points, 25);
        assert_eq!(award.bonuses.len(), 1);
        assert_eq!(award.bonuses[0].points, 5);
        assert_eq!(award.total_points, 30);

        let clamp = award.clamp.unwrap();
        assert_eq!(clamp.requested_points, 45);
        assert_eq!(clamp.granted_points, 30);
        assert_eq!(clamp.reduced_bonuses.len(), 2);
    }

    #[test]
    fn test_daily_limit_clamps_base_when_headroom_small() {
        let mut config = config();
        config.daily_points_limit = Some(100);
        let purchase = Purchase::new(Decimal::new(25, 0), at());
        let activity = CustomerActivity::default().with_points_today(90);

        let award = PointsCalculator::new()
            .calculate(&purchase, &config, &[amount_challenge(1, 5)], &activity)
            .unwrap()
            .award()
            .cloned()
            .unwrap();
        assert_eq!(award.base_points, 10);
        assert!(award.bonuses.is_empty());
        assert_eq!(award.total_points, 10);
    }

    #[test]
    fn test_daily_limit_exhausted_yields_zero() {
        let mut config = config();
        config.daily_points_limit = Some(50);
        let purchase = Purchase::new(Decimal::new(25, 0), at());
        let activity = CustomerActivity::default().with_points_today(60);

        let award = PointsCalculator::new()
            .calculate(&purchase, &config, &[], &activity)
            .unwrap()
            .award()
            .cloned()
            .unwrap();
        assert_eq!(award.total_points, 0);
        assert!(award.is_clamped());
    }

    #[test]
    fn test_frequency_challenge_flows_through_calculator() {
        let challenge = Challenge::new(
            Uuid::from_u128(7),
            "每周三次",
            ChallengeRule::Frequency {
                period: FrequencyPeriod::Weekly,
                visits_required: 1,
            },
            15,
        );
        let purchase = Purchase::new(Decimal::new(10, 0), at());
        let award = PointsCalculator::new()
            .calculate(&purchase, &config(), &[challenge], &CustomerActivity::default())
            .unwrap()
            .award()
            .cloned()
            .unwrap();
        assert_eq!(award.total_points, 25);
        assert!(award.describe().contains("每周三次"));
    }
}
