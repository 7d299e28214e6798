//! 挑战评估器
//!
//! 纯函数：给定一笔消费、商户的挑战列表和顾客近期活动，返回满足条件的挑战奖励。
//! 到店历史由调用方提供，评估器不访问存储。
//!
//! ## 评估规则
//!
//! - 暂停、不在生效窗口内、属于其他商户的挑战不参与评估
//! - 所有满足条件的挑战各自独立贡献奖励，不做"择优"
//! - 频次挑战每个日历周期最多奖励一次

use chrono::{NaiveTime, Timelike};
use chrono_tz::Tz;
use tracing::debug;
use uuid::Uuid;

use super::period::CalendarWindow;
use crate::models::{
    Challenge, ChallengeBonus, ChallengeRule, CustomerActivity, FrequencyPeriod, Purchase,
};

/// 挑战评估器
#[derive(Debug, Clone, Copy)]
pub struct ChallengeEvaluator {
    merchant_id: Uuid,
    timezone: Tz,
}

impl ChallengeEvaluator {
    pub fn new(merchant_id: Uuid, timezone: Tz) -> Self {
        Self {
            merchant_id,
            timezone,
        }
    }

    /// 评估所有挑战，按传入顺序返回满足条件的奖励
    pub fn evaluate(
        &self,
        purchase: &Purchase,
        challenges: &[Challenge],
        activity: &CustomerActivity,
    ) -> Vec<ChallengeBonus> {
        challenges
            .iter()
            .filter(|c| c.merchant_id == self.merchant_id)
            .filter(|c| c.is_active(purchase.occurred_at))
            .filter(|c| c.points > 0)
            .filter(|c| self.is_satisfied(c, purchase, activity))
            .map(|c| {
                debug!(challenge_id = %c.id, rule = c.rule.type_name(), points = c.points, "挑战满足");
                c.bonus(c.points)
            })
            .collect()
    }

    fn is_satisfied(
        &self,
        challenge: &Challenge,
        purchase: &Purchase,
        activity: &CustomerActivity,
    ) -> bool {
        match &challenge.rule {
            ChallengeRule::AmountMin { min_amount } => purchase.amount >= *min_amount,
            ChallengeRule::TimeBased {
                start_time,
                end_time,
            } => {
                let local = purchase.occurred_at.with_timezone(&self.timezone).time();
                in_time_range(truncate_to_minute(local), *start_time, *end_time)
            }
            ChallengeRule::Frequency {
                period,
                visits_required,
            } => self.frequency_reached(challenge.id, *period, *visits_required, purchase, activity),
            ChallengeRule::Category { categories } => {
                purchase.category.as_deref().is_some_and(|category| {
                    let category = category.trim();
                    !category.is_empty()
                        && categories
                            .iter()
                            .any(|c| c.trim().eq_ignore_ascii_case(category))
                })
            }
        }
    }

    fn frequency_reached(
        &self,
        challenge_id: Uuid,
        period: FrequencyPeriod,
        visits_required: u32,
        purchase: &Purchase,
        activity: &CustomerActivity,
    ) -> bool {
        let window = CalendarWindow::containing(period, purchase.occurred_at, self.timezone);

        let already_awarded = activity
            .challenge_awards
            .iter()
            .any(|a| a.challenge_id == challenge_id && window.contains(a.awarded_at));
        if already_awarded {
            return false;
        }

        // 本次到店也计入
        let visits = activity
            .recent_visits
            .iter()
            .filter(|v| window.contains(**v))
            .count()
            + 1;

        visits >= visits_required as usize
    }
}

/// 闭区间时段判断，`start > end` 表示跨午夜
fn in_time_range(t: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        start <= t && t <= end
    } else {
        t >= start || t <= end
    }
}

/// 按分钟比较：配置 "14:00" 覆盖 14:00:00 ~ 14:00:59
fn truncate_to_minute(t: NaiveTime) -> NaiveTime {
    NaiveTime::from_hms_opt(t.hour(), t.minute(), 0).unwrap_or(t)
}
