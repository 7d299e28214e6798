//! 积分计算模块
//!
//! - `calculator`: 基础积分 + 挑战奖励 + 每日上限截断
//! - `challenge_evaluator`: 挑战条件评估（纯函数）
//! - `period`: 商户本地日历窗口

pub mod calculator;
pub mod challenge_evaluator;
pub mod period;

pub use calculator::PointsCalculator;
pub use challenge_evaluator::ChallengeEvaluator;
pub use period::CalendarWindow;
