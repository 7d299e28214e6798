//! 积分与奖励引擎
//!
//! 商户会员积分的核心：消费计分、挑战奖励、积分账本与礼品卡。
//!
//! ## 核心功能
//!
//! - **积分计算**：基础积分 + 挑战奖励，按商户每日上限截断
//! - **挑战评估**：最低消费、时段、到店频次、品类四类规则（纯函数）
//! - **积分账本**：余额只由账本追加产生，版本号条件提交，幂等键重放安全
//! - **礼品卡**：累计积分跨越门槛时在同一事务内发放，核销/过期单向流转
//! - **通知发送**：积分到账、礼品卡发放与核销后异步通知
//!
//! ## 模块结构
//!
//! - `models`: 领域模型定义
//! - `error`: 错误类型定义
//! - `points`: 积分计算与挑战评估
//! - `gift_card`: 礼品卡发放规则、状态流转与卡号
//! - `repository`: 数据库仓储层（PostgreSQL 与内存实现）
//! - `service`: 业务服务层
//! - `notification`: 通知服务模块
//! - `worker`: 后台过期处理

pub mod error;
pub mod gift_card;
pub mod models;
pub mod notification;
pub mod points;
pub mod repository;
pub mod service;
pub mod worker;

pub use error::{Result, RewardsError};
pub use gift_card::GiftCardIssuer;
pub use models::{
    AppendReceipt, AppendRequest, AppendStatus, Challenge, ChallengeBonus, ChallengeRule,
    ChallengeStatus, Customer, CustomerActivity, EntryKind, FrequencyPeriod, GiftCard,
    GiftCardStatus, LedgerEntry, MerchantConfig, PointsAward, PointsOutcome, Purchase, Visit,
};
pub use notification::{NotificationDispatcher, NotificationSender, TracingDispatcher};
pub use points::{ChallengeEvaluator, PointsCalculator};
pub use repository::MemoryStore;
pub use service::{ChallengeService, GiftCardService, LoyaltyService, RewardLedger};
pub use worker::ExpireWorker;
