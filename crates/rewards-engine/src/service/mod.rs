//! 服务层
//!
//! - `ledger_service`: 积分账本（唯一的余额写入口）
//! - `gift_card_service`: 礼品卡核销、查询、过期与补发
//! - `challenge_service`: 挑战的增删改与暂停
//! - `loyalty_service`: 面向 POS 的门面，串联签到、计分、记账与通知

pub mod challenge_service;
pub mod dto;
pub mod gift_card_service;
pub mod ledger_service;
pub mod loyalty_service;

pub use challenge_service::ChallengeService;
pub use dto::*;
pub use gift_card_service::GiftCardService;
pub use ledger_service::RewardLedger;
pub use loyalty_service::LoyaltyService;
