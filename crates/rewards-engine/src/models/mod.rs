//! 积分引擎领域模型
//!
//! 包含顾客、账本、挑战、礼品卡与商户配置等核心实体定义

pub mod award;
pub mod challenge;
pub mod customer;
pub mod enums;
pub mod gift_card;
pub mod ledger;
pub mod merchant;

// 重新导出常用类型
pub use award::{DailyLimitClamp, PointsAward, PointsOutcome, Purchase};
pub use challenge::{Challenge, ChallengeBonus, ChallengeRule};
pub use customer::{ChallengeAwardRecord, Customer, CustomerActivity, Visit};
pub use enums::{ChallengeStatus, EntryKind, FrequencyPeriod, GiftCardStatus};
pub use gift_card::GiftCard;
pub use ledger::{AppendReceipt, AppendRequest, AppendStatus, LedgerCommit, LedgerEntry};
pub use merchant::MerchantConfig;
