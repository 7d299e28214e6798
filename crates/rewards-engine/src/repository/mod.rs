//! 数据库仓储层
//!
//! ## 设计原则
//!
//! - 仓储只负责数据持久化，不包含业务逻辑
//! - 账本提交是唯一跨表的原子操作，由仓储在一个事务内完成
//! - 定义 trait 接口以支持 mock 测试和内存实现

mod challenge_repo;
mod customer_repo;
mod gift_card_repo;
mod ledger_repo;
mod memory;
mod merchant_repo;
mod traits;

pub use challenge_repo::ChallengeRepository;
pub use customer_repo::CustomerRepository;
pub use gift_card_repo::GiftCardRepository;
pub use ledger_repo::LedgerRepository;
pub use memory::MemoryStore;
pub use merchant_repo::MerchantSettingsRepository;
pub use traits::*;
