//! 积分引擎错误类型
//!
//! 定义服务层的业务错误和系统错误。
//! 低于最低消费、每日上限截断、重复请求不属于错误，以结果值返回。

use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

/// 积分引擎错误类型
#[derive(Debug, Error)]
pub enum RewardsError {
    // === 顾客与账本 ===
    #[error("顾客不存在: {0}")]
    CustomerNotFound(Uuid),

    #[error("积分余额不足: 当前 {balance}, 变动 {delta}")]
    InsufficientBalance { balance: i64, delta: i64 },

    #[error("幂等键已被其他请求使用: {0}")]
    IdempotencyKeyReused(String),

    #[error("商户不匹配: 期望 {expected}, 实际 {actual}")]
    MerchantMismatch { expected: Uuid, actual: Uuid },

    // === 礼品卡 ===
    #[error("礼品卡不存在: {0}")]
    GiftCardNotFound(String),

    #[error("礼品卡已核销: {0}")]
    AlreadyRedeemed(Uuid),

    #[error("礼品卡已过期: {0}")]
    AlreadyExpired(Uuid),

    #[error("礼品卡已超过有效期: {0}")]
    Expired(Uuid),

    // === 挑战 ===
    #[error("挑战不存在: {0}")]
    ChallengeNotFound(Uuid),

    #[error("挑战已有历史奖励，只能暂停不能删除: {0}")]
    ChallengeHasAwards(Uuid),

    // === 配置与参数 ===
    #[error("商户配置无效: {0}")]
    InvalidConfig(String),

    #[error("消费金额无效: {0}")]
    InvalidAmount(Decimal),

    #[error("参数校验失败: {0}")]
    Validation(String),

    // === 系统错误 ===
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),

    #[error("JSON 序列化错误: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("内部错误: {0}")]
    Internal(String),

    #[error("并发冲突，请重试")]
    ConcurrencyConflict,
}

/// 积分引擎 Result 类型别名
pub type Result<T> = std::result::Result<T, RewardsError>;

impl RewardsError {
    /// 检查是否为可重试的错误
    ///
    /// 调用方（POS 层）应携带同一个幂等键重试
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database(_) | Self::ConcurrencyConflict)
    }

    /// 检查是否为业务错误（非系统错误）
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            Self::Database(_) | Self::Serialization(_) | Self::Internal(_) | Self::ConcurrencyConflict
        )
    }

    /// 获取错误码（用于 API 响应）
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::CustomerNotFound(_) => "CUSTOMER_NOT_FOUND",
            Self::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Self::IdempotencyKeyReused(_) => "IDEMPOTENCY_KEY_REUSED",
            Self::MerchantMismatch { .. } => "MERCHANT_MISMATCH",
            Self::GiftCardNotFound(_) => "GIFT_CARD_NOT_FOUND",
            Self::AlreadyRedeemed(_) => "ALREADY_REDEEMED",
            Self::AlreadyExpired(_) => "ALREADY_EXPIRED",
            Self::Expired(_) => "EXPIRED",
            Self::ChallengeNotFound(_) => "CHALLENGE_NOT_FOUND",
            Self::ChallengeHasAwards(_) => "CHALLENGE_HAS_AWARDS",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::InvalidAmount(_) => "INVALID_AMOUNT",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal(_) => "INTERNAL_ERROR",
            Self::ConcurrencyConflict => "CONCURRENCY_CONFLICT",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_is_retryable() {
        assert!(RewardsError::ConcurrencyConflict.is_retryable());
        assert!(RewardsError::Database(sqlx::Error::PoolTimedOut).is_retryable());
        assert!(
            !RewardsError::InsufficientBalance {
                balance: 10,
                delta: -20
            }
            .is_retryable()
        );
        assert!(!RewardsError::AlreadyRedeemed(Uuid::nil()).is_retryable());
    }

    #[test]
    fn test_error_is_business_error() {
        assert!(RewardsError::Expired(Uuid::nil()).is_business_error());
        assert!(RewardsError::IdempotencyKeyReused("k".to_string()).is_business_error());
        assert!(!RewardsError::Internal("boom".to_string()).is_business_error());
        assert!(!RewardsError::ConcurrencyConflict.is_business_error());
    }

    #[test]
    fn test_error_code() {
        assert_eq!(
            RewardsError::AlreadyExpired(Uuid::nil()).error_code(),
            "ALREADY_EXPIRED"
        );
        assert_eq!(
            RewardsError::ConcurrencyConflict.error_code(),
            "CONCURRENCY_CONFLICT"
        );
    }

    #[test]
    fn test_error_display() {
        let err = RewardsError::InsufficientBalance {
            balance: 30,
            delta: -50,
        };
        assert!(err.to_string().contains("30"));
        assert!(err.to_string().contains("-50"));
    }
}
