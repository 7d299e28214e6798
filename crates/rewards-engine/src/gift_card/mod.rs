//! 礼品卡
//!
//! - `issuer`：门槛跨越时按倍数发放，每个倍数恰好一张
//! - `lifecycle`：核销与过期状态机
//! - `code`：卡号生成

pub mod code;
pub mod issuer;
pub mod lifecycle;

pub use code::{generate_code, normalize_code};
pub use issuer::GiftCardIssuer;
