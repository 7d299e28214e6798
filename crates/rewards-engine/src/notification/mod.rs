//! 通知
//!
//! 积分到账、礼品卡发放与核销后异步通知顾客，不阻塞主流程

pub mod dispatcher;
pub mod sender;
pub mod types;

pub use dispatcher::{NotificationDispatcher, TracingDispatcher};
pub use sender::NotificationSender;
pub use types::{Notification, NotificationBuilder, NotificationType};
