//! 通知分发器
//!
//! 实际投递（WhatsApp 网关等）在引擎之外，这里只定义接口和默认的日志实现

use async_trait::async_trait;
use tracing::info;

use super::types::Notification;
use crate::error::Result;

/// 通知分发接口
///
/// 实现应当无状态，便于并发调用
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait NotificationDispatcher: Send + Sync {
    /// 分发器名称（用于日志）
    fn name(&self) -> &'static str;

    async fn dispatch(&self, notification: &Notification) -> Result<()>;
}

/// 只写日志的分发器
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingDispatcher;

#[async_trait]
impl NotificationDispatcher for TracingDispatcher {
    fn name(&self) -> &'static str {
        "tracing"
    }

    async fn dispatch(&self, notification: &Notification) -> Result<()> {
        info!(
            notification_id = %notification.notification_id,
            customer_id = %notification.customer_id,
            notification_type = ?notification.notification_type,
            title = %notification.title,
            body = %notification.body,
            "通知"
        );
        Ok(())
    }
}
