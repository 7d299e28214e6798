//! 通知发送器
//!
//! 注入到业务服务中，负责根据业务事件创建通知并异步分发。
//! 分发失败只记录日志，不影响已提交的积分和礼品卡。

use std::sync::Arc;

use tracing::{error, info};

use super::dispatcher::{NotificationDispatcher, TracingDispatcher};
use super::types::{Notification, NotificationBuilder};
use crate::models::{Customer, GiftCard, PointsAward};

/// 通知发送器
#[derive(Clone)]
pub struct NotificationSender {
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl Default for NotificationSender {
    fn default() -> Self {
        Self::new(Arc::new(TracingDispatcher))
    }
}

impl NotificationSender {
    pub fn new(dispatcher: Arc<dyn NotificationDispatcher>) -> Self {
        Self { dispatcher }
    }

    /// 积分到账通知
    pub fn notify_points_awarded(&self, customer: &Customer, award: &PointsAward) {
        self.send_async(NotificationBuilder::points_awarded(customer, award));
    }

    /// 礼品卡发放通知
    pub fn notify_gift_card_issued(&self, customer: &Customer, card: &GiftCard) {
        self.send_async(NotificationBuilder::gift_card_issued(customer, card));
    }

    /// 礼品卡核销通知
    pub fn notify_gift_card_redeemed(&self, customer: &Customer, card: &GiftCard) {
        self.send_async(NotificationBuilder::gift_card_redeemed(customer, card));
    }

    /// 异步发送通知（fire-and-forget）
    fn send_async(&self, notification: Notification) {
        let dispatcher = self.dispatcher.clone();

        tokio::spawn(async move {
            match dispatcher.dispatch(&notification).await {
                Ok(()) => {
                    info!(
                        notification_id = %notification.notification_id,
                        customer_id = %notification.customer_id,
                        dispatcher = dispatcher.name(),
                        "通知发送成功"
                    );
                }
                Err(e) => {
                    error!(
                        notification_id = %notification.notification_id,
                        customer_id = %notification.customer_id,
                        dispatcher = dispatcher.name(),
                        error = %e,
                        "通知发送失败"
                    );
                }
            }
        });
    }
}
