//! 礼品卡过期处理 Worker
//!
//! 定期扫描已超过有效期仍为 available 的礼品卡，推进为 expired。
//! 查询和核销路径上也会惰性过期，这里只负责把长期无人访问的卡收尾。
//!
//! 状态写入以 available 为前置条件，多实例同时扫描不会重复计数。

use std::time::Duration;

use chrono::Utc;
use loyalty_shared::config::SweeperConfig;
use loyalty_shared::observability::metrics;
use tokio::sync::watch;
use tracing::{error, info};

use crate::error::Result;
use crate::service::{ExpireSummary, GiftCardService};

/// 过期处理 Worker
pub struct ExpireWorker {
    gift_cards: GiftCardService,
    /// 轮询间隔（建议 300 秒）
    poll_interval: Duration,
    /// 每批处理的最大记录数
    batch_size: i64,
}

impl ExpireWorker {
    pub fn new(gift_cards: GiftCardService, poll_interval_secs: u64, batch_size: i64) -> Self {
        Self {
            gift_cards,
            poll_interval: Duration::from_secs(poll_interval_secs.max(1)),
            batch_size: batch_size.max(1),
        }
    }

    pub fn from_config(gift_cards: GiftCardService, config: &SweeperConfig) -> Self {
        Self::new(gift_cards, config.poll_interval_seconds, config.batch_size)
    }

    /// 主循环：收到关闭信号后退出
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            poll_interval = ?self.poll_interval,
            batch_size = self.batch_size,
            "ExpireWorker 已启动"
        );

        let mut ticker = tokio::time::interval(self.poll_interval);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(e) = self.sweep().await {
                        error!(error = %e, "礼品卡过期处理出错");
                    }
                    metrics::set_worker_last_run("gift_card_expire_worker");
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("ExpireWorker 已停止");
                        return;
                    }
                }
            }
        }
    }

    /// 处理一轮：批满时继续取下一批，直到没有可推进的卡
    pub async fn sweep(&self) -> Result<ExpireSummary> {
        let mut total = ExpireSummary::default();
        loop {
            let batch = self
                .gift_cards
                .expire_overdue(Utc::now(), self.batch_size)
                .await?;
            total.scanned += batch.scanned;
            total.expired += batch.expired;

            // 整批都被其他实例抢先时也停止，避免空转
            if batch.scanned < self.batch_size as usize || batch.expired == 0 {
                break;
            }
        }

        if total.scanned > 0 {
            info!(scanned = total.scanned, expired = total.expired, "本轮礼品卡过期处理完成");
        }
        Ok(total)
    }
}
