//! 礼品卡过期扫描服务
//!
//! 周期性地把超过有效期的礼品卡推进为 expired，并导出 Prometheus 指标。

use std::sync::Arc;

use loyalty_shared::{config::AppConfig, database::Database, observability};
use rewards_engine::repository::{CustomerRepository, GiftCardRepository};
use rewards_engine::{ExpireWorker, GiftCardService};
use tokio::sync::watch;
use tracing::{info, warn};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::load("rewards-sweeper").unwrap_or_default();

    let obs_config = config
        .observability
        .clone()
        .with_service_name(&config.service_name);
    let _guard = observability::init(&obs_config).await?;

    info!(environment = %config.environment, "Starting rewards-sweeper");

    let db = Database::connect(&config.database).await?;
    if config.database.run_migrations {
        db.run_migrations(&MIGRATOR).await?;
    }

    let gift_cards = GiftCardService::new(
        Arc::new(GiftCardRepository::new(db.pool().clone())),
        Arc::new(CustomerRepository::new(db.pool().clone())),
    );

    if !config.sweeper.enabled {
        warn!("sweeper.enabled = false，仅执行迁移后退出");
        db.close().await;
        return Ok(());
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let worker = ExpireWorker::from_config(gift_cards, &config.sweeper);
    let handle = tokio::spawn(async move { worker.run(shutdown_rx).await });

    shutdown_signal().await;
    let _ = shutdown_tx.send(true);
    handle.await?;

    db.close().await;
    info!("rewards-sweeper shutdown complete");
    Ok(())
}

/// 监听关闭信号
///
/// K8s 通过 SIGTERM 通知 Pod 停止；本地开发通过 Ctrl+C。
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "注册 Ctrl+C 处理器失败");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "注册 SIGTERM 处理器失败");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, initiating graceful shutdown..."),
        _ = terminate => info!("Received SIGTERM, initiating graceful shutdown..."),
    }
}
