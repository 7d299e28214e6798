//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 实现指标收集与导出。
//! 指标通过独立的 HTTP 端口暴露，供 Prometheus 抓取。

use anyhow::Result;
use axum::{Router, routing::get};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::net::SocketAddr;
use std::sync::OnceLock;
use tokio::net::TcpListener;
use tracing::{error, info};

use super::ObservabilityConfig;

/// 全局 Prometheus handle，用于渲染指标
static PROMETHEUS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

/// Metrics 资源守卫
pub struct MetricsHandle {
    _server_handle: tokio::task::JoinHandle<()>,
}

/// 初始化 Prometheus 指标导出
///
/// 启动一个独立的 HTTP 服务器在指定端口暴露 `/metrics` 端点。
pub async fn init(config: &ObservabilityConfig) -> Result<MetricsHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;
    let _ = PROMETHEUS_HANDLE.set(handle.clone());

    register_common_metrics(&config.service_name);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.metrics_port));
    let server_handle = start_metrics_server(addr, handle).await?;

    Ok(MetricsHandle {
        _server_handle: server_handle,
    })
}

/// 注册积分引擎的业务指标描述
fn register_common_metrics(service_name: &str) {
    metrics::describe_counter!("ledger_appends_total", "Total number of ledger append attempts");
    metrics::describe_counter!("points_awarded_total", "Total points awarded on purchases");
    metrics::describe_counter!(
        "daily_limit_clamps_total",
        "Number of awards clamped by the daily points limit"
    );
    metrics::describe_counter!("gift_cards_issued_total", "Total number of gift cards issued");
    metrics::describe_counter!(
        "gift_card_redemptions_total",
        "Total number of gift card redemption attempts"
    );
    metrics::describe_counter!("gift_cards_expired_total", "Total number of gift cards expired");
    metrics::describe_gauge!("worker_last_run_timestamp", "Unix timestamp of last worker run");

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}

/// 启动指标 HTTP 服务器
async fn start_metrics_server(
    addr: SocketAddr,
    handle: PrometheusHandle,
) -> Result<tokio::task::JoinHandle<()>> {
    let app = Router::new()
        .route("/metrics", get(move || std::future::ready(handle.render())))
        .route("/health", get(|| async { "OK" }));

    let listener = TcpListener::bind(addr).await?;
    info!("Metrics server listening on {}", addr);

    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!("Metrics server error: {}", e);
        }
    });

    Ok(server_handle)
}

/// 获取全局 Prometheus handle
pub fn get_handle() -> Option<&'static PrometheusHandle> {
    PROMETHEUS_HANDLE.get()
}

// ============================================================================
// 业务指标记录函数
// ============================================================================

/// 记录账本追加
///
/// `status` 取值：applied / duplicate / rejected / conflict
#[inline]
pub fn record_ledger_append(kind: &str, status: &str) {
    metrics::counter!(
        "ledger_appends_total",
        "kind" => kind.to_string(),
        "status" => status.to_string()
    )
    .increment(1);
}

/// 记录消费积分发放
#[inline]
pub fn record_points_awarded(points: u64, clamped: bool) {
    metrics::counter!("points_awarded_total").increment(points);
    if clamped {
        metrics::counter!("daily_limit_clamps_total").increment(1);
    }
}

/// 记录礼品卡发放
#[inline]
pub fn record_gift_cards_issued(count: u64, source: &str) {
    metrics::counter!("gift_cards_issued_total", "source" => source.to_string()).increment(count);
}

/// 记录礼品卡核销
#[inline]
pub fn record_gift_card_redemption(status: &str) {
    metrics::counter!("gift_card_redemptions_total", "status" => status.to_string()).increment(1);
}

/// 记录礼品卡过期
#[inline]
pub fn record_gift_cards_expired(count: u64) {
    metrics::counter!("gift_cards_expired_total").increment(count);
}

/// 记录 Worker 最近一次运行时间
#[inline]
pub fn set_worker_last_run(worker: &str) {
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or_default();
    metrics::gauge!("worker_last_run_timestamp", "worker" => worker.to_string()).set(now);
}
