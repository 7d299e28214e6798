//! 积分引擎的日志与指标
//!
//! 引擎库本身只调用 `metrics::record_*` 埋点；是否导出 Prometheus 指标、
//! 日志格式与级别由宿主进程（如 `rewards-sweeper`）在启动时通过 [`init`] 决定。

pub mod metrics;
pub mod tracing;

use ::tracing::info;
use anyhow::Result;
use serde::Deserialize;

/// 可观测性配置
#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    /// 进程名，写入每条日志的 `service` 字段
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// `/metrics` 监听端口
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// 关闭时埋点调用照常执行，只是没有 recorder 接收
    #[serde(default = "default_metrics_enabled")]
    pub metrics_enabled: bool,

    /// `RUST_LOG` 未设置时使用的过滤规则，如 `info,rewards_engine=debug`
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// 线上采集用 JSON，本地调试用可读格式
    #[serde(default)]
    pub json_logs: bool,
}

fn default_service_name() -> String {
    "rewards-engine".to_string()
}

fn default_metrics_port() -> u16 {
    9090
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: default_service_name(),
            metrics_port: default_metrics_port(),
            metrics_enabled: default_metrics_enabled(),
            log_level: default_log_level(),
            json_logs: false,
        }
    }
}

impl ObservabilityConfig {
    pub fn with_service_name(mut self, service_name: &str) -> Self {
        self.service_name = service_name.to_string();
        self
    }
}

/// 持有 `/metrics` 服务；进程退出前保持存活
pub struct ObservabilityGuard {
    metrics_handle: Option<metrics::MetricsHandle>,
}

impl ObservabilityGuard {
    /// 不导出指标时使用
    pub fn empty() -> Self {
        Self {
            metrics_handle: None,
        }
    }
}

impl Drop for ObservabilityGuard {
    fn drop(&mut self) {
        if self.metrics_handle.is_some() {
            info!("指标导出已停止");
        }
    }
}

/// 先装日志订阅者，再按配置启动指标导出；
/// 指标端口绑定失败时日志已可用
pub async fn init(config: &ObservabilityConfig) -> Result<ObservabilityGuard> {
    tracing::init(config)?;

    info!(
        service = %config.service_name,
        metrics_enabled = config.metrics_enabled,
        metrics_port = config.metrics_port,
        "日志已就绪"
    );

    let metrics_handle = if config.metrics_enabled {
        Some(metrics::init(config).await?)
    } else {
        None
    };

    Ok(ObservabilityGuard { metrics_handle })
}
