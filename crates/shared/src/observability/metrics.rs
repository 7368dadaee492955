//! Prometheus 指标模块
//!
//! 基于 metrics crate 和 metrics-exporter-prometheus 收集指标。
//! 不启动 HTTP 端点，调用方持有返回的 handle 渲染文本格式快照。

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

use super::ObservabilityConfig;

/// 安装全局 Prometheus recorder
pub fn init(config: &ObservabilityConfig) -> Result<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder()?;

    register_rule_metrics(&config.service_name);

    Ok(handle)
}

/// 描述规则引擎的指标，描述会出现在导出文本的 HELP 注释中
pub fn register_rule_metrics(service_name: &str) {
    metrics::describe_counter!("rule_evaluations_total", "Total number of rule evaluations");
    metrics::describe_counter!("rule_matches_total", "Total number of matched rule records");
    metrics::describe_counter!(
        "rule_skips_total",
        "Total number of rules skipped because they could not be evaluated"
    );
    metrics::describe_histogram!(
        "rule_evaluation_duration_seconds",
        "Rule evaluation duration in seconds"
    );

    metrics::counter!("service_starts_total", "service" => service_name.to_string()).increment(1);
}
