//! 规则评估命令行
//!
//! 读取条件目录与规则记录，对输入的上下文 JSON 求值并输出匹配结果。

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use rule_engine::{
    ConditionRegistry, DeclaredCatalog, EvaluationContext, InMemoryRuleSource, MatchMode,
    RuleMatcher, RuleQuery, RuleSource, RuleValidator,
};
use rule_shared::config::AppConfig;
use rule_shared::observability;
use serde_json::json;
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

const SERVICE_NAME: &str = "rule-engine";

#[derive(Parser)]
#[command(name = "rule-engine")]
#[command(about = "Evaluate condition rules against a JSON context")]
#[command(version)]
struct Cli {
    /// 上下文 JSON 文件，缺省时从 stdin 读取
    context: Option<PathBuf>,

    /// 条件目录 JSON（覆盖 engine.catalog_path）
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// 规则记录 JSON（覆盖 engine.rules_path）
    #[arg(long)]
    rules: Option<PathBuf>,

    /// 条件集（覆盖 engine.condition_set）
    #[arg(long)]
    set: Option<String>,

    /// 匹配模式：first 或 all（覆盖 engine.match_mode）
    #[arg(long)]
    mode: Option<MatchMode>,

    /// 输出评估追踪
    #[arg(long)]
    trace: bool,

    /// 只检查规则记录，不求值
    #[arg(long)]
    check: bool,

    /// 结束时向 stderr 输出指标快照
    #[arg(long)]
    metrics: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = AppConfig::load(SERVICE_NAME).unwrap_or_else(|e| {
        eprintln!("Failed to load config, using defaults: {}", e);
        AppConfig::default()
    });

    let obs_config = config
        .observability
        .clone()
        .with_service_name(SERVICE_NAME);
    let guard = observability::init(&obs_config)?;

    let engine = &config.engine;
    let set = cli.set.clone().unwrap_or_else(|| engine.condition_set.clone());
    let mode = match cli.mode {
        Some(mode) => mode,
        None => engine.match_mode.parse::<MatchMode>().map_err(|e| anyhow!(e))?,
    };

    let catalog_path = cli
        .catalog
        .clone()
        .or_else(|| engine.catalog_path.as_ref().map(PathBuf::from))
        .context("未配置条件目录：使用 --catalog 或 engine.catalog_path")?;
    let rules_path = cli
        .rules
        .clone()
        .or_else(|| engine.rules_path.as_ref().map(PathBuf::from))
        .context("未配置规则记录：使用 --rules 或 engine.rules_path")?;

    let registry = load_registry(&catalog_path)?;
    let source = InMemoryRuleSource::new();
    let loaded = source
        .load_from_json(&set, &read_file(&rules_path)?)
        .with_context(|| format!("加载规则记录失败: {}", rules_path.display()))?;
    info!(set = %set, records = loaded.len(), "规则记录已加载");

    if cli.check {
        return check_rules(&registry, &set, &source);
    }

    let context = read_context(cli.context.as_deref())?;

    let mut matcher = RuleMatcher::new(registry, &set);
    if cli.trace || engine.trace {
        matcher = matcher.with_trace();
    }

    let results = matcher.evaluate_source(&source, &RuleQuery::new(), mode, &context)?;
    let summaries: Vec<_> = results.iter().map(|r| r.summary()).collect();

    let output = json!({
        "condition_set": set,
        "mode": mode,
        "matched": !summaries.is_empty(),
        "results": summaries,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    if cli.metrics {
        match guard.render_metrics() {
            Some(snapshot) => eprintln!("{}", snapshot),
            None => warn!("指标未启用，无法输出快照"),
        }
    }

    Ok(())
}

fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("读取文件失败: {}", path.display()))
}

fn load_registry(path: &Path) -> Result<ConditionRegistry> {
    let catalog = DeclaredCatalog::from_json(&read_file(path)?)
        .with_context(|| format!("解析条件目录失败: {}", path.display()))?;

    let mut builder = ConditionRegistry::builder();
    let set_ids: Vec<String> = catalog.set_ids().map(str::to_string).collect();
    for set in &set_ids {
        let count = builder.register_catalog(set, &catalog)?;
        info!(set = %set, conditions = count, "条件集已注册");
    }

    Ok(builder.freeze())
}

fn read_context(path: Option<&Path>) -> Result<EvaluationContext> {
    let raw = match path {
        Some(path) => read_file(path)?,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("读取 stdin 失败")?;
            buf
        }
    };

    EvaluationContext::from_json(&raw).context("上下文必须是 JSON 对象")
}

fn check_rules(registry: &ConditionRegistry, set: &str, source: &InMemoryRuleSource) -> Result<()> {
    let validator = RuleValidator::new(registry, set);
    let records = source.rules(set, &RuleQuery::new().include_disabled())?;

    let report: Vec<_> = records
        .iter()
        .map(|record| {
            let issues: Vec<_> = validator
                .validate(record)
                .iter()
                .map(|issue| json!({"path": issue.path, "message": issue.message}))
                .collect();
            json!({"record_id": record.id, "valid": issues.is_empty(), "issues": issues})
        })
        .collect();

    let invalid = report.iter().filter(|r| r["valid"] == false).count();
    println!("{}", serde_json::to_string_pretty(&report)?);

    if invalid > 0 {
        return Err(anyhow!("{} 条规则记录未通过检查", invalid));
    }
    Ok(())
}
