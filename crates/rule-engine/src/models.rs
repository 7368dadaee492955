//! 规则引擎领域模型

use crate::operators::Operator;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// 单条规则：条件标识 + 操作符 + 用户填写的比较值
///
/// 操作符保留原始 token，未知 token 在评估时按比较失败处理，空 token 按 Skip 处理。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub condition: String,
    pub operator: String,
    #[serde(default)]
    pub value: Value,
}

impl Rule {
    pub fn new(condition: impl Into<String>, operator: Operator, value: impl Into<Value>) -> Self {
        Self {
            condition: condition.into(),
            operator: operator.as_str().to_string(),
            value: value.into(),
        }
    }

    /// 使用原始 token 构造，用于承载编辑端写入的任意字符串
    pub fn raw(
        condition: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<Value>,
    ) -> Self {
        Self {
            condition: condition.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

/// AND 组：组内所有规则都必须通过
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleGroup {
    pub rules: Vec<Rule>,
}

impl RuleGroup {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

/// 规则记录：任一组通过即匹配（OR）
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleRecord {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// 生效时间，None 表示立即生效
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    /// 失效时间，None 表示永久有效
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// 规则来源附带的业务数据，引擎不解释
    #[serde(default)]
    pub metadata: Value,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

fn default_enabled() -> bool {
    true
}

impl RuleRecord {
    pub fn new(title: impl Into<String>, groups: Vec<RuleGroup>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            title: title.into(),
            groups,
            enabled: true,
            start_time: None,
            end_time: None,
            metadata: Value::Null,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// 记录在给定时刻是否处于生效窗口内
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        let started = self.start_time.is_none_or(|start| now >= start);
        let expired = self.end_time.is_some_and(|end| now >= end);
        started && !expired
    }

    /// 规则总数（所有组）
    pub fn rule_count(&self) -> usize {
        self.groups.iter().map(|g| g.rules.len()).sum()
    }
}

/// 评估上下文 - 调用方为单次评估提供的键值事实
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct EvaluationContext {
    data: Map<String, Value>,
}

impl EvaluationContext {
    /// 从 JSON 对象创建，非对象数据视为空上下文
    pub fn new(data: Value) -> Self {
        match data {
            Value::Object(data) => Self { data },
            _ => Self::default(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let data: Map<String, Value> = serde_json::from_str(json)?;
        Ok(Self { data })
    }

    /// 获取字段值
    ///
    /// 先按完整键查找，找不到时按点号路径逐级查找（如 "order.total" 或 "items.0.sku"）。
    pub fn get_field(&self, path: &str) -> Option<&Value> {
        if let Some(value) = self.data.get(path) {
            return Some(value);
        }

        let mut parts = path.split('.');
        let mut current = self.data.get(parts.next()?)?;

        for part in parts {
            match current {
                Value::Object(map) => {
                    current = map.get(part)?;
                }
                Value::Array(arr) => {
                    let index: usize = part.parse().ok()?;
                    current = arr.get(index)?;
                }
                _ => return None,
            }
        }

        Some(current)
    }

    /// 字段存在且不为 null
    pub fn contains(&self, path: &str) -> bool {
        matches!(self.get_field(path), Some(v) if !v.is_null())
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.data.insert(key.into(), value);
    }

    /// 返回追加了若干键的新上下文，原上下文保持不变
    pub fn with_entries<I, K>(&self, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let mut augmented = self.clone();
        for (key, value) in entries {
            augmented.insert(key, value);
        }
        augmented
    }

    pub fn data(&self) -> &Map<String, Value> {
        &self.data
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<Map<String, Value>> for EvaluationContext {
    fn from(data: Map<String, Value>) -> Self {
        Self { data }
    }
}

/// 单条规则的三态评估结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatchOutcome {
    Pass,
    Fail,
    /// 无法评估（条件未注册、缺少必需上下文、条件或操作符为空）
    Skip,
}

impl MatchOutcome {
    pub fn from_bool(passed: bool) -> Self {
        if passed { Self::Pass } else { Self::Fail }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
            Self::Skip => "SKIP",
        }
    }
}

/// 匹配结果
#[derive(Debug, Clone, Default)]
pub struct MatchResult {
    pub matched: bool,
    pub record: Option<Arc<RuleRecord>>,
    /// 命中的组在 `record.groups` 中的下标
    pub group_index: Option<usize>,
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_us: u64,
}

impl MatchResult {
    pub fn no_match() -> Self {
        Self::default()
    }

    pub fn matched(record: Arc<RuleRecord>, group_index: usize) -> Self {
        Self {
            matched: true,
            record: Some(record),
            group_index: Some(group_index),
            ..Default::default()
        }
    }

    /// 命中的组
    pub fn group(&self) -> Option<&RuleGroup> {
        let record = self.record.as_ref()?;
        record.groups.get(self.group_index?)
    }

    pub fn summary(&self) -> MatchSummary {
        MatchSummary {
            matched: self.matched,
            record_id: self.record.as_ref().map(|r| r.id.clone()),
            record_title: self.record.as_ref().map(|r| r.title.clone()),
            group_index: self.group_index,
            metadata: self
                .record
                .as_ref()
                .map(|r| r.metadata.clone())
                .unwrap_or(Value::Null),
            evaluation_trace: self.evaluation_trace.clone(),
            evaluation_time_us: self.evaluation_time_us,
        }
    }
}

/// 可序列化的匹配结果摘要，供调用方输出或上报
#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub matched: bool,
    pub record_id: Option<String>,
    pub record_title: Option<String>,
    pub group_index: Option<usize>,
    pub metadata: Value,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub evaluation_trace: Vec<String>,
    pub evaluation_time_us: u64,
}
