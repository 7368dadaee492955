//! 规则来源
//!
//! 匹配器只依赖 [`RuleSource`]，记录的持久化方式由调用方决定。
//! [`InMemoryRuleSource`] 使用 DashMap 按条件集缓存记录，保持每个集合内的加载顺序。

use crate::error::{Result, RuleError};
use crate::models::RuleRecord;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// 规则来源：按条件集返回有序的规则记录
#[cfg_attr(test, mockall::automock)]
pub trait RuleSource: Send + Sync {
    fn rules(&self, set: &str, query: &RuleQuery) -> Result<Vec<Arc<RuleRecord>>>;
}

/// 规则查询条件
#[derive(Debug, Clone, Default)]
pub struct RuleQuery {
    /// 仅返回指定 ID 的记录
    pub ids: Option<Vec<String>>,
    /// 是否包含已禁用的记录
    pub include_disabled: bool,
    /// 生效时间判断的基准时刻，None 表示当前时间
    pub active_at: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl RuleQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_ids<I, S>(mut self, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ids = Some(ids.into_iter().map(Into::into).collect());
        self
    }

    pub fn include_disabled(mut self) -> Self {
        self.include_disabled = true;
        self
    }

    pub fn active_at(mut self, at: DateTime<Utc>) -> Self {
        self.active_at = Some(at);
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// 记录是否满足查询条件（不含数量限制）
    pub fn accepts(&self, record: &RuleRecord, now: DateTime<Utc>) -> bool {
        if !self.include_disabled && !record.enabled {
            return false;
        }
        if !record.is_active_at(self.active_at.unwrap_or(now)) {
            return false;
        }
        self.ids
            .as_ref()
            .is_none_or(|ids| ids.iter().any(|id| *id == record.id))
    }
}

/// 内存规则来源
#[derive(Clone, Default)]
pub struct InMemoryRuleSource {
    /// 条件集 -> 按加载顺序排列的记录
    sets: Arc<DashMap<String, Vec<Arc<RuleRecord>>>>,
}

impl InMemoryRuleSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// 所有条件集中的记录总数
    pub fn len(&self) -> usize {
        self.sets.iter().map(|entry| entry.value().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 加载记录，同 ID 的记录原位替换，否则追加到末尾
    #[instrument(skip(self, record), fields(set = %set, record_id = %record.id))]
    pub fn load(&self, set: &str, record: RuleRecord) -> Result<()> {
        if record.id.trim().is_empty() {
            warn!("拒绝加载缺少 ID 的规则记录: {}", record.title);
            return Err(RuleError::InvalidRecord("规则记录 ID 不能为空".to_string()));
        }
        if record.title.trim().is_empty() {
            warn!("拒绝加载缺少标题的规则记录: {}", record.id);
            return Err(RuleError::InvalidRecord(format!("规则记录 {} 的标题不能为空", record.id)));
        }

        let record_id = record.id.clone();
        let record = Arc::new(record);
        let mut records = self.sets.entry(set.to_string()).or_default();

        match records.iter().position(|r| r.id == record_id) {
            Some(index) => records[index] = record,
            None => records.push(record),
        }

        info!("规则记录已加载: {}", record_id);
        Ok(())
    }

    /// 从 JSON 加载，支持单个对象或对象数组，返回加载的记录 ID
    #[instrument(skip(self, json))]
    pub fn load_from_json(&self, set: &str, json: &str) -> Result<Vec<String>> {
        let records: Vec<RuleRecord> = match serde_json::from_str::<Value>(json)? {
            Value::Array(items) => items
                .into_iter()
                .map(serde_json::from_value)
                .collect::<std::result::Result<_, _>>()?,
            value @ Value::Object(_) => vec![serde_json::from_value(value)?],
            _ => {
                return Err(RuleError::ParseError(
                    "规则 JSON 必须是对象或对象数组".to_string(),
                ));
            }
        };

        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(record.id.clone());
            self.load(set, record)?;
        }
        Ok(ids)
    }

    /// 更新已存在的记录
    #[instrument(skip(self, record), fields(set = %set, record_id = %record.id))]
    pub fn update(&self, set: &str, mut record: RuleRecord) -> Result<()> {
        if !self.contains(set, &record.id) {
            warn!("更新不存在的规则记录: {}", record.id);
            return Err(RuleError::RuleNotFound(record.id));
        }

        record.updated_at = Utc::now();
        self.load(set, record)
    }

    /// 删除记录
    #[instrument(skip(self))]
    pub fn delete(&self, set: &str, record_id: &str) -> Result<()> {
        let removed = self
            .sets
            .get_mut(set)
            .and_then(|mut records| {
                let index = records.iter().position(|r| r.id == record_id)?;
                Some(records.remove(index))
            })
            .is_some();

        if removed {
            info!("规则记录已删除: {}", record_id);
            Ok(())
        } else {
            warn!("删除不存在的规则记录: {}", record_id);
            Err(RuleError::RuleNotFound(record_id.to_string()))
        }
    }

    pub fn get(&self, set: &str, record_id: &str) -> Option<Arc<RuleRecord>> {
        self.sets
            .get(set)?
            .iter()
            .find(|r| r.id == record_id)
            .cloned()
    }

    pub fn contains(&self, set: &str, record_id: &str) -> bool {
        self.get(set, record_id).is_some()
    }

    /// 条件集内的记录 ID，按顺序
    pub fn list_ids(&self, set: &str) -> Vec<String> {
        self.sets
            .get(set)
            .map(|records| records.iter().map(|r| r.id.clone()).collect())
            .unwrap_or_default()
    }

    /// 批量加载，单条失败不影响其余记录
    #[instrument(skip(self, records))]
    pub fn load_batch(&self, set: &str, records: Vec<RuleRecord>) -> Vec<String> {
        let mut loaded_ids = Vec::with_capacity(records.len());
        let mut errors = Vec::new();

        for record in records {
            let record_id = record.id.clone();
            match self.load(set, record) {
                Ok(()) => loaded_ids.push(record_id),
                Err(e) => errors.push((record_id, e)),
            }
        }

        if !errors.is_empty() {
            warn!("批量加载部分失败: {:?}", errors);
        }

        info!("批量加载完成: {} 成功, {} 失败", loaded_ids.len(), errors.len());
        loaded_ids
    }

    #[instrument(skip(self))]
    pub fn clear(&self) {
        let count = self.len();
        self.sets.clear();
        info!("已清空 {} 条规则记录", count);
    }

    pub fn stats(&self) -> RuleSourceStats {
        let mut stats = RuleSourceStats {
            sets_count: self.sets.len(),
            ..Default::default()
        };

        for entry in self.sets.iter() {
            for record in entry.value() {
                stats.records_count += 1;
                stats.groups_count += record.groups.len();
                stats.rules_count += record.rule_count();
                if !record.enabled {
                    stats.disabled_count += 1;
                }
            }
        }

        stats
    }
}

impl RuleSource for InMemoryRuleSource {
    fn rules(&self, set: &str, query: &RuleQuery) -> Result<Vec<Arc<RuleRecord>>> {
        let now = Utc::now();
        let Some(records) = self.sets.get(set) else {
            return Ok(Vec::new());
        };

        Ok(records
            .iter()
            .filter(|record| query.accepts(record, now))
            .take(query.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }
}

/// 规则来源统计信息
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RuleSourceStats {
    pub sets_count: usize,
    pub records_count: usize,
    pub disabled_count: usize,
    pub groups_count: usize,
    pub rules_count: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Rule, RuleGroup};
    use crate::operators::Operator;
    use chrono::Duration;
    use std::thread;

    fn sample_record(id: &str) -> RuleRecord {
        RuleRecord::new(
            format!("记录 {}", id),
            vec![RuleGroup::new(vec![
                Rule::new("country", Operator::Eq, "US"),
                Rule::new("order_total", Operator::Gte, 100),
            ])],
        )
        .with_id(id)
    }

    #[test]
    fn test_load_and_get() {
        let source = InMemoryRuleSource::new();
        source.load("checkout", sample_record("r1")).unwrap();

        assert!(source.contains("checkout", "r1"));
        assert!(!source.contains("signup", "r1"));
        assert_eq!(source.get("checkout", "r1").unwrap().rule_count(), 2);
    }

    #[test]
    fn test_load_preserves_order_and_replaces_in_place() {
        let source = InMemoryRuleSource::new();
        for id in ["r1", "r2", "r3"] {
            source.load("checkout", sample_record(id)).unwrap();
        }

        let mut replacement = sample_record("r2");
        replacement.title = "新标题".to_string();
        source.load("checkout", replacement).unwrap();

        assert_eq!(source.list_ids("checkout"), vec!["r1", "r2", "r3"]);
        assert_eq!(source.get("checkout", "r2").unwrap().title, "新标题");
    }

    #[test]
    fn test_load_rejects_blank_id_or_title() {
        let source = InMemoryRuleSource::new();
        let result = source.load("checkout", sample_record(" "));
        assert!(matches!(result, Err(RuleError::InvalidRecord(_))));

        let mut untitled = sample_record("r1");
        untitled.title = "  ".to_string();
        let result = source.load("checkout", untitled);
        assert!(matches!(result, Err(RuleError::InvalidRecord(_))));

        let json = r#"{"id": "r2", "title": " ", "groups": []}"#;
        let result = source.load_from_json("checkout", json);
        assert!(matches!(result, Err(RuleError::InvalidRecord(_))));
        assert!(source.is_empty());
    }

    #[test]
    fn test_load_from_json() {
        let source = InMemoryRuleSource::new();
        let json = r#"[
            {"id": "r1", "title": "美国大额订单", "groups": [[
                {"condition": "country", "operator": "==", "value": "US"}
            ]]},
            {"id": "r2", "title": "默认", "groups": [], "enabled": false}
        ]"#;

        let ids = source.load_from_json("checkout", json).unwrap();
        assert_eq!(ids, vec!["r1", "r2"]);
        assert!(!source.get("checkout", "r2").unwrap().enabled);

        let ids = source
            .load_from_json("checkout", r#"{"id": "r3", "title": "单条"}"#)
            .unwrap();
        assert_eq!(ids, vec!["r3"]);

        assert!(source.load_from_json("checkout", "42").is_err());
        assert!(source.load_from_json("checkout", "not json").is_err());
    }

    #[test]
    fn test_update_and_delete() {
        let source = InMemoryRuleSource::new();
        assert!(matches!(
            source.update("checkout", sample_record("r1")),
            Err(RuleError::RuleNotFound(_))
        ));

        source.load("checkout", sample_record("r1")).unwrap();
        source.update("checkout", sample_record("r1")).unwrap();
        source.delete("checkout", "r1").unwrap();

        assert!(!source.contains("checkout", "r1"));
        assert!(matches!(
            source.delete("checkout", "r1"),
            Err(RuleError::RuleNotFound(_))
        ));
    }

    #[test]
    fn test_query_filters() {
        let source = InMemoryRuleSource::new();
        let now = Utc::now();

        let mut disabled = sample_record("disabled");
        disabled.enabled = false;
        let mut expired = sample_record("expired");
        expired.end_time = Some(now - Duration::hours(1));
        let mut future = sample_record("future");
        future.start_time = Some(now + Duration::hours(1));

        source.load_batch(
            "checkout",
            vec![sample_record("r1"), disabled, expired, future, sample_record("r2")],
        );

        let ids = |query: RuleQuery| -> Vec<String> {
            source
                .rules("checkout", &query)
                .unwrap()
                .iter()
                .map(|r| r.id.clone())
                .collect()
        };

        assert_eq!(ids(RuleQuery::new()), vec!["r1", "r2"]);
        assert_eq!(
            ids(RuleQuery::new().include_disabled()),
            vec!["r1", "disabled", "r2"]
        );
        assert_eq!(
            ids(RuleQuery::new().active_at(now + Duration::hours(2))),
            vec!["r1", "future", "r2"]
        );
        assert_eq!(ids(RuleQuery::new().with_ids(["r2"])), vec!["r2"]);
        assert_eq!(ids(RuleQuery::new().limit(1)), vec!["r1"]);
        assert!(source.rules("unknown", &RuleQuery::new()).unwrap().is_empty());
    }

    #[test]
    fn test_load_batch_skips_invalid() {
        let source = InMemoryRuleSource::new();
        let loaded = source.load_batch("checkout", vec![sample_record("r1"), sample_record("")]);
        assert_eq!(loaded, vec!["r1"]);
    }

    #[test]
    fn test_stats_and_clear() {
        let source = InMemoryRuleSource::new();
        source.load("checkout", sample_record("r1")).unwrap();
        let mut disabled = sample_record("r2");
        disabled.enabled = false;
        source.load("signup", disabled).unwrap();

        let stats = source.stats();
        assert_eq!(stats.sets_count, 2);
        assert_eq!(stats.records_count, 2);
        assert_eq!(stats.disabled_count, 1);
        assert_eq!(stats.groups_count, 2);
        assert_eq!(stats.rules_count, 4);

        source.clear();
        assert!(source.is_empty());
    }

    #[test]
    fn test_concurrent_access() {
        let source = InMemoryRuleSource::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let source = source.clone();
                thread::spawn(move || {
                    for j in 0..10 {
                        source
                            .load("checkout", sample_record(&format!("r{}-{}", i, j)))
                            .unwrap();
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(source.len(), 40);
    }
}
