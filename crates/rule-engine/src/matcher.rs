//! 规则匹配器
//!
//! 按顺序扫描规则记录：记录内任一组通过即匹配（OR），组内所有规则通过才算通过（AND）。
//! 单条规则的结果是三态的，无法评估的规则（Skip）在组内按通过处理。

use crate::comparator::ComparatorTable;
use crate::error::Result;
use crate::models::{EvaluationContext, MatchOutcome, MatchResult, Rule, RuleGroup, RuleRecord};
use crate::operators::Operator;
use crate::registry::ConditionRegistry;
use crate::resolver::{Resolution, SkipReason, ValueResolver};
use crate::source::{RuleQuery, RuleSource};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// 匹配模式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    /// 返回第一条匹配的记录
    #[default]
    First,
    /// 返回所有匹配的记录，每条记录取第一个通过的组
    All,
}

impl MatchMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "first",
            Self::All => "all",
        }
    }
}

impl fmt::Display for MatchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMode {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "first" => Ok(Self::First),
            "all" => Ok(Self::All),
            other => Err(format!("未知匹配模式: {}", other)),
        }
    }
}

/// 规则匹配器
#[derive(Clone)]
pub struct RuleMatcher {
    registry: ConditionRegistry,
    set: String,
    comparators: ComparatorTable,
    /// 是否记录详细评估追踪
    trace_enabled: bool,
}

impl RuleMatcher {
    pub fn new(registry: ConditionRegistry, set: impl Into<String>) -> Self {
        Self {
            registry,
            set: set.into(),
            comparators: ComparatorTable::standard(),
            trace_enabled: false,
        }
    }

    /// 启用评估追踪
    pub fn with_trace(mut self) -> Self {
        self.trace_enabled = true;
        self
    }

    /// 使用自定义比较策略表
    pub fn with_comparators(mut self, comparators: ComparatorTable) -> Self {
        self.comparators = comparators;
        self
    }

    pub fn set(&self) -> &str {
        &self.set
    }

    /// 返回第一条匹配的记录
    pub fn match_first(
        &self,
        records: &[Arc<RuleRecord>],
        context: &EvaluationContext,
    ) -> MatchResult {
        let start = Instant::now();
        let mut trace = Vec::new();

        let mut result = records
            .iter()
            .find_map(|record| {
                self.evaluate_record(record, context, &mut trace)
                    .map(|index| MatchResult::matched(Arc::clone(record), index))
            })
            .unwrap_or_else(MatchResult::no_match);

        result.evaluation_trace = trace;
        result.evaluation_time_us = start.elapsed().as_micros() as u64;

        self.record_metrics(MatchMode::First, usize::from(result.matched), start);
        debug!(
            set = %self.set,
            candidates = records.len(),
            matched = result.matched,
            record_id = ?result.record.as_ref().map(|r| r.id.as_str()),
            "match_first 完成"
        );

        result
    }

    /// 返回所有匹配的记录，保持来源顺序
    pub fn match_all(
        &self,
        records: &[Arc<RuleRecord>],
        context: &EvaluationContext,
    ) -> Vec<MatchResult> {
        let start = Instant::now();

        let results: Vec<MatchResult> = records
            .iter()
            .filter_map(|record| {
                let record_start = Instant::now();
                let mut trace = Vec::new();
                let index = self.evaluate_record(record, context, &mut trace)?;

                let mut result = MatchResult::matched(Arc::clone(record), index);
                result.evaluation_trace = trace;
                result.evaluation_time_us = record_start.elapsed().as_micros() as u64;
                Some(result)
            })
            .collect();

        self.record_metrics(MatchMode::All, results.len(), start);
        debug!(
            set = %self.set,
            candidates = records.len(),
            matched = results.len(),
            "match_all 完成"
        );

        results
    }

    /// 按模式匹配，First 模式下结果最多一条且只包含命中的记录
    pub fn evaluate(
        &self,
        mode: MatchMode,
        records: &[Arc<RuleRecord>],
        context: &EvaluationContext,
    ) -> Vec<MatchResult> {
        match mode {
            MatchMode::First => {
                let result = self.match_first(records, context);
                if result.matched { vec![result] } else { Vec::new() }
            }
            MatchMode::All => self.match_all(records, context),
        }
    }

    /// 从规则来源拉取当前条件集的记录并匹配
    pub fn evaluate_source(
        &self,
        source: &dyn RuleSource,
        query: &RuleQuery,
        mode: MatchMode,
        context: &EvaluationContext,
    ) -> Result<Vec<MatchResult>> {
        let records = source.rules(&self.set, query)?;
        Ok(self.evaluate(mode, &records, context))
    }

    /// 评估一条记录，返回第一个通过的组的下标；后续组不再评估
    pub fn evaluate_record(
        &self,
        record: &RuleRecord,
        context: &EvaluationContext,
        trace: &mut Vec<String>,
    ) -> Option<usize> {
        for (index, group) in record.groups.iter().enumerate() {
            let path = format!("{}.groups[{}]", record.id, index);
            if self.evaluate_group(group, context, trace, &path) == MatchOutcome::Pass {
                if self.trace_enabled {
                    trace.push(format!("{}: OR 短路 - 记录 '{}' 匹配", path, record.title));
                }
                return Some(index);
            }
        }

        if self.trace_enabled {
            trace.push(format!("{}: 无匹配组", record.id));
        }
        None
    }

    /// 评估 AND 组，结果只会是 Pass 或 Fail
    pub fn evaluate_group(
        &self,
        group: &RuleGroup,
        context: &EvaluationContext,
        trace: &mut Vec<String>,
        path: &str,
    ) -> MatchOutcome {
        // 空组永不匹配
        if group.is_empty() {
            if self.trace_enabled {
                trace.push(format!("{}: 空组 => FAIL", path));
            }
            return MatchOutcome::Fail;
        }

        for (index, rule) in group.rules.iter().enumerate() {
            let rule_path = format!("{}.rules[{}]", path, index);
            match self.evaluate_rule(rule, context, trace, &rule_path) {
                MatchOutcome::Fail => {
                    if self.trace_enabled {
                        trace.push(format!("{}: AND 短路 - 规则 {} 不匹配", path, index));
                    }
                    return MatchOutcome::Fail;
                }
                // 无法评估的规则不阻止组通过：仅由 Skip 组成的组同样判定为通过
                MatchOutcome::Skip => continue,
                MatchOutcome::Pass => continue,
            }
        }

        MatchOutcome::Pass
    }

    /// 评估单条规则
    pub fn evaluate_rule(
        &self,
        rule: &Rule,
        context: &EvaluationContext,
        trace: &mut Vec<String>,
        path: &str,
    ) -> MatchOutcome {
        let outcome = match self.try_evaluate_rule(rule, context) {
            Ok(passed) => MatchOutcome::from_bool(passed),
            Err(reason) => {
                metrics::counter!("rule_skips_total", "reason" => reason.as_label()).increment(1);
                if self.trace_enabled {
                    trace.push(format!("{}: {} => SKIP ({})", path, rule.condition, reason));
                }
                return MatchOutcome::Skip;
            }
        };

        if self.trace_enabled {
            trace.push(format!(
                "{}: {} {} {} => {}",
                path,
                rule.condition,
                rule.operator,
                rule.value,
                outcome.as_str()
            ));
        }

        outcome
    }

    fn try_evaluate_rule(
        &self,
        rule: &Rule,
        context: &EvaluationContext,
    ) -> std::result::Result<bool, SkipReason> {
        if rule.condition.trim().is_empty() {
            return Err(SkipReason::EmptyCondition);
        }
        if rule.operator.trim().is_empty() {
            return Err(SkipReason::EmptyOperator);
        }

        let definition = self
            .registry
            .lookup(&self.set, &rule.condition)
            .ok_or_else(|| SkipReason::UnknownCondition(rule.condition.clone()))?;

        let resolved = match ValueResolver::resolve(definition, context, &rule.value) {
            Resolution::Resolved(resolved) => resolved,
            Resolution::Skip(reason) => return Err(reason),
        };

        // 未知操作符属于比较失败，而不是无法评估
        let Ok(operator) = rule.operator.trim().parse::<Operator>() else {
            return Ok(false);
        };

        Ok(self.comparators.compare(
            definition.semantic_type,
            definition.multiple,
            operator,
            &resolved.user_value,
            &resolved.actual_value,
        ))
    }

    fn record_metrics(&self, mode: MatchMode, matched: usize, start: Instant) {
        metrics::counter!("rule_evaluations_total", "mode" => mode.as_str()).increment(1);
        metrics::counter!("rule_matches_total").increment(matched as u64);
        metrics::histogram!("rule_evaluation_duration_seconds")
            .record(start.elapsed().as_secs_f64());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::{ConditionDefinition, MockValueProvider, ValueShape};
    use crate::error::RuleError;
    use crate::operators::SemanticType;
    use crate::registry::RegistryBuilder;
    use crate::source::MockRuleSource;
    use serde_json::{Value, json};

    const SET: &str = "checkout";

    fn registry() -> ConditionRegistry {
        let mut builder = RegistryBuilder::new();
        builder
            .register(
                SET,
                ConditionDefinition::from_context_key("country", SemanticType::Collection),
            )
            .unwrap();
        builder
            .register(
                SET,
                ConditionDefinition::from_context_key("order_total", SemanticType::Numeric)
                    .requires("order_total"),
            )
            .unwrap();
        builder
            .register(SET, ConditionDefinition::from_context_key("is_vip", SemanticType::Boolean))
            .unwrap();
        builder.freeze()
    }

    fn context() -> EvaluationContext {
        EvaluationContext::new(json!({
            "country": "US",
            "order_total": 150,
            "is_vip": false
        }))
    }

    fn record(id: &str, groups: Vec<Vec<Rule>>) -> Arc<RuleRecord> {
        Arc::new(
            RuleRecord::new(id, groups.into_iter().map(RuleGroup::new).collect()).with_id(id),
        )
    }

    fn outcome(matcher: &RuleMatcher, rule: Rule, ctx: &EvaluationContext) -> MatchOutcome {
        matcher.evaluate_rule(&rule, ctx, &mut Vec::new(), "test")
    }

    #[test]
    fn test_rule_outcomes() {
        let matcher = RuleMatcher::new(registry(), SET);
        let ctx = context();

        assert_eq!(
            outcome(&matcher, Rule::new("country", Operator::Eq, "US"), &ctx),
            MatchOutcome::Pass
        );
        assert_eq!(
            outcome(&matcher, Rule::new("order_total", Operator::Lt, 100), &ctx),
            MatchOutcome::Fail
        );
        assert_eq!(
            outcome(&matcher, Rule::new("unknown", Operator::Eq, 1), &ctx),
            MatchOutcome::Skip
        );
        assert_eq!(
            outcome(&matcher, Rule::raw("", "==", 1), &ctx),
            MatchOutcome::Skip
        );
        assert_eq!(
            outcome(&matcher, Rule::raw("country", "", "US"), &ctx),
            MatchOutcome::Skip
        );
    }

    #[test]
    fn test_unknown_operator_fails_instead_of_skipping() {
        let matcher = RuleMatcher::new(registry(), SET);
        assert_eq!(
            outcome(&matcher, Rule::raw("country", "contains", "US"), &context()),
            MatchOutcome::Fail
        );
    }

    #[test]
    fn test_operator_outside_type_vocabulary_fails() {
        let matcher = RuleMatcher::new(registry(), SET);
        assert_eq!(
            outcome(&matcher, Rule::new("order_total", Operator::AnyOf, json!([150])), &context()),
            MatchOutcome::Fail
        );
    }

    #[test]
    fn test_missing_required_context_skips() {
        let matcher = RuleMatcher::new(registry(), SET);
        let ctx = EvaluationContext::new(json!({"country": "US"}));
        assert_eq!(
            outcome(&matcher, Rule::new("order_total", Operator::Gte, 100), &ctx),
            MatchOutcome::Skip
        );
    }

    #[test]
    fn test_group_of_only_skips_passes() {
        // 有意保留的行为：无法评估的规则不会让组失败
        let matcher = RuleMatcher::new(registry(), SET);
        let group = RuleGroup::new(vec![
            Rule::new("unknown", Operator::Eq, 1),
            Rule::new("order_total", Operator::Gte, 100),
        ]);
        let ctx = EvaluationContext::default();

        assert_eq!(
            matcher.evaluate_group(&group, &ctx, &mut Vec::new(), "g"),
            MatchOutcome::Pass
        );
    }

    #[test]
    fn test_empty_group_fails() {
        let matcher = RuleMatcher::new(registry(), SET);
        assert_eq!(
            matcher.evaluate_group(&RuleGroup::default(), &context(), &mut Vec::new(), "g"),
            MatchOutcome::Fail
        );
    }

    #[test]
    fn test_single_failure_fails_group_at_any_position() {
        let matcher = RuleMatcher::new(registry(), SET);
        let ctx = context();
        let passing = Rule::new("country", Operator::Eq, "US");
        let failing = Rule::new("is_vip", Operator::Yes, Value::Null);
        let skipped = Rule::new("unknown", Operator::Eq, 1);

        for position in 0..3 {
            let mut rules = vec![passing.clone(), skipped.clone()];
            rules.insert(position, failing.clone());
            assert_eq!(
                matcher.evaluate_group(&RuleGroup::new(rules), &ctx, &mut Vec::new(), "g"),
                MatchOutcome::Fail,
                "failing rule at position {}",
                position
            );
        }
    }

    #[test]
    fn test_first_passing_group_wins_and_later_groups_are_not_evaluated() {
        let mut never_called = MockValueProvider::new();
        never_called.expect_evaluate().times(0);
        let mut called_once = MockValueProvider::new();
        called_once.expect_evaluate().times(1).returning(|_| json!(5));

        let mut builder = RegistryBuilder::new();
        builder
            .register(SET, ConditionDefinition::new("g2", SemanticType::Numeric, called_once))
            .unwrap();
        builder
            .register(SET, ConditionDefinition::new("g3", SemanticType::Numeric, never_called))
            .unwrap();
        builder
            .register(
                SET,
                ConditionDefinition::from_context_key("country", SemanticType::Collection),
            )
            .unwrap();
        let matcher = RuleMatcher::new(builder.freeze(), SET);

        let records = vec![record(
            "r1",
            vec![
                vec![Rule::new("country", Operator::Eq, "CA")],
                vec![Rule::new("g2", Operator::Eq, 5)],
                vec![Rule::new("g3", Operator::Eq, 5)],
            ],
        )];

        let result = matcher.match_first(&records, &context());
        assert!(result.matched);
        assert_eq!(result.group_index, Some(1));
        assert_eq!(result.group().unwrap().rules[0].condition, "g2");
    }

    #[test]
    fn test_match_first_stops_at_first_record() {
        let matcher = RuleMatcher::new(registry(), SET);
        let records = vec![
            record("r1", vec![vec![Rule::new("country", Operator::Eq, "CA")]]),
            record("r2", vec![vec![Rule::new("country", Operator::Eq, "US")]]),
            record("r3", vec![vec![Rule::new("order_total", Operator::Gt, 100)]]),
        ];

        let result = matcher.match_first(&records, &context());
        assert_eq!(result.record.unwrap().id, "r2");
    }

    #[test]
    fn test_match_all_collects_in_order() {
        let matcher = RuleMatcher::new(registry(), SET);
        let records = vec![
            record("r1", vec![vec![Rule::new("country", Operator::Eq, "CA")]]),
            record(
                "r2",
                vec![
                    vec![Rule::new("is_vip", Operator::Yes, Value::Null)],
                    vec![Rule::new("country", Operator::Eq, "US")],
                ],
            ),
            record("r3", vec![vec![Rule::new("order_total", Operator::Gt, 100)]]),
        ];

        let results = matcher.match_all(&records, &context());
        let ids: Vec<&str> = results
            .iter()
            .map(|r| r.record.as_ref().unwrap().id.as_str())
            .collect();

        assert_eq!(ids, vec!["r2", "r3"]);
        assert_eq!(results[0].group_index, Some(1));
    }

    #[test]
    fn test_no_match() {
        let matcher = RuleMatcher::new(registry(), SET);
        let records = vec![record("r1", vec![vec![Rule::new("country", Operator::Eq, "CA")]])];

        let result = matcher.match_first(&records, &context());
        assert!(!result.matched);
        assert!(result.record.is_none());
        assert!(matcher.match_all(&records, &context()).is_empty());
        assert!(matcher.evaluate(MatchMode::First, &records, &context()).is_empty());
    }

    #[test]
    fn test_composite_value_feeds_comparator() {
        let mut provider = MockValueProvider::new();
        provider
            .expect_evaluate()
            .withf(|ctx| ctx.get_field("_unit") == Some(&json!("day")))
            .returning(|_| json!(7));

        let mut builder = RegistryBuilder::new();
        builder
            .register(
                SET,
                ConditionDefinition::new("last_order", SemanticType::Numeric, provider)
                    .with_shape(ValueShape::NumberUnit),
            )
            .unwrap();
        let matcher = RuleMatcher::new(builder.freeze(), SET);
        let ctx = EvaluationContext::default();

        assert_eq!(
            outcome(
                &matcher,
                Rule::new("last_order", Operator::Gte, json!({"unit": "day", "number": 5})),
                &ctx
            ),
            MatchOutcome::Pass
        );
        assert!(!ctx.contains("_unit"));
    }

    #[test]
    fn test_trace_output() {
        let matcher = RuleMatcher::new(registry(), SET).with_trace();
        let records = vec![record(
            "r1",
            vec![vec![
                Rule::new("unknown", Operator::Eq, 1),
                Rule::new("country", Operator::Eq, "US"),
            ]],
        )];

        let result = matcher.match_first(&records, &context());
        assert!(result.matched);
        assert!(result.evaluation_trace.iter().any(|t| t.contains("SKIP")));
        assert!(result.evaluation_trace.iter().any(|t| t.contains("PASS")));
        assert!(result.evaluation_trace.iter().any(|t| t.contains("短路")));
    }

    #[test]
    fn test_trace_disabled_by_default() {
        let matcher = RuleMatcher::new(registry(), SET);
        let records = vec![record("r1", vec![vec![Rule::new("country", Operator::Eq, "US")]])];

        assert!(matcher.match_first(&records, &context()).evaluation_trace.is_empty());
    }

    #[test]
    fn test_evaluate_source_queries_current_set() {
        let mut source = MockRuleSource::new();
        source
            .expect_rules()
            .withf(|set, query| set.to_string() == SET && query.limit == Some(2))
            .times(1)
            .returning(|_, _| {
                Ok(vec![
                    record("r1", vec![vec![Rule::new("country", Operator::Eq, "CA")]]),
                    record("r2", vec![vec![Rule::new("country", Operator::Eq, "US")]]),
                ])
            });

        let matcher = RuleMatcher::new(registry(), SET);
        let results = matcher
            .evaluate_source(&source, &RuleQuery::new().limit(2), MatchMode::All, &context())
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].record.as_ref().unwrap().id, "r2");
    }

    #[test]
    fn test_evaluate_source_propagates_errors() {
        let mut source = MockRuleSource::new();
        source
            .expect_rules()
            .returning(|_, _| Err(RuleError::RuleNotFound("r1".to_string())));

        let matcher = RuleMatcher::new(registry(), SET);
        let result =
            matcher.evaluate_source(&source, &RuleQuery::new(), MatchMode::First, &context());
        assert!(matches!(result, Err(RuleError::RuleNotFound(_))));
    }

    #[test]
    fn test_match_mode_parsing() {
        assert_eq!("first".parse::<MatchMode>().unwrap(), MatchMode::First);
        assert_eq!(" ALL ".parse::<MatchMode>().unwrap(), MatchMode::All);
        assert!("some".parse::<MatchMode>().is_err());
    }
}
