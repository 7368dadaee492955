//! 规则记录静态检查
//!
//! 评估期对不合法的规则是宽容的（Skip 或比较失败），检查器用于在保存规则时
//! 提前发现这些问题。检查结果不影响评估语义。

use crate::comparator::{parse_datetime, parse_time};
use crate::definition::{ConditionDefinition, ValueShape};
use crate::error::{Result, RuleError};
use crate::models::{Rule, RuleRecord};
use crate::operators::{Operator, SemanticType};
use crate::registry::ConditionRegistry;
use crate::resolver::CompositeValue;
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;

/// 问题类别
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueKind {
    /// 记录 ID 为空
    MissingId,
    /// 记录没有任何组，永远不会匹配
    NoGroups,
    /// 空组，永远不会通过
    EmptyGroup,
    /// 条件或操作符为空，评估时会被跳过
    IncompleteRule,
    /// 条件未在条件集中注册，评估时会被跳过
    UnknownCondition,
    /// 无法识别的操作符，评估时比较失败
    UnknownOperator,
    /// 操作符不适用于条件的语义类型，评估时比较失败
    UnsupportedOperator,
    /// 比较值的形态与条件不符
    InvalidValue,
    /// 生效时间不早于失效时间
    InvalidSchedule,
}

/// 单个问题，`path` 形如 `groups[0].rules[1]`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleIssue {
    pub path: String,
    pub kind: IssueKind,
    pub message: String,
}

impl RuleIssue {
    fn new(path: impl Into<String>, kind: IssueKind, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for RuleIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.message)
    }
}

pub struct RuleValidator<'a> {
    registry: &'a ConditionRegistry,
    set: &'a str,
}

impl<'a> RuleValidator<'a> {
    pub fn new(registry: &'a ConditionRegistry, set: &'a str) -> Self {
        Self { registry, set }
    }

    /// 检查记录，返回所有发现的问题
    pub fn validate(&self, record: &RuleRecord) -> Vec<RuleIssue> {
        let mut issues = Vec::new();

        if record.id.trim().is_empty() {
            issues.push(RuleIssue::new("id", IssueKind::MissingId, "规则记录 ID 不能为空"));
        }

        if let (Some(start), Some(end)) = (record.start_time, record.end_time) {
            if start >= end {
                issues.push(RuleIssue::new(
                    "start_time",
                    IssueKind::InvalidSchedule,
                    "生效时间必须早于失效时间",
                ));
            }
        }

        if record.groups.is_empty() {
            issues.push(RuleIssue::new(
                "groups",
                IssueKind::NoGroups,
                "规则记录至少需要一个组",
            ));
        }

        for (i, group) in record.groups.iter().enumerate() {
            let group_path = format!("groups[{}]", i);
            if group.is_empty() {
                issues.push(RuleIssue::new(group_path, IssueKind::EmptyGroup, "组不能为空"));
                continue;
            }

            for (j, rule) in group.rules.iter().enumerate() {
                let rule_path = format!("{}.rules[{}]", group_path, j);
                self.validate_rule(rule, &rule_path, &mut issues);
            }
        }

        issues
    }

    /// 有问题时返回汇总错误
    pub fn ensure_valid(&self, record: &RuleRecord) -> Result<()> {
        let issues = self.validate(record);
        if issues.is_empty() {
            return Ok(());
        }

        let message = issues
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ");
        Err(RuleError::InvalidRecord(format!("{}: {}", record.id, message)))
    }

    /// 记录引用的所有条件标识
    pub fn referenced_conditions(record: &RuleRecord) -> BTreeSet<String> {
        record
            .groups
            .iter()
            .flat_map(|group| group.rules.iter())
            .map(|rule| rule.condition.trim())
            .filter(|condition| !condition.is_empty())
            .map(str::to_string)
            .collect()
    }

    fn validate_rule(&self, rule: &Rule, path: &str, issues: &mut Vec<RuleIssue>) {
        if rule.condition.trim().is_empty() || rule.operator.trim().is_empty() {
            issues.push(RuleIssue::new(
                path,
                IssueKind::IncompleteRule,
                "条件与操作符均不能为空",
            ));
            return;
        }

        let Some(definition) = self.registry.lookup(self.set, &rule.condition) else {
            issues.push(RuleIssue::new(
                path,
                IssueKind::UnknownCondition,
                format!("条件 '{}' 未在条件集 '{}' 中注册", rule.condition, self.set),
            ));
            return;
        };

        let Ok(operator) = rule.operator.trim().parse::<Operator>() else {
            issues.push(RuleIssue::new(
                path,
                IssueKind::UnknownOperator,
                format!("未知操作符: {}", rule.operator),
            ));
            return;
        };

        if !definition
            .semantic_type
            .supports(operator, definition.multiple)
        {
            issues.push(RuleIssue::new(
                path,
                IssueKind::UnsupportedOperator,
                format!(
                    "操作符 {} 不适用于 {} 类型的条件 '{}'",
                    operator, definition.semantic_type, definition.id
                ),
            ));
            return;
        }

        if let Err(reason) = check_value(definition, operator, &rule.value) {
            issues.push(RuleIssue::new(path, IssueKind::InvalidValue, reason));
        }
    }
}

fn check_value(
    definition: &ConditionDefinition,
    operator: Operator,
    value: &Value,
) -> std::result::Result<(), String> {
    let scalar = match definition.shape {
        ValueShape::Scalar => value.clone(),
        shape => match CompositeValue::parse(shape, value) {
            Some(CompositeValue::NumberUnit { number, .. }) => number,
            Some(CompositeValue::TextUnit { text, .. }) => text,
            None => return Err("复合值必须同时包含 unit 与数值/文本部分".to_string()),
        },
    };

    match definition.semantic_type {
        SemanticType::Numeric => {
            let numeric = match &scalar {
                Value::Number(_) => true,
                Value::String(s) => s.trim().parse::<f64>().is_ok_and(f64::is_finite),
                _ => false,
            };
            if !numeric {
                return Err(format!("比较值不是数字: {}", scalar));
            }
        }
        SemanticType::Date if parse_datetime(&scalar).is_none() => {
            return Err(format!("无法解析的日期: {}", scalar));
        }
        SemanticType::Time if parse_time(&scalar).is_none() => {
            return Err(format!("无法解析的时间: {}", scalar));
        }
        _ => {}
    }

    let needs_list = operator.pattern().is_some()
        || matches!(
            operator,
            Operator::AnyOf | Operator::NoneOf | Operator::AllOf
        );
    if needs_list && !matches!(scalar, Value::Array(_) | Value::String(_)) {
        return Err(format!("操作符 {} 需要字符串或数组作为比较值", operator));
    }

    Ok(())
}
