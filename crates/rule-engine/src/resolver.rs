//! 取值解析
//!
//! 在比较之前为一条规则准备比较双方：检查必需上下文、拆解复合输入值、
//! 调用条件的取值接口得到实际值。

use crate::definition::{ConditionDefinition, ValueShape};
use crate::models::EvaluationContext;
use serde_json::Value;
use std::borrow::Cow;

/// 复合值拆解后注入上下文的保留键
pub const UNIT_KEY: &str = "_unit";
pub const NUMBER_KEY: &str = "_number";
pub const TEXT_KEY: &str = "_text";

/// 规则无法评估的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    EmptyCondition,
    EmptyOperator,
    UnknownCondition(String),
    MissingContext(String),
}

impl SkipReason {
    /// 指标标签
    pub fn as_label(&self) -> &'static str {
        match self {
            Self::EmptyCondition => "empty_condition",
            Self::EmptyOperator => "empty_operator",
            Self::UnknownCondition(_) => "unknown_condition",
            Self::MissingContext(_) => "missing_context",
        }
    }
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyCondition => write!(f, "条件为空"),
            Self::EmptyOperator => write!(f, "操作符为空"),
            Self::UnknownCondition(id) => write!(f, "条件未注册: {}", id),
            Self::MissingContext(key) => write!(f, "缺少上下文: {}", key),
        }
    }
}

/// 解析后的比较输入
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedValues<'a> {
    /// 交给比较策略的用户值（复合值已拆成标量）
    pub user_value: Value,
    pub actual_value: Value,
    /// 取值时使用的上下文；拆解复合值时为追加了保留键的副本
    pub context: Cow<'a, EvaluationContext>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Resolution<'a> {
    Resolved(ResolvedValues<'a>),
    Skip(SkipReason),
}

/// 复合输入值
#[derive(Debug, Clone, PartialEq)]
pub enum CompositeValue {
    NumberUnit { unit: Value, number: Value },
    TextUnit { unit: Value, text: Value },
}

impl CompositeValue {
    /// 按条件的输入形态识别复合值，形态不符时返回 None
    pub fn parse(shape: ValueShape, value: &Value) -> Option<Self> {
        let map = value.as_object()?;
        let unit = map.get("unit")?.clone();

        match shape {
            ValueShape::NumberUnit => Some(Self::NumberUnit {
                unit,
                number: map.get("number")?.clone(),
            }),
            ValueShape::TextUnit => Some(Self::TextUnit {
                unit,
                text: map.get("text")?.clone(),
            }),
            ValueShape::Scalar => None,
        }
    }

    /// (注入上下文的键值, 交给比较策略的标量)
    fn decompose(self) -> ([(&'static str, Value); 2], Value) {
        match self {
            Self::NumberUnit { unit, number } => {
                ([(UNIT_KEY, unit), (NUMBER_KEY, number.clone())], number)
            }
            Self::TextUnit { unit, text } => ([(UNIT_KEY, unit), (TEXT_KEY, text.clone())], text),
        }
    }
}

pub struct ValueResolver;

impl ValueResolver {
    /// 解析一条规则的比较双方
    ///
    /// 调用方的上下文不会被修改：复合值的单位只出现在返回的上下文副本中，
    /// 因此不会泄漏给同一次评估中的其他规则。
    pub fn resolve<'a>(
        definition: &ConditionDefinition,
        context: &'a EvaluationContext,
        user_value: &Value,
    ) -> Resolution<'a> {
        if let Some(missing) = definition
            .required_context_keys
            .iter()
            .find(|key| !context.contains(key))
        {
            return Resolution::Skip(SkipReason::MissingContext(missing.clone()));
        }

        let (context, user_value) = match CompositeValue::parse(definition.shape, user_value) {
            Some(composite) => {
                let (entries, scalar) = composite.decompose();
                (Cow::Owned(context.with_entries(entries)), scalar)
            }
            None => (Cow::Borrowed(context), user_value.clone()),
        };

        let actual_value = definition.current_value(&context);

        Resolution::Resolved(ResolvedValues {
            user_value,
            actual_value,
            context,
        })
    }
}
