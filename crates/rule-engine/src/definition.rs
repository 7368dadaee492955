//! 条件定义
//!
//! 条件定义描述一个可被规则引用的谓词能力：语义类型决定比较策略，
//! `ValueProvider` 负责从上下文中取出当前实际值。

use crate::models::EvaluationContext;
use crate::operators::SemanticType;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;

/// 取值接口：根据评估上下文计算条件的当前值
#[cfg_attr(test, mockall::automock)]
pub trait ValueProvider: Send + Sync {
    fn evaluate(&self, context: &EvaluationContext) -> Value;
}

/// 直接读取上下文字段（支持点号路径），字段不存在时返回 null
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextValue {
    path: String,
}

impl ContextValue {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl ValueProvider for ContextValue {
    fn evaluate(&self, context: &EvaluationContext) -> Value {
        context.get_field(&self.path).cloned().unwrap_or(Value::Null)
    }
}

/// 闭包适配器
pub struct FnValue<F>(pub F);

impl<F> ValueProvider for FnValue<F>
where
    F: Fn(&EvaluationContext) -> Value + Send + Sync,
{
    fn evaluate(&self, context: &EvaluationContext) -> Value {
        (self.0)(context)
    }
}

/// 用户输入值的形态
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueShape {
    #[default]
    Scalar,
    /// `{unit, number}`，如 "5 天前"
    NumberUnit,
    /// `{unit, text}`
    TextUnit,
}

/// 条件定义，注册后不可变
#[derive(Clone)]
pub struct ConditionDefinition {
    pub id: String,
    pub label: String,
    pub group: String,
    pub semantic_type: SemanticType,
    /// 仅对集合类型有意义：是否多值
    pub multiple: bool,
    pub shape: ValueShape,
    pub provider: Arc<dyn ValueProvider>,
    /// 评估前上下文中必须存在的键
    pub required_context_keys: Vec<String>,
}

impl ConditionDefinition {
    pub fn new(
        id: impl Into<String>,
        semantic_type: SemanticType,
        provider: impl ValueProvider + 'static,
    ) -> Self {
        let id = id.into();
        Self {
            label: id.clone(),
            id,
            group: String::new(),
            semantic_type,
            multiple: false,
            shape: ValueShape::Scalar,
            provider: Arc::new(provider),
            required_context_keys: Vec::new(),
        }
    }

    /// 以同名上下文字段作为取值来源
    pub fn from_context_key(id: impl Into<String>, semantic_type: SemanticType) -> Self {
        let id = id.into();
        let provider = ContextValue::new(id.clone());
        Self::new(id, semantic_type, provider)
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = label.into();
        self
    }

    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = group.into();
        self
    }

    pub fn with_shape(mut self, shape: ValueShape) -> Self {
        self.shape = shape;
        self
    }

    pub fn multiple(mut self) -> Self {
        self.multiple = true;
        self
    }

    pub fn requires(mut self, key: impl Into<String>) -> Self {
        self.required_context_keys.push(key.into());
        self
    }

    /// 计算当前值
    pub fn current_value(&self, context: &EvaluationContext) -> Value {
        self.provider.evaluate(context)
    }
}

impl fmt::Debug for ConditionDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConditionDefinition")
            .field("id", &self.id)
            .field("label", &self.label)
            .field("group", &self.group)
            .field("semantic_type", &self.semantic_type)
            .field("multiple", &self.multiple)
            .field("shape", &self.shape)
            .field("required_context_keys", &self.required_context_keys)
            .finish_non_exhaustive()
    }
}

/// 取值接口按实例比较
impl PartialEq for ConditionDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
            && self.label == other.label
            && self.group == other.group
            && self.semantic_type == other.semantic_type
            && self.multiple == other.multiple
            && self.shape == other.shape
            && self.required_context_keys == other.required_context_keys
            && Arc::ptr_eq(&self.provider, &other.provider)
    }
}
