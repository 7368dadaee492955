//! 条件目录
//!
//! 条件目录负责为某个条件集提供条件定义。具体业务条件通常由宿主代码实现
//! [`ConditionCatalog`]；[`DeclaredCatalog`] 则允许用 JSON 声明只读取上下文字段的条件。

use crate::definition::{ConditionDefinition, ContextValue, ValueShape};
use crate::error::Result;
use crate::operators::SemanticType;
use serde::Deserialize;
use std::collections::BTreeMap;

/// 条件目录提供者
pub trait ConditionCatalog {
    /// 返回指定条件集下的条件定义，未知条件集返回空列表
    fn conditions(&self, set: &str) -> Result<Vec<ConditionDefinition>>;
}

impl ConditionCatalog for Vec<ConditionDefinition> {
    fn conditions(&self, _set: &str) -> Result<Vec<ConditionDefinition>> {
        Ok(self.clone())
    }
}

/// JSON 声明的条件
#[derive(Debug, Clone, Deserialize)]
pub struct DeclaredCondition {
    pub id: String,
    #[serde(default)]
    pub label: Option<String>,
    #[serde(default)]
    pub group: String,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    #[serde(default)]
    pub multiple: bool,
    #[serde(default)]
    pub shape: ValueShape,
    /// 取值的上下文路径，缺省为条件标识本身
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub required_context_keys: Vec<String>,
}

impl DeclaredCondition {
    pub fn to_definition(&self) -> ConditionDefinition {
        let source = self.source.clone().unwrap_or_else(|| self.id.clone());
        let mut definition =
            ConditionDefinition::new(self.id.clone(), self.semantic_type, ContextValue::new(source))
                .with_group(self.group.clone())
                .with_shape(self.shape);

        if let Some(label) = &self.label {
            definition = definition.with_label(label.clone());
        }
        definition.multiple = self.multiple;
        definition.required_context_keys = self.required_context_keys.clone();
        definition
    }
}

/// 按条件集分组的声明式目录
///
/// ```json
/// {
///   "checkout": [
///     {"id": "country", "type": "collection", "source": "customer.country"},
///     {"id": "order_total", "type": "numeric", "required_context_keys": ["order"]}
///   ]
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(transparent)]
pub struct DeclaredCatalog {
    sets: BTreeMap<String, Vec<DeclaredCondition>>,
}

impl DeclaredCatalog {
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn set_ids(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }
}

impl ConditionCatalog for DeclaredCatalog {
    fn conditions(&self, set: &str) -> Result<Vec<ConditionDefinition>> {
        Ok(self
            .sets
            .get(set)
            .map(|declared| declared.iter().map(DeclaredCondition::to_definition).collect())
            .unwrap_or_default())
    }
}
