//! 条件定义注册表
//!
//! 注册分两个阶段：启动时通过 [`RegistryBuilder`] 写入，`freeze()` 之后得到只读的
//! [`ConditionRegistry`]，可在任意多个并发评估之间共享。需要运行时整体替换时，
//! 通过 [`RegistryHandle`] 原子地发布新的注册表快照。

use crate::catalog::ConditionCatalog;
use crate::definition::{ConditionDefinition, ValueShape};
use crate::error::{Result, RuleError};
use crate::operators::SemanticType;
use arc_swap::ArcSwap;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, instrument};

static CONDITION_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_][A-Za-z0-9_.:\-]*$").expect("valid regex"));

type ConditionSet = HashMap<String, Arc<ConditionDefinition>>;

/// 注册表构建器（写阶段）
#[derive(Default)]
pub struct RegistryBuilder {
    sets: HashMap<String, ConditionSet>,
}

impl RegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 注册条件定义，(set, id) 只能写入一次
    #[instrument(skip(self, definition), fields(condition_id = %definition.id))]
    pub fn register(&mut self, set: &str, definition: ConditionDefinition) -> Result<()> {
        self.check(set, &definition)?;
        self.insert(set, definition);
        Ok(())
    }

    /// 注册目录提供的全部条件，返回注册数量
    ///
    /// 整批先校验再写入，任一条件不合法时构建器保持原样。
    #[instrument(skip(self, catalog))]
    pub fn register_catalog(&mut self, set: &str, catalog: &dyn ConditionCatalog) -> Result<usize> {
        let definitions = catalog.conditions(set)?;

        let mut seen = HashSet::with_capacity(definitions.len());
        for definition in &definitions {
            self.check(set, definition)?;
            if !seen.insert(definition.id.as_str()) {
                return Err(RuleError::DuplicateCondition {
                    set: set.to_string(),
                    id: definition.id.clone(),
                });
            }
        }

        let count = definitions.len();
        for definition in definitions {
            self.insert(set, definition);
        }

        info!("条件集 {} 注册完成: {} 个条件", set, count);
        Ok(count)
    }

    fn check(&self, set: &str, definition: &ConditionDefinition) -> Result<()> {
        if set.trim().is_empty() {
            return Err(RuleError::EmptySetId);
        }

        Self::validate_definition(definition)?;

        if self
            .sets
            .get(set)
            .is_some_and(|conditions| conditions.contains_key(&definition.id))
        {
            return Err(RuleError::DuplicateCondition {
                set: set.to_string(),
                id: definition.id.clone(),
            });
        }

        Ok(())
    }

    fn insert(&mut self, set: &str, definition: ConditionDefinition) {
        debug!(
            set,
            condition_id = %definition.id,
            semantic_type = %definition.semantic_type,
            "条件已注册"
        );
        self.sets
            .entry(set.to_string())
            .or_default()
            .insert(definition.id.clone(), Arc::new(definition));
    }

    /// 结束写阶段
    pub fn freeze(self) -> ConditionRegistry {
        let registry = ConditionRegistry {
            sets: Arc::new(self.sets),
        };
        info!(
            sets = registry.sets.len(),
            conditions = registry.len(),
            "条件注册表已冻结"
        );
        registry
    }

    fn validate_definition(definition: &ConditionDefinition) -> Result<()> {
        if !CONDITION_ID_RE.is_match(&definition.id) {
            return Err(RuleError::InvalidConditionId(definition.id.clone()));
        }

        let malformed = |reason: &str| RuleError::MalformedCondition {
            id: definition.id.clone(),
            reason: reason.to_string(),
        };

        if definition.multiple && definition.semantic_type != SemanticType::Collection {
            return Err(malformed("只有集合类型可以声明为多值"));
        }

        match (definition.shape, definition.semantic_type) {
            (ValueShape::NumberUnit, SemanticType::Numeric) => {}
            (ValueShape::NumberUnit, _) => {
                return Err(malformed("number+unit 只适用于数值类型"));
            }
            (
                ValueShape::TextUnit,
                SemanticType::Text | SemanticType::Collection | SemanticType::TagPattern,
            ) => {}
            (ValueShape::TextUnit, _) => {
                return Err(malformed("text+unit 只适用于文本、集合或标签类型"));
            }
            (ValueShape::Scalar, _) => {}
        }

        if definition
            .required_context_keys
            .iter()
            .any(|key| key.trim().is_empty())
        {
            return Err(malformed("必需上下文键不能为空"));
        }

        Ok(())
    }
}

/// 只读注册表（读阶段），clone 只复制引用计数
#[derive(Clone, Default)]
pub struct ConditionRegistry {
    sets: Arc<HashMap<String, ConditionSet>>,
}

impl ConditionRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::new()
    }

    pub fn lookup(&self, set: &str, id: &str) -> Option<&ConditionDefinition> {
        self.sets.get(set)?.get(id).map(Arc::as_ref)
    }

    pub fn contains(&self, set: &str, id: &str) -> bool {
        self.lookup(set, id).is_some()
    }

    /// 某个条件集下的全部条件，按标识排序
    pub fn conditions(&self, set: &str) -> Vec<&ConditionDefinition> {
        let mut conditions: Vec<&ConditionDefinition> = self
            .sets
            .get(set)
            .map(|c| c.values().map(Arc::as_ref).collect())
            .unwrap_or_default();
        conditions.sort_by(|a, b| a.id.cmp(&b.id));
        conditions
    }

    pub fn set_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.sets.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// 条件总数（所有条件集）
    pub fn len(&self) -> usize {
        self.sets.values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// 可热替换的注册表句柄
///
/// 读取端 `load()` 得到当前快照，正在进行的评估不受后续 `publish()` 影响。
#[derive(Clone)]
pub struct RegistryHandle {
    current: Arc<ArcSwap<ConditionRegistry>>,
}

impl RegistryHandle {
    pub fn new(registry: ConditionRegistry) -> Self {
        Self {
            current: Arc::new(ArcSwap::from_pointee(registry)),
        }
    }

    pub fn load(&self) -> Arc<ConditionRegistry> {
        self.current.load_full()
    }

    pub fn publish(&self, registry: ConditionRegistry) {
        info!(conditions = registry.len(), "发布新的条件注册表");
        self.current.store(Arc::new(registry));
    }
}
