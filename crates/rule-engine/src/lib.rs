//! 条件规则引擎
//!
//! 根据上下文评估"条件-操作符-值"规则，提供：
//! - 按条件集注册、冻结后只读共享的条件注册表
//! - 三态规则求值（通过/失败/跳过），组内 AND、组间 OR
//! - 按语义类型选择的比较策略
//! - 首条匹配与全部匹配两种模式

pub mod catalog;
pub mod comparator;
pub mod definition;
pub mod error;
pub mod matcher;
pub mod models;
pub mod operators;
pub mod registry;
pub mod resolver;
pub mod source;
pub mod validator;

pub use catalog::{ConditionCatalog, DeclaredCatalog, DeclaredCondition};
pub use comparator::{Comparator, ComparatorTable};
pub use definition::{ConditionDefinition, ContextValue, FnValue, ValueProvider, ValueShape};
pub use error::{Result, RuleError};
pub use matcher::{MatchMode, RuleMatcher};
pub use models::{
    EvaluationContext, MatchOutcome, MatchResult, MatchSummary, Rule, RuleGroup, RuleRecord,
};
pub use operators::{Operator, SemanticType};
pub use registry::{ConditionRegistry, RegistryBuilder, RegistryHandle};
pub use resolver::{Resolution, SkipReason, ValueResolver};
pub use source::{InMemoryRuleSource, RuleQuery, RuleSource, RuleSourceStats};
pub use validator::{IssueKind, RuleIssue, RuleValidator};
