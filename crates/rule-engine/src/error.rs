//! 规则引擎错误类型
//!
//! 只有配置期（注册条件、加载规则）会返回错误；评估期的失败一律降级为
//! Skip 或比较失败，不会以 `Err` 的形式出现。

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuleError {
    #[error("条件集标识不能为空")]
    EmptySetId,

    #[error("无效的条件标识: '{0}'")]
    InvalidConditionId(String),

    #[error("条件重复注册: {set}/{id}")]
    DuplicateCondition { set: String, id: String },

    #[error("条件定义无效: {id} - {reason}")]
    MalformedCondition { id: String, reason: String },

    #[error("规则解析失败: {0}")]
    ParseError(String),

    #[error("规则记录无效: {0}")]
    InvalidRecord(String),

    #[error("规则未找到: {0}")]
    RuleNotFound(String),

    #[error("JSON 序列化错误: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RuleError>;
