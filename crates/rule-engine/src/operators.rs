//! 规则操作符定义
//!
//! 操作符 token 与语义类型名称是规则编辑端与引擎之间的约定，
//! 序列化后的字符串必须保持不变。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 条件操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    // 通用比较
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Neq,

    // 数值/时间比较
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = ">=")]
    Gte,
    #[serde(rename = "<=")]
    Lte,

    // 布尔
    #[serde(rename = "yes")]
    Yes,
    #[serde(rename = "no")]
    No,

    // 集合
    #[serde(rename = "any")]
    AnyOf,
    #[serde(rename = "none")]
    NoneOf,
    #[serde(rename = "all")]
    AllOf,

    // 标签模式
    #[serde(rename = "any_exact")]
    AnyExact,
    #[serde(rename = "none_exact")]
    NoneExact,
    #[serde(rename = "any_contains")]
    AnyContains,
    #[serde(rename = "none_contains")]
    NoneContains,
    #[serde(rename = "any_starts")]
    AnyStarts,
    #[serde(rename = "none_starts")]
    NoneStarts,
    #[serde(rename = "any_ends")]
    AnyEnds,
    #[serde(rename = "none_ends")]
    NoneEnds,

    // 网络
    #[serde(rename = "ip_match")]
    IpMatch,
    #[serde(rename = "ip_not_match")]
    IpNotMatch,
    #[serde(rename = "email_match")]
    EmailMatch,
    #[serde(rename = "email_not_match")]
    EmailNotMatch,
}

/// 标签模式的匹配方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternMode {
    Exact,
    Contains,
    Starts,
    Ends,
}

/// 标签模式的量词：任一模式命中 / 没有模式命中
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Quantifier {
    Any,
    None,
}

impl Operator {
    pub const ALL: [Operator; 23] = [
        Self::Eq,
        Self::Neq,
        Self::Gt,
        Self::Lt,
        Self::Gte,
        Self::Lte,
        Self::Yes,
        Self::No,
        Self::AnyOf,
        Self::NoneOf,
        Self::AllOf,
        Self::AnyExact,
        Self::NoneExact,
        Self::AnyContains,
        Self::NoneContains,
        Self::AnyStarts,
        Self::NoneStarts,
        Self::AnyEnds,
        Self::NoneEnds,
        Self::IpMatch,
        Self::IpNotMatch,
        Self::EmailMatch,
        Self::EmailNotMatch,
    ];

    pub const PATTERN_FAMILY: [Operator; 8] = [
        Self::AnyExact,
        Self::NoneExact,
        Self::AnyContains,
        Self::NoneContains,
        Self::AnyStarts,
        Self::NoneStarts,
        Self::AnyEnds,
        Self::NoneEnds,
    ];

    /// 规则中保存的 token
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Neq => "!=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Gte => ">=",
            Self::Lte => "<=",
            Self::Yes => "yes",
            Self::No => "no",
            Self::AnyOf => "any",
            Self::NoneOf => "none",
            Self::AllOf => "all",
            Self::AnyExact => "any_exact",
            Self::NoneExact => "none_exact",
            Self::AnyContains => "any_contains",
            Self::NoneContains => "none_contains",
            Self::AnyStarts => "any_starts",
            Self::NoneStarts => "none_starts",
            Self::AnyEnds => "any_ends",
            Self::NoneEnds => "none_ends",
            Self::IpMatch => "ip_match",
            Self::IpNotMatch => "ip_not_match",
            Self::EmailMatch => "email_match",
            Self::EmailNotMatch => "email_not_match",
        }
    }

    /// 规则编辑界面展示用的标签
    pub fn label(&self) -> &'static str {
        match self {
            Self::Eq => "is",
            Self::Neq => "is not",
            Self::Gt => "is greater than",
            Self::Lt => "is less than",
            Self::Gte => "is greater than or equal to",
            Self::Lte => "is less than or equal to",
            Self::Yes => "yes",
            Self::No => "no",
            Self::AnyOf => "has any of",
            Self::NoneOf => "has none of",
            Self::AllOf => "has all of",
            Self::AnyExact => "matches any of",
            Self::NoneExact => "matches none of",
            Self::AnyContains => "contains any of",
            Self::NoneContains => "contains none of",
            Self::AnyStarts => "starts with any of",
            Self::NoneStarts => "starts with none of",
            Self::AnyEnds => "ends with any of",
            Self::NoneEnds => "ends with none of",
            Self::IpMatch => "matches",
            Self::IpNotMatch => "does not match",
            Self::EmailMatch => "matches",
            Self::EmailNotMatch => "does not match",
        }
    }

    /// 标签模式操作符拆解为 (量词, 匹配方式)，其他操作符返回 None
    pub fn pattern(&self) -> Option<(Quantifier, PatternMode)> {
        let parts = match self {
            Self::AnyExact => (Quantifier::Any, PatternMode::Exact),
            Self::NoneExact => (Quantifier::None, PatternMode::Exact),
            Self::AnyContains => (Quantifier::Any, PatternMode::Contains),
            Self::NoneContains => (Quantifier::None, PatternMode::Contains),
            Self::AnyStarts => (Quantifier::Any, PatternMode::Starts),
            Self::NoneStarts => (Quantifier::None, PatternMode::Starts),
            Self::AnyEnds => (Quantifier::Any, PatternMode::Ends),
            Self::NoneEnds => (Quantifier::None, PatternMode::Ends),
            _ => return None,
        };
        Some(parts)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operator {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.as_str() == s)
            .ok_or_else(|| format!("未知操作符: {}", s))
    }
}

/// 条件的语义类型，决定比较策略和可用的操作符
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SemanticType {
    Text,
    Numeric,
    Boolean,
    Date,
    Time,
    Ip,
    Email,
    TagPattern,
    Collection,
}

impl SemanticType {
    pub const ALL: [SemanticType; 9] = [
        Self::Text,
        Self::Numeric,
        Self::Boolean,
        Self::Date,
        Self::Time,
        Self::Ip,
        Self::Email,
        Self::TagPattern,
        Self::Collection,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Numeric => "numeric",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::Time => "time",
            Self::Ip => "ip",
            Self::Email => "email",
            Self::TagPattern => "tag_pattern",
            Self::Collection => "collection",
        }
    }

    /// 该类型可用的操作符
    ///
    /// `multiple` 只对集合类型有意义：单值集合退化为相等比较。
    pub fn operators(&self, multiple: bool) -> Vec<Operator> {
        use Operator::*;

        match self {
            Self::Text => {
                let mut ops = vec![Eq, Neq];
                ops.extend(Operator::PATTERN_FAMILY);
                ops
            }
            Self::Numeric | Self::Date | Self::Time => vec![Eq, Neq, Gt, Lt, Gte, Lte],
            Self::Boolean => vec![Yes, No],
            Self::Ip => vec![IpMatch, IpNotMatch],
            Self::Email => {
                let mut ops = vec![EmailMatch, EmailNotMatch, Eq, Neq];
                ops.extend(Operator::PATTERN_FAMILY);
                ops
            }
            Self::TagPattern => Operator::PATTERN_FAMILY.to_vec(),
            Self::Collection if multiple => vec![AnyOf, NoneOf, AllOf],
            Self::Collection => vec![Eq, Neq],
        }
    }

    /// 操作符是否属于该类型的词表
    pub fn supports(&self, operator: Operator, multiple: bool) -> bool {
        self.operators(multiple).contains(&operator)
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SemanticType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| format!("未知语义类型: {}", s))
    }
}
