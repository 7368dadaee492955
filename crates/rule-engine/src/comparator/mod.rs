//! 比较策略
//!
//! 每种语义类型对应一个 [`Comparator`] 实现，由 [`ComparatorTable`] 按
//! (语义类型, 是否多值) 查表选择。比较策略只返回布尔值：未知操作符和无法
//! 转换的输入都视为不匹配，不会报错。

mod collection;
mod network;
mod pattern;
mod scalar;
mod temporal;

pub use collection::CollectionComparator;
pub use network::{EmailComparator, IpComparator, email_pattern_matches, ip_pattern_matches};
pub use pattern::{TagPatternComparator, matches_patterns};
pub use scalar::{BooleanComparator, NumericComparator, TextComparator};
pub use temporal::{DateComparator, TimeComparator, parse_datetime, parse_time};

use crate::operators::{Operator, SemanticType};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// 比较策略
pub trait Comparator: Send + Sync {
    /// 用 `operator` 比较实际值与用户值
    fn compare(&self, operator: Operator, user_value: &Value, actual_value: &Value) -> bool;
}

/// (语义类型, 是否多值) -> 比较策略
#[derive(Clone)]
pub struct ComparatorTable {
    strategies: HashMap<(SemanticType, bool), Arc<dyn Comparator>>,
}

impl ComparatorTable {
    /// 内置策略
    pub fn standard() -> Self {
        let mut table = Self {
            strategies: HashMap::new(),
        };

        for multiple in [false, true] {
            table.insert(SemanticType::Text, multiple, TextComparator);
            table.insert(SemanticType::Numeric, multiple, NumericComparator);
            table.insert(SemanticType::Boolean, multiple, BooleanComparator);
            table.insert(SemanticType::Date, multiple, DateComparator);
            table.insert(SemanticType::Time, multiple, TimeComparator);
            table.insert(SemanticType::Ip, multiple, IpComparator);
            table.insert(SemanticType::Email, multiple, EmailComparator);
            table.insert(SemanticType::TagPattern, multiple, TagPatternComparator);
            table.insert(
                SemanticType::Collection,
                multiple,
                CollectionComparator::new(multiple),
            );
        }

        table
    }

    /// 替换某个类型的策略
    pub fn with(
        mut self,
        semantic_type: SemanticType,
        multiple: bool,
        comparator: impl Comparator + 'static,
    ) -> Self {
        self.insert(semantic_type, multiple, comparator);
        self
    }

    fn insert(
        &mut self,
        semantic_type: SemanticType,
        multiple: bool,
        comparator: impl Comparator + 'static,
    ) {
        self.strategies
            .insert((semantic_type, multiple), Arc::new(comparator));
    }

    pub fn get(&self, semantic_type: SemanticType, multiple: bool) -> Option<&dyn Comparator> {
        self.strategies
            .get(&(semantic_type, multiple))
            .map(|c| c.as_ref())
    }

    /// 查表并比较，没有对应策略时返回 false
    pub fn compare(
        &self,
        semantic_type: SemanticType,
        multiple: bool,
        operator: Operator,
        user_value: &Value,
        actual_value: &Value,
    ) -> bool {
        self.get(semantic_type, multiple)
            .is_some_and(|c| c.compare(operator, user_value, actual_value))
    }
}

impl Default for ComparatorTable {
    fn default() -> Self {
        Self::standard()
    }
}

/// 转换为浮点数，无法转换或非有限值时为 0
pub(crate) fn to_f64(value: &Value) -> f64 {
    match value {
        Value::Number(n) => n.as_f64().unwrap_or(0.0),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .filter(|f| f.is_finite())
            .unwrap_or(0.0),
        Value::Bool(b) => f64::from(u8::from(*b)),
        _ => 0.0,
    }
}

/// 转换为字符串，null 和复合值为空串
pub(crate) fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => match n.as_f64() {
            // 100.0 与 "100" 视为同一标识
            Some(f) if n.is_f64() && f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        _ => String::new(),
    }
}

/// 转换为布尔值
pub(crate) fn to_bool(value: &Value) -> bool {
    match value {
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => matches!(
            s.trim().to_ascii_lowercase().as_str(),
            "1" | "true" | "yes" | "on"
        ),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
        Value::Null => false,
    }
}

/// 展开为列表：数组取元素，null 为空，其他标量为单元素列表
pub(crate) fn to_list(value: &Value) -> Vec<&Value> {
    match value {
        Value::Array(arr) => arr.iter().collect(),
        Value::Null => Vec::new(),
        other => vec![other],
    }
}

/// 展开为模式列表：数组逐项，字符串按逗号或换行拆分，忽略空项
pub(crate) fn to_patterns(value: &Value) -> Vec<String> {
    let raw: Vec<String> = match value {
        Value::String(s) => s.split([',', '\n']).map(str::to_string).collect(),
        other => to_list(other).into_iter().map(to_text).collect(),
    };

    raw.into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_f64_coercion() {
        assert_eq!(to_f64(&json!(12.5)), 12.5);
        assert_eq!(to_f64(&json!(" 42 ")), 42.0);
        assert_eq!(to_f64(&json!("abc")), 0.0);
        assert_eq!(to_f64(&json!(null)), 0.0);
        assert_eq!(to_f64(&json!([1])), 0.0);
        assert_eq!(to_f64(&json!(true)), 1.0);
    }

    #[test]
    fn test_to_f64_rejects_non_finite_text() {
        assert_eq!(to_f64(&json!("NaN")), 0.0);
        assert_eq!(to_f64(&json!("inf")), 0.0);
        assert_eq!(to_f64(&json!("-Infinity")), 0.0);

        assert!(NumericComparator.compare(Operator::Eq, &json!(0), &json!("NaN")));
        assert!(!NumericComparator.compare(Operator::Gt, &json!(1_000_000), &json!("inf")));
    }

    #[test]
    fn test_to_text_coercion() {
        assert_eq!(to_text(&json!("US")), "US");
        assert_eq!(to_text(&json!(3)), "3");
        assert_eq!(to_text(&json!(3.0)), "3");
        assert_eq!(to_text(&json!(3.5)), "3.5");
        assert_eq!(to_text(&json!(null)), "");
    }

    #[test]
    fn test_to_bool_coercion() {
        assert!(to_bool(&json!(true)));
        assert!(to_bool(&json!(1)));
        assert!(to_bool(&json!("Yes")));
        assert!(!to_bool(&json!("0")));
        assert!(!to_bool(&json!("")));
        assert!(!to_bool(&json!(null)));
        assert!(to_bool(&json!(["x"])));
    }

    #[test]
    fn test_to_patterns() {
        assert_eq!(
            to_patterns(&json!("10.0.0.0/8, 192.168.*.*\n127.0.0.1")),
            vec!["10.0.0.0/8", "192.168.*.*", "127.0.0.1"]
        );
        assert_eq!(to_patterns(&json!(["@a.com", " ", "b"])), vec!["@a.com", "b"]);
        assert!(to_patterns(&json!(null)).is_empty());
    }

    #[test]
    fn test_table_covers_every_type() {
        let table = ComparatorTable::standard();
        for semantic_type in SemanticType::ALL {
            assert!(table.get(semantic_type, false).is_some());
            assert!(table.get(semantic_type, true).is_some());
        }
    }

    struct AlwaysTrue;

    impl Comparator for AlwaysTrue {
        fn compare(&self, _: Operator, _: &Value, _: &Value) -> bool {
            true
        }
    }

    #[test]
    fn test_table_override() {
        let table = ComparatorTable::standard().with(SemanticType::Text, false, AlwaysTrue);

        assert!(table.compare(
            SemanticType::Text,
            false,
            Operator::Yes,
            &json!(null),
            &json!(null)
        ));
        assert!(!table.compare(
            SemanticType::Text,
            true,
            Operator::Yes,
            &json!(null),
            &json!(null)
        ));
    }
}
