//! 文本、数值、布尔比较

use super::{Comparator, matches_patterns, to_bool, to_f64, to_text};
use crate::operators::Operator;
use serde_json::Value;

/// 文本：字符串相等，另支持标签模式操作符
pub struct TextComparator;

impl Comparator for TextComparator {
    fn compare(&self, operator: Operator, user_value: &Value, actual_value: &Value) -> bool {
        match operator {
            Operator::Eq => to_text(actual_value) == to_text(user_value),
            Operator::Neq => to_text(actual_value) != to_text(user_value),
            op if op.pattern().is_some() => matches_patterns(op, user_value, actual_value),
            _ => false,
        }
    }
}

/// 数值：两侧统一转为浮点数，避免整数和浮点数比较失败（如 100 == 100.0）
pub struct NumericComparator;

impl Comparator for NumericComparator {
    fn compare(&self, operator: Operator, user_value: &Value, actual_value: &Value) -> bool {
        let actual = to_f64(actual_value);
        let expected = to_f64(user_value);

        match operator {
            Operator::Eq => (actual - expected).abs() < f64::EPSILON,
            Operator::Neq => (actual - expected).abs() >= f64::EPSILON,
            Operator::Gt => actual > expected,
            Operator::Lt => actual < expected,
            Operator::Gte => actual >= expected,
            Operator::Lte => actual <= expected,
            _ => false,
        }
    }
}

/// 布尔：只看实际值，用户值不参与比较
pub struct BooleanComparator;

impl Comparator for BooleanComparator {
    fn compare(&self, operator: Operator, _user_value: &Value, actual_value: &Value) -> bool {
        match operator {
            Operator::Yes => to_bool(actual_value),
            Operator::No => !to_bool(actual_value),
            _ => false,
        }
    }
}
