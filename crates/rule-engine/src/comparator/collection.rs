//! 集合成员比较
//!
//! 两侧都视为标量标识的集合，标识统一按字符串比较（1 与 "1" 相同）。
//! 单值条件退化为相等比较：实际值等于用户值（或用户值列表中的任一项）。

use super::{Comparator, to_list, to_text};
use crate::operators::Operator;
use serde_json::Value;
use std::collections::HashSet;

pub struct CollectionComparator {
    multiple: bool,
}

impl CollectionComparator {
    pub fn new(multiple: bool) -> Self {
        Self { multiple }
    }

    fn identifiers(value: &Value) -> HashSet<String> {
        to_list(value).into_iter().map(to_text).collect()
    }

    fn compare_sets(operator: Operator, user_value: &Value, actual_value: &Value) -> bool {
        let configured = Self::identifiers(user_value);
        let actual = Self::identifiers(actual_value);

        match operator {
            Operator::AnyOf => !configured.is_disjoint(&actual),
            Operator::NoneOf => configured.is_disjoint(&actual),
            Operator::AllOf => configured.is_subset(&actual),
            _ => false,
        }
    }

    fn compare_single(operator: Operator, user_value: &Value, actual_value: &Value) -> bool {
        let configured = Self::identifiers(user_value);
        let equal = to_list(actual_value)
            .into_iter()
            .any(|item| configured.contains(&to_text(item)));

        match operator {
            Operator::Eq => equal,
            Operator::Neq => !equal,
            _ => false,
        }
    }
}

impl Comparator for CollectionComparator {
    fn compare(&self, operator: Operator, user_value: &Value, actual_value: &Value) -> bool {
        if self.multiple {
            Self::compare_sets(operator, user_value, actual_value)
        } else {
            Self::compare_single(operator, user_value, actual_value)
        }
    }
}
