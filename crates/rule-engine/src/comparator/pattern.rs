//! 标签模式比较
//!
//! 用户值是一组字符串模式，实际值是单个字符串；`any_*` 要求至少一个模式命中，
//! `none_*` 要求没有模式命中。实际值为数组时，任一元素命中即视为命中。

use super::{Comparator, to_list, to_text};
use crate::operators::{Operator, PatternMode, Quantifier};
use serde_json::Value;

pub struct TagPatternComparator;

impl Comparator for TagPatternComparator {
    fn compare(&self, operator: Operator, user_value: &Value, actual_value: &Value) -> bool {
        matches_patterns(operator, user_value, actual_value)
    }
}

/// 标签模式族的求值，非模式操作符返回 false
pub fn matches_patterns(operator: Operator, user_value: &Value, actual_value: &Value) -> bool {
    let Some((quantifier, mode)) = operator.pattern() else {
        return false;
    };

    let patterns: Vec<String> = to_list(user_value)
        .into_iter()
        .map(to_text)
        .filter(|p| !p.is_empty())
        .collect();
    let candidates: Vec<String> = to_list(actual_value).into_iter().map(to_text).collect();

    let hit = candidates
        .iter()
        .any(|candidate| patterns.iter().any(|p| pattern_matches(mode, p, candidate)));

    match quantifier {
        Quantifier::Any => hit,
        Quantifier::None => !hit,
    }
}

fn pattern_matches(mode: PatternMode, pattern: &str, candidate: &str) -> bool {
    match mode {
        PatternMode::Exact => candidate == pattern,
        PatternMode::Contains => candidate.contains(pattern),
        PatternMode::Starts => candidate.starts_with(pattern),
        PatternMode::Ends => candidate.ends_with(pattern),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn check(op: Operator, patterns: Value, actual: Value) -> bool {
        TagPatternComparator.compare(op, &patterns, &actual)
    }

    #[test]
    fn test_any_ends_with_email_domains() {
        let patterns = json!(["@gmail.com", "@yahoo.com"]);
        assert!(check(Operator::AnyEnds, patterns.clone(), json!("joe@gmail.com")));
        assert!(!check(Operator::AnyEnds, patterns, json!("joe@outlook.com")));
    }

    #[test]
    fn test_none_ends() {
        let patterns = json!(["@gmail.com", "@yahoo.com"]);
        assert!(check(Operator::NoneEnds, patterns.clone(), json!("joe@outlook.com")));
        assert!(!check(Operator::NoneEnds, patterns, json!("joe@yahoo.com")));
    }

    #[test]
    fn test_exact_is_case_sensitive() {
        assert!(check(Operator::AnyExact, json!(["vip"]), json!("vip")));
        assert!(!check(Operator::AnyExact, json!(["vip"]), json!("VIP")));
        assert!(check(Operator::NoneExact, json!(["vip"]), json!("VIP")));
    }

    #[test]
    fn test_contains_and_starts() {
        assert!(check(Operator::AnyContains, json!(["sale"]), json!("summer-sale-2024")));
        assert!(check(Operator::NoneContains, json!(["sale"]), json!("summer-2024")));
        assert!(check(Operator::AnyStarts, json!(["summer", "winter"]), json!("winter-sale")));
        assert!(check(Operator::NoneStarts, json!(["summer"]), json!("winter-sale")));
    }

    #[test]
    fn test_single_pattern_string() {
        assert!(check(Operator::AnyStarts, json!("SKU-"), json!("SKU-001")));
    }

    #[test]
    fn test_array_actual_value() {
        assert!(check(Operator::AnyExact, json!(["vip"]), json!(["new", "vip"])));
        assert!(!check(Operator::NoneExact, json!(["vip"]), json!(["new", "vip"])));
    }

    #[test]
    fn test_empty_patterns() {
        assert!(!check(Operator::AnyContains, json!([]), json!("anything")));
        assert!(check(Operator::NoneContains, json!([""]), json!("anything")));
    }

    #[test]
    fn test_non_pattern_operator() {
        assert!(!check(Operator::Eq, json!(["a"]), json!("a")));
    }
}
