//! IP 与邮箱模式比较
//!
//! 用户值可以是单个模式、模式数组或以逗号/换行分隔的字符串；`*_match` 在任一模式
//! 命中时为真，`*_not_match` 是它的取反。格式错误的模式视为不命中。

use super::{Comparator, matches_patterns, to_patterns, to_text};
use crate::operators::Operator;
use serde_json::Value;
use std::net::{IpAddr, Ipv4Addr};

/// IP 地址比较：精确地址、CIDR（`10.0.0.0/8`）或 IPv4 通配（`192.168.*.*`）
pub struct IpComparator;

impl Comparator for IpComparator {
    fn compare(&self, operator: Operator, user_value: &Value, actual_value: &Value) -> bool {
        let actual = to_text(actual_value);
        let actual = actual.trim();
        let hit = || {
            to_patterns(user_value)
                .iter()
                .any(|pattern| ip_pattern_matches(pattern, actual))
        };

        match operator {
            Operator::IpMatch => hit(),
            Operator::IpNotMatch => !hit(),
            _ => false,
        }
    }
}

/// 单个 IP 模式是否命中
pub fn ip_pattern_matches(pattern: &str, actual: &str) -> bool {
    let pattern = pattern.trim();

    if let Some((network, prefix)) = pattern.split_once('/') {
        return cidr_contains(network.trim(), prefix.trim(), actual);
    }

    if pattern.contains('*') {
        return wildcard_matches(pattern, actual);
    }

    if pattern == actual {
        return true;
    }

    // 同一地址的不同写法（如 IPv6 缩写）
    match (pattern.parse::<IpAddr>(), actual.parse::<IpAddr>()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn cidr_contains(network: &str, prefix: &str, actual: &str) -> bool {
    let (Ok(network), Ok(prefix), Ok(actual)) = (
        network.parse::<IpAddr>(),
        prefix.parse::<u32>(),
        actual.parse::<IpAddr>(),
    ) else {
        return false;
    };

    match (network, actual) {
        (IpAddr::V4(network), IpAddr::V4(actual)) => {
            if prefix > 32 {
                return false;
            }
            let mask = u32::MAX.checked_shl(32 - prefix).unwrap_or(0);
            u32::from(network) & mask == u32::from(actual) & mask
        }
        (IpAddr::V6(network), IpAddr::V6(actual)) => {
            if prefix > 128 {
                return false;
            }
            let mask = u128::MAX.checked_shl(128 - prefix).unwrap_or(0);
            u128::from(network) & mask == u128::from(actual) & mask
        }
        _ => false,
    }
}

fn wildcard_matches(pattern: &str, actual: &str) -> bool {
    let Ok(actual) = actual.parse::<Ipv4Addr>() else {
        return false;
    };

    let parts: Vec<&str> = pattern.split('.').collect();
    if parts.len() != 4 {
        return false;
    }

    parts
        .iter()
        .zip(actual.octets())
        .all(|(part, octet)| *part == "*" || *part == octet.to_string())
}

/// 邮箱比较
///
/// `email_match` 支持完整地址、`@domain`、`.tld` 与域名子串四种模式，
/// 同时接受 `==`/`!=`（忽略大小写）与标签模式族操作符。
pub struct EmailComparator;

impl Comparator for EmailComparator {
    fn compare(&self, operator: Operator, user_value: &Value, actual_value: &Value) -> bool {
        let actual = to_text(actual_value);
        let hit = || {
            to_patterns(user_value)
                .iter()
                .any(|pattern| email_pattern_matches(pattern, &actual))
        };

        match operator {
            Operator::EmailMatch => hit(),
            Operator::EmailNotMatch => !hit(),
            Operator::Eq => actual.trim().eq_ignore_ascii_case(to_text(user_value).trim()),
            Operator::Neq => !actual.trim().eq_ignore_ascii_case(to_text(user_value).trim()),
            op if op.pattern().is_some() => matches_patterns(op, user_value, actual_value),
            _ => false,
        }
    }
}

/// 单个邮箱模式是否命中，按 完整地址 → `@domain` → `.tld` → 子串 的顺序取第一个适用的规则
pub fn email_pattern_matches(pattern: &str, address: &str) -> bool {
    let pattern = pattern.trim().to_lowercase();
    let address = address.trim().to_lowercase();

    if pattern.is_empty() || address.is_empty() {
        return false;
    }

    let domain = address.rsplit_once('@').map(|(_, d)| d).unwrap_or("");

    if !pattern.starts_with('@') && pattern.contains('@') {
        address == pattern
    } else if pattern.starts_with('@') {
        address.ends_with(&pattern)
    } else if pattern.starts_with('.') {
        domain.ends_with(&pattern)
    } else {
        domain.contains(&pattern)
    }
}
