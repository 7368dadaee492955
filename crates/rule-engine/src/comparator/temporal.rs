//! 日期与时间比较
//!
//! 相等比较按日期（天）或时间（分钟）粒度进行，大小比较按完整时刻进行。
//! 任一侧无法解析时不匹配。

use super::Comparator;
use crate::operators::Operator;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use serde_json::Value;
use std::cmp::Ordering;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

const TIME_FORMATS: [&str; 4] = ["%H:%M:%S", "%H:%M", "%I:%M %p", "%I:%M:%S %p"];

/// 解析日期时间
///
/// 支持 RFC 3339、常见的 `YYYY-MM-DD[ HH:MM[:SS]]` 形式以及 Unix 秒级时间戳。
/// 结果统一换算为 UTC 时刻，不带时区的形式按 UTC 解释。
pub fn parse_datetime(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::Number(n) => from_timestamp(n.as_f64()?),
        Value::String(s) => {
            let s = s.trim();

            if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                return Some(dt.with_timezone(&Utc));
            }

            for format in DATETIME_FORMATS {
                if let Ok(dt) = NaiveDateTime::parse_from_str(s, format) {
                    return Some(dt.and_utc());
                }
            }

            if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
                return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
            }

            s.parse::<f64>().ok().and_then(from_timestamp)
        }
        _ => None,
    }
}

fn from_timestamp(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    DateTime::from_timestamp(secs as i64, 0)
}

/// 解析时间，完整的日期时间取其时间部分
pub fn parse_time(value: &Value) -> Option<NaiveTime> {
    if let Value::String(s) = value {
        let s = s.trim();
        for format in TIME_FORMATS {
            if let Ok(time) = NaiveTime::parse_from_str(s, format) {
                return Some(time);
            }
        }
    }

    parse_datetime(value).map(|dt| dt.time())
}

fn ordered(operator: Operator, ordering: Ordering, same_granule: bool) -> bool {
    match operator {
        Operator::Eq => same_granule,
        Operator::Neq => !same_granule,
        Operator::Gt => ordering == Ordering::Greater,
        Operator::Lt => ordering == Ordering::Less,
        Operator::Gte => ordering != Ordering::Less,
        Operator::Lte => ordering != Ordering::Greater,
        _ => false,
    }
}

pub struct DateComparator;

impl Comparator for DateComparator {
    fn compare(&self, operator: Operator, user_value: &Value, actual_value: &Value) -> bool {
        let (Some(actual), Some(expected)) =
            (parse_datetime(actual_value), parse_datetime(user_value))
        else {
            return false;
        };

        ordered(
            operator,
            actual.cmp(&expected),
            actual.date_naive() == expected.date_naive(),
        )
    }
}

pub struct TimeComparator;

impl Comparator for TimeComparator {
    fn compare(&self, operator: Operator, user_value: &Value, actual_value: &Value) -> bool {
        let (Some(actual), Some(expected)) = (parse_time(actual_value), parse_time(user_value))
        else {
            return false;
        };

        let same_minute =
            actual.hour() == expected.hour() && actual.minute() == expected.minute();
        ordered(operator, actual.cmp(&expected), same_minute)
    }
}
