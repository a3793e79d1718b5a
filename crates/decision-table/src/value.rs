//! 值的规范表示与类型转换
//!
//! 将任意宿主输入（JSON 标量、数组、数字包装）转换为列类型约定的
//! 规范表示。所有转换函数都是纯函数, 失败时报告 `TypeCoercion` 错误,
//! 绝不静默降级。

use chrono::{DateTime, FixedOffset, NaiveDate};
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use serde::Serialize;
use serde_json::Value as Json;
use std::str::FromStr;

use crate::error::{Result, TableError};
use crate::models::DataType;

/// 单元格值的规范表示
///
/// `Clone` 即深拷贝: 物化输出时显式克隆, 保证结果与存储行无共享状态。
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Null,
    String(String),
    Integer(i64),
    Decimal(Decimal),
    Boolean(bool),
    Date(NaiveDate),
    DateTime(DateTime<FixedOffset>),
    List(Vec<CellValue>),
}

impl CellValue {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::String(_) => "STRING",
            Self::Integer(_) => "INTEGER",
            Self::Decimal(_) => "DECIMAL",
            Self::Boolean(_) => "BOOLEAN",
            Self::Date(_) => "DATE",
            Self::DateTime(_) => "DATETIME",
            Self::List(_) => "LIST",
        }
    }
}

/// 条件单元格注册后的期望值
///
/// 在注册时按操作符的形态约定整理一次, 求值阶段不再做任何解析。
#[derive(Debug, Clone)]
pub enum ExpectedValue {
    /// 标量或列表值, 已按列类型转换
    Value(CellValue),
    /// 集合操作符的期望集合, 元素已按列的元素类型转换并去重
    Set(Vec<CellValue>),
    /// MATCHES_REGEX 注册时编译好的正则
    Pattern(Regex),
    /// IS_NULL / IS_NOT_NULL 的占位标记
    Presence,
}

/// 将原始值转换为列类型约定的规范表示; `null` 原样保留, 与类型无关
pub fn coerce_value(data_type: DataType, raw: &Json) -> Result<CellValue> {
    if raw.is_null() {
        return Ok(CellValue::Null);
    }

    match data_type {
        DataType::String => coerce_string(raw),
        DataType::Integer => coerce_integer(raw),
        DataType::Decimal => coerce_decimal(raw),
        DataType::Boolean => coerce_boolean(raw),
        DataType::Date => coerce_date(raw),
        DataType::DateTime => coerce_datetime(raw),
        DataType::ListString | DataType::ListInteger => coerce_list(raw, data_type),
    }
}

/// 集合操作符实际值侧的转换: 按列的元素类型逐个转换;
/// `null` 视为空集合
pub fn coerce_collection(data_type: DataType, raw: &Json) -> Result<Vec<CellValue>> {
    if raw.is_null() {
        return Ok(Vec::new());
    }
    let items = raw
        .as_array()
        .ok_or_else(|| coercion_error(raw, data_type, "值不是数组"))?;
    let element_type = data_type.element_type();
    items
        .iter()
        .map(|item| coerce_value(element_type, item))
        .collect()
}

/// 集合操作符期望值侧的整理: 逐个转换并按类型相等去重, 保留首次出现顺序
pub fn sanitize_set(data_type: DataType, raw: &Json) -> Result<Vec<CellValue>> {
    let items = coerce_collection(data_type, raw)?;
    let mut result: Vec<CellValue> = Vec::with_capacity(items.len());
    for item in items {
        if !result.contains(&item) {
            result.push(item);
        }
    }
    Ok(result)
}

fn coerce_string(raw: &Json) -> Result<CellValue> {
    match raw {
        Json::String(s) => Ok(CellValue::String(s.clone())),
        Json::Number(n) => Ok(CellValue::String(n.to_string())),
        Json::Bool(b) => Ok(CellValue::String(b.to_string())),
        _ => Err(coercion_error(raw, DataType::String, "值没有字符串表示")),
    }
}

fn coerce_integer(raw: &Json) -> Result<CellValue> {
    match raw {
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(CellValue::Integer(i))
            } else if n.as_u64().is_some() {
                Err(coercion_error(raw, DataType::Integer, "数值超出 64 位整数范围"))
            } else if let Some(f) = n.as_f64() {
                if f.fract() != 0.0 {
                    Err(coercion_error(raw, DataType::Integer, "数值含小数部分"))
                } else {
                    Ok(CellValue::Integer(f as i64))
                }
            } else {
                Err(coercion_error(raw, DataType::Integer, "无法读取数值"))
            }
        }
        Json::String(s) => {
            let trimmed = trimmed_non_empty(s, raw, DataType::Integer)?;
            trimmed
                .parse::<i64>()
                .map(CellValue::Integer)
                .map_err(|e| coercion_error(raw, DataType::Integer, e.to_string()))
        }
        _ => Err(coercion_error(raw, DataType::Integer, "值不是整数")),
    }
}

fn coerce_decimal(raw: &Json) -> Result<CellValue> {
    match raw {
        // 文本来源按十进制字面量精确解析, 货币与比率比较不经过双精度
        Json::String(s) => {
            let trimmed = trimmed_non_empty(s, raw, DataType::Decimal)?;
            Decimal::from_str(trimmed)
                .map(CellValue::Decimal)
                .map_err(|e| coercion_error(raw, DataType::Decimal, e.to_string()))
        }
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(CellValue::Decimal(Decimal::from(i)))
            } else if let Some(u) = n.as_u64() {
                Ok(CellValue::Decimal(Decimal::from(u)))
            } else if let Some(f) = n.as_f64() {
                Decimal::from_f64(f)
                    .map(CellValue::Decimal)
                    .ok_or_else(|| coercion_error(raw, DataType::Decimal, "数值超出十进制表示范围"))
            } else {
                Err(coercion_error(raw, DataType::Decimal, "无法读取数值"))
            }
        }
        _ => Err(coercion_error(raw, DataType::Decimal, "值不是十进制数")),
    }
}

fn coerce_boolean(raw: &Json) -> Result<CellValue> {
    match raw {
        Json::Bool(b) => Ok(CellValue::Boolean(*b)),
        Json::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(CellValue::Boolean(i != 0))
            } else if let Some(u) = n.as_u64() {
                Ok(CellValue::Boolean(u != 0))
            } else {
                Err(coercion_error(raw, DataType::Boolean, "值不是布尔量"))
            }
        }
        Json::String(s) => {
            let trimmed = trimmed_non_empty(s, raw, DataType::Boolean)?;
            match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "y" => Ok(CellValue::Boolean(true)),
                "false" | "0" | "no" | "n" => Ok(CellValue::Boolean(false)),
                _ => Err(coercion_error(raw, DataType::Boolean, "无法识别的布尔记号")),
            }
        }
        _ => Err(coercion_error(raw, DataType::Boolean, "值不是布尔量")),
    }
}

fn coerce_date(raw: &Json) -> Result<CellValue> {
    let Json::String(s) = raw else {
        return Err(coercion_error(raw, DataType::Date, "日期必须是字符串"));
    };
    let trimmed = trimmed_non_empty(s, raw, DataType::Date)?;
    NaiveDate::parse_from_str(trimmed, "%Y-%m-%d")
        .map(CellValue::Date)
        .map_err(|e| coercion_error(raw, DataType::Date, e.to_string()))
}

fn coerce_datetime(raw: &Json) -> Result<CellValue> {
    let Json::String(s) = raw else {
        return Err(coercion_error(raw, DataType::DateTime, "时间戳必须是字符串"));
    };
    let trimmed = trimmed_non_empty(s, raw, DataType::DateTime)?;
    // RFC 3339 语法同时覆盖纳秒精度与秒精度两种布局; 缺失时区偏移仍然失败
    DateTime::parse_from_rfc3339(trimmed)
        .map(CellValue::DateTime)
        .map_err(|e| coercion_error(raw, DataType::DateTime, e.to_string()))
}

fn coerce_list(raw: &Json, data_type: DataType) -> Result<CellValue> {
    let items = raw
        .as_array()
        .ok_or_else(|| coercion_error(raw, data_type, "值不是数组"))?;
    let element_type = data_type.element_type();
    let values = items
        .iter()
        .map(|item| coerce_value(element_type, item))
        .collect::<Result<Vec<_>>>()?;
    Ok(CellValue::List(values))
}

fn trimmed_non_empty<'a>(s: &'a str, raw: &Json, data_type: DataType) -> Result<&'a str> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(coercion_error(raw, data_type, "字符串为空"));
    }
    Ok(trimmed)
}

fn coercion_error(raw: &Json, data_type: DataType, reason: impl Into<String>) -> TableError {
    TableError::TypeCoercion {
        value: raw.to_string(),
        data_type,
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_passthrough_for_every_type() {
        for data_type in [
            DataType::String,
            DataType::Integer,
            DataType::Decimal,
            DataType::Boolean,
            DataType::Date,
            DataType::DateTime,
            DataType::ListString,
            DataType::ListInteger,
        ] {
            assert_eq!(coerce_value(data_type, &Json::Null).unwrap(), CellValue::Null);
        }
    }

    #[test]
    fn test_string_coercion() {
        assert_eq!(
            coerce_value(DataType::String, &json!("US")).unwrap(),
            CellValue::String("US".to_string())
        );
        assert_eq!(
            coerce_value(DataType::String, &json!(42)).unwrap(),
            CellValue::String("42".to_string())
        );
        assert_eq!(
            coerce_value(DataType::String, &json!(true)).unwrap(),
            CellValue::String("true".to_string())
        );
        assert!(coerce_value(DataType::String, &json!(["a"])).is_err());
    }

    #[test]
    fn test_integer_coercion() {
        assert_eq!(
            coerce_value(DataType::Integer, &json!(18)).unwrap(),
            CellValue::Integer(18)
        );
        assert_eq!(
            coerce_value(DataType::Integer, &json!(32.0)).unwrap(),
            CellValue::Integer(32)
        );
        assert_eq!(
            coerce_value(DataType::Integer, &json!(" 7 ")).unwrap(),
            CellValue::Integer(7)
        );
        assert!(coerce_value(DataType::Integer, &json!(1.5)).is_err());
        assert!(coerce_value(DataType::Integer, &json!(u64::MAX)).is_err());
        assert!(coerce_value(DataType::Integer, &json!("")).is_err());
        assert!(coerce_value(DataType::Integer, &json!("abc")).is_err());
    }

    #[test]
    fn test_decimal_from_string_is_exact() {
        let value = coerce_value(DataType::Decimal, &json!("99.999999999999999999")).unwrap();
        assert_eq!(
            value,
            CellValue::Decimal(Decimal::from_str("99.999999999999999999").unwrap())
        );
        // 超过双精度可分辨的位数仍然保持不同
        let hi = coerce_value(DataType::Decimal, &json!("100.000000000000000001")).unwrap();
        assert_ne!(value, hi);
    }

    #[test]
    fn test_decimal_from_numbers() {
        assert_eq!(
            coerce_value(DataType::Decimal, &json!(12)).unwrap(),
            CellValue::Decimal(Decimal::from(12))
        );
        assert_eq!(
            coerce_value(DataType::Decimal, &json!(0.05)).unwrap(),
            CellValue::Decimal(Decimal::from_str("0.05").unwrap())
        );
        assert!(coerce_value(DataType::Decimal, &json!(true)).is_err());
    }

    #[test]
    fn test_boolean_tokens() {
        for raw in ["true", "1", "yes", "Y", " TRUE "] {
            assert_eq!(
                coerce_value(DataType::Boolean, &json!(raw)).unwrap(),
                CellValue::Boolean(true),
                "raw={raw:?}"
            );
        }
        for raw in ["false", "0", "no", "N"] {
            assert_eq!(
                coerce_value(DataType::Boolean, &json!(raw)).unwrap(),
                CellValue::Boolean(false),
                "raw={raw:?}"
            );
        }
        assert_eq!(
            coerce_value(DataType::Boolean, &json!(2)).unwrap(),
            CellValue::Boolean(true)
        );
        assert!(coerce_value(DataType::Boolean, &json!("maybe")).is_err());
    }

    #[test]
    fn test_date_layout() {
        assert_eq!(
            coerce_value(DataType::Date, &json!("2024-01-15")).unwrap(),
            CellValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );
        assert!(coerce_value(DataType::Date, &json!("15/01/2024")).is_err());
        assert!(coerce_value(DataType::Date, &json!(20240115)).is_err());
    }

    #[test]
    fn test_datetime_layouts() {
        // 纳秒精度与秒精度都在接受范围内
        assert!(coerce_value(DataType::DateTime, &json!("2024-01-15T10:00:00.123456789Z")).is_ok());
        assert!(coerce_value(DataType::DateTime, &json!("2024-01-15T10:00:00+08:00")).is_ok());
        // 缺失时区偏移不被接受
        assert!(coerce_value(DataType::DateTime, &json!("2024-01-15T10:00:00")).is_err());
        assert!(coerce_value(DataType::DateTime, &json!("   ")).is_err());
    }

    #[test]
    fn test_datetime_equality_is_instant_based() {
        let utc = coerce_value(DataType::DateTime, &json!("2024-01-15T10:00:00Z")).unwrap();
        let offset = coerce_value(DataType::DateTime, &json!("2024-01-15T18:00:00+08:00")).unwrap();
        assert_eq!(utc, offset);
    }

    #[test]
    fn test_list_coercion_is_element_wise() {
        assert_eq!(
            coerce_value(DataType::ListString, &json!(["vip", "beta"])).unwrap(),
            CellValue::List(vec![
                CellValue::String("vip".to_string()),
                CellValue::String("beta".to_string()),
            ])
        );
        assert_eq!(
            coerce_value(DataType::ListInteger, &json!([1, "2"])).unwrap(),
            CellValue::List(vec![CellValue::Integer(1), CellValue::Integer(2)])
        );
        assert!(coerce_value(DataType::ListInteger, &json!([1, "x"])).is_err());
        assert!(coerce_value(DataType::ListString, &json!("vip")).is_err());
    }

    #[test]
    fn test_coerce_collection_null_is_empty() {
        assert!(coerce_collection(DataType::ListString, &Json::Null)
            .unwrap()
            .is_empty());
        assert!(coerce_collection(DataType::String, &json!("vip")).is_err());
    }

    #[test]
    fn test_sanitize_set_dedupes_in_order() {
        let set = sanitize_set(DataType::String, &json!(["US", "CA", "US", "MX", "CA"])).unwrap();
        assert_eq!(
            set,
            vec![
                CellValue::String("US".to_string()),
                CellValue::String("CA".to_string()),
                CellValue::String("MX".to_string()),
            ]
        );
    }

    #[test]
    fn test_sanitize_set_dedupes_decimals_by_value() {
        let set = sanitize_set(DataType::Decimal, &json!(["1.50", "1.5", "2.0"])).unwrap();
        assert_eq!(set.len(), 2);
    }
}
