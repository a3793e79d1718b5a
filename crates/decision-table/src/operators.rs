//! 决策表操作符定义

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::TableError;
use crate::models::normalize_keyword;

/// 条件操作符
///
/// 每个操作符对两侧值的形态有固定约定: 实际值侧是否必须是集合
/// ([`expects_actual_collection`](Operator::expects_actual_collection)),
/// 以及期望值侧是否在注册时整理为集合
/// ([`requires_collection_value`](Operator::requires_collection_value))。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    // 相等比较
    #[serde(rename = "EQ")]
    Equal,
    #[serde(rename = "NOT_EQ")]
    NotEqual,

    // 大小比较
    #[serde(rename = "GT")]
    Greater,
    #[serde(rename = "GT_EQ")]
    GreaterOrEqual,
    #[serde(rename = "LT")]
    Less,
    #[serde(rename = "LT_EQ")]
    LessOrEqual,

    // 集合成员
    #[serde(rename = "IN")]
    In,
    #[serde(rename = "NOT_IN")]
    NotIn,

    // 集合谓词（实际值本身是集合）
    #[serde(rename = "ANY_CONTAINED_IN")]
    AnyContainedIn,
    #[serde(rename = "NOT_ANY_CONTAINED_IN")]
    NotAnyContainedIn,
    #[serde(rename = "ALL_CONTAINED_IN")]
    AllContainedIn,
    #[serde(rename = "NOT_ALL_CONTAINED_IN")]
    NotAllContainedIn,
    #[serde(rename = "CONTAINS_ALL")]
    ContainsAll,
    #[serde(rename = "NOT_CONTAINS_ALL")]
    NotContainsAll,
    #[serde(rename = "ALL_EQUAL")]
    AllEqual,

    // 正则匹配
    #[serde(rename = "MATCHES_REGEX")]
    MatchesRegex,

    // 空值检查
    #[serde(rename = "IS_NULL")]
    IsNull,
    #[serde(rename = "IS_NOT_NULL")]
    IsNotNull,
}

impl Operator {
    /// 期望值是否需要在注册时整理为集合
    pub fn requires_collection_value(self) -> bool {
        matches!(
            self,
            Self::In
                | Self::NotIn
                | Self::AnyContainedIn
                | Self::NotAnyContainedIn
                | Self::AllContainedIn
                | Self::NotAllContainedIn
                | Self::ContainsAll
                | Self::NotContainsAll
        )
    }

    /// 实际值侧是否必须是集合
    pub fn expects_actual_collection(self) -> bool {
        matches!(
            self,
            Self::AnyContainedIn
                | Self::NotAnyContainedIn
                | Self::AllContainedIn
                | Self::NotAllContainedIn
                | Self::ContainsAll
                | Self::NotContainsAll
                | Self::AllEqual
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Equal => "EQ",
            Self::NotEqual => "NOT_EQ",
            Self::Greater => "GT",
            Self::GreaterOrEqual => "GT_EQ",
            Self::Less => "LT",
            Self::LessOrEqual => "LT_EQ",
            Self::In => "IN",
            Self::NotIn => "NOT_IN",
            Self::AnyContainedIn => "ANY_CONTAINED_IN",
            Self::NotAnyContainedIn => "NOT_ANY_CONTAINED_IN",
            Self::AllContainedIn => "ALL_CONTAINED_IN",
            Self::NotAllContainedIn => "NOT_ALL_CONTAINED_IN",
            Self::ContainsAll => "CONTAINS_ALL",
            Self::NotContainsAll => "NOT_CONTAINS_ALL",
            Self::AllEqual => "ALL_EQUAL",
            Self::MatchesRegex => "MATCHES_REGEX",
            Self::IsNull => "IS_NULL",
            Self::IsNotNull => "IS_NOT_NULL",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Operator {
    type Err = TableError;

    /// 解析操作符记号, 同时接受符号形式（`>=`）、短记号（`GT_EQ`）
    /// 与长记号（`GREATER_THAN_OR_EQUAL`）
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            ">=" => return Ok(Self::GreaterOrEqual),
            ">" => return Ok(Self::Greater),
            "=" | "==" => return Ok(Self::Equal),
            "<" => return Ok(Self::Less),
            "<=" => return Ok(Self::LessOrEqual),
            "<>" | "!=" => return Ok(Self::NotEqual),
            _ => {}
        }

        match normalize_keyword(s).as_str() {
            "EQ" | "EQUAL" => Ok(Self::Equal),
            "NOT_EQ" | "NOT_EQUAL" | "NOTEQUAL" => Ok(Self::NotEqual),
            "GT" | "GREATER_THAN" | "GREATERTHAN" => Ok(Self::Greater),
            "GT_EQ" | "GREATER_THAN_OR_EQUAL" | "GREATERTHANOREQUAL" => Ok(Self::GreaterOrEqual),
            "LT" | "LESS_THAN" | "LESSTHAN" => Ok(Self::Less),
            "LT_EQ" | "LESS_THAN_OR_EQUAL" | "LESSTHANOREQUAL" => Ok(Self::LessOrEqual),
            "IN" => Ok(Self::In),
            "NOT_IN" | "NOTIN" => Ok(Self::NotIn),
            "ANY_CONTAINED_IN" => Ok(Self::AnyContainedIn),
            "NOT_ANY_CONTAINED_IN" => Ok(Self::NotAnyContainedIn),
            "ALL_CONTAINED_IN" => Ok(Self::AllContainedIn),
            "NOT_ALL_CONTAINED_IN" => Ok(Self::NotAllContainedIn),
            "CONTAINS_ALL" => Ok(Self::ContainsAll),
            "NOT_CONTAINS_ALL" => Ok(Self::NotContainsAll),
            "ALL_EQUAL" => Ok(Self::AllEqual),
            "MATCHES_REGEX" | "MATCHESREGEX" => Ok(Self::MatchesRegex),
            "IS_NULL" | "ISNULL" => Ok(Self::IsNull),
            "IS_NOT_NULL" | "ISNOTNULL" => Ok(Self::IsNotNull),
            _ => Err(TableError::Schema(format!("未知操作符: {:?}", s))),
        }
    }
}
