//! 决策表领域模型

use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, TableError};
use crate::operators::Operator;
use crate::value::CellValue;

/// 统一记号归一化: 去除首尾空白、转大写、空格与连字符折叠为下划线
pub(crate) fn normalize_keyword(s: &str) -> String {
    s.trim().to_ascii_uppercase().replace([' ', '-'], "_")
}

/// 列在决策表中的角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ColumnType {
    Condition,
    Conclusion,
    Metadata,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Condition => "CONDITION",
            Self::Conclusion => "CONCLUSION",
            Self::Metadata => "METADATA",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for ColumnType {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_keyword(s).as_str() {
            "CONDITION" => Ok(Self::Condition),
            "CONCLUSION" => Ok(Self::Conclusion),
            "METADATA" => Ok(Self::Metadata),
            _ => Err(TableError::Schema(format!("未知列角色: {:?}", s))),
        }
    }
}

/// 列的数据类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DataType {
    String,
    Integer,
    Decimal,
    Boolean,
    Date,
    #[serde(rename = "DATETIME")]
    DateTime,
    ListString,
    ListInteger,
}

impl DataType {
    /// 列表类型的元素类型, 标量类型返回自身
    pub fn element_type(self) -> DataType {
        match self {
            Self::ListString => Self::String,
            Self::ListInteger => Self::Integer,
            other => other,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::String => "STRING",
            Self::Integer => "INTEGER",
            Self::Decimal => "DECIMAL",
            Self::Boolean => "BOOLEAN",
            Self::Date => "DATE",
            Self::DateTime => "DATETIME",
            Self::ListString => "LIST_STRING",
            Self::ListInteger => "LIST_INTEGER",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for DataType {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_keyword(s).as_str() {
            "STRING" => Ok(Self::String),
            "INTEGER" => Ok(Self::Integer),
            "DECIMAL" => Ok(Self::Decimal),
            "BOOLEAN" => Ok(Self::Boolean),
            "DATE" => Ok(Self::Date),
            "DATETIME" => Ok(Self::DateTime),
            "LIST_STRING" => Ok(Self::ListString),
            "LIST_INTEGER" => Ok(Self::ListInteger),
            _ => Err(TableError::Schema(format!("未知数据类型: {:?}", s))),
        }
    }
}

/// 匹配策略: 控制返回多少条匹配行
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MatchPolicy {
    First,
    #[default]
    All,
    Unique,
}

impl fmt::Display for MatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::First => "FIRST",
            Self::All => "ALL",
            Self::Unique => "UNIQUE",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for MatchPolicy {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_keyword(s).as_str() {
            "FIRST" => Ok(Self::First),
            "ALL" => Ok(Self::All),
            "UNIQUE" => Ok(Self::Unique),
            _ => Err(TableError::Schema(format!("未知匹配策略: {:?}", s))),
        }
    }
}

/// 无匹配策略: 控制没有任何行匹配时的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NoMatchPolicy {
    ReturnDefault,
    #[default]
    ThrowError,
}

impl fmt::Display for NoMatchPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::ReturnDefault => "RETURN_DEFAULT",
            Self::ThrowError => "THROW_ERROR",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for NoMatchPolicy {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_keyword(s).as_str() {
            "RETURN_DEFAULT" => Ok(Self::ReturnDefault),
            "THROW_ERROR" => Ok(Self::ThrowError),
            _ => Err(TableError::Schema(format!("未知无匹配策略: {:?}", s))),
        }
    }
}

/// 行校验策略: 控制注册时对空单元格集合的容忍度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RowValidationPolicy {
    #[default]
    Strict,
    Lenient,
}

impl fmt::Display for RowValidationPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Strict => "STRICT",
            Self::Lenient => "LENIENT",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RowValidationPolicy {
    type Err = TableError;

    fn from_str(s: &str) -> Result<Self> {
        match normalize_keyword(s).as_str() {
            "" | "DEFAULT" | "STRICT" => Ok(Self::Strict),
            "LENIENT" => Ok(Self::Lenient),
            _ => Err(TableError::Schema(format!("未知行校验策略: {:?}", s))),
        }
    }
}

/// 决策表构造配置, 一次性传入
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub match_policy: MatchPolicy,
    pub no_match_policy: NoMatchPolicy,
    pub row_validation: RowValidationPolicy,
}

/// 决策表列定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub column_type: ColumnType,
    pub data_type: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, column_type: ColumnType, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            column_type,
            data_type,
        }
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(TableError::Schema("列名不能为空".to_string()));
        }
        Ok(())
    }
}

/// 未整理的条件单元格, 由外部协作方提供
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvalCell {
    pub column: String,
    pub operator: Operator,
    #[serde(default)]
    pub value: Json,
}

impl EvalCell {
    pub fn new(column: impl Into<String>, operator: Operator, value: Json) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }
}

/// 未整理的输出单元格, 由外部协作方提供
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnCell {
    pub column: String,
    #[serde(default)]
    pub value: Json,
}

impl ReturnCell {
    pub fn new(column: impl Into<String>, value: Json) -> Self {
        Self {
            column: column.into(),
            value,
        }
    }
}

/// 未整理的决策表行
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Row {
    pub eval_cells: Vec<EvalCell>,
    pub return_cells: Vec<ReturnCell>,
    pub rule_id: String,
    pub comments: String,
    /// 1 起始的声明序号, 0 表示由表在注册时按声明顺序补齐
    pub number: usize,
}

impl Row {
    pub fn new(rule_id: impl Into<String>) -> Self {
        Self {
            rule_id: rule_id.into(),
            ..Self::default()
        }
    }

    pub fn with_eval_cell(
        mut self,
        column: impl Into<String>,
        operator: Operator,
        value: Json,
    ) -> Self {
        self.eval_cells.push(EvalCell::new(column, operator, value));
        self
    }

    pub fn with_return_cell(mut self, column: impl Into<String>, value: Json) -> Self {
        self.return_cells.push(ReturnCell::new(column, value));
        self
    }

    pub fn with_comments(mut self, comments: impl Into<String>) -> Self {
        self.comments = comments.into();
        self
    }

    pub fn with_number(mut self, number: usize) -> Self {
        self.number = number;
        self
    }
}

/// 匹配结果行
///
/// `values` 中的值是存储行的深拷贝, 与表内部状态无任何共享。
/// `row_number` 为 0 表示该结果来自调用方提供的回退映射, 没有对应的规则行。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchedRow {
    pub values: HashMap<String, CellValue>,
    pub rule_id: String,
    pub comments: String,
    pub row_number: usize,
}
