//! 决策表错误类型

use thiserror::Error;

use crate::models::DataType;
use crate::operators::Operator;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("表结构无效: {0}")]
    Schema(String),

    #[error("未知列: {0}")]
    UnknownColumn(String),

    #[error("类型转换失败: 无法将 {value} 转换为 {data_type}: {reason}")]
    TypeCoercion {
        value: String,
        data_type: DataType,
        reason: String,
    },

    #[error("存储值与列类型不一致: {data_type} 列比较到 {left} 与 {right}")]
    ValueMismatch {
        data_type: DataType,
        left: &'static str,
        right: &'static str,
    },

    #[error("不支持的操作符: {operator} 不支持类型 {data_type}")]
    UnsupportedOperator {
        operator: Operator,
        data_type: DataType,
    },

    #[error("无效的正则表达式: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("匹配策略 UNIQUE 要求恰好一行匹配, 实际至少匹配 {count} 行")]
    AmbiguousMatch { count: usize },

    #[error("没有规则匹配且未配置默认行")]
    NoMatch,

    #[error("列 {column}: {source}")]
    Column {
        column: String,
        #[source]
        source: Box<TableError>,
    },

    #[error("行 {number} 列 {column}: {source}")]
    Row {
        number: usize,
        column: String,
        #[source]
        source: Box<TableError>,
    },
}

impl TableError {
    /// 附加列名上下文, 用于定位注册失败的单元格
    pub(crate) fn in_column(self, column: &str) -> Self {
        TableError::Column {
            column: column.to_string(),
            source: Box::new(self),
        }
    }

    /// 附加行号与列名上下文, 用于在多条规则中定位求值失败的单元格
    pub(crate) fn in_row(self, number: usize, column: &str) -> Self {
        TableError::Row {
            number,
            column: column.to_string(),
            source: Box::new(self),
        }
    }
}

pub type Result<T> = std::result::Result<T, TableError>;
