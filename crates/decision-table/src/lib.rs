//! 决策表引擎
//!
//! 将结构化输入记录与带类型的条件规则表匹配并产出结构化输出, 支持:
//! - 八种数据类型的规范值转换, 文本来源的十进制数无损比较
//! - 标量与集合两类操作符代数, 严格类型守卫, 不静默降级
//! - FIRST / ALL / UNIQUE 匹配策略与默认行、回退映射
//! - 物化即克隆, 输出与存储行完全隔离
//!
//! 规则定义的文档解析（JSON 文档、表格布局）由外部协作方完成,
//! 本引擎只消费规范的列描述与原始行, 自身不做任何文件或网络 I/O。

pub mod compiler;
pub mod error;
pub mod evaluator;
pub mod models;
pub mod operators;
pub mod table;
pub mod value;

pub use compiler::{CompiledEvalCell, CompiledReturnCell, CompiledRow};
pub use error::{Result, TableError};
pub use evaluator::CellEvaluator;
pub use models::{
    Column, ColumnType, DataType, EvalCell, MatchPolicy, MatchedRow, NoMatchPolicy, ReturnCell,
    Row, RowValidationPolicy, TableConfig,
};
pub use operators::Operator;
pub use table::DecisionTable;
pub use value::{CellValue, ExpectedValue};
