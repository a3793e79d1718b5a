//! 行编译器
//!
//! 在注册时把外部协作方提供的原始行整理成可求值的存储形式:
//! 解析列引用、按操作符形态整理期望值、编译正则、集合去重。
//! 每一行只整理一次, 之后求值阶段只读。

use std::collections::HashMap;

use regex::Regex;
use serde_json::Value as Json;

use crate::error::{Result, TableError};
use crate::evaluator::CellEvaluator;
use crate::models::{Column, DataType, Row};
use crate::operators::Operator;
use crate::value::{self, CellValue, ExpectedValue};

static JSON_NULL: Json = Json::Null;

/// 编译后的条件单元格
#[derive(Debug, Clone)]
pub struct CompiledEvalCell {
    pub column: String,
    pub operator: Operator,
    pub expected: ExpectedValue,
    pub data_type: DataType,
}

/// 编译后的输出单元格
#[derive(Debug, Clone)]
pub struct CompiledReturnCell {
    pub column: String,
    pub value: CellValue,
    pub data_type: DataType,
}

/// 编译后的决策表行
#[derive(Debug, Clone)]
pub struct CompiledRow {
    pub eval_cells: Vec<CompiledEvalCell>,
    pub return_cells: Vec<CompiledReturnCell>,
    pub rule_id: String,
    pub comments: String,
    pub number: usize,
}

impl CompiledRow {
    /// 判断输入记录是否满足本行全部条件
    ///
    /// 条件单元格按声明顺序构成合取, 遇到第一个不匹配即短路返回,
    /// 之后的单元格不再求值。
    pub fn matches(&self, input: &HashMap<String, Json>) -> Result<bool> {
        for cell in &self.eval_cells {
            let actual = input.get(&cell.column).unwrap_or(&JSON_NULL);
            let matched =
                CellEvaluator::evaluate(cell.data_type, cell.operator, actual, &cell.expected)
                    .map_err(|e| e.in_row(self.number, &cell.column))?;
            if !matched {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 物化输出单元格
    ///
    /// 每个值都显式克隆, 返回的映射与存储行不共享任何状态。
    pub fn materialize(&self) -> HashMap<String, CellValue> {
        self.return_cells
            .iter()
            .map(|cell| (cell.column.clone(), cell.value.clone()))
            .collect()
    }
}

/// 行编译器, 借用决策表的两组列定义
pub struct RowCompiler<'a> {
    condition_columns: &'a HashMap<String, Column>,
    output_columns: &'a HashMap<String, Column>,
}

impl<'a> RowCompiler<'a> {
    pub fn new(
        condition_columns: &'a HashMap<String, Column>,
        output_columns: &'a HashMap<String, Column>,
    ) -> Self {
        Self {
            condition_columns,
            output_columns,
        }
    }

    /// 编译一行
    ///
    /// `require_eval` / `require_return` 对应行校验策略:
    /// 严格模式要求普通行两侧都非空, 默认行只要求输出侧非空。
    pub fn compile(&self, row: &Row, require_eval: bool, require_return: bool) -> Result<CompiledRow> {
        if require_eval && row.eval_cells.is_empty() {
            return Err(TableError::Schema(
                "行必须至少包含一个条件单元格".to_string(),
            ));
        }
        if require_return && row.return_cells.is_empty() {
            return Err(TableError::Schema(
                "行必须至少包含一个输出单元格".to_string(),
            ));
        }

        let mut eval_cells = Vec::with_capacity(row.eval_cells.len());
        for cell in &row.eval_cells {
            let column = self
                .condition_columns
                .get(&cell.column)
                .ok_or_else(|| TableError::UnknownColumn(cell.column.clone()))?;
            let expected = sanitize_expected_value(column.data_type, cell.operator, &cell.value)
                .map_err(|e| e.in_column(&column.name))?;
            eval_cells.push(CompiledEvalCell {
                column: column.name.clone(),
                operator: cell.operator,
                expected,
                data_type: column.data_type,
            });
        }

        let mut return_cells = Vec::with_capacity(row.return_cells.len());
        for cell in &row.return_cells {
            let column = self
                .output_columns
                .get(&cell.column)
                .ok_or_else(|| TableError::UnknownColumn(cell.column.clone()))?;
            let value = value::coerce_value(column.data_type, &cell.value)
                .map_err(|e| e.in_column(&column.name))?;
            return_cells.push(CompiledReturnCell {
                column: column.name.clone(),
                value,
                data_type: column.data_type,
            });
        }

        Ok(CompiledRow {
            eval_cells,
            return_cells,
            rule_id: row.rule_id.clone(),
            comments: row.comments.clone(),
            number: row.number,
        })
    }
}

/// 按操作符的形态约定整理期望值
fn sanitize_expected_value(
    data_type: DataType,
    operator: Operator,
    raw: &Json,
) -> Result<ExpectedValue> {
    match operator {
        Operator::MatchesRegex => {
            if raw.is_null() {
                return Err(TableError::Schema(
                    "操作符 MATCHES_REGEX 需要一个模式串".to_string(),
                ));
            }
            match value::coerce_value(DataType::String, raw)? {
                CellValue::String(pattern) => Ok(ExpectedValue::Pattern(Regex::new(&pattern)?)),
                other => Err(TableError::Schema(format!(
                    "操作符 MATCHES_REGEX 需要字符串模式, 得到 {}",
                    other.type_name()
                ))),
            }
        }
        Operator::IsNull | Operator::IsNotNull => {
            if raw.is_null() {
                return Ok(ExpectedValue::Presence);
            }
            match value::coerce_value(DataType::Boolean, raw)? {
                CellValue::Boolean(true) => Ok(ExpectedValue::Presence),
                _ => Err(TableError::Schema(format!(
                    "操作符 {} 的期望值只能为 true",
                    operator
                ))),
            }
        }
        _ if operator.requires_collection_value() => {
            if raw.is_null() {
                Ok(ExpectedValue::Set(Vec::new()))
            } else {
                Ok(ExpectedValue::Set(value::sanitize_set(data_type, raw)?))
            }
        }
        _ => Ok(ExpectedValue::Value(value::coerce_value(data_type, raw)?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    use crate::models::ColumnType;

    fn column_maps() -> (HashMap<String, Column>, HashMap<String, Column>) {
        let conditions = [
            Column::new("age", ColumnType::Condition, DataType::Integer),
            Column::new("country", ColumnType::Condition, DataType::String),
            Column::new("segments", ColumnType::Condition, DataType::ListString),
        ]
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();
        let outputs = [
            Column::new("tier", ColumnType::Conclusion, DataType::String),
            Column::new("discount", ColumnType::Conclusion, DataType::Decimal),
        ]
        .into_iter()
        .map(|c| (c.name.clone(), c))
        .collect();
        (conditions, outputs)
    }

    #[test]
    fn test_compile_resolves_column_types() {
        let (conditions, outputs) = column_maps();
        let compiler = RowCompiler::new(&conditions, &outputs);
        let row = Row::new("r-1")
            .with_eval_cell("age", Operator::GreaterOrEqual, json!(18))
            .with_return_cell("tier", json!("standard"));
        let compiled = compiler.compile(&row, true, true).unwrap();
        assert_eq!(compiled.eval_cells[0].data_type, DataType::Integer);
        assert!(matches!(
            compiled.eval_cells[0].expected,
            ExpectedValue::Value(CellValue::Integer(18))
        ));
        assert_eq!(compiled.return_cells[0].data_type, DataType::String);
    }

    #[test]
    fn test_compile_rejects_unknown_columns() {
        let (conditions, outputs) = column_maps();
        let compiler = RowCompiler::new(&conditions, &outputs);
        let row = Row::new("r-1")
            .with_eval_cell("height", Operator::Equal, json!(180))
            .with_return_cell("tier", json!("standard"));
        assert!(matches!(
            compiler.compile(&row, true, true),
            Err(TableError::UnknownColumn(c)) if c == "height"
        ));

        // 输出单元格引用条件列同样是未知列
        let row = Row::new("r-2")
            .with_eval_cell("age", Operator::Equal, json!(18))
            .with_return_cell("age", json!(18));
        assert!(matches!(
            compiler.compile(&row, true, true),
            Err(TableError::UnknownColumn(_))
        ));
    }

    #[test]
    fn test_compile_dedupes_expected_sets() {
        let (conditions, outputs) = column_maps();
        let compiler = RowCompiler::new(&conditions, &outputs);
        let row = Row::new("r-1")
            .with_eval_cell("country", Operator::In, json!(["US", "CA", "US"]))
            .with_return_cell("tier", json!("standard"));
        let compiled = compiler.compile(&row, true, true).unwrap();
        let ExpectedValue::Set(items) = &compiled.eval_cells[0].expected else {
            panic!("expected sanitized set");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn test_compile_precompiles_regex() {
        let (conditions, outputs) = column_maps();
        let compiler = RowCompiler::new(&conditions, &outputs);
        let row = Row::new("r-1")
            .with_eval_cell("country", Operator::MatchesRegex, json!("^(US|CA)$"))
            .with_return_cell("tier", json!("standard"));
        let compiled = compiler.compile(&row, true, true).unwrap();
        assert!(matches!(
            compiled.eval_cells[0].expected,
            ExpectedValue::Pattern(_)
        ));

        let bad = Row::new("r-2")
            .with_eval_cell("country", Operator::MatchesRegex, json!("[invalid"))
            .with_return_cell("tier", json!("standard"));
        assert!(matches!(
            compiler.compile(&bad, true, true),
            Err(TableError::Column { .. })
        ));
    }

    #[test]
    fn test_compile_nullity_flag() {
        let (conditions, outputs) = column_maps();
        let compiler = RowCompiler::new(&conditions, &outputs);

        let omitted = Row::new("r-1")
            .with_eval_cell("country", Operator::IsNull, Json::Null)
            .with_return_cell("tier", json!("unknown"));
        let compiled = compiler.compile(&omitted, true, true).unwrap();
        assert!(matches!(
            compiled.eval_cells[0].expected,
            ExpectedValue::Presence
        ));

        let truthy = Row::new("r-2")
            .with_eval_cell("country", Operator::IsNotNull, json!("yes"))
            .with_return_cell("tier", json!("known"));
        assert!(compiler.compile(&truthy, true, true).is_ok());

        let falsy = Row::new("r-3")
            .with_eval_cell("country", Operator::IsNull, json!(false))
            .with_return_cell("tier", json!("unknown"));
        assert!(compiler.compile(&falsy, true, true).is_err());
    }

    #[test]
    fn test_compile_validation_modes() {
        let (conditions, outputs) = column_maps();
        let compiler = RowCompiler::new(&conditions, &outputs);
        let empty = Row::new("r-1");
        assert!(compiler.compile(&empty, true, true).is_err());
        assert!(compiler.compile(&empty, false, false).is_ok());
    }

    #[test]
    fn test_compile_coerces_return_values() {
        let (conditions, outputs) = column_maps();
        let compiler = RowCompiler::new(&conditions, &outputs);
        let row = Row::new("r-1")
            .with_eval_cell("age", Operator::GreaterOrEqual, json!(18))
            .with_return_cell("discount", json!("0.05"));
        let compiled = compiler.compile(&row, true, true).unwrap();
        assert!(matches!(
            compiled.return_cells[0].value,
            CellValue::Decimal(_)
        ));

        let bad = Row::new("r-2")
            .with_eval_cell("age", Operator::GreaterOrEqual, json!(18))
            .with_return_cell("discount", json!("not-a-number"));
        assert!(matches!(
            compiler.compile(&bad, true, true),
            Err(TableError::Column { .. })
        ));
    }

    #[test]
    fn test_matches_short_circuits_on_first_non_match() {
        let (conditions, outputs) = column_maps();
        let compiler = RowCompiler::new(&conditions, &outputs);
        // 第二个单元格在 INTEGER 列上使用 MATCHES_REGEX, 求值必然报错;
        // 只要第一个单元格不匹配, 它就不应被触达
        let row = Row::new("r-1")
            .with_eval_cell("country", Operator::Equal, json!("US"))
            .with_eval_cell("age", Operator::MatchesRegex, json!("^1$"))
            .with_return_cell("tier", json!("standard"))
            .with_number(7);
        let compiled = compiler.compile(&row, true, true).unwrap();

        let miss: HashMap<String, Json> = [("country".to_string(), json!("CA"))].into();
        assert!(!compiled.matches(&miss).unwrap());

        let hit: HashMap<String, Json> =
            [("country".to_string(), json!("US")), ("age".to_string(), json!(30))].into();
        let err = compiled.matches(&hit).unwrap_err();
        assert!(matches!(
            err,
            TableError::Row { number: 7, ref column, .. } if column == "age"
        ));
    }

    #[test]
    fn test_missing_input_key_is_null() {
        let (conditions, outputs) = column_maps();
        let compiler = RowCompiler::new(&conditions, &outputs);
        let row = Row::new("r-1")
            .with_eval_cell("country", Operator::IsNull, Json::Null)
            .with_return_cell("tier", json!("unknown"));
        let compiled = compiler.compile(&row, true, true).unwrap();
        assert!(compiled.matches(&HashMap::new()).unwrap());
    }

    #[test]
    fn test_materialize_clones_are_independent() {
        let (conditions, outputs) = column_maps();
        let compiler = RowCompiler::new(&conditions, &outputs);
        let row = Row::new("r-1")
            .with_eval_cell("age", Operator::GreaterOrEqual, json!(18))
            .with_return_cell("tier", json!("standard"))
            .with_return_cell("discount", json!("0.05"));
        let compiled = compiler.compile(&row, true, true).unwrap();

        let first = compiled.materialize();
        let mut second = compiled.materialize();
        assert_eq!(first, second);

        if let Some(CellValue::String(tier)) = second.get_mut("tier") {
            tier.push_str("-mutated");
        }
        assert_eq!(
            first.get("tier"),
            Some(&CellValue::String("standard".to_string()))
        );
        assert_eq!(compiled.materialize().get("tier"), first.get("tier"));
    }
}
