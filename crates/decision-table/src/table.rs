//! 决策表
//!
//! 维护列结构与规则行, 按配置的匹配策略对输入记录求值。
//! 注册阶段是单写入方的构造阶段; 构造完成后求值只读存储状态,
//! 并通过物化克隆返回独立所有权的结果, 可被多个调用方并发使用。

use std::collections::HashMap;

use serde_json::Value as Json;
use tracing::{debug, instrument};

use crate::compiler::{CompiledRow, RowCompiler};
use crate::error::{Result, TableError};
use crate::models::{
    Column, ColumnType, MatchPolicy, MatchedRow, NoMatchPolicy, Row, RowValidationPolicy,
    TableConfig,
};
use crate::value::CellValue;

/// 可供求值的决策表内存表示
#[derive(Debug, Clone)]
pub struct DecisionTable {
    name: String,
    condition_columns: HashMap<String, Column>,
    output_columns: HashMap<String, Column>,
    rows: Vec<CompiledRow>,
    default_row: Option<CompiledRow>,
    config: TableConfig,
}

impl DecisionTable {
    /// 构造决策表
    ///
    /// 要求非空表名、至少一个条件列与至少一个输出列;
    /// 列按角色切分为两张名字索引表, 角色内重名即失败。
    pub fn new(
        name: impl Into<String>,
        condition_cols: Vec<Column>,
        output_cols: Vec<Column>,
        config: TableConfig,
    ) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(TableError::Schema("表名不能为空".to_string()));
        }
        if condition_cols.is_empty() {
            return Err(TableError::Schema(
                "决策表必须定义至少一个条件列".to_string(),
            ));
        }
        if output_cols.is_empty() {
            return Err(TableError::Schema(
                "决策表必须定义至少一个输出列".to_string(),
            ));
        }

        let condition_columns = build_column_map(condition_cols, &[ColumnType::Condition])?;
        let output_columns =
            build_column_map(output_cols, &[ColumnType::Conclusion, ColumnType::Metadata])?;

        Ok(Self {
            name,
            condition_columns,
            output_columns,
            rows: Vec::new(),
            default_row: None,
            config,
        })
    }

    /// 注册一条规则行
    ///
    /// 行在此处一次性整理完毕; 注册失败不影响已注册的行。
    /// 行号缺省（为 0）时按 1 起始的声明顺序补齐。
    /// 插入顺序即求值顺序。
    #[instrument(skip(self, row), fields(table = %self.name, rule_id = %row.rule_id))]
    pub fn add_row(&mut self, row: Row) -> Result<()> {
        let strict = self.config.row_validation == RowValidationPolicy::Strict;
        let mut prepared =
            RowCompiler::new(&self.condition_columns, &self.output_columns).compile(&row, strict, strict)?;
        self.ensure_unique_rule_id(&prepared.rule_id, true)?;
        if prepared.number == 0 {
            prepared.number = self.rows.len() + 1;
        }
        debug!(number = prepared.number, "规则行已注册");
        self.rows.push(prepared);
        Ok(())
    }

    /// 注册默认行, 在没有规则匹配时作为回退输出
    ///
    /// 默认行不允许携带条件单元格; 重复设置会替换之前的默认行。
    #[instrument(skip(self, row), fields(table = %self.name, rule_id = %row.rule_id))]
    pub fn set_default_row(&mut self, row: Row) -> Result<()> {
        if !row.eval_cells.is_empty() {
            return Err(TableError::Schema(
                "默认行不能包含条件单元格".to_string(),
            ));
        }
        let mut prepared =
            RowCompiler::new(&self.condition_columns, &self.output_columns).compile(&row, false, true)?;
        self.ensure_unique_rule_id(&prepared.rule_id, false)?;
        if prepared.number == 0 {
            prepared.number = self.rows.len() + 1;
        }
        debug!(number = prepared.number, "默认行已设置");
        self.default_row = Some(prepared);
        Ok(())
    }

    /// 对输入记录求值, 返回符合匹配策略的结果序列
    ///
    /// 没有任何行匹配时, RETURN_DEFAULT 优先使用已配置的默认行,
    /// 其次使用调用方提供的回退映射（深拷贝, 行号记 0）, 两者皆无则返回空;
    /// THROW_ERROR 在存在默认行时同样返回默认行, 否则报告无匹配。
    /// 求值过程中任何失败都会丢弃已累积的部分结果。
    #[instrument(skip(self, input, fallback), fields(table = %self.name))]
    pub fn evaluate(
        &self,
        input: &HashMap<String, Json>,
        fallback: Option<&HashMap<String, CellValue>>,
    ) -> Result<Vec<MatchedRow>> {
        let mut matches: Vec<MatchedRow> = Vec::new();
        for row in &self.rows {
            if !row.matches(input)? {
                continue;
            }
            matches.push(materialize_matched(row));
            match self.config.match_policy {
                MatchPolicy::First => break,
                MatchPolicy::Unique if matches.len() > 1 => {
                    return Err(TableError::AmbiguousMatch {
                        count: matches.len(),
                    });
                }
                _ => {}
            }
        }

        if matches.is_empty() {
            match self.config.no_match_policy {
                NoMatchPolicy::ReturnDefault => {
                    if let Some(default_row) = &self.default_row {
                        matches.push(materialize_matched(default_row));
                    } else if let Some(fallback) = fallback {
                        matches.push(MatchedRow {
                            values: fallback
                                .iter()
                                .map(|(name, v)| (name.clone(), v.clone()))
                                .collect(),
                            rule_id: String::new(),
                            comments: String::new(),
                            row_number: 0,
                        });
                    }
                }
                NoMatchPolicy::ThrowError => {
                    if let Some(default_row) = &self.default_row {
                        matches.push(materialize_matched(default_row));
                    } else {
                        return Err(TableError::NoMatch);
                    }
                }
            }
        }

        debug!(matched = matches.len(), "求值完成");
        Ok(matches)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 已注册行的防御性拷贝, 调用方无法通过返回值改动表内部状态
    pub fn rows(&self) -> Vec<CompiledRow> {
        self.rows.clone()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// 默认行的防御性拷贝
    pub fn default_row(&self) -> Option<CompiledRow> {
        self.default_row.clone()
    }

    /// 规则 ID 在全表范围内（含默认行）不得重复; 空 ID 不参与检查。
    /// 替换默认行时跳过与旧默认行自身的比较。
    fn ensure_unique_rule_id(&self, rule_id: &str, check_default: bool) -> Result<()> {
        if rule_id.is_empty() {
            return Ok(());
        }
        let clashes = self.rows.iter().any(|row| row.rule_id == rule_id)
            || (check_default
                && self
                    .default_row
                    .as_ref()
                    .is_some_and(|row| row.rule_id == rule_id));
        if clashes {
            return Err(TableError::Schema(format!("规则 ID 重复: {}", rule_id)));
        }
        Ok(())
    }
}

fn materialize_matched(row: &CompiledRow) -> MatchedRow {
    MatchedRow {
        values: row.materialize(),
        rule_id: row.rule_id.clone(),
        comments: row.comments.clone(),
        row_number: row.number,
    }
}

fn build_column_map(
    columns: Vec<Column>,
    allowed: &[ColumnType],
) -> Result<HashMap<String, Column>> {
    let mut map = HashMap::with_capacity(columns.len());
    for column in columns {
        column.validate()?;
        if !allowed.contains(&column.column_type) {
            return Err(TableError::Schema(format!(
                "列 {} 的角色必须是 {}",
                column.name,
                allowed
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" / ")
            )));
        }
        if map.contains_key(&column.name) {
            return Err(TableError::Schema(format!("列名重复: {}", column.name)));
        }
        map.insert(column.name.clone(), column);
    }
    Ok(map)
}
