//! 单元格评估器
//!
//! 判定实际值在声明的数据类型下是否满足操作符与期望值的约束。
//! 评估器本身无状态, 唯一携带的状态是注册阶段预编译的正则。

use std::cmp::Ordering;

use serde_json::Value as Json;

use crate::error::{Result, TableError};
use crate::models::DataType;
use crate::operators::Operator;
use crate::value::{self, CellValue, ExpectedValue};

/// 单元格评估器
pub struct CellEvaluator;

impl CellEvaluator {
    /// 评估单元格
    ///
    /// # Arguments
    /// * `data_type` - 列声明的数据类型
    /// * `operator` - 操作符
    /// * `actual` - 输入记录中的原始实际值
    /// * `expected` - 注册阶段整理好的期望值
    pub fn evaluate(
        data_type: DataType,
        operator: Operator,
        actual: &Json,
        expected: &ExpectedValue,
    ) -> Result<bool> {
        if operator.expects_actual_collection() {
            let actual_items = value::coerce_collection(data_type, actual)?;
            Self::evaluate_collection(data_type, operator, &actual_items, expected)
        } else {
            let actual_value = value::coerce_value(data_type, actual)?;
            Self::evaluate_scalar(data_type, operator, &actual_value, expected)
        }
    }

    fn evaluate_scalar(
        data_type: DataType,
        operator: Operator,
        actual: &CellValue,
        expected: &ExpectedValue,
    ) -> Result<bool> {
        match operator {
            Operator::Equal => Self::equals(data_type, actual, Self::scalar(operator, expected)?),
            Operator::NotEqual => Self::equals(data_type, actual, Self::scalar(operator, expected)?)
                .map(|matched| !matched),
            Operator::Greater
            | Operator::GreaterOrEqual
            | Operator::Less
            | Operator::LessOrEqual => {
                Self::compare(data_type, operator, actual, Self::scalar(operator, expected)?)
            }
            Operator::In => Self::contains(data_type, Self::set(operator, expected)?, actual),
            Operator::NotIn => Self::contains(data_type, Self::set(operator, expected)?, actual)
                .map(|matched| !matched),
            Operator::MatchesRegex => {
                let ExpectedValue::Pattern(pattern) = expected else {
                    return Err(Self::unsanitized(operator));
                };
                match actual {
                    // 实际值为空按不匹配处理, 而不是报错
                    CellValue::Null => Ok(false),
                    CellValue::String(s) => Ok(pattern.is_match(s)),
                    _ => Err(TableError::UnsupportedOperator {
                        operator,
                        data_type,
                    }),
                }
            }
            Operator::IsNull => {
                Self::presence(operator, expected)?;
                Ok(actual.is_null())
            }
            Operator::IsNotNull => {
                Self::presence(operator, expected)?;
                Ok(!actual.is_null())
            }
            _ => Err(TableError::UnsupportedOperator {
                operator,
                data_type,
            }),
        }
    }

    fn evaluate_collection(
        data_type: DataType,
        operator: Operator,
        actual: &[CellValue],
        expected: &ExpectedValue,
    ) -> Result<bool> {
        match operator {
            Operator::AnyContainedIn => {
                let set = Self::set(operator, expected)?;
                for item in actual {
                    if Self::contains(data_type, set, item)? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
            Operator::NotAnyContainedIn => {
                Self::evaluate_collection(data_type, Operator::AnyContainedIn, actual, expected)
                    .map(|matched| !matched)
            }
            Operator::AllContainedIn => {
                let set = Self::set(operator, expected)?;
                for item in actual {
                    if !Self::contains(data_type, set, item)? {
                        return Ok(false);
                    }
                }
                // 空集合下全称量化为真
                Ok(true)
            }
            Operator::NotAllContainedIn => {
                Self::evaluate_collection(data_type, Operator::AllContainedIn, actual, expected)
                    .map(|matched| !matched)
            }
            Operator::ContainsAll => {
                let set = Self::set(operator, expected)?;
                for item in set {
                    if !Self::contains(data_type, actual, item)? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            Operator::NotContainsAll => {
                Self::evaluate_collection(data_type, Operator::ContainsAll, actual, expected)
                    .map(|matched| !matched)
            }
            Operator::AllEqual => {
                let scalar = Self::scalar(operator, expected)?;
                if scalar.is_null() {
                    return Err(TableError::Schema(format!(
                        "操作符 {} 需要一个非空标量期望值",
                        operator
                    )));
                }
                let element_type = data_type.element_type();
                for item in actual {
                    if !Self::equals(element_type, item, scalar)? {
                        return Ok(false);
                    }
                }
                Ok(!actual.is_empty())
            }
            _ => Err(TableError::UnsupportedOperator {
                operator,
                data_type,
            }),
        }
    }

    /// 类型定向的深相等: 空值只等于空值, 任何形态越界都显式报错
    fn equals(data_type: DataType, left: &CellValue, right: &CellValue) -> Result<bool> {
        if left.is_null() || right.is_null() {
            return Ok(left.is_null() && right.is_null());
        }
        match data_type {
            DataType::String => match (left, right) {
                (CellValue::String(l), CellValue::String(r)) => Ok(l == r),
                _ => Err(Self::mismatch(data_type, left, right)),
            },
            DataType::Integer => match (left, right) {
                (CellValue::Integer(l), CellValue::Integer(r)) => Ok(l == r),
                _ => Err(Self::mismatch(data_type, left, right)),
            },
            DataType::Decimal => match (left, right) {
                // 按数值比较, 与标度无关
                (CellValue::Decimal(l), CellValue::Decimal(r)) => Ok(l == r),
                _ => Err(Self::mismatch(data_type, left, right)),
            },
            DataType::Boolean => match (left, right) {
                (CellValue::Boolean(l), CellValue::Boolean(r)) => Ok(l == r),
                _ => Err(Self::mismatch(data_type, left, right)),
            },
            DataType::Date => match (left, right) {
                (CellValue::Date(l), CellValue::Date(r)) => Ok(l == r),
                _ => Err(Self::mismatch(data_type, left, right)),
            },
            DataType::DateTime => match (left, right) {
                // DateTime 的相等基于时刻而非书写偏移
                (CellValue::DateTime(l), CellValue::DateTime(r)) => Ok(l == r),
                _ => Err(Self::mismatch(data_type, left, right)),
            },
            DataType::ListString => Self::equals_list(DataType::String, left, right),
            DataType::ListInteger => Self::equals_list(DataType::Integer, left, right),
        }
    }

    fn equals_list(element_type: DataType, left: &CellValue, right: &CellValue) -> Result<bool> {
        let (CellValue::List(l), CellValue::List(r)) = (left, right) else {
            return Err(Self::mismatch(element_type, left, right));
        };
        if l.len() != r.len() {
            return Ok(false);
        }
        for (lhs, rhs) in l.iter().zip(r.iter()) {
            if !Self::equals(element_type, lhs, rhs)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 大小比较: 仅对 INTEGER / DECIMAL / DATE / DATETIME 有定义;
    /// 任一侧为空按不匹配处理
    fn compare(
        data_type: DataType,
        operator: Operator,
        left: &CellValue,
        right: &CellValue,
    ) -> Result<bool> {
        if left.is_null() || right.is_null() {
            return Ok(false);
        }
        let ordering = match data_type {
            DataType::Integer => match (left, right) {
                (CellValue::Integer(l), CellValue::Integer(r)) => l.cmp(r),
                _ => return Err(Self::mismatch(data_type, left, right)),
            },
            DataType::Decimal => match (left, right) {
                (CellValue::Decimal(l), CellValue::Decimal(r)) => l.cmp(r),
                _ => return Err(Self::mismatch(data_type, left, right)),
            },
            DataType::Date => match (left, right) {
                (CellValue::Date(l), CellValue::Date(r)) => l.cmp(r),
                _ => return Err(Self::mismatch(data_type, left, right)),
            },
            DataType::DateTime => match (left, right) {
                (CellValue::DateTime(l), CellValue::DateTime(r)) => l.cmp(r),
                _ => return Err(Self::mismatch(data_type, left, right)),
            },
            _ => {
                return Err(TableError::UnsupportedOperator {
                    operator,
                    data_type,
                });
            }
        };
        match operator {
            Operator::Greater => Ok(ordering == Ordering::Greater),
            Operator::GreaterOrEqual => Ok(ordering != Ordering::Less),
            Operator::Less => Ok(ordering == Ordering::Less),
            Operator::LessOrEqual => Ok(ordering != Ordering::Greater),
            _ => Err(TableError::UnsupportedOperator {
                operator,
                data_type,
            }),
        }
    }

    /// 按列的元素类型在集合中查找相等元素
    fn contains(data_type: DataType, haystack: &[CellValue], needle: &CellValue) -> Result<bool> {
        let element_type = data_type.element_type();
        for candidate in haystack {
            if Self::equals(element_type, candidate, needle)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn scalar(operator: Operator, expected: &ExpectedValue) -> Result<&CellValue> {
        match expected {
            ExpectedValue::Value(v) => Ok(v),
            _ => Err(Self::unsanitized(operator)),
        }
    }

    fn set(operator: Operator, expected: &ExpectedValue) -> Result<&[CellValue]> {
        match expected {
            ExpectedValue::Set(items) => Ok(items),
            _ => Err(Self::unsanitized(operator)),
        }
    }

    fn presence(operator: Operator, expected: &ExpectedValue) -> Result<()> {
        match expected {
            ExpectedValue::Presence => Ok(()),
            _ => Err(Self::unsanitized(operator)),
        }
    }

    fn unsanitized(operator: Operator) -> TableError {
        TableError::Schema(format!("操作符 {} 的期望值尚未按要求整理", operator))
    }

    fn mismatch(data_type: DataType, left: &CellValue, right: &CellValue) -> TableError {
        TableError::ValueMismatch {
            data_type,
            left: left.type_name(),
            right: right.type_name(),
        }
    }
}
