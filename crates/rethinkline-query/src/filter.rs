//! 行级表达式求值
//!
//! 对 Expr 做解释执行,作为查询计划的参考执行方。
//! 语义与文档存储保持一致:
//! - 引用行中不存在的字段产生 NonExistence 错误,由 Filter 视为不匹配
//! - 数字按数值比较 (1 == 1.0),字符串按字典序,布尔 false < true
//! - 类型不同的值不满足任何大小比较

use crate::term::{Binding, CompareOp, Expr};
use crate::{QueryError, QueryResult};
use regex::Regex;
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::HashMap;

/// 按表名提供行数据的数据源
pub trait TableSource {
    /// 表不存在时返回 None
    fn rows<'a>(&'a self, table: &str) -> Option<Box<dyn Iterator<Item = &'a Value> + 'a>>;
}

impl TableSource for HashMap<String, Vec<Value>> {
    fn rows<'a>(&'a self, table: &str) -> Option<Box<dyn Iterator<Item = &'a Value> + 'a>> {
        self.get(table)
            .map(|rows| Box::new(rows.iter()) as Box<dyn Iterator<Item = &'a Value> + 'a>)
    }
}

/// 求值作用域: 当前行,以及 MapItems 中的当前元素
#[derive(Debug, Clone, Copy)]
pub struct Scope<'a> {
    pub row: &'a Value,
    pub element: Option<&'a Value>,
}

impl<'a> Scope<'a> {
    pub fn new(row: &'a Value) -> Self {
        Self { row, element: None }
    }

    fn with_element(self, element: &'a Value) -> Self {
        Self {
            row: self.row,
            element: Some(element),
        }
    }

    fn resolve(&self, binding: Binding) -> QueryResult<&'a Value> {
        match binding {
            Binding::Row => Ok(self.row),
            Binding::Element => self
                .element
                .ok_or_else(|| QueryError::Execution("element referenced outside of map".to_string())),
        }
    }
}

/// # Brief
/// 在给定作用域中对表达式求值
///
/// # Arguments
/// * `expr` - 行级表达式
/// * `scope` - 当前行与映射元素
/// * `source` - Get/GetAll 使用的数据源
///
/// # Returns
/// 求值结果
pub fn evaluate<S: TableSource + ?Sized>(expr: &Expr, scope: Scope<'_>, source: &S) -> QueryResult<Value> {
    match expr {
        Expr::Datum { value } => Ok(value.clone()),

        Expr::Field { binding, name } => {
            let target = scope.resolve(*binding)?;
            match target {
                Value::Object(map) => map
                    .get(name)
                    .cloned()
                    .ok_or_else(|| QueryError::NonExistence(name.clone())),
                Value::Null => Err(QueryError::NonExistence(name.clone())),
                other => Err(QueryError::TypeError(format!(
                    "cannot read field `{}` of non-object {}",
                    name, other
                ))),
            }
        }

        Expr::Compare { cmp, left, right } => {
            let l = evaluate(left, scope, source)?;
            let r = evaluate(right, scope, source)?;
            Ok(Value::Bool(apply_compare(*cmp, &l, &r)))
        }

        Expr::And { args } => {
            for arg in args {
                if !holds(arg, scope, source)? {
                    return Ok(Value::Bool(false));
                }
            }
            Ok(Value::Bool(true))
        }

        Expr::Or { args } => {
            for arg in args {
                if holds(arg, scope, source)? {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }

        Expr::Not { arg } => Ok(Value::Bool(!is_truthy(&evaluate(arg, scope, source)?))),

        Expr::Contains { collection, values } => {
            let collection = evaluate(collection, scope, source)?;
            let contained = match &collection {
                Value::Array(items) => values
                    .iter()
                    .all(|v| items.iter().any(|item| values_equal(item, v))),
                _ => false,
            };
            Ok(Value::Bool(contained))
        }

        Expr::In { value, list } => {
            let value = evaluate(value, scope, source)?;
            Ok(Value::Bool(list.iter().any(|item| values_equal(item, &value))))
        }

        Expr::Match { subject, pattern } => {
            let subject = evaluate(subject, scope, source)?;
            let regex = Regex::new(pattern)
                .map_err(|e| QueryError::Execution(format!("invalid pattern `{}`: {}", pattern, e)))?;
            Ok(Value::Bool(subject.as_str().is_some_and(|s| regex.is_match(s))))
        }

        Expr::Get { table, index, key } => {
            let key = evaluate(key, scope, source)?;
            Ok(lookup(source, table, index, &key)?
                .first()
                .map(|row| (*row).clone())
                .unwrap_or(Value::Null))
        }

        Expr::GetAll { table, index, key } => {
            let key = evaluate(key, scope, source)?;
            Ok(Value::Array(
                lookup(source, table, index, &key)?
                    .into_iter()
                    .cloned()
                    .collect(),
            ))
        }

        Expr::MapItems { source: items, body } => {
            let items = evaluate(items, scope, source)?;
            match items {
                // 缺少关联键的元素被跳过,不影响其余元素
                Value::Array(items) => {
                    let mut mapped = Vec::with_capacity(items.len());
                    for item in &items {
                        match evaluate(body, scope.with_element(item), source) {
                            Ok(value) => mapped.push(value),
                            Err(QueryError::NonExistence(_)) => continue,
                            Err(e) => return Err(e),
                        }
                    }
                    Ok(Value::Array(mapped))
                }
                other => Err(QueryError::TypeError(format!("cannot map over {}", other))),
            }
        }
    }
}

/// 按索引字段等值查找,行缺少该字段时跳过
pub fn lookup<'a, S: TableSource + ?Sized>(
    source: &'a S,
    table: &str,
    index: &str,
    key: &Value,
) -> QueryResult<Vec<&'a Value>> {
    let rows = source
        .rows(table)
        .ok_or_else(|| QueryError::TableNotFound(table.to_string()))?;
    Ok(rows
        .filter(|row| row.get(index).is_some_and(|v| values_equal(v, key)))
        .collect())
}

/// And/Or 的单个分支: 引用缺失字段的分支为假,其余分支照常求值
fn holds<S: TableSource + ?Sized>(arg: &Expr, scope: Scope<'_>, source: &S) -> QueryResult<bool> {
    match evaluate(arg, scope, source) {
        Ok(value) => Ok(is_truthy(&value)),
        Err(QueryError::NonExistence(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// 谓词求值,NonExistence 视为不匹配
pub fn matches<S: TableSource + ?Sized>(predicate: &Expr, row: &Value, source: &S) -> QueryResult<bool> {
    match evaluate(predicate, Scope::new(row), source) {
        Ok(value) => Ok(is_truthy(&value)),
        Err(QueryError::NonExistence(_)) => Ok(false),
        Err(e) => Err(e),
    }
}

/// 只有 false 与 null 为假
pub fn is_truthy(value: &Value) -> bool {
    !matches!(value, Value::Null | Value::Bool(false))
}

fn apply_compare(cmp: CompareOp, l: &Value, r: &Value) -> bool {
    match cmp {
        CompareOp::Eq => values_equal(l, r),
        CompareOp::Ne => !values_equal(l, r),
        CompareOp::Lt => compare_values(l, r) == Some(Ordering::Less),
        CompareOp::Le => matches!(compare_values(l, r), Some(Ordering::Less | Ordering::Equal)),
        CompareOp::Gt => compare_values(l, r) == Some(Ordering::Greater),
        CompareOp::Ge => matches!(compare_values(l, r), Some(Ordering::Greater | Ordering::Equal)),
    }
}

/// JSON 相等,数字按数值比较
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => x == y,
            _ => x.as_f64() == y.as_f64(),
        },
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| values_equal(a, b))
        }
        (Value::Object(x), Value::Object(y)) => {
            x.len() == y.len()
                && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| values_equal(v, w)))
        }
        _ => a == b,
    }
}

/// 同类型值之间的序,类型不同时为 None
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        (Value::Number(x), Value::Number(y)) => match (x.as_i64(), y.as_i64()) {
            (Some(x), Some(y)) => Some(x.cmp(&y)),
            _ => x.as_f64()?.partial_cmp(&y.as_f64()?),
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Array(x), Value::Array(y)) => {
            for (a, b) in x.iter().zip(y) {
                match compare_values(a, b)? {
                    Ordering::Equal => continue,
                    other => return Some(other),
                }
            }
            Some(x.len().cmp(&y.len()))
        }
        _ => None,
    }
}

/// 排序用的全序: null < 布尔 < 数字 < 字符串 < 数组 < 对象
pub fn total_order(a: &Value, b: &Value) -> Ordering {
    fn rank(v: &Value) -> u8 {
        match v {
            Value::Null => 0,
            Value::Bool(_) => 1,
            Value::Number(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }
    match rank(a).cmp(&rank(b)) {
        Ordering::Equal => compare_values(a, b).unwrap_or(Ordering::Equal),
        other => other,
    }
}
