//! 查询执行器模块
//!
//! 在内存数据源上解释执行编译好的查询计划 (Term)。

use crate::filter::{self, lookup, total_order, Scope, TableSource};
use crate::term::{Expr, MergeField, OrderKey, SortDirection, Term};
use crate::{QueryError, QueryResult};
use serde_json::Value;
use std::cmp::Ordering;
use tracing::{debug, trace};

/// 查询执行器
///
/// 只读借用数据源,可在多个调用间共享。
pub struct QueryExecutor<'a, S: TableSource + ?Sized> {
    source: &'a S,
}

impl<'a, S: TableSource + ?Sized> QueryExecutor<'a, S> {
    pub fn new(source: &'a S) -> Self {
        Self { source }
    }

    /// 执行计划
    ///
    /// # Brief
    /// 自底向上执行查询计划,返回结果行
    ///
    /// # Arguments
    /// * `term` - 编译得到的查询计划
    ///
    /// # Returns
    /// 结果行,或执行错误
    pub fn run(&self, term: &Term) -> QueryResult<Vec<Value>> {
        let rows = self.execute(term)?;
        debug!("Plan on `{}` returned {} rows", term.table_name(), rows.len());
        Ok(rows)
    }

    fn execute(&self, term: &Term) -> QueryResult<Vec<Value>> {
        match term {
            Term::Table { name } => {
                let rows = self
                    .source
                    .rows(name)
                    .ok_or_else(|| QueryError::TableNotFound(name.clone()))?;
                Ok(rows.cloned().collect())
            }

            Term::Get { input, index, key } => match input.as_ref() {
                // 直接作用于表时走索引查找,否则退化为等值过滤
                Term::Table { name } => Ok(lookup(self.source, name, index, key)?
                    .into_iter()
                    .cloned()
                    .collect()),
                other => {
                    let rows = self.execute(other)?;
                    Ok(rows
                        .into_iter()
                        .filter(|row| row.get(index).is_some_and(|v| filter::values_equal(v, key)))
                        .collect())
                }
            },

            Term::Filter { input, predicate } => {
                let rows = self.execute(input)?;
                let before = rows.len();
                let mut kept = Vec::with_capacity(before);
                for row in rows {
                    if filter::matches(predicate, &row, self.source)? {
                        kept.push(row);
                    }
                }
                trace!("Filter kept {} of {} rows", kept.len(), before);
                Ok(kept)
            }

            Term::OrderBy { input, keys } => {
                let mut rows = self.execute(input)?;
                rows.sort_by(|a, b| compare_rows(a, b, keys));
                Ok(rows)
            }

            Term::Skip { input, count } => {
                let rows = self.execute(input)?;
                Ok(rows.into_iter().skip(to_usize(*count)).collect())
            }

            Term::Limit { input, count } => {
                let rows = self.execute(input)?;
                Ok(rows.into_iter().take(to_usize(*count)).collect())
            }

            Term::Merge { input, fields } => {
                let rows = self.execute(input)?;
                rows.into_iter()
                    .map(|row| self.merge_row(row, fields))
                    .collect()
            }
        }
    }

    fn merge_row(&self, row: Value, fields: &[MergeField]) -> QueryResult<Value> {
        let mut attached = Vec::with_capacity(fields.len());
        for field in fields {
            let value = match filter::evaluate(&field.value, Scope::new(&row), self.source) {
                Ok(value) => value,
                // 父行缺少关联键: 单值关联为 null,多值关联为空数组
                Err(QueryError::NonExistence(_)) => empty_join_value(&field.value),
                Err(e) => return Err(e),
            };
            attached.push((field.alias.clone(), value));
        }

        match row {
            Value::Object(mut map) => {
                for (alias, value) in attached {
                    map.insert(alias, value);
                }
                Ok(Value::Object(map))
            }
            other => Err(QueryError::TypeError(format!("cannot merge into non-object {}", other))),
        }
    }
}

fn empty_join_value(expr: &Expr) -> Value {
    match expr {
        Expr::GetAll { .. } | Expr::MapItems { .. } => Value::Array(Vec::new()),
        _ => Value::Null,
    }
}

fn to_usize(count: u64) -> usize {
    usize::try_from(count).unwrap_or(usize::MAX)
}

/// 多键比较,缺失字段与 null 同序,排在最前
fn compare_rows(a: &Value, b: &Value, keys: &[OrderKey]) -> Ordering {
    for key in keys {
        let av = a.get(&key.field).unwrap_or(&Value::Null);
        let bv = b.get(&key.field).unwrap_or(&Value::Null);
        let ord = total_order(av, bv);
        if ord != Ordering::Equal {
            return match key.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            };
        }
    }
    Ordering::Equal
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::QueryHandle;
    use serde_json::json;
    use std::collections::HashMap;

    fn fixtures() -> HashMap<String, Vec<Value>> {
        let mut tables = HashMap::new();
        tables.insert(
            "users".to_string(),
            vec![
                json!({"id": 1, "name": "miku", "age": 16, "teamId": 10}),
                json!({"id": 2, "name": "rin", "age": 14, "teamId": 20}),
                json!({"id": 3, "name": "luka", "age": 20}),
                json!({"id": 4, "name": "len", "age": 14, "teamId": 10}),
            ],
        );
        tables.insert(
            "teams".to_string(),
            vec![json!({"id": 10, "name": "crypton"}), json!({"id": 20, "name": "piapro"})],
        );
        tables
    }

    fn ids(rows: &[Value]) -> Vec<i64> {
        rows.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    #[test]
    fn test_table_scan() {
        let source = fixtures();
        let rows = QueryExecutor::new(&source).run(&Term::table("users")).unwrap();
        assert_eq!(ids(&rows), vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_unknown_table() {
        let source = fixtures();
        let err = QueryExecutor::new(&source).run(&Term::table("ghosts")).unwrap_err();
        assert!(matches!(err, QueryError::TableNotFound(_)));
    }

    #[test]
    fn test_filter_and_get_agree() {
        let source = fixtures();
        let executor = QueryExecutor::new(&source);
        let users = Term::table("users");

        let by_filter = executor.run(&users.filter(Expr::row("id").eq(2))).unwrap();
        let by_key = executor.run(&users.get_by_key("id", json!(2))).unwrap();
        assert_eq!(by_filter, by_key);
        assert_eq!(ids(&by_key), vec![2]);
    }

    #[test]
    fn test_stable_multi_key_order() {
        let source = fixtures();
        let term = Term::table("users").order_by(vec![OrderKey::asc("age"), OrderKey::desc("id")]);
        let rows = QueryExecutor::new(&source).run(&term).unwrap();
        assert_eq!(ids(&rows), vec![4, 2, 1, 3]);
    }

    #[test]
    fn test_missing_sort_field_first() {
        let source = fixtures();
        let term = Term::table("users").order_by(vec![OrderKey::asc("teamId")]);
        let rows = QueryExecutor::new(&source).run(&term).unwrap();
        assert_eq!(ids(&rows)[0], 3);
    }

    #[test]
    fn test_skip_and_limit() {
        let source = fixtures();
        let term = Term::table("users").skip(1).limit(2);
        let rows = QueryExecutor::new(&source).run(&term).unwrap();
        assert_eq!(ids(&rows), vec![2, 3]);
    }

    #[test]
    fn test_merge_belongs_to() {
        let source = fixtures();
        let term = Term::table("users").merge(vec![MergeField::new(
            "team",
            Expr::get("teams", "id", Expr::row("teamId")),
        )]);
        let rows = QueryExecutor::new(&source).run(&term).unwrap();
        assert_eq!(rows[0]["team"]["name"], "crypton");
        assert_eq!(rows[2]["team"], Value::Null);
    }

    #[test]
    fn test_merge_has_many() {
        let source = fixtures();
        let term = Term::table("teams").merge(vec![MergeField::new(
            "members",
            Expr::get_all("users", "teamId", Expr::row("id")),
        )]);
        let rows = QueryExecutor::new(&source).run(&term).unwrap();
        assert_eq!(ids(rows[0]["members"].as_array().unwrap()), vec![1, 4]);
        assert_eq!(ids(rows[1]["members"].as_array().unwrap()), vec![2]);
    }
}
