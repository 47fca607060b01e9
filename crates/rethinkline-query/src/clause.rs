//! 过滤子句编译
//!
//! 子句内所有条目无条件地以 AND 组合,每个条目贡献一个合取项;
//! `or` 条目先把各子子句编译后以 OR 组合成一个合取项。

use crate::ast::{Clause, ClauseEntry, Expression};
use crate::expression::compile_expression;
use crate::term::{Binding, Expr};
use serde_json::Value;

/// # Brief
/// 编译子句为单个谓词
///
/// 空子句编译为恒真谓词。
///
/// # Arguments
/// * `binding` - 字段引用所在的变量(通常是当前行)
/// * `clause` - 子句
pub fn compile_clause(binding: Binding, clause: &Clause) -> Expr {
    let conjuncts = clause
        .entries
        .iter()
        .map(|entry| compile_entry(binding, entry))
        .collect();
    Expr::and(conjuncts)
}

fn compile_entry(binding: Binding, entry: &ClauseEntry) -> Expr {
    match entry {
        ClauseEntry::Field { name, expression } => {
            compile_expression(Expr::field_of(binding, name.as_str()), expression)
        }
        ClauseEntry::Or(clauses) => Expr::or(
            clauses
                .iter()
                .map(|c| compile_clause(binding, c))
                .collect(),
        ),
        ClauseEntry::And(clauses) => Expr::and(
            clauses
                .iter()
                .map(|c| compile_clause(binding, c))
                .collect(),
        ),
    }
}

/// # Brief
/// 判断子句是否恰好为主键上的单个等值条件
///
/// # Returns
/// 满足时返回主键值
pub fn primary_key_lookup<'a>(clause: &'a Clause, primary_key: &str) -> Option<&'a Value> {
    match clause.entries.as_slice() {
        [ClauseEntry::Field {
            name,
            expression: Expression::Eq(value),
        }] if name == primary_key && !value.is_null() => Some(value),
        _ => None,
    }
}
