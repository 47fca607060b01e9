//! 字段条件编译
//!
//! 原始 JSON 条件先解析为带标签的 Expression,未知操作符在此处被拒绝;
//! 随后 `compile_expression` 对 Expression 做穷尽匹配,生成后端谓词片段。

use crate::ast::{Expression, Operator};
use crate::term::Expr;
use crate::{QueryError, QueryResult};
use serde_json::Value;
use tracing::warn;

/// # Brief
/// 解析单个字段的条件
///
/// - 标量 → 等值
/// - 数组 → 属于列表
/// - 对象 → 取第一个键作为操作符
///
/// # Arguments
/// * `field` - 字段名,仅用于错误信息
/// * `value` - 原始条件
pub fn parse_expression(field: &str, value: &Value) -> QueryResult<Expression> {
    match value {
        Value::Array(items) => Ok(Expression::In(items.clone())),
        Value::Object(map) => {
            let mut entries = map.iter();
            let (token, operand) = entries.next().ok_or_else(|| {
                QueryError::MalformedClause(format!("empty condition object for field `{}`", field))
            })?;
            if map.len() > 1 {
                warn!(
                    "Condition on `{}` has {} operator keys, only `{}` is applied",
                    field,
                    map.len(),
                    token
                );
            }
            let op = Operator::from_token(token).ok_or_else(|| {
                QueryError::UnsupportedOperator(format!("`{}` on field `{}`", token, field))
            })?;
            from_operator(field, op, operand)
        }
        scalar => Ok(Expression::Eq(scalar.clone())),
    }
}

fn from_operator(field: &str, op: Operator, operand: &Value) -> QueryResult<Expression> {
    match op {
        Operator::LessThan => Ok(Expression::Lt(comparable(field, op, operand)?)),
        Operator::LessThanOrEqual => Ok(Expression::Le(comparable(field, op, operand)?)),
        Operator::GreaterThan => Ok(Expression::Gt(comparable(field, op, operand)?)),
        Operator::GreaterThanOrEqual => Ok(Expression::Ge(comparable(field, op, operand)?)),
        Operator::Not => match operand {
            Value::Array(items) => Ok(Expression::NotIn(items.clone())),
            Value::Object(_) => Err(QueryError::MalformedClause(format!(
                "`{}` on field `{}` expects a value or a list",
                op, field
            ))),
            scalar => Ok(Expression::Ne(scalar.clone())),
        },
        Operator::Contains => match operand {
            Value::Array(items) => Ok(Expression::Contains(items.clone())),
            Value::Object(_) => Err(QueryError::MalformedClause(format!(
                "`contains` on field `{}` expects a value or a list",
                field
            ))),
            // 单个标量视为只含一个元素的集合
            scalar => Ok(Expression::Contains(vec![scalar.clone()])),
        },
        Operator::Like => Ok(Expression::Like(pattern(field, op, operand)?)),
        Operator::StartsWith => Ok(Expression::StartsWith(pattern(field, op, operand)?)),
        Operator::EndsWith => Ok(Expression::EndsWith(pattern(field, op, operand)?)),
    }
}

fn comparable(field: &str, op: Operator, operand: &Value) -> QueryResult<Value> {
    match operand {
        Value::Array(_) | Value::Object(_) | Value::Null => Err(QueryError::MalformedClause(
            format!("`{}` on field `{}` expects a number, string or boolean", op, field),
        )),
        v => Ok(v.clone()),
    }
}

fn pattern(field: &str, op: Operator, operand: &Value) -> QueryResult<String> {
    operand.as_str().map(str::to_string).ok_or_else(|| {
        QueryError::MalformedClause(format!("`{}` on field `{}` expects a string", op, field))
    })
}

/// SQL LIKE 模式转换为锚定的正则
pub fn like_to_regex(pattern: &str) -> String {
    let mut regex = String::with_capacity(pattern.len() + 2);
    regex.push('^');
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '%' | '_' => {
                regex.push_str(&regex::escape(&literal));
                literal.clear();
                regex.push_str(if c == '%' { ".*" } else { "." });
            }
            other => literal.push(other),
        }
    }
    regex.push_str(&regex::escape(&literal));
    regex.push('$');
    regex
}

/// # Brief
/// 编译字段条件为谓词片段
///
/// # Arguments
/// * `field` - 字段引用表达式
/// * `expression` - 已解析的条件
pub fn compile_expression(field: Expr, expression: &Expression) -> Expr {
    match expression {
        Expression::Eq(v) => field.eq(v.clone()),
        Expression::Ne(v) => field.ne(v.clone()),
        Expression::Lt(v) => field.lt(v.clone()),
        Expression::Le(v) => field.le(v.clone()),
        Expression::Gt(v) => field.gt(v.clone()),
        Expression::Ge(v) => field.ge(v.clone()),
        Expression::In(list) => field.is_in(list.clone()),
        Expression::NotIn(list) => field.is_in(list.clone()).not(),
        Expression::Contains(values) => field.contains(values.clone()),
        Expression::Like(p) => field.matches(like_to_regex(p)),
        Expression::StartsWith(p) => field.matches(format!("^{}", regex::escape(p))),
        Expression::EndsWith(p) => field.matches(format!("{}$", regex::escape(p))),
    }
}
