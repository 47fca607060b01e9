//! 分页编译
//!
//! skip 作用于已过滤、已排序的结果流;limit 为 0 时表示不限制。
//! limit 必须在排序与 skip 之后应用,调用顺序由 QueryCompiler 保证。

use crate::term::QueryHandle;
use crate::{QueryError, QueryResult};
use serde_json::Value;

/// # Brief
/// 解析 skip/limit 取值
///
/// 接受非负整数、整数值的浮点数以及可解析为非负整数的字符串。
/// `null` 视为缺省。
pub fn parse_count(key: &str, value: &Value) -> QueryResult<Option<u64>> {
    let invalid = || {
        QueryError::InvalidPagination(format!(
            "`{}` must be a non-negative integer, got {}",
            key, value
        ))
    };
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                return Ok(Some(u));
            }
            match n.as_f64() {
                Some(f) if f >= 0.0 && f.fract() == 0.0 && f <= u64::MAX as f64 => {
                    Ok(Some(f as u64))
                }
                _ => Err(invalid()),
            }
        }
        Value::String(s) => s.trim().parse::<u64>().map(Some).map_err(|_| invalid()),
        _ => Err(invalid()),
    }
}

pub fn compile_skip<H: QueryHandle>(handle: H, count: u64) -> H {
    if count == 0 {
        handle
    } else {
        handle.skip(count)
    }
}

pub fn compile_limit<H: QueryHandle>(handle: H, count: u64) -> H {
    if count == 0 {
        handle
    } else {
        handle.limit(count)
    }
}
