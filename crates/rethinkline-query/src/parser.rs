//! 描述符解析模块
//!
//! 将 JSON 形式的查询描述符解析为 QueryDescriptor。
//! 只识别 `where`、`sort`、`skip`、`limit`、`joins` 五个顶层键,其余键忽略。
//! 所有形状错误在此处同步报告,不会产生匹配范围错误的查询。

use crate::ast::{Clause, ClauseEntry, JoinDescriptor, Lookup, QueryDescriptor, SortSpec};
use crate::expression::parse_expression;
use crate::join::validate_joins;
use crate::pagination::parse_count;
use crate::{QueryError, QueryResult};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::str::FromStr;
use tracing::debug;

/// 子句中的保留键
const OR_KEY: &str = "or";
const AND_KEY: &str = "and";

/// # Brief
/// 解析完整的查询描述符
///
/// # Arguments
/// * `value` - JSON 对象;`null` 视为空描述符
///
/// # Returns
/// 解析后的 QueryDescriptor,或编译期错误
pub fn parse_descriptor(value: &Value) -> QueryResult<QueryDescriptor> {
    let map = match value {
        Value::Null => return Ok(QueryDescriptor::default()),
        Value::Object(map) => map,
        other => {
            return Err(QueryError::MalformedClause(format!(
                "descriptor must be an object, got {}",
                type_name(other)
            )))
        }
    };

    let mut descriptor = QueryDescriptor::default();
    for (key, value) in map {
        match key.as_str() {
            "where" => descriptor.filter = parse_where(value)?,
            "sort" => descriptor.sort = parse_sort(value)?,
            "skip" => descriptor.skip = parse_count("skip", value)?,
            "limit" => descriptor.limit = parse_count("limit", value)?,
            "joins" => descriptor.joins = parse_joins(value)?,
            other => debug!("Ignoring unknown descriptor key `{}`", other),
        }
    }

    Ok(descriptor)
}

/// `where` 为 null 时不过滤
pub fn parse_where(value: &Value) -> QueryResult<Option<Clause>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => parse_clause(map).map(Some),
        other => Err(QueryError::MalformedClause(format!(
            "`where` must be an object, got {}",
            type_name(other)
        ))),
    }
}

/// # Brief
/// 解析子句对象
///
/// `or`/`and` 键取子句数组,其余键均视为字段名。
pub fn parse_clause(map: &Map<String, Value>) -> QueryResult<Clause> {
    let mut entries = Vec::with_capacity(map.len());

    for (key, value) in map {
        let entry = match key.as_str() {
            OR_KEY => ClauseEntry::Or(parse_group(OR_KEY, value)?),
            AND_KEY => ClauseEntry::And(parse_group(AND_KEY, value)?),
            field => ClauseEntry::Field {
                name: field.to_string(),
                expression: parse_expression(field, value)?,
            },
        };
        entries.push(entry);
    }

    Ok(Clause { entries })
}

fn parse_group(key: &str, value: &Value) -> QueryResult<Vec<Clause>> {
    let items = value.as_array().ok_or_else(|| {
        QueryError::MalformedClause(format!(
            "`{}` expects an array of clauses, got {}",
            key,
            type_name(value)
        ))
    })?;

    // 空的 or 会编译成恒假谓词,空的 and 会编译成恒真谓词,两者都不是调用方的本意
    if items.is_empty() {
        return Err(QueryError::MalformedClause(format!("`{}` must not be empty", key)));
    }

    items
        .iter()
        .enumerate()
        .map(|(i, item)| match item {
            Value::Object(map) => parse_clause(map),
            other => Err(QueryError::MalformedClause(format!(
                "`{}[{}]` must be an object, got {}",
                key,
                i,
                type_name(other)
            ))),
        })
        .collect()
}

/// # Brief
/// 解析排序描述
///
/// 接受对象形式 `{field: 1}`,以及字符串形式 `"field"`、`"field ASC"`、
/// `"field DESC"`,多个字段可用逗号分隔。
pub fn parse_sort(value: &Value) -> QueryResult<Option<SortSpec>> {
    match value {
        Value::Null => Ok(None),
        Value::Object(map) => Ok(Some(
            map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        )),
        Value::String(s) => parse_sort_string(s),
        other => Err(QueryError::MalformedClause(format!(
            "`sort` must be an object or string, got {}",
            type_name(other)
        ))),
    }
}

fn parse_sort_string(s: &str) -> QueryResult<Option<SortSpec>> {
    let mut spec = SortSpec::new();

    for part in s.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let mut tokens = part.split_whitespace();
        let field = tokens.next().unwrap_or_default();
        let indicator = match tokens.next() {
            None => json!(1),
            Some(dir) if dir.eq_ignore_ascii_case("asc") => json!(1),
            Some(dir) if dir.eq_ignore_ascii_case("desc") => json!(-1),
            Some(dir) => {
                return Err(QueryError::MalformedClause(format!(
                    "unknown sort direction `{}` for `{}`",
                    dir, field
                )))
            }
        };
        if tokens.next().is_some() {
            return Err(QueryError::MalformedClause(format!("malformed sort term `{}`", part)));
        }
        spec.insert(field.to_string(), indicator);
    }

    Ok(if spec.is_empty() { None } else { Some(spec) })
}

/// 关联描述的原始形状
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawJoin {
    alias: String,
    child: String,
    #[serde(default)]
    child_key: Option<String>,
    #[serde(default)]
    parent_key: Option<String>,
    #[serde(default)]
    model: bool,
    #[serde(default)]
    collection: bool,
    #[serde(default)]
    junction_table: bool,
}

impl RawJoin {
    fn into_descriptor(self, position: usize) -> QueryResult<JoinDescriptor> {
        let lookup = Lookup {
            alias: self.alias,
            child: self.child,
            child_key: self.child_key,
            parent_key: self.parent_key,
        };

        if self.junction_table {
            return Ok(JoinDescriptor::JunctionHop(lookup));
        }
        match (self.model, self.collection) {
            (true, false) => Ok(JoinDescriptor::BelongsTo(lookup)),
            (false, true) => Ok(JoinDescriptor::HasMany(lookup)),
            (true, true) => Err(QueryError::InvalidJoinSequence(format!(
                "join #{} (`{}`) sets both `model` and `collection`",
                position, lookup.alias
            ))),
            (false, false) => Err(QueryError::InvalidJoinSequence(format!(
                "join #{} (`{}`) sets none of `model`, `collection`, `junctionTable`",
                position, lookup.alias
            ))),
        }
    }
}

/// # Brief
/// 解析关联描述数组并校验位置约定
pub fn parse_joins(value: &Value) -> QueryResult<Option<Vec<JoinDescriptor>>> {
    let items = match value {
        Value::Null => return Ok(None),
        Value::Array(items) => items,
        other => {
            return Err(QueryError::InvalidJoinSequence(format!(
                "`joins` must be an array, got {}",
                type_name(other)
            )))
        }
    };

    let joins = items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            RawJoin::deserialize(item)
                .map_err(|e| QueryError::InvalidJoinSequence(format!("join #{}: {}", i, e)))?
                .into_descriptor(i)
        })
        .collect::<QueryResult<Vec<_>>>()?;

    validate_joins(&joins)?;
    Ok(Some(joins))
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

impl QueryDescriptor {
    pub fn from_value(value: &Value) -> QueryResult<Self> {
        parse_descriptor(value)
    }
}

impl TryFrom<Value> for QueryDescriptor {
    type Error = QueryError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        parse_descriptor(&value)
    }
}

impl FromStr for QueryDescriptor {
    type Err = QueryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: Value = serde_json::from_str(s)?;
        parse_descriptor(&value)
    }
}
