//! 查询编译器
//!
//! 按固定顺序把描述符的各部分编译到集合句柄上:
//! 过滤 → 排序 → skip → 关联 → limit
//!
//! limit 总是最后应用,与描述符中键的书写顺序无关。
//! 编译是纯函数: 不做 I/O,不修改共享句柄,可并发调用。

use crate::ast::{Clause, QueryDescriptor};
use crate::clause::{compile_clause, primary_key_lookup};
use crate::join::compile_joins;
use crate::pagination::{compile_limit, compile_skip};
use crate::sort::compile_sort;
use crate::term::{Binding, QueryHandle};
use crate::QueryResult;
use rethinkline_common::config::CompilerConfig;
use rethinkline_common::DEFAULT_PRIMARY_KEY;
use serde_json::Value;
use tracing::{debug, trace};

/// 编译选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// 主键字段,关联键缺省时也使用它
    pub primary_key: String,
    /// 主键单值等值条件是否改用键查找
    pub key_lookup: bool,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            key_lookup: true,
        }
    }
}

impl From<&CompilerConfig> for CompilerOptions {
    fn from(config: &CompilerConfig) -> Self {
        Self {
            primary_key: config.primary_key.clone(),
            key_lookup: config.key_lookup,
        }
    }
}

/// 查询编译器
///
/// 只读借用目标集合句柄,每次编译都从该句柄派生新的查询。
pub struct QueryCompiler<'a, H: QueryHandle> {
    handle: &'a H,
    options: CompilerOptions,
}

impl<'a, H: QueryHandle> QueryCompiler<'a, H> {
    pub fn new(handle: &'a H) -> Self {
        Self::with_options(handle, CompilerOptions::default())
    }

    pub fn with_options(handle: &'a H, options: CompilerOptions) -> Self {
        Self { handle, options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// 编译描述符
    ///
    /// # Brief
    /// 将描述符编译为后端查询,不执行
    ///
    /// # Arguments
    /// * `descriptor` - 已解析的查询描述符
    ///
    /// # Returns
    /// 新的查询句柄,或编译期错误
    pub fn compile(&self, descriptor: &QueryDescriptor) -> QueryResult<H> {
        let mut query = self.handle.clone();

        if let Some(clause) = &descriptor.filter {
            query = self.compile_filter(query, clause);
        }

        if let Some(sort) = &descriptor.sort {
            let keys = compile_sort(sort);
            if !keys.is_empty() {
                trace!("Compiled {} sort keys", keys.len());
                query = query.order_by(keys);
            }
        }

        if let Some(skip) = descriptor.skip {
            query = compile_skip(query, skip);
        }

        if let Some(joins) = &descriptor.joins {
            let fields = compile_joins(joins, &self.options.primary_key)?;
            if !fields.is_empty() {
                trace!("Compiled {} join fields", fields.len());
                query = query.merge(fields);
            }
        }

        if let Some(limit) = descriptor.limit {
            query = compile_limit(query, limit);
        }

        Ok(query)
    }

    fn compile_filter(&self, query: H, clause: &Clause) -> H {
        if self.options.key_lookup {
            if let Some(key) = primary_key_lookup(clause, &self.options.primary_key) {
                debug!("Using key lookup on `{}` = {}", self.options.primary_key, key);
                return query.get_by_key(&self.options.primary_key, key.clone());
            }
        }
        let predicate = compile_clause(Binding::Row, clause);
        trace!("Compiled filter: {}", predicate);
        query.filter(predicate)
    }

    /// 解析并编译 JSON 形式的描述符
    pub fn compile_value(&self, value: &Value) -> QueryResult<H> {
        self.compile(&QueryDescriptor::from_value(value)?)
    }

    /// 解析并编译 JSON 文本形式的描述符
    pub fn compile_str(&self, text: &str) -> QueryResult<H> {
        self.compile(&text.parse::<QueryDescriptor>()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Expression;
    use crate::executor::QueryExecutor;
    use crate::term::{Expr, MergeField, OrderKey, Term};
    use crate::QueryError;
    use proptest::prelude::*;
    use serde_json::json;
    use std::collections::HashMap;

    fn fixtures() -> HashMap<String, Vec<Value>> {
        let mut tables = HashMap::new();
        tables.insert(
            "users".to_string(),
            vec![
                json!({"id": 1, "a": 1, "b": 5, "name": "miku", "nick": 1}),
                json!({"id": 2, "a": 2, "b": 4, "name": "rin"}),
                json!({"id": 3, "a": 3, "b": 3, "name": "luka", "nick": 3}),
                json!({"id": 4, "a": 1, "b": 2, "name": "len"}),
                json!({"id": 5, "a": 6, "b": 1, "name": "meiko"}),
            ],
        );
        tables.insert(
            "junction".to_string(),
            vec![
                json!({"id": 100, "userId": 1, "tagId": 7}),
                json!({"id": 101, "userId": 1, "tagId": 8}),
                json!({"id": 102, "userId": 2, "tagId": 8}),
                json!({"id": 103, "userId": 2}),
            ],
        );
        tables.insert(
            "tags".to_string(),
            vec![json!({"id": 7, "label": "vocal"}), json!({"id": 8, "label": "dance"})],
        );
        tables
    }

    fn run(descriptor: Value) -> QueryResult<Vec<Value>> {
        let source = fixtures();
        let users = Term::table("users");
        let plan = QueryCompiler::new(&users).compile_value(&descriptor)?;
        QueryExecutor::new(&source).run(&plan)
    }

    fn ids(rows: &[Value]) -> Vec<i64> {
        rows.iter().filter_map(|r| r["id"].as_i64()).collect()
    }

    #[test]
    fn test_equality_filter() {
        assert_eq!(ids(&run(json!({"where": {"a": 1}})).unwrap()), vec![1, 4]);
    }

    #[test]
    fn test_range_filters() {
        assert_eq!(ids(&run(json!({"where": {"a": {">": 1}}})).unwrap()), vec![2, 3, 5]);
        assert_eq!(ids(&run(json!({"where": {"b": {"<=": 3}}})).unwrap()), vec![3, 4, 5]);
    }

    #[test]
    fn test_or_is_union() {
        let rows = run(json!({"where": {"or": [{"id": 1}, {"id": 2}]}})).unwrap();
        assert_eq!(ids(&rows), vec![1, 2]);
    }

    #[test]
    fn test_or_with_partially_present_field() {
        let nick_first = run(json!({"where": {"or": [{"nick": 1}, {"id": 2}]}})).unwrap();
        let id_first = run(json!({"where": {"or": [{"id": 2}, {"nick": 1}]}})).unwrap();
        assert_eq!(ids(&nick_first), vec![1, 2]);
        assert_eq!(nick_first, id_first);

        let nested = run(json!({"where": {"a": {"<": 3}, "or": [{"nick": 3}, {"b": 4}]}})).unwrap();
        assert_eq!(ids(&nested), vec![2]);
    }

    #[test]
    fn test_where_null_is_full_scan() {
        assert_eq!(run(json!({"where": null})).unwrap(), run(json!({})).unwrap());
        let users = Term::table("users");
        let plan = QueryCompiler::new(&users).compile_value(&json!({"where": null})).unwrap();
        assert_eq!(plan, users);
    }

    #[test]
    fn test_limit_zero_is_noop() {
        let sorted = run(json!({"sort": {"a": 1}})).unwrap();
        let limited = run(json!({"sort": {"a": 1}, "limit": 0})).unwrap();
        assert_eq!(sorted, limited);
    }

    #[test]
    fn test_limit_applied_last() {
        let users = Term::table("users");
        let compiler = QueryCompiler::new(&users);
        let plan = compiler
            .compile_str(r#"{"limit": 2, "skip": 1, "sort": {"b": 1}}"#)
            .unwrap();
        assert_eq!(plan, users.order_by(vec![OrderKey::asc("b")]).skip(1).limit(2));

        let rows = run(json!({"limit": 2, "skip": 1, "sort": {"b": 1}})).unwrap();
        assert_eq!(ids(&rows), vec![4, 3]);
    }

    #[test]
    fn test_round_trip_is_structural() {
        let users = Term::table("users");
        let compiler = QueryCompiler::new(&users);
        let descriptor = json!({
            "where": {"a": {">=": 1}, "or": [{"b": 1}, {"b": 2}]},
            "sort": {"a": 1},
            "skip": 1,
            "limit": 3
        });
        let first = compiler.compile_value(&descriptor).unwrap();
        let second = compiler.compile_value(&descriptor).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.to_reql(), second.to_reql());
        assert_eq!(users, Term::table("users"));
    }

    #[test]
    fn test_primary_key_fast_path() {
        let users = Term::table("users");
        let plan = QueryCompiler::new(&users).compile_value(&json!({"where": {"id": 3}})).unwrap();
        assert_eq!(plan, users.get_by_key("id", json!(3)));

        let options = CompilerOptions {
            key_lookup: false,
            ..CompilerOptions::default()
        };
        let plan = QueryCompiler::with_options(&users, options)
            .compile_value(&json!({"where": {"id": 3}}))
            .unwrap();
        assert_eq!(plan, users.filter(Expr::row("id").eq(3)));

        assert_eq!(ids(&run(json!({"where": {"id": 3}})).unwrap()), vec![3]);
    }

    #[test]
    fn test_custom_primary_key() {
        let users = Term::table("users");
        let options = CompilerOptions {
            primary_key: "name".to_string(),
            key_lookup: true,
        };
        let plan = QueryCompiler::with_options(&users, options)
            .compile_value(&json!({"where": {"name": "rin"}}))
            .unwrap();
        assert_eq!(plan, users.get_by_key("name", json!("rin")));
    }

    #[test]
    fn test_many_to_many_attaches_tag_documents() {
        let rows = run(json!({
            "where": {"id": {"<": 4}},
            "joins": [
                {"alias": "tags", "collection": true, "child": "junction", "childKey": "userId"},
                {"alias": "tags", "junctionTable": true, "child": "tags", "parentKey": "tagId"}
            ]
        }))
        .unwrap();

        assert_eq!(
            rows[0]["tags"],
            json!([{"id": 7, "label": "vocal"}, {"id": 8, "label": "dance"}])
        );
        // 用户 2 的第二条中间行缺少 tagId,只影响该行本身
        assert_eq!(rows[1]["tags"], json!([{"id": 8, "label": "dance"}]));
        assert_eq!(rows[2]["tags"], json!([]));
    }

    #[test]
    fn test_joins_merge_before_limit() {
        let users = Term::table("users");
        let plan = QueryCompiler::new(&users)
            .compile_value(&json!({
                "limit": 1,
                "joins": [{"alias": "links", "collection": true, "child": "junction", "childKey": "userId"}]
            }))
            .unwrap();
        assert_eq!(
            plan,
            users
                .merge(vec![MergeField::new(
                    "links",
                    Expr::get_all("junction", "userId", Expr::row("id"))
                )])
                .limit(1)
        );
    }

    #[test]
    fn test_unsupported_operator() {
        let err = run(json!({"where": {"a": {"~=": 1}}})).unwrap_err();
        assert!(matches!(err, QueryError::UnsupportedOperator(_)));
    }

    #[test]
    fn test_contains_and_not() {
        let mut source = fixtures();
        source.insert(
            "posts".to_string(),
            vec![
                json!({"id": 1, "tags": ["a", "b"]}),
                json!({"id": 2, "tags": ["b"]}),
            ],
        );
        let posts = Term::table("posts");
        let compiler = QueryCompiler::new(&posts);
        let executor = QueryExecutor::new(&source);

        let plan = compiler.compile_value(&json!({"where": {"tags": {"contains": ["a", "b"]}}})).unwrap();
        assert_eq!(ids(&executor.run(&plan).unwrap()), vec![1]);

        let plan = compiler.compile_value(&json!({"where": {"id": {"!": 1}}})).unwrap();
        assert_eq!(ids(&executor.run(&plan).unwrap()), vec![2]);
    }

    #[test]
    fn test_compile_from_ast() {
        let users = Term::table("users");
        let descriptor = QueryDescriptor::new()
            .with_filter(Clause::new().field("a", Expression::eq(1)))
            .with_limit(1);
        let plan = QueryCompiler::new(&users).compile(&descriptor).unwrap();
        assert_eq!(plan, users.filter(Expr::row("a").eq(1)).limit(1));
    }

    fn condition() -> impl Strategy<Value = (String, Value)> {
        let field = prop_oneof![Just("a"), Just("b"), Just("id"), Just("nick")];
        let op = prop_oneof![Just("="), Just(">"), Just("<"), Just(">="), Just("<="), Just("!")];
        (field, op, 0i64..7).prop_map(|(field, op, n)| {
            let value = if op == "=" { json!(n) } else { json!({ op: n }) };
            (field.to_string(), value)
        })
    }

    fn clause(conditions: &[(String, Value)]) -> Value {
        let mut map = serde_json::Map::new();
        for (field, value) in conditions {
            map.entry(field.clone()).or_insert_with(|| value.clone());
        }
        Value::Object(map)
    }

    fn sorted_ids(rows: &[Value]) -> Vec<i64> {
        let mut ids = ids(rows);
        ids.sort();
        ids
    }

    proptest! {
        #[test]
        fn prop_and_is_commutative(conditions in prop::collection::vec(condition(), 1..4)) {
            let forward = clause(&conditions);
            let mut backward = serde_json::Map::new();
            if let Value::Object(map) = &forward {
                for (field, value) in map.iter().rev() {
                    backward.insert(field.clone(), value.clone());
                }
            }

            let rows_forward = run(json!({ "where": forward })).unwrap();
            let rows_backward = run(json!({ "where": Value::Object(backward) })).unwrap();
            prop_assert_eq!(rows_forward, rows_backward);
        }

        #[test]
        fn prop_or_is_union(
            left in prop::collection::vec(condition(), 1..3),
            right in prop::collection::vec(condition(), 1..3),
        ) {
            let (left, right) = (clause(&left), clause(&right));
            let forward = run(json!({"where": {"or": [left.clone(), right.clone()]}})).unwrap();
            let backward = run(json!({"where": {"or": [right.clone(), left.clone()]}})).unwrap();
            prop_assert_eq!(&forward, &backward);

            let mut union = ids(&run(json!({"where": left})).unwrap());
            union.extend(ids(&run(json!({"where": right})).unwrap()));
            union.sort();
            union.dedup();
            prop_assert_eq!(sorted_ids(&forward), union);
        }
    }
}
