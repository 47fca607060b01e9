//! 表操作模块
//!
//! 每个读写操作先用 QueryCompiler 把描述符编译为查询计划,
//! 再在存储锁内用 QueryExecutor 执行。编译错误原样向上传递。

use crate::store::{DocumentStore, Tables};
use crate::AdapterResult;
use rethinkline_common::{DocumentId, RethinkError};
use rethinkline_query::filter::values_equal;
use rethinkline_query::{CompilerOptions, QueryCompiler, QueryDescriptor, QueryExecutor, Term};
use serde_json::Value;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

struct TableInner {
    name: String,
    store: Arc<DocumentStore>,
    options: CompilerOptions,
    closed: Arc<AtomicBool>,
}

/// 表句柄
///
/// 克隆开销很小,可在任务间自由传递。所有操作在阻塞线程池上执行。
#[derive(Clone)]
pub struct Table {
    inner: Arc<TableInner>,
}

impl Table {
    pub(crate) fn new(
        name: impl Into<String>,
        store: Arc<DocumentStore>,
        options: CompilerOptions,
        closed: Arc<AtomicBool>,
    ) -> Self {
        Self {
            inner: Arc::new(TableInner {
                name: name.into(),
                store,
                options,
                closed,
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// # Brief
    /// 编译描述符,不执行
    ///
    /// # Returns
    /// 以本表为起点的查询计划
    pub fn compile(&self, descriptor: &QueryDescriptor) -> AdapterResult<Term> {
        Ok(self.inner.plan(descriptor)?)
    }

    async fn blocking<R, F>(&self, op: F) -> AdapterResult<R>
    where
        F: FnOnce(&TableInner) -> AdapterResult<R> + Send + 'static,
        R: Send + 'static,
    {
        let inner = self.inner.clone();
        inner.ensure_open()?;
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| RethinkError::Internal(e.to_string()))?
    }

    /// # Brief
    /// 插入单个文档
    ///
    /// 未携带主键时生成 UUID v4 主键。
    ///
    /// # Arguments
    /// * `doc` - JSON 对象
    ///
    /// # Returns
    /// 实际存储的文档;主键重复时返回 AlreadyExists
    pub async fn create(&self, doc: Value) -> AdapterResult<Value> {
        let mut stored = self.blocking(move |t| t.insert(vec![doc])).await?;
        stored
            .pop()
            .ok_or_else(|| RethinkError::Internal("insert returned no document".to_string()).into())
    }

    /// # Brief
    /// 批量插入文档,全部成功或全部失败
    ///
    /// # Returns
    /// 实际存储的文档,空输入返回空数组
    pub async fn create_each(&self, docs: Vec<Value>) -> AdapterResult<Vec<Value>> {
        if docs.is_empty() {
            return Ok(Vec::new());
        }
        self.blocking(move |t| t.insert(docs)).await
    }

    /// 查询匹配的文档,附带关联字段
    pub async fn find(&self, descriptor: &QueryDescriptor) -> AdapterResult<Vec<Value>> {
        let descriptor = descriptor.clone();
        self.blocking(move |t| t.find(&descriptor)).await
    }

    /// # Brief
    /// 将 patch 浅合并到每个匹配的文档
    ///
    /// # Arguments
    /// * `descriptor` - 选择条件
    /// * `patch` - JSON 对象,不能修改主键
    ///
    /// # Returns
    /// 更新后的文档
    pub async fn update(&self, descriptor: &QueryDescriptor, patch: Value) -> AdapterResult<Vec<Value>> {
        let descriptor = descriptor.clone();
        self.blocking(move |t| t.update(&descriptor, patch)).await
    }

    /// 删除匹配的文档,返回它们的主键
    pub async fn destroy(&self, descriptor: &QueryDescriptor) -> AdapterResult<Vec<Value>> {
        let descriptor = descriptor.clone();
        self.blocking(move |t| t.destroy(&descriptor)).await
    }

    pub async fn count(&self, descriptor: &QueryDescriptor) -> AdapterResult<u64> {
        let descriptor = descriptor.clone();
        self.blocking(move |t| t.count(&descriptor)).await
    }

    /// 关联查询与 find 走同一路径
    pub async fn join(&self, descriptor: &QueryDescriptor) -> AdapterResult<Vec<Value>> {
        self.find(descriptor).await
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("db", &self.inner.store.db())
            .field("name", &self.inner.name)
            .finish()
    }
}

impl TableInner {
    fn primary_key(&self) -> &str {
        &self.options.primary_key
    }

    fn ensure_open(&self) -> AdapterResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(RethinkError::Connection(format!(
                "connection to `{}` is closed",
                self.store.db()
            ))
            .into());
        }
        Ok(())
    }

    fn plan(&self, descriptor: &QueryDescriptor) -> Result<Term, rethinkline_query::QueryError> {
        let handle = Term::table(self.name.as_str());
        QueryCompiler::with_options(&handle, self.options.clone()).compile(descriptor)
    }

    fn run(&self, tables: &Tables, descriptor: &QueryDescriptor) -> AdapterResult<Vec<Value>> {
        if !tables.contains_key(&self.name) {
            return Err(RethinkError::TableNotFound(format!("{}.{}", self.store.db(), self.name)).into());
        }
        let plan = self.plan(descriptor)?;
        Ok(QueryExecutor::new(tables).run(&plan)?)
    }

    /// 选择阶段不需要关联
    fn selection(descriptor: &QueryDescriptor) -> QueryDescriptor {
        QueryDescriptor {
            joins: None,
            ..descriptor.clone()
        }
    }

    fn matched_keys(&self, tables: &Tables, descriptor: &QueryDescriptor) -> AdapterResult<Vec<Value>> {
        let rows = self.run(tables, &Self::selection(descriptor))?;
        Ok(rows
            .into_iter()
            .filter_map(|row| match row.get(self.primary_key()) {
                Some(key) => Some(key.clone()),
                None => {
                    warn!("Skipping document without `{}` in {}", self.primary_key(), self.name);
                    None
                }
            })
            .collect())
    }

    fn prepare(&self, doc: Value) -> AdapterResult<Value> {
        match doc {
            Value::Object(mut map) => {
                if !map.contains_key(self.primary_key()) {
                    map.insert(self.primary_key().to_string(), DocumentId::new().into_value());
                }
                Ok(Value::Object(map))
            }
            other => Err(RethinkError::Validation(format!("expected a document object, got {}", other)).into()),
        }
    }

    fn insert(&self, docs: Vec<Value>) -> AdapterResult<Vec<Value>> {
        let docs = docs
            .into_iter()
            .map(|doc| self.prepare(doc))
            .collect::<AdapterResult<Vec<_>>>()?;
        let pk = self.primary_key();

        self.store.write(|tables: &mut Tables| -> AdapterResult<_> {
            let rows = tables
                .get_mut(&self.name)
                .ok_or_else(|| RethinkError::TableNotFound(format!("{}.{}", self.store.db(), self.name)))?;

            for (i, doc) in docs.iter().enumerate() {
                let key = &doc[pk];
                let clash = rows
                    .iter()
                    .chain(docs[..i].iter())
                    .any(|row| row.get(pk).is_some_and(|v| values_equal(v, key)));
                if clash {
                    return Err(RethinkError::AlreadyExists(format!("{} = {} in {}", pk, key, self.name)).into());
                }
            }

            rows.extend(docs.iter().cloned());
            debug!("Inserted {} documents into {}", docs.len(), self.name);
            Ok(docs)
        })
    }

    fn find(&self, descriptor: &QueryDescriptor) -> AdapterResult<Vec<Value>> {
        self.store.read(|tables| self.run(tables, descriptor))
    }

    fn count(&self, descriptor: &QueryDescriptor) -> AdapterResult<u64> {
        let rows = self.store.read(|tables| self.run(tables, &Self::selection(descriptor)))?;
        Ok(rows.len() as u64)
    }

    fn update(&self, descriptor: &QueryDescriptor, patch: Value) -> AdapterResult<Vec<Value>> {
        let patch = match patch {
            Value::Object(map) => map,
            other => {
                return Err(RethinkError::Validation(format!("update patch must be an object, got {}", other)).into())
            }
        };
        let pk = self.primary_key();

        self.store.write(|tables: &mut Tables| -> AdapterResult<_> {
            let keys = self.matched_keys(tables, descriptor)?;
            if let Some(new_key) = patch.get(pk) {
                if keys.iter().any(|k| !values_equal(k, new_key)) {
                    return Err(RethinkError::Validation(format!("primary key `{}` cannot be changed", pk)).into());
                }
            }

            let rows = tables
                .get_mut(&self.name)
                .ok_or_else(|| RethinkError::TableNotFound(self.name.clone()))?;
            let mut updated = Vec::with_capacity(keys.len());
            for key in &keys {
                if let Some(Value::Object(row)) = rows
                    .iter_mut()
                    .find(|row| row.get(pk).is_some_and(|v| values_equal(v, key)))
                {
                    for (field, value) in &patch {
                        row.insert(field.clone(), value.clone());
                    }
                    updated.push(Value::Object(row.clone()));
                }
            }
            debug!("Updated {} documents in {}", updated.len(), self.name);
            Ok(updated)
        })
    }

    fn destroy(&self, descriptor: &QueryDescriptor) -> AdapterResult<Vec<Value>> {
        let pk = self.primary_key();

        self.store.write(|tables: &mut Tables| -> AdapterResult<_> {
            let keys = self.matched_keys(tables, descriptor)?;
            let rows = tables
                .get_mut(&self.name)
                .ok_or_else(|| RethinkError::TableNotFound(self.name.clone()))?;
            rows.retain(|row| !row.get(pk).is_some_and(|v| keys.iter().any(|k| values_equal(v, k))));
            debug!("Deleted {} documents from {}", keys.len(), self.name);
            Ok(keys)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::AdapterError;
    use rethinkline_query::QueryError;
    use serde_json::json;

    fn users() -> Table {
        let store = Arc::new(DocumentStore::new("test").unwrap());
        store.create_table("users").unwrap();
        Table::new("users", store, CompilerOptions::default(), Arc::new(AtomicBool::new(false)))
    }

    fn where_(clause: Value) -> QueryDescriptor {
        QueryDescriptor::from_value(&json!({ "where": clause })).unwrap()
    }

    #[tokio::test]
    async fn test_create_assigns_id() {
        let table = users();
        let doc = table.create(json!({"name": "miku"})).await.unwrap();
        assert!(doc["id"].is_string());
        assert_eq!(doc["name"], "miku");
        assert_eq!(table.count(&QueryDescriptor::new()).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_create_duplicate_key() {
        let table = users();
        table.create(json!({"id": 1})).await.unwrap();
        let err = table.create(json!({"id": 1})).await.unwrap_err();
        assert!(matches!(err, AdapterError::Common(RethinkError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn test_create_rejects_non_object() {
        let table = users();
        let err = table.create(json!([1, 2])).await.unwrap_err();
        assert!(matches!(err, AdapterError::Common(RethinkError::Validation(_))));
    }

    #[tokio::test]
    async fn test_create_each_all_or_nothing() {
        let table = users();
        assert!(table.create_each(vec![]).await.unwrap().is_empty());

        let err = table
            .create_each(vec![json!({"id": 1}), json!({"id": 2}), json!({"id": 1})])
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::Common(RethinkError::AlreadyExists(_))));
        assert_eq!(table.count(&QueryDescriptor::new()).await.unwrap(), 0);

        let stored = table.create_each(vec![json!({"id": 1}), json!({"id": 2})]).await.unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[tokio::test]
    async fn test_find_update_destroy() {
        let table = users();
        table
            .create_each(vec![
                json!({"id": 1, "age": 16}),
                json!({"id": 2, "age": 14}),
                json!({"id": 3, "age": 20}),
            ])
            .await
            .unwrap();

        let found = table.find(&where_(json!({"age": {">": 15}}))).await.unwrap();
        assert_eq!(found.len(), 2);

        let updated = table
            .update(&where_(json!({"age": {"<": 18}})), json!({"minor": true}))
            .await
            .unwrap();
        assert_eq!(updated.len(), 2);
        assert!(updated.iter().all(|row| row["minor"] == json!(true)));
        assert_eq!(table.count(&where_(json!({"minor": true}))).await.unwrap(), 2);

        let removed = table.destroy(&where_(json!({"id": 2}))).await.unwrap();
        assert_eq!(removed, vec![json!(2)]);
        assert_eq!(table.count(&QueryDescriptor::new()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_update_validation() {
        let table = users();
        table.create(json!({"id": 1})).await.unwrap();

        let err = table.update(&QueryDescriptor::new(), json!(5)).await.unwrap_err();
        assert!(matches!(err, AdapterError::Common(RethinkError::Validation(_))));

        let err = table.update(&QueryDescriptor::new(), json!({"id": 9})).await.unwrap_err();
        assert!(matches!(err, AdapterError::Common(RethinkError::Validation(_))));
    }

    #[tokio::test]
    async fn test_compile_error_passes_through() {
        let table = users();
        let descriptor = QueryDescriptor::new().with_joins(vec![rethinkline_query::JoinDescriptor::JunctionHop(
            rethinkline_query::Lookup::new("tags", "tags").parent_key("tagId"),
        )]);
        let err = table.find(&descriptor).await.unwrap_err();
        assert!(matches!(err, AdapterError::Query(QueryError::InvalidJoinSequence(_))));
        assert!(err.is_compile_error());
    }

    #[test]
    fn test_compile_only() {
        let table = users();
        let plan = table.compile(&where_(json!({"id": 1}))).unwrap();
        assert_eq!(plan.to_reql(), r#"r.table("users").getAll(1, {index: "id"})"#);
    }

    #[tokio::test]
    async fn test_closed_connection() {
        let store = Arc::new(DocumentStore::new("test").unwrap());
        store.create_table("users").unwrap();
        let table = Table::new("users", store, CompilerOptions::default(), Arc::new(AtomicBool::new(true)));
        let err = table.find(&QueryDescriptor::new()).await.unwrap_err();
        assert!(matches!(err, AdapterError::Common(RethinkError::Connection(_))));
    }
}
