//! 连接模块
//!
//! Connection 持有一个数据库的文档存储,负责表的创建、删除与获取。
//! 打开连接时会创建配置中列出的表,表已存在不视为错误。

use crate::store::{DocumentStore, Tables};
use crate::table::Table;
use rethinkline_common::config::{AdapterConfig, ConnectionConfig};
use rethinkline_common::{RethinkError, RethinkResult};
use rethinkline_query::CompilerOptions;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

pub struct Connection {
    config: ConnectionConfig,
    options: CompilerOptions,
    store: Arc<DocumentStore>,
    closed: Arc<AtomicBool>,
}

impl Connection {
    /// 打开连接
    ///
    /// # Brief
    /// 建立到指定数据库的连接,并准备配置中列出的表
    ///
    /// # Arguments
    /// * `config` - 连接配置,identity 不能为空
    /// * `options` - 各表共用的编译选项
    ///
    /// # Returns
    /// 成功返回 Connection 实例
    pub async fn open(config: ConnectionConfig, options: CompilerOptions) -> RethinkResult<Self> {
        if config.identity.is_empty() {
            return Err(RethinkError::Connection("connection is missing an identity".to_string()));
        }

        info!(
            "Opening connection `{}` to {}:{}/{}",
            config.identity, config.host, config.port, config.db
        );

        let store = Arc::new(DocumentStore::new(&config.db)?);
        for table in &config.tables {
            store.ensure_table(table)?;
        }

        Ok(Self {
            config,
            options,
            store,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    /// 按完整的适配器配置打开连接
    pub async fn from_config(config: &AdapterConfig) -> RethinkResult<Self> {
        Self::open(config.connection.clone(), CompilerOptions::from(&config.compiler)).await
    }

    pub fn identity(&self) -> &str {
        &self.config.identity
    }

    pub fn db(&self) -> &str {
        self.store.db()
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn ensure_open(&self) -> RethinkResult<()> {
        if self.is_closed() {
            return Err(RethinkError::Connection(format!(
                "connection `{}` is closed",
                self.config.identity
            )));
        }
        Ok(())
    }

    /// # Brief
    /// 创建表并返回其句柄
    ///
    /// # Returns
    /// 表已存在时返回 TableExists
    pub async fn create_table(&self, name: &str) -> RethinkResult<Table> {
        self.ensure_open()?;
        self.store.create_table(name)?;
        Ok(self.handle(name))
    }

    pub async fn drop_table(&self, name: &str) -> RethinkResult<()> {
        self.ensure_open()?;
        self.store.drop_table(name)
    }

    /// # Brief
    /// 获取已存在表的句柄
    pub fn table(&self, name: &str) -> RethinkResult<Table> {
        self.ensure_open()?;
        if !self.store.has_table(name) {
            return Err(RethinkError::TableNotFound(format!("{}.{}", self.db(), name)));
        }
        Ok(self.handle(name))
    }

    pub fn table_names(&self) -> Vec<String> {
        self.store.table_names()
    }

    /// 批量装载数据,缺少的表自动创建
    pub fn load(&self, data: Tables) -> RethinkResult<()> {
        self.ensure_open()?;
        self.store.load(data)
    }

    /// 关闭连接,之后通过本连接取得的表句柄都不可再用
    pub async fn close(&self) -> RethinkResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            info!("Closing connection `{}`", self.config.identity);
        }
        Ok(())
    }

    fn handle(&self, name: &str) -> Table {
        Table::new(name, self.store.clone(), self.options.clone(), self.closed.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rethinkline_query::QueryDescriptor;
    use serde_json::json;

    fn config(tables: &[&str]) -> ConnectionConfig {
        ConnectionConfig {
            tables: tables.iter().map(|t| t.to_string()).collect(),
            ..ConnectionConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_creates_tables() {
        let conn = Connection::open(config(&["users", "pets"]), CompilerOptions::default())
            .await
            .unwrap();
        assert_eq!(conn.table_names(), vec!["pets", "users"]);
        assert!(conn.table("users").is_ok());
        assert!(matches!(
            conn.table("ghosts").unwrap_err(),
            RethinkError::TableNotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_duplicate_table_in_config_is_fine() {
        let conn = Connection::open(config(&["users", "users"]), CompilerOptions::default())
            .await
            .unwrap();
        assert_eq!(conn.table_names(), vec!["users"]);
    }

    #[tokio::test]
    async fn test_missing_identity() {
        let cfg = ConnectionConfig {
            identity: String::new(),
            ..ConnectionConfig::default()
        };
        let err = Connection::open(cfg, CompilerOptions::default()).await.err().unwrap();
        assert!(matches!(err, RethinkError::Connection(_)));
    }

    #[tokio::test]
    async fn test_create_and_drop_table() {
        let conn = Connection::open(config(&[]), CompilerOptions::default()).await.unwrap();
        let table = conn.create_table("tags").await.unwrap();
        assert_eq!(table.name(), "tags");
        assert!(conn.create_table("tags").await.is_err());

        conn.drop_table("tags").await.unwrap();
        assert!(conn.table("tags").is_err());
    }

    #[tokio::test]
    async fn test_close_invalidates_tables() {
        let conn = Connection::open(config(&["users"]), CompilerOptions::default()).await.unwrap();
        let users = conn.table("users").unwrap();
        users.create(json!({"id": 1})).await.unwrap();

        conn.close().await.unwrap();
        assert!(conn.is_closed());
        assert!(users.find(&QueryDescriptor::new()).await.is_err());
        assert!(conn.table("users").is_err());
    }

    #[tokio::test]
    async fn test_from_config() {
        let adapter = AdapterConfig::from_toml_str(
            r#"
            [connection]
            identity = "main"
            db = "app"
            tables = ["users"]

            [compiler]
            primary_key = "uid"
            "#,
        )
        .unwrap();
        let conn = Connection::from_config(&adapter).await.unwrap();
        assert_eq!(conn.identity(), "main");
        assert_eq!(conn.db(), "app");
        assert_eq!(conn.options().primary_key, "uid");

        let users = conn.table("users").unwrap();
        let doc = users.create(json!({"name": "miku"})).await.unwrap();
        assert!(doc["uid"].is_string());
    }
}
