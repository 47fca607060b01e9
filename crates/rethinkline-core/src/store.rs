//! 内存文档存储
//!
//! 每个数据库一个 DocumentStore,表为按插入顺序保存的文档列表。
//! 读操作在读锁内直接以 `HashMap<String, Vec<Value>>` 作为查询数据源执行,
//! 写操作持有写锁,保证单次写入的原子性。

use parking_lot::RwLock;
use rethinkline_common::{DatabaseName, RethinkError, RethinkResult, TableName};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info};

/// 表名 → 文档列表
pub type Tables = HashMap<String, Vec<Value>>;

pub struct DocumentStore {
    db: DatabaseName,
    tables: RwLock<Tables>,
}

impl DocumentStore {
    /// # Brief
    /// 创建空的数据库存储
    ///
    /// # Arguments
    /// * `db` - 数据库名称,需通过名称校验
    pub fn new(db: &str) -> RethinkResult<Self> {
        Ok(Self {
            db: DatabaseName::new(db)?,
            tables: RwLock::new(HashMap::new()),
        })
    }

    pub fn db(&self) -> &str {
        self.db.as_str()
    }

    /// # Brief
    /// 创建表
    ///
    /// # Returns
    /// 表已存在时返回 TableExists
    pub fn create_table(&self, name: &str) -> RethinkResult<()> {
        let name = TableName::new(name)?;
        let mut tables = self.tables.write();
        if tables.contains_key(name.as_str()) {
            return Err(RethinkError::TableExists(format!("{}.{}", self.db(), name.as_str())));
        }
        tables.insert(name.as_str().to_string(), Vec::new());
        info!("Created table {}.{}", self.db(), name.as_str());
        Ok(())
    }

    /// 表不存在时创建,已存在时不是错误
    ///
    /// # Returns
    /// 是否新建了表
    pub fn ensure_table(&self, name: &str) -> RethinkResult<bool> {
        match self.create_table(name) {
            Ok(()) => Ok(true),
            Err(RethinkError::TableExists(_)) => {
                debug!("Table {}.{} already exists", self.db(), name);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    pub fn drop_table(&self, name: &str) -> RethinkResult<()> {
        match self.tables.write().remove(name) {
            Some(rows) => {
                info!("Dropped table {}.{} ({} documents)", self.db(), name, rows.len());
                Ok(())
            }
            None => Err(RethinkError::TableNotFound(format!("{}.{}", self.db(), name))),
        }
    }

    pub fn has_table(&self, name: &str) -> bool {
        self.tables.read().contains_key(name)
    }

    /// 按名称排序的表列表
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// 在读锁内访问全部表
    pub fn read<R>(&self, f: impl FnOnce(&Tables) -> R) -> R {
        f(&self.tables.read())
    }

    /// 在写锁内访问全部表
    pub fn write<R>(&self, f: impl FnOnce(&mut Tables) -> R) -> R {
        f(&mut self.tables.write())
    }

    /// # Brief
    /// 批量装载表数据,同名表被整体替换
    ///
    /// # Arguments
    /// * `data` - 表名 → 文档数组,每个文档必须是 JSON 对象
    pub fn load(&self, data: Tables) -> RethinkResult<()> {
        for (name, rows) in &data {
            TableName::new(name.as_str())?;
            if let Some((i, row)) = rows.iter().enumerate().find(|(_, row)| !row.is_object()) {
                return Err(RethinkError::Validation(format!(
                    "document #{} in {}.{} is not an object: {}",
                    i,
                    self.db(),
                    name,
                    row
                )));
            }
        }
        let mut tables = self.tables.write();
        for (name, rows) in data {
            debug!("Loaded {} documents into {}.{}", rows.len(), self.db(), name);
            tables.insert(name, rows);
        }
        Ok(())
    }
}
