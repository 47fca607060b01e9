//! 公共类型定义模块
//!
//! 定义 Rethinkline 的核心类型:
//! - DocumentId: 主键生成
//! - TableName: 表名称(带验证)
//! - DatabaseName: 数据库名称(带验证)

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// 默认主键字段
pub const DEFAULT_PRIMARY_KEY: &str = "id";

/// 默认端口
pub const DEFAULT_PORT: u16 = 28015;

/// 文档主键
///
/// 新插入且未携带主键的文档使用 UUID v4 字符串作为主键。
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DocumentId(String);

impl DocumentId {
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_value(self) -> Value {
        Value::String(self.0)
    }
}

impl Default for DocumentId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

fn is_valid_identifier(name: &str) -> bool {
    name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// 表名称
///
/// 带验证的表名称,限制:
/// - 不能为空
/// - 只允许字母、数字、下划线和连字符
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Result<Self, crate::error::RethinkError> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::error::RethinkError::Validation(
                "Table name cannot be empty".to_string(),
            ));
        }
        if !is_valid_identifier(&name) {
            return Err(crate::error::RethinkError::Validation(format!(
                "Table name `{}` may only contain alphanumerics, '_' and '-'",
                name
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 数据库名称
///
/// 带验证的数据库名称,限制:
/// - 不能为空
/// - 最大 64 字符
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseName(String);

impl DatabaseName {
    pub fn new(name: impl Into<String>) -> Result<Self, crate::error::RethinkError> {
        let name = name.into();
        if name.is_empty() {
            return Err(crate::error::RethinkError::Validation(
                "Database name cannot be empty".to_string(),
            ));
        }
        if name.len() > 64 {
            return Err(crate::error::RethinkError::Validation(
                "Database name cannot exceed 64 characters".to_string(),
            ));
        }
        if !is_valid_identifier(&name) {
            return Err(crate::error::RethinkError::Validation(format!(
                "Database name `{}` may only contain alphanumerics, '_' and '-'",
                name
            )));
        }
        Ok(Self(name))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DatabaseName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_id_is_unique() {
        let a = DocumentId::new();
        let b = DocumentId::new();
        assert_ne!(a, b);
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn test_table_name_validation() {
        assert!(TableName::new("users").is_ok());
        assert!(TableName::new("user_tags-2").is_ok());
        assert!(TableName::new("").is_err());
        assert!(TableName::new("users.tags").is_err());
    }

    #[test]
    fn test_database_name_validation() {
        assert!(DatabaseName::new("test").is_ok());
        assert!(DatabaseName::new("x".repeat(65)).is_err());
        assert!(DatabaseName::new("bad name").is_err());
    }
}
