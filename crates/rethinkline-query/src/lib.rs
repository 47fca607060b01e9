//! Rethinkline 查询模块
//!
//! 本模块把与后端无关的声明式查询描述符编译为文档存储的查询计划:
//! - 描述符模型与解析
//! - 后端查询代数 (Term / Expr)
//! - 条件、子句、排序、分页、关联编译器
//! - 编译器总控 (QueryCompiler)
//! - 内存解释执行器,作为计划的参考执行方
//!
//! 文档存储没有原生连接算子,关联通过 Merge 投影与键查找实现。

pub mod ast;
pub mod parser;
pub mod term;
pub mod expression;
pub mod clause;
pub mod sort;
pub mod pagination;
pub mod join;
pub mod compiler;
pub mod filter;
pub mod executor;

pub use ast::*;
pub use compiler::{CompilerOptions, QueryCompiler};
pub use executor::QueryExecutor;
pub use filter::TableSource;
pub use term::{Binding, CompareOp, Expr, MergeField, OrderKey, QueryHandle, SortDirection, Term};

use thiserror::Error;

/// 查询错误类型
///
/// 编译期错误在 `compile` 调用时同步返回,不重试。
#[derive(Error, Debug)]
pub enum QueryError {
    /// 子句条目形状无法识别
    #[error("Malformed clause: {0}")]
    MalformedClause(String),

    /// 不支持的操作符
    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    /// 关联描述序列不合法
    #[error("Invalid join sequence: {0}")]
    InvalidJoinSequence(String),

    /// skip/limit 不是非负整数
    #[error("Invalid pagination: {0}")]
    InvalidPagination(String),

    /// 行中不存在被引用的字段
    #[error("No attribute `{0}` in object")]
    NonExistence(String),

    /// 类型错误
    #[error("Type error: {0}")]
    TypeError(String),

    /// 表不存在
    #[error("Table not found: {0}")]
    TableNotFound(String),

    /// 执行错误
    #[error("Execution error: {0}")]
    Execution(String),

    /// JSON 解析错误
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl QueryError {
    /// 描述符本身不合法(而非执行失败)
    pub fn is_compile_error(&self) -> bool {
        matches!(
            self,
            QueryError::MalformedClause(_)
                | QueryError::UnsupportedOperator(_)
                | QueryError::InvalidJoinSequence(_)
                | QueryError::InvalidPagination(_)
                | QueryError::Json(_)
        )
    }
}

/// 查询结果类型
pub type QueryResult<T> = Result<T, QueryError>;
