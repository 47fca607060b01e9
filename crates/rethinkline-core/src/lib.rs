//! Rethinkline 核心模块
//!
//! 在查询编译器之上提供文档存储适配层:
//! - Connection: 数据库连接与表管理
//! - Table: 异步 CRUD (create / create_each / find / update / destroy / count / join)
//! - DocumentStore: 内存文档存储,作为查询计划的执行方
//!
//! # 快速开始
//!
//! ```rust,ignore
//! use rethinkline_core::{Connection, QueryDescriptor};
//!
//! let conn = Connection::from_config(&AdapterConfig::default()).await?;
//! let users = conn.create_table("users").await?;
//! users.create(json!({"name": "miku", "age": 16})).await?;
//!
//! let adults: QueryDescriptor = r#"{"where": {"age": {">=": 18}}}"#.parse()?;
//! let rows = users.find(&adults).await?;
//! ```

pub mod connection;
pub mod store;
pub mod table;

pub use rethinkline_common as common;
pub use rethinkline_query as query;

pub use common::config::{AdapterConfig, CompilerConfig, ConnectionConfig, LogConfig};
pub use common::{RethinkError, RethinkResult};
pub use connection::Connection;
pub use query::{CompilerOptions, QueryCompiler, QueryDescriptor, QueryError, QueryExecutor, Term};
pub use store::{DocumentStore, Tables};
pub use table::Table;

use thiserror::Error;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// 适配层错误
///
/// 编译错误与存储错误都原样保留,调用方可区分描述符问题与执行问题。
#[derive(Error, Debug)]
pub enum AdapterError {
    #[error(transparent)]
    Common(#[from] RethinkError),

    #[error(transparent)]
    Query(#[from] QueryError),
}

impl AdapterError {
    /// 描述符本身不合法
    pub fn is_compile_error(&self) -> bool {
        matches!(self, AdapterError::Query(e) if e.is_compile_error())
    }
}

pub type AdapterResult<T> = Result<T, AdapterError>;

/// 初始化日志
///
/// `RUST_LOG` 环境变量优先于传入的级别。
pub fn init_logging(level: &str) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .init();
}
