use crate::formatter::Formatter;
use crate::{CliError, CliResult, Config};
use rethinkline_core::{CompilerOptions, Connection, QueryCompiler, QueryDescriptor, Tables, Term};
use serde_json::Value;
use std::fs;
use std::io::Read;
use std::path::Path;
use tracing::debug;

pub struct Cli {
    config: Config,
    formatter: Formatter,
}

impl Cli {
    pub fn new(config: Config) -> Self {
        let formatter = Formatter::new(&config.format, config.color);
        Self { config, formatter }
    }

    pub fn formatter(&self) -> &Formatter {
        &self.formatter
    }

    /// # Brief
    /// 读取描述符
    ///
    /// # Arguments
    /// * `input` - `-` 表示标准输入,以 `{` 开头视为内联 JSON,否则视为文件路径
    pub fn read_descriptor(input: &str) -> CliResult<QueryDescriptor> {
        let text = if input == "-" {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        } else if input.trim_start().starts_with('{') {
            input.to_string()
        } else {
            fs::read_to_string(input)?
        };
        Ok(text.parse::<QueryDescriptor>()?)
    }

    /// # Brief
    /// 编译描述符为查询计划,不执行
    ///
    /// # Arguments
    /// * `input` - 描述符来源
    /// * `table` - 计划起点的表名
    /// * `primary_key` - 覆盖配置中的主键字段
    pub fn compile(&self, input: &str, table: &str, primary_key: Option<&str>) -> CliResult<Term> {
        let descriptor = Self::read_descriptor(input)?;
        let mut options = CompilerOptions::from(&self.config.adapter.compiler);
        if let Some(pk) = primary_key {
            options.primary_key = pk.to_string();
        }
        let handle = Term::table(table);
        let plan = QueryCompiler::with_options(&handle, options).compile(&descriptor)?;
        debug!("Compiled plan: {}", plan.to_reql());
        Ok(plan)
    }

    /// # Brief
    /// 在夹具数据上执行描述符
    ///
    /// # Arguments
    /// * `input` - 描述符来源
    /// * `fixtures` - JSON 文件,形如 `{"table": [rows]}`
    /// * `table` - 查询的表名
    ///
    /// # Returns
    /// 匹配的行,已附带关联字段
    pub async fn run(&self, input: &str, fixtures: &Path, table: &str) -> CliResult<Vec<Value>> {
        let descriptor = Self::read_descriptor(input)?;
        let data = load_fixtures(fixtures)?;

        let conn = Connection::from_config(&self.config.adapter).await?;
        conn.load(data)?;
        let rows = conn.table(table)?.find(&descriptor).await?;
        conn.close().await?;
        Ok(rows)
    }
}

fn load_fixtures(path: &Path) -> CliResult<Tables> {
    let content = fs::read_to_string(path)?;
    match serde_json::from_str::<Value>(&content)? {
        Value::Object(map) => map
            .into_iter()
            .map(|(name, rows)| match rows {
                Value::Array(rows) => Ok((name, rows)),
                other => Err(CliError::Other(format!(
                    "fixture table `{}` must be an array, got {}",
                    name, other
                ))),
            })
            .collect(),
        _ => Err(CliError::Other(
            "fixtures must be an object of table name to rows".to_string(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::io::Write;

    fn cli() -> Cli {
        Cli::new(Config {
            color: false,
            ..Config::default()
        })
    }

    fn fixtures() -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        let data = json!({
            "users": [
                {"id": 1, "name": "miku", "age": 16},
                {"id": 2, "name": "rin", "age": 14},
                {"id": 3, "name": "luka", "age": 20}
            ],
            "pets": [
                {"id": 10, "ownerId": 1, "kind": "leek"},
                {"id": 11, "ownerId": 1, "kind": "cat"}
            ]
        });
        write!(file, "{}", data).unwrap();
        file
    }

    #[test]
    fn test_compile_inline() {
        let plan = cli()
            .compile(r#"{"where": {"age": {">": 15}}, "limit": 1}"#, "users", None)
            .unwrap();
        assert_eq!(
            plan.to_reql(),
            r#"r.table("users").filter(r.row("age").gt(15)).limit(1)"#
        );
    }

    #[test]
    fn test_compile_primary_key_override() {
        let plan = cli().compile(r#"{"where": {"uid": 7}}"#, "users", Some("uid")).unwrap();
        assert_eq!(plan.to_reql(), r#"r.table("users").getAll(7, {index: "uid"})"#);
    }

    #[test]
    fn test_compile_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"sort": "name DESC"}}"#).unwrap();
        let path = file.path().to_string_lossy().to_string();
        let plan = cli().compile(&path, "users", None).unwrap();
        assert_eq!(plan.to_reql(), r#"r.table("users").orderBy(r.desc("name"))"#);
    }

    #[test]
    fn test_compile_error() {
        let err = cli().compile(r#"{"where": {"a": {"~=": 1}}}"#, "users", None).unwrap_err();
        assert!(matches!(err, CliError::Query(_)));
    }

    #[tokio::test]
    async fn test_run_against_fixtures() {
        let file = fixtures();
        let rows = cli()
            .run(
                r#"{"where": {"age": {">=": 16}}, "sort": {"age": 0},
                    "joins": [{"alias": "pets", "collection": true, "child": "pets", "childKey": "ownerId"}]}"#,
                file.path(),
                "users",
            )
            .await
            .unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0]["name"], "luka");
        assert_eq!(rows[1]["pets"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_run_unknown_table() {
        let file = fixtures();
        let err = cli().run("{}", file.path(), "ghosts").await.unwrap_err();
        assert!(matches!(err, CliError::Store(_)));
    }
}
