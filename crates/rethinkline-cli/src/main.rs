use clap::{Parser, Subcommand};
use rethinkline_cli::{Cli, Config};
use rethinkline_common::config::AdapterConfig;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "rethinkline")]
#[command(version)]
#[command(about = "Rethinkline - compile query descriptors into document-store plans")]
struct Args {
    /// TOML 配置文件
    #[arg(short, long, env = "RETHINKLINE_CONFIG")]
    config: Option<PathBuf>,

    /// 覆盖配置中的日志级别
    #[arg(long)]
    log_level: Option<String>,

    /// 输出格式: json, json-pretty, table, line
    #[arg(long)]
    format: Option<String>,

    #[arg(long)]
    no_color: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 编译描述符并打印查询计划
    Compile {
        /// 描述符文件、内联 JSON 或 `-`(标准输入)
        input: String,

        #[arg(short, long, default_value = "documents")]
        table: String,

        #[arg(long)]
        primary_key: Option<String>,

        /// 以 JSON 输出计划
        #[arg(long)]
        json: bool,
    },

    /// 在 JSON 夹具数据上执行描述符
    Run {
        input: String,

        /// 形如 {"table": [rows]} 的 JSON 文件
        #[arg(long)]
        fixtures: PathBuf,

        #[arg(short, long)]
        table: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let adapter = match &args.config {
        Some(path) => AdapterConfig::from_file(path)?,
        None => AdapterConfig::default(),
    };

    let level = args.log_level.clone().unwrap_or_else(|| adapter.log.level.clone());
    rethinkline_core::init_logging(&level);

    // compile 默认输出计划树, run 默认输出 JSON
    let format = match (&args.command, &args.format) {
        (Command::Compile { json: true, .. }, _) => "json-pretty".to_string(),
        (_, Some(format)) => format.clone(),
        (Command::Compile { .. }, None) => "table".to_string(),
        (Command::Run { .. }, None) => "json-pretty".to_string(),
    };

    let cli = Cli::new(Config {
        adapter,
        format,
        color: !args.no_color,
    });

    let output = match &args.command {
        Command::Compile {
            input,
            table,
            primary_key,
            ..
        } => cli
            .compile(input, table, primary_key.as_deref())
            .and_then(|plan| Ok(cli.formatter().render_plan(&plan)?)),
        Command::Run {
            input,
            fixtures,
            table,
        } => cli
            .run(input, fixtures, table)
            .await
            .and_then(|rows| Ok(cli.formatter().render_rows(&rows)?)),
    };

    match output {
        Ok(text) => {
            println!("{}", text);
            Ok(())
        }
        Err(e) => {
            cli.formatter().print_error(&e.to_string());
            std::process::exit(1);
        }
    }
}
