//! CLI 命令行参数解析
//!
//! 使用 clap 定义命令行接口并进行参数解析

use clap::{Parser, Subcommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Genus - 容量预算注册表的场景运行与压力测试工具
#[derive(Parser, Debug, Clone)]
#[command(
    name = "genus",
    about = "Capacity budget registry: scenario runner and stress harness",
    version,
    disable_help_subcommand = true
)]
pub struct Cli {
    /// 日志级别 (trace, debug, info, warn, error)，默认读取 GENUS_LOG / RUST_LOG
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// 额外写入的日志文件
    #[arg(long, global = true, value_name = "PATH")]
    pub log_file: Option<PathBuf>,

    /// 注册表配置文件 (TOML/JSON/YAML)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Commands {
    /// 运行生命周期场景（默认全部）
    Scenario {
        /// 场景名称，或 all
        #[arg(default_value = "all")]
        name: String,
        /// 以 JSON 输出报告
        #[arg(long)]
        json: bool,
    },

    /// 并发竞争剩余容量
    Stress {
        /// 预先占用容量的进程数
        #[arg(long, default_value_t = 7)]
        prefill: usize,
        /// 每个预占进程申请的容量
        #[arg(long, default_value_t = 10)]
        prefill_capacity: i64,
        /// 同时竞争的进程数
        #[arg(long, default_value_t = 10)]
        contenders: usize,
        /// 每个竞争进程申请的容量
        #[arg(long, default_value_t = 5)]
        capacity: i64,
        /// 以 JSON 输出结果
        #[arg(long)]
        json: bool,
    },

    /// 打印生效的配置
    Config,

    /// 列出可用场景
    List,
}

impl Cli {
    /// 尝试解析命令行参数（用于测试或自定义 argv）
    pub fn try_parse_cli_from<I, T>(iter: I) -> Result<Cli, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        Cli::try_parse_from(iter)
    }
}
