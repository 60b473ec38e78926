//! 日志系统
//!
//! 提供统一的日志记录功能

use crate::config::LOG_LEVEL_ENV;
use anyhow::Result;
use std::path::PathBuf;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// 默认过滤规则：依赖库 info，本 crate debug
pub const DEFAULT_FILTER: &str = "info,genus=debug";

/// 构建日志过滤器
///
/// 优先使用参数指定的级别，其次是 `GENUS_LOG`，再次是 `RUST_LOG`，最后使用默认值。
pub fn build_filter(log_level: Option<&str>) -> Result<EnvFilter> {
    if let Some(level) = log_level {
        return Ok(EnvFilter::try_new(level)?);
    }
    if let Ok(filter) = EnvFilter::try_from_env(LOG_LEVEL_ENV) {
        return Ok(filter);
    }
    Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER)))
}

/// 初始化日志系统
///
/// # Arguments
/// * `log_level` - 日志级别 (trace, debug, info, warn, error)，如果为 None 则使用环境变量
/// * `log_file` - 日志文件路径，如果为 None 则只输出到标准错误
///
/// # Examples
/// ```no_run
/// use genus::utils::logger::init_logger;
///
/// // 使用默认配置（从环境变量读取）
/// init_logger(None, None).unwrap();
///
/// // 同时写入文件
/// use std::path::PathBuf;
/// init_logger(Some("debug"), Some(PathBuf::from("genus.log"))).unwrap();
/// ```
pub fn init_logger(log_level: Option<&str>, log_file: Option<PathBuf>) -> Result<()> {
    let env_filter = build_filter(log_level)?;

    // 标准错误输出层，标准输出留给命令结果
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_level(true)
        .compact();

    let registry = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer);

    if let Some(log_path) = log_file {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&log_path)?;

        let file_layer = fmt::layer()
            .with_writer(std::sync::Arc::new(file))
            .with_target(true)
            .with_ansi(false) // 文件中不使用 ANSI 颜色
            .with_level(true);

        registry.with(file_layer).try_init()?;
    } else {
        registry.try_init()?;
    }

    tracing::debug!("Logger initialized");
    Ok(())
}
