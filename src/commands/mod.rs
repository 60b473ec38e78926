//! CLI 命令处理模块
//!
//! 处理所有命令行接口的解析和路由

pub mod parser;

// 重新导出（供 main.rs 使用）
pub use parser::*;
