//! 核心数据模型模块
//!
//! 包含 genus 视图、注册表条目和进程状态等共享类型

pub mod models;
