//! 共享库
//!
//! 规则引擎与其调用方共用的配置加载和可观测性初始化代码。

pub mod config;
pub mod observability;
