//! bars-collector 的核心领域层。
//!
//! 只包含实体、错误与端口 (Trait) 定义，不依赖任何具体的网络或数据库实现。
//! 具体实现位于 `collector-feed` (数据源) 与 `collector-store` (存储) 中，
//! 由 `collector-pipeline` 编排。

pub mod common;
pub mod config;
pub mod market;
pub mod store;

#[cfg(feature = "test-utils")]
pub mod testing;
