//! 摄取流水线。
//!
//! 每次运行针对一个序列：获取许可 → 抓取一页 → 幂等写入 → 推进游标，
//! 直到上游返回空页、遇到致命错误或收到关闭信号。

pub mod limiter;
pub mod pipeline;
pub mod retry;
pub mod shutdown;

pub use limiter::{LimiterError, Permit, RateLimiter};
pub use pipeline::{IngestionPipeline, PipelineError, RunOutcome, RunReport, Stage};
pub use retry::RetryPolicy;
pub use shutdown::{Shutdown, ShutdownTrigger, shutdown_channel};
