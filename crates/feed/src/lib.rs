//! 上游分页数据源实现。

pub mod okx;
