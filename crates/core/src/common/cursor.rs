use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// # Summary
/// 向后翻页游标，表示“获取严格早于该时间点的 K 线”。
///
/// # Invariants
/// - `Latest` 比任何 `Before(ts)` 都新。
/// - 一次运行中游标只能严格向过去移动。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cursor {
    // 无上界，从最新数据开始
    #[default]
    Latest,
    // 严格早于该毫秒时间戳
    Before(i64),
}

impl Cursor {
    /// 游标对应的上界时间戳，`Latest` 无上界。
    pub fn upper_bound(&self) -> Option<i64> {
        match self {
            Cursor::Latest => None,
            Cursor::Before(ts) => Some(*ts),
        }
    }

    /// `next` 是否严格早于 `self`。
    pub fn is_advanced_by(&self, next: &Cursor) -> bool {
        next < self
    }
}

impl Ord for Cursor {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Cursor::Latest, Cursor::Latest) => Ordering::Equal,
            (Cursor::Latest, Cursor::Before(_)) => Ordering::Greater,
            (Cursor::Before(_), Cursor::Latest) => Ordering::Less,
            (Cursor::Before(a), Cursor::Before(b)) => a.cmp(b),
        }
    }
}

impl PartialOrd for Cursor {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl std::fmt::Display for Cursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cursor::Latest => write!(f, "latest"),
            Cursor::Before(ts) => write!(f, "before:{}", ts),
        }
    }
}
