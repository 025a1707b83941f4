use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// 一次完整执行序列（含重试）的不可变记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryEntry {
    pub id: Uuid,
    pub task_id: String,
    pub task_name: String,
    pub success: bool,
    pub execution_time_ms: u64,
    pub attempts: u32,
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl HistoryEntry {
    pub fn new(
        task_id: &str,
        task_name: &str,
        success: bool,
        execution_time_ms: u64,
        attempts: u32,
        error: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_id: task_id.to_string(),
            task_name: task_name.to_string(),
            success,
            execution_time_ms,
            attempts,
            error,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryQuery {
    pub task_id: Option<String>,
    pub success: Option<bool>,
    pub since: Option<DateTime<Utc>>,
    /// 从1开始
    pub page: usize,
    pub page_size: usize,
}

impl HistoryQuery {
    pub fn for_task(task_id: &str) -> Self {
        Self {
            task_id: Some(task_id.to_string()),
            ..Default::default()
        }
    }

    fn matches(&self, entry: &HistoryEntry) -> bool {
        if let Some(task_id) = &self.task_id {
            if &entry.task_id != task_id {
                return false;
            }
        }
        if let Some(success) = self.success {
            if entry.success != success {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pagination {
    pub page: usize,
    pub page_size: usize,
    pub total: usize,
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryPage {
    pub data: Vec<HistoryEntry>,
    pub pagination: Pagination,
}

/// 有界历史环形缓冲，超出容量时淘汰最早的记录
#[derive(Debug, Clone)]
pub struct HistoryBuffer {
    entries: VecDeque<HistoryEntry>,
    max_size: usize,
}

impl HistoryBuffer {
    pub const DEFAULT_PAGE_SIZE: usize = 50;

    pub fn new(max_size: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(max_size.min(1024)),
            max_size: max_size.max(1),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push_back(entry);
        while self.entries.len() > self.max_size {
            self.entries.pop_front();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// 删除早于 `cutoff` 的记录，返回删除条数
    pub fn prune_older_than(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.timestamp >= cutoff);
        before - self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryEntry> {
        self.entries.iter()
    }

    /// 按条件分页查询，最新的记录在前
    pub fn query(&self, query: &HistoryQuery) -> HistoryPage {
        let page_size = if query.page_size == 0 {
            Self::DEFAULT_PAGE_SIZE
        } else {
            query.page_size
        };
        let page = query.page.max(1);

        let matching: Vec<&HistoryEntry> = self
            .entries
            .iter()
            .rev()
            .filter(|entry| query.matches(entry))
            .collect();
        let total = matching.len();

        let data = matching
            .into_iter()
            .skip((page - 1) * page_size)
            .take(page_size)
            .cloned()
            .collect();

        HistoryPage {
            data,
            pagination: Pagination {
                page,
                page_size,
                total,
                total_pages: total.div_ceil(page_size),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn entry(task_id: &str, success: bool) -> HistoryEntry {
        HistoryEntry::new(task_id, task_id, success, 10, 1, None)
    }

    #[test]
    fn test_bounded_evicts_oldest() {
        let mut buffer = HistoryBuffer::new(3);
        for i in 0..5 {
            buffer.push(entry(&format!("t{i}"), true));
        }

        assert_eq!(buffer.len(), 3);
        let ids: Vec<&str> = buffer.iter().map(|e| e.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t3", "t4"]);
    }

    #[test]
    fn test_prune_older_than() {
        let mut buffer = HistoryBuffer::new(10);
        let mut old = entry("old", true);
        old.timestamp = Utc::now() - Duration::days(8);
        buffer.push(old);
        buffer.push(entry("fresh", true));

        let removed = buffer.prune_older_than(Utc::now() - Duration::days(7));
        assert_eq!(removed, 1);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.iter().next().unwrap().task_id, "fresh");
    }

    #[test]
    fn test_query_newest_first_with_pagination() {
        let mut buffer = HistoryBuffer::new(100);
        for i in 0..5 {
            buffer.push(entry(&format!("t{i}"), i % 2 == 0));
        }

        let page = buffer.query(&HistoryQuery {
            page: 1,
            page_size: 2,
            ..Default::default()
        });
        assert_eq!(page.data.len(), 2);
        assert_eq!(page.data[0].task_id, "t4");
        assert_eq!(page.pagination.total, 5);
        assert_eq!(page.pagination.total_pages, 3);

        let last = buffer.query(&HistoryQuery {
            page: 3,
            page_size: 2,
            ..Default::default()
        });
        assert_eq!(last.data.len(), 1);
        assert_eq!(last.data[0].task_id, "t0");
    }

    #[test]
    fn test_query_filters() {
        let mut buffer = HistoryBuffer::new(100);
        buffer.push(entry("a", true));
        buffer.push(entry("b", false));
        buffer.push(entry("a", false));

        let page = buffer.query(&HistoryQuery::for_task("a"));
        assert_eq!(page.pagination.total, 2);
        assert_eq!(page.pagination.page_size, HistoryBuffer::DEFAULT_PAGE_SIZE);

        let failures = buffer.query(&HistoryQuery {
            success: Some(false),
            ..Default::default()
        });
        assert_eq!(failures.pagination.total, 2);
    }
}
