use std::collections::BTreeSet;

use digest_scheduler_core::TaskGroupConfig;
use serde::{Deserialize, Serialize};

/// 任务组：按标签交集自动归属成员的并发桶
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: String,
    pub name: String,
    pub max_concurrency: usize,
    pub tags: BTreeSet<String>,
    pub members: BTreeSet<String>,
}

impl TaskGroup {
    pub fn new(id: &str, name: &str, max_concurrency: usize, tags: &[&str]) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            max_concurrency,
            tags: tags.iter().map(|t| t.to_string()).collect(),
            members: BTreeSet::new(),
        }
    }

    pub fn matches(&self, task_tags: &[String]) -> bool {
        task_tags.iter().any(|tag| self.tags.contains(tag))
    }

    pub fn add_member(&mut self, task_id: &str) -> bool {
        self.members.insert(task_id.to_string())
    }

    pub fn remove_member(&mut self, task_id: &str) -> bool {
        self.members.remove(task_id)
    }

    pub fn contains(&self, task_id: &str) -> bool {
        self.members.contains(task_id)
    }
}

impl From<&TaskGroupConfig> for TaskGroup {
    fn from(config: &TaskGroupConfig) -> Self {
        Self {
            id: config.id.clone(),
            name: config.name.clone(),
            max_concurrency: config.max_concurrency,
            tags: config.tags.iter().cloned().collect(),
            members: BTreeSet::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GroupStats {
    pub id: String,
    pub name: String,
    pub max_concurrency: usize,
    pub total_tasks: usize,
    pub running_tasks: usize,
    pub enabled_tasks: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_membership_by_tag_intersection() {
        let group = TaskGroup::new("news", "News", 2, &["rss", "news"]);
        assert!(group.matches(&["rss".to_string(), "other".to_string()]));
        assert!(!group.matches(&["email".to_string()]));
        assert!(!group.matches(&[]));
    }

    #[test]
    fn test_from_config() {
        let config = TaskGroupConfig::new("analysis", "Analysis", 1, &["ai"]);
        let mut group = TaskGroup::from(&config);
        assert_eq!(group.max_concurrency, 1);
        assert!(group.add_member("t1"));
        assert!(!group.add_member("t1"));
        assert!(group.contains("t1"));
        assert!(group.remove_member("t1"));
        assert!(group.members.is_empty());
    }
}
