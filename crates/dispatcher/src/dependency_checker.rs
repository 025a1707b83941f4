use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};

use digest_scheduler_core::{SchedulerError, SchedulerResult};
use digest_scheduler_domain::Task;

/// 依赖任务未满足执行条件的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockReason {
    Missing,
    Running,
    RecentlyFailed,
}

impl fmt::Display for BlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockReason::Missing => write!(f, "未注册"),
            BlockReason::Running => write!(f, "正在运行"),
            BlockReason::RecentlyFailed => write!(f, "最近执行失败"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DependencyCheckResult {
    pub can_execute: bool,
    pub blocking_dependencies: Vec<(String, BlockReason)>,
    pub reason: Option<String>,
}

/// 依赖关系检查
///
/// 执行前的健康检查基于任务注册表的快照；注册时的循环检测基于依赖图。
#[derive(Debug, Clone)]
pub struct DependencyChecker {
    failure_window: usize,
}

impl DependencyChecker {
    pub fn new(failure_window: usize) -> Self {
        Self {
            failure_window: failure_window.max(1),
        }
    }

    pub fn failure_window(&self) -> usize {
        self.failure_window
    }

    async fn check_single_dependency(&self, dependency: Option<&Arc<Task>>) -> Option<BlockReason> {
        let Some(dep) = dependency else {
            return Some(BlockReason::Missing);
        };
        if dep.is_running() {
            return Some(BlockReason::Running);
        }
        if dep.failed_recently(self.failure_window).await {
            return Some(BlockReason::RecentlyFailed);
        }
        None
    }

    pub async fn check_dependencies(
        &self,
        task: &Task,
        registry: &HashMap<String, Arc<Task>>,
    ) -> DependencyCheckResult {
        if task.dependencies().is_empty() {
            return DependencyCheckResult {
                can_execute: true,
                blocking_dependencies: Vec::new(),
                reason: None,
            };
        }

        debug!("检查任务 {} 的依赖关系", task.name());

        let mut blocking_dependencies = Vec::new();
        for dep_id in task.dependencies() {
            if let Some(reason) = self.check_single_dependency(registry.get(dep_id)).await {
                blocking_dependencies.push((dep_id.clone(), reason));
            }
        }

        let can_execute = blocking_dependencies.is_empty();
        let reason = if !can_execute {
            let details: Vec<String> = blocking_dependencies
                .iter()
                .map(|(id, reason)| format!("{id}({reason})"))
                .collect();
            Some(format!("以下依赖任务未满足执行条件: {}", details.join(", ")))
        } else {
            None
        };

        DependencyCheckResult {
            can_execute,
            blocking_dependencies,
            reason,
        }
    }

    /// 拒绝自依赖以及会在已注册任务间形成环的依赖
    pub fn validate_dependencies(
        &self,
        task_id: &str,
        dependencies: &[String],
        graph: &HashMap<String, Vec<String>>,
    ) -> SchedulerResult<()> {
        if dependencies.iter().any(|dep| dep == task_id) {
            return Err(SchedulerError::CircularDependency {
                task_id: task_id.to_string(),
            });
        }

        let mut graph = graph.clone();
        graph.insert(task_id.to_string(), dependencies.to_vec());
        if Self::topological_sort_cycle_detection(&graph) {
            warn!(
                "检测到循环依赖，任务ID: {}, 新依赖: {:?}",
                task_id, dependencies
            );
            return Err(SchedulerError::CircularDependency {
                task_id: task_id.to_string(),
            });
        }

        Ok(())
    }

    fn topological_sort_cycle_detection(graph: &HashMap<String, Vec<String>>) -> bool {
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        let mut queue = VecDeque::new();
        for node in graph.keys() {
            in_degree.entry(node.as_str()).or_insert(0);
        }

        for dependencies in graph.values() {
            for dep in dependencies {
                *in_degree.entry(dep.as_str()).or_insert(0) += 1;
            }
        }
        for (&node, &degree) in &in_degree {
            if degree == 0 {
                queue.push_back(node);
            }
        }

        let mut processed_count = 0;
        while let Some(node) = queue.pop_front() {
            processed_count += 1;

            if let Some(dependencies) = graph.get(node) {
                for dep in dependencies {
                    if let Some(degree) = in_degree.get_mut(dep.as_str()) {
                        *degree -= 1;
                        if *degree == 0 {
                            queue.push_back(dep.as_str());
                        }
                    }
                }
            }
        }
        processed_count < in_degree.len()
    }

    /// 广度优先收集传递依赖
    pub fn transitive_dependencies(
        task_id: &str,
        graph: &HashMap<String, Vec<String>>,
    ) -> Vec<String> {
        let mut visited = HashSet::new();
        let mut queue = VecDeque::new();
        let mut result = Vec::new();

        if let Some(deps) = graph.get(task_id) {
            for dep in deps {
                if visited.insert(dep.clone()) {
                    queue.push_back(dep.clone());
                }
            }
        }
        while let Some(current) = queue.pop_front() {
            if let Some(deps) = graph.get(&current) {
                for dep in deps {
                    if dep != task_id && visited.insert(dep.clone()) {
                        queue.push_back(dep.clone());
                    }
                }
            }
            result.push(current);
        }

        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(edges: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        edges
            .iter()
            .map(|(id, deps)| {
                (
                    id.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect()
    }

    #[test]
    fn test_self_dependency_rejected() {
        let checker = DependencyChecker::new(3);
        let result = checker.validate_dependencies("a", &["a".to_string()], &HashMap::new());
        assert!(matches!(result, Err(SchedulerError::CircularDependency { .. })));
    }

    #[test]
    fn test_cycle_rejected() {
        let checker = DependencyChecker::new(3);
        let existing = graph(&[("a", &["b"]), ("b", &["c"]), ("c", &[])]);
        assert!(checker
            .validate_dependencies("c", &["a".to_string()], &existing)
            .is_err());
        assert!(checker
            .validate_dependencies("d", &["a".to_string()], &existing)
            .is_ok());
    }

    #[test]
    fn test_unregistered_dependency_is_not_a_cycle() {
        let checker = DependencyChecker::new(3);
        let existing = graph(&[("a", &["ghost"])]);
        assert!(checker
            .validate_dependencies("b", &["a".to_string(), "ghost".to_string()], &existing)
            .is_ok());
    }

    #[test]
    fn test_transitive_dependencies() {
        let existing = graph(&[("d", &["c"]), ("c", &["b", "a"]), ("b", &["a"]), ("a", &[])]);
        let deps = DependencyChecker::transitive_dependencies("d", &existing);
        assert_eq!(deps, vec!["c", "b", "a"]);
    }
}
