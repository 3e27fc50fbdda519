//! タスクの依存グラフ（DAG）

use crate::error::{PipelineError, Result};
use crate::task::Task;
use std::collections::HashMap;
use std::sync::Arc;

/// グラフに登録されたタスクと、その依存先
pub struct TaskNode {
    pub task: Arc<dyn Task>,
    pub dependencies: Vec<String>,
}

/// 明示的に構築するタスクグラフ
///
/// 依存先は前方参照でもよい。未登録の依存先と循環は
/// `validate` / `execution_plan` で検出する。
#[derive(Default)]
pub struct TaskGraph {
    nodes: Vec<TaskNode>,
    index: HashMap<String, usize>,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// タスクを依存先とともに登録
    pub fn add<T: Task + 'static>(&mut self, task: T, dependencies: &[&str]) -> Result<()> {
        self.add_arc(Arc::new(task), dependencies)
    }

    pub fn add_arc(&mut self, task: Arc<dyn Task>, dependencies: &[&str]) -> Result<()> {
        let name = task.name().to_string();
        if self.index.contains_key(&name) {
            return Err(PipelineError::DuplicateTask(name));
        }

        tracing::debug!(task = %name, ?dependencies, "Registering task");

        self.index.insert(name, self.nodes.len());
        self.nodes.push(TaskNode {
            task,
            dependencies: dependencies.iter().map(|d| d.to_string()).collect(),
        });
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&TaskNode> {
        self.index.get(name).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// 登録順のノード一覧
    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.iter()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// グラフ全体を検証（未登録の依存先・循環）
    pub fn validate(&self) -> Result<()> {
        let names: Vec<&str> = self.nodes.iter().map(|n| n.task.name()).collect();
        if names.is_empty() {
            return Ok(());
        }
        self.execution_plan(&names).map(|_| ())
    }

    /// 対象タスクの依存閉包をトポロジカル順に並べる
    ///
    /// 依存先は宣言順に辿るので、結果は常に同じ順序になる。
    pub fn execution_plan(&self, targets: &[&str]) -> Result<Vec<String>> {
        if targets.is_empty() {
            return Err(PipelineError::NoTargets);
        }

        let mut marks: HashMap<&str, Mark> = HashMap::new();
        let mut order: Vec<String> = Vec::new();
        let mut path: Vec<&str> = Vec::new();

        for target in targets {
            if !self.contains(target) {
                return Err(PipelineError::TaskNotFound(target.to_string()));
            }
            self.visit(target, &mut marks, &mut path, &mut order)?;
        }

        Ok(order)
    }

    fn visit<'a>(
        &'a self,
        name: &'a str,
        marks: &mut HashMap<&'a str, Mark>,
        path: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<()> {
        match marks.get(name) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| *n == name).unwrap_or(0);
                let mut cycle: Vec<&str> = path[start..].to_vec();
                cycle.push(name);
                return Err(PipelineError::CircularDependency(cycle.join(" -> ")));
            }
            None => {}
        }

        let node = self
            .get(name)
            .ok_or_else(|| PipelineError::TaskNotFound(name.to_string()))?;

        marks.insert(name, Mark::Visiting);
        path.push(name);

        for dependency in &node.dependencies {
            if !self.contains(dependency) {
                return Err(PipelineError::UnknownDependency {
                    task: name.to_string(),
                    dependency: dependency.clone(),
                });
            }
            self.visit(dependency.as_str(), marks, path, order)?;
        }

        path.pop();
        marks.insert(name, Mark::Done);
        order.push(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    struct Noop(&'static str);

    #[async_trait]
    impl Task for Noop {
        fn name(&self) -> &str {
            self.0
        }

        async fn execute(&self) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn release_chain() -> TaskGraph {
        let mut graph = TaskGraph::new();
        graph.add(Noop("assemble"), &[]).unwrap();
        graph.add(Noop("dockerfile"), &["assemble"]).unwrap();
        graph.add(Noop("build"), &["dockerfile"]).unwrap();
        graph.add(Noop("push"), &["build"]).unwrap();
        graph
    }

    #[test]
    fn test_plan_is_topological() {
        let graph = release_chain();
        let plan = graph.execution_plan(&["push"]).unwrap();
        assert_eq!(plan, vec!["assemble", "dockerfile", "build", "push"]);
    }

    #[test]
    fn test_plan_only_includes_closure() {
        let graph = release_chain();
        let plan = graph.execution_plan(&["dockerfile"]).unwrap();
        assert_eq!(plan, vec!["assemble", "dockerfile"]);
    }

    #[test]
    fn test_shared_dependency_planned_once() {
        let mut graph = TaskGraph::new();
        graph.add(Noop("a"), &[]).unwrap();
        graph.add(Noop("b"), &["a"]).unwrap();
        graph.add(Noop("c"), &["a"]).unwrap();
        graph.add(Noop("d"), &["b", "c"]).unwrap();

        let plan = graph.execution_plan(&["d"]).unwrap();
        assert_eq!(plan, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_duplicate_task() {
        let mut graph = TaskGraph::new();
        graph.add(Noop("a"), &[]).unwrap();
        assert!(matches!(
            graph.add(Noop("a"), &[]),
            Err(PipelineError::DuplicateTask(name)) if name == "a"
        ));
    }

    #[test]
    fn test_unknown_dependency() {
        let mut graph = TaskGraph::new();
        graph.add(Noop("a"), &["ghost"]).unwrap();
        assert!(matches!(
            graph.validate(),
            Err(PipelineError::UnknownDependency { dependency, .. }) if dependency == "ghost"
        ));
    }

    #[test]
    fn test_cycle_detected() {
        let mut graph = TaskGraph::new();
        graph.add(Noop("a"), &["c"]).unwrap();
        graph.add(Noop("b"), &["a"]).unwrap();
        graph.add(Noop("c"), &["b"]).unwrap();

        match graph.execution_plan(&["a"]) {
            Err(PipelineError::CircularDependency(cycle)) => {
                assert_eq!(cycle, "a -> c -> b -> a");
            }
            other => panic!("Expected CircularDependency, got {:?}", other),
        }
    }

    #[test]
    fn test_unknown_target() {
        let graph = release_chain();
        assert!(matches!(
            graph.execution_plan(&["deploy"]),
            Err(PipelineError::TaskNotFound(_))
        ));
        assert!(matches!(
            graph.execution_plan(&[]),
            Err(PipelineError::NoTargets)
        ));
    }
}
