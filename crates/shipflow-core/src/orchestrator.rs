//! タスクグラフの実行
//!
//! 依存閉包をトポロジカル順に一つずつ実行する。最初の失敗で以降のタスクは
//! 開始せず、失敗したタスクに依存するものはアクションを実行せずに `Failed` にする。

use crate::error::Result;
use crate::graph::TaskGraph;
use crate::task::TaskState;
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, Instant};

/// 実行オプション
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// 最新判定を無視してすべて実行する
    pub rerun: bool,
}

/// 状態遷移の通知先（進捗表示用）
pub trait PipelineObserver: Send + Sync {
    fn on_transition(&self, _task: &str, _state: TaskState) {}

    fn on_finished(&self, _outcome: &TaskOutcome) {}
}

/// 1タスク分の実行結果
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub name: String,
    pub state: TaskState,
    pub duration: Duration,
    /// アクションを実行したか（スキップ・巻き込み失敗・未開始は false）
    pub executed: bool,
    /// 失敗理由（エラーチェーンを含む）
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStatus {
    Succeeded,
    Failed,
}

impl fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineStatus::Succeeded => write!(f, "SUCCEEDED"),
            PipelineStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// パイプライン全体の実行結果（実行計画の順）
#[derive(Debug, Clone, Default)]
pub struct PipelineReport {
    pub outcomes: Vec<TaskOutcome>,
}

impl PipelineReport {
    pub fn status(&self) -> PipelineStatus {
        if self.outcomes.iter().any(|o| o.state == TaskState::Failed) {
            PipelineStatus::Failed
        } else {
            PipelineStatus::Succeeded
        }
    }

    pub fn is_success(&self) -> bool {
        self.status() == PipelineStatus::Succeeded
    }

    pub fn outcome(&self, name: &str) -> Option<&TaskOutcome> {
        self.outcomes.iter().find(|o| o.name == name)
    }

    pub fn state_of(&self, name: &str) -> Option<TaskState> {
        self.outcome(name).map(|o| o.state)
    }

    /// 最初に失敗したタスク（依存先の失敗で巻き込まれたものは除く）
    pub fn failed_task(&self) -> Option<&TaskOutcome> {
        self.outcomes
            .iter()
            .find(|o| o.state == TaskState::Failed && o.executed)
            .or_else(|| self.outcomes.iter().find(|o| o.state == TaskState::Failed))
    }

    /// アクションを実行したタスク数
    pub fn executed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.executed)
            .count()
    }

    pub fn skipped_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| o.state == TaskState::Skipped)
            .count()
    }
}

/// タスクグラフを実行するオーケストレータ
pub struct Orchestrator<'a> {
    graph: &'a TaskGraph,
    options: RunOptions,
    observer: Option<&'a dyn PipelineObserver>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(graph: &'a TaskGraph) -> Self {
        Self {
            graph,
            options: RunOptions::default(),
            observer: None,
        }
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn PipelineObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// 対象タスクとその依存閉包を実行
    ///
    /// グラフの不備（未登録タスク・循環）は `Err`、タスクの失敗は
    /// `PipelineReport` に記録される。
    pub async fn run(&self, targets: &[&str]) -> Result<PipelineReport> {
        let plan = self.graph.execution_plan(targets)?;
        tracing::info!(?plan, "Starting pipeline");

        let mut states: HashMap<String, TaskState> = plan
            .iter()
            .map(|name| (name.clone(), TaskState::Pending))
            .collect();
        let mut report = PipelineReport::default();
        let mut halted = false;

        for name in &plan {
            let Some(node) = self.graph.get(name) else {
                continue;
            };

            // 依存先が失敗していればアクションを実行せずに失敗
            if let Some(failed) = node
                .dependencies
                .iter()
                .find(|d| states.get(d.as_str()) == Some(&TaskState::Failed))
            {
                tracing::warn!(task = %name, dependency = %failed, "Dependency failed, not executing");
                let outcome = TaskOutcome {
                    name: name.clone(),
                    state: TaskState::Failed,
                    duration: Duration::ZERO,
                    executed: false,
                    error: Some(format!("依存タスク '{}' が失敗しました", failed)),
                };
                self.finish(&mut states, &mut report, outcome);
                continue;
            }

            let ready = node.dependencies.iter().all(|d| {
                states
                    .get(d.as_str())
                    .is_some_and(|state| state.satisfies_dependents())
            });

            // 失敗後は次のタスクを開始しない
            if halted || !ready {
                report.outcomes.push(TaskOutcome {
                    name: name.clone(),
                    state: TaskState::Pending,
                    duration: Duration::ZERO,
                    executed: false,
                    error: None,
                });
                continue;
            }

            if !self.options.rerun {
                match node.task.is_up_to_date().await {
                    Ok(true) => {
                        tracing::info!(task = %name, "Up to date, skipping");
                        let outcome = TaskOutcome {
                            name: name.clone(),
                            state: TaskState::Skipped,
                            duration: Duration::ZERO,
                            executed: false,
                            error: None,
                        };
                        self.finish(&mut states, &mut report, outcome);
                        continue;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::warn!(task = %name, "Up-to-date check failed, executing: {:#}", e);
                    }
                }
            }

            states.insert(name.clone(), TaskState::Running);
            self.notify(name, TaskState::Running);
            tracing::info!(task = %name, "Executing task");

            let started = Instant::now();
            let result = node.task.execute().await;
            let duration = started.elapsed();

            let outcome = match result {
                Ok(()) => {
                    tracing::info!(task = %name, elapsed_ms = duration.as_millis() as u64, "Task succeeded");
                    TaskOutcome {
                        name: name.clone(),
                        state: TaskState::Succeeded,
                        duration,
                        executed: true,
                        error: None,
                    }
                }
                Err(e) => {
                    tracing::error!(task = %name, "Task failed: {:#}", e);
                    halted = true;
                    TaskOutcome {
                        name: name.clone(),
                        state: TaskState::Failed,
                        duration,
                        executed: true,
                        error: Some(format!("{:#}", e)),
                    }
                }
            };
            self.finish(&mut states, &mut report, outcome);
        }

        tracing::info!(status = %report.status(), "Pipeline finished");
        Ok(report)
    }

    fn finish(
        &self,
        states: &mut HashMap<String, TaskState>,
        report: &mut PipelineReport,
        outcome: TaskOutcome,
    ) {
        states.insert(outcome.name.clone(), outcome.state);
        self.notify(&outcome.name, outcome.state);
        if let Some(observer) = self.observer {
            observer.on_finished(&outcome);
        }
        report.outcomes.push(outcome);
    }

    fn notify(&self, task: &str, state: TaskState) {
        if let Some(observer) = self.observer {
            observer.on_transition(task, state);
        }
    }
}
