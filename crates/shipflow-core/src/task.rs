//! タスクの定義

use crate::fingerprint;
use async_trait::async_trait;
use std::fmt;
use std::path::PathBuf;

/// パイプライン内のタスクの状態
///
/// `Pending → Running → {Succeeded, Failed}`、または `Pending → Skipped`。
/// 依存先が失敗した場合は実行せずに `Pending → Failed`。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Succeeded,
    Failed,
    Skipped,
}

impl TaskState {
    /// 依存元のタスクを開始してよい状態か
    pub fn satisfies_dependents(self) -> bool {
        matches!(self, TaskState::Succeeded | TaskState::Skipped)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskState::Pending => write!(f, "PENDING"),
            TaskState::Running => write!(f, "RUNNING"),
            TaskState::Succeeded => write!(f, "SUCCEEDED"),
            TaskState::Failed => write!(f, "FAILED"),
            TaskState::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// パイプラインの作業単位
///
/// 依存関係は `TaskGraph` への登録時に宣言する。
#[async_trait]
pub trait Task: Send + Sync {
    /// グラフ内で一意な名前
    fn name(&self) -> &str;

    fn description(&self) -> &str {
        ""
    }

    /// 最新判定に使う入力ファイル
    fn inputs(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// 最新判定に使う出力ファイル
    fn outputs(&self) -> Vec<PathBuf> {
        Vec::new()
    }

    /// 出力が入力より古くなければ true（実行をスキップできる）
    async fn is_up_to_date(&self) -> anyhow::Result<bool> {
        Ok(fingerprint::outputs_up_to_date(
            &self.inputs(),
            &self.outputs(),
        )?)
    }

    async fn execute(&self) -> anyhow::Result<()>;
}
