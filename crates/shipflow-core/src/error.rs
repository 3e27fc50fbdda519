use thiserror::Error;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("タスクが見つかりません: {0}")]
    TaskNotFound(String),

    #[error("タスク '{0}' は既に登録されています")]
    DuplicateTask(String),

    #[error("タスク '{task}' が未登録のタスク '{dependency}' に依存しています")]
    UnknownDependency { task: String, dependency: String },

    #[error("循環依存が検出されました: {0}")]
    CircularDependency(String),

    #[error("実行対象のタスクが指定されていません")]
    NoTargets,
}

pub type Result<T> = std::result::Result<T, PipelineError>;
