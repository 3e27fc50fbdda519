use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BuildError {
    #[error("依存アーカイブが見つかりません: {0}")]
    DependencyNotFound(PathBuf),

    #[error("依存アーカイブが壊れています: {path}\n理由: {message}")]
    CorruptDependency { path: PathBuf, message: String },

    #[error("アーティファクトの書き込みに失敗しました: {0}")]
    ArchiveWrite(#[from] zip::result::ZipError),

    #[error("必須の設定キーがありません: {0}")]
    MissingConfig(String),

    #[error("イメージ記述子の生成に失敗しました: {0}")]
    TemplateRender(String),

    #[error("Dockerfile not found: {0}")]
    DockerfileNotFound(PathBuf),

    #[error("Build context directory not found: {0}")]
    ContextNotFound(PathBuf),

    #[error("Docker connection error: {0}")]
    DockerConnection(#[from] bollard::errors::Error),

    #[error("Build failed: {0}")]
    BuildFailed(String),

    #[error("Push failed: {message}")]
    PushFailed { message: String },

    #[error("Invalid tag: {tag}")]
    InvalidTag { tag: String },

    #[error("バージョンを解決できません: {0}")]
    Version(String),

    #[error(transparent)]
    Credential(#[from] shipflow_config::ConfigError),

    #[error(transparent)]
    Pipeline(#[from] shipflow_core::PipelineError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl BuildError {
    /// ユーザー向けの分かりやすいエラーメッセージ
    pub fn user_message(&self) -> String {
        match self {
            BuildError::DependencyNotFound(path) => {
                format!(
                    "依存アーカイブが見つかりません: {}\n\
                     \n\
                     解決方法:\n\
                     1. 依存関係の解決（ダウンロード）が完了しているか確認してください\n\
                     2. shipflow.toml の artifact.dependencies のパスを確認してください",
                    path.display()
                )
            }
            BuildError::MissingConfig(key) => {
                format!(
                    "必須の設定キーがありません: {}\n\
                     \n\
                     shipflow.toml に設定するか、shipflow.local.toml で上書きしてください。",
                    key
                )
            }
            BuildError::BuildFailed(msg) => {
                format!(
                    "ビルドに失敗しました: {}\n\
                     \n\
                     生成された Dockerfile の内容を確認してください。",
                    msg
                )
            }
            BuildError::DockerConnection(e) => {
                format!(
                    "Dockerに接続できません: {}\n\
                     \n\
                     ヒント:\n  • Dockerが起動しているか確認してください\n  • docker ps コマンドが正常に動作するか確認してください",
                    e
                )
            }
            BuildError::Version(msg) => {
                format!(
                    "バージョンを解決できません: {}\n\
                     \n\
                     git リポジトリ内で実行するか、docker.version で明示的に指定してください。",
                    msg
                )
            }
            _ => format!("{}", self),
        }
    }
}

pub type Result<T> = std::result::Result<T, BuildError>;
pub type BuildResult<T> = Result<T>;
