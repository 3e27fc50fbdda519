use std::path::PathBuf;
use thiserror::Error;

use crate::credentials::CredentialField;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error(
        "設定ファイルが見つかりません。以下の場所を確認してください:\n\
        - カレントディレクトリ: shipflow.toml, .shipflow.toml\n\
        - ./.shipflow/ ディレクトリ\n\
        - ~/.config/shipflow/shipflow.toml\n\
        または SHIPFLOW_CONFIG_PATH 環境変数で直接指定できます"
    )]
    ConfigFileNotFound,

    #[error("設定ファイルの解析に失敗しました: {path}\n理由: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("無効なプロパティ指定です（KEY=VALUE 形式で指定してください）: {0}")]
    InvalidProperty(String),

    #[error(
        "レジストリ認証情報 '{field}' が解決できません\n\n\
        ヒント:\n  • 環境変数 {env_var} を設定してください\n  • またはプロパティ {property} を設定してください (-P {property}=...)"
    )]
    MissingCredential {
        field: CredentialField,
        env_var: String,
        property: String,
    },

    #[error("不明な認証情報フィールドです: {0}（url, username, password のいずれか）")]
    UnknownCredentialField(String),

    #[error("IO エラー: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
