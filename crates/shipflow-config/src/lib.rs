pub mod credentials;
pub mod error;
pub mod model;

pub use credentials::{
    CredentialField, CredentialNames, CredentialResolver, CredentialSource, RegistryCredentials,
};
pub use error::*;
pub use model::{ArtifactConfig, DockerConfig, PipelineConfig, ProjectConfig};

use std::path::{Path, PathBuf};

const CANDIDATES: [&str; 2] = ["shipflow.toml", ".shipflow.toml"];
const LOCAL_OVERRIDE: &str = "shipflow.local.toml";

/// プロジェクトの shipflow.toml を探す
///
/// 以下の優先順位で設定ファイルを検索:
/// 1. 環境変数 SHIPFLOW_CONFIG_PATH (直接パス指定)
/// 2. カレントディレクトリ: shipflow.toml, .shipflow.toml
/// 3. ./.shipflow/ ディレクトリ内: 同様の順序
/// 4. ~/.config/shipflow/shipflow.toml (グローバル設定)
pub fn find_config_file() -> Result<PathBuf> {
    // 1. 環境変数で直接指定
    if let Ok(config_path) = std::env::var("SHIPFLOW_CONFIG_PATH") {
        let path = PathBuf::from(config_path);
        if path.exists() {
            return Ok(path);
        }
    }

    let current_dir = std::env::current_dir()?;

    // 2. カレントディレクトリで検索
    for filename in &CANDIDATES {
        let path = current_dir.join(filename);
        if path.exists() {
            return Ok(path);
        }
    }

    // 3. ./.shipflow/ ディレクトリで検索
    let shipflow_dir = current_dir.join(".shipflow");
    if shipflow_dir.is_dir() {
        for filename in &CANDIDATES {
            let path = shipflow_dir.join(filename);
            if path.exists() {
                return Ok(path);
            }
        }
    }

    // 4. グローバル設定ファイル
    if let Some(config_dir) = dirs::config_dir() {
        let global_config = config_dir.join("shipflow").join("shipflow.toml");
        if global_config.exists() {
            return Ok(global_config);
        }
    }

    Err(ConfigError::ConfigFileNotFound)
}

/// `KEY=VALUE` 形式のプロパティ指定をパース
pub fn parse_property(raw: &str) -> Result<(String, String)> {
    match raw.split_once('=') {
        Some((key, value)) if !key.trim().is_empty() => {
            Ok((key.trim().to_string(), value.to_string()))
        }
        _ => Err(ConfigError::InvalidProperty(raw.to_string())),
    }
}

/// 設定ファイルを読み込む
///
/// 同じディレクトリに shipflow.local.toml があれば上書きとして重ね、
/// 最後に `properties` で `[properties]` テーブルを上書きする。
pub fn load_config(path: &Path, properties: &[(String, String)]) -> Result<PipelineConfig> {
    let mut table = read_table(path)?;

    let project_root = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));

    let local = project_root.join(LOCAL_OVERRIDE);
    if local.exists() && local != path {
        tracing::debug!("Applying local override: {}", local.display());
        let overlay = read_table(&local)?;
        merge_tables(&mut table, overlay);
    }

    if !properties.is_empty() {
        let entry = table
            .entry("properties".to_string())
            .or_insert(toml::Value::Table(toml::Table::new()));
        if let toml::Value::Table(props) = entry {
            for (key, value) in properties {
                props.insert(key.clone(), toml::Value::String(value.clone()));
            }
        }
    }

    let mut config: PipelineConfig =
        toml::Value::Table(table)
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::Parse {
                path: path.to_path_buf(),
                message: e.to_string(),
            })?;
    config.project_root = project_root;

    tracing::debug!(
        project = %config.project.name,
        root = %config.project_root.display(),
        "Loaded pipeline configuration"
    );

    Ok(config)
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let content = std::fs::read_to_string(path)?;
    content.parse::<toml::Table>().map_err(|e| ConfigError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// テーブルを再帰的にマージ（overlay 側が優先）
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(incoming)) => {
                merge_tables(existing, incoming);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
