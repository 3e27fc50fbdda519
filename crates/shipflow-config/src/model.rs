//! パイプライン設定モデル
//!
//! `shipflow.toml` の内容をそのまま表す構造体群です。
//! 各コンポーネントはこの構造体を構築時に受け取り、グローバルな参照は行いません。

use crate::credentials::CredentialNames;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// パイプライン全体の設定
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    pub project: ProjectConfig,
    pub artifact: ArtifactConfig,
    #[serde(default)]
    pub docker: DockerConfig,
    #[serde(default)]
    pub credentials: CredentialNames,
    /// プロジェクトプロパティ（認証情報のフォールバック先）
    #[serde(default)]
    pub properties: BTreeMap<String, String>,
    /// 設定ファイルが置かれたディレクトリ。相対パスはここを基準に解決する
    #[serde(skip)]
    pub project_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProjectConfig {
    pub name: String,
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
}

/// 実行可能アーティファクトの設定
#[derive(Debug, Clone, Deserialize)]
pub struct ArtifactConfig {
    /// コンパイル済みコード（ディレクトリまたはアーカイブ）
    pub root: PathBuf,
    #[serde(default)]
    pub dependencies: Vec<PathBuf>,
    #[serde(default = "default_classifier")]
    pub classifier: String,
    pub main_class: Option<String>,
    /// 追加のマニフェスト属性（例: Main-Verticle）
    #[serde(default)]
    pub manifest: BTreeMap<String, String>,
    /// マージ対象のサービス登録ファイル。空なら META-INF/services/ 配下すべて
    #[serde(default)]
    pub service_files: Vec<String>,
}

/// イメージ記述子とイメージのビルド設定
#[derive(Debug, Clone, Deserialize)]
pub struct DockerConfig {
    pub base_image: Option<String>,
    pub image_name: Option<String>,
    pub maintainer: Option<String>,
    #[serde(default)]
    pub default_java_opts: String,
    #[serde(default = "default_app_path")]
    pub app_path: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_debug_port")]
    pub debug_port: u16,
    #[serde(default = "default_no_cache")]
    pub no_cache: bool,
    /// ソース管理から解決したバージョンの代わりに使う明示的なバージョン
    pub version: Option<String>,
}

impl Default for DockerConfig {
    fn default() -> Self {
        Self {
            base_image: None,
            image_name: None,
            maintainer: None,
            default_java_opts: String::new(),
            app_path: default_app_path(),
            port: default_port(),
            debug_port: default_debug_port(),
            no_cache: default_no_cache(),
            version: None,
        }
    }
}

fn default_build_dir() -> PathBuf {
    PathBuf::from("build")
}

fn default_classifier() -> String {
    "fat".to_string()
}

fn default_app_path() -> String {
    "/app/app.jar".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_debug_port() -> u16 {
    5005
}

fn default_no_cache() -> bool {
    true
}

impl PipelineConfig {
    /// 既定値で設定を作成（設定ファイルを使わない場合）
    pub fn new(name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        Self {
            project: ProjectConfig {
                name: name.into(),
                build_dir: default_build_dir(),
            },
            artifact: ArtifactConfig {
                root: root.into(),
                dependencies: Vec::new(),
                classifier: default_classifier(),
                main_class: None,
                manifest: BTreeMap::new(),
                service_files: Vec::new(),
            },
            docker: DockerConfig::default(),
            credentials: CredentialNames::default(),
            properties: BTreeMap::new(),
            project_root: PathBuf::from("."),
        }
    }

    /// プロジェクトルート基準でパスを解決
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.project_root.join(path)
        }
    }

    pub fn build_dir(&self) -> PathBuf {
        self.resolve_path(&self.project.build_dir)
    }

    /// アーティファクトの出力先ディレクトリ（build/libs）
    pub fn libs_dir(&self) -> PathBuf {
        self.build_dir().join("libs")
    }

    /// イメージ記述子とビルドコンテキストのディレクトリ（build/docker）
    pub fn docker_dir(&self) -> PathBuf {
        self.build_dir().join("docker")
    }

    pub fn descriptor_path(&self) -> PathBuf {
        self.docker_dir().join("Dockerfile")
    }

    /// `<name>-<classifier>.jar`
    pub fn artifact_file_name(&self) -> String {
        format!("{}-{}.jar", self.project.name, self.artifact.classifier)
    }

    pub fn artifact_root(&self) -> PathBuf {
        self.resolve_path(&self.artifact.root)
    }

    pub fn artifact_dependencies(&self) -> Vec<PathBuf> {
        self.artifact
            .dependencies
            .iter()
            .map(|p| self.resolve_path(p))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> PipelineConfig {
        let mut config: PipelineConfig = toml::from_str(
            r#"
[project]
name = "notifier"

[artifact]
root = "classes"
"#,
        )
        .unwrap();
        config.project_root = PathBuf::from("/work/notifier");
        config
    }

    #[test]
    fn test_defaults() {
        let config = minimal();
        assert_eq!(config.project.build_dir, PathBuf::from("build"));
        assert_eq!(config.artifact.classifier, "fat");
        assert_eq!(config.docker.port, 8080);
        assert_eq!(config.docker.debug_port, 5005);
        assert_eq!(config.docker.app_path, "/app/app.jar");
        assert!(config.docker.no_cache);
        assert!(config.docker.base_image.is_none());
    }

    #[test]
    fn test_derived_paths() {
        let config = minimal();
        assert_eq!(config.artifact_file_name(), "notifier-fat.jar");
        assert_eq!(
            config.descriptor_path(),
            PathBuf::from("/work/notifier/build/docker/Dockerfile")
        );
        assert_eq!(
            config.libs_dir(),
            PathBuf::from("/work/notifier/build/libs")
        );
        assert_eq!(
            config.artifact_root(),
            PathBuf::from("/work/notifier/classes")
        );
    }

    #[test]
    fn test_absolute_path_kept() {
        let config = minimal();
        assert_eq!(
            config.resolve_path(Path::new("/opt/lib.jar")),
            PathBuf::from("/opt/lib.jar")
        );
    }
}
