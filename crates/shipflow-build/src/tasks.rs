//! リリースパイプラインのタスク
//!
//! assemble → dockerfile → build → push の4つ。イメージ系のタスクは
//! `<build_dir>/.shipflow/` にタグを書いたマーカーファイルを出力とし、
//! タグが変わったら（新しいコミットなど）最新とはみなさない。

use crate::artifact::{Artifact, ArtifactAssembler};
use crate::builder::ImageBuilder;
use crate::descriptor::{ImageDescriptor, ImageDescriptorGenerator};
use crate::error::{BuildError, BuildResult};
use crate::pusher::ImagePublisher;
use crate::version::{ImageTag, VersionResolver};
use anyhow::Context;
use async_trait::async_trait;
use shipflow_config::{CredentialResolver, PipelineConfig};
use shipflow_core::{Task, fingerprint};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

pub const ASSEMBLE: &str = "assemble";
pub const DOCKERFILE: &str = "dockerfile";
pub const BUILD_IMAGE: &str = "build";
pub const PUSH_IMAGE: &str = "push";

const STATE_DIR: &str = ".shipflow";

/// ビルド済みマーカー
pub fn built_marker(config: &PipelineConfig) -> PathBuf {
    config.build_dir().join(STATE_DIR).join("image-built")
}

/// プッシュ済みマーカー
pub fn pushed_marker(config: &PipelineConfig) -> PathBuf {
    config.build_dir().join(STATE_DIR).join("image-pushed")
}

/// イメージタグを1回の実行につき1度だけ解決する
pub struct TagSource {
    image_name: Option<String>,
    resolver: VersionResolver,
    cached: Mutex<Option<ImageTag>>,
}

impl TagSource {
    pub fn new(image_name: Option<String>, resolver: VersionResolver) -> Self {
        Self {
            image_name,
            resolver,
            cached: Mutex::new(None),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            config.docker.image_name.clone(),
            VersionResolver::new(config.project_root.clone())
                .with_explicit(config.docker.version.clone()),
        )
    }

    pub fn tag(&self) -> BuildResult<ImageTag> {
        let mut cached = self.cached.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tag) = cached.as_ref() {
            return Ok(tag.clone());
        }

        let name = self
            .image_name
            .as_deref()
            .map(str::trim)
            .filter(|n| !n.is_empty())
            .ok_or_else(|| BuildError::MissingConfig("docker.image_name".to_string()))?;
        let tag = ImageTag::new(name, self.resolver.resolve()?)?;

        tracing::debug!(tag = %tag, "Resolved image tag");
        *cached = Some(tag.clone());
        Ok(tag)
    }
}

/// 組み立て時の設定を記録するスタンプ
pub fn assembled_stamp(config: &PipelineConfig) -> PathBuf {
    config.build_dir().join(STATE_DIR).join("assemble.inputs")
}

fn stamp_matches(stamp: &Path, expected: &str) -> bool {
    std::fs::read_to_string(stamp)
        .map(|content| content.trim_end() == expected.trim_end())
        .unwrap_or(false)
}

fn write_stamp(stamp: &Path, content: &str) -> std::io::Result<()> {
    if let Some(parent) = stamp.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(stamp, format!("{}\n", content.trim_end()))
}

/// 一時ファイルにコピーしてから rename する
fn stage_artifact(artifact: &Path, staged: &Path) -> std::io::Result<()> {
    if let Some(parent) = staged.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut tmp = staged.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    if let Err(e) = std::fs::copy(artifact, &tmp) {
        std::fs::remove_file(&tmp).ok();
        return Err(e);
    }
    std::fs::rename(&tmp, staged)
}

/// アーティファクトを組み立て、記述子の隣にコピーする
pub struct AssembleTask {
    assembler: ArtifactAssembler,
    staged: PathBuf,
    stamp: PathBuf,
}

impl AssembleTask {
    pub fn new(
        assembler: ArtifactAssembler,
        staged: impl Into<PathBuf>,
        stamp: impl Into<PathBuf>,
    ) -> Self {
        Self {
            assembler,
            staged: staged.into(),
            stamp: stamp.into(),
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(
            ArtifactAssembler::from_config(config),
            config.docker_dir().join(config.artifact_file_name()),
            assembled_stamp(config),
        )
    }
}

#[async_trait]
impl Task for AssembleTask {
    fn name(&self) -> &str {
        ASSEMBLE
    }

    fn description(&self) -> &str {
        "Assemble the self-contained artifact"
    }

    fn inputs(&self) -> Vec<PathBuf> {
        self.assembler.inputs()
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.assembler.output().to_path_buf(), self.staged.clone()]
    }

    /// ソースの mtime に加えて、前回と同じ設定で組み立てたかを見る
    async fn is_up_to_date(&self) -> anyhow::Result<bool> {
        if !stamp_matches(&self.stamp, &self.assembler.settings_fingerprint()) {
            return Ok(false);
        }
        Ok(fingerprint::outputs_up_to_date(
            &self.inputs(),
            &self.outputs(),
        )?)
    }

    async fn execute(&self) -> anyhow::Result<()> {
        // 起動コマンドは `java -jar` なので Main-Class のない成果物は作らない
        if self
            .assembler
            .entry_point()
            .is_none_or(|main_class| main_class.trim().is_empty())
        {
            return Err(BuildError::MissingConfig("artifact.main_class".to_string()).into());
        }
        std::fs::remove_file(&self.stamp).ok();

        let assembler = self.assembler.clone();
        let staged = self.staged.clone();
        let artifact = tokio::task::spawn_blocking(move || -> anyhow::Result<Artifact> {
            let artifact = assembler.assemble()?;
            stage_artifact(&artifact.path, &staged).with_context(|| {
                format!("アーティファクトを {} にコピーできません", staged.display())
            })?;
            Ok(artifact)
        })
        .await??;

        write_stamp(&self.stamp, &self.assembler.settings_fingerprint())?;

        tracing::info!(
            entries = artifact.entry_count,
            "Artifact staged: {}",
            self.staged.display()
        );
        Ok(())
    }
}

/// イメージ記述子を生成する
pub struct DockerfileTask {
    config: PipelineConfig,
    debug: bool,
    path: PathBuf,
}

impl DockerfileTask {
    pub fn new(config: PipelineConfig, debug: bool) -> Self {
        let path = config.descriptor_path();
        Self {
            config,
            debug,
            path,
        }
    }

    fn generator(&self) -> BuildResult<ImageDescriptorGenerator> {
        let descriptor = ImageDescriptor::from_config(&self.config, self.debug)?;
        Ok(ImageDescriptorGenerator::new(descriptor, &self.path))
    }
}

#[async_trait]
impl Task for DockerfileTask {
    fn name(&self) -> &str {
        DOCKERFILE
    }

    fn description(&self) -> &str {
        "Generate the image descriptor"
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.path.clone()]
    }

    /// 入力は設定なので、描画結果と既存ファイルの一致で判定する
    async fn is_up_to_date(&self) -> anyhow::Result<bool> {
        match self.generator() {
            Ok(generator) => Ok(generator.is_current()?),
            Err(_) => Ok(false),
        }
    }

    async fn execute(&self) -> anyhow::Result<()> {
        self.generator()?.generate()?;
        Ok(())
    }
}

/// イメージをビルドする
pub struct BuildImageTask {
    builder: ImageBuilder,
    credentials: CredentialResolver,
    descriptor_dir: PathBuf,
    marker: PathBuf,
    tags: Arc<TagSource>,
}

impl BuildImageTask {
    pub fn new(
        builder: ImageBuilder,
        credentials: CredentialResolver,
        descriptor_dir: impl Into<PathBuf>,
        marker: impl Into<PathBuf>,
        tags: Arc<TagSource>,
    ) -> Self {
        Self {
            builder,
            credentials,
            descriptor_dir: descriptor_dir.into(),
            marker: marker.into(),
            tags,
        }
    }
}

#[async_trait]
impl Task for BuildImageTask {
    fn name(&self) -> &str {
        BUILD_IMAGE
    }

    fn description(&self) -> &str {
        "Build the container image"
    }

    fn inputs(&self) -> Vec<PathBuf> {
        vec![self.descriptor_dir.clone()]
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.marker.clone()]
    }

    async fn is_up_to_date(&self) -> anyhow::Result<bool> {
        let Ok(tag) = self.tags.tag() else {
            return Ok(false);
        };
        Ok(stamp_matches(&self.marker, &tag.to_string())
            && fingerprint::outputs_up_to_date(&self.inputs(), &self.outputs())?)
    }

    async fn execute(&self) -> anyhow::Result<()> {
        let tag = self.tags.tag()?;
        // ビルド中に失敗したら古いマーカーは無効
        std::fs::remove_file(&self.marker).ok();

        // 認証情報が揃っていなくても公開イメージからならビルドできる
        let registry_auth = match self.credentials.resolve_all() {
            Ok(credentials) => Some(credentials),
            Err(e) => {
                tracing::debug!("Building without registry credentials: {}", e);
                None
            }
        };

        self.builder
            .build(&self.descriptor_dir, std::slice::from_ref(&tag), registry_auth)
            .await?;
        write_stamp(&self.marker, &tag.to_string())?;
        Ok(())
    }
}

/// イメージをプッシュする
pub struct PushImageTask {
    publisher: ImagePublisher,
    credentials: CredentialResolver,
    tags: Arc<TagSource>,
    built_marker: PathBuf,
    marker: PathBuf,
}

impl PushImageTask {
    pub fn new(
        publisher: ImagePublisher,
        credentials: CredentialResolver,
        tags: Arc<TagSource>,
        built_marker: impl Into<PathBuf>,
        marker: impl Into<PathBuf>,
    ) -> Self {
        Self {
            publisher,
            credentials,
            tags,
            built_marker: built_marker.into(),
            marker: marker.into(),
        }
    }
}

#[async_trait]
impl Task for PushImageTask {
    fn name(&self) -> &str {
        PUSH_IMAGE
    }

    fn description(&self) -> &str {
        "Push the image to the registry"
    }

    fn inputs(&self) -> Vec<PathBuf> {
        vec![self.built_marker.clone()]
    }

    fn outputs(&self) -> Vec<PathBuf> {
        vec![self.marker.clone()]
    }

    async fn is_up_to_date(&self) -> anyhow::Result<bool> {
        let Ok(tag) = self.tags.tag() else {
            return Ok(false);
        };
        Ok(stamp_matches(&self.marker, &tag.to_string())
            && fingerprint::outputs_up_to_date(&self.inputs(), &self.outputs())?)
    }

    async fn execute(&self) -> anyhow::Result<()> {
        // 通信より前に認証情報を確定させる
        let credentials = self.credentials.resolve_all().map_err(BuildError::from)?;
        let tag = self.tags.tag()?;
        std::fs::remove_file(&self.marker).ok();

        self.publisher.publish(&tag, &credentials).await?;
        write_stamp(&self.marker, &tag.to_string())?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_tag_source_resolves_once() {
        let dir = tempdir().unwrap();
        let tags = TagSource::new(
            Some("notifier".to_string()),
            VersionResolver::new(dir.path()).with_explicit(Some("1.4.0-7-gabc123".to_string())),
        );

        assert_eq!(tags.tag().unwrap().to_string(), "notifier:1.4.0-7-gabc123");
        assert_eq!(tags.tag().unwrap().to_string(), "notifier:1.4.0-7-gabc123");
    }

    #[test]
    fn test_tag_source_requires_image_name() {
        let dir = tempdir().unwrap();
        let tags = TagSource::new(
            None,
            VersionResolver::new(dir.path()).with_explicit(Some("v1".to_string())),
        );

        assert!(matches!(tags.tag(), Err(BuildError::MissingConfig(key)) if key == "docker.image_name"));
    }

    #[test]
    fn test_marker_records_tag() {
        let dir = tempdir().unwrap();
        let marker = dir.path().join(".shipflow/image-built");
        let tag = ImageTag::new("notifier", "main-abc1234").unwrap();
        let other = ImageTag::new("notifier", "main-def5678").unwrap();

        assert!(!stamp_matches(&marker, &tag.to_string()));
        write_stamp(&marker, &tag.to_string()).unwrap();
        assert!(stamp_matches(&marker, &tag.to_string()));
        assert!(!stamp_matches(&marker, &other.to_string()));
    }

    #[tokio::test]
    async fn test_assemble_requires_main_class() {
        let dir = tempdir().unwrap();
        let classes = dir.path().join("classes");
        std::fs::create_dir_all(&classes).unwrap();
        std::fs::write(classes.join("Main.class"), "main").unwrap();

        let output = dir.path().join("build/libs/app.jar");
        let staged = dir.path().join("build/docker/app.jar");
        let stamp = dir.path().join("build/.shipflow/assemble.inputs");
        let task = AssembleTask::new(ArtifactAssembler::new(&classes, &output), &staged, &stamp);

        let err = task.execute().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingConfig(key)) if key == "artifact.main_class"
        ));
        assert!(!output.exists());
        assert!(!staged.exists());
        assert!(!stamp.exists());
    }

    #[tokio::test]
    async fn test_assemble_stages_atomically() {
        let dir = tempdir().unwrap();
        let classes = dir.path().join("classes");
        std::fs::create_dir_all(&classes).unwrap();
        std::fs::write(classes.join("Main.class"), "main").unwrap();

        let output = dir.path().join("build/libs/app.jar");
        let staged = dir.path().join("build/docker/app.jar");
        let stamp = dir.path().join("build/.shipflow/assemble.inputs");
        let task = AssembleTask::new(
            ArtifactAssembler::new(&classes, &output).with_main_class("io.Main"),
            &staged,
            &stamp,
        );

        assert!(!task.is_up_to_date().await.unwrap());
        task.execute().await.unwrap();

        assert_eq!(std::fs::read(&output).unwrap(), std::fs::read(&staged).unwrap());
        assert!(!dir.path().join("build/docker/app.jar.tmp").exists());
        assert!(task.is_up_to_date().await.unwrap());
    }

    #[tokio::test]
    async fn test_dockerfile_task_reports_missing_config() {
        let dir = tempdir().unwrap();
        let mut config = PipelineConfig::new("notifier", "classes");
        config.project_root = dir.path().to_path_buf();

        let task = DockerfileTask::new(config.clone(), false);
        assert!(!task.is_up_to_date().await.unwrap());

        let err = task.execute().await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<BuildError>(),
            Some(BuildError::MissingConfig(_))
        ));
        assert!(!config.descriptor_path().exists());
    }
}
