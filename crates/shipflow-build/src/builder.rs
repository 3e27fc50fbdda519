use crate::context::create_context;
use crate::engine::{BuildRequest, ContainerEngine};
use crate::error::{BuildError, Result};
use crate::version::ImageTag;
use shipflow_config::{PipelineConfig, RegistryCredentials};
use std::path::Path;
use std::sync::Arc;

/// ビルドのキャッシュ方針
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuildPolicy {
    /// 既定では毎回すべてのステップを再実行する
    pub no_cache: bool,
}

impl Default for BuildPolicy {
    fn default() -> Self {
        Self { no_cache: true }
    }
}

impl BuildPolicy {
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            no_cache: config.docker.no_cache,
        }
    }
}

/// 記述子のディレクトリからイメージをビルドする
#[derive(Clone)]
pub struct ImageBuilder {
    engine: Arc<dyn ContainerEngine>,
    policy: BuildPolicy,
}

impl ImageBuilder {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self {
            engine,
            policy: BuildPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: BuildPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// イメージをビルドし、すべてのタグを付ける
    ///
    /// エンジンが失敗した場合、付けかけのタグがあってもビルドは失敗として扱う。
    /// `registry_auth` はプライベートなベースイメージの pull に使われる。
    pub async fn build(
        &self,
        descriptor_dir: &Path,
        tags: &[ImageTag],
        registry_auth: Option<RegistryCredentials>,
    ) -> Result<Vec<String>> {
        if !descriptor_dir.is_dir() {
            return Err(BuildError::ContextNotFound(descriptor_dir.to_path_buf()));
        }

        let dockerfile = descriptor_dir.join("Dockerfile");
        if !dockerfile.is_file() {
            return Err(BuildError::DockerfileNotFound(dockerfile));
        }

        if tags.is_empty() {
            return Err(BuildError::InvalidTag {
                tag: "(no tags)".to_string(),
            });
        }

        let tags: Vec<String> = tags.iter().map(ImageTag::to_string).collect();
        let context = create_context(descriptor_dir)?;

        tracing::debug!(?tags, no_cache = self.policy.no_cache, "Requesting image build");
        self.engine
            .build_image(BuildRequest {
                context,
                tags: tags.clone(),
                no_cache: self.policy.no_cache,
                registry_auth,
            })
            .await?;

        Ok(tags)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::fs;
    use std::sync::Mutex;
    use tempfile::tempdir;

    #[derive(Default)]
    struct RecordingEngine {
        requests: Mutex<Vec<(Vec<String>, bool)>>,
        fail: bool,
    }

    #[async_trait]
    impl ContainerEngine for RecordingEngine {
        async fn build_image(&self, request: BuildRequest) -> Result<()> {
            self.requests
                .lock()
                .unwrap()
                .push((request.tags.clone(), request.no_cache));
            if self.fail {
                return Err(BuildError::BuildFailed("exit status 1".to_string()));
            }
            Ok(())
        }

        async fn push_image(
            &self,
            _tag: &ImageTag,
            _credentials: &RegistryCredentials,
        ) -> Result<String> {
            unreachable!("builder never pushes")
        }
    }

    fn descriptor_dir() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("Dockerfile"), "FROM openjdk:8-jre\n").unwrap();
        dir
    }

    #[tokio::test]
    async fn test_build_disables_cache_by_default() {
        let engine = Arc::new(RecordingEngine::default());
        let builder = ImageBuilder::new(engine.clone());
        let dir = descriptor_dir();
        let tag = ImageTag::new("notifier", "1.4.0-7-gabc123").unwrap();

        let tags = builder.build(dir.path(), &[tag], None).await.unwrap();

        assert_eq!(tags, vec!["notifier:1.4.0-7-gabc123"]);
        let requests = engine.requests.lock().unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].1);
    }

    #[tokio::test]
    async fn test_build_policy_is_tunable() {
        let engine = Arc::new(RecordingEngine::default());
        let builder =
            ImageBuilder::new(engine.clone()).with_policy(BuildPolicy { no_cache: false });
        let dir = descriptor_dir();

        builder
            .build(
                dir.path(),
                &[ImageTag::new("notifier", "main-abc1234").unwrap()],
                None,
            )
            .await
            .unwrap();

        assert!(!engine.requests.lock().unwrap()[0].1);
    }

    #[tokio::test]
    async fn test_missing_dockerfile() {
        let engine = Arc::new(RecordingEngine::default());
        let builder = ImageBuilder::new(engine.clone());
        let dir = tempdir().unwrap();

        let result = builder
            .build(dir.path(), &[ImageTag::new("notifier", "v1").unwrap()], None)
            .await;

        assert!(matches!(result, Err(BuildError::DockerfileNotFound(_))));
        assert!(engine.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_propagates() {
        let engine = Arc::new(RecordingEngine {
            fail: true,
            ..Default::default()
        });
        let builder = ImageBuilder::new(engine);
        let dir = descriptor_dir();

        let result = builder
            .build(dir.path(), &[ImageTag::new("notifier", "v1").unwrap()], None)
            .await;

        assert!(matches!(result, Err(BuildError::BuildFailed(_))));
    }
}
