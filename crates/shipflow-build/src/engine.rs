//! コンテナエンジンとの境界
//!
//! ビルドとプッシュは `ContainerEngine` を通して行います。
//! 実装は Docker（Bollard）で、テストではメモリ上の実装に差し替えます。

use crate::auth::{docker_credentials, registry_host};
use crate::error::{BuildError, BuildResult};
use crate::progress::EngineProgress;
use crate::version::ImageTag;
use async_trait::async_trait;
use bollard::Docker;
use bollard::models::{BuildInfo, PushImageInfo};
use futures_util::stream::StreamExt;
use shipflow_config::RegistryCredentials;
use std::collections::HashMap;

/// イメージビルドの要求
#[derive(Debug, Clone)]
pub struct BuildRequest {
    /// tar.gz のビルドコンテキスト（Dockerfile を含む）
    pub context: Vec<u8>,
    /// 1つ以上の `<name>:<version>`
    pub tags: Vec<String>,
    pub no_cache: bool,
    /// ベースイメージの pull に使う認証情報
    pub registry_auth: Option<RegistryCredentials>,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// イメージをビルドし、すべてのタグを付ける
    async fn build_image(&self, request: BuildRequest) -> BuildResult<()>;

    /// イメージをプッシュし、プッシュした参照を返す
    async fn push_image(
        &self,
        tag: &ImageTag,
        credentials: &RegistryCredentials,
    ) -> BuildResult<String>;
}

/// Docker デーモンを使うエンジン
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// ローカルの Docker に接続
    pub async fn connect() -> BuildResult<Self> {
        let docker = Docker::connect_with_local_defaults()?;
        docker.ping().await?;
        tracing::debug!("Connected to Docker daemon");
        Ok(Self::new(docker))
    }

    /// ビルド出力の処理
    fn handle_build_output(output: BuildInfo, progress: &EngineProgress) -> BuildResult<()> {
        if let Some(error) = output.error {
            return Err(BuildError::BuildFailed(error));
        }

        if let Some(error_detail) = output.error_detail {
            let error_msg = error_detail
                .message
                .unwrap_or_else(|| "Unknown build error".to_string());
            return Err(BuildError::BuildFailed(error_msg));
        }

        if let Some(stream) = output.stream {
            let line = stream.trim_end();
            if !line.is_empty() {
                tracing::debug!("{}", line);
                if line.starts_with("Step ") {
                    progress.set_message(line);
                }
            }
        }

        if let Some(status) = output.status {
            progress.set_message(&status);
        }

        Ok(())
    }

    /// プッシュ進捗の表示
    fn handle_push_progress(info: &PushImageInfo, progress: &EngineProgress) {
        if let Some(status) = &info.status {
            match status.as_str() {
                // 準備中は表示をスキップ（ノイズ軽減）
                "Preparing" | "Waiting" => {}
                _ => {
                    let detail = info.progress.as_deref().unwrap_or("");
                    progress.set_message(&format!("{} {}", status, detail));
                }
            }
        }
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn build_image(&self, request: BuildRequest) -> BuildResult<()> {
        use bytes::Bytes;
        use http_body_util::{Either, Full};

        let Some((primary, extra_tags)) = request.tags.split_first() else {
            return Err(BuildError::InvalidTag {
                tag: "(no tags)".to_string(),
            });
        };

        tracing::info!(no_cache = request.no_cache, "Building image: {}", primary);

        #[allow(deprecated)]
        let options = bollard::image::BuildImageOptions {
            dockerfile: "Dockerfile",
            t: primary.as_str(),
            nocache: request.no_cache,
            rm: true,      // 中間コンテナを削除
            forcerm: true, // ビルド失敗時も中間コンテナを削除
            pull: true,    // ベースイメージを常にpull
            ..Default::default()
        };

        let credentials = request.registry_auth.as_ref().map(|auth| {
            HashMap::from([(registry_host(&auth.url), docker_credentials(auth))])
        });

        let progress = EngineProgress::new(&format!("Building {}...", primary));
        let body = Full::new(Bytes::from(request.context));
        #[allow(deprecated)]
        let mut stream = self
            .docker
            .build_image(options, credentials, Some(Either::Left(body)));

        while let Some(msg) = stream.next().await {
            let result = msg
                .map_err(BuildError::DockerConnection)
                .and_then(|output| Self::handle_build_output(output, &progress));
            if let Err(e) = result {
                progress.finish_error(&e.to_string());
                return Err(e);
            }
        }

        for extra in extra_tags {
            let (repo, tag) = extra.rsplit_once(':').unwrap_or((extra.as_str(), "latest"));
            #[allow(deprecated)]
            let options = bollard::image::TagImageOptions { repo, tag };
            if let Err(e) = self.docker.tag_image(primary, Some(options)).await {
                progress.finish_error(&e.to_string());
                return Err(BuildError::DockerConnection(e));
            }
        }

        progress.finish_success(&format!("Built {}", primary));
        tracing::info!("Successfully built: {}", primary);
        Ok(())
    }

    async fn push_image(
        &self,
        tag: &ImageTag,
        credentials: &RegistryCredentials,
    ) -> BuildResult<String> {
        let full_image = tag.to_string();

        #[allow(deprecated)]
        let options = bollard::image::PushImageOptions::<String> {
            tag: tag.version().to_string(),
        };

        let progress = EngineProgress::new(&format!("Pushing {}...", full_image));
        #[allow(deprecated)]
        let mut stream = self.docker.push_image(
            tag.name(),
            Some(options),
            Some(docker_credentials(credentials)),
        );

        let mut error_message: Option<String> = None;
        while let Some(result) = stream.next().await {
            match result {
                Ok(info) => {
                    if let Some(err) = info.error {
                        error_message = Some(err);
                    } else {
                        Self::handle_push_progress(&info, &progress);
                    }
                }
                Err(e) => {
                    progress.finish_error(&e.to_string());
                    return Err(BuildError::PushFailed {
                        message: e.to_string(),
                    });
                }
            }
        }

        if let Some(err) = error_message {
            progress.finish_error(&err);
            return Err(BuildError::PushFailed { message: err });
        }

        progress.finish_success(&format!("Pushed {}", full_image));
        Ok(full_image)
    }
}
