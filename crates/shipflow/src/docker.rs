use async_trait::async_trait;
use colored::Colorize;
use shipflow_build::{BuildRequest, BuildResult, ContainerEngine, DockerEngine, ImageTag};
use shipflow_config::RegistryCredentials;
use tokio::sync::OnceCell;

/// 最初に使われた時点で Docker に接続するエンジン
///
/// assemble や dockerfile だけを実行する場合は Docker を必要としない。
#[derive(Default)]
pub struct LazyDocker {
    engine: OnceCell<DockerEngine>,
}

impl LazyDocker {
    async fn engine(&self) -> BuildResult<&DockerEngine> {
        self.engine
            .get_or_try_init(init_docker_with_error_handling)
            .await
    }
}

#[async_trait]
impl ContainerEngine for LazyDocker {
    async fn build_image(&self, request: BuildRequest) -> BuildResult<()> {
        self.engine().await?.build_image(request).await
    }

    async fn push_image(
        &self,
        tag: &ImageTag,
        credentials: &RegistryCredentials,
    ) -> BuildResult<String> {
        self.engine().await?.push_image(tag, credentials).await
    }
}

/// Docker接続を初期化（エラーハンドリング付き）
async fn init_docker_with_error_handling() -> BuildResult<DockerEngine> {
    match DockerEngine::connect().await {
        Ok(engine) => Ok(engine),
        Err(e) => {
            eprintln!();
            eprintln!("{}", "✗ Docker接続エラー".red().bold());
            eprintln!();
            eprintln!("{}", "原因:".yellow());
            eprintln!("  {}", e);
            eprintln!();
            eprintln!("{}", "解決方法:".yellow());
            eprintln!("  • Dockerが起動しているか確認してください");
            eprintln!("  • DOCKER_HOST が正しいか確認してください");
            eprintln!("  • docker ps コマンドが正常に動作するか確認してください");
            Err(e)
        }
    }
}
