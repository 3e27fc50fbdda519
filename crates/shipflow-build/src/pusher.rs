//! イメージプッシュ処理
//!
//! ビルドしたイメージをコンテナレジストリにプッシュします。

use crate::auth::{registry_host, registry_matches};
use crate::engine::ContainerEngine;
use crate::error::BuildResult;
use crate::version::ImageTag;
use shipflow_config::RegistryCredentials;
use std::sync::Arc;

/// イメージをレジストリにプッシュする
///
/// 再試行はしない。失敗はそのままパイプラインの失敗になる。
#[derive(Clone)]
pub struct ImagePublisher {
    engine: Arc<dyn ContainerEngine>,
}

impl ImagePublisher {
    pub fn new(engine: Arc<dyn ContainerEngine>) -> Self {
        Self { engine }
    }

    /// 解決済みの認証情報でプッシュし、プッシュした参照を返す
    pub async fn publish(
        &self,
        tag: &ImageTag,
        credentials: &RegistryCredentials,
    ) -> BuildResult<String> {
        if !registry_matches(tag.name(), &credentials.url) {
            tracing::warn!(
                image = %tag,
                registry = %registry_host(&credentials.url),
                "Image name does not point at the configured registry"
            );
        }

        tracing::info!("Pushing {} to {}", tag, credentials.url);
        let pushed = self.engine.push_image(tag, credentials).await?;
        tracing::info!("Pushed: {}", pushed);
        Ok(pushed)
    }
}
