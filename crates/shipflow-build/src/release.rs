//! リリースパイプラインのタスクグラフ

use crate::builder::{BuildPolicy, ImageBuilder};
use crate::engine::ContainerEngine;
use crate::error::BuildResult;
use crate::pusher::ImagePublisher;
use crate::tasks::{
    ASSEMBLE, AssembleTask, BUILD_IMAGE, BuildImageTask, DOCKERFILE, DockerfileTask,
    PushImageTask, TagSource, built_marker, pushed_marker,
};
use shipflow_config::{CredentialResolver, PipelineConfig};
use shipflow_core::TaskGraph;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, Default)]
pub struct ReleaseOptions {
    /// リモートデバッグを有効にしたイメージを作る
    pub debug: bool,
}

/// assemble → dockerfile → build → push のグラフを組み立てる
pub fn release_graph(
    config: &PipelineConfig,
    engine: Arc<dyn ContainerEngine>,
    credentials: CredentialResolver,
    options: ReleaseOptions,
) -> BuildResult<TaskGraph> {
    let tags = Arc::new(TagSource::from_config(config));
    let builder = ImageBuilder::new(engine.clone()).with_policy(BuildPolicy::from_config(config));

    let mut graph = TaskGraph::new();
    graph.add(AssembleTask::from_config(config), &[])?;
    graph.add(DockerfileTask::new(config.clone(), options.debug), &[ASSEMBLE])?;
    graph.add(
        BuildImageTask::new(
            builder,
            credentials.clone(),
            config.docker_dir(),
            built_marker(config),
            tags.clone(),
        ),
        &[DOCKERFILE],
    )?;
    graph.add(
        PushImageTask::new(
            ImagePublisher::new(engine),
            credentials,
            tags,
            built_marker(config),
            pushed_marker(config),
        ),
        &[BUILD_IMAGE],
    )?;

    graph.validate()?;
    Ok(graph)
}
