//! ShipFlow release tasks
//!
//! This crate provides the concrete release pipeline for ShipFlow:
//! self-contained artifact assembly, image descriptor generation,
//! version and tag resolution, and image build and push through a
//! container engine (Docker via Bollard).

pub mod artifact;
pub mod auth;
pub mod builder;
pub mod context;
pub mod descriptor;
pub mod engine;
pub mod error;
pub mod progress;
pub mod pusher;
pub mod release;
pub mod tasks;
pub mod version;

pub use artifact::{Artifact, ArtifactAssembler};
pub use builder::{BuildPolicy, ImageBuilder};
pub use context::create_context;
pub use descriptor::{CopyInstruction, ImageDescriptor, ImageDescriptorGenerator};
pub use engine::{BuildRequest, ContainerEngine, DockerEngine};
pub use error::{BuildError, BuildResult};
pub use progress::EngineProgress;
pub use pusher::ImagePublisher;
pub use release::{ReleaseOptions, release_graph};
pub use tasks::{ASSEMBLE, BUILD_IMAGE, DOCKERFILE, PUSH_IMAGE};
pub use version::{ImageTag, SourceVersion, VersionResolver};
