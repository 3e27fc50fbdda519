//! ShipFlow core
//!
//! リリースパイプラインのタスクグラフと、その実行を担うオーケストレータ。
//! グローバルなタスクレジストリは持たず、`TaskGraph` を明示的に組み立てて
//! `Orchestrator` に渡します。

pub mod error;
pub mod fingerprint;
pub mod graph;
pub mod orchestrator;
pub mod task;

pub use error::{PipelineError, Result};
pub use graph::{TaskGraph, TaskNode};
pub use orchestrator::{
    Orchestrator, PipelineObserver, PipelineReport, PipelineStatus, RunOptions, TaskOutcome,
};
pub use task::{Task, TaskState};
