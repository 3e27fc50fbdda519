mod console;
mod docker;

use clap::{Parser, Subcommand};
use colored::Colorize;
use shipflow_build::{
    ASSEMBLE, BUILD_IMAGE, DOCKERFILE, PUSH_IMAGE, ReleaseOptions, release_graph,
};
use shipflow_config::{CredentialResolver, PipelineConfig};
use shipflow_core::{Orchestrator, RunOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "ship")]
#[command(about = "組み立てて、包んで、届ける。JVM サービスのリリースパイプライン", long_about = None)]
struct Cli {
    /// 設定ファイルのパス（省略時は shipflow.toml を探索）
    #[arg(short, long, global = true, env = "SHIPFLOW_CONFIG_PATH")]
    config: Option<PathBuf>,

    /// プロジェクトプロパティを上書き (KEY=VALUE)
    #[arg(short = 'P', long = "property", global = true, value_name = "KEY=VALUE")]
    properties: Vec<String>,

    /// 最新判定を無視してすべて実行
    #[arg(long, global = true)]
    rerun: bool,

    /// リモートデバッグを有効にしたイメージを作る
    #[arg(long, global = true)]
    debug: bool,

    /// 詳細ログを表示
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 依存を含む実行可能アーティファクトを組み立てる
    Assemble,
    /// イメージ記述子（Dockerfile）を生成する
    Dockerfile,
    /// イメージをビルドする
    Build,
    /// イメージをレジストリにプッシュする
    Push,
    /// タスクと依存関係の一覧を表示
    Tasks,
    /// バージョン情報を表示
    Version,
}

impl Commands {
    fn target(&self) -> Option<&'static str> {
        match self {
            Commands::Assemble => Some(ASSEMBLE),
            Commands::Dockerfile => Some(DOCKERFILE),
            Commands::Build => Some(BUILD_IMAGE),
            Commands::Push => Some(PUSH_IMAGE),
            Commands::Tasks | Commands::Version => None,
        }
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(cli: &Cli) -> anyhow::Result<PipelineConfig> {
    let properties = cli
        .properties
        .iter()
        .map(|raw| shipflow_config::parse_property(raw))
        .collect::<Result<Vec<_>, _>>()?;

    let path = match &cli.config {
        Some(path) => path.clone(),
        None => shipflow_config::find_config_file()?,
    };
    tracing::debug!("Using config file: {}", path.display());

    Ok(shipflow_config::load_config(&path, &properties)?)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    // Versionコマンドは設定ファイル不要
    if matches!(cli.command, Commands::Version) {
        println!("shipflow {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let config = load_config(&cli)?;
    let engine = Arc::new(docker::LazyDocker::default());
    let graph = release_graph(
        &config,
        engine,
        CredentialResolver::from_config(&config),
        ReleaseOptions { debug: cli.debug },
    )?;

    let Some(target) = cli.command.target() else {
        console::print_tasks(&graph);
        return Ok(());
    };

    println!(
        "{} {} ({})",
        "▶".cyan(),
        config.project.name.bold(),
        target
    );
    if cli.debug {
        println!(
            "  {} デバッグポート {} を公開します",
            "ℹ".blue(),
            config.docker.debug_port
        );
    }
    println!();

    let observer = console::ConsoleObserver;
    let report = Orchestrator::new(&graph)
        .with_options(RunOptions { rerun: cli.rerun })
        .with_observer(&observer)
        .run(&[target])
        .await?;

    console::print_summary(&report);

    if let Some(failed) = report.failed_task() {
        anyhow::bail!("タスク '{}' が失敗しました", failed.name);
    }
    Ok(())
}
