//! パイプラインの進捗表示

use colored::Colorize;
use shipflow_core::{PipelineObserver, PipelineReport, TaskGraph, TaskOutcome, TaskState};

/// タスクごとに1行のステータスを出力する
pub struct ConsoleObserver;

impl PipelineObserver for ConsoleObserver {
    fn on_transition(&self, task: &str, state: TaskState) {
        if state == TaskState::Running {
            println!("{} {}", "→".blue(), task.bold());
        }
    }

    fn on_finished(&self, outcome: &TaskOutcome) {
        match outcome.state {
            TaskState::Succeeded => println!(
                "  {} {} {}",
                "✓".green(),
                outcome.name,
                format!("SUCCEEDED ({:.1}s)", outcome.duration.as_secs_f64()).green()
            ),
            TaskState::Skipped => println!(
                "{} {} {}",
                "-".dimmed(),
                outcome.name.bold(),
                "SKIPPED (up to date)".dimmed()
            ),
            TaskState::Failed => {
                let indent = if outcome.executed { "  " } else { "" };
                println!(
                    "{}{} {} {}",
                    indent,
                    "✗".red(),
                    outcome.name.bold(),
                    "FAILED".red().bold()
                );
                if let Some(error) = &outcome.error {
                    for line in error.lines() {
                        println!("{}    {}", indent, line);
                    }
                }
            }
            TaskState::Pending | TaskState::Running => {}
        }
    }
}

/// 実行結果のサマリー
pub fn print_summary(report: &PipelineReport) {
    println!();

    let not_started: Vec<&str> = report
        .outcomes
        .iter()
        .filter(|o| o.state == TaskState::Pending)
        .map(|o| o.name.as_str())
        .collect();
    if !not_started.is_empty() {
        println!("{} {}", "未実行:".dimmed(), not_started.join(", "));
    }

    if report.is_success() {
        println!(
            "{} ({} 実行, {} スキップ)",
            "✓ パイプラインが完了しました".green().bold(),
            report.executed_count(),
            report.skipped_count()
        );
    } else if let Some(failed) = report.failed_task() {
        println!(
            "{} {}",
            "✗ パイプラインが失敗しました:".red().bold(),
            failed.name
        );
    }
}

/// タスクと依存関係の一覧
pub fn print_tasks(graph: &TaskGraph) {
    println!("{}", "タスク一覧:".bold());
    for node in graph.nodes() {
        let dependencies = if node.dependencies.is_empty() {
            String::new()
        } else {
            format!(" (depends on: {})", node.dependencies.join(", "))
                .dimmed()
                .to_string()
        };
        println!(
            "  {} {}{}",
            format!("{:<12}", node.task.name()).cyan(),
            node.task.description(),
            dependencies
        );
    }
}
