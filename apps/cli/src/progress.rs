use std::time::Duration;

use console::style;
use glossa_core::{AnalysisJob, Stage};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::{sync::watch, task::JoinHandle};

pub fn create_spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

fn create_job_bar() -> ProgressBar {
    let pb = ProgressBar::new(100);
    pb.set_style(
        ProgressStyle::default_bar()
            .tick_chars("⠁⠂⠄⡀⢀⠠⠐⠈ ")
            .template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=> "),
    );
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}

/// Render job snapshots until the job reaches a terminal stage or the
/// sender goes away. Each finished stage is printed as its own line.
pub fn follow(mut rx: watch::Receiver<AnalysisJob>) -> JoinHandle<()> {
    let bar = create_job_bar();

    tokio::spawn(async move {
        let mut current = Stage::Idle;
        loop {
            {
                let job = rx.borrow_and_update();
                if job.stage != current {
                    if current != Stage::Idle && job.stage != Stage::Error {
                        bar.println(format!("{} {}", style("✓").green().bold(), current.label()));
                    }
                    current = job.stage;
                }
                bar.set_position(u64::from(job.percent));
                bar.set_message(job.message.clone());
                if job.is_terminal() {
                    break;
                }
            }
            if rx.changed().await.is_err() {
                break;
            }
        }
        bar.finish_and_clear();
    })
}
