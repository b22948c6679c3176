//! Terminal rendering of pipeline events.

use std::time::Duration;

use capystore_uploader::{PipelineEvent, PipelineStage};
use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use tokio::sync::mpsc;

const BAR_LENGTH: u64 = 1000;

fn bar_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("{spinner:.green} [{bar:40.cyan/blue}] {percent:>3}% {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=>-")
}

/// Draws a progress bar on stderr until the upload completes or fails.
pub async fn render(mut events: mpsc::Receiver<PipelineEvent>, hidden: bool) {
    let pb = ProgressBar::new(BAR_LENGTH);
    if hidden {
        pb.set_draw_target(ProgressDrawTarget::hidden());
    }
    pb.set_style(bar_style());
    pb.enable_steady_tick(Duration::from_millis(120));

    while let Some(event) = events.recv().await {
        match event {
            PipelineEvent::Stage(stage) => pb.set_message(stage.label()),
            PipelineEvent::Progress(state) => {
                pb.set_position((state.fraction * BAR_LENGTH as f64).round() as u64);
            }
            PipelineEvent::Completed { elapsed, .. } => {
                pb.finish_and_clear();
                eprintln!("Uploaded in {}", format_elapsed(elapsed));
                break;
            }
            PipelineEvent::Failed { error, elapsed } => {
                pb.abandon_with_message(PipelineStage::Failed.label());
                eprintln!("Upload failed after {}: {error}", format_elapsed(elapsed));
                break;
            }
        }
    }
}

fn format_elapsed(d: Duration) -> String {
    let secs = d.as_secs_f64();
    if secs < 60.0 {
        format!("{secs:.1}s")
    } else {
        format!("{}m{:02}s", d.as_secs() / 60, d.as_secs() % 60)
    }
}
