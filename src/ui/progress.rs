use crate::changes::ChangeKind;
use crate::pipeline::{PipelineEvent, PipelineStageKind, ProgressSink, StageResult, StageStatus};
use crate::ui::icons::{
    CHECK, CLOCK, CROSS, FILE_DEL, FILE_MOD, FILE_MOVED, FILE_NEW, PENDING, RUNNING, SKIPPED,
    SPARKLE, WARNING,
};
use console::{Emoji, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::time::Duration;

/// Terminal UI for a pipeline run, rendered via `indicatif` progress bars.
///
/// Two bars are stacked vertically:
/// - Stage bar: how many stages have finished
/// - Step bar: progress reported by the running stage
pub struct PipelineUI {
    multi: MultiProgress,
    stage_bar: ProgressBar,
    step_bar: ProgressBar,
    verbose: bool,
}

impl PipelineUI {
    /// Create the UI and add both bars to the multiplex renderer.
    pub fn new(total_stages: u64, verbose: bool) -> Self {
        let multi = MultiProgress::new();

        let stage_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let stage_bar = multi.add(ProgressBar::new(total_stages));
        stage_bar.set_style(stage_style);
        stage_bar.set_prefix("Stages");

        let step_style = ProgressStyle::default_bar()
            .template("{prefix:.bold.dim} {spinner} [{bar:20.green/white}] {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("=> ");

        let step_bar = multi.add(ProgressBar::new(100));
        step_bar.set_style(step_style);
        step_bar.set_prefix("  Step");

        Self {
            multi,
            stage_bar,
            step_bar,
            verbose,
        }
    }

    /// Handle to the renderer, e.g. to suspend it around an interactive prompt.
    pub fn multi(&self) -> MultiProgress {
        self.multi.clone()
    }

    /// Print a line via `MultiProgress`, falling back to `eprintln!` if the rich UI fails.
    fn print_line(&self, msg: impl AsRef<str>) {
        if self.multi.println(msg.as_ref()).is_err() {
            eprintln!("{}", msg.as_ref());
        }
    }

    pub fn stage_started(&self, stage: PipelineStageKind) {
        self.stage_bar.set_message(format!(
            "{} {}",
            style(stage.position() + 1).yellow(),
            stage.label()
        ));
        self.step_bar.set_position(0);
        self.step_bar.set_message(style("starting...").dim().to_string());
        self.step_bar.enable_steady_tick(Duration::from_millis(100));
    }

    pub fn stage_finished(&self, stage: PipelineStageKind, status: StageStatus, duration_ms: u64) {
        self.stage_bar.inc(1);
        self.step_bar.disable_steady_tick();
        let icon = status_icon(status);
        let label = match status {
            StageStatus::Completed => style(stage.label()).green(),
            StageStatus::Failed => style(stage.label()).red(),
            _ => style(stage.label()).yellow(),
        };
        self.print_line(format!(
            "{}{} {}",
            icon,
            label,
            style(format_duration(Duration::from_millis(duration_ms))).dim()
        ));
    }

    pub fn gate_decided(&self, accepted: bool) {
        if !accepted {
            self.print_line(format!(
                "{}{}",
                WARNING,
                style("Strategy declined; continuing without confirmation").yellow()
            ));
        }
    }

    /// Drive the bars from a pipeline event.
    pub fn handle_event(&self, event: &PipelineEvent) {
        match event {
            PipelineEvent::StageStarted { stage } => self.stage_started(*stage),
            PipelineEvent::StageFinished {
                stage,
                status,
                duration_ms,
            } => self.stage_finished(*stage, *status, *duration_ms),
            PipelineEvent::GateDecided { accepted, .. } => self.gate_decided(*accepted),
            // Progress goes through the sink so it is not drawn twice.
            PipelineEvent::StageProgress { .. }
            | PipelineEvent::RunStarted { .. }
            | PipelineEvent::RunFinished { .. } => {}
        }
    }

    /// Clear both bars.
    pub fn finish(&self) {
        self.step_bar.finish_and_clear();
        self.stage_bar.finish_and_clear();
    }
}

impl ProgressSink for PipelineUI {
    fn report(&self, _stage: &str, fraction: f64, message: &str) {
        self.step_bar.set_position((fraction * 100.0).round() as u64);
        self.step_bar.set_message(message.to_string());
        if self.verbose {
            self.print_line(format!("    {} {}", style("→").dim(), style(message).dim()));
        }
    }
}

pub fn status_icon(status: StageStatus) -> Emoji<'static, 'static> {
    match status {
        StageStatus::Completed => CHECK,
        StageStatus::Failed => CROSS,
        StageStatus::Skipped => SKIPPED,
        StageStatus::Running => RUNNING,
        StageStatus::Pending => PENDING,
    }
}

pub fn change_icon(kind: ChangeKind) -> Emoji<'static, 'static> {
    match kind {
        ChangeKind::Added => FILE_NEW,
        ChangeKind::Modified => FILE_MOD,
        ChangeKind::Deleted => FILE_DEL,
        ChangeKind::Renamed => FILE_MOVED,
    }
}

/// Formats as `850ms`, `12.3s` or `2m 5s`.
pub fn format_duration(duration: Duration) -> String {
    let millis = duration.as_millis();
    if millis < 1000 {
        format!("{}ms", millis)
    } else if millis < 60_000 {
        format!("{:.1}s", duration.as_secs_f64())
    } else {
        let secs = duration.as_secs();
        format!("{}m {}s", secs / 60, secs % 60)
    }
}

/// Per-stage summary printed after a run.
pub fn print_run_summary(results: &BTreeMap<PipelineStageKind, StageResult>) {
    println!();
    println!("{}", style("Run summary").bold().underlined());
    for stage in PipelineStageKind::ALL {
        let Some(result) = results.get(&stage) else {
            println!("  {}{}", PENDING, style(stage.label()).dim());
            continue;
        };
        println!(
            "  {}{} {}{}",
            status_icon(result.status),
            stage.label(),
            CLOCK,
            style(format_duration(result.duration)).dim()
        );
        for error in &result.errors {
            println!("      {}", style(error).red());
        }
        for warning in &result.warnings {
            println!("      {}{}", WARNING, style(warning).yellow());
        }
    }

    let failed = results.values().any(|r| r.is_failed());
    if !failed && results.len() == PipelineStageKind::ALL.len() {
        println!("\n{} {}", SPARKLE, style("All stages finished").green().bold());
    }
}
