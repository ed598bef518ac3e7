//! Saved run inspection: `testsmith status`.

use anyhow::{Context, Result};
use console::style;
use std::path::Path;
use testsmith::audit::{RunRecord, RunStore};
use testsmith::pipeline::{CommitSelection, PipelineStageKind, StageStatus};
use testsmith::ui::icons::{CLOCK, WARNING};
use testsmith::ui::progress::{format_duration, status_icon};

fn describe_selection(selection: &CommitSelection) -> String {
    match selection {
        CommitSelection::Explicit { ids, base } => {
            let mut text = format!("{} selected commit(s)", ids.len());
            if let Some(base) = base {
                text.push_str(&format!(" from {}", base));
            }
            text
        }
        CommitSelection::Recent {
            branch,
            max_commits,
        } => match branch {
            Some(branch) => format!("last {} commit(s) on {}", max_commits, branch),
            None => format!("last {} commit(s)", max_commits),
        },
    }
}

fn print_overview(records: &[RunRecord]) {
    println!();
    println!("{}", style("Saved runs").bold().underlined());
    for record in records {
        let progress = record.progress();
        let state = match progress.failed_stage() {
            Some(stage) => style(format!("failed at {}", stage.label())).red(),
            None if record.remaining_stages().is_empty() => style("finished".to_string()).green(),
            None => style(format!(
                "{}/{} stages",
                progress.completed_stages, progress.total_stages
            ))
            .yellow(),
        };
        println!(
            "  {} {} {} {}",
            style(record.short_id()).cyan(),
            style(record.started_at.format("%Y-%m-%d %H:%M")).dim(),
            state,
            style(describe_selection(&record.selection)).dim()
        );
    }
    println!();
}

fn print_detail(record: &RunRecord) {
    let progress = record.progress();
    println!();
    println!("{} {}", style("Run").bold(), style(record.run_id).cyan());
    println!("  Repository: {}", record.repository.path.display());
    println!("  Selection:  {}", describe_selection(&record.selection));
    println!("  Policy:     {}", record.skipped_strategy);
    println!("  Started:    {}", record.started_at.to_rfc3339());
    if let Some(ended) = record.ended_at {
        println!("  Ended:      {}", ended.to_rfc3339());
    }
    println!(
        "  Progress:   {}/{} ({:.0}%)",
        progress.completed_stages, progress.total_stages, progress.percentage
    );
    println!();

    for stage in PipelineStageKind::ALL {
        let status = progress
            .stage_statuses
            .get(&stage)
            .copied()
            .unwrap_or(StageStatus::Pending);
        let mut line = format!("  {}{}", status_icon(status), stage.label());
        if let Some(result) = record.results.get(&stage) {
            line.push_str(&format!(
                " {}{}",
                CLOCK,
                style(format_duration(result.duration)).dim()
            ));
        }
        println!("{}", line);
        if let Some(result) = record.results.get(&stage) {
            for error in &result.errors {
                println!("      {}", style(error).red());
            }
            for warning in &result.warnings {
                println!("      {}{}", WARNING, style(warning).yellow());
            }
        }
    }
    println!();
}

pub fn cmd_status(project_dir: &Path, run: Option<&str>, json: bool) -> Result<()> {
    let runs_dir = testsmith::init::get_testsmith_dir(project_dir).join("runs");
    let store = RunStore::new(&runs_dir);

    match run {
        Some(id) => {
            let record = store.load(id)?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&record).context("Failed to serialize run")?
                );
            } else {
                print_detail(&record);
            }
        }
        None => {
            let records = store.list()?;
            if json {
                let summaries: Vec<_> = records
                    .iter()
                    .map(|r| {
                        serde_json::json!({
                            "run_id": r.run_id,
                            "started_at": r.started_at,
                            "ended_at": r.ended_at,
                            "progress": r.progress(),
                        })
                    })
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&summaries).context("Failed to serialize runs")?
                );
            } else if records.is_empty() {
                println!("No runs yet. Start one with 'testsmith run'.");
            } else {
                print_overview(&records);
            }
        }
    }

    Ok(())
}
