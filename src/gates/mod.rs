use crate::pipeline::ConfirmationCallback;
use crate::pipeline::payload::{StagePayload, StrategyRecord};
use console::style;
use dialoguer::{Confirm, theme::ColorfulTheme};
use indicatif::MultiProgress;

/// Interactive confirmation after the strategy stage.
///
/// With `auto_confirm` (the `--yes` flag) every strategy is accepted without
/// prompting. A prompt that cannot be shown, e.g. without a terminal, counts
/// as a decline.
pub struct StrategyGate {
    auto_confirm: bool,
    multi: Option<MultiProgress>,
}

impl StrategyGate {
    pub fn new(auto_confirm: bool) -> Self {
        Self {
            auto_confirm,
            multi: None,
        }
    }

    /// Suspend these progress bars while the prompt is shown.
    pub fn with_multi_progress(mut self, multi: MultiProgress) -> Self {
        self.multi = Some(multi);
        self
    }

    fn prompt(&self, title: &str, payload: &StagePayload) -> bool {
        for line in describe_strategy(payload) {
            println!("{}", line);
        }
        if self.auto_confirm {
            println!("  {} (--yes flag)", style("Auto-confirmed").dim());
            return true;
        }
        Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(title)
            .default(true)
            .interact()
            .unwrap_or(false)
    }
}

impl ConfirmationCallback for StrategyGate {
    fn confirm(&self, title: &str, payload: &StagePayload) -> bool {
        match self.multi {
            Some(ref multi) => multi.suspend(|| self.prompt(title, payload)),
            None => self.prompt(title, payload),
        }
    }
}

/// Lines summarizing a strategy payload for the confirmation prompt.
pub fn describe_strategy(payload: &StagePayload) -> Vec<String> {
    let StagePayload::Strategy(record) = payload else {
        return vec![format!("  {} output", payload.stage())];
    };
    strategy_lines(record)
}

fn strategy_lines(record: &StrategyRecord) -> Vec<String> {
    let mut lines = vec![
        String::new(),
        format!(
            "  {} {}",
            style("Primary approach:").bold(),
            style(record.primary).cyan()
        ),
    ];
    if !record.secondary.is_empty() {
        let secondary: Vec<String> = record.secondary.iter().map(|a| a.to_string()).collect();
        lines.push(format!("  Secondary: {}", secondary.join(", ")));
    }
    if !record.focus_areas.is_empty() {
        lines.push("  Focus areas:".to_string());
        lines.extend(record.focus_areas.iter().map(|a| format!("    - {}", a)));
    }
    if !record.risk_notes.is_empty() {
        lines.push(format!("  {}", style("Risks:").yellow()));
        lines.extend(record.risk_notes.iter().map(|r| format!("    - {}", r)));
    }
    if !record.rationale.is_empty() {
        lines.push(format!("  {}", style(&record.rationale).dim()));
    }
    lines
}
