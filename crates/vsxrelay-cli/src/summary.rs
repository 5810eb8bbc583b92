use std::fmt::Write as _;
use std::io::IsTerminal;

use vsxrelay_core::{ItemReport, RunSummary, Stage};

use crate::styles as s;

/// Prints per-item results to stdout and the failure summary to stderr.
pub fn print(summary: &RunSummary, verbose: bool) {
    print!(
        "{}",
        render_items(summary, verbose || summary.dry_run, std::io::stdout().is_terminal())
    );
    if let Some(failures) = render_failures(summary, std::io::stderr().is_terminal()) {
        eprint!("{failures}");
    }
}

pub fn render_items(summary: &RunSummary, with_steps: bool, color: bool) -> String {
    let width = summary
        .items
        .iter()
        .map(|item| item.extension.to_string().len())
        .max()
        .unwrap_or_default();

    let mut out = String::new();
    for item in &summary.items {
        let _ = writeln!(
            out,
            "{:<width$}  {}",
            item.extension.to_string(),
            status(item, summary.dry_run, color)
        );
        if with_steps {
            for step in &item.steps {
                let _ = writeln!(out, "  {}", s::paint(s::DESC, step, color));
            }
        }
    }
    out
}

/// `None` when every item succeeded.
pub fn render_failures(summary: &RunSummary, color: bool) -> Option<String> {
    if summary.is_success() {
        return None;
    }

    let failed: Vec<&ItemReport> = summary.failures().collect();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {} of {} extension(s) failed:",
        s::paint(s::ERROR, "error:", color),
        failed.len(),
        summary.items.len()
    );
    for item in failed {
        let reason = item
            .error
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_default();
        let _ = writeln!(out, "  {}: {}", item.extension.id(), reason);
    }
    Some(out)
}

fn status(item: &ItemReport, dry_run: bool, color: bool) -> String {
    match (item.stage, dry_run) {
        (Stage::Failed, _) => s::paint(s::ERROR, "failed", color),
        (stage, true) => s::paint(s::PLANNED, &format!("planned ({stage})"), color),
        (stage, false) => s::paint(s::SUCCESS, stage.as_str(), color),
    }
}
