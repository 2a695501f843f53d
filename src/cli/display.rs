//! Colorized rendering of diff results and sync outcomes (spec §5).
//!
//! Grounded on the teacher's diff-printing style: a short colored marker
//! per line, green for additions, red for removals/deletions, yellow for
//! conflicts needing attention.

use chrono::{Local, TimeZone};
use colored::Colorize;

use fileshare_core::core::diff::{DiffResult, Operation};
use fileshare_core::core::sync::Outcome;

fn format_mtime(epoch_ms: i64) -> String {
    match Local.timestamp_millis_opt(epoch_ms) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        _ => "unknown time".to_string(),
    }
}

fn marker_colored(op: Operation) -> colored::ColoredString {
    use Operation::*;
    match op {
        LocalAdded | RemoteRevert => op.marker().green(),
        LocalDelete | RemoteDelete => op.marker().red(),
        LocalNewer | LocalRevert | RemoteAdded | RemoteNewer => op.marker().yellow(),
    }
}

/// Above this many entries, the list is shown in `$EDITOR` instead of the
/// terminal so a full sync of a large tree doesn't scroll the summary
/// line off-screen.
const EDITOR_OVERFLOW_THRESHOLD: usize = 50;

pub fn print_diff(result: &DiffResult) {
    if result.is_empty() {
        println!("{}", "up to date".green());
        return;
    }

    let total = result.change_count() + result.conflict_count();
    if total > EDITOR_OVERFLOW_THRESHOLD {
        show_in_editor(&render_diff_plain(result));
    } else {
        for change in result.changes() {
            println!("{} {}", marker_colored(change.operation), change.file.path().display());
        }
        for (local, remote) in result.conflicts() {
            println!(
                "{} {} {:?} ({}) / {:?} ({})",
                "!|!".red().bold(),
                local.file.path().display(),
                local.operation,
                format_mtime(local.file.last_write_time()),
                remote.operation,
                format_mtime(remote.file.last_write_time()),
            );
        }
    }

    println!(
        "{} changed, {} conflicting",
        result.change_count(),
        result.conflict_count()
    );
}

fn render_diff_plain(result: &DiffResult) -> String {
    let mut out = String::new();
    for change in result.changes() {
        out.push_str(&format!(
            "{} {}\n",
            change.operation.marker(),
            change.file.path().display()
        ));
    }
    for (local, remote) in result.conflicts() {
        out.push_str(&format!(
            "!|! {} {:?} / {:?}\n",
            local.file.path().display(),
            local.operation,
            remote.operation
        ));
    }
    out
}

fn show_in_editor(content: &str) {
    let result = inquire::Editor::new("more than 50 entries changed, opening in your editor")
        .with_predefined_text(content)
        .prompt();
    if result.is_err() {
        print!("{content}");
    }
}

pub fn print_outcomes(outcomes: &[Outcome]) {
    let mut failures = 0;
    for outcome in outcomes {
        match &outcome.result {
            Ok(()) => println!("{} {}", marker_colored(outcome.operation), outcome.path.display()),
            Err(e) => {
                failures += 1;
                println!("{} {}: {}", "x|x".red().bold(), outcome.path.display(), e);
            }
        }
    }
    if failures > 0 {
        println!("{}", format!("{failures} file(s) failed").red());
    }
}
