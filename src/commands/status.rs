use anyhow::Result;
use chrono::{DateTime, Local, NaiveDate, Utc};
use console::{pad_str, style, Alignment, StyledObject};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use crate::config::Config;
use crate::git::GitClient;
use crate::status::{get_addon_states, AddonState, AddonStatus};

/// Dates further away than this are shown with their year
const NATURAL_DATE_MAX_DAYS: i64 = 150;

/// Handle the status command
/// Without `verbose`, up-to-date addons are only counted
pub fn handle<W: Write>(
    config: &Config,
    git: Arc<dyn GitClient>,
    addons_dir: &Path,
    verbose: bool,
    output: &mut W,
) -> Result<()> {
    let states = get_addon_states(config, addons_dir, git)?;
    let today = Local::now().date_naive();
    write_report(&states, verbose, today, output)
}

fn write_report<W: Write>(
    states: &[AddonState],
    verbose: bool,
    today: NaiveDate,
    output: &mut W,
) -> Result<()> {
    if states.is_empty() {
        writeln!(output, "No addons found")?;
        return Ok(());
    }

    let has_error = states.iter().any(|s| s.error.is_some());

    let mut headers = vec!["addon", "status", "released_at", "installed_at"];
    if has_error {
        headers.push("error");
    }

    let rows: Vec<Vec<String>> = states
        .iter()
        .filter(|s| verbose || s.status != AddonStatus::UpToDate)
        .map(|s| {
            let mut row = vec![
                s.name.clone(),
                colored(s.status).to_string(),
                format_date(s.released_at, today),
                format_date(s.installed_at, today),
            ];
            if has_error {
                row.push(s.error.clone().unwrap_or_default());
            }
            row
        })
        .collect();

    if !rows.is_empty() {
        write_table(&headers, &rows, output)?;
    }

    if !verbose {
        let up_to_date = states
            .iter()
            .filter(|s| s.status == AddonStatus::UpToDate)
            .count();
        if up_to_date > 0 {
            let other = if rows.is_empty() { "" } else { " other" };
            let message = format!("{}{} addons are up to date", up_to_date, other);
            writeln!(output, "{}", style(message).green())?;
        }
    }

    Ok(())
}

fn colored(status: AddonStatus) -> StyledObject<&'static str> {
    let text = style(status.as_str());
    match status {
        AddonStatus::Error | AddonStatus::Missing => text.red(),
        AddonStatus::Modified => text.magenta(),
        AddonStatus::Outdated | AddonStatus::Unknown => text.yellow(),
        AddonStatus::Untracked => text.cyan(),
        AddonStatus::UpToDate => text.green(),
    }
}

/// "today", "yesterday", "Mar 04", or "Mar 04 2021" for distant dates
fn format_date(value: Option<DateTime<Utc>>, today: NaiveDate) -> String {
    let Some(value) = value else {
        return String::new();
    };

    let date = value.with_timezone(&Local).date_naive();
    let days = (date - today).num_days();
    match days {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        -1 => "yesterday".to_string(),
        d if d.abs() >= NATURAL_DATE_MAX_DAYS => date.format("%b %d %Y").to_string(),
        _ => date.format("%b %d").to_string(),
    }
}

/// Render rows as a bordered table; cell widths ignore ANSI color codes
fn write_table<W: Write>(headers: &[&str], rows: &[Vec<String>], output: &mut W) -> Result<()> {
    let mut widths: Vec<usize> = headers.iter().map(|h| console::measure_text_width(h)).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(console::measure_text_width(cell));
        }
    }

    writeln!(output, "{}", table_rule(&widths, '+'))?;
    writeln!(output, "{}", table_line(headers.iter().copied(), &widths))?;
    writeln!(output, "{}", table_rule(&widths, '|'))?;
    for row in rows {
        writeln!(output, "{}", table_line(row.iter().map(String::as_str), &widths))?;
    }
    writeln!(output, "{}", table_rule(&widths, '+'))?;

    Ok(())
}

fn table_rule(widths: &[usize], edge: char) -> String {
    let segments: Vec<String> = widths.iter().map(|w| "-".repeat(w + 2)).collect();
    format!("{}{}{}", edge, segments.join("+"), edge)
}

fn table_line<'a>(cells: impl Iterator<Item = &'a str>, widths: &[usize]) -> String {
    let cells: Vec<String> = cells
        .zip(widths)
        .map(|(cell, width)| format!(" {} ", pad_str(cell, *width, Alignment::Left, None)))
        .collect();
    format!("|{}|", cells.join("|"))
}
