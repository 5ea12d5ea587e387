use chrono::{DateTime, Utc};
use codeloft::api::{CmdMessage, FileSummary, HealthReport, MessageLevel};
use codeloft::chat::ChatSession;
use codeloft::commands::chat::short_id;
use codeloft::config::{LoftConfig, KEYS};
use codeloft::executor::{ExecutedCommand, Outcome};
use codeloft::model::FileEntry;
use codeloft::parser::AiCommand;
use codeloft::recovery::deployment::ProbeStatus;
use codeloft::save_queue::{Conflict, HistoryEntry};
use colored::Colorize;
use timeago::Formatter;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const FALLBACK_WIDTH: usize = 100;
const TIME_WIDTH: usize = 16;
const PENDING_MARKER: &str = "●";

fn line_width() -> usize {
    match console::Term::stdout().size_checked() {
        Some((_, cols)) if cols > 20 => cols as usize,
        _ => FALLBACK_WIDTH,
    }
}

pub(super) fn print_messages(messages: &[CmdMessage]) {
    for message in messages {
        match message.level {
            MessageLevel::Info => println!("{}", message.content.dimmed()),
            MessageLevel::Success => println!("{}", message.content.green()),
            MessageLevel::Warning => println!("{}", message.content.yellow()),
            MessageLevel::Error => println!("{}", message.content.red()),
        }
    }
}

pub(super) fn print_files(files: &[FileSummary]) {
    let width = line_width();
    for file in files {
        let marker = if file.pending {
            PENDING_MARKER.yellow().to_string()
        } else {
            " ".to_string()
        };
        let stats = format!("{:>10} {:>5} lines", file.language, file.lines);
        let available = width.saturating_sub(stats.width() + 4);
        let name = truncate_to_width(&file.filename, available);
        let padding = available.saturating_sub(name.width());
        let name = if file.selected {
            name.bold().to_string()
        } else if file.open {
            name
        } else {
            name.dimmed().to_string()
        };
        println!("{} {}{} {}", marker, name, " ".repeat(padding), stats.dimmed());
    }
}

pub(super) fn print_file(file: &FileEntry) {
    print!("{}", file.content);
    if !file.content.is_empty() && !file.content.ends_with('\n') {
        println!();
    }
}

pub(super) fn print_commands(commands: &[AiCommand]) {
    for (i, command) in commands.iter().enumerate() {
        let how = if command.is_explicit {
            "explicit".to_string()
        } else {
            format!("inferred, {}", command.confidence)
        };
        println!(
            "{}. {:<8}{} {}",
            i + 1,
            command.action().cyan(),
            command.filename(),
            format!("({})", how).dimmed()
        );
    }
}

pub(super) fn print_commands_json(commands: &[AiCommand]) -> codeloft::error::Result<()> {
    println!("{}", serde_json::to_string_pretty(commands)?);
    Ok(())
}

pub(super) fn print_executed(executed: &[ExecutedCommand]) {
    for item in executed {
        let line = match &item.outcome {
            Outcome::Created(path) => format!("{} {}", "+".green(), path),
            Outcome::Updated(path) => format!("{} {}", "~".yellow(), path),
            Outcome::Replaced { path, count } => {
                format!("{} {} ({} replaced)", "~".yellow(), path, count)
            }
            Outcome::Deleted(path) => format!("{} {}", "-".red(), path),
            Outcome::Renamed { from, to } => format!("{} {} -> {}", ">".cyan(), from, to),
        };
        println!("{}", line);
    }
}

pub(super) fn print_conflicts(conflicts: &[(String, Conflict)]) {
    for (filename, conflict) in conflicts {
        println!("{}", filename.yellow().bold());
        println!(
            "  local  {}  {}",
            conflict.local_timestamp.format("%Y-%m-%d %H:%M:%S"),
            preview(&conflict.local, 60).dimmed()
        );
        println!(
            "  remote {}  {}",
            conflict.remote_timestamp.format("%Y-%m-%d %H:%M:%S"),
            preview(&conflict.remote, 60).dimmed()
        );
    }
}

pub(super) fn print_history(history: &[HistoryEntry]) {
    let width = line_width();
    for entry in history.iter().rev() {
        let label = format!("v{:<4}", entry.version);
        let available = width.saturating_sub(label.width() + TIME_WIDTH + 2);
        let text = preview(&entry.content, available);
        let padding = available.saturating_sub(text.width());
        println!(
            "{} {}{} {}",
            label.yellow(),
            text,
            " ".repeat(padding),
            format_time_ago(entry.timestamp).dimmed()
        );
    }
}

pub(super) fn print_diff(diff: &str) {
    for line in diff.lines() {
        if line.starts_with("+++") || line.starts_with("---") {
            println!("{}", line.bold());
        } else if line.starts_with('+') {
            println!("{}", line.green());
        } else if line.starts_with('-') {
            println!("{}", line.red());
        } else if line.starts_with("@@") {
            println!("{}", line.cyan());
        } else {
            println!("{}", line);
        }
    }
}

pub(super) fn print_sessions(sessions: &[ChatSession], current: Option<&str>) {
    let width = line_width();
    for session in sessions {
        let marker = if Some(session.id.as_str()) == current {
            "*".green().to_string()
        } else {
            " ".to_string()
        };
        let count = format!("{:>3} msgs", session.messages.len());
        let available = width.saturating_sub(12 + count.width() + TIME_WIDTH + 3);
        let title = truncate_to_width(&session.title, available);
        let padding = available.saturating_sub(title.width());
        println!(
            "{} {} {}{} {} {}",
            marker,
            short_id(&session.id).yellow(),
            title,
            " ".repeat(padding),
            count.dimmed(),
            format_time_ago(session.updated_at).dimmed()
        );
    }
}

pub(super) fn print_session(session: &ChatSession) {
    println!("{} {}", short_id(&session.id).yellow(), session.title.bold());
    println!("--------------------------------");
    for message in &session.messages {
        println!(
            "{} {}",
            format!("[{}]", message.role).cyan(),
            message.timestamp.format("%Y-%m-%d %H:%M").to_string().dimmed()
        );
        println!("{}\n", message.content);
    }
}

pub(super) fn print_last_message(session: &ChatSession) {
    if let Some(message) = session.messages.last() {
        println!(
            "{} {} {}",
            short_id(&session.id).yellow(),
            format!("[{}]", message.role).cyan(),
            preview(&message.content, 60)
        );
    }
}

pub(super) fn print_health(health: &HealthReport) {
    let score = format!("Health score: {}/100", health.score);
    match health.score {
        90..=100 => println!("{}", score.green().bold()),
        60..=89 => println!("{}", score.yellow().bold()),
        _ => println!("{}", score.red().bold()),
    }
    for probe in &health.probes {
        let status = match &probe.status {
            ProbeStatus::Healthy => "ok".green().to_string(),
            ProbeStatus::Unhealthy(detail) => format!("{} {}", "failed".red(), detail),
            ProbeStatus::Timeout => "timeout".red().to_string(),
        };
        println!("  {:<12} {} {}", probe.name, status, format!("{}ms", probe.elapsed_ms).dimmed());
    }
    if !health.errors.is_empty() {
        println!();
        for (category, count) in &health.errors {
            println!("  {:<12} {}", category.to_string(), count);
        }
    }
    for record in health.recent.iter().rev().take(5) {
        println!(
            "  {} {} {}",
            format_time_ago(record.timestamp).dimmed(),
            format!("[{}]", record.category).yellow(),
            preview(&record.message, 60)
        );
    }
}

pub(super) fn print_config(config: &LoftConfig) {
    for key in KEYS {
        if let Some(value) = config.get(key) {
            println!("{} = {}", key, value);
        }
    }
}

/// First line of `s`, cut to `max_width` columns.
fn preview(s: &str, max_width: usize) -> String {
    let first = s.lines().find(|l| !l.trim().is_empty()).unwrap_or("");
    truncate_to_width(first.trim(), max_width)
}

fn truncate_to_width(s: &str, max_width: usize) -> String {
    if s.width() <= max_width {
        return s.to_string();
    }

    let mut result = String::new();
    let mut current_width = 0;
    for c in s.chars() {
        let char_width = c.width().unwrap_or(0);
        if current_width + char_width > max_width.saturating_sub(1) {
            result.push('…');
            return result;
        }
        result.push(c);
        current_width += char_width;
    }
    result
}

fn format_time_ago(timestamp: DateTime<Utc>) -> String {
    let duration = Utc::now().signed_duration_since(timestamp);
    let time_str = Formatter::new().convert(duration.to_std().unwrap_or_default());
    format!("{:>width$}", time_str, width = TIME_WIDTH)
}
