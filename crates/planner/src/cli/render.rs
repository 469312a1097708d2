//! # Rendering Module
//!
//! Plain-text terminal output. Layout math (column widths, Unicode-aware
//! truncation, time alignment) lives here; styling goes through `console`, which
//! drops colors when stdout is not a terminal.
//!
//! Every `render_*` function returns a `String` so tests can compare output without
//! capturing stdout.

use chrono::{DateTime, Utc};
use console::style;
use plannerapp::cache::EntrySummary;
use plannerapp::commands::{MessageLevel, SyncMessage};
use plannerapp::model::{ProfileFields, Record, Schema};
use plannerapp::view::RecordState;
use std::path::Path;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

pub const LINE_WIDTH: usize = 100;
pub const COL_ID: usize = 6;
pub const TIME_WIDTH: usize = 14;
pub const UNSAVED_MARKER: &str = "*";

/// One list row: the record plus its sync state in the surface that showed it.
pub struct Row<'a, S> {
    pub record: &'a Record<S>,
    pub state: RecordState,
}

/// Renders a resource list, one record per line.
pub fn render_list<S: Schema>(rows: &[Row<'_, S>], has_more: bool) -> String {
    let label = S::KIND.label();
    if rows.is_empty() {
        return format!("No {}s found.\n", label);
    }

    let mut out = String::new();
    for row in rows {
        let id = format!("{:>width$}.", row.record.id.as_str(), width = COL_ID);
        let marker = if row.state == RecordState::Confirmed {
            " "
        } else {
            UNSAVED_MARKER
        };
        let title_width = LINE_WIDTH.saturating_sub(COL_ID + 3);
        let title = truncate_to_width(&row.record.fields.summary(), title_width);
        out.push_str(&format!("{}{} {}\n", style(id).dim(), marker, title));
    }
    if has_more {
        out.push_str(&format!(
            "{}\n",
            style(format!("More {}s available; pass --all to show them.", label)).dim()
        ));
    }
    out
}

/// Renders the profile as aligned `Label: value` lines.
pub fn render_profile(record: &Record<ProfileFields>) -> String {
    let fields = &record.fields;
    let name = fields.summary();
    let gpa = fields.gpa.map(|g| format!("{:.2}", g));
    let interests = (!fields.interests.is_empty()).then(|| fields.interests.join(", "));
    let lines = [
        ("School", fields.school.as_deref()),
        ("Grade", fields.grade_level.as_deref()),
        ("GPA", gpa.as_deref()),
        ("Intended major", fields.intended_major.as_deref()),
        ("Interests", interests.as_deref()),
    ];

    let mut out = format!("{}\n", style(name).bold());
    for (label, value) in lines {
        if let Some(value) = value {
            out.push_str(&format!("  {:<16}{}\n", format!("{}:", label), value));
        }
    }
    out
}

/// Renders cached entries with their age relative to `now`.
pub fn render_cache_status(dir: &Path, entries: &[EntrySummary], now: DateTime<Utc>) -> String {
    let mut out = format!("Cache: {}\n", dir.display());
    if entries.is_empty() {
        out.push_str("  (empty)\n");
        return out;
    }
    let key_width = entries.iter().map(|e| e.key.width()).max().unwrap_or(0);
    for entry in entries {
        let age = match entry.fetched_at {
            Some(at) => format_time_ago(at, now),
            None => format!("{:>width$}", "unreadable", width = TIME_WIDTH),
        };
        let freshness = if entry.fresh {
            style("fresh").green()
        } else {
            style("stale").yellow()
        };
        out.push_str(&format!(
            "  {:<kw$}  {:>4} records  {}  {}\n",
            entry.key,
            entry.records,
            age,
            freshness,
            kw = key_width
        ));
    }
    out
}

/// Renders sync messages, one per line, styled by level.
pub fn render_messages(messages: &[SyncMessage]) -> String {
    let mut out = String::new();
    for message in messages {
        let line = match message.level {
            MessageLevel::Info => style(message.content.as_str()).dim(),
            MessageLevel::Success => style(message.content.as_str()).green(),
            MessageLevel::Warning => style(message.content.as_str()).yellow(),
            MessageLevel::Error => style(message.content.as_str()).red().bold(),
        };
        out.push_str(&format!("{}\n", line));
    }
    out
}

pub fn print_messages(messages: &[SyncMessage]) {
    let output = render_messages(messages);
    if !output.is_empty() {
        print!("{}", output);
    }
}

/// Cuts `text` to at most `max` columns, ending with an ellipsis when shortened.
pub fn truncate_to_width(text: &str, max: usize) -> String {
    if text.width() <= max {
        return text.to_string();
    }
    let mut out = String::new();
    let mut width = 0;
    for ch in text.chars() {
        let w = ch.width().unwrap_or(0);
        if width + w + 1 > max {
            break;
        }
        out.push(ch);
        width += w;
    }
    out.push('…');
    out
}

fn format_time_ago(timestamp: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let duration = now.signed_duration_since(timestamp);
    let formatter = timeago::Formatter::new();
    let time_str = formatter.convert(duration.to_std().unwrap_or_default());

    // Align units with "seconds" (7 chars) so the column lines up.
    let time_str = time_str
        .replace("hours ago", "  hours ago")
        .replace("hour ago", "   hour ago")
        .replace("days ago", "   days ago")
        .replace("day ago", "    day ago")
        .replace("weeks ago", "  weeks ago")
        .replace("week ago", "   week ago")
        .replace("months ago", " months ago")
        .replace("month ago", "  month ago")
        .replace("years ago", "  years ago")
        .replace("year ago", "   year ago");

    format!("{:>width$}", time_str, width = TIME_WIDTH)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use plannerapp::model::{Goal, Note};

    fn plain(text: String) -> String {
        console::strip_ansi_codes(&text).into_owned()
    }

    #[test]
    fn test_render_list_empty() {
        let rows: Vec<Row<'_, Goal>> = Vec::new();
        assert_eq!(plain(render_list(&rows, false)), "No goals found.\n");
    }

    #[test]
    fn test_render_list_rows_and_markers() {
        let confirmed = Record::new("7", Goal::new("Finish FAFSA", "Academic"));
        let pending = Record::new("12", Goal::new("SAT prep", ""));
        let rows = vec![
            Row {
                record: &confirmed,
                state: RecordState::Confirmed,
            },
            Row {
                record: &pending,
                state: RecordState::Unconfirmed,
            },
        ];
        let out = plain(render_list(&rows, true));
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "     7.  Finish FAFSA [Academic]");
        assert_eq!(lines[1], "    12.* SAT prep");
        assert!(lines[2].contains("--all"));
    }

    #[test]
    fn test_long_titles_are_truncated() {
        let long = Record::new("1", Note::new("x".repeat(300)));
        let rows = vec![Row {
            record: &long,
            state: RecordState::Confirmed,
        }];
        let out = plain(render_list(&rows, false));
        let line = out.lines().next().unwrap();
        assert_eq!(line.width(), LINE_WIDTH);
        assert!(line.ends_with('…'));
    }

    #[test]
    fn test_truncate_to_width_is_unicode_aware() {
        assert_eq!(truncate_to_width("short", 10), "short");
        assert_eq!(truncate_to_width("abcdefgh", 5), "abcd…");
        // Wide characters take two columns each.
        assert_eq!(truncate_to_width("日本語テキスト", 7), "日本語…");
    }

    #[test]
    fn test_render_profile_skips_missing_fields() {
        let profile = Record::new(
            "me",
            ProfileFields {
                first_name: Some("Ana".into()),
                last_name: Some("Diaz".into()),
                gpa: Some(3.8),
                interests: vec!["robotics".into(), "music".into()],
                ..Default::default()
            },
        );
        let out = plain(render_profile(&profile));
        assert!(out.starts_with("Ana Diaz\n"));
        assert!(out.contains("GPA:            3.80"));
        assert!(out.contains("Interests:      robotics, music"));
        assert!(!out.contains("School"));
    }

    #[test]
    fn test_render_cache_status() {
        let now = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
        let entries = vec![
            EntrySummary {
                key: "goals".into(),
                records: 12,
                fetched_at: Some(now - chrono::Duration::minutes(2)),
                fresh: true,
            },
            EntrySummary {
                key: "notes?search=fafsa".into(),
                records: 0,
                fetched_at: None,
                fresh: false,
            },
        ];
        let out = plain(render_cache_status(Path::new("/tmp/cache"), &entries, now));
        assert!(out.starts_with("Cache: /tmp/cache\n"));
        assert!(out.contains("goals                 12 records"));
        assert!(out.contains("minutes ago  fresh"));
        assert!(out.contains("unreadable  stale"));
    }

    #[test]
    fn test_render_cache_status_empty() {
        let out = plain(render_cache_status(Path::new("/c"), &[], Utc::now()));
        assert_eq!(out, "Cache: /c\n  (empty)\n");
    }

    #[test]
    fn test_render_messages() {
        let messages = vec![
            SyncMessage::success("Saved goal \"SAT prep\""),
            SyncMessage::error("Could not save goal 3"),
        ];
        assert_eq!(
            plain(render_messages(&messages)),
            "Saved goal \"SAT prep\"\nCould not save goal 3\n"
        );
    }
}
