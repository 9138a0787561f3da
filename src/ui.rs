use std::time::Duration;

use ratatui::prelude::*;
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Paragraph};

use crate::snapshot::{RenderSnapshot, ViewRow, VisibleRow};
use crate::theme::Theme;
use crate::timeline::{EntryKind, EntryStatus, TimelineEntry};

const TITLE_HEIGHT: u16 = 1;
const STATUS_HEIGHT: u16 = 1;
/// Rows kept free below the entries for the docked hero and the card.
const PINNED_ROWS: u16 = 2;
const STATUS_HELP_TEXT: &str =
    "Shift+Up/Down fork | Esc cancel | Up/Down select | Ctrl+K stop | /find <text>";

/// Number of entry rows that fit in a terminal of `height` lines.
pub fn timeline_rows(height: u16) -> usize {
    height
        .saturating_sub(TITLE_HEIGHT + STATUS_HEIGHT + PINNED_ROWS)
        .max(1) as usize
}

/// Maps a terminal row to an index into the rendered timeline rows.
pub fn timeline_row_at(y: u16) -> Option<usize> {
    y.checked_sub(TITLE_HEIGHT).map(usize::from)
}

pub fn render(frame: &mut Frame, snapshot: &RenderSnapshot<'_>, theme: &Theme) {
    let [title, body, status] = Layout::vertical([
        Constraint::Length(TITLE_HEIGHT),
        Constraint::Min(0),
        Constraint::Length(STATUS_HEIGHT),
    ])
    .areas(frame.area());

    frame.render_widget(
        Paragraph::new(title_text(snapshot))
            .style(Style::default().bg(theme.status_bg).fg(theme.muted_fg)),
        title,
    );

    let lines: Vec<Line> = snapshot
        .rows
        .iter()
        .map(|row| match row {
            ViewRow::Entry(row) => entry_line(row, theme),
            ViewRow::InstructionsCard { forked } => card_line(*forked, snapshot.draft, theme),
        })
        .collect();
    frame.render_widget(
        Paragraph::new(lines)
            .style(Style::default().bg(theme.timeline_bg).fg(theme.text_fg))
            .block(Block::default().style(Style::default().bg(theme.timeline_bg))),
        body,
    );

    frame.render_widget(
        Paragraph::new(status_line(snapshot, theme))
            .style(Style::default().bg(theme.status_bg).fg(theme.muted_fg)),
        status,
    );
}

fn title_text(snapshot: &RenderSnapshot<'_>) -> String {
    let mut text = format!("Activity ({} entries)", snapshot.viewport.total);
    if let Some(index) = snapshot.fork.fork_index {
        text.push_str(&format!(
            " | forking after #{index}, {} discarded",
            snapshot.fork.discarded
        ));
    }
    text
}

fn status_line(snapshot: &RenderSnapshot<'_>, theme: &Theme) -> Line<'static> {
    let mut spans = Vec::new();
    if snapshot.connection.is_connected() {
        spans.push(Span::styled("● connected", Style::default().fg(theme.completed_fg)));
    } else {
        spans.push(Span::styled(
            "○ disconnected",
            Style::default().fg(theme.failed_fg),
        ));
    }
    if snapshot.counters.malformed_events > 0 {
        spans.push(Span::raw(format!(
            " | {} dropped",
            snapshot.counters.malformed_events
        )));
    }
    if snapshot.viewport.activity_below && !snapshot.viewport.auto_follow {
        spans.push(Span::styled(
            " | ↓ new activity below",
            Style::default().fg(theme.running_fg),
        ));
    }
    if let Some(search) = snapshot.search {
        let current = search.current.map_or(0, |index| index + 1);
        spans.push(Span::raw(format!(
            " | find '{}' {current}/{}",
            search.query, search.matches
        )));
    }
    spans.push(Span::raw(format!(" | {STATUS_HELP_TEXT}")));
    Line::from(spans)
}

fn entry_line(row: &VisibleRow<'_>, theme: &Theme) -> Line<'static> {
    let entry = row.entry;
    let mut style = Style::default().fg(status_color(entry.status, theme));
    if row.is_hero {
        style = style.fg(theme.hero_fg).add_modifier(Modifier::BOLD);
    }
    if row.discarded {
        style = style.fg(theme.discarded_fg).add_modifier(Modifier::DIM);
    }
    if row.selected {
        style = style.bg(theme.selected_bg);
    }
    if row.search_hit {
        style = style.add_modifier(Modifier::UNDERLINED);
    }

    let marker = if row.hero_docked { "⇣ " } else { "  " };
    let mut text = format!("{marker}{} {}", status_glyph(entry.status), entry_label(entry));
    let timed = !matches!(entry.kind, EntryKind::Thought { .. });
    if let Some(elapsed) = row.elapsed.filter(|_| timed) {
        text.push_str(&format!("  {}", format_elapsed(elapsed)));
    }
    Line::styled(text, style)
}

fn card_line(forked: bool, draft: &str, theme: &Theme) -> Line<'static> {
    let prefix = if forked { "⑂ new instructions here" } else { "›" };
    Line::styled(
        format!("{prefix} {draft}▏"),
        Style::default().bg(theme.card_bg).fg(theme.text_fg),
    )
}

fn status_glyph(status: EntryStatus) -> &'static str {
    match status {
        EntryStatus::Pending => "…",
        EntryStatus::Running => "●",
        EntryStatus::Completed => "✓",
        EntryStatus::Failed => "✗",
    }
}

fn status_color(status: EntryStatus, theme: &Theme) -> Color {
    match status {
        EntryStatus::Pending => theme.muted_fg,
        EntryStatus::Running => theme.running_fg,
        EntryStatus::Completed => theme.text_fg,
        EntryStatus::Failed => theme.failed_fg,
    }
}

/// One-line summary of an entry.
pub fn entry_label(entry: &TimelineEntry) -> String {
    match &entry.kind {
        EntryKind::ToolUse {
            tool_name,
            command_segments,
            exit_codes,
            output_size,
            last_line,
        } => {
            let mut label = format!("{tool_name}: {}", command_segments.join(" | "));
            if let Some(last_line) = last_line {
                label.push_str(&format!(" · {last_line}"));
            }
            if output_size.lines > 0 {
                label.push_str(&format!(" ({} lines)", output_size.lines));
            }
            if let Some(code) = exit_codes.iter().find(|code| **code != 0) {
                label.push_str(&format!(" [exit {code}]"));
            }
            label
        }
        EntryKind::FileEdit {
            path,
            lines_added,
            lines_removed,
        } => format!("Edited {path} +{lines_added} -{lines_removed}"),
        EntryKind::FileRead { path, ranges } => {
            let ranges: Vec<String> = ranges
                .iter()
                .map(|(start, end)| format!("{start}-{end}"))
                .collect();
            if ranges.is_empty() {
                format!("Read {path}")
            } else {
                format!("Read {path} L{}", ranges.join(","))
            }
        }
        EntryKind::Deleted { paths } => format!("Deleted {}", paths.join(", ")),
        EntryKind::Thought { markdown_body } => {
            markdown_body.lines().next().unwrap_or_default().to_string()
        }
        EntryKind::UserInstruction {
            author,
            text,
            confirmed,
        } => {
            let pending = if *confirmed { "" } else { " (sending)" };
            format!("{author}: {text}{pending}")
        }
        EntryKind::TaskCompleted { summary } => format!("Done: {summary}"),
    }
}

pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    if secs >= 60 {
        format!("{}m{:02}s", secs / 60, secs % 60)
    } else {
        format!("{:.1}s", elapsed.as_secs_f64())
    }
}

#[cfg(test)]
#[path = "../tests/unit/ui_tests.rs"]
mod tests;
