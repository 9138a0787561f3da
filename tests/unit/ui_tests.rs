use super::*;
use crate::config::TimelineConfig;
use crate::message::Message;
use crate::session::Session;
use ratatui::Terminal;
use ratatui::backend::TestBackend;
use ratatui::buffer::Buffer;
use std::time::Instant;

fn render_text(snapshot: &RenderSnapshot<'_>, width: u16, height: u16) -> String {
    let backend = TestBackend::new(width, height);
    let mut terminal = Terminal::new(backend).expect("test terminal should initialize");
    let theme = Theme::default();
    terminal
        .draw(|frame| render(frame, snapshot, &theme))
        .expect("render should succeed");
    buffer_to_string(terminal.backend().buffer())
}

fn buffer_to_string(buffer: &Buffer) -> String {
    let mut text = String::new();
    for y in 0..buffer.area.height {
        for x in 0..buffer.area.width {
            text.push_str(buffer[(x, y)].symbol());
        }
        text.push('\n');
    }
    text
}

fn session_with_rows(rows: usize) -> Session {
    let mut config = TimelineConfig::default();
    config.viewport.rows = rows;
    Session::new(&config)
}

#[test]
fn renders_entries_card_and_status() {
    let mut session = session_with_rows(10);
    let now = Instant::now();
    session.handle(
        Message::ToolStarted {
            id: "A".into(),
            tool_name: "bash".to_string(),
            command: "cargo build".to_string(),
        },
        now,
    );
    session.handle(
        Message::FileEditObserved {
            id: "e".into(),
            path: "src/lib.rs".to_string(),
            lines_added: 4,
            lines_removed: 2,
        },
        now,
    );

    let text = render_text(&session.snapshot(now), 100, 14);
    assert!(text.contains("Activity (2 entries)"));
    assert!(text.contains("bash: cargo build"));
    assert!(text.contains("Edited src/lib.rs +4 -2"));
    assert!(text.contains("● connected"));
    assert!(text.contains("›"));
}

#[test]
fn renders_fork_header_and_disconnected_status() {
    let mut session = session_with_rows(10);
    let now = Instant::now();
    for i in 0..3 {
        session.handle(
            Message::TaskCompleted {
                id: format!("t{i}").as_str().into(),
                summary: format!("step {i}"),
            },
            now,
        );
    }
    session.move_fork_up();
    session.handle(
        Message::ConnectionError {
            reason: "eof".to_string(),
        },
        now,
    );

    let text = render_text(&session.snapshot(now), 100, 14);
    assert!(text.contains("forking after #1, 1 discarded"));
    assert!(text.contains("new instructions here"));
    assert!(text.contains("○ disconnected"));
}

#[test]
fn timeline_geometry_helpers() {
    assert_eq!(timeline_rows(30), 26);
    assert_eq!(timeline_rows(2), 1);
    assert_eq!(timeline_row_at(0), None);
    assert_eq!(timeline_row_at(1), Some(0));
}

#[test]
fn formats_elapsed_durations() {
    assert_eq!(format_elapsed(Duration::from_millis(1500)), "1.5s");
    assert_eq!(format_elapsed(Duration::from_secs(65)), "1m05s");
}

#[test]
fn labels_tool_entries_with_pipeline_and_exit() {
    let mut session = Session::default();
    let now = Instant::now();
    session.handle(
        Message::ToolStarted {
            id: "A".into(),
            tool_name: "bash".to_string(),
            command: "cargo test | grep fail".to_string(),
        },
        now,
    );
    session.handle(
        Message::ToolCompleted {
            id: "A".into(),
            exit_codes: vec![0, 1],
            output: "1 failed\n".to_string(),
            summary: None,
        },
        now,
    );
    let entry = session.store().entry_at(0).expect("entry");
    assert_eq!(
        entry_label(entry),
        "bash: cargo test | grep fail · 1 failed (1 lines) [exit 1]"
    );
}
