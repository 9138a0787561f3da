use super::*;
use crate::mailbox::Mailbox;
use crate::timeline::{EntryKind, EntryStatus, TimelineStore};
use std::io::{Cursor, Write};
use std::time::Instant;

#[test]
fn decodes_tool_lifecycle_notifications() {
    let started = decode_line(1, r#"{"type":"tool_started","id":"A","command":"ls -la"}"#)
        .expect("decode");
    assert_eq!(
        started.into_message(),
        Message::ToolStarted {
            id: "A".into(),
            tool_name: "shell".to_string(),
            command: "ls -la".to_string(),
        }
    );

    let progress =
        decode_line(2, r#"{"type":"tool_progress","id":"A","line":"total 8"}"#).expect("decode");
    assert_eq!(
        progress.into_message(),
        Message::ToolProgress {
            id: "A".into(),
            line: "total 8".to_string(),
            bytes: 7,
        }
    );

    let completed = decode_line(
        3,
        r#"{"type":"tool_completed","id":"A","exit_code":2,"summary":"boom"}"#,
    )
    .expect("decode");
    assert_eq!(
        completed.into_message(),
        Message::ToolCompleted {
            id: "A".into(),
            exit_codes: vec![2],
            output: String::new(),
            summary: Some("boom".to_string()),
        }
    );
}

#[test]
fn decodes_file_and_log_notifications() {
    let read = decode_line(
        1,
        r#"{"type":"file_read","id":"r","path":"src/main.rs","ranges":[[1,40]]}"#,
    )
    .expect("decode");
    assert_eq!(
        read.into_message(),
        Message::FileReadObserved {
            id: "r".into(),
            path: "src/main.rs".to_string(),
            ranges: vec![(1, 40)],
        }
    );

    let log = decode_line(2, r#"{"type":"log","message":"retrying"}"#).expect("decode");
    assert_eq!(
        log.into_message(),
        Message::Log {
            id: None,
            level: LogLevel::Info,
            message: "retrying".to_string(),
        }
    );

    let ack = decode_line(3, r#"{"type":"user_input_ack","text":"ship it"}"#).expect("decode");
    assert_eq!(
        ack.into_message(),
        Message::UserInputAcknowledged {
            id: None,
            author: "agent".to_string(),
            text: "ship it".to_string(),
        }
    );
}

#[test]
fn decode_errors_carry_line_number() {
    let err = decode_line(7, r#"{"type":"teleport"}"#).expect_err("unknown type");
    assert!(matches!(err, AdapterError::Decode { line: 7, .. }));
    assert!(err.to_string().starts_with("line 7:"));
}

#[test]
fn replay_skips_bad_lines_and_blank_lines() {
    let mailbox = Mailbox::new();
    let producer = mailbox.producer().expect("producer");
    let input = concat!(
        "{\"type\":\"thought\",\"id\":\"t\",\"text\":\"hi\",\"done\":true}\n",
        "\n",
        "not json\n",
        "{\"type\":\"connection_restored\"}\n",
    );
    let summary =
        replay_lines(Cursor::new(input), &producer, Duration::ZERO).expect("replay succeeds");
    assert_eq!(
        summary,
        ReplaySummary {
            delivered: 2,
            skipped: 1
        }
    );
    assert_eq!(mailbox.drain().len(), 2);
}

#[test]
fn spawn_replay_reads_a_file() {
    let mailbox = Mailbox::new();
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        file,
        r#"{{"type":"file_edit","id":"e","path":"a.rs","lines_added":2}}"#
    )
    .expect("write");
    let summary = spawn_replay(
        file.path().to_path_buf(),
        mailbox.producer().expect("producer"),
        Duration::ZERO,
    )
    .join()
    .expect("replay thread")
    .expect("replay ok");
    assert_eq!(summary.delivered, 1);
    assert!(matches!(
        mailbox.drain().as_slice(),
        [Message::FileEditObserved { lines_added: 2, .. }]
    ));
}

#[test]
fn spawn_replay_reports_missing_file_as_connection_error() {
    let mailbox = Mailbox::new();
    let result = spawn_replay(
        PathBuf::from("/definitely/not/a/replay.jsonl"),
        mailbox.producer().expect("producer"),
        Duration::ZERO,
    )
    .join()
    .expect("replay thread");
    assert!(matches!(result, Err(AdapterError::Io(_))));
    assert!(matches!(
        mailbox.drain().as_slice(),
        [Message::ConnectionError { .. }]
    ));
}

#[test]
fn exec_streams_output_then_completes() {
    let mailbox = Mailbox::new();
    let mut store = TimelineStore::new();
    let key = store.append(
        "run".into(),
        EntryKind::tool("bash", "printf"),
        EntryStatus::Running,
        Instant::now(),
    );
    let producer = mailbox.producer().expect("producer");
    let handle = StreamHandle::new(key, store.lease(key).expect("lease"), producer.clone());

    spawn_exec(
        "printf 'one\\ntwo\\n'".to_string(),
        "run".into(),
        handle,
        producer,
        CancelToken::new(),
    )
    .join()
    .expect("exec thread");

    let messages = mailbox.drain();
    let chunks: Vec<&str> = messages
        .iter()
        .filter_map(|message| match message {
            Message::StreamDelta { chunk, .. } => Some(chunk.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(chunks, vec!["one", "two"]);
    assert!(matches!(
        messages.last(),
        Some(Message::ToolCompleted { exit_codes, summary: None, .. }) if exit_codes == &vec![0]
    ));
}
