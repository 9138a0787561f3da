use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::AdapterError;
use crate::mailbox::Producer;
use crate::message::{CorrelationId, LogLevel, Message};
use crate::stream::{CancelToken, StreamHandle, spawn_output_pump};

const EXEC_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Wire form of an already-parsed session update, one JSON object per line.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    Thought {
        id: CorrelationId,
        text: String,
        #[serde(default)]
        done: bool,
    },
    ToolStarted {
        id: CorrelationId,
        #[serde(default = "default_tool_name")]
        tool_name: String,
        command: String,
    },
    ToolProgress {
        id: CorrelationId,
        line: String,
        #[serde(default)]
        bytes: Option<u64>,
    },
    ToolCompleted {
        id: CorrelationId,
        #[serde(default)]
        exit_codes: Vec<i32>,
        #[serde(default)]
        exit_code: Option<i32>,
        #[serde(default)]
        output: String,
        #[serde(default)]
        summary: Option<String>,
    },
    FileEdit {
        id: CorrelationId,
        path: String,
        #[serde(default)]
        lines_added: usize,
        #[serde(default)]
        lines_removed: usize,
    },
    FileRead {
        id: CorrelationId,
        path: String,
        #[serde(default)]
        ranges: Vec<(usize, usize)>,
    },
    FilesDeleted {
        id: CorrelationId,
        paths: Vec<String>,
    },
    Log {
        #[serde(default)]
        id: Option<CorrelationId>,
        #[serde(default = "default_log_level")]
        level: LogLevel,
        message: String,
    },
    UserInput {
        id: CorrelationId,
        #[serde(default = "default_author")]
        author: String,
        text: String,
    },
    UserInputAck {
        #[serde(default)]
        id: Option<CorrelationId>,
        #[serde(default = "default_author")]
        author: String,
        text: String,
    },
    TaskCompleted {
        id: CorrelationId,
        summary: String,
    },
    ConnectionError {
        reason: String,
    },
    ConnectionRestored,
}

fn default_tool_name() -> String {
    "shell".to_string()
}

fn default_log_level() -> LogLevel {
    LogLevel::Info
}

fn default_author() -> String {
    "agent".to_string()
}

impl Notification {
    pub fn into_message(self) -> Message {
        match self {
            Notification::Thought { id, text, done } => Message::ThoughtDelta { id, text, done },
            Notification::ToolStarted {
                id,
                tool_name,
                command,
            } => Message::ToolStarted {
                id,
                tool_name,
                command,
            },
            Notification::ToolProgress { id, line, bytes } => {
                let bytes = bytes.unwrap_or(line.len() as u64);
                Message::ToolProgress { id, line, bytes }
            }
            Notification::ToolCompleted {
                id,
                mut exit_codes,
                exit_code,
                output,
                summary,
            } => {
                exit_codes.extend(exit_code);
                Message::ToolCompleted {
                    id,
                    exit_codes,
                    output,
                    summary,
                }
            }
            Notification::FileEdit {
                id,
                path,
                lines_added,
                lines_removed,
            } => Message::FileEditObserved {
                id,
                path,
                lines_added,
                lines_removed,
            },
            Notification::FileRead { id, path, ranges } => {
                Message::FileReadObserved { id, path, ranges }
            }
            Notification::FilesDeleted { id, paths } => Message::FilesDeleted { id, paths },
            Notification::Log { id, level, message } => Message::Log { id, level, message },
            Notification::UserInput { id, author, text } => {
                Message::UserInputSubmitted { id, author, text }
            }
            Notification::UserInputAck { id, author, text } => {
                Message::UserInputAcknowledged { id, author, text }
            }
            Notification::TaskCompleted { id, summary } => Message::TaskCompleted { id, summary },
            Notification::ConnectionError { reason } => Message::ConnectionError { reason },
            Notification::ConnectionRestored => Message::ConnectionRestored,
        }
    }
}

pub fn decode_line(line_number: usize, text: &str) -> Result<Notification, AdapterError> {
    serde_json::from_str(text).map_err(|source| AdapterError::Decode {
        line: line_number,
        source,
    })
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub delivered: usize,
    pub skipped: usize,
}

/// Posts every decodable line into the mailbox, optionally pacing them.
/// Undecodable lines are logged and skipped.
pub fn replay_lines<R: BufRead>(
    reader: R,
    producer: &Producer,
    pace: Duration,
) -> Result<ReplaySummary, AdapterError> {
    let mut summary = ReplaySummary::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let notification = match decode_line(index + 1, &line) {
            Ok(notification) => notification,
            Err(err) => {
                warn!(error = %err, "skipping undecodable notification");
                summary.skipped += 1;
                continue;
            }
        };
        if !producer.send(notification.into_message()) {
            debug!("mailbox closed, replay stopped early");
            break;
        }
        summary.delivered += 1;
        if !pace.is_zero() {
            thread::sleep(pace);
        }
    }
    Ok(summary)
}

pub fn spawn_replay(
    path: PathBuf,
    producer: Producer,
    pace: Duration,
) -> JoinHandle<Result<ReplaySummary, AdapterError>> {
    thread::spawn(move || {
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(err) => {
                producer.send(Message::ConnectionError {
                    reason: format!("cannot open replay '{}': {err}", path.display()),
                });
                return Err(AdapterError::Io(err));
            }
        };
        let summary = replay_lines(BufReader::new(file), &producer, pace)?;
        info!(
            path = %path.display(),
            delivered = summary.delivered,
            skipped = summary.skipped,
            "replay finished"
        );
        Ok(summary)
    })
}

/// Runs `command` through the shell, streaming its output into the entry
/// behind `handle`, and reports completion under `id`.
pub fn spawn_exec(
    command: String,
    id: CorrelationId,
    handle: StreamHandle,
    producer: Producer,
    cancel: CancelToken,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut child = match Command::new("bash")
            .args(["-c", &command])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
        {
            Ok(child) => child,
            Err(err) => {
                producer.send(Message::ToolCompleted {
                    id,
                    exit_codes: vec![-1],
                    output: String::new(),
                    summary: Some(format!("failed to start: {err}")),
                });
                return;
            }
        };

        let mut pumps = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            pumps.push(spawn_output_pump(handle.clone(), stdout, cancel.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            pumps.push(spawn_output_pump(handle, stderr, cancel.clone()));
        }

        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break Ok(status),
                Ok(None) if cancel.is_cancelled() => {
                    info!(%id, "stopping command");
                    let _ = child.kill();
                    break child.wait();
                }
                Ok(None) => thread::sleep(EXEC_POLL_INTERVAL),
                Err(err) => break Err(err),
            }
        };
        for pump in pumps {
            let _ = pump.join();
        }

        let message = match status {
            Ok(status) => {
                let code = status.code().unwrap_or(-1);
                Message::ToolCompleted {
                    id,
                    exit_codes: vec![code],
                    output: String::new(),
                    summary: cancel.is_cancelled().then(|| "Stopped".to_string()),
                }
            }
            Err(err) => Message::ToolCompleted {
                id,
                exit_codes: vec![-1],
                output: String::new(),
                summary: Some(format!("wait failed: {err}")),
            },
        };
        producer.send(message);
    })
}

#[cfg(test)]
#[path = "../tests/unit/adapter_tests.rs"]
mod tests;
