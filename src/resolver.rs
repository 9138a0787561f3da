use std::time::Instant;

use tracing::trace;

use crate::error::IngestionError;
use crate::message::{CorrelationId, LogLevel, Message};
use crate::timeline::{EntryKey, EntryKind, EntryStatus, TimelineStore};

pub const DEFAULT_CONFIRM_SIMILARITY: f64 = 0.95;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// A new timeline position was created.
    Appended(EntryKey),
    /// An existing entry changed in place.
    Updated(EntryKey),
    /// A running entry reached a terminal status.
    Finished(EntryKey),
    /// An optimistic instruction was acknowledged.
    Confirmed(EntryKey),
    /// Not a timeline message.
    Ignored,
}

impl Resolution {
    pub fn appended(self) -> Option<EntryKey> {
        match self {
            Resolution::Appended(key) => Some(key),
            _ => None,
        }
    }
}

/// Decides whether a message appends a new entry or mutates a running one.
#[derive(Debug, Clone)]
pub struct CorrelationResolver {
    confirm_similarity: f64,
    open_thoughts: Vec<EntryKey>,
}

impl Default for CorrelationResolver {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIRM_SIMILARITY)
    }
}

impl CorrelationResolver {
    pub fn new(confirm_similarity: f64) -> Self {
        Self {
            confirm_similarity: confirm_similarity.clamp(0.0, 1.0),
            open_thoughts: Vec::new(),
        }
    }

    pub fn apply(
        &mut self,
        store: &mut TimelineStore,
        message: Message,
        now: Instant,
    ) -> Result<Resolution, IngestionError> {
        match message {
            Message::ThoughtDelta { id, text, done } => {
                self.thought_delta(store, id, text, done, now)
            }
            Message::ToolStarted {
                id,
                tool_name,
                command,
            } => {
                ensure_unseen(store, &id, "tool_started")?;
                let kind = EntryKind::tool(&tool_name, &command);
                Ok(Resolution::Appended(self.start(store, id, kind, EntryStatus::Running, now)))
            }
            Message::ToolProgress { id, line, bytes } => {
                let key = running_key(store, &id, "tool_progress")?;
                update_tool_output(store, key, &line, bytes, 1, now);
                Ok(Resolution::Updated(key))
            }
            Message::StreamDelta { target, chunk } => {
                let entry = store
                    .get(target)
                    .ok_or(IngestionError::StaleHandle(target))?;
                if !entry.is_running() {
                    return Err(IngestionError::NotRunning {
                        id: entry.id().clone(),
                        message: "stream_delta",
                    });
                }
                if !matches!(entry.kind, EntryKind::ToolUse { .. }) {
                    return Err(IngestionError::Malformed {
                        message: "stream_delta",
                        reason: format!("entry '{}' does not take tool output", entry.id()),
                    });
                }
                let last_line = chunk
                    .lines()
                    .rev()
                    .find(|line| !line.trim().is_empty())
                    .unwrap_or_default()
                    .to_string();
                let lines = chunk.lines().count().max(1) as u64;
                update_tool_output(store, target, &last_line, chunk.len() as u64, lines, now);
                Ok(Resolution::Updated(target))
            }
            Message::ToolCompleted {
                id,
                exit_codes,
                output,
                summary,
            } => {
                let key = running_key(store, &id, "tool_completed")?;
                complete_tool(store, key, exit_codes, &output, summary, now);
                store.release_lease(key);
                Ok(Resolution::Finished(key))
            }
            Message::FileEditObserved {
                id,
                path,
                lines_added,
                lines_removed,
            } => {
                ensure_unseen(store, &id, "file_edit")?;
                let kind = EntryKind::FileEdit {
                    path,
                    lines_added,
                    lines_removed,
                };
                Ok(Resolution::Appended(self.start(store, id, kind, EntryStatus::Completed, now)))
            }
            Message::FileReadObserved { id, path, ranges } => {
                ensure_unseen(store, &id, "file_read")?;
                let kind = EntryKind::FileRead { path, ranges };
                Ok(Resolution::Appended(self.start(store, id, kind, EntryStatus::Completed, now)))
            }
            Message::FilesDeleted { id, paths } => {
                if paths.is_empty() {
                    return Err(IngestionError::Malformed {
                        message: "files_deleted",
                        reason: "no paths".to_string(),
                    });
                }
                ensure_unseen(store, &id, "files_deleted")?;
                let kind = EntryKind::Deleted { paths };
                Ok(Resolution::Appended(self.start(store, id, kind, EntryStatus::Completed, now)))
            }
            Message::Log {
                id: Some(id),
                message,
                ..
            } => {
                let key = running_key(store, &id, "log")?;
                update_tool_output(store, key, &message, 0, 0, now);
                Ok(Resolution::Updated(key))
            }
            Message::Log {
                id: None,
                level,
                message,
            } => {
                let id = synthetic_id(store, "log");
                let kind = EntryKind::Thought {
                    markdown_body: format!("{}{message}", level_prefix(level)),
                };
                Ok(Resolution::Appended(self.start(store, id, kind, EntryStatus::Completed, now)))
            }
            Message::UserInputSubmitted { id, author, text } => {
                ensure_unseen(store, &id, "user_input_submitted")?;
                let kind = EntryKind::UserInstruction {
                    author,
                    text,
                    confirmed: false,
                };
                Ok(Resolution::Appended(self.start(store, id, kind, EntryStatus::Pending, now)))
            }
            Message::UserInputAcknowledged { id, author, text } => {
                self.acknowledge(store, id, author, text, now)
            }
            Message::TaskCompleted { id, summary } => {
                ensure_unseen(store, &id, "task_completed")?;
                let kind = EntryKind::TaskCompleted { summary };
                Ok(Resolution::Appended(self.start(store, id, kind, EntryStatus::Completed, now)))
            }
            Message::ConnectionError { .. } | Message::ConnectionRestored | Message::Command(_) => {
                Ok(Resolution::Ignored)
            }
        }
    }

    fn thought_delta(
        &mut self,
        store: &mut TimelineStore,
        id: CorrelationId,
        text: String,
        done: bool,
        now: Instant,
    ) -> Result<Resolution, IngestionError> {
        let Some(key) = store.key_of(&id) else {
            ensure_unseen(store, &id, "thought_delta")?;
            let status = if done {
                EntryStatus::Completed
            } else {
                EntryStatus::Running
            };
            let kind = EntryKind::Thought {
                markdown_body: text,
            };
            let key = self.start(store, id, kind, status, now);
            if !done {
                self.open_thoughts.push(key);
            }
            return Ok(Resolution::Appended(key));
        };

        let Some(entry) = store.get_mut(key) else {
            return Err(IngestionError::StaleHandle(key));
        };
        let EntryKind::Thought { markdown_body } = &mut entry.kind else {
            return Err(IngestionError::DuplicateCorrelation {
                id,
                message: "thought_delta",
            });
        };
        if entry.status != EntryStatus::Running {
            return Err(IngestionError::NotRunning {
                id,
                message: "thought_delta",
            });
        }
        markdown_body.push_str(&text);
        entry.updated_at = Some(now);
        if done {
            entry.finish(EntryStatus::Completed, now);
            self.open_thoughts.retain(|open| *open != key);
            return Ok(Resolution::Finished(key));
        }
        Ok(Resolution::Updated(key))
    }

    fn acknowledge(
        &mut self,
        store: &mut TimelineStore,
        id: Option<CorrelationId>,
        author: String,
        text: String,
        now: Instant,
    ) -> Result<Resolution, IngestionError> {
        let target = match id.as_ref().and_then(|id| store.key_of(id)) {
            Some(key) => Some(key),
            None => self.fuzzy_unconfirmed_match(store, &text),
        };

        if let Some(key) = target {
            let Some(entry) = store.get_mut(key) else {
                return Err(IngestionError::StaleHandle(key));
            };
            if !matches!(entry.kind, EntryKind::UserInstruction { .. }) {
                return Err(IngestionError::DuplicateCorrelation {
                    id: entry.id().clone(),
                    message: "user_input_acknowledged",
                });
            }
            if let EntryKind::UserInstruction {
                author: existing_author,
                text: existing_text,
                confirmed,
            } = &mut entry.kind
            {
                *confirmed = true;
                *existing_author = author;
                *existing_text = text;
            }
            if !entry.status.is_terminal() {
                entry.finish(EntryStatus::Completed, now);
            }
            return Ok(Resolution::Confirmed(key));
        }

        let id = match id {
            Some(id) => {
                ensure_unseen(store, &id, "user_input_acknowledged")?;
                id
            }
            None => synthetic_id(store, "input"),
        };
        let kind = EntryKind::UserInstruction {
            author,
            text,
            confirmed: true,
        };
        Ok(Resolution::Appended(self.start(store, id, kind, EntryStatus::Completed, now)))
    }

    fn fuzzy_unconfirmed_match(&self, store: &TimelineStore, text: &str) -> Option<EntryKey> {
        let (key, existing) = store.iter().rev().find_map(|(key, entry)| match &entry.kind {
            EntryKind::UserInstruction {
                text,
                confirmed: false,
                ..
            } => Some((key, text.as_str())),
            _ => None,
        })?;
        texts_match(existing, text, self.confirm_similarity).then_some(key)
    }

    fn start(
        &mut self,
        store: &mut TimelineStore,
        id: CorrelationId,
        kind: EntryKind,
        status: EntryStatus,
        now: Instant,
    ) -> EntryKey {
        for key in self.open_thoughts.drain(..) {
            if let Some(entry) = store.get_mut(key)
                && entry.is_running()
            {
                trace!(id = %entry.id(), "thought burst closed by next action");
                entry.finish(EntryStatus::Completed, now);
            }
        }
        store.append(id, kind, status, now)
    }
}

pub fn texts_match(existing: &str, incoming: &str, threshold: f64) -> bool {
    if existing == incoming {
        return true;
    }
    strsim::normalized_levenshtein(existing, incoming) >= threshold
}

/// Id for an entry that arrived without one. Sequence numbers are never
/// reused, so these stay unique within the local namespace.
fn synthetic_id(store: &TimelineStore, kind: &str) -> CorrelationId {
    CorrelationId::local(format!("{kind}#{}", store.next_sequence()))
}

fn level_prefix(level: LogLevel) -> &'static str {
    match level {
        LogLevel::Error => "Error: ",
        LogLevel::Warn => "Warning: ",
        LogLevel::Info => "",
        LogLevel::Debug | LogLevel::Trace => "Debug: ",
    }
}

fn ensure_unseen(
    store: &TimelineStore,
    id: &CorrelationId,
    message: &'static str,
) -> Result<(), IngestionError> {
    if store.has_seen(id) {
        return Err(IngestionError::DuplicateCorrelation {
            id: id.clone(),
            message,
        });
    }
    Ok(())
}

fn running_key(
    store: &TimelineStore,
    id: &CorrelationId,
    message: &'static str,
) -> Result<EntryKey, IngestionError> {
    let key = store
        .key_of(id)
        .ok_or_else(|| IngestionError::UnknownCorrelation {
            id: id.clone(),
            message,
        })?;
    match store.get(key) {
        Some(entry) if entry.is_running() && matches!(entry.kind, EntryKind::ToolUse { .. }) => {
            Ok(key)
        }
        _ => Err(IngestionError::NotRunning {
            id: id.clone(),
            message,
        }),
    }
}

fn update_tool_output(
    store: &mut TimelineStore,
    key: EntryKey,
    line: &str,
    bytes: u64,
    lines: u64,
    now: Instant,
) {
    let Some(entry) = store.get_mut(key) else {
        return;
    };
    if let EntryKind::ToolUse {
        output_size,
        last_line,
        ..
    } = &mut entry.kind
    {
        output_size.bytes = output_size.bytes.saturating_add(bytes);
        output_size.lines = output_size.lines.saturating_add(lines);
        let trimmed = line.trim_end();
        if !trimmed.is_empty() {
            *last_line = Some(trimmed.to_string());
        }
    }
    entry.updated_at = Some(now);
}

fn complete_tool(
    store: &mut TimelineStore,
    key: EntryKey,
    codes: Vec<i32>,
    output: &str,
    summary: Option<String>,
    now: Instant,
) {
    let Some(entry) = store.get_mut(key) else {
        return;
    };
    let failed_code = codes.iter().copied().find(|code| *code != 0);
    if let EntryKind::ToolUse {
        exit_codes,
        output_size,
        last_line,
        ..
    } = &mut entry.kind
    {
        if output_size.bytes == 0 && !output.is_empty() {
            output_size.bytes = output.len() as u64;
            output_size.lines = output.lines().count() as u64;
        }
        let final_line = summary
            .filter(|summary| !summary.trim().is_empty())
            .or_else(|| {
                output
                    .lines()
                    .rev()
                    .find(|line| !line.trim().is_empty())
                    .map(|line| line.trim_end().to_string())
            })
            .or_else(|| last_line.take())
            .unwrap_or_else(|| match failed_code {
                Some(code) => format!("Failed (exit {code})"),
                None => "Completed".to_string(),
            });
        *last_line = Some(final_line);
        *exit_codes = codes;
    }
    let status = if failed_code.is_some() {
        EntryStatus::Failed
    } else {
        EntryStatus::Completed
    };
    entry.finish(status, now);
}

#[cfg(test)]
#[path = "../tests/unit/resolver_tests.rs"]
mod tests;
