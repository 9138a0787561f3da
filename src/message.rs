use std::fmt;

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::timeline::EntryKey;

/// Links every message of one logical action to its timeline entry.
///
/// Ids minted by the timeline itself (logs and acknowledgments that arrive
/// without one) are local: they never compare equal to a producer id with
/// the same text, and producers cannot deserialize into them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CorrelationId {
    value: String,
    local: bool,
}

impl CorrelationId {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            local: false,
        }
    }

    pub(crate) fn local(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            local: true,
        }
    }

    pub fn is_local(&self) -> bool {
        self.local
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.local {
            write!(f, "local:{}", self.value)
        } else {
            f.write_str(&self.value)
        }
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl Serialize for CorrelationId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if self.local {
            let mut map = serializer.serialize_map(Some(1))?;
            map.serialize_entry("local", &self.value)?;
            map.end()
        } else {
            serializer.serialize_str(&self.value)
        }
    }
}

impl<'de> Deserialize<'de> for CorrelationId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::new)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Everything that can reach the owning thread.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    ThoughtDelta {
        id: CorrelationId,
        text: String,
        done: bool,
    },
    ToolStarted {
        id: CorrelationId,
        tool_name: String,
        command: String,
    },
    ToolProgress {
        id: CorrelationId,
        line: String,
        bytes: u64,
    },
    ToolCompleted {
        id: CorrelationId,
        exit_codes: Vec<i32>,
        output: String,
        summary: Option<String>,
    },
    StreamDelta {
        target: EntryKey,
        chunk: String,
    },
    FileEditObserved {
        id: CorrelationId,
        path: String,
        lines_added: usize,
        lines_removed: usize,
    },
    FileReadObserved {
        id: CorrelationId,
        path: String,
        ranges: Vec<(usize, usize)>,
    },
    FilesDeleted {
        id: CorrelationId,
        paths: Vec<String>,
    },
    Log {
        id: Option<CorrelationId>,
        level: LogLevel,
        message: String,
    },
    UserInputSubmitted {
        id: CorrelationId,
        author: String,
        text: String,
    },
    UserInputAcknowledged {
        id: Option<CorrelationId>,
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
    Command(Command),
}

impl Message {
    pub fn label(&self) -> &'static str {
        match self {
            Message::ThoughtDelta { .. } => "thought_delta",
            Message::ToolStarted { .. } => "tool_started",
            Message::ToolProgress { .. } => "tool_progress",
            Message::ToolCompleted { .. } => "tool_completed",
            Message::StreamDelta { .. } => "stream_delta",
            Message::FileEditObserved { .. } => "file_edit",
            Message::FileReadObserved { .. } => "file_read",
            Message::FilesDeleted { .. } => "files_deleted",
            Message::Log { .. } => "log",
            Message::UserInputSubmitted { .. } => "user_input_submitted",
            Message::UserInputAcknowledged { .. } => "user_input_acknowledged",
            Message::TaskCompleted { .. } => "task_completed",
            Message::ConnectionError { .. } => "connection_error",
            Message::ConnectionRestored => "connection_restored",
            Message::Command(_) => "command",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    MoveForkUp,
    MoveForkDown,
    CancelFork,
    ForkAt(usize),
    /// Fork below whatever entry is drawn on this timeline row.
    ForkAtRow(usize),
    NavigateUp,
    NavigateDown,
    ScrollUp(usize),
    ScrollDown(usize),
    PageUp,
    PageDown,
    ScrollToTop,
    ScrollToEnd,
    Resize(usize),
    StopHero,
    DraftChar(char),
    DraftBackspace,
    SubmitDraft,
    Search(String),
    SearchNext,
    SearchPrevious,
    Quit,
}
