use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Weak};
use std::time::Instant;

use serde::Serialize;

use crate::error::EvictionViolation;
use crate::message::CorrelationId;

/// Generational index into the entry slab. A key whose generation no longer
/// matches its slot refers to an evicted entry and never resolves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct EntryKey {
    index: u32,
    generation: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OutputSize {
    pub bytes: u64,
    pub lines: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntryKind {
    ToolUse {
        tool_name: String,
        command_segments: Vec<String>,
        exit_codes: Vec<i32>,
        output_size: OutputSize,
        last_line: Option<String>,
    },
    FileEdit {
        path: String,
        lines_added: usize,
        lines_removed: usize,
    },
    FileRead {
        path: String,
        ranges: Vec<(usize, usize)>,
    },
    Deleted {
        paths: Vec<String>,
    },
    Thought {
        markdown_body: String,
    },
    UserInstruction {
        author: String,
        text: String,
        confirmed: bool,
    },
    TaskCompleted {
        summary: String,
    },
}

impl EntryKind {
    pub fn tool(tool_name: &str, command: &str) -> Self {
        let command_segments = command
            .split('|')
            .map(str::trim)
            .filter(|segment| !segment.is_empty())
            .map(ToString::to_string)
            .collect();
        EntryKind::ToolUse {
            tool_name: tool_name.to_string(),
            command_segments,
            exit_codes: Vec::new(),
            output_size: OutputSize::default(),
            last_line: None,
        }
    }

    /// Flattened text used by activity search.
    pub fn search_text(&self) -> String {
        match self {
            EntryKind::ToolUse {
                tool_name,
                command_segments,
                last_line,
                ..
            } => format!(
                "{tool_name} {} {}",
                command_segments.join(" | "),
                last_line.as_deref().unwrap_or("")
            ),
            EntryKind::FileEdit { path, .. } => format!("edit {path}"),
            EntryKind::FileRead { path, .. } => format!("read {path}"),
            EntryKind::Deleted { paths } => format!("deleted {}", paths.join(" ")),
            EntryKind::Thought { markdown_body } => markdown_body.clone(),
            EntryKind::UserInstruction { author, text, .. } => format!("{author}: {text}"),
            EntryKind::TaskCompleted { summary } => summary.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl EntryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, EntryStatus::Completed | EntryStatus::Failed)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimelineEntry {
    id: CorrelationId,
    sequence: u64,
    pub kind: EntryKind,
    pub status: EntryStatus,
    pub started_at: Option<Instant>,
    pub ended_at: Option<Instant>,
    pub updated_at: Option<Instant>,
    discarded: bool,
}

impl TimelineEntry {
    pub fn id(&self) -> &CorrelationId {
        &self.id
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn discarded(&self) -> bool {
        self.discarded
    }

    pub(crate) fn set_discarded(&mut self, discarded: bool) {
        self.discarded = discarded;
    }

    pub fn is_running(&self) -> bool {
        self.status == EntryStatus::Running
    }

    pub fn finish(&mut self, status: EntryStatus, now: Instant) {
        debug_assert!(status.is_terminal());
        self.status = status;
        self.ended_at = Some(now);
        self.updated_at = Some(now);
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    entry: Option<TimelineEntry>,
    lease: Option<Arc<()>>,
}

/// Authoritative ordered log of entries, owned by the UI thread.
#[derive(Debug, Default)]
pub struct TimelineStore {
    slots: Vec<Slot>,
    free: Vec<u32>,
    order: Vec<EntryKey>,
    index: HashMap<CorrelationId, EntryKey>,
    retired: VecDeque<CorrelationId>,
    retired_cap: usize,
    next_sequence: u64,
}

impl TimelineStore {
    pub fn new() -> Self {
        Self::with_retired_cap(2000)
    }

    pub fn with_retired_cap(retired_cap: usize) -> Self {
        Self {
            retired_cap,
            ..Self::default()
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn append(
        &mut self,
        id: CorrelationId,
        kind: EntryKind,
        status: EntryStatus,
        now: Instant,
    ) -> EntryKey {
        debug_assert!(!self.has_seen(&id), "correlation id {id} appended twice");
        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let entry = TimelineEntry {
            id: id.clone(),
            sequence,
            kind,
            status,
            started_at: Some(now),
            ended_at: status.is_terminal().then_some(now),
            updated_at: Some(now),
            discarded: false,
        };
        let key = match self.free.pop() {
            Some(index) => {
                let slot = &mut self.slots[index as usize];
                slot.entry = Some(entry);
                slot.lease = Some(Arc::new(()));
                EntryKey {
                    index,
                    generation: slot.generation,
                }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot {
                    generation: 0,
                    entry: Some(entry),
                    lease: Some(Arc::new(())),
                });
                EntryKey {
                    index,
                    generation: 0,
                }
            }
        };
        self.order.push(key);
        self.index.insert(id, key);
        key
    }

    pub fn resolve(&self, key: EntryKey) -> bool {
        self.get(key).is_some()
    }

    pub fn get(&self, key: EntryKey) -> Option<&TimelineEntry> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    pub fn get_mut(&mut self, key: EntryKey) -> Option<&mut TimelineEntry> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    /// Live key for a correlation id. Evicted ids do not resolve.
    pub fn key_of(&self, id: &CorrelationId) -> Option<EntryKey> {
        self.index.get(id).copied().filter(|key| self.resolve(*key))
    }

    /// True if the id was ever assigned in this session (live or retired).
    pub fn has_seen(&self, id: &CorrelationId) -> bool {
        self.index.contains_key(id)
    }

    pub fn position_of(&self, key: EntryKey) -> Option<usize> {
        let sequence = self.get(key)?.sequence;
        self.order
            .binary_search_by_key(&sequence, |k| self.sequence_of(*k))
            .ok()
    }

    pub fn key_at(&self, position: usize) -> Option<EntryKey> {
        self.order.get(position).copied()
    }

    pub fn entry_at(&self, position: usize) -> Option<&TimelineEntry> {
        self.key_at(position).and_then(|key| self.get(key))
    }

    pub fn keys(&self) -> &[EntryKey] {
        &self.order
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (EntryKey, &TimelineEntry)> {
        self.order
            .iter()
            .filter_map(|key| self.get(*key).map(|entry| (*key, entry)))
    }

    /// Visits every live entry in chronological order with its position.
    pub(crate) fn for_each_mut(&mut self, mut visit: impl FnMut(usize, &mut TimelineEntry)) {
        for (position, key) in self.order.iter().enumerate() {
            if let Some(entry) = self
                .slots
                .get_mut(key.index as usize)
                .filter(|slot| slot.generation == key.generation)
                .and_then(|slot| slot.entry.as_mut())
            {
                visit(position, entry);
            }
        }
    }

    pub fn lease(&self, key: EntryKey) -> Option<Weak<()>> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.lease.as_ref())
            .map(Arc::downgrade)
    }

    /// Drops the liveness lease so streaming subscriptions stop pushing.
    pub fn release_lease(&mut self, key: EntryKey) {
        if let Some(slot) = self
            .slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
        {
            slot.lease = None;
        }
    }

    /// Removes a finished entry. Active and discarded entries are refused;
    /// fork pinning is checked by the caller, which owns the fork state.
    pub fn evict(&mut self, key: EntryKey) -> Result<TimelineEntry, EvictionViolation> {
        let entry = self.get(key).ok_or(EvictionViolation::Missing(key))?;
        if !entry.status.is_terminal() {
            return Err(EvictionViolation::Active(key));
        }
        if entry.discarded {
            return Err(EvictionViolation::Discarded(key));
        }
        let position = self
            .position_of(key)
            .ok_or(EvictionViolation::Missing(key))?;
        self.order.remove(position);

        let slot = &mut self.slots[key.index as usize];
        slot.generation = slot.generation.wrapping_add(1);
        slot.lease = None;
        let entry = slot.entry.take().ok_or(EvictionViolation::Missing(key))?;
        self.free.push(key.index);
        self.retire(entry.id.clone());
        Ok(entry)
    }

    fn retire(&mut self, id: CorrelationId) {
        self.retired.push_back(id);
        while self.retired.len() > self.retired_cap {
            if let Some(oldest) = self.retired.pop_front() {
                if self.key_of(&oldest).is_none() {
                    self.index.remove(&oldest);
                }
            }
        }
    }

    fn sequence_of(&self, key: EntryKey) -> u64 {
        self.get(key).map(|entry| entry.sequence).unwrap_or(u64::MAX)
    }
}

#[cfg(test)]
#[path = "../tests/unit/timeline_tests.rs"]
mod tests;
