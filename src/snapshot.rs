use std::collections::HashSet;
use std::time::Duration;

use serde::Serialize;

use crate::hero::HeroPlacement;
use crate::message::CorrelationId;
use crate::session::Outbound;
use crate::timeline::{EntryKey, EntryKind, EntryStatus, TimelineEntry};

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ConnectionStatus {
    #[default]
    Connected,
    Disconnected {
        reason: String,
    },
}

impl ConnectionStatus {
    pub fn is_connected(&self) -> bool {
        matches!(self, ConnectionStatus::Connected)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Counters {
    /// Ingestion errors that were logged and dropped.
    pub malformed_events: u64,
    /// Stream deltas that arrived after their entry was torn down.
    pub stale_deltas: u64,
    pub reconnects: u64,
    pub evicted: u64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VisibleRow<'a> {
    pub key: EntryKey,
    pub position: usize,
    pub entry: &'a TimelineEntry,
    pub is_hero: bool,
    /// Set on the pinned duplicate of the hero, never on its chronological row.
    pub hero_docked: bool,
    pub discarded: bool,
    pub elapsed: Option<Duration>,
    pub selected: bool,
    pub search_hit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ViewRow<'a> {
    Entry(VisibleRow<'a>),
    InstructionsCard { forked: bool },
}

impl<'a> ViewRow<'a> {
    pub fn as_entry(&self) -> Option<&VisibleRow<'a>> {
        match self {
            ViewRow::Entry(row) => Some(row),
            ViewRow::InstructionsCard { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ForkView {
    pub fork_index: Option<usize>,
    pub discarded: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ViewportView {
    pub scroll_offset: usize,
    pub rows: usize,
    pub total: usize,
    pub auto_follow: bool,
    pub hero_docked: bool,
    pub activity_below: bool,
    pub selected: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchView<'a> {
    pub query: &'a str,
    pub matches: usize,
    pub current: Option<usize>,
}

/// Read-only view of the session for one render pass.
#[derive(Debug, Clone)]
pub struct RenderSnapshot<'a> {
    pub rows: Vec<ViewRow<'a>>,
    pub hero: HeroPlacement,
    pub fork: ForkView,
    pub viewport: ViewportView,
    pub connection: &'a ConnectionStatus,
    pub counters: Counters,
    pub draft: &'a str,
    pub search: Option<SearchView<'a>>,
}

impl<'a> RenderSnapshot<'a> {
    pub fn entry_rows(&self) -> impl Iterator<Item = &VisibleRow<'a>> {
        self.rows.iter().filter_map(ViewRow::as_entry)
    }

    /// Distinct entries flagged as hero. A docked hero appears twice but
    /// counts once.
    pub fn hero_count(&self) -> usize {
        self.entry_rows()
            .filter(|row| row.is_hero)
            .map(|row| row.key)
            .collect::<HashSet<_>>()
            .len()
    }

    pub fn card_index(&self) -> Option<usize> {
        self.rows
            .iter()
            .position(|row| matches!(row, ViewRow::InstructionsCard { .. }))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EntryReport {
    pub id: CorrelationId,
    pub sequence: u64,
    #[serde(flatten)]
    pub kind: EntryKind,
    pub status: EntryStatus,
    pub discarded: bool,
    pub is_hero: bool,
    pub elapsed_ms: Option<u64>,
}

/// Owned summary of the whole timeline, printed by headless runs.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SnapshotReport {
    pub entries: Vec<EntryReport>,
    pub hero: Option<CorrelationId>,
    pub fork: ForkView,
    pub viewport: ViewportView,
    pub connection: ConnectionStatus,
    pub counters: Counters,
    pub outbound: Vec<Outbound>,
}
