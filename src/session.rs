use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::config::TimelineConfig;
use crate::error::{EvictionViolation, ForkError, IngestionError};
use crate::fork::{ForkController, ForkState};
use crate::hero::{HeroController, HeroPlacement, elapsed};
use crate::mailbox::Producer;
use crate::message::{Command, CorrelationId, Message};
use crate::resolver::{CorrelationResolver, Resolution};
use crate::snapshot::{
    ConnectionStatus, Counters, EntryReport, ForkView, RenderSnapshot, SearchView,
    SnapshotReport, ViewRow, ViewportView, VisibleRow,
};
use crate::stream::{CancelToken, StreamHandle};
use crate::timeline::{EntryKey, EntryKind, TimelineEntry, TimelineStore};
use crate::viewport::Viewport;

/// Drafts starting with this run an activity search instead of being sent.
pub const SEARCH_PREFIX: &str = "/find ";

/// Requests the session wants the transport to carry out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    SubmitInstruction {
        id: CorrelationId,
        text: String,
        /// Sequence of the last kept entry when the instruction forks history.
        fork_after: Option<u64>,
    },
    StopTool {
        id: CorrelationId,
    },
}

#[derive(Debug, Clone, Default)]
struct SearchState {
    query: String,
    matches: Vec<EntryKey>,
    cursor: Option<usize>,
}

/// Single owner of every piece of timeline state. Only the owning thread
/// touches it; everyone else talks to it through the mailbox.
#[derive(Debug)]
pub struct Session {
    store: TimelineStore,
    resolver: CorrelationResolver,
    fork: ForkController,
    viewport: Viewport,
    connection: ConnectionStatus,
    counters: Counters,
    history_cap: usize,
    author: String,
    draft: String,
    outbound: Vec<Outbound>,
    cancellations: HashMap<EntryKey, CancelToken>,
    search: SearchState,
    next_local_id: u64,
    quit: bool,
}

impl Default for Session {
    fn default() -> Self {
        Self::new(&TimelineConfig::default())
    }
}

impl Session {
    pub fn new(config: &TimelineConfig) -> Self {
        Self {
            store: TimelineStore::with_retired_cap(config.timeline.retired_ids),
            resolver: CorrelationResolver::new(config.instructions.confirm_similarity),
            fork: ForkController::default(),
            viewport: Viewport::new(config.viewport.rows),
            connection: ConnectionStatus::Connected,
            counters: Counters::default(),
            history_cap: config.timeline.history_cap,
            author: config.instructions.author.clone(),
            draft: String::new(),
            outbound: Vec::new(),
            cancellations: HashMap::new(),
            search: SearchState::default(),
            next_local_id: 0,
            quit: false,
        }
    }

    pub fn store(&self) -> &TimelineStore {
        &self.store
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    pub fn fork_state(&self) -> ForkState {
        self.fork.state()
    }

    pub fn connection(&self) -> &ConnectionStatus {
        &self.connection
    }

    pub fn counters(&self) -> Counters {
        self.counters
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn should_quit(&self) -> bool {
        self.quit
    }

    pub fn hero(&self) -> HeroPlacement {
        HeroController::compute(&self.store, &self.viewport, &self.fork)
    }

    /// Applies one mailbox message. Returns whether a redraw is needed.
    pub fn handle(&mut self, message: Message, now: Instant) -> bool {
        match message {
            Message::Command(command) => self.apply_command(command, now),
            Message::ConnectionError { reason } => {
                warn!(%reason, "connection lost");
                self.connection = ConnectionStatus::Disconnected { reason };
                true
            }
            Message::ConnectionRestored => {
                if self.connection.is_connected() {
                    return false;
                }
                info!("connection restored");
                self.counters.reconnects += 1;
                self.connection = ConnectionStatus::Connected;
                true
            }
            message => self.ingest(message, now),
        }
    }

    fn ingest(&mut self, message: Message, now: Instant) -> bool {
        let label = message.label();
        let resolution = match self.resolver.apply(&mut self.store, message, now) {
            Ok(resolution) => resolution,
            Err(err) => {
                self.record_dropped(label, &err);
                return false;
            }
        };
        match resolution {
            Resolution::Appended(key) => {
                self.fork.mark_appended(&mut self.store, key);
                self.viewport.on_append(self.store.len());
                self.enforce_history_cap();
                self.refresh_search();
            }
            Resolution::Finished(key) => {
                self.cancellations.remove(&key);
            }
            Resolution::Updated(_) | Resolution::Confirmed(_) => {}
            Resolution::Ignored => return false,
        }
        self.check_invariants();
        true
    }

    fn record_dropped(&mut self, label: &'static str, err: &IngestionError) {
        if matches!(err, IngestionError::StaleHandle(_)) {
            self.counters.stale_deltas += 1;
            debug!(message = label, error = %err, "dropped stale stream delta");
        } else {
            self.counters.malformed_events += 1;
            debug!(message = label, error = %err, "dropped ingestion message");
        }
    }

    /// Whether a tick should redraw. Elapsed times are computed at snapshot
    /// time, so this only reports whether anything is still running.
    pub fn needs_tick_redraw(&self) -> bool {
        HeroController::candidate(&self.store).is_some()
    }

    pub fn apply_command(&mut self, command: Command, now: Instant) -> bool {
        let len = self.store.len();
        match command {
            Command::MoveForkUp => return self.move_fork_up(),
            Command::MoveForkDown => return self.move_fork_down(),
            Command::CancelFork => self.cancel_fork(),
            Command::ForkAt(position) => return self.fork_at(position),
            Command::ForkAtRow(row) => {
                let target = self
                    .snapshot(now)
                    .rows
                    .get(row)
                    .and_then(ViewRow::as_entry)
                    .map(|row| row.position);
                return target.is_some_and(|position| self.fork_at(position));
            }
            Command::NavigateUp => self.viewport.navigate_up(len),
            Command::NavigateDown => self.viewport.navigate_down(len),
            Command::ScrollUp(delta) => self.viewport.scroll_up(delta),
            Command::ScrollDown(delta) => self.viewport.scroll_down(delta, len),
            Command::PageUp => self.viewport.page_up(),
            Command::PageDown => self.viewport.page_down(len),
            Command::ScrollToTop => self.viewport.scroll_to_top(),
            Command::ScrollToEnd => self.viewport.scroll_to_end(len),
            Command::Resize(rows) => self.viewport.resize(rows, len),
            Command::StopHero => return self.stop_hero(),
            Command::DraftChar(c) => self.draft.push(c),
            Command::DraftBackspace => {
                self.draft.pop();
            }
            Command::SubmitDraft => {
                let text = std::mem::take(&mut self.draft);
                if let Some(query) = text.trim_start().strip_prefix(SEARCH_PREFIX) {
                    self.set_search_query(query);
                    return true;
                }
                return self.submit_instruction(&text, now).is_some();
            }
            Command::Search(query) => {
                self.set_search_query(&query);
            }
            Command::SearchNext => return self.search_next(),
            Command::SearchPrevious => return self.search_previous(),
            Command::Quit => self.quit = true,
        }
        true
    }

    pub fn move_fork_up(&mut self) -> bool {
        let visible = self.viewport.visible_range(self.store.len());
        let result = self.fork.move_up(&mut self.store, visible);
        self.after_fork_change(result)
    }

    pub fn move_fork_down(&mut self) -> bool {
        let visible = self.viewport.visible_range(self.store.len());
        let result = self.fork.move_down(&mut self.store, visible);
        self.after_fork_change(result)
    }

    pub fn fork_at(&mut self, position: usize) -> bool {
        let result = self.fork.fork_at(&mut self.store, position);
        self.after_fork_change(result)
    }

    pub fn cancel_fork(&mut self) {
        if !self.fork.is_forked() {
            return;
        }
        self.fork.cancel(&mut self.store);
        self.after_fork_change(Ok(ForkState::Live));
    }

    fn after_fork_change(&mut self, result: Result<ForkState, ForkError>) -> bool {
        let state = match result {
            Ok(state) => state,
            Err(err) => {
                debug!(error = %err, "fork move refused");
                return false;
            }
        };
        let len = self.store.len();
        match state {
            ForkState::Forked(index) => {
                self.viewport.reveal(index, len);
                self.viewport.detach();
            }
            ForkState::Live => {
                self.viewport.scroll_to_end(len);
                self.enforce_history_cap();
            }
        }
        self.check_invariants();
        true
    }

    /// Optimistically echoes a user instruction and queues it for the
    /// transport. Submitting while forked resolves the fork.
    pub fn submit_instruction(&mut self, text: &str, now: Instant) -> Option<CorrelationId> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        let fork_after = self
            .fork
            .fork_index()
            .and_then(|index| self.store.entry_at(index))
            .map(TimelineEntry::sequence);
        if self.fork.is_forked() {
            self.fork.cancel(&mut self.store);
        }

        let id = self.next_local_id();
        let message = Message::UserInputSubmitted {
            id: id.clone(),
            author: self.author.clone(),
            text: text.to_string(),
        };
        if !self.ingest(message, now) {
            return None;
        }
        self.viewport.scroll_to_end(self.store.len());
        self.outbound.push(Outbound::SubmitInstruction {
            id: id.clone(),
            text: text.to_string(),
            fork_after,
        });
        Some(id)
    }

    fn next_local_id(&mut self) -> CorrelationId {
        loop {
            let id = CorrelationId::new(format!("local#{}", self.next_local_id));
            self.next_local_id += 1;
            if !self.store.has_seen(&id) {
                return id;
            }
        }
    }

    /// Asks the transport to stop the hero tool and cancels its local stream.
    pub fn stop_hero(&mut self) -> bool {
        let Some((key, _)) = HeroController::candidate(&self.store) else {
            return false;
        };
        let Some(entry) = self.store.get(key) else {
            return false;
        };
        if !matches!(entry.kind, EntryKind::ToolUse { .. }) {
            return false;
        }
        let id = entry.id().clone();
        if let Some(token) = self.cancellations.get(&key) {
            token.cancel();
        }
        info!(%id, "stop requested for running tool");
        self.outbound.push(Outbound::StopTool { id });
        true
    }

    /// Hands out a streaming handle for a running tool entry.
    pub fn subscribe(
        &mut self,
        id: &CorrelationId,
        producer: Producer,
    ) -> Option<(StreamHandle, CancelToken)> {
        let key = self.store.key_of(id)?;
        let entry = self.store.get(key)?;
        if !entry.is_running() || !matches!(entry.kind, EntryKind::ToolUse { .. }) {
            return None;
        }
        let alive = self.store.lease(key)?;
        let cancel = self.cancellations.entry(key).or_default().clone();
        Some((StreamHandle::new(key, alive, producer), cancel))
    }

    pub fn take_outbound(&mut self) -> Vec<Outbound> {
        std::mem::take(&mut self.outbound)
    }

    /// Removes one finished entry, refusing anything the controllers pin.
    pub fn evict(&mut self, key: EntryKey) -> Result<TimelineEntry, EvictionViolation> {
        if self.fork.is_forked() {
            return Err(EvictionViolation::ForkPinned);
        }
        if HeroController::candidate(&self.store).is_some_and(|(hero, _)| hero == key) {
            return Err(EvictionViolation::Active(key));
        }
        let entry = self.store.evict(key)?;
        self.cancellations.remove(&key);
        self.counters.evicted += 1;
        Ok(entry)
    }

    /// Evicts the oldest finished entries above the history cap. History is
    /// pinned while a fork is in progress. Returns the number evicted.
    pub fn enforce_history_cap(&mut self) -> usize {
        let len = self.store.len();
        if self.history_cap == 0 || len <= self.history_cap {
            return 0;
        }
        if self.fork.is_forked() {
            debug!(len, cap = self.history_cap, "history cap deferred while forked");
            return 0;
        }
        let victims: Vec<(usize, EntryKey)> = self
            .store
            .iter()
            .enumerate()
            .filter(|(_, (_, entry))| entry.status.is_terminal() && !entry.discarded())
            .take(len - self.history_cap)
            .map(|(position, (key, _))| (position, key))
            .collect();

        let mut removed = Vec::with_capacity(victims.len());
        for (position, key) in victims {
            match self.evict(key) {
                Ok(_) => removed.push(position),
                Err(violation) => {
                    error!(%violation, "eviction picked a pinned entry");
                    debug_assert!(false, "eviction picked a pinned entry: {violation}");
                }
            }
        }
        if !removed.is_empty() {
            self.viewport.on_evicted(&removed, self.store.len());
            self.refresh_search();
        }
        removed.len()
    }

    /// Case-insensitive search over entry text. Jumps to the latest match.
    pub fn set_search_query(&mut self, query: &str) -> usize {
        self.search.query = query.trim().to_string();
        self.search.cursor = None;
        self.refresh_search();
        if let Some(last) = self.search.matches.len().checked_sub(1) {
            self.jump_to_match(last);
        }
        self.search.matches.len()
    }

    pub fn search_next(&mut self) -> bool {
        let count = self.search.matches.len();
        if count == 0 {
            return false;
        }
        let next = self.search.cursor.map_or(0, |cursor| (cursor + 1) % count);
        self.jump_to_match(next);
        true
    }

    pub fn search_previous(&mut self) -> bool {
        let count = self.search.matches.len();
        if count == 0 {
            return false;
        }
        let previous = self
            .search
            .cursor
            .map_or(count - 1, |cursor| (cursor + count - 1) % count);
        self.jump_to_match(previous);
        true
    }

    fn jump_to_match(&mut self, index: usize) {
        let Some(position) = self
            .search
            .matches
            .get(index)
            .and_then(|key| self.store.position_of(*key))
        else {
            return;
        };
        let len = self.store.len();
        self.search.cursor = Some(index);
        self.viewport.select(Some(position), len);
        self.viewport.center_on(position, len);
    }

    fn refresh_search(&mut self) {
        if self.search.query.is_empty() {
            self.search.matches.clear();
            self.search.cursor = None;
            return;
        }
        let needle = self.search.query.to_lowercase();
        let current = self
            .search
            .cursor
            .and_then(|cursor| self.search.matches.get(cursor).copied());
        self.search.matches = self
            .store
            .iter()
            .filter(|(_, entry)| entry.kind.search_text().to_lowercase().contains(&needle))
            .map(|(key, _)| key)
            .collect();
        self.search.cursor =
            current.and_then(|key| self.search.matches.iter().position(|k| *k == key));
    }

    fn is_search_hit(&self, key: EntryKey) -> bool {
        self.search.matches.contains(&key)
    }

    fn check_invariants(&self) {
        if !self.fork.partition_holds(&self.store) {
            error!(fork = ?self.fork.state(), "discarded flags disagree with fork index");
            debug_assert!(false, "discarded flags disagree with fork index");
        }
    }

    pub fn snapshot(&self, now: Instant) -> RenderSnapshot<'_> {
        let len = self.store.len();
        let visible = self.viewport.visible_range(len);
        let hero = self.hero();
        let hero_key = hero.key();
        let fork_index = self.fork.fork_index();
        let card = ViewRow::InstructionsCard {
            forked: fork_index.is_some(),
        };

        let mut rows = Vec::with_capacity(visible.len() + 2);
        let mut card_placed = false;
        if fork_index.is_some_and(|index| index < visible.start) {
            rows.push(card);
            card_placed = true;
        }
        for position in visible {
            let Some(key) = self.store.key_at(position) else {
                continue;
            };
            if let Some(row) = self.row(key, position, hero_key, false, now) {
                rows.push(ViewRow::Entry(row));
            }
            if fork_index == Some(position) {
                rows.push(card);
                card_placed = true;
            }
        }
        match hero {
            HeroPlacement::Docked { key, position } => {
                rows.extend(self.row(key, position, hero_key, true, now).map(ViewRow::Entry));
                if !card_placed {
                    rows.push(card);
                }
            }
            HeroPlacement::DetachedBelowFork { key, position } => {
                if !card_placed {
                    rows.push(card);
                }
                rows.extend(self.row(key, position, hero_key, true, now).map(ViewRow::Entry));
            }
            HeroPlacement::Inline { .. } | HeroPlacement::None => {
                if !card_placed {
                    rows.push(card);
                }
            }
        }

        RenderSnapshot {
            rows,
            hero,
            fork: self.fork_view(),
            viewport: self.viewport_view(hero),
            connection: &self.connection,
            counters: self.counters,
            draft: &self.draft,
            search: (!self.search.query.is_empty()).then(|| SearchView {
                query: &self.search.query,
                matches: self.search.matches.len(),
                current: self.search.cursor,
            }),
        }
    }

    fn row(
        &self,
        key: EntryKey,
        position: usize,
        hero_key: Option<EntryKey>,
        docked: bool,
        now: Instant,
    ) -> Option<VisibleRow<'_>> {
        let entry = self.store.get(key)?;
        Some(VisibleRow {
            key,
            position,
            entry,
            is_hero: hero_key == Some(key),
            hero_docked: docked,
            discarded: entry.discarded(),
            elapsed: elapsed(entry, now),
            selected: self.viewport.selected() == Some(position),
            search_hit: self.is_search_hit(key),
        })
    }

    fn fork_view(&self) -> ForkView {
        let fork_index = self.fork.fork_index();
        ForkView {
            fork_index,
            discarded: fork_index.map_or(0, |index| self.store.len().saturating_sub(index + 1)),
        }
    }

    fn viewport_view(&self, hero: HeroPlacement) -> ViewportView {
        let len = self.store.len();
        ViewportView {
            scroll_offset: self.viewport.scroll_offset(),
            rows: self.viewport.rows(),
            total: len,
            auto_follow: self.viewport.auto_follow(),
            hero_docked: hero.is_docked(),
            activity_below: self.viewport.has_activity_below(len),
            selected: self.viewport.selected(),
        }
    }

    /// Owned summary of the whole timeline, not just the visible window.
    pub fn report(&self, now: Instant) -> SnapshotReport {
        let hero = self.hero();
        let hero_key = hero.key();
        let entries = self
            .store
            .iter()
            .map(|(key, entry)| EntryReport {
                id: entry.id().clone(),
                sequence: entry.sequence(),
                kind: entry.kind.clone(),
                status: entry.status,
                discarded: entry.discarded(),
                is_hero: hero_key == Some(key),
                elapsed_ms: elapsed(entry, now).map(|d| d.as_millis() as u64),
            })
            .collect();
        SnapshotReport {
            entries,
            hero: hero_key
                .and_then(|key| self.store.get(key))
                .map(|entry| entry.id().clone()),
            fork: self.fork_view(),
            viewport: self.viewport_view(hero),
            connection: self.connection.clone(),
            counters: self.counters,
            outbound: self.outbound.clone(),
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/session_tests.rs"]
mod tests;
