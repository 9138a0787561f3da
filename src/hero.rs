use std::time::{Duration, Instant};

use crate::fork::ForkController;
use crate::timeline::{EntryKey, TimelineEntry, TimelineStore};
use crate::viewport::Viewport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeroPlacement {
    None,
    /// Visible at its chronological position only.
    Inline { key: EntryKey, position: usize },
    /// Scrolled out of view; duplicated above the Instructions Card.
    Docked { key: EntryKey, position: usize },
    /// A fork is in progress; duplicated below the forked Instructions Card.
    DetachedBelowFork { key: EntryKey, position: usize },
}

impl HeroPlacement {
    pub fn key(self) -> Option<EntryKey> {
        match self {
            HeroPlacement::None => None,
            HeroPlacement::Inline { key, .. }
            | HeroPlacement::Docked { key, .. }
            | HeroPlacement::DetachedBelowFork { key, .. } => Some(key),
        }
    }

    pub fn is_docked(self) -> bool {
        matches!(
            self,
            HeroPlacement::Docked { .. } | HeroPlacement::DetachedBelowFork { .. }
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct HeroController;

impl HeroController {
    /// The running entry with the highest sequence.
    pub fn candidate(store: &TimelineStore) -> Option<(EntryKey, usize)> {
        let len = store.len();
        store
            .iter()
            .rev()
            .enumerate()
            .find(|(_, (_, entry))| entry.is_running())
            .map(|(from_end, (key, _))| (key, len - 1 - from_end))
    }

    pub fn compute(
        store: &TimelineStore,
        viewport: &Viewport,
        fork: &ForkController,
    ) -> HeroPlacement {
        let Some((key, position)) = Self::candidate(store) else {
            return HeroPlacement::None;
        };
        if fork.is_forked() {
            return HeroPlacement::DetachedBelowFork { key, position };
        }
        if viewport.is_visible(position, store.len()) {
            HeroPlacement::Inline { key, position }
        } else {
            HeroPlacement::Docked { key, position }
        }
    }
}

/// Live elapsed time while running, frozen at `ended_at` once terminal.
pub fn elapsed(entry: &TimelineEntry, now: Instant) -> Option<Duration> {
    let started_at = entry.started_at?;
    let until = match entry.ended_at {
        Some(ended_at) if entry.status.is_terminal() => ended_at,
        _ => now,
    };
    Some(until.saturating_duration_since(started_at))
}

#[cfg(test)]
#[path = "../tests/unit/hero_tests.rs"]
mod tests;
