use std::ops::Range;

use tracing::debug;

use crate::error::ForkError;
use crate::timeline::{EntryKey, TimelineStore};
use crate::viewport::{StepDirection, step_with_offscreen_correction};

/// Where the Instructions Card sits. `Forked(i)` keeps entries `0..=i`; the
/// card is rendered directly below entry `i` and everything after it is
/// discarded from the continuing branch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ForkState {
    #[default]
    Live,
    Forked(usize),
}

impl ForkState {
    pub fn fork_index(self) -> Option<usize> {
        match self {
            ForkState::Live => None,
            ForkState::Forked(index) => Some(index),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ForkController {
    state: ForkState,
}

impl ForkController {
    pub fn state(&self) -> ForkState {
        self.state
    }

    pub fn fork_index(&self) -> Option<usize> {
        self.state.fork_index()
    }

    pub fn is_forked(&self) -> bool {
        self.state != ForkState::Live
    }

    pub fn move_up(
        &mut self,
        store: &mut TimelineStore,
        visible: Range<usize>,
    ) -> Result<ForkState, ForkError> {
        let len = store.len();
        if len == 0 {
            return Err(ForkError::EmptyTimeline);
        }
        let current = match self.state {
            ForkState::Live => len - 1,
            ForkState::Forked(index) => index,
        };
        let next = step_with_offscreen_correction(current, StepDirection::Up, visible, len - 1);
        self.set(store, ForkState::Forked(next));
        Ok(self.state)
    }

    pub fn move_down(
        &mut self,
        store: &mut TimelineStore,
        visible: Range<usize>,
    ) -> Result<ForkState, ForkError> {
        let len = store.len();
        if len == 0 {
            return Err(ForkError::EmptyTimeline);
        }
        let ForkState::Forked(current) = self.state else {
            return Ok(self.state);
        };
        let next = step_with_offscreen_correction(current, StepDirection::Down, visible, len - 1);
        let state = if next >= len - 1 {
            ForkState::Live
        } else {
            ForkState::Forked(next)
        };
        self.set(store, state);
        Ok(self.state)
    }

    /// Places the card directly below `position` (mouse "fork here").
    /// Forking below the last entry keeps everything, which is `Live`.
    pub fn fork_at(
        &mut self,
        store: &mut TimelineStore,
        position: usize,
    ) -> Result<ForkState, ForkError> {
        let len = store.len();
        if len == 0 {
            return Err(ForkError::EmptyTimeline);
        }
        let state = if position >= len - 1 {
            ForkState::Live
        } else {
            ForkState::Forked(position)
        };
        self.set(store, state);
        Ok(self.state)
    }

    pub fn cancel(&mut self, store: &mut TimelineStore) {
        self.set(store, ForkState::Live);
    }

    /// Marks an entry appended while forked; it lands past the fork index.
    pub fn mark_appended(&self, store: &mut TimelineStore, key: EntryKey) {
        if self.is_forked()
            && let Some(entry) = store.get_mut(key)
        {
            entry.set_discarded(true);
        }
    }

    pub fn apply_partition(&self, store: &mut TimelineStore) {
        let fork_index = self.fork_index();
        store.for_each_mut(|position, entry| {
            entry.set_discarded(fork_index.is_some_and(|index| position > index));
        });
    }

    pub fn partition_holds(&self, store: &TimelineStore) -> bool {
        let fork_index = self.fork_index();
        store.iter().enumerate().all(|(position, (_, entry))| {
            entry.discarded() == fork_index.is_some_and(|index| position > index)
        })
    }

    fn set(&mut self, store: &mut TimelineStore, state: ForkState) {
        if self.state != state {
            debug!(from = ?self.state, to = ?state, "fork state changed");
        }
        self.state = state;
        self.apply_partition(store);
    }
}

#[cfg(test)]
#[path = "../tests/unit/fork_tests.rs"]
mod tests;
