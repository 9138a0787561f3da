use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    Up,
    Down,
}

/// Moves a cursor one step, unless it is off-screen, in which case it first
/// lands on the nearest visible boundary. Card selection and the fork card
/// share this rule.
pub fn step_with_offscreen_correction(
    current: usize,
    direction: StepDirection,
    visible: Range<usize>,
    max: usize,
) -> usize {
    if visible.is_empty() {
        return current.min(max);
    }
    if current < visible.start {
        return visible.start.min(max);
    }
    if current >= visible.end {
        return (visible.end - 1).min(max);
    }
    match direction {
        StepDirection::Up => current.saturating_sub(1),
        StepDirection::Down => current.saturating_add(1).min(max),
    }
}

/// Scroll offset and follow state, measured in timeline rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Viewport {
    scroll_offset: usize,
    rows: usize,
    auto_follow: bool,
    selected: Option<usize>,
}

impl Viewport {
    pub fn new(rows: usize) -> Self {
        Self {
            scroll_offset: 0,
            rows: rows.max(1),
            auto_follow: true,
            selected: None,
        }
    }

    pub fn scroll_offset(&self) -> usize {
        self.scroll_offset
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn auto_follow(&self) -> bool {
        self.auto_follow
    }

    pub fn selected(&self) -> Option<usize> {
        self.selected
    }

    pub fn max_scroll(&self, len: usize) -> usize {
        len.saturating_sub(self.rows)
    }

    pub fn visible_range(&self, len: usize) -> Range<usize> {
        let start = self.scroll_offset.min(len);
        let end = self.scroll_offset.saturating_add(self.rows).min(len);
        start..end
    }

    pub fn is_visible(&self, position: usize, len: usize) -> bool {
        self.visible_range(len).contains(&position)
    }

    /// Entries exist below the window and the user is not following them.
    pub fn has_activity_below(&self, len: usize) -> bool {
        self.visible_range(len).end < len
    }

    pub fn on_append(&mut self, len: usize) {
        if self.auto_follow {
            self.scroll_offset = self.max_scroll(len);
        }
    }

    /// Keeps the window over the same entries after positions were removed.
    pub fn on_evicted(&mut self, removed_positions: &[usize], len: usize) {
        let removed_above = removed_positions
            .iter()
            .filter(|position| **position < self.scroll_offset)
            .count();
        self.scroll_offset = self.scroll_offset.saturating_sub(removed_above);
        if let Some(selected) = self.selected {
            let shift = removed_positions
                .iter()
                .filter(|position| **position < selected)
                .count();
            self.selected = if removed_positions.contains(&selected) || len == 0 {
                None
            } else {
                Some(selected.saturating_sub(shift))
            };
        }
        if self.auto_follow {
            self.scroll_offset = self.max_scroll(len);
        } else {
            self.scroll_offset = self.scroll_offset.min(self.max_scroll(len));
        }
    }

    pub fn scroll_up(&mut self, delta: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(delta);
        self.auto_follow = false;
    }

    pub fn scroll_down(&mut self, delta: usize, len: usize) {
        let max_scroll = self.max_scroll(len);
        self.scroll_offset = self.scroll_offset.saturating_add(delta).min(max_scroll);
        if self.scroll_offset == max_scroll {
            self.auto_follow = true;
        }
    }

    pub fn page_up(&mut self) {
        self.scroll_up(self.rows);
    }

    pub fn page_down(&mut self, len: usize) {
        self.scroll_down(self.rows, len);
    }

    pub fn scroll_to_top(&mut self) {
        self.scroll_offset = 0;
        self.auto_follow = false;
    }

    pub fn scroll_to_end(&mut self, len: usize) {
        self.scroll_offset = self.max_scroll(len);
        self.auto_follow = true;
    }

    pub fn resize(&mut self, rows: usize, len: usize) {
        self.rows = rows.max(1);
        if self.auto_follow {
            self.scroll_offset = self.max_scroll(len);
        } else {
            self.scroll_offset = self.scroll_offset.min(self.max_scroll(len));
        }
    }

    /// Stops following the live end without moving the window.
    pub fn detach(&mut self) {
        self.auto_follow = false;
    }

    /// Scrolls the minimum amount needed to bring `position` into the window.
    pub fn reveal(&mut self, position: usize, len: usize) {
        if position >= len {
            return;
        }
        if position < self.scroll_offset {
            self.scroll_offset = position;
        } else if position >= self.scroll_offset + self.rows {
            self.scroll_offset = position + 1 - self.rows;
        }
    }

    /// Centres `position` in the window (used by search jumps).
    pub fn center_on(&mut self, position: usize, len: usize) {
        self.scroll_offset = position
            .saturating_sub(self.rows / 2)
            .min(self.max_scroll(len));
        self.auto_follow = false;
    }

    pub fn select(&mut self, position: Option<usize>, len: usize) {
        self.selected = position.filter(|_| len > 0).map(|p| p.min(len - 1));
        if let Some(position) = self.selected {
            self.reveal(position, len);
        }
    }

    pub fn navigate_up(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        let visible = self.visible_range(len);
        let next = match self.selected {
            Some(current) => {
                step_with_offscreen_correction(current, StepDirection::Up, visible, len - 1)
            }
            None => visible.end.saturating_sub(1),
        };
        self.selected = Some(next);
        self.reveal(next, len);
        self.auto_follow = false;
    }

    pub fn navigate_down(&mut self, len: usize) {
        if len == 0 {
            return;
        }
        let visible = self.visible_range(len);
        let next = match self.selected {
            Some(current) => {
                step_with_offscreen_correction(current, StepDirection::Down, visible, len - 1)
            }
            None => visible.start,
        };
        self.selected = Some(next);
        self.reveal(next, len);
        if next == len - 1 {
            self.scroll_to_end(len);
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/viewport_tests.rs"]
mod tests;
