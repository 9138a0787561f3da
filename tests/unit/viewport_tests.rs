use super::*;

#[test]
fn follows_new_entries_until_user_scrolls_up() {
    let mut viewport = Viewport::new(5);
    for len in 1..=12 {
        viewport.on_append(len);
    }
    assert!(viewport.auto_follow());
    assert_eq!(viewport.scroll_offset(), 7);

    viewport.scroll_up(2);
    assert!(!viewport.auto_follow());
    assert_eq!(viewport.scroll_offset(), 5);

    for len in 13..=40 {
        viewport.on_append(len);
    }
    assert_eq!(viewport.scroll_offset(), 5);
    assert!(viewport.has_activity_below(40));
}

#[test]
fn scrolling_back_to_bottom_re_enables_follow() {
    let mut viewport = Viewport::new(5);
    viewport.on_append(20);
    viewport.scroll_up(3);
    viewport.scroll_down(1, 20);
    assert!(!viewport.auto_follow());
    viewport.scroll_down(10, 20);
    assert!(viewport.auto_follow());
    assert_eq!(viewport.scroll_offset(), 15);
}

#[test]
fn page_and_jump_commands_clamp() {
    let mut viewport = Viewport::new(4);
    viewport.on_append(10);
    viewport.page_up();
    assert_eq!(viewport.scroll_offset(), 2);
    viewport.page_up();
    assert_eq!(viewport.scroll_offset(), 0);
    viewport.page_down(10);
    assert_eq!(viewport.scroll_offset(), 4);
    viewport.scroll_to_top();
    assert_eq!(viewport.scroll_offset(), 0);
    assert!(!viewport.auto_follow());
    viewport.scroll_to_end(10);
    assert_eq!(viewport.scroll_offset(), 6);
    assert!(viewport.auto_follow());
}

#[test]
fn visible_range_is_clamped_to_length() {
    let mut viewport = Viewport::new(10);
    viewport.on_append(3);
    assert_eq!(viewport.visible_range(3), 0..3);
    assert!(viewport.is_visible(2, 3));
    assert!(!viewport.is_visible(3, 3));
}

#[test]
fn eviction_shifts_window_over_same_entries() {
    let mut viewport = Viewport::new(3);
    viewport.on_append(10);
    viewport.scroll_up(4);
    assert_eq!(viewport.scroll_offset(), 3);
    viewport.select(Some(4), 10);

    viewport.on_evicted(&[0, 1], 8);
    assert_eq!(viewport.scroll_offset(), 1);
    assert_eq!(viewport.selected(), Some(2));
}

#[test]
fn resize_keeps_following_the_end() {
    let mut viewport = Viewport::new(3);
    viewport.on_append(10);
    viewport.resize(6, 10);
    assert_eq!(viewport.scroll_offset(), 4);
    viewport.resize(0, 10);
    assert_eq!(viewport.rows(), 1);
}

#[test]
fn step_moves_one_position_when_visible() {
    assert_eq!(
        step_with_offscreen_correction(5, StepDirection::Up, 2..8, 9),
        4
    );
    assert_eq!(
        step_with_offscreen_correction(5, StepDirection::Down, 2..8, 9),
        6
    );
    assert_eq!(
        step_with_offscreen_correction(0, StepDirection::Up, 0..8, 9),
        0
    );
    assert_eq!(
        step_with_offscreen_correction(9, StepDirection::Down, 4..10, 9),
        9
    );
}

#[test]
fn step_jumps_to_nearest_visible_boundary_when_off_screen() {
    assert_eq!(
        step_with_offscreen_correction(1, StepDirection::Down, 4..8, 9),
        4
    );
    assert_eq!(
        step_with_offscreen_correction(1, StepDirection::Up, 4..8, 9),
        4
    );
    assert_eq!(
        step_with_offscreen_correction(9, StepDirection::Up, 4..8, 9),
        7
    );
}

#[test]
fn navigation_selects_visible_cards_and_detaches() {
    let mut viewport = Viewport::new(4);
    viewport.on_append(10);
    viewport.navigate_up(10);
    assert_eq!(viewport.selected(), Some(9));
    assert!(!viewport.auto_follow());
    viewport.navigate_up(10);
    assert_eq!(viewport.selected(), Some(8));

    viewport.scroll_to_top();
    viewport.navigate_up(10);
    assert_eq!(viewport.selected(), Some(3));
    assert_eq!(viewport.scroll_offset(), 0);
}

#[test]
fn navigating_down_to_last_card_resumes_follow() {
    let mut viewport = Viewport::new(4);
    viewport.on_append(6);
    viewport.select(Some(4), 6);
    viewport.detach();
    viewport.navigate_down(6);
    assert_eq!(viewport.selected(), Some(5));
    assert!(viewport.auto_follow());
}

#[test]
fn center_on_places_position_mid_window() {
    let mut viewport = Viewport::new(6);
    viewport.on_append(30);
    viewport.center_on(10, 30);
    assert_eq!(viewport.scroll_offset(), 7);
    assert!(!viewport.auto_follow());
}
