use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{
    self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers, MouseButton, MouseEventKind,
};
use tracing::warn;

use crate::mailbox::Producer;
use crate::message::{Command, Message};
use crate::stream::CancelToken;
use crate::ui;

const INPUT_POLL_INTERVAL: Duration = Duration::from_millis(50);
const SCROLL_LINES: usize = 5;
const WHEEL_LINES: usize = 3;

fn map_key_event(key_event: KeyEvent) -> Option<Command> {
    if key_event.kind != KeyEventKind::Press {
        return None;
    }
    let ctrl = key_event.modifiers.contains(KeyModifiers::CONTROL);
    let shift = key_event.modifiers.contains(KeyModifiers::SHIFT);

    if ctrl {
        return match key_event.code {
            KeyCode::Char('c') => Some(Command::Quit),
            KeyCode::Char('u') => Some(Command::ScrollUp(SCROLL_LINES)),
            KeyCode::Char('d') => Some(Command::ScrollDown(SCROLL_LINES)),
            KeyCode::Char('k') => Some(Command::StopHero),
            KeyCode::Char('n') => Some(Command::SearchNext),
            KeyCode::Char('p') => Some(Command::SearchPrevious),
            KeyCode::Up => Some(Command::MoveForkUp),
            KeyCode::Down => Some(Command::MoveForkDown),
            _ => None,
        };
    }

    match key_event.code {
        KeyCode::Up if shift => Some(Command::MoveForkUp),
        KeyCode::Down if shift => Some(Command::MoveForkDown),
        KeyCode::Up => Some(Command::NavigateUp),
        KeyCode::Down => Some(Command::NavigateDown),
        KeyCode::PageUp => Some(Command::PageUp),
        KeyCode::PageDown => Some(Command::PageDown),
        KeyCode::Home => Some(Command::ScrollToTop),
        KeyCode::End => Some(Command::ScrollToEnd),
        KeyCode::Esc => Some(Command::CancelFork),
        KeyCode::Backspace => Some(Command::DraftBackspace),
        KeyCode::Enter => Some(Command::SubmitDraft),
        KeyCode::Char(c) => Some(Command::DraftChar(c)),
        _ => None,
    }
}

fn map_mouse_event(kind: MouseEventKind, row: u16) -> Option<Command> {
    match kind {
        MouseEventKind::ScrollUp => Some(Command::ScrollUp(WHEEL_LINES)),
        MouseEventKind::ScrollDown => Some(Command::ScrollDown(WHEEL_LINES)),
        MouseEventKind::Down(MouseButton::Left) => ui::timeline_row_at(row).map(Command::ForkAtRow),
        _ => None,
    }
}

pub fn map_event(event: Event) -> Option<Command> {
    match event {
        Event::Key(key_event) => map_key_event(key_event),
        Event::Mouse(mouse_event) => map_mouse_event(mouse_event.kind, mouse_event.row),
        Event::Resize(_, height) => Some(Command::Resize(ui::timeline_rows(height))),
        _ => None,
    }
}

/// Reads terminal input on its own thread and posts commands into the
/// mailbox until `stop` is cancelled or the mailbox goes away.
pub fn spawn_input_reader(producer: Producer, stop: CancelToken) -> JoinHandle<()> {
    thread::spawn(move || {
        while !stop.is_cancelled() {
            match event::poll(INPUT_POLL_INTERVAL) {
                Ok(false) => continue,
                Ok(true) => {}
                Err(err) => {
                    warn!(error = %err, "terminal input poll failed");
                    break;
                }
            }
            let event = match event::read() {
                Ok(event) => event,
                Err(err) => {
                    warn!(error = %err, "terminal input read failed");
                    break;
                }
            };
            if let Some(command) = map_event(event)
                && !producer.send(Message::Command(command))
            {
                break;
            }
        }
    })
}
