use std::io::{self, Write};
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use crossterm::cursor::SetCursorStyle;
use crossterm::event::{DisableMouseCapture, EnableMouseCapture};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::prelude::*;
use tracing::{info, warn};

mod adapter;
mod config;
mod error;
mod events;
mod fork;
mod hero;
mod logging;
mod mailbox;
mod message;
mod resolver;
mod session;
mod snapshot;
mod stream;
mod theme;
mod timeline;
mod ui;
mod viewport;

use config::{DEFAULT_CONFIG_PATH, TimelineConfig};
use logging::LogSink;
use mailbox::{DEFAULT_TICK, Mailbox, Ticker, Wake};
use message::{Command, CorrelationId, Message};
use session::{Outbound, Session};
use stream::CancelToken;
use theme::Theme;

const MAX_MESSAGES_PER_LOOP: usize = 256;
const EXEC_ID: &str = "exec";

#[derive(Debug, Parser)]
#[command(name = "activity-timeline", about = "Live activity timeline for an agent session")]
struct Args {
    /// TOML config file. Missing files fall back to defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,
    /// JSONL file of session notifications to play into the timeline.
    #[arg(long)]
    replay: Option<PathBuf>,
    /// Delay between replayed notifications.
    #[arg(long, default_value_t = 0)]
    pace_ms: u64,
    /// Shell command to run as a live tool entry.
    #[arg(long)]
    exec: Option<String>,
    /// Process all input without a terminal and print a JSON report.
    #[arg(long)]
    headless: bool,
    #[arg(long)]
    log_file: Option<PathBuf>,
    #[arg(long, default_value = "info")]
    log_level: String,
    #[arg(long)]
    rows: Option<usize>,
    #[arg(long)]
    history_cap: Option<usize>,
    #[arg(long)]
    tick_ms: Option<u64>,
}

impl Args {
    fn apply_overrides(&self, config: &mut TimelineConfig) {
        if let Some(rows) = self.rows {
            config.viewport.rows = rows;
        }
        if let Some(history_cap) = self.history_cap {
            config.timeline.history_cap = history_cap;
        }
        if let Some(tick_ms) = self.tick_ms {
            config.ticker.interval_ms = tick_ms;
        }
    }
}

fn main() -> io::Result<()> {
    let args = Args::parse();
    let sink = match (&args.log_file, args.headless) {
        (Some(path), _) => LogSink::File(path.as_path()),
        (None, true) => LogSink::Stderr,
        (None, false) => LogSink::Discard,
    };
    logging::init(sink, &args.log_level)?;

    let mut config = TimelineConfig::load_or_default(&args.config);
    args.apply_overrides(&mut config);

    let mut mailbox = Mailbox::new();
    let mut session = Session::new(&config);
    start_sources(&args, &mailbox, &mut session);

    if args.headless {
        mailbox.seal();
        return run_headless(&mailbox, &mut session);
    }

    let theme = Theme::from_overrides(&config.theme);
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        EnterAlternateScreen,
        EnableMouseCapture,
        SetCursorStyle::SteadyBar
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let stop_input = CancelToken::new();
    let input_reader = mailbox
        .producer()
        .map(|producer| events::spawn_input_reader(producer, stop_input.clone()));
    let result = run_tui(
        &mut terminal,
        &mailbox,
        &mut session,
        &theme,
        config.ticker.interval(),
    );

    stop_input.cancel();
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        SetCursorStyle::DefaultUserShape,
        DisableMouseCapture,
        LeaveAlternateScreen
    )?;
    terminal.show_cursor()?;
    if let Some(reader) = input_reader {
        let _ = reader.join();
    }

    result
}

fn start_sources(args: &Args, mailbox: &Mailbox, session: &mut Session) {
    if let Some(command) = &args.exec
        && let Some(producer) = mailbox.producer()
    {
        let id = CorrelationId::new(EXEC_ID);
        session.handle(
            Message::ToolStarted {
                id: id.clone(),
                tool_name: "bash".to_string(),
                command: command.clone(),
            },
            Instant::now(),
        );
        match session.subscribe(&id, producer.clone()) {
            Some((handle, cancel)) => {
                adapter::spawn_exec(command.clone(), id, handle, producer, cancel);
            }
            None => warn!(%id, "exec entry is not running, command not started"),
        }
    }

    if let Some(path) = &args.replay
        && let Some(producer) = mailbox.producer()
    {
        adapter::spawn_replay(path.clone(), producer, Duration::from_millis(args.pace_ms));
    }
}

/// Feeds queued messages to the session in batches until the mailbox is
/// empty. Returns whether a redraw is needed.
fn drain_into(mailbox: &Mailbox, session: &mut Session) -> bool {
    let mut dirty = false;
    loop {
        let batch = mailbox.drain_limited(MAX_MESSAGES_PER_LOOP);
        if batch.is_empty() {
            return dirty;
        }
        for message in batch {
            dirty |= session.handle(message, Instant::now());
        }
    }
}

fn run_headless(mailbox: &Mailbox, session: &mut Session) -> io::Result<()> {
    let mut ticker = Ticker::new(DEFAULT_TICK, Instant::now());
    loop {
        drain_into(mailbox, session);
        match mailbox.wait(&mut ticker, Instant::now()) {
            Wake::Message(message) => {
                session.handle(message, Instant::now());
            }
            Wake::Tick => {}
            Wake::Closed => break,
        }
    }

    let report = session.report(Instant::now());
    let json = serde_json::to_string_pretty(&report).map_err(io::Error::other)?;
    let mut stdout = io::stdout().lock();
    writeln!(stdout, "{json}")?;
    stdout.flush()
}

fn run_tui(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    mailbox: &Mailbox,
    session: &mut Session,
    theme: &Theme,
    tick: Duration,
) -> io::Result<()> {
    let size = terminal.size()?;
    session.apply_command(
        Command::Resize(ui::timeline_rows(size.height)),
        Instant::now(),
    );

    let mut ticker = Ticker::new(tick, Instant::now());
    let mut dirty = true;
    while !session.should_quit() {
        dirty |= drain_into(mailbox, session);
        forward_outbound(session);

        if dirty {
            let snapshot = session.snapshot(Instant::now());
            terminal.draw(|frame| ui::render(frame, &snapshot, theme))?;
            dirty = false;
        }
        if session.should_quit() {
            break;
        }

        match mailbox.wait(&mut ticker, Instant::now()) {
            Wake::Message(message) => dirty |= session.handle(message, Instant::now()),
            Wake::Tick => dirty |= session.needs_tick_redraw(),
            Wake::Closed => break,
        }
    }
    Ok(())
}

// No live transport is attached yet, so outbound requests are only logged.
fn forward_outbound(session: &mut Session) {
    for request in session.take_outbound() {
        match request {
            Outbound::SubmitInstruction {
                id,
                text,
                fork_after,
            } => info!(%id, ?fork_after, %text, "instruction submitted"),
            Outbound::StopTool { id } => info!(%id, "stop requested"),
        }
    }
}

#[cfg(test)]
#[path = "../tests/unit/main_tests.rs"]
mod tests;
