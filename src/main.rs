//! livescroll: a live-scrolling feed reader for the terminal, built on the
//! `livescroll` feed engine.
//!
//! ## Architecture overview
//!
//! ```text
//! ┌───────────┐ DriverMsg  ┌──────────┐  draw()  ┌──────────┐
//! │ driver.rs │ ─────────► │  app.rs  │ ───────► │  ui.rs   │
//! │ (engine)  │ ◄───────── │ (state)  │          │ (render) │
//! └───────────┘  Command   └──────────┘          └──────────┘
//!                              ▲
//!                              │ handle_key_event()
//!                         ┌──────────┐
//!                         │ input.rs │
//!                         └──────────┘
//! ```
//!
//! * **`driver`**: runs the feed engine on a background thread with its own
//!   tokio runtime.
//! * **`app`**: owns all front-end state (snapshot, scroll position, sort).
//! * **`ui`**: pure rendering: reads `App` state and draws widgets.
//! * **`input`**: maps key events to `App` mutations.
//! * **`main`**: wires everything together: logging, config, terminal, and
//!   the event loop.

mod app;
mod driver;
mod input;
mod ui;

use std::env;
use std::fs::File;
use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use crossterm::{
    event::{self, Event},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use log::info;
use ratatui::backend::CrosstermBackend;
use ratatui::Terminal;

use app::App;
use driver::DriverMsg;
use livescroll::{EngineConfig, SortType, SourceAddress};

const DEFAULT_FEED: &str = "https://feeds.bbci.co.uk/news/rss.xml";

// ---------------------------------------------------------------------------
// RAII terminal guard: idiomatic cleanup even on panic
// ---------------------------------------------------------------------------

/// Manages terminal raw-mode and alternate-screen lifetime via [`Drop`].
///
/// Constructing this struct enters raw mode + alternate screen.  When the
/// value is dropped (normally or during stack unwinding) it restores the
/// terminal.
struct TerminalGuard {
    terminal: Terminal<CrosstermBackend<io::Stdout>>,
}

impl TerminalGuard {
    fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;
        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;
        Ok(Self { terminal })
    }
}

impl Drop for TerminalGuard {
    fn drop(&mut self) {
        let _ = disable_raw_mode();
        let _ = execute!(self.terminal.backend_mut(), LeaveAlternateScreen);
        let _ = self.terminal.show_cursor();
    }
}

/// Install a panic hook that restores the terminal before printing the
/// panic message.
fn install_panic_hook() {
    let original_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let _ = disable_raw_mode();
        let _ = execute!(io::stdout(), LeaveAlternateScreen);
        original_hook(info);
    }));
}

/// Log to `LIVESCROLL_LOG_FILE` when set.  Otherwise logging stays off
/// unless `RUST_LOG` asks for it, since stderr shares the screen.
fn init_logging() -> Result<()> {
    if let Ok(path) = env::var("LIVESCROLL_LOG_FILE") {
        let file = File::create(&path).with_context(|| format!("opening log file {path}"))?;
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
            .target(env_logger::Target::Pipe(Box::new(file)))
            .init();
    } else if env::var_os("RUST_LOG").is_some() {
        env_logger::init();
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    init_logging()?;
    install_panic_hook();

    // -- parse arguments -----------------------------------------------------
    let mut sources: Vec<SourceAddress> = env::args().skip(1).map(SourceAddress::new).collect();
    if sources.is_empty() {
        sources.push(SourceAddress::new(DEFAULT_FEED));
    }
    let sort = match env::var("LIVESCROLL_SORT") {
        Ok(name) => name.parse::<SortType>()?,
        Err(_) => SortType::New,
    };
    let config = EngineConfig::from_env();
    info!("starting with {} source(s), {config:?}", sources.len());

    // -- start the engine ----------------------------------------------------
    let driver = driver::spawn(config, sources, sort);

    // -- terminal setup (RAII: Drop restores on exit or panic) --------------
    let mut guard = TerminalGuard::new()?;
    let mut app = App::new(sort);

    // -- main event loop -----------------------------------------------------
    // Runs at ~10 fps (100 ms tick).  Each iteration:
    //   1. Drain any messages from the engine.
    //   2. Render the UI.
    //   3. Poll for keyboard input (non-blocking, up to tick_rate).
    //   4. Forward the commands the input produced.
    let tick_rate = Duration::from_millis(100);

    loop {
        while let Ok(msg) = driver.updates.try_recv() {
            match msg {
                DriverMsg::Snapshot(snapshot) => app.apply_snapshot(snapshot),
                DriverMsg::Error(e) => app.show_error(&e),
            }
        }

        guard.terminal.draw(|f| ui::draw(&mut app, f))?;

        if event::poll(tick_rate)? {
            if let Event::Key(key) = event::read()? {
                input::handle_key_event(&mut app, key);
            }
        }

        for command in app.take_commands() {
            driver.send(command);
        }

        if app.quit {
            break;
        }
    }

    // `guard` is dropped here, restoring the terminal.
    Ok(())
}
