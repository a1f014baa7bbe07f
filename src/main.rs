mod config;
mod error;
mod logging;
mod services;
mod ui;
mod utils;

use std::env;
use std::io;
use std::time::Duration;

use crossterm::{
    event::{self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{backend::CrosstermBackend, Terminal};
use tracing::info;

use crate::config::Settings;
use crate::services::transfer::{OutputMode, RunMode, TransferMode};
use crate::ui::app::App;
use crate::ui::draw::OUTPUT_PANE_HEIGHT;

const VERSION: &str = env!("CARGO_PKG_VERSION");

fn print_help() {
    println!("rclonedir {} - Dual-panel front end for rclone-style transfers", VERSION);
    println!();
    println!("USAGE:");
    println!("    rclonedir [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
    println!();
    println!("CONFIG: ~/.rclonedir/settings.json");
}

fn print_version() {
    println!("rclonedir {}", VERSION);
}

fn main() -> io::Result<()> {
    let args: Vec<String> = env::args().collect();
    if args.len() > 1 {
        match args[1].as_str() {
            "-h" | "--help" => {
                print_help();
                return Ok(());
            }
            "-v" | "--version" => {
                print_version();
                return Ok(());
            }
            _ => {
                eprintln!("Unknown option: {}", args[1]);
                eprintln!("Use --help for usage information");
                return Ok(());
            }
        }
    }

    Settings::ensure_config_exists();
    let settings = match Settings::load_with_error() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Warning: {e}, using defaults");
            Settings::default()
        }
    };

    // Keep the guard alive for the whole run so log lines get flushed
    let _log_guard = Settings::log_dir().and_then(|dir| logging::init(&dir));
    info!(version = VERSION, "starting");

    // Setup terminal
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(
        stdout,
        crossterm::terminal::Clear(crossterm::terminal::ClearType::All),
        crossterm::cursor::MoveTo(0, 0),
        EnterAlternateScreen,
        EnableMouseCapture
    )?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let mut app = App::new(settings);
    let result = run_app(&mut terminal, &mut app);
    app.save_session();

    // Restore terminal
    disable_raw_mode()?;
    execute!(
        terminal.backend_mut(),
        LeaveAlternateScreen,
        DisableMouseCapture,
        crossterm::terminal::Clear(crossterm::terminal::ClearType::All),
        crossterm::cursor::MoveTo(0, 0),
        crossterm::cursor::Show
    )?;

    if let Err(err) = result {
        eprintln!("Error: {}", err);
    }

    Ok(())
}

fn run_app<B: ratatui::backend::Backend>(
    terminal: &mut Terminal<B>,
    app: &mut App,
) -> io::Result<()> {
    loop {
        terminal.draw(|f| ui::draw::draw(f, app))?;
        app.tick_message();
        app.poll_background();

        // Fast polling while transfers stream output or run in background
        let poll_timeout = if app.attached.is_some() || !app.detached.is_empty() {
            Duration::from_millis(100)
        } else {
            Duration::from_millis(250)
        };

        if event::poll(poll_timeout)? {
            if let Event::Key(key) = event::read()? {
                if app.is_blocked() {
                    handle_blocked_input(app, key.code);
                } else if handle_input(app, key.code) {
                    return Ok(());
                }
            }
        }
    }
}

/// While an attached transfer runs, only cancel and output scrolling work.
fn handle_blocked_input(app: &mut App, code: KeyCode) {
    let page = OUTPUT_PANE_HEIGHT.saturating_sub(2) as usize;
    match code {
        KeyCode::Esc => app.cancel_attached(),
        KeyCode::PageUp => app.output.page_up(page),
        KeyCode::PageDown => app.output.page_down(page),
        _ => {}
    }
}

fn handle_input(app: &mut App, code: KeyCode) -> bool {
    let page = OUTPUT_PANE_HEIGHT.saturating_sub(2) as usize;
    match code {
        // Quit
        KeyCode::Char('q') | KeyCode::Char('Q') => return true,

        // Navigation
        KeyCode::Up => app.move_cursor(-1),
        KeyCode::Down => app.move_cursor(1),
        KeyCode::Home => app.active_panel_mut().cursor_to_start(),
        KeyCode::End => app.active_panel_mut().cursor_to_end(),

        // Panel switching
        KeyCode::Tab | KeyCode::Left | KeyCode::Right => app.switch_panel(),

        // Enter - open directory under the cursor
        KeyCode::Enter => app.enter_selected(),

        // Backspace/Esc - parent directory
        KeyCode::Backspace | KeyCode::Esc => app.navigate_up(),

        // Space - mark/unmark for the next transfer
        KeyCode::Char(' ') => app.toggle_selection(),

        // Transfer configuration
        KeyCode::Char('c') | KeyCode::Char('C') => app.set_transfer_mode(TransferMode::Copy),
        KeyCode::Char('m') | KeyCode::Char('M') => app.set_transfer_mode(TransferMode::Move),
        KeyCode::Char('a') | KeyCode::Char('A') => app.set_run_mode(RunMode::Attached),
        KeyCode::Char('d') | KeyCode::Char('D') => app.set_run_mode(RunMode::Detached),
        KeyCode::Char('p') | KeyCode::Char('P') => app.set_output_mode(OutputMode::Progress),
        KeyCode::Char('l') | KeyCode::Char('L') => app.set_output_mode(OutputMode::Log),

        // Run the configured transfer
        KeyCode::Char('r') | KeyCode::Char('R') => app.start_transfer(),

        // Output pane scrollback
        KeyCode::PageUp => app.output.page_up(page),
        KeyCode::PageDown => app.output.page_down(page),

        _ => {}
    }
    false
}
