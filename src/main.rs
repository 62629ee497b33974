mod app;
mod cli;
mod config;
mod debug;
mod detail;
mod focus;
mod input;
mod model;
mod repository;
mod transip;
mod tree;
mod ui;

use anyhow::{Context, Result};
use app::App;
use clap::Parser;
use cli::CliArgs;
use config::Config;
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use debug::RequestStats;
use futures::StreamExt;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use repository::Repositories;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use transip::TransipClient;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    let config = Config::load(&args)?;
    let _log_guard = init_tracing(&config)?;
    info!(
        account = %config.account_name,
        test_mode = config.test_mode,
        endpoint = %config.endpoint,
        "starting transterm"
    );

    let stats = Arc::new(RequestStats::default());
    let debug_server = match &config.debug_addr {
        Some(addr) => Some(debug::spawn(addr, stats.clone()).await?),
        None => None,
    };

    let client = TransipClient::from_config(&config, stats)
        .context("failed to initialise the TransIP client")?;
    let account = if config.account_name.is_empty() {
        "access token".to_string()
    } else {
        config.account_name.clone()
    };
    let mut app = App::new(
        Repositories::from_backend(Arc::new(client)),
        account,
        config.test_mode,
    );

    let result = run(&mut app).await;
    if let Some(handle) = debug_server {
        handle.abort();
    }
    match &result {
        Ok(()) => info!("transterm stopped"),
        Err(run_error) => error!(error = %format!("{run_error:#}"), "transterm stopped"),
    }
    result
}

fn init_tracing(config: &Config) -> Result<WorkerGuard> {
    let filter = EnvFilter::try_new(&config.log_filter)
        .or_else(|_| EnvFilter::try_new("debug"))
        .context("failed to initialize tracing filter")?;

    let log_dir = config
        .log_file
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let log_name = config
        .log_file
        .file_name()
        .context("log file path has no file name")?;
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;

    let (writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::never(log_dir, log_name));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .with_writer(writer)
        .try_init();

    Ok(guard)
}

async fn run(app: &mut App) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

/// Every fetch runs inline and blocks input until it returns. The first failed fetch
/// ends the loop.
async fn run_loop(terminal: &mut TuiTerminal, app: &mut App) -> Result<()> {
    let mut reader = EventStream::new();

    loop {
        terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")?;

        if !app.running() {
            return Ok(());
        }

        match reader.next().await {
            Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                let command = app.handle_key(key);
                if let Some(status) = app.pending_status(&command) {
                    app.set_status(status);
                    terminal
                        .draw(|frame| ui::render(frame, app))
                        .context("failed to render terminal frame")?;
                }
                app.execute(command).await?;
            }
            Some(Ok(_)) => {}
            Some(Err(event_error)) => {
                return Err(event_error).context("failed to read terminal event");
            }
            None => return Ok(()),
        }
    }
}
