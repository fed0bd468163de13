//! Pager entrypoint: CLI, logging, input acquisition and UI wiring.

mod infobar;
mod input;
mod viewer;

use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Duration;

use anyhow::{Result, bail};
use clap::Parser;
use core_config::{History, Options};
use core_events::{EVENT_CHANNEL_CAP, EventSourceRegistry};
use core_fetch::{Fetcher, Pos};
use core_filter::parse_filter_spec;
use core_spool::{GrowthHandle, Session};
use core_terminal::{CrosstermBackend, TerminalBackend};
use core_view::loops::{EmptyPageRefresh, Follower, LastLineTracker};
use core_view::{SharedViewBuffer, ViewBuffer};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use crate::infobar::InfoBar;
use crate::input::TerminalInput;
use crate::viewer::Viewer;

/// CLI arguments.
#[derive(Parser, Debug)]
#[command(name = "slit", version, about = "A pager for large logs and streams")]
struct Args {
    /// File to view; omit to read from standard input.
    path: Option<PathBuf>,
    /// Stdin cache location; when set the cache file is preserved on exit.
    #[arg(short = 'O', long = "output")]
    output: Option<PathBuf>,
    /// Follow the file/stdin as it grows.
    #[arg(short = 'f', long = "follow")]
    follow: bool,
    /// Initial number of characters kept during horizontal scrolling.
    #[arg(short = 'K', long = "keep-chars", default_value_t = 0)]
    keep_chars: usize,
    /// Filter file names or inline filters, separated by semicolons.
    #[arg(long = "filters")]
    filters: Option<String>,
    /// Write debug logs to slit.log in the temp directory.
    #[arg(long = "debug")]
    debug: bool,
    /// Always open the terminal UI, even when the output is short.
    #[arg(long = "always-term")]
    always_term: bool,
    /// Maximum duration (ms) to wait for delayed short stdin.
    #[arg(long = "short-stdin-timeout", default_value_t = 10_000, value_name = "MS")]
    short_stdin_timeout: u64,
}

impl Args {
    fn options(&self) -> Options {
        Options {
            out_path: self.output.clone(),
            follow: self.follow,
            keep_chars: self.keep_chars,
            always_term: self.always_term,
            short_stdin_timeout: Duration::from_millis(self.short_stdin_timeout),
            debug: self.debug,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

fn configure_logging(debug: bool) -> Option<WorkerGuard> {
    if !debug {
        return None;
    }
    let appender = tracing_appender::rolling::never(std::env::temp_dir(), "slit.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
        )
        .with_writer(writer)
        .with_ansi(false)
        .init();
    tracing::info!(target: "runtime", "startup");
    Some(guard)
}

async fn run(args: Args) -> Result<()> {
    let _log_guard = configure_logging(args.debug);
    let opts = args.options();
    let stdin_piped = !io::stdin().is_terminal();
    let stdout_tty = io::stdout().is_terminal();

    // Never start the UI into a pipe: degrade to a plain copy.
    if args.path.is_none() {
        if !stdin_piped {
            bail!("Only viewing of one file or from STDIN is supported");
        }
        if !stdout_tty {
            io::copy(&mut io::stdin().lock(), &mut io::stdout().lock())?;
            return Ok(());
        }
    } else if let Some(path) = &args.path {
        if !stdout_tty {
            core_spool::validate_regular_file(path)?;
            let mut file = std::fs::File::open(path)?;
            io::copy(&mut file, &mut io::stdout().lock())?;
            return Ok(());
        }
    }

    let cancel = CancellationToken::new();
    let session = match &args.path {
        Some(path) => Session::from_file(path)?,
        None => Session::from_stdin(opts.out_path.clone(), cancel.child_token())?,
    };
    let growth = session.growth();
    let fetcher = Fetcher::new(session.reader()?, growth.clone(), cancel.clone())?;
    let mut backend = CrosstermBackend::new();

    // Short inputs skip the UI entirely; probed before filters apply.
    if !opts.always_term {
        let (w, h) = backend.size().unwrap_or((80, 24));
        let fits = can_fit_display(
            &fetcher,
            &growth,
            w as usize,
            h as usize,
            opts.short_stdin_timeout,
        )
        .await?;
        if fits {
            io::copy(&mut session.reader()?, &mut io::stdout().lock())?;
            cancel.cancel();
            session.shutdown().await;
            return Ok(());
        }
    }

    if let Some(spec) = &args.filters {
        for filter in parse_filter_spec(spec)? {
            fetcher.add_filter(filter);
        }
    }

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAP);
    let buffer: SharedViewBuffer = Arc::new(Mutex::new(ViewBuffer::new(fetcher.clone())));
    let following = Arc::new(AtomicBool::new(false));

    let mut registry = EventSourceRegistry::new();
    registry.register(TerminalInput {
        cancel: cancel.child_token(),
    });
    registry.register(EmptyPageRefresh {
        buffer: buffer.clone(),
        fetcher: fetcher.clone(),
        growth: growth.clone(),
        follow: opts.follow,
        cancel: cancel.child_token(),
    });
    registry.register(LastLineTracker {
        fetcher: fetcher.clone(),
        growth: growth.clone(),
        cancel: cancel.child_token(),
    });
    registry.register(Follower {
        fetcher: fetcher.clone(),
        following: following.clone(),
        follow: opts.follow,
        cancel: cancel.child_token(),
    });

    let info = InfoBar::new(History::new(core_config::history_path()));
    let viewer = Viewer::new(
        fetcher.clone(),
        buffer,
        info,
        session.source_path().to_owned(),
        opts.follow,
        following,
        opts.keep_chars,
    );

    let guard = backend.enter_guard()?;
    let handles = registry.spawn_all(&tx);
    drop(tx);

    let result = viewer.run(rx).await;
    drop(guard);

    // Orderly teardown: stop every background task before the byte source
    // goes away, then let the session clean up its cache file.
    cancel.cancel();
    for handle in handles {
        let _ = tokio::time::timeout(Duration::from_millis(500), handle).await;
    }
    session.shutdown().await;
    result
}

/// Counts wrapped display rows until the input provably exceeds one screen
/// or provably fits. While the stream is still growing, keeps re-opening
/// the stream from the last counted line; gives up (UI it is) once
/// `timeout` passes without an answer.
async fn can_fit_display(
    fetcher: &Arc<Fetcher>,
    growth: &GrowthHandle,
    width: usize,
    height: usize,
    timeout: Duration,
) -> Result<bool> {
    let deadline = tokio::time::Instant::now() + timeout;
    let width = width.max(1);
    let mut rows = 0usize;
    let mut resume = Pos::START;
    let mut counted_past: Option<u64> = None;

    loop {
        let mut stream = fetcher.get(resume).await?;
        loop {
            match tokio::time::timeout_at(deadline, stream.next()).await {
                Err(_) => return Ok(false),
                Ok(Some(line)) => {
                    if counted_past.is_some_and(|offset| line.pos.offset <= offset) {
                        continue;
                    }
                    counted_past = Some(line.pos.offset);
                    resume = line.pos;
                    let len = line.text.len();
                    rows += if len == 0 { 1 } else { len.div_ceil(width) };
                    if rows > height {
                        return Ok(false);
                    }
                }
                Ok(None) => {
                    if growth.still_growing() {
                        if tokio::time::Instant::now() >= deadline {
                            return Ok(false);
                        }
                        tokio::time::sleep(Duration::from_millis(10)).await;
                        break;
                    }
                    return Ok(rows < height);
                }
            }
        }
    }
}
