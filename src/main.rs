mod cli;
mod config;
mod differ;
mod gate;
mod pipeline;
mod report;
mod shell;
mod state;

use anyhow::Context;
use cli::Cli;
use config::{Config, default_state_dir_from_env, find_config_from_env};
use differ::differ_for;
use pipeline::{Outcome, Pipeline, Settings};
use shell::SystemShell;
use state::StateStore;
use std::fmt as stdfmt;
use std::io::{IsTerminal, Write, stderr, stdout};
use std::process::ExitCode;
use std::time::SystemTime;
use tracing::{Event, Level, Subscriber, debug, error, info};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;

struct DachsExitCode;

impl DachsExitCode {
    /// Exit code used when at least one command failed; the rest of the
    /// batch still ran.
    fn command_failed() -> ExitCode {
        ExitCode::from(1)
    }

    /// Exit code used for fatal errors (config, arguments, state directory).
    fn any_error() -> ExitCode {
        ExitCode::from(255)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    init_tracing(cli.log_filter());

    match run_batch(&cli) {
        Ok(exit_code) => exit_code,
        Err(err) => {
            error!("{err:#}");
            DachsExitCode::any_error()
        }
    }
}

fn run_batch(cli: &Cli) -> anyhow::Result<ExitCode> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => find_config_from_env()?,
    };
    info!("Using config {}", config_path.display());

    let config = Config::load(&config_path)
        .with_context(|| format!("Unable to load {}", config_path.display()))?;

    let state_dir = cli
        .state_dir
        .clone()
        .or_else(|| config.state_dir.clone())
        .or_else(default_state_dir_from_env)
        .context("No state_dir configured and no home directory to default to")?;
    let store = StateStore::open(&state_dir)?;
    info!("Using state directory {}", store.dir().display());

    let shell = SystemShell::default();
    let differ = differ_for(config.differ);
    let settings = Settings {
        force: cli.force,
        default_interval: config.default_interval(),
    };
    let pipeline = Pipeline::new(&store, &shell, differ.as_ref(), settings);

    let mut out = stdout().lock();
    let mut failed = 0usize;

    for spec in &config.commands {
        let outcome = pipeline.run(spec, SystemTime::now());
        if matches!(outcome, Outcome::Completed { .. }) && outcome.diff().is_empty() {
            debug!("No change in output of {:?}", spec.label());
        }
        let (diff, err) = outcome.into_parts();

        report::write_diff(&mut out, spec.label(), &diff)
            .and_then(|()| out.flush())
            .context("Unable to write to stdout")?;

        if let Some(err) = err {
            failed += 1;
            error!("{}: {}", spec.label(), err);
        }
    }

    info!(
        "Processed {} command(s), {} failed",
        config.commands.len(),
        failed
    );

    if failed > 0 {
        Ok(DachsExitCode::command_failed())
    } else {
        Ok(ExitCode::SUCCESS)
    }
}

/// An explicit `filter` (from -v or --log-level) wins over RUST_LOG; without
/// one, RUST_LOG applies and the default is `warn`.
fn init_tracing(filter: Option<&str>) {
    let stderr_is_terminal = stderr().is_terminal();
    let formatter = EmojiFormatter { stderr_is_terminal };

    let filter = match filter {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
    };

    let fmt_layer = tracing_fmt::layer()
        .event_format(formatter)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

struct EmojiFormatter {
    stderr_is_terminal: bool,
}

impl<S, N> FormatEvent<S, N> for EmojiFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> stdfmt::Result {
        if self.stderr_is_terminal {
            match *event.metadata().level() {
                Level::DEBUG => write!(writer, "🔍 ")?,
                Level::INFO => write!(writer, "ℹ️ ")?,
                Level::WARN => write!(writer, "⚠️  ")?,
                Level::ERROR => write!(writer, "❌️ ")?,
                _ => {}
            }
        } else {
            match *event.metadata().level() {
                Level::TRACE => writer.write_str("TRACE: ")?,
                Level::DEBUG => writer.write_str("DEBUG: ")?,
                Level::INFO => writer.write_str("INFO: ")?,
                Level::WARN => writer.write_str("WARN: ")?,
                Level::ERROR => writer.write_str("ERROR: ")?,
                _ => {}
            }
        }

        ctx.format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}
