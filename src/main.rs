use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter, Layer};

use phylim::cli::args::Cli;
use phylim::cli::commands::execute_command;
use phylim::cli::output;

fn main() {
    let cli = Cli::parse();

    setup_logging(cli.debug);

    let code = match execute_command(&cli) {
        Ok(code) => code,
        Err(e) => {
            output::error(&e);
            e.exit_code()
        }
    };
    std::process::exit(code);
}

/// Logs go to stderr so stdout stays parseable.
///
/// `-d` raises phylim's own level one step per repetition; `RUST_LOG`, when
/// set, replaces the whole filter.
fn setup_logging(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warn,phylim={level}")));

    let layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(verbosity > 1)
        .with_span_events(if verbosity > 2 {
            FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        })
        .with_filter(filter);

    tracing_subscriber::registry().with(layer).init();
    tracing::debug!("log level: {}", level);
}
