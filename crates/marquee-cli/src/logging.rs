use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::fmt::{self, time::ChronoUtc};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

/// Filter directives for a verbosity level. `RUST_LOG` wins unless `-q` is set.
fn filter(verbose: u8, quiet: bool) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    let directives = match verbose {
        0 => "warn,marquee=info",
        // -v: keep the HTTP stack quiet
        1 => "debug,hyper=warn,hyper_util=warn,reqwest=info,rustls=warn",
        _ => "trace",
    };
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directives))
}

/// Log to stderr, or to a daily-rotated file when `log_file` is set.
pub fn init(verbose: u8, quiet: bool, log_file: Option<&Path>) -> Result<()> {
    let registry = Registry::default().with(filter(verbose, quiet));

    let Some(log_path) = log_file else {
        registry
            .with(
                fmt::layer()
                    .with_timer(ChronoUtc::rfc_3339())
                    .with_writer(io::stderr),
            )
            .init();
        return Ok(());
    };

    let log_dir = log_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("creating log directory {}", log_dir.display()))?;
    let file_name = log_path
        .file_name()
        .and_then(|n| n.to_str())
        .context("log file path has no file name")?;
    // "marquee.log" rotates as "marquee.2026-01-17" etc.
    let prefix = file_name
        .rsplit_once('.')
        .map_or(file_name, |(stem, _)| stem);

    let appender = RollingFileAppender::new(Rotation::DAILY, log_dir, prefix);
    registry
        .with(
            fmt::layer()
                .with_timer(ChronoUtc::rfc_3339())
                .with_ansi(false)
                .with_writer(appender),
        )
        .init();
    Ok(())
}
