//! Tracing setup and structured spans for generation attempts.

use tracing::{Level, info, span, warn};
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` wins when set. Otherwise the filter is `forge=info,warn`, or
/// `forge=debug,info` when `verbose` is true. Verbose output also reports span
/// close events, which gives per-phase timings for free.
///
/// # Errors
///
/// Returns an error if a global subscriber was already installed.
pub fn init_tracing(verbose: bool) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| {
            if verbose {
                EnvFilter::try_new("forge=debug,info")
            } else {
                EnvFilter::try_new("forge=info,warn")
            }
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    if verbose {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_span_events(FmtSpan::CLOSE)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_line_number(false)
                    .with_file(false)
                    .with_writer(std::io::stderr)
                    .compact(),
            )
            .try_init()?;
    }

    Ok(())
}

/// Span covering one generation attempt of one document.
#[must_use]
pub fn generation_span(document_id: &str, epoch: u64, branch: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "generation",
        document_id = %document_id,
        epoch = epoch,
        branch = %branch,
    )
}

/// Span covering one phase executor call.
#[must_use]
pub fn phase_span(document_id: &str, phase: &str) -> tracing::Span {
    span!(
        Level::INFO,
        "phase",
        document_id = %document_id,
        phase = %phase,
    )
}

pub fn log_phase_complete(document_id: &str, phase: &str, duration_ms: u128) {
    info!(
        document_id = %document_id,
        phase = %phase,
        duration_ms = %duration_ms,
        "Phase completed"
    );
}

/// Log a degraded-but-valid outcome (fallback plan, worker placeholder, fallback context).
pub fn log_degraded(document_id: &str, phase: &str, reason: &str) {
    warn!(
        document_id = %document_id,
        phase = %phase,
        reason = %reason,
        "Phase degraded to fallback"
    );
}
