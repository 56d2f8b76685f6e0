//! ## acmsim-telemetry::logging
//! **`tracing` subscriber setup**
//!
//! `RUST_LOG` wins over the configured level when set.

use tracing::{info_span, Span};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Clone)]
pub struct EventLogger;

impl EventLogger {
    /// Installs the global fmt subscriber. Fails if one is already set.
    pub fn init(level: &str) -> Result<(), TryInitError> {
        fmt()
            .with_env_filter(Self::filter(level, std::env::var("RUST_LOG").ok().as_deref()))
            .with_target(true)
            .with_span_events(FmtSpan::CLOSE)
            .finish()
            .try_init()
    }

    /// Filter from `RUST_LOG` if given and valid, `level` otherwise.
    pub fn filter(level: &str, env: Option<&str>) -> EnvFilter {
        env.and_then(|directives| EnvFilter::try_new(directives).ok())
            .or_else(|| EnvFilter::try_new(level).ok())
            .unwrap_or_else(|| EnvFilter::new("info"))
    }

    /// Span wrapping everything logged during one repetition.
    pub fn run_span(run: usize, seed: u64) -> Span {
        info_span!("run", run, seed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    #[test]
    fn env_directives_override_level() {
        let filter = EventLogger::filter("info", Some("acmsim_sched=trace"));
        assert_eq!(filter.to_string(), "acmsim_sched=trace");
        let filter = EventLogger::filter("debug", None);
        assert_eq!(filter.to_string(), "debug");
    }

    #[test]
    fn bad_level_falls_back_to_info() {
        let filter = EventLogger::filter("acmsim=loud", None);
        assert_eq!(filter.to_string(), "info");
    }

    #[traced_test]
    #[test]
    fn run_span_wraps_events() {
        let span = EventLogger::run_span(3, 42);
        let _guard = span.enter();
        tracing::info!("inside run");
        assert!(logs_contain("inside run"));
        assert!(logs_contain("run=3"));
    }
}
