//! Logging for the client and the `dlmtp` binary.
//!
//! Every line exchanged with the daemon is traced under the [`WIRE_TARGET`]
//! target at TRACE level through [`wire!`](crate::wire). Lines carrying
//! credentials are logged in their redacted form only.

use std::str::FromStr;

use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, prelude::__tracing_subscriber_SubscriberExt, util::SubscriberInitExt,
};

/// Target of the per-line protocol trace.
pub const WIRE_TARGET: &str = "dlmtp::wire";

/// Stands in for secrets in anything logged.
pub const REDACTED: &str = "<redacted>";

/// Environment variable selecting the log level.
pub const LEVEL_ENV: &str = "LOG_LEVEL";

/// Traces one protocol line, `send` for lines written to the daemon and
/// `recv` for lines read from it.
#[macro_export]
macro_rules! wire {
    (send, $($arg:tt)+) => {
        $crate::tracing::trace!(target: "dlmtp::wire", direction = "send", $($arg)+)
    };
    (recv, $($arg:tt)+) => {
        $crate::tracing::trace!(target: "dlmtp::wire", direction = "recv", $($arg)+)
    };
}

/// Picks the level from a `LOG_LEVEL` value, falling back to INFO.
fn level(value: Option<&str>) -> LevelFilter {
    let Some(value) = value else {
        return LevelFilter::INFO;
    };

    LevelFilter::from_str(value).unwrap_or_else(|_| {
        eprintln!("Invalid {LEVEL_ENV} '{value}', defaulting to INFO");
        LevelFilter::INFO
    })
}

/// Installs the global subscriber, writing to stderr so stdout stays free for
/// command output. Wire traffic only shows up with `LOG_LEVEL=trace`.
pub fn init() {
    let level = level(std::env::var(LEVEL_ENV).ok().as_deref());

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact()
                .with_timer(tracing_subscriber::fmt::time::ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(|metadata| {
                    metadata.target().starts_with("dlmtp")
                })),
        )
        .init();
}

#[cfg(test)]
pub(crate) mod tests {
    use std::{
        io::Write,
        sync::{Arc, Mutex, PoisonError},
    };

    use pretty_assertions::assert_eq;
    use tracing::subscriber::DefaultGuard;

    use super::*;

    /// Everything the fmt layer writes while a [`capture`] guard is alive.
    #[derive(Clone, Default)]
    pub struct Captured(Arc<Mutex<Vec<u8>>>);

    impl Captured {
        pub fn contents(&self) -> String {
            let bytes = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            String::from_utf8_lossy(&bytes).into_owned()
        }
    }

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    /// Routes this thread's events at every level into a buffer.
    pub fn capture() -> (Captured, DefaultGuard) {
        let captured = Captured::default();
        let writer = captured.clone();

        let guard = tracing_subscriber::registry()
            .with(
                tracing_subscriber::fmt::layer()
                    .with_ansi(false)
                    .with_writer(move || writer.clone())
                    .with_filter(LevelFilter::TRACE),
            )
            .set_default();

        (captured, guard)
    }

    #[test]
    fn test_level() {
        assert_eq!(level(None), LevelFilter::INFO);
        assert_eq!(level(Some("trace")), LevelFilter::TRACE);
        assert_eq!(level(Some("WARN")), LevelFilter::WARN);
        assert_eq!(level(Some("loud")), LevelFilter::INFO);
    }

    #[test]
    fn test_wire_target_and_direction() {
        let (captured, _guard) = capture();

        wire!(send, "{}", "LHLO localhost");
        wire!(recv, "{}", "250 SIZE");

        let logs = captured.contents();
        let line = |text: &str| {
            logs.lines()
                .find(|line| line.contains(text))
                .unwrap_or_default()
                .to_string()
        };

        let sent = line("LHLO localhost");
        assert!(sent.contains(WIRE_TARGET), "{logs}");
        assert!(sent.contains("direction=\"send\""), "{logs}");
        assert!(line("250 SIZE").contains("direction=\"recv\""), "{logs}");
    }
}
