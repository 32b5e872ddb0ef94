//! Tracing setup for the binary.
//!
//! Library code only emits through the `tracing` macros. Standard output
//! is reserved for event lines, so the subscriber writes to stderr.

/// Initialize the tracing subscriber with thread names and uptime stamps.
///
/// `RUST_LOG` overrides the default filter.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("bounded_buffer=info,producer_consumer=info"));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_names(true)
                .with_file(false)
                .with_line_number(false)
                .with_timer(fmt::time::uptime()),
        )
        .with(filter)
        .init();
}
