use std::io::{self, Write};

use tracing_subscriber::EnvFilter;

use crate::redact::redact_line;

/// A `tracing-subscriber` writer that redacts secret-shaped substrings from
/// each rendered line before it reaches stdout. Wrapping the writer (rather
/// than writing a full `Layer`) keeps the redaction pass a single,
/// easy-to-audit seam between formatting and I/O.
#[derive(Clone, Default)]
struct RedactingWriter;

impl Write for RedactingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let text = String::from_utf8_lossy(buf);
        let redacted = redact_line(&text);
        io::stdout().write_all(redacted.as_bytes())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stdout().flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RedactingWriter {
    type Writer = RedactingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        RedactingWriter
    }
}

/// Installs the process-wide JSON log subscriber. `log_level` follows
/// `tracing_subscriber::EnvFilter` syntax (a bare level such as `INFO` is
/// valid). Must be called exactly once, before any other component starts
/// logging.
pub fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_new(log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .json()
        .with_env_filter(filter)
        .with_writer(RedactingWriter)
        .with_current_span(true)
        .with_target(true)
        .init();
}
