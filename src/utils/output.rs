use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

use crate::models::log_record::{LogRecord, Source};

/// Color used for a record's source column
pub fn source_color(source: Source) -> Option<Color> {
    match source {
        Source::Local => Some(Color::Blue),
        Source::Proxied => Some(Color::Green),
        Source::Mitm => Some(Color::Magenta),
        Source::Websocket | Source::Tunnel | Source::Direct => Some(Color::Cyan),
        Source::Blocked | Source::Error => Some(Color::Red),
        Source::Unknown => None,
    }
}

/// One-line summary of a record, without colors
pub fn format_row(record: &LogRecord) -> String {
    let time = record
        .timestamp
        .map(|ts| ts.with_timezone(&chrono::Local).format("%H:%M:%S%.3f").to_string())
        .unwrap_or_else(|| "--:--:--.---".to_string());
    let status = record.status.map(|s| s.to_string()).unwrap_or_else(|| "---".to_string());
    let rewritten = if record.rewrites.is_empty() { ' ' } else { '*' };

    format!(
        "{} {:<7} {} {:<5} {}{}",
        time,
        record.method,
        status,
        record.content_bucket(),
        rewritten,
        record.display_url()
    )
}

/// Prints records to stdout, coloring the source column when stdout is a
/// terminal
pub struct RowPrinter {
    stdout: StandardStream,
}

impl Default for RowPrinter {
    fn default() -> Self {
        Self::new()
    }
}

impl RowPrinter {
    pub fn new() -> Self {
        Self {
            stdout: StandardStream::stdout(ColorChoice::Auto),
        }
    }

    pub fn print(&mut self, record: &LogRecord) -> io::Result<()> {
        self.stdout
            .set_color(ColorSpec::new().set_fg(source_color(record.source)).set_bold(record.source == Source::Blocked))?;
        write!(self.stdout, "{:<9}", record.source)?;
        self.stdout.reset()?;
        writeln!(self.stdout, " {}", format_row(record))
    }

    /// Status line below the rows
    pub fn print_summary(&mut self, shown: usize, total: usize, has_more: bool) -> io::Result<()> {
        self.stdout.set_color(ColorSpec::new().set_dimmed(true))?;
        writeln!(
            self.stdout,
            "-- {} of {} records{} --",
            shown,
            total,
            if has_more { ", more available" } else { "" }
        )?;
        self.stdout.reset()
    }
}
