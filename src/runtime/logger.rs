//! Dual-sink bootstrap logger.
//!
//! Every line goes to the console and to an in-memory buffer. The buffer is
//! handed to the delegated workload on its stdin so the bootstrap timeline can
//! be forwarded with the workload's own logs.

use chrono::{DateTime, Utc};
use std::io::Write;
use tracing::Level;

pub const LOGGER_NAME: &str = "pilotLogger";

pub struct Logger {
    console: Box<dyn Write + Send>,
    buffer: Vec<String>,
}

impl Logger {
    /// Logger printing to stdout.
    pub fn new() -> Self {
        Self::with_console(Box::new(std::io::stdout()))
    }

    pub fn with_console(console: Box<dyn Write + Send>) -> Self {
        Self {
            console,
            buffer: Vec::new(),
        }
    }

    /// Logger that only keeps the buffer.
    pub fn silent() -> Self {
        Self::with_console(Box::new(std::io::sink()))
    }

    pub fn log(&mut self, level: Level, message: impl AsRef<str>) {
        let line = format_line(Utc::now(), level, message.as_ref());
        // A broken console must not lose the buffered copy.
        let _ = writeln!(self.console, "{line}");
        let _ = self.console.flush();
        self.buffer.push(line);
    }

    pub fn debug(&mut self, message: impl AsRef<str>) {
        self.log(Level::DEBUG, message);
    }

    pub fn info(&mut self, message: impl AsRef<str>) {
        self.log(Level::INFO, message);
    }

    pub fn warn(&mut self, message: impl AsRef<str>) {
        self.log(Level::WARN, message);
    }

    pub fn error(&mut self, message: impl AsRef<str>) {
        self.log(Level::ERROR, message);
    }

    pub fn lines(&self) -> &[String] {
        &self.buffer
    }

    /// Buffered lines as one newline-terminated text.
    pub fn contents(&self) -> String {
        let mut text = self.buffer.join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        text
    }

    /// Takes every buffered line, oldest first, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<String> {
        std::mem::take(&mut self.buffer)
    }
}

impl Default for Logger {
    fn default() -> Self {
        Self::new()
    }
}

fn format_line(timestamp: DateTime<Utc>, level: Level, message: &str) -> String {
    format!(
        "{} {:<8} [{LOGGER_NAME}] {message}",
        timestamp.format("%Y-%m-%dT%H:%M:%S,%6fZ"),
        level.as_str()
    )
}
