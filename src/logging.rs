use chrono::Local;
use colored::*;

/// Log severity levels understood by every sink.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogLevel {
    Info,
    Success,
    Warn,
    Error,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "INFO",
            LogLevel::Success => "SUCCESS",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Write-only logging seam. The orchestrator never depends on a concrete
/// sink; anything implementing this can be plugged in.
pub trait LogSink: Send + Sync {
    fn log(&self, level: LogLevel, message: &str);
}

/// Timestamped console writer used when no external sink is supplied.
#[derive(Debug, Default, Clone)]
pub struct ConsoleSink {
    pub show_debug: bool,
}

impl ConsoleSink {
    pub fn new() -> Self {
        Self { show_debug: false }
    }

    pub fn verbose() -> Self {
        Self { show_debug: true }
    }
}

impl LogSink for ConsoleSink {
    fn log(&self, level: LogLevel, message: &str) {
        if level == LogLevel::Debug && !self.show_debug {
            return;
        }

        let stamp = Local::now().format("%H:%M:%S");
        let tag = match level {
            LogLevel::Info => "INFO".bright_blue(),
            LogLevel::Success => "OK".bright_green().bold(),
            LogLevel::Warn => "WARN".bright_yellow().bold(),
            LogLevel::Error => "ERROR".bright_red().bold(),
            LogLevel::Debug => "DEBUG".bright_black(),
        };

        println!("{} {:>5} {}", stamp.to_string().bright_black(), tag, message);
    }
}

/// Discards everything. Handy for tests and --json mode where human
/// output would corrupt the stream.
#[derive(Debug, Default, Clone)]
pub struct NullSink;

impl LogSink for NullSink {
    fn log(&self, _level: LogLevel, _message: &str) {}
}
