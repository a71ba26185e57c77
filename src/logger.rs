//! Session log for the editing engine.
//!
//! One file per run under the platform data directory, truncated at start:
//!   Windows:  `%APPDATA%\StickerPaint\stickerpaint.log`
//!   Linux:    `~/.local/share/StickerPaint/stickerpaint.log`
//!   macOS:    `~/Library/Application Support/StickerPaint/stickerpaint.log`
//!
//! Crate code logs through `log_info!`, `log_warn!` and `log_err!`. Until
//! [`init`] has run (library callers, unit tests) every record is dropped.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, OnceLock};
use std::time::{SystemTime, UNIX_EPOCH};

const APP_DIR: &str = "StickerPaint";
const LOG_NAME: &str = "stickerpaint.log";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Level {
    Info,
    Warn,
    Error,
    Panic,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
            Level::Panic => "PANIC",
        })
    }
}

/// The open log plus its sinks.
struct SessionLog {
    path: PathBuf,
    file: Mutex<File>,
    /// Mirror every line to stderr (CLI `--verbose`)
    echo: bool,
}

impl SessionLog {
    fn emit(&self, line: &str) {
        if let Ok(mut file) = self.file.lock() {
            let _ = writeln!(file, "{}", line);
        }
        if self.echo {
            eprintln!("{}", line);
        }
    }
}

static SESSION: OnceLock<SessionLog> = OnceLock::new();

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Info, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Warn, format_args!($($arg)*))
    };
}

#[macro_export]
macro_rules! log_err {
    ($($arg:tt)*) => {
        $crate::logger::record($crate::logger::Level::Error, format_args!($($arg)*))
    };
}

/// Where this run is logging, once [`init`] succeeded.
pub fn log_path() -> Option<&'static Path> {
    SESSION.get().map(|s| s.path.as_path())
}

/// Append one timestamped record. Silently dropped before [`init`].
pub fn record(level: Level, args: fmt::Arguments<'_>) {
    if let Some(session) = SESSION.get() {
        session.emit(&format_record(clock_of_day(), level, args));
    }
}

fn format_record(clock: String, level: Level, args: fmt::Arguments<'_>) -> String {
    format!("[{}] [{}] {}", clock, level, args)
}

/// Open (or truncate) the log file and hook panics into it. A second call is
/// ignored; a log file that cannot be opened leaves logging disabled.
pub fn init(echo: bool) {
    if SESSION.get().is_some() {
        return;
    }
    let path = data_dir().join(APP_DIR).join(LOG_NAME);
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    let file = match OpenOptions::new().create(true).write(true).truncate(true).open(&path) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("[logger] cannot open {}: {}", path.display(), e);
            return;
        }
    };
    let session = SESSION.get_or_init(|| SessionLog { path, file: Mutex::new(file), echo });

    session.emit(&format!(
        "=== StickerPaint {} session, unix {} ===",
        env!("CARGO_PKG_VERSION"),
        unix_seconds()
    ));
    session.emit(&format!("Log file: {}", session.path.display()));

    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        record(Level::Panic, format_args!("{}", info));
        prev(info);
    }));
}

/// Platform data directory, without the app folder.
pub(crate) fn data_dir() -> PathBuf {
    let var = |name: &str| std::env::var_os(name).filter(|v| !v.is_empty()).map(PathBuf::from);

    #[cfg(target_os = "windows")]
    {
        if let Some(appdata) = var("APPDATA") {
            return appdata;
        }
    }
    #[cfg(target_os = "macos")]
    {
        if let Some(home) = var("HOME") {
            return home.join("Library").join("Application Support");
        }
    }
    var("XDG_DATA_HOME")
        .or_else(|| var("HOME").map(|h| h.join(".local").join("share")))
        .unwrap_or_else(|| PathBuf::from("."))
}

/// Seconds since the unix epoch; zero if the clock is before it.
pub(crate) fn unix_seconds() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// UTC wall clock as HH:MM:SS.mmm.
fn clock_of_day() -> String {
    let Ok(d) = SystemTime::now().duration_since(UNIX_EPOCH) else {
        return "--:--:--.---".to_string();
    };
    let secs = d.as_secs() % 86_400;
    format!(
        "{:02}:{:02}:{:02}.{:03}",
        secs / 3600,
        secs % 3600 / 60,
        secs % 60,
        d.subsec_millis()
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_layout() {
        let line = format_record("01:02:03.004".to_string(), Level::Warn, format_args!("layer {} locked", 7));
        assert_eq!(line, "[01:02:03.004] [WARN] layer 7 locked");
    }

    #[test]
    fn clock_has_fixed_width() {
        let clock = clock_of_day();
        assert_eq!(clock.len(), 12);
        assert_eq!(&clock[2..3], ":");
        assert_eq!(&clock[8..9], ".");
    }

    #[test]
    fn macros_are_silent_before_init() {
        log_info!("dropped {}", 1);
        log_err!("dropped too");
        assert!(log_path().is_none());
    }
}
