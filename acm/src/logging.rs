//! Logging for the manager goes through the [log] facade.
//!
//! Hosted builds get a colored console [Logger]; embedded integrators install
//! whatever logger their kernel already has. Per-transition tracing uses
//! [debug_ex], which disappears from release builds.

#[cfg(feature = "std")]
use log::{Level, LevelFilter, Log, Metadata, Record, SetLoggerError, set_logger, set_max_level};

#[cfg(feature = "std")]
pub struct Logger;

#[cfg(feature = "std")]
impl Log for Logger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let color = match record.level() {
            Level::Error => 31, // Red
            Level::Warn => 93,  // BrightYellow
            Level::Info => 20,  // White
            Level::Debug => 32, // Green
            Level::Trace => 90, // BrightBlack
        };
        std::eprintln!(
            "\u{1B}[{}m[{:>5}] {}: {}\u{1B}[0m",
            color,
            record.level(),
            record.target(),
            record.args(),
        );
    }

    fn flush(&self) {}
}

/// Install [Logger] as the global logger.
///
/// Fails if another logger was installed first; the level is left untouched then.
#[cfg(feature = "std")]
pub fn init(level: LevelFilter) -> Result<(), SetLoggerError> {
    static LOGGER: Logger = Logger;
    set_logger(&LOGGER)?;
    set_max_level(level);
    Ok(())
}

/// Improved debug macro,
/// only compiled in debug mode.
#[macro_export]
macro_rules! debug_ex {
    // debug_ex!(target: "my_target", "a {} event", "log")
    (target: $target:expr, $($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            log::log!(target: $target, log::Level::Debug, $($arg)+)
        }
    };

    // debug_ex!("a {} event", "log")
    ($($arg:tt)+) => {
        #[cfg(debug_assertions)]
        {
            log::log!(log::Level::Debug, $($arg)+)
        }
    }
}
