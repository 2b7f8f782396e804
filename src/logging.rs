use log::{Level, LevelFilter, Metadata, Record};
use std::sync::OnceLock;
use std::time::Instant;

static BOOT: OnceLock<Instant> = OnceLock::new();

mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const RED: &str = "\x1b[91m";
    pub const YELLOW: &str = "\x1b[93m";
    pub const GREEN: &str = "\x1b[92m";
    pub const BLUE: &str = "\x1b[94m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Serial console logger: colored level tag, boot-relative time, short module name
struct ConsoleLogger;

/// `  12.345s`, then ` 4m05s`, then ` 2h17m` as the uptime grows
fn uptime_stamp(since_boot: std::time::Duration) -> String {
    let secs = since_boot.as_secs();
    match secs {
        0..=59 => format!("{:>3}.{:03}s", secs, since_boot.subsec_millis()),
        60..=3599 => format!("{:>2}m{:02}s", secs / 60, secs % 60),
        _ => format!("{:>2}h{:02}m", secs / 3600, (secs % 3600) / 60),
    }
}

impl log::Log for ConsoleLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        let boot = BOOT.get_or_init(Instant::now);
        let stamp = uptime_stamp(boot.elapsed());

        let (color, tag) = match record.level() {
            Level::Error => (colors::RED, 'E'),
            Level::Warn => (colors::YELLOW, 'W'),
            Level::Info => (colors::GREEN, 'I'),
            Level::Debug => (colors::BLUE, 'D'),
            Level::Trace => (colors::GRAY, 'T'),
        };

        // "fetch_core::http" -> "http"
        let module = record
            .module_path()
            .and_then(|path| path.rsplit("::").next())
            .unwrap_or("?");
        let module = &module[..module.len().min(10)];

        println!("{}{} [{}] {:>10} | {}{}", color, stamp, tag, module, record.args(), colors::RESET);
    }

    fn flush(&self) {}
}

static LOGGER: ConsoleLogger = ConsoleLogger;

pub fn init_logger() -> Result<(), log::SetLoggerError> {
    let _ = BOOT.set(Instant::now());
    log::set_logger(&LOGGER)?;
    log::set_max_level(LevelFilter::Info);

    println!("{}┌──────────────────────────────────┐{}", colors::GREEN, colors::RESET);
    println!("{}│   Cellular Fetch console logger  │{}", colors::GREEN, colors::RESET);
    println!("{}└──────────────────────────────────┘{}", colors::GREEN, colors::RESET);
    Ok(())
}

/// Parse and set log level from a string; returns true if applied
pub fn set_max_level_from_str(level: &str) -> bool {
    let filter = match level.to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => return false,
    };
    log::set_max_level(filter);
    true
}
