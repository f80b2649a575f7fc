use log::{Level, LevelFilter, Metadata, Record};
use std::sync::OnceLock;
use std::time::SystemTime;

static BOOT_TIME: OnceLock<SystemTime> = OnceLock::new();

mod colors {
    pub const RESET: &str = "\x1b[0m";
    pub const BRIGHT_RED: &str = "\x1b[91m";
    pub const BRIGHT_YELLOW: &str = "\x1b[93m";
    pub const BRIGHT_GREEN: &str = "\x1b[92m";
    pub const BRIGHT_BLUE: &str = "\x1b[94m";
    pub const GRAY: &str = "\x1b[90m";
}

/// Serial logger that prints colored, timestamped, module-tagged lines
struct SerialLogger;

impl log::Log for SerialLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }

        // Time since boot
        let boot_time = BOOT_TIME.get_or_init(SystemTime::now);
        let elapsed = SystemTime::now()
            .duration_since(*boot_time)
            .unwrap_or_default();
        let ts = format_uptime(elapsed.as_secs(), elapsed.subsec_millis());

        let (color, level_char) = level_style(record.level());
        let module = short_module(record.module_path());

        println!(
            "{}{} [{}] {:>12} | {}{}",
            color, ts, level_char, module, record.args(), colors::RESET
        );
    }

    fn flush(&self) {}
}

static LOGGER: SerialLogger = SerialLogger;

fn level_style(level: Level) -> (&'static str, char) {
    match level {
        Level::Error => (colors::BRIGHT_RED, 'E'),
        Level::Warn => (colors::BRIGHT_YELLOW, 'W'),
        Level::Info => (colors::BRIGHT_GREEN, 'I'),
        Level::Debug => (colors::BRIGHT_BLUE, 'D'),
        Level::Trace => (colors::GRAY, 'T'),
    }
}

/// Compact uptime: seconds under a minute, then m/s, then h/m
fn format_uptime(seconds: u64, millis: u32) -> String {
    if seconds < 60 {
        format!("{:>3}.{:03}s", seconds, millis)
    } else if seconds < 3600 {
        format!("{:>2}m{:02}s", seconds / 60, seconds % 60)
    } else {
        format!("{:>2}h{:02}m", seconds / 3600, (seconds % 3600) / 60)
    }
}

/// Last path segment, capped at 12 chars
fn short_module(path: Option<&str>) -> &str {
    let module = path
        .unwrap_or("unknown")
        .rsplit("::")
        .next()
        .unwrap_or("unknown");
    match module.char_indices().nth(12) {
        Some((idx, _)) => &module[..idx],
        None => module,
    }
}

/// Install the serial logger with colors and timestamps
pub fn init_logger() -> Result<(), log::SetLoggerError> {
    let _ = BOOT_TIME.set(SystemTime::now());
    log::set_logger(&LOGGER)?;
    log::set_max_level(LevelFilter::Info);

    println!("{}┌─────────────────────────────────────────┐{}", colors::BRIGHT_GREEN, colors::RESET);
    println!("{}│        ESP32 Firmware Auto-Update       │{}", colors::BRIGHT_GREEN, colors::RESET);
    println!("{}└─────────────────────────────────────────┘{}", colors::BRIGHT_GREEN, colors::RESET);
    Ok(())
}

/// Parse a level name; `None` if unrecognised
pub fn parse_level(level: &str) -> Option<LevelFilter> {
    Some(match level.trim().to_ascii_lowercase().as_str() {
        "off" => LevelFilter::Off,
        "error" => LevelFilter::Error,
        "warn" | "warning" => LevelFilter::Warn,
        "info" => LevelFilter::Info,
        "debug" => LevelFilter::Debug,
        "trace" => LevelFilter::Trace,
        _ => return None,
    })
}

/// Parse and set log level from a string; returns true if applied
pub fn set_max_level_from_str(level: &str) -> bool {
    match parse_level(level) {
        Some(filter) => {
            log::set_max_level(filter);
            true
        }
        None => false,
    }
}
