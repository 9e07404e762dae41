//! Subscriber setup: human-readable console output plus per-subsystem
//! rotating JSON files, both driven by the `logging` config section.

use crate::config::{LoggingConfig, Section};
use file_rotate::{
    compression::Compression,
    suffix::{AppendTimestamp, FileLimit},
    ContentLimit, FileRotate,
};
use parking_lot::Mutex;
use std::io::{IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::level_filters::LevelFilter;
use tracing::Level;
use tracing_subscriber::filter::Targets;
use tracing_subscriber::{fmt, util::SubscriberInitExt, Layer};

// The non-blocking console worker stops when its guard drops.
static CONSOLE_GUARD: OnceLock<tracing_appender::non_blocking::WorkerGuard> = OnceLock::new();

const DEFAULT_SECTION: &str = "default";
const DEFAULT_MAX_SIZE_MB: u64 = 100;

/// Unknown names fall back to INFO; "off" and "none" disable the sink.
fn parse_level(s: &str) -> Option<Level> {
    match s.to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        "off" | "none" => None,
        _ => Some(Level::INFO),
    }
}

fn level_filter(s: &str) -> LevelFilter {
    parse_level(s)
        .map(LevelFilter::from_level)
        .unwrap_or(LevelFilter::OFF)
}

/// `target` belongs to `subsystem` when equal to it or nested under it (`subsystem::...`).
fn in_subsystem(target: &str, subsystem: &str) -> bool {
    target
        .strip_prefix(subsystem)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with("::"))
}

// ---------- rotating files ----------

type Rotating = Arc<Mutex<FileRotate<AppendTimestamp>>>;

#[derive(Clone)]
struct FileSink(Rotating);

impl Write for FileSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.0.lock().flush()
    }
}

/// A sink that may be absent; absent sinks swallow writes.
struct MaybeSink(Option<FileSink>);

impl Write for MaybeSink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        match &mut self.0 {
            Some(sink) => sink.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> std::io::Result<()> {
        match &mut self.0 {
            Some(sink) => sink.flush(),
            None => Ok(()),
        }
    }
}

/// Picks the file of the most specific subsystem owning a record's target.
#[derive(Clone, Default)]
struct SubsystemFiles {
    fallback: Option<FileSink>,
    subsystems: Vec<(String, FileSink)>,
}

impl SubsystemFiles {
    fn sink_for(&self, target: &str) -> Option<FileSink> {
        self.subsystems
            .iter()
            .filter(|(name, _)| in_subsystem(target, name))
            .max_by_key(|(name, _)| name.len())
            .map(|(_, sink)| sink.clone())
            .or_else(|| self.fallback.clone())
    }

    fn is_empty(&self) -> bool {
        self.fallback.is_none() && self.subsystems.is_empty()
    }
}

impl<'a> fmt::MakeWriter<'a> for SubsystemFiles {
    type Writer = MaybeSink;

    fn make_writer(&'a self) -> Self::Writer {
        MaybeSink(self.fallback.clone())
    }

    fn make_writer_for(&'a self, meta: &tracing::Metadata<'_>) -> Self::Writer {
        MaybeSink(self.sink_for(meta.target()))
    }
}

fn resolve_log_path(file: &str, base_dir: &Path) -> PathBuf {
    let p = Path::new(file);
    if p.is_absolute() {
        p.to_path_buf()
    } else {
        base_dir.join(p)
    }
}

/// Retention prefers a backup count; without one, files expire by age (default one day).
fn open_rotating(section: &Section, base_dir: &Path) -> std::io::Result<Option<FileSink>> {
    if section.file.trim().is_empty() {
        return Ok(None);
    }
    let path = resolve_log_path(&section.file, base_dir);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let limit = match section.max_backups {
        Some(n) => FileLimit::MaxFiles(n),
        None => FileLimit::Age(chrono::Duration::days(
            i64::from(section.max_age_days.unwrap_or(1)),
        )),
    };
    let max_bytes = section.max_size_mb.unwrap_or(DEFAULT_MAX_SIZE_MB) as usize * 1024 * 1024;

    let rot = FileRotate::new(
        &path,
        AppendTimestamp::default(limit),
        ContentLimit::BytesSurpassed(max_bytes),
        Compression::None,
        None,
    );
    Ok(Some(FileSink(Arc::new(Mutex::new(rot)))))
}

fn open_files(cfg: &LoggingConfig, base_dir: &Path) -> SubsystemFiles {
    let mut files = SubsystemFiles::default();
    for (name, section) in cfg {
        match open_rotating(section, base_dir) {
            Ok(Some(sink)) if name == DEFAULT_SECTION => files.fallback = Some(sink),
            Ok(Some(sink)) => files.subsystems.push((name.clone(), sink)),
            Ok(None) => {}
            // No subscriber exists yet, so stderr is the only channel.
            Err(e) => eprintln!("Failed to open log file '{}' for '{name}': {e}", section.file),
        }
    }
    files
}

// ---------- per-sink level targets ----------

#[derive(Clone, Copy)]
enum Sink {
    Console,
    File { has_fallback_file: bool },
}

fn build_targets(cfg: &LoggingConfig, sink: Sink) -> Targets {
    let default = cfg.get(DEFAULT_SECTION);
    let default_level = match sink {
        Sink::Console => default
            .map(|s| level_filter(&s.console_level))
            .unwrap_or(LevelFilter::INFO),
        Sink::File { has_fallback_file } => match default {
            Some(s) if has_fallback_file && !s.file_level.is_empty() => level_filter(&s.file_level),
            _ if has_fallback_file => LevelFilter::INFO,
            _ => LevelFilter::OFF,
        },
    };

    let mut targets = Targets::new().with_default(default_level);
    for (name, section) in cfg.iter().filter(|(k, _)| k.as_str() != DEFAULT_SECTION) {
        let level = match sink {
            Sink::Console => &section.console_level,
            Sink::File { .. } if section.file.trim().is_empty() => continue,
            Sink::File { .. } => &section.file_level,
        };
        targets = targets.with_target(name.clone(), level_filter(level));
    }
    targets
}

// ---------- public init ----------

/// Install the global subscriber. `RUST_LOG`, when set, caps every sink.
/// Relative log file paths are resolved against `base_dir`.
pub fn init_logging(cfg: &LoggingConfig, base_dir: &Path) {
    // Bridge `log` records before the subscriber goes in.
    if let Err(e) = tracing_log::LogTracer::init() {
        eprintln!("LogTracer init skipped: {e}");
    }

    if cfg.is_empty() {
        init_minimal();
        return;
    }

    let files = open_files(cfg, base_dir);
    let console_targets = build_targets(cfg, Sink::Console);
    let file_targets = build_targets(
        cfg,
        Sink::File {
            has_fallback_file: files.fallback.is_some(),
        },
    );
    install_subscriber(console_targets, file_targets, files);
}

fn install_subscriber(console_targets: Targets, file_targets: Targets, files: SubsystemFiles) {
    use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

    let env = EnvFilter::try_from_default_env().ok();

    let (nb_stderr, guard) = tracing_appender::non_blocking(std::io::stderr());
    let _ = CONSOLE_GUARD.set(guard);

    let console_layer = fmt::layer()
        .with_writer(nb_stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(true)
        .with_level(true)
        .with_timer(fmt::time::UtcTime::rfc_3339())
        .with_filter(console_targets);

    let file_layer = (!files.is_empty()).then(|| {
        fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(true)
            .with_level(true)
            .with_timer(fmt::time::UtcTime::rfc_3339())
            .with_writer(files)
            .with_filter(file_targets)
    });

    let _ = Registry::default()
        .with(env)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

fn init_minimal() {
    use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

    let env = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_timer(fmt::time::UtcTime::rfc_3339());

    let _ = Registry::default().with(env).with(fmt_layer).try_init();
}
