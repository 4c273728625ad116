//! Process-wide runtime context.
//!
//! All global state lives in one [`Runtime`] value behind a `OnceLock`:
//! handle tables, the reactor registry, the program's arguments, the
//! script log level, and the installed collector and extension service.
//!
//! The context is created on first use. [`init_with`] chooses its
//! configuration and installs the logger; once the context exists,
//! later calls are no-ops.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, OnceLock};

use parking_lot::{Mutex, RwLock};

use crate::config::RuntimeConfig;
use crate::ext::{ExtensionService, NativeExtensions};
use crate::gc::{Collector, SystemCollector};
use crate::handle::{HandleKind, HandleTable};
use crate::reactor::Registry;
use crate::sync::{Channel, ScriptAtomic, ScriptCondvar, ScriptMutex, ThreadState};
use crate::value::Value;

/// One table per resource kind, so a handle of one kind can never
/// resolve in another kind's table.
pub struct Handles {
    pub threads: Mutex<HandleTable<ThreadState>>,
    pub mutexes: Mutex<HandleTable<ScriptMutex>>,
    pub condvars: Mutex<HandleTable<ScriptCondvar>>,
    pub atomics: Mutex<HandleTable<ScriptAtomic>>,
    pub channels: Mutex<HandleTable<Channel>>,
}

impl Handles {
    fn new() -> Self {
        Handles {
            threads: Mutex::new(HandleTable::new(HandleKind::Thread)),
            mutexes: Mutex::new(HandleTable::new(HandleKind::Mutex)),
            condvars: Mutex::new(HandleTable::new(HandleKind::Condvar)),
            atomics: Mutex::new(HandleTable::new(HandleKind::Atomic)),
            channels: Mutex::new(HandleTable::new(HandleKind::Channel)),
        }
    }

    fn clear(&self) {
        self.threads.lock().clear();
        self.mutexes.lock().clear();
        self.condvars.lock().clear();
        self.atomics.lock().clear();
        self.channels.lock().clear();
    }
}

pub struct Runtime {
    config: RuntimeConfig,
    pub handles: Handles,
    pub reactors: Mutex<Registry>,
    args: RwLock<Vec<String>>,
    log_level: AtomicI64,
    collector: RwLock<Arc<dyn Collector>>,
    extensions: RwLock<Arc<dyn ExtensionService>>,
}

impl Runtime {
    fn new(config: RuntimeConfig) -> Self {
        let log_level = config.log_level;
        Runtime {
            config,
            handles: Handles::new(),
            reactors: Mutex::new(Registry::new()),
            args: RwLock::new(Vec::new()),
            log_level: AtomicI64::new(log_level),
            collector: RwLock::new(Arc::new(SystemCollector)),
            extensions: RwLock::new(Arc::new(NativeExtensions::new())),
        }
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }
}

static RUNTIME: OnceLock<Runtime> = OnceLock::new();

/// The runtime context, created with the environment's configuration if
/// nothing has initialized it yet.
pub fn current() -> &'static Runtime {
    RUNTIME.get_or_init(|| Runtime::new(RuntimeConfig::from_env()))
}

/// Initialize from the environment.
pub fn init() -> &'static Runtime {
    init_with(RuntimeConfig::from_env())
}

/// Initialize with an explicit configuration and install the logger.
pub fn init_with(config: RuntimeConfig) -> &'static Runtime {
    install_logger(&config.log_filter);
    let rt = RUNTIME.get_or_init(|| Runtime::new(config));
    log::debug!("runtime initialized (collector: {})", collector().name());
    rt
}

fn install_logger(filter: &str) {
    static LOGGER: OnceLock<()> = OnceLock::new();
    LOGGER.get_or_init(|| {
        // Another logger may already be installed by an embedding host.
        let _ = env_logger::Builder::new()
            .parse_filters(filter)
            .format_timestamp(None)
            .try_init();
    });
}

/// Release every handle and event loop. Outstanding handles become
/// invalid and further lookups hurl.
pub fn teardown() {
    let rt = current();
    rt.handles.clear();
    rt.reactors.lock().clear();
    log::debug!("runtime torn down");
}

pub fn config() -> &'static RuntimeConfig {
    &current().config
}

pub fn handles() -> &'static Handles {
    &current().handles
}

// ── Collector and extensions ──────────────────────────────────────────

pub fn collector() -> Arc<dyn Collector> {
    current().collector.read().clone()
}

pub fn install_collector(collector: Arc<dyn Collector>) {
    log::debug!("installing collector '{}'", collector.name());
    *current().collector.write() = collector;
}

pub fn extensions() -> Arc<dyn ExtensionService> {
    current().extensions.read().clone()
}

/// Replace the extension service, e.g. with one that provides DTLS.
pub fn install_extensions(service: Arc<dyn ExtensionService>) {
    log::debug!("installing extension service '{}'", service.name());
    *current().extensions.write() = service;
}

// ── Program arguments ─────────────────────────────────────────────────

pub fn set_args(args: Vec<String>) {
    *current().args.write() = args;
}

/// The program arguments as a list of strings.
pub fn args() -> Value {
    let args = current().args.read().clone();
    crate::collections::list::from_values(args.into_iter().map(Value::from).collect())
}

// ── Script log level ──────────────────────────────────────────────────

fn level_filter(level: i64) -> log::LevelFilter {
    match level {
        i64::MIN..=0 => log::LevelFilter::Error,
        1 => log::LevelFilter::Warn,
        2 => log::LevelFilter::Info,
        3 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    }
}

fn level_of(level: i64) -> log::Level {
    match level {
        i64::MIN..=0 => log::Level::Error,
        1 => log::Level::Warn,
        2 => log::Level::Info,
        3 => log::Level::Debug,
        _ => log::Level::Trace,
    }
}

pub fn get_log_level() -> Value {
    Value::Int(current().log_level.load(Ordering::Relaxed))
}

/// Set the script log level. Integers are clamped to 0..=4; anything
/// else is ignored.
pub fn set_log_level(level: &Value) {
    let Value::Int(level) = level else {
        return;
    };
    let level = (*level).clamp(0, 4);
    current().log_level.store(level, Ordering::Relaxed);
    log::set_max_level(level_filter(level));
}

/// Emit `message` from a program at `level` (0..=4), if the current
/// script level lets it through.
pub fn log_message(level: &Value, message: &Value) {
    let level = match level {
        Value::Int(n) => (*n).clamp(0, 4),
        _ => crate::config::DEFAULT_LOG_LEVEL,
    };
    if level <= current().log_level.load(Ordering::Relaxed) {
        log::log!(target: "haver", level_of(level), "{message}");
    }
}
