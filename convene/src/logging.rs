//! Logging for convene nodes.
//!
//! Built on the `tracing` ecosystem. Library code only emits events and
//! spans; a binary picks one of the `init*` functions below to install a
//! global subscriber. Runtime events of a node (`actor-created`,
//! `message-dropped`, ...) go through that node's [`EventSink`], whose default
//! implementation forwards to these same macros.
//!
//! ```rust,no_run
//! use convene::logging;
//!
//! logging::init_development();
//! logging::info!("node starting");
//!
//! let span = convene::node_span!("10.0.0.1:1900");
//! let _guard = span.enter();
//! ```
//!
//! [`EventSink`]: convene_api::EventSink

use std::fs::OpenOptions;
use std::io;
use std::path::Path;
use std::sync::{Mutex, Once};

use tracing::{Level, Subscriber};
use tracing_subscriber::{
    filter::LevelFilter, fmt, prelude::*, registry::LookupSpan, EnvFilter, Layer,
};

/// Configuration for the global subscriber.
///
/// ```rust
/// use convene::logging::LogConfig;
/// use tracing::Level;
///
/// let config = LogConfig {
///     level: Level::DEBUG,
///     target_filters: Some("convene::router=trace".to_string()),
///     ..Default::default()
/// };
/// assert!(!config.json_format);
/// ```
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Minimum log level to display
    pub level: Level,
    /// Whether to use JSON format for logs
    pub json_format: bool,
    /// Whether to include file and line information
    pub show_file_line: bool,
    /// Whether to include thread name/id
    pub show_thread_info: bool,
    /// Whether to include timestamps
    pub show_time: bool,
    /// Target filter expressions (format: "target=level,target2=level2,...")
    pub target_filters: Option<String>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            json_format: false,
            show_file_line: true,
            show_thread_info: true,
            show_time: true,
            target_filters: None,
        }
    }
}

// Only the first init call installs a subscriber.
static INIT: Once = Once::new();

/// Installs the global subscriber described by `config`.
///
/// Safe to call more than once; later calls are ignored.
pub fn init(config: LogConfig) {
    INIT.call_once(|| {
        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer(&config));
        set_global_subscriber(subscriber);
    });
}

/// Installs a subscriber writing to the console and appending to `log_file`.
///
/// The file is always written without ANSI colors and with full location
/// information.
pub fn init_with_file(config: LogConfig, log_file: impl AsRef<Path>) -> io::Result<()> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)?;

    INIT.call_once(move || {
        let file_layer = fmt::layer()
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .with_file(true)
            .with_line_number(true)
            .with_thread_names(true)
            .with_thread_ids(true);

        let subscriber = tracing_subscriber::registry()
            .with(env_filter(&config))
            .with(console_layer(&config))
            .with(file_layer);
        set_global_subscriber(subscriber);
    });
    Ok(())
}

pub fn init_default() {
    init(LogConfig::default());
}

/// DEBUG everywhere, TRACE for the router, colored output with locations.
pub fn init_development() {
    init(LogConfig {
        level: Level::DEBUG,
        target_filters: Some("convene=debug,convene::router=trace".to_string()),
        ..Default::default()
    });
}

/// INFO level JSON lines without file locations.
pub fn init_production() {
    init(LogConfig {
        level: Level::INFO,
        json_format: true,
        show_file_line: false,
        show_thread_info: true,
        show_time: true,
        target_filters: None,
    });
}

/// Warnings and errors only, compact output.
pub fn init_test() {
    init(LogConfig {
        level: Level::WARN,
        json_format: false,
        show_file_line: true,
        show_thread_info: false,
        show_time: false,
        target_filters: None,
    });
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    let mut filter =
        EnvFilter::from_default_env().add_directive(LevelFilter::from_level(config.level).into());

    if let Some(filters) = &config.target_filters {
        for directive in filters.split(',') {
            match directive.trim().parse() {
                Ok(directive) => filter = filter.add_directive(directive),
                Err(err) => eprintln!("Ignoring log filter {:?}: {}", directive, err),
            }
        }
    }
    filter
}

fn console_layer<S>(config: &LogConfig) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'a> LookupSpan<'a> + Send + Sync,
{
    if config.json_format {
        return fmt::layer()
            .json()
            .flatten_event(true)
            .with_thread_ids(config.show_thread_info)
            .boxed();
    }

    let layer = fmt::layer()
        .with_ansi(atty::is(atty::Stream::Stdout))
        .with_file(config.show_file_line)
        .with_line_number(config.show_file_line)
        .with_thread_names(config.show_thread_info)
        .with_thread_ids(config.show_thread_info);

    if config.show_time {
        layer.boxed()
    } else {
        layer.without_time().boxed()
    }
}

fn set_global_subscriber<S>(subscriber: S)
where
    S: Subscriber + Send + Sync + 'static,
{
    if let Err(err) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Error setting global tracing subscriber: {}", err);
    }
}

/// Span wrapping everything a node does.
#[macro_export]
macro_rules! node_span {
    ($address:expr) => {
        tracing::info_span!("node", address = %$address)
    };
    ($address:expr, $($fields:tt)*) => {
        tracing::info_span!("node", address = %$address, $($fields)*)
    };
}

/// Span wrapping one actor's dispatch loop.
#[macro_export]
macro_rules! actor_span {
    ($actor_type:expr, $actor:expr) => {
        tracing::info_span!("actor", actor_type = $actor_type, id = %$actor)
    };
    ($actor_type:expr, $actor:expr, $($fields:tt)*) => {
        tracing::info_span!("actor", actor_type = $actor_type, id = %$actor, $($fields)*)
    };
}

pub use tracing::{debug, error, info, trace, warn};
