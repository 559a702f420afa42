//! Query and sampling log controls, plus subscriber setup.
//!
//! Discovery fans out into many small NRQL statements. [`LogConfig`] decides
//! which of them reach the log and how much of each statement is kept;
//! [`setup::init_logging`] installs a `tracing-subscriber` stack for binaries
//! and tests that embed the engine.

use std::time::Duration;

/// Per-component switches for the noisier engine events.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Emit every NRQL statement at debug level.
    pub log_queries: bool,
    /// Emit the strategy chosen for each sample.
    pub log_sampling: bool,
    /// Longest statement or value kept in a log field.
    pub max_field_length: usize,
    /// Queries slower than this are logged at warn level.
    pub slow_query_threshold: Option<Duration>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self::balanced()
    }
}

impl LogConfig {
    /// Everything on, long fields. Meant for debugging a single account.
    pub fn verbose() -> Self {
        Self {
            log_queries: true,
            log_sampling: true,
            max_field_length: 2048,
            slow_query_threshold: Some(Duration::from_secs(2)),
        }
    }

    /// Only slow queries are reported.
    pub fn production() -> Self {
        Self {
            log_queries: false,
            log_sampling: false,
            max_field_length: 160,
            slow_query_threshold: Some(Duration::from_secs(10)),
        }
    }

    pub fn balanced() -> Self {
        Self {
            log_queries: false,
            log_sampling: true,
            max_field_length: 512,
            slow_query_threshold: Some(Duration::from_secs(5)),
        }
    }

    pub fn with_queries(mut self, enabled: bool) -> Self {
        self.log_queries = enabled;
        self
    }

    pub fn with_slow_query_threshold(mut self, threshold: Option<Duration>) -> Self {
        self.slow_query_threshold = threshold;
        self
    }

    /// Whether a query that took `elapsed` deserves a warning.
    pub fn is_slow(&self, elapsed: Duration) -> bool {
        self.slow_query_threshold.is_some_and(|t| elapsed >= t)
    }
}

/// Logs an NRQL statement at debug level when `log_queries` is set.
#[macro_export]
macro_rules! log_query {
    ($config:expr, $nrql:expr) => {
        if $config.log_queries {
            tracing::debug!(
                nrql = %$crate::logging::truncate_field($nrql, $config.max_field_length),
                "Dispatching NRQL query"
            );
        }
    };
}

/// Logs a sampling decision at info level when `log_sampling` is set.
#[macro_export]
macro_rules! log_sampling {
    ($config:expr, $($arg:tt)*) => {
        if $config.log_sampling {
            tracing::info!($($arg)*);
        }
    };
}

/// Cuts `value` to at most `max_length` bytes on a char boundary.
pub fn truncate_field(value: &str, max_length: usize) -> String {
    if value.len() <= max_length {
        return value.to_string();
    }
    let end = (0..=max_length)
        .rev()
        .find(|i| value.is_char_boundary(*i))
        .unwrap_or(0);
    format!("{}... [{} bytes]", &value[..end], value.len())
}

pub mod setup {
    use tracing::Level;
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

    use crate::error::{DiscoveryError, Result};

    /// Output format of the installed subscriber.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub enum LogFormat {
        #[default]
        Pretty,
        Compact,
        /// One JSON object per event, for log shippers.
        Json,
    }

    #[derive(Debug, Clone)]
    pub struct LoggingConfig {
        /// Level for everything outside this crate.
        pub default_level: Level,
        /// Level for `nrdb_discovery` targets.
        pub crate_level: Level,
        pub format: LogFormat,
        /// Extra `EnvFilter` directives such as `reqwest=warn`.
        pub directives: Vec<String>,
    }

    impl Default for LoggingConfig {
        fn default() -> Self {
            Self {
                default_level: Level::WARN,
                crate_level: Level::INFO,
                format: LogFormat::Pretty,
                directives: Vec::new(),
            }
        }
    }

    impl LoggingConfig {
        pub fn production() -> Self {
            Self {
                format: LogFormat::Json,
                directives: vec!["hyper=warn".to_string(), "reqwest=warn".to_string()],
                ..Self::default()
            }
        }

        pub fn development() -> Self {
            Self {
                default_level: Level::INFO,
                crate_level: Level::DEBUG,
                format: LogFormat::Compact,
                directives: Vec::new(),
            }
        }

        pub fn with_format(mut self, format: LogFormat) -> Self {
            self.format = format;
            self
        }

        pub fn with_crate_level(mut self, level: Level) -> Self {
            self.crate_level = level;
            self
        }

        pub fn with_directive(mut self, directive: impl Into<String>) -> Self {
            self.directives.push(directive.into());
            self
        }

        /// Filter string used when `RUST_LOG` is unset.
        pub fn filter(&self) -> String {
            let mut parts = vec![
                level_name(self.default_level),
                format!("nrdb_discovery={}", level_name(self.crate_level)),
            ];
            parts.extend(self.directives.iter().cloned());
            parts.join(",")
        }
    }

    fn level_name(level: Level) -> String {
        level.as_str().to_ascii_lowercase()
    }

    /// Installs the global subscriber. `RUST_LOG` overrides the configured
    /// filter; a second call fails with a configuration error.
    ///
    /// ```rust,no_run
    /// use nrdb_discovery::logging::setup::{init_logging, LogFormat, LoggingConfig};
    ///
    /// init_logging(LoggingConfig::development().with_format(LogFormat::Json))?;
    /// # Ok::<(), nrdb_discovery::error::DiscoveryError>(())
    /// ```
    pub fn init_logging(config: LoggingConfig) -> Result<()> {
        let filter = match EnvFilter::try_from_default_env() {
            Ok(filter) => filter,
            Err(_) => EnvFilter::try_new(config.filter()).map_err(|e| {
                DiscoveryError::configuration(format!("invalid log filter: {e}"))
            })?,
        };

        let fmt_layer = match config.format {
            LogFormat::Pretty => tracing_subscriber::fmt::layer().boxed(),
            LogFormat::Compact => tracing_subscriber::fmt::layer().compact().boxed(),
            LogFormat::Json => tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(true)
                .boxed(),
        };

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt_layer)
            .try_init()
            .map_err(|e| DiscoveryError::configuration(format!("logging already initialized: {e}")))
    }
}
