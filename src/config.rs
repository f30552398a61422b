//! Functions and structures related to configuring a Stampede load test.
//!
//! Stampede can be configured at run time by passing in the options and flags defined by
//! the [`StampedeConfiguration`] structure.
//!
//! Stampede can be configured programmatically with [`StampedeDefaultType::set_default`].
//!
//! Both are resolved once, before the load test starts, into an immutable [`RunConfig`]
//! that is handed to the [`Runner`](../runner/trait.Runner.html).

use gumdrop::Options;
use serde::{Deserialize, Serialize};
use simplelog::*;
use std::fmt;
use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

use crate::logger::LogFormat;
use crate::util;
use crate::{Stampede, StampedeError};

/// The per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

/// How long in-flight iterations may keep running after the run ends, when not configured.
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);

/// Runtime options available when launching a Stampede load test.
///
/// Custom defaults can be programmatically set for most of these options using
/// [`StampedeDefaultType::set_default`].
///
/// Stampede leverages [`gumdrop`](https://docs.rs/gumdrop/) to derive the help output
/// (`-h`) from the below structure.
#[derive(Options, Debug, Clone, Default, Serialize, Deserialize)]
#[options(
    help = r#"Stampede runs a fixed number of virtual users against an HTTP endpoint for a
fixed amount of time, checking every response.

The following runtime options are available when launching a Stampede load test:"#
)]
pub struct StampedeConfiguration {
    /// Displays this help
    #[options(short = "h")]
    pub help: bool,
    /// Prints version information
    #[options(short = "V", help = "Prints version information\n")]
    pub version: bool,

    /// Defines host to load test (ie http://10.21.32.33)
    #[options(short = "H")]
    pub host: String,
    /// Sets concurrent virtual users (default: 1)
    #[options(short = "u")]
    pub users: Option<usize>,
    /// Stops load test after (30s, 20m, 3h, 1h30m, etc)
    #[options(short = "t", meta = "TIME")]
    pub run_time: String,
    /// Sets how many iterations each user runs then exits
    #[options(no_short, meta = "VALUE")]
    pub iterations: usize,
    /// Sets per-request timeout (default: 60s)
    #[options(no_short, meta = "TIME")]
    pub timeout: Option<String>,
    /// Sets how long in-flight iterations may finish once the run ends (default: 30s)
    #[options(no_short, meta = "TIME")]
    pub graceful_stop: Option<String>,
    /// Enables Stampede log file and sets name
    #[options(short = "G", meta = "NAME")]
    pub stampede_log: String,
    /// Increases Stampede log file level (-g, -gg, etc)
    #[options(short = "g", count)]
    pub log_level: u8,
    /// Decreases Stampede verbosity (-q, -qq, etc)
    #[options(count, short = "q")]
    pub quiet: u8,
    /// Increases Stampede verbosity (-v, -vv, etc)
    #[options(
        count,
        short = "v",
        // Add a blank line and then a 'Metrics:' header after this option
        help = "Increases Stampede verbosity (-v, -vv, etc)\n\nMetrics:"
    )]
    pub verbose: u8,

    /// How often to optionally print running metrics, in seconds
    #[options(no_short, meta = "VALUE")]
    pub running_metrics: Option<usize>,
    /// Doesn't display metrics at end of load test
    #[options(no_short)]
    pub no_print_metrics: bool,
    /// Sets request log file name
    #[options(short = "R", meta = "NAME")]
    pub request_log: String,
    /// Sets request log format (csv, json, raw)
    #[options(no_short, meta = "FORMAT")]
    pub request_format: Option<LogFormat>,
}

/// Optional default values for Stampede run-time options.
///
/// These custom defaults can be configured using [`StampedeDefaultType::set_default()`].
#[derive(Clone, Debug, Default)]
pub(crate) struct StampedeDefaults {
    /// An optional default host to run this load test against.
    pub host: Option<String>,
    /// An optional default number of users to simulate.
    pub users: Option<usize>,
    /// An optional default time span for the test to run.
    pub run_time: Option<String>,
    /// An optional default number of iterations per user.
    pub iterations: Option<usize>,
    /// An optional default per-request timeout.
    pub timeout: Option<String>,
    /// An optional default graceful stop window.
    pub graceful_stop: Option<String>,
    /// An optional default for the Stampede log file name.
    pub stampede_log: Option<String>,
    /// An optional default log file level.
    pub log_level: Option<u8>,
    /// An optional default value for quiet level.
    pub quiet: Option<u8>,
    /// An optional default value for verbosity level.
    pub verbose: Option<u8>,
    /// An optional default for printing running metrics.
    pub running_metrics: Option<usize>,
    /// An optional default for not displaying metrics at the end of the load test.
    pub no_print_metrics: Option<bool>,
    /// An optional default for the request log file name.
    pub request_log: Option<String>,
    /// An optional default for the request log file format.
    pub request_format: Option<LogFormat>,
}

/// Defines all [`StampedeConfiguration`] options that can be programmatically configured
/// with a custom default.
///
/// These custom defaults can be configured using [`StampedeDefaultType::set_default()`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StampedeDefault {
    /// An optional default host to run this load test against.
    Host,
    /// An optional default number of users to simulate.
    Users,
    /// An optional default time span for the test to run.
    RunTime,
    /// An optional default number of iterations each user runs.
    Iterations,
    /// An optional default per-request timeout.
    Timeout,
    /// An optional default graceful stop window.
    GracefulStop,
    /// An optional default for the Stampede log file name.
    StampedeLog,
    /// An optional default log file level.
    LogLevel,
    /// An optional default value for quiet level.
    Quiet,
    /// An optional default value for verbosity level.
    Verbose,
    /// An optional default for printing running metrics.
    RunningMetrics,
    /// An optional default for not displaying metrics at end of load test.
    NoPrintMetrics,
    /// An optional default for the request log file name.
    RequestLog,
    /// An optional default for the request log file format.
    RequestFormat,
}

/// All run-time options can optionally be configured with custom defaults.
///
/// For example, you can optionally configure a default host for the load test. This is
/// used if no per-iteration host is defined and no `--host` CLI option is configured.
///
/// The following run-time options can be configured with a custom default using a
/// borrowed string slice ([`&str`]):
///  - [`StampedeDefault::Host`]
///  - [`StampedeDefault::RunTime`]
///  - [`StampedeDefault::Timeout`]
///  - [`StampedeDefault::GracefulStop`]
///  - [`StampedeDefault::StampedeLog`]
///  - [`StampedeDefault::RequestLog`]
///
/// The following run-time options can be configured with a custom default using a
/// [`usize`] integer:
///  - [`StampedeDefault::Users`]
///  - [`StampedeDefault::RunTime`] (seconds)
///  - [`StampedeDefault::Iterations`]
///  - [`StampedeDefault::LogLevel`]
///  - [`StampedeDefault::Quiet`]
///  - [`StampedeDefault::Verbose`]
///  - [`StampedeDefault::RunningMetrics`]
///
/// The following run-time flags can be configured with a custom default using a
/// [`bool`] (and otherwise default to [`false`]):
///  - [`StampedeDefault::NoPrintMetrics`]
///
/// The following run-time options can be configured with a custom default using a
/// [`LogFormat`]:
///  - [`StampedeDefault::RequestFormat`]
pub trait StampedeDefaultType<T> {
    /// Sets a [`StampedeDefault`] to the provided value. The required type of each option
    /// is documented in [`StampedeDefaultType`].
    ///
    /// # Example
    /// ```rust
    /// use stampede::prelude::*;
    ///
    /// fn main() -> Result<(), StampedeError> {
    ///     Stampede::initialize_with_config(Default::default())?
    ///         // Simulate 50 users.
    ///         .set_default(StampedeDefault::Users, 50)?
    ///         // Run for 30 seconds.
    ///         .set_default(StampedeDefault::RunTime, "30s")?
    ///         // Log all requests made during the test to `./stampede-request.log`.
    ///         .set_default(StampedeDefault::RequestLog, "stampede-request.log")?;
    ///
    ///     Ok(())
    /// }
    /// ```
    fn set_default(self, key: StampedeDefault, value: T) -> Result<Box<Self>, StampedeError>;
}
impl StampedeDefaultType<&str> for Stampede {
    /// Sets [`StampedeDefault`] to a [`&str`] value.
    fn set_default(mut self, key: StampedeDefault, value: &str) -> Result<Box<Self>, StampedeError> {
        match key {
            // Set valid defaults.
            StampedeDefault::Host => {
                self.defaults.host = if value.is_empty() {
                    None
                } else {
                    Some(value.to_string())
                }
            }
            StampedeDefault::RunTime => self.defaults.run_time = Some(value.to_string()),
            StampedeDefault::Timeout => self.defaults.timeout = Some(value.to_string()),
            StampedeDefault::GracefulStop => self.defaults.graceful_stop = Some(value.to_string()),
            StampedeDefault::StampedeLog => self.defaults.stampede_log = Some(value.to_string()),
            StampedeDefault::RequestLog => self.defaults.request_log = Some(value.to_string()),
            // Otherwise display a helpful and explicit error.
            StampedeDefault::Users
            | StampedeDefault::Iterations
            | StampedeDefault::LogLevel
            | StampedeDefault::Quiet
            | StampedeDefault::Verbose
            | StampedeDefault::RunningMetrics => {
                return Err(wrong_type(key, value, "usize", "&str"));
            }
            StampedeDefault::NoPrintMetrics => {
                return Err(wrong_type(key, value, "bool", "&str"));
            }
            StampedeDefault::RequestFormat => {
                return Err(wrong_type(key, value, "LogFormat", "&str"));
            }
        }
        Ok(Box::new(self))
    }
}
impl StampedeDefaultType<usize> for Stampede {
    /// Sets [`StampedeDefault`] to a [`usize`] value.
    fn set_default(mut self, key: StampedeDefault, value: usize) -> Result<Box<Self>, StampedeError> {
        match key {
            StampedeDefault::Users => self.defaults.users = Some(value),
            StampedeDefault::RunTime => self.defaults.run_time = Some(value.to_string()),
            StampedeDefault::Iterations => self.defaults.iterations = Some(value),
            StampedeDefault::LogLevel => self.defaults.log_level = Some(saturate_u8(value)),
            StampedeDefault::Quiet => self.defaults.quiet = Some(saturate_u8(value)),
            StampedeDefault::Verbose => self.defaults.verbose = Some(saturate_u8(value)),
            StampedeDefault::RunningMetrics => self.defaults.running_metrics = Some(value),
            StampedeDefault::Host
            | StampedeDefault::Timeout
            | StampedeDefault::GracefulStop
            | StampedeDefault::StampedeLog
            | StampedeDefault::RequestLog => {
                return Err(wrong_type(key, &value.to_string(), "&str", "usize"));
            }
            StampedeDefault::NoPrintMetrics => {
                return Err(wrong_type(key, &value.to_string(), "bool", "usize"));
            }
            StampedeDefault::RequestFormat => {
                return Err(wrong_type(key, &value.to_string(), "LogFormat", "usize"));
            }
        }
        Ok(Box::new(self))
    }
}
impl StampedeDefaultType<bool> for Stampede {
    /// Sets [`StampedeDefault`] to a [`bool`] value.
    fn set_default(mut self, key: StampedeDefault, value: bool) -> Result<Box<Self>, StampedeError> {
        match key {
            StampedeDefault::NoPrintMetrics => self.defaults.no_print_metrics = Some(value),
            StampedeDefault::Host
            | StampedeDefault::RunTime
            | StampedeDefault::Timeout
            | StampedeDefault::GracefulStop
            | StampedeDefault::StampedeLog
            | StampedeDefault::RequestLog => {
                return Err(wrong_type(key, &value.to_string(), "&str", "bool"));
            }
            StampedeDefault::Users
            | StampedeDefault::Iterations
            | StampedeDefault::LogLevel
            | StampedeDefault::Quiet
            | StampedeDefault::Verbose
            | StampedeDefault::RunningMetrics => {
                return Err(wrong_type(key, &value.to_string(), "usize", "bool"));
            }
            StampedeDefault::RequestFormat => {
                return Err(wrong_type(key, &value.to_string(), "LogFormat", "bool"));
            }
        }
        Ok(Box::new(self))
    }
}
impl StampedeDefaultType<LogFormat> for Stampede {
    /// Sets [`StampedeDefault`] to a [`LogFormat`] value.
    fn set_default(
        mut self,
        key: StampedeDefault,
        value: LogFormat,
    ) -> Result<Box<Self>, StampedeError> {
        match key {
            StampedeDefault::RequestFormat => self.defaults.request_format = Some(value),
            _ => return Err(wrong_type(key, &value.to_string(), "another type", "LogFormat")),
        }
        Ok(Box::new(self))
    }
}

// Build the error returned when `set_default` is called with the wrong value type.
fn wrong_type(key: StampedeDefault, value: &str, expected: &str, received: &str) -> StampedeError {
    StampedeError::InvalidOption {
        option: format!("StampedeDefault::{:?}", key),
        value: value.to_string(),
        detail: format!(
            "set_default(StampedeDefault::{:?}, {}) expected {} value, received {}",
            key, value, expected, received
        ),
    }
}

fn saturate_u8(value: usize) -> u8 {
    u8::try_from(value).unwrap_or(u8::MAX)
}

/// Used internally to configure [`StampedeConfiguration`] values based on precedence rules.
#[derive(Debug, Clone)]
pub(crate) struct StampedeValue<T> {
    /// The optional value to set.
    pub(crate) value: Option<T>,
    /// Filter using this value if true.
    pub(crate) filter: bool,
}

pub(crate) trait StampedeConfigure<T> {
    /// Return the first unfiltered [`StampedeValue`], if any.
    fn get_value(&self, values: Vec<StampedeValue<T>>) -> Option<T>;
}

impl<T> StampedeConfigure<T> for StampedeConfiguration {
    fn get_value(&self, values: Vec<StampedeValue<T>>) -> Option<T> {
        values
            .into_iter()
            .filter(|value| !value.filter)
            .find_map(|value| value.value)
    }
}

/// Where and how the optional request log is written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestLogConfig {
    /// Path of the request log file.
    pub path: PathBuf,
    /// Format of each line in the request log.
    pub format: LogFormat,
}

/// Stampede's own log output: terminal verbosity and an optional log file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogSettings {
    /// Increases terminal verbosity.
    pub verbose: u8,
    /// Decreases terminal verbosity.
    pub quiet: u8,
    /// Log file level.
    pub log_level: u8,
    /// Optional log file.
    pub log_file: Option<PathBuf>,
}

/// The resolved, validated configuration of one load test.
///
/// Built once by [`StampedeConfiguration::configure`] before the load test starts and
/// passed by reference to the [`Runner`](../runner/trait.Runner.html). Nothing mutates
/// it while the load test runs.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Replaces the scheme and authority of every request URL, if set.
    pub host: Option<Url>,
    /// How many virtual users run concurrently.
    pub users: NonZeroUsize,
    /// How long the load test runs, if bounded by time.
    pub run_time: Option<Duration>,
    /// How many iterations each user runs, if bounded by iterations.
    pub iterations: Option<usize>,
    /// Per-request timeout.
    pub timeout: Duration,
    /// How long in-flight iterations may finish once the run ends.
    pub graceful_stop: Duration,
    /// How often running metrics are logged, if at all.
    pub running_metrics: Option<Duration>,
    /// Optional request log.
    pub request_log: Option<RequestLogConfig>,
    /// Whether final metrics are printed when the load test finishes.
    pub print_metrics: bool,
    /// Stampede's own log output.
    pub logging: LogSettings,
}
impl RunConfig {
    /// A configuration running `users` virtual users for `run_time`, with every other
    /// option at its default.
    pub fn new(users: NonZeroUsize, run_time: Duration) -> Self {
        RunConfig {
            host: None,
            users,
            run_time: Some(run_time),
            iterations: None,
            timeout: DEFAULT_TIMEOUT,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            running_metrics: None,
            request_log: None,
            print_metrics: true,
            logging: LogSettings::default(),
        }
    }

    /// Optionally initialize the Stampede logger which writes to standard out and/or to
    /// a configurable log file.
    pub(crate) fn initialize_logger(&self) {
        // Configure terminal output level.
        let debug_level = match self.logging.verbose {
            0 => match self.logging.quiet {
                0 => LevelFilter::Info,
                1 => LevelFilter::Warn,
                _ => LevelFilter::Error,
            },
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        // Configure log file level.
        let log_level = match self.logging.log_level {
            0 => LevelFilter::Warn,
            1 => LevelFilter::Info,
            2 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        };

        let mut loggers: Vec<Box<dyn SharedLogger>> =
            vec![SimpleLogger::new(debug_level, Config::default())];

        // Open the log file if configured.
        let mut log_file_error = None;
        if let Some(log_to_file) = self.logging.log_file.as_ref() {
            match std::fs::File::create(log_to_file) {
                Ok(file) => loggers.push(WriteLogger::new(log_level, Config::default(), file)),
                Err(e) => log_file_error = Some((log_to_file.display().to_string(), e)),
            }
        }

        match CombinedLogger::init(loggers) {
            Ok(_) => (),
            Err(e) => {
                // Only one logger can be installed per process.
                debug!("failed to initialize CombinedLogger: {}", e);
                return;
            }
        }

        if let Some((path, e)) = log_file_error {
            warn!("failed to create log file {}: {}", path, e);
        } else if let Some(log_to_file) = self.logging.log_file.as_ref() {
            info!("Writing to log file: {}", log_to_file.display());
        }

        info!("Output verbosity level: {}", debug_level);
        info!("Logfile verbosity level: {}", log_level);
    }
}

impl StampedeConfiguration {
    /// Implement precedence rules for all [`StampedeConfiguration`] values, then
    /// validate the result into a [`RunConfig`].
    ///
    /// A value set at run time wins over a programmatic default, which wins over the
    /// built-in value.
    pub(crate) fn configure(&self, defaults: &StampedeDefaults) -> Result<RunConfig, StampedeError> {
        // Configure `quiet`.
        let quiet = self
            .get_value(vec![
                // Use --quiet if set.
                StampedeValue {
                    value: Some(self.quiet),
                    filter: self.quiet == 0,
                },
                // Otherwise use StampedeDefault if set.
                StampedeValue {
                    value: defaults.quiet,
                    filter: defaults.quiet.is_none(),
                },
            ])
            .unwrap_or(0);

        // Configure `verbose`.
        let verbose = self
            .get_value(vec![
                StampedeValue {
                    value: Some(self.verbose),
                    filter: self.verbose == 0,
                },
                StampedeValue {
                    value: defaults.verbose,
                    filter: defaults.verbose.is_none(),
                },
            ])
            .unwrap_or(0);

        // Can't set both --verbose and --quiet.
        if verbose > 0 && quiet > 0 {
            return Err(StampedeError::InvalidOption {
                option: "`configuration.verbose`".to_string(),
                value: verbose.to_string(),
                detail: "`configuration.verbose` can not be set with `configuration.quiet`."
                    .to_string(),
            });
        }

        // Configure `log_level`.
        let log_level = self
            .get_value(vec![
                StampedeValue {
                    value: Some(self.log_level),
                    filter: self.log_level == 0,
                },
                StampedeValue {
                    value: defaults.log_level,
                    filter: defaults.log_level.is_none(),
                },
            ])
            .unwrap_or(0);

        // Configure `stampede_log`.
        let stampede_log = self
            .get_value(vec![
                StampedeValue {
                    value: Some(self.stampede_log.clone()),
                    filter: self.stampede_log.is_empty(),
                },
                StampedeValue {
                    value: defaults.stampede_log.clone(),
                    filter: defaults.stampede_log.is_none(),
                },
            ])
            .unwrap_or_default();

        // Configure `host`.
        let host = self.get_value(vec![
            // Use --host if set.
            StampedeValue {
                value: Some(self.host.clone()),
                filter: self.host.is_empty(),
            },
            // Otherwise use StampedeDefault if set.
            StampedeValue {
                value: defaults.host.clone(),
                filter: defaults.host.is_none(),
            },
        ]);
        let host = match host {
            Some(host) => Some(util::is_valid_host(&host)?),
            None => None,
        };

        // Configure `users`.
        let users = self
            .get_value(vec![
                // Use --users if set.
                StampedeValue {
                    value: self.users,
                    filter: self.users.is_none(),
                },
                // Otherwise use StampedeDefault if set.
                StampedeValue {
                    value: defaults.users,
                    filter: defaults.users.is_none(),
                },
            ])
            .unwrap_or(1);
        let users = NonZeroUsize::new(users).ok_or_else(|| StampedeError::InvalidOption {
            option: "`configuration.users`".to_string(),
            value: users.to_string(),
            detail: "`configuration.users` must be set to at least 1.".to_string(),
        })?;

        // Configure `run_time`.
        let run_time = self.get_value(vec![
            // Use --run-time if set.
            StampedeValue {
                value: Some(self.run_time.clone()),
                filter: self.run_time.is_empty(),
            },
            // Otherwise use StampedeDefault if set.
            StampedeValue {
                value: defaults.run_time.clone(),
                filter: defaults.run_time.is_none(),
            },
        ]);
        let run_time = match run_time {
            Some(run_time) => {
                let parsed = parse_option_timespan("run_time", &run_time)?;
                // A run time of zero leaves the load test unbounded by time.
                if parsed.is_zero() {
                    None
                } else {
                    Some(parsed)
                }
            }
            None => None,
        };

        // Configure `iterations`.
        let iterations = self
            .get_value(vec![
                StampedeValue {
                    value: Some(self.iterations),
                    filter: self.iterations == 0,
                },
                StampedeValue {
                    value: defaults.iterations,
                    filter: defaults.iterations.is_none(),
                },
            ])
            .filter(|iterations| *iterations > 0);

        // The load test must end at some point.
        if run_time.is_none() && iterations.is_none() {
            return Err(StampedeError::InvalidOption {
                option: "`configuration.run_time`".to_string(),
                value: self.run_time.clone(),
                detail: "A run time or a number of iterations must be configured, for example `--run-time 30s`."
                    .to_string(),
            });
        }

        // Configure `timeout`.
        let timeout = self.get_value(vec![
            StampedeValue {
                value: self.timeout.clone(),
                filter: self.timeout.is_none(),
            },
            StampedeValue {
                value: defaults.timeout.clone(),
                filter: defaults.timeout.is_none(),
            },
        ]);
        let timeout = match timeout {
            Some(timeout) => {
                let parsed = parse_option_timespan("timeout", &timeout)?;
                if parsed.is_zero() {
                    return Err(StampedeError::InvalidOption {
                        option: "`configuration.timeout`".to_string(),
                        value: timeout,
                        detail: "`configuration.timeout` must be greater than 0.".to_string(),
                    });
                }
                parsed
            }
            None => DEFAULT_TIMEOUT,
        };

        // Configure `graceful_stop`.
        let graceful_stop = self.get_value(vec![
            StampedeValue {
                value: self.graceful_stop.clone(),
                filter: self.graceful_stop.is_none(),
            },
            StampedeValue {
                value: defaults.graceful_stop.clone(),
                filter: defaults.graceful_stop.is_none(),
            },
        ]);
        let graceful_stop = match graceful_stop {
            Some(graceful_stop) => parse_option_timespan("graceful_stop", &graceful_stop)?,
            None => DEFAULT_GRACEFUL_STOP,
        };

        // Configure `running_metrics`.
        let running_metrics = self
            .get_value(vec![
                StampedeValue {
                    value: self.running_metrics,
                    filter: self.running_metrics.is_none(),
                },
                StampedeValue {
                    value: defaults.running_metrics,
                    filter: defaults.running_metrics.is_none(),
                },
            ])
            .filter(|seconds| *seconds > 0)
            .map(|seconds| Duration::from_secs(seconds as u64));

        // Configure `no_print_metrics`.
        let no_print_metrics = self
            .get_value(vec![
                StampedeValue {
                    value: Some(self.no_print_metrics),
                    filter: !self.no_print_metrics,
                },
                StampedeValue {
                    value: defaults.no_print_metrics,
                    filter: defaults.no_print_metrics.is_none(),
                },
            ])
            .unwrap_or(false);

        // Configure `request_log` and `request_format`.
        let request_log = self
            .get_value(vec![
                StampedeValue {
                    value: Some(self.request_log.clone()),
                    filter: self.request_log.is_empty(),
                },
                StampedeValue {
                    value: defaults.request_log.clone(),
                    filter: defaults.request_log.is_none(),
                },
            ])
            .unwrap_or_default();
        let request_format = self.get_value(vec![
            StampedeValue {
                value: self.request_format,
                filter: self.request_format.is_none(),
            },
            StampedeValue {
                value: defaults.request_format,
                filter: defaults.request_format.is_none(),
            },
        ]);
        let request_log = if request_log.is_empty() {
            // A format without a log file is most likely a typo.
            if let Some(format) = request_format {
                return Err(StampedeError::InvalidOption {
                    option: "`configuration.request_format`".to_string(),
                    value: format.to_string(),
                    detail: "`configuration.request_format` can not be set without setting `configuration.request_log`."
                        .to_string(),
                });
            }
            None
        } else {
            Some(RequestLogConfig {
                path: PathBuf::from(request_log),
                format: request_format.unwrap_or_default(),
            })
        };

        Ok(RunConfig {
            host,
            users,
            run_time,
            iterations,
            timeout,
            graceful_stop,
            running_metrics,
            request_log,
            print_metrics: !no_print_metrics,
            logging: LogSettings {
                verbose,
                quiet,
                log_level,
                log_file: if stampede_log.is_empty() {
                    None
                } else {
                    Some(PathBuf::from(stampede_log))
                },
            },
        })
    }
}

// Parse a time span option, returning a helpful error if it's invalid.
fn parse_option_timespan(option: &str, value: &str) -> Result<Duration, StampedeError> {
    util::parse_timespan(value).ok_or_else(|| StampedeError::InvalidOption {
        option: format!("`configuration.{}`", option),
        value: value.to_string(),
        detail: format!(
            "`configuration.{}` must be an integer number of seconds or a time span such as 30s, 1m30s or 500ms.",
            option
        ),
    })
}

impl fmt::Display for RunConfig {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "users = {}", self.users)?;
        if let Some(run_time) = self.run_time {
            write!(f, ", run_time = {:?}", run_time)?;
        }
        if let Some(iterations) = self.iterations {
            write!(f, ", iterations = {}", iterations)?;
        }
        if let Some(host) = self.host.as_ref() {
            write!(f, ", host = {}", host)?;
        }
        write!(
            f,
            ", timeout = {:?}, graceful_stop = {:?}",
            self.timeout, self.graceful_stop
        )
    }
}
