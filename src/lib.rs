//! # Stampede
//!
//! Stampede is a small HTTP load generator. A fixed number of virtual users each
//! repeatedly run one [`Iteration`](./scenario/trait.Iteration.html) for a fixed
//! run time, recording request metrics and named checks along the way. When the
//! run time elapses, aggregate request, response time, status code, check and
//! error tables are printed.
//!
//! Stampede uses [`reqwest`](https://docs.rs/reqwest/) to provide the HTTP client
//! and [`tokio`](https://docs.rs/tokio/) to run the virtual users.
//!
//! ## The built-in scenario
//!
//! The `stampede` binary runs [`SyncProducts`](./scenario/struct.SyncProducts.html):
//! 50 virtual users for 30 seconds, each issuing a first-time product sync request
//! and checking that the server answered `200`. Every iteration logs one line:
//!
//! ```text
//! Status: 200 | Duration: 42.7 ms
//! ```
//!
//! Defaults can be overridden from the command line, for example to point the load
//! test at a staging host with fewer users:
//!
//! ```bash
//! $ stampede --host http://staging.local -u 10 -t 1m
//! ```
//!
//! ## Writing your own iteration
//!
//! ```rust,no_run
//! use stampede::prelude::*;
//!
//! struct Homepage;
//!
//! #[async_trait]
//! impl Iteration for Homepage {
//!     fn name(&self) -> &str {
//!         "homepage"
//!     }
//!
//!     async fn iterate(&self, user: &mut VirtualUser) -> Result<(), StampedeError> {
//!         let request = RequestDescriptor::new(Url::parse("http://localhost/")?);
//!         let outcome = user.get(&request).await;
//!         log::info!("{}", outcome);
//!         user.check("status is 200", outcome.status == 200);
//!         Ok(())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), StampedeError> {
//!     Stampede::initialize()?
//!         .register_iteration(Homepage)
//!         .set_default(StampedeDefault::Users, 5)?
//!         .set_default(StampedeDefault::RunTime, "10s")?
//!         .execute()
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

#[macro_use]
extern crate log;

pub mod config;
pub mod logger;
pub mod metrics;
pub mod prelude;
pub mod runner;
pub mod scenario;
pub mod user;
pub mod util;

use gumdrop::Options;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::{fmt, io};

use crate::config::StampedeDefaults;
use crate::metrics::StampedeMetrics;
use crate::runner::{Runner, WorkerPool};
use crate::scenario::Iteration;

pub use crate::config::{RunConfig, StampedeConfiguration, StampedeDefault, StampedeDefaultType};

/// Set when a ctrl-c is caught, stopping the running load test cleanly.
pub(crate) static CANCELED: AtomicBool = AtomicBool::new(false);

/// Definition of all errors a Stampede load test can return.
#[derive(Debug)]
pub enum StampedeError {
    /// Wraps a [`std::io::Error`](https://doc.rust-lang.org/std/io/struct.Error.html).
    Io(io::Error),
    /// Wraps a [`reqwest::Error`](https://docs.rs/reqwest/*/reqwest/struct.Error.html).
    Reqwest(reqwest::Error),
    /// Wraps a [`tokio::task::JoinError`](https://docs.rs/tokio/*/tokio/task/struct.JoinError.html).
    TokioJoin(tokio::task::JoinError),
    /// Failed to parse a hostname.
    InvalidHost {
        /// The invalid hostname that caused this error.
        host: String,
        /// An optional explanation of the error.
        detail: String,
        /// Wraps a [`url::ParseError`](https://docs.rs/url/*/url/enum.ParseError.html).
        parse_error: url::ParseError,
    },
    /// Invalid option or value specified, may only be invalid in context.
    InvalidOption {
        /// The invalid option that caused this error, may be only invalid in context.
        option: String,
        /// The invalid value that caused this error, may be only invalid in context.
        value: String,
        /// An optional explanation of the error.
        detail: String,
    },
    /// [`Stampede`] has no [`Iteration`] registered.
    NoIteration {
        /// An optional explanation of the error.
        detail: String,
    },
}
/// Implement a helper to provide a text description of all possible types of errors.
impl StampedeError {
    fn describe(&self) -> &str {
        match *self {
            StampedeError::Io(_) => "io::Error",
            StampedeError::Reqwest(_) => "reqwest::Error",
            StampedeError::TokioJoin(_) => "tokio::task::JoinError",
            StampedeError::InvalidHost { .. } => "failed to parse hostname",
            StampedeError::InvalidOption { .. } => "invalid option or value specified",
            StampedeError::NoIteration { .. } => "no iteration registered",
        }
    }
}

/// Implement format trait to allow displaying errors.
impl fmt::Display for StampedeError {
    // Implement display of error with `{}` marker.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            StampedeError::Io(ref source) => {
                write!(f, "StampedeError: {} ({})", self.describe(), source)
            }
            StampedeError::Reqwest(ref source) => {
                write!(f, "StampedeError: {} ({})", self.describe(), source)
            }
            StampedeError::TokioJoin(ref source) => {
                write!(f, "StampedeError: {} ({})", self.describe(), source)
            }
            StampedeError::InvalidHost {
                ref parse_error, ..
            } => write!(f, "StampedeError: {} ({})", self.describe(), parse_error),
            StampedeError::InvalidOption {
                ref option,
                ref value,
                ref detail,
            } => write!(
                f,
                "StampedeError: {} ({} = '{}'): {}",
                self.describe(),
                option,
                value,
                detail
            ),
            StampedeError::NoIteration { ref detail } => {
                write!(f, "StampedeError: {}: {}", self.describe(), detail)
            }
        }
    }
}

// Define the lower level source of this error, if any.
impl std::error::Error for StampedeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match *self {
            StampedeError::Io(ref source) => Some(source),
            StampedeError::Reqwest(ref source) => Some(source),
            StampedeError::TokioJoin(ref source) => Some(source),
            StampedeError::InvalidHost {
                ref parse_error, ..
            } => Some(parse_error),
            _ => None,
        }
    }
}

/// Auto-convert Reqwest errors.
impl From<reqwest::Error> for StampedeError {
    fn from(err: reqwest::Error) -> StampedeError {
        StampedeError::Reqwest(err)
    }
}

/// Auto-convert IO errors.
impl From<io::Error> for StampedeError {
    fn from(err: io::Error) -> StampedeError {
        StampedeError::Io(err)
    }
}

/// Auto-convert TokioJoin errors.
impl From<tokio::task::JoinError> for StampedeError {
    fn from(err: tokio::task::JoinError) -> StampedeError {
        StampedeError::TokioJoin(err)
    }
}

/// Auto-convert URL parse errors, which only occur while building hosts or request URLs.
impl From<url::ParseError> for StampedeError {
    fn from(parse_error: url::ParseError) -> StampedeError {
        StampedeError::InvalidHost {
            host: String::new(),
            detail: "Invalid URL.".to_string(),
            parse_error,
        }
    }
}

/// A load test: configuration, defaults and the iteration every virtual user runs.
pub struct Stampede {
    /// The iteration every virtual user runs back-to-back.
    iteration: Option<Arc<dyn Iteration>>,
    /// Run-time options, typically parsed from the command line.
    configuration: StampedeConfiguration,
    /// Programmatic defaults, applied when an option isn't set at run time.
    pub(crate) defaults: StampedeDefaults,
}
impl Stampede {
    /// Load configuration from the command line and initialize a [`Stampede`].
    ///
    /// Displays help and exits if `-h` is passed, and displays the version and exits
    /// if `-V` is passed.
    pub fn initialize() -> Result<Stampede, StampedeError> {
        let configuration = StampedeConfiguration::parse_args_default_or_exit();
        if configuration.version {
            println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
            std::process::exit(0);
        }
        Self::initialize_with_config(configuration)
    }

    /// Initialize a [`Stampede`] with an already loaded configuration.
    ///
    /// This is mostly useful for tests, which build configurations from a list of
    /// arguments rather than from the process command line.
    pub fn initialize_with_config(
        configuration: StampedeConfiguration,
    ) -> Result<Stampede, StampedeError> {
        Ok(Stampede {
            iteration: None,
            configuration,
            defaults: StampedeDefaults::default(),
        })
    }

    /// Register the iteration every virtual user will run. Registering again
    /// replaces the previous iteration.
    pub fn register_iteration(mut self, iteration: impl Iteration + 'static) -> Self {
        self.iteration = Some(Arc::new(iteration));
        self
    }

    /// Resolve the configuration against the defaults into an immutable [`RunConfig`].
    pub fn run_config(&self) -> Result<RunConfig, StampedeError> {
        self.configuration.configure(&self.defaults)
    }

    /// Run the load test with the built-in [`WorkerPool`] runner.
    pub async fn execute(self) -> Result<StampedeMetrics, StampedeError> {
        self.execute_with(&WorkerPool).await
    }

    /// Run the load test with any [`Runner`].
    ///
    /// Returns the final [`StampedeMetrics`], which are also printed to stdout
    /// unless `--no-print-metrics` is set.
    pub async fn execute_with<R>(self, runner: &R) -> Result<StampedeMetrics, StampedeError>
    where
        R: Runner + ?Sized,
    {
        let run_config = self.run_config()?;
        run_config.initialize_logger();
        debug!("configuration: {}", run_config);

        let iteration = self.iteration.ok_or_else(|| StampedeError::NoIteration {
            detail: "Register an iteration with Stampede::register_iteration().".to_string(),
        })?;

        info!(
            "running {} with {} users{}{}",
            iteration.name(),
            run_config.users,
            match run_config.run_time {
                Some(run_time) => format!(" for {:?}", run_time),
                None => String::new(),
            },
            match run_config.iterations {
                Some(iterations) => format!(", {} iterations per user", iterations),
                None => String::new(),
            },
        );

        let metrics = runner.run(&run_config, iteration).await?;
        if run_config.print_metrics {
            metrics.print();
        }

        Ok(metrics)
    }
}
