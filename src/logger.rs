//! Optional request log.
//!
//! The request logger is enabled with the `--request-log` run-time option, or the
//! [`StampedeDefault::RequestLog`](../config/enum.StampedeDefault.html#variant.RequestLog)
//! default configuration option. When enabled, this task is launched and a channel is
//! provided from all [`VirtualUser`](../user/struct.VirtualUser.html) tasks to send a
//! copy of every [`RequestMetric`] for efficient logging to file. The logger task uses
//! Tokio's asynchronous [`BufWriter`](https://docs.rs/tokio/*/tokio/io/struct.BufWriter.html).
//!
//! The format of the log is configured with `--request-format`:
//!  - `json` (default): one JSON object per line
//!  - `csv`: a header line followed by one row per request
//!  - `raw`: the Debug output of each [`RequestMetric`]
//!
//! ## Example
//! ```bash
//! $ stampede -t 10s --request-log requests.csv --request-format csv
//! ```

use regex::RegexSet;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::fmt;
use std::str::FromStr;
use strum::IntoEnumIterator;
use strum_macros::EnumIter;
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::config::RequestLogConfig;
use crate::metrics::RequestMetric;
use crate::StampedeError;

/// How much request log is buffered before it's written to disk.
const BUFFER_CAPACITY: usize = 64 * 1024;

/// Supported request log formats.
#[derive(Clone, Copy, Debug, Default, Deserialize, EnumIter, PartialEq, Eq, Serialize)]
pub enum LogFormat {
    Csv,
    #[default]
    Json,
    Raw,
}
/// Allow `--request-format` from the command line using text variations on supported
/// `LogFormat`s by implementing [`FromStr`].
impl FromStr for LogFormat {
    type Err = StampedeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let log_format = RegexSet::new([r"(?i)^csv$", r"(?i)^(json|jsonl)$", r"(?i)^(raw|debug)$"])
            .map_err(|e| StampedeError::InvalidOption {
                option: "LogFormat".to_string(),
                value: s.to_string(),
                detail: e.to_string(),
            })?;
        let matches = log_format.matches(s);
        if matches.matched(0) {
            Ok(LogFormat::Csv)
        } else if matches.matched(1) {
            Ok(LogFormat::Json)
        } else if matches.matched(2) {
            Ok(LogFormat::Raw)
        } else {
            Err(StampedeError::InvalidOption {
                option: format!("LogFormat::{:?}", s),
                value: s.to_string(),
                detail: format!(
                    "Invalid log format, expected: {}",
                    LogFormat::iter().map(|format| format.to_string()).collect::<Vec<_>>().join(", ")
                ),
            })
        }
    }
}
impl fmt::Display for LogFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            LogFormat::Csv => write!(f, "csv"),
            LogFormat::Json => write!(f, "json"),
            LogFormat::Raw => write!(f, "raw"),
        }
    }
}
impl LogFormat {
    /// Format one request for the log, without a trailing line feed.
    pub fn format(&self, request_metric: &RequestMetric) -> String {
        match self {
            // Use serde_json to create JSON.
            LogFormat::Json => json!(request_metric).to_string(),
            // Manually create CSV, one row per request.
            LogFormat::Csv => request_metric.to_csv(),
            // Raw format is Debug output for RequestMetric structure.
            LogFormat::Raw => format!("{:?}", request_metric),
        }
    }

    /// An optional first line for the log.
    pub fn header(&self) -> Option<&'static str> {
        match self {
            LogFormat::Csv => Some(RequestMetric::csv_header()),
            LogFormat::Json | LogFormat::Raw => None,
        }
    }
}

/// Create the request log file, so a bad path fails the load test before it starts.
pub(crate) async fn create_request_log(
    request_log: &RequestLogConfig,
) -> Result<BufWriter<File>, StampedeError> {
    let file = File::create(&request_log.path).await?;
    info!("writing requests to {}", request_log.path.display());
    Ok(BufWriter::with_capacity(BUFFER_CAPACITY, file))
}

/// Logger task, waits for messages from [`VirtualUser`](../user/struct.VirtualUser.html)
/// tasks and writes them to the request log. A `None` message ends the task.
pub(crate) async fn logger_main(
    request_log: RequestLogConfig,
    mut file: BufWriter<File>,
    receiver: flume::Receiver<Option<RequestMetric>>,
) -> Result<(), StampedeError> {
    if let Some(header) = request_log.format.header() {
        file.write_all(format!("{}\n", header).as_bytes()).await?;
    }

    // Loop waiting for and writing requests from VirtualUser tasks.
    while let Ok(message) = receiver.recv_async().await {
        match message {
            Some(request_metric) => {
                let formatted_log = request_log.format.format(&request_metric);
                if let Err(e) = file
                    .write_all(format!("{}\n", formatted_log).as_bytes())
                    .await
                {
                    warn!(
                        "failed to write to {}: {}",
                        request_log.path.display(),
                        e
                    );
                }
            }
            // Empty message means it's time to exit.
            None => break,
        }
    }

    // Cleanup and flush all logs to disk.
    info!("flushing request log: {}", request_log.path.display());
    file.flush().await?;

    Ok(())
}
