//! Metrics collected and aggregated during load tests.
//!
//! Every [`VirtualUser`](../user/struct.VirtualUser.html) sends a raw
//! [`StampedeMetric`] to the runner for each request, check and iteration. The
//! runner aggregates them into [`StampedeMetrics`], which
//! [`Stampede::execute()`](../struct.Stampede.html#method.execute) returns when the
//! load test completes.
//!
//! When the [`StampedeMetrics`] object is viewed with [`std::fmt::Display`], the
//! contained request, response time, status code, check and error metrics are
//! displayed in tables.

use chrono::prelude::*;
use itertools::Itertools;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;

use crate::util::{self, format_number};

/// Sent from [`VirtualUser`](../user/struct.VirtualUser.html) tasks to the runner.
///
/// Users send these over an
/// [`unbounded Flume channel`](https://docs.rs/flume/*/flume/fn.unbounded.html),
/// and the runner aggregates them so the users can spend all their time generating
/// load.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StampedeMetric {
    Request(RequestMetric),
    Check(CheckMetric),
    Iteration(IterationMetric),
}

/// All requests made during a load test, keyed by `method name`, for example
/// `GET /syncProductsToElixireMobile/`.
pub type RequestMetrics = HashMap<String, RequestMetricAggregate>;

/// All checks evaluated during a load test, keyed by check name.
pub type CheckMetrics = BTreeMap<String, CheckMetricAggregate>;

/// All errors seen during a load test, keyed by `error.method.name`.
pub type ErrorMetrics = BTreeMap<String, ErrorMetric>;

/// The raw metric collected for each request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RequestMetric {
    /// How many milliseconds the load test had been running.
    pub elapsed: u64,
    /// Which virtual user made the request.
    pub user: usize,
    /// Which of the user's iterations made the request, starting at 1.
    pub iteration: usize,
    /// The method used, always `GET` for now.
    pub method: String,
    /// The name the request is aggregated under.
    pub name: String,
    /// The full URL that was requested.
    pub url: String,
    /// The HTTP status code, or `0` if no response was received.
    pub status_code: u16,
    /// How many milliseconds the request took.
    pub response_time: f64,
    /// Whether the server answered with a 2xx status.
    pub success: bool,
    /// Why the request failed, empty if it didn't.
    pub error: String,
}
impl RequestMetric {
    pub(crate) fn new(
        elapsed: u128,
        user: usize,
        iteration: usize,
        method: &str,
        name: &str,
        url: &str,
    ) -> Self {
        RequestMetric {
            elapsed: elapsed as u64,
            user,
            iteration,
            method: method.to_string(),
            name: name.to_string(),
            url: url.to_string(),
            status_code: 0,
            response_time: 0.0,
            success: true,
            error: "".to_string(),
        }
    }

    /// Column names of [`RequestMetric::to_csv`] rows.
    pub fn csv_header() -> &'static str {
        "elapsed,user,iteration,method,name,url,status_code,response_time,success,error"
    }

    /// Format as one CSV row, quoting the free-text fields.
    pub fn to_csv(&self) -> String {
        format!(
            "{},{},{},{},{},{},{},{},{},{}",
            self.elapsed,
            self.user,
            self.iteration,
            self.method,
            csv_quote(&self.name),
            csv_quote(&self.url),
            self.status_code,
            self.response_time,
            self.success,
            csv_quote(&self.error),
        )
    }
}

// Quote a CSV field, doubling any embedded quotes.
fn csv_quote(field: &str) -> String {
    format!("\"{}\"", field.replace('"', "\"\""))
}

/// The raw metric collected each time a check is evaluated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CheckMetric {
    /// How many milliseconds the load test had been running.
    pub elapsed: u64,
    /// Which virtual user evaluated the check.
    pub user: usize,
    /// The name of the check.
    pub name: String,
    /// Whether the check passed.
    pub passed: bool,
}

/// The raw metric collected each time an iteration completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IterationMetric {
    /// How many milliseconds the load test had been running.
    pub elapsed: u64,
    /// Which virtual user ran the iteration.
    pub user: usize,
    /// How many milliseconds the iteration took.
    pub run_time: u64,
    /// The error returned by the iteration, if any.
    pub error: Option<String>,
}

/// Metrics collected about a method-name pair, (for example
/// `GET /syncProductsToElixireMobile/`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestMetricAggregate {
    /// The name requests were aggregated under.
    pub name: String,
    /// The method for which metrics are being collected.
    pub method: String,
    /// Per-response-time counters, tracking how often pages are returned with this
    /// response time.
    ///
    /// All response times below 100ms are stored rounded to the nearest millisecond.
    /// Response times between 100 and 500ms are rounded to the nearest 10ms. Response
    /// times between 500 and 1000ms are rounded to the nearest 100ms. Response times
    /// larger than 1000ms are rounded to the nearest 1000ms.
    pub response_times: BTreeMap<usize, usize>,
    /// The shortest response time seen so far, not rounded.
    pub min_response_time: f64,
    /// The longest response time seen so far, not rounded.
    pub max_response_time: f64,
    /// Total combined response times seen so far.
    pub total_response_time: f64,
    /// Total number of response times seen so far.
    pub response_time_counter: usize,
    /// Per-status-code counters. Status `0` counts requests that got no response.
    pub status_code_counts: HashMap<u16, usize>,
    /// Total number of requests that resulted in a 2xx status code.
    pub success_count: usize,
    /// Total number of requests that did not result in a 2xx status code.
    pub fail_count: usize,
}
impl RequestMetricAggregate {
    pub(crate) fn new(method: &str, name: &str) -> Self {
        trace!("new request");
        RequestMetricAggregate {
            name: name.to_string(),
            method: method.to_string(),
            response_times: BTreeMap::new(),
            min_response_time: 0.0,
            max_response_time: 0.0,
            total_response_time: 0.0,
            response_time_counter: 0,
            status_code_counts: HashMap::new(),
            success_count: 0,
            fail_count: 0,
        }
    }

    /// Track response time.
    pub(crate) fn set_response_time(&mut self, response_time: f64) {
        // Update minimum if this one is fastest yet.
        if self.response_time_counter == 0 || response_time < self.min_response_time {
            self.min_response_time = response_time;
        }

        // Update maximum if this one is slowest yet.
        if response_time > self.max_response_time {
            self.max_response_time = response_time;
        }

        self.total_response_time += response_time;
        self.response_time_counter += 1;

        // Round the response time so we can combine similar times together.
        let counter = self
            .response_times
            .entry(round_response_time(response_time))
            .or_insert(0);
        *counter += 1;
        debug!("incremented {} counter: {}", response_time, counter);
    }

    /// Increment counter for status code, creating new counter if first time seeing
    /// status code.
    pub(crate) fn set_status_code(&mut self, status_code: u16) {
        let counter = self.status_code_counts.entry(status_code).or_insert(0);
        *counter += 1;
        debug!("incremented {} counter: {}", status_code, counter);
    }

    /// Average response time in milliseconds, 0 if nothing was recorded.
    pub fn average_response_time(&self) -> f64 {
        match self.response_time_counter {
            0 => 0.0,
            counter => self.total_response_time / counter as f64,
        }
    }
}

/// Round a response time in milliseconds into its histogram bucket.
pub(crate) fn round_response_time(response_time: f64) -> usize {
    let response_time = response_time.max(0.0);
    // No rounding beyond whole milliseconds for 0-100ms response times.
    if response_time < 100.0 {
        response_time.round() as usize
    }
    // Round to nearest 10 for 100-500ms response times.
    else if response_time < 500.0 {
        ((response_time / 10.0).round() * 10.0) as usize
    }
    // Round to nearest 100 for 500-1000ms response times.
    else if response_time < 1000.0 {
        ((response_time / 100.0).round() * 100.0) as usize
    }
    // Round to nearest 1000 for all larger response times.
    else {
        ((response_time / 1000.0).round() * 1000.0) as usize
    }
}

/// Pass and fail counts of one named check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckMetricAggregate {
    /// The name of the check.
    pub name: String,
    /// How many times the check passed.
    pub passes: usize,
    /// How many times the check failed.
    pub fails: usize,
}
impl CheckMetricAggregate {
    pub(crate) fn new(name: &str) -> Self {
        CheckMetricAggregate {
            name: name.to_string(),
            ..Default::default()
        }
    }

    /// Percentage of evaluations that passed, 0 if the check was never evaluated.
    pub fn pass_rate(&self) -> f32 {
        let total = self.passes + self.fails;
        if total == 0 {
            0.0
        } else {
            self.passes as f32 / total as f32 * 100.0
        }
    }
}

/// For tracking and counting errors detected during a load test.
///
/// Multiple errors that share the same request method, the same request name, and
/// the same error text are contained within a single `ErrorMetric` object, with
/// `occurrences` indicating how many times this error was seen.
///
/// # Example
/// In this example, requests to sync products are failing:
/// ```text
/// ErrorMetric {
///     method: "GET",
///     name: "/syncProductsToElixireMobile/",
///     error: "503 Service Unavailable",
///     occurrences: 4588,
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct ErrorMetric {
    /// The method that resulted in an error.
    pub method: String,
    /// The name of the request, or of the iteration that returned an error.
    pub name: String,
    /// The error string.
    pub error: String,
    /// A counter reflecting how many times this error occurred.
    pub occurrences: usize,
}
impl ErrorMetric {
    pub(crate) fn new(method: &str, name: &str, error: &str) -> Self {
        ErrorMetric {
            method: method.to_string(),
            name: name.to_string(),
            error: error.to_string(),
            occurrences: 0,
        }
    }
}
impl Ord for ErrorMetric {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.occurrences, &self.method, &self.name, &self.error).cmp(&(
            other.occurrences,
            &other.method,
            &other.name,
            &other.error,
        ))
    }
}
impl PartialOrd for ErrorMetric {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Metrics collected during a load test.
///
/// # Example
/// ```rust,no_run
/// use stampede::prelude::*;
///
/// #[tokio::main]
/// async fn main() -> Result<(), StampedeError> {
///     let metrics = Stampede::initialize()?
///         .register_iteration(SyncProducts)
///         .set_default(StampedeDefault::RunTime, 1)?
///         .set_default(StampedeDefault::NoPrintMetrics, true)?
///         .execute()
///         .await?;
///
///     if let Some(check) = metrics.checks.get(STATUS_IS_200) {
///         println!("{} of {} checks passed", check.passes, check.passes + check.fails);
///     }
///
///     Ok(())
/// }
/// ```
#[derive(Clone, Debug, Default)]
pub struct StampedeMetrics {
    /// An optional system timestamp indicating when the load test started.
    pub started: Option<DateTime<Local>>,
    /// Total number of seconds the load test ran.
    pub duration: usize,
    /// Total number of users simulated during this load test.
    pub users: usize,
    /// Total number of iterations completed.
    pub iterations: usize,
    /// Tracks details about each request made during the load test.
    pub requests: RequestMetrics,
    /// Tracks pass and fail counts of each check.
    pub checks: CheckMetrics,
    /// Tracks and counts each time an error is detected during the load test.
    pub errors: ErrorMetrics,
    /// Flag indicating whether or not these are the final metrics, used to determine
    /// which metrics should be displayed.
    pub(crate) final_metrics: bool,
}
impl StampedeMetrics {
    pub(crate) fn new(users: usize) -> Self {
        StampedeMetrics {
            started: Some(Local::now()),
            users,
            ..Default::default()
        }
    }

    /// Aggregate one raw metric.
    pub(crate) fn record(&mut self, metric: StampedeMetric) {
        match metric {
            StampedeMetric::Request(request_metric) => self.record_request(&request_metric),
            StampedeMetric::Check(check_metric) => self.record_check(&check_metric),
            StampedeMetric::Iteration(iteration_metric) => {
                self.record_iteration(&iteration_metric)
            }
        }
    }

    pub(crate) fn record_request(&mut self, request_metric: &RequestMetric) {
        if !request_metric.error.is_empty() {
            self.record_error(
                &request_metric.method,
                &request_metric.name,
                &request_metric.error,
            );
        }

        let key = format!("{} {}", request_metric.method, request_metric.name);
        let merge_request = self.requests.entry(key).or_insert_with(|| {
            RequestMetricAggregate::new(&request_metric.method, &request_metric.name)
        });
        merge_request.set_response_time(request_metric.response_time);
        merge_request.set_status_code(request_metric.status_code);
        if request_metric.success {
            merge_request.success_count += 1;
        } else {
            merge_request.fail_count += 1;
        }
    }

    pub(crate) fn record_check(&mut self, check_metric: &CheckMetric) {
        let check = self
            .checks
            .entry(check_metric.name.clone())
            .or_insert_with(|| CheckMetricAggregate::new(&check_metric.name));
        if check_metric.passed {
            check.passes += 1;
        } else {
            check.fails += 1;
        }
    }

    pub(crate) fn record_iteration(&mut self, iteration_metric: &IterationMetric) {
        self.iterations += 1;
        if let Some(error) = iteration_metric.error.as_ref() {
            self.record_error("ITERATION", "", error);
        }
    }

    /// Update error metrics.
    pub(crate) fn record_error(&mut self, method: &str, name: &str, error: &str) {
        // Create a string to uniquely identify errors for tracking metrics.
        let error_string = format!("{}.{}.{}", error, method, name);
        self.errors
            .entry(error_string)
            .or_insert_with(|| ErrorMetric::new(method, name, error))
            .occurrences += 1;
    }

    // Update metrics showing how long the load test has been running.
    pub(crate) fn update_duration(&mut self) {
        self.duration = match self.started {
            Some(started) => (Local::now() - started).num_seconds().max(0) as usize,
            None => 0,
        };
    }

    /// Total number of requests made.
    pub fn total_requests(&self) -> usize {
        self.requests
            .values()
            .map(|request| request.success_count + request.fail_count)
            .sum()
    }

    /// Display all metrics from a completed load test.
    pub fn print(&self) {
        info!("printing final metrics after {} seconds...", self.duration);
        print!("{}", self);
    }

    /// Displays metrics while a load test is running.
    pub(crate) fn print_running(&self) {
        info!(
            "printing running metrics after {} seconds...",
            self.duration
        );

        // Include a blank line after printing running metrics.
        println!("{}", self);
    }

    /// Prepares a table of requests and fails.
    pub(crate) fn fmt_requests(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        // If there's nothing to display, exit immediately.
        if self.requests.is_empty() {
            return Ok(());
        }

        writeln!(
            fmt,
            "\n === PER REQUEST METRICS ===\n ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {:<24} | {:>13} | {:>14} | {:>8} | {:>7}",
            "Name", "# reqs", "# fails", "req/s", "fail/s"
        )?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        let mut aggregate_fail_count = 0;
        let mut aggregate_total_count = 0;
        for (request_key, request) in self.requests.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            let total_count = request.success_count + request.fail_count;
            self.fmt_request_row(fmt, request_key, total_count, request.fail_count)?;
            aggregate_total_count += total_count;
            aggregate_fail_count += request.fail_count;
        }
        if self.requests.len() > 1 {
            writeln!(
                fmt,
                " -------------------------+---------------+----------------+----------+--------"
            )?;
            self.fmt_request_row(
                fmt,
                "Aggregated",
                aggregate_total_count,
                aggregate_fail_count,
            )?;
        }

        Ok(())
    }

    // One row of the requests table.
    fn fmt_request_row(
        &self,
        fmt: &mut fmt::Formatter<'_>,
        name: &str,
        total_count: usize,
        fail_count: usize,
    ) -> fmt::Result {
        let fail_percent = if fail_count > 0 {
            fail_count as f32 / total_count as f32 * 100.0
        } else {
            0.0
        };
        let (reqs, fails) = per_second_calculations(self.duration, total_count, fail_count);
        // Compress 100.0 and 0.0 to 100 and 0 respectively to save width.
        let fails_column = if fail_percent as usize == 100 || fail_percent == 0.0 {
            format!("{} ({}%)", format_number(fail_count), fail_percent as usize)
        } else {
            format!("{} ({:.1}%)", format_number(fail_count), fail_percent)
        };
        writeln!(
            fmt,
            " {:<24} | {:>13} | {:>14} | {:>8.reqs_p$} | {:>7.fails_p$}",
            util::truncate_string(name, 24),
            format_number(total_count),
            fails_column,
            reqs,
            fails,
            reqs_p = determine_precision(reqs),
            fails_p = determine_precision(fails),
        )
    }

    /// Prepares a table of response times.
    pub(crate) fn fmt_response_times(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        // If there's nothing to display, exit immediately.
        if self.requests.is_empty() {
            return Ok(());
        }

        let mut aggregate = RequestMetricAggregate::new("", "Aggregated");
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {:<24} | {:>11} | {:>10} | {:>11} | {:>10}",
            "Name", "Avg (ms)", "Min", "Max", "Median"
        )?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        for (request_key, request) in self.requests.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            merge_aggregate(&mut aggregate, request);
            fmt_response_time_row(fmt, request_key, request)?;
        }
        if self.requests.len() > 1 {
            writeln!(
                fmt,
                " -------------------------+-------------+------------+-------------+-----------"
            )?;
            fmt_response_time_row(fmt, "Aggregated", &aggregate)?;
        }

        Ok(())
    }

    /// Prepares a table of slowest response times within several percentiles.
    pub(crate) fn fmt_percentiles(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only include percentiles when displaying the final metrics report.
        if !self.final_metrics || self.requests.is_empty() {
            return Ok(());
        }

        let mut aggregate = RequestMetricAggregate::new("", "Aggregated");
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " Slowest page load within specified percentile of requests (in ms):"
        )?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {:<24} | {:>6} | {:>6} | {:>6} | {:>6} | {:>6} | {:>6}",
            "Name", "50%", "75%", "98%", "99%", "99.9%", "99.99%"
        )?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        for (request_key, request) in self.requests.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            merge_aggregate(&mut aggregate, request);
            fmt_percentile_row(fmt, request_key, request)?;
        }
        if self.requests.len() > 1 {
            writeln!(
                fmt,
                " -------------------------+--------+--------+--------+--------+--------+-------"
            )?;
            fmt_percentile_row(fmt, "Aggregated", &aggregate)?;
        }

        Ok(())
    }

    /// Prepares a table of response status codes.
    pub(crate) fn fmt_status_codes(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        // If there's nothing to display, exit immediately.
        if self.requests.is_empty() {
            return Ok(());
        }

        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        writeln!(fmt, " {:<24} | {:>51} ", "Name", "Status codes")?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        let mut aggregated_status_code_counts: HashMap<u16, usize> = HashMap::new();
        for (request_key, request) in self.requests.iter().sorted_by(|a, b| a.0.cmp(b.0)) {
            let codes = prepare_status_codes(
                &request.status_code_counts,
                &mut Some(&mut aggregated_status_code_counts),
            );

            writeln!(
                fmt,
                " {:<24} | {:>51}",
                util::truncate_string(request_key, 24),
                codes,
            )?;
        }
        if self.requests.len() > 1 {
            writeln!(
                fmt,
                " -------------------------+----------------------------------------------------"
            )?;
            let codes = prepare_status_codes(&aggregated_status_code_counts, &mut None);
            writeln!(fmt, " {:<24} | {:>51} ", "Aggregated", codes)?;
        }

        Ok(())
    }

    /// Prepares a table of checks.
    pub(crate) fn fmt_checks(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.checks.is_empty() {
            return Ok(());
        }

        writeln!(
            fmt,
            "\n === CHECKS ===\n ------------------------------------------------------------------------------"
        )?;
        writeln!(
            fmt,
            " {:<24} | {:>13} | {:>13} | {:>8}",
            "Name", "# passes", "# fails", "pass %"
        )?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;
        for check in self.checks.values() {
            let pass_rate = check.pass_rate();
            writeln!(
                fmt,
                " {:<24} | {:>13} | {:>13} | {:>8.p$}",
                util::truncate_string(&check.name, 24),
                format_number(check.passes),
                format_number(check.fails),
                pass_rate,
                p = if pass_rate == 100.0 || pass_rate == 0.0 {
                    0
                } else {
                    2
                },
            )?;
        }

        Ok(())
    }

    /// Prepares a table of errors.
    pub(crate) fn fmt_errors(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Only include errors when displaying the final metrics report, and if there are
        // errors to display.
        if !self.final_metrics || self.errors.is_empty() {
            return Ok(());
        }

        writeln!(
            fmt,
            "\n === ERRORS ===\n ------------------------------------------------------------------------------"
        )?;
        writeln!(fmt, " {:<11} | Error", "Count")?;
        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;

        // Reverse sort errors to display the error occurring the most first.
        for error in self.errors.values().sorted().rev() {
            let description = if error.name.is_empty() {
                format!("{}: {}", error.method, error.error)
            } else {
                format!("{} {}: {}", error.method, error.name, error.error)
            };
            writeln!(
                fmt,
                " {:<12}  {}",
                format_number(error.occurrences),
                description
            )?;
        }

        writeln!(
            fmt,
            " ------------------------------------------------------------------------------"
        )?;

        Ok(())
    }
}
impl Serialize for StampedeMetrics {
    // StampedeMetrics serialization can't be derived because of the started field.
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut s = serializer.serialize_struct("StampedeMetrics", 8)?;
        // Convert started field to a unix timestamp.
        let timestamp = match self.started {
            Some(started) => started.timestamp(),
            None => 0,
        };
        s.serialize_field("started", &timestamp)?;
        s.serialize_field("duration", &self.duration)?;
        s.serialize_field("users", &self.users)?;
        s.serialize_field("iterations", &self.iterations)?;
        s.serialize_field("requests", &self.requests)?;
        s.serialize_field("checks", &self.checks)?;
        s.serialize_field("errors", &self.errors)?;
        s.serialize_field("final_metrics", &self.final_metrics)?;
        s.end()
    }
}

/// Implement format trait to allow displaying metrics.
impl fmt::Display for StampedeMetrics {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_requests(fmt)?;
        self.fmt_response_times(fmt)?;
        self.fmt_percentiles(fmt)?;
        self.fmt_status_codes(fmt)?;
        self.fmt_checks(fmt)?;
        self.fmt_errors(fmt)
    }
}

// Fold one request's response times into the aggregate row.
fn merge_aggregate(aggregate: &mut RequestMetricAggregate, request: &RequestMetricAggregate) {
    if request.response_time_counter == 0 {
        return;
    }
    aggregate.response_times = merge_times(
        std::mem::take(&mut aggregate.response_times),
        &request.response_times,
    );
    if aggregate.response_time_counter == 0
        || request.min_response_time < aggregate.min_response_time
    {
        aggregate.min_response_time = request.min_response_time;
    }
    if request.max_response_time > aggregate.max_response_time {
        aggregate.max_response_time = request.max_response_time;
    }
    aggregate.total_response_time += request.total_response_time;
    aggregate.response_time_counter += request.response_time_counter;
}

fn fmt_response_time_row(
    fmt: &mut fmt::Formatter<'_>,
    name: &str,
    request: &RequestMetricAggregate,
) -> fmt::Result {
    let average = request.average_response_time();
    writeln!(
        fmt,
        " {:<24} | {:>11.avg_precision$} | {:>10.2} | {:>11.2} | {:>10}",
        util::truncate_string(name, 24),
        average,
        request.min_response_time,
        request.max_response_time,
        format_number(util::median(
            &request.response_times,
            request.response_time_counter,
            request.min_response_time.floor() as usize,
            request.max_response_time.ceil() as usize,
        )),
        avg_precision = determine_precision(average as f32),
    )
}

fn fmt_percentile_row(
    fmt: &mut fmt::Formatter<'_>,
    name: &str,
    request: &RequestMetricAggregate,
) -> fmt::Result {
    let percentile = |percent: f32| {
        format_number(util::percentile(
            &request.response_times,
            request.response_time_counter,
            request.min_response_time.floor() as usize,
            request.max_response_time.ceil() as usize,
            percent,
        ))
    };
    writeln!(
        fmt,
        " {:<24} | {:>6} | {:>6} | {:>6} | {:>6} | {:>6} | {:>6}",
        util::truncate_string(name, 24),
        percentile(0.5),
        percentile(0.75),
        percentile(0.98),
        percentile(0.99),
        percentile(0.999),
        percentile(0.9999),
    )
}

/// Helper to calculate requests and fails per seconds.
pub(crate) fn per_second_calculations(duration: usize, total: usize, fail: usize) -> (f32, f32) {
    if duration == 0 {
        (0.0, 0.0)
    } else {
        (
            total as f32 / duration as f32,
            fail as f32 / duration as f32,
        )
    }
}

fn determine_precision(value: f32) -> usize {
    if value < 1000.0 {
        2
    } else {
        0
    }
}

/// A helper function that merges together times.
pub(crate) fn merge_times(
    mut global_response_times: BTreeMap<usize, usize>,
    local_response_times: &BTreeMap<usize, usize>,
) -> BTreeMap<usize, usize> {
    for (response_time, count) in local_response_times {
        *global_response_times.entry(*response_time).or_insert(0) += count;
    }
    global_response_times
}

/// Helper to count and aggregate seen status codes.
pub(crate) fn prepare_status_codes(
    status_code_counts: &HashMap<u16, usize>,
    aggregate_counts: &mut Option<&mut HashMap<u16, usize>>,
) -> String {
    let mut codes: Vec<String> = Vec::new();
    for (status_code, count) in status_code_counts.iter().sorted() {
        codes.push(format!("{} [{}]", format_number(*count), status_code));
        if let Some(aggregate_status_code_counts) = aggregate_counts.as_mut() {
            *aggregate_status_code_counts.entry(*status_code).or_insert(0) += count;
        }
    }
    codes.join(", ")
}

#[cfg(test)]
mod test {
    use super::*;

    fn request_metric(status_code: u16, response_time: f64, error: &str) -> RequestMetric {
        let mut metric = RequestMetric::new(0, 1, 1, "GET", "/sync", "http://localhost/sync");
        metric.status_code = status_code;
        metric.response_time = response_time;
        metric.success = (200..300).contains(&status_code);
        metric.error = error.to_string();
        metric
    }

    #[test]
    fn rounding() {
        assert_eq!(round_response_time(0.4), 0);
        assert_eq!(round_response_time(42.7), 43);
        assert_eq!(round_response_time(99.0), 99);
        assert_eq!(round_response_time(104.0), 100);
        assert_eq!(round_response_time(456.0), 460);
        assert_eq!(round_response_time(549.0), 500);
        assert_eq!(round_response_time(551.0), 600);
        assert_eq!(round_response_time(1_499.0), 1_000);
        assert_eq!(round_response_time(1_500.0), 2_000);
        assert_eq!(round_response_time(-1.0), 0);
    }

    #[test]
    fn response_times() {
        let mut aggregate = RequestMetricAggregate::new("GET", "/");
        assert_eq!(aggregate.average_response_time(), 0.0);

        aggregate.set_response_time(42.7);
        aggregate.set_response_time(120.0);
        aggregate.set_response_time(0.5);
        assert_eq!(aggregate.min_response_time, 0.5);
        assert_eq!(aggregate.max_response_time, 120.0);
        assert_eq!(aggregate.response_time_counter, 3);
        assert!((aggregate.average_response_time() - 54.4).abs() < 1e-9);
        assert_eq!(aggregate.response_times.get(&43), Some(&1));
        assert_eq!(aggregate.response_times.get(&120), Some(&1));
        assert_eq!(aggregate.response_times.get(&1), Some(&1));
    }

    #[test]
    fn status_codes() {
        let mut aggregate = RequestMetricAggregate::new("GET", "/");
        aggregate.set_status_code(200);
        aggregate.set_status_code(200);
        aggregate.set_status_code(0);
        assert_eq!(aggregate.status_code_counts.get(&200), Some(&2));
        assert_eq!(aggregate.status_code_counts.get(&0), Some(&1));

        let mut aggregated = HashMap::new();
        let codes = prepare_status_codes(&aggregate.status_code_counts, &mut Some(&mut aggregated));
        assert_eq!(codes, "1 [0], 2 [200]");
        assert_eq!(aggregated, aggregate.status_code_counts);
    }

    #[test]
    fn record_requests() {
        let mut metrics = StampedeMetrics::new(2);
        metrics.record(StampedeMetric::Request(request_metric(200, 42.7, "")));
        metrics.record(StampedeMetric::Request(request_metric(500, 120.0, "500 Internal Server Error")));
        metrics.record(StampedeMetric::Request(request_metric(0, 3.0, "connection refused")));
        metrics.record(StampedeMetric::Request(request_metric(0, 4.0, "connection refused")));

        assert_eq!(metrics.total_requests(), 4);
        let request = metrics.requests.get("GET /sync").unwrap();
        assert_eq!(request.success_count, 1);
        assert_eq!(request.fail_count, 3);
        assert_eq!(request.status_code_counts.get(&0), Some(&2));

        assert_eq!(metrics.errors.len(), 2);
        let refused = metrics
            .errors
            .values()
            .find(|error| error.error == "connection refused")
            .unwrap();
        assert_eq!(refused.occurrences, 2);
        // Most frequent error sorts last.
        assert_eq!(metrics.errors.values().sorted().last(), Some(refused));
    }

    #[test]
    fn record_checks_and_iterations() {
        let mut metrics = StampedeMetrics::new(1);
        for passed in [true, true, false, true] {
            metrics.record(StampedeMetric::Check(CheckMetric {
                elapsed: 0,
                user: 1,
                name: "status is 200".to_string(),
                passed,
            }));
        }
        metrics.record(StampedeMetric::Iteration(IterationMetric {
            elapsed: 0,
            user: 1,
            run_time: 5,
            error: None,
        }));
        metrics.record(StampedeMetric::Iteration(IterationMetric {
            elapsed: 0,
            user: 1,
            run_time: 5,
            error: Some("invalid header".to_string()),
        }));

        let check = metrics.checks.get("status is 200").unwrap();
        assert_eq!(check.passes, 3);
        assert_eq!(check.fails, 1);
        assert_eq!(check.pass_rate(), 75.0);
        assert_eq!(metrics.iterations, 2);
        assert_eq!(metrics.errors.len(), 1);
        assert_eq!(CheckMetricAggregate::new("never").pass_rate(), 0.0);
    }

    #[test]
    fn display_tables() {
        let mut metrics = StampedeMetrics::new(1);
        metrics.final_metrics = true;
        metrics.duration = 2;
        metrics.record(StampedeMetric::Request(request_metric(200, 42.7, "")));
        metrics.record(StampedeMetric::Request(request_metric(500, 120.0, "500 Internal Server Error")));
        metrics.record(StampedeMetric::Check(CheckMetric {
            elapsed: 0,
            user: 1,
            name: "status is 200".to_string(),
            passed: true,
        }));

        let output = metrics.to_string();
        assert!(output.contains("=== PER REQUEST METRICS ==="));
        assert!(output.contains("GET /sync"));
        assert!(output.contains("Avg (ms)"));
        assert!(output.contains("99.99%"));
        assert!(output.contains("1 [200], 1 [500]"));
        assert!(output.contains("=== CHECKS ==="));
        assert!(output.contains("status is 200"));
        assert!(output.contains("=== ERRORS ==="));
        assert!(output.contains("GET /sync: 500 Internal Server Error"));

        // Running metrics leave out percentiles and errors.
        metrics.final_metrics = false;
        let output = metrics.to_string();
        assert!(!output.contains("99.99%"));
        assert!(!output.contains("=== ERRORS ==="));
    }

    #[test]
    fn per_second() {
        assert_eq!(per_second_calculations(0, 10, 1), (0.0, 0.0));
        assert_eq!(per_second_calculations(10, 100, 10), (10.0, 1.0));
    }

    #[test]
    fn csv_row() {
        let metric = request_metric(0, 3.5, "error sending request: \"refused\"");
        assert_eq!(
            metric.to_csv(),
            "0,1,1,GET,\"/sync\",\"http://localhost/sync\",0,3.5,false,\"error sending request: \"\"refused\"\"\""
        );
        assert_eq!(
            RequestMetric::csv_header().split(',').count(),
            metric.to_csv().matches(',').count() + 1
        );
    }

    #[test]
    fn serialize() {
        let mut metrics = StampedeMetrics::new(3);
        metrics.record(StampedeMetric::Request(request_metric(200, 10.0, "")));
        let json = serde_json::to_value(&metrics).unwrap();
        assert_eq!(json["users"], 3);
        assert_eq!(json["requests"]["GET /sync"]["success_count"], 1);
    }
}
