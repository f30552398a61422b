use httpmock::{Method::GET, MockServer};
use log::{Level, LevelFilter, Log, Metadata, Record};
use regex::Regex;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use stampede::metrics::StampedeMetric;
use stampede::prelude::*;

// Collects INFO lines logged by the scenario module.
struct CaptureLogger {
    lines: Mutex<Vec<String>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= Level::Info
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) && record.target() == "stampede::scenario" {
            self.lines.lock().unwrap().push(record.args().to_string());
        }
    }

    fn flush(&self) {}
}

static LOGGER: CaptureLogger = CaptureLogger {
    lines: Mutex::new(Vec::new()),
};

// Run `iterations` iterations of SyncProducts against `host`, returning the lines
// logged and the statuses of the requests made.
async fn run_iterations(host: &str, iterations: usize) -> (Vec<String>, Vec<String>) {
    let mut config = RunConfig::new(NonZeroUsize::MIN, Duration::from_secs(1));
    config.host = Some(Url::parse(host).unwrap());
    config.timeout = Duration::from_secs(2);

    let (sender, receiver) = flume::unbounded();
    let mut user = VirtualUser::new(1, &config, Instant::now(), sender, None).unwrap();

    LOGGER.lines.lock().unwrap().clear();
    for _ in 0..iterations {
        SyncProducts.iterate(&mut user).await.unwrap();
    }
    let lines = LOGGER.lines.lock().unwrap().clone();

    // The line logged for each request, rebuilt from what was actually received.
    let expected = receiver
        .drain()
        .filter_map(|metric| match metric {
            StampedeMetric::Request(request) => Some(format!(
                "Status: {} | Duration: {} ms",
                request.status_code, request.response_time
            )),
            _ => None,
        })
        .collect();
    (lines, expected)
}

#[tokio::test]
/// Every iteration logs exactly one line with the status and duration it received.
async fn test_one_log_line_per_iteration() {
    log::set_logger(&LOGGER).unwrap();
    log::set_max_level(LevelFilter::Info);
    let log_line = Regex::new(r"^Status: (\d+) \| Duration: \d+(\.\d+)? ms$").unwrap();

    let ok_server = MockServer::start_async().await;
    ok_server
        .mock_async(|when, then| {
            when.method(GET).path("/syncProductsToElixireMobile/");
            then.status(200).body("[]");
        })
        .await;
    let error_server = MockServer::start_async().await;
    error_server
        .mock_async(|when, then| {
            when.method(GET).path("/syncProductsToElixireMobile/");
            then.status(500);
        })
        .await;

    for (host, iterations, status) in [
        (ok_server.base_url(), 3, "200"),
        (error_server.base_url(), 2, "500"),
        // Nothing listens on port 1.
        ("http://127.0.0.1:1".to_string(), 1, "0"),
    ] {
        let (lines, expected) = run_iterations(&host, iterations).await;
        assert_eq!(lines.len(), iterations);
        assert_eq!(lines, expected);
        for line in &lines {
            let captures = log_line.captures(line).unwrap();
            assert_eq!(&captures[1], status);
        }
    }
}
