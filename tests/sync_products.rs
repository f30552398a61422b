use httpmock::{Method::GET, MockServer};

use stampede::prelude::*;

mod common;

// Path of the product sync endpoint.
const SYNC_PATH: &str = "/syncProductsToElixireMobile/";

// Match only requests carrying the full product sync contract.
fn sync_request(when: httpmock::When) -> httpmock::When {
    when.method(GET)
        .path(SYNC_PATH)
        .query_param("isFirstTimeSync", "true")
        .header("application", "ELIXIRE_MOBILE")
        .header("storeid", "ELXS218598")
        .header("userid", "ELXU114905708")
        .header("posid", "ELIXIRE_MOBILE")
}

#[tokio::test]
/// Every iteration sends one request with the fixed URL and headers, and the check
/// passes when the server answers 200.
async fn test_status_200() {
    let server = MockServer::start_async().await;
    let sync = server
        .mock_async(|when, then| {
            sync_request(when);
            then.status(200).body("[]");
        })
        .await;

    let configuration =
        common::build_configuration(&server, vec!["--users", "2", "--iterations", "3"]);
    let metrics = common::run_load_test(configuration, SyncProducts).await;

    // Two users each ran three iterations.
    assert_eq!(sync.hits_async().await, 6);
    assert_eq!(metrics.users, 2);
    assert_eq!(metrics.iterations, 6);
    assert_eq!(common::requests_to(&metrics, SYNC_PATH), 6);

    let request = metrics.requests.get(&format!("GET {}", SYNC_PATH)).unwrap();
    assert_eq!(request.success_count, 6);
    assert_eq!(request.fail_count, 0);
    assert_eq!(request.status_code_counts.get(&200), Some(&6));

    let check = metrics.checks.get(STATUS_IS_200).unwrap();
    assert_eq!(check.passes, 6);
    assert_eq!(check.fails, 0);
    assert!(metrics.errors.is_empty());
}

#[tokio::test]
/// A 500 fails the check without stopping the load test.
async fn test_status_500() {
    let server = MockServer::start_async().await;
    let sync = server
        .mock_async(|when, then| {
            sync_request(when);
            then.status(500);
        })
        .await;

    let configuration =
        common::build_configuration(&server, vec!["--users", "1", "--iterations", "4"]);
    let metrics = common::run_load_test(configuration, SyncProducts).await;

    // Failed checks don't stop iterations.
    assert_eq!(sync.hits_async().await, 4);

    let request = metrics.requests.get(&format!("GET {}", SYNC_PATH)).unwrap();
    assert_eq!(request.success_count, 0);
    assert_eq!(request.fail_count, 4);
    assert_eq!(request.status_code_counts.get(&500), Some(&4));

    let check = metrics.checks.get(STATUS_IS_200).unwrap();
    assert_eq!(check.passes, 0);
    assert_eq!(check.fails, 4);

    let error = metrics.errors.values().next().unwrap();
    assert_eq!(error.occurrences, 4);
    assert_eq!(error.error, "500 Internal Server Error");
}

#[tokio::test]
/// Only 200 passes the check, other 2xx responses count as successful requests.
async fn test_status_204() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            sync_request(when);
            then.status(204);
        })
        .await;

    let configuration = common::build_configuration(&server, vec![]);
    let metrics = common::run_load_test(configuration, SyncProducts).await;

    let request = metrics.requests.get(&format!("GET {}", SYNC_PATH)).unwrap();
    assert_eq!(request.success_count, 1);
    let check = metrics.checks.get(STATUS_IS_200).unwrap();
    assert_eq!(check.passes, 0);
    assert_eq!(check.fails, 1);
}

#[tokio::test]
/// When no response is received the status is 0, the check fails and the load
/// test keeps running.
async fn test_transport_failure() {
    let server = MockServer::start_async().await;

    // Nothing listens on port 1.
    let configuration = common::build_configuration(
        &server,
        vec![
            "--host",
            "http://127.0.0.1:1",
            "--iterations",
            "3",
            "--timeout",
            "2s",
        ],
    );
    let metrics = common::run_load_test(configuration, SyncProducts).await;

    assert_eq!(metrics.iterations, 3);
    let request = metrics.requests.get(&format!("GET {}", SYNC_PATH)).unwrap();
    assert_eq!(request.status_code_counts.get(&0), Some(&3));
    assert_eq!(request.fail_count, 3);

    let check = metrics.checks.get(STATUS_IS_200).unwrap();
    assert_eq!(check.passes, 0);
    assert_eq!(check.fails, 3);
    assert_eq!(
        metrics.errors.values().map(|error| error.occurrences).sum::<usize>(),
        3
    );
}

#[tokio::test]
/// A slow server hits the request timeout, which is a transport failure.
async fn test_timeout() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            sync_request(when);
            then.status(200).delay(std::time::Duration::from_secs(5));
        })
        .await;

    let configuration = common::build_configuration(&server, vec!["--timeout", "250ms"]);
    let metrics = common::run_load_test(configuration, SyncProducts).await;

    let request = metrics.requests.get(&format!("GET {}", SYNC_PATH)).unwrap();
    assert_eq!(request.status_code_counts.get(&0), Some(&1));
    // The failure is timed, not reported as instantaneous.
    assert!(request.max_response_time >= 200.0);
    assert_eq!(metrics.checks.get(STATUS_IS_200).unwrap().fails, 1);
}

#[tokio::test]
/// Users loop back-to-back until the run time elapses.
async fn test_run_time() {
    let server = MockServer::start_async().await;
    let sync = server
        .mock_async(|when, then| {
            sync_request(when);
            then.status(200);
        })
        .await;

    let configuration =
        common::build_configuration(&server, vec!["--users", "3", "--run-time", "1"]);
    let started = std::time::Instant::now();
    let metrics = common::run_load_test(configuration, SyncProducts).await;
    let elapsed = started.elapsed();

    assert!(elapsed >= std::time::Duration::from_secs(1));
    assert!(elapsed < std::time::Duration::from_secs(10));
    assert_eq!(metrics.users, 3);

    // Every user got at least one iteration in.
    let hits = sync.hits_async().await;
    assert!(hits >= 3);
    assert_eq!(common::requests_to(&metrics, SYNC_PATH), hits);
    assert_eq!(metrics.checks.get(STATUS_IS_200).unwrap().passes, hits);
}
