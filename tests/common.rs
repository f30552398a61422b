use gumdrop::Options;
use httpmock::MockServer;

use stampede::metrics::StampedeMetrics;
use stampede::prelude::*;

// Not all functions are used by all tests, so we enable allow(dead_code) to avoid
// compiler warnings during testing.

/// The following options are configured by default, if not set to a custom value:
///  --host <mock-server>
///  --users 1
///  --iterations 1 (unless --run-time is set)
///  --no-print-metrics
pub fn build_configuration(server: &MockServer, custom: Vec<&str>) -> StampedeConfiguration {
    // Start with an empty configuration.
    let mut configuration: Vec<&str> = vec![];
    // Declare server_url here no matter what, so its lifetime is sufficient when needed.
    let server_url = server.base_url();

    // Merge in all custom options first.
    configuration.extend_from_slice(&custom);

    // Default to using mock server if not otherwise configured.
    if !configuration.contains(&"--host") {
        configuration.extend_from_slice(&["--host", &server_url]);
    }

    // Default to testing with 1 user if not otherwise configured.
    if !configuration.contains(&"--users") {
        configuration.extend_from_slice(&["--users", "1"]);
    }

    // Default to running a single iteration if not otherwise configured.
    if !configuration.contains(&"--run-time") && !configuration.contains(&"--iterations") {
        configuration.extend_from_slice(&["--iterations", "1"]);
    }

    // Keep test output readable.
    if !configuration.contains(&"--no-print-metrics") {
        configuration.push("--no-print-metrics");
    }

    // Parse these options to generate a StampedeConfiguration.
    StampedeConfiguration::parse_args_default(&configuration)
        .expect("failed to parse options and generate a configuration")
}

/// Run the actual load test, returning the StampedeMetrics.
pub async fn run_load_test(
    configuration: StampedeConfiguration,
    iteration: impl Iteration + 'static,
) -> StampedeMetrics {
    Stampede::initialize_with_config(configuration)
        .unwrap()
        .register_iteration(iteration)
        .execute()
        .await
        .unwrap()
}

/// Total hits on `path` recorded by the metrics.
#[allow(dead_code)]
pub fn requests_to(metrics: &StampedeMetrics, path: &str) -> usize {
    metrics
        .requests
        .get(&format!("GET {}", path))
        .map(|request| request.success_count + request.fail_count)
        .unwrap_or(0)
}
