//! Virtual users, each repeatedly running the registered iteration.

use http::StatusCode;
use reqwest::Client;
use std::sync::Arc;
use std::time::{Duration, Instant};
use url::Url;

use crate::config::RunConfig;
use crate::metrics::{CheckMetric, IterationMetric, RequestMetric, StampedeMetric};
use crate::scenario::{Iteration, RequestDescriptor, ResponseOutcome};
use crate::StampedeError;

static APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"));

/// Commands sent from the runner to [`VirtualUser`] tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserCommand {
    /// Finish the current iteration and exit.
    Exit,
}

/// One simulated client, with its own HTTP client and cookie jar.
///
/// A `VirtualUser` is handed to [`Iteration::iterate`] by mutable reference. Every
/// request it makes with [`VirtualUser::get`] and every check it evaluates with
/// [`VirtualUser::check`] is sent to the runner for aggregation.
#[derive(Debug)]
pub struct VirtualUser {
    /// Which user this is, starting at 1.
    number: usize,
    /// How many iterations this user has started.
    iteration: usize,
    /// When the load test started.
    started: Instant,
    /// Replaces the scheme and authority of request URLs, if set.
    host: Option<Url>,
    /// The HTTP client used by this user.
    client: Client,
    /// Channel to the runner.
    channel_to_parent: flume::Sender<StampedeMetric>,
    /// Optional channel to the request logger.
    logger: Option<flume::Sender<Option<RequestMetric>>>,
}
impl VirtualUser {
    /// Create a new user with its own [`reqwest::Client`].
    pub fn new(
        number: usize,
        config: &RunConfig,
        started: Instant,
        channel_to_parent: flume::Sender<StampedeMetric>,
        logger: Option<flume::Sender<Option<RequestMetric>>>,
    ) -> Result<Self, StampedeError> {
        trace!("new user {}", number);
        let builder = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(config.timeout)
            .gzip(true);
        // Each user keeps its own cookies.
        #[cfg(feature = "cookies")]
        let builder = builder.cookie_store(true);
        let client = builder.build()?;

        Ok(VirtualUser {
            number,
            iteration: 0,
            started,
            host: config.host.clone(),
            client,
            channel_to_parent,
            logger,
        })
    }

    /// Which user this is, starting at 1.
    pub fn number(&self) -> usize {
        self.number
    }

    /// How many iterations this user has started, including the current one.
    pub fn iteration(&self) -> usize {
        self.iteration
    }

    /// The URL actually requested for `url`: if a host is configured, its scheme,
    /// host and port replace those of `url`.
    ///
    /// # Example
    /// ```rust
    /// use stampede::prelude::*;
    /// use std::num::NonZeroUsize;
    /// use std::time::{Duration, Instant};
    ///
    /// fn main() -> Result<(), StampedeError> {
    ///     let mut config = RunConfig::new(NonZeroUsize::MIN, Duration::from_secs(1));
    ///     config.host = Some(Url::parse("http://127.0.0.1:8080")?);
    ///     let (sender, _receiver) = flume::unbounded();
    ///     let user = VirtualUser::new(1, &config, Instant::now(), sender, None)?;
    ///
    ///     let url = user.build_url(&Url::parse("http://curepoint.in/sync/?first=true")?);
    ///     assert_eq!(url.as_str(), "http://127.0.0.1:8080/sync/?first=true");
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn build_url(&self, url: &Url) -> Url {
        match self.host.as_ref() {
            Some(host) => {
                let mut rebased = host.clone();
                rebased.set_path(url.path());
                rebased.set_query(url.query());
                rebased
            }
            None => url.clone(),
        }
    }

    /// Send a GET request and read the response body.
    ///
    /// Never fails: if no complete response is received, including when the body
    /// can't be read to the end, the outcome has status `0`, the time spent until the
    /// failure, and the error. Either way a [`RequestMetric`] is sent
    /// to the runner.
    pub async fn get(&self, request: &RequestDescriptor) -> ResponseOutcome {
        let url = self.build_url(&request.url);
        let mut request_metric = RequestMetric::new(
            self.started.elapsed().as_millis(),
            self.number,
            self.iteration,
            "GET",
            &request.name,
            url.as_str(),
        );

        let started = Instant::now();
        let (status, error) = match self
            .client
            .get(url)
            .headers(request.headers.clone())
            .send()
            .await
        {
            Ok(response) => {
                let status = response.status().as_u16();
                // Read the whole body so the duration includes receiving it.
                match response.bytes().await {
                    Ok(_) => (status, None),
                    Err(e) => {
                        debug!("user {}: {} response body truncated", self.number, status);
                        (0, Some(e.to_string()))
                    }
                }
            }
            Err(e) => (0, Some(e.to_string())),
        };
        let outcome = ResponseOutcome {
            status,
            duration_ms: elapsed_ms(started.elapsed()),
            error,
        };
        if let Some(error) = outcome.error.as_ref() {
            debug!("user {}: request to {} failed: {}", self.number, request_metric.url, error);
        }

        request_metric.status_code = outcome.status;
        request_metric.response_time = outcome.duration_ms;
        request_metric.success = outcome.is_success() && outcome.error.is_none();
        request_metric.error = match outcome.error.as_ref() {
            Some(error) => error.clone(),
            None if !request_metric.success => match StatusCode::from_u16(outcome.status) {
                Ok(status_code) => status_code.to_string(),
                Err(_) => outcome.status.to_string(),
            },
            None => "".to_string(),
        };
        self.send_request_metric(request_metric);

        outcome
    }

    /// Record a named check and return whether it passed.
    ///
    /// A failed check is counted, it doesn't stop the load test.
    pub fn check(&self, name: &str, passed: bool) -> bool {
        // Best effort metrics.
        let _ = self.channel_to_parent.send(StampedeMetric::Check(CheckMetric {
            elapsed: self.started.elapsed().as_millis() as u64,
            user: self.number,
            name: name.to_string(),
            passed,
        }));
        passed
    }

    // Send the request metric to the logger if enabled, and to the parent.
    fn send_request_metric(&self, request_metric: RequestMetric) {
        if let Some(logger) = self.logger.as_ref() {
            if let Err(e) = logger.send(Some(request_metric.clone())) {
                debug!("user {}: request logger has exited: {}", self.number, e);
            }
        }
        let _ = self
            .channel_to_parent
            .send(StampedeMetric::Request(request_metric));
    }
}

// Milliseconds with microsecond precision.
fn elapsed_ms(elapsed: Duration) -> f64 {
    elapsed.as_micros() as f64 / 1_000.0
}

/// Run `iteration` back-to-back as `user` until told to exit, or until `iterations`
/// iterations have run.
pub(crate) async fn user_main(
    iteration: Arc<dyn Iteration>,
    mut user: VirtualUser,
    receiver: flume::Receiver<UserCommand>,
    iterations: Option<usize>,
) {
    debug!("launching user {} running {}...", user.number, iteration.name());

    loop {
        if received_exit(&receiver) {
            break;
        }
        if let Some(iterations) = iterations {
            if user.iteration >= iterations {
                debug!("user {} completed {} iterations", user.number, iterations);
                break;
            }
        }

        user.iteration += 1;
        let started = Instant::now();
        let error = match iteration.iterate(&mut user).await {
            Ok(()) => None,
            Err(e) => {
                warn!("user {}: {} failed: {}", user.number, iteration.name(), e);
                Some(e.to_string())
            }
        };
        let _ = user
            .channel_to_parent
            .send(StampedeMetric::Iteration(IterationMetric {
                elapsed: user.started.elapsed().as_millis() as u64,
                user: user.number,
                run_time: started.elapsed().as_millis() as u64,
                error,
            }));
    }

    debug!("exiting user {} running {}...", user.number, iteration.name());
}

// Determine if the parent has sent a UserCommand::Exit message, or is gone.
fn received_exit(receiver: &flume::Receiver<UserCommand>) -> bool {
    while let Ok(command) = receiver.try_recv() {
        match command {
            UserCommand::Exit => return true,
        }
    }
    receiver.is_disconnected()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::num::NonZeroUsize;

    fn config(host: Option<&str>) -> RunConfig {
        let mut config = RunConfig::new(NonZeroUsize::MIN, Duration::from_secs(1));
        config.host = host.map(|host| Url::parse(host).unwrap());
        config.timeout = Duration::from_secs(1);
        config
    }

    #[test]
    fn build_url() {
        let (sender, _receiver) = flume::unbounded();
        let url = Url::parse("http://curepoint.in/syncProductsToElixireMobile/?isFirstTimeSync=true")
            .unwrap();

        let user = VirtualUser::new(1, &config(None), Instant::now(), sender.clone(), None).unwrap();
        assert_eq!(user.build_url(&url), url);

        let user = VirtualUser::new(
            2,
            &config(Some("https://127.0.0.1:8443/ignored")),
            Instant::now(),
            sender,
            None,
        )
        .unwrap();
        assert_eq!(
            user.build_url(&url).as_str(),
            "https://127.0.0.1:8443/syncProductsToElixireMobile/?isFirstTimeSync=true"
        );
        assert_eq!(user.number(), 2);
        assert_eq!(user.iteration(), 0);
    }

    #[test]
    fn check_sends_metric() {
        let (sender, receiver) = flume::unbounded();
        let user = VirtualUser::new(7, &config(None), Instant::now(), sender, None).unwrap();
        assert!(user.check("status is 200", true));
        assert!(!user.check("status is 200", false));

        let metrics: Vec<StampedeMetric> = receiver.drain().collect();
        assert_eq!(metrics.len(), 2);
        match &metrics[1] {
            StampedeMetric::Check(check) => {
                assert_eq!(check.user, 7);
                assert_eq!(check.name, "status is 200");
                assert!(!check.passed);
            }
            other => panic!("unexpected metric: {:?}", other),
        }
    }

    #[test]
    fn exit_command() {
        let (sender, receiver) = flume::unbounded();
        assert!(!received_exit(&receiver));
        sender.send(UserCommand::Exit).unwrap();
        assert!(received_exit(&receiver));
        drop(sender);
        assert!(received_exit(&receiver));
    }

    #[tokio::test]
    async fn truncated_body() {
        use std::io::{Read, Write};

        // Promise 100 bytes of body, send 5, then hang up.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let address = listener.local_addr().unwrap();
        std::thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut received = Vec::new();
            let mut buffer = [0; 1024];
            while !received.windows(4).any(|window| window == b"\r\n\r\n") {
                match stream.read(&mut buffer) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => received.extend_from_slice(&buffer[..n]),
                }
            }
            let _ = stream.write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort");
        });

        let (sender, receiver) = flume::unbounded();
        let user = VirtualUser::new(1, &config(None), Instant::now(), sender, None).unwrap();
        let request =
            RequestDescriptor::new(Url::parse(&format!("http://{}/sync/", address)).unwrap());
        let outcome = user.get(&request).await;
        assert_eq!(outcome.status, 0);
        assert!(outcome.error.is_some());

        match receiver.drain().next() {
            Some(StampedeMetric::Request(request_metric)) => {
                assert_eq!(request_metric.status_code, 0);
                assert!(!request_metric.success);
                assert!(!request_metric.error.is_empty());
            }
            other => panic!("unexpected metric: {:?}", other),
        }
    }

    #[test]
    fn milliseconds() {
        assert_eq!(elapsed_ms(Duration::from_micros(42_700)), 42.7);
        assert_eq!(elapsed_ms(Duration::from_millis(120)), 120.0);
        assert_eq!(elapsed_ms(Duration::ZERO), 0.0);
    }
}
