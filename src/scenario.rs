//! What each virtual user does, one iteration at a time.
//!
//! An [`Iteration`] is invoked back-to-back by every
//! [`VirtualUser`](../user/struct.VirtualUser.html) until the load test ends. The
//! built-in [`SyncProducts`] iteration requests a first-time product sync, logs the
//! status and duration of the response, and checks that the status is `200`.

use async_trait::async_trait;
use http::header::{HeaderMap, HeaderName, HeaderValue};
use serde::Serialize;
use std::fmt;
use url::Url;

use crate::user::VirtualUser;
use crate::StampedeError;

/// The endpoint requested by [`SyncProducts`].
pub const SYNC_PRODUCTS_URL: &str =
    "http://curepoint.in/syncProductsToElixireMobile/?isFirstTimeSync=true";

/// The name of the only check evaluated by [`SyncProducts`].
pub const STATUS_IS_200: &str = "status is 200";

/// One unit of work, invoked repeatedly by each virtual user.
///
/// Implementations must not keep per-invocation state in `self`: the same iteration
/// is shared by every virtual user and invoked concurrently.
#[async_trait]
pub trait Iteration: Send + Sync {
    /// A short name used in log messages.
    fn name(&self) -> &str;

    /// Run one iteration as `user`.
    ///
    /// Failed checks and failed requests are recorded through `user` and are not
    /// errors. An error returned here is logged and counted, and the user keeps
    /// running.
    async fn iterate(&self, user: &mut VirtualUser) -> Result<(), StampedeError>;
}

/// The headers identifying the caller of a product sync.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncHeaders {
    /// Sent as `application`.
    pub application: String,
    /// Sent as `storeID`.
    pub store_id: String,
    /// Sent as `userID`.
    pub user_id: String,
    /// Sent as `posID`.
    pub pos_id: String,
}
impl SyncHeaders {
    pub fn new(application: &str, store_id: &str, user_id: &str, pos_id: &str) -> Self {
        SyncHeaders {
            application: application.to_string(),
            store_id: store_id.to_string(),
            user_id: user_id.to_string(),
            pos_id: pos_id.to_string(),
        }
    }

    /// Header name and value pairs, in the order they're sent.
    pub fn pairs(&self) -> [(&str, &str); 4] {
        [
            ("application", &self.application),
            ("storeID", &self.store_id),
            ("userID", &self.user_id),
            ("posID", &self.pos_id),
        ]
    }
}
/// The point-of-sale client every [`SyncProducts`] iteration identifies as.
impl Default for SyncHeaders {
    fn default() -> Self {
        SyncHeaders::new(
            "ELIXIRE_MOBILE",
            "ELXS218598",
            "ELXU114905708",
            "ELIXIRE_MOBILE",
        )
    }
}

/// A GET request to send: where, and with which headers.
#[derive(Debug, Clone)]
pub struct RequestDescriptor {
    /// Name used when aggregating metrics, defaults to the URL path.
    pub name: String,
    /// Full URL to request.
    pub url: Url,
    /// Headers sent with the request.
    pub headers: HeaderMap,
}
impl RequestDescriptor {
    pub fn new(url: Url) -> Self {
        RequestDescriptor {
            name: url.path().to_string(),
            url,
            headers: HeaderMap::new(),
        }
    }

    /// Set the name used when aggregating metrics for this request.
    pub fn with_name(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    /// Add headers to the request, replacing any earlier header with the same name.
    ///
    /// Header names are case-insensitive and sent in lowercase.
    ///
    /// # Example
    /// ```rust
    /// use stampede::prelude::*;
    ///
    /// fn main() -> Result<(), StampedeError> {
    ///     let request = RequestDescriptor::new(Url::parse("http://localhost/")?)
    ///         .with_headers([("storeID", "ELXS218598")])?;
    ///     assert_eq!(request.headers["storeid"], "ELXS218598");
    ///
    ///     Ok(())
    /// }
    /// ```
    pub fn with_headers<'a, I>(mut self, headers: I) -> Result<Self, StampedeError>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        for (name, value) in headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                StampedeError::InvalidOption {
                    option: "header name".to_string(),
                    value: name.to_string(),
                    detail: e.to_string(),
                }
            })?;
            let header_value =
                HeaderValue::from_str(value).map_err(|e| StampedeError::InvalidOption {
                    option: format!("header {}", name),
                    value: value.to_string(),
                    detail: e.to_string(),
                })?;
            self.headers.insert(header_name, header_value);
        }
        Ok(self)
    }
}

/// What came back from one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseOutcome {
    /// HTTP status code, or `0` if no response was received.
    pub status: u16,
    /// Milliseconds from sending the request until the body was read or the
    /// request failed.
    pub duration_ms: f64,
    /// Why no response was received, if it wasn't.
    pub error: Option<String>,
}
impl ResponseOutcome {
    /// Whether the server answered with a 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}
/// The per-iteration log line, for example `Status: 200 | Duration: 42.7 ms`.
impl fmt::Display for ResponseOutcome {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Status: {} | Duration: {} ms", self.status, self.duration_ms)
    }
}

/// Request a first-time product sync and check that it succeeded.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncProducts;
impl SyncProducts {
    /// Concurrent virtual users when not configured otherwise.
    pub const USERS: usize = 50;
    /// How long the load test runs when not configured otherwise.
    pub const RUN_TIME: &'static str = "30s";

    /// Build the request, with a fresh header set.
    pub fn request(&self) -> Result<RequestDescriptor, StampedeError> {
        let headers = SyncHeaders::default();
        RequestDescriptor::new(Url::parse(SYNC_PRODUCTS_URL)?).with_headers(headers.pairs())
    }
}
#[async_trait]
impl Iteration for SyncProducts {
    fn name(&self) -> &str {
        "sync products"
    }

    async fn iterate(&self, user: &mut VirtualUser) -> Result<(), StampedeError> {
        let request = self.request()?;
        let outcome = user.get(&request).await;
        info!("{}", outcome);
        user.check(STATUS_IS_200, outcome.status == 200);
        Ok(())
    }
}
