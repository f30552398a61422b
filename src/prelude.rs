//! Everything needed to write and run a Stampede load test.
//!
//! ```rust
//! use stampede::prelude::*;
//! ```

pub use crate::config::{RunConfig, StampedeDefault, StampedeDefaultType};
pub use crate::logger::LogFormat;
pub use crate::metrics::StampedeMetrics;
pub use crate::runner::{Runner, WorkerPool};
pub use crate::scenario::{
    Iteration, RequestDescriptor, ResponseOutcome, SyncHeaders, SyncProducts, STATUS_IS_200,
};
pub use crate::user::VirtualUser;
pub use crate::{Stampede, StampedeConfiguration, StampedeError};

pub use async_trait::async_trait;
pub use url::Url;
