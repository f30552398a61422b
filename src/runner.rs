//! Runners drive virtual users through a load test.
//!
//! [`Stampede`](../struct.Stampede.html) never schedules users itself: it resolves a
//! [`RunConfig`] and hands it, together with the registered
//! [`Iteration`](../scenario/trait.Iteration.html), to a [`Runner`]. The built-in
//! [`WorkerPool`] runs every virtual user as a tokio task.

use async_trait::async_trait;
use futures::future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::config::RunConfig;
use crate::logger;
use crate::metrics::{StampedeMetric, StampedeMetrics};
use crate::scenario::Iteration;
use crate::user::{self, UserCommand, VirtualUser};
use crate::util;
use crate::StampedeError;

/// How often the runner checks whether ctrl-c was caught.
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Runs `config.users` virtual users, each invoking `iteration` back-to-back, and
/// returns the aggregated metrics.
///
/// # Example
/// A runner that invokes the iteration exactly once with a single user:
/// ```rust
/// use stampede::prelude::*;
/// use std::sync::Arc;
/// use std::time::Instant;
///
/// struct Once;
///
/// #[async_trait]
/// impl Runner for Once {
///     async fn run(
///         &self,
///         config: &RunConfig,
///         iteration: Arc<dyn Iteration>,
///     ) -> Result<StampedeMetrics, StampedeError> {
///         let (sender, _receiver) = flume::unbounded();
///         let mut user = VirtualUser::new(1, config, Instant::now(), sender, None)?;
///         iteration.iterate(&mut user).await?;
///         Ok(StampedeMetrics::default())
///     }
/// }
/// ```
#[async_trait]
pub trait Runner: Send + Sync {
    async fn run(
        &self,
        config: &RunConfig,
        iteration: Arc<dyn Iteration>,
    ) -> Result<StampedeMetrics, StampedeError>;
}

/// Runs every virtual user as its own tokio task.
///
/// All users start at once. The load test ends when the run time elapses, when every
/// user has run its iterations, or when ctrl-c is caught. Users are then told to
/// exit and given the graceful stop window to finish their current iteration, after
/// which any user still running is aborted.
#[derive(Debug, Clone, Copy, Default)]
pub struct WorkerPool;

#[async_trait]
impl Runner for WorkerPool {
    async fn run(
        &self,
        config: &RunConfig,
        iteration: Arc<dyn Iteration>,
    ) -> Result<StampedeMetrics, StampedeError> {
        util::setup_ctrlc_handler();

        // Optionally launch the request logger.
        let (logger_handle, logger_channel) = match config.request_log.as_ref() {
            Some(request_log) => {
                let file = logger::create_request_log(request_log).await?;
                let (sender, receiver) = flume::unbounded();
                let handle = tokio::spawn(logger::logger_main(request_log.clone(), file, receiver));
                (Some(handle), Some(sender))
            }
            None => (None, None),
        };

        let started = Instant::now();
        let (metrics_sender, metrics_receiver) = flume::unbounded::<StampedeMetric>();

        // Build every user before launching any, so a client that can't be built
        // fails the load test before it starts.
        let users = (1..=config.users.get())
            .map(|number| {
                VirtualUser::new(
                    number,
                    config,
                    started,
                    metrics_sender.clone(),
                    logger_channel.clone(),
                )
            })
            .collect::<Result<Vec<_>, StampedeError>>()?;
        // Users hold the only remaining senders: the channel disconnects once they've all exited.
        drop(metrics_sender);

        let mut metrics = StampedeMetrics::new(users.len());
        let mut user_handles: Vec<JoinHandle<()>> = Vec::with_capacity(users.len());
        let mut user_channels: Vec<flume::Sender<UserCommand>> = Vec::with_capacity(users.len());
        for user in users {
            let (sender, receiver) = flume::unbounded();
            user_handles.push(tokio::spawn(user::user_main(
                iteration.clone(),
                user,
                receiver,
                config.iterations,
            )));
            user_channels.push(sender);
        }
        info!("launched {} users...", user_handles.len());

        // A span too far in the future to represent never elapses.
        let now = tokio::time::Instant::now();
        let deadline = config
            .run_time
            .and_then(|run_time| now.checked_add(run_time));
        let mut running_metrics_timer = config.running_metrics.and_then(|every| {
            now.checked_add(every)
                .map(|start| tokio::time::interval_at(start, every))
        });
        let mut cancel_timer = tokio::time::interval(CANCEL_POLL_INTERVAL);

        // Aggregate metrics until the load test ends.
        loop {
            tokio::select! {
                message = metrics_receiver.recv_async() => match message {
                    Ok(metric) => metrics.record(metric),
                    Err(_) => {
                        info!("all users finished their iterations, stopping...");
                        break;
                    }
                },
                _ = sleep_until(deadline) => {
                    info!("run time elapsed, stopping...");
                    break;
                }
                _ = cancel_timer.tick() => {
                    if util::canceled() {
                        break;
                    }
                }
                _ = tick(&mut running_metrics_timer) => {
                    metrics.update_duration();
                    metrics.print_running();
                }
            }
        }
        metrics.update_duration();

        // Tell all running users to exit after their current iteration.
        for sender in &user_channels {
            // A user that already exited has dropped its receiver.
            let _ = sender.send(UserCommand::Exit);
        }
        let abort_handles: Vec<_> = user_handles
            .iter()
            .map(|handle| handle.abort_handle())
            .collect();
        match tokio::time::timeout(config.graceful_stop, future::join_all(user_handles)).await {
            Ok(results) => {
                for result in results {
                    if let Err(e) = result {
                        warn!("user task failed: {}", e);
                    }
                }
            }
            Err(_) => {
                let still_running = abort_handles
                    .iter()
                    .filter(|handle| !handle.is_finished())
                    .count();
                warn!(
                    "aborting {} users still running after {:?}",
                    still_running, config.graceful_stop
                );
                for handle in abort_handles {
                    handle.abort();
                }
            }
        }

        // Collect the metrics sent while users were stopping.
        for metric in metrics_receiver.drain() {
            metrics.record(metric);
        }

        // Stop the request logger, flushing it to disk.
        if let Some(handle) = logger_handle {
            if let Some(sender) = logger_channel.as_ref() {
                let _ = sender.send(None);
            }
            handle.await??;
        }

        metrics.final_metrics = true;
        info!(
            "load test finished: {} iterations, {} requests",
            util::format_number(metrics.iterations),
            util::format_number(metrics.total_requests())
        );

        Ok(metrics)
    }
}

// Sleep until the deadline, or forever if there is none.
async fn sleep_until(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => future::pending().await,
    }
}

// Wait for the next tick of an optional interval, or forever if there is none.
async fn tick(interval: &mut Option<tokio::time::Interval>) {
    match interval.as_mut() {
        Some(interval) => {
            interval.tick().await;
        }
        None => future::pending().await,
    }
}
