//! Completion waiting for submitted jobs.
//!
//! Results are written to the row store asynchronously by the worker fleet.
//! [`AwaitState`] decides, one fetch at a time, whether enough of them have
//! arrived; [`await_outcome`] drives it from a [`Scheduler`] and a
//! [`ResultSource`].
//!
//! Every fetch returns the *full* result set for the job (a filtered
//! `select`, there is no cursor), so each tick replaces the working set
//! rather than appending to it.

use async_trait::async_trait;
use std::time::Duration;
use tokio::time::{Instant, Interval, MissedTickBehavior};

use crate::error::{AwaitError, Result};
use crate::job::Job;
use crate::types::ResultRow;

/// Wait budget used when the caller does not pick one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_millis(5000);

/// Period between fetches used when the caller does not pick one.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Where the awaiter reads a job's results from.
#[async_trait]
pub trait ResultSource<R: ResultRow>: Send + Sync {
    /// Fetch every result currently stored for `job_id`, in store order.
    async fn fetch_results(&self, job_id: i64) -> Result<Vec<R>>;
}

/// Clock and tick source for the polling loop.
#[async_trait]
pub trait Scheduler: Send {
    fn now(&self) -> Instant;

    /// Resolve at the next tick.
    async fn tick(&mut self);
}

/// Fixed-period scheduler on the tokio timer.
///
/// The first tick fires one period after construction. Ticks missed while
/// a fetch is outstanding are skipped, never bunched up.
#[derive(Debug)]
pub struct IntervalScheduler {
    interval: Interval,
}

impl IntervalScheduler {
    pub fn new(period: Duration) -> Self {
        let mut interval = tokio::time::interval_at(Instant::now() + period, period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        Self { interval }
    }
}

#[async_trait]
impl Scheduler for IntervalScheduler {
    fn now(&self) -> Instant {
        Instant::now()
    }

    async fn tick(&mut self) {
        self.interval.tick().await;
    }
}

/// Final result of an await that did not fail.
#[derive(Debug, Clone, PartialEq)]
pub enum AwaitOutcome<R> {
    /// At least the expected number of results arrived.
    Complete(Vec<R>),
    /// The wait budget ran out; `partial` holds what had arrived by then.
    TimedOut { partial: Vec<R>, elapsed: Duration },
}

/// What to do after feeding one fetch into [`AwaitState`].
#[derive(Debug)]
pub enum Step<R> {
    /// Not done; wait for the next tick.
    Continue,
    Complete(Vec<R>),
    TimedOut { partial: Vec<R>, elapsed: Duration },
    Failed(AwaitError),
}

/// Polling state for one await call.
#[derive(Debug)]
pub struct AwaitState<R> {
    job_id: i64,
    expected: usize,
    timeout: Duration,
    started: Instant,
    results: Vec<R>,
    ticks: u32,
}

impl<R: ResultRow> AwaitState<R> {
    /// Validate `job` and start the clock at `started`.
    ///
    /// Fails with [`AwaitError::Misconfigured`] when the job has no id, when
    /// `R` is not the result type of the job's task, or when the number of
    /// results to wait for cannot be determined.
    pub fn new(job: &Job, timeout: Duration, started: Instant) -> std::result::Result<Self, AwaitError> {
        let job_id = job
            .id
            .ok_or_else(|| AwaitError::Misconfigured("job has no id".into()))?;

        let kind = job.config.kind();
        if kind != R::TASK {
            return Err(AwaitError::Misconfigured(format!(
                "job {} is a {} job, its results are not stored in {}",
                job_id,
                kind,
                R::TABLE
            )));
        }

        let expected = job.config.expected_results().ok_or_else(|| {
            AwaitError::Misconfigured(format!("job {} has no batch size", job_id))
        })?;

        Ok(Self {
            job_id,
            expected,
            timeout,
            started,
            results: Vec::new(),
            ticks: 0,
        })
    }

    pub fn job_id(&self) -> i64 {
        self.job_id
    }

    pub fn expected(&self) -> usize {
        self.expected
    }

    /// Number of fetches fed in so far.
    pub fn ticks(&self) -> u32 {
        self.ticks
    }

    /// Results seen in the latest fetch.
    pub fn received(&self) -> usize {
        self.results.len()
    }

    /// Wait budget left at `now`.
    pub fn remaining(&self, now: Instant) -> Duration {
        self.timeout
            .saturating_sub(now.saturating_duration_since(self.started))
    }

    /// Give up at `now` because a fetch outlived the wait budget.
    ///
    /// The fetch counts as a tick; `partial` is the working set from the
    /// last fetch that did complete.
    pub fn expire(&mut self, now: Instant) -> Step<R> {
        self.ticks += 1;
        Step::TimedOut {
            partial: std::mem::take(&mut self.results),
            elapsed: now.saturating_duration_since(self.started),
        }
    }

    /// Feed the outcome of one fetch completed at `now`.
    ///
    /// Checked in order: fetch failure, enough results, timeout. Rows
    /// belonging to another job are ignored.
    pub fn advance(&mut self, fetched: Result<Vec<R>>, now: Instant) -> Step<R> {
        self.ticks += 1;

        let rows = match fetched {
            Ok(rows) => rows,
            Err(e) => return Step::Failed(AwaitError::FetchFailed(e)),
        };
        self.results = rows
            .into_iter()
            .filter(|row| row.job_id() == self.job_id)
            .collect();

        if self.results.len() >= self.expected {
            return Step::Complete(std::mem::take(&mut self.results));
        }

        let elapsed = now.saturating_duration_since(self.started);
        if elapsed >= self.timeout {
            return Step::TimedOut {
                partial: std::mem::take(&mut self.results),
                elapsed,
            };
        }

        Step::Continue
    }
}

/// Poll `source` on `scheduler` ticks until `job` has all its results or
/// `timeout` runs out.
///
/// Each fetch is bounded by the budget left when it starts, so a stalled
/// fetch ends the await at the deadline. There is no way to cancel a
/// pending await other than the timeout.
pub async fn await_outcome<R, S, C>(
    source: &S,
    scheduler: &mut C,
    job: &Job,
    timeout: Duration,
) -> std::result::Result<AwaitOutcome<R>, AwaitError>
where
    R: ResultRow,
    S: ResultSource<R> + ?Sized,
    C: Scheduler + ?Sized,
{
    let mut state = AwaitState::<R>::new(job, timeout, scheduler.now())?;
    tracing::debug!(
        job_id = state.job_id(),
        expected = state.expected(),
        table = R::TABLE,
        "Awaiting job results"
    );

    loop {
        scheduler.tick().await;
        let budget = state.remaining(scheduler.now());
        let step = match tokio::time::timeout(budget, source.fetch_results(state.job_id())).await {
            Ok(fetched) => state.advance(fetched, scheduler.now()),
            Err(_) => state.expire(scheduler.now()),
        };

        match step {
            Step::Continue => {
                tracing::trace!(
                    job_id = state.job_id(),
                    tick = state.ticks(),
                    received = state.received(),
                    "Results not ready"
                );
            }
            Step::Complete(results) => {
                tracing::info!(
                    job_id = state.job_id(),
                    count = results.len(),
                    ticks = state.ticks(),
                    "Job results ready"
                );
                return Ok(AwaitOutcome::Complete(results));
            }
            Step::TimedOut { partial, elapsed } => {
                tracing::warn!(
                    job_id = state.job_id(),
                    received = partial.len(),
                    expected = state.expected(),
                    ?elapsed,
                    "Timed out awaiting job results"
                );
                return Ok(AwaitOutcome::TimedOut { partial, elapsed });
            }
            Step::Failed(e) => {
                tracing::warn!(job_id = state.job_id(), tick = state.ticks(), error = %e, "Result fetch failed");
                return Err(e);
            }
        }
    }
}

/// Like [`await_outcome`], but a timeout is an error and partial results
/// are dropped.
pub async fn await_results<R, S, C>(
    source: &S,
    scheduler: &mut C,
    job: &Job,
    timeout: Duration,
) -> std::result::Result<Vec<R>, AwaitError>
where
    R: ResultRow,
    S: ResultSource<R> + ?Sized,
    C: Scheduler + ?Sized,
{
    let expected = job.config.expected_results().unwrap_or_default();
    match await_outcome(source, scheduler, job, timeout).await? {
        AwaitOutcome::Complete(results) => Ok(results),
        AwaitOutcome::TimedOut { partial, elapsed } => Err(AwaitError::TimedOut {
            expected,
            received: partial.len(),
            elapsed,
        }),
    }
}
