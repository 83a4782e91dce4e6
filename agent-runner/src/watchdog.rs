//! Execution deadline for one agent run
//!
//! A [`Watchdog`] combines an optional deadline with a cancellation token.
//! Every blocking step of a run is awaited through [`Watchdog::guard`], which
//! resolves to exactly one tagged [`Outcome`]. Once the watchdog has tripped
//! it stays tripped, so a run observes its deadline at most once and never
//! races a natural completion against a kill.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Result of a guarded step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome<T> {
    /// The step finished before the deadline
    Completed(T),
    /// The deadline elapsed first
    TimedOut,
    /// The run was cancelled (consumer gone or server shutting down)
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trip {
    TimedOut,
    Cancelled,
}

/// Deadline and cancellation for one run
#[derive(Debug)]
pub struct Watchdog {
    timeout: Option<Duration>,
    deadline: Option<Instant>,
    token: CancellationToken,
    tripped: Option<Trip>,
}

impl Watchdog {
    /// Arm a watchdog starting now; `None` means no deadline
    pub fn arm(timeout: Option<Duration>, token: CancellationToken) -> Self {
        Self {
            timeout,
            deadline: timeout.map(|t| Instant::now() + t),
            token,
            tripped: None,
        }
    }

    /// The configured timeout
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    /// Await `fut` unless the run is cancelled or the deadline elapses first
    ///
    /// Cancellation and the deadline take precedence over a ready future, so
    /// a process that writes continuously cannot outrun its deadline.
    pub async fn guard<F: Future>(&mut self, fut: F) -> Outcome<F::Output> {
        if let Some(trip) = self.tripped {
            return trip.outcome();
        }

        let deadline = self.deadline;
        let outcome = tokio::select! {
            biased;
            () = self.token.cancelled() => Outcome::Cancelled,
            () = expiry(deadline) => Outcome::TimedOut,
            out = fut => Outcome::Completed(out),
        };

        match outcome {
            Outcome::TimedOut => self.tripped = Some(Trip::TimedOut),
            Outcome::Cancelled => self.tripped = Some(Trip::Cancelled),
            Outcome::Completed(_) => {}
        }
        outcome
    }
}

impl Trip {
    fn outcome<T>(self) -> Outcome<T> {
        match self {
            Trip::TimedOut => Outcome::TimedOut,
            Trip::Cancelled => Outcome::Cancelled,
        }
    }
}

async fn expiry(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
