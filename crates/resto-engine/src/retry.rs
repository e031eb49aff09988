//! Backoff for sink writes, plus log throttling for a sink that stays down.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

/// Exponential backoff policy.
#[derive(Debug, Clone)]
pub struct Backoff {
    /// Label used in logs, e.g. `firestore_write`
    pub label: String,
    /// Attempts after the first one
    pub retries: u32,
    pub first_delay: Duration,
    pub max_delay: Duration,
}

impl Backoff {
    pub fn new(label: impl Into<String>, retries: u32, first_delay: Duration) -> Self {
        Self {
            label: label.into(),
            retries,
            first_delay,
            max_delay: Duration::from_secs(5),
        }
    }

    /// Pause before retry `n`, counting from 1.
    fn pause(&self, n: u32) -> Duration {
        let shift = n.saturating_sub(1).min(16);
        self.first_delay.saturating_mul(1 << shift).min(self.max_delay)
    }

    /// Run `attempt` until it succeeds, fails permanently, or retries run out.
    pub async fn run<T, E, F, Fut>(&self, attempt: F, transient: impl Fn(&E) -> bool) -> Attempted<T, E>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut tries = 1u32;
        loop {
            let err = match attempt().await {
                Ok(value) => return Attempted::Done(value),
                Err(e) => e,
            };
            if tries > self.retries || !transient(&err) {
                return Attempted::GaveUp { error: err, tries };
            }
            let pause = self.pause(tries);
            debug!(label = %self.label, tries, ?pause, error = %err, "Transient failure, backing off");
            tokio::time::sleep(pause).await;
            tries += 1;
        }
    }
}

/// Outcome of [`Backoff::run`].
#[derive(Debug)]
pub enum Attempted<T, E> {
    Done(T),
    /// Last error and the number of attempts made.
    GaveUp { error: E, tries: u32 },
}

/// Logs the first few consecutive failures, then goes quiet until a success.
#[derive(Debug)]
pub struct LogThrottle {
    streak: u32,
    loud_for: u32,
}

impl LogThrottle {
    pub fn new(loud_for: u32) -> Self {
        Self { streak: 0, loud_for }
    }

    pub fn success(&mut self) {
        if self.streak > self.loud_for {
            debug!(streak = self.streak, "Writes recovered");
        }
        self.streak = 0;
    }

    /// Returns `true` if this failure should be logged.
    pub fn failure(&mut self) -> bool {
        self.streak += 1;
        if self.streak == self.loud_for + 1 {
            warn!(streak = self.streak, "Write failures continue, muting until recovery");
        }
        self.streak <= self.loud_for
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }
}
