//! Join primitives tracking scheduled work.
//!
//! `Processes` counts the units scheduled during one execution pass, carries
//! the single-assignment first-error cell and aggregates compensation
//! failures. `WaitGroup` is the manager-level join behind `Manager::wait`,
//! keeping detached compensation observable instead of fire-and-forget.

use std::sync::Mutex;

use anyhow::Error;
use tokio::sync::Notify;

/// Tracks the in-flight units of one execution pass
#[derive(Debug, Default)]
pub struct Processes {
    pending: Mutex<usize>,
    notify: Notify,
    error: Mutex<Option<Error>>,
    flaws: Mutex<Vec<Error>>,
}

impl Processes {
    /// Construct a new process tracker with the given initial count
    pub fn new(count: usize) -> Self {
        Self {
            pending: Mutex::new(count),
            ..Default::default()
        }
    }

    /// Add the given number of units to the pending count, called before the
    /// corresponding units are spawned
    pub fn add(&self, count: usize) {
        let mut pending = self.pending.lock().unwrap();
        *pending += count;
    }

    /// Mark one unit as finished
    pub fn done(&self) {
        let mut pending = self.pending.lock().unwrap();
        *pending -= 1;

        if *pending == 0 {
            self.notify.notify_waiters();
        }
    }

    /// Record a fatal error. Only the first recorded error is kept; later
    /// ones are discarded.
    pub fn fatal(&self, err: Error) {
        let mut error = self.error.lock().unwrap();
        if error.is_none() {
            *error = Some(err);
        }
    }

    /// Whether a fatal error has been recorded
    pub fn has_err(&self) -> bool {
        self.error.lock().unwrap().is_some()
    }

    /// Take ownership of the recorded fatal error, if any
    pub fn take_err(&self) -> Option<Error> {
        self.error.lock().unwrap().take()
    }

    /// Record a non-fatal failure, aggregated without halting the pass
    pub fn report(&self, err: Error) {
        let mut flaws = self.flaws.lock().unwrap();
        flaws.push(err);
    }

    /// Take ownership of all aggregated non-fatal failures
    pub fn take_reports(&self) -> Vec<Error> {
        std::mem::take(&mut self.flaws.lock().unwrap())
    }

    /// Wait until every scheduled unit has finished
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();

            if *self.pending.lock().unwrap() == 0 {
                return;
            }

            notified.await;
        }
    }
}

/// Counter-based join primitive mirroring a wait group
#[derive(Debug, Default)]
pub struct WaitGroup {
    pending: Mutex<usize>,
    notify: Notify,
}

impl WaitGroup {
    /// Construct an empty wait group
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the given number of units
    pub fn add(&self, count: usize) {
        let mut pending = self.pending.lock().unwrap();
        *pending += count;
    }

    /// Mark one unit as finished
    pub fn done(&self) {
        let mut pending = self.pending.lock().unwrap();
        *pending -= 1;

        if *pending == 0 {
            self.notify.notify_waiters();
        }
    }

    /// Wait until the pending count drops to zero
    pub async fn wait(&self) {
        loop {
            let notified = self.notify.notified();

            if *self.pending.lock().unwrap() == 0 {
                return;
            }

            notified.await;
        }
    }
}
