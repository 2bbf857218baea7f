//! Coalescing timer scheduler
//!
//! Every deferred action in the session (command timeout, init settle,
//! ECU retry, poll tick, upload debounce) is keyed by purpose. Scheduling
//! a purpose that is already pending replaces it: the previously armed
//! firing becomes stale and is ignored when it arrives. That single
//! mechanism gives both cancellable timeouts and debouncing.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;

/// The reason a timer was armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerPurpose {
    /// Per-command response timeout.
    CommandTimeout,
    /// Post-notify-enable settle delay before initialization.
    InitSettle,
    /// Re-issue the supported-PIDs probe after an ECU-not-ready reply.
    EcuRetry,
    /// Inter-poll delay for continuous collection.
    PollTick,
    /// Debounce window for single-sample uploads.
    UploadDebounce,
}

/// A timer firing delivered on the scheduler's channel.
///
/// Stale fires (superseded by a reschedule or cancel) carry an old
/// generation and must be discarded via [`Scheduler::is_current`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimerFire {
    /// Why this timer was armed.
    pub purpose: TimerPurpose,
    /// Generation at arm time.
    pub generation: u64,
}

/// Schedule-or-replace deferred actions keyed by purpose.
#[derive(Debug)]
pub struct Scheduler {
    tx: mpsc::UnboundedSender<TimerFire>,
    generations: HashMap<TimerPurpose, u64>,
}

impl Scheduler {
    /// Create a scheduler and the channel its firings arrive on.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<TimerFire>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                tx,
                generations: HashMap::new(),
            },
            rx,
        )
    }

    /// Arm (or re-arm) the timer for `purpose`. A previously pending
    /// firing for the same purpose becomes stale.
    pub fn schedule(&mut self, purpose: TimerPurpose, delay: Duration) {
        let generation = self.bump(purpose);
        let tx = self.tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(TimerFire {
                purpose,
                generation,
            });
        });
    }

    /// Invalidate any pending firing for `purpose` without re-arming.
    pub fn cancel(&mut self, purpose: TimerPurpose) {
        self.bump(purpose);
    }

    /// Check whether a received firing is still the armed one.
    pub fn is_current(&self, fire: TimerFire) -> bool {
        self.generations.get(&fire.purpose).copied() == Some(fire.generation)
    }

    fn bump(&mut self, purpose: TimerPurpose) -> u64 {
        let entry = self.generations.entry(purpose).or_insert(0);
        *entry += 1;
        *entry
    }
}
