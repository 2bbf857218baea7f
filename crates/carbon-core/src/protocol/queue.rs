//! Command queue with single-in-flight discipline
//!
//! The adapter protocol carries no request identifiers, so replies are
//! correlated to commands purely by order. The queue therefore enforces
//! strict FIFO dispatch with at most one outstanding command; a command
//! leaves the in-flight slot only when a frame terminator arrives or its
//! timeout fires. The queue never retries on its own.

use std::collections::VecDeque;

/// Ordered pending commands plus the single in-flight slot.
///
/// Mutated only from the session's serialized event flow. Enqueues that
/// happen from inside response handling (re-entrant with respect to a
/// drain) are fine: `advance` only looks at the head.
#[derive(Debug, Default)]
pub struct CommandQueue {
    pending: VecDeque<String>,
    in_flight: Option<String>,
}

impl CommandQueue {
    /// Create an empty queue.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append commands to the tail. Call [`CommandQueue::advance`]
    /// afterwards to kick transmission if nothing is in flight.
    pub fn enqueue<I, S>(&mut self, commands: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.pending.extend(commands.into_iter().map(Into::into));
    }

    /// Move the head command into the in-flight slot and return it for
    /// transmission. No-op while a command is outstanding or the queue
    /// is empty.
    pub fn advance(&mut self) -> Option<String> {
        if self.in_flight.is_some() {
            return None;
        }
        let next = self.pending.pop_front()?;
        self.in_flight = Some(next.clone());
        Some(next)
    }

    /// Normal completion path: a frame terminator arrived for the
    /// in-flight command. Returns the command that just completed.
    pub fn complete(&mut self) -> Option<String> {
        self.in_flight.take()
    }

    /// Timeout path: no terminator arrived in time. Clears the in-flight
    /// slot so the queue keeps making forward progress, returning the
    /// abandoned command.
    pub fn timed_out(&mut self) -> Option<String> {
        self.in_flight.take()
    }

    /// The command currently awaiting its reply, if any.
    pub fn in_flight(&self) -> Option<&str> {
        self.in_flight.as_deref()
    }

    /// Number of commands still waiting to be sent.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// True when nothing is queued and nothing is in flight.
    pub fn is_idle(&self) -> bool {
        self.in_flight.is_none() && self.pending.is_empty()
    }

    /// Drop all pending commands and the in-flight slot.
    pub fn clear(&mut self) {
        self.pending.clear();
        self.in_flight = None;
    }
}
