//! Logical countdown clock
//!
//! Time is measured in ticks. A session owns one `Clock` and at most one live
//! countdown on it; the runtime ticker calls [`Clock::advance`] once per tick
//! interval while holding the session lock, so clock events and submissions
//! are serialized.

use serde::{Deserialize, Serialize};

/// Identifies one countdown started on a clock
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ClockHandle(u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    Tick { handle: ClockHandle, remaining: u32 },
    Expired { handle: ClockHandle },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Running { remaining: u32 },
    Expired,
    Cancelled,
}

#[derive(Debug, Clone, Default)]
pub struct Clock {
    next_id: u64,
    current: Option<(ClockHandle, Phase)>,
    elapsed: u64,
}

impl Clock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a countdown, cancelling any previous one. Zero is treated as one tick.
    pub fn start(&mut self, duration_ticks: u32) -> ClockHandle {
        let handle = ClockHandle(self.next_id);
        self.next_id += 1;
        self.current = Some((
            handle,
            Phase::Running {
                remaining: duration_ticks.max(1),
            },
        ));
        handle
    }

    /// Stop a countdown. Returns whether a live countdown was stopped;
    /// stale, expired or already cancelled handles are a no-op.
    pub fn cancel(&mut self, handle: ClockHandle) -> bool {
        match self.current {
            Some((live, Phase::Running { .. })) if live == handle => {
                self.current = Some((live, Phase::Cancelled));
                true
            }
            _ => false,
        }
    }

    /// One tick elapses. The final tick of a countdown reports `Expired`
    /// instead of `Tick`, and only once.
    pub fn advance(&mut self) -> Option<ClockEvent> {
        self.elapsed += 1;
        let (handle, phase) = self.current.as_mut()?;
        match *phase {
            Phase::Running { remaining } if remaining <= 1 => {
                *phase = Phase::Expired;
                Some(ClockEvent::Expired { handle: *handle })
            }
            Phase::Running { remaining } => {
                *phase = Phase::Running {
                    remaining: remaining - 1,
                };
                Some(ClockEvent::Tick {
                    handle: *handle,
                    remaining: remaining - 1,
                })
            }
            Phase::Expired | Phase::Cancelled => None,
        }
    }

    pub fn is_live(&self, handle: ClockHandle) -> bool {
        matches!(self.current, Some((live, Phase::Running { .. })) if live == handle)
    }

    pub fn live_handle(&self) -> Option<ClockHandle> {
        match self.current {
            Some((handle, Phase::Running { .. })) => Some(handle),
            _ => None,
        }
    }

    /// Ticks left on the live countdown
    pub fn remaining(&self) -> Option<u32> {
        match self.current {
            Some((_, Phase::Running { remaining })) => Some(remaining),
            _ => None,
        }
    }

    /// Total ticks observed by this clock (monotonic)
    pub fn elapsed(&self) -> u64 {
        self.elapsed
    }
}
