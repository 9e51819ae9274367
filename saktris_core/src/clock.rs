//! Per-side countdown clock with optional Fischer increment.
//!
//! The clock never spawns a timer of its own: the host loop calls
//! [`ChessClock::tick`] with the frame delta, and only the running side's
//! time moves. Expiry and the low/critical warnings come back as events
//! from `tick` for the game to forward.

use std::time::Duration;

use arrayvec::ArrayVec;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::board::Side;

pub const DEFAULT_LOW_THRESHOLD: Duration = Duration::from_secs(30);
pub const DEFAULT_CRITICAL_THRESHOLD: Duration = Duration::from_secs(10);

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockError {
    #[error("clock has not been configured")]
    NotConfigured,
    #[error("clock is not in a startable state")]
    NotStartable,
    #[error("clock is not running")]
    NotRunning,
}

/// Where the clock is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum ClockState {
    Unconfigured,
    /// Time is set but the countdown has not started.
    Ready,
    Running { side: Side },
    Paused { side: Side },
    Expired { side: Side },
}

/// What a call to [`ChessClock::tick`] observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// The running side's flag fell.
    Expired { side: Side },
    /// The running side first dropped below the low threshold.
    LowTime { side: Side, remaining: Duration },
    /// The running side first dropped below the critical threshold.
    CriticalTime { side: Side, remaining: Duration },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChessClock {
    state: ClockState,
    remaining: [Duration; 2],
    increment: Duration,
    low_threshold: Duration,
    critical_threshold: Duration,
    low_warned: [bool; 2],
    critical_warned: [bool; 2],
}

impl Default for ChessClock {
    fn default() -> Self {
        Self {
            state: ClockState::Unconfigured,
            remaining: [Duration::ZERO; 2],
            increment: Duration::ZERO,
            low_threshold: DEFAULT_LOW_THRESHOLD,
            critical_threshold: DEFAULT_CRITICAL_THRESHOLD,
            low_warned: [false; 2],
            critical_warned: [false; 2],
        }
    }
}

impl ChessClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets both sides to `initial` and arms the clock. Warning state
    /// resets: each warning fires at most once per side per game.
    pub fn configure(&mut self, initial: Duration, increment: Duration) {
        self.state = ClockState::Ready;
        self.remaining = [initial; 2];
        self.increment = increment;
        self.low_warned = [false; 2];
        self.critical_warned = [false; 2];
    }

    /// Adjusts the warning thresholds. Values at or below zero disable the
    /// corresponding warning.
    pub fn set_thresholds(&mut self, low: Duration, critical: Duration) {
        self.low_threshold = low;
        self.critical_threshold = critical;
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state, ClockState::Running { .. })
    }

    pub fn time_remaining(&self, side: Side) -> Duration {
        self.remaining[side.index()]
    }

    /// Overrides one side's remaining time; save-file loading uses this.
    pub fn set_time(&mut self, side: Side, value: Duration) {
        self.remaining[side.index()] = value;
    }

    /// Starts the countdown with White to move.
    pub fn start(&mut self) -> Result<(), ClockError> {
        match self.state {
            ClockState::Ready => {
                self.state = ClockState::Running { side: Side::White };
                Ok(())
            }
            ClockState::Unconfigured => Err(ClockError::NotConfigured),
            _ => Err(ClockError::NotStartable),
        }
    }

    /// Credits the increment to the side that just moved, then hands the
    /// countdown to the opponent.
    pub fn switch_side(&mut self) -> Result<(), ClockError> {
        match self.state {
            ClockState::Running { side } => {
                self.remaining[side.index()] += self.increment;
                self.state = ClockState::Running { side: side.flip() };
                Ok(())
            }
            _ => Err(ClockError::NotRunning),
        }
    }

    pub fn pause(&mut self) -> Result<(), ClockError> {
        match self.state {
            ClockState::Running { side } => {
                self.state = ClockState::Paused { side };
                Ok(())
            }
            _ => Err(ClockError::NotRunning),
        }
    }

    pub fn resume(&mut self) -> Result<(), ClockError> {
        match self.state {
            ClockState::Paused { side } => {
                self.state = ClockState::Running { side };
                Ok(())
            }
            _ => Err(ClockError::NotRunning),
        }
    }

    /// Advances the running side's countdown by the host loop's frame
    /// delta. Anything noteworthy that happened comes back as events; a
    /// paused, ready or expired clock ignores ticks entirely.
    pub fn tick(&mut self, delta: Duration) -> ArrayVec<ClockEvent, 2> {
        let mut events = ArrayVec::new();

        let ClockState::Running { side } = self.state else {
            return events;
        };

        let index = side.index();
        let remaining = self.remaining[index].saturating_sub(delta);
        self.remaining[index] = remaining;

        if remaining.is_zero() {
            self.state = ClockState::Expired { side };
            events.push(ClockEvent::Expired { side });
            return events;
        }

        if !self.critical_warned[index]
            && !self.critical_threshold.is_zero()
            && remaining <= self.critical_threshold
        {
            self.critical_warned[index] = true;
            // Skip straight to critical; the low warning would be noise now.
            self.low_warned[index] = true;
            events.push(ClockEvent::CriticalTime { side, remaining });
        } else if !self.low_warned[index]
            && !self.low_threshold.is_zero()
            && remaining <= self.low_threshold
        {
            self.low_warned[index] = true;
            events.push(ClockEvent::LowTime { side, remaining });
        }

        events
    }
}
