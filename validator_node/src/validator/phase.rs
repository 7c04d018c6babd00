//! Epoch phase arithmetic.
//!
//! A cycle is `prepare + prove + wait` seconds long and starts at an anchor
//! timestamp. Everything here is a pure function of `now` and the anchor.

use super::{Result, ValidatorError};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Prepare,
    Prove,
    Wait,
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Phase::Prepare => write!(f, "prepare"),
            Phase::Prove => write!(f, "prove"),
            Phase::Wait => write!(f, "wait"),
        }
    }
}

/// Where to sleep until and which anchor to adopt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Alignment {
    /// Seconds to wait, never negative
    pub wait: i64,
    /// Anchor to adopt before waiting
    pub anchor: i64,
    /// Start of the cycle after `anchor`
    pub next: i64,
}

impl Alignment {
    pub fn wait_duration(&self) -> Duration {
        Duration::from_secs(self.wait.max(0) as u64)
    }
}

/// Phase lengths in whole seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Intervals {
    prepare: i64,
    prove: i64,
    wait: i64,
}

impl Default for Intervals {
    /// 10s prepare, 10s prove, remainder of a two minute cycle waiting
    fn default() -> Self {
        Self {
            prepare: 10,
            prove: 10,
            wait: 100,
        }
    }
}

impl Intervals {
    pub fn new(prepare: Duration, prove: Duration, wait: Duration) -> Result<Self> {
        let secs = |d: Duration| {
            i64::try_from(d.as_secs())
                .map_err(|_| ValidatorError::InvalidIntervals(format!("{:?} is too long", d)))
        };
        let intervals = Self {
            prepare: secs(prepare)?,
            prove: secs(prove)?,
            wait: secs(wait)?,
        };

        match intervals
            .prepare
            .checked_add(intervals.prove)
            .and_then(|s| s.checked_add(intervals.wait))
        {
            Some(cycle) if cycle > 0 => Ok(intervals),
            Some(_) => Err(ValidatorError::InvalidIntervals(
                "cycle length must be positive".to_string(),
            )),
            None => Err(ValidatorError::InvalidIntervals(
                "cycle length overflows".to_string(),
            )),
        }
    }

    pub fn prepare(&self) -> Duration {
        Duration::from_secs(self.prepare as u64)
    }

    pub fn prove(&self) -> Duration {
        Duration::from_secs(self.prove as u64)
    }

    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait as u64)
    }

    pub fn cycle_secs(&self) -> i64 {
        self.prepare + self.prove + self.wait
    }

    /// Seconds into the current cycle, in `[0, cycle)`
    pub fn offset(&self, now: i64, anchor: i64) -> i64 {
        (now as i128 - anchor as i128).rem_euclid(self.cycle_secs() as i128) as i64
    }

    pub fn phase_at(&self, now: i64, anchor: i64) -> Phase {
        let offset = self.offset(now, anchor);
        if offset < self.prepare {
            Phase::Prepare
        } else if offset < self.prepare + self.prove {
            Phase::Prove
        } else {
            Phase::Wait
        }
    }

    /// Inside the prove window, both ends inclusive
    pub fn is_prove_time(&self, now: i64, anchor: i64) -> bool {
        let offset = self.offset(now, anchor);
        self.prepare <= offset && offset <= self.prepare + self.prove
    }

    /// Align to the start of the current cycle and wait for the next one
    /// unless still inside its prepare phase.
    pub fn wait_to_prepare(&self, now: i64, anchor: i64) -> Alignment {
        let cycle = self.cycle_secs();
        let offset = self.offset(now, anchor);
        let wait = if offset >= self.prepare { cycle - offset } else { 0 };
        let anchor = now - offset;

        Alignment {
            wait,
            anchor,
            next: anchor + cycle,
        }
    }

    /// Wait for the prove phase of the current cycle, or of the next one
    /// when it has already passed.
    pub fn wait_to_prove(&self, now: i64, anchor: i64) -> Alignment {
        let cycle = self.cycle_secs();
        let offset = self.offset(now, anchor);

        let (wait, anchor) = if offset < self.prepare {
            (self.prepare - offset, now - offset)
        } else if offset > self.prepare + self.prove {
            (cycle + self.prepare - offset, now - offset + cycle)
        } else {
            (0, anchor)
        };

        Alignment {
            wait,
            anchor,
            next: anchor + cycle,
        }
    }
}
