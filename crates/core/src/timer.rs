//! Second-granularity countdown.
//!
//! The countdown does not own a clock. A driver calls [`Countdown::tick`] once
//! per wall-clock second and reacts to the returned [`Tick`]; completion is
//! reported exactly once.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownStatus {
    Running,
    Completed,
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    Running { remaining_secs: u32 },
    Completed,
    /// The countdown was not running; nothing happened.
    Idle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Countdown {
    duration_secs: u32,
    remaining_secs: u32,
    elapsed_secs: u32,
    status: CountdownStatus,
}

impl Countdown {
    #[must_use]
    pub fn start(duration_secs: u32) -> Self {
        Self {
            duration_secs,
            remaining_secs: duration_secs,
            elapsed_secs: 0,
            status: CountdownStatus::Running,
        }
    }

    /// Advance by one second. Never counts below zero.
    pub fn tick(&mut self) -> Tick {
        if self.status != CountdownStatus::Running {
            return Tick::Idle;
        }
        if self.remaining_secs > 0 {
            self.remaining_secs -= 1;
            self.elapsed_secs = self.elapsed_secs.saturating_add(1);
        }
        if self.remaining_secs == 0 {
            self.status = CountdownStatus::Completed;
            Tick::Completed
        } else {
            Tick::Running {
                remaining_secs: self.remaining_secs,
            }
        }
    }

    /// Idempotent; a completed countdown stays completed.
    pub fn cancel(&mut self) {
        if self.status == CountdownStatus::Running {
            self.status = CountdownStatus::Cancelled;
        }
    }

    /// Add seconds to the remaining count without touching elapsed time.
    ///
    /// A completed countdown is re-armed with the extra seconds. Returns `false`
    /// for a cancelled countdown or a zero extension.
    pub fn extend(&mut self, extra_secs: u32) -> bool {
        if extra_secs == 0 || self.status == CountdownStatus::Cancelled {
            return false;
        }
        self.remaining_secs = self.remaining_secs.saturating_add(extra_secs);
        self.duration_secs = self.duration_secs.saturating_add(extra_secs);
        self.status = CountdownStatus::Running;
        true
    }

    #[must_use]
    pub fn status(&self) -> CountdownStatus {
        self.status
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.status == CountdownStatus::Running
    }

    #[must_use]
    pub fn remaining_secs(&self) -> u32 {
        self.remaining_secs
    }

    #[must_use]
    pub fn elapsed_secs(&self) -> u32 {
        self.elapsed_secs
    }

    /// Total length including any extensions.
    #[must_use]
    pub fn duration_secs(&self) -> u32 {
        self.duration_secs
    }
}
