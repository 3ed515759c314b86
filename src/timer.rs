//! Deterministic timer scheduling.
//!
//! [`TimerWheel`] keeps repeating and one-shot timers against deadlines on a
//! [`Clock`](crate::testing::Clock). Nothing fires on its own: the owner
//! repeatedly calls [`TimerWheel::pop_due`] with the current time and
//! dispatches each tag. Under a mock clock this gives fully reproducible
//! virtual time; under [`SystemClock`] it is pumped from a runtime interval.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::testing::Clock;

/// Wall clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Cancellation handle for a scheduled timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerToken(u64);

#[derive(Debug, Clone)]
struct Timer<T> {
    tag: T,
    deadline: DateTime<Utc>,
    period: Option<Duration>,
}

/// Set of pending timers, each carrying a caller-defined tag.
#[derive(Debug, Clone)]
pub struct TimerWheel<T> {
    next_id: u64,
    timers: BTreeMap<TimerToken, Timer<T>>,
}

impl<T> Default for TimerWheel<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            timers: BTreeMap::new(),
        }
    }
}

impl<T: Clone> TimerWheel<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `tag` every `period`, first at `now + period`.
    ///
    /// Non-positive periods are clamped to one millisecond.
    pub fn schedule_repeating(&mut self, now: DateTime<Utc>, period: Duration, tag: T) -> TimerToken {
        let period = period.max(Duration::milliseconds(1));
        self.insert(Timer {
            tag,
            deadline: now + period,
            period: Some(period),
        })
    }

    /// Fire `tag` once at `deadline`.
    pub fn schedule_at(&mut self, deadline: DateTime<Utc>, tag: T) -> TimerToken {
        self.insert(Timer {
            tag,
            deadline,
            period: None,
        })
    }

    /// Cancel a timer. Returns whether it was still pending.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        self.timers.remove(&token).is_some()
    }

    /// Cancel every pending timer.
    pub fn cancel_all(&mut self) {
        self.timers.clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }

    /// Earliest pending deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<DateTime<Utc>> {
        self.timers.values().map(|t| t.deadline).min()
    }

    /// Take the earliest timer due at or before `now`.
    ///
    /// Ties go to the timer scheduled first. A repeating timer is re-armed
    /// one period later, so a caller that skipped ahead several periods sees
    /// every missed occurrence in deadline order.
    pub fn pop_due(&mut self, now: DateTime<Utc>) -> Option<(TimerToken, T)> {
        let token = self
            .timers
            .iter()
            .filter(|(_, t)| t.deadline <= now)
            .min_by_key(|(token, t)| (t.deadline, **token))
            .map(|(token, _)| *token)?;

        let timer = self.timers.get_mut(&token)?;
        let tag = timer.tag.clone();
        match timer.period {
            Some(period) => timer.deadline += period,
            None => {
                self.timers.remove(&token);
            }
        }
        Some((token, tag))
    }

    fn insert(&mut self, timer: Timer<T>) -> TimerToken {
        let token = TimerToken(self.next_id);
        self.next_id += 1;
        self.timers.insert(token, timer);
        token
    }
}
