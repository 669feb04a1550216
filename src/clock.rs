// Copyright (C) 2025 The Mordor Core Contributors
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! Clock & timer wheel (C1). Unlike the teacher's dedicated `timer_thread`
//! (which exists because its scheduler runs across threads), this server is
//! single-threaded and cooperative, so the wheel is driven directly from the
//! C3 loop on every pass: no channel, no second thread, just a wheel that is
//! advanced and drained in place.

use std::time::Duration;

use hierarchical_hash_wheel_timer::wheels::quad_wheel::{PruneDecision, QuadWheelWithOverflow};
use hierarchical_hash_wheel_timer::wheels::TimerEntryWithDelay;
use minstant::Instant;

use moor_task_id::TaskId;

/// Monotonic "now". Never moves backward; wall-clock is consulted
/// separately, only for logging and the daily-boundary timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MonoTime(u64);

impl MonoTime {
    fn from_instant(epoch: Instant, now: Instant) -> Self {
        MonoTime(now.duration_since(epoch).as_micros() as u64)
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_micros(self.0)
    }
}

/// A cooldown timer. `update` never shortens a stronger cooldown already in
/// flight: the new delay is the max of the requested delay and the time
/// already remaining.
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    last_set: MonoTime,
    delay: Duration,
}

impl Timer {
    pub fn new(now: MonoTime, delay: Duration) -> Self {
        Timer {
            last_set: now,
            delay,
        }
    }

    pub fn expired(now: MonoTime) -> Self {
        Timer {
            last_set: now,
            delay: Duration::ZERO,
        }
    }

    /// `max(0, delay - (now - last_set))`.
    pub fn time_left(&self, now: MonoTime) -> Duration {
        let elapsed = now.as_duration().saturating_sub(self.last_set.as_duration());
        self.delay.saturating_sub(elapsed)
    }

    pub fn is_expired(&self, now: MonoTime) -> bool {
        self.time_left(now).is_zero()
    }

    /// A new, stricter cooldown never shortens a stronger one already
    /// running: the delay becomes `max(new_delay, remaining)`.
    pub fn update(&mut self, now: MonoTime, new_delay: Duration) {
        let remaining = self.time_left(now);
        self.last_set = now;
        self.delay = new_delay.max(remaining);
    }
}

/// Wall-clock anchor for "day boundary" events (daily counter resets).
/// Consulted only at tick time, never substituted for the monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct DailyAnchor {
    last_day: i64,
}

impl DailyAnchor {
    pub fn new(now: chrono::DateTime<chrono::Utc>) -> Self {
        DailyAnchor {
            last_day: now.date_naive().num_days_from_ce() as i64,
        }
    }

    /// Returns true (and advances the anchor) the first time this is called
    /// after the wall-clock date has rolled over.
    pub fn crossed_boundary(&mut self, now: chrono::DateTime<chrono::Utc>) -> bool {
        let day = now.date_naive().num_days_from_ce() as i64;
        if day != self.last_day {
            self.last_day = day;
            true
        } else {
            false
        }
    }
}

use chrono::Datelike;

/// Entry queued in the wheel: a task-style identifier paired with its delay.
/// `task_id` is opaque to the clock; callers attach whatever meaning they
/// need (a player id, a monster id, a scheduler job label hash).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct WheelEntry {
    id: TaskId,
    delay: Duration,
}

impl TimerEntryWithDelay for WheelEntry {
    fn delay(&self) -> Duration {
        self.delay
    }
}

/// The clock: an epoch instant plus a hash wheel of pending expirations.
/// Owned by the tick scheduler (C7) and advanced once per C3 loop pass.
pub struct Clock {
    epoch: Instant,
    wheel: QuadWheelWithOverflow<WheelEntry>,
    last_advance: Instant,
}

impl Clock {
    pub fn new() -> Self {
        let epoch = Instant::now();
        Clock {
            epoch,
            wheel: QuadWheelWithOverflow::new(|_| PruneDecision::Keep),
            last_advance: epoch,
        }
    }

    pub fn now(&self) -> MonoTime {
        MonoTime::from_instant(self.epoch, Instant::now())
    }

    /// Schedule `id` to be returned by `drain_expired` once `delay` elapses.
    pub fn schedule(&mut self, id: TaskId, delay: Duration) {
        let entry = WheelEntry { id, delay };
        if let Err(e) = self.wheel.insert_with_delay(entry, delay) {
            tracing::warn!(?e, ?id, "failed to insert timer into wheel");
        }
    }

    /// Advance the wheel by however much wall time has passed since the
    /// last call, returning every id whose delay has elapsed. Called once
    /// per C3 loop pass — never drifts, never catches up missed advances
    /// beyond what elapsed wall time actually accounts for.
    pub fn drain_expired(&mut self) -> Vec<TaskId> {
        let now = Instant::now();
        let elapsed_ms = now.duration_since(self.last_advance).as_millis() as u64;
        self.last_advance = now;

        let mut expired = Vec::new();
        for _ in 0..elapsed_ms {
            for entry in self.wheel.tick() {
                expired.push(entry.id);
            }
        }
        expired
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// A tiny id newtype so `clock` doesn't depend on the scheduler or world
/// modules; they convert their own ids into this at the call site.
pub mod moor_task_id {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TaskId(pub u64);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_left_is_bounded_by_delay_and_never_negative() {
        let now = MonoTime(1_000_000);
        let t = Timer::new(now, Duration::from_secs(5));
        assert_eq!(t.time_left(now), Duration::from_secs(5));

        let later = MonoTime(now.0 + 3_000_000);
        let left = t.time_left(later);
        assert!(left <= Duration::from_secs(5));
        assert!(left >= Duration::ZERO);

        let way_later = MonoTime(now.0 + 10_000_000);
        assert_eq!(t.time_left(way_later), Duration::ZERO);
        assert!(t.is_expired(way_later));
    }

    #[test]
    fn update_never_shortens_a_stronger_cooldown() {
        let t0 = MonoTime(0);
        let mut t = Timer::new(t0, Duration::from_secs(10));

        // Advance 2s in, then try to set a weaker 1s cooldown: the stronger
        // ~8s remaining should win.
        let t1 = MonoTime(2_000_000);
        t.update(t1, Duration::from_secs(1));
        let left = t.time_left(t1);
        assert!(left >= Duration::from_secs(7));
    }

    #[test]
    fn update_accepts_a_longer_cooldown() {
        let t0 = MonoTime(0);
        let mut t = Timer::new(t0, Duration::from_secs(1));
        t.update(t0, Duration::from_secs(30));
        assert_eq!(t.time_left(t0), Duration::from_secs(30));
    }

    #[test]
    fn daily_anchor_crosses_boundary_once() {
        let d0 = chrono::Utc::now();
        let mut anchor = DailyAnchor::new(d0);
        assert!(!anchor.crossed_boundary(d0));

        let tomorrow = d0 + chrono::Duration::days(1);
        assert!(anchor.crossed_boundary(tomorrow));
        assert!(!anchor.crossed_boundary(tomorrow));
    }

    #[test]
    fn clock_never_moves_backward() {
        let clock = Clock::new();
        let a = clock.now();
        std::thread::sleep(Duration::from_millis(2));
        let b = clock.now();
        assert!(b >= a);
    }

    #[test]
    fn scheduled_entries_expire_after_their_delay() {
        let mut clock = Clock::new();
        clock.schedule(TaskId(1), Duration::from_millis(5));
        std::thread::sleep(Duration::from_millis(20));
        let expired = clock.drain_expired();
        assert_eq!(expired, vec![TaskId(1)]);
    }
}
