use std::time::{Duration, Instant};

/// Fixed-interval tick scheduler for interactive hosts.
///
/// At most one tick is due per interval. A host that falls behind gets one
/// tick and a fresh schedule, never a burst of catch-up ticks.
#[derive(Debug, Clone)]
pub struct FrameClock {
    interval: Duration,
    next_due: Instant,
    paused: bool,
    ticks: u64,
}

impl FrameClock {
    pub fn new(interval: Duration, now: Instant, paused: bool) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            next_due: now,
            paused,
            ticks: 0,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Change the interval; the next tick is due right away.
    pub fn set_interval(&mut self, interval: Duration, now: Instant) {
        self.interval = interval.max(Duration::from_millis(1));
        self.next_due = now;
    }

    pub fn toggle_pause(&mut self, now: Instant) {
        self.paused = !self.paused;
        if !self.paused {
            self.next_due = now;
        }
    }

    /// `true` when a tick is due at `now`; the slot is consumed.
    pub fn poll(&mut self, now: Instant) -> bool {
        if self.paused || now < self.next_due {
            return false;
        }

        self.next_due += self.interval;
        if self.next_due <= now {
            self.next_due = now + self.interval;
        }
        self.ticks += 1;
        true
    }

    /// When the host should wake up next; `None` while paused.
    pub fn next_deadline(&self) -> Option<Instant> {
        (!self.paused).then_some(self.next_due)
    }
}

#[cfg(test)]
mod tests {
    use super::FrameClock;
    use std::time::{Duration, Instant};

    const INTERVAL: Duration = Duration::from_millis(50);

    #[test]
    fn first_poll_ticks_immediately() {
        let now = Instant::now();
        let mut clock = FrameClock::new(INTERVAL, now, false);
        assert!(clock.poll(now));
        assert!(!clock.poll(now));
        assert_eq!(clock.next_deadline(), Some(now + INTERVAL));
    }

    #[test]
    fn one_tick_per_interval() {
        let start = Instant::now();
        let mut clock = FrameClock::new(INTERVAL, start, false);
        let mut ticks = 0;
        for step in 0..100 {
            if clock.poll(start + Duration::from_millis(step * 5)) {
                ticks += 1;
            }
        }
        // 0..=495ms in 5ms steps covers ten 50ms slots.
        assert_eq!(ticks, 10);
        assert_eq!(clock.ticks(), 10);
    }

    #[test]
    fn falling_behind_does_not_burst() {
        let start = Instant::now();
        let mut clock = FrameClock::new(INTERVAL, start, false);
        assert!(clock.poll(start));
        let late = start + Duration::from_secs(3);
        assert!(clock.poll(late));
        assert!(!clock.poll(late));
        assert_eq!(clock.next_deadline(), Some(late + INTERVAL));
    }

    #[test]
    fn paused_clock_never_ticks() {
        let start = Instant::now();
        let mut clock = FrameClock::new(INTERVAL, start, true);
        assert!(!clock.poll(start + Duration::from_secs(10)));
        assert_eq!(clock.next_deadline(), None);

        let resume = start + Duration::from_secs(11);
        clock.toggle_pause(resume);
        assert!(clock.poll(resume));
    }

    #[test]
    fn zero_interval_is_clamped() {
        let clock = FrameClock::new(Duration::ZERO, Instant::now(), false);
        assert_eq!(clock.interval(), Duration::from_millis(1));
    }
}
