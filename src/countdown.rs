use crate::util::format_clock;

/// Remaining time below which the clock is rendered as urgent.
pub const LOW_TIME_SECS: u64 = 300;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// Not running (idle, paused, or already expired).
    Idle,
    /// Still counting; carries the seconds left after the decrement.
    Counting(u64),
    /// The session just ran out. Reported exactly once per countdown.
    Expired,
}

/// countdown clock for a timed session
///
/// Pure state: the runtime calls [`Countdown::tick`] once per second of
/// wall-clock time, and dropping the owner cancels the clock outright.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Countdown {
    pub remaining_secs: u64,
    pub running: bool,
    expired: bool,
    stopped: bool,
}

impl Countdown {
    pub fn start(allowance_secs: u64) -> Self {
        Self {
            remaining_secs: allowance_secs,
            running: true,
            expired: false,
            stopped: false,
        }
    }

    /// Rebuilds a clock from a stored start instant. Time spent away still
    /// counts against the allowance; an overdrawn session comes back with
    /// zero seconds and expires on the first tick.
    pub fn resume_from(allowance_secs: u64, elapsed_secs: u64) -> Self {
        Self {
            remaining_secs: allowance_secs.saturating_sub(elapsed_secs),
            running: true,
            expired: false,
            stopped: false,
        }
    }

    pub fn tick(&mut self) -> Tick {
        if !self.running {
            return Tick::Idle;
        }

        if self.remaining_secs > 0 {
            self.remaining_secs -= 1;
        }

        if self.remaining_secs == 0 {
            self.running = false;
            if self.expired {
                return Tick::Idle;
            }
            self.expired = true;
            return Tick::Expired;
        }

        Tick::Counting(self.remaining_secs)
    }

    pub fn pause(&mut self) {
        self.running = false;
    }

    pub fn resume(&mut self) {
        if !self.expired && !self.stopped {
            self.running = true;
        }
    }

    /// Cancels for good; resume is a no-op afterwards.
    pub fn stop(&mut self) {
        self.running = false;
        self.stopped = true;
    }

    /// Adds granted time to a live clock. Refused once expired or stopped;
    /// a grant that arrives too late only applies to sessions opened after
    /// the next roster fetch.
    pub fn extend(&mut self, extra_secs: u64) -> bool {
        if self.expired || self.stopped {
            return false;
        }
        self.remaining_secs += extra_secs;
        true
    }

    pub fn is_expired(&self) -> bool {
        self.expired
    }

    pub fn low_time(&self) -> bool {
        self.remaining_secs < LOW_TIME_SECS
    }

    pub fn clock(&self) -> String {
        format_clock(self.remaining_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start() {
        let countdown = Countdown::start(1200);

        assert_eq!(countdown.remaining_secs, 1200);
        assert!(countdown.running);
        assert!(!countdown.is_expired());
    }

    #[test]
    fn test_tick_decrements_by_one() {
        let mut countdown = Countdown::start(10);

        assert_eq!(countdown.tick(), Tick::Counting(9));
        assert_eq!(countdown.tick(), Tick::Counting(8));
        assert_eq!(countdown.remaining_secs, 8);
    }

    #[test]
    fn test_expiry_fires_exactly_once() {
        let mut countdown = Countdown::start(2);

        assert_eq!(countdown.tick(), Tick::Counting(1));
        assert_eq!(countdown.tick(), Tick::Expired);
        assert_eq!(countdown.tick(), Tick::Idle);
        assert_eq!(countdown.tick(), Tick::Idle);
        assert!(countdown.is_expired());
        assert!(!countdown.running);
    }

    #[test]
    fn test_long_run_yields_single_expiry() {
        let mut countdown = Countdown::start(1200);
        let mut expiries = 0;

        for _ in 0..1300 {
            if countdown.tick() == Tick::Expired {
                expiries += 1;
            }
        }

        assert_eq!(expiries, 1);
        assert_eq!(countdown.remaining_secs, 0);
    }

    #[test]
    fn test_pause_stops_the_clock() {
        let mut countdown = Countdown::start(10);

        countdown.tick();
        countdown.pause();

        assert_eq!(countdown.tick(), Tick::Idle);
        assert_eq!(countdown.remaining_secs, 9);
    }

    #[test]
    fn test_resume_continues_counting() {
        let mut countdown = Countdown::start(10);

        countdown.pause();
        countdown.tick();
        countdown.resume();

        assert_eq!(countdown.tick(), Tick::Counting(9));
    }

    #[test]
    fn test_resume_after_expiry_is_refused() {
        let mut countdown = Countdown::start(1);

        assert_eq!(countdown.tick(), Tick::Expired);
        countdown.resume();

        assert!(!countdown.running);
        assert_eq!(countdown.tick(), Tick::Idle);
    }

    #[test]
    fn test_stop_ends_ticking() {
        let mut countdown = Countdown::start(10);

        countdown.stop();

        assert_eq!(countdown.tick(), Tick::Idle);
        assert!(!countdown.is_expired());
    }

    #[test]
    fn test_stop_is_permanent() {
        let mut countdown = Countdown::start(10);
        countdown.tick();

        countdown.stop();
        countdown.resume();

        assert!(!countdown.running);
        assert_eq!(countdown.tick(), Tick::Idle);
        assert_eq!(countdown.remaining_secs, 9);
        assert!(!countdown.extend(60));
    }

    #[test]
    fn test_extend_adds_time() {
        let mut countdown = Countdown::start(60);

        assert!(countdown.extend(120));
        assert_eq!(countdown.remaining_secs, 180);
    }

    #[test]
    fn test_extend_after_expiry_is_refused() {
        let mut countdown = Countdown::start(1);

        countdown.tick();
        assert!(!countdown.extend(60));
        assert_eq!(countdown.remaining_secs, 0);
    }

    #[test]
    fn test_resume_from_subtracts_elapsed() {
        let countdown = Countdown::resume_from(1200, 300);

        assert_eq!(countdown.remaining_secs, 900);
        assert!(countdown.running);
    }

    #[test]
    fn test_resume_from_overdrawn_expires_on_first_tick() {
        let mut countdown = Countdown::resume_from(1200, 5000);

        assert_eq!(countdown.remaining_secs, 0);
        assert_eq!(countdown.tick(), Tick::Expired);
        assert_eq!(countdown.tick(), Tick::Idle);
    }

    #[test]
    fn test_low_time_threshold() {
        let mut countdown = Countdown::start(LOW_TIME_SECS + 1);

        assert!(!countdown.low_time());
        countdown.tick();
        // Exactly five minutes left is still calm; urgency starts below.
        assert!(!countdown.low_time());
        countdown.tick();
        assert!(countdown.low_time());
    }

    #[test]
    fn test_clock_format() {
        let countdown = Countdown::start(1200);

        assert_eq!(countdown.clock(), "20:00");
        assert_eq!(Countdown::start(65).clock(), "1:05");
    }
}
