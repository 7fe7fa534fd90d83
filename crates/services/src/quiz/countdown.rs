/// Per-question countdown in whole seconds.
///
/// Pure state; whoever owns the timer calls `tick` once per second. Ticks
/// after `cancel` or expiry do nothing, so a late tick can never affect the
/// next question.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Countdown {
    limit: u32,
    remaining: u32,
    running: bool,
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountdownTick {
    Running { remaining: u32 },
    Expired,
    /// Countdown was not running.
    Idle,
}

impl Countdown {
    /// A stopped countdown. Call `restart` to begin.
    #[must_use]
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            remaining: limit,
            running: false,
        }
    }

    #[must_use]
    pub fn limit(&self) -> u32 {
        self.limit
    }

    #[must_use]
    pub fn remaining(&self) -> u32 {
        self.remaining
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Reset to the full limit and start counting.
    pub fn restart(&mut self) {
        self.remaining = self.limit;
        self.running = true;
    }

    pub fn cancel(&mut self) {
        self.running = false;
    }

    pub fn tick(&mut self) -> CountdownTick {
        if !self.running {
            return CountdownTick::Idle;
        }
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining == 0 {
            self.running = false;
            return CountdownTick::Expired;
        }
        CountdownTick::Running {
            remaining: self.remaining,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expires_after_limit_ticks() {
        let mut countdown = Countdown::new(3);
        countdown.restart();
        assert_eq!(countdown.tick(), CountdownTick::Running { remaining: 2 });
        assert_eq!(countdown.tick(), CountdownTick::Running { remaining: 1 });
        assert_eq!(countdown.tick(), CountdownTick::Expired);
        assert_eq!(countdown.tick(), CountdownTick::Idle);
        assert_eq!(countdown.remaining(), 0);
    }

    #[test]
    fn cancelled_countdown_ignores_ticks() {
        let mut countdown = Countdown::new(60);
        countdown.restart();
        countdown.tick();
        countdown.cancel();
        assert_eq!(countdown.tick(), CountdownTick::Idle);
        assert_eq!(countdown.remaining(), 59);

        countdown.restart();
        assert_eq!(countdown.remaining(), 60);
        assert!(countdown.is_running());
    }
}
