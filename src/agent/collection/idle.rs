use chrono::NaiveDate;

/// Turns raw "seconds since last input" readings into the amount of idle seconds accumulated
/// during a day.
///
/// Only the time beyond the threshold counts as idle. While the user stays idle, every reading
/// adds the delta since the previous reading, so a long idle episode is never counted twice.
#[derive(Debug, Clone, PartialEq)]
pub struct IdleTracker {
    threshold: f64,
    total: f64,
    last_logged: f64,
    day: Option<NaiveDate>,
}

impl IdleTracker {
    pub fn from_seconds(threshold_s: u64) -> Self {
        Self {
            threshold: threshold_s as f64,
            total: 0.,
            last_logged: 0.,
            day: None,
        }
    }

    /// Continues accumulating on top of `total`, which was persisted earlier for `day`.
    pub fn resume(&mut self, day: NaiveDate, total: f64) {
        self.day = Some(day);
        self.total = total.max(0.);
    }

    pub fn is_idle(&self, raw_idle: f64) -> bool {
        raw_idle >= self.threshold
    }

    /// Accounts for a new raw reading and returns the accumulated idle seconds for `today`.
    pub fn check(&mut self, today: NaiveDate, raw_idle: f64) -> f64 {
        self.roll_to(today);
        if self.is_idle(raw_idle) {
            let base = self.last_logged.max(self.threshold);
            self.total += (raw_idle - base).max(0.);
            self.last_logged = raw_idle;
        } else {
            self.last_logged = 0.;
        }
        self.total
    }

    /// Accumulated idle seconds for `today` without a new reading.
    pub fn current(&mut self, today: NaiveDate) -> f64 {
        self.roll_to(today);
        self.total
    }

    /// Forgets everything accumulated so far. Used together with a reset of the stored logs.
    pub fn reset(&mut self) {
        self.total = 0.;
        self.last_logged = 0.;
    }

    fn roll_to(&mut self, today: NaiveDate) {
        match self.day {
            Some(day) if day == today => {}
            Some(_) => {
                // An episode running over midnight keeps its base, only the total restarts.
                self.total = 0.;
                self.day = Some(today);
            }
            None => self.day = Some(today),
        }
    }
}
