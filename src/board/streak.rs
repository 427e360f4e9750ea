//! Daily completion streak.
//!
//! A streak counts consecutive calendar days with at least one completed
//! task. Only the counter and the date of the last completing day are
//! stored; whether the chain is still alive is decided when it is read.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StreakState {
    pub streak: i64,
    pub last_completed_on: Option<NaiveDate>,
}

impl StreakState {
    /// Apply a task completion that happened on `today`.
    ///
    /// Same day leaves the counter alone, the following day extends it, and
    /// anything else (first completion, a gap, a clock that went backwards)
    /// restarts it at one.
    pub fn record_completion(self, today: NaiveDate) -> StreakState {
        let streak = match self.last_completed_on {
            Some(last) if last == today => self.streak.max(1),
            Some(last) if last.succ_opt() == Some(today) => self.streak + 1,
            _ => 1,
        };
        StreakState {
            streak,
            last_completed_on: Some(today),
        }
    }

    /// The streak as shown to the user on `today`: still alive if the last
    /// completion was today or yesterday, otherwise broken.
    pub fn current(&self, today: NaiveDate) -> i64 {
        match self.last_completed_on {
            Some(last) if last == today || last.succ_opt() == Some(today) => self.streak,
            _ => 0,
        }
    }
}

/// Calendar date of `now` in the given offset.
pub fn local_date(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDate {
    now.with_timezone(&offset).date_naive()
}

/// Today's date in the given offset.
pub fn today(offset: FixedOffset) -> NaiveDate {
    local_date(Utc::now(), offset)
}
