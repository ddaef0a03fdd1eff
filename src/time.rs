use std::{fmt, str::FromStr};

use chrono::{NaiveTime, Timelike};

use crate::error::AlarmError;

/// a time of day as zero padded `HH:MM`
///
/// two canonical times are equal exactly when their strings are equal,
/// which is how the alarm compares the target against the wall clock.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalTime(String);

impl CanonicalTime {
    /// truncates to the minute
    #[must_use]
    pub fn from_time(time: NaiveTime) -> Self {
        Self(format!("{:02}:{:02}", time.hour(), time.minute()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CanonicalTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for CanonicalTime {
    type Err = AlarmError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        normalize(s)
    }
}

/// parses a 24 hour `H:MM` or `HH:MM` time into its canonical form
///
/// # Errors
/// [`AlarmError::InvalidTimeFormat`] when the input is not a valid 24 hour time
pub fn normalize(input: &str) -> Result<CanonicalTime, AlarmError> {
    let invalid = || AlarmError::InvalidTimeFormat {
        input: input.to_string(),
    };
    let (hour, minute) = input.split_once(':').ok_or_else(invalid)?;
    if !(1..=2).contains(&hour.len()) || minute.len() != 2 {
        return Err(invalid());
    }
    if !hour.bytes().chain(minute.bytes()).all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let hour = hour.parse().map_err(|_| invalid())?;
    let minute = minute.parse().map_err(|_| invalid())?;
    NaiveTime::from_hms_opt(hour, minute, 0)
        .map(CanonicalTime::from_time)
        .ok_or_else(invalid)
}
