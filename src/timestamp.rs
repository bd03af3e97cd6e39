//! MS-DOS date/time handling.
//!
//! ZIP headers store the last-modification time of an entry as two packed
//! 16-bit words in MS-DOS format:
//!
//! ```text
//! time: hhhhh mmmmmm sssss   (seconds stored divided by two)
//! date: yyyyyyy mmmm ddddd   (years since 1980)
//! ```
//!
//! The format has no time zone and a two-second resolution. Values are
//! interpreted as UTC when converting from and to [`SystemTime`].
//!
//! # Example
//!
//! ```rust
//! use zipblock::DosDateTime;
//!
//! let dt = DosDateTime::from_civil(2024, 2, 29, 13, 45, 31).unwrap();
//! assert_eq!(dt.year(), 2024);
//! assert_eq!(dt.second(), 30); // two-second resolution
//!
//! let packed = dt.to_packed();
//! assert_eq!(DosDateTime::from_packed(packed), dt);
//! ```

use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// First year representable in MS-DOS format.
const MIN_YEAR: u16 = 1980;

/// Last year representable in MS-DOS format.
const MAX_YEAR: u16 = 1980 + 127;

const SECONDS_PER_DAY: u64 = 86_400;

/// An MS-DOS date/time as stored in local and central headers.
///
/// The packed words are kept as read so that a header which is never
/// modified serializes back bit-for-bit, even when it holds an out-of-range
/// value such as a zero date.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DosDateTime {
    date: u16,
    time: u16,
}

impl DosDateTime {
    /// The earliest representable instant, 1980-01-01 00:00:00.
    pub const MIN: DosDateTime = DosDateTime {
        date: (1 << 5) | 1,
        time: 0,
    };

    /// Creates a value from the raw header words.
    pub const fn from_parts(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Creates a value from the combined 32-bit form (`date << 16 | time`).
    pub const fn from_packed(packed: u32) -> Self {
        Self {
            date: (packed >> 16) as u16,
            time: packed as u16,
        }
    }

    /// Returns the combined 32-bit form (`date << 16 | time`).
    pub const fn to_packed(&self) -> u32 {
        ((self.date as u32) << 16) | self.time as u32
    }

    /// Returns the raw date word.
    pub const fn date_word(&self) -> u16 {
        self.date
    }

    /// Returns the raw time word.
    pub const fn time_word(&self) -> u16 {
        self.time
    }

    /// Creates a value from calendar fields.
    ///
    /// Returns `None` if any field is out of range or the year cannot be
    /// represented (before 1980 or after 2107). Odd seconds round down.
    pub fn from_civil(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    ) -> Option<Self> {
        if !(MIN_YEAR..=MAX_YEAR).contains(&year)
            || !(1..=12).contains(&month)
            || day == 0
            || day > days_in_month(year, month)
            || hour > 23
            || minute > 59
            || second > 59
        {
            return None;
        }

        let date = ((year - MIN_YEAR) << 9) | ((month as u16) << 5) | day as u16;
        let time = ((hour as u16) << 11) | ((minute as u16) << 5) | (second as u16 / 2);
        Some(Self { date, time })
    }

    /// Converts a [`SystemTime`], clamping to the representable range.
    pub fn from_system_time(time: SystemTime) -> Self {
        let secs = match time.duration_since(UNIX_EPOCH) {
            Ok(d) => d.as_secs(),
            Err(_) => return Self::MIN,
        };

        let days = (secs / SECONDS_PER_DAY) as i64;
        let rem = secs % SECONDS_PER_DAY;
        let (year, month, day) = civil_from_days(days);

        if year < MIN_YEAR as i64 {
            return Self::MIN;
        }
        if year > MAX_YEAR as i64 {
            return Self::from_civil(MAX_YEAR, 12, 31, 23, 59, 58).unwrap_or(Self::MIN);
        }

        Self::from_civil(
            year as u16,
            month,
            day,
            (rem / 3600) as u8,
            ((rem % 3600) / 60) as u8,
            (rem % 60) as u8,
        )
        .unwrap_or(Self::MIN)
    }

    /// Returns the current time.
    pub fn now() -> Self {
        Self::from_system_time(SystemTime::now())
    }

    /// Returns the year.
    pub fn year(&self) -> u16 {
        MIN_YEAR + (self.date >> 9)
    }

    /// Returns the month (1-12 for valid values).
    pub fn month(&self) -> u8 {
        ((self.date >> 5) & 0x0F) as u8
    }

    /// Returns the day of the month (1-31 for valid values).
    pub fn day(&self) -> u8 {
        (self.date & 0x1F) as u8
    }

    /// Returns the hour.
    pub fn hour(&self) -> u8 {
        (self.time >> 11) as u8
    }

    /// Returns the minute.
    pub fn minute(&self) -> u8 {
        ((self.time >> 5) & 0x3F) as u8
    }

    /// Returns the second (always even).
    pub fn second(&self) -> u8 {
        ((self.time & 0x1F) * 2) as u8
    }

    /// Returns true if the packed fields describe a real calendar instant.
    pub fn is_valid(&self) -> bool {
        Self::from_civil(
            self.year(),
            self.month(),
            self.day(),
            self.hour(),
            self.minute(),
            self.second(),
        )
        .is_some()
    }

    /// Converts to a [`SystemTime`], interpreting the value as UTC.
    ///
    /// Invalid values map to [`DosDateTime::MIN`].
    pub fn to_system_time(&self) -> SystemTime {
        let value = if self.is_valid() { *self } else { Self::MIN };
        let days = days_from_civil(value.year() as i64, value.month(), value.day());
        let secs = days as u64 * SECONDS_PER_DAY
            + value.hour() as u64 * 3600
            + value.minute() as u64 * 60
            + value.second() as u64;
        UNIX_EPOCH + Duration::from_secs(secs)
    }
}

impl Default for DosDateTime {
    fn default() -> Self {
        Self::MIN
    }
}

impl From<SystemTime> for DosDateTime {
    fn from(time: SystemTime) -> Self {
        Self::from_system_time(time)
    }
}

fn is_leap_year(year: u16) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

fn days_in_month(year: u16, month: u8) -> u8 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if is_leap_year(year) => 29,
        2 => 28,
        _ => 0,
    }
}

/// Converts days since 1970-01-01 to (year, month, day).
fn civil_from_days(days: i64) -> (i64, u8, u8) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u8;
    let month = if mp < 10 { mp + 3 } else { mp - 9 } as u8;
    let year = yoe + era * 400 + i64::from(month <= 2);
    (year, month, day)
}

/// Converts (year, month, day) to days since 1970-01-01.
fn days_from_civil(year: i64, month: u8, day: u8) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year.rem_euclid(400);
    let month = month as i64;
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}
