//! TIME object decoding (CiA 301 TIME_OF_DAY).

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};

/// Milliseconds field width, the upper 4 bits are reserved.
const MILLISECONDS_MASK: u32 = 0x0FFF_FFFF;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeOfDay {
    /// Milliseconds after midnight.
    pub milliseconds: u32,
    /// Days since 1984-01-01.
    pub days: u16,
}

impl TimeOfDay {
    /// Decodes bytes 0-5. Returns the trailing bytes as well, expected zero.
    pub fn parse(frame: &[u8; 8]) -> (Self, u16) {
        let milliseconds = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let time = Self {
            milliseconds: milliseconds & MILLISECONDS_MASK,
            days: u16::from_le_bytes([frame[4], frame[5]]),
        };
        (time, u16::from_le_bytes([frame[6], frame[7]]))
    }

    pub fn date_time(&self) -> Option<NaiveDateTime> {
        let date = NaiveDate::from_ymd_opt(1984, 1, 1)?.checked_add_days(Days::new(u64::from(self.days)))?;
        let time = NaiveTime::from_num_seconds_from_midnight_opt(
            self.milliseconds / 1000,
            (self.milliseconds % 1000) * 1_000_000,
        )?;
        Some(date.and_time(time))
    }
}
