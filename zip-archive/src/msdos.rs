//! MS-DOS date/time codec
//!
//! The container stores modification stamps as the legacy packed pair: a
//! 16-bit date (day, month, year since 1980) and a 16-bit time (two-second
//! units, minute, hour).

use chrono::{Datelike, TimeZone, Timelike, Utc};

/// Milliseconds since the Unix epoch at 1980-01-01 00:00:00 UTC, the
/// earliest stamp the format can express.
const DOS_EPOCH_MILLIS: i64 = 315_532_800_000;

/// A packed MS-DOS date/time pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DosDateTime {
    pub date: u16,
    pub time: u16,
}

impl DosDateTime {
    /// 1980-01-01 00:00:00, the format origin.
    pub const EPOCH: DosDateTime = DosDateTime {
        date: 1 | 1 << 5,
        time: 0,
    };

    pub fn new(date: u16, time: u16) -> Self {
        Self { date, time }
    }

    /// Pack an epoch-milliseconds stamp, at the pair's two-second
    /// resolution. Stamps before 1980 clamp to [`Self::EPOCH`]; stamps past
    /// 2107 clamp to the latest representable second.
    pub fn from_epoch_millis(millis: i64) -> Self {
        let Some(utc) = Utc.timestamp_millis_opt(millis).single() else {
            return Self::EPOCH;
        };

        let year = utc.year();
        if year < 1980 {
            return Self::EPOCH;
        }
        if year > 2107 {
            return Self {
                date: 31 | 12 << 5 | 127 << 9,
                time: 29 | 59 << 5 | 23 << 11,
            };
        }

        Self {
            date: utc.day() as u16 | (utc.month() as u16) << 5 | ((year - 1980) as u16) << 9,
            time: (utc.second() as u16) / 2 | (utc.minute() as u16) << 5 | (utc.hour() as u16) << 11,
        }
    }

    /// Expand back to epoch milliseconds. Calendar values the pair cannot
    /// actually name (month 0, day 32, ...) fall back to the format origin.
    pub fn to_epoch_millis(&self) -> i64 {
        let day = u32::from(self.date & 0x1f);
        let month = u32::from((self.date >> 5) & 0x0f);
        let year = i32::from((self.date >> 9) & 0x7f) + 1980;
        let second = u32::from(self.time & 0x1f) * 2;
        let minute = u32::from((self.time >> 5) & 0x3f);
        let hour = u32::from((self.time >> 11) & 0x1f);

        Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()
            .map(|utc| utc.timestamp_millis())
            .unwrap_or(DOS_EPOCH_MILLIS)
    }
}

impl Default for DosDateTime {
    fn default() -> Self {
        Self::EPOCH
    }
}
