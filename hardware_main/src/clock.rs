//! Millisecond plant time: seconds of RTC uptime at boot plus the embassy
//! monotonic clock since boot. The RTC runs from the LSE across resets, so
//! timestamps keep increasing through a warm restart.

use embassy_stm32::rtc::{DateTime, DayOfWeek, Rtc, RtcError};
use embassy_time::Instant;

use business_logic::timestamp::{MILLIS_PER_SECOND, Timestamp};

use crate::fmt::info;

const BACKUP_KEY_INDEX: usize = 0;
/// Present in the backup domain once the RTC holds plant uptime.
const BACKUP_KEY_VALUE: u32 = 0xC411_E250;
/// Uptime zero. March so leap days fall at the end of the computational year.
const EPOCH_YEAR: u16 = 2000;
const SECONDS_PER_DAY: u32 = 86_400;

pub struct PlantClock {
    _rtc: Rtc,
    boot_millis: u64,
}

impl PlantClock {
    /// Reads the uptime already held by the RTC, or starts it from zero on a
    /// cold backup domain.
    pub fn start(mut rtc: Rtc) -> Result<Self, RtcError> {
        let boot_seconds = if rtc.read_backup_register(BACKUP_KEY_INDEX) == Some(BACKUP_KEY_VALUE) {
            let seconds = uptime_seconds(rtc.now()?).unwrap_or(0);
            info!("RTC running, {} s of plant uptime", seconds);
            seconds
        } else {
            info!("RTC cold, starting plant uptime at zero");
            rtc.set_datetime(epoch()?)?;
            rtc.write_backup_register(BACKUP_KEY_INDEX, BACKUP_KEY_VALUE);
            0
        };
        Ok(Self { _rtc: rtc, boot_millis: u64::from(boot_seconds) * MILLIS_PER_SECOND })
    }

    pub fn now(&self) -> Timestamp {
        Timestamp::from_millis(self.boot_millis + Instant::now().as_millis())
    }
}

fn epoch() -> Result<DateTime, RtcError> {
    DateTime::from(EPOCH_YEAR, 3, 1, DayOfWeek::Wednesday, 0, 0, 0).map_err(RtcError::InvalidDateTime)
}

/// Seconds from the epoch to `datetime`. The RTC only stores two year
/// digits, so the century is ignored. `None` before the epoch.
fn uptime_seconds(datetime: DateTime) -> Option<u32> {
    let days = days_since_epoch(datetime.year() % 100, datetime.month(), datetime.day())?;
    let time_of_day = u32::from(datetime.hour()) * 3600 + u32::from(datetime.minute()) * 60 + u32::from(datetime.second());
    Some(days * SECONDS_PER_DAY + time_of_day)
}

/// Days from 00-03-01 in a calendar whose years start in March.
fn days_since_epoch(year: u16, month: u8, day: u8) -> Option<u32> {
    let (year, month) = if month <= 2 {
        (u32::from(year).checked_sub(1)?, u32::from(month) + 9)
    } else {
        (u32::from(year), u32::from(month) - 3)
    };
    let day_of_year = (153 * month + 2) / 5 + u32::from(day) - 1;
    Some(year * 365 + year / 4 + day_of_year)
}
