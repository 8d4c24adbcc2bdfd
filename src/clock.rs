//! Service-date clock.
//!
//! Schedules attribute trips that run past midnight to the previous day's
//! service, encoding their times as e.g. `25:30:00`. Until a fixed cutoff in
//! the early morning the clock therefore still reports the previous service
//! date, with elapsed seconds counted from that date's midnight.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use serde::Serialize;

const SECONDS_PER_DAY: u32 = 86_400;

/// A service date plus seconds elapsed since its midnight (may exceed 86400).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ServiceClock {
    pub service_date: NaiveDate,
    pub elapsed_seconds: u32,
}

/// The zone and rollover cutoff that define service days for a feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDayPolicy {
    pub zone: Tz,
    pub cutoff: NaiveTime,
}

impl Default for ServiceDayPolicy {
    fn default() -> Self {
        Self {
            zone: chrono_tz::Australia::Brisbane,
            cutoff: NaiveTime::from_hms_opt(3, 0, 0).unwrap_or_default(),
        }
    }
}

impl ServiceDayPolicy {
    pub fn new(zone: Tz, cutoff: NaiveTime) -> Self {
        Self { zone, cutoff }
    }

    pub fn now(&self) -> ServiceClock {
        self.at(Utc::now())
    }

    pub fn at(&self, instant: DateTime<Utc>) -> ServiceClock {
        self.service_clock_at_local(instant.with_timezone(&self.zone).naive_local())
    }

    pub fn service_clock_at_local(&self, local: NaiveDateTime) -> ServiceClock {
        let time = local.time();
        let clock_seconds = time.num_seconds_from_midnight();

        if time < self.cutoff {
            ServiceClock {
                service_date: local.date() - Duration::days(1),
                elapsed_seconds: clock_seconds + SECONDS_PER_DAY,
            }
        } else {
            ServiceClock {
                service_date: local.date(),
                elapsed_seconds: clock_seconds,
            }
        }
    }
}

/// Parses a cutoff given as `HH:MM` or `HH:MM:SS`.
pub fn parse_cutoff(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| format!("expected HH:MM or HH:MM:SS, found {value:?}"))
}
