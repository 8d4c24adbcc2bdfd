//! Resolution of the services running on a given service date.
//!
//! A service runs on date `D` when its weekly calendar covers `D`, or when an
//! `Added` exception names `D`. A `Removed` exception for `D` always wins,
//! over both the weekly calendar and any `Added` exception for the same date.

use std::collections::BTreeSet;

use chrono::{Datelike, NaiveDate, Weekday};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection};
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct DaysOfWeek {
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
    pub sunday: bool,
}

impl DaysOfWeek {
    pub fn includes(&self, day: NaiveDate) -> bool {
        match day.weekday() {
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
            Weekday::Sun => self.sunday,
        }
    }
}

/// A row of the canonical `calendar` table.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct WeeklyService {
    pub service_id: String,
    #[sqlx(flatten)]
    pub days: DaysOfWeek,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl WeeklyService {
    pub fn runs_on(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date && self.days.includes(date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExceptionKind {
    Added,
    Removed,
}

impl ExceptionKind {
    pub fn from_code(code: i64) -> Option<Self> {
        match code {
            1 => Some(ExceptionKind::Added),
            2 => Some(ExceptionKind::Removed),
            _ => None,
        }
    }
}

/// A row of the canonical `calendar_dates` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceException {
    pub service_id: String,
    pub date: NaiveDate,
    pub kind: ExceptionKind,
}

/// The service identifiers valid on one service date.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ActiveServices {
    services: BTreeSet<String>,
}

/// Computes the active service set for `date`. Rows for other dates are
/// ignored, so callers may pass unfiltered tables.
pub fn resolve(
    calendars: &[WeeklyService],
    exceptions: &[ServiceException],
    date: NaiveDate,
) -> ActiveServices {
    let mut services: BTreeSet<String> = calendars
        .iter()
        .filter(|c| c.runs_on(date))
        .map(|c| c.service_id.clone())
        .collect();

    let on_date = || exceptions.iter().filter(move |e| e.date == date);
    for exception in on_date().filter(|e| e.kind == ExceptionKind::Added) {
        services.insert(exception.service_id.clone());
    }
    for exception in on_date().filter(|e| e.kind == ExceptionKind::Removed) {
        services.remove(&exception.service_id);
    }

    ActiveServices { services }
}

impl ActiveServices {
    /// Reads the canonical calendar tables and resolves the set for `date`.
    #[tracing::instrument(skip(conn))]
    pub async fn load(conn: &mut SqliteConnection, date: NaiveDate) -> Result<Self, sqlx::Error> {
        let calendars: Vec<WeeklyService> = sqlx::query_as(
            r#"
            SELECT service_id, monday, tuesday, wednesday, thursday, friday, saturday, sunday,
                   start_date, end_date
            FROM calendar
            WHERE start_date <= ? AND end_date >= ?
            "#,
        )
        .bind(date)
        .bind(date)
        .fetch_all(&mut *conn)
        .await?;

        let rows: Vec<(String, NaiveDate, i64)> = sqlx::query_as(
            "SELECT service_id, date, exception_type FROM calendar_dates WHERE date = ?",
        )
        .bind(date)
        .fetch_all(&mut *conn)
        .await?;

        let mut exceptions = Vec::with_capacity(rows.len());
        for (service_id, date, code) in rows {
            match ExceptionKind::from_code(code) {
                Some(kind) => exceptions.push(ServiceException {
                    service_id,
                    date,
                    kind,
                }),
                None => warn!(service_id = %service_id, code, "Ignoring unknown exception_type"),
            }
        }

        let active = resolve(&calendars, &exceptions, date);
        info!(
            calendars = calendars.len(),
            exceptions = exceptions.len(),
            active = active.len(),
            "Resolved active services"
        );
        Ok(active)
    }

    /// Writes the set into the temporary `active_services` table used to
    /// filter stop times.
    pub async fn materialize(&self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query("DROP TABLE IF EXISTS temp.active_services")
            .execute(&mut *conn)
            .await?;
        sqlx::query("CREATE TEMP TABLE active_services (service_id TEXT PRIMARY KEY)")
            .execute(&mut *conn)
            .await?;

        let ids: Vec<&String> = self.services.iter().collect();
        for chunk in ids.chunks(1000) {
            let mut builder =
                QueryBuilder::<Sqlite>::new("INSERT INTO temp.active_services (service_id) ");
            builder.push_values(chunk, |mut row, id| {
                row.push_bind(id.as_str());
            });
            builder.build().execute(&mut *conn).await?;
        }
        debug!(services = self.services.len(), "Materialized active services");
        Ok(())
    }

    pub async fn discard(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query("DROP TABLE IF EXISTS temp.active_services")
            .execute(&mut *conn)
            .await?;
        Ok(())
    }

    pub fn contains(&self, service_id: &str) -> bool {
        self.services.contains(service_id)
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.services.iter().map(String::as_str)
    }
}
