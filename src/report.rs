use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;

use crate::error::ImportError;
use crate::loader::LoadReport;
use crate::schema::Entity;

/// Summary of a successful import run.
#[derive(Debug, Clone, Serialize)]
pub struct ImportReport {
    pub started_at: DateTime<Utc>,
    pub service_date: NaiveDate,
    pub active_services: usize,
    pub loads: Vec<LoadReport>,
    pub elapsed_ms: u64,
}

impl ImportReport {
    pub fn loaded_rows(&self, entity: Entity) -> Option<u64> {
        let name = entity.to_string();
        self.loads
            .iter()
            .find(|l| l.entity == name)
            .map(|l| l.loaded_rows)
    }
}

/// One row of the import history file, written for successes and failures.
#[derive(Debug, Default, Serialize)]
pub struct ImportRecord {
    pub timestamp: DateTime<Utc>,
    pub status: String,
    pub failed_stage: Option<String>,
    pub error_message: Option<String>,
    pub service_date: Option<NaiveDate>,
    pub active_services: Option<usize>,

    // loaded rows per canonical table
    pub routes: Option<u64>,
    pub stops: Option<u64>,
    pub calendar: Option<u64>,
    pub calendar_dates: Option<u64>,
    pub trips: Option<u64>,
    pub shapes: Option<u64>,
    pub stop_times: Option<u64>,

    pub elapsed_ms: Option<u64>,
}

impl ImportRecord {
    pub fn from_report(report: &ImportReport) -> Self {
        ImportRecord {
            timestamp: report.started_at,
            status: "ok".to_string(),
            service_date: Some(report.service_date),
            active_services: Some(report.active_services),
            routes: report.loaded_rows(Entity::Route),
            stops: report.loaded_rows(Entity::Stop),
            calendar: report.loaded_rows(Entity::Calendar),
            calendar_dates: report.loaded_rows(Entity::CalendarException),
            trips: report.loaded_rows(Entity::Trip),
            shapes: report.loaded_rows(Entity::Shape),
            stop_times: report.loaded_rows(Entity::StopTime),
            elapsed_ms: Some(report.elapsed_ms),
            ..Default::default()
        }
    }

    /// Record of a finished run. `service_date` is the date the run was
    /// started for; a failed run has no report to take it from.
    pub fn from_outcome(
        outcome: &Result<ImportReport, ImportError>,
        service_date: NaiveDate,
    ) -> Self {
        match outcome {
            Ok(report) => Self::from_report(report),
            Err(error) => Self::from_error(error, Some(service_date)),
        }
    }

    pub fn from_error(error: &ImportError, service_date: Option<NaiveDate>) -> Self {
        ImportRecord {
            timestamp: Utc::now(),
            status: "failed".to_string(),
            failed_stage: Some(error.stage.to_string()),
            error_message: Some(error.kind.to_string()),
            service_date,
            ..Default::default()
        }
    }
}
