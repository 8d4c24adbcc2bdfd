//! Command-line and environment configuration of an import run.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use chrono_tz::Tz;
use clap::Parser;

use crate::clock::{ServiceDayPolicy, parse_cutoff};

#[derive(Parser, Debug, Clone)]
#[command(name = "transit_static_loader")]
#[command(
    about = "Import a static GTFS feed into the canonical schedule tables",
    long_about = None
)]
pub struct ImportConfig {
    /// Feed archive URL, local zip archive, or extracted feed directory
    #[arg(long, env = "GTFS_STATIC_URL", value_name = "URL_OR_PATH")]
    pub source: String,

    /// Working directory for the downloaded archive and extracted files
    #[arg(long, env = "GTFS_WORKDIR", default_value = "work")]
    pub workdir: PathBuf,

    /// SQLite database holding the canonical tables
    #[arg(long, env = "DATABASE_URL", default_value = "sqlite://transit.db")]
    pub database_url: String,

    /// Time zone the feed's service days are defined in
    #[arg(
        long,
        env = "SERVICE_TIMEZONE",
        default_value = "Australia/Brisbane",
        value_parser = parse_timezone
    )]
    pub timezone: Tz,

    /// Local time of day at which the service date rolls over (HH:MM)
    #[arg(
        long,
        env = "SERVICE_DAY_CUTOFF",
        default_value = "03:00",
        value_parser = parse_cutoff
    )]
    pub cutoff: NaiveTime,

    /// Import for this service date (YYYY-MM-DD) instead of the clock's
    #[arg(long, env = "SERVICE_DATE")]
    pub service_date: Option<NaiveDate>,

    /// CSV file to append one import record to
    #[arg(long, env = "IMPORT_HISTORY")]
    pub history: Option<PathBuf>,

    /// Print the import report as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl ImportConfig {
    pub fn policy(&self) -> ServiceDayPolicy {
        ServiceDayPolicy::new(self.timezone, self.cutoff)
    }

    pub fn extract_dir(&self) -> PathBuf {
        self.workdir.join("extracted")
    }
}

fn parse_timezone(value: &str) -> Result<Tz, String> {
    value.parse::<Tz>().map_err(|e| e.to_string())
}
