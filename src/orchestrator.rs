//! Sequencing of the entity loaders inside one unit of work.

use std::path::Path;
use std::time::Instant;

use chrono::{NaiveDate, Utc};
use sqlx::{Connection, SqliteConnection};
use tracing::{info, warn};

use crate::active_service::ActiveServices;
use crate::error::{AtStage, ImportError, Stage};
use crate::loader::{self, LoadReport};
use crate::report::ImportReport;
use crate::schema::{self, Entity, RowFilter};

/// Runs every entity loader, in dependency order, inside a single
/// transaction on the session connection. Either all seven canonical tables
/// reflect the new feed or none of them changed.
#[derive(Debug, Clone, Copy)]
pub struct ImportOrchestrator {
    service_date: NaiveDate,
}

impl ImportOrchestrator {
    pub fn new(service_date: NaiveDate) -> Self {
        Self { service_date }
    }

    /// Fails on the first entity whose source file is absent, before any
    /// database work starts.
    pub fn preflight(feed_dir: &Path) -> Result<(), ImportError> {
        for entity in Entity::IMPORT_ORDER {
            loader::source_path(entity.spec(), feed_dir).at(Stage::Load(entity))?;
        }
        Ok(())
    }

    #[tracing::instrument(
        skip_all,
        fields(service_date = %self.service_date, feed_dir = %feed_dir.display())
    )]
    pub async fn import(
        &self,
        conn: &mut SqliteConnection,
        feed_dir: &Path,
    ) -> Result<ImportReport, ImportError> {
        Self::preflight(feed_dir)?;

        let started_at = Utc::now();
        let start = Instant::now();
        info!("Starting import");

        let mut tx = conn.begin().await.at(Stage::Connect)?;
        let outcome = self.load_all(&mut tx, feed_dir).await;
        match outcome {
            Ok((active_services, loads)) => {
                tx.commit().await.at(Stage::Commit)?;
                let report = ImportReport {
                    started_at,
                    service_date: self.service_date,
                    active_services,
                    loads,
                    elapsed_ms: start.elapsed().as_millis() as u64,
                };
                info!(
                    active_services = report.active_services,
                    elapsed_ms = report.elapsed_ms,
                    "Import committed"
                );
                Ok(report)
            }
            Err(err) => {
                if let Err(rollback_err) = tx.rollback().await {
                    warn!(error = %rollback_err, "Rollback failed");
                }
                Err(err)
            }
        }
    }

    async fn load_all(
        &self,
        conn: &mut SqliteConnection,
        feed_dir: &Path,
    ) -> Result<(usize, Vec<LoadReport>), ImportError> {
        schema::ensure_schema(conn).await.at(Stage::Schema)?;

        let mut loads = Vec::with_capacity(Entity::IMPORT_ORDER.len());
        let mut active_services = 0;

        for entity in Entity::IMPORT_ORDER {
            let spec = entity.spec();

            // Resolved from the calendar tables loaded earlier in this transaction.
            if spec.filter == RowFilter::ActiveServiceTrips {
                let active = ActiveServices::load(conn, self.service_date)
                    .await
                    .at(Stage::ResolveActiveServices)?;
                if active.is_empty() {
                    warn!(service_date = %self.service_date, "No services are active on the service date");
                }
                active
                    .materialize(conn)
                    .await
                    .at(Stage::ResolveActiveServices)?;
                active_services = active.len();
            }

            let report = loader::load(conn, spec, feed_dir)
                .await
                .at(Stage::Load(entity))?;
            loads.push(report);
        }

        ActiveServices::discard(conn)
            .await
            .at(Stage::ResolveActiveServices)?;
        Ok((active_services, loads))
    }
}
