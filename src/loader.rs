//! Generic staged bulk loader.
//!
//! One implementation serves every entity: the [`TableSpec`] supplies the
//! source file, the canonical columns and their coercions, the indexes to
//! drop and recreate, and the row filter. A load runs in five steps:
//!
//! 1. stage the source file into a temporary all-text table,
//! 2. drop the canonical table's secondary indexes,
//! 3. clear the canonical table,
//! 4. page through staging, coerce each row and insert it,
//! 5. recreate the indexes and drop the staging table.
//!
//! The caller owns the transaction; nothing here commits.

use std::path::{Path, PathBuf};
use std::time::Instant;

use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqliteConnection};
use tracing::{debug, info};

use crate::coerce::Value;
use crate::error::{ErrorKind, TransformError};
use crate::schema::{self, ColumnSpec, Entity, RowFilter, TableSpec, quote_ident};

/// Upper bound on bind parameters per statement.
const MAX_BIND_PARAMS: usize = 16_000;

/// Outcome of loading one entity.
#[derive(Debug, Clone, Serialize)]
pub struct LoadReport {
    pub entity: String,
    pub staged_rows: u64,
    pub loaded_rows: u64,
    pub elapsed_ms: u64,
}

/// Replaces the canonical table described by `spec` with the rows of its
/// source file in `feed_dir`.
#[tracing::instrument(skip_all, fields(entity = %spec.entity))]
pub async fn load(
    conn: &mut SqliteConnection,
    spec: &'static TableSpec,
    feed_dir: &Path,
) -> Result<LoadReport, ErrorKind> {
    let source = source_path(spec, feed_dir)?;
    let start = Instant::now();
    info!(file = %source.display(), "Starting load");

    let staging = stage(conn, spec, &source).await?;

    debug!("Dropping indexes");
    schema::drop_indexes(conn, spec).await?;

    let loaded_rows = replace_canonical(conn, spec, &staging).await?;

    debug!("Recreating indexes");
    schema::create_indexes(conn, spec).await?;

    let staged_rows = staging.rows;
    staging.discard(conn).await?;

    let elapsed_ms = start.elapsed().as_millis() as u64;
    info!(staged_rows, loaded_rows, elapsed_ms, "Load finished");

    Ok(LoadReport {
        entity: spec.entity.to_string(),
        staged_rows,
        loaded_rows,
        elapsed_ms,
    })
}

/// Location of the entity's source file, which must exist.
pub fn source_path(spec: &TableSpec, feed_dir: &Path) -> Result<PathBuf, ErrorKind> {
    let path = feed_dir.join(spec.file_name);
    if !path.is_file() {
        return Err(ErrorKind::MissingSourceFile {
            file: spec.file_name,
            dir: feed_dir.to_path_buf(),
        });
    }
    Ok(path)
}

/// A temporary all-text table holding one source file verbatim.
#[derive(Debug)]
pub struct StagingTable {
    name: String,
    headers: Vec<String>,
    rows: u64,
}

impl StagingTable {
    fn has_column(&self, name: &str) -> bool {
        self.headers.iter().any(|h| h == name)
    }

    async fn discard(self, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
        sqlx::query(&format!("DROP TABLE IF EXISTS temp.{}", self.name))
            .execute(&mut *conn)
            .await?;
        Ok(())
    }
}

fn batch_rows(columns: usize) -> usize {
    (MAX_BIND_PARAMS / columns.max(1)).max(1)
}

/// Reads the header, checks required columns, and normalizes names.
fn read_headers<R: std::io::Read>(
    spec: &TableSpec,
    reader: &mut csv::Reader<R>,
) -> Result<Vec<String>, ErrorKind> {
    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .enumerate()
        .map(|(i, h)| {
            let h = if i == 0 { h.trim_start_matches('\u{feff}') } else { h };
            h.trim().to_string()
        })
        .collect();

    if let Some(column) = spec
        .columns
        .iter()
        .find(|c| c.required && !headers.iter().any(|h| h == c.name))
    {
        return Err(TransformError::MissingColumn {
            column: column.name,
        }
        .into());
    }
    Ok(headers)
}

async fn stage(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
    source: &Path,
) -> Result<StagingTable, ErrorKind> {
    let copy_start = Instant::now();
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(source)?;
    let headers = read_headers(spec, &mut reader)?;

    let name = format!("{}_raw", spec.table);
    let quoted: Vec<String> = headers.iter().map(|h| quote_ident(h)).collect();

    debug!(staging = %name, columns = headers.len(), "Creating staging table");
    sqlx::query(&format!("DROP TABLE IF EXISTS temp.{name}"))
        .execute(&mut *conn)
        .await?;
    let column_defs = quoted
        .iter()
        .map(|q| format!("{q} TEXT"))
        .collect::<Vec<_>>()
        .join(", ");
    sqlx::query(&format!("CREATE TEMP TABLE {name} ({column_defs})"))
        .execute(&mut *conn)
        .await?;

    let insert_prefix = format!("INSERT INTO temp.{name} ({}) ", quoted.join(", "));
    let batch_size = batch_rows(headers.len());
    let mut batch: Vec<csv::StringRecord> = Vec::with_capacity(batch_size);
    let mut rows = 0u64;

    for record in reader.records() {
        batch.push(record?);
        if batch.len() == batch_size {
            insert_staging_batch(conn, &insert_prefix, &batch).await?;
            rows += batch.len() as u64;
            batch.clear();
        }
    }
    if !batch.is_empty() {
        insert_staging_batch(conn, &insert_prefix, &batch).await?;
        rows += batch.len() as u64;
    }

    info!(
        staging = %name,
        rows,
        elapsed_ms = copy_start.elapsed().as_millis() as u64,
        "Staged source rows"
    );

    Ok(StagingTable {
        name,
        headers,
        rows,
    })
}

/// Empty fields are staged as NULL.
async fn insert_staging_batch(
    conn: &mut SqliteConnection,
    insert_prefix: &str,
    batch: &[csv::StringRecord],
) -> Result<(), sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(insert_prefix);
    builder.push_values(batch, |mut row, record| {
        for field in record.iter() {
            row.push_bind((!field.is_empty()).then(|| field.to_string()));
        }
    });
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

fn filter_join(filter: RowFilter) -> &'static str {
    match filter {
        RowFilter::All => "",
        RowFilter::ActiveServiceTrips => {
            " JOIN trips t ON t.trip_id = s.trip_id \
             JOIN temp.active_services a ON a.service_id = t.service_id"
        }
    }
}

/// Clears the canonical table and refills it from staging, returning the
/// number of rows inserted.
async fn replace_canonical(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
    staging: &StagingTable,
) -> Result<u64, ErrorKind> {
    let insert_start = Instant::now();
    sqlx::query(&format!("DELETE FROM {}", spec.table))
        .execute(&mut *conn)
        .await?;

    // Optional columns absent from the header are projected as NULL.
    let projection = spec
        .columns
        .iter()
        .map(|c| {
            if staging.has_column(c.name) {
                format!("s.{}", quote_ident(c.name))
            } else {
                "NULL".to_string()
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    let select = format!(
        "SELECT s.rowid, {projection} FROM temp.{} s{} WHERE s.rowid > ? ORDER BY s.rowid LIMIT ?",
        staging.name,
        filter_join(spec.filter)
    );
    let insert_prefix = format!(
        "INSERT INTO {} ({}) ",
        spec.table,
        spec.column_names().collect::<Vec<_>>().join(", ")
    );

    let page_size = batch_rows(spec.columns.len());
    let mut last_rowid = 0i64;
    let mut loaded = 0u64;

    loop {
        let page = sqlx::query(&select)
            .bind(last_rowid)
            .bind(page_size as i64)
            .fetch_all(&mut *conn)
            .await?;
        let Some(last) = page.last() else {
            break;
        };
        last_rowid = last.try_get(0)?;

        let values = page
            .iter()
            .map(|row| transform_row(spec, row))
            .collect::<Result<Vec<_>, _>>()?;
        loaded += values.len() as u64;
        insert_canonical_batch(conn, &insert_prefix, values).await?;
    }

    info!(
        table = spec.table,
        rows = loaded,
        elapsed_ms = insert_start.elapsed().as_millis() as u64,
        "Transformed staging into canonical table"
    );
    Ok(loaded)
}

fn transform_row(spec: &TableSpec, row: &SqliteRow) -> Result<Vec<Value>, ErrorKind> {
    let row_number: i64 = row.try_get(0)?;
    spec.columns
        .iter()
        .enumerate()
        .map(|(i, column)| -> Result<Value, ErrorKind> {
            let token: Option<String> = row.try_get(i + 1)?;
            Ok(coerce_field(column, token.as_deref(), row_number)?)
        })
        .collect()
}

/// Coerces one staged field. `row` is the 1-based data row of the source file.
pub fn coerce_field(
    column: &ColumnSpec,
    token: Option<&str>,
    row: i64,
) -> Result<Value, TransformError> {
    match token {
        None if column.required => Err(TransformError::MissingValue {
            column: column.name,
            row,
        }),
        None => Ok(Value::Null),
        Some(token) => column
            .coercion
            .apply(token)
            .map_err(|source| TransformError::Malformed {
                column: column.name,
                row,
                source,
            }),
    }
}

async fn insert_canonical_batch(
    conn: &mut SqliteConnection,
    insert_prefix: &str,
    rows: Vec<Vec<Value>>,
) -> Result<(), sqlx::Error> {
    let mut builder = QueryBuilder::<Sqlite>::new(insert_prefix);
    builder.push_values(rows, |mut b, row| {
        for value in row {
            match value {
                Value::Null => {
                    b.push_bind(None::<String>);
                }
                Value::Text(text) => {
                    b.push_bind(text);
                }
                Value::Integer(n) => {
                    b.push_bind(n);
                }
                Value::Real(x) => {
                    b.push_bind(x);
                }
                Value::Flag(flag) => {
                    b.push_bind(flag);
                }
                Value::Date(date) => {
                    b.push_bind(date);
                }
            }
        }
    });
    builder.build().execute(&mut *conn).await?;
    Ok(())
}

/// Number of rows currently in an entity's canonical table.
pub async fn canonical_row_count(
    conn: &mut SqliteConnection,
    entity: Entity,
) -> Result<i64, sqlx::Error> {
    sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", entity.spec().table))
        .fetch_one(&mut *conn)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coerce::Coercion;
    use crate::error::TokenError;
    use crate::schema::{CALENDAR, STOP_TIMES};

    #[test]
    fn test_missing_optional_field_is_null() {
        let column = &STOP_TIMES.columns[5];
        assert_eq!(column.name, "pickup_type");
        assert_eq!(coerce_field(column, None, 4), Ok(Value::Null));
    }

    #[test]
    fn test_missing_required_field_names_column_and_row() {
        let column = &STOP_TIMES.columns[4];
        assert_eq!(
            coerce_field(column, None, 12),
            Err(TransformError::MissingValue {
                column: "stop_sequence",
                row: 12
            })
        );
    }

    #[test]
    fn test_malformed_token_carries_location() {
        let column = ColumnSpec {
            name: "arrival_time",
            coercion: Coercion::ClockTime,
            required: false,
        };
        assert_eq!(
            coerce_field(&column, Some("8h05"), 3),
            Err(TransformError::Malformed {
                column: "arrival_time",
                row: 3,
                source: TokenError {
                    expected: "a H:MM:SS time",
                    token: "8h05".to_string(),
                },
            })
        );
    }

    #[test]
    fn test_read_headers_strips_bom_and_checks_required() {
        let data = "\u{feff}service_id,date,exception_type\nWD,20240610,2\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let headers = read_headers(&crate::schema::CALENDAR_DATES, &mut reader).unwrap();
        assert_eq!(headers, vec!["service_id", "date", "exception_type"]);

        let data = "service_id,monday\nWD,1\n";
        let mut reader = csv::Reader::from_reader(data.as_bytes());
        let err = read_headers(&CALENDAR, &mut reader).unwrap_err();
        assert!(matches!(
            err,
            ErrorKind::Transform(TransformError::MissingColumn { column: "tuesday" })
        ));
    }

    #[test]
    fn test_source_path_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = source_path(&STOP_TIMES, dir.path()).unwrap_err();
        assert!(matches!(
            err,
            ErrorKind::MissingSourceFile {
                file: "stop_times.txt",
                ..
            }
        ));
    }

    #[test]
    fn test_batch_rows_respects_bind_limit() {
        assert_eq!(batch_rows(10), 1600);
        assert_eq!(batch_rows(0), MAX_BIND_PARAMS);
        assert!(batch_rows(11) * 11 <= MAX_BIND_PARAMS);
    }
}
