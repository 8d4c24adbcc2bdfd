//! Canonical table descriptors and schema management.
//!
//! Each entity of the feed is described by a [`TableSpec`]: the source file it
//! is read from, the canonical columns with their coercion rules, the
//! secondary indexes that are dropped around a bulk replace, and an optional
//! row filter applied while transforming out of staging.

use std::fmt;

use sqlx::SqliteConnection;
use tracing::debug;

use crate::coerce::Coercion;

/// A feed entity, in the order the importer loads them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Route,
    Stop,
    Calendar,
    CalendarException,
    Trip,
    Shape,
    StopTime,
}

impl Entity {
    /// Trips need calendars; stop times need trips and the active service set.
    pub const IMPORT_ORDER: [Entity; 7] = [
        Entity::Route,
        Entity::Stop,
        Entity::Calendar,
        Entity::CalendarException,
        Entity::Trip,
        Entity::Shape,
        Entity::StopTime,
    ];

    pub fn spec(self) -> &'static TableSpec {
        match self {
            Entity::Route => &ROUTES,
            Entity::Stop => &STOPS,
            Entity::Calendar => &CALENDAR,
            Entity::CalendarException => &CALENDAR_DATES,
            Entity::Trip => &TRIPS,
            Entity::Shape => &SHAPES,
            Entity::StopTime => &STOP_TIMES,
        }
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.spec().table)
    }
}

#[derive(Debug)]
pub struct TableSpec {
    pub entity: Entity,
    pub file_name: &'static str,
    pub table: &'static str,
    pub columns: &'static [ColumnSpec],
    pub indexes: &'static [IndexSpec],
    pub filter: RowFilter,
}

#[derive(Debug)]
pub struct ColumnSpec {
    /// Canonical column name, also the header name in the source file.
    pub name: &'static str,
    pub coercion: Coercion,
    pub required: bool,
}

#[derive(Debug)]
pub struct IndexSpec {
    pub name: &'static str,
    pub columns: &'static [&'static str],
}

/// Which staged rows make it into the canonical table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFilter {
    All,
    /// Only rows whose trip runs on a service in the `active_services` temp table.
    ActiveServiceTrips,
}

const fn required(name: &'static str, coercion: Coercion) -> ColumnSpec {
    ColumnSpec {
        name,
        coercion,
        required: true,
    }
}

const fn optional(name: &'static str, coercion: Coercion) -> ColumnSpec {
    ColumnSpec {
        name,
        coercion,
        required: false,
    }
}

pub static ROUTES: TableSpec = TableSpec {
    entity: Entity::Route,
    file_name: "routes.txt",
    table: "routes",
    columns: &[
        required("route_id", Coercion::Text),
        optional("route_short_name", Coercion::Text),
        optional("route_long_name", Coercion::Text),
        optional("route_desc", Coercion::Text),
        required("route_type", Coercion::Integer),
        optional("route_url", Coercion::Text),
        optional("route_color", Coercion::Text),
        optional("route_text_color", Coercion::Text),
    ],
    indexes: &[IndexSpec {
        name: "idx_routes_short_name",
        columns: &["route_short_name"],
    }],
    filter: RowFilter::All,
};

pub static STOPS: TableSpec = TableSpec {
    entity: Entity::Stop,
    file_name: "stops.txt",
    table: "stops",
    columns: &[
        required("stop_id", Coercion::Text),
        optional("stop_code", Coercion::Text),
        optional("stop_name", Coercion::Text),
        optional("stop_desc", Coercion::Text),
        optional("stop_lat", Coercion::Real),
        optional("stop_lon", Coercion::Real),
        optional("zone_id", Coercion::Text),
        optional("stop_url", Coercion::Text),
        optional("location_type", Coercion::Integer),
        optional("parent_station", Coercion::Text),
        optional("platform_code", Coercion::Text),
    ],
    indexes: &[IndexSpec {
        name: "idx_stops_lat_lon",
        columns: &["stop_lat", "stop_lon"],
    }],
    filter: RowFilter::All,
};

pub static CALENDAR: TableSpec = TableSpec {
    entity: Entity::Calendar,
    file_name: "calendar.txt",
    table: "calendar",
    columns: &[
        required("service_id", Coercion::Text),
        required("monday", Coercion::Flag),
        required("tuesday", Coercion::Flag),
        required("wednesday", Coercion::Flag),
        required("thursday", Coercion::Flag),
        required("friday", Coercion::Flag),
        required("saturday", Coercion::Flag),
        required("sunday", Coercion::Flag),
        required("start_date", Coercion::Date),
        required("end_date", Coercion::Date),
    ],
    indexes: &[],
    filter: RowFilter::All,
};

pub static CALENDAR_DATES: TableSpec = TableSpec {
    entity: Entity::CalendarException,
    file_name: "calendar_dates.txt",
    table: "calendar_dates",
    columns: &[
        required("service_id", Coercion::Text),
        required("date", Coercion::Date),
        required("exception_type", Coercion::Integer),
    ],
    indexes: &[],
    filter: RowFilter::All,
};

pub static TRIPS: TableSpec = TableSpec {
    entity: Entity::Trip,
    file_name: "trips.txt",
    table: "trips",
    columns: &[
        required("route_id", Coercion::Text),
        required("service_id", Coercion::Text),
        required("trip_id", Coercion::Text),
        optional("trip_headsign", Coercion::Text),
        optional("direction_id", Coercion::Integer),
        optional("block_id", Coercion::Text),
        optional("shape_id", Coercion::Text),
    ],
    indexes: &[
        IndexSpec {
            name: "idx_trips_trip_id",
            columns: &["trip_id"],
        },
        IndexSpec {
            name: "idx_trips_route_id",
            columns: &["route_id"],
        },
        IndexSpec {
            name: "idx_trips_shape_id",
            columns: &["shape_id"],
        },
        IndexSpec {
            name: "idx_trips_trip_route",
            columns: &["trip_id", "route_id"],
        },
    ],
    filter: RowFilter::All,
};

pub static SHAPES: TableSpec = TableSpec {
    entity: Entity::Shape,
    file_name: "shapes.txt",
    table: "shapes",
    columns: &[
        required("shape_id", Coercion::Text),
        required("shape_pt_lat", Coercion::Real),
        required("shape_pt_lon", Coercion::Real),
        required("shape_pt_sequence", Coercion::Integer),
    ],
    indexes: &[IndexSpec {
        name: "idx_shapes_shape_id",
        columns: &["shape_id"],
    }],
    filter: RowFilter::All,
};

pub static STOP_TIMES: TableSpec = TableSpec {
    entity: Entity::StopTime,
    file_name: "stop_times.txt",
    table: "stop_times",
    columns: &[
        required("trip_id", Coercion::Text),
        optional("arrival_time", Coercion::ClockTime),
        optional("departure_time", Coercion::ClockTime),
        optional("stop_id", Coercion::Text),
        required("stop_sequence", Coercion::Integer),
        optional("pickup_type", Coercion::Integer),
        optional("drop_off_type", Coercion::Integer),
    ],
    indexes: &[
        IndexSpec {
            name: "idx_stop_times_stop_id",
            columns: &["stop_id"],
        },
        IndexSpec {
            name: "idx_stop_times_trip_id",
            columns: &["trip_id"],
        },
        IndexSpec {
            name: "idx_stop_times_stop_trip",
            columns: &["stop_id", "trip_id"],
        },
        IndexSpec {
            name: "idx_stop_times_stop_arrival",
            columns: &["stop_id", "arrival_time"],
        },
    ],
    filter: RowFilter::ActiveServiceTrips,
};

/// Quotes an identifier for SQLite, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

impl TableSpec {
    pub fn create_table_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| {
                let not_null = if c.required { " NOT NULL" } else { "" };
                format!("{} {}{}", c.name, c.coercion.sql_type(), not_null)
            })
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS {} ({})", self.table, columns)
    }

    pub fn create_index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|index| {
                format!(
                    "CREATE INDEX IF NOT EXISTS {} ON {} ({})",
                    index.name,
                    self.table,
                    index.columns.join(", ")
                )
            })
            .collect()
    }

    pub fn drop_index_sql(&self) -> Vec<String> {
        self.indexes
            .iter()
            .map(|index| format!("DROP INDEX IF EXISTS {}", index.name))
            .collect()
    }

    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|c| c.name)
    }
}

/// Creates every canonical table and its indexes if they do not exist yet.
pub async fn ensure_schema(conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    for entity in Entity::IMPORT_ORDER {
        let spec = entity.spec();
        sqlx::query(&spec.create_table_sql())
            .execute(&mut *conn)
            .await?;
        create_indexes(conn, spec).await?;
    }
    debug!("Canonical schema ensured");
    Ok(())
}

pub async fn drop_indexes(conn: &mut SqliteConnection, spec: &TableSpec) -> Result<(), sqlx::Error> {
    for sql in spec.drop_index_sql() {
        sqlx::query(&sql).execute(&mut *conn).await?;
    }
    Ok(())
}

pub async fn create_indexes(
    conn: &mut SqliteConnection,
    spec: &TableSpec,
) -> Result<(), sqlx::Error> {
    for sql in spec.create_index_sql() {
        sqlx::query(&sql).execute(&mut *conn).await?;
    }
    Ok(())
}
