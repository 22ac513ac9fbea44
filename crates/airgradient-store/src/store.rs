//! Main store implementation.

use std::path::Path;

use rusqlite::types::Type;
use rusqlite::{Connection, Row};
use time::OffsetDateTime;
use tracing::{debug, info};

use airgradient_types::{AveragedRecord, DeviceInfo, SensorValues};

use crate::error::{Error, Result};
use crate::queries::ArchiveQuery;
use crate::schema;

/// SQLite-based append-only archive of averaged records.
///
/// Records are kept in strictly increasing timestamp order. The store
/// remembers the newest timestamp so that [`Store::append`] can reject
/// out-of-order records without a round trip.
pub struct Store {
    conn: Connection,
    last_timestamp: Option<i64>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        // Create parent directories if needed
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening archive at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        Self::from_connection(conn)
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        schema::initialize(&conn)?;
        let last_timestamp: Option<i64> =
            conn.query_row("SELECT MAX(timestamp) FROM archive", [], |row| row.get(0))?;
        if let Some(ts) = last_timestamp {
            debug!("Archive ends at {}", ts);
        }
        Ok(Self {
            conn,
            last_timestamp,
        })
    }

    /// Timestamp of the newest record, if any.
    pub fn latest_timestamp(&self) -> Option<i64> {
        self.last_timestamp
    }
}

// Archive operations
impl Store {
    /// Append a record to the archive.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NonMonotonicTimestamp`] if the record is not strictly
    /// newer than the last archived record; the archive is left unchanged.
    pub fn append(&mut self, record: &AveragedRecord) -> Result<()> {
        let timestamp = record.unix_timestamp();
        if let Some(last) = self.last_timestamp
            && timestamp <= last
        {
            return Err(Error::NonMonotonicTimestamp { timestamp, last });
        }

        let sensor_columns = schema::sensor_columns();
        let column_count = 2 + sensor_columns.len() + schema::INFO_COLUMNS.len();
        let placeholders = (1..=column_count)
            .map(|i| format!("?{}", i))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO archive (timestamp, samples, {}, {}) VALUES ({})",
            sensor_columns.join(", "),
            schema::INFO_COLUMNS.join(", "),
            placeholders
        );

        let mut params: Vec<Box<dyn rusqlite::ToSql>> = Vec::with_capacity(column_count);
        params.push(Box::new(timestamp));
        params.push(Box::new(record.samples));
        for (_, value) in record.values.iter() {
            params.push(Box::new(value));
        }
        params.push(Box::new(record.info.serialno.clone()));
        params.push(Box::new(record.info.led_mode.clone()));
        params.push(Box::new(record.info.firmware.clone()));
        params.push(Box::new(record.info.model.clone()));
        params.push(Box::new(record.info.boot));
        params.push(Box::new(record.info.boot_count));

        let params_ref: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        self.conn.execute(&sql, params_ref.as_slice())?;
        self.last_timestamp = Some(timestamp);

        debug!("Archived record at {} ({} samples)", timestamp, record.samples);
        Ok(())
    }

    /// Timestamp of the oldest record, or `None` if the archive is empty.
    pub fn earliest_timestamp(&self) -> Result<Option<i64>> {
        let ts = self
            .conn
            .query_row("SELECT MIN(timestamp) FROM archive", [], |row| row.get(0))?;
        Ok(ts)
    }

    /// Query records, oldest first. See [`ArchiveQuery`] for the boundary rules.
    pub fn query(&self, query: &ArchiveQuery) -> Result<Vec<AveragedRecord>> {
        let columns = format!(
            "timestamp, samples, {}, {}",
            schema::INFO_COLUMNS.join(", "),
            schema::sensor_columns().join(", ")
        );
        let sql = query.build_sql(&columns);
        let (_, params) = query.build_where();

        debug!("Executing query: {}", sql);

        let mut stmt = self.conn.prepare(&sql)?;
        let records = stmt
            .query_map(rusqlite::params_from_iter(params), record_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(records)
    }

    /// Count archived records.
    pub fn count(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM archive", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AveragedRecord> {
    let ts: i64 = row.get("timestamp")?;
    let timestamp = OffsetDateTime::from_unix_timestamp(ts)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Integer, Box::new(e)))?;

    Ok(AveragedRecord {
        values: SensorValues::try_from_fn(|field| row.get(field.key()))?,
        info: DeviceInfo {
            serialno: row.get("serialno")?,
            led_mode: row.get("led_mode")?,
            firmware: row.get("firmware")?,
            model: row.get("model")?,
            boot: row.get("boot")?,
            boot_count: row.get("boot_count")?,
        },
        timestamp,
        samples: row.get("samples")?,
    })
}
