use crate::pipeline::schema::STUDENT_SCHEMA;
use duckdb::Connection;
use serde::Serialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveColumn {
    pub name: String,
    pub data_type: String,
    pub nullable: bool,
}

/// Creates the STUDENT table if it does not exist yet. Uses its own
/// read-write connection and closes it before returning.
pub fn ensure_schema(db_path: &Path) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            info!("Creating database directory: {}", parent.display());
            std::fs::create_dir_all(parent)?;
        }
    }

    let conn = Connection::open(db_path)?;
    conn.execute_batch(&STUDENT_SCHEMA.create_table_sql())?;

    let rows: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {}", STUDENT_SCHEMA.table),
        [],
        |row| row.get(0),
    )?;
    info!(
        "Table {} ready in {} ({} rows)",
        STUDENT_SCHEMA.table,
        db_path.display(),
        rows
    );

    Ok(())
}

/// Reads the live column list of `table` from the store.
pub fn describe_table(conn: &Connection, table: &str) -> Result<Vec<LiveColumn>, duckdb::Error> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info(\"{}\")", table.replace('"', "\"\"")))?;
    let columns = stmt
        .query_map([], |row| {
            Ok(LiveColumn {
                name: row.get::<_, String>(1)?,
                data_type: row.get::<_, String>(2)?,
                nullable: !row.get::<_, bool>(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(columns)
}
