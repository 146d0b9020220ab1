use super::bootstrap::{self, LiveColumn};
use duckdb::types::ValueRef;
use duckdb::{AccessMode, Config, Connection};
use serde::Serialize;
use serde_json::{Number, Value as JsonValue};
use std::error::Error;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, error, info};

/// Days from 0001-01-01 to 1970-01-01, for DuckDB DATE values.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

/// The store rejected or failed a statement. Carries the store's own message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryExecutionError(pub String);

impl fmt::Display for QueryExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for QueryExecutionError {}

impl From<duckdb::Error> for QueryExecutionError {
    fn from(e: duckdb::Error) -> Self {
        QueryExecutionError(e.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<JsonValue>>,
    pub execution_time_ms: u64,
}

impl ResultSet {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Plain-text table of at most `limit` rows, used as model input.
    pub fn to_text_table(&self, limit: usize) -> String {
        let cells: Vec<Vec<String>> = self
            .rows
            .iter()
            .take(limit)
            .map(|row| row.iter().map(display_value).collect())
            .collect();

        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &cells {
            for (i, cell) in row.iter().enumerate() {
                if let Some(w) = widths.get_mut(i) {
                    *w = (*w).max(cell.chars().count());
                }
            }
        }

        let render = |values: &[String]| -> String {
            values
                .iter()
                .zip(&widths)
                .map(|(v, w)| format!("{:<width$}", v, width = *w))
                .collect::<Vec<_>>()
                .join("  ")
                .trim_end()
                .to_string()
        };

        let mut out = render(&self.columns);
        for row in &cells {
            out.push('\n');
            out.push_str(&render(row));
        }
        out
    }
}

fn display_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Runs statements against the DuckDB file, one connection per call.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    db_path: PathBuf,
    read_only: bool,
}

impl QueryExecutor {
    pub fn new(db_path: impl Into<PathBuf>, read_only: bool) -> Self {
        Self {
            db_path: db_path.into(),
            read_only,
        }
    }

    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn open(&self) -> Result<Connection, duckdb::Error> {
        if self.read_only {
            let config = Config::default().access_mode(AccessMode::ReadOnly)?;
            Connection::open_with_flags(&self.db_path, config)
        } else {
            Connection::open(&self.db_path)
        }
    }

    /// Blocking execution; call from `spawn_blocking` in async code.
    pub fn execute_blocking(&self, sql: &str) -> Result<ResultSet, QueryExecutionError> {
        let start_time = Instant::now();
        debug!("Executing against {}: {}", self.db_path.display(), sql);

        let conn = self.open().map_err(|e| {
            error!("Failed to open database at {}: {}", self.db_path.display(), e);
            QueryExecutionError(format!("Database connection error: {}", e))
        })?;

        let mut stmt = conn.prepare(sql)?;
        let mut rows = stmt.query([])?;
        let columns = rows
            .as_ref()
            .map(|stmt| stmt.column_names())
            .unwrap_or_default();

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Vec::with_capacity(columns.len());
            for i in 0..columns.len() {
                values.push(to_json(row.get_ref(i)?));
            }
            out.push(values);
        }

        let execution_time_ms = start_time.elapsed().as_millis() as u64;
        info!(
            "Query executed successfully. Row count: {}, Execution time: {}ms",
            out.len(),
            execution_time_ms
        );

        Ok(ResultSet {
            columns,
            rows: out,
            execution_time_ms,
        })
    }

    pub async fn execute(&self, sql: &str) -> Result<ResultSet, QueryExecutionError> {
        let executor = self.clone();
        let sql = sql.to_string();

        tokio::task::spawn_blocking(move || executor.execute_blocking(&sql))
            .await
            .map_err(|join_err| {
                error!("Task join error: {}", join_err);
                QueryExecutionError(format!("Database task execution failed: {}", join_err))
            })?
    }

    /// Live column list of `table`, read through the same connection mode.
    pub async fn describe_table(&self, table: &str) -> Result<Vec<LiveColumn>, QueryExecutionError> {
        let executor = self.clone();
        let table = table.to_string();

        tokio::task::spawn_blocking(move || -> Result<Vec<LiveColumn>, QueryExecutionError> {
            let conn = executor.open()?;
            Ok(bootstrap::describe_table(&conn, &table)?)
        })
        .await
        .map_err(|join_err| QueryExecutionError(format!("Database task execution failed: {}", join_err)))?
    }
}

fn float(v: f64) -> JsonValue {
    Number::from_f64(v).map(JsonValue::Number).unwrap_or(JsonValue::Null)
}

fn to_json(value: ValueRef<'_>) -> JsonValue {
    match value {
        ValueRef::Null => JsonValue::Null,
        ValueRef::Boolean(b) => JsonValue::Bool(b),
        ValueRef::TinyInt(v) => v.into(),
        ValueRef::SmallInt(v) => v.into(),
        ValueRef::Int(v) => v.into(),
        ValueRef::BigInt(v) => v.into(),
        ValueRef::HugeInt(v) => i64::try_from(v)
            .map(JsonValue::from)
            .unwrap_or_else(|_| JsonValue::String(v.to_string())),
        ValueRef::UTinyInt(v) => v.into(),
        ValueRef::USmallInt(v) => v.into(),
        ValueRef::UInt(v) => v.into(),
        ValueRef::UBigInt(v) => v.into(),
        ValueRef::Float(v) => float(v as f64),
        ValueRef::Double(v) => float(v),
        ValueRef::Decimal(d) => {
            let text = d.to_string();
            text.parse::<f64>().map(float).unwrap_or(JsonValue::String(text))
        }
        ValueRef::Text(bytes) => JsonValue::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Date32(days) => chrono::NaiveDate::from_num_days_from_ce_opt(
            days + UNIX_EPOCH_DAYS_FROM_CE,
        )
        .map(|d| JsonValue::String(d.to_string()))
        .unwrap_or(JsonValue::Null),
        other => JsonValue::String(format!("{:?}", other)),
    }
}
