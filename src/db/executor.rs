use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags};
use serde::{Serialize, Serializer};
use std::fmt;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info};

use crate::db::guard::StatementPolicy;

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("SQL Error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("SQL Error: statement would write to the database, but the connection is readonly")]
    WritesUnderReadOnly,
}

/// A single SQLite value as returned to the presenter.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl From<Value> for CellValue {
    fn from(value: Value) -> Self {
        match value {
            Value::Null => CellValue::Null,
            Value::Integer(n) => CellValue::Integer(n),
            Value::Real(f) => CellValue::Real(f),
            Value::Text(s) => CellValue::Text(s),
            Value::Blob(b) => CellValue::Blob(b),
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Null => write!(f, "NULL"),
            CellValue::Integer(n) => write!(f, "{}", n),
            CellValue::Real(x) => write!(f, "{}", x),
            CellValue::Text(s) => write!(f, "{}", s),
            CellValue::Blob(b) => write!(f, "[BLOB {} bytes]", b.len()),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Null => serializer.serialize_none(),
            CellValue::Integer(n) => serializer.serialize_i64(*n),
            CellValue::Real(x) => serializer.serialize_f64(*x),
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Blob(_) => serializer.collect_str(self),
        }
    }
}

/// Columns and rows produced by one statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ResultSet {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<CellValue>>,
    /// Set for statements without result columns (INSERT/UPDATE/DELETE).
    pub rows_affected: Option<usize>,
    pub execution_time_ms: u64,
}

impl ResultSet {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn to_csv(&self) -> Result<Vec<u8>, csv::Error> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for row in &self.rows {
            writer.write_record(row.iter().map(|cell| match cell {
                CellValue::Null => String::new(),
                other => other.to_string(),
            }))?;
        }
        writer.into_inner().map_err(|e| e.into_error().into())
    }
}

/// Opens `db_path` according to `policy` and runs one statement to completion.
pub fn run_query(db_path: &Path, sql: &str, policy: StatementPolicy) -> Result<ResultSet, ExecError> {
    let start_time = Instant::now();

    let access = if policy.is_read_only() {
        OpenFlags::SQLITE_OPEN_READ_ONLY
    } else {
        OpenFlags::SQLITE_OPEN_READ_WRITE
    };
    let conn = Connection::open_with_flags(db_path, access | OpenFlags::SQLITE_OPEN_NO_MUTEX)?;
    debug!("Opened {} ({} connection)", db_path.display(), policy);

    let mut result = execute_on(&conn, sql, policy)?;
    result.execution_time_ms = start_time.elapsed().as_millis() as u64;

    info!(
        "Query executed successfully. Row count: {}, Execution time: {}ms",
        result.row_count(),
        result.execution_time_ms
    );
    Ok(result)
}

fn execute_on(conn: &Connection, sql: &str, policy: StatementPolicy) -> Result<ResultSet, ExecError> {
    let mut stmt = conn.prepare(sql)?;

    // Some writers, VACUUM INTO among them, succeed on a read-only connection
    if policy.is_read_only() && !stmt.readonly() {
        return Err(ExecError::WritesUnderReadOnly);
    }

    let column_count = stmt.column_count();
    if column_count == 0 {
        let changed = stmt.execute([])?;
        return Ok(ResultSet {
            rows_affected: Some(changed),
            ..ResultSet::default()
        });
    }

    let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();

    let mut rows = Vec::new();
    let mut cursor = stmt.query([])?;
    while let Some(row) = cursor.next()? {
        let mut values = Vec::with_capacity(column_count);
        for i in 0..column_count {
            values.push(CellValue::from(row.get::<_, Value>(i)?));
        }
        rows.push(values);
    }

    Ok(ResultSet {
        columns,
        rows,
        rows_affected: None,
        execution_time_ms: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::seed::seed_student_database;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    struct Seeded {
        _dir: TempDir,
        path: std::path::PathBuf,
    }

    #[fixture]
    fn seeded() -> Seeded {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("student.db");
        seed_student_database(&path).unwrap();
        Seeded { _dir: dir, path }
    }

    #[rstest]
    fn test_count_data_science_students(seeded: Seeded) {
        let result = run_query(
            &seeded.path,
            "SELECT COUNT(*) FROM student WHERE course='Data Science'",
            StatementPolicy::ReadOnly,
        )
        .unwrap();

        assert_eq!(result.columns, vec!["COUNT(*)".to_string()]);
        assert_eq!(result.rows, vec![vec![CellValue::Integer(3)]]);
    }

    #[rstest]
    fn test_rows_keep_column_order(seeded: Seeded) {
        let result = run_query(
            &seeded.path,
            "SELECT name, marks FROM student WHERE section = 'A' ORDER BY marks DESC",
            StatementPolicy::ReadOnly,
        )
        .unwrap();

        assert_eq!(result.columns, vec!["name", "marks"]);
        assert_eq!(
            result.rows,
            vec![
                vec![CellValue::Text("Student3".into()), CellValue::Integer(95)],
                vec![CellValue::Text("Student1".into()), CellValue::Integer(85)],
            ]
        );
    }

    #[rstest]
    #[case("SELEC * FROM student")]
    #[case("SELECT * FROM missing_table")]
    #[case("SELECT nope FROM student")]
    fn test_errors_become_messages(seeded: Seeded, #[case] sql: &str) {
        let err = run_query(&seeded.path, sql, StatementPolicy::ReadOnly).unwrap_err();
        let message = err.to_string();
        assert!(message.starts_with("SQL Error: "));
        assert!(message.len() > "SQL Error: ".len());
    }

    #[rstest]
    fn test_empty_result_is_not_an_error(seeded: Seeded) {
        let result = run_query(
            &seeded.path,
            "SELECT * FROM student WHERE course='Nonexistent'",
            StatementPolicy::ReadOnly,
        )
        .unwrap();

        assert!(result.is_empty());
        assert_eq!(result.columns.len(), 5);
    }

    #[rstest]
    fn test_read_only_connection_refuses_writes(seeded: Seeded) {
        let err = run_query(&seeded.path, "DELETE FROM student", StatementPolicy::ReadOnly)
            .unwrap_err();
        assert!(err.to_string().contains("readonly"));

        let count = run_query(&seeded.path, "SELECT COUNT(*) FROM student", StatementPolicy::ReadOnly)
            .unwrap();
        assert_eq!(count.rows[0][0], CellValue::Integer(5));
    }

    #[rstest]
    fn test_read_only_refuses_vacuum_into(seeded: Seeded) {
        let copy = seeded.path.with_file_name("copy.db");
        let sql = format!("VACUUM INTO '{}'", copy.display());

        let err = run_query(&seeded.path, &sql, StatementPolicy::ReadOnly).unwrap_err();

        assert!(matches!(err, ExecError::WritesUnderReadOnly));
        assert!(!copy.exists());
    }

    #[rstest]
    fn test_read_write_reports_affected_rows(seeded: Seeded) {
        let result = run_query(
            &seeded.path,
            "UPDATE student SET marks = marks + 1 WHERE course = 'Devops'",
            StatementPolicy::ReadWrite,
        )
        .unwrap();

        assert!(result.columns.is_empty());
        assert_eq!(result.rows_affected, Some(2));
    }

    #[test]
    fn test_missing_database_is_an_error() {
        let dir = TempDir::new().unwrap();
        let err = run_query(&dir.path().join("absent.db"), "SELECT 1", StatementPolicy::ReadOnly)
            .unwrap_err();
        assert!(err.to_string().starts_with("SQL Error"));
    }

    #[test]
    fn test_csv_export() {
        let result = ResultSet {
            columns: vec!["name".into(), "note".into()],
            rows: vec![
                vec![CellValue::Text("a, b".into()), CellValue::Null],
                vec![CellValue::Text("c".into()), CellValue::Real(1.5)],
            ],
            rows_affected: None,
            execution_time_ms: 0,
        };

        let csv = String::from_utf8(result.to_csv().unwrap()).unwrap();
        assert_eq!(csv, "name,note\n\"a, b\",\nc,1.5\n");
    }

    #[test]
    fn test_cells_serialize_as_plain_json() {
        let row = vec![
            CellValue::Null,
            CellValue::Integer(7),
            CellValue::Text("x".into()),
            CellValue::Blob(vec![1, 2, 3]),
        ];
        assert_eq!(
            serde_json::to_string(&row).unwrap(),
            r#"[null,7,"x","[BLOB 3 bytes]"]"#
        );
    }
}
