use rusqlite::{Connection, params};
use std::path::Path;
use tracing::info;

const CREATE_STUDENT_TABLE_SQL: &str = "
CREATE TABLE IF NOT EXISTS student (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name VARCHAR(25),
    course VARCHAR(25),
    section VARCHAR(25),
    marks INTEGER
);
";

const INSERT_STUDENT_SQL: &str =
    "INSERT INTO student (name, course, section, marks) VALUES (?1, ?2, ?3, ?4)";

pub const STUDENTS: &[(&str, &str, &str, i64)] = &[
    ("Student1", "Data Science", "A", 85),
    ("Student2", "Data Science", "B", 90),
    ("Student3", "Data Science", "A", 95),
    ("Student4", "Devops", "C", 80),
    ("Student5", "Devops", "B", 75),
];

/// Creates the demo `student` table at `path` and inserts the fixed rows.
///
/// Running it twice appends the rows again, the table itself is only created once.
pub fn seed_student_database(path: &Path) -> rusqlite::Result<usize> {
    let mut conn = Connection::open(path)?;
    conn.execute_batch(CREATE_STUDENT_TABLE_SQL)?;

    let tx = conn.transaction()?;
    {
        let mut stmt = tx.prepare(INSERT_STUDENT_SQL)?;
        for (name, course, section, marks) in STUDENTS {
            stmt.execute(params![name, course, section, marks])?;
        }
    }
    tx.commit()?;

    info!("Seeded {} students into {}", STUDENTS.len(), path.display());
    Ok(STUDENTS.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_seed_inserts_five_students() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("student.db");

        assert_eq!(seed_student_database(&path).unwrap(), 5);

        let conn = Connection::open(&path).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM student", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 5);

        let devops: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM student WHERE course = 'Devops'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(devops, 2);
    }
}
