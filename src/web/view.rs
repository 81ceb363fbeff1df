use minijinja::HtmlEscape;
use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

use crate::pipeline::{QueryReport, Stage};

pub const NO_DATA_MESSAGE: &str = "No data returned.";

/// What the result area of the page shows for one request.
#[derive(Debug, Serialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResultView {
    Table {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
        execution_time_ms: u64,
    },
    NoData {
        message: String,
        rows_affected: Option<usize>,
    },
    Error {
        stage: Stage,
        message: String,
    },
}

impl ResultView {
    pub fn from_report(report: &QueryReport) -> Self {
        match &report.outcome {
            Ok(result) if result.is_empty() => ResultView::NoData {
                message: match result.rows_affected {
                    Some(n) => format!("{} rows affected.", n),
                    None => NO_DATA_MESSAGE.to_string(),
                },
                rows_affected: result.rows_affected,
            },
            Ok(result) => ResultView::Table {
                columns: result.columns.clone(),
                rows: result
                    .rows
                    .iter()
                    .map(|row| row.iter().map(|cell| cell.to_string()).collect())
                    .collect(),
                execution_time_ms: result.execution_time_ms,
            },
            Err(e) => ResultView::Error {
                stage: e.stage(),
                message: e.to_string(),
            },
        }
    }
}

static SQL_KEYWORD: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(SELECT|DISTINCT|FROM|WHERE|AND|OR|NOT|IN|IS|NULL|LIKE|BETWEEN|AS|ON|JOIN|INNER|LEFT|RIGHT|OUTER|CROSS|GROUP|BY|ORDER|HAVING|LIMIT|OFFSET|UNION|ALL|WITH|CASE|WHEN|THEN|ELSE|END|ASC|DESC|COUNT|SUM|AVG|MIN|MAX|INSERT|INTO|VALUES|UPDATE|SET|DELETE|EXPLAIN)\b",
    )
    .expect("keyword pattern is valid")
});

/// Escapes `sql` for HTML and wraps keywords in `<span class="kw">`.
pub fn highlight_sql(sql: &str) -> String {
    // Keywords never match inside an escape entity
    let escaped = HtmlEscape(sql).to_string();
    SQL_KEYWORD
        .replace_all(&escaped, r#"<span class="kw">$1</span>"#)
        .into_owned()
}
