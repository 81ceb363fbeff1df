pub mod api;
pub mod ui;

use axum::extract::Multipart;
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use tracing::debug;

use crate::pipeline::{QueryRequest, Upload};

fn multipart_error(e: MultipartError) -> (StatusCode, String) {
    (e.status(), e.body_text())
}

/// Reads the `file` and `question` fields of the ask form.
///
/// A file input left empty by the browser arrives without a file name and counts as no upload.
pub(crate) async fn read_ask_form(
    mut multipart: Multipart,
) -> Result<QueryRequest, (StatusCode, String)> {
    let mut upload = None;
    let mut question = String::new();

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "file" => {
                let file_name = field.file_name().unwrap_or_default().to_string();
                let bytes = field.bytes().await.map_err(multipart_error)?;
                if !file_name.is_empty() {
                    upload = Some(Upload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "question" => question = field.text().await.map_err(multipart_error)?,
            other => debug!("Ignoring form field '{}'", other),
        }
    }

    Ok(QueryRequest { upload, question })
}
