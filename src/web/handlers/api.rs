use axum::{
    Json,
    extract::{Multipart, Query, State},
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::db::executor::ResultSet;
use crate::db::guard::StatementPolicy;
use crate::pipeline::{PipelineError, QueryReport, Stage};
use crate::web::handlers::read_ask_form;
use crate::web::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AskParams {
    /// `json` (default) or `csv`.
    pub format: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StageError {
    pub stage: Stage,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct AskResponse {
    pub question: String,
    pub sql: Option<String>,
    pub schema: Option<String>,
    pub result: Option<ResultSet>,
    pub error: Option<StageError>,
}

// System status

#[derive(Debug, Serialize)]
pub struct SystemStatus {
    pub version: String,
    pub uptime_seconds: i64,
    pub model: String,
    pub statement_policy: StatementPolicy,
    pub include_schema: bool,
    pub accept_scripts: bool,
}

fn status_for(error: &PipelineError) -> StatusCode {
    match error {
        PipelineError::Llm(_) => StatusCode::BAD_GATEWAY,
        PipelineError::Task { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

impl From<QueryReport> for AskResponse {
    fn from(report: QueryReport) -> Self {
        let (result, error) = match report.outcome {
            Ok(result) => (Some(result), None),
            Err(e) => (
                None,
                Some(StageError {
                    stage: e.stage(),
                    message: e.to_string(),
                }),
            ),
        };

        Self {
            question: report.question,
            sql: report.sql,
            schema: report.schema.map(|schema| schema.to_string()),
            result,
            error,
        }
    }
}

// Natural language question over an uploaded database
pub async fn ask(
    State(state): State<Arc<AppState>>,
    Query(params): Query<AskParams>,
    multipart: Multipart,
) -> Result<Response, (StatusCode, String)> {
    let format = params.format.unwrap_or_else(|| "json".to_string());
    if format != "json" && format != "csv" {
        return Err((
            StatusCode::BAD_REQUEST,
            format!("Unsupported export format: {}", format),
        ));
    }

    let request = read_ask_form(multipart).await?;
    debug!("API question: {}", request.question);
    let report = state.pipeline.run(request).await;

    let status = match &report.outcome {
        Ok(_) => StatusCode::OK,
        Err(e) => status_for(e),
    };

    if format == "csv" {
        if let Ok(result) = &report.outcome {
            return csv_response(result, report.sql.as_deref());
        }
    }

    info!("Answering API request with status {}", status);
    Ok((status, Json(AskResponse::from(report))).into_response())
}

fn csv_response(result: &ResultSet, sql: Option<&str>) -> Result<Response, (StatusCode, String)> {
    let body = result.to_csv().map_err(|e| {
        error!("Failed to write CSV: {}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Failed to write CSV: {}", e),
        )
    })?;

    let mut headers = HeaderMap::new();
    headers.insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/csv; charset=utf-8"),
    );
    headers.insert(
        header::CONTENT_DISPOSITION,
        HeaderValue::from_static("attachment; filename=\"result.csv\""),
    );

    // Multi-line SQL is not a valid header value; the body is still useful without it
    if let Some(v) = sql.and_then(|sql| HeaderValue::from_str(sql).ok()) {
        headers.insert(HeaderName::from_static("x-generated-sql"), v);
    }

    Ok((StatusCode::OK, headers, body).into_response())
}

pub async fn system_status(State(state): State<Arc<AppState>>) -> Json<SystemStatus> {
    let now = chrono::Utc::now();
    let uptime = now.signed_duration_since(state.startup_time).num_seconds();

    Json(SystemStatus {
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds: uptime,
        model: state.pipeline.model().to_string(),
        statement_policy: state.pipeline.policy(),
        include_schema: state.pipeline.include_schema(),
        accept_scripts: state.pipeline.accepts_scripts(),
    })
}
