use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::acquire::{AcquireError, Acquirer};
use crate::config::AppConfig;
use crate::db::executor::{ExecError, ResultSet, run_query};
use crate::db::guard::{GuardError, StatementPolicy, check_statement};
use crate::db::schema::{SchemaDescription, SchemaError, extract_schema};
use crate::llm::{LlmError, LlmManager};

/// An uploaded file as received from the client.
#[derive(Debug, Clone)]
pub struct Upload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub upload: Option<Upload>,
    pub question: String,
}

/// Where a request stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Input,
    Acquire,
    Extract,
    Synthesize,
    Validate,
    Execute,
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Please enter a question")]
    EmptyQuestion,

    #[error(transparent)]
    Acquire(#[from] AcquireError),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error(transparent)]
    Llm(#[from] LlmError),

    #[error(transparent)]
    Guard(#[from] GuardError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error("Background task failed during {stage:?}: {message}")]
    Task { stage: Stage, message: String },
}

impl PipelineError {
    pub fn stage(&self) -> Stage {
        match self {
            PipelineError::EmptyQuestion => Stage::Input,
            PipelineError::Acquire(_) => Stage::Acquire,
            PipelineError::Schema(_) => Stage::Extract,
            PipelineError::Llm(_) => Stage::Synthesize,
            PipelineError::Guard(_) => Stage::Validate,
            PipelineError::Exec(_) => Stage::Execute,
            PipelineError::Task { stage, .. } => *stage,
        }
    }
}

/// Everything the presenter needs about one request.
#[derive(Debug)]
pub struct QueryReport {
    pub question: String,
    pub sql: Option<String>,
    pub schema: Option<SchemaDescription>,
    pub outcome: Result<ResultSet, PipelineError>,
}

/// Acquire, extract, synthesize, validate and execute, in that order.
pub struct Pipeline {
    acquirer: Acquirer,
    llm: Arc<LlmManager>,
    include_schema: bool,
    policy: StatementPolicy,
}

impl Pipeline {
    pub fn new(config: &AppConfig, llm: Arc<LlmManager>) -> Self {
        Self {
            acquirer: Acquirer::new(&config.upload, &config.pipeline),
            llm,
            include_schema: config.pipeline.include_schema,
            policy: config.pipeline.statement_policy,
        }
    }

    pub fn policy(&self) -> StatementPolicy {
        self.policy
    }

    pub fn include_schema(&self) -> bool {
        self.include_schema
    }

    pub fn accepts_scripts(&self) -> bool {
        self.acquirer.accepts_scripts()
    }

    pub fn model(&self) -> &str {
        self.llm.model()
    }

    pub async fn run(&self, request: QueryRequest) -> QueryReport {
        let mut report = QueryReport {
            question: request.question.trim().to_string(),
            sql: None,
            schema: None,
            outcome: Ok(ResultSet::default()),
        };

        let outcome = self.run_stages(request.upload, &mut report).await;
        report.outcome = outcome;
        match &report.outcome {
            Ok(result) => info!("Answered question with {} rows", result.row_count()),
            Err(e) => warn!("Pipeline stopped at {:?}: {}", e.stage(), e),
        }
        report
    }

    async fn run_stages(
        &self,
        upload: Option<Upload>,
        report: &mut QueryReport,
    ) -> Result<ResultSet, PipelineError> {
        if report.question.is_empty() {
            return Err(PipelineError::EmptyQuestion);
        }

        // The acquired database lives until this function returns, however it returns
        let acquirer = self.acquirer.clone();
        let database = blocking(Stage::Acquire, move || match upload {
            Some(upload) => acquirer.acquire(&upload.file_name, &upload.bytes),
            None => acquirer.fallback(),
        })
        .await?;
        debug!(
            "Querying {} ({})",
            database.path().display(),
            if database.is_temporary() { "upload" } else { "default database" }
        );

        let schema_text = if self.include_schema {
            let path = database.path().to_path_buf();
            let schema = blocking(Stage::Extract, move || extract_schema(&path)).await?;
            let tables: Vec<String> = schema.tables.iter().map(|table| table.signature()).collect();
            debug!("Extracted schema: {}", tables.join("; "));
            let text = schema.to_string();
            report.schema = Some(schema);
            Some(text)
        } else {
            None
        };

        let sql = self
            .llm
            .generate_sql(&report.question, schema_text.as_deref())
            .await?;
        debug!("Generated SQL: {}", sql);
        report.sql = Some(sql.clone());

        check_statement(&sql, self.policy)?;

        let path = database.path().to_path_buf();
        let policy = self.policy;
        let result = blocking(Stage::Execute, move || run_query(&path, &sql, policy)).await?;

        Ok(result)
    }
}

/// Runs blocking file or SQLite work off the async runtime.
async fn blocking<T, E, F>(stage: Stage, work: F) -> Result<T, PipelineError>
where
    F: FnOnce() -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<PipelineError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| PipelineError::Task {
            stage,
            message: e.to_string(),
        })?
        .map_err(Into::into)
}
