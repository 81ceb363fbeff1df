use crate::config::AppConfig;
use crate::pipeline::Pipeline;
use crate::web::templates::init_templates;
use minijinja::Environment;

/// Shared application state for the web server
pub struct AppState {
    pub config: AppConfig,
    pub pipeline: Pipeline,
    pub template_env: Environment<'static>,
    pub startup_time: chrono::DateTime<chrono::Utc>,
}

impl AppState {
    pub fn new(config: AppConfig, pipeline: Pipeline) -> Result<Self, minijinja::Error> {
        Ok(Self {
            config,
            pipeline,
            template_env: init_templates()?,
            startup_time: chrono::Utc::now(),
        })
    }

    /// Value of the file input's `accept` attribute.
    pub fn accepted_extensions(&self) -> &'static str {
        if self.pipeline.accepts_scripts() {
            ".db,.sql"
        } else {
            ".db"
        }
    }

    /// Whether a request may omit the upload and use the default database.
    pub fn upload_optional(&self) -> bool {
        self.config.pipeline.default_database.is_some()
    }
}
