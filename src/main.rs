use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

mod acquire;
mod config;
mod db;
mod llm;
mod pipeline;
mod util;
mod web;

use crate::acquire::sweep_stale_uploads;
use crate::config::{AppConfig, CliArgs, Command};
use crate::db::executor::run_query;
use crate::db::guard::StatementPolicy;
use crate::db::seed::seed_student_database;
use crate::llm::LlmManager;
use crate::pipeline::Pipeline;
use crate::util::logging::init_tracing;
use crate::web::state::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    // Initialize logging
    init_tracing();

    // Parse command line arguments
    let args = CliArgs::parse();

    if let Some(Command::Seed { path }) = &args.command {
        return seed(path);
    }

    // Load configuration
    let config = match AppConfig::new(&args) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e.into());
        }
    };

    match sweep_stale_uploads(&config.upload.temp_dir) {
        Ok(_) => {}
        Err(e) => warn!(
            "Could not clean upload directory {}: {}",
            config.upload.temp_dir.display(),
            e
        ),
    }

    // Initialize LLM manager
    info!("Initializing LLM manager with backend: {}", config.llm.backend);
    let llm_manager = match LlmManager::new(&config.llm) {
        Ok(manager) => manager,
        Err(e) => {
            error!("Failed to initialize LLM backend: {}", e);
            return Err(e.into());
        }
    };

    let pipeline = Pipeline::new(&config, Arc::new(llm_manager));
    info!(
        "Statement policy: {}, schema in prompt: {}",
        pipeline.policy(),
        pipeline.include_schema()
    );

    let app_state = Arc::new(AppState::new(config.clone(), pipeline)?);

    // Start the web server
    info!("Starting server on {}:{}", config.web.host, config.web.port);
    match web::run_server(config.web, app_state).await {
        Ok(_) => info!("Server stopped gracefully"),
        Err(e) => {
            error!("Server error: {}", e);
            return Err(e.into());
        }
    }

    Ok(())
}

/// Writes the demo student database and prints what it holds.
fn seed(path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    seed_student_database(path)?;

    let result = run_query(path, "SELECT * FROM student", StatementPolicy::ReadOnly)?;
    println!("The inserted records are");
    for row in &result.rows {
        let cells: Vec<String> = row.iter().map(|cell| cell.to_string()).collect();
        println!("({})", cells.join(", "));
    }

    Ok(())
}
