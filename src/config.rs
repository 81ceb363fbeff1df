use clap::{Parser, Subcommand};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::db::guard::StatementPolicy;

/// Environment prefix for overrides, e.g. `NL_SQLITE__LLM__MODEL`.
const ENV_PREFIX: &str = "NL_SQLITE";

/// Bare variable consulted for the model credential when nothing else sets it.
const API_KEY_VAR: &str = "GROQ_API_KEY";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct WebConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LlmConfig {
    pub backend: String, // "groq", "openai" or "ollama"
    pub model: String,
    pub api_key: Option<String>,
    pub api_url: Option<String>,
    pub timeout_secs: u64,
    pub temperature: f32,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PipelineConfig {
    /// Send the extracted schema along with the question.
    pub include_schema: bool,
    /// Accept `.sql` scripts in addition to `.db` files.
    pub accept_scripts: bool,
    pub statement_policy: StatementPolicy,
    /// Database queried when a request carries no upload.
    pub default_database: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UploadConfig {
    pub temp_dir: PathBuf,
    pub max_bytes: usize,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub web: WebConfig,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    pub upload: UploadConfig,
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Path to configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Path to a secrets file holding the model API key
    #[arg(long, value_name = "FILE")]
    pub secrets: Option<PathBuf>,

    /// Host to bind to
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Directory for temporary upload databases
    #[arg(long)]
    pub temp_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the web server (default)
    Serve,
    /// Write the demo student database and print its rows
    Seed {
        #[arg(long, default_value = "student.db")]
        path: PathBuf,
    },
}

impl AppConfig {
    pub fn new(args: &CliArgs) -> Result<Self, ConfigError> {
        // Start with default configuration
        let mut config_builder = Config::builder().add_source(Config::try_from(&AppConfig::default())?);

        // Add configuration from file if specified
        if let Some(config_path) = &args.config {
            config_builder = config_builder.add_source(File::from(config_path.as_path()));
        } else {
            // Check for config in default locations
            let default_locations = vec![
                "config.toml",
                "config/config.toml",
                "/etc/nl-sqlite/config.toml",
            ];

            for location in default_locations {
                if Path::new(location).exists() {
                    config_builder =
                        config_builder.add_source(File::new(location, config::FileFormat::Toml));
                    break;
                }
            }
        }

        let secrets_path = args
            .secrets
            .clone()
            .or_else(|| Some(PathBuf::from("secrets.toml")).filter(|p| p.exists()));
        if let Some(path) = &secrets_path {
            config_builder = config_builder.add_source(File::from(path.as_path()));
        }

        config_builder = config_builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .separator("__")
                .try_parsing(true),
        );

        // Build the config
        let mut config: AppConfig = config_builder.build()?.try_deserialize()?;

        if config.llm.api_key.is_none() {
            config.llm.api_key = match &secrets_path {
                Some(path) => secret_from_file(path)?,
                None => None,
            }
            .or_else(|| std::env::var(API_KEY_VAR).ok())
            .filter(|key| !key.trim().is_empty());
        }

        // Override with command line args if provided
        if let Some(host) = &args.host {
            config.web.host = host.clone();
        }
        if let Some(port) = args.port {
            config.web.port = port;
        }
        if let Some(temp_dir) = &args.temp_dir {
            config.upload.temp_dir = temp_dir.clone();
        }

        Ok(config)
    }
}

/// Reads a top-level `GROQ_API_KEY` entry from a secrets file.
fn secret_from_file(path: &Path) -> Result<Option<String>, ConfigError> {
    let secrets = Config::builder().add_source(File::from(path)).build()?;
    Ok(secrets
        .get_string(API_KEY_VAR)
        .or_else(|_| secrets.get_string(&API_KEY_VAR.to_lowercase()))
        .ok())
}

// Default implementation
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            web: WebConfig {
                host: "127.0.0.1".to_string(),
                port: 8501,
            },
            llm: LlmConfig {
                backend: "groq".to_string(),
                model: "llama3-8b-8192".to_string(),
                api_key: None,
                api_url: None,
                timeout_secs: 60,
                temperature: 0.0,
            },
            pipeline: PipelineConfig {
                include_schema: true,
                accept_scripts: true,
                statement_policy: StatementPolicy::ReadOnly,
                default_database: None,
            },
            upload: UploadConfig {
                temp_dir: std::env::temp_dir().join("nl-sqlite"),
                max_bytes: 200 * 1024 * 1024,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn args_with(config: Option<PathBuf>, secrets: Option<PathBuf>) -> CliArgs {
        CliArgs {
            config,
            secrets,
            host: None,
            port: None,
            temp_dir: None,
            command: None,
        }
    }

    #[test]
    fn test_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[llm]\nbackend = \"ollama\"\nmodel = \"sqlcoder\"\napi_key = \"from-file\"\n\n[pipeline]\ninclude_schema = false\nstatement_policy = \"read_write\""
        )
        .unwrap();

        let config = AppConfig::new(&args_with(Some(file.path().to_path_buf()), None)).unwrap();

        assert_eq!(config.llm.backend, "ollama");
        assert_eq!(config.llm.model, "sqlcoder");
        assert_eq!(config.llm.api_key.as_deref(), Some("from-file"));
        assert!(!config.pipeline.include_schema);
        assert!(config.pipeline.accept_scripts);
        assert_eq!(config.pipeline.statement_policy, StatementPolicy::ReadWrite);
        assert_eq!(config.web.port, 8501);
    }

    #[test]
    fn test_secrets_file_supplies_api_key() {
        let mut config_file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(config_file, "[web]\nport = 9000").unwrap();
        let mut secrets: NamedTempFile = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(secrets, "GROQ_API_KEY = \"gsk-test\"").unwrap();

        let config = AppConfig::new(&args_with(
            Some(config_file.path().to_path_buf()),
            Some(secrets.path().to_path_buf()),
        ))
        .unwrap();

        assert_eq!(config.llm.api_key.as_deref(), Some("gsk-test"));
        assert_eq!(config.web.port, 9000);
    }

    #[test]
    fn test_cli_overrides_win() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[web]\nhost = \"0.0.0.0\"\nport = 9000").unwrap();
        let mut args = args_with(Some(file.path().to_path_buf()), None);
        args.port = Some(9100);
        args.temp_dir = Some(PathBuf::from("/tmp/uploads"));

        let config = AppConfig::new(&args).unwrap();

        assert_eq!(config.web.host, "0.0.0.0");
        assert_eq!(config.web.port, 9100);
        assert_eq!(config.upload.temp_dir, PathBuf::from("/tmp/uploads"));
    }
}
