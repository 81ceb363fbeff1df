use crate::config::LlmConfig;
use crate::llm::prompt::build_prompt;
use crate::llm::{LlmError, SqlGenerator, clean_response};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

const GROQ_CHAT_URL: &str = "https://api.groq.com/openai/v1/chat/completions";
const OPENAI_CHAT_URL: &str = "https://api.openai.com/v1/chat/completions";

/// OpenAI-compatible chat completions client (Groq, OpenAI and look-alikes).
pub struct RemoteLlmProvider {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    temperature: f32,
}

#[derive(Serialize)]
struct PromptRequest {
    model: String,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: usize,
}

#[derive(Serialize)]
struct Message {
    role: String,
    content: String,
}

#[derive(Deserialize)]
struct PromptResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

impl RemoteLlmProvider {
    pub fn new(config: &LlmConfig) -> Result<Self, LlmError> {
        let api_url = match (&config.api_url, config.backend.as_str()) {
            (Some(url), _) => url.clone(),
            (None, "openai") => OPENAI_CHAT_URL.to_string(),
            (None, _) => GROQ_CHAT_URL.to_string(),
        };

        let api_key = config.api_key.clone().ok_or_else(|| {
            LlmError::ConfigError(format!(
                "API key is required for the {} backend (set GROQ_API_KEY or llm.api_key)",
                config.backend
            ))
        })?;

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        Ok(Self {
            client,
            api_url,
            api_key,
            model: config.model.clone(),
            temperature: config.temperature,
        })
    }
}

#[async_trait]
impl SqlGenerator for RemoteLlmProvider {
    async fn generate_sql(&self, question: &str, schema: Option<&str>) -> Result<String, LlmError> {
        let prompt = build_prompt(question, schema);

        let request = PromptRequest {
            model: self.model.clone(),
            messages: vec![Message {
                role: "user".to_string(),
                content: prompt,
            }],
            temperature: self.temperature,
            max_tokens: 512,
        };

        info!("Sending request to {} with model: {}", self.api_url, self.model);

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| LlmError::ConnectionError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(200).collect();
            error!("API responded with status code: {} - {}", status, snippet);

            return Err(match status {
                StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                    LlmError::AuthError(format!("API rejected the credentials ({})", status))
                }
                _ => LlmError::ResponseError(format!(
                    "API responded with status code: {} - {}",
                    status, snippet
                )),
            });
        }

        let prompt_response: PromptResponse = response
            .json()
            .await
            .map_err(|e| LlmError::ResponseError(e.to_string()))?;

        let content = prompt_response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| LlmError::ResponseError("No choices in response".to_string()))?;

        debug!("Raw model response: {}", content);
        Ok(clean_response(&content))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::llm::test_support::spawn_server;
    use axum::extract::State;
    use axum::http::HeaderMap;
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::{Value, json};
    use std::sync::{Arc, Mutex};

    #[derive(Clone, Default)]
    struct Captured {
        body: Arc<Mutex<Option<Value>>>,
        auth: Arc<Mutex<Option<String>>>,
    }

    async fn chat_completions(
        State(captured): State<Captured>,
        headers: HeaderMap,
        Json(body): Json<Value>,
    ) -> Json<Value> {
        *captured.auth.lock().unwrap() = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        *captured.body.lock().unwrap() = Some(body);

        Json(json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": "SELECT COUNT(*) FROM student WHERE course='Data Science'"
                }
            }]
        }))
    }

    fn provider_config(base_url: &str) -> LlmConfig {
        let mut config = AppConfig::default().llm;
        config.api_url = Some(format!("{}/v1/chat/completions", base_url));
        config.api_key = Some("gsk-test".to_string());
        config.timeout_secs = 5;
        config
    }

    #[tokio::test]
    async fn test_generates_single_line_sql_from_schema() {
        let captured = Captured::default();
        let router = Router::new()
            .route("/v1/chat/completions", post(chat_completions))
            .with_state(captured.clone());
        let base_url = spawn_server(router).await;

        let provider = RemoteLlmProvider::new(&provider_config(&base_url)).unwrap();
        let schema = "### Table: student\n- id (INTEGER)\n- name (VARCHAR(25))\n- course (VARCHAR(25))\n- section (VARCHAR(25))\n- marks (INTEGER)";
        let sql = provider
            .generate_sql("How many students are in Data Science?", Some(schema))
            .await
            .unwrap();

        assert!(sql.contains("SELECT COUNT(*) FROM student"));
        assert!(sql.contains("WHERE course"));
        assert!(!sql.contains('\n'));

        let body = captured.body.lock().unwrap().clone().unwrap();
        assert_eq!(body["model"], "llama3-8b-8192");
        let content = body["messages"][0]["content"].as_str().unwrap();
        assert!(content.contains("How many students are in Data Science?"));
        assert!(content.contains("- marks (INTEGER)"));
        assert_eq!(captured.auth.lock().unwrap().as_deref(), Some("Bearer gsk-test"));
    }

    #[tokio::test]
    async fn test_unauthorized_is_auth_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { (axum::http::StatusCode::UNAUTHORIZED, "invalid api key") }),
        );
        let base_url = spawn_server(router).await;

        let provider = RemoteLlmProvider::new(&provider_config(&base_url)).unwrap();
        let err = provider.generate_sql("anything", None).await.unwrap_err();

        assert!(matches!(err, LlmError::AuthError(_)));
    }

    #[tokio::test]
    async fn test_empty_choices_is_response_error() {
        let router = Router::new().route(
            "/v1/chat/completions",
            post(|| async { Json(json!({ "choices": [] })) }),
        );
        let base_url = spawn_server(router).await;

        let provider = RemoteLlmProvider::new(&provider_config(&base_url)).unwrap();
        let err = provider.generate_sql("anything", None).await.unwrap_err();

        assert!(matches!(err, LlmError::ResponseError(_)));
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let provider = RemoteLlmProvider::new(&provider_config(&format!("http://{}", addr))).unwrap();
        let err = provider.generate_sql("anything", None).await.unwrap_err();

        assert!(matches!(err, LlmError::ConnectionError(_)));
    }

    #[test]
    fn test_missing_api_key_is_config_error() {
        let mut config = AppConfig::default().llm;
        config.api_key = None;
        let err = RemoteLlmProvider::new(&config).err().unwrap();
        assert!(matches!(err, LlmError::ConfigError(_)));
    }
}
