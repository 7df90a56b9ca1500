use std::time::{Duration, Instant};

use serde_json::{Value, json};
use tracing::debug;

use crate::llm::LlmError;
use crate::llm::config::OllamaConfig;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(3);

/// Blocking HTTP client for the local Ollama daemon.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    base_url: String,
    http: reqwest::blocking::Client,
    health_http: reqwest::blocking::Client,
}

impl OllamaClient {
    pub fn new(config: &OllamaConfig) -> Result<Self, LlmError> {
        let http = reqwest::blocking::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| LlmError::Permanent(format!("failed to build http client: {e}")))?;
        let health_http = reqwest::blocking::Client::builder()
            .timeout(HEALTH_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Permanent(format!("failed to build http client: {e}")))?;

        Ok(Self {
            base_url: config.base_url(),
            http,
            health_http,
        })
    }

    pub fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, LlmError> {
        let body = self.post_json(
            "/api/embeddings",
            &json!({
                "model": model,
                "prompt": text,
            }),
        )?;

        parse_embedding_response(&body)
    }

    pub fn generate(&self, model: &str, prompt: &str) -> Result<String, LlmError> {
        let body = self.post_json(
            "/api/generate",
            &json!({
                "model": model,
                "prompt": prompt,
                "stream": false,
            }),
        )?;

        match body.get("response").and_then(Value::as_str) {
            Some(response) => Ok(response.to_string()),
            None => Err(LlmError::Permanent(
                "unexpected ollama generate response schema".to_string(),
            )),
        }
    }

    pub fn pull_model(&self, model: &str) -> Result<(), LlmError> {
        debug!(model, "pulling ollama model if needed");
        self.post_json("/api/pull", &json!({ "name": model, "stream": false }))?;
        Ok(())
    }

    pub fn is_healthy(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.health_http.get(&url).send() {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }

    pub fn wait_until_healthy(&self, timeout: Duration, poll_interval: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while Instant::now() < deadline {
            if self.is_healthy() {
                return true;
            }
            std::thread::sleep(poll_interval);
        }
        self.is_healthy()
    }

    fn post_json(&self, path: &str, payload: &Value) -> Result<Value, LlmError> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .http
            .post(&url)
            .json(payload)
            .send()
            .map_err(map_transport_err)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            let message = format!("{path} returned {status}: {}", truncate(&body, 500));
            return if status.is_server_error() {
                Err(LlmError::Transient(message))
            } else {
                Err(LlmError::Permanent(message))
            };
        }

        response
            .json::<Value>()
            .map_err(|e| LlmError::Permanent(format!("{path} returned unreadable json: {e}")))
    }
}

fn map_transport_err(e: reqwest::Error) -> LlmError {
    if e.is_timeout() || e.is_connect() || e.is_request() {
        LlmError::Transient(e.to_string())
    } else {
        LlmError::Permanent(e.to_string())
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Accepts both `{embedding: [...]}` and `{data: [{embedding: [...]}]}`.
fn parse_embedding_response(body: &Value) -> Result<Vec<f32>, LlmError> {
    let vec = body
        .get("embedding")
        .and_then(Value::as_array)
        .or_else(|| {
            body.get("data")
                .and_then(Value::as_array)
                .and_then(|data| data.first())
                .and_then(|first| first.get("embedding"))
                .and_then(Value::as_array)
        })
        .ok_or_else(|| {
            LlmError::Permanent("unexpected ollama embedding response schema".to_string())
        })?;

    vec.iter()
        .map(|value| {
            value.as_f64().map(|v| v as f32).ok_or_else(|| {
                LlmError::Permanent("non-numeric value in embedding response".to_string())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn client_for(server: &MockServer) -> OllamaClient {
        let config = OllamaConfig {
            host: server.host(),
            port: server.port(),
            bin_path: "ollama".to_string(),
            request_timeout: Duration::from_secs(5),
        };
        OllamaClient::new(&config).unwrap()
    }

    #[test]
    fn embed_parses_flat_schema() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/api/embeddings")
                .json_body_partial(r#"{"model": "m", "prompt": "hello"}"#);
            then.status(200)
                .json_body(serde_json::json!({"embedding": [0.1, 0.2, 0.3]}));
        });

        let vec = client_for(&server).embed("m", "hello").unwrap();
        mock.assert();
        assert_eq!(vec.len(), 3);
        assert!((vec[1] - 0.2).abs() < 1e-6);
    }

    #[test]
    fn embed_parses_nested_data_schema() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/embeddings");
            then.status(200)
                .json_body(serde_json::json!({"data": [{"embedding": [1.0, 2.0]}]}));
        });

        let vec = client_for(&server).embed("m", "hello").unwrap();
        assert_eq!(vec, vec![1.0, 2.0]);
    }

    #[test]
    fn server_errors_are_transient_and_client_errors_permanent() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/embeddings");
            then.status(503).body("overloaded");
        });

        let err = client_for(&server).embed("m", "hello").unwrap_err();
        assert!(matches!(err, LlmError::Transient(_)));

        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/embeddings");
            then.status(404).body("model not found");
        });

        let err = client_for(&server).embed("m", "hello").unwrap_err();
        assert!(matches!(err, LlmError::Permanent(_)));
    }

    #[test]
    fn bad_embedding_schema_is_permanent() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/embeddings");
            then.status(200).json_body(serde_json::json!({"vectors": []}));
        });

        let err = client_for(&server).embed("m", "hello").unwrap_err();
        assert!(matches!(err, LlmError::Permanent(_)));
    }

    #[test]
    fn generate_returns_response_text() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/api/generate");
            then.status(200)
                .json_body(serde_json::json!({"response": "a rewritten query"}));
        });

        let text = client_for(&server).generate("m", "rewrite this").unwrap();
        assert_eq!(text, "a rewritten query");
    }

    #[test]
    fn health_check_reflects_tags_endpoint() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(GET).path("/api/tags");
            then.status(200).json_body(serde_json::json!({"models": []}));
        });

        assert!(client_for(&server).is_healthy());
    }
}
