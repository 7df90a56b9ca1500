use std::process::{Child, Command, Stdio};
use std::time::Duration;

use tracing::{debug, info};

use crate::llm::LlmError;
use crate::llm::client::OllamaClient;
use crate::llm::config::OllamaConfig;

pub const DEFAULT_HEALTH_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Starts the local daemon when it is not already serving and waits for it to
/// become healthy.
pub struct OllamaRuntime<'a> {
    config: &'a OllamaConfig,
    client: &'a OllamaClient,
}

impl<'a> OllamaRuntime<'a> {
    pub fn new(config: &'a OllamaConfig, client: &'a OllamaClient) -> Self {
        Self { config, client }
    }

    pub fn start_if_needed(&self) -> Result<Option<Child>, LlmError> {
        if self.client.is_healthy() {
            return Ok(None);
        }

        info!("ollama server not running, starting it");
        let child = Command::new(&self.config.bin_path)
            .arg("serve")
            .env(
                "OLLAMA_HOST",
                format!("{}:{}", self.config.host, self.config.port),
            )
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| {
                LlmError::Permanent(format!(
                    "failed to start {} serve: {e}",
                    self.config.bin_path
                ))
            })?;

        Ok(Some(child))
    }

    /// Returns the spawned child process (when one was needed) so the caller
    /// decides its lifetime. On timeout the child is killed before failing.
    pub fn start_and_await(
        &self,
        timeout: Duration,
        poll_interval: Duration,
    ) -> Result<Option<Child>, LlmError> {
        let child = self.start_if_needed()?;

        if self.client.wait_until_healthy(timeout, poll_interval) {
            if child.is_some() {
                info!("started ollama server");
            } else {
                debug!("ollama server was already running");
            }
            return Ok(child);
        }

        if let Some(mut child) = child {
            let _ = child.kill();
            let _ = child.wait();
        }

        Err(LlmError::HealthTimeout(self.config.base_url()))
    }
}
