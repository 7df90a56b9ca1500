use std::env;
use std::time::Duration;

const HOST_ENV_VAR: &str = "OLLAMA_HOST";
const PORT_ENV_VAR: &str = "OLLAMA_PORT";
const MODEL_ENV_VAR: &str = "OLLAMA_MODEL";
const BIN_ENV_VAR: &str = "DCE_OLLAMA_BIN";

const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 11434;

#[derive(Debug, Clone)]
pub struct OllamaConfig {
    pub host: String,
    pub port: u16,
    pub bin_path: String,
    pub request_timeout: Duration,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
            bin_path: "ollama".to_string(),
            request_timeout: Duration::from_secs(120),
        }
    }
}

impl OllamaConfig {
    /// Endpoint and binary overrides come from the environment; anything not
    /// set falls back to the local defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(host) = env::var(HOST_ENV_VAR) {
            // OLLAMA_HOST may carry a host:port pair.
            if let Some((host_part, port_part)) = host.rsplit_once(':') {
                if let Ok(port) = port_part.parse::<u16>() {
                    config.host = host_part.to_string();
                    config.port = port;
                } else {
                    config.host = host;
                }
            } else {
                config.host = host;
            }
        }

        if let Ok(port) = env::var(PORT_ENV_VAR) {
            if let Ok(port) = port.parse::<u16>() {
                config.port = port;
            }
        }

        if let Ok(bin_path) = env::var(BIN_ENV_VAR) {
            config.bin_path = bin_path;
        }

        config
    }

    pub fn model_override_from_env() -> Option<String> {
        env::var(MODEL_ENV_VAR).ok()
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_points_at_local_daemon() {
        let config = OllamaConfig::default();
        assert_eq!(config.base_url(), "http://127.0.0.1:11434");
    }
}
