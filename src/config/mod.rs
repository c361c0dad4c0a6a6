//! Runtime configuration (code > env > .env file).

use serde::{Deserialize, Serialize};

use crate::error::SableError;

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";

/// Default cap on agent-loop iterations before the circuit breaker trips.
pub const DEFAULT_MAX_LOOPS: u32 = 25;

/// Configuration for a task run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SableConfig {
    /// API key for the model endpoint. Never logged.
    #[serde(skip_serializing, default)]
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    /// Iteration cap for the agent loop.
    pub max_loops: u32,
}

impl SableConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: DEFAULT_MODEL.to_string(),
            max_loops: DEFAULT_MAX_LOOPS,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_max_loops(mut self, max_loops: u32) -> Self {
        self.max_loops = max_loops;
        self
    }

    /// Load from environment variables, reading `.env` if present.
    ///
    /// `SABLE_API_KEY` (falling back to `OPENAI_API_KEY`) is required;
    /// `SABLE_BASE_URL`, `SABLE_MODEL`, and `SABLE_MAX_LOOPS` override the
    /// defaults.
    pub fn from_env() -> Result<Self, SableError> {
        let _ = dotenvy::dotenv(); // load .env if present, ignore error

        let api_key = std::env::var("SABLE_API_KEY")
            .or_else(|_| std::env::var("OPENAI_API_KEY"))
            .map_err(|_| {
                SableError::Configuration(
                    "missing SABLE_API_KEY (or OPENAI_API_KEY) environment variable".into(),
                )
            })?;

        let mut config = Self::new(api_key);

        if let Ok(url) = std::env::var("SABLE_BASE_URL") {
            config.base_url = url;
        }
        if let Ok(model) = std::env::var("SABLE_MODEL") {
            config.model = model;
        }
        if let Ok(raw) = std::env::var("SABLE_MAX_LOOPS") {
            config.max_loops = raw.parse().map_err(|_| {
                SableError::Configuration(format!("SABLE_MAX_LOOPS is not a number: {raw}"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly work.
    pub fn validate(&self) -> Result<(), SableError> {
        if self.api_key.is_empty() {
            return Err(SableError::Configuration("api_key is empty".into()));
        }
        if self.max_loops == 0 {
            return Err(SableError::Configuration("max_loops must be at least 1".into()));
        }
        if !self.base_url.starts_with("http") {
            return Err(SableError::Configuration(format!(
                "base_url does not look like a URL: {}",
                self.base_url
            )));
        }
        Ok(())
    }
}
