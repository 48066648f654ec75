use serde::Deserialize;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: String,

    /// Directory for chat attachments and generated images
    pub upload_dir: String,

    /// Default chat model when the request doesn't name one
    pub default_model: String,

    /// Retry ceiling for provider calls answering 429
    pub max_retries: u32,
    /// Base backoff in seconds; delay grows linearly per attempt
    pub retry_backoff_secs: u64,
    /// Per-call timeout for provider HTTP requests
    pub request_timeout_secs: u64,
    // Provider API keys are intentionally absent: they are re-read from the
    // environment on every request through ai::credentials::EnvCredentials.
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")?,
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".to_string()),
            upload_dir: std::env::var("UPLOAD_DIR")
                .unwrap_or_else(|_| "./data/uploads".to_string()),
            default_model: std::env::var("DEFAULT_MODEL")
                .unwrap_or_else(|_| "gpt-4o".to_string()),
            max_retries: std::env::var("MAX_RETRIES")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            retry_backoff_secs: std::env::var("RETRY_BACKOFF_SECS")
                .unwrap_or_else(|_| "3".to_string())
                .parse()
                .unwrap_or(3),
            request_timeout_secs: std::env::var("REQUEST_TIMEOUT_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
        })
    }
}
