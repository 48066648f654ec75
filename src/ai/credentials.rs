//! Provider API key resolution.
//!
//! Keys are deliberately not cached in `AppConfig`: the environment is
//! re-read on every call so a key rotated at runtime takes effect on the
//! next request without a restart.

use super::catalog::ProviderFamily;

pub trait CredentialSource: Send + Sync {
    /// API key for a provider family, or `None` when not configured.
    /// Implementations must return `None` for blank values.
    fn api_key(&self, family: ProviderFamily) -> Option<String>;
}

/// Reads keys from the process environment on every call.
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials;

impl EnvCredentials {
    fn var(name: &str) -> Option<String> {
        let value = std::env::var(name).ok()?;
        let value = value.trim().to_string();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

impl CredentialSource for EnvCredentials {
    fn api_key(&self, family: ProviderFamily) -> Option<String> {
        // API_KEY (not OPENAI_API_KEY) is the deployed variable name.
        let name = match family {
            ProviderFamily::OpenAi => "API_KEY",
            ProviderFamily::OpenRouter => "OPENROUTER_API_KEY",
            ProviderFamily::Gemini => "GEMINI_API_KEY",
            ProviderFamily::Anthropic => "ANTHROPIC_API_KEY",
            ProviderFamily::Perplexity => "PERPLEXITY_API_KEY",
        };
        Self::var(name)
    }
}

/// Fixed key set, for tests and one-off tooling.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    keys: Vec<(ProviderFamily, String)>,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_key(mut self, family: ProviderFamily, key: impl Into<String>) -> Self {
        self.keys.push((family, key.into()));
        self
    }
}

impl CredentialSource for StaticCredentials {
    fn api_key(&self, family: ProviderFamily) -> Option<String> {
        self.keys
            .iter()
            .find(|(f, _)| *f == family)
            .map(|(_, k)| k.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_credentials_resolve_per_family() {
        let creds = StaticCredentials::new()
            .with_key(ProviderFamily::OpenAi, "sk-test")
            .with_key(ProviderFamily::Anthropic, "ak-test");
        assert_eq!(creds.api_key(ProviderFamily::OpenAi).as_deref(), Some("sk-test"));
        assert_eq!(creds.api_key(ProviderFamily::Anthropic).as_deref(), Some("ak-test"));
        assert_eq!(creds.api_key(ProviderFamily::Gemini), None);
    }
}
