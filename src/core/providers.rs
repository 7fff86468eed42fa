use crate::core::builtin_providers::{find_builtin_provider, load_builtin_providers};
use crate::core::config::Config;
use std::error::Error;
use std::fmt;

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const QUICK_FIXES: &[&str] = &[
    "multibeam -p <provider>         # Pick a provider with a key in the environment",
    "export OPENAI_API_KEY=sk-...    # Use environment variable (defaults to OpenAI API)",
];

/// Everything the streaming layer needs to talk to one provider.
#[derive(Clone, Debug)]
pub struct ProviderSession {
    pub api_key: String,
    pub base_url: String,
    pub provider_id: String,
    pub provider_display_name: String,
}

#[derive(Debug)]
pub struct ProviderResolutionError {
    message: String,
    quick_fixes: &'static [&'static str],
    exit_code: i32,
}

impl ProviderResolutionError {
    pub fn missing_authentication() -> Self {
        Self::new(
            "No API key found. Set the environment variable for a built-in provider \
             (e.g. OPENAI_API_KEY, ANTHROPIC_API_KEY, OPENROUTER_API_KEY) or configure \
             a default provider.",
            QUICK_FIXES,
            2,
        )
    }

    pub fn provider_not_configured(provider: &str) -> Self {
        Self::new(
            format!("Unknown provider '{provider}'. It is neither built in nor in the config."),
            QUICK_FIXES,
            2,
        )
    }

    pub fn provider_key_missing(provider: &str, env_key: &str) -> Self {
        Self::new(
            format!("No API key for provider '{provider}': environment variable {env_key} is not set."),
            QUICK_FIXES,
            2,
        )
    }

    fn new(
        message: impl Into<String>,
        quick_fixes: &'static [&'static str],
        exit_code: i32,
    ) -> Self {
        Self {
            message: message.into(),
            quick_fixes,
            exit_code,
        }
    }

    pub fn quick_fixes(&self) -> &'static [&'static str] {
        self.quick_fixes
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl fmt::Display for ProviderResolutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Error for ProviderResolutionError {}

#[derive(Clone, Debug)]
struct ProviderMetadata {
    id: String,
    display_name: String,
    base_url: String,
    env_key: String,
}

fn provider_metadata(config: &Config, provider: &str) -> Option<ProviderMetadata> {
    if let Some(builtin) = find_builtin_provider(provider) {
        return Some(ProviderMetadata {
            id: builtin.id,
            display_name: builtin.display_name,
            base_url: builtin.base_url,
            env_key: builtin.env_key,
        });
    }
    config.find_custom_provider(provider).map(|custom| ProviderMetadata {
        id: custom.id.clone(),
        display_name: custom.display_name.clone(),
        base_url: custom.base_url.clone(),
        env_key: custom.env_key.clone(),
    })
}

/// Resolve a session from `OPENAI_API_KEY`/`OPENAI_BASE_URL` alone.
pub fn resolve_env_session() -> Result<ProviderSession, ProviderResolutionError> {
    resolve_env_session_from(&env_lookup)
}

fn env_lookup(key: &str) -> Option<String> {
    std::env::var(key).ok()
}

// Env access is injected so tests never mutate process-wide variables.
fn resolve_env_session_from(
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<ProviderSession, ProviderResolutionError> {
    let api_key =
        lookup("OPENAI_API_KEY").ok_or_else(ProviderResolutionError::missing_authentication)?;

    let base_url =
        lookup("OPENAI_BASE_URL").unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string());

    let (provider_id, provider_display_name) = if base_url == DEFAULT_OPENAI_BASE_URL {
        ("openai".to_string(), "OpenAI".to_string())
    } else {
        (
            "openai-compatible".to_string(),
            "OpenAI-compatible".to_string(),
        )
    };

    Ok(ProviderSession {
        api_key,
        base_url,
        provider_id,
        provider_display_name,
    })
}

/// Resolve the provider session to use for this invocation.
///
/// Precedence: explicit `--provider` override, then the config's default
/// provider, then the first built-in provider with a key in the environment,
/// then the plain `OPENAI_API_KEY` fallback.
pub fn resolve_session(
    config: &Config,
    provider_override: Option<&str>,
) -> Result<ProviderSession, ProviderResolutionError> {
    resolve_session_from(config, provider_override, &env_lookup)
}

fn resolve_session_from(
    config: &Config,
    provider_override: Option<&str>,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<ProviderSession, ProviderResolutionError> {
    let provider_override = provider_override.filter(|value| !value.is_empty());

    if let Some(provider_name) = provider_override {
        return resolve_specific_provider(config, provider_name, lookup);
    }

    if let Some(default_provider) = config.default_provider.as_deref() {
        return resolve_specific_provider(config, default_provider, lookup);
    }

    for builtin in load_builtin_providers() {
        if let Some(api_key) = lookup(&builtin.env_key) {
            return Ok(ProviderSession {
                api_key,
                base_url: builtin.base_url,
                provider_id: builtin.id,
                provider_display_name: builtin.display_name,
            });
        }
    }

    resolve_env_session_from(lookup)
}

fn resolve_specific_provider(
    config: &Config,
    provider_name: &str,
    lookup: &dyn Fn(&str) -> Option<String>,
) -> Result<ProviderSession, ProviderResolutionError> {
    let metadata = provider_metadata(config, provider_name)
        .ok_or_else(|| ProviderResolutionError::provider_not_configured(provider_name))?;

    let api_key = lookup(&metadata.env_key).ok_or_else(|| {
        ProviderResolutionError::provider_key_missing(provider_name, &metadata.env_key)
    })?;

    Ok(ProviderSession {
        api_key,
        base_url: metadata.base_url,
        provider_id: metadata.id.to_lowercase(),
        provider_display_name: metadata.display_name,
    })
}
