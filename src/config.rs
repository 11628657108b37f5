//! Runtime configuration.
//!
//! Read once by the binary and injected into adapters and the dispatcher;
//! library code never looks at the environment.

use crate::models::ProviderId;
use std::collections::HashMap;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: u64 = 60;
const DEFAULT_BIND: &str = "0.0.0.0:3000";

#[derive(Debug, Clone, PartialEq)]
pub struct ProviderSettings {
    pub api_key: String,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProvidersConfig {
    pub perplexity: Option<ProviderSettings>,
    pub openai: Option<ProviderSettings>,
    pub gemini: Option<ProviderSettings>,
    pub claude: Option<ProviderSettings>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TimeoutPolicy {
    pub default: Duration,
    pub overrides: HashMap<ProviderId, Duration>,
}

impl TimeoutPolicy {
    pub fn uniform(timeout: Duration) -> Self {
        Self {
            default: timeout,
            overrides: HashMap::new(),
        }
    }

    pub fn with_override(mut self, provider: ProviderId, timeout: Duration) -> Self {
        self.overrides.insert(provider, timeout);
        self
    }

    pub fn for_provider(&self, provider: ProviderId) -> Duration {
        self.overrides.get(&provider).copied().unwrap_or(self.default)
    }
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self::uniform(Duration::from_secs(DEFAULT_TIMEOUT_SECS))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub providers: ProvidersConfig,
    pub timeouts: TimeoutPolicy,
    pub bind_addr: String,
}

struct ProviderEnv {
    id: ProviderId,
    prefix: &'static str,
    key_var: &'static str,
    model: &'static str,
    base_url: &'static str,
}

const PROVIDER_ENV: [ProviderEnv; 4] = [
    ProviderEnv {
        id: ProviderId::Perplexity,
        prefix: "PERPLEXITY",
        key_var: "PERPLEXITY_API_KEY",
        model: "sonar",
        base_url: "https://api.perplexity.ai",
    },
    ProviderEnv {
        id: ProviderId::OpenAi,
        prefix: "OPENAI",
        key_var: "OPENAI_API_KEY",
        model: "gpt-4o-mini",
        base_url: "https://api.openai.com/v1",
    },
    ProviderEnv {
        id: ProviderId::Gemini,
        prefix: "GEMINI",
        key_var: "GEMINI_API_KEY",
        model: "gemini-2.0-flash",
        base_url: "https://generativelanguage.googleapis.com/v1beta",
    },
    ProviderEnv {
        id: ProviderId::Claude,
        prefix: "ANTHROPIC",
        key_var: "ANTHROPIC_API_KEY",
        model: "claude-sonnet-4-20250514",
        base_url: "https://api.anthropic.com/v1",
    },
];

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from any variable source; blank values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let secs = |name: &str| {
            get(name)
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs)
        };

        let mut providers = ProvidersConfig::default();
        let mut timeouts = TimeoutPolicy::uniform(
            secs("CITEWATCH_TIMEOUT_SECS").unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS)),
        );

        for env in &PROVIDER_ENV {
            let settings = get(env.key_var).map(|api_key| ProviderSettings {
                api_key,
                model: get(&format!("{}_MODEL", env.prefix)).unwrap_or_else(|| env.model.to_string()),
                base_url: get(&format!("{}_BASE_URL", env.prefix))
                    .unwrap_or_else(|| env.base_url.to_string())
                    .trim_end_matches('/')
                    .to_string(),
            });

            match env.id {
                ProviderId::Perplexity => providers.perplexity = settings,
                ProviderId::OpenAi => providers.openai = settings,
                ProviderId::Gemini => providers.gemini = settings,
                ProviderId::Claude => providers.claude = settings,
            }

            if let Some(timeout) = secs(&format!("{}_TIMEOUT_SECS", env.prefix)) {
                timeouts = timeouts.with_override(env.id, timeout);
            }
        }

        Self {
            providers,
            timeouts,
            bind_addr: get("CITEWATCH_BIND").unwrap_or_else(|| DEFAULT_BIND.to_string()),
        }
    }
}
