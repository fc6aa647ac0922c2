use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Deserializer, Serialize};

pub const DEFAULT_PORT: u16 = 5001;
pub const DEFAULT_BIND: &str = "0.0.0.0";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_CONFIG_FILE: &str = "seoagent.toml";
/// Just under the 15 minute Lambda ceiling so the terminal signal still goes out.
pub const DEFAULT_TIMEOUT_SECS: u64 = 840;

/// Top-level config (seoagent.toml + SEOAGENT_* env + deployment env vars).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeoAgentConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub queue: QueueConfig,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub processing: ProcessingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Model used when the message carries no override.
    #[serde(default = "default_model")]
    pub model: String,
    /// Optional file replacing the built-in persona prompt.
    pub persona_path: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            persona_path: None,
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OpenAiConfig {
    /// Process-wide credential; a message variable takes precedence.
    pub api_key: Option<String>,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_openai_base_url(),
        }
    }
}

/// Durable queue used to offload HTTP requests. No URL means inline mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueConfig {
    pub url: Option<String>,
    /// AWS region. Inferred from the SQS URL host when not set.
    pub region: Option<String>,
}

impl QueueConfig {
    /// The configured queue URL, ignoring blank values from the environment.
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref().filter(|u| !u.trim().is_empty())
    }

    /// Region for request signing: explicit setting, else `sqs.<region>.amazonaws.com`.
    pub fn region(&self) -> Option<String> {
        if let Some(ref region) = self.region {
            return Some(region.clone());
        }
        let host = self.url()?.split("://").nth(1)?.split('/').next()?;
        let mut parts = host.split('.');
        match (parts.next(), parts.next()) {
            (Some("sqs"), Some(region)) => Some(region.to_string()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    /// Deliver session events to the in-process buffer instead of the
    /// production pub/sub + callback transport. Only a case-insensitive
    /// "true" turns it on; any other value leaves it off.
    #[serde(default, deserialize_with = "lenient_flag")]
    pub dev_mode: bool,
    /// Pub/sub HTTP publish endpoint for streamed events.
    pub publish_url: Option<String>,
    pub publish_api_key: Option<String>,
    #[serde(default = "default_callback_timeout_secs")]
    pub callback_timeout_secs: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            dev_mode: false,
            publish_url: None,
            publish_api_key: None,
            callback_timeout_secs: default_callback_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingConfig {
    /// Upper bound for one exchange; expiry is reported through the session.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ProcessingConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_bind() -> String {
    DEFAULT_BIND.to_string()
}
fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}
fn default_temperature() -> f32 {
    0.7
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_openai_base_url() -> String {
    "https://api.openai.com".to_string()
}
fn default_callback_timeout_secs() -> u64 {
    10
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

/// Env flags arrive as bools, numbers or free-form strings.
fn lenient_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Flag {
        Bool(bool),
        Text(String),
        Other(serde::de::IgnoredAny),
    }

    Ok(match Flag::deserialize(deserializer)? {
        Flag::Bool(b) => b,
        Flag::Text(s) => s.trim().eq_ignore_ascii_case("true"),
        Flag::Other(_) => false,
    })
}

/// Deployment variables understood without the SEOAGENT_ prefix.
/// Merged in order, so a later entry for the same key wins (PORT over AGENT_PORT).
const PLAIN_ENV: &[(&str, &str)] = &[
    ("OPENAI_API_KEY", "openai.api_key"),
    ("OPENAI_MODEL", "agent.model"),
    ("SQS_QUEUE_URL", "queue.url"),
    ("ORCA_DEV_MODE", "transport.dev_mode"),
    ("AGENT_PORT", "server.port"),
    ("PORT", "server.port"),
];

impl SeoAgentConfig {
    /// Load config from a TOML file with env var overrides.
    ///
    /// Later sources win:
    ///   1. built-in defaults
    ///   2. TOML file (explicit path, else ./seoagent.toml; missing file is fine)
    ///   3. plain deployment vars (OPENAI_API_KEY, SQS_QUEUE_URL, ...)
    ///   4. SEOAGENT_* vars, nested with `__` (SEOAGENT_QUEUE__URL)
    pub fn load(config_path: Option<&str>) -> crate::error::Result<Self> {
        let path = config_path.unwrap_or(DEFAULT_CONFIG_FILE);
        Self::figment(path)
            .extract()
            .map_err(|e| crate::error::SeoAgentError::Config(e.to_string()))
    }

    fn figment(path: &str) -> Figment {
        let mut figment = Figment::from(Serialized::defaults(SeoAgentConfig::default()))
            .merge(Toml::file(path));

        for &(var, key) in PLAIN_ENV {
            figment = figment.merge(Env::raw().only(&[var]).map(move |_| key.into()));
        }

        figment.merge(Env::prefixed("SEOAGENT_").split("__"))
    }

    /// True when HTTP requests are offloaded to the durable queue.
    pub fn offload_enabled(&self) -> bool {
        self.queue.url().is_some()
    }
}
