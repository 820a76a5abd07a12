use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{AppError, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    pub github: GitHubConfig,
    pub llm: LlmConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub workspace: WorkspaceConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

#[derive(Deserialize, Clone)]
pub struct GitHubConfig {
    pub token: String,
    #[serde(default)]
    pub webhook_secret: Option<String>,
    /// When set, only issues carrying this label start a workflow run from webhooks.
    #[serde(default)]
    pub trigger_label: Option<String>,
}

// Manual Debug impl to avoid leaking the token and webhook secret
impl std::fmt::Debug for GitHubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubConfig")
            .field("token", &"[REDACTED]")
            .field(
                "webhook_secret",
                &self.webhook_secret.as_ref().map(|_| "[REDACTED]"),
            )
            .field("trigger_label", &self.trigger_label)
            .finish()
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    #[default]
    OpenAi,
    Claude,
}

#[derive(Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: LlmProvider,
    pub api_key: String,
    /// Falls back to a provider-specific default when unset.
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

// Manual Debug impl to avoid leaking the API key
impl std::fmt::Debug for LlmConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LlmConfig")
            .field("provider", &self.provider)
            .field("api_key", &"[REDACTED]")
            .field("model", &self.model)
            .field("max_tokens", &self.max_tokens)
            .finish()
    }
}

impl LlmConfig {
    pub fn model(&self) -> &str {
        match (&self.model, self.provider) {
            (Some(model), _) => model,
            (None, LlmProvider::OpenAi) => "gpt-4o-mini",
            (None, LlmProvider::Claude) => "claude-sonnet-4-20250514",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AgentConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default = "default_code_agent_timeout")]
    pub code_agent_timeout_secs: u64,
    #[serde(default = "default_reviewer_timeout")]
    pub reviewer_timeout_secs: u64,
    #[serde(default = "default_ci_poll_interval")]
    pub ci_poll_interval_secs: u64,
    #[serde(default = "default_ci_max_wait")]
    pub ci_max_wait_secs: u64,
    #[serde(default = "default_max_diff_chars")]
    pub max_diff_chars: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            code_agent_timeout_secs: default_code_agent_timeout(),
            reviewer_timeout_secs: default_reviewer_timeout(),
            ci_poll_interval_secs: default_ci_poll_interval(),
            ci_max_wait_secs: default_ci_max_wait(),
            max_diff_chars: default_max_diff_chars(),
        }
    }
}

impl AgentConfig {
    pub fn code_agent_timeout(&self) -> Duration {
        Duration::from_secs(self.code_agent_timeout_secs)
    }

    pub fn reviewer_timeout(&self) -> Duration {
        Duration::from_secs(self.reviewer_timeout_secs)
    }

    pub fn ci_poll_interval(&self) -> Duration {
        Duration::from_secs(self.ci_poll_interval_secs)
    }

    pub fn ci_max_wait(&self) -> Duration {
        Duration::from_secs(self.ci_max_wait_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkspaceConfig {
    #[serde(default = "default_workspace_dir")]
    pub base_dir: PathBuf,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            base_dir: default_workspace_dir(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_max_iterations() -> u32 {
    5
}

fn default_code_agent_timeout() -> u64 {
    300
}

fn default_reviewer_timeout() -> u64 {
    180
}

fn default_ci_poll_interval() -> u64 {
    10
}

fn default_ci_max_wait() -> u64 {
    300
}

fn default_max_diff_chars() -> usize {
    8000
}

fn default_workspace_dir() -> PathBuf {
    PathBuf::from("/tmp/coding-agents-workspaces")
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // Load from file if specified
        if let Some(path) = config_path {
            builder = builder.add_source(config::File::with_name(path));
        } else {
            // Try default paths
            builder = builder.add_source(config::File::with_name("coding-agents").required(false));
        }

        // Environment variable overrides with CODING_AGENTS_ prefix
        builder = builder.add_source(
            config::Environment::with_prefix("CODING_AGENTS")
                .separator("__")
                .try_parsing(true),
        );

        Self::build(builder)
    }

    /// Parse a configuration from TOML text, without consulting files or the environment.
    pub fn from_toml(source: &str) -> Result<Self> {
        let builder = config::Config::builder()
            .add_source(config::File::from_str(source, config::FileFormat::Toml));
        Self::build(builder)
    }

    fn build(builder: config::ConfigBuilder<config::builder::DefaultState>) -> Result<Self> {
        let config = builder
            .build()
            .map_err(|e| AppError::Config(e.to_string()))?;

        let config: Self = config
            .try_deserialize()
            .map_err(|e| AppError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.agent.max_iterations == 0 {
            return Err(AppError::Config(
                "agent.max_iterations must be at least 1".to_string(),
            ));
        }
        if self.agent.ci_poll_interval_secs == 0 {
            return Err(AppError::Config(
                "agent.ci_poll_interval_secs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn webhook_secret(&self) -> Option<&str> {
        self.github
            .webhook_secret
            .as_deref()
            .filter(|secret| !secret.is_empty())
    }

    pub fn github_token(&self) -> &str {
        &self.github.token
    }
}
