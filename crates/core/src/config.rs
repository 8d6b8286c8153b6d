use std::collections::HashMap;
use std::env;
use std::path::Path;
use std::time::Duration;

use anyhow::Context;
use serde::Deserialize;
use validator::Validate;

use agentlink_shared::AuthType;

use crate::validation::{validate_http_url, validate_server_id};

const SERVER_ENV_PREFIX: &str = "AGENTLINK_SERVER_";

/// One tool server as written in configuration.
#[derive(Clone, Default, Deserialize, Validate)]
pub struct ToolServerConfig {
    #[validate(
        length(min = 1, max = 100, message = "Server ID must be 1-100 characters"),
        custom = "validate_server_id"
    )]
    pub id: Option<String>,

    #[validate(length(min = 1, max = 200, message = "Name must be 1-200 characters"))]
    pub name: Option<String>,

    #[validate(url(message = "URL is not valid"), custom = "validate_http_url")]
    pub url: String,

    #[serde(default)]
    pub auth_type: AuthType,

    #[serde(default)]
    #[validate(length(max = 1000, message = "Description must be at most 1000 characters"))]
    pub description: String,

    pub api_key: Option<String>,
    pub client_id: Option<String>,
    pub client_secret: Option<String>,
}

impl ToolServerConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_auth(mut self, auth_type: AuthType) -> Self {
        self.auth_type = auth_type;
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }
}

impl std::fmt::Debug for ToolServerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "********");
        f.debug_struct("ToolServerConfig")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("url", &self.url)
            .field("auth_type", &self.auth_type)
            .field("description", &self.description)
            .field("api_key", &redact(&self.api_key))
            .field("client_id", &self.client_id)
            .field("client_secret", &redact(&self.client_secret))
            .finish()
    }
}

/// Shape of the TOML file named by `AGENTLINK_TOOL_CONFIG`.
#[derive(Debug, Default, Deserialize)]
pub struct ToolServerConfigFile {
    #[serde(default)]
    pub servers: Vec<ToolServerConfig>,
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub tool_config_path: Option<String>,
    pub tool_execution_timeout_secs: u64,
    pub poll_interval_ms: u64,
    pub http_timeout_secs: u64,
    /// Servers from the config file first, then the numbered environment entries.
    pub servers: Vec<ToolServerConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            tool_config_path: None,
            tool_execution_timeout_secs: 30,
            poll_interval_ms: 500,
            http_timeout_secs: 30,
            servers: Vec::new(),
        }
    }
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        let tool_execution_timeout_secs =
            parse_ranged("AGENTLINK_TOOL_TIMEOUT_SECS", 30, 1, 300)?;
        let poll_interval_ms = parse_ranged("AGENTLINK_POLL_INTERVAL_MS", 500, 10, 60_000)?;
        let http_timeout_secs = parse_ranged("AGENTLINK_HTTP_TIMEOUT_SECS", 30, 1, 300)?;

        let tool_config_path = env::var("AGENTLINK_TOOL_CONFIG")
            .ok()
            .filter(|p| !p.trim().is_empty());

        let mut servers = match tool_config_path {
            Some(ref path) => load_servers_from_file(Path::new(path))?,
            None => Vec::new(),
        };
        servers.extend(load_servers_from_env());

        Ok(Self {
            tool_config_path,
            tool_execution_timeout_secs,
            poll_interval_ms,
            http_timeout_secs,
            servers,
        })
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_execution_timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}

fn parse_ranged(key: &str, default: u64, min: u64, max: u64) -> anyhow::Result<u64> {
    let value = match env::var(key) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("Failed to parse {key}"))?,
        Err(_) => default,
    };
    if !(min..=max).contains(&value) {
        anyhow::bail!("{key} must be between {min} and {max} (got {value})");
    }
    Ok(value)
}

pub fn load_servers_from_file(path: &Path) -> anyhow::Result<Vec<ToolServerConfig>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read tool config {}", path.display()))?;
    let file: ToolServerConfigFile = toml::from_str(&raw)
        .with_context(|| format!("Failed to parse tool config {}", path.display()))?;
    Ok(file.servers)
}

pub fn load_servers_from_env() -> Vec<ToolServerConfig> {
    servers_from_vars(env::vars())
}

/// Reads `AGENTLINK_SERVER_<N>_*` entries from N = 1 until an index has no
/// variables at all. Entries missing a name or url are skipped.
pub fn servers_from_vars<I>(vars: I) -> Vec<ToolServerConfig>
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: HashMap<String, String> = vars
        .into_iter()
        .filter(|(k, _)| k.starts_with(SERVER_ENV_PREFIX))
        .collect();

    let mut servers = Vec::new();
    for index in 1.. {
        let prefix = format!("{SERVER_ENV_PREFIX}{index}_");
        if !vars.keys().any(|k| k.starts_with(&prefix)) {
            break;
        }
        let field = |name: &str| {
            vars.get(&format!("{prefix}{name}"))
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        let (Some(name), Some(url)) = (field("NAME"), field("URL")) else {
            tracing::warn!(index, "Skipping tool server entry without NAME or URL");
            continue;
        };
        let auth_type = match field("AUTH_TYPE") {
            Some(raw) => match raw.parse::<AuthType>() {
                Ok(auth) => auth,
                Err(e) => {
                    tracing::warn!(index, "Skipping tool server entry: {}", e);
                    continue;
                }
            },
            None => AuthType::default(),
        };

        let mut config = ToolServerConfig {
            name: Some(name),
            url,
            auth_type,
            description: field("DESCRIPTION").unwrap_or_default(),
            ..ToolServerConfig::default()
        };
        match auth_type {
            AuthType::ApiKey => config.api_key = field("API_KEY"),
            AuthType::OAuth => {
                if let (Some(id), Some(secret)) = (field("CLIENT_ID"), field("CLIENT_SECRET")) {
                    config.client_id = Some(id);
                    config.client_secret = Some(secret);
                }
            }
            AuthType::None => {}
        }
        servers.push(config);
    }
    servers
}
