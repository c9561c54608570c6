use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

use crate::error::AppError;

/// Half-hourly readings per day times the longest accepted window must stay
/// under the provider's single-page cap of 1500 records.
pub const MAX_LOOKBACK_DAYS: i64 = 31;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DbConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub octopus: OctopusConfig,
    #[serde(default)]
    pub ingest: IngestConfig,
    #[serde(default)]
    pub scheduler: Option<SchedulerConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbConfig {
    #[serde(default = "default_db_url")]
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            url: default_db_url(),
            max_connections: default_max_connections(),
        }
    }
}

fn default_db_url() -> String {
    "sqlite://energy.db".into()
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_api_host")]
    pub host: String,
    #[serde(default = "default_api_port")]
    pub port: u16,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_api_host(),
            port: default_api_port(),
        }
    }
}

fn default_api_host() -> String {
    "0.0.0.0".into()
}

fn default_api_port() -> u16 {
    5000
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// Kraken GraphQL API, authenticated with a short-lived token.
    #[default]
    GraphQl,
    /// REST API, authenticated with the key as basic-auth user.
    Rest,
}

impl FromStr for Transport {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "graphql" => Ok(Transport::GraphQl),
            "rest" => Ok(Transport::Rest),
            other => Err(anyhow::anyhow!("unknown octopus transport: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OctopusConfig {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
    #[serde(default)]
    pub transport: Transport,
    #[serde(default = "default_graphql_url")]
    pub graphql_url: String,
    #[serde(default = "default_rest_url")]
    pub rest_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Kraken tokens live for an hour; refresh a little early.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

impl Default for OctopusConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            account_number: None,
            transport: Transport::default(),
            graphql_url: default_graphql_url(),
            rest_url: default_rest_url(),
            timeout_secs: default_timeout_secs(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

fn default_graphql_url() -> String {
    "https://api.octopus.energy/v1/graphql/".into()
}

fn default_rest_url() -> String {
    "https://api.octopus.energy".into()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_token_ttl_secs() -> u64 {
    3300
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key: String,
    pub account_number: String,
}

impl OctopusConfig {
    /// Both values must be present and non-empty before any remote call is made.
    pub fn credentials(&self) -> Result<Credentials, AppError> {
        let non_empty = |v: &Option<String>| v.as_deref().filter(|s| !s.trim().is_empty()).map(str::to_string);

        match (non_empty(&self.api_key), non_empty(&self.account_number)) {
            (Some(api_key), Some(account_number)) => Ok(Credentials {
                api_key,
                account_number,
            }),
            _ => Err(AppError::Config(
                "API key or account number not configured".into(),
            )),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    #[serde(default = "default_lookback_days")]
    pub lookback_days: i64,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            lookback_days: default_lookback_days(),
        }
    }
}

fn default_lookback_days() -> i64 {
    7
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub interval_secs: u64,
}

impl Config {
    /// Load YAML from disk if present, substitute $(VAR)/${VAR} with env vars,
    /// then apply environment overrides. A missing file means built-in defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, anyhow::Error> {
        let path = path.as_ref();
        let mut cfg: Self = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            Self::from_yaml(&raw)?
        } else {
            tracing::warn!(path = %path.display(), "Config file not found, using defaults");
            Self::default()
        };

        cfg.apply_overrides(|key| std::env::var(key).ok())?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_yaml(raw: &str) -> Result<Self, anyhow::Error> {
        let expanded = expand_env_placeholders(raw)?;
        Ok(serde_yaml::from_str(&expanded)?)
    }

    /// Environment values win over the file; empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), anyhow::Error>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(key) = get("OCTOPUS_API_KEY") {
            self.octopus.api_key = Some(key);
        }
        if let Some(account) = get("OCTOPUS_ACCOUNT_NUMBER") {
            self.octopus.account_number = Some(account);
        }
        if let Some(transport) = get("OCTOPUS_TRANSPORT") {
            self.octopus.transport = transport.parse()?;
        }
        if let Some(url) = get("DATABASE_URL") {
            self.database.url = url;
        }
        if let Some(host) = get("API_HOST") {
            self.api.host = host;
        }
        if let Some(port) = get("API_PORT") {
            self.api.port = port
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid API_PORT {}: {}", port, e))?;
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), anyhow::Error> {
        if !(1..=MAX_LOOKBACK_DAYS).contains(&self.ingest.lookback_days) {
            anyhow::bail!(
                "ingest.lookback_days must be between 1 and {}, got {}",
                MAX_LOOKBACK_DAYS,
                self.ingest.lookback_days
            );
        }
        if self.octopus.timeout_secs == 0 {
            anyhow::bail!("octopus.timeout_secs must be positive");
        }
        if let Some(scheduler) = &self.scheduler {
            if scheduler.interval_secs == 0 {
                anyhow::bail!("scheduler.interval_secs must be positive");
            }
        }
        Ok(())
    }
}

/// Expand $(VAR) and ${VAR} placeholders using environment variables.
fn expand_env_placeholders(input: &str) -> Result<String, anyhow::Error> {
    use anyhow::Context;

    let mut out = String::with_capacity(input.len());
    let mut it = input.chars().peekable();

    while let Some(c) = it.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        let close = match it.peek().copied() {
            Some('$') => {
                it.next();
                out.push('$');
                continue;
            }
            Some('(') => ')',
            Some('{') => '}',
            _ => {
                out.push('$');
                continue;
            }
        };

        it.next();
        let var = read_until(&mut it, close)
            .with_context(|| format!("unterminated env placeholder: missing '{}'", close))?;
        let val = std::env::var(&var)
            .with_context(|| format!("missing environment variable: {}", var))?;
        out.push_str(&val);
    }

    Ok(out)
}

fn read_until<I>(it: &mut std::iter::Peekable<I>, end: char) -> Option<String>
where
    I: Iterator<Item = char>,
{
    let mut buf = String::new();
    for ch in it.by_ref() {
        if ch == end {
            return Some(buf);
        }
        buf.push(ch);
    }
    None
}
