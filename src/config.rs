use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use serde::{Deserialize, Serialize};

use crate::utils;

pub const DEFAULT_MLH_URL: &str = "https://mlh.io/seasons/2025/events.json";
pub const DEFAULT_DEVPOST_URL: &str =
    "https://devpost.com/api/hackathons?status[]=upcoming&status[]=open";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8787";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_USER_AGENT: &str = "hackathon-ingest/0.1";

const CONFIG_PATH_VAR: &str = "HACKATHON_INGEST_CONFIG";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    pub mlh_url: String,
    pub devpost_url: String,
    pub database_path: Option<PathBuf>,
    pub supabase_url: Option<String>,
    pub supabase_service_role_key: Option<String>,
    pub bind_addr: String,
    pub http_timeout_secs: u64,
    pub user_agent: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            mlh_url: DEFAULT_MLH_URL.to_string(),
            devpost_url: DEFAULT_DEVPOST_URL.to_string(),
            database_path: None,
            supabase_url: None,
            supabase_service_role_key: None,
            bind_addr: DEFAULT_BIND_ADDR.to_string(),
            http_timeout_secs: DEFAULT_TIMEOUT_SECS,
            user_agent: DEFAULT_USER_AGENT.to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the JSON config file, then the process environment.
    pub fn load() -> Self {
        let _ = dotenvy::dotenv();
        let path = std::env::var(CONFIG_PATH_VAR)
            .map(PathBuf::from)
            .unwrap_or_else(|_| utils::config_path());
        Self::from_sources(Some(path.as_path()), |key| std::env::var(key).ok())
    }

    pub fn from_sources<F>(path: Option<&Path>, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path.map(read_config) {
            Some(Ok(config)) => config,
            Some(Err(err)) => {
                tracing::warn!(error = %err, "ignoring unreadable config file");
                AppConfig::default()
            }
            None => AppConfig::default(),
        };
        config.apply_env(env);
        config
    }

    fn apply_env<F>(&mut self, env: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| utils::non_empty(env(key));

        if let Some(url) = get("MLH_URL") {
            self.mlh_url = url;
        }
        if let Some(url) = get("DEVPOST_URL") {
            self.devpost_url = url;
        }
        if let Some(path) = get("DATABASE_PATH") {
            self.database_path = Some(PathBuf::from(path));
        }
        if let Some(url) = get("SUPABASE_URL") {
            self.supabase_url = Some(url);
        }
        if let Some(key) = get("SUPABASE_SERVICE_ROLE_KEY") {
            self.supabase_service_role_key = Some(key);
        }
        if let Some(addr) = get("BIND_ADDR") {
            self.bind_addr = addr;
        }
        if let Some(secs) = get("HTTP_TIMEOUT_SECS").and_then(|s| s.parse::<u64>().ok()) {
            self.http_timeout_secs = secs;
        }
        if let Some(agent) = get("USER_AGENT") {
            self.user_agent = agent;
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }

    pub fn resolved_database_path(&self) -> PathBuf {
        self.database_path
            .clone()
            .unwrap_or_else(utils::database_path)
    }
}

fn read_config(path: &Path) -> Result<AppConfig, String> {
    if !path.exists() {
        return Ok(AppConfig::default());
    }
    let contents = fs::read_to_string(path).map_err(|err| err.to_string())?;
    serde_json::from_str(&contents).map_err(|err| err.to_string())
}
