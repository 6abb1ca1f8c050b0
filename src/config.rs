use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

use crate::error::AppError;

pub const DEFAULT_DATABASE_URL: &str = "sqlite://skill_tracker.db?mode=rwc";
pub const DEFAULT_DASHBOARD_TTL_SECS: u64 = 30;
pub const DEFAULT_QUERY_TTL_SECS: u64 = 60;
pub const DEFAULT_UNCATEGORIZED_LABEL: &str = "Uncategorized";
pub const DEFAULT_DELETED_PREFIX: &str = "[Deleted]";
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone, PartialEq)]
pub struct TrackerConfig {
    pub database_url: String,
    pub max_connections: u32,
    pub dashboard_ttl: Duration,
    pub query_ttl: Duration,
    /// Category that receives technologies and sessions of a deleted category.
    pub uncategorized_label: String,
    /// Prefix written into sessions whose technology was force-deleted.
    pub deleted_prefix: String,
    pub seed_blueprint: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            database_url: DEFAULT_DATABASE_URL.to_string(),
            max_connections: DEFAULT_MAX_CONNECTIONS,
            dashboard_ttl: Duration::from_secs(DEFAULT_DASHBOARD_TTL_SECS),
            query_ttl: Duration::from_secs(DEFAULT_QUERY_TTL_SECS),
            uncategorized_label: DEFAULT_UNCATEGORIZED_LABEL.to_string(),
            deleted_prefix: DEFAULT_DELETED_PREFIX.to_string(),
            seed_blueprint: true,
        }
    }
}

fn var(name: &str) -> Option<String> {
    dotenvy::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parsed<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match var(name) {
        Some(raw) => raw
            .parse()
            .map_err(|_| AppError::Config(format!("{} has an invalid value '{}'", name, raw))),
        None => Ok(default),
    }
}

fn flag(name: &str, default: bool) -> Result<bool, AppError> {
    match var(name).map(|v| v.to_ascii_lowercase()).as_deref() {
        None => Ok(default),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(AppError::Config(format!(
            "{} has an invalid value '{}'",
            name, other
        ))),
    }
}

impl TrackerConfig {
    /// Reads the process environment, falling back to defaults for unset variables.
    pub fn from_env() -> Result<Self, AppError> {
        let config = Self {
            database_url: var("DATABASE_URL").unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
            max_connections: parsed("TRACKER_MAX_CONNECTIONS", DEFAULT_MAX_CONNECTIONS)?,
            dashboard_ttl: Duration::from_secs(parsed(
                "TRACKER_DASHBOARD_TTL_SECS",
                DEFAULT_DASHBOARD_TTL_SECS,
            )?),
            query_ttl: Duration::from_secs(parsed(
                "TRACKER_QUERY_TTL_SECS",
                DEFAULT_QUERY_TTL_SECS,
            )?),
            uncategorized_label: var("TRACKER_UNCATEGORIZED_LABEL")
                .unwrap_or_else(|| DEFAULT_UNCATEGORIZED_LABEL.to_string()),
            deleted_prefix: var("TRACKER_DELETED_PREFIX")
                .unwrap_or_else(|| DEFAULT_DELETED_PREFIX.to_string()),
            seed_blueprint: flag("TRACKER_SEED_BLUEPRINT", true)?,
        };

        if config.max_connections == 0 {
            return Err(AppError::Config(
                "TRACKER_MAX_CONNECTIONS must be at least 1".to_string(),
            ));
        }

        info!(
            database_url = %config.database_url,
            dashboard_ttl_secs = config.dashboard_ttl.as_secs(),
            query_ttl_secs = config.query_ttl.as_secs(),
            "Loaded tracker configuration"
        );
        Ok(config)
    }

    /// Sentinel written into sessions of a force-deleted technology.
    pub fn deleted_marker(&self, technology: &str) -> String {
        format!("{} {}", self.deleted_prefix, technology)
    }

    pub fn is_deleted_marker(&self, value: &str) -> bool {
        is_deleted_marker(&self.deleted_prefix, value)
    }
}

/// Whether `value` has the exact shape produced by [`TrackerConfig::deleted_marker`]:
/// the prefix, one space, then a non-blank name.
pub fn is_deleted_marker(prefix: &str, value: &str) -> bool {
    value
        .strip_prefix(prefix)
        .and_then(|rest| rest.strip_prefix(' '))
        .is_some_and(|name| !name.trim().is_empty())
}

/// Which set of env files `load_environment` reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Profile {
    Development,
    Production,
}

impl Profile {
    pub fn from_env() -> Self {
        match var("TRACKER_PROFILE").as_deref() {
            Some("production" | "prod") => Profile::Production,
            _ => Profile::Development,
        }
    }

    /// Files in load order; later files override earlier ones.
    pub fn env_files(&self) -> [&'static str; 3] {
        match self {
            Profile::Development => ["config/common.env", "config/dev.env", ".secrets.env"],
            Profile::Production => ["config/common.env", "config/prod.env", ".secrets.env"],
        }
    }
}

/// Loads the current profile's env files into the process environment and returns the
/// ones that existed.
pub fn load_environment() -> Result<Vec<&'static str>, AppError> {
    let profile = Profile::from_env();
    let mut loaded = Vec::new();

    for path in profile.env_files() {
        if !Path::new(path).exists() {
            warn!(path, ?profile, "Environment file not found, skipping");
            continue;
        }

        dotenvy::from_filename_override(path)?;
        info!(path, "Loaded environment");
        loaded.push(path);
    }

    Ok(loaded)
}
