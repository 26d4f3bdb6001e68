// This file is part of the product TagLedger.
// SPDX-FileCopyrightText: 2025-2026 Zivatar Limited
// SPDX-License-Identifier: AGPL-3.0-or-later
// The code and documentation in this repository is licensed under the GNU Affero General Public License v3.0 or later (AGPL-3.0-or-later). See LICENSE.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::progress::{RegistrySettings, RunnerSettings};

#[derive(Debug)]
pub enum ConfigError {
    LoadError(String),
    ValidationError(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::LoadError(msg) => write!(f, "Configuration load error: {}", msg),
            ConfigError::ValidationError(msg) => {
                write!(f, "Configuration validation error: {}", msg)
            }
        }
    }
}

impl std::error::Error for ConfigError {}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    2
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AppConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// One static principal for the token verifier. Production deployments plug
/// a real verifier into the same seam; this section exists for development
/// and tests.
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct UserConfig {
    pub token: String,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub roles: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProgressConfig {
    #[serde(default = "default_batch_size")]
    pub batch_size: u64,
    #[serde(default = "default_update_interval_ms")]
    pub update_interval_ms: u64,
    #[serde(default = "default_heartbeat_seconds")]
    pub heartbeat_seconds: u64,
    #[serde(default = "default_stall_timeout_seconds")]
    pub stall_timeout_seconds: u64,
    #[serde(default = "default_retain_seconds")]
    pub retain_seconds: u64,
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
    #[serde(default = "default_subscriber_buffer")]
    pub subscriber_buffer: usize,
    #[serde(default = "default_max_import_items")]
    pub max_import_items: usize,
}

fn default_batch_size() -> u64 {
    200
}

fn default_update_interval_ms() -> u64 {
    250
}

fn default_heartbeat_seconds() -> u64 {
    15
}

fn default_stall_timeout_seconds() -> u64 {
    300
}

fn default_retain_seconds() -> u64 {
    60
}

fn default_sweep_interval_seconds() -> u64 {
    10
}

fn default_subscriber_buffer() -> usize {
    32
}

fn default_max_import_items() -> usize {
    50_000
}

impl Default for ProgressConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            update_interval_ms: default_update_interval_ms(),
            heartbeat_seconds: default_heartbeat_seconds(),
            stall_timeout_seconds: default_stall_timeout_seconds(),
            retain_seconds: default_retain_seconds(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
            subscriber_buffer: default_subscriber_buffer(),
            max_import_items: default_max_import_items(),
        }
    }
}

impl ProgressConfig {
    pub fn registry_settings(&self) -> RegistrySettings {
        RegistrySettings {
            stall_timeout: Duration::from_secs(self.stall_timeout_seconds),
            retention: Duration::from_secs(self.retain_seconds),
            sweep_interval: Duration::from_secs(self.sweep_interval_seconds),
            subscriber_buffer: self.subscriber_buffer,
        }
    }

    pub fn runner_settings(&self) -> RunnerSettings {
        RunnerSettings {
            batch_size: self.batch_size,
            update_interval: Duration::from_millis(self.update_interval_ms),
        }
    }

    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_seconds)
    }
}

// Structure matching the YAML file format.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    pub server: ServerConfig,
    pub app: AppConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub progress: ProgressConfig,
}

#[derive(Debug, Clone)]
pub struct ValidatedConfig {
    pub server: ServerConfig,
    pub app: AppConfig,
    pub logging: LoggingConfig,
    pub users: Vec<UserConfig>,
    pub progress: ProgressConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            ConfigError::LoadError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        serde_yaml::from_str(&content).map_err(|e| {
            ConfigError::LoadError(format!("Cannot parse {}: {}", path.display(), e))
        })
    }

    pub fn load_and_validate(path: &Path) -> Result<ValidatedConfig, ConfigError> {
        Self::load(path)?.validate()
    }

    pub fn validate(self) -> Result<ValidatedConfig, ConfigError> {
        validate_server(&self.server)?;
        validate_logging(&self.logging)?;
        validate_users(&self.users)?;
        validate_progress(&self.progress)?;
        Ok(ValidatedConfig {
            server: self.server,
            app: self.app,
            logging: self.logging,
            users: self.users,
            progress: self.progress,
        })
    }
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.host.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "server.host must not be empty".to_string(),
        ));
    }
    if server.workers == 0 {
        return Err(ConfigError::ValidationError(
            "server.workers must be at least 1".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    logging
        .level
        .parse::<log::LevelFilter>()
        .map_err(|_| {
            ConfigError::ValidationError(format!(
                "logging.level '{}' is not one of off, error, warn, info, debug, trace",
                logging.level
            ))
        })
        .map(|_| ())
}

fn validate_users(users: &[UserConfig]) -> Result<(), ConfigError> {
    let mut seen = std::collections::HashSet::new();
    for user in users {
        if user.token.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "users entry '{}' has an empty token",
                user.id
            )));
        }
        if user.id.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "users entries must have a non-empty id".to_string(),
            ));
        }
        if !seen.insert(user.token.as_str()) {
            return Err(ConfigError::ValidationError(
                "users tokens must be unique".to_string(),
            ));
        }
    }
    Ok(())
}

fn validate_progress(progress: &ProgressConfig) -> Result<(), ConfigError> {
    if progress.batch_size == 0 {
        return Err(ConfigError::ValidationError(
            "progress.batch_size must be greater than 0".to_string(),
        ));
    }
    if progress.update_interval_ms == 0 {
        return Err(ConfigError::ValidationError(
            "progress.update_interval_ms must be greater than 0".to_string(),
        ));
    }
    if progress.heartbeat_seconds == 0 {
        return Err(ConfigError::ValidationError(
            "progress.heartbeat_seconds must be greater than 0".to_string(),
        ));
    }
    if Duration::from_secs(progress.stall_timeout_seconds)
        <= Duration::from_millis(progress.update_interval_ms)
    {
        return Err(ConfigError::ValidationError(
            "progress.stall_timeout_seconds must exceed the update interval".to_string(),
        ));
    }
    if progress.sweep_interval_seconds == 0 {
        return Err(ConfigError::ValidationError(
            "progress.sweep_interval_seconds must be greater than 0".to_string(),
        ));
    }
    if progress.subscriber_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "progress.subscriber_buffer must be greater than 0".to_string(),
        ));
    }
    if progress.max_import_items == 0 {
        return Err(ConfigError::ValidationError(
            "progress.max_import_items must be greater than 0".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
pub fn test_config() -> ValidatedConfig {
    ValidatedConfig {
        server: ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            workers: 1,
        },
        app: AppConfig {
            name: "Test App".to_string(),
            description: "Test Description".to_string(),
        },
        logging: LoggingConfig::default(),
        users: vec![
            UserConfig {
                token: "alice-token".to_string(),
                id: "alice".to_string(),
                name: "Alice".to_string(),
                roles: vec!["admin".to_string()],
            },
            UserConfig {
                token: "bob-token".to_string(),
                id: "bob".to_string(),
                name: "Bob".to_string(),
                roles: vec![],
            },
        ],
        progress: ProgressConfig {
            batch_size: 25,
            update_interval_ms: 50,
            ..ProgressConfig::default()
        },
    }
}
