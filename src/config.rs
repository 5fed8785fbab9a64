use crate::core::{GridError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;

/// Function dispatch settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Extra attempts for a failed invocation of an HA function
    pub ha_retry_attempts: u32,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            ha_retry_attempts: 1,
        }
    }
}

/// Grid member process configuration
///
/// Built with chained setters, or loaded from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Names of the members hosted by this process
    pub members: Vec<String>,

    /// Address the REST endpoint binds to
    pub bind_address: String,

    /// URL contexts the REST endpoint is served under
    pub url_contexts: Vec<String>,

    /// Name prefix of transaction completion worker threads
    pub worker_thread_prefix: String,

    /// Function dispatch settings
    pub dispatcher: DispatcherConfig,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            members: Vec::new(),
            bind_address: "127.0.0.1:7070".to_string(),
            url_contexts: vec!["/geode".to_string(), "/gemfire-api".to_string()],
            worker_thread_prefix: "tx-completion".to_string(),
            dispatcher: DispatcherConfig::default(),
        }
    }
}

impl GridConfig {
    /// Create a configuration with default settings and no members
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a configuration from a JSON document and validate it
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| GridError::Configuration(format!("invalid config JSON: {}", err)))?;
        config.validate()?;
        Ok(config)
    }

    /// Add a hosted member
    pub fn member(mut self, name: &str) -> Self {
        self.members.push(name.to_string());
        self
    }

    /// Replace the hosted members
    pub fn members<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.members = names.into_iter().map(Into::into).collect();
        self
    }

    /// Set the REST bind address
    pub fn bind_address(mut self, address: &str) -> Self {
        self.bind_address = address.to_string();
        self
    }

    /// Replace the REST URL contexts
    pub fn url_contexts<I, S>(mut self, contexts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.url_contexts = contexts.into_iter().map(Into::into).collect();
        self
    }

    /// Set the completion worker thread name prefix
    pub fn worker_thread_prefix(mut self, prefix: &str) -> Self {
        self.worker_thread_prefix = prefix.to_string();
        self
    }

    /// Set retry attempts for HA functions
    pub fn ha_retry_attempts(mut self, attempts: u32) -> Self {
        self.dispatcher.ha_retry_attempts = attempts;
        self
    }

    /// Parsed bind address
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        self.bind_address.parse().map_err(|err| {
            GridError::Configuration(format!(
                "invalid bind address '{}': {}",
                self.bind_address, err
            ))
        })
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(GridError::Configuration(
                "at least one member is required".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for member in &self.members {
            if member.trim().is_empty() {
                return Err(GridError::Configuration(
                    "member names must not be empty".to_string(),
                ));
            }
            if !seen.insert(member.as_str()) {
                return Err(GridError::Configuration(format!(
                    "member '{}' is listed twice",
                    member
                )));
            }
        }

        if self.url_contexts.is_empty() {
            return Err(GridError::Configuration(
                "at least one URL context is required".to_string(),
            ));
        }
        for context in &self.url_contexts {
            if !context.starts_with('/') || context.len() < 2 || context.ends_with('/') {
                return Err(GridError::Configuration(format!(
                    "URL context '{}' must start with '/' and not end with '/'",
                    context
                )));
            }
        }

        if self.worker_thread_prefix.trim().is_empty() {
            return Err(GridError::Configuration(
                "worker_thread_prefix must not be empty".to_string(),
            ));
        }

        self.socket_addr()?;
        Ok(())
    }
}
