use std::str::FromStr;
use std::time::Duration;

use codepad_sandbox::{Limits, SandboxConfig};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid {name}={value:?}: {reason}")]
pub struct ConfigError {
    pub name: &'static str,
    pub value: String,
    pub reason: String,
}

/// Process configuration, read once from the environment at start-up.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    /// Base of the share links handed out for new sessions.
    pub client_url: String,
    /// Empty means any origin.
    pub cors_origins: Vec<String>,
    pub ws_max_frame_bytes: usize,
    pub sandbox: SandboxConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_owned(),
            port: 4000,
            client_url: "http://localhost:5173".to_owned(),
            cors_origins: Vec::new(),
            ws_max_frame_bytes: 1024 * 1024,
            sandbox: SandboxConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        let timeout_ms: u64 = parse(&get, "EXECUTION_TIMEOUT_MS", 4000)?;
        if timeout_ms == 0 {
            return Err(ConfigError {
                name: "EXECUTION_TIMEOUT_MS",
                value: timeout_ms.to_string(),
                reason: "must be positive".into(),
            });
        }
        let max_concurrent_runs: usize = parse(
            &get,
            "EXECUTION_MAX_CONCURRENT",
            defaults.sandbox.limits.max_concurrent_runs,
        )?;
        if max_concurrent_runs == 0 {
            return Err(ConfigError {
                name: "EXECUTION_MAX_CONCURRENT",
                value: max_concurrent_runs.to_string(),
                reason: "must be positive".into(),
            });
        }
        let limits = Limits {
            timeout: Duration::from_millis(timeout_ms),
            step_budget: parse(&get, "EXECUTION_STEP_BUDGET", defaults.sandbox.limits.step_budget)?,
            max_output_bytes: parse(
                &get,
                "EXECUTION_MAX_OUTPUT_BYTES",
                defaults.sandbox.limits.max_output_bytes,
            )?,
            memory_bytes: parse(&get, "EXECUTION_MEMORY_BYTES", defaults.sandbox.limits.memory_bytes)?,
            max_processes: parse(
                &get,
                "EXECUTION_MAX_PROCESSES",
                defaults.sandbox.limits.max_processes,
            )?,
            max_concurrent_runs,
        };
        let sandbox = SandboxConfig {
            limits,
            node_bin: get("NODE_BIN").unwrap_or(defaults.sandbox.node_bin),
            python_bin: get("PYTHON_BIN").unwrap_or(defaults.sandbox.python_bin),
            python_modules: defaults.sandbox.python_modules,
        };

        let cors_origins = match get("CORS_ORIGIN") {
            Some(origins) if origins.trim() != "*" => origins
                .split(',')
                .map(|origin| origin.trim().to_owned())
                .filter(|origin| !origin.is_empty())
                .collect(),
            _ => Vec::new(),
        };

        Ok(Self {
            host: get("HOST").unwrap_or(defaults.host),
            port: parse(&get, "PORT", defaults.port)?,
            client_url: get("CLIENT_URL")
                .map(|url| url.trim_end_matches('/').to_owned())
                .unwrap_or(defaults.client_url),
            cors_origins,
            ws_max_frame_bytes: parse(&get, "WS_MAX_FRAME_BYTES", defaults.ws_max_frame_bytes)?,
            sandbox,
        })
    }

    pub fn share_url(&self, session_id: &str) -> String {
        format!("{}/session/{}", self.client_url, session_id)
    }
}

fn parse<G, T>(get: &G, name: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match get(name) {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|e: T::Err| ConfigError {
            name,
            value: value.clone(),
            reason: e.to_string(),
        }),
    }
}
