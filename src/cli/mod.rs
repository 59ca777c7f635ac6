use crate::{BroadcastError, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_TOKEN_FILE: &str = "/var/run/secrets/kubernetes.io/serviceaccount/token";

const DEBUG_TOKENS: [&str; 4] = ["true", "1", "yes", "on"];

#[derive(Parser, Debug, Clone)]
#[command(name = "kube-broadcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Fan an HTTP request out to every pod matching a label selector", long_about = None)]
pub struct Cli {
    #[arg(
        short,
        long,
        env = "DEBUG",
        action = clap::ArgAction::Set,
        default_value = "false",
        value_parser = parse_debug_flag,
        num_args = 0..=1,
        default_missing_value = "true",
        help = "Enable verbose logging"
    )]
    pub verbose: bool,

    #[arg(long, env = "NAMESPACE", default_value = "default", help = "Kubernetes namespace to discover pods in")]
    pub namespace: String,

    #[arg(long, env = "LABEL_SELECTOR", default_value = "app=my-app", help = "Label selector matching broadcast targets")]
    pub label_selector: String,

    #[arg(short, long, env = "PORT", default_value_t = 1993, help = "Port to listen on")]
    pub port: u16,

    #[arg(long, env = "CACHE_DURATION_MS", default_value_t = 1000, help = "How long a pod list is reused, in milliseconds")]
    pub cache_duration_ms: u64,

    #[arg(long, env = "TOKEN", hide_env_values = true, help = "Bearer token for the Kubernetes API")]
    pub token: Option<String>,

    #[arg(long, env = "TOKEN_FILE", help = "File holding the bearer token for the Kubernetes API")]
    pub token_file: Option<PathBuf>,

    #[arg(long, env = "KUBE_API_SERVER", help = "Kubernetes API server URL (defaults to in-cluster config)")]
    pub api_server: Option<String>,

    #[arg(long, env = "REQUEST_TIMEOUT_MS", help = "Timeout for each downstream request, in milliseconds")]
    pub request_timeout_ms: Option<u64>,
}

impl Cli {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_duration_ms)
    }

    pub fn request_timeout(&self) -> Option<Duration> {
        self.request_timeout_ms.map(Duration::from_millis)
    }

    /// Bearer token for the control plane.
    ///
    /// An explicit token wins. Otherwise the configured token file is read, falling
    /// back to the service-account file only when talking to an explicit API server;
    /// in-cluster config handles that file itself.
    pub fn resolve_token(&self) -> Result<Option<String>> {
        if let Some(token) = &self.token {
            return Ok(Some(token.trim().to_string()));
        }

        let path = match (&self.token_file, &self.api_server) {
            (Some(path), _) => path.clone(),
            (None, Some(_)) => {
                let default = PathBuf::from(DEFAULT_TOKEN_FILE);
                if !default.exists() {
                    return Ok(None);
                }
                default
            }
            (None, None) => return Ok(None),
        };

        let token = std::fs::read_to_string(&path).map_err(|e| {
            BroadcastError::ConfigError(format!(
                "Failed to read token file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Some(token.trim().to_string()))
    }
}

/// Parse a `DEBUG`-style toggle: a comma separated list where any of
/// `true`, `1`, `yes` or `on` (case-insensitive) turns it on.
pub fn parse_debug_flag(value: &str) -> std::result::Result<bool, String> {
    Ok(value
        .to_lowercase()
        .split(',')
        .map(str::trim)
        .any(|token| DEBUG_TOKENS.contains(&token)))
}
