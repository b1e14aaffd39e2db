use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use comfymcp_comfyui::orchestrator::PollConfig;

/// Errors from reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// A variable is set but its value cannot be parsed.
    #[error("Invalid value for {key}: '{value}'")]
    Invalid { key: &'static str, value: String },
}

/// How the server talks to its callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// JSON over HTTP.
    Http,
    /// Newline-delimited JSON over stdin/stdout.
    Stdio,
}

impl FromStr for Transport {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Self::Http),
            "stdio" => Ok(Self::Stdio),
            _ => Err(()),
        }
    }
}

/// Connection to the ComfyUI backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    pub poll_interval_ms: u64,
    /// Upper bound on one job's submit + poll time; `0` disables it.
    pub job_deadline_secs: u64,
    pub request_timeout_secs: u64,
}

impl BackendConfig {
    /// Base URL of the backend, e.g. `http://127.0.0.1:8188`.
    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    pub fn poll_config(&self) -> PollConfig {
        PollConfig {
            interval: Duration::from_millis(self.poll_interval_ms),
            deadline: (self.job_deadline_secs > 0).then_some(Duration::from_secs(self.job_deadline_secs)),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Log output settings. Can be swapped at runtime through
/// [`LogHandle::reconfigure`](crate::telemetry::LogHandle::reconfigure).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` directive, e.g. `info` or `comfymcp_comfyui=debug,info`.
    pub level: String,
    /// Whether to write human-readable logs to stderr.
    pub console: bool,
    /// JSON log file; `None` disables file logging.
    pub file: Option<PathBuf>,
    /// Rotate once the active file would exceed this many bytes.
    pub max_file_size: u64,
    /// Rotated files kept next to the active one.
    pub backup_count: usize,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            file: Some(PathBuf::from("logs/mcp_server.log")),
            max_file_size: 10 * 1024 * 1024,
            backup_count: 5,
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for a local ComfyUI install.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub backend: BackendConfig,
    /// Bind address for the HTTP transport (default: `0.0.0.0`).
    pub host: String,
    /// Bind port for the HTTP transport (default: `9000`).
    pub port: u16,
    pub transport: Transport,
    /// Per-request limit on the HTTP transport. Must outlast a job.
    pub request_timeout_secs: u64,
    /// Directory holding `<tool>_api.json` templates.
    pub template_dir: PathBuf,
    /// Directory holding capability caches.
    pub object_info_dir: PathBuf,
    pub logging: LoggingConfig,
}

impl ServerConfig {
    /// Load configuration from the process environment.
    ///
    /// | Env Var                        | Default               |
    /// |--------------------------------|-----------------------|
    /// | `COMFYUI_HOST`                 | `127.0.0.1`           |
    /// | `COMFYUI_PORT`                 | `8188`                |
    /// | `COMFYUI_POLL_INTERVAL_MS`     | `3000`                |
    /// | `COMFYUI_JOB_DEADLINE_SECS`    | `600` (`0` = none)    |
    /// | `COMFYUI_REQUEST_TIMEOUT_SECS` | `30`                  |
    /// | `MCP_HOST`                     | `0.0.0.0`             |
    /// | `MCP_PORT`                     | `9000`                |
    /// | `MCP_TRANSPORT`                | `http` (or `stdio`)   |
    /// | `MCP_REQUEST_TIMEOUT_SECS`     | `660`                 |
    /// | `MCP_TEMPLATE_DIR`             | `templates`           |
    /// | `MCP_OBJECT_INFO_DIR`          | `object_info`         |
    /// | `LOG_LEVEL`                    | `info`                |
    /// | `LOG_CONSOLE`                  | `true`                |
    /// | `LOG_FILE`                     | `logs/mcp_server.log` (empty = none) |
    /// | `LOG_MAX_FILE_SIZE`            | `10485760`            |
    /// | `LOG_BACKUP_COUNT`             | `5`                   |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let vars = Vars(lookup);
        let log_defaults = LoggingConfig::default();

        let backend = BackendConfig {
            host: vars.string("COMFYUI_HOST", "127.0.0.1"),
            port: vars.parse("COMFYUI_PORT", 8188)?,
            poll_interval_ms: vars.parse("COMFYUI_POLL_INTERVAL_MS", 3000)?,
            job_deadline_secs: vars.parse("COMFYUI_JOB_DEADLINE_SECS", 600)?,
            request_timeout_secs: vars.parse("COMFYUI_REQUEST_TIMEOUT_SECS", 30)?,
        };

        let transport = match vars.get("MCP_TRANSPORT") {
            None => Transport::Http,
            Some(value) => value.parse().map_err(|()| ConfigError::Invalid {
                key: "MCP_TRANSPORT",
                value,
            })?,
        };

        let file = match vars.raw("LOG_FILE") {
            None => log_defaults.file.clone(),
            Some(path) if path.trim().is_empty() => None,
            Some(path) => Some(PathBuf::from(path)),
        };

        let logging = LoggingConfig {
            level: vars.string("LOG_LEVEL", &log_defaults.level),
            console: vars.flag("LOG_CONSOLE", log_defaults.console)?,
            file,
            max_file_size: vars.parse("LOG_MAX_FILE_SIZE", log_defaults.max_file_size)?,
            backup_count: vars.parse("LOG_BACKUP_COUNT", log_defaults.backup_count)?,
        };

        Ok(Self {
            backend,
            host: vars.string("MCP_HOST", "0.0.0.0"),
            port: vars.parse("MCP_PORT", 9000)?,
            transport,
            request_timeout_secs: vars.parse("MCP_REQUEST_TIMEOUT_SECS", 660)?,
            template_dir: PathBuf::from(vars.string("MCP_TEMPLATE_DIR", "templates")),
            object_info_dir: PathBuf::from(vars.string("MCP_OBJECT_INFO_DIR", "object_info")),
            logging,
        })
    }
}

// ---- private helpers ----

struct Vars<F>(F);

impl<F: Fn(&str) -> Option<String>> Vars<F> {
    fn raw(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    /// Set and non-blank.
    fn get(&self, key: &str) -> Option<String> {
        self.raw(key).filter(|v| !v.trim().is_empty())
    }

    fn string(&self, key: &str, default: &str) -> String {
        self.get(key)
            .map(|v| v.trim().to_string())
            .unwrap_or_else(|| default.to_string())
    }

    fn parse<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Invalid { key, value }),
        }
    }

    fn flag(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => match value.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Ok(true),
                "0" | "false" | "no" | "off" => Ok(false),
                _ => Err(ConfigError::Invalid { key, value }),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use assert_matches::assert_matches;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = load(&[]).unwrap();
        assert_eq!(config.backend.api_url(), "http://127.0.0.1:8188");
        assert_eq!(config.port, 9000);
        assert_eq!(config.transport, Transport::Http);
        assert_eq!(config.template_dir, PathBuf::from("templates"));
        assert_eq!(config.logging, LoggingConfig::default());

        let poll = config.backend.poll_config();
        assert_eq!(poll.interval, Duration::from_secs(3));
        assert_eq!(poll.deadline, Some(Duration::from_secs(600)));
    }

    #[test]
    fn overrides_are_parsed() {
        let config = load(&[
            ("COMFYUI_HOST", "gpu-box"),
            ("COMFYUI_PORT", "8189"),
            ("COMFYUI_JOB_DEADLINE_SECS", "0"),
            ("MCP_TRANSPORT", "STDIO"),
            ("LOG_CONSOLE", "no"),
            ("LOG_FILE", ""),
            ("LOG_BACKUP_COUNT", "2"),
        ])
        .unwrap();

        assert_eq!(config.backend.api_url(), "http://gpu-box:8189");
        assert_eq!(config.backend.poll_config().deadline, None);
        assert_eq!(config.transport, Transport::Stdio);
        assert!(!config.logging.console);
        assert_eq!(config.logging.file, None);
        assert_eq!(config.logging.backup_count, 2);
    }

    #[test]
    fn malformed_values_are_errors() {
        assert_matches!(
            load(&[("COMFYUI_PORT", "eighty")]),
            Err(ConfigError::Invalid { key: "COMFYUI_PORT", value }) if value == "eighty"
        );
        assert_matches!(
            load(&[("MCP_TRANSPORT", "carrier-pigeon")]),
            Err(ConfigError::Invalid { key: "MCP_TRANSPORT", .. })
        );
        assert_matches!(
            load(&[("LOG_CONSOLE", "maybe")]),
            Err(ConfigError::Invalid { key: "LOG_CONSOLE", .. })
        );
    }
}
