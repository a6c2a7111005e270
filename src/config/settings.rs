use crate::error::{Result, SigError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub rules: RulesConfig,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RulesConfig {
    pub paths: Vec<PathBuf>,
    /// Abort startup when any rule fails to parse, instead of skipping it
    #[serde(default)]
    pub strict: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DetectionConfig {
    /// 0 lets the pipeline pick a worker count from the CPU count
    #[serde(default)]
    pub worker_threads: usize,
    #[serde(default = "default_request_queue_size")]
    pub request_queue_size: usize,
    #[serde(default = "default_alert_queue_size")]
    pub alert_queue_size: usize,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            worker_threads: 0,
            request_queue_size: default_request_queue_size(),
            alert_queue_size: default_alert_queue_size(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_timeout")]
    pub idle_timeout_secs: u64,
    #[serde(default = "default_history_depth")]
    pub history_depth: usize,
    #[serde(default = "default_expire_interval")]
    pub expire_interval_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: default_session_timeout(),
            history_depth: default_history_depth(),
            expire_interval_secs: default_expire_interval(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutputConfig {
    Json { path: PathBuf },
    Fast { path: PathBuf },
    Stdout { format: String },
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig::Stdout {
            format: "fast".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_request_queue_size() -> usize {
    10_000
}

fn default_alert_queue_size() -> usize {
    1_000
}

fn default_session_timeout() -> u64 {
    120
}

fn default_history_depth() -> usize {
    32
}

fn default_expire_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Settings {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| SigError::Config(format!("Failed to read config file: {}", e)))?;

        let settings: Settings = serde_yaml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rules.paths.is_empty() {
            return Err(SigError::Config(
                "at least one rule path is required".to_string(),
            ));
        }
        for path in &self.rules.paths {
            if !path.exists() {
                tracing::warn!("Rule file does not exist: {:?}", path);
            }
        }

        if self.detection.worker_threads > 1000 {
            return Err(SigError::Config(
                "worker threads cannot exceed 1000".to_string(),
            ));
        }
        if self.detection.request_queue_size == 0 {
            return Err(SigError::Config(
                "request queue size must be greater than 0".to_string(),
            ));
        }
        if self.detection.alert_queue_size == 0 {
            return Err(SigError::Config(
                "alert queue size must be greater than 0".to_string(),
            ));
        }

        if self.session.idle_timeout_secs == 0 {
            return Err(SigError::Config(
                "session idle timeout must be greater than 0".to_string(),
            ));
        }

        if let OutputConfig::Stdout { format } = &self.output {
            if format != "json" && format != "fast" {
                return Err(SigError::Config(format!(
                    "unknown stdout output format: {:?}",
                    format
                )));
            }
        }

        Ok(())
    }

    pub fn default_config() -> Self {
        Settings {
            rules: RulesConfig {
                paths: vec![PathBuf::from("rules/web-dvwa.rules")],
                strict: false,
            },
            variables: {
                let mut vars = HashMap::new();
                vars.insert("HOME_NET".to_string(), "192.168.1.0/24".to_string());
                vars.insert("HTTP_PORTS".to_string(), "[80,8080]".to_string());
                vars
            },
            detection: DetectionConfig::default(),
            session: SessionConfig::default(),
            output: OutputConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}
