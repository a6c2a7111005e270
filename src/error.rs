use crate::rules::parser::ParseError;
use thiserror::Error;

/// Main error type for sigsift
#[derive(Error, Debug)]
pub enum SigError {
    #[error("Rule parse error: {0}")]
    RuleParse(#[from] ParseError),

    #[error("Duplicate sid {0} in rule set")]
    DuplicateSid(u32),

    #[error("Rule {sid}: {reason}")]
    RuleCompile { sid: u32, reason: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Channel receive error")]
    ChannelRecv,

    #[error("Other error: {0}")]
    Other(String),
}

/// Result type alias for sigsift operations
pub type Result<T> = std::result::Result<T, SigError>;

impl<T> From<crossbeam::channel::SendError<T>> for SigError {
    fn from(_: crossbeam::channel::SendError<T>) -> Self {
        SigError::ChannelSend
    }
}

impl From<crossbeam::channel::RecvError> for SigError {
    fn from(_: crossbeam::channel::RecvError) -> Self {
        SigError::ChannelRecv
    }
}
