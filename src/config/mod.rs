pub mod settings;

pub use settings::{
    DetectionConfig, LoggingConfig, OutputConfig, RulesConfig, SessionConfig, Settings,
};
