pub mod alerting;
pub mod config;
pub mod engine;
pub mod error;
pub mod rules;
pub mod session;

pub use error::{Result, SigError};
