pub mod config;
pub mod error;
pub mod types;

pub use config::WeftConfig;
pub use error::{Result, WeftError};
