//! Facts rules shared library
//!
//! Provides functions shared by the engine tools, including:
//! - logging initialisation
//! - layered configuration loading

pub mod config_loader;
pub mod error;
pub mod logging;

pub use error::{CommonError, Result};
pub use logging::LogConfig;
