//! Frost binary support: settings, logging and the demo time-series query
//! the `frost` command runs on the execution core.

pub mod demo;
pub mod error;
pub mod logging;
pub mod settings;

pub use error::AppError;
pub use settings::Settings;
