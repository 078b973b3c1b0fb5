use tracing_subscriber::EnvFilter;

use crate::error::AppError;
use crate::settings::LogSettings;

/// Installs the global `tracing` subscriber. `RUST_LOG` wins over the
/// configured level.
pub fn init(settings: &LogSettings) -> Result<(), AppError> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&settings.level))
        .map_err(|e| AppError::Logging(e.to_string()))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true);
    let installed = if settings.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| AppError::Logging(e.to_string()))
}
