//! Command implementations.

mod info;
mod simulate;
mod validate;

pub use info::run_info;
pub use simulate::run_simulate;
pub use validate::run_validate;

use std::path::Path;

use contracts::SyncEngineConfig;

use crate::error::CliError;

/// Load and validate an engine configuration file.
pub(crate) fn load_config(path: &Path) -> Result<SyncEngineConfig, CliError> {
    if !path.exists() {
        return Err(CliError::config_not_found(path.display().to_string()));
    }
    config_loader::ConfigLoader::load_from_path(path)
        .map_err(|e| CliError::invalid_config(path.display().to_string(), e))
}
