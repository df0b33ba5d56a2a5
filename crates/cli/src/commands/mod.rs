pub mod analyze;
pub mod config_cmd;
pub mod serve;
pub mod subjects;

use mediguard_config::AppConfig;
use std::path::PathBuf;

/// Load configuration, applying a `--records` override.
pub fn load_config(records: Option<PathBuf>) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(path) = records {
        config.data.records_path = path;
    }
    Ok(config)
}
