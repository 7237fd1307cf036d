use std::fs;

use loan_appraisal_core::AppraisalConfig;

use crate::input::file::resolve_path;

/// Load appraisal settings from a TOML file, or defaults when no path is given.
pub fn load(path: Option<&str>) -> Result<AppraisalConfig, Box<dyn std::error::Error>> {
    let Some(path) = path else {
        return Ok(AppraisalConfig::default());
    };

    let canonical = resolve_path(path)?;
    let contents = fs::read_to_string(&canonical)
        .map_err(|e| format!("Failed to read '{}': {}", canonical.display(), e))?;
    let config: AppraisalConfig = toml::from_str(&contents)
        .map_err(|e| format!("Invalid config '{}': {}", canonical.display(), e))?;
    config.validate()?;

    tracing::debug!(path = %canonical.display(), policy = %config.default_policy, "config loaded");
    Ok(config)
}
