// src/config/validate.rs

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{AutoconvertError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AutoconvertError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.run, raw.flatten, raw.image))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_run_section(cfg)?;
    ensure_some_phase(cfg)?;
    validate_programs(cfg)?;
    Ok(())
}

fn validate_run_section(cfg: &RawConfigFile) -> Result<()> {
    if cfg.run.max_processes == 0 {
        return Err(AutoconvertError::ConfigError(
            "[run].max_processes must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}

fn ensure_some_phase(cfg: &RawConfigFile) -> Result<()> {
    if !cfg.flatten.enabled && !cfg.image.enabled {
        return Err(AutoconvertError::ConfigError(
            "both [flatten] and [image] are disabled; nothing to do".to_string(),
        ));
    }
    Ok(())
}

fn validate_programs(cfg: &RawConfigFile) -> Result<()> {
    let phases = [
        ("flatten", cfg.flatten.enabled, &cfg.flatten.program),
        ("image", cfg.image.enabled, &cfg.image.program),
    ];

    for (section, enabled, program) in phases {
        if enabled && program.trim().is_empty() {
            return Err(AutoconvertError::ConfigError(format!(
                "[{section}].program must not be empty while the phase is enabled"
            )));
        }
    }
    Ok(())
}
