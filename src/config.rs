// src/config.rs

//! Configuration loading with command line overrides.

use std::path::{Path, PathBuf};

use crate::error::AppError;
use crate::models::Config;

/// Command line settings applied on top of the configuration file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub verbose: bool,
    pub log_file: Option<PathBuf>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if self.verbose {
            config.logging.level = "debug".to_string();
        }
        if let Some(file) = &self.log_file {
            config.logging.file = Some(file.clone());
        }
    }
}

/// A configuration ready for use.
#[derive(Debug)]
pub struct Loaded {
    pub config: Config,
    /// Why defaults were used instead of the file, if they were.
    ///
    /// Kept so it can be reported once logging is installed.
    pub fallback: Option<AppError>,
}

/// Load `path`, falling back to defaults, then apply `overrides`.
pub fn load(path: &Path, overrides: &Overrides) -> Loaded {
    let (mut config, fallback) = match Config::load(path) {
        Ok(config) => (config, None),
        Err(e) => (Config::default(), Some(e)),
    };
    overrides.apply(&mut config);
    Loaded { config, fallback }
}
