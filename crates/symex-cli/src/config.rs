//! Configuration file support for symex
//!
//! Loads `.symex.toml` from current directory or parent directories.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use symex_core::env::Limits;

/// Configuration file structure
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub limits: Limits,
    pub paths: PathsConfig,
    pub output: OutputConfig,
    /// Write a run log to this file
    pub log_file: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Glob patterns to exclude when collecting files from a directory
    pub exclude: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Output format: "ifdef", "xml" or "json"
    pub format: Option<String>,
    /// Write one artifact per root file here instead of printing
    pub directory: Option<PathBuf>,
}

impl Config {
    /// Load config from `.symex.toml` searching from current directory upward
    pub fn load() -> Result<Option<(Config, PathBuf)>> {
        Self::load_from(std::env::current_dir()?)
    }

    /// Load config searching from the given directory upward
    pub fn load_from(start_dir: PathBuf) -> Result<Option<(Config, PathBuf)>> {
        let mut current = Some(start_dir.as_path());

        while let Some(dir) = current {
            let config_path = dir.join(".symex.toml");
            if config_path.exists() {
                return Ok(Some((Self::load_path(&config_path)?, config_path)));
            }
            current = dir.parent();
        }

        Ok(None)
    }

    /// Load config from a specific path
    pub fn load_path(path: &Path) -> Result<Config> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(config)
    }

    /// Limits after applying command-line overrides
    pub fn effective_limits(
        &self,
        max_loop_iterations: Option<usize>,
        max_call_depth: Option<usize>,
        max_include_depth: Option<usize>,
    ) -> Limits {
        Limits {
            max_loop_iterations: max_loop_iterations.unwrap_or(self.limits.max_loop_iterations),
            max_call_depth: max_call_depth.unwrap_or(self.limits.max_call_depth),
            max_include_depth: max_include_depth.unwrap_or(self.limits.max_include_depth),
            ..self.limits
        }
    }

    /// Check if a path should be excluded based on config patterns
    pub fn should_exclude(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();

        for pattern in &self.paths.exclude {
            if let Ok(glob_pattern) = glob::Pattern::new(pattern) {
                if glob_pattern.matches(&path_str) {
                    return true;
                }
                if let Some(file_name) = path.file_name() {
                    if glob_pattern.matches(&file_name.to_string_lossy()) {
                        return true;
                    }
                }
            }

            // directory patterns match any path component
            if pattern.ends_with('/') {
                let dir_pattern = pattern.trim_end_matches('/');
                if path_str.contains(&format!("/{}/", dir_pattern))
                    || path_str.starts_with(&format!("{}/", dir_pattern))
                {
                    return true;
                }
            }
        }

        false
    }
}
