use crate::Config;
use anyhow::{Context, Result};
use jsonc_parser::{parse_to_serde_value, ParseOptions};
use once_cell::sync::Lazy;
use regex::Regex;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "STRAND_CONFIG";
pub const CONFIG_CONTENT_ENV: &str = "STRAND_CONFIG_CONTENT";
const PROJECT_CONFIG_FILES: [&str; 2] = ["strand.jsonc", "strand.json"];

static ENV_REF: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{env:([^}]+)\}").unwrap());

pub struct ConfigLoader {
    config: Config,
    config_paths: Vec<PathBuf>,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
            config_paths: Vec::new(),
        }
    }

    pub fn load_from_str(&mut self, content: &str) -> Result<()> {
        let content = substitute_env_vars(content);
        let config: Config =
            parse_jsonc(&content).with_context(|| "Failed to parse config content")?;
        self.config.merge(config);
        Ok(())
    }

    /// Merge a config file. A missing file is not an error.
    pub fn load_from_file<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, skipping");
            return Ok(());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let content = substitute_env_vars(&content);
        let config: Config = parse_jsonc(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))?;

        self.config.merge(config);
        self.config_paths.push(path.to_path_buf());
        Ok(())
    }

    pub fn load_global(&mut self) -> Result<()> {
        let Some(base) = global_config_path() else {
            return Ok(());
        };
        for ext in ["jsonc", "json"] {
            let path = base.with_extension(ext);
            if path.exists() {
                return self.load_from_file(&path);
            }
        }
        Ok(())
    }

    pub fn load_project<P: AsRef<Path>>(&mut self, project_dir: P) -> Result<()> {
        for name in PROJECT_CONFIG_FILES {
            let path = project_dir.as_ref().join(name);
            if path.exists() {
                return self.load_from_file(&path);
            }
        }
        Ok(())
    }

    /// `STRAND_CONFIG` names a file; `STRAND_CONFIG_CONTENT` holds inline JSONC
    /// and is applied last.
    pub fn load_from_env(&mut self) -> Result<()> {
        if let Ok(config_path) = env::var(CONFIG_ENV) {
            self.load_from_file(&config_path)?;
        }
        if let Ok(content) = env::var(CONFIG_CONTENT_ENV) {
            self.load_from_str(&content)
                .with_context(|| format!("Failed to apply {}", CONFIG_CONTENT_ENV))?;
        }
        Ok(())
    }

    /// Merge order: global, project, environment.
    pub fn load_all<P: AsRef<Path>>(&mut self, project_dir: P) -> Result<Config> {
        self.load_global()?;
        self.load_project(project_dir)?;
        self.load_from_env()?;
        tracing::debug!(paths = ?self.config_paths, "configuration loaded");
        Ok(self.config.clone())
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_paths(&self) -> &[PathBuf] {
        &self.config_paths
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn global_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("strand/strand"))
}

/// Substitute `{env:VAR}` patterns with environment variable values.
/// Unset variables become empty strings.
fn substitute_env_vars(text: &str) -> String {
    ENV_REF
        .replace_all(text, |caps: &regex::Captures| {
            env::var(&caps[1]).unwrap_or_default()
        })
        .into_owned()
}

fn parse_jsonc(content: &str) -> Result<Config> {
    let parse_options = ParseOptions {
        allow_trailing_commas: true,
        ..Default::default()
    };
    let parsed = parse_to_serde_value(content, &parse_options)
        .with_context(|| "Failed to parse JSONC")?
        .context("Config content is empty")?;
    serde_json::from_value(parsed).with_context(|| "Failed to parse config JSON")
}

/// Load configuration for `project_dir` from every source.
pub fn load_config<P: AsRef<Path>>(project_dir: P) -> Result<Config> {
    ConfigLoader::new().load_all(project_dir)
}
