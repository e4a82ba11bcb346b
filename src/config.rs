use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,
    #[serde(default)]
    pub renewal: RenewalConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PathsConfig {
    #[serde(default = "default_input_dir")]
    pub input_dir: PathBuf,
    #[serde(default = "default_config_file")]
    pub config_file: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    #[serde(default = "default_cert_file")]
    pub cert_file: String,
    #[serde(default = "default_key_file")]
    pub key_file: String,
}

fn default_input_dir() -> PathBuf { PathBuf::from("/input") }
fn default_config_file() -> String { "cosmos.config.json".to_string() }
fn default_output_dir() -> PathBuf { PathBuf::from("/output/certs") }
fn default_cert_file() -> String { "cert.pem".to_string() }
fn default_key_file() -> String { "key.pem".to_string() }

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            input_dir: default_input_dir(),
            config_file: default_config_file(),
            output_dir: default_output_dir(),
            cert_file: default_cert_file(),
            key_file: default_key_file(),
        }
    }
}

impl PathsConfig {
    /// Full path of the watched config document
    pub fn config_path(&self) -> PathBuf {
        self.input_dir.join(&self.config_file)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct RenewalConfig {
    /// Seconds between periodic checks, `0` disables the timer
    #[serde(default)]
    pub check_interval_secs: u64,
    #[serde(default = "default_debounce_millis")]
    pub debounce_millis: u64,
}

fn default_debounce_millis() -> u64 { 250 }

impl Default for RenewalConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 0,
            debounce_millis: default_debounce_millis(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default = "default_log_output")]
    pub output: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

fn default_log_level() -> String { "info".to_string() }
fn default_log_format() -> String { "text".to_string() }
fn default_log_output() -> String { "console".to_string() }

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            output: default_log_output(),
            file_path: None,
        }
    }
}

/// Values supplied on the command line or through the environment
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub input_dir: Option<PathBuf>,
    pub output_dir: Option<PathBuf>,
    pub check_interval_secs: Option<u64>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

impl Config {
    pub fn apply(&mut self, overrides: Overrides) {
        if let Some(dir) = overrides.input_dir {
            self.paths.input_dir = dir;
        }
        if let Some(dir) = overrides.output_dir {
            self.paths.output_dir = dir;
        }
        if let Some(secs) = overrides.check_interval_secs {
            self.renewal.check_interval_secs = secs;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
        if let Some(format) = overrides.log_format {
            self.logging.format = format;
        }
    }
}

/// Load settings from a TOML file, or defaults when no file is given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let Some(path) = path else {
        return Ok(Config::default());
    };
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file: {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse settings file: {}", path.display()))?;
    Ok(config)
}

fn validate_file_name(field: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        anyhow::bail!("{} must not be empty", field);
    }
    if name.contains('/') || name.contains('\\') || name == "." || name == ".." {
        anyhow::bail!("{} must be a plain file name, got {:?}", field, name);
    }
    Ok(())
}

pub fn validate_config(config: &Config) -> Result<()> {
    validate_file_name("paths.config_file", &config.paths.config_file)?;
    validate_file_name("paths.cert_file", &config.paths.cert_file)?;
    validate_file_name("paths.key_file", &config.paths.key_file)?;

    if config.paths.cert_file == config.paths.key_file {
        anyhow::bail!(
            "paths.cert_file and paths.key_file must differ (both {:?})",
            config.paths.cert_file
        );
    }

    if !["trace", "debug", "info", "warn", "error"].contains(&config.logging.level.as_str()) {
        anyhow::bail!("Unknown log level: {}", config.logging.level);
    }
    if !["text", "json"].contains(&config.logging.format.as_str()) {
        anyhow::bail!("Unknown log format: {}", config.logging.format);
    }
    match config.logging.output.as_str() {
        "console" => {}
        "file" => {
            if config.logging.file_path.is_none() {
                anyhow::bail!("logging.file_path is required when logging.output is \"file\"");
            }
        }
        other => anyhow::bail!("Unknown log output: {}", other),
    }

    Ok(())
}

/// Both directories must exist before anything is watched
pub fn check_directories(paths: &PathsConfig) -> Result<()> {
    if !paths.input_dir.is_dir() {
        anyhow::bail!("Config folder not found: {}", paths.input_dir.display());
    }
    if !paths.output_dir.is_dir() {
        anyhow::bail!("Certs output folder not found: {}", paths.output_dir.display());
    }
    Ok(())
}
