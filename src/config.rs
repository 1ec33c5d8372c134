use std::fs;
use std::path::Path;

use anyhow::Result;
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub system_config: SystemConfig,
    pub upstream_config: UpstreamConfig,
    #[serde(default)]
    pub translation_config: TranslationConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SystemConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// `None` logs to stdout only
    #[serde(default = "default_log_file")]
    pub log_file: Option<String>,
    #[serde(default = "default_system_prompt_path")]
    pub system_prompt_path: String,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_log_file() -> Option<String> {
    Some("server.log".to_string())
}

fn default_system_prompt_path() -> String {
    "system_prompt.txt".to_string()
}

/// The single completion endpoint every translation goes to
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: f64,
    /// Sent as `HTTP-Referer`
    #[serde(default)]
    pub referer: Option<String>,
    /// Sent as `X-Title`
    #[serde(default)]
    pub title: Option<String>,
}

fn default_request_timeout() -> f64 {
    15.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationConfig {
    #[serde(default = "default_my_language")]
    pub my_language: String,
    #[serde(default = "default_their_language")]
    pub their_language: String,
}

fn default_my_language() -> String {
    "English".to_string()
}

fn default_their_language() -> String {
    "German".to_string()
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            log_file: default_log_file(),
            system_prompt_path: default_system_prompt_path(),
        }
    }
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            my_language: default_my_language(),
            their_language: default_their_language(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        if !Path::new(path).exists() {
            anyhow::bail!("Configuration file not found: {}", path);
        }
        let content = substitute_env_vars(&read_text_file(path)?);

        let path_lower = path.to_lowercase();
        let config: Config = if path_lower.ends_with(".json") {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let upstream = &self.upstream_config;
        if upstream.api_key.trim().is_empty() || upstream.api_key.starts_with("${") {
            anyhow::bail!("upstream_config.api_key is not set");
        }
        if upstream.base_url.trim().is_empty() {
            anyhow::bail!("upstream_config.base_url is not set");
        }
        if upstream.model.trim().is_empty() {
            anyhow::bail!("upstream_config.model is not set");
        }
        let timeout = upstream.request_timeout_seconds;
        if !(timeout.is_finite() && timeout > 0.0) {
            anyhow::bail!(
                "upstream_config.request_timeout_seconds must be positive, got {}",
                timeout
            );
        }
        Ok(())
    }
}

/// Replace `${VAR_NAME}` with the environment value; unknown variables are left as-is
pub fn substitute_env_vars(content: &str) -> String {
    let pattern = Regex::new(r"\$\{(\w+)\}").expect("static pattern");
    pattern
        .replace_all(content, |caps: &Captures| {
            std::env::var(&caps[1]).unwrap_or_else(|_| caps[0].to_string())
        })
        .into_owned()
}

/// Read a text file, honoring a UTF-8/UTF-16 BOM and replacing invalid sequences
pub fn read_text_file(path: impl AsRef<Path>) -> Result<String> {
    let bytes = fs::read(path)?;
    let (content, _, _) = encoding_rs::UTF_8.decode(&bytes);
    Ok(content.into_owned())
}
