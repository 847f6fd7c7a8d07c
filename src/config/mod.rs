mod api;
mod defaults;
mod validation;

use crate::api::ClientConfig;
use crate::cli::GlobalOptions;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub use api::ApiConfig;
pub use defaults::{default_stream_timeout, default_verbose, DEFAULT_ENDPOINT};
pub use validation::{expand_with, normalize_endpoint};

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub verbose: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ModelConfig {
    #[serde(default)]
    pub default_model: Option<String>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

/// Settings after merging CLI args, environment and the config file.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_key: String,
    pub api_endpoint: String,
    pub model: Option<String>,
    pub system_prompt: Option<String>,
    pub stream_timeout: u64,
    pub verbose: bool,
}

/// Contents of `.llama.yaml` / `llama.json`.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct FileConfig {
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub session: SessionConfig,
}

impl Config {
    pub fn from_env_and_args(args: &GlobalOptions) -> Result<Self> {
        let file_config = FileConfig::load()?;
        Self::resolve(args, &file_config, |name| env::var(name).ok())
    }

    /// Precedence: CLI args > environment > config file > defaults.
    pub fn resolve<F>(args: &GlobalOptions, file_config: &FileConfig, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_key = args
            .key
            .clone()
            .or_else(|| lookup("LLAMA_API_KEY"))
            .or_else(|| {
                file_config
                    .api
                    .key
                    .as_deref()
                    .map(|key| expand_with(key, &lookup))
            })
            .filter(|key| !key.trim().is_empty() && !key.contains("${"))
            .context("No API key: pass --key or set LLAMA_API_KEY")?;

        let api_endpoint = args
            .api_endpoint
            .clone()
            .or_else(|| lookup("LLAMA_API_ENDPOINT"))
            .or_else(|| file_config.api.endpoint.clone())
            .map(|endpoint| normalize_endpoint(&endpoint))
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let model = args
            .model
            .clone()
            .or_else(|| lookup("LLAMA_MODEL"))
            .or_else(|| file_config.model.default_model.clone());

        let system_prompt = lookup("LLAMA_SYSTEM_PROMPT").or_else(|| file_config.model.system_prompt.clone());

        // Zero would time out every frame, so it counts as unset.
        let stream_timeout = lookup("LLAMA_STREAM_TIMEOUT")
            .and_then(|s| s.trim().parse::<u64>().ok())
            .filter(|&secs| secs > 0)
            .or(file_config.api.stream_timeout.filter(|&secs| secs > 0))
            .unwrap_or_else(default_stream_timeout);

        let verbose = args.verbose
            || lookup("LLAMA_VERBOSE")
                .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
                .or(file_config.session.verbose)
                .unwrap_or_else(default_verbose);

        Ok(Config {
            api_key,
            api_endpoint,
            model,
            system_prompt,
            stream_timeout,
            verbose,
        })
    }

    pub fn client_config(&self) -> ClientConfig {
        ClientConfig {
            api_key: self.api_key.clone(),
            endpoint: self.api_endpoint.clone(),
            stream_timeout: self.stream_timeout,
        }
    }

    pub fn require_model(&self) -> Result<&str> {
        self.model
            .as_deref()
            .context("No model: pass --model or set LLAMA_MODEL")
    }
}

impl FileConfig {
    pub fn load() -> Result<Self> {
        for path in Self::get_config_paths() {
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        Ok(FileConfig::default())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let is_yaml = matches!(
            path.extension().and_then(|s| s.to_str()),
            Some("yaml") | Some("yml")
        );

        if is_yaml {
            serde_yaml::from_str(&contents)
                .with_context(|| format!("Failed to parse YAML config file: {}", path.display()))
        } else {
            serde_json::from_str(&contents)
                .with_context(|| format!("Failed to parse JSON config file: {}", path.display()))
        }
    }

    pub fn get_config_paths() -> Vec<PathBuf> {
        let mut paths = vec![
            PathBuf::from(".llama.yaml"),
            PathBuf::from(".llama.yml"),
            PathBuf::from(".llama.json"),
        ];

        if let Some(home_dir) = dirs::home_dir() {
            let config_dir = home_dir.join(".config").join("llama");
            paths.push(config_dir.join("llama.yaml"));
            paths.push(config_dir.join("llama.yml"));
            paths.push(config_dir.join("llama.json"));
        }

        paths
    }
}
