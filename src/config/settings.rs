use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::conversation::ModelSpec;
use crate::core::mode::Mode;
use crate::error::SessionError;
use crate::tools::{select_tools, ToolRef};

pub const DEFAULT_MODEL_ID: &str = "default";

const DEVELOPMENT_SWITCH_MESSAGE: &str = "You are now in development mode. You can edit files and manage todos. Focus on implementing features and fixing bugs.";
const REVIEW_SWITCH_MESSAGE: &str = "You are now in review mode. You can read files to understand the codebase but cannot make changes. Focus on analyzing code and providing feedback.";
const PLANNING_SWITCH_MESSAGE: &str = "You are now in planning mode. You cannot access files or tools. Focus on high-level discussion, architecture planning, and strategic thinking.";

/// One OpenAI-compatible model endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModelConfig {
    pub id: String,
    pub model_name: String,
    pub api_base: String,
    /// Environment variable holding the API key. Local servers need none.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    #[serde(default = "default_true")]
    pub supports_tools: bool,
}

impl ModelConfig {
    pub fn to_spec(&self) -> ModelSpec {
        let api_key = self
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
            .filter(|key| !key.is_empty());
        ModelSpec {
            id: self.id.clone(),
            model_name: self.model_name.clone(),
            api_base: self.api_base.clone(),
            api_key,
            supports_tools: self.supports_tools,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModeConfig {
    pub name: String,
    #[serde(default)]
    pub tools: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub switch_message: Option<String>,
}

impl ModeConfig {
    fn new(name: &str, tools: &[&str], switch_message: &str) -> Self {
        Self {
            name: name.to_string(),
            tools: tools.iter().map(|t| t.to_string()).collect(),
            switch_message: Some(switch_message.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_models")]
    pub models: Vec<ModelConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub initial_mode: Option<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_true")]
    pub show_banner: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_message: Option<String>,
    /// An empty list disables modes; every tool is then always available.
    #[serde(default = "default_modes")]
    pub modes: Vec<ModeConfig>,
    #[serde(default = "default_slash_commands")]
    pub slash_commands: BTreeMap<String, String>,
    #[serde(default = "default_true")]
    pub log_transcripts: bool,
}

fn default_true() -> bool {
    true
}

fn default_model() -> String {
    DEFAULT_MODEL_ID.to_string()
}

fn default_models() -> Vec<ModelConfig> {
    vec![ModelConfig {
        id: DEFAULT_MODEL_ID.to_string(),
        model_name: "qwen3-coder:30b".to_string(),
        api_base: "http://localhost:11434/v1".to_string(),
        api_key_env: None,
        supports_tools: true,
    }]
}

fn default_modes() -> Vec<ModeConfig> {
    vec![
        ModeConfig::new(
            "development",
            &["read_file", "write_file", "edit_file", "todo_write"],
            DEVELOPMENT_SWITCH_MESSAGE,
        ),
        ModeConfig::new("review", &["read_file"], REVIEW_SWITCH_MESSAGE),
        ModeConfig::new("planning", &[], PLANNING_SWITCH_MESSAGE),
    ]
}

fn default_slash_commands() -> BTreeMap<String, String> {
    BTreeMap::from([(
        "/thinking".to_string(),
        "Let me think through this step by step:".to_string(),
    )])
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            models: default_models(),
            system_prompt: None,
            initial_mode: None,
            debug: false,
            show_banner: true,
            first_message: None,
            modes: default_modes(),
            slash_commands: default_slash_commands(),
            log_transcripts: true,
        }
    }
}

impl AppConfig {
    pub fn model_specs(&self) -> Vec<ModelSpec> {
        self.models.iter().map(ModelConfig::to_spec).collect()
    }

    /// Turn the configured modes into runtime modes, picking tools from `catalog`.
    pub fn build_modes(&self, catalog: &[ToolRef]) -> Result<Vec<Mode>, SessionError> {
        self.modes
            .iter()
            .map(|cfg| {
                let tools = select_tools(catalog, &cfg.tools)?;
                let mode = Mode::new(cfg.name.clone(), tools);
                Ok(match cfg.switch_message.as_deref() {
                    Some(message) => mode.with_switch_message(message),
                    None => mode,
                })
            })
            .collect()
    }
}

/// Returns the path to ~/.modechat/
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".modechat")
}

/// Returns the path to ~/.modechat/config.json
pub fn config_file() -> PathBuf {
    config_dir().join("config.json")
}

/// Load ~/.modechat/config.json, writing the defaults on first run. A file
/// that cannot be parsed falls back to the defaults.
pub fn load_config() -> AppConfig {
    match load_config_at(&config_file()) {
        Ok(config) => config,
        Err(e) => {
            tracing::warn!(error = %format!("{:#}", e), "ignoring unreadable config");
            AppConfig::default()
        }
    }
}

/// Load the config at `path`, creating it with defaults if it does not exist.
pub fn load_config_at(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        let config = AppConfig::default();
        if let Err(e) = save_config_at(&config, path) {
            tracing::debug!(error = %e, path = %path.display(), "could not write default config");
        }
        return Ok(config);
    }

    let raw = fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    let config = serde_json::from_str::<AppConfig>(&raw)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}

pub fn save_config_at(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{builtin_tools, Workspace};
    use tempfile::TempDir;

    fn with_temp_config<F: FnOnce(PathBuf)>(f: F) {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join("nested").join("config.json");
        f(config_path);
    }

    #[test]
    fn default_config_has_expected_values() {
        let config = AppConfig::default();
        assert_eq!(config.model, "default");
        assert_eq!(config.models[0].model_name, "qwen3-coder:30b");
        assert_eq!(config.models[0].api_base, "http://localhost:11434/v1");
        assert!(config.show_banner);
        assert!(config.log_transcripts);
        let names: Vec<&str> = config.modes.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, vec!["development", "review", "planning"]);
        assert!(config.slash_commands.contains_key("/thinking"));
    }

    #[test]
    fn config_deserializes_with_missing_fields() {
        let json = r#"{"model": "lmstudio", "modes": [], "systemPrompt": "be terse"}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.model, "lmstudio");
        assert!(config.modes.is_empty());
        assert_eq!(config.system_prompt.as_deref(), Some("be terse"));
        assert_eq!(config.models.len(), 1);
        assert!(config.show_banner);
    }

    #[test]
    fn model_entries_use_camel_case() {
        let json = r#"{"models": [{"id": "x", "modelName": "m", "apiBase": "http://h/v1"}]}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.models[0].model_name, "m");
        assert!(config.models[0].supports_tools);
        assert_eq!(config.models[0].api_key_env, None);
    }

    #[test]
    fn missing_file_is_created_with_defaults() {
        with_temp_config(|path| {
            let config = load_config_at(&path).unwrap();
            assert_eq!(config.model, "default");
            assert!(path.exists());

            let raw = fs::read_to_string(&path).unwrap();
            assert!(raw.contains("\"switchMessage\""));
            assert!(raw.contains("\"logTranscripts\": true"));
        });
    }

    #[test]
    fn save_and_load_config_file() {
        with_temp_config(|path| {
            let config = AppConfig {
                initial_mode: Some("review".to_string()),
                debug: true,
                ..AppConfig::default()
            };
            save_config_at(&config, &path).unwrap();

            let loaded = load_config_at(&path).unwrap();
            assert_eq!(loaded.initial_mode.as_deref(), Some("review"));
            assert!(loaded.debug);
        });
    }

    #[test]
    fn malformed_file_is_an_error() {
        with_temp_config(|path| {
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, "{ not json").unwrap();
            assert!(load_config_at(&path).is_err());
        });
    }

    #[test]
    fn build_modes_picks_tools_from_catalog() {
        let tmp = TempDir::new().unwrap();
        let catalog = builtin_tools(&Workspace::new(tmp.path()));
        let modes = AppConfig::default().build_modes(&catalog).unwrap();

        assert_eq!(
            modes[0].tool_names(),
            vec!["read_file", "write_file", "edit_file", "todo_write"]
        );
        assert_eq!(modes[1].tool_names(), vec!["read_file"]);
        assert!(modes[2].capabilities().is_empty());
        assert!(modes[2]
            .switch_message()
            .unwrap()
            .starts_with("You are now in planning mode"));
    }

    #[test]
    fn build_modes_rejects_unknown_tools() {
        let tmp = TempDir::new().unwrap();
        let catalog = builtin_tools(&Workspace::new(tmp.path()));
        let config = AppConfig {
            modes: vec![ModeConfig::new("ops", &["bash"], "")],
            ..AppConfig::default()
        };
        assert!(matches!(
            config.build_modes(&catalog),
            Err(SessionError::Config(_))
        ));
    }

    #[test]
    fn api_key_is_read_from_named_variable() {
        std::env::set_var("MODECHAT_TEST_API_KEY", "sk-test");
        let model = ModelConfig {
            id: "remote".to_string(),
            model_name: "gpt".to_string(),
            api_base: "https://api.example.com/v1".to_string(),
            api_key_env: Some("MODECHAT_TEST_API_KEY".to_string()),
            supports_tools: false,
        };
        let spec = model.to_spec();
        assert_eq!(spec.api_key.as_deref(), Some("sk-test"));
        assert!(!spec.supports_tools);
    }
}
