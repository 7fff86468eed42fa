use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct CustomProvider {
    pub id: String,
    pub display_name: String,
    pub base_url: String,
    pub mode: Option<String>,
    pub env_key: String,
}

#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    pub default_provider: Option<String>,
    #[serde(default)]
    pub default_models: HashMap<String, String>,
    #[serde(default)]
    pub custom_providers: Vec<CustomProvider>,
    /// How many rays a beam opens with when the command line does not say
    pub ray_count: Option<usize>,
}

impl Config {
    pub fn load() -> Result<Config, Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path();
        Self::load_from_path(&config_path)
    }

    pub fn load_from_path(config_path: &PathBuf) -> Result<Config, Box<dyn std::error::Error>> {
        if config_path.exists() {
            let contents = fs::read_to_string(config_path)?;
            let config: Config = toml::from_str(&contents)?;
            Ok(config)
        } else {
            Ok(Config::default())
        }
    }

    pub fn save(&self) -> Result<(), Box<dyn std::error::Error>> {
        let config_path = Self::get_config_path();
        self.save_to_path(&config_path)
    }

    pub fn save_to_path(&self, config_path: &PathBuf) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = toml::to_string_pretty(self)?;
        fs::write(config_path, contents)?;
        Ok(())
    }

    fn get_config_path() -> PathBuf {
        let proj_dirs = ProjectDirs::from("org", "permacommons", "multibeam")
            .expect("Failed to determine config directory");
        proj_dirs.config_dir().join("config.toml")
    }

    pub fn get_default_model(&self, provider: &str) -> Option<&String> {
        self.default_models.get(provider)
    }

    pub fn set_default_model(&mut self, provider: String, model: String) {
        self.default_models.insert(provider, model);
    }

    pub fn find_custom_provider(&self, id: &str) -> Option<&CustomProvider> {
        self.custom_providers
            .iter()
            .find(|p| p.id.eq_ignore_ascii_case(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_from_missing_path_yields_defaults() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("nope").join("config.toml");

        let config = Config::load_from_path(&path).expect("load");
        assert!(config.default_provider.is_none());
        assert!(config.default_models.is_empty());
        assert!(config.ray_count.is_none());
    }

    #[test]
    fn save_and_load_round_trip() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        let mut config = Config {
            default_provider: Some("openrouter".to_string()),
            ray_count: Some(4),
            ..Default::default()
        };
        config.set_default_model("openrouter".to_string(), "openai/gpt-4o".to_string());
        config.save_to_path(&path).expect("save");

        let loaded = Config::load_from_path(&path).expect("load");
        assert_eq!(loaded.default_provider.as_deref(), Some("openrouter"));
        assert_eq!(loaded.ray_count, Some(4));
        assert_eq!(
            loaded.get_default_model("openrouter").map(String::as_str),
            Some("openai/gpt-4o")
        );
    }

    #[test]
    fn custom_provider_lookup_is_case_insensitive() {
        let config = Config {
            custom_providers: vec![CustomProvider {
                id: "local".to_string(),
                display_name: "Local llama.cpp".to_string(),
                base_url: "http://localhost:8080/v1".to_string(),
                mode: None,
                env_key: "LOCAL_API_KEY".to_string(),
            }],
            ..Default::default()
        };

        assert!(config.find_custom_provider("LOCAL").is_some());
        assert!(config.find_custom_provider("remote").is_none());
    }
}
