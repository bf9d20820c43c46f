use crate::error::{ChatError, Result};
use config::{Config, ConfigError, Environment, File};
use serde::de::DeserializeOwned;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CHAT_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-004";
pub const DEFAULT_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_KB_PATH: &str = "kb/megas.json";
pub const DEFAULT_TOP_K: usize = 2;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.60;
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_BOT: &str = "pokedex-generic";

#[derive(Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embedding_model: String,
    pub api_base: String,
    pub kb_path: PathBuf,
    pub top_k: usize,
    pub similarity_threshold: f32,
    pub kb_debug: bool,
    pub request_timeout_secs: u64,
    pub default_bot: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            api_base: DEFAULT_API_BASE.to_string(),
            kb_path: PathBuf::from(DEFAULT_KB_PATH),
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            kb_debug: false,
            request_timeout_secs: DEFAULT_TIMEOUT_SECS,
            default_bot: DEFAULT_BOT.to_string(),
        }
    }
}

impl Settings {
    /// Layers, lowest precedence first: the per-user config file, `pokedex.*`
    /// in the working directory, then `POKEDEX_*` environment variables.
    /// `GOOGLE_API_KEY`, `GEMINI_MODEL` and `KB_DEBUG=1` are honoured when the
    /// layered sources leave those keys unset.
    pub fn load() -> Result<Self> {
        let mut builder = Config::builder();

        if let Some(dir) = dirs::config_dir() {
            let user_config = dir.join("pokedex-chat").join("config");
            builder = builder.add_source(
                File::with_name(&user_config.to_string_lossy()).required(false),
            );
        }

        let config = builder
            .add_source(File::with_name("pokedex").required(false))
            .add_source(Environment::with_prefix("POKEDEX"))
            .build()?;

        Self::resolve(&config, |key| env::var(key).ok())
    }

    pub fn resolve(config: &Config, legacy_env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Settings::default();

        let api_key = optional::<String>(config, "api_key")?
            .or_else(|| legacy_env("GOOGLE_API_KEY"))
            .map(|k| k.trim().to_string())
            .filter(|k| !k.is_empty());

        let chat_model = optional::<String>(config, "chat_model")?
            .or_else(|| legacy_env("GEMINI_MODEL"))
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(defaults.chat_model);

        let kb_debug = match optional::<bool>(config, "kb_debug")? {
            Some(flag) => flag,
            None => legacy_env("KB_DEBUG").is_some_and(|v| v == "1"),
        };

        let settings = Settings {
            api_key,
            chat_model,
            embedding_model: optional(config, "embedding_model")?.unwrap_or(defaults.embedding_model),
            api_base: optional(config, "api_base")?.unwrap_or(defaults.api_base),
            kb_path: optional::<String>(config, "kb_path")?
                .map(PathBuf::from)
                .unwrap_or(defaults.kb_path),
            top_k: optional(config, "top_k")?.unwrap_or(defaults.top_k),
            similarity_threshold: optional(config, "similarity_threshold")?
                .unwrap_or(defaults.similarity_threshold),
            kb_debug,
            request_timeout_secs: optional(config, "request_timeout_secs")?
                .unwrap_or(defaults.request_timeout_secs),
            default_bot: optional(config, "default_bot")?.unwrap_or(defaults.default_bot),
        };

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(invalid("top_k must be at least 1"));
        }
        if !(-1.0..=1.0).contains(&self.similarity_threshold) {
            return Err(invalid("similarity_threshold must be within [-1, 1]"));
        }
        if self.request_timeout_secs == 0 {
            return Err(invalid("request_timeout_secs must be at least 1"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or(ChatError::MissingCredential)
    }
}

fn optional<T: DeserializeOwned>(config: &Config, key: &str) -> Result<Option<T>> {
    match config.get::<T>(key) {
        Ok(value) => Ok(Some(value)),
        Err(ConfigError::NotFound(_)) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

fn invalid(message: &str) -> ChatError {
    ChatError::Config(ConfigError::Message(message.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(pairs: &[(&str, &str)]) -> Config {
        pairs
            .iter()
            .fold(Config::builder(), |builder, (key, value)| {
                builder.set_override(*key, *value).unwrap()
            })
            .build()
            .unwrap()
    }

    fn env_of(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> + use<> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::resolve(&config_with(&[]), env_of(&[])).unwrap();

        assert_eq!(settings.api_key, None);
        assert_eq!(settings.chat_model, "gemini-2.5-flash");
        assert_eq!(settings.embedding_model, "text-embedding-004");
        assert_eq!(settings.kb_path, PathBuf::from("kb/megas.json"));
        assert_eq!(settings.top_k, 2);
        assert_eq!(settings.similarity_threshold, 0.60);
        assert!(!settings.kb_debug);
        assert_eq!(settings.default_bot, "pokedex-generic");
        assert!(matches!(settings.require_api_key(), Err(ChatError::MissingCredential)));
    }

    #[test]
    fn test_legacy_environment() {
        let env = env_of(&[
            ("GOOGLE_API_KEY", " abc123 "),
            ("GEMINI_MODEL", "gemini-2.0-flash"),
            ("KB_DEBUG", "1"),
        ]);
        let settings = Settings::resolve(&config_with(&[]), env).unwrap();

        assert_eq!(settings.require_api_key().unwrap(), "abc123");
        assert_eq!(settings.chat_model, "gemini-2.0-flash");
        assert!(settings.kb_debug);
    }

    #[test]
    fn test_layered_values_win_over_legacy() {
        let config = config_with(&[
            ("api_key", "from-config"),
            ("chat_model", "gemini-pro"),
            ("kb_debug", "false"),
            ("top_k", "3"),
            ("similarity_threshold", "0.75"),
            ("request_timeout_secs", "5"),
        ]);
        let env = env_of(&[("GOOGLE_API_KEY", "from-env"), ("KB_DEBUG", "1")]);
        let settings = Settings::resolve(&config, env).unwrap();

        assert_eq!(settings.api_key.as_deref(), Some("from-config"));
        assert_eq!(settings.chat_model, "gemini-pro");
        assert!(!settings.kb_debug);
        assert_eq!(settings.top_k, 3);
        assert_eq!(settings.similarity_threshold, 0.75);
        assert_eq!(settings.request_timeout_secs, 5);
        assert_eq!(settings.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_blank_api_key_is_missing() {
        let settings = Settings::resolve(&config_with(&[]), env_of(&[("GOOGLE_API_KEY", "  ")])).unwrap();
        assert!(settings.api_key.is_none());
    }

    #[test]
    fn test_rejects_invalid_values() {
        for pairs in [
            [("top_k", "0")],
            [("similarity_threshold", "1.5")],
            [("request_timeout_secs", "0")],
            [("top_k", "many")],
        ] {
            let result = Settings::resolve(&config_with(&pairs), env_of(&[]));
            assert!(matches!(result, Err(ChatError::Config(_))), "accepted {pairs:?}");
        }
    }
}
