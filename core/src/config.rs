use crate::error::QuillErr;
use crate::error::Result;
use serde::Deserialize;
use std::path::Path;
use std::path::PathBuf;

pub const CONFIG_TOML_FILE: &str = "config.toml";

/// Environment variable consulted when `api_key` is absent from config.toml.
pub const QUILL_API_KEY_ENV_VAR: &str = "QUILL_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o";
const DEFAULT_TEMPERATURE: f32 = 0.7;

/// Bounds for the requested continuation length, in characters.
pub const MIN_PREDICTION_LENGTH: u16 = 20;
pub const MAX_PREDICTION_LENGTH: u16 = 200;
pub const DEFAULT_PREDICTION_LENGTH: u16 = 50;

/// Resolved session configuration. Constructed once at startup and shared by
/// reference; nothing in the prediction loop reads ambient state.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub quill_home: PathBuf,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
    pub temperature: f32,
    pub prediction_length: u16,
    /// Draft file to edit. `None` means `$QUILL_HOME/draft.md`.
    pub draft_path: Option<PathBuf>,
}

/// CLI-sourced values that take precedence over config.toml.
#[derive(Debug, Default, Clone)]
pub struct ConfigOverrides {
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub api_key: Option<String>,
    pub prediction_length: Option<u16>,
    pub draft_path: Option<PathBuf>,
}

/// On-disk shape of config.toml. Every field is optional so a missing or
/// empty file degrades to defaults.
#[derive(Debug, Default, Deserialize)]
struct ConfigToml {
    model: Option<String>,
    base_url: Option<String>,
    api_key: Option<String>,
    temperature: Option<f32>,
    prediction_length: Option<u16>,
}

/// Returns the quill home directory: `$QUILL_HOME` if set, `~/.quill`
/// otherwise. The directory is not created here.
pub fn find_quill_home() -> std::io::Result<PathBuf> {
    if let Ok(home) = std::env::var("QUILL_HOME")
        && !home.is_empty()
    {
        return Ok(PathBuf::from(home));
    }

    let mut home = dirs::home_dir().ok_or_else(|| {
        std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "could not determine home directory",
        )
    })?;
    home.push(".quill");
    Ok(home)
}

impl Config {
    pub async fn load_with_overrides(
        quill_home: PathBuf,
        overrides: ConfigOverrides,
    ) -> Result<Self> {
        let file = read_config_toml(&quill_home.join(CONFIG_TOML_FILE)).await?;
        Ok(Self::from_parts(quill_home, file, overrides))
    }

    fn from_parts(quill_home: PathBuf, file: ConfigToml, overrides: ConfigOverrides) -> Self {
        let api_key = overrides
            .api_key
            .or(file.api_key)
            .or_else(|| std::env::var(QUILL_API_KEY_ENV_VAR).ok())
            .filter(|key| !key.is_empty());

        let prediction_length = overrides
            .prediction_length
            .or(file.prediction_length)
            .unwrap_or(DEFAULT_PREDICTION_LENGTH)
            .clamp(MIN_PREDICTION_LENGTH, MAX_PREDICTION_LENGTH);

        Self {
            quill_home,
            model: overrides
                .model
                .or(file.model)
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            base_url: overrides
                .base_url
                .or(file.base_url)
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            api_key,
            temperature: file.temperature.unwrap_or(DEFAULT_TEMPERATURE),
            prediction_length,
            draft_path: overrides.draft_path,
        }
    }

    /// Configuration errors are raised here, before any network call.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .ok_or(QuillErr::MissingConfig("api_key"))
    }

    /// Endpoint for streaming chat completions. The base URL is stored as
    /// configured; the trailing slash is stripped here so concatenation never
    /// produces a double slash.
    pub fn completions_url(&self) -> Result<String> {
        if self.base_url.is_empty() {
            return Err(QuillErr::MissingConfig("base_url"));
        }
        if self.model.is_empty() {
            return Err(QuillErr::MissingConfig("model"));
        }
        Ok(format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        ))
    }
}

async fn read_config_toml(path: &Path) -> Result<ConfigToml> {
    match tokio::fs::read_to_string(path).await {
        Ok(contents) => Ok(toml::from_str(&contents)?),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(ConfigToml::default()),
        Err(err) => Err(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn load(file: ConfigToml, overrides: ConfigOverrides) -> Config {
        Config::from_parts(PathBuf::from("/tmp/quill-test"), file, overrides)
    }

    #[tokio::test]
    async fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = Config::load_with_overrides(
            dir.path().to_path_buf(),
            ConfigOverrides {
                api_key: Some("sk-test".to_string()),
                ..Default::default()
            },
        )
        .await
        .expect("load");

        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.base_url, DEFAULT_BASE_URL);
        assert_eq!(config.prediction_length, DEFAULT_PREDICTION_LENGTH);
    }

    #[tokio::test]
    async fn config_toml_values_are_read() {
        let dir = tempfile::tempdir().expect("tempdir");
        tokio::fs::write(
            dir.path().join(CONFIG_TOML_FILE),
            r#"
model = "deepseek-ai/DeepSeek-V3"
base_url = "https://api.siliconflow.cn/v1"
api_key = "sk-from-file"
prediction_length = 120
"#,
        )
        .await
        .expect("write config");

        let config =
            Config::load_with_overrides(dir.path().to_path_buf(), ConfigOverrides::default())
                .await
                .expect("load");

        assert_eq!(config.model, "deepseek-ai/DeepSeek-V3");
        assert_eq!(config.api_key.as_deref(), Some("sk-from-file"));
        assert_eq!(config.prediction_length, 120);
    }

    #[test]
    fn overrides_beat_file_values() {
        let file = ConfigToml {
            model: Some("file-model".to_string()),
            base_url: Some("https://file.example/v1".to_string()),
            api_key: Some("sk-file".to_string()),
            temperature: None,
            prediction_length: Some(40),
        };
        let config = load(
            file,
            ConfigOverrides {
                model: Some("cli-model".to_string()),
                prediction_length: Some(60),
                ..Default::default()
            },
        );

        assert_eq!(config.model, "cli-model");
        assert_eq!(config.base_url, "https://file.example/v1");
        assert_eq!(config.prediction_length, 60);
    }

    #[test]
    fn prediction_length_is_clamped() {
        let config = load(
            ConfigToml::default(),
            ConfigOverrides {
                prediction_length: Some(10_000),
                ..Default::default()
            },
        );
        assert_eq!(config.prediction_length, MAX_PREDICTION_LENGTH);
    }

    #[test]
    fn trailing_slash_does_not_double_up() {
        let file = ConfigToml {
            base_url: Some("https://api.example.com/v1/".to_string()),
            ..Default::default()
        };
        let config = load(file, ConfigOverrides::default());
        assert_eq!(
            config.completions_url().expect("url"),
            "https://api.example.com/v1/chat/completions"
        );
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = load(ConfigToml::default(), ConfigOverrides::default());
        if config.api_key.is_some() {
            // Ambient QUILL_API_KEY in the environment; nothing to assert.
            return;
        }
        assert!(matches!(
            config.require_api_key(),
            Err(QuillErr::MissingConfig("api_key"))
        ));
    }
}
