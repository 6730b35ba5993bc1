use serde::Deserialize;
use std::path::PathBuf;

/// Complete YAML configuration structure
///
/// All fields are optional to allow partial configuration. Values present in
/// the file override environment variables.
///
/// # Example YAML structure
/// ```yaml
/// providers:
///   gemini_api_key: "your-gemini-key"
///   gemini_base_url: "https://generativelanguage.googleapis.com/v1beta"
///   request_timeout_secs: 60
///
/// dialogue:
///   model: "gemini-3-flash-preview"
///   temperature: 0.8
///
/// narration:
///   model: "gemini-2.5-flash-preview-tts"
///   sample_rate: 24000
///   max_chunk_chars: 3000
///   chunk_delay_ms: 500
///   retry:
///     max_attempts: 3
///     initial_delay_ms: 1000
///
/// fallback:
///   base_rate: 0.85
///   espeak_binary: "espeak-ng"
///
/// output:
///   dir: "./narrations"
/// ```
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct YamlConfig {
    pub providers: Option<ProvidersYaml>,
    pub dialogue: Option<DialogueYaml>,
    pub narration: Option<NarrationYaml>,
    pub fallback: Option<FallbackYaml>,
    pub output: Option<OutputYaml>,
}

/// Provider credentials and endpoint from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct ProvidersYaml {
    /// Gemini API key used for both dialogue and narration
    pub gemini_api_key: Option<String>,
    pub gemini_base_url: Option<String>,
    pub request_timeout_secs: Option<u64>,
}

/// Story dialogue settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct DialogueYaml {
    pub model: Option<String>,
    pub temperature: Option<f32>,
}

/// Speech synthesis settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct NarrationYaml {
    pub model: Option<String>,
    pub sample_rate: Option<u32>,
    pub max_chunk_chars: Option<usize>,
    pub chunk_delay_ms: Option<u64>,
    pub retry: Option<RetryYaml>,
}

/// Rate-limit retry settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RetryYaml {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
}

/// Local fallback voice settings from YAML
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct FallbackYaml {
    pub base_rate: Option<f64>,
    pub espeak_binary: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct OutputYaml {
    /// Directory narrations are written to
    pub dir: Option<String>,
}

impl YamlConfig {
    /// Load configuration from a YAML file
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or the YAML is malformed.
    pub fn from_file(path: &PathBuf) -> Result<Self, Box<dyn std::error::Error>> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read config file {}: {e}", path.display()))?;

        let config: YamlConfig = serde_yaml::from_str(&contents)
            .map_err(|e| format!("Failed to parse YAML config: {e}"))?;

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_yaml_config_full() {
        let yaml = r#"
providers:
  gemini_api_key: "yaml-key"
  request_timeout_secs: 30

dialogue:
  model: "story-model"
  temperature: 0.5

narration:
  sample_rate: 16000
  chunk_delay_ms: 250
  retry:
    max_attempts: 5

fallback:
  base_rate: 0.9

output:
  dir: "/tmp/narrations"
"#;
        let config: YamlConfig = serde_yaml::from_str(yaml).unwrap();

        let providers = config.providers.unwrap();
        assert_eq!(providers.gemini_api_key, Some("yaml-key".to_string()));
        assert_eq!(providers.request_timeout_secs, Some(30));
        assert_eq!(providers.gemini_base_url, None);

        let dialogue = config.dialogue.unwrap();
        assert_eq!(dialogue.model, Some("story-model".to_string()));
        assert_eq!(dialogue.temperature, Some(0.5));

        let narration = config.narration.unwrap();
        assert_eq!(narration.sample_rate, Some(16000));
        assert_eq!(narration.max_chunk_chars, None);
        assert_eq!(narration.retry.unwrap().max_attempts, Some(5));

        assert_eq!(config.fallback.unwrap().base_rate, Some(0.9));
        assert_eq!(config.output.unwrap().dir, Some("/tmp/narrations".to_string()));
    }

    #[test]
    fn test_yaml_config_empty() {
        let config: YamlConfig = serde_yaml::from_str("{}").unwrap();
        assert!(config.providers.is_none());
        assert!(config.narration.is_none());
    }

    #[test]
    fn test_yaml_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("config.yaml");
        fs::write(&path, "fallback:\n  espeak_binary: \"espeak\"\n").unwrap();

        let config = YamlConfig::from_file(&path).unwrap();
        assert_eq!(
            config.fallback.unwrap().espeak_binary,
            Some("espeak".to_string())
        );
    }

    #[test]
    fn test_yaml_from_file_errors() {
        let missing = PathBuf::from("/nonexistent/config.yaml");
        assert!(
            YamlConfig::from_file(&missing)
                .unwrap_err()
                .to_string()
                .contains("Failed to read config file")
        );

        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("bad.yaml");
        fs::write(&path, "narration: [unclosed").unwrap();
        assert!(
            YamlConfig::from_file(&path)
                .unwrap_err()
                .to_string()
                .contains("Failed to parse YAML config")
        );
    }
}
