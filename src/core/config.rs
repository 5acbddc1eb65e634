/// Bridge configuration, loaded from RON.
///
/// ```ron
/// (
///     seed: 42,
///     max_attempts: 3,
///     model: (temperature: 0.8),
///     guard: (max_chars: 600, forbid_invented_numbers: false),
///     grammar_paths: ["grammars"],
///     voice_paths: ["voices/narrators.ron"],
///     default_voice: Some(VoiceId(1)),
/// )
/// ```
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::grammar::{GrammarError, GrammarSet};
use crate::core::guard::GuardConfig;
use crate::core::model::ModelParams;
use crate::core::voice::{VoiceError, VoiceRegistry};
use crate::schema::entity::VoiceId;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("grammar error: {0}")]
    Grammar(#[from] GrammarError),
    #[error("voice error: {0}")]
    Voice(#[from] VoiceError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub seed: u64,
    /// Model attempts per statement before falling back to templates.
    pub max_attempts: u32,
    /// Narrations remembered for repetition checks and prompts.
    pub history_window: usize,
    pub repetition_ngram: usize,
    pub model: ModelParams,
    pub guard: GuardConfig,
    /// RON grammar files, or directories of them. Later paths override.
    pub grammar_paths: Vec<PathBuf>,
    pub voice_paths: Vec<PathBuf>,
    pub default_voice: Option<VoiceId>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            max_attempts: 3,
            history_window: 8,
            repetition_ngram: 6,
            model: ModelParams::default(),
            guard: GuardConfig::default(),
            grammar_paths: Vec::new(),
            voice_paths: Vec::new(),
            default_voice: None,
        }
    }
}

impl BridgeConfig {
    /// Load a config file. Relative resource paths are taken relative to
    /// the file's directory.
    pub fn load(path: &Path) -> Result<BridgeConfig, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let mut config = Self::parse_ron(&contents)?;
        if let Some(dir) = path.parent() {
            for p in config.grammar_paths.iter_mut().chain(config.voice_paths.iter_mut()) {
                if p.is_relative() {
                    *p = dir.join(&*p);
                }
            }
        }
        Ok(config)
    }

    pub fn parse_ron(input: &str) -> Result<BridgeConfig, ConfigError> {
        let config: BridgeConfig = ron::from_str(input)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_attempts == 0 {
            return Err(ConfigError::Invalid("max_attempts must be at least 1".to_string()));
        }
        if self.repetition_ngram < 2 {
            return Err(ConfigError::Invalid("repetition_ngram must be at least 2".to_string()));
        }
        Ok(())
    }

    pub fn load_grammars(&self) -> Result<GrammarSet, ConfigError> {
        let mut grammars = GrammarSet::default();
        for path in &self.grammar_paths {
            load_ron_files(path, |file| {
                grammars.merge(GrammarSet::load_from_ron(file)?);
                Ok(())
            })?;
        }
        Ok(grammars)
    }

    pub fn load_voices(&self) -> Result<VoiceRegistry, ConfigError> {
        let mut voices = VoiceRegistry::new();
        for path in &self.voice_paths {
            load_ron_files(path, |file| {
                voices.load_from_ron(file)?;
                Ok(())
            })?;
        }
        Ok(voices)
    }
}

/// Call `loader` for `path` if it is a file, or for every `.ron` file in it
/// (sorted by name) if it is a directory.
pub fn load_ron_files<F>(path: &Path, mut loader: F) -> Result<(), ConfigError>
where
    F: FnMut(&Path) -> Result<(), ConfigError>,
{
    if !path.is_dir() {
        log::debug!("loading {}", path.display());
        return loader(path);
    }
    let mut files = Vec::new();
    for entry in std::fs::read_dir(path)? {
        let file = entry?.path();
        if file.extension().and_then(|s| s.to_str()) == Some("ron") {
            files.push(file);
        }
    }
    files.sort();
    for file in files {
        log::debug!("loading {}", file.display());
        loader(&file)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::grammar::TemplateSegment;
    use std::fs;

    #[test]
    fn empty_config_uses_defaults() {
        let config = BridgeConfig::parse_ron("()").unwrap();
        assert_eq!(config, BridgeConfig::default());
        assert_eq!(config.max_attempts, 3);
        assert!(config.guard.check_outcome);
    }

    #[test]
    fn partial_config() {
        let config = BridgeConfig::parse_ron(
            "(seed: 7, guard: (max_chars: 80), model: (max_tokens: 50), default_voice: Some(VoiceId(2)))",
        )
        .unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.guard.max_chars, 80);
        assert!(config.guard.require_actor);
        assert_eq!(config.model.max_tokens, 50);
        assert_eq!(config.default_voice, Some(VoiceId(2)));
    }

    #[test]
    fn invalid_values_rejected() {
        assert!(matches!(
            BridgeConfig::parse_ron("(max_attempts: 0)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            BridgeConfig::parse_ron("(repetition_ngram: 1)"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(BridgeConfig::parse_ron("(seed: \"x\")"), Err(ConfigError::Ron(_))));
    }

    #[test]
    fn load_resolves_relative_paths_and_directories() {
        let dir = tempfile::tempdir().unwrap();
        let grammars = dir.path().join("grammars");
        fs::create_dir(&grammars).unwrap();
        fs::write(
            grammars.join("a.ron"),
            r#"{ "greet": Rule(alternatives: [(weight: 1, text: "Hello.")]) }"#,
        )
        .unwrap();
        fs::write(
            grammars.join("b.ron"),
            r#"{ "greet": Rule(alternatives: [(weight: 1, text: "Hi.")]), "part": Rule(alternatives: [(weight: 1, text: "Bye.")]) }"#,
        )
        .unwrap();
        fs::write(grammars.join("notes.txt"), "ignored").unwrap();
        fs::write(dir.path().join("voices.ron"), r#"[(id: VoiceId(1), name: "plain")]"#).unwrap();
        let config_path = dir.path().join("bridge.ron");
        fs::write(&config_path, r#"(grammar_paths: ["grammars"], voice_paths: ["voices.ron"])"#).unwrap();

        let config = BridgeConfig::load(&config_path).unwrap();
        assert_eq!(config.grammar_paths, vec![grammars.clone()]);

        let set = config.load_grammars().unwrap();
        assert!(set.contains("greet") && set.contains("part"));
        // b.ron sorts after a.ron and wins
        assert_eq!(
            set.rules["greet"].alternatives[0].template.segments,
            vec![TemplateSegment::Literal("Hi.".to_string())]
        );

        let voices = config.load_voices().unwrap();
        assert_eq!(voices.len(), 1);
    }

    #[test]
    fn missing_file_is_io_error() {
        let config = BridgeConfig {
            voice_paths: vec![PathBuf::from("/nonexistent/voices.ron")],
            ..BridgeConfig::default()
        };
        assert!(matches!(
            config.load_voices(),
            Err(ConfigError::Voice(VoiceError::Io(_)))
        ));
    }
}
