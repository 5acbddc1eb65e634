/// Narrator voices: style bundles that shape both model prompts and
/// template output.
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::schema::entity::VoiceId;

/// Grammatical person the narration is written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Person {
    First,
    Second,
    Third,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Tense {
    Past,
    Present,
}

/// Style preferences. Unset fields inherit from the parent voice.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Style {
    #[serde(default)]
    pub person: Option<Person>,
    #[serde(default)]
    pub tense: Option<Tense>,
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub max_sentences: Option<u32>,
}

impl Style {
    /// Fill unset fields of `self` from `base`.
    fn over(self, base: &Style) -> Style {
        Style {
            person: self.person.or(base.person),
            tense: self.tense.or(base.tense),
            tone: self.tone.or_else(|| base.tone.clone()),
            max_sentences: self.max_sentences.or(base.max_sentences),
        }
    }
}

/// Preferred and avoided words for a voice.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct VocabularyPool {
    #[serde(default)]
    pub preferred: FxHashSet<String>,
    #[serde(default)]
    pub avoided: FxHashSet<String>,
}

/// A voice definition as authored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Voice {
    pub id: VoiceId,
    pub name: String,
    #[serde(default)]
    pub parent: Option<VoiceId>,
    #[serde(default)]
    pub grammar_weights: HashMap<String, f32>,
    #[serde(default)]
    pub vocabulary: VocabularyPool,
    #[serde(default)]
    pub style: Style,
    /// Free-form mannerisms, passed to the model as-is.
    #[serde(default)]
    pub quirks: Vec<String>,
}

/// A voice with its inheritance chain merged.
#[derive(Debug, Clone)]
pub struct ResolvedVoice {
    pub id: VoiceId,
    pub name: String,
    pub grammar_weights: HashMap<String, f32>,
    pub vocabulary: VocabularyPool,
    pub style: Style,
    pub quirks: Vec<String>,
}

impl ResolvedVoice {
    /// Preferred words in sorted order, for stable prompt text.
    pub fn preferred_sorted(&self) -> Vec<&str> {
        let mut words: Vec<&str> = self.vocabulary.preferred.iter().map(String::as_str).collect();
        words.sort_unstable();
        words
    }

    pub fn avoided_sorted(&self) -> Vec<&str> {
        let mut words: Vec<&str> = self.vocabulary.avoided.iter().map(String::as_str).collect();
        words.sort_unstable();
        words
    }
}

#[derive(Debug, thiserror::Error)]
pub enum VoiceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("voice not found: {0:?}")]
    NotFound(VoiceId),
}

/// Registry of loaded voices with inheritance resolution.
#[derive(Debug, Clone, Default)]
pub struct VoiceRegistry {
    voices: HashMap<VoiceId, Voice>,
}

impl VoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, voice: Voice) {
        self.voices.insert(voice.id, voice);
    }

    /// Voices from `other` replace voices with the same id.
    pub fn merge(&mut self, other: VoiceRegistry) {
        self.voices.extend(other.voices);
    }

    pub fn get(&self, id: VoiceId) -> Option<&Voice> {
        self.voices.get(&id)
    }

    pub fn len(&self) -> usize {
        self.voices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.voices.is_empty()
    }

    /// Resolve a voice by walking its parents and merging from the root down.
    ///
    /// Grammar weights: child overrides parent. Vocabulary: union.
    /// Quirks: concatenated, root first. Style: field-wise, child wins. A missing parent ends the
    /// chain; a parent cycle is cut at the first repeated id.
    pub fn resolve(&self, id: VoiceId) -> Option<ResolvedVoice> {
        let voice = self.voices.get(&id)?;

        let mut chain = vec![voice];
        let mut seen = vec![voice.id];
        let mut current = voice;
        while let Some(parent_id) = current.parent {
            if seen.contains(&parent_id) {
                log::warn!("voice '{}' has a parent cycle at {:?}", voice.name, parent_id);
                break;
            }
            let Some(parent) = self.voices.get(&parent_id) else {
                break;
            };
            seen.push(parent_id);
            chain.push(parent);
            current = parent;
        }

        let mut grammar_weights = HashMap::new();
        let mut vocabulary = VocabularyPool::default();
        let mut style = Style::default();
        let mut quirks = Vec::new();

        for ancestor in chain.iter().rev() {
            for (k, v) in &ancestor.grammar_weights {
                grammar_weights.insert(k.clone(), *v);
            }
            vocabulary
                .preferred
                .extend(ancestor.vocabulary.preferred.iter().cloned());
            vocabulary
                .avoided
                .extend(ancestor.vocabulary.avoided.iter().cloned());
            style = ancestor.style.clone().over(&style);
            quirks.extend(ancestor.quirks.iter().cloned());
        }

        Some(ResolvedVoice {
            id: voice.id,
            name: voice.name.clone(),
            grammar_weights,
            vocabulary,
            style,
            quirks,
        })
    }

    /// Load voices from a RON file holding a list of `Voice` definitions.
    pub fn load_from_ron(&mut self, path: &Path) -> Result<(), VoiceError> {
        let contents = std::fs::read_to_string(path)?;
        self.parse_ron(&contents)
    }

    pub fn parse_ron(&mut self, input: &str) -> Result<(), VoiceError> {
        let voices: Vec<Voice> = ron::from_str(input)?;
        for voice in voices {
            self.register(voice);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(list: &[&str]) -> FxHashSet<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn bard() -> Voice {
        Voice {
            id: VoiceId(1),
            name: "bard".to_string(),
            parent: None,
            grammar_weights: HashMap::from([
                ("flourish".to_string(), 2.0),
                ("aside".to_string(), 0.5),
            ]),
            vocabulary: VocabularyPool {
                preferred: words(&["alas", "valiant"]),
                avoided: words(&["okay"]),
            },
            style: Style {
                person: Some(Person::Third),
                tense: Some(Tense::Past),
                tone: Some("lyrical".to_string()),
                max_sentences: Some(4),
            },
            quirks: vec!["addresses the audience".to_string()],
        }
    }

    fn grim_bard() -> Voice {
        Voice {
            id: VoiceId(2),
            name: "grim_bard".to_string(),
            parent: Some(VoiceId(1)),
            grammar_weights: HashMap::from([
                ("aside".to_string(), 1.5),
                ("gore".to_string(), 3.0),
            ]),
            vocabulary: VocabularyPool {
                preferred: words(&["ashen"]),
                avoided: words(&["cheerful"]),
            },
            style: Style {
                tone: Some("grim".to_string()),
                ..Style::default()
            },
            quirks: vec!["lingers on wounds".to_string()],
        }
    }

    #[test]
    fn register_and_get() {
        let mut registry = VoiceRegistry::new();
        registry.register(bard());
        assert!(registry.get(VoiceId(1)).is_some());
        assert!(registry.get(VoiceId(99)).is_none());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn resolve_inheritance_chain() {
        let mut registry = VoiceRegistry::new();
        registry.register(bard());
        registry.register(grim_bard());

        let resolved = registry.resolve(VoiceId(2)).unwrap();
        assert_eq!(resolved.name, "grim_bard");
        assert_eq!(resolved.grammar_weights.get("aside"), Some(&1.5));
        assert_eq!(resolved.grammar_weights.get("flourish"), Some(&2.0));
        assert_eq!(resolved.grammar_weights.get("gore"), Some(&3.0));
        assert_eq!(resolved.preferred_sorted(), vec!["alas", "ashen", "valiant"]);
        assert_eq!(resolved.avoided_sorted(), vec!["cheerful", "okay"]);
        // tone overridden, the rest inherited
        assert_eq!(resolved.style.tone.as_deref(), Some("grim"));
        assert_eq!(resolved.style.person, Some(Person::Third));
        assert_eq!(resolved.style.max_sentences, Some(4));
        assert_eq!(
            resolved.quirks,
            vec!["addresses the audience".to_string(), "lingers on wounds".to_string()]
        );
    }

    #[test]
    fn resolve_missing_parent_graceful() {
        let mut registry = VoiceRegistry::new();
        registry.register(grim_bard());
        let resolved = registry.resolve(VoiceId(2)).unwrap();
        assert_eq!(resolved.grammar_weights.get("aside"), Some(&1.5));
        assert_eq!(resolved.style.person, None);
    }

    #[test]
    fn resolve_parent_cycle_terminates() {
        let mut a = bard();
        a.parent = Some(VoiceId(2));
        let mut registry = VoiceRegistry::new();
        registry.register(a);
        registry.register(grim_bard());
        let resolved = registry.resolve(VoiceId(1)).unwrap();
        assert_eq!(resolved.name, "bard");
    }

    #[test]
    fn resolve_missing_voice() {
        assert!(VoiceRegistry::new().resolve(VoiceId(5)).is_none());
    }

    #[test]
    fn parse_ron_list() {
        let mut registry = VoiceRegistry::new();
        registry
            .parse_ron(
                r#"[
                    (id: VoiceId(10), name: "plain"),
                    (id: VoiceId(11), name: "noir", parent: Some(VoiceId(10)),
                     style: (tense: Some(Present), tone: Some("hard-boiled"))),
                ]"#,
            )
            .unwrap();
        let noir = registry.resolve(VoiceId(11)).unwrap();
        assert_eq!(noir.style.tense, Some(Tense::Present));
        assert!(noir.grammar_weights.is_empty());
    }
}
