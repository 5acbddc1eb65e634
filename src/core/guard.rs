/// Model output verification.
///
/// The guard is a set of heuristics, each one switchable in `GuardConfig`.
/// It checks model prose against the statement it was asked to narrate and
/// reports every violation found, so a retry prompt can list them all.
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::context::NarrativeContext;
use crate::core::voice::{Person, ResolvedVoice};
use crate::ndl::ast::{ArgValue, Modifier, Statement};
use crate::schema::entity::Entity;
use crate::schema::event::Outcome;
use crate::schema::world::WorldState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    /// Longest accepted narration in characters; 0 disables the limit.
    pub max_chars: usize,
    pub require_actor: bool,
    pub forbid_absent_entities: bool,
    pub check_outcome: bool,
    pub success_markers: Vec<String>,
    pub failure_markers: Vec<String>,
    pub forbid_invented_numbers: bool,
    pub forbid_markup: bool,
    pub check_avoided_words: bool,
    pub check_repetition: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        let words = |list: &[&str]| -> Vec<String> { list.iter().map(|s| s.to_string()).collect() };
        Self {
            max_chars: 1200,
            require_actor: true,
            forbid_absent_entities: true,
            check_outcome: true,
            success_markers: words(&["succeeds", "succeeded", "manages to", "managed to", "triumphs"]),
            failure_markers: words(&["fails", "failed", "misses", "missed", "falls short"]),
            forbid_invented_numbers: true,
            forbid_markup: true,
            check_avoided_words: true,
            check_repetition: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum Violation {
    #[error("the narration is empty")]
    Empty,
    #[error("the narration is longer than {0} characters")]
    TooLong(usize),
    #[error("{0} must be named")]
    MissingEntity(String),
    #[error("{0} is not part of this event and must not appear")]
    AbsentEntity(String),
    #[error("the narration contradicts the decided outcome ({0})")]
    OutcomeContradiction(String),
    #[error("the number {0} is not among the facts")]
    InventedNumber(String),
    #[error("NDL markup leaked into the narration")]
    MarkupLeak,
    #[error("the word '{0}' is avoided by this voice")]
    AvoidedWord(String),
    #[error("repeats recent narration: \"{0}\"")]
    Repetition(String),
}

/// Case-insensitive phrase search on word boundaries. `haystack` must
/// already be lowercase.
fn contains_phrase(haystack: &str, phrase: &str) -> bool {
    let needle = phrase.trim().to_lowercase();
    if needle.is_empty() {
        return false;
    }
    haystack.match_indices(&needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric) && !after.is_some_and(char::is_alphanumeric)
    })
}

/// Ways prose may legitimately name an entity.
fn name_forms(entity: &Entity) -> Vec<String> {
    let name = entity.name.to_lowercase();
    let mut forms = vec![entity.handle.to_lowercase()];
    for article in ["the ", "a ", "an "] {
        if let Some(rest) = name.strip_prefix(article) {
            forms.push(rest.to_string());
        }
    }
    forms.push(name);
    forms
}

/// Numeric literals in free text, as written and as values.
fn numbers_in(text: &str) -> Vec<(String, f64)> {
    let mut found = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let starts = chars[i].is_ascii_digit() && (i == 0 || !chars[i - 1].is_alphanumeric());
        if !starts {
            i += 1;
            continue;
        }
        let start = i;
        while i < chars.len() && chars[i].is_ascii_digit() {
            i += 1;
        }
        if i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit() {
            i += 1;
            while i < chars.len() && chars[i].is_ascii_digit() {
                i += 1;
            }
        }
        let literal: String = chars[start..i].iter().collect();
        if let Ok(value) = literal.parse::<f64>() {
            found.push((literal, value));
        }
    }
    found
}

/// Numbers the narration may use: every numeric argument, numbers written
/// inside the statement's own text, and numbers in the names of the
/// entities it mentions.
fn allowed_numbers(stmt: &Statement, world: &WorldState<'_>) -> Vec<f64> {
    let mut allowed: Vec<f64> = stmt.numbers().into_iter().map(f64::abs).collect();
    let hints = stmt.modifiers.iter().filter_map(|m| match m {
        Modifier::Hint(c) => Some(c),
        Modifier::Manner(_) => None,
    });
    let texts = stmt
        .clauses
        .iter()
        .chain(hints)
        .flat_map(|c| c.args.iter())
        .filter_map(|a| match &a.value {
            ArgValue::Text(s) => Some(s.as_str()),
            _ => None,
        })
        .chain(stmt.manners());
    let names = stmt
        .entity_keys()
        .into_iter()
        .filter_map(|key| world.resolve(key.as_str()))
        .map(|e| e.name.as_str());
    for text in texts.chain(names) {
        allowed.extend(numbers_in(text).into_iter().map(|(_, v)| v));
    }
    allowed
}

fn leaks_markup(text: &str) -> bool {
    if text.contains("->") || text.contains('~') {
        return true;
    }
    text.match_indices('$').any(|(i, _)| {
        text[i + 1..]
            .chars()
            .next()
            .is_some_and(|c| c.is_alphabetic() || c == '_' || c == '{' || c == '"')
    })
}

pub struct Guard<'c> {
    config: &'c GuardConfig,
}

impl<'c> Guard<'c> {
    pub fn new(config: &'c GuardConfig) -> Self {
        Self { config }
    }

    /// Every violation `text` commits against `stmt`. Empty means accepted.
    pub fn check(
        &self,
        text: &str,
        stmt: &Statement,
        world: &WorldState<'_>,
        voice: Option<&ResolvedVoice>,
        context: &NarrativeContext,
    ) -> Vec<Violation> {
        let cfg = self.config;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return vec![Violation::Empty];
        }

        let mut violations = Vec::new();
        let lower = trimmed.to_lowercase();

        if cfg.max_chars > 0 && trimmed.chars().count() > cfg.max_chars {
            violations.push(Violation::TooLong(cfg.max_chars));
        }

        // First and second person voices address the actor as "I"/"you".
        let personal = voice
            .and_then(|v| v.style.person)
            .is_some_and(|p| p != Person::Third);
        if cfg.require_actor && !personal {
            let actor = stmt
                .primary()
                .and_then(|c| c.actor())
                .and_then(|key| world.resolve(key.as_str()));
            if let Some(actor) = actor {
                if !name_forms(actor).iter().any(|f| contains_phrase(&lower, f)) {
                    violations.push(Violation::MissingEntity(actor.name.clone()));
                }
            }
        }

        if cfg.forbid_absent_entities {
            let present: Vec<&Entity> = stmt
                .entity_keys()
                .into_iter()
                .filter_map(|key| world.resolve(key.as_str()))
                .collect();
            for entity in world.sorted() {
                if present.iter().any(|p| p.id == entity.id) || entity.name.chars().count() < 3 {
                    continue;
                }
                if contains_phrase(&lower, &entity.name) {
                    violations.push(Violation::AbsentEntity(entity.name.clone()));
                }
            }
        }

        if cfg.check_outcome {
            let contradicting: &[String] = match stmt.outcome() {
                Some(Outcome::Success) => &cfg.failure_markers,
                Some(Outcome::Failure) => &cfg.success_markers,
                _ => &[],
            };
            if contradicting.iter().any(|m| contains_phrase(&lower, m)) {
                if let Some(outcome) = stmt.outcome() {
                    violations.push(Violation::OutcomeContradiction(outcome.name().to_string()));
                }
            }
        }

        if cfg.forbid_invented_numbers {
            let allowed = allowed_numbers(stmt, world);
            for (literal, value) in numbers_in(trimmed) {
                if !allowed.iter().any(|a| (a - value).abs() < 1e-9) {
                    violations.push(Violation::InventedNumber(literal));
                }
            }
        }

        if cfg.forbid_markup && leaks_markup(trimmed) {
            violations.push(Violation::MarkupLeak);
        }

        if cfg.check_avoided_words {
            if let Some(voice) = voice {
                for word in voice.avoided_sorted() {
                    if contains_phrase(&lower, word) {
                        violations.push(Violation::AvoidedWord(word.to_string()));
                    }
                }
            }
        }

        if cfg.check_repetition {
            if let Some(repeat) = context.check_repetition(trimmed) {
                violations.push(Violation::Repetition(repeat));
            }
        }

        violations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::voice::{Style, VocabularyPool};
    use crate::ndl::parse;
    use crate::schema::entity::{EntityId, Pronouns, VoiceId};
    use std::collections::HashMap;

    fn entities() -> HashMap<EntityId, Entity> {
        [
            Entity::new(1, "player", "Elara", Pronouns::SheHer),
            Entity::new(2, "goblin", "the goblin", Pronouns::ItIts),
            Entity::new(3, "tom", "Old Tom", Pronouns::HeHim),
        ]
        .into_iter()
        .map(|e| (e.id, e))
        .collect()
    }

    fn attack() -> Statement {
        parse(r#"do($player, "throw 2 daggers", target=$goblin) -> outcome(success) -> change($goblin, hp=-12)"#)
            .unwrap()
            .statements
            .remove(0)
    }

    fn check(text: &str) -> Vec<Violation> {
        let entities = entities();
        let world = WorldState::new(&entities);
        let config = GuardConfig::default();
        Guard::new(&config).check(text, &attack(), &world, None, &NarrativeContext::default())
    }

    #[test]
    fn faithful_narration_passes() {
        assert_eq!(
            check("Elara throws 2 daggers at the goblin. Both strike home, and the creature loses 12 hp."),
            vec![]
        );
        // article-less and handle forms count as naming the actor
        assert_eq!(check("Quick as thought, the player's daggers find the goblin."), vec![]);
    }

    #[test]
    fn empty_short_circuits() {
        assert_eq!(check("   "), vec![Violation::Empty]);
    }

    #[test]
    fn missing_actor() {
        assert_eq!(
            check("Two daggers fly at the goblin."),
            vec![Violation::MissingEntity("Elara".to_string())]
        );
    }

    #[test]
    fn absent_entity_and_contradiction() {
        assert_eq!(
            check("Elara throws, but misses, and Old Tom laughs."),
            vec![
                Violation::AbsentEntity("Old Tom".to_string()),
                Violation::OutcomeContradiction("success".to_string()),
            ]
        );
    }

    #[test]
    fn invented_numbers_and_markup() {
        assert_eq!(
            check("Elara throws 3 daggers at $goblin."),
            vec![Violation::InventedNumber("3".to_string()), Violation::MarkupLeak]
        );
        assert_eq!(check("Elara hits -> the goblin reels."), vec![Violation::MarkupLeak]);
        assert_eq!(check("Elara pays $5 and throws."), vec![Violation::InventedNumber("5".to_string())]);
    }

    #[test]
    fn length_limit() {
        let entities = entities();
        let world = WorldState::new(&entities);
        let config = GuardConfig { max_chars: 10, ..GuardConfig::default() };
        let v = Guard::new(&config).check(
            "Elara strikes the goblin.",
            &attack(),
            &world,
            None,
            &NarrativeContext::default(),
        );
        assert_eq!(v, vec![Violation::TooLong(10)]);
    }

    #[test]
    fn voice_rules() {
        let entities = entities();
        let world = WorldState::new(&entities);
        let voice = ResolvedVoice {
            id: VoiceId(1),
            name: "second".to_string(),
            grammar_weights: HashMap::new(),
            vocabulary: VocabularyPool {
                preferred: Default::default(),
                avoided: ["suddenly".to_string()].into_iter().collect(),
            },
            style: Style { person: Some(Person::Second), ..Style::default() },
            quirks: vec![],
        };
        let config = GuardConfig::default();
        let v = Guard::new(&config).check(
            "Suddenly you strike the goblin.",
            &attack(),
            &world,
            Some(&voice),
            &NarrativeContext::default(),
        );
        assert_eq!(v, vec![Violation::AvoidedWord("suddenly".to_string())]);
    }

    #[test]
    fn repetition_against_context() {
        let entities = entities();
        let world = WorldState::new(&entities);
        let config = GuardConfig::default();
        let mut context = NarrativeContext::default();
        context.record("Elara strikes the goblin.");
        let v = Guard::new(&config).check("Elara strikes the goblin.", &attack(), &world, None, &context);
        assert_eq!(v, vec![Violation::Repetition("elara strikes the goblin".to_string())]);
    }

    #[test]
    fn checks_can_be_disabled() {
        let entities = entities();
        let world = WorldState::new(&entities);
        let config = GuardConfig {
            require_actor: false,
            forbid_invented_numbers: false,
            ..GuardConfig::default()
        };
        let v = Guard::new(&config).check(
            "Seven blades fly.",
            &attack(),
            &world,
            None,
            &NarrativeContext::default(),
        );
        assert!(v.is_empty());
    }

    #[test]
    fn numbers_in_entity_names_are_allowed() {
        let mut entities = entities();
        let room = Entity::new(4, "room", "Room 101", Pronouns::ItIts);
        let vault = Entity::new(5, "vault", "Vault 7", Pronouns::ItIts);
        entities.insert(room.id, room);
        entities.insert(vault.id, vault);
        let world = WorldState::new(&entities);
        let config = GuardConfig::default();
        let stmt = parse("move($player, to=$room)").unwrap().statements.remove(0);
        let guard = Guard::new(&config);

        let ctx = NarrativeContext::default();
        assert_eq!(guard.check("Elara walks into Room 101.", &stmt, &world, None, &ctx), vec![]);
        // only the names of entities in the statement count
        assert_eq!(
            guard.check("Elara walks into Room 101, not 7.", &stmt, &world, None, &ctx),
            vec![Violation::InventedNumber("7".to_string())]
        );
    }

    #[test]
    fn number_scanning() {
        assert_eq!(
            numbers_in("B2 took 3.5 hits, then 12."),
            vec![("3.5".to_string(), 3.5), ("12".to_string(), 12.0)]
        );
    }
}
