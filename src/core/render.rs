/// Deterministic template narrator.
///
/// Turns one NDL statement into prose using the grammar set, and falls back
/// to a fixed plain sentence per clause when no rule applies, so a validated
/// statement always renders.
use rand::rngs::StdRng;
use rustc_hash::FxHashSet;
use std::collections::HashMap;
use thiserror::Error;

use crate::core::grammar::{GrammarError, GrammarSet, SelectionContext};
use crate::core::voice::ResolvedVoice;
use crate::ndl::ast::{ArgValue, Clause, Modifier, Statement, Verb};
use crate::schema::entity::Entity;
use crate::schema::event::Outcome;
use crate::schema::narrative_fn::NarrativeFunction;
use crate::schema::world::WorldState;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("statement has no clauses")]
    EmptyStatement,
    #[error("unknown entity {0}")]
    UnknownEntity(String),
}

/// Entities and slot values a clause makes available to templates.
#[derive(Debug, Clone, Default)]
pub struct ClauseBinding<'w> {
    pub roles: HashMap<String, &'w Entity>,
    pub slots: HashMap<String, String>,
}

impl<'w> ClauseBinding<'w> {
    fn name(&self, role: &str) -> Option<&'w str> {
        self.roles.get(role).map(|e| e.name.as_str())
    }
}

fn value_text(value: &ArgValue, world: &WorldState<'_>) -> String {
    match value {
        ArgValue::Entity(key) => world
            .resolve(key.as_str())
            .map(|e| e.name.clone())
            .unwrap_or_else(|| key.as_str().to_string()),
        ArgValue::Text(s) | ArgValue::Symbol(s) => s.clone(),
        ArgValue::Number(n) => format!("{}", n),
        ArgValue::Bool(b) => b.to_string(),
    }
}

/// Bind a clause's arguments to template roles and slots.
///
/// The first positional entity is `actor`, the second `object`; named
/// entities bind under their argument name. The first quoted text fills the
/// verb's text slot (`action`, `line`, `fact`, `text`), the first bare word
/// fills `value`, and every other named argument becomes a slot of its name.
pub fn bind_clause<'w>(
    clause: &Clause,
    world: &WorldState<'w>,
) -> Result<ClauseBinding<'w>, RenderError> {
    let mut binding = ClauseBinding::default();
    let mut positional_entities = 0;
    let text_slot = clause.kind().text_slot();

    for arg in &clause.args {
        match (&arg.name, &arg.value) {
            (name, ArgValue::Entity(key)) => {
                let entity = world
                    .resolve(key.as_str())
                    .ok_or_else(|| RenderError::UnknownEntity(key.to_string()))?;
                let role = match name {
                    Some(name) => name.clone(),
                    None => {
                        positional_entities += 1;
                        match positional_entities {
                            1 => "actor".to_string(),
                            2 => "object".to_string(),
                            _ => continue,
                        }
                    }
                };
                binding.roles.entry(role).or_insert(entity);
            }
            (Some(name), value) => {
                binding.slots.insert(name.clone(), value_text(value, world));
            }
            (None, ArgValue::Text(s)) => {
                binding
                    .slots
                    .entry(text_slot.to_string())
                    .or_insert_with(|| s.clone());
            }
            (None, value) => {
                binding
                    .slots
                    .entry("value".to_string())
                    .or_insert_with(|| value_text(value, world));
            }
        }
    }
    Ok(binding)
}

/// Tags every clause of the statement sees: hints, intensity, outcome.
pub fn statement_tags(stmt: &Statement) -> FxHashSet<String> {
    let mut tags = FxHashSet::default();
    for modifier in &stmt.modifiers {
        if let Modifier::Hint(hint) = modifier {
            if let Some(symbol) = stmt.hint_symbol(&hint.verb) {
                tags.insert(format!("{}:{}", hint.verb, symbol));
            }
        }
    }
    if let Some(name) = stmt.hint_symbol("fn") {
        let intensity = NarrativeFunction::from_name(name).intensity();
        if intensity >= 0.7 {
            tags.insert("intensity:high".to_string());
        } else if intensity <= 0.3 {
            tags.insert("intensity:low".to_string());
        }
    }
    if let Some(outcome) = stmt.outcome() {
        tags.insert(format!("outcome:{}", outcome.name()));
    }
    tags
}

fn terminal(c: char) -> bool {
    matches!(c, '.' | '!' | '?')
}

fn spaced(key: &str) -> String {
    key.replace('_', " ")
}

fn or_someone(name: Option<&str>) -> &str {
    name.unwrap_or("someone")
}

/// The fixed, grammar-free rendering of a clause.
pub fn plain_clause(clause: &Clause, binding: &ClauseBinding<'_>, outcome: Option<Outcome>) -> String {
    let actor = binding.name("actor");
    let slot = |name: &str| binding.slots.get(name).map(String::as_str);

    let mut text = match clause.kind() {
        Verb::Do => {
            let mut s = format!(
                "{} attempts to {}",
                or_someone(actor),
                slot("action").unwrap_or("act")
            );
            if let Some(target) = binding.name("target") {
                s.push_str(&format!(", targeting {}", target));
            }
            s
        }
        Verb::Say => {
            let line = slot("line").unwrap_or("");
            let line = if line.ends_with(terminal) {
                line.to_string()
            } else {
                format!("{}.", line)
            };
            match binding.name("to") {
                Some(to) => format!("{} says to {}, \"{}\"", or_someone(actor), to, line),
                None => format!("{} says, \"{}\"", or_someone(actor), line),
            }
        }
        Verb::Move => format!(
            "{} moves to {}",
            or_someone(actor),
            binding.name("to").unwrap_or("somewhere else")
        ),
        Verb::Outcome => {
            let who = or_someone(actor);
            match outcome {
                Some(Outcome::Success) => format!("{} succeeds", who),
                Some(Outcome::Failure) => format!("{} fails", who),
                Some(Outcome::Partial) => format!("{} only partly succeeds", who),
                Some(Outcome::Ambiguous) | None => "the result is unclear".to_string(),
            }
        }
        Verb::Change => {
            let who = or_someone(actor);
            let parts: Vec<String> = clause
                .named()
                .map(|(key, value)| match value {
                    ArgValue::Number(n) if *n < 0.0 => {
                        format!("{}'s {} drops by {}", who, spaced(key), -n)
                    }
                    ArgValue::Number(n) => format!("{}'s {} rises by {}", who, spaced(key), n),
                    ArgValue::Bool(true) => format!("{} is now {}", who, spaced(key)),
                    ArgValue::Bool(false) => format!("{} is no longer {}", who, spaced(key)),
                    _ => format!(
                        "{}'s {} becomes {}",
                        who,
                        spaced(key),
                        binding.slots.get(key).map(String::as_str).unwrap_or("")
                    ),
                })
                .collect();
            parts.join(" and ")
        }
        Verb::Reveal => format!(
            "{} reveals that {}",
            or_someone(actor),
            slot("fact").unwrap_or("something")
        ),
        Verb::Describe => format!("{} {}", or_someone(actor), slot("text").unwrap_or("")),
        Verb::Custom(verb) => {
            let mut s = match actor {
                Some(actor) => format!("{} performs {}", actor, spaced(&verb)),
                None => format!("something happens: {}", spaced(&verb)),
            };
            let extras: Vec<String> = clause
                .named()
                .map(|(k, _)| {
                    format!(
                        "{} {}",
                        spaced(k),
                        binding.slots.get(k).map(String::as_str).unwrap_or("")
                    )
                })
                .collect();
            if !extras.is_empty() {
                s.push_str(&format!(" with {}", extras.join(", ")));
            }
            s
        }
    };

    if let Some(manner) = slot("manner") {
        text.push_str(", ");
        text.push_str(manner);
    }
    text
}

/// Capitalise sentence starts and make sure the text ends with punctuation.
pub fn finish_sentence(text: &str) -> String {
    let trimmed = text.trim();
    let mut out = String::with_capacity(trimmed.len() + 1);
    let mut capitalize = true;
    let mut prev_end = false;
    for c in trimmed.chars() {
        if capitalize && c.is_alphabetic() {
            out.extend(c.to_uppercase());
            capitalize = false;
        } else {
            out.push(c);
            if c.is_alphanumeric() {
                capitalize = false;
            }
        }
        if c.is_whitespace() && prev_end {
            capitalize = true;
        }
        prev_end = terminal(c);
    }
    let ends_well =
        out.ends_with(terminal) || (out.ends_with('"') && out[..out.len() - 1].ends_with(terminal));
    if !out.is_empty() && !ends_well {
        out.push('.');
    }
    out
}

/// Plain-language fact lines for a statement, one per clause.
pub fn plain_facts(stmt: &Statement, world: &WorldState<'_>) -> Result<Vec<String>, RenderError> {
    let primary = stmt.primary().ok_or(RenderError::EmptyStatement)?;
    let primary_binding = bind_clause(primary, world)?;
    let outcome = stmt.outcome();
    stmt.clauses
        .iter()
        .map(|clause| {
            let binding = if clause.kind() == Verb::Outcome {
                primary_binding.clone()
            } else {
                bind_clause(clause, world)?
            };
            Ok(finish_sentence(&plain_clause(clause, &binding, outcome)))
        })
        .collect()
}

/// Renders statements with a grammar set and an optional voice.
pub struct Renderer<'g> {
    grammars: &'g GrammarSet,
    voice: Option<&'g ResolvedVoice>,
}

impl<'g> Renderer<'g> {
    pub fn new(grammars: &'g GrammarSet, voice: Option<&'g ResolvedVoice>) -> Self {
        Self { grammars, voice }
    }

    /// Render one statement. Same inputs and RNG state give the same text.
    pub fn render(
        &self,
        stmt: &Statement,
        world: &WorldState<'_>,
        rng: &mut StdRng,
    ) -> Result<String, RenderError> {
        let primary = stmt.primary().ok_or(RenderError::EmptyStatement)?;
        let base_tags = statement_tags(stmt);
        let outcome = stmt.outcome();
        let manner = stmt.manners().collect::<Vec<_>>().join(", ");
        let primary_binding = bind_clause(primary, world)?;

        let mut sentences = Vec::with_capacity(stmt.clauses.len());
        let mut outcome_covered = false;

        for (i, clause) in stmt.clauses.iter().enumerate() {
            let is_outcome = clause.kind() == Verb::Outcome;
            if is_outcome && outcome_covered {
                continue;
            }
            let mut binding = if is_outcome {
                primary_binding.clone()
            } else {
                bind_clause(clause, world)?
            };
            if i == 0 && !manner.is_empty() {
                binding.slots.insert("manner".to_string(), manner.clone());
            }

            let mut candidates = Vec::with_capacity(2);
            match outcome {
                Some(o) if is_outcome => candidates.push(format!("outcome_{}", o.name())),
                Some(o) => {
                    candidates.push(format!("{}_{}", clause.verb, o.name()));
                    candidates.push(clause.verb.clone());
                }
                _ => candidates.push(clause.verb.clone()),
            }

            let mut tags = base_tags.clone();
            tags.insert(format!("verb:{}", clause.verb));
            for entity in binding.roles.values() {
                tags.extend(entity.tags.iter().cloned());
            }
            let ctx = SelectionContext {
                tags,
                roles: binding.roles.clone(),
                slots: binding.slots.clone(),
                voice_weights: self.voice.map(|v| &v.grammar_weights),
            };

            let mut rendered = None;
            for (ci, rule) in candidates.iter().enumerate() {
                if !self.grammars.contains(rule) {
                    continue;
                }
                match self.grammars.expand(rule, &ctx, rng) {
                    Ok(text) => {
                        // An outcome-specific rule already tells how it went.
                        if !is_outcome && ci == 0 && outcome.is_some() {
                            outcome_covered = true;
                        }
                        rendered = Some(text);
                        break;
                    }
                    Err(GrammarError::PreconditionFailed(_)) => continue,
                    Err(e) => {
                        log::warn!("grammar rule '{}' failed, trying next: {}", rule, e);
                    }
                }
            }

            let text = rendered.unwrap_or_else(|| plain_clause(clause, &binding, outcome));
            sentences.push(finish_sentence(&text));
        }

        Ok(sentences.join(" "))
    }
}
