/// Event to NDL translation, the producer side of the determinism contract.
///
/// Emission is a pure function of the event and the world: participants,
/// metadata and effects are ordered explicitly, so map iteration order never
/// reaches the output.
use thiserror::Error;

use crate::ndl::ast::{Arg, ArgValue, Clause, EntityKey, Modifier, Statement, Verb};
use crate::ndl::format::{is_ident, is_symbol};
use crate::schema::entity::{EntityId, Value};
use crate::schema::event::Event;
use crate::schema::world::WorldState;

#[derive(Debug, Error, PartialEq)]
pub enum EmitError {
    #[error("event references unknown entity {0:?}")]
    UnknownEntity(EntityId),
    #[error("event '{0}' has no participants")]
    NoParticipants(String),
    #[error("'{0}' is not a valid NDL name")]
    InvalidName(String),
    #[error("'{0}' is not a finite number")]
    NonFinite(String),
}

fn checked_name(name: &str) -> Result<&str, EmitError> {
    if is_ident(name) {
        Ok(name)
    } else {
        Err(EmitError::InvalidName(name.to_string()))
    }
}

/// NDL has no spelling for NaN or infinity.
fn value_arg(key: &str, value: &Value) -> Result<ArgValue, EmitError> {
    Ok(match value {
        Value::String(s) => ArgValue::Text(s.clone()),
        Value::Float(f) if !f.is_finite() => return Err(EmitError::NonFinite(key.to_string())),
        Value::Float(f) => ArgValue::Number(*f),
        Value::Int(i) => ArgValue::Number(*i as f64),
        Value::Bool(b) => ArgValue::Bool(*b),
    })
}

fn symbol_or_text(name: &str) -> ArgValue {
    if is_symbol(name) {
        ArgValue::Symbol(name.to_string())
    } else {
        ArgValue::Text(name.to_string())
    }
}

fn hint(name: &str, value: ArgValue) -> Modifier {
    Modifier::Hint(Clause::new(name, vec![Arg::positional(value)]))
}

fn entity_arg(world: &WorldState<'_>, id: EntityId) -> Result<ArgValue, EmitError> {
    world
        .get(id)
        .map(|e| ArgValue::Entity(EntityKey::new(&e.handle)))
        .ok_or(EmitError::UnknownEntity(id))
}

/// Translate a game event into one NDL statement.
pub fn emit_event(event: &Event, world: &WorldState<'_>) -> Result<Statement, EmitError> {
    let verb = checked_name(&event.event_type)?;
    let actor_index = event
        .participants
        .iter()
        .position(|p| p.role == "actor" || p.role == "subject")
        .unwrap_or(0);
    let actor = event
        .participants
        .get(actor_index)
        .ok_or_else(|| EmitError::NoParticipants(event.event_type.clone()))?;

    let mut args = vec![Arg::positional(entity_arg(world, actor.entity_id)?)];

    let text_slot = Verb::of(verb).text_slot();
    if let Some(Value::String(text)) = event.metadata.get(text_slot) {
        args.push(Arg::positional(ArgValue::Text(text.clone())));
    }

    let mut others: Vec<_> = event
        .participants
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != actor_index)
        .map(|(_, p)| p)
        .collect();
    others.sort_by(|a, b| a.role.cmp(&b.role).then(a.entity_id.cmp(&b.entity_id)));
    for p in others {
        let role = checked_name(&p.role)?;
        args.push(Arg::named(role, entity_arg(world, p.entity_id)?));
    }

    if let Some(location) = &event.location {
        args.push(Arg::named("at", entity_arg(world, location.entity_id)?));
    }

    let mut keys: Vec<&String> = event
        .metadata
        .iter()
        .filter(|(k, v)| !(k.as_str() == text_slot && matches!(v, Value::String(_))))
        .map(|(k, _)| k)
        .collect();
    keys.sort();
    for key in keys {
        let name = checked_name(key)?;
        args.push(Arg::named(name, value_arg(name, &event.metadata[key])?));
    }

    let mut clauses = vec![Clause::new(verb, args)];
    if let Some(outcome) = event.outcome {
        clauses.push(Clause::new(
            "outcome",
            vec![Arg::positional(ArgValue::Symbol(outcome.name().to_string()))],
        ));
    }
    for effect in &event.effects {
        let key = checked_name(&effect.key)?;
        clauses.push(Clause::new(
            "change",
            vec![
                Arg::positional(entity_arg(world, effect.entity_id)?),
                Arg::named(key, value_arg(key, &effect.delta)?),
            ],
        ));
    }

    let modifiers = vec![
        hint("fn", symbol_or_text(event.narrative_fn.name())),
        hint("mood", ArgValue::Symbol(event.mood.name().to_string())),
        hint("stakes", ArgValue::Symbol(event.stakes.name().to_string())),
    ];

    Ok(Statement::new(clauses, modifiers))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndl::{parse, validate, Severity};
    use crate::schema::entity::{Entity, Pronouns};
    use crate::schema::event::{Effect, EntityRef, Mood, Outcome, Stakes};
    use crate::schema::narrative_fn::NarrativeFunction;
    use std::collections::HashMap;

    fn entities() -> HashMap<EntityId, Entity> {
        [
            Entity::new(1, "player", "Elara", Pronouns::SheHer),
            Entity::new(2, "goblin", "the goblin", Pronouns::ItIts),
            Entity::new(3, "hall", "the great hall", Pronouns::ItIts),
            Entity::new(4, "tom", "Old Tom", Pronouns::HeHim),
        ]
        .into_iter()
        .map(|e| (e.id, e))
        .collect()
    }

    fn attack() -> Event {
        Event {
            event_type: "do".to_string(),
            participants: vec![EntityRef::new(2, "target"), EntityRef::new(1, "actor")],
            location: Some(EntityRef::new(3, "location")),
            mood: Mood::Tense,
            stakes: Stakes::High,
            outcome: Some(Outcome::Success),
            narrative_fn: NarrativeFunction::Confrontation,
            effects: vec![Effect {
                entity_id: EntityId(2),
                key: "hp".to_string(),
                delta: Value::Int(-12),
            }],
            metadata: HashMap::from([
                ("action".to_string(), Value::String("swing the axe".to_string())),
                ("weapon".to_string(), Value::String("axe".to_string())),
                ("critical".to_string(), Value::Bool(true)),
            ]),
        }
    }

    #[test]
    fn emits_canonical_statement() {
        let entities = entities();
        let world = WorldState::new(&entities);
        let stmt = emit_event(&attack(), &world).unwrap();
        assert_eq!(
            stmt.to_string(),
            "do($player, \"swing the axe\", target=$goblin, at=$hall, critical=true, weapon=\"axe\") \
             -> outcome(success) -> change($goblin, hp=-12) \
             ~ fn(confrontation) ~ mood(tense) ~ stakes(high)"
        );
    }

    #[test]
    fn emitted_statement_parses_and_validates() {
        let entities = entities();
        let world = WorldState::new(&entities);
        let stmt = emit_event(&attack(), &world).unwrap();
        let doc = parse(&stmt.to_string()).unwrap();
        assert_eq!(doc.statements[0], stmt);
        let diagnostics = validate(&doc, &world);
        assert!(
            diagnostics.iter().all(|d| d.severity != Severity::Error),
            "{:?}",
            diagnostics
        );
    }

    #[test]
    fn emission_is_deterministic() {
        let entities = entities();
        let world = WorldState::new(&entities);
        let first = emit_event(&attack(), &world).unwrap().to_string();
        for _ in 0..10 {
            assert_eq!(emit_event(&attack(), &world).unwrap().to_string(), first);
        }
    }

    #[test]
    fn first_participant_is_actor_by_default() {
        let entities = entities();
        let world = WorldState::new(&entities);
        let event = Event {
            event_type: "say".to_string(),
            participants: vec![EntityRef::new(4, "speaker"), EntityRef::new(1, "to")],
            location: None,
            mood: Mood::Warm,
            stakes: Stakes::Trivial,
            outcome: None,
            narrative_fn: NarrativeFunction::Custom("small talk".to_string()),
            effects: vec![],
            metadata: HashMap::from([("line".to_string(), Value::String("Another round?".to_string()))]),
        };
        let stmt = emit_event(&event, &world).unwrap();
        assert_eq!(
            stmt.to_string(),
            "say($tom, \"Another round?\", to=$player) ~ fn(\"small talk\") ~ mood(warm) ~ stakes(trivial)"
        );
        assert_eq!(stmt.outcome(), None);
    }

    #[test]
    fn unknown_participant_is_an_error() {
        let entities = entities();
        let world = WorldState::new(&entities);
        let mut event = attack();
        event.participants.push(EntityRef::new(99, "witness"));
        assert_eq!(
            emit_event(&event, &world).unwrap_err(),
            EmitError::UnknownEntity(EntityId(99))
        );
    }

    #[test]
    fn invalid_names_are_rejected() {
        let entities = entities();
        let world = WorldState::new(&entities);
        let mut event = attack();
        event.event_type = "sneak attack".to_string();
        assert_eq!(
            emit_event(&event, &world).unwrap_err(),
            EmitError::InvalidName("sneak attack".to_string())
        );

        let mut event = attack();
        event.participants.clear();
        event.event_type = "rest".to_string();
        assert!(matches!(
            emit_event(&event, &world),
            Err(EmitError::NoParticipants(_))
        ));
    }

    #[test]
    fn non_finite_numbers_are_rejected() {
        let entities = entities();
        let world = WorldState::new(&entities);
        let mut event = attack();
        event.metadata.insert("ratio".to_string(), Value::Float(f64::NAN));
        assert_eq!(
            emit_event(&event, &world).unwrap_err(),
            EmitError::NonFinite("ratio".to_string())
        );

        let mut event = attack();
        event.effects[0].delta = Value::Float(f64::NEG_INFINITY);
        assert_eq!(
            emit_event(&event, &world).unwrap_err(),
            EmitError::NonFinite("hp".to_string())
        );
    }
}
