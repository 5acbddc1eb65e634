use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use super::entity::{EntityId, Value};
use super::narrative_fn::NarrativeFunction;

/// The emotional tone of an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Mood {
    Neutral,
    Tense,
    Warm,
    Dread,
    Euphoric,
    Somber,
    Chaotic,
    Intimate,
}

impl Mood {
    pub const ALL: [Mood; 8] = [
        Mood::Neutral,
        Mood::Tense,
        Mood::Warm,
        Mood::Dread,
        Mood::Euphoric,
        Mood::Somber,
        Mood::Chaotic,
        Mood::Intimate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Neutral => "neutral",
            Self::Tense => "tense",
            Self::Warm => "warm",
            Self::Dread => "dread",
            Self::Euphoric => "euphoric",
            Self::Somber => "somber",
            Self::Chaotic => "chaotic",
            Self::Intimate => "intimate",
        }
    }

    pub fn from_name(name: &str) -> Option<Mood> {
        Self::ALL.into_iter().find(|m| m.name() == name)
    }
}

/// The level of consequences at play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Stakes {
    Trivial,
    Low,
    Medium,
    High,
    Critical,
}

impl Stakes {
    pub const ALL: [Stakes; 5] = [
        Stakes::Trivial,
        Stakes::Low,
        Stakes::Medium,
        Stakes::High,
        Stakes::Critical,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Trivial => "trivial",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }

    pub fn from_name(name: &str) -> Option<Stakes> {
        Self::ALL.into_iter().find(|s| s.name() == name)
    }
}

/// The result of an event, as decided by game logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Outcome {
    Success,
    Failure,
    Partial,
    Ambiguous,
}

impl Outcome {
    pub const ALL: [Outcome; 4] = [
        Outcome::Success,
        Outcome::Failure,
        Outcome::Partial,
        Outcome::Ambiguous,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
            Self::Partial => "partial",
            Self::Ambiguous => "ambiguous",
        }
    }

    pub fn from_name(name: &str) -> Option<Outcome> {
        Self::ALL.into_iter().find(|o| o.name() == name)
    }
}

/// A lightweight reference to an entity participating in an event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityRef {
    pub entity_id: EntityId,
    pub role: String,
}

impl EntityRef {
    pub fn new(entity_id: u64, role: &str) -> Self {
        Self {
            entity_id: EntityId(entity_id),
            role: role.to_string(),
        }
    }
}

/// A state delta already applied by game logic, reported so the narration
/// can mention it. Narration never applies effects.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Effect {
    pub entity_id: EntityId,
    pub key: String,
    pub delta: Value,
}

/// A structured record of something that happened in the simulation.
/// Events are the game's only way into the narration bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub event_type: String,
    pub participants: Vec<EntityRef>,
    #[serde(default)]
    pub location: Option<EntityRef>,
    pub mood: Mood,
    pub stakes: Stakes,
    #[serde(default)]
    pub outcome: Option<Outcome>,
    pub narrative_fn: NarrativeFunction,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub metadata: HashMap<String, Value>,
}
