use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Newtype wrapper for entity IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(pub u64);

/// Newtype wrapper for voice IDs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VoiceId(pub u64);

/// Pronoun set for an entity, used when templates ask for
/// `{@actor.subject}`, `{@target.possessive}` and friends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Pronouns {
    SheHer,
    HeHim,
    #[default]
    TheyThem,
    ItIts,
}

impl Pronouns {
    pub fn subject(&self) -> &'static str {
        match self {
            Self::SheHer => "she",
            Self::HeHim => "he",
            Self::TheyThem => "they",
            Self::ItIts => "it",
        }
    }

    pub fn object(&self) -> &'static str {
        match self {
            Self::SheHer => "her",
            Self::HeHim => "him",
            Self::TheyThem => "them",
            Self::ItIts => "it",
        }
    }

    pub fn possessive(&self) -> &'static str {
        match self {
            Self::SheHer => "her",
            Self::HeHim => "his",
            Self::TheyThem => "their",
            Self::ItIts => "its",
        }
    }

    pub fn possessive_standalone(&self) -> &'static str {
        match self {
            Self::SheHer => "hers",
            Self::HeHim => "his",
            Self::TheyThem => "theirs",
            Self::ItIts => "its",
        }
    }

    pub fn reflexive(&self) -> &'static str {
        match self {
            Self::SheHer => "herself",
            Self::HeHim => "himself",
            Self::TheyThem => "themselves",
            Self::ItIts => "itself",
        }
    }

    /// Look up a pronoun form by the name used in template placeholders.
    pub fn form(&self, name: &str) -> Option<&'static str> {
        match name {
            "subject" => Some(self.subject()),
            "object" => Some(self.object()),
            "possessive" => Some(self.possessive()),
            "possessive_standalone" => Some(self.possessive_standalone()),
            "reflexive" => Some(self.reflexive()),
            _ => None,
        }
    }
}

/// A dynamic value stored in entity properties, event metadata and effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    String(String),
    Float(f64),
    Int(i64),
    Bool(bool),
}

impl Value {
    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::String(s) => f.write_str(s),
            Value::Float(x) => write!(f, "{}", x),
            Value::Int(i) => write!(f, "{}", i),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

/// An entity is anything that can appear in a narrated event:
/// a character, creature, place or object.
///
/// `handle` is the stable key NDL uses to refer to the entity (`$handle`);
/// `name` is what the reader sees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub handle: String,
    pub name: String,
    #[serde(default)]
    pub pronouns: Pronouns,
    #[serde(default)]
    pub tags: FxHashSet<String>,
    #[serde(default)]
    pub voice_id: Option<VoiceId>,
    #[serde(default)]
    pub properties: HashMap<String, Value>,
}

impl Entity {
    /// Minimal entity with no tags, voice or properties.
    pub fn new(id: u64, handle: &str, name: &str, pronouns: Pronouns) -> Self {
        Self {
            id: EntityId(id),
            handle: handle.to_string(),
            name: name.to_string(),
            pronouns,
            tags: FxHashSet::default(),
            voice_id: None,
            properties: HashMap::new(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Resolve a template field: pronoun forms, `name`, `handle`, or a property.
    pub fn field(&self, field: &str) -> Option<String> {
        match field {
            "name" => Some(self.name.clone()),
            "handle" => Some(self.handle.clone()),
            other => self
                .pronouns
                .form(other)
                .map(str::to_string)
                .or_else(|| self.properties.get(other).map(|v| v.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entity(tags: &[&str]) -> Entity {
        let mut entity = Entity::new(1, "elara", "Elara", Pronouns::SheHer);
        entity.tags = tags.iter().map(|t| t.to_string()).collect();
        entity.voice_id = Some(VoiceId(10));
        entity.properties = HashMap::from([
            ("title".to_string(), Value::String("Captain".to_string())),
            ("hp".to_string(), Value::Int(30)),
            ("morale".to_string(), Value::Float(0.5)),
        ]);
        entity
    }

    #[test]
    fn has_tag() {
        let entity = make_entity(&["hero", "armed"]);
        assert!(entity.has_tag("hero"));
        assert!(!entity.has_tag("villain"));
        assert!(!entity.has_tag(""));
    }

    #[test]
    fn field_pronoun_forms() {
        let entity = make_entity(&[]);
        assert_eq!(entity.field("subject").as_deref(), Some("she"));
        assert_eq!(entity.field("possessive").as_deref(), Some("her"));
        assert_eq!(entity.field("reflexive").as_deref(), Some("herself"));
    }

    #[test]
    fn field_name_and_properties() {
        let entity = make_entity(&[]);
        assert_eq!(entity.field("name").as_deref(), Some("Elara"));
        assert_eq!(entity.field("handle").as_deref(), Some("elara"));
        assert_eq!(entity.field("title").as_deref(), Some("Captain"));
        assert_eq!(entity.field("hp").as_deref(), Some("30"));
        assert_eq!(entity.field("missing"), None);
    }

    #[test]
    fn pronoun_form_lookup() {
        assert_eq!(Pronouns::HeHim.form("object"), Some("him"));
        assert_eq!(Pronouns::TheyThem.form("possessive_standalone"), Some("theirs"));
        assert_eq!(Pronouns::ItIts.form("nominative"), None);
        assert_eq!(Pronouns::default(), Pronouns::TheyThem);
    }

    #[test]
    fn value_numeric_view() {
        assert_eq!(Value::Int(-12).as_f64(), Some(-12.0));
        assert_eq!(Value::Float(0.25).as_f64(), Some(0.25));
        assert_eq!(Value::Bool(true).as_f64(), None);
        assert_eq!(Value::String("x".into()).to_string(), "x");
    }

    #[test]
    fn entity_from_ron_uses_defaults() {
        let entity: Entity =
            ron::from_str(r#"(id: EntityId(7), handle: "goblin", name: "the goblin")"#).unwrap();
        assert_eq!(entity.pronouns, Pronouns::TheyThem);
        assert!(entity.tags.is_empty());
        assert!(entity.voice_id.is_none());
    }
}
