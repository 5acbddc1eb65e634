/// NDL intermediate representation.
use serde::{Deserialize, Serialize};

use crate::schema::event::Outcome;

/// Normalized entity key. `$player`, `$"player"` and `${player}` all
/// produce `EntityKey("player")`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey(pub String);

impl EntityKey {
    pub fn new(key: &str) -> Self {
        Self(key.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A value in argument position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArgValue {
    Entity(EntityKey),
    Text(String),
    Number(f64),
    Bool(bool),
    /// A bare identifier such as `success` or `grim`.
    Symbol(String),
}

impl ArgValue {
    pub fn as_entity(&self) -> Option<&EntityKey> {
        match self {
            ArgValue::Entity(k) => Some(k),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            ArgValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&str> {
        match self {
            ArgValue::Symbol(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Arg {
    pub name: Option<String>,
    pub value: ArgValue,
}

impl Arg {
    pub fn positional(value: ArgValue) -> Self {
        Self { name: None, value }
    }

    pub fn named(name: &str, value: ArgValue) -> Self {
        Self {
            name: Some(name.to_string()),
            value,
        }
    }
}

/// Built-in clause verbs. Anything else is carried through as `Custom`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Do,
    Say,
    Move,
    Outcome,
    Change,
    Reveal,
    Describe,
    Custom(String),
}

impl Verb {
    pub fn of(name: &str) -> Verb {
        match name {
            "do" => Verb::Do,
            "say" => Verb::Say,
            "move" => Verb::Move,
            "outcome" => Verb::Outcome,
            "change" => Verb::Change,
            "reveal" => Verb::Reveal,
            "describe" => Verb::Describe,
            other => Verb::Custom(other.to_string()),
        }
    }

    /// Slot name given to the first positional text argument.
    pub fn text_slot(&self) -> &'static str {
        match self {
            Verb::Do => "action",
            Verb::Say => "line",
            Verb::Reveal => "fact",
            Verb::Describe => "text",
            _ => "text",
        }
    }
}

/// `verb(arg, name=value, ...)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clause {
    pub verb: String,
    pub args: Vec<Arg>,
}

impl Clause {
    pub fn new(verb: &str, args: Vec<Arg>) -> Self {
        Self {
            verb: verb.to_string(),
            args,
        }
    }

    pub fn kind(&self) -> Verb {
        Verb::of(&self.verb)
    }

    pub fn positional(&self) -> impl Iterator<Item = &ArgValue> {
        self.args
            .iter()
            .filter(|a| a.name.is_none())
            .map(|a| &a.value)
    }

    pub fn named(&self) -> impl Iterator<Item = (&str, &ArgValue)> {
        self.args
            .iter()
            .filter_map(|a| a.name.as_deref().map(|n| (n, &a.value)))
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.named().find(|(n, _)| *n == name).map(|(_, v)| v)
    }

    /// The first positional entity, which is the clause's actor.
    pub fn actor(&self) -> Option<&EntityKey> {
        self.positional().find_map(ArgValue::as_entity)
    }

    pub fn first_text(&self) -> Option<&str> {
        self.positional().find_map(ArgValue::as_text)
    }

    pub fn entity_keys(&self) -> impl Iterator<Item = &EntityKey> {
        self.args.iter().filter_map(|a| a.value.as_entity())
    }
}

/// A style-only annotation attached with `~`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Modifier {
    /// `~ "with practiced grace"`
    Manner(String),
    /// `~ tone(grim)`
    Hint(Clause),
}

/// One narratable unit: a causal chain of clauses plus style modifiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Statement {
    pub clauses: Vec<Clause>,
    pub modifiers: Vec<Modifier>,
    /// `#` comment lines printed above the statement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
    /// 1-based source line; 0 for statements built in code.
    #[serde(default)]
    pub line: usize,
}

// Source position is not part of a statement's meaning.
impl PartialEq for Statement {
    fn eq(&self, other: &Self) -> bool {
        self.clauses == other.clauses
            && self.modifiers == other.modifiers
            && self.comments == other.comments
    }
}

impl Statement {
    pub fn new(clauses: Vec<Clause>, modifiers: Vec<Modifier>) -> Self {
        Self {
            clauses,
            modifiers,
            comments: Vec::new(),
            line: 0,
        }
    }

    pub fn primary(&self) -> Option<&Clause> {
        self.clauses.first()
    }

    /// The decided outcome, if the chain carries one.
    pub fn outcome(&self) -> Option<Outcome> {
        self.clauses
            .iter()
            .filter(|c| c.kind() == Verb::Outcome)
            .find_map(|c| c.positional().find_map(ArgValue::as_symbol))
            .and_then(Outcome::from_name)
    }

    pub fn hint(&self, name: &str) -> Option<&Clause> {
        self.modifiers.iter().find_map(|m| match m {
            Modifier::Hint(c) if c.verb == name => Some(c),
            _ => None,
        })
    }

    /// First symbol argument of a hint, e.g. `grim` for `~ tone(grim)`.
    pub fn hint_symbol(&self, name: &str) -> Option<&str> {
        self.hint(name)
            .and_then(|c| c.positional().next())
            .and_then(|v| match v {
                ArgValue::Symbol(s) | ArgValue::Text(s) => Some(s.as_str()),
                _ => None,
            })
    }

    pub fn manners(&self) -> impl Iterator<Item = &str> {
        self.modifiers.iter().filter_map(|m| match m {
            Modifier::Manner(s) => Some(s.as_str()),
            _ => None,
        })
    }

    /// Every entity key in the statement, in order of first appearance.
    pub fn entity_keys(&self) -> Vec<&EntityKey> {
        let mut keys: Vec<&EntityKey> = Vec::new();
        let hints = self.modifiers.iter().filter_map(|m| match m {
            Modifier::Hint(c) => Some(c),
            _ => None,
        });
        for clause in self.clauses.iter().chain(hints) {
            for key in clause.entity_keys() {
                if !keys.contains(&key) {
                    keys.push(key);
                }
            }
        }
        keys
    }

    /// Every number in the statement, for checking narrated quantities.
    pub fn numbers(&self) -> Vec<f64> {
        self.clauses
            .iter()
            .flat_map(|c| c.args.iter())
            .filter_map(|a| match a.value {
                ArgValue::Number(n) => Some(n),
                _ => None,
            })
            .collect()
    }
}

/// A parsed NDL document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Document {
    pub statements: Vec<Statement>,
    /// Comments after the last statement.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub comments: Vec<String>,
}
