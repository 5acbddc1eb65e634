use serde::{Deserialize, Serialize};

/// What an event does for the story, independent of how it is phrased.
///
/// Carried into NDL as the `~ fn(..)` hint so narrators can pick a register
/// without ever being told, or allowed to choose, what happened.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NarrativeFunction {
    Revelation,
    Escalation,
    Confrontation,
    Betrayal,
    Alliance,
    Discovery,
    Loss,
    ComicRelief,
    Foreshadowing,
    StatusChange,
    Custom(String),
}

const BUILTIN: &[NarrativeFunction] = &[
    NarrativeFunction::Revelation,
    NarrativeFunction::Escalation,
    NarrativeFunction::Confrontation,
    NarrativeFunction::Betrayal,
    NarrativeFunction::Alliance,
    NarrativeFunction::Discovery,
    NarrativeFunction::Loss,
    NarrativeFunction::ComicRelief,
    NarrativeFunction::Foreshadowing,
    NarrativeFunction::StatusChange,
];

impl NarrativeFunction {
    /// Stable snake_case name used in NDL and grammar tags (`fn:<name>`).
    pub fn name(&self) -> &str {
        match self {
            Self::Revelation => "revelation",
            Self::Escalation => "escalation",
            Self::Confrontation => "confrontation",
            Self::Betrayal => "betrayal",
            Self::Alliance => "alliance",
            Self::Discovery => "discovery",
            Self::Loss => "loss",
            Self::ComicRelief => "comic_relief",
            Self::Foreshadowing => "foreshadowing",
            Self::StatusChange => "status_change",
            Self::Custom(name) => name,
        }
    }

    /// Dramatic weight in 0.0..=1.0.
    pub fn intensity(&self) -> f32 {
        match self {
            Self::Betrayal | Self::Loss => 0.9,
            Self::Confrontation | Self::Escalation => 0.8,
            Self::Revelation => 0.7,
            Self::Discovery | Self::Alliance => 0.5,
            Self::StatusChange | Self::Foreshadowing => 0.4,
            Self::ComicRelief => 0.2,
            Self::Custom(_) => 0.5,
        }
    }

    /// Parse a name back into a function. Unknown names become `Custom`.
    pub fn from_name(name: &str) -> Self {
        BUILTIN
            .iter()
            .find(|f| f.name() == name)
            .cloned()
            .unwrap_or_else(|| Self::Custom(name.to_string()))
    }

    pub fn is_builtin_name(name: &str) -> bool {
        BUILTIN.iter().any(|f| f.name() == name)
    }
}
