/// Model request construction.
///
/// The system prompt carries the narration contract and the voice; the user
/// prompt carries the facts of one statement. Both are pure functions of
/// their inputs so a request can be replayed.
use serde::Serialize;

use crate::core::context::NarrativeContext;
use crate::core::guard::Violation;
use crate::core::model::ModelParams;
use crate::core::render::{plain_facts, RenderError};
use crate::core::voice::{Person, ResolvedVoice, Tense};
use crate::ndl::ast::{ArgValue, Statement};
use crate::schema::world::WorldState;

/// One request to a language model.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PromptRequest {
    pub system: String,
    pub user: String,
    pub seed: u64,
    pub temperature: f32,
    pub max_tokens: u32,
}

const CONTRACT: &str = "You are the narrator of a text game. The game has already decided \
everything that happened; you only put it into prose.\n\n\
RULES:\n\
- Narrate only the facts listed, in the order given.\n\
- Never decide, soften or reverse the result.\n\
- Do not introduce characters or places that are not listed.\n\
- Do not use any number that does not appear in the facts.\n\
- Reply with plain prose. No markup, lists or NDL.";

pub struct PromptBuilder<'a> {
    statement: &'a Statement,
    world: WorldState<'a>,
    voice: Option<&'a ResolvedVoice>,
    context: Option<&'a NarrativeContext>,
    feedback: &'a [Violation],
}

impl<'a> PromptBuilder<'a> {
    pub fn new(statement: &'a Statement, world: WorldState<'a>) -> Self {
        Self {
            statement,
            world,
            voice: None,
            context: None,
            feedback: &[],
        }
    }

    pub fn voice(mut self, voice: Option<&'a ResolvedVoice>) -> Self {
        self.voice = voice;
        self
    }

    pub fn context(mut self, context: &'a NarrativeContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Violations from the previous attempt, listed as corrections.
    pub fn feedback(mut self, feedback: &'a [Violation]) -> Self {
        self.feedback = feedback;
        self
    }

    pub fn system_prompt(&self) -> String {
        let mut prompt = String::from(CONTRACT);
        let Some(voice) = self.voice else {
            return prompt;
        };

        prompt.push_str(&format!("\n\nVOICE: {}\n", voice.name));
        let style = &voice.style;
        if let Some(person) = style.person {
            let person = match person {
                Person::First => "first",
                Person::Second => "second",
                Person::Third => "third",
            };
            prompt.push_str(&format!("- Write in the {} person.\n", person));
        }
        if let Some(tense) = style.tense {
            let tense = match tense {
                Tense::Past => "past",
                Tense::Present => "present",
            };
            prompt.push_str(&format!("- Write in the {} tense.\n", tense));
        }
        if let Some(tone) = &style.tone {
            prompt.push_str(&format!("- Tone: {}.\n", tone));
        }
        if let Some(max) = style.max_sentences {
            prompt.push_str(&format!("- Use at most {} sentences.\n", max));
        }
        let preferred = voice.preferred_sorted();
        if !preferred.is_empty() {
            prompt.push_str(&format!("- Favour these words: {}.\n", preferred.join(", ")));
        }
        let avoided = voice.avoided_sorted();
        if !avoided.is_empty() {
            prompt.push_str(&format!("- Never use these words: {}.\n", avoided.join(", ")));
        }
        for quirk in &voice.quirks {
            prompt.push_str(&format!("- {}\n", quirk));
        }
        prompt
    }

    pub fn user_prompt(&self) -> Result<String, RenderError> {
        let stmt = self.statement;
        let mut prompt = String::with_capacity(512);

        prompt.push_str("=== FACTS ===\n");
        for fact in plain_facts(stmt, &self.world)? {
            prompt.push_str(&format!("- {}\n", fact));
        }

        prompt.push_str("\n=== RESULT ===\n");
        match stmt.outcome() {
            Some(outcome) => prompt.push_str(&format!(
                "Decided: {}. Narrate exactly this result.\n",
                outcome.name()
            )),
            None => prompt.push_str("No contested result. Do not imply success or failure.\n"),
        }

        prompt.push_str("\n=== NDL ===\n");
        prompt.push_str(&format!("{}\n", stmt));

        let style = self.style_lines();
        if !style.is_empty() {
            prompt.push_str("\n=== STYLE ===\n");
            for line in style {
                prompt.push_str(&format!("{}\n", line));
            }
        }

        if let Some(context) = self.context.filter(|c| !c.is_empty()) {
            prompt.push_str("\n=== RECENT NARRATION (do not repeat) ===\n");
            for line in context.recent() {
                prompt.push_str(&format!("- {}\n", line));
            }
        }

        if !self.feedback.is_empty() {
            prompt.push_str("\n=== CORRECTIONS ===\n");
            prompt.push_str("Your previous narration was rejected:\n");
            for violation in self.feedback {
                prompt.push_str(&format!("- {}\n", violation));
            }
            prompt.push_str("Write a new narration that fixes every problem above.\n");
        }

        Ok(prompt)
    }

    fn style_lines(&self) -> Vec<String> {
        let stmt = self.statement;
        let mut lines = Vec::new();
        for (hint, label) in [("tone", "Tone"), ("pace", "Pace"), ("style", "Style")] {
            if let Some(value) = stmt.hint_symbol(hint) {
                lines.push(format!("{}: {}", label, value));
            }
        }
        let manners: Vec<&str> = stmt.manners().collect();
        if !manners.is_empty() {
            lines.push(format!("Manner: {}", manners.join(", ")));
        }
        let focus = stmt
            .hint("focus")
            .and_then(|c| c.positional().find_map(ArgValue::as_entity))
            .and_then(|key| self.world.resolve(key.as_str()));
        if let Some(entity) = focus {
            lines.push(format!("Focus on: {}", entity.name));
        }
        for (hint, label) in [("mood", "Mood"), ("stakes", "Stakes"), ("fn", "Story beat")] {
            if let Some(value) = stmt.hint_symbol(hint) {
                lines.push(format!("{}: {}", label, value.replace('_', " ")));
            }
        }
        lines
    }

    pub fn build(&self, params: &ModelParams, seed: u64) -> Result<PromptRequest, RenderError> {
        Ok(PromptRequest {
            system: self.system_prompt(),
            user: self.user_prompt()?,
            seed,
            temperature: params.temperature,
            max_tokens: params.max_tokens,
        })
    }
}
