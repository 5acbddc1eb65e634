/// The narration bridge: NDL in, verified prose out.
///
/// Validates statements against the world, asks the language model to
/// narrate each one, checks the result with the guard, re-prompts with the
/// violations, and falls back to the template narrator when the model is
/// absent, keeps failing, or errors out.
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use std::path::PathBuf;
use thiserror::Error;

use crate::core::config::{BridgeConfig, ConfigError};
use crate::core::context::NarrativeContext;
use crate::core::emit::{emit_event, EmitError};
use crate::core::grammar::GrammarSet;
use crate::core::guard::{Guard, Violation};
use crate::core::model::LanguageModel;
use crate::core::prompt::PromptBuilder;
use crate::core::render::{RenderError, Renderer};
use crate::core::voice::{ResolvedVoice, VoiceRegistry};
use crate::ndl::validate::{has_errors, validate_statement, Severity};
use crate::ndl::{parse, validate, Diagnostic, Document, NdlError, Statement};
use crate::schema::entity::VoiceId;
use crate::schema::event::Event;
use crate::schema::world::WorldState;

fn describe(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .filter(|d| d.severity == Severity::Error)
        .map(|d| d.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("NDL syntax error: {0}")]
    Syntax(#[from] NdlError),
    #[error("invalid NDL: {}", describe(.0))]
    Invalid(Vec<Diagnostic>),
    #[error("emit error: {0}")]
    Emit(#[from] EmitError),
    #[error("render error: {0}")]
    Render(#[from] RenderError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
    #[error("voice not found: {0:?}")]
    UnknownVoice(VoiceId),
}

/// Why a statement was narrated from templates.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FallbackReason {
    NoModel,
    /// Every model attempt broke at least one guard check.
    Rejected,
    ModelError(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum NarrationSource {
    Model { attempts: u32 },
    Template { reason: FallbackReason },
}

/// A model attempt the guard turned down.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Rejection {
    pub attempt: u32,
    pub text: String,
    pub violations: Vec<Violation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatementNarration {
    pub text: String,
    /// Canonical NDL of the narrated statement.
    pub ndl: String,
    pub source: NarrationSource,
    pub rejected: Vec<Rejection>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Narration {
    pub text: String,
    pub statements: Vec<StatementNarration>,
}

impl Narration {
    fn from_parts(statements: Vec<StatementNarration>) -> Self {
        let text = statements
            .iter()
            .map(|s| s.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" ");
        Self { text, statements }
    }

    /// True when every statement fell back to templates.
    pub fn is_template_only(&self) -> bool {
        self.statements
            .iter()
            .all(|s| matches!(s.source, NarrationSource::Template { .. }))
    }
}

fn attempt_seed(seed: u64, generation: u64, attempt: u32) -> u64 {
    // prime offset per attempt
    seed.wrapping_add(generation)
        .wrapping_add(attempt as u64 * 7919)
}

/// Built via `NarrationBridge::builder()`.
pub struct NarrationBridge {
    config: BridgeConfig,
    grammars: GrammarSet,
    voices: VoiceRegistry,
    model: Option<Box<dyn LanguageModel>>,
    context: NarrativeContext,
    seed: u64,
    generation_count: u64,
}

pub struct NarrationBridgeBuilder {
    config: Option<BridgeConfig>,
    config_path: Option<PathBuf>,
    /// Directly provided grammars, overridden by configured files.
    grammars: Option<GrammarSet>,
    voices: Option<VoiceRegistry>,
    model: Option<Box<dyn LanguageModel>>,
    seed: Option<u64>,
}

impl NarrationBridge {
    pub fn builder() -> NarrationBridgeBuilder {
        NarrationBridgeBuilder {
            config: None,
            config_path: None,
            grammars: None,
            voices: None,
            model: None,
            seed: None,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn grammars(&self) -> &GrammarSet {
        &self.grammars
    }

    pub fn voices(&self) -> &VoiceRegistry {
        &self.voices
    }

    pub fn context(&self) -> &NarrativeContext {
        &self.context
    }

    pub fn generation_count(&self) -> u64 {
        self.generation_count
    }

    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Forget narration history, e.g. on a scene change.
    pub fn reset_context(&mut self) {
        self.context.clear();
    }

    /// Emit an event as NDL and narrate it.
    pub fn narrate_event(
        &mut self,
        event: &Event,
        world: &WorldState<'_>,
        voice: Option<VoiceId>,
    ) -> Result<Narration, BridgeError> {
        let statement = emit_event(event, world)?;
        let doc = Document {
            statements: vec![statement],
            ..Document::default()
        };
        self.narrate_document(&doc, world, voice)
    }

    /// Parse NDL source and narrate it. Syntax errors narrate nothing.
    pub fn narrate_ndl(
        &mut self,
        source: &str,
        world: &WorldState<'_>,
        voice: Option<VoiceId>,
    ) -> Result<Narration, BridgeError> {
        let doc = parse(source)?;
        self.narrate_document(&doc, world, voice)
    }

    /// Narrate every statement of a document. The whole document is
    /// validated first; any error diagnostic narrates nothing.
    pub fn narrate_document(
        &mut self,
        doc: &Document,
        world: &WorldState<'_>,
        voice: Option<VoiceId>,
    ) -> Result<Narration, BridgeError> {
        let diagnostics = validate(doc, world);
        self.check_diagnostics(diagnostics)?;
        let mut statements = Vec::with_capacity(doc.statements.len());
        for stmt in &doc.statements {
            statements.push(self.narrate_valid(stmt, world, voice)?);
        }
        Ok(Narration::from_parts(statements))
    }

    pub fn narrate_statement(
        &mut self,
        stmt: &Statement,
        world: &WorldState<'_>,
        voice: Option<VoiceId>,
    ) -> Result<StatementNarration, BridgeError> {
        let diagnostics = validate_statement(stmt, 0, world);
        self.check_diagnostics(diagnostics)?;
        self.narrate_valid(stmt, world, voice)
    }

    fn check_diagnostics(&self, diagnostics: Vec<Diagnostic>) -> Result<(), BridgeError> {
        if has_errors(&diagnostics) {
            return Err(BridgeError::Invalid(diagnostics));
        }
        for d in &diagnostics {
            log::warn!("{}", d);
        }
        Ok(())
    }

    /// Explicit voice, then the actor's voice, then the configured default.
    fn resolve_voice(
        &self,
        stmt: &Statement,
        world: &WorldState<'_>,
        voice: Option<VoiceId>,
    ) -> Result<Option<ResolvedVoice>, BridgeError> {
        if let Some(id) = voice {
            return self
                .voices
                .resolve(id)
                .map(Some)
                .ok_or(BridgeError::UnknownVoice(id));
        }
        let actor_voice = stmt
            .primary()
            .and_then(|c| c.actor())
            .and_then(|key| world.resolve(key.as_str()))
            .and_then(|e| e.voice_id);
        for id in actor_voice.into_iter().chain(self.config.default_voice) {
            match self.voices.resolve(id) {
                Some(resolved) => return Ok(Some(resolved)),
                None => log::warn!("voice {:?} is not registered, skipping", id),
            }
        }
        Ok(None)
    }

    fn narrate_valid(
        &mut self,
        stmt: &Statement,
        world: &WorldState<'_>,
        voice: Option<VoiceId>,
    ) -> Result<StatementNarration, BridgeError> {
        let resolved = self.resolve_voice(stmt, world, voice)?;
        let ndl = stmt.to_string();
        let mut rejected = Vec::new();
        let mut reason = FallbackReason::NoModel;
        let mut accepted = None;

        if let Some(model) = self.model.as_mut() {
            reason = FallbackReason::Rejected;
            let guard = Guard::new(&self.config.guard);
            let mut feedback: Vec<Violation> = Vec::new();

            for attempt in 0..self.config.max_attempts {
                let request = PromptBuilder::new(stmt, *world)
                    .voice(resolved.as_ref())
                    .context(&self.context)
                    .feedback(&feedback)
                    .build(
                        &self.config.model,
                        attempt_seed(self.seed, self.generation_count, attempt),
                    )?;

                let text = match model.complete(&request) {
                    Ok(text) => text,
                    Err(e) => {
                        log::warn!("model error on attempt {}: {}", attempt + 1, e);
                        reason = FallbackReason::ModelError(e.to_string());
                        break;
                    }
                };

                let violations =
                    guard.check(&text, stmt, world, resolved.as_ref(), &self.context);
                if violations.is_empty() {
                    accepted = Some((text.trim().to_string(), attempt + 1));
                    break;
                }
                log::info!(
                    "attempt {} rejected: {}",
                    attempt + 1,
                    violations
                        .iter()
                        .map(|v| v.to_string())
                        .collect::<Vec<_>>()
                        .join("; ")
                );
                rejected.push(Rejection {
                    attempt: attempt + 1,
                    text,
                    violations: violations.clone(),
                });
                feedback = violations;
            }
        }

        let (text, source) = match accepted {
            Some((text, attempts)) => (text, NarrationSource::Model { attempts }),
            None => {
                log::debug!("narrating '{}' from templates ({:?})", ndl, reason);
                let mut rng =
                    StdRng::seed_from_u64(attempt_seed(self.seed, self.generation_count, 0));
                let text =
                    Renderer::new(&self.grammars, resolved.as_ref()).render(stmt, world, &mut rng)?;
                (text, NarrationSource::Template { reason })
            }
        };

        self.context.record(&text);
        self.generation_count += 1;

        Ok(StatementNarration {
            text,
            ndl,
            source,
            rejected,
        })
    }
}

impl NarrationBridgeBuilder {
    pub fn config(mut self, config: BridgeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Load the config from a RON file at build time. Cannot be combined
    /// with [`config`](Self::config).
    pub fn config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Provide grammars directly (for testing without files).
    pub fn with_grammars(mut self, grammars: GrammarSet) -> Self {
        self.grammars = Some(grammars);
        self
    }

    /// Provide voices directly (for testing without files).
    pub fn with_voices(mut self, voices: VoiceRegistry) -> Self {
        self.voices = Some(voices);
        self
    }

    pub fn model(mut self, model: impl LanguageModel + 'static) -> Self {
        self.model = Some(Box::new(model));
        self
    }

    /// Overrides the configured seed.
    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn build(self) -> Result<NarrationBridge, BridgeError> {
        let config = match (self.config, &self.config_path) {
            (Some(_), Some(path)) => {
                return Err(ConfigError::Invalid(format!(
                    "both a config value and a config file ({}) were given",
                    path.display()
                ))
                .into());
            }
            (Some(config), None) => {
                config.validate()?;
                config
            }
            (None, Some(path)) => BridgeConfig::load(path)?,
            (None, None) => BridgeConfig::default(),
        };

        let mut grammars = self.grammars.unwrap_or_default();
        grammars.merge(config.load_grammars()?);
        for (rule, missing) in grammars.dangling_refs() {
            log::warn!("grammar rule '{}' references missing rule '{}'", rule, missing);
        }

        let mut voices = self.voices.unwrap_or_default();
        voices.merge(config.load_voices()?);

        log::info!(
            "narration bridge ready: {} grammar rules, {} voices, model {}",
            grammars.rules.len(),
            voices.len(),
            if self.model.is_some() { "attached" } else { "absent" }
        );

        Ok(NarrationBridge {
            context: NarrativeContext::new(config.history_window, config.repetition_ngram),
            seed: self.seed.unwrap_or(config.seed),
            config,
            grammars,
            voices,
            model: self.model,
            generation_count: 0,
        })
    }
}
