/// Template grammar runtime.
///
/// The deterministic half of narration: given the same tags, bindings and
/// seed, expansion always produces the same text.
use rand::distributions::WeightedIndex;
use rand::prelude::Distribution;
use rand::rngs::StdRng;
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

use crate::schema::entity::Entity;

/// Rules may reference each other; past this depth expansion gives up.
pub const MAX_DEPTH: usize = 16;

#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("template parse error: {0}")]
    TemplateParse(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON deserialization error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("rule not found: {0}")]
    RuleNotFound(String),
    #[error("rule '{0}' does not apply in this context")]
    PreconditionFailed(String),
    #[error("rule '{0}' has no usable alternatives")]
    NoAlternatives(String),
    #[error("expansion of '{0}' exceeded the maximum rule depth")]
    RecursionLimit(String),
    #[error("no entity bound to role '{0}'")]
    UnboundRole(String),
    #[error("entity for role '{0}' has no field '{1}'")]
    UnknownField(String, String),
    #[error("no value for slot '{0}'")]
    UnboundSlot(String),
}

/// A segment of a parsed template.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TemplateSegment {
    /// Literal text, emitted as-is.
    Literal(String),
    /// `{rule_name}`
    RuleRef(String),
    /// `{@role}` or `{@role.field}`; `field` is `None` for the entity's name.
    Role { role: String, field: Option<String> },
    /// `{#slot}`
    Slot(String),
}

/// A parsed template: a sequence of segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub segments: Vec<TemplateSegment>,
}

impl Template {
    /// Parse a template string into segments.
    ///
    /// `{{` and `}}` are literal braces; braces do not nest.
    pub fn parse(input: &str) -> Result<Template, GrammarError> {
        let mut segments = Vec::new();
        let mut literal_buf = String::new();
        let chars: Vec<char> = input.chars().collect();
        let len = chars.len();
        let mut i = 0;

        while i < len {
            match chars[i] {
                '{' if i + 1 < len && chars[i + 1] == '{' => {
                    literal_buf.push('{');
                    i += 2;
                }
                '{' => {
                    if !literal_buf.is_empty() {
                        segments.push(TemplateSegment::Literal(std::mem::take(&mut literal_buf)));
                    }
                    let start = i + 1;
                    let mut end = start;
                    while end < len && chars[end] != '}' {
                        if chars[end] == '{' {
                            return Err(GrammarError::TemplateParse(
                                "nested braces are not allowed".to_string(),
                            ));
                        }
                        end += 1;
                    }
                    if end >= len {
                        return Err(GrammarError::TemplateParse("unclosed brace".to_string()));
                    }
                    let content: String = chars[start..end].iter().collect();
                    segments.push(Self::parse_segment(content.trim())?);
                    i = end + 1;
                }
                '}' if i + 1 < len && chars[i + 1] == '}' => {
                    literal_buf.push('}');
                    i += 2;
                }
                '}' => {
                    return Err(GrammarError::TemplateParse(
                        "unmatched closing brace".to_string(),
                    ));
                }
                c => {
                    literal_buf.push(c);
                    i += 1;
                }
            }
        }

        if !literal_buf.is_empty() {
            segments.push(TemplateSegment::Literal(literal_buf));
        }

        Ok(Template { segments })
    }

    fn parse_segment(content: &str) -> Result<TemplateSegment, GrammarError> {
        if content.is_empty() {
            return Err(GrammarError::TemplateParse("empty braces".to_string()));
        }

        if let Some(rest) = content.strip_prefix('@') {
            let (role, field) = match rest.split_once('.') {
                Some((role, field)) => (role, Some(field)),
                None => (rest, None),
            };
            if role.is_empty() || field.is_some_and(str::is_empty) {
                return Err(GrammarError::TemplateParse(format!(
                    "invalid role reference '{}'",
                    content
                )));
            }
            return Ok(TemplateSegment::Role {
                role: role.to_string(),
                field: field.map(str::to_string),
            });
        }

        if let Some(slot) = content.strip_prefix('#') {
            if slot.is_empty() {
                return Err(GrammarError::TemplateParse("empty slot name".to_string()));
            }
            return Ok(TemplateSegment::Slot(slot.to_string()));
        }

        Ok(TemplateSegment::RuleRef(content.to_string()))
    }

    /// Rule names referenced directly by this template.
    pub fn rule_refs(&self) -> impl Iterator<Item = &str> {
        self.segments.iter().filter_map(|s| match s {
            TemplateSegment::RuleRef(name) => Some(name.as_str()),
            _ => None,
        })
    }
}

/// A weighted text alternative within a grammar rule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alternative {
    pub weight: u32,
    /// Extra tags this alternative needs on top of its rule's.
    #[serde(default)]
    pub requires: Vec<String>,
    pub template: Template,
}

/// A single grammar rule with tag preconditions and weighted alternatives.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrammarRule {
    pub name: String,
    pub requires: Vec<String>,
    pub excludes: Vec<String>,
    pub alternatives: Vec<Alternative>,
}

impl GrammarRule {
    pub fn applies(&self, tags: &FxHashSet<String>) -> bool {
        self.requires.iter().all(|t| tags.contains(t))
            && !self.excludes.iter().any(|t| tags.contains(t))
    }
}

/// Everything expansion may read: active tags, role bindings, slot values
/// and the voice's rule weights.
#[derive(Debug, Default)]
pub struct SelectionContext<'a> {
    pub tags: FxHashSet<String>,
    pub roles: HashMap<String, &'a Entity>,
    pub slots: HashMap<String, String>,
    pub voice_weights: Option<&'a HashMap<String, f32>>,
}

impl<'a> SelectionContext<'a> {
    pub fn new() -> Self {
        Self::default()
    }
}

/// A set of named grammar rules.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GrammarSet {
    pub rules: HashMap<String, GrammarRule>,
}

// The RON format is keyed by rule name and carries raw template text,
// so it goes through these intermediate shapes.

#[derive(Debug, Deserialize)]
struct RonAlternative {
    weight: u32,
    #[serde(default)]
    requires: Vec<String>,
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename = "Rule")]
struct RonRule {
    #[serde(default)]
    requires: Vec<String>,
    #[serde(default)]
    excludes: Vec<String>,
    alternatives: Vec<RonAlternative>,
}

impl GrammarSet {
    /// Load a grammar set from a RON file.
    pub fn load_from_ron(path: &Path) -> Result<GrammarSet, GrammarError> {
        let contents = std::fs::read_to_string(path)?;
        Self::parse_ron(&contents)
    }

    /// Parse a grammar set from a RON string.
    pub fn parse_ron(input: &str) -> Result<GrammarSet, GrammarError> {
        let raw: HashMap<String, RonRule> = ron::from_str(input)?;
        let mut rules = HashMap::new();

        for (name, ron_rule) in raw {
            let mut alternatives = Vec::with_capacity(ron_rule.alternatives.len());
            for alt in ron_rule.alternatives {
                let template = Template::parse(&alt.text).map_err(|e| {
                    GrammarError::TemplateParse(format!("rule '{}': {}", name, e))
                })?;
                alternatives.push(Alternative {
                    weight: alt.weight,
                    requires: alt.requires,
                    template,
                });
            }
            rules.insert(
                name.clone(),
                GrammarRule {
                    name,
                    requires: ron_rule.requires,
                    excludes: ron_rule.excludes,
                    alternatives,
                },
            );
        }

        Ok(GrammarSet { rules })
    }

    /// Merge another grammar set into this one. Rules from `other`
    /// override rules in `self` with the same name.
    pub fn merge(&mut self, other: GrammarSet) {
        self.rules.extend(other.rules);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.rules.contains_key(name)
    }

    /// Rule references that point at rules missing from this set,
    /// as `(referencing_rule, missing_rule)` pairs sorted for stable output.
    pub fn dangling_refs(&self) -> Vec<(String, String)> {
        let mut missing: Vec<(String, String)> = self
            .rules
            .values()
            .flat_map(|rule| {
                rule.alternatives
                    .iter()
                    .flat_map(|alt| alt.template.rule_refs())
                    .filter(|r| !self.rules.contains_key(*r))
                    .map(move |r| (rule.name.clone(), r.to_string()))
            })
            .collect();
        missing.sort();
        missing.dedup();
        missing
    }

    /// Expand a rule to text.
    pub fn expand(
        &self,
        rule_name: &str,
        ctx: &SelectionContext<'_>,
        rng: &mut StdRng,
    ) -> Result<String, GrammarError> {
        let mut out = String::new();
        self.expand_into(rule_name, ctx, rng, 0, &mut out)?;
        Ok(out)
    }

    fn expand_into(
        &self,
        rule_name: &str,
        ctx: &SelectionContext<'_>,
        rng: &mut StdRng,
        depth: usize,
        out: &mut String,
    ) -> Result<(), GrammarError> {
        if depth > MAX_DEPTH {
            return Err(GrammarError::RecursionLimit(rule_name.to_string()));
        }
        let rule = self
            .rules
            .get(rule_name)
            .ok_or_else(|| GrammarError::RuleNotFound(rule_name.to_string()))?;
        if !rule.applies(&ctx.tags) {
            return Err(GrammarError::PreconditionFailed(rule_name.to_string()));
        }

        let candidates: Vec<&Alternative> = rule
            .alternatives
            .iter()
            .filter(|alt| alt.requires.iter().all(|t| ctx.tags.contains(t)))
            .collect();
        let weights: Vec<f32> = candidates
            .iter()
            .map(|alt| alt.weight as f32 * voice_factor(&alt.template, ctx.voice_weights))
            .collect();
        let dist = WeightedIndex::new(&weights)
            .map_err(|_| GrammarError::NoAlternatives(rule_name.to_string()))?;
        let chosen = candidates[dist.sample(rng)];

        for segment in &chosen.template.segments {
            match segment {
                TemplateSegment::Literal(text) => out.push_str(text),
                TemplateSegment::RuleRef(name) => {
                    self.expand_into(name, ctx, rng, depth + 1, out)?
                }
                TemplateSegment::Role { role, field } => {
                    let entity = ctx
                        .roles
                        .get(role)
                        .ok_or_else(|| GrammarError::UnboundRole(role.clone()))?;
                    match field {
                        None => out.push_str(&entity.name),
                        Some(field) => {
                            let value = entity.field(field).ok_or_else(|| {
                                GrammarError::UnknownField(role.clone(), field.clone())
                            })?;
                            out.push_str(&value);
                        }
                    }
                }
                TemplateSegment::Slot(slot) => {
                    let value = ctx
                        .slots
                        .get(slot)
                        .ok_or_else(|| GrammarError::UnboundSlot(slot.clone()))?;
                    out.push_str(value);
                }
            }
        }
        Ok(())
    }
}

/// A voice favours an alternative by weighting the rules it references.
fn voice_factor(template: &Template, weights: Option<&HashMap<String, f32>>) -> f32 {
    let Some(weights) = weights else {
        return 1.0;
    };
    template
        .rule_refs()
        .filter_map(|r| weights.get(r))
        .fold(1.0, |acc, w| acc * w.max(0.0))
}
