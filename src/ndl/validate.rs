/// Semantic checks for NDL documents against a world.
use serde::Serialize;
use std::fmt;

use super::ast::{ArgValue, Clause, Document, Modifier, Statement, Verb};
use crate::schema::event::{Mood, Outcome, Stakes};
use crate::schema::narrative_fn::NarrativeFunction;
use crate::schema::world::WorldState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Index of the statement in its document.
    pub statement: usize,
    /// Source line of the statement, 0 if built in code.
    pub line: usize,
    pub message: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        if self.line > 0 {
            write!(f, "{} (line {}): {}", level, self.line, self.message)
        } else {
            write!(f, "{} (statement {}): {}", level, self.statement + 1, self.message)
        }
    }
}

pub const HINTS: &[&str] = &["tone", "pace", "focus", "mood", "stakes", "fn", "style"];

/// Validate every statement of a document.
pub fn validate(doc: &Document, world: &WorldState<'_>) -> Vec<Diagnostic> {
    doc.statements
        .iter()
        .enumerate()
        .flat_map(|(i, stmt)| validate_statement(stmt, i, world))
        .collect()
}

pub fn has_errors(diagnostics: &[Diagnostic]) -> bool {
    diagnostics.iter().any(|d| d.severity == Severity::Error)
}

struct Checker<'s> {
    index: usize,
    line: usize,
    out: &'s mut Vec<Diagnostic>,
}

impl Checker<'_> {
    fn error(&mut self, message: String) {
        self.push(Severity::Error, message);
    }

    fn warn(&mut self, message: String) {
        self.push(Severity::Warning, message);
    }

    fn push(&mut self, severity: Severity, message: String) {
        self.out.push(Diagnostic {
            severity,
            statement: self.index,
            line: self.line,
            message,
        });
    }
}

/// Validate one statement. `index` is its position in the document.
pub fn validate_statement(
    stmt: &Statement,
    index: usize,
    world: &WorldState<'_>,
) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    let mut ck = Checker {
        index,
        line: stmt.line,
        out: &mut out,
    };

    if stmt.clauses.is_empty() {
        ck.error("statement has no clauses".to_string());
        return out;
    }

    for key in stmt.entity_keys() {
        if world.resolve(key.as_str()).is_none() {
            ck.error(format!("unknown entity {}", key));
        }
    }

    let hints = stmt.modifiers.iter().filter_map(|m| match m {
        Modifier::Hint(c) => Some(c),
        _ => None,
    });
    for clause in stmt.clauses.iter().chain(hints) {
        for arg in &clause.args {
            if let ArgValue::Number(n) = arg.value {
                if !n.is_finite() {
                    ck.error(format!("{}() has a non-finite number {}", clause.verb, n));
                }
            }
        }
    }

    let outcomes: Vec<usize> = stmt
        .clauses
        .iter()
        .enumerate()
        .filter(|(_, c)| c.kind() == Verb::Outcome)
        .map(|(i, _)| i)
        .collect();
    if outcomes.len() > 1 {
        ck.error("more than one outcome in a statement".to_string());
    }
    if outcomes.first() == Some(&0) {
        ck.error("outcome must follow the clause it resolves".to_string());
    }

    for clause in &stmt.clauses {
        check_clause(clause, &mut ck);
    }
    for modifier in &stmt.modifiers {
        if let Modifier::Hint(hint) = modifier {
            check_hint(hint, &mut ck);
        }
    }

    out
}

fn check_clause(clause: &Clause, ck: &mut Checker<'_>) {
    let verb = clause.verb.as_str();
    let has_actor = clause.actor().is_some();
    let has_text = clause.first_text().is_some();

    match clause.kind() {
        Verb::Do | Verb::Say | Verb::Reveal | Verb::Describe => {
            if !has_actor {
                ck.error(format!("{}() needs an entity as its first argument", verb));
            }
            if !has_text {
                ck.error(format!(
                    "{}() needs a quoted {}",
                    verb,
                    clause.kind().text_slot()
                ));
            }
        }
        Verb::Move => {
            if !has_actor {
                ck.error("move() needs an entity as its first argument".to_string());
            }
            if clause.get("to").and_then(ArgValue::as_entity).is_none() {
                ck.error("move() needs a destination entity: to=$place".to_string());
            }
        }
        Verb::Outcome => {
            let mut positional = clause.positional();
            let first = positional.next();
            let valid = first
                .and_then(ArgValue::as_symbol)
                .and_then(Outcome::from_name)
                .is_some();
            if !valid || positional.next().is_some() || clause.named().next().is_some() {
                ck.error(
                    "outcome() takes exactly one of success, failure, partial, ambiguous"
                        .to_string(),
                );
            }
        }
        Verb::Change => {
            if !has_actor {
                ck.error("change() needs an entity as its first argument".to_string());
            }
            if clause.named().next().is_none() {
                ck.error("change() needs at least one key=value".to_string());
            }
        }
        Verb::Custom(_) => {}
    }
}

fn check_hint(hint: &Clause, ck: &mut Checker<'_>) {
    let name = hint.verb.as_str();
    if !HINTS.contains(&name) {
        ck.warn(format!("unknown hint {}()", name));
        return;
    }
    let first = hint.positional().next();
    let symbol = first.and_then(|v| match v {
        ArgValue::Symbol(s) | ArgValue::Text(s) => Some(s.as_str()),
        _ => None,
    });
    match name {
        "focus" => {
            if first.and_then(ArgValue::as_entity).is_none() {
                ck.error("focus() needs an entity".to_string());
            }
        }
        "mood" => {
            if symbol.and_then(Mood::from_name).is_none() {
                ck.error(format!("mood() needs a known mood, got {}", describe(first)));
            }
        }
        "stakes" => {
            if symbol.and_then(Stakes::from_name).is_none() {
                ck.error(format!("stakes() needs a known level, got {}", describe(first)));
            }
        }
        "fn" => {
            match symbol {
                None => ck.error("fn() needs a narrative function name".to_string()),
                Some(name) if !NarrativeFunction::is_builtin_name(name) => {
                    ck.warn(format!("fn({}) is not a built-in narrative function", name))
                }
                Some(_) => {}
            }
        }
        _ => {
            if symbol.is_none() {
                ck.warn(format!("{}() expects a word or quoted text", name));
            }
        }
    }
}

fn describe(value: Option<&ArgValue>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "nothing".to_string())
}
