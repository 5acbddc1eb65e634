//! NDL: Natural Description Language.
//!
//! The grammar lives in `ndl.pest`; `parser` builds the AST from its pairs.
//!
//! The markup game logic emits to describe what happened. A document is a
//! list of statements; each statement is a causal chain of clauses joined
//! by `->`, followed by style-only modifiers introduced with `~`:
//!
//! ```text
//! # round 3
//! do($player, "swing the axe", target=$goblin) -> outcome(success)
//!     -> change($goblin, hp=-12) ~ "with a grunt" ~ tone(grim)
//! say(${npc.innkeeper}, "Another round?"); move($"Old Tom", to=$cellar)
//! ```

pub mod ast;
pub mod format;
pub mod parser;
pub mod validate;

use thiserror::Error;

pub use ast::{Arg, ArgValue, Clause, Document, EntityKey, Modifier, Statement, Verb};
pub use parser::{parse, parse_lenient};
pub use validate::{validate, Diagnostic, Severity};

/// A syntax error with its 1-based source position.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct NdlError {
    pub message: String,
    pub line: usize,
    pub column: usize,
}

impl NdlError {
    /// `at` is relative to a statement chunk whose first character sits at
    /// `origin` in the document.
    pub(crate) fn located(
        origin: (usize, usize),
        at: (usize, usize),
        message: impl Into<String>,
    ) -> Self {
        let (line, column) = if at.0 <= 1 {
            (origin.0, origin.1 + at.1.saturating_sub(1))
        } else {
            (origin.0 + at.0 - 1, at.1)
        };
        Self {
            message: message.into(),
            line,
            column,
        }
    }
}
