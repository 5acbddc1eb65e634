/// NDL parser: the pest grammar in `ndl.pest` plus builders that turn its
/// pairs into the AST.
use pest::error::{Error as PestError, ErrorVariant, LineColLocation};
use pest::iterators::Pair;
use pest::Parser;
use pest_derive::Parser as PestParser;

use super::ast::{Arg, ArgValue, Clause, Document, EntityKey, Modifier, Statement};
use super::NdlError;

#[derive(PestParser)]
#[grammar = "src/ndl/ndl.pest"]
struct NdlParser;

/// Line and column of a chunk's first character in the document.
type Origin = (usize, usize);

/// Parse a document, failing on the first syntax error.
pub fn parse(input: &str) -> Result<Document, NdlError> {
    let (doc, errors) = parse_lenient(input);
    match errors.into_iter().next() {
        Some(err) => Err(err),
        None => Ok(doc),
    }
}

/// Parse a document, recovering from errors one statement at a time.
///
/// A statement with an error is dropped whole. Comments are kept as leading
/// lines of the statement that follows them; comments after the last
/// statement stay on the document.
pub fn parse_lenient(input: &str) -> (Document, Vec<NdlError>) {
    let mut doc = Document::default();
    let mut errors = Vec::new();

    let top = match NdlParser::parse(Rule::document, input) {
        Ok(mut pairs) => pairs.next(),
        Err(err) => {
            errors.push(syntax_error(&err, (1, 1)));
            return (doc, errors);
        }
    };

    let mut pending = Vec::new();
    for pair in top.into_iter().flat_map(Pair::into_inner) {
        match pair.as_rule() {
            Rule::comment => pending.push(comment_text(pair)),
            Rule::chunk => {
                let origin = pair.as_span().start_pos().line_col();
                match parse_chunk(pair.as_str(), origin) {
                    Ok(mut stmt) => {
                        pending.append(&mut stmt.comments);
                        stmt.comments = std::mem::take(&mut pending);
                        doc.statements.push(stmt);
                    }
                    Err(err) => {
                        log::debug!("NDL syntax error, skipping statement: {}", err);
                        errors.push(err);
                    }
                }
            }
            _ => {}
        }
    }
    doc.comments = pending;

    (doc, errors)
}

fn parse_chunk(text: &str, origin: Origin) -> Result<Statement, NdlError> {
    let mut pairs =
        NdlParser::parse(Rule::statement_input, text).map_err(|e| syntax_error(&e, origin))?;
    let statement = pairs
        .next()
        .and_then(|input| input.into_inner().find(|p| p.as_rule() == Rule::statement))
        .ok_or_else(|| NdlError::located(origin, (1, 1), "expected a clause"))?;
    build_statement(statement, origin)
}

fn position(pair: &Pair<'_, Rule>) -> (usize, usize) {
    pair.as_span().start_pos().line_col()
}

fn error_at(origin: Origin, pair: &Pair<'_, Rule>, message: impl Into<String>) -> NdlError {
    NdlError::located(origin, position(pair), message)
}

fn syntax_error(err: &PestError<Rule>, origin: Origin) -> NdlError {
    let at = match err.line_col {
        LineColLocation::Pos(p) | LineColLocation::Span(p, _) => p,
    };
    let message = match &err.variant {
        ErrorVariant::ParsingError { positives, .. } => expected(positives),
        other => other.message().into_owned(),
    };
    NdlError::located(origin, at, message)
}

fn describe(rule: Rule) -> Option<&'static str> {
    Some(match rule {
        Rule::EOI => "end of statement",
        Rule::statement | Rule::clause => "a clause",
        Rule::ident => "a name",
        Rule::open => "'('",
        Rule::close => "')'",
        Rule::comma => "','",
        Rule::arg => "an argument",
        Rule::value | Rule::number | Rule::boolean | Rule::symbol => "a value",
        Rule::entity => "an entity",
        Rule::string => "a string",
        Rule::path => "a braced path",
        Rule::segment => "a path segment",
        Rule::link | Rule::arrow => "'->'",
        Rule::modifier | Rule::tilde => "'~'",
        _ => return None,
    })
}

fn expected(rules: &[Rule]) -> String {
    let mut names: Vec<&str> = Vec::new();
    for name in rules.iter().filter_map(|r| describe(*r)) {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    match names.as_slice() {
        [] => "unexpected input".to_string(),
        [one] => format!("expected {}", one),
        [init @ .., last] => format!("expected {} or {}", init.join(", "), last),
    }
}

fn comment_text(pair: Pair<'_, Rule>) -> String {
    pair.into_inner()
        .next()
        .map(|text| text.as_str().trim().to_string())
        .unwrap_or_default()
}

fn build_statement(pair: Pair<'_, Rule>, origin: Origin) -> Result<Statement, NdlError> {
    let mut clauses = Vec::new();
    let mut modifiers = Vec::new();
    let mut comments = Vec::new();

    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::clause => clauses.push(build_clause(part, origin)?),
            Rule::link => {
                for inner in part.into_inner() {
                    match inner.as_rule() {
                        Rule::comment => comments.push(comment_text(inner)),
                        Rule::arrow if !modifiers.is_empty() => {
                            return Err(error_at(origin, &inner, "clauses must come before modifiers"));
                        }
                        Rule::clause => clauses.push(build_clause(inner, origin)?),
                        _ => {}
                    }
                }
            }
            Rule::modifier => {
                for inner in part.into_inner() {
                    match inner.as_rule() {
                        Rule::comment => comments.push(comment_text(inner)),
                        Rule::string => modifiers.push(Modifier::Manner(unescape(inner, origin)?)),
                        Rule::clause => modifiers.push(Modifier::Hint(build_clause(inner, origin)?)),
                        _ => {}
                    }
                }
            }
            _ => {}
        }
    }

    Ok(Statement {
        clauses,
        modifiers,
        comments,
        line: origin.0,
    })
}

fn build_clause(pair: Pair<'_, Rule>, origin: Origin) -> Result<Clause, NdlError> {
    let mut verb = String::new();
    let mut args = Vec::new();
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::ident => verb = part.as_str().to_string(),
            Rule::arg => args.push(build_arg(part, origin)?),
            _ => {}
        }
    }
    Ok(Clause { verb, args })
}

fn build_arg(pair: Pair<'_, Rule>, origin: Origin) -> Result<Arg, NdlError> {
    let at = position(&pair);
    let mut name = None;
    for part in pair.into_inner() {
        match part.as_rule() {
            Rule::ident => name = Some(part.as_str().to_string()),
            Rule::value => {
                return Ok(Arg {
                    name,
                    value: build_value(part, origin)?,
                })
            }
            _ => {}
        }
    }
    Err(NdlError::located(origin, at, "argument has no value"))
}

fn build_value(pair: Pair<'_, Rule>, origin: Origin) -> Result<ArgValue, NdlError> {
    let at = position(&pair);
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| NdlError::located(origin, at, "expected a value"))?;

    match inner.as_rule() {
        Rule::entity => build_entity(inner, origin).map(ArgValue::Entity),
        Rule::string => unescape(inner, origin).map(ArgValue::Text),
        Rule::number => {
            let text = inner.as_str();
            match text.parse::<f64>() {
                Ok(n) if n.is_finite() => Ok(ArgValue::Number(n)),
                _ => Err(error_at(origin, &inner, format!("number out of range: {}", text))),
            }
        }
        Rule::boolean => Ok(ArgValue::Bool(inner.as_str() == "true")),
        Rule::symbol => Ok(ArgValue::Symbol(inner.as_str().to_string())),
        _ => Err(error_at(origin, &inner, "expected a value")),
    }
}

/// `$ident`, `$"quoted"` or `${path.to.thing}`.
fn build_entity(pair: Pair<'_, Rule>, origin: Origin) -> Result<EntityKey, NdlError> {
    let at = position(&pair);
    let inner = pair
        .into_inner()
        .next()
        .ok_or_else(|| NdlError::located(origin, at, "expected an entity reference after '$'"))?;

    match inner.as_rule() {
        Rule::ident => Ok(EntityKey::new(inner.as_str())),
        Rule::string => {
            let key = unescape(inner, origin)?;
            if key.trim().is_empty() {
                return Err(NdlError::located(origin, at, "empty entity reference"));
            }
            Ok(EntityKey(key))
        }
        // segments keep their source text, so `${007}` stays "007"
        Rule::path => {
            let segments: Vec<&str> = inner.into_inner().map(|s| s.as_str()).collect();
            Ok(EntityKey(segments.join(".")))
        }
        _ => Err(error_at(origin, &inner, "expected an entity reference after '$'")),
    }
}

/// Decode a string literal's escapes.
fn unescape(pair: Pair<'_, Rule>, origin: Origin) -> Result<String, NdlError> {
    let (line, column) = position(&pair);
    let body = pair
        .into_inner()
        .next()
        .map(|b| b.as_str())
        .unwrap_or_default();

    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars();
    // column of the current char; the opening quote is at `column`
    let mut col = column + 1;
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            col += 1;
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some(other) => {
                return Err(NdlError::located(
                    origin,
                    (line, col),
                    format!("unknown escape '\\{}'", other),
                ))
            }
            None => return Err(NdlError::located(origin, (line, col), "unterminated escape")),
        }
        col += 2;
    }
    Ok(out)
}
