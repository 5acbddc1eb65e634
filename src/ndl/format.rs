/// Canonical NDL printer.
///
/// Every node's `Display` output parses back to an equal node. Entity keys
/// use the lightest form that round-trips: `$ident`, `${a.b}`, or `$"..."`.
use std::fmt::{self, Display, Formatter, Write};

use super::ast::{Arg, ArgValue, Clause, Document, EntityKey, Modifier, Statement};

pub fn is_ident(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn is_keyword(s: &str) -> bool {
    s == "true" || s == "false"
}

/// A bare word that reads back as a symbol rather than a boolean.
pub fn is_symbol(s: &str) -> bool {
    is_ident(s) && !is_keyword(s)
}

/// Identifier or a plain decimal index. Leading zeros force the quoted form.
fn is_path_segment(s: &str) -> bool {
    let index = !s.is_empty()
        && s.chars().all(|c| c.is_ascii_digit())
        && (s == "0" || !s.starts_with('0'));
    is_ident(s) || index
}

fn write_comment(f: &mut Formatter<'_>, text: &str) -> fmt::Result {
    if text.is_empty() {
        f.write_str("#\n")
    } else {
        writeln!(f, "# {}", text)
    }
}

/// Write `s` as a double-quoted NDL string literal.
pub fn write_quoted(f: &mut impl Write, s: &str) -> fmt::Result {
    f.write_char('"')?;
    for c in s.chars() {
        match c {
            '"' => f.write_str("\\\"")?,
            '\\' => f.write_str("\\\\")?,
            '\n' => f.write_str("\\n")?,
            '\t' => f.write_str("\\t")?,
            c => f.write_char(c)?,
        }
    }
    f.write_char('"')
}

impl Display for EntityKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        let key = self.as_str();
        if is_symbol(key) {
            write!(f, "${}", key)
        } else if key.split('.').all(is_path_segment) {
            write!(f, "${{{}}}", key)
        } else {
            f.write_char('$')?;
            write_quoted(f, key)
        }
    }
}

impl Display for ArgValue {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ArgValue::Entity(key) => key.fmt(f),
            ArgValue::Text(s) => write_quoted(f, s),
            ArgValue::Number(n) => write!(f, "{}", n),
            ArgValue::Bool(b) => write!(f, "{}", b),
            ArgValue::Symbol(s) => f.write_str(s),
        }
    }
}

impl Display for Arg {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        if let Some(name) = &self.name {
            write!(f, "{}=", name)?;
        }
        self.value.fmt(f)
    }
}

impl Display for Clause {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.verb)?;
        for (i, arg) in self.args.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            arg.fmt(f)?;
        }
        f.write_char(')')
    }
}

impl Display for Modifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Modifier::Manner(s) => write_quoted(f, s),
            Modifier::Hint(clause) => clause.fmt(f),
        }
    }
}

impl Display for Statement {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for (i, clause) in self.clauses.iter().enumerate() {
            if i > 0 {
                f.write_str(" -> ")?;
            }
            clause.fmt(f)?;
        }
        for modifier in &self.modifiers {
            write!(f, " ~ {}", modifier)?;
        }
        Ok(())
    }
}

/// Comments are printed here rather than by `Statement`, whose text is also
/// used inline in prompts and narration records.
impl Display for Document {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        for stmt in &self.statements {
            for comment in &stmt.comments {
                write_comment(f, comment)?;
            }
            writeln!(f, "{}", stmt)?;
        }
        for comment in &self.comments {
            write_comment(f, comment)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ndl::parse;

    #[test]
    fn entity_key_forms() {
        assert_eq!(EntityKey::new("player").to_string(), "$player");
        assert_eq!(EntityKey::new("npc.innkeeper").to_string(), "${npc.innkeeper}");
        assert_eq!(EntityKey::new("42").to_string(), "${42}");
        assert_eq!(EntityKey::new("Old Tom").to_string(), "$\"Old Tom\"");
        assert_eq!(EntityKey::new("true").to_string(), "${true}");
        assert_eq!(EntityKey::new("room.0").to_string(), "${room.0}");
        assert_eq!(EntityKey::new("007").to_string(), "$\"007\"");
        assert_eq!(EntityKey::new("1.5").to_string(), "${1.5}");
        assert_eq!(EntityKey::new("a..b").to_string(), "$\"a..b\"");
    }

    #[test]
    fn awkward_keys_round_trip() {
        for key in ["007", "a b", "x.1", "true", "1.5", "0", "x.05", "é", "a.", ".a", "say \"hi\"", "tab\there"] {
            let stmt = Statement::new(
                vec![Clause::new(
                    "describe",
                    vec![
                        Arg::positional(ArgValue::Entity(EntityKey::new(key))),
                        Arg::positional(ArgValue::Text("x".into())),
                    ],
                )],
                vec![],
            );
            let doc = Document {
                statements: vec![stmt],
                ..Document::default()
            };
            let printed = doc.to_string();
            assert_eq!(parse(&printed).unwrap(), doc, "key {:?} printed as {}", key, printed);
        }
    }

    #[test]
    fn numbers_round_trip() {
        for n in [0.0, -0.0, 1.0, -12.0, 0.5, -3.25, 1e-7, 123456789.125, 1e21, f64::MAX, f64::MIN_POSITIVE] {
            let clause = Clause::new("change", vec![Arg::named("hp", ArgValue::Number(n))]);
            let doc = Document {
                statements: vec![Statement::new(vec![clause], vec![])],
                ..Document::default()
            };
            let printed = doc.to_string();
            let reparsed = parse(&printed).unwrap();
            assert_eq!(reparsed, doc, "{} printed as {}", n, printed);
        }
    }

    #[test]
    fn comments_survive_formatting() {
        let src = "# The cellar fight\n#\nsay($a, \"hi\")\n# aside\nmove($a, to=$b)\n# fin\n";
        let doc = parse(src).unwrap();
        assert_eq!(doc.to_string(), src);
    }

    #[test]
    fn canonical_statement() {
        let doc = parse(
            "do( $\"player\" ,\"swing\",target = ${goblin})->outcome( success )~\"fast\"~tone(grim)",
        )
        .unwrap();
        assert_eq!(
            doc.to_string(),
            "do($player, \"swing\", target=$goblin) -> outcome(success) ~ \"fast\" ~ tone(grim)\n"
        );
    }

    #[test]
    fn escapes_round_trip() {
        let src = "say($a, \"she said \\\"run\\\"\\n\\\\ now\\t.\")\n";
        let doc = parse(src).unwrap();
        assert_eq!(doc.to_string(), src);
    }

    #[test]
    fn format_then_parse_is_identity() {
        let src = r#"
            do($"Old Tom", "pour", with=${item.ale}, count=2, hot=false) -> outcome(partial)
                -> change(${7}, coins=-1.5) ~ "grudgingly" ~ focus($"Old Tom")
            reveal($player, "the map is fake"); wait()
        "#;
        let doc = parse(src).unwrap();
        let printed = doc.to_string();
        let reparsed = parse(&printed).unwrap();
        assert_eq!(doc, reparsed);
        assert_eq!(printed, reparsed.to_string());
    }
}
