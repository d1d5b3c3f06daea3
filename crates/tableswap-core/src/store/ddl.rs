//! Table definition rewriting for SQLite rebuilds.
//!
//! SQLite keeps the text of every `CREATE TABLE` statement in `sqlite_master`.
//! A rebuild reuses that text and replaces only the REFERENCES clause of the
//! retargeted column, so CHECK constraints, collations, generated columns and
//! per-constraint deferrability survive untouched.

use super::ColumnRetarget;
use crate::error::Error;
use logos::Logos;
use std::ops::Range;

/// Keywords that open a table constraint rather than a column definition.
const TABLE_CONSTRAINTS: [&str; 5] = ["CONSTRAINT", "PRIMARY", "UNIQUE", "CHECK", "FOREIGN"];

/// Quote an identifier for use in SQL text.
pub(super) fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

/// Token types of SQLite DDL, coarse enough to find clause boundaries.
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip r"--[^\n]*")]
#[logos(skip r"/\*([^*]|\*+[^*/])*\*+/")]
enum Token {
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,

    // Keywords, bare identifiers and numbers
    #[regex(r"[A-Za-z0-9_$]+")]
    Word,

    // Quoted identifiers
    #[regex(r#""([^"]|"")*""#)]
    #[regex(r"`([^`]|``)*`")]
    #[regex(r"\[[^\]]*\]")]
    Quoted,

    // String literal, also accepted by SQLite as an identifier
    #[regex(r"'([^']|'')*'")]
    Literal,

    // Operators and anything else
    #[regex(r#"[^ \t\r\n\f(),'"`\[\]A-Za-z0-9_$]"#)]
    Symbol,
}

/// A token with its text and byte span.
#[derive(Debug, Clone)]
struct Lexeme<'a> {
    token: Token,
    text: &'a str,
    span: Range<usize>,
}

impl Lexeme<'_> {
    fn is_keyword(&self, keyword: &str) -> bool {
        self.token == Token::Word && self.text.eq_ignore_ascii_case(keyword)
    }

    /// Identifier value with quoting removed.
    fn ident(&self) -> Option<String> {
        let inner = self
            .text
            .get(1..self.text.len().saturating_sub(1))
            .unwrap_or_default();
        match self.token {
            Token::Word => Some(self.text.to_string()),
            Token::Quoted if self.text.starts_with('"') => Some(inner.replace("\"\"", "\"")),
            Token::Quoted if self.text.starts_with('`') => Some(inner.replace("``", "`")),
            Token::Quoted => Some(inner.to_string()),
            Token::Literal => Some(inner.replace("''", "'")),
            _ => None,
        }
    }

    fn names(&self, column: &str) -> bool {
        self.ident().is_some_and(|i| i.eq_ignore_ascii_case(column))
    }
}

fn lex(sql: &str) -> Vec<Lexeme<'_>> {
    let mut lexer = Token::lexer(sql);
    let mut lexemes = Vec::new();
    while let Some(result) = lexer.next() {
        lexemes.push(Lexeme {
            token: result.unwrap_or(Token::Symbol),
            text: lexer.slice(),
            span: lexer.span(),
        });
    }
    lexemes
}

/// A `CREATE TABLE` statement split into its top-level definitions.
struct TableDefinition<'a> {
    lexemes: Vec<Lexeme<'a>>,
    /// Index of the opening parenthesis of the definition list.
    open: usize,
    /// Lexeme ranges of each column definition or table constraint.
    items: Vec<Range<usize>>,
}

impl<'a> TableDefinition<'a> {
    fn parse(sql: &'a str) -> Option<Self> {
        let lexemes = lex(sql);
        let open = lexemes.iter().position(|l| l.token == Token::LParen)?;

        let mut items = Vec::new();
        let mut depth = 0usize;
        let mut start = open + 1;
        let mut closed = false;
        for (i, lexeme) in lexemes.iter().enumerate().skip(open + 1) {
            match lexeme.token {
                Token::LParen => depth += 1,
                Token::RParen if depth == 0 => {
                    items.push(start..i);
                    closed = true;
                    break;
                }
                Token::RParen => depth -= 1,
                Token::Comma if depth == 0 => {
                    items.push(start..i);
                    start = i + 1;
                }
                _ => {}
            }
        }

        closed.then_some(Self {
            lexemes,
            open,
            items,
        })
    }
}

/// Span of the target of the first REFERENCES clause: the table name and its
/// optional column list.
fn references_span(lexemes: &[Lexeme<'_>]) -> Option<Range<usize>> {
    let at = lexemes.iter().position(|l| l.is_keyword("REFERENCES"))?;
    let table = lexemes.get(at + 1)?;
    let mut end = table.span.end;
    if lexemes.get(at + 2).is_some_and(|l| l.token == Token::LParen) {
        let close = lexemes[at + 2..]
            .iter()
            .position(|l| l.token == Token::RParen)?;
        end = lexemes[at + 2 + close].span.end;
    }
    Some(table.span.start..end)
}

/// Columns listed in the first parenthesized group.
fn column_list(lexemes: &[Lexeme<'_>]) -> Vec<String> {
    lexemes
        .iter()
        .skip_while(|l| l.token != Token::LParen)
        .skip(1)
        .take_while(|l| l.token != Token::RParen)
        .filter_map(Lexeme::ident)
        .collect()
}

/// Rewrite a table's `CREATE TABLE` text so the table is created as
/// `scratch` with `change.column` referencing the new target.
///
/// The column keeps its current name. A column without any REFERENCES clause
/// gains a column-level one.
pub(super) fn retarget_table_sql(
    sql: &str,
    scratch: &str,
    change: &ColumnRetarget,
) -> Result<String, Error> {
    let unsupported = |message: &str| Error::UnsupportedDefinition {
        table: change.table.clone(),
        column: change.column.clone(),
        message: message.to_string(),
    };

    let definition =
        TableDefinition::parse(sql).ok_or_else(|| unsupported("unterminated table definition"))?;
    let target = format!(
        "{} ({})",
        quote(&change.target_table),
        quote(&change.target_column)
    );

    let open_at = definition.lexemes[definition.open].span.start;
    let mut edits = vec![(0..open_at, format!("CREATE TABLE {} ", quote(scratch)))];
    let mut column_end = None;
    let mut referenced = false;

    for item in &definition.items {
        let lexemes = &definition.lexemes[item.clone()];
        let Some(first) = lexemes.first() else { continue };

        let head = if first.is_keyword("CONSTRAINT") { 2 } else { 0 };
        if lexemes.get(head).is_some_and(|l| l.is_keyword("FOREIGN")) {
            let columns = column_list(&lexemes[head..]);
            if !columns.iter().any(|c| c.eq_ignore_ascii_case(&change.column)) {
                continue;
            }
            if columns.len() > 1 {
                return Err(unsupported("column is part of a composite foreign key"));
            }
            let span = references_span(lexemes)
                .ok_or_else(|| unsupported("FOREIGN KEY without a REFERENCES clause"))?;
            edits.push((span, target.clone()));
            referenced = true;
        } else if !TABLE_CONSTRAINTS.iter().any(|k| first.is_keyword(k))
            && first.names(&change.column)
        {
            column_end = lexemes.last().map(|l| l.span.end);
            if let Some(span) = references_span(lexemes) {
                edits.push((span, target.clone()));
                referenced = true;
            }
        }
    }

    let column_end = column_end.ok_or_else(|| unsupported("column not found in table definition"))?;
    if !referenced {
        edits.push((column_end..column_end, format!(" REFERENCES {}", target)));
    }

    edits.sort_by_key(|(span, _)| std::cmp::Reverse(span.start));
    let mut rewritten = sql.to_string();
    for (span, text) in edits {
        rewritten.replace_range(span, &text);
    }
    Ok(rewritten)
}
