//! Predicate Language Lexer
//!
//! Hand-written scanner producing spanned tokens. Newlines and `;` separate
//! statements inside code fragments; `#` starts a line comment. Control-flow
//! keywords are lexed so the parser can reject them with a precise message.

use crate::features::expr::domain::Span;

use super::CompileIssue;

/// Token kind
#[derive(Debug, Clone, PartialEq)]
pub enum Tok {
    Int(i64),
    Ident(String),

    // Keywords
    And,
    Or,
    Not,
    Is,
    NoneKw,
    True,
    False,
    /// Control-flow keywords (`if`, `for`, `while`, …) — recognized so the
    /// parser can reject fragments using them
    Reserved(&'static str),

    // Operators
    Plus,
    Minus,
    Star,
    SlashSlash,
    Percent,
    EqEq,
    NotEq,
    Lt,
    Le,
    Gt,
    Ge,
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashSlashAssign,
    PercentAssign,

    // Punctuation
    LParen,
    RParen,
    Dot,
    Comma,
    Colon,
    Newline,
}

/// Spanned token
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub tok: Tok,
    pub span: Span,
}

const RESERVED: &[&str] = &[
    "if", "elif", "else", "for", "while", "def", "return", "lambda", "import", "in",
];

/// Tokenize a predicate or code fragment.
pub fn tokenize(src: &str) -> Result<Vec<Token>, CompileIssue> {
    let bytes = src.as_bytes();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < bytes.len() {
        let start = pos;
        let c = bytes[pos] as char;

        match c {
            ' ' | '\t' | '\r' => {
                pos += 1;
            }
            '#' => {
                while pos < bytes.len() && bytes[pos] != b'\n' {
                    pos += 1;
                }
            }
            '\n' | ';' => {
                pos += 1;
                // Collapse runs of separators into one
                if !matches!(tokens.last(), Some(Token { tok: Tok::Newline, .. }) | None) {
                    tokens.push(Token {
                        tok: Tok::Newline,
                        span: Span::new(start, pos),
                    });
                }
            }
            '0'..='9' => {
                while pos < bytes.len() && bytes[pos].is_ascii_digit() {
                    pos += 1;
                }
                let text = &src[start..pos];
                let value = text.parse::<i64>().map_err(|_| CompileIssue::Parse {
                    message: format!("integer literal out of range: {}", text),
                    offset: start,
                })?;
                tokens.push(Token {
                    tok: Tok::Int(value),
                    span: Span::new(start, pos),
                });
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                while pos < bytes.len()
                    && (bytes[pos].is_ascii_alphanumeric() || bytes[pos] == b'_')
                {
                    pos += 1;
                }
                let text = &src[start..pos];
                let tok = match text {
                    "and" => Tok::And,
                    "or" => Tok::Or,
                    "not" => Tok::Not,
                    "is" => Tok::Is,
                    "None" => Tok::NoneKw,
                    "True" => Tok::True,
                    "False" => Tok::False,
                    _ => match RESERVED.iter().find(|r| **r == text) {
                        Some(r) => Tok::Reserved(r),
                        None => Tok::Ident(text.to_string()),
                    },
                };
                tokens.push(Token {
                    tok,
                    span: Span::new(start, pos),
                });
            }
            _ => {
                let (tok, len) = scan_operator(src, pos)?;
                pos += len;
                tokens.push(Token {
                    tok,
                    span: Span::new(start, pos),
                });
            }
        }
    }

    while matches!(tokens.last(), Some(Token { tok: Tok::Newline, .. })) {
        tokens.pop();
    }

    Ok(tokens)
}

fn scan_operator(src: &str, pos: usize) -> Result<(Tok, usize), CompileIssue> {
    let rest = &src[pos..];

    // Longest match first
    for (pat, tok) in [
        ("//=", Tok::SlashSlashAssign),
        ("==", Tok::EqEq),
        ("!=", Tok::NotEq),
        ("<=", Tok::Le),
        (">=", Tok::Ge),
        ("+=", Tok::PlusAssign),
        ("-=", Tok::MinusAssign),
        ("*=", Tok::StarAssign),
        ("%=", Tok::PercentAssign),
        ("//", Tok::SlashSlash),
        ("<", Tok::Lt),
        (">", Tok::Gt),
        ("+", Tok::Plus),
        ("-", Tok::Minus),
        ("*", Tok::Star),
        ("%", Tok::Percent),
        ("=", Tok::Assign),
        ("(", Tok::LParen),
        (")", Tok::RParen),
        (".", Tok::Dot),
        (",", Tok::Comma),
        (":", Tok::Colon),
    ] {
        if rest.starts_with(pat) {
            return Ok((tok, pat.len()));
        }
    }

    if rest.starts_with('/') {
        return Err(CompileIssue::Parse {
            message: "`/` is not supported; use integer division `//`".to_string(),
            offset: pos,
        });
    }

    Err(CompileIssue::Parse {
        message: format!(
            "unexpected character `{}`",
            rest.chars().next().unwrap_or('?')
        ),
        offset: pos,
    })
}
