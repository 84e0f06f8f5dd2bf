//! Lexer for SCPI command headers using logos

use logos::Logos;

use crate::error::{Span, TemplateError};

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
pub enum Token {
    #[token(":")]
    Colon,
    #[token("{")]
    BraceOpen,
    #[token("}")]
    BraceClose,
    #[token("|")]
    Pipe,
    #[token("?")]
    Query,

    // Mnemonic index placeholder: CH<x>, MEAS<n>
    #[regex(r"<[a-z]>")]
    Index,

    // Argument grammar markers (<NR1>, <QString>); only legal after the header
    #[regex(r"<[A-Za-z][A-Za-z0-9_]+>", |lex| lex.slice().to_string())]
    Marker(String),

    // Mnemonic words, including common commands (*IDN) and digits (CH1, 0)
    #[regex(r"[*#A-Za-z0-9_][A-Za-z0-9_#.+\-]*", |lex| lex.slice().to_string())]
    Word(String),
}

/// Lex a header into tokens with spans, failing on the first unrecognized input
pub fn lex(input: &str) -> Result<Vec<(Token, Span)>, TemplateError> {
    let mut tokens = Vec::new();
    for (tok, span) in Token::lexer(input).spanned() {
        match tok {
            Ok(t) => tokens.push((t, span)),
            Err(()) => {
                let text = input.get(span.clone()).unwrap_or_default();
                return Err(TemplateError::lex(text, span));
            }
        }
    }
    Ok(tokens)
}

/// Lex input, silently dropping anything unrecognized
pub fn lex_lenient(input: &str) -> impl Iterator<Item = (Token, Span)> + '_ {
    Token::lexer(input)
        .spanned()
        .filter_map(|(tok, span)| tok.ok().map(|t| (t, span)))
}
