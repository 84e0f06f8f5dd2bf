//! Command header parser using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use crate::error::TemplateError;
use crate::template::ast::*;
use crate::template::lexer::Token;

/// Split a template into its header and argument sections
///
/// The boundary is the first whitespace outside braces. The argument section
/// is returned trimmed and may be empty.
pub fn split_template(template: &str) -> (&str, &str) {
    let template = template.trim();
    let mut depth = 0usize;
    for (i, c) in template.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            c if c.is_whitespace() && depth == 0 => {
                return (&template[..i], template[i..].trim());
            }
            _ => {}
        }
    }
    (template, "")
}

/// Parse a command header into an AST
pub fn parse_header(input: &str) -> Result<Header, TemplateError> {
    let len = input.len();

    let tokens = crate::template::lexer::lex(input)?;
    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));

    let token_stream = Stream::from_iter(token_iter)
        // Split (Token, SimpleSpan) into token and span parts
        .map((len..len).into(), |(t, s): (_, _)| (t, s));

    header_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| match errs.into_iter().next() {
            Some(e) => e.into(),
            None => TemplateError::Syntax {
                span: 0..len,
                message: "invalid command header".to_string(),
                expected: vec![],
            },
        })
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn header_parser<'a, I>() -> impl Parser<'a, I, Header, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let index = just(Token::Index).or_not().map(|i| i.is_some());

    // `_D<x>` style suffix after an indexed mnemonic
    let suffix = select! {
        Token::Word(s) if s.starts_with('_') => s,
    }
    .then(index.clone())
    .map(|(word, indexed)| Suffix { word, indexed });

    let mnemonic = select! {
        Token::Word(s) => s,
    }
    .then(index)
    .then(suffix.or_not())
    .map_with(|((word, indexed), suffix), e| Mnemonic {
        word,
        indexed,
        suffix,
        span: span_range(&e.span()),
    });

    let choice_group = mnemonic
        .clone()
        .separated_by(just(Token::Pipe))
        .at_least(1)
        .collect::<Vec<_>>()
        .delimited_by(just(Token::BraceOpen), just(Token::BraceClose))
        .map_with(|options, e| {
            Part::Choice(ChoiceGroup {
                options,
                span: span_range(&e.span()),
            })
        });

    let part = choice((
        mnemonic.map(Part::Mnemonic),
        choice_group,
        just(Token::Colon).to(Part::Separator),
    ));

    part.repeated()
        .at_least(1)
        .collect::<Vec<_>>()
        .then(just(Token::Query).or_not())
        .then_ignore(end())
        .map(|(parts, query)| Header {
            parts,
            query: query.is_some(),
        })
}
