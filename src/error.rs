//! Error types for command template lexing, parsing and resolution

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

use crate::template::lexer::Token;

/// Byte range in template text
pub type Span = std::ops::Range<usize>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// Input the template lexer does not recognize (stray `<`, `>` and so on)
    #[error("unrecognized template text {text:?} at {span:?}")]
    Lex { text: String, span: Span },

    /// Token sequence that does not form a valid command header
    #[error("template syntax error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },

    /// A placeholder or choice marker survived resolution
    #[error("unresolved marker {marker:?} in command {command:?}")]
    Unresolved { marker: String, command: String },
}

impl TemplateError {
    pub fn lex(text: impl Into<String>, span: Span) -> Self {
        Self::Lex {
            text: text.into(),
            span,
        }
    }

    /// Get the source span if available
    pub fn span(&self) -> Option<&Span> {
        match self {
            Self::Lex { span, .. } | Self::Syntax { span, .. } => Some(span),
            Self::Unresolved { .. } => None,
        }
    }

    /// Format the error with template context using ariadne
    pub fn format(&self, template: &str, name: &str) -> String {
        let span = self.span().cloned().unwrap_or(0..template.len());
        let label_message = match self {
            TemplateError::Syntax {
                message, expected, ..
            } if !expected.is_empty() => {
                format!("{}\nExpected: {}", message, expected.join(", "))
            }
            TemplateError::Syntax { message, .. } => message.clone(),
            TemplateError::Lex { text, .. } => format!("cannot tokenize {:?}", text),
            TemplateError::Unresolved { marker, .. } => format!("{:?} left unresolved", marker),
        };

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, name, span.start)
            .with_message(self.to_string())
            .with_label(
                Label::new((name, span))
                    .with_message(label_message)
                    .with_color(Color::Red),
            )
            .finish()
            .write((name, Source::from(template)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

impl<'a> From<chumsky::error::Rich<'a, Token>> for TemplateError {
    fn from(err: chumsky::error::Rich<'a, Token>) -> Self {
        let message = match err.found() {
            Some(Token::Marker(marker)) => {
                format!("argument marker {} is not allowed in a command header", marker)
            }
            Some(tok) => format!("Unexpected {}", format_token(tok)),
            None => "Unexpected end of template".to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                chumsky::error::RichPattern::Token(tok) => Some(format_token(tok)),
                chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
                chumsky::error::RichPattern::EndOfInput => Some("end of template".to_string()),
                _ => None,
            })
            .collect();

        TemplateError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &Token) -> String {
    match tok {
        Token::Word(s) => format!("mnemonic '{}'", s),
        Token::Marker(s) => format!("marker {}", s),
        Token::Index => "index placeholder".to_string(),
        Token::Colon => "':'".to_string(),
        Token::BraceOpen => "'{'".to_string(),
        Token::BraceClose => "'}'".to_string(),
        Token::Pipe => "'|'".to_string(),
        Token::Query => "'?'".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_display() {
        let err = TemplateError::Syntax {
            span: 4..5,
            message: "Unexpected '}'".to_string(),
            expected: vec![],
        };
        assert!(err.to_string().contains("Unexpected '}'"));
        assert_eq!(err.span(), Some(&(4..5)));
    }

    #[test]
    fn test_format_includes_template_name() {
        let err = TemplateError::lex("<", 2..3);
        let report = err.format("CH<:SCAle", "step-7");
        assert!(report.contains("step-7"));
    }

    #[test]
    fn test_unresolved_has_no_span() {
        let err = TemplateError::Unresolved {
            marker: "<x>".to_string(),
            command: "CH<x>".to_string(),
        };
        assert!(err.span().is_none());
    }
}
