//! SCPI command templates
//!
//! A template is a mnemonic path plus an optional argument grammar, for
//! example `CH<x>:SCAle <NR3>` or `TRIGger:{A|B}:EDGE:SOUrce`. Headers are
//! tokenized with logos and parsed with chumsky; resolution substitutes
//! index placeholders, choice groups and named placeholders from the bound
//! parameter values and appends trailing arguments.
//!
//! # Example
//!
//! ```text
//! template:  CH<x>:SCAle <NR3>
//! bindings:  channel = CH2, value = 0.5
//! resolved:  CH2:SCAle 0.5
//! ```

pub mod ast;
pub mod canonical;
pub mod grammar;
pub mod lexer;
pub mod resolver;
pub mod roles;

pub use canonical::canonicalize;
pub use grammar::{parse_header, split_template};
pub use resolver::{resolve, ResolvedCommand, Resolver};
