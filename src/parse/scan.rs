use winnow::combinator::{alt, opt, repeat};
use winnow::error::ModalResult;
use winnow::prelude::*;
use winnow::token::{any, take_while};

use super::grammar::{ident, is_keyword, string_literal};

/// One lexical token; only identifiers carry a payload.
fn token<'i>(input: &mut &'i str) -> ModalResult<Option<&'i str>> {
    alt((
        (|i: &mut &str| string_literal(i, '\'')).value(None),
        (|i: &mut &str| string_literal(i, '"')).value(None),
        take_while(1.., |c: char| c.is_ascii_digit() || c == '.').value(None),
        (opt('#'), ident).map(|(hash, name)| {
            (hash.is_some() || !is_keyword(name)).then_some(name)
        }),
        any.value(None),
    ))
    .parse_next(input)
}

pub(super) fn scan_references<'i>(input: &mut &'i str) -> ModalResult<Vec<&'i str>> {
    let tokens: Vec<Option<&str>> = repeat(0.., token).parse_next(input)?;
    let mut names: Vec<&str> = Vec::new();
    for name in tokens.into_iter().flatten() {
        if !names.contains(&name) {
            names.push(name);
        }
    }
    Ok(names)
}
