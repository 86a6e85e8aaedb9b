//! Line classification and command tokenizing.
//!
//! Every input line is classified once. Command lines are split into whitespace-delimited
//! [`Word`]s, each a letter with an optional numeric value, so the rewriting code never has to
//! look at raw text to decide anything.

use std::sync::LazyLock;

use regex::Regex;

use crate::{LayerNumber, Mm};

// Matched anywhere in the (trimmed) comment, so trailing text like "@ Z=0.300 ---)" is ignored.
static LAYER_MARKER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"; \(--- Layer (?<layer>\d+)").expect("layer marker regex"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineKind {
    Blank,
    Comment,
    LayerMarker(LayerNumber),
    Command,
}

impl LineKind {
    pub fn is_passthrough(self) -> bool {
        !matches!(self, LineKind::Command)
    }
}

pub fn classify(line: &str) -> LineKind {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return LineKind::Blank;
    }
    if !is_comment(trimmed) {
        return LineKind::Command;
    }
    match layer_marker(trimmed) {
        Some(layer) => LineKind::LayerMarker(layer),
        None => LineKind::Comment,
    }
}

fn is_comment(trimmed: &str) -> bool {
    trimmed.starts_with(';') || trimmed.starts_with('(')
}

/// The layer number announced by a `; (--- Layer N` comment, if `line` contains one.
///
/// Numbers too large for [`LayerNumber`] are treated as not being a marker at all.
pub fn layer_marker(line: &str) -> Option<LayerNumber> {
    LAYER_MARKER.captures(line)?.name("layer")?.as_str().parse().ok()
}

/// One whitespace-delimited token of a command line, e.g. `G1`, `X10.000`, `Z0.300`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Word<'a> {
    pub raw: &'a str,
    pub letter: char,
    // None when the text after the letter isn't a number ("Z", "Zfoo", ...)
    pub value: Option<Mm>,
}

impl<'a> Word<'a> {
    pub fn parse(raw: &'a str) -> Option<Word<'a>> {
        let mut chars = raw.chars();
        let letter = chars.next()?;
        let value = chars.as_str().parse::<Mm>().ok();
        Some(Word { raw, letter, value })
    }

    pub fn is_z(&self) -> bool {
        self.letter == 'Z'
    }

    pub fn z_value(&self) -> Option<Mm> {
        if self.is_z() {
            self.value
        } else {
            None
        }
    }
}

/// Words of a command line in order; indices into this sequence are the token indices used to
/// identify the sentinel.
pub fn words(line: &str) -> impl Iterator<Item = Word<'_>> + '_ {
    line.split_whitespace().filter_map(Word::parse)
}
