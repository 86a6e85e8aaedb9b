//! Finding the terminal Z and rewriting every other Z token against a [`ZPlan`].

use std::borrow::Cow;

use crate::line::{self, LineKind, Word};
use crate::plan::ZPlan;
use crate::{LayerNumber, Mm};

/// The one `Z` token that is never rewritten: the last parseable `Z` on the last command line
/// that has one. Usually the final lift/park move after the last layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sentinel {
    pub line: usize,
    // index into line::words() of that line
    pub token: usize,
}

pub fn locate_terminal_z<S: AsRef<str>>(lines: &[S]) -> Option<Sentinel> {
    lines
        .iter()
        .enumerate()
        .rev()
        .filter(|(_, l)| line::classify(l.as_ref()) == LineKind::Command)
        .find_map(|(index, l)| {
            line::words(l.as_ref())
                .enumerate()
                .filter(|(_, w)| w.z_value().is_some())
                .last()
                .map(|(token, _)| Sentinel { line: index, token })
        })
}

#[derive(Debug, Default)]
pub struct Rewritten<'a> {
    pub lines: Vec<Cow<'a, str>>,
    pub rewritten_lines: usize,
    pub rewritten_tokens: usize,
}

struct Step<'a> {
    layer: LayerNumber,
    line: Cow<'a, str>,
    rewritten_tokens: usize,
}

struct Rewriter<'p> {
    plan: &'p ZPlan,
    total_layers: LayerNumber,
    sentinel: Option<Sentinel>,
}

impl Rewriter<'_> {
    // (current layer, line) -> (layer for the following lines, output line)
    fn step<'a>(&self, current_layer: LayerNumber, index: usize, raw: &'a str) -> Step<'a> {
        let kind = line::classify(raw);
        if kind.is_passthrough() {
            let layer = match kind {
                LineKind::LayerMarker(layer) => layer,
                _ => current_layer,
            };
            return Step { layer, line: Cow::Borrowed(raw), rewritten_tokens: 0 };
        }

        let mut rewritten_tokens = 0;
        let parts: Vec<Cow<str>> = line::words(raw)
            .enumerate()
            .map(|(token, word)| match self.new_z(current_layer, index, token, &word) {
                Some(z) => {
                    rewritten_tokens += 1;
                    Cow::Owned(format!("Z{:.3}", z))
                }
                None => Cow::Borrowed(word.raw),
            })
            .collect();

        let line = if rewritten_tokens == 0 {
            Cow::Borrowed(raw)
        } else {
            Cow::Owned(parts.join(" ") + "\n")
        };
        Step { layer: current_layer, line, rewritten_tokens }
    }

    fn new_z(&self, layer: LayerNumber, index: usize, token: usize, word: &Word) -> Option<Mm> {
        let original_z = word.z_value().filter(|z| z.is_finite())?;
        if self.sentinel == Some(Sentinel { line: index, token }) {
            return None;
        }
        // Moves before the first marker (homing, initial lift) keep their Z.
        if layer == 0 || layer > self.total_layers {
            return None;
        }
        self.plan.target(layer, original_z)
    }
}

/// Rewrites `lines` (each with its original line terminator, if any) in a single forward pass.
///
/// Lines without a rewritten token are passed through byte-for-byte; lines with one are
/// re-joined with single spaces and a `\n`.
pub fn rewrite_lines<'a, S: AsRef<str>>(
    lines: &'a [S],
    plan: &ZPlan,
    total_layers: LayerNumber,
    sentinel: Option<Sentinel>,
) -> Rewritten<'a> {
    let rewriter = Rewriter { plan, total_layers, sentinel };
    let mut out = Rewritten { lines: Vec::with_capacity(lines.len()), ..Default::default() };
    lines.iter().enumerate().fold(0, |current_layer, (index, raw)| {
        let step = rewriter.step(current_layer, index, raw.as_ref());
        if step.rewritten_tokens > 0 {
            out.rewritten_lines += 1;
            out.rewritten_tokens += step.rewritten_tokens;
        }
        out.lines.push(step.line);
        step.layer
    });
    out
}
